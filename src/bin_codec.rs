//! Wire codec for the binary variant (UDP).
//!
//! Every datagram starts with a 3-byte header: message type (u8) and message
//! id (u16 BE). Variable-length fields are NUL-terminated ASCII. For CONFIRM
//! the header id field carries the id being confirmed; every other message
//! carries its own id there.

use anyhow::bail;
use bytes::{BufMut, BytesMut};
use bytes_varint::try_get_fixed::TryGetFixedSupport;

use crate::fields::{
    is_valid_channel_id, is_valid_content, is_valid_display_name, is_valid_secret,
    is_valid_username, MAX_CONTENT_LEN, MAX_DISPLAY_NAME_LEN,
};
use crate::message::MessageKind;
use crate::message_id::MessageId;

pub const HEADER_LEN: usize = 3;

/// The longest legal datagram: MSG or ERR with both fields at their maximum
/// length.
pub const MAX_DATAGRAM_LEN: usize = HEADER_LEN + MAX_DISPLAY_NAME_LEN + 1 + MAX_CONTENT_LEN + 1;

const TYPE_CONFIRM: u8 = 0x00;
const TYPE_REPLY: u8 = 0x01;
const TYPE_AUTH: u8 = 0x02;
const TYPE_JOIN: u8 = 0x03;
const TYPE_MSG: u8 = 0x04;
const TYPE_PING: u8 = 0xfd;
const TYPE_ERR: u8 = 0xfe;
const TYPE_BYE: u8 = 0xff;

const FIELD_TERMINATOR: u8 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatagramBody {
    Confirm,
    Reply {
        positive: bool,
        ref_id: MessageId,
        content: String,
    },
    Auth {
        username: String,
        display_name: String,
        secret: String,
    },
    Join {
        channel_id: String,
        display_name: String,
    },
    Msg {
        display_name: String,
        content: String,
    },
    Ping,
    Err {
        display_name: String,
        content: String,
    },
    Bye {
        display_name: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datagram {
    pub id: MessageId,
    pub body: DatagramBody,
}

impl Datagram {
    pub fn kind(&self) -> MessageKind {
        match &self.body {
            DatagramBody::Confirm => MessageKind::Confirm,
            DatagramBody::Reply { .. } => MessageKind::Reply,
            DatagramBody::Auth { .. } => MessageKind::Auth,
            DatagramBody::Join { .. } => MessageKind::Join,
            DatagramBody::Msg { .. } => MessageKind::Msg,
            DatagramBody::Ping => MessageKind::Ping,
            DatagramBody::Err { .. } => MessageKind::Err,
            DatagramBody::Bye { .. } => MessageKind::Bye,
        }
    }

    fn type_code(&self) -> u8 {
        match &self.body {
            DatagramBody::Confirm => TYPE_CONFIRM,
            DatagramBody::Reply { .. } => TYPE_REPLY,
            DatagramBody::Auth { .. } => TYPE_AUTH,
            DatagramBody::Join { .. } => TYPE_JOIN,
            DatagramBody::Msg { .. } => TYPE_MSG,
            DatagramBody::Ping => TYPE_PING,
            DatagramBody::Err { .. } => TYPE_ERR,
            DatagramBody::Bye { .. } => TYPE_BYE,
        }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.type_code());
        buf.put_u16(self.id.to_raw());
        match &self.body {
            DatagramBody::Confirm | DatagramBody::Ping => {}
            DatagramBody::Reply {
                positive,
                ref_id,
                content,
            } => {
                buf.put_u8(*positive as u8);
                buf.put_u16(ref_id.to_raw());
                put_field(buf, content);
            }
            DatagramBody::Auth {
                username,
                display_name,
                secret,
            } => {
                put_field(buf, username);
                put_field(buf, display_name);
                put_field(buf, secret);
            }
            DatagramBody::Join {
                channel_id,
                display_name,
            } => {
                put_field(buf, channel_id);
                put_field(buf, display_name);
            }
            DatagramBody::Msg {
                display_name,
                content,
            }
            | DatagramBody::Err {
                display_name,
                content,
            } => {
                put_field(buf, display_name);
                put_field(buf, content);
            }
            DatagramBody::Bye { display_name } => {
                put_field(buf, display_name);
            }
        }
    }

    pub fn deser(raw: &[u8]) -> anyhow::Result<Datagram> {
        if raw.len() > MAX_DATAGRAM_LEN {
            bail!(
                "datagram of {} bytes exceeds the maximum of {} bytes",
                raw.len(),
                MAX_DATAGRAM_LEN
            );
        }

        let mut buf = raw;
        let type_code = buf.try_get_u8()?;
        let id = MessageId::from_raw(buf.try_get_u16()?);

        let body = match type_code {
            TYPE_CONFIRM => DatagramBody::Confirm,
            TYPE_PING => DatagramBody::Ping,
            TYPE_REPLY => {
                let result = buf.try_get_u8()?;
                if result > 1 {
                    bail!("invalid REPLY result byte {}", result);
                }
                let ref_id = MessageId::from_raw(buf.try_get_u16()?);
                let content = take_field(&mut buf)?;
                if !is_valid_content(content) {
                    bail!("invalid message content");
                }
                DatagramBody::Reply {
                    positive: result == 1,
                    ref_id,
                    content: content.to_owned(),
                }
            }
            TYPE_AUTH => {
                let username = take_field(&mut buf)?;
                let display_name = take_field(&mut buf)?;
                let secret = take_field(&mut buf)?;
                if !is_valid_username(username) {
                    bail!("invalid username '{}'", username);
                }
                if !is_valid_display_name(display_name) {
                    bail!("invalid display name '{}'", display_name);
                }
                if !is_valid_secret(secret) {
                    bail!("invalid secret");
                }
                DatagramBody::Auth {
                    username: username.to_owned(),
                    display_name: display_name.to_owned(),
                    secret: secret.to_owned(),
                }
            }
            TYPE_JOIN => {
                let channel_id = take_field(&mut buf)?;
                let display_name = take_field(&mut buf)?;
                if !is_valid_channel_id(channel_id) {
                    bail!("invalid channel id '{}'", channel_id);
                }
                if !is_valid_display_name(display_name) {
                    bail!("invalid display name '{}'", display_name);
                }
                DatagramBody::Join {
                    channel_id: channel_id.to_owned(),
                    display_name: display_name.to_owned(),
                }
            }
            TYPE_MSG | TYPE_ERR => {
                let display_name = take_field(&mut buf)?;
                let content = take_field(&mut buf)?;
                if !is_valid_display_name(display_name) {
                    bail!("invalid display name '{}'", display_name);
                }
                if !is_valid_content(content) {
                    bail!("invalid message content");
                }
                let display_name = display_name.to_owned();
                let content = content.to_owned();
                if type_code == TYPE_MSG {
                    DatagramBody::Msg {
                        display_name,
                        content,
                    }
                }
                else {
                    DatagramBody::Err {
                        display_name,
                        content,
                    }
                }
            }
            TYPE_BYE => {
                let display_name = take_field(&mut buf)?;
                if !is_valid_display_name(display_name) {
                    bail!("invalid display name '{}'", display_name);
                }
                DatagramBody::Bye {
                    display_name: display_name.to_owned(),
                }
            }
            other => bail!("unknown message type 0x{:02x}", other),
        };

        if !buf.is_empty() {
            bail!("{} trailing bytes after the last field", buf.len());
        }
        Ok(Datagram { id, body })
    }
}

fn put_field(buf: &mut BytesMut, field: &str) {
    buf.put_slice(field.as_bytes());
    buf.put_u8(FIELD_TERMINATOR);
}

fn take_field<'a>(buf: &mut &'a [u8]) -> anyhow::Result<&'a str> {
    let Some(terminator) = buf.iter().position(|&b| b == FIELD_TERMINATOR) else {
        bail!("unterminated field");
    };
    let (field, rest) = buf.split_at(terminator);
    *buf = &rest[1..];
    // the alphabet checks reject anything outside printable ASCII, so non-UTF8
    // input cannot slip through them either way
    Ok(std::str::from_utf8(field)?)
}
