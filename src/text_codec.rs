//! Wire codec for the text variant (TCP).
//!
//! A message is a single ASCII line terminated by CRLF. Keywords are matched
//! case-insensitively on decode and emitted in uppercase on encode; fields
//! are separated by single spaces. Message content is the only field that
//! may itself contain spaces and LF, and it is always the last field of its
//! line.

use anyhow::bail;

use crate::fields::{
    is_valid_channel_id, is_valid_content, is_valid_display_name, is_valid_secret,
    is_valid_username, MAX_CONTENT_LEN, MAX_DISPLAY_NAME_LEN,
};
use crate::message::MessageKind;

pub const END_OF_MESSAGE: &str = "\r\n";

/// The longest legal frame: `MSG FROM <display> IS <content>` with both
/// fields at their maximum length, plus the terminator.
pub const MAX_FRAME_LEN: usize =
    "MSG FROM ".len() + MAX_DISPLAY_NAME_LEN + " IS ".len() + MAX_CONTENT_LEN + END_OF_MESSAGE.len();

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextMessage {
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
    Err {
        display_name: String,
        content: String,
    },
    Bye {
        display_name: String,
    },
    Reply {
        positive: bool,
        content: String,
    },
}

impl TextMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            TextMessage::Auth { .. } => MessageKind::Auth,
            TextMessage::Join { .. } => MessageKind::Join,
            TextMessage::Msg { .. } => MessageKind::Msg,
            TextMessage::Err { .. } => MessageKind::Err,
            TextMessage::Bye { .. } => MessageKind::Bye,
            TextMessage::Reply { .. } => MessageKind::Reply,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            TextMessage::Auth {
                username,
                display_name,
                secret,
            } => format!("AUTH {username} AS {display_name} USING {secret}{END_OF_MESSAGE}"),
            TextMessage::Join {
                channel_id,
                display_name,
            } => format!("JOIN {channel_id} AS {display_name}{END_OF_MESSAGE}"),
            TextMessage::Msg {
                display_name,
                content,
            } => format!("MSG FROM {display_name} IS {content}{END_OF_MESSAGE}"),
            TextMessage::Err {
                display_name,
                content,
            } => format!("ERR FROM {display_name} IS {content}{END_OF_MESSAGE}"),
            TextMessage::Bye { display_name } => format!("BYE FROM {display_name}{END_OF_MESSAGE}"),
            TextMessage::Reply { positive, content } => {
                let result = if *positive { "OK" } else { "NOK" };
                format!("REPLY {result} IS {content}{END_OF_MESSAGE}")
            }
        }
    }

    /// Decode a single frame. `line` must include the CRLF terminator.
    pub fn decode(line: &str) -> anyhow::Result<TextMessage> {
        if line.len() > MAX_FRAME_LEN {
            bail!(
                "frame of {} bytes exceeds the maximum of {} bytes",
                line.len(),
                MAX_FRAME_LEN
            );
        }
        let Some(body) = line.strip_suffix(END_OF_MESSAGE) else {
            bail!("frame is not CRLF-terminated");
        };

        let mut fields = Fields::new(body);
        let keyword = fields.word()?;

        if keyword.eq_ignore_ascii_case("AUTH") {
            let username = fields.word()?;
            fields.keyword("AS")?;
            let display_name = fields.word()?;
            fields.keyword("USING")?;
            let secret = fields.word()?;
            fields.finish()?;
            if !is_valid_username(username) {
                bail!("invalid username '{}'", username);
            }
            if !is_valid_display_name(display_name) {
                bail!("invalid display name '{}'", display_name);
            }
            if !is_valid_secret(secret) {
                bail!("invalid secret");
            }
            Ok(TextMessage::Auth {
                username: username.to_owned(),
                display_name: display_name.to_owned(),
                secret: secret.to_owned(),
            })
        }
        else if keyword.eq_ignore_ascii_case("JOIN") {
            let channel_id = fields.word()?;
            fields.keyword("AS")?;
            let display_name = fields.word()?;
            fields.finish()?;
            if !is_valid_channel_id(channel_id) {
                bail!("invalid channel id '{}'", channel_id);
            }
            if !is_valid_display_name(display_name) {
                bail!("invalid display name '{}'", display_name);
            }
            Ok(TextMessage::Join {
                channel_id: channel_id.to_owned(),
                display_name: display_name.to_owned(),
            })
        }
        else if keyword.eq_ignore_ascii_case("MSG") {
            let (display_name, content) = decode_from_is(&mut fields)?;
            Ok(TextMessage::Msg {
                display_name,
                content,
            })
        }
        else if keyword.eq_ignore_ascii_case("ERR") {
            let (display_name, content) = decode_from_is(&mut fields)?;
            Ok(TextMessage::Err {
                display_name,
                content,
            })
        }
        else if keyword.eq_ignore_ascii_case("BYE") {
            fields.keyword("FROM")?;
            let display_name = fields.word()?;
            fields.finish()?;
            if !is_valid_display_name(display_name) {
                bail!("invalid display name '{}'", display_name);
            }
            Ok(TextMessage::Bye {
                display_name: display_name.to_owned(),
            })
        }
        else if keyword.eq_ignore_ascii_case("REPLY") {
            let result = fields.word()?;
            let positive = if result.eq_ignore_ascii_case("OK") {
                true
            }
            else if result.eq_ignore_ascii_case("NOK") {
                false
            }
            else {
                bail!("invalid REPLY result '{}'", result);
            };
            fields.keyword("IS")?;
            let content = fields.rest()?;
            if !is_valid_content(content) {
                bail!("invalid message content");
            }
            Ok(TextMessage::Reply {
                positive,
                content: content.to_owned(),
            })
        }
        else {
            bail!("unknown message keyword '{}'", keyword);
        }
    }
}

fn decode_from_is(fields: &mut Fields) -> anyhow::Result<(String, String)> {
    fields.keyword("FROM")?;
    let display_name = fields.word()?;
    fields.keyword("IS")?;
    let content = fields.rest()?;
    if !is_valid_display_name(display_name) {
        bail!("invalid display name '{}'", display_name);
    }
    if !is_valid_content(content) {
        bail!("invalid message content");
    }
    Ok((display_name.to_owned(), content.to_owned()))
}

/// Cursor over the space-separated fields of a frame body.
struct Fields<'a> {
    remaining: Option<&'a str>,
}

impl<'a> Fields<'a> {
    fn new(body: &'a str) -> Fields<'a> {
        Fields {
            remaining: Some(body),
        }
    }

    fn word(&mut self) -> anyhow::Result<&'a str> {
        let Some(remaining) = self.remaining else {
            bail!("unexpected end of message");
        };
        match remaining.split_once(' ') {
            Some((word, rest)) => {
                self.remaining = Some(rest);
                Ok(word)
            }
            None => {
                self.remaining = None;
                Ok(remaining)
            }
        }
    }

    fn keyword(&mut self, expected: &str) -> anyhow::Result<()> {
        let word = self.word()?;
        if !word.eq_ignore_ascii_case(expected) {
            bail!("expected keyword '{}', found '{}'", expected, word);
        }
        Ok(())
    }

    /// Everything up to the end of the frame, spaces and LF included.
    fn rest(&mut self) -> anyhow::Result<&'a str> {
        let Some(remaining) = self.remaining.take() else {
            bail!("unexpected end of message");
        };
        Ok(remaining)
    }

    fn finish(&self) -> anyhow::Result<()> {
        if self.remaining.is_some() {
            bail!("trailing data after the last field");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn auth() -> TextMessage {
        TextMessage::Auth {
            username: "alice".to_owned(),
            display_name: "Alice_Wonder".to_owned(),
            secret: "SeCrEt42".to_owned(),
        }
    }

    #[rstest]
    #[case::auth(auth(), "AUTH alice AS Alice_Wonder USING SeCrEt42\r\n")]
    #[case::join(
        TextMessage::Join { channel_id: "general".to_owned(), display_name: "Alice_Wonder".to_owned() },
        "JOIN general AS Alice_Wonder\r\n"
    )]
    #[case::msg(
        TextMessage::Msg { display_name: "Alice_Wonder".to_owned(), content: "hello world".to_owned() },
        "MSG FROM Alice_Wonder IS hello world\r\n"
    )]
    #[case::err(
        TextMessage::Err { display_name: "server".to_owned(), content: "boom".to_owned() },
        "ERR FROM server IS boom\r\n"
    )]
    #[case::bye(
        TextMessage::Bye { display_name: "Alice_Wonder".to_owned() },
        "BYE FROM Alice_Wonder\r\n"
    )]
    #[case::reply_ok(
        TextMessage::Reply { positive: true, content: "Authenticated.".to_owned() },
        "REPLY OK IS Authenticated.\r\n"
    )]
    #[case::reply_nok(
        TextMessage::Reply { positive: false, content: "no".to_owned() },
        "REPLY NOK IS no\r\n"
    )]
    fn test_encode(#[case] message: TextMessage, #[case] expected: &str) {
        assert_eq!(message.encode(), expected);
        // encode / decode round trip
        assert_eq!(TextMessage::decode(expected).unwrap(), message);
    }

    #[rstest]
    #[case::lowercase_keywords("msg from bob is hi alice\r\n",
        TextMessage::Msg { display_name: "bob".to_owned(), content: "hi alice".to_owned() })]
    #[case::mixed_case_reply("rEpLy Ok iS fine\r\n",
        TextMessage::Reply { positive: true, content: "fine".to_owned() })]
    #[case::mixed_case_auth("Auth alice aS nick uSiNg pw\r\n",
        TextMessage::Auth { username: "alice".to_owned(), display_name: "nick".to_owned(), secret: "pw".to_owned() })]
    #[case::content_with_lf("MSG FROM bob IS two\nlines\r\n",
        TextMessage::Msg { display_name: "bob".to_owned(), content: "two\nlines".to_owned() })]
    fn test_decode_case_insensitive(#[case] line: &str, #[case] expected: TextMessage) {
        assert_eq!(TextMessage::decode(line).unwrap(), expected);
    }

    #[rstest]
    #[case::missing_terminator("MSG FROM bob IS hi")]
    #[case::missing_content("REPLY OK IS\r\n")]
    #[case::empty_content("MSG FROM bob IS \r\n")]
    #[case::unknown_keyword("NOPE FROM bob IS hi\r\n")]
    #[case::bad_reply_result("REPLY MAYBE IS hi\r\n")]
    #[case::bye_trailing_field("BYE FROM bob extra\r\n")]
    #[case::join_missing_as("JOIN general Alice\r\n")]
    #[case::auth_missing_using("AUTH alice AS nick pw\r\n")]
    #[case::display_name_with_space("MSG FROM b b IS hi\r\n")]
    #[case::empty_line("\r\n")]
    fn test_decode_malformed(#[case] line: &str) {
        assert!(TextMessage::decode(line).is_err());
    }

    #[test]
    fn test_decode_boundary_lengths() {
        let max_display = "d".repeat(20);
        let max_content = "c".repeat(60000);
        let line = format!("MSG FROM {max_display} IS {max_content}\r\n");
        assert_eq!(line.len(), MAX_FRAME_LEN);
        let decoded = TextMessage::decode(&line).unwrap();
        assert_eq!(
            decoded,
            TextMessage::Msg {
                display_name: max_display.clone(),
                content: max_content,
            }
        );

        // one byte over either limit is rejected
        let long_content = format!("MSG FROM {max_display} IS {}\r\n", "c".repeat(60001));
        assert!(TextMessage::decode(&long_content).is_err());
        let long_display = format!("MSG FROM {} IS hi\r\n", "d".repeat(21));
        assert!(TextMessage::decode(&long_display).is_err());
    }
}
