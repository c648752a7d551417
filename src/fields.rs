//! Field alphabets and length limits shared by both wire variants.
//!
//! Every variable-length field of the protocol draws from one of three
//! alphabets:
//! * identifiers (username, channel id, secret): alphanumeric plus `_`, `-`
//! * display names: printable ASCII excluding space and LF (0x21-0x7E)
//! * message content: printable ASCII plus space (0x20) and LF (0x0A)

pub const MAX_USERNAME_LEN: usize = 20;
pub const MAX_CHANNEL_ID_LEN: usize = 20;
pub const MAX_SECRET_LEN: usize = 128;
pub const MAX_DISPLAY_NAME_LEN: usize = 20;
pub const MAX_CONTENT_LEN: usize = 60000;

fn is_ident(value: &str, max_len: usize) -> bool {
    !value.is_empty()
        && value.len() <= max_len
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub fn is_valid_username(value: &str) -> bool {
    is_ident(value, MAX_USERNAME_LEN)
}

pub fn is_valid_channel_id(value: &str) -> bool {
    is_ident(value, MAX_CHANNEL_ID_LEN)
}

pub fn is_valid_secret(value: &str) -> bool {
    is_ident(value, MAX_SECRET_LEN)
}

pub fn is_valid_display_name(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_DISPLAY_NAME_LEN
        && value.bytes().all(|b| (0x21..=0x7e).contains(&b))
}

pub fn is_valid_content(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_CONTENT_LEN
        && value.bytes().all(|b| (0x20..=0x7e).contains(&b) || b == b'\n')
}
