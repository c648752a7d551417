//! Parsing of lines read from standard input.
//!
//! Four local commands are recognized: `/auth`, `/join`, `/rename` and
//! `/help`. Every other non-empty line is outgoing chat content, so a
//! mistyped command name travels to the channel like any other text.

use anyhow::bail;

use crate::fields::{
    is_valid_channel_id, is_valid_content, is_valid_display_name, is_valid_secret,
    is_valid_username,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserCommand {
    Auth {
        username: String,
        secret: String,
        display_name: String,
    },
    Join {
        channel_id: String,
    },
    Rename {
        display_name: String,
    },
    Help,
    Msg {
        content: String,
    },
}

/// Parse one line of user input. Returns `Ok(None)` for empty lines and
/// `Err` for recognized commands with invalid fields or arity; such errors
/// are reported locally and never reach the wire.
pub fn parse(line: &str) -> anyhow::Result<Option<UserCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace();
    let command = match tokens.next() {
        Some("/auth") => {
            let (Some(username), Some(secret), Some(display_name), None) =
                (tokens.next(), tokens.next(), tokens.next(), tokens.next())
            else {
                bail!("usage: /auth <username> <secret> <display_name>");
            };
            if !is_valid_username(username) {
                bail!("invalid username '{}'", username);
            }
            if !is_valid_secret(secret) {
                bail!("invalid secret");
            }
            if !is_valid_display_name(display_name) {
                bail!("invalid display name '{}'", display_name);
            }
            UserCommand::Auth {
                username: username.to_owned(),
                secret: secret.to_owned(),
                display_name: display_name.to_owned(),
            }
        }
        Some("/join") => {
            let (Some(channel_id), None) = (tokens.next(), tokens.next()) else {
                bail!("usage: /join <channel_id>");
            };
            if !is_valid_channel_id(channel_id) {
                bail!("invalid channel id '{}'", channel_id);
            }
            UserCommand::Join {
                channel_id: channel_id.to_owned(),
            }
        }
        Some("/rename") => {
            let (Some(display_name), None) = (tokens.next(), tokens.next()) else {
                bail!("usage: /rename <display_name>");
            };
            if !is_valid_display_name(display_name) {
                bail!("invalid display name '{}'", display_name);
            }
            UserCommand::Rename {
                display_name: display_name.to_owned(),
            }
        }
        Some("/help") => {
            if tokens.next().is_some() {
                bail!("usage: /help");
            }
            UserCommand::Help
        }
        _ => {
            if !is_valid_content(line) {
                bail!("message content must be 1-60000 bytes of printable ASCII");
            }
            UserCommand::Msg {
                content: line.to_owned(),
            }
        }
    };

    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::auth("/auth alice SeCrEt42 Alice_Wonder", UserCommand::Auth {
        username: "alice".to_owned(),
        secret: "SeCrEt42".to_owned(),
        display_name: "Alice_Wonder".to_owned(),
    })]
    #[case::join("/join general", UserCommand::Join { channel_id: "general".to_owned() })]
    #[case::rename("/rename nick", UserCommand::Rename { display_name: "nick".to_owned() })]
    #[case::help("/help", UserCommand::Help)]
    #[case::message("hello world", UserCommand::Msg { content: "hello world".to_owned() })]
    #[case::message_trimmed("  hello  ", UserCommand::Msg { content: "hello".to_owned() })]
    #[case::unrecognized_command_is_chat("/hello there", UserCommand::Msg { content: "/hello there".to_owned() })]
    fn test_parse(#[case] line: &str, #[case] expected: UserCommand) {
        assert_eq!(parse(line).unwrap(), Some(expected));
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    fn test_parse_empty(#[case] line: &str) {
        assert_eq!(parse(line).unwrap(), None);
    }

    #[rstest]
    #[case::auth_too_few_args("/auth alice secret")]
    #[case::auth_too_many_args("/auth alice secret nick extra")]
    #[case::auth_bad_username("/auth al.ice secret nick")]
    #[case::auth_long_display(&format!("/auth alice secret {}", "d".repeat(21)))]
    #[case::join_missing_channel("/join")]
    #[case::join_bad_channel("/join a channel")]
    #[case::rename_bad_name("/rename")]
    #[case::help_with_args("/help me")]
    fn test_parse_invalid(#[case] line: &str) {
        assert!(parse(line).is_err());
    }
}
