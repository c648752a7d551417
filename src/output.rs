//! User-visible output.
//!
//! Chat traffic goes to stdout, everything diagnostic goes to stderr. The
//! sessions talk to this through a trait so that tests can assert on what
//! would have reached the terminal.

#[cfg(test)] use mockall::automock;

#[cfg_attr(test, automock)]
pub trait UserOutput: Send + Sync + 'static {
    /// Outcome of an AUTH or JOIN request.
    fn reply_outcome(&self, positive: bool, content: &str);

    /// An incoming chat message.
    fn chat_message(&self, display_name: &str, content: &str);

    /// An error the peer reported about us.
    fn error_from_peer(&self, display_name: &str, content: &str);

    /// A locally detected error.
    fn local_error(&self, text: &str);

    /// Overview of the local commands, for `/help`.
    fn supported_commands(&self);
}

pub struct ConsoleOutput;

impl UserOutput for ConsoleOutput {
    fn reply_outcome(&self, positive: bool, content: &str) {
        if positive {
            println!("Action Success: {}", content);
        }
        else {
            println!("Action Failure: {}", content);
        }
    }

    fn chat_message(&self, display_name: &str, content: &str) {
        println!("{}: {}", display_name, content);
    }

    fn error_from_peer(&self, display_name: &str, content: &str) {
        eprintln!("ERROR FROM {}: {}", display_name, content);
    }

    fn local_error(&self, text: &str) {
        eprintln!("ERROR: {}", text);
    }

    fn supported_commands(&self) {
        println!("Supported commands:");
        println!("  /auth <username> <secret> <display_name>  authenticate with the server");
        println!("  /join <channel_id>                        join a channel");
        println!("  /rename <display_name>                    change the local display name");
        println!("  /help                                     print this overview");
    }
}
