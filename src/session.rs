//! Pieces shared by the TCP and UDP session loops.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// How long to wait for the server's REPLY to an AUTH or JOIN request.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Verdict of one handled event: keep looping, or terminate the session with
/// the given exit disposition.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Flow {
    Continue,
    /// clean termination, process exit code 0
    Success,
    /// error termination, process exit code 1
    Failure,
}

pub fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}
