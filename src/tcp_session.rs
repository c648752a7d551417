//! Session driver for the text variant (TCP).
//!
//! Stream reads append into a rolling buffer that is scanned for CRLF; every
//! terminated prefix is decoded and dispatched as one frame. The only timed
//! wait on this variant is the reply timeout after an AUTH or JOIN request;
//! while it runs, standard input is suspended.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::fsm::{self, Phase};
use crate::message::MessageKind;
use crate::output::UserOutput;
use crate::session::{stdin_lines, Flow, REPLY_TIMEOUT};
use crate::text_codec::{TextMessage, END_OF_MESSAGE, MAX_FRAME_LEN};
use crate::timer::{self, OneShotTimer};
use crate::user_input::{self, UserCommand};

pub struct TcpSession<W> {
    writer: W,
    recv_buffer: BytesMut,
    phase: Phase,
    display_name: String,
    awaiting_reply: bool,
    timer: OneShotTimer,
    output: Arc<dyn UserOutput>,
}

impl<W: AsyncWrite + Unpin> TcpSession<W> {
    pub fn new(writer: W, output: Arc<dyn UserOutput>) -> TcpSession<W> {
        TcpSession {
            writer,
            recv_buffer: BytesMut::new(),
            phase: Phase::Start,
            display_name: "unknown".to_owned(),
            awaiting_reply: false,
            timer: OneShotTimer::new(),
            output,
        }
    }

    pub fn stdin_enabled(&self) -> bool {
        !self.awaiting_reply
    }

    async fn send_frame(&mut self, message: &TextMessage) -> anyhow::Result<()> {
        let line = message.encode();
        trace!("sending frame: {:?}", line);
        self.writer
            .write_all(line.as_bytes())
            .await
            .context("couldn't send a message to the server")?;
        Ok(())
    }

    /// Report a fatal protocol error both locally and to the peer. On this
    /// variant there is no delivery acknowledgement, so the session ends
    /// right after the ERR frame is written.
    async fn protocol_violation(&mut self, diagnostic: &str) -> anyhow::Result<Flow> {
        warn!("protocol violation: {}", diagnostic);
        self.output.local_error(diagnostic);
        let err = TextMessage::Err {
            display_name: self.display_name.clone(),
            content: diagnostic.to_owned(),
        };
        self.send_frame(&err).await?;
        Ok(Flow::Failure)
    }

    fn await_reply(&mut self) {
        self.awaiting_reply = true;
        self.timer.arm(REPLY_TIMEOUT);
    }

    pub async fn handle_user_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        let command = match user_input::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(e) => {
                self.output.local_error(&format!("{:#}", e));
                return Ok(Flow::Continue);
            }
        };

        match command {
            UserCommand::Help => {
                self.output.supported_commands();
                Ok(Flow::Continue)
            }
            UserCommand::Rename { display_name } => {
                self.display_name = display_name;
                Ok(Flow::Continue)
            }
            UserCommand::Auth {
                username,
                secret,
                display_name,
            } => {
                if !fsm::may_send(self.phase, MessageKind::Auth) {
                    return self
                        .protocol_violation(&format!(
                            "cannot send an AUTH message in the {} phase",
                            self.phase.name()
                        ))
                        .await;
                }
                self.display_name = display_name.clone();
                let auth = TextMessage::Auth {
                    username,
                    display_name,
                    secret,
                };
                self.send_frame(&auth).await?;
                if self.phase == Phase::Start {
                    self.phase = Phase::Auth;
                }
                self.await_reply();
                Ok(Flow::Continue)
            }
            UserCommand::Join { channel_id } => {
                if !fsm::may_send(self.phase, MessageKind::Join) {
                    return self
                        .protocol_violation(&format!(
                            "cannot send a JOIN message in the {} phase",
                            self.phase.name()
                        ))
                        .await;
                }
                let join = TextMessage::Join {
                    channel_id,
                    display_name: self.display_name.clone(),
                };
                self.send_frame(&join).await?;
                self.phase = Phase::Join;
                self.await_reply();
                Ok(Flow::Continue)
            }
            UserCommand::Msg { content } => {
                if !fsm::may_send(self.phase, MessageKind::Msg) {
                    return self
                        .protocol_violation(&format!(
                            "cannot send a MSG message in the {} phase",
                            self.phase.name()
                        ))
                        .await;
                }
                let msg = TextMessage::Msg {
                    display_name: self.display_name.clone(),
                    content,
                };
                self.send_frame(&msg).await?;
                Ok(Flow::Continue)
            }
        }
    }

    pub async fn handle_socket_data(&mut self, data: &[u8]) -> anyhow::Result<Flow> {
        self.recv_buffer.extend_from_slice(data);

        while let Some(frame_len) = find_frame(&self.recv_buffer) {
            let frame_bytes = self.recv_buffer.split_to(frame_len);
            if frame_bytes.len() > MAX_FRAME_LEN {
                return self.protocol_violation("too long message from the server").await;
            }
            let Ok(frame) = std::str::from_utf8(&frame_bytes) else {
                return self
                    .protocol_violation("received a message that is not valid ASCII")
                    .await;
            };
            let flow = self.handle_frame(frame).await?;
            if flow != Flow::Continue {
                return Ok(flow);
            }
        }

        // an unterminated prefix this long can never become a legal frame
        if self.recv_buffer.len() >= MAX_FRAME_LEN {
            return self.protocol_violation("too long message from the server").await;
        }
        Ok(Flow::Continue)
    }

    async fn handle_frame(&mut self, frame: &str) -> anyhow::Result<Flow> {
        trace!("received frame: {:?}", frame);
        let message = match TextMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                return self
                    .protocol_violation(&format!(
                        "received a malformed message from the server: {}",
                        e
                    ))
                    .await;
            }
        };

        if !fsm::may_receive(self.phase, message.kind(), false) {
            return self
                .protocol_violation(&format!(
                    "did not expect a {} message in the {} phase",
                    message.kind().name(),
                    self.phase.name()
                ))
                .await;
        }

        match message {
            TextMessage::Bye { display_name } => {
                debug!("server ended the session as '{}'", display_name);
                Ok(Flow::Success)
            }
            TextMessage::Err {
                display_name,
                content,
            } => {
                self.output.error_from_peer(&display_name, &content);
                Ok(Flow::Failure)
            }
            TextMessage::Msg {
                display_name,
                content,
            } => {
                self.output.chat_message(&display_name, &content);
                Ok(Flow::Continue)
            }
            TextMessage::Reply { positive, content } => {
                if !self.awaiting_reply {
                    return self.protocol_violation("did not expect a REPLY message").await;
                }
                self.timer.disarm();
                self.awaiting_reply = false;
                self.output.reply_outcome(positive, &content);
                if self.phase == Phase::Join || positive {
                    self.phase = Phase::Open;
                }
                Ok(Flow::Continue)
            }
            TextMessage::Auth { .. } | TextMessage::Join { .. } => {
                unreachable!("rejected by the receive gate")
            }
        }
    }

    pub async fn handle_timer(&mut self) -> anyhow::Result<Flow> {
        // the timer is only ever armed while a REPLY is outstanding
        self.timer.disarm();
        self.protocol_violation("waited too long for the server's reply").await
    }

    /// Best-effort farewell: fire the BYE and end the session cleanly.
    pub async fn farewell(&mut self) -> anyhow::Result<Flow> {
        debug!("ending the session");
        let bye = TextMessage::Bye {
            display_name: self.display_name.clone(),
        };
        self.send_frame(&bye).await?;
        Ok(Flow::Success)
    }
}

fn find_frame(buf: &[u8]) -> Option<usize> {
    buf.windows(END_OF_MESSAGE.len())
        .position(|window| window == END_OF_MESSAGE.as_bytes())
        .map(|pos| pos + END_OF_MESSAGE.len())
}

pub async fn run_tcp(server_addr: SocketAddr, output: Arc<dyn UserOutput>) -> anyhow::Result<Flow> {
    let stream = TcpStream::connect(server_addr)
        .await
        .context("couldn't connect to the server")?;
    info!("connected to {:?}", server_addr);

    let (mut read_half, write_half) = stream.into_split();
    let mut session = TcpSession::new(write_half, output);
    let mut stdin = stdin_lines();
    let mut read_buf = vec![0u8; 4096];

    loop {
        let deadline = session.timer.deadline();
        let stdin_enabled = session.stdin_enabled();

        let flow = tokio::select! {
            read = read_half.read(&mut read_buf) => {
                let bytes_read = read.context("couldn't receive a message from the server")?;
                if bytes_read == 0 {
                    debug!("server closed the connection");
                    Flow::Success
                }
                else {
                    session.handle_socket_data(&read_buf[..bytes_read]).await?
                }
            }
            line = stdin.next_line(), if stdin_enabled => {
                match line.context("couldn't read from standard input")? {
                    Some(line) => session.handle_user_line(&line).await?,
                    None => session.farewell().await?,
                }
            }
            _ = timer::expiry(deadline) => session.handle_timer().await?,
            _ = tokio::signal::ctrl_c() => session.farewell().await?,
        };

        match flow {
            Flow::Continue => {}
            terminal => return Ok(terminal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MockUserOutput;
    use mockall::predicate::eq;

    fn session_with(output: MockUserOutput) -> TcpSession<Vec<u8>> {
        TcpSession::new(Vec::new(), Arc::new(output))
    }

    /// a mock that tolerates local error reports but rejects everything else
    fn output_allowing_local_errors() -> MockUserOutput {
        let mut output = MockUserOutput::new();
        output.expect_local_error().return_const(());
        output
    }

    async fn authenticated_session(output: MockUserOutput) -> TcpSession<Vec<u8>> {
        let mut session = session_with(output);
        session
            .handle_user_line("/auth alice SeCrEt42 Alice_Wonder")
            .await
            .unwrap();
        session
            .handle_socket_data(b"REPLY OK IS Authenticated.\r\n")
            .await
            .unwrap();
        session.writer.clear();
        session
    }

    #[tokio::test]
    async fn test_auth_request_suspends_input_and_arms_timer() {
        let mut session = session_with(MockUserOutput::new());

        let flow = session
            .handle_user_line("/auth alice SeCrEt42 Alice_Wonder")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            session.writer,
            b"AUTH alice AS Alice_Wonder USING SeCrEt42\r\n"
        );
        assert_eq!(session.phase, Phase::Auth);
        assert!(!session.stdin_enabled());
        assert!(session.timer.is_armed());
    }

    #[tokio::test]
    async fn test_positive_reply_opens_the_session() {
        let mut output = MockUserOutput::new();
        output
            .expect_reply_outcome()
            .with(eq(true), eq("Authenticated."))
            .times(1)
            .return_const(());
        let mut session = session_with(output);
        session
            .handle_user_line("/auth alice SeCrEt42 Alice_Wonder")
            .await
            .unwrap();

        let flow = session
            .handle_socket_data(b"REPLY OK IS Authenticated.\r\n")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.phase, Phase::Open);
        assert!(session.stdin_enabled());
        assert!(!session.timer.is_armed());
    }

    #[tokio::test]
    async fn test_negative_auth_reply_allows_retry() {
        let mut output = MockUserOutput::new();
        output
            .expect_reply_outcome()
            .with(eq(false), eq("bad credentials"))
            .times(1)
            .return_const(());
        let mut session = session_with(output);
        session
            .handle_user_line("/auth alice wrong Alice_Wonder")
            .await
            .unwrap();

        let flow = session
            .handle_socket_data(b"REPLY NOK IS bad credentials\r\n")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.phase, Phase::Auth);
        assert!(session.stdin_enabled());
        assert!(!session.timer.is_armed());
    }

    #[tokio::test]
    async fn test_chat_message_round() {
        let mut output = MockUserOutput::new();
        output.expect_reply_outcome().return_const(());
        output
            .expect_chat_message()
            .with(eq("bob"), eq("hi alice"))
            .times(1)
            .return_const(());
        let mut session = authenticated_session(output).await;

        let flow = session.handle_user_line("hello world").await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.writer, b"MSG FROM Alice_Wonder IS hello world\r\n");
        // plain chat does not block input on this variant
        assert!(session.stdin_enabled());

        let flow = session
            .handle_socket_data(b"MSG FROM bob IS hi alice\r\n")
            .await
            .unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    #[tokio::test]
    async fn test_fragmented_frames_are_reassembled() {
        let mut output = MockUserOutput::new();
        output.expect_reply_outcome().return_const(());
        output
            .expect_chat_message()
            .with(eq("bob"), eq("hi there"))
            .times(1)
            .return_const(());
        output
            .expect_chat_message()
            .with(eq("bob"), eq("again"))
            .times(1)
            .return_const(());
        let mut session = authenticated_session(output).await;

        let flow = session.handle_socket_data(b"MSG FROM bob IS hi").await.unwrap();
        assert_eq!(flow, Flow::Continue);
        let flow = session
            .handle_socket_data(b" there\r\nMSG FROM bob IS again\r\n")
            .await
            .unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    #[tokio::test]
    async fn test_malformed_reply_sends_err_and_fails() {
        let mut session = session_with(output_allowing_local_errors());
        session
            .handle_user_line("/auth alice SeCrEt42 Alice_Wonder")
            .await
            .unwrap();
        session.writer.clear();

        let flow = session.handle_socket_data(b"REPLY OK IS\r\n").await.unwrap();

        assert_eq!(flow, Flow::Failure);
        assert!(session.writer.starts_with(b"ERR FROM Alice_Wonder IS "));
        assert!(session.writer.ends_with(b"\r\n"));
    }

    #[tokio::test]
    async fn test_unexpected_reply_is_fatal() {
        let mut output = output_allowing_local_errors();
        output.expect_reply_outcome().return_const(());
        let mut session = authenticated_session(output).await;

        let flow = session
            .handle_socket_data(b"REPLY OK IS surprise\r\n")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Failure);
        assert!(session.writer.starts_with(b"ERR FROM "));
    }

    #[tokio::test]
    async fn test_bye_from_server_ends_cleanly() {
        let mut session = session_with(MockUserOutput::new());

        let flow = session
            .handle_socket_data(b"BYE FROM server\r\n")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Success);
        assert!(session.writer.is_empty());
    }

    #[tokio::test]
    async fn test_err_from_server_fails() {
        let mut output = MockUserOutput::new();
        output
            .expect_error_from_peer()
            .with(eq("server"), eq("out of cheese"))
            .times(1)
            .return_const(());
        let mut session = session_with(output);

        let flow = session
            .handle_socket_data(b"ERR FROM server IS out of cheese\r\n")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Failure);
    }

    #[tokio::test]
    async fn test_reply_timeout_is_fatal() {
        let mut output = output_allowing_local_errors();
        output.expect_reply_outcome().return_const(());
        let mut session = authenticated_session(output).await;
        session.handle_user_line("/join general").await.unwrap();
        assert_eq!(session.writer, b"JOIN general AS Alice_Wonder\r\n");
        assert!(session.timer.is_armed());
        session.writer.clear();

        let flow = session.handle_timer().await.unwrap();

        assert_eq!(flow, Flow::Failure);
        assert!(session.writer.starts_with(b"ERR FROM Alice_Wonder IS "));
    }

    #[tokio::test]
    async fn test_chat_before_auth_is_a_gate_violation() {
        let mut session = session_with(output_allowing_local_errors());

        let flow = session.handle_user_line("hello").await.unwrap();

        assert_eq!(flow, Flow::Failure);
        assert!(session.writer.starts_with(b"ERR FROM unknown IS "));
    }

    #[tokio::test]
    async fn test_unterminated_oversized_buffer_is_fatal() {
        let mut session = session_with(output_allowing_local_errors());

        let flow = session
            .handle_socket_data(&vec![b'a'; MAX_FRAME_LEN])
            .await
            .unwrap();

        assert_eq!(flow, Flow::Failure);
    }

    #[tokio::test]
    async fn test_any_reply_leaves_the_join_phase() {
        let mut output = MockUserOutput::new();
        output.expect_reply_outcome().return_const(());
        let mut session = authenticated_session(output).await;
        session.handle_user_line("/join general").await.unwrap();
        assert_eq!(session.phase, Phase::Join);

        let flow = session
            .handle_socket_data(b"REPLY NOK IS channel is full\r\n")
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.phase, Phase::Open);
        assert!(session.stdin_enabled());
    }

    #[tokio::test]
    async fn test_farewell_sends_bye() {
        let mut output = MockUserOutput::new();
        output.expect_reply_outcome().return_const(());
        let mut session = authenticated_session(output).await;

        let flow = session.farewell().await.unwrap();

        assert_eq!(flow, Flow::Success);
        assert_eq!(session.writer, b"BYE FROM Alice_Wonder\r\n");
    }

    #[tokio::test]
    async fn test_rename_and_help_stay_local() {
        let mut output = MockUserOutput::new();
        output.expect_supported_commands().times(1).return_const(());
        let mut session = session_with(output);

        session.handle_user_line("/rename Fresh_Nick").await.unwrap();
        session.handle_user_line("/help").await.unwrap();

        assert!(session.writer.is_empty());
        assert_eq!(session.display_name, "Fresh_Nick");
    }

    #[tokio::test]
    async fn test_invalid_input_is_reported_locally() {
        let mut output = MockUserOutput::new();
        output.expect_local_error().times(1).return_const(());
        let mut session = session_with(output);

        let flow = session.handle_user_line("/auth too few").await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert!(session.writer.is_empty());
        assert_eq!(session.phase, Phase::Start);
    }
}
