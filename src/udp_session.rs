//! Session driver and reliability engine for the binary variant (UDP).
//!
//! The engine keeps at most one message in flight. Sending stores the
//! encoded datagram and arms the confirm timer; expiries resend the stored
//! bytes verbatim until the budget runs out. What a timer expiry or a
//! CONFIRM *means* is fully determined by the current [`WaitState`] variant,
//! which also drives the suspension of standard input: the user can only
//! type while the engine is idle.
//!
//! The server answers from a dynamically assigned port once a session is
//! authenticated; the first accepted REPLY rebinds all subsequent traffic
//! to its source address.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::bin_codec::{Datagram, DatagramBody, MAX_DATAGRAM_LEN};
use crate::fsm::{self, Phase};
use crate::message::MessageKind;
use crate::message_id::MessageId;
use crate::output::UserOutput;
use crate::seen_ids::SeenIds;
use crate::send_socket::SendSocket;
use crate::session::{stdin_lines, Flow, REPLY_TIMEOUT};
use crate::timer::{self, OneShotTimer};
use crate::user_input::{self, UserCommand};

pub struct UdpConfig {
    pub confirm_timeout: Duration,
    pub max_retransmissions: u8,
}

/// The encoded form of the one message currently in flight, kept verbatim so
/// retransmissions repeat the exact bytes (same id included).
struct Outstanding {
    id: MessageId,
    kind: MessageKind,
    bytes: Vec<u8>,
}

/// The single wait condition the session can be in. The timer is armed
/// exactly while this is not `Idle`, and the variant determines what an
/// expiry or a CONFIRM means.
enum WaitState {
    Idle,
    AwaitingConfirm(Outstanding),
    AwaitingReply { request: MessageKind },
    AwaitingByeConfirm(Outstanding),
}

pub struct UdpSession {
    send_socket: Arc<dyn SendSocket>,
    peer_addr: SocketAddr,
    /// set once the server's dynamically assigned port is known
    rebound: bool,
    config: UdpConfig,
    phase: Phase,
    display_name: String,
    next_id: MessageId,
    wait: WaitState,
    remaining_retransmissions: u8,
    seen_server_ids: SeenIds,
    timer: OneShotTimer,
    output: Arc<dyn UserOutput>,
}

impl UdpSession {
    pub fn new(
        send_socket: Arc<dyn SendSocket>,
        peer_addr: SocketAddr,
        config: UdpConfig,
        output: Arc<dyn UserOutput>,
    ) -> UdpSession {
        let remaining_retransmissions = config.max_retransmissions;
        UdpSession {
            send_socket,
            peer_addr,
            rebound: false,
            config,
            phase: Phase::Start,
            display_name: "unknown".to_owned(),
            next_id: MessageId::ZERO,
            wait: WaitState::Idle,
            remaining_retransmissions,
            seen_server_ids: SeenIds::new(),
            timer: OneShotTimer::new(),
            output,
        }
    }

    pub fn stdin_enabled(&self) -> bool {
        matches!(self.wait, WaitState::Idle)
    }

    /// True once the farewell BYE is on the wire; the loop stops watching
    /// for further shutdown triggers then.
    pub fn shutting_down(&self) -> bool {
        matches!(self.wait, WaitState::AwaitingByeConfirm(_))
    }

    fn encode(id: MessageId, body: DatagramBody) -> (MessageId, MessageKind, Vec<u8>) {
        let datagram = Datagram { id, body };
        let mut buf = BytesMut::new();
        datagram.ser(&mut buf);
        (datagram.id, datagram.kind(), buf.to_vec())
    }

    /// Send a message under the delivery-confirmation discipline: stdin is
    /// suspended and the encoded bytes are kept for retransmission until the
    /// server confirms the id.
    async fn send_reliable(&mut self, body: DatagramBody) -> anyhow::Result<()> {
        let (id, kind, bytes) = Self::encode(self.next_id, body);
        debug!("sending {} message {} to {:?}", kind.name(), id, self.peer_addr);
        self.send_socket.do_send_datagram(self.peer_addr, &bytes).await?;
        self.remaining_retransmissions = self.config.max_retransmissions;
        self.timer.arm(self.config.confirm_timeout);
        self.wait = WaitState::AwaitingConfirm(Outstanding { id, kind, bytes });
        Ok(())
    }

    /// Acknowledge an inbound message. Sent even for duplicates; the id is
    /// recorded so duplicate content is not re-delivered to the user.
    async fn send_confirm(&mut self, ref_id: MessageId) -> anyhow::Result<()> {
        let (_, _, bytes) = Self::encode(ref_id, DatagramBody::Confirm);
        trace!("confirming server message {}", ref_id);
        self.send_socket.do_send_datagram(self.peer_addr, &bytes).await?;
        self.seen_server_ids.insert(ref_id);
        Ok(())
    }

    /// Report a fatal protocol error locally and send an ERR to the peer.
    /// The ERR itself travels under the confirmation discipline; the session
    /// ends with failure once it is confirmed (or the budget runs out).
    async fn protocol_violation(&mut self, diagnostic: &str) -> anyhow::Result<Flow> {
        warn!("protocol violation: {}", diagnostic);
        self.output.local_error(diagnostic);
        let err = DatagramBody::Err {
            display_name: self.display_name.clone(),
            content: diagnostic.to_owned(),
        };
        self.send_reliable(err).await?;
        Ok(Flow::Continue)
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
                self.send_reliable(DatagramBody::Auth {
                    username,
                    display_name,
                    secret,
                })
                .await?;
                if self.phase == Phase::Start {
                    self.phase = Phase::Auth;
                }
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
                self.send_reliable(DatagramBody::Join {
                    channel_id,
                    display_name: self.display_name.clone(),
                })
                .await?;
                self.phase = Phase::Join;
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
                self.send_reliable(DatagramBody::Msg {
                    display_name: self.display_name.clone(),
                    content,
                })
                .await?;
                Ok(Flow::Continue)
            }
        }
    }

    pub async fn handle_datagram(&mut self, raw: &[u8], from: SocketAddr) -> anyhow::Result<Flow> {
        let datagram = match Datagram::deser(raw) {
            Ok(datagram) => datagram,
            Err(e) => {
                return self
                    .protocol_violation(&format!(
                        "received a malformed message from the server: {}",
                        e
                    ))
                    .await;
            }
        };
        trace!("received {} message {} from {:?}", datagram.kind().name(), datagram.id, from);

        if !fsm::may_receive(self.phase, datagram.kind(), true) {
            return self
                .protocol_violation(&format!(
                    "did not expect a {} message in the {} phase",
                    datagram.kind().name(),
                    self.phase.name()
                ))
                .await;
        }

        match datagram.body {
            DatagramBody::Confirm => self.on_confirm(datagram.id).await,
            DatagramBody::Reply {
                positive,
                ref_id,
                content,
            } => self.on_reply(datagram.id, positive, ref_id, &content, from).await,
            DatagramBody::Msg {
                display_name,
                content,
            } => {
                if !self.seen_server_ids.contains(datagram.id) {
                    self.output.chat_message(&display_name, &content);
                }
                self.send_confirm(datagram.id).await?;
                Ok(Flow::Continue)
            }
            DatagramBody::Err {
                display_name,
                content,
            } => {
                self.output.error_from_peer(&display_name, &content);
                self.send_confirm(datagram.id).await?;
                Ok(Flow::Failure)
            }
            DatagramBody::Bye { display_name } => {
                debug!("server ended the session as '{}'", display_name);
                self.send_confirm(datagram.id).await?;
                Ok(Flow::Success)
            }
            DatagramBody::Ping => {
                self.send_confirm(datagram.id).await?;
                Ok(Flow::Continue)
            }
            DatagramBody::Auth { .. } | DatagramBody::Join { .. } => {
                unreachable!("rejected by the receive gate")
            }
        }
    }

    async fn on_confirm(&mut self, id: MessageId) -> anyhow::Result<Flow> {
        match &self.wait {
            WaitState::AwaitingConfirm(outstanding) if outstanding.id == id => {
                let kind = outstanding.kind;
                debug!("{} message {} confirmed", kind.name(), id);
                match kind {
                    MessageKind::Bye => Ok(Flow::Success),
                    MessageKind::Err => Ok(Flow::Failure),
                    MessageKind::Auth | MessageKind::Join => {
                        self.wait = WaitState::AwaitingReply { request: kind };
                        self.remaining_retransmissions = self.config.max_retransmissions;
                        self.next_id = self.next_id.next();
                        self.timer.arm(REPLY_TIMEOUT);
                        Ok(Flow::Continue)
                    }
                    MessageKind::Msg => {
                        self.wait = WaitState::Idle;
                        self.remaining_retransmissions = self.config.max_retransmissions;
                        self.next_id = self.next_id.next();
                        self.timer.disarm();
                        Ok(Flow::Continue)
                    }
                    MessageKind::Confirm | MessageKind::Reply | MessageKind::Ping => {
                        unreachable!("only client-originated messages are kept in flight")
                    }
                }
            }
            WaitState::AwaitingByeConfirm(outstanding) if outstanding.id == id => {
                debug!("BYE confirmed, session over");
                Ok(Flow::Success)
            }
            _ => {
                trace!("ignoring CONFIRM for id {} with nothing matching in flight", id);
                Ok(Flow::Continue)
            }
        }
    }

    async fn on_reply(
        &mut self,
        id: MessageId,
        positive: bool,
        ref_id: MessageId,
        content: &str,
        from: SocketAddr,
    ) -> anyhow::Result<Flow> {
        let accepted =
            matches!(self.wait, WaitState::AwaitingReply { .. }) && ref_id == self.next_id.prev();

        if !accepted {
            trace!("ignoring REPLY referencing id {}, nothing awaited", ref_id);
            self.send_confirm(id).await?;
            return Ok(Flow::Continue);
        }

        if !self.rebound {
            info!("server reassigned the session to {:?}", from);
            self.peer_addr = from;
            self.rebound = true;
        }

        self.timer.disarm();
        if !self.seen_server_ids.contains(id) {
            self.output.reply_outcome(positive, content);
        }
        self.send_confirm(id).await?;

        if self.phase == Phase::Join || positive {
            self.phase = Phase::Open;
        }
        self.wait = WaitState::Idle;
        Ok(Flow::Continue)
    }

    pub async fn handle_timer(&mut self) -> anyhow::Result<Flow> {
        match &self.wait {
            WaitState::AwaitingConfirm(outstanding) | WaitState::AwaitingByeConfirm(outstanding) => {
                if self.remaining_retransmissions == 0 {
                    bail!("exceeded the maximum number of retransmissions");
                }
                debug!(
                    "no CONFIRM for message {} in time, retransmitting ({} attempts left)",
                    outstanding.id, self.remaining_retransmissions
                );
                self.send_socket
                    .do_send_datagram(self.peer_addr, &outstanding.bytes)
                    .await?;
                self.remaining_retransmissions -= 1;
                self.timer.arm(self.config.confirm_timeout);
                Ok(Flow::Continue)
            }
            WaitState::AwaitingReply { .. } => {
                self.timer.disarm();
                self.protocol_violation("waited too long for the server's reply").await
            }
            WaitState::Idle => bail!("timer expired with no pending wait"),
        }
    }

    /// Send the farewell BYE and wait for its confirmation; the session only
    /// ends once the server has acknowledged it or retransmissions run out.
    pub async fn farewell(&mut self) -> anyhow::Result<Flow> {
        debug!("ending the session");
        let (id, kind, bytes) = Self::encode(
            self.next_id,
            DatagramBody::Bye {
                display_name: self.display_name.clone(),
            },
        );
        self.send_socket.do_send_datagram(self.peer_addr, &bytes).await?;
        self.remaining_retransmissions = self.config.max_retransmissions;
        self.timer.arm(self.config.confirm_timeout);
        self.wait = WaitState::AwaitingByeConfirm(Outstanding { id, kind, bytes });
        Ok(Flow::Continue)
    }
}

pub async fn run_udp(
    server_addr: SocketAddr,
    config: UdpConfig,
    output: Arc<dyn UserOutput>,
) -> anyhow::Result<Flow> {
    let socket = Arc::new(
        UdpSocket::bind("0.0.0.0:0")
            .await
            .context("couldn't bind a local UDP socket")?,
    );
    info!("talking to {:?} from {:?}", server_addr, socket.local_addr()?);

    let mut session = UdpSession::new(Arc::new(socket.clone()), server_addr, config, output);
    let mut stdin = stdin_lines();
    let mut recv_buf = vec![0u8; MAX_DATAGRAM_LEN + 1];

    loop {
        let deadline = session.timer.deadline();
        let stdin_enabled = session.stdin_enabled();
        let watching_signals = !session.shutting_down();

        let flow = tokio::select! {
            received = socket.recv_from(&mut recv_buf) => {
                let (len, from) = received.context("couldn't receive a message from the server")?;
                if len > MAX_DATAGRAM_LEN {
                    session.protocol_violation("too long message from the server").await?
                }
                else {
                    session.handle_datagram(&recv_buf[..len], from).await?
                }
            }
            line = stdin.next_line(), if stdin_enabled => {
                match line.context("couldn't read from standard input")? {
                    Some(line) => session.handle_user_line(&line).await?,
                    None => session.farewell().await?,
                }
            }
            _ = timer::expiry(deadline) => session.handle_timer().await?,
            _ = tokio::signal::ctrl_c(), if watching_signals => session.farewell().await?,
        };

        match flow {
            Flow::Continue => {}
            terminal => return Ok(terminal),
        }
    }
}
