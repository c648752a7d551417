//! Session phases and the per-phase message gates.
//!
//! The phase machine is shared by both transport variants; only the receive
//! gate differs, because CONFIRM and PING exist on the binary variant alone.
//! Phase transitions themselves are driven by the sessions: sending AUTH
//! moves *Start* to *Auth*, sending JOIN moves *Open* to *Join*, and REPLY
//! handling moves *Auth*/*Join* towards *Open*.

use crate::message::MessageKind;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Phase {
    Start,
    Auth,
    Open,
    Join,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Start => "START",
            Phase::Auth => "AUTH",
            Phase::Open => "OPEN",
            Phase::Join => "JOIN",
        }
    }
}

/// May the client originate a message of this kind in this phase?
pub fn may_send(phase: Phase, kind: MessageKind) -> bool {
    match kind {
        // ERR and BYE are legal from any non-terminal phase, and every phase
        // of a live session is non-terminal
        MessageKind::Err | MessageKind::Bye => true,
        // CONFIRM is a delivery acknowledgement, not a semantic message; the
        // obligation to send it is never phase-gated
        MessageKind::Confirm => true,
        MessageKind::Auth => matches!(phase, Phase::Start | Phase::Auth),
        MessageKind::Join | MessageKind::Msg => phase == Phase::Open,
        // server-originated kinds
        MessageKind::Reply | MessageKind::Ping => false,
    }
}

/// May the server send a message of this kind to a client in this phase?
pub fn may_receive(phase: Phase, kind: MessageKind, udp: bool) -> bool {
    match kind {
        MessageKind::Bye | MessageKind::Err => true,
        MessageKind::Confirm => udp,
        MessageKind::Ping => udp && phase != Phase::Start,
        MessageKind::Reply => matches!(phase, Phase::Auth | Phase::Join),
        MessageKind::Msg => matches!(phase, Phase::Open | Phase::Join),
        // client-originated kinds
        MessageKind::Auth | MessageKind::Join => false,
    }
}
