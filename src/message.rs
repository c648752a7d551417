/// Transport-agnostic classification of protocol messages. The phase gates
/// of [`crate::fsm`] and the retransmission bookkeeping of the UDP session
/// operate on this, independent of which codec produced the message.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MessageKind {
    Confirm,
    Reply,
    Auth,
    Join,
    Msg,
    Ping,
    Err,
    Bye,
}

impl MessageKind {
    /// Protocol-level name, for diagnostics sent to the peer.
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Confirm => "CONFIRM",
            MessageKind::Reply => "REPLY",
            MessageKind::Auth => "AUTH",
            MessageKind::Join => "JOIN",
            MessageKind::Msg => "MSG",
            MessageKind::Ping => "PING",
            MessageKind::Err => "ERR",
            MessageKind::Bye => "BYE",
        }
    }
}
