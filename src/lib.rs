//! Client-side implementation of the IPK25-CHAT protocol.
//!
//! IPK25-CHAT is a single-session chat protocol with one semantic model and
//! two wire variants:
//!
//! * a **text variant** over TCP: each message is a single CRLF-terminated
//!   ASCII line with a case-insensitive keyword grammar (`AUTH`, `JOIN`,
//!   `MSG`, `ERR`, `BYE`, `REPLY`)
//! * a **binary variant** over UDP: each message is a datagram with a fixed
//!   3-byte header followed by NUL-terminated fields, plus an
//!   acknowledgement / retransmission layer on top of the unreliable
//!   transport
//!
//! ## Binary header
//!
//! All numbers are in network byte order (BE):
//! ```ascii
//! 0: message type (u8)
//!     0x00 CONFIRM    0x01 REPLY    0x02 AUTH    0x03 JOIN
//!     0x04 MSG        0xFD PING     0xFE ERR     0xFF BYE
//! 1: message id (u16) - for CONFIRM this field carries the id being
//!     confirmed; every other message carries its own id here
//! 3: type-specific body, variable-length fields NUL-terminated
//! ```
//!
//! ## Session phases
//!
//! The session moves through the phases *Start* -> *Auth* -> *Open*
//! (-> *Join* -> *Open* on channel changes). Which message types may travel
//! in which direction is gated per phase; a violation of the gate is a
//! protocol error that terminates the session.
//!
//! ## UDP reliability
//!
//! The client keeps at most one message in flight. An outgoing message is
//! retransmitted verbatim on a timer until the server confirms its id or the
//! retransmission budget is exhausted. Every inbound non-CONFIRM message is
//! confirmed back to the server, duplicates included; duplicate ids are
//! suppressed from user-visible output. After authentication the server
//! answers from a dynamically assigned port, and the first accepted REPLY
//! rebinds all subsequent traffic to that source address.

pub mod args;
pub mod bin_codec;
pub mod fields;
pub mod fsm;
pub mod message;
pub mod message_id;
pub mod output;
pub mod seen_ids;
pub mod send_socket;
pub mod session;
pub mod tcp_session;
pub mod text_codec;
pub mod timer;
pub mod udp_session;
pub mod user_input;
