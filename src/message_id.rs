use std::fmt::{Display, Formatter};

/// 16-bit message id as carried in the binary header. Ids are assigned from
/// a per-session monotonic counter starting at 0.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct MessageId(u16);

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MessageId {
    pub const ZERO: MessageId = MessageId(0);

    pub fn from_raw(value: u16) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u16 {
        self.0
    }

    /// The id assigned to the next outgoing message. Wraps at the u16
    /// boundary - a session would need 65536 acknowledged messages to get
    /// there.
    pub fn next(&self) -> MessageId {
        MessageId(self.0.wrapping_add(1))
    }

    /// The id the most recent fully acknowledged request was sent with.
    pub fn prev(&self) -> MessageId {
        MessageId(self.0.wrapping_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::zero(0, 1)]
    #[case::mid(17, 18)]
    #[case::wrap(u16::MAX, 0)]
    fn test_next(#[case] raw: u16, #[case] expected: u16) {
        assert_eq!(MessageId::from_raw(raw).next(), MessageId::from_raw(expected));
    }

    #[rstest]
    #[case::one(1, 0)]
    #[case::mid(18, 17)]
    #[case::wrap(0, u16::MAX)]
    fn test_prev(#[case] raw: u16, #[case] expected: u16) {
        assert_eq!(MessageId::from_raw(raw).prev(), MessageId::from_raw(expected));
    }
}
