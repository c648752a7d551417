//! Dense set of the 16-bit server message ids the client has already
//! confirmed. One bit per possible id, 8 KiB total, so membership is a
//! single word lookup and the set never needs to grow.

use crate::message_id::MessageId;

const WORDS: usize = (u16::MAX as usize + 1) / u64::BITS as usize;

pub struct SeenIds {
    bits: Box<[u64; WORDS]>,
}

impl Default for SeenIds {
    fn default() -> Self {
        Self::new()
    }
}

impl SeenIds {
    pub fn new() -> SeenIds {
        SeenIds {
            bits: Box::new([0; WORDS]),
        }
    }

    pub fn insert(&mut self, id: MessageId) {
        let index = id.to_raw() as usize;
        self.bits[index / 64] |= 1 << (index % 64);
    }

    pub fn contains(&self, id: MessageId) -> bool {
        let index = id.to_raw() as usize;
        self.bits[index / 64] & (1 << (index % 64)) != 0
    }
}
