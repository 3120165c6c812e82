//! Response values to outbound bytes.

use crate::protocol::ResponseWidth;

/// One outbound byte, as offered to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxByte {
    pub data: u8,
    /// End-of-response marker, set on the final byte.
    pub last: bool,
}

/// Streams a loaded response value out MSB first, one byte per accepted tick.
#[derive(Debug, Clone, Default)]
pub struct ResponseSerializer {
    width: ResponseWidth,
    pending: u32,
    /// Bytes still to send. 0 means idle.
    remaining: u8,
}

impl ResponseSerializer {
    pub fn new(width: ResponseWidth) -> Self {
        ResponseSerializer {
            width,
            pending: 0,
            remaining: 0,
        }
    }

    /// The byte currently offered to the consumer.
    pub fn offer(&self) -> Option<TxByte> {
        (self.remaining != 0).then(|| TxByte {
            data: (self.pending >> 24) as u8,
            last: self.remaining == 1,
        })
    }

    /// Hand the offered byte over if the consumer is `ready`.
    ///
    /// Nothing moves while the consumer stalls.
    pub fn advance(&mut self, ready: bool) -> Option<TxByte> {
        let byte = self.offer().filter(|_| ready)?;
        self.pending <<= 8;
        self.remaining -= 1;
        Some(byte)
    }

    /// Start sending `value`. Returns `false` when this clobbered a response
    /// that had not drained yet.
    pub fn load(&mut self, value: u32) -> bool {
        let clean = self.remaining == 0;
        self.pending = value;
        self.remaining = self.width.bytes();
        clean
    }

    pub fn is_draining(&self) -> bool {
        self.remaining != 0
    }

    pub fn remaining(&self) -> u8 {
        self.remaining
    }

    /// Unsent bytes, left-aligned.
    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn width(&self) -> ResponseWidth {
        self.width
    }

    pub fn reset(&mut self) {
        self.remaining = 0;
    }
}
