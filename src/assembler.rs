//! Inbound byte stream to command frames.

use crate::constants::FRAME_SIZE;
use crate::protocol::CommandFrame;

/// Accumulates inbound bytes into 5-byte command frames.
///
/// The assembler is always ready: every offered byte is taken. A frame
/// completed on tick `t` becomes visible on tick `t + 1`, exactly once.
#[derive(Debug, Clone, Default)]
pub struct FrameAssembler {
    buf: [u8; FRAME_SIZE],
    /// Position of the next byte within the frame, modulo 5.
    pos: usize,
    /// Frame completed on the previous tick.
    ready: Option<CommandFrame>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one tick. Returns the frame completed on the *previous* tick,
    /// if any, and accepts `byte` if one is offered.
    pub fn tick(&mut self, byte: Option<u8>) -> Option<CommandFrame> {
        let completed = self.ready.take();
        if let Some(byte) = byte {
            self.buf[self.pos] = byte;
            if self.pos == FRAME_SIZE - 1 {
                self.pos = 0;
                self.ready = Some(CommandFrame::from_bytes(&self.buf));
            } else {
                self.pos += 1;
            }
        }
        completed
    }

    /// Bytes accepted since the last frame boundary.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// No partial frame and no completed frame waiting to be observed.
    pub fn is_empty(&self) -> bool {
        self.pos == 0 && self.ready.is_none()
    }

    /// Discards any partial frame, and any completed frame not yet observed.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.ready = None;
    }
}
