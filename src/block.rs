//! Block streaming: chains reads off the end of each response.

use crate::bus::BusController;

/// Progress of a block transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BlockTransferState {
    pub active: bool,
    /// Reads still to launch after the one in flight.
    pub remaining: u16,
    pub increment: bool,
}

/// Launches the next read of a block transfer each time a response finishes
/// draining.
#[derive(Debug, Clone, Default)]
pub struct BlockStreamer {
    state: BlockTransferState,
    /// Serializer draining flag, as of the previous tick.
    was_draining: bool,
}

impl BlockStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BlockTransferState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn start(&mut self, word_count: u16, increment: bool) {
        if self.state.active {
            log::warn!(
                "block transfer restarted with {} reads outstanding",
                self.state.remaining
            );
        }
        self.state = BlockTransferState {
            active: true,
            remaining: word_count,
            increment,
        };
    }

    /// Sample the serializer's draining flag for this tick. On the tick after
    /// a response finished, either re-arm the next read or end the transfer.
    ///
    /// Returns `true` when a read was launched.
    pub fn tick(&mut self, draining: bool, bus: &mut BusController) -> bool {
        let falling = self.was_draining && !draining;
        self.was_draining = draining;
        if !(falling && self.state.active) {
            return false;
        }

        if self.state.remaining == 0 {
            log::debug!("block transfer complete");
            self.state.active = false;
            return false;
        }
        self.state.remaining -= 1;
        let address = bus
            .selection()
            .address
            .wrapping_add(self.state.increment as u16);
        bus.rearm_saved(address);
        true
    }

    pub fn reset(&mut self) {
        self.state.active = false;
        self.was_draining = false;
    }
}
