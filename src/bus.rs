//! The register-mapped bus side of the bridge.
//!
//! Targets are external: anything implementing [`BusTarget`] can sit behind
//! the bridge. The controller runs at most one cycle at a time and talks to
//! exactly one target per cycle, chosen by its one-hot selection.

/// Transfer direction of a bus cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    #[default]
    Write,
    Read,
}

impl Direction {
    pub const fn from_read_flag(read: bool) -> Self {
        if read { Direction::Read } else { Direction::Write }
    }
}

/// What the bridge presents to the selected target while a cycle is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusRequest {
    pub address: u16,
    pub direction: Direction,
    /// Write data. Meaningless for reads.
    pub data: u32,
    /// Changes every time a cycle is armed, so back-to-back cycles with the
    /// same address and data stay distinguishable.
    pub seq: u32,
}

/// Target reply for one tick of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusStatus {
    /// Cycle done. Carries read data; targets return 0 for writes.
    Ack(u32),
    /// Not acknowledged yet.
    Wait,
}

/// A device on the bus.
///
/// `cycle` is called once per tick for as long as the cycle stays active and
/// this target is selected. The same request is presented on every one of
/// those ticks.
pub trait BusTarget {
    fn cycle(&mut self, req: &BusRequest) -> BusStatus;
}

impl<T: BusTarget + ?Sized> BusTarget for Box<T> {
    fn cycle(&mut self, req: &BusRequest) -> BusStatus {
        (**self).cycle(req)
    }
}

/// Target address, one-hot target enable and direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BusSelection {
    pub address: u16,
    /// At most one bit set. Zero when the requested index was out of range.
    pub select: u32,
    pub direction: Direction,
}

impl BusSelection {
    pub fn new(address: u16, target: u8, targets: usize, direction: Direction) -> Self {
        BusSelection {
            address,
            select: one_hot(target, targets),
            direction,
        }
    }

    /// Index of the enabled target, if any.
    pub fn index(&self) -> Option<usize> {
        debug_assert!(self.select.count_ones() <= 1, "selection must be one-hot");
        (self.select != 0).then(|| self.select.trailing_zeros() as usize)
    }
}

/// One-hot enable for `target`, or 0 when it does not exist.
pub fn one_hot(target: u8, targets: usize) -> u32 {
    if (target as usize) < targets {
        1u32.checked_shl(target as u32).unwrap_or(0)
    } else {
        0
    }
}

/// Which operation last wrote the data buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DataOrigin {
    /// Staged by DATA_SET, waiting for a write cycle.
    #[default]
    Staged,
    /// Captured from a completed read cycle.
    Read,
}

/// The shared data staging register, tagged with where its value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DataBuffer {
    pub value: u32,
    pub origin: DataOrigin,
}

/// A cycle that was acknowledged on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Completion {
    pub address: u16,
    pub target: usize,
    pub direction: Direction,
    /// Captured read data, 0 for writes.
    pub data: u32,
}

/// Runs bus cycles, one at a time, on behalf of the dispatcher and the block
/// streaming automaton.
#[derive(Debug, Clone)]
pub struct BusController {
    targets: usize,
    selection: BusSelection,
    /// Selection of the last REG_ACCESS, reused by block streaming.
    saved_select: u32,
    data: DataBuffer,
    cycle_active: bool,
    seq: u32,
}

impl BusController {
    pub fn new(targets: usize) -> Self {
        BusController {
            targets,
            selection: BusSelection::default(),
            saved_select: 0,
            data: DataBuffer::default(),
            cycle_active: false,
            seq: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.cycle_active
    }

    pub fn selection(&self) -> &BusSelection {
        &self.selection
    }

    pub fn saved_select(&self) -> u32 {
        self.saved_select
    }

    pub fn data(&self) -> DataBuffer {
        self.data
    }

    /// Stage write data for the next write cycle.
    pub fn stage(&mut self, value: u32) {
        self.data = DataBuffer {
            value,
            origin: DataOrigin::Staged,
        };
    }

    /// Select a target and arm a cycle on it.
    ///
    /// An in-flight cycle is not queued behind: its selection is replaced and
    /// the new request runs in its place.
    pub fn arm(&mut self, address: u16, target: u8, direction: Direction) {
        if self.cycle_active {
            log::warn!(
                "bus cycle on {:?} replaced before acknowledge",
                self.selection
            );
        }
        self.selection = BusSelection::new(address, target, self.targets, direction);
        self.saved_select = self.selection.select;
        if self.selection.index().is_none() {
            log::warn!(
                "target index {} out of range ({} targets), cycle will never complete",
                target,
                self.targets
            );
        }
        self.seq = self.seq.wrapping_add(1);
        self.cycle_active = true;
    }

    /// Re-arm a read on the saved selection at `address`.
    pub fn rearm_saved(&mut self, address: u16) {
        self.selection = BusSelection {
            address,
            select: self.saved_select,
            direction: Direction::Read,
        };
        self.seq = self.seq.wrapping_add(1);
        self.cycle_active = true;
    }

    /// Present the active cycle to the selected target for one tick.
    ///
    /// On acknowledge the cycle ends and read data lands in the data buffer.
    pub fn step<T: BusTarget>(&mut self, targets: &mut [T]) -> Option<Completion> {
        if !self.cycle_active {
            return None;
        }
        let index = self.selection.index()?;
        let target = targets.get_mut(index)?;
        let req = BusRequest {
            address: self.selection.address,
            direction: self.selection.direction,
            data: self.data.value,
            seq: self.seq,
        };
        let BusStatus::Ack(read_data) = target.cycle(&req) else {
            return None;
        };

        self.cycle_active = false;
        let data = match req.direction {
            Direction::Read => {
                self.data = DataBuffer {
                    value: read_data,
                    origin: DataOrigin::Read,
                };
                read_data
            }
            Direction::Write => 0,
        };
        log::trace!(
            "bus {:?} target#{} @{:#06x} = {:#010x}",
            req.direction,
            index,
            req.address,
            if req.direction == Direction::Read { data } else { req.data }
        );
        Some(Completion {
            address: req.address,
            target: index,
            direction: req.direction,
            data,
        })
    }

    /// Drop any outstanding cycle. Staging registers keep their values.
    pub fn reset(&mut self) {
        self.cycle_active = false;
    }
}
