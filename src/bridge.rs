//! The bridge controller: one synchronous step function tying together frame
//! assembly, command dispatch, the bus controller, block streaming and the
//! response serializer.

use anyhow::Result;

use crate::assembler::FrameAssembler;
use crate::block::{BlockStreamer, BlockTransferState};
use crate::bus::{BusController, BusTarget, Completion, DataBuffer, DataOrigin, Direction};
use crate::constants::SYNC_MAGIC;
use crate::device::BridgeConfig;
use crate::protocol::Command;
use crate::serializer::{ResponseSerializer, TxByte};

/// What happened on one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutput {
    /// Byte taken by the outbound consumer.
    pub tx: Option<TxByte>,
    /// Command dispatched.
    pub command: Option<Command>,
    /// Bus cycle acknowledged.
    pub completion: Option<Completion>,
}

/// Bridge state. Targets are passed in on every tick; the bridge only ever
/// talks to the selected one.
///
/// Within a tick the order is: outbound byte handoff, bus acknowledge,
/// command dispatch, block streaming. Each stage sees the effects of the
/// ones before it.
#[derive(Debug, Clone)]
pub struct Bridge {
    config: BridgeConfig,
    assembler: FrameAssembler,
    bus: BusController,
    block: BlockStreamer,
    serializer: ResponseSerializer,
    aux: u32,
    ticks: u64,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Bridge {
            config,
            assembler: FrameAssembler::new(),
            bus: BusController::new(config.targets),
            block: BlockStreamer::new(),
            serializer: ResponseSerializer::new(config.response_width()),
            aux: 0,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Auxiliary control/status register.
    pub fn aux(&self) -> u32 {
        self.aux
    }

    pub fn data(&self) -> DataBuffer {
        self.bus.data()
    }

    pub fn bus(&self) -> &BusController {
        &self.bus
    }

    pub fn block_state(&self) -> BlockTransferState {
        self.block.state()
    }

    pub fn serializer(&self) -> &ResponseSerializer {
        &self.serializer
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Nothing in flight: no partial frame, cycle, response or block transfer.
    pub fn is_idle(&self) -> bool {
        self.assembler.is_empty()
            && !self.bus.is_active()
            && !self.serializer.is_draining()
            && !self.block.is_active()
    }

    /// Advance one tick.
    ///
    /// `rx` is an inbound byte, always accepted. `tx_ready` is the outbound
    /// consumer's readiness for the byte currently offered.
    pub fn tick<T: BusTarget>(
        &mut self,
        rx: Option<u8>,
        tx_ready: bool,
        targets: &mut [T],
    ) -> TickOutput {
        self.ticks += 1;
        let draining = self.serializer.is_draining();

        let tx = self.serializer.advance(tx_ready);

        let completion = self.bus.step(targets);
        if let Some(done) = completion {
            if done.direction == Direction::Read && self.block.is_active() {
                self.load_response(done.data);
            }
        }

        let command = self.assembler.tick(rx).map(|frame| Command::from_frame(&frame));
        if let Some(cmd) = command {
            self.dispatch(cmd);
        }

        if self.config.block_transfer && self.block.tick(draining, &mut self.bus) {
            log::trace!(
                "block read @{:#06x}, {} more",
                self.bus.selection().address,
                self.block.state().remaining
            );
        }

        TickOutput {
            tx,
            command,
            completion,
        }
    }

    /// Clear outstanding cycles, block streaming, the aux register and any
    /// partial frame or response. Address, data and selection staging keep
    /// their stale values.
    pub fn reset(&mut self) {
        log::debug!("bridge reset");
        self.assembler.reset();
        self.bus.reset();
        self.block.reset();
        self.serializer.reset();
        self.aux = 0;
    }

    fn dispatch(&mut self, cmd: Command) {
        log::debug!("dispatch {:?}", cmd);
        match cmd {
            Command::Sync => self.load_response(SYNC_MAGIC),
            Command::RegAccess {
                address,
                target,
                read,
            } => self
                .bus
                .arm(address, target, Direction::from_read_flag(read)),
            Command::DataSet { value } => {
                if self.bus.is_active() && self.bus.selection().direction == Direction::Write {
                    log::warn!("write data changed while a write cycle is in flight");
                }
                self.bus.stage(value);
            }
            Command::DataGet => self.load_response(self.bus.data().value),
            Command::AuxCsr { value } => self.aux = value,
            Command::BlockSetup {
                word_count,
                increment,
            } => self.setup_block(word_count, increment),
            Command::Unknown { opcode, payload } => {
                log::debug!("opcode {:#x} (payload {:#010x}) dropped", opcode, payload);
            }
        }
    }

    fn setup_block(&mut self, word_count: u16, increment: bool) {
        if !self.config.block_transfer {
            log::warn!("BLOCK_SETUP ignored, block transfer not built in");
            return;
        }
        self.block.start(word_count, increment);
        if self.bus.is_active() {
            // the acknowledge of the opening read loads the first response
            return;
        }
        // opening read already done, stream what it captured
        let data = self.bus.data();
        if data.origin != DataOrigin::Read || self.bus.selection().direction != Direction::Read {
            log::warn!("BLOCK_SETUP without a preceding REG_ACCESS read");
        }
        self.load_response(data.value);
    }

    fn load_response(&mut self, value: u32) {
        if !self.serializer.load(value) {
            log::warn!("response overwritten before it drained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseWidth;
    use crate::target::MemoryTarget;

    fn config(targets: usize) -> BridgeConfig {
        BridgeConfig {
            targets,
            ..Default::default()
        }
    }

    /// Feed `cmds`, one byte per tick, then idle until quiet; return the bytes
    /// sent back.
    fn run(bridge: &mut Bridge, targets: &mut [MemoryTarget], cmds: &[Command]) -> Vec<u8> {
        let bytes: Vec<u8> = cmds
            .iter()
            .flat_map(|c| c.to_frame().to_bytes().unwrap())
            .collect();
        let mut out = vec![];
        for b in bytes {
            out.extend(bridge.tick(Some(b), true, targets).tx.map(|t| t.data));
        }
        for _ in 0..200 {
            out.extend(bridge.tick(None, true, targets).tx.map(|t| t.data));
        }
        out
    }

    #[test]
    fn sync_answers_magic() {
        let mut bridge = Bridge::new(config(1)).unwrap();
        let mut targets = vec![MemoryTarget::new("m", 16, 0)];
        assert_eq!(
            run(&mut bridge, &mut targets, &[Command::Sync]),
            [0xca, 0xfe, 0xba, 0xbe]
        );
    }

    #[test]
    fn narrow_sync() {
        let cfg = BridgeConfig {
            narrow_response: true,
            ..config(1)
        };
        let mut bridge = Bridge::new(cfg).unwrap();
        assert_eq!(bridge.serializer().width(), ResponseWidth::Narrow);
        let mut targets = vec![MemoryTarget::new("m", 16, 0)];
        assert_eq!(run(&mut bridge, &mut targets, &[Command::Sync]), [0xca, 0xfe]);
    }

    #[test]
    fn aux_register_is_a_side_channel() {
        let mut bridge = Bridge::new(config(1)).unwrap();
        let mut targets = vec![MemoryTarget::new("m", 16, 0)];
        let out = run(&mut bridge, &mut targets, &[Command::aux_csr(0x8000_0001)]);
        assert!(out.is_empty());
        assert_eq!(bridge.aux(), 0x8000_0001);
        assert!(!bridge.bus().is_active());
        bridge.reset();
        assert_eq!(bridge.aux(), 0);
    }

    #[test]
    fn data_set_then_get() {
        let mut bridge = Bridge::new(config(1)).unwrap();
        let mut targets = vec![MemoryTarget::new("m", 16, 0)];
        let out = run(
            &mut bridge,
            &mut targets,
            &[Command::data_set(0x0102_0304), Command::DataGet],
        );
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn unknown_opcode_is_dropped() {
        let mut bridge = Bridge::new(config(1)).unwrap();
        let mut targets = vec![MemoryTarget::new("m", 16, 0)];
        let out = run(
            &mut bridge,
            &mut targets,
            &[Command::Unknown {
                opcode: 0xf,
                payload: 0xffff_ffff,
            }],
        );
        assert!(out.is_empty());
        assert!(bridge.is_idle());
        assert_eq!(bridge.aux(), 0);
    }

    #[test]
    fn block_setup_without_capability_is_ignored() {
        let cfg = BridgeConfig {
            block_transfer: false,
            ..config(1)
        };
        let mut bridge = Bridge::new(cfg).unwrap();
        let mut targets = vec![MemoryTarget::new("m", 16, 7)];
        let out = run(
            &mut bridge,
            &mut targets,
            &[Command::reg_read(0, 0), Command::block_setup(3, true)],
        );
        assert!(out.is_empty());
        assert!(!bridge.block_state().active);
    }

    #[test]
    fn reject_bad_config() {
        assert!(Bridge::new(config(0)).is_err());
        assert!(Bridge::new(config(17)).is_err());
    }
}
