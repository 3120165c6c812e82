//! Property tests for framing, read selection and block streaming.

mod common;

use busbridge::assembler::FrameAssembler;
use busbridge::bus::{BusController, BusRequest, BusStatus, BusTarget, Direction};
use busbridge::{Command, MemoryTarget};
use common::{Harness, config, counting_memory};
use proptest::prelude::*;

/// Acks reads immediately with a fixed word.
struct Constant(u32);

impl BusTarget for Constant {
    fn cycle(&mut self, _req: &BusRequest) -> BusStatus {
        BusStatus::Ack(self.0)
    }
}

fn housekeeping_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        any::<u32>().prop_map(Command::data_set),
        any::<u32>().prop_map(Command::aux_csr),
        Just(Command::DataGet),
        Just(Command::Sync),
        (0u8..2, any::<u16>(), any::<bool>()).prop_map(|(target, address, read)| {
            Command::RegAccess {
                address,
                target,
                read,
            }
        }),
        (6u8..16, any::<u32>()).prop_map(|(opcode, payload)| Command::Unknown { opcode, payload }),
    ]
}

proptest! {
    /// A frame comes out for every fifth byte, carrying that group's opcode
    /// nibble and big-endian payload.
    #[test]
    fn framing_follows_five_byte_groups(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let mut asm = FrameAssembler::new();
        let mut frames = vec![];
        for (i, &b) in bytes.iter().enumerate() {
            frames.extend(asm.tick(Some(b)).map(|f| (i, f)));
        }
        frames.extend(asm.tick(None).map(|f| (bytes.len(), f)));

        prop_assert_eq!(frames.len(), bytes.len() / 5);
        for (n, (seen_at, frame)) in frames.into_iter().enumerate() {
            let group = &bytes[n * 5..n * 5 + 5];
            prop_assert_eq!(seen_at, n * 5 + 5);
            prop_assert_eq!(frame.opcode, group[0] >> 4);
            prop_assert_eq!(
                frame.payload,
                u32::from_be_bytes([group[1], group[2], group[3], group[4]])
            );
        }
        prop_assert_eq!(asm.position(), bytes.len() % 5);
    }

    /// Reads return the selected target's data whatever the others hold.
    #[test]
    fn read_selects_exactly_one_target(
        values in proptest::collection::vec(any::<u32>(), 1..=16),
        pick in any::<prop::sample::Index>(),
        address in any::<u16>(),
    ) {
        let index = pick.index(values.len());
        let mut targets: Vec<Constant> = values.iter().copied().map(Constant).collect();
        let mut bus = BusController::new(values.len());
        bus.arm(address, index as u8, Direction::Read);
        let done = bus.step(&mut targets).unwrap();
        prop_assert_eq!(done.data, values[index]);
        prop_assert_eq!(done.target, index);
        prop_assert_eq!(bus.selection().select.count_ones(), 1);
    }

    /// SYNC answers with the magic whatever came before it.
    #[test]
    fn sync_after_arbitrary_history(history in proptest::collection::vec(housekeeping_command(), 0..12)) {
        let mut h = Harness::new(
            config(2),
            vec![MemoryTarget::new("a", 64, 0), MemoryTarget::new("b", 64, 0)],
        );
        for cmd in &history {
            h.send(&[*cmd]);
            h.idle(6);
        }
        h.settle(200);
        h.take_bytes();

        h.send(&[Command::Sync]);
        h.idle(10);
        prop_assert_eq!(h.take_responses(), vec![vec![0xca, 0xfe, 0xba, 0xbe]]);
    }

    /// One REG_ACCESS read plus BLOCK_SETUP(k) streams k + 1 consecutive words.
    #[test]
    fn block_streams_k_plus_one_words(
        start in 0u16..200,
        k in 0u16..40,
        latency in 0u32..12,
        consumer_gap in 1usize..4,
    ) {
        let mut h = Harness::new(config(1), vec![counting_memory("m", 256, 0x5000, latency)]);
        h.send(&[Command::reg_read(0, start), Command::block_setup(k, true)]);
        for t in 0..20_000 {
            if h.bridge.is_idle() {
                break;
            }
            h.tick(None, t % consumer_gap == 0);
        }
        prop_assert!(h.bridge.is_idle());

        let words: Vec<u32> = h
            .take_responses()
            .into_iter()
            .map(|r| u32::from_be_bytes(r.try_into().unwrap()))
            .collect();
        let expected: Vec<u32> = (0..=k as u32).map(|i| 0x5000 + start as u32 + i).collect();
        prop_assert_eq!(words, expected);
    }
}
