//! Tick-level harness shared by the integration tests.
#![allow(dead_code)]

use busbridge::serializer::TxByte;
use busbridge::{Bridge, BridgeConfig, Command, MemoryTarget};

pub struct Harness {
    pub bridge: Bridge,
    pub targets: Vec<MemoryTarget>,
    pub out: Vec<TxByte>,
}

impl Harness {
    pub fn new(config: BridgeConfig, targets: Vec<MemoryTarget>) -> Self {
        Harness {
            bridge: Bridge::new(config).unwrap(),
            targets,
            out: vec![],
        }
    }

    pub fn tick(&mut self, rx: Option<u8>, ready: bool) {
        let out = self.bridge.tick(rx, ready, &mut self.targets);
        self.out.extend(out.tx);
    }

    /// One byte per tick, back to back.
    pub fn send(&mut self, cmds: &[Command]) {
        for cmd in cmds {
            for b in cmd.to_frame().to_bytes().unwrap() {
                self.tick(Some(b), true);
            }
        }
    }

    pub fn idle(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick(None, true);
        }
    }

    /// Idle until nothing is in flight, at most `limit` ticks.
    pub fn settle(&mut self, limit: usize) {
        for _ in 0..limit {
            if self.bridge.is_idle() {
                return;
            }
            self.tick(None, true);
        }
        panic!("bridge did not settle in {} ticks", limit);
    }

    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.out.drain(..).map(|b| b.data).collect()
    }

    /// Split output into responses on the end-of-frame marker.
    pub fn take_responses(&mut self) -> Vec<Vec<u8>> {
        let mut responses = vec![];
        let mut cur = vec![];
        for b in self.out.drain(..) {
            cur.push(b.data);
            if b.last {
                responses.push(std::mem::take(&mut cur));
            }
        }
        assert!(cur.is_empty(), "unterminated response {:02x?}", cur);
        responses
    }
}

pub fn config(targets: usize) -> BridgeConfig {
    BridgeConfig {
        targets,
        block_transfer: true,
        narrow_response: false,
    }
}

/// Memory where word `i` holds `base + i`.
pub fn counting_memory(name: &str, words: u32, base: u32, latency: u32) -> MemoryTarget {
    let mut mem = MemoryTarget::new(name, words * 4, 0).with_latency(latency, 0);
    for i in 0..words {
        mem.poke(i as u16, base.wrapping_add(i));
    }
    mem
}
