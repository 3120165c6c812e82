//! In-process transport: a simulated bridge with memory targets behind it,
//! stepped one tick at a time.
use std::collections::VecDeque;

use anyhow::Result;

use super::Transport;
use crate::bridge::Bridge;
use crate::constants::DEFAULT_RESPONSE_TIMEOUT_TICKS;
use crate::device::{LinkSpec, Profile};
use crate::serializer::TxByte;
use crate::target::MemoryTarget;

pub struct SimTransport {
    bridge: Bridge,
    targets: Vec<MemoryTarget>,
    link: LinkSpec,
    /// Bytes the bridge sent that the host has not read yet.
    outbound: VecDeque<TxByte>,
    timeout_ticks: u64,
    stall_left: u32,
}

impl SimTransport {
    pub fn new(bridge: Bridge, targets: Vec<MemoryTarget>) -> Self {
        SimTransport {
            bridge,
            targets,
            link: LinkSpec::default(),
            outbound: VecDeque::new(),
            timeout_ticks: DEFAULT_RESPONSE_TIMEOUT_TICKS,
            stall_left: 0,
        }
    }

    pub fn from_profile(profile: &Profile) -> Result<Self> {
        let bridge = Bridge::new(profile.bridge)?;
        let targets = profile.targets.iter().map(MemoryTarget::from_spec).collect();
        log::info!("Simulating bridge profile {}", profile);
        Ok(SimTransport::new(bridge, targets).with_link(profile.link))
    }

    pub fn with_link(mut self, link: LinkSpec) -> Self {
        self.link = link;
        self.stall_left = link.tx_stall;
        self
    }

    pub fn with_timeout(mut self, ticks: u64) -> Self {
        self.timeout_ticks = ticks;
        self
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn targets(&self) -> &[MemoryTarget] {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut [MemoryTarget] {
        &mut self.targets
    }

    /// Reset the bridge, dropping anything it had queued for the host.
    pub fn reset(&mut self) {
        self.bridge.reset();
        self.outbound.clear();
        self.stall_left = self.link.tx_stall;
    }

    /// Run idle ticks.
    pub fn idle(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step(None);
        }
    }

    fn step(&mut self, rx: Option<u8>) {
        let offered = self.bridge.serializer().is_draining();
        let ready = self.stall_left == 0;
        if offered && !ready {
            self.stall_left -= 1;
        }
        let out = self.bridge.tick(rx, ready, &mut self.targets);
        if let Some(byte) = out.tx {
            self.outbound.push_back(byte);
            self.stall_left = self.link.tx_stall;
        }
    }
}

impl Transport for SimTransport {
    fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        for &byte in raw {
            self.step(Some(byte));
            self.idle(self.link.byte_gap as u64);
        }
        Ok(())
    }

    fn recv_raw(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut waited = 0;
        while self.outbound.len() < len {
            anyhow::ensure!(
                waited < self.timeout_ticks,
                "no response from bridge after {} ticks",
                waited
            );
            self.step(None);
            waited += 1;
        }
        let bytes: Vec<TxByte> = self.outbound.drain(..len).collect();
        let framed = bytes
            .iter()
            .enumerate()
            .all(|(i, b)| b.last == (i == len - 1));
        anyhow::ensure!(framed, "response framing mismatch");
        Ok(bytes.into_iter().map(|b| b.data).collect())
    }

    /// Tick until the bridge has nothing in flight.
    fn flush(&mut self) -> Result<()> {
        let mut waited = 0;
        while !self.bridge.is_idle() {
            anyhow::ensure!(
                waited < self.timeout_ticks,
                "bridge still busy after {} ticks",
                waited
            );
            self.step(None);
            waited += 1;
        }
        Ok(())
    }
}
