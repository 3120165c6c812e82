//! Simulated bus targets.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bus::{BusRequest, BusStatus, BusTarget, Direction};
use crate::device::TargetSpec;

/// Word-addressed memory that acknowledges after a configurable delay.
///
/// Writes are echoed back by later reads. Addresses past the end read as
/// zero and swallow writes.
#[derive(Debug, Clone)]
pub struct MemoryTarget {
    name: String,
    words: Vec<u32>,
    latency: u32,
    jitter: u32,
    rng: StdRng,
    /// Cycle being timed, and ticks left before acknowledge.
    pending: Option<(BusRequest, u32)>,
}

impl MemoryTarget {
    pub fn new(name: impl Into<String>, size: u32, fill: u32) -> Self {
        MemoryTarget {
            name: name.into(),
            words: vec![fill; size.div_ceil(4) as usize],
            latency: 0,
            jitter: 0,
            rng: StdRng::from_os_rng(),
            pending: None,
        }
    }

    pub fn from_spec(spec: &TargetSpec) -> Self {
        MemoryTarget::new(spec.name.clone(), spec.size, spec.fill)
            .with_latency(spec.latency, spec.jitter)
    }

    pub fn with_latency(mut self, latency: u32, jitter: u32) -> Self {
        self.latency = latency;
        self.jitter = jitter;
        self
    }

    /// Make jitter reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn peek(&self, address: u16) -> u32 {
        self.words.get(address as usize).copied().unwrap_or(0)
    }

    pub fn poke(&mut self, address: u16, value: u32) {
        if let Some(word) = self.words.get_mut(address as usize) {
            *word = value;
        }
    }

    fn access(&mut self, req: &BusRequest) -> u32 {
        match req.direction {
            Direction::Read => self.peek(req.address),
            Direction::Write => {
                if (req.address as usize) >= self.words.len() {
                    log::debug!("{}: write past end @{:#06x} ignored", self.name, req.address);
                }
                self.poke(req.address, req.data);
                0
            }
        }
    }
}

impl BusTarget for MemoryTarget {
    fn cycle(&mut self, req: &BusRequest) -> BusStatus {
        let left = match self.pending {
            Some((timed, left)) if timed == *req => left,
            _ => {
                let extra = if self.jitter > 0 {
                    self.rng.random_range(0..=self.jitter)
                } else {
                    0
                };
                self.latency + extra
            }
        };
        if left == 0 {
            self.pending = None;
            BusStatus::Ack(self.access(req))
        } else {
            self.pending = Some((*req, left - 1));
            BusStatus::Wait
        }
    }
}
