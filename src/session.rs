//! Host-side bridge session: register access, aux writes and block transfers
//! built from the bridge's command set.

use anyhow::Result;

use crate::constants::SYNC_MAGIC;
use crate::device::{BridgeConfig, Profile};
use crate::protocol::{Command, ResponseWidth};
use crate::transport::{Baudrate, SerialTransport, SimTransport, Transport};

/// Longest block a single BLOCK_SETUP can stream.
pub const MAX_BLOCK_WORDS: usize = u16::MAX as usize + 1;

pub struct Session<T: Transport> {
    transport: T,
    config: BridgeConfig,
}

impl Session<SimTransport> {
    pub fn new_simulated(profile: &Profile) -> Result<Self> {
        let transport = SimTransport::from_profile(profile)?;
        Session::new(transport, profile.bridge)
    }
}

impl Session<SerialTransport> {
    /// Open a bridge on `port`, or the first serial port found.
    ///
    /// The bridge cannot describe itself, so `config` must match how it was
    /// built.
    pub fn new_from_serial(
        port: Option<&str>,
        baudrate: Baudrate,
        config: BridgeConfig,
    ) -> Result<Self> {
        let transport = match port {
            Some(port) => SerialTransport::open(port, baudrate)?,
            None => SerialTransport::open_any(baudrate)?,
        };
        Session::new(transport, config)
    }
}

impl<T: Transport> Session<T> {
    /// Wrap a transport and check the bridge answers SYNC.
    pub fn new(transport: T, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let mut session = Session { transport, config };
        session.sync()?;
        log::debug!("bridge in sync: {}", session.config);
        Ok(session)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn width(&self) -> ResponseWidth {
        self.config.response_width()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn dump_info(&self) -> Result<()> {
        log::info!("Bridge: {}", self.config);
        log::info!(
            "Response width: {} bytes{}",
            self.width().bytes(),
            if self.width() == ResponseWidth::Narrow {
                " (reads return the upper 16 bits only)"
            } else {
                ""
            }
        );
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        let resp = self.transport.transfer(Command::Sync, self.width())?;
        let expected = self.width().truncate(SYNC_MAGIC);
        anyhow::ensure!(
            resp.value == expected,
            "sync failed, expected {:#010x}, got {:?}",
            expected,
            resp
        );
        Ok(())
    }

    pub fn write(&mut self, target: u8, address: u16, value: u32) -> Result<()> {
        self.check_target(target)?;
        self.transport.send(Command::data_set(value))?;
        self.transport.send(Command::reg_write(target, address))?;
        Ok(())
    }

    /// Read one register. In narrow mode the low 16 bits are always zero.
    pub fn read(&mut self, target: u8, address: u16) -> Result<u32> {
        self.check_target(target)?;
        self.transport.send(Command::reg_read(target, address))?;
        let resp = self.transport.transfer(Command::DataGet, self.width())?;
        Ok(resp.value)
    }

    pub fn set_aux(&mut self, value: u32) -> Result<()> {
        self.transport.send(Command::aux_csr(value))?;
        self.transport.flush()
    }

    pub fn read_block(
        &mut self,
        target: u8,
        address: u16,
        count: usize,
        increment: bool,
    ) -> Result<Vec<u32>> {
        self.read_block_with(target, address, count, increment, |_| ())
    }

    /// Stream `count` words with one REG_ACCESS and one BLOCK_SETUP.
    /// `progress` is called with the number of words received so far.
    pub fn read_block_with(
        &mut self,
        target: u8,
        address: u16,
        count: usize,
        increment: bool,
        mut progress: impl FnMut(usize),
    ) -> Result<Vec<u32>> {
        anyhow::ensure!(
            self.config.block_transfer,
            "bridge is built without block transfer"
        );
        anyhow::ensure!(
            (1..=MAX_BLOCK_WORDS).contains(&count),
            "block length must be within 1..={}, got {}",
            MAX_BLOCK_WORDS,
            count
        );
        self.check_target(target)?;
        if increment {
            check_span(address, count)?;
        }

        self.transport.send(Command::reg_read(target, address))?;
        self.transport
            .send(Command::block_setup((count - 1) as u16, increment))?;
        let mut words = Vec::with_capacity(count);
        for i in 0..count {
            let resp = self.transport.recv(self.width())?;
            words.push(resp.value);
            progress(i + 1);
        }
        self.transport.flush()?;
        Ok(words)
    }

    pub fn load(&mut self, target: u8, address: u16, words: &[u32]) -> Result<()> {
        self.load_with(target, address, words, |_| ())
    }

    /// Write `words` to consecutive addresses starting at `address`.
    pub fn load_with(
        &mut self,
        target: u8,
        address: u16,
        words: &[u32],
        mut progress: impl FnMut(usize),
    ) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }
        check_span(address, words.len())?;
        for (i, &word) in words.iter().enumerate() {
            self.write(target, address + i as u16, word)?;
            progress(i + 1);
        }
        self.transport.flush()?;
        log::info!("Loaded {} words at {:#06x}", words.len(), address);
        Ok(())
    }

    /// Read `words` back and compare. In narrow mode only the upper halves
    /// are compared.
    pub fn verify(&mut self, target: u8, address: u16, words: &[u32]) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }
        check_span(address, words.len())?;
        let actual = if self.config.block_transfer {
            self.read_block(target, address, words.len(), true)?
        } else {
            (0..words.len())
                .map(|i| self.read(target, address + i as u16))
                .collect::<Result<Vec<_>>>()?
        };

        let width = self.width();
        if let Some((i, (want, got))) = words
            .iter()
            .zip(&actual)
            .enumerate()
            .find(|(_, (want, got))| width.truncate(**want) != **got)
        {
            anyhow::bail!(
                "verify failed at {:#06x}: expected {:#010x}, read {:#010x}",
                address as usize + i,
                width.truncate(*want),
                got
            );
        }
        Ok(())
    }

    fn check_target(&self, target: u8) -> Result<()> {
        anyhow::ensure!(
            (target as usize) < self.config.targets,
            "target {} out of range, bridge has {} targets",
            target,
            self.config.targets
        );
        Ok(())
    }
}

/// `count` words from `address` must not wrap the 16-bit address space.
fn check_span(address: u16, count: usize) -> Result<()> {
    anyhow::ensure!(
        address as usize + count <= MAX_BLOCK_WORDS,
        "{} words at {:#06x} run past the end of the address space",
        count,
        address
    );
    Ok(())
}
