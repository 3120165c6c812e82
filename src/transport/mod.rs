//! Abstract bridge transport interface.
use anyhow::Result;

use crate::protocol::{Command, Response, ResponseWidth};

pub use self::serial::{Baudrate, SerialTransport};
pub use self::sim::SimTransport;

mod serial;
mod sim;

/// Abstraction of the byte link between a host and a bridge.
/// Might be a serial port, or a bridge simulated in-process.
pub trait Transport {
    fn send_raw(&mut self, raw: &[u8]) -> Result<()>;
    /// Receive exactly `len` bytes.
    fn recv_raw(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Wait for everything sent so far to take effect.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, cmd: Command) -> Result<()> {
        let req = cmd.into_raw()?;
        log::debug!("=> {}", hex::encode(&req));
        self.send_raw(&req)
    }

    fn recv(&mut self, width: ResponseWidth) -> Result<Response> {
        let resp = self.recv_raw(width.bytes() as usize)?;
        log::debug!("<= {}", hex::encode(&resp));
        Response::from_raw(&resp, width)
    }

    /// Send a command that answers with exactly one response, and read it.
    fn transfer(&mut self, cmd: Command, width: ResponseWidth) -> Result<Response> {
        anyhow::ensure!(
            cmd.response_count() == 1,
            "{:?} does not answer with a single response",
            cmd
        );
        self.send(cmd)?;
        self.recv(width)
    }
}
