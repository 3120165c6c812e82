//! The byte-level command protocol spoken by the bridge.
//!
//! Every command is a fixed 5-byte frame, most-significant byte first:
//!
//! ```text
//! [opcode:4][reserved:4][payload:32]
//! ```
//!
//! Responses carry no header at all, just the response value's bytes, MSB
//! first, 4 of them (or 2 in narrow mode).

use std::fmt;

use anyhow::Result;
use bitfield::bitfield;
use scroll::{BE, Pread, Pwrite};

use crate::constants::{FRAME_SIZE, opcodes};

bitfield! {
    /// REG_ACCESS payload: `[reserved:11][read_flag:1][target_index:4][address:16]`
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct RegAccessPayload(u32);
    impl Debug;
    pub u16, address, set_address: 15, 0;
    pub u8, target_index, set_target_index: 19, 16;
    pub read_flag, set_read_flag: 20;
}

bitfield! {
    /// BLOCK_SETUP payload: `[reserved:15][increment_flag:1][word_count:16]`
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct BlockSetupPayload(u32);
    impl Debug;
    pub u16, word_count, set_word_count: 15, 0;
    pub increment_flag, set_increment_flag: 16;
}

/// A raw, fully assembled command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    /// High nibble of byte 0.
    pub opcode: u8,
    pub payload: u32,
}

impl CommandFrame {
    pub fn new(opcode: u8, payload: u32) -> Self {
        CommandFrame {
            opcode: opcode & 0x0f,
            payload,
        }
    }

    /// Decode a frame. The reserved low nibble of byte 0 is ignored.
    pub fn from_bytes(raw: &[u8; FRAME_SIZE]) -> Self {
        CommandFrame {
            opcode: raw[0] >> 4,
            payload: u32::from_be_bytes([raw[1], raw[2], raw[3], raw[4]]),
        }
    }

    pub fn to_bytes(&self) -> Result<[u8; FRAME_SIZE]> {
        let mut buf = [0u8; FRAME_SIZE];
        buf[0] = (self.opcode & 0x0f) << 4;
        buf.pwrite_with(self.payload, 1, BE)?;
        Ok(buf)
    }
}

/// Bridge command, decoded from a [`CommandFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Respond with the magic constant `0xCAFEBABE`.
    Sync,
    /// Select a target and address, and start a bus cycle on it.
    RegAccess { address: u16, target: u8, read: bool },
    /// Stage a value for the next write cycle.
    DataSet { value: u32 },
    /// Respond with the staged data buffer (last written or last read).
    DataGet,
    /// Update the auxiliary control/status register.
    AuxCsr { value: u32 },
    /// Arm the block streaming automaton for `word_count` further reads.
    ///
    /// Must directly follow a REG_ACCESS read, which supplies the start
    /// address and target.
    BlockSetup { word_count: u16, increment: bool },
    /// Anything else. Dropped by the bridge.
    Unknown { opcode: u8, payload: u32 },
}

impl Command {
    pub fn reg_read(target: u8, address: u16) -> Self {
        Command::RegAccess {
            address,
            target,
            read: true,
        }
    }

    pub fn reg_write(target: u8, address: u16) -> Self {
        Command::RegAccess {
            address,
            target,
            read: false,
        }
    }

    pub fn data_set(value: u32) -> Self {
        Command::DataSet { value }
    }

    pub fn aux_csr(value: u32) -> Self {
        Command::AuxCsr { value }
    }

    pub fn block_setup(word_count: u16, increment: bool) -> Self {
        Command::BlockSetup {
            word_count,
            increment,
        }
    }

    pub fn from_frame(frame: &CommandFrame) -> Self {
        match frame.opcode {
            opcodes::SYNC => Command::Sync,
            opcodes::REG_ACCESS => {
                let p = RegAccessPayload(frame.payload);
                Command::RegAccess {
                    address: p.address(),
                    target: p.target_index(),
                    read: p.read_flag(),
                }
            }
            opcodes::DATA_SET => Command::DataSet {
                value: frame.payload,
            },
            opcodes::DATA_GET => Command::DataGet,
            opcodes::AUX_CSR => Command::AuxCsr {
                value: frame.payload,
            },
            opcodes::BLOCK_SETUP => {
                let p = BlockSetupPayload(frame.payload);
                Command::BlockSetup {
                    word_count: p.word_count(),
                    increment: p.increment_flag(),
                }
            }
            opcode => Command::Unknown {
                opcode,
                payload: frame.payload,
            },
        }
    }

    pub fn to_frame(&self) -> CommandFrame {
        match *self {
            Command::Sync => CommandFrame::new(opcodes::SYNC, 0),
            Command::RegAccess {
                address,
                target,
                read,
            } => {
                let mut p = RegAccessPayload(0);
                p.set_address(address);
                p.set_target_index(target & 0x0f);
                p.set_read_flag(read);
                CommandFrame::new(opcodes::REG_ACCESS, p.0)
            }
            Command::DataSet { value } => CommandFrame::new(opcodes::DATA_SET, value),
            Command::DataGet => CommandFrame::new(opcodes::DATA_GET, 0),
            Command::AuxCsr { value } => CommandFrame::new(opcodes::AUX_CSR, value),
            Command::BlockSetup {
                word_count,
                increment,
            } => {
                let mut p = BlockSetupPayload(0);
                p.set_word_count(word_count);
                p.set_increment_flag(increment);
                CommandFrame::new(opcodes::BLOCK_SETUP, p.0)
            }
            Command::Unknown { opcode, payload } => CommandFrame::new(opcode, payload),
        }
    }

    pub fn into_raw(self) -> Result<Vec<u8>> {
        Ok(self.to_frame().to_bytes()?.to_vec())
    }

    /// Number of responses the bridge emits for this command, when it is
    /// issued in the documented order.
    pub fn response_count(&self) -> usize {
        match self {
            Command::Sync | Command::DataGet => 1,
            Command::BlockSetup { word_count, .. } => *word_count as usize + 1,
            _ => 0,
        }
    }
}

/// Width of every response a bridge emits, fixed per bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResponseWidth {
    #[default]
    Full,
    /// Only the upper 16 bits are sent.
    Narrow,
}

impl ResponseWidth {
    pub const fn from_narrow(narrow: bool) -> Self {
        if narrow {
            ResponseWidth::Narrow
        } else {
            ResponseWidth::Full
        }
    }

    /// Bytes on the wire per response.
    pub const fn bytes(self) -> u8 {
        match self {
            ResponseWidth::Full => 4,
            ResponseWidth::Narrow => 2,
        }
    }

    /// The part of `value` that survives transmission.
    pub const fn truncate(self, value: u32) -> u32 {
        match self {
            ResponseWidth::Full => value,
            ResponseWidth::Narrow => value & 0xffff_0000,
        }
    }
}

/// A response value as received by the host.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Response {
    /// Left-aligned: in narrow mode the low half is always zero.
    pub value: u32,
    pub width: ResponseWidth,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.width {
            ResponseWidth::Full => write!(f, "RESP[{:08x}]", self.value),
            ResponseWidth::Narrow => write!(f, "RESP[{:04x}]", self.value >> 16),
        }
    }
}

impl Response {
    pub(crate) fn from_raw(raw: &[u8], width: ResponseWidth) -> Result<Self> {
        anyhow::ensure!(
            raw.len() == width.bytes() as usize,
            "Invalid response length: expected {}, got {}",
            width.bytes(),
            raw.len()
        );
        let value = match width {
            ResponseWidth::Full => raw.pread_with::<u32>(0, BE)?,
            ResponseWidth::Narrow => (raw.pread_with::<u16>(0, BE)? as u32) << 16,
        };
        Ok(Response { value, width })
    }

    /// The value as the host should interpret it in narrow mode.
    pub fn high_half(&self) -> u16 {
        (self.value >> 16) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_access_payload_layout() {
        let raw = Command::reg_read(0x3, 0xbeef).into_raw().unwrap();
        assert_eq!(raw, [0x10, 0x00, 0x13, 0xbe, 0xef]);

        let raw = Command::reg_write(0xa, 0x0001).into_raw().unwrap();
        assert_eq!(raw, [0x10, 0x00, 0x0a, 0x00, 0x01]);
    }

    #[test]
    fn block_setup_payload_layout() {
        let raw = Command::block_setup(0x0102, true).into_raw().unwrap();
        assert_eq!(raw, [0x50, 0x00, 0x01, 0x01, 0x02]);
    }

    #[test]
    fn reserved_bits_are_ignored_on_decode() {
        let frame = CommandFrame::from_bytes(&[0x1f, 0xff, 0xe2, 0x00, 0x10]);
        assert_eq!(frame.opcode, 1);
        assert_eq!(
            Command::from_frame(&frame),
            Command::RegAccess {
                address: 0x0010,
                target: 2,
                read: false,
            }
        );
    }

    #[test]
    fn unknown_opcodes_are_preserved() {
        let frame = CommandFrame::from_bytes(&[0xe0, 1, 2, 3, 4]);
        assert_eq!(
            Command::from_frame(&frame),
            Command::Unknown {
                opcode: 0xe,
                payload: 0x0102_0304,
            }
        );
    }

    #[test]
    fn narrow_response_is_left_aligned() {
        let resp = Response::from_raw(&[0xca, 0xfe], ResponseWidth::Narrow).unwrap();
        assert_eq!(resp.value, 0xcafe_0000);
        assert_eq!(resp.high_half(), 0xcafe);
        assert!(Response::from_raw(&[0xca, 0xfe], ResponseWidth::Full).is_err());
    }
}
