/// Bytes per command frame: one opcode byte plus a 32-bit payload.
pub const FRAME_SIZE: usize = 5;

/// Response to SYNC.
pub const SYNC_MAGIC: u32 = 0xcafe_babe;

/// Maximum number of bus targets addressable by the 4-bit target index.
pub const MAX_TARGETS: usize = 16;

/// Ticks a simulated host waits for a response before giving up.
pub const DEFAULT_RESPONSE_TIMEOUT_TICKS: u64 = 10_000;

pub mod opcodes {
    pub const SYNC: u8 = 0x0;
    pub const REG_ACCESS: u8 = 0x1;
    pub const DATA_SET: u8 = 0x2;
    pub const DATA_GET: u8 = 0x3;
    pub const AUX_CSR: u8 = 0x4;
    pub const BLOCK_SETUP: u8 = 0x5;
}
