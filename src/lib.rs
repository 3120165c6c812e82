//! Byte-stream to register-bus bridge controller.
//!
//! The [`Bridge`] takes 5-byte command frames from an inbound byte stream,
//! runs read and write cycles on a bus of up to 16 targets, and streams
//! responses back, optionally chaining reads into block transfers. It is
//! stepped one tick at a time. [`Session`] drives a bridge from the host side
//! over any [`Transport`].

pub mod assembler;
pub mod block;
pub mod bridge;
pub mod bus;
pub mod constants;
pub mod device;
pub mod format;
pub mod protocol;
pub mod serializer;
pub mod session;
pub mod target;
pub mod transport;

pub use self::bridge::{Bridge, TickOutput};
pub use self::bus::{BusRequest, BusStatus, BusTarget, Direction};
pub use self::device::{BridgeConfig, Profile, ProfileDB};
pub use self::protocol::{Command, CommandFrame, Response, ResponseWidth};
pub use self::session::Session;
pub use self::target::MemoryTarget;
pub use self::transport::Transport;
