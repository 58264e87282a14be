//! fip: coordination engine for the Flint Interop Protocol.
//!
//! A master process binds a well-known Unix socket, launches interop modules
//! and talks to them in fixed 1024-byte frames. Modules connect back, resolve
//! symbols and answer compile requests until the master sends Kill.
//!
//! - [`bridge`]: wire messages, the frame codec and socket transport
//! - [`master`]: slot table, broadcast, response collection, process teardown
//! - [`slave`]: the module-side client and the [`ModuleHandler`] seam

pub mod bridge;
pub mod config;
pub mod master;
pub mod slave;
mod version;

pub use bridge::codec::{CodecError, DecodeError, EncodeError, FrameCodec, decode, encode};
pub use bridge::protocol::{
    CompileTarget, FRAME_SIZE, KillReason, Message, MessageTag, ModuleName, ObjectPath,
    SymbolDescriptor, SymbolKind, TargetError,
};
pub use config::{ConfigError, DEFAULT_SOCKET_PATH, MAX_SLAVES, MasterConfig, ModuleConfig, SlaveConfig};
pub use master::{BroadcastReport, Master, MasterError, SlaveResponse, SpawnError};
pub use slave::{ModuleHandler, SlaveClient, SlaveError};
pub use version::{FIP_VERSION, PROTOCOL_VERSION, ProtocolVersion};
