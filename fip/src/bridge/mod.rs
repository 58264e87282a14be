//! Wire layer shared by the master and interop modules.
//!
//! # Architecture
//!
//! - **protocol**: Message types (ConnectRequest, SymbolRequest/Response, CompileRequest,
//!   ObjectResponse, Kill)
//! - **codec**: Fixed 1024-byte frame encoding and stream framing
//! - **transport**: Socket file handling, listener binding, connect-with-retry

pub mod codec;
pub mod protocol;
pub mod transport;
