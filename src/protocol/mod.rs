//! Toolchain-facing protocol
//!
//! Newline-delimited JSON over the process's stdin and stdout. The server
//! announces its commands first, then answers `put`, `get` and `close`
//! requests one at a time. A `put` with a body is followed by a second line
//! holding the body as a base64 JSON string.

pub mod message;
pub mod server;

pub use message::{Command, Request, Response};
pub use server::{CacheProg, SessionState, READ_BUFFER_SIZE};
