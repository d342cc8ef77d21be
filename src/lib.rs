//! Cacheprog - remote-backed build cache
//!
//! A long-lived subprocess that answers a build toolchain's `put` / `get`
//! cache requests over stdin/stdout, storing artifacts in a local
//! content-addressed store that can front an S3 bucket.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod locking;
pub mod metrics;
pub mod protocol;

pub use error::{CacheError, CacheResult};
