//! CLI command implementations

pub mod clear;
pub mod config;
pub mod serve;

pub use clear::execute as clear;
pub use config::execute as config;
pub use serve::execute as serve;
