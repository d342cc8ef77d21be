//! CLI argument definitions using clap derive

use crate::backend::{BackendKind, UploadMode};
use crate::config::Config;
use crate::locking::LockKind;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Cacheprog - remote-backed build cache
///
/// Serves the toolchain's cache protocol on stdin/stdout, storing
/// artifacts on local disk and optionally in an S3 bucket.
#[derive(Parser, Debug)]
#[command(name = "cacheprog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase verbosity (-v info, -vv debug); logs go to stderr
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CACHEPROG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Settings that override the config file
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Storage backend
    #[arg(long, global = true, env = "CACHEPROG_BACKEND", value_enum)]
    pub backend: Option<BackendKind>,

    /// Local cache directory
    #[arg(long, global = true, env = "CACHEPROG_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Per-key lock flavour
    #[arg(long, global = true, env = "CACHEPROG_LOCK", value_enum)]
    pub lock: Option<LockKind>,

    /// S3 bucket (required by the s3 backend)
    #[arg(long, global = true, env = "CACHEPROG_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix inside the bucket
    #[arg(long, global = true, env = "CACHEPROG_S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// AWS region
    #[arg(long, global = true, env = "CACHEPROG_S3_REGION")]
    pub s3_region: Option<String>,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[arg(long, global = true, env = "CACHEPROG_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// When uploads must finish relative to the put response
    #[arg(long, global = true, env = "CACHEPROG_UPLOAD_MODE", value_enum)]
    pub upload_mode: Option<UploadMode>,

    /// Log every backend call
    #[arg(long, global = true, env = "CACHEPROG_DEBUG", value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// Print latency stats to stderr when the session ends
    #[arg(long, global = true, env = "CACHEPROG_STATS", value_parser = FalseyValueParser::new())]
    pub stats: bool,
}

impl Overrides {
    /// Layer these settings over `config`
    ///
    /// Unset options leave the file's value alone; boolean switches can only
    /// turn a setting on.
    pub fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.cache.backend = backend;
        }
        if let Some(ref dir) = self.cache_dir {
            config.cache.dir = Some(dir.clone());
        }
        if let Some(lock) = self.lock {
            config.cache.lock = lock;
        }
        if let Some(ref bucket) = self.s3_bucket {
            config.s3.bucket = Some(bucket.clone());
        }
        if let Some(ref prefix) = self.s3_prefix {
            config.s3.prefix = prefix.clone();
        }
        if let Some(ref region) = self.s3_region {
            config.s3.region = Some(region.clone());
        }
        if let Some(ref endpoint) = self.s3_endpoint {
            config.s3.endpoint_url = Some(endpoint.clone());
        }
        if let Some(mode) = self.upload_mode {
            config.s3.upload_mode = mode;
        }
        config.logging.debug |= self.debug;
        config.logging.stats |= self.stats;
    }
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the cache protocol on stdin/stdout
    Serve,

    /// Remove every cache entry
    Clear(ClearArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the clear command
#[derive(Parser, Debug, Clone)]
pub struct ClearArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show the resolved configuration (default)
    Show,

    /// Show the config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
