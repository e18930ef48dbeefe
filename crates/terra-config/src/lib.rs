//! Configuration for the terra terrain streamer.
//!
//! Runtime settings for the LOD quadtree, the geometry pool and the per-frame
//! job budget. Persisted to disk as RON, overridable from the command line.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, LodConfig, PoolConfig, StreamingConfig, default_config_dir};
pub use error::ConfigError;
