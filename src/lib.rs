//! Config Pilot - Proxy Config Checker and Ranker
//!
//! Probes a batch of vless/vmess/shadowsocks/trojan configs concurrently,
//! scores each one and keeps the best performers.

pub mod proxy;

pub use proxy::*;

use std::path::PathBuf;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Default input file written by the config collector
pub const DEFAULT_INPUT_PATH: &str = "configs.json";

/// Default directory for the ranked artifacts
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Raw config batch (JSON object of protocol -> URLs)
    pub input_path: PathBuf,
    /// Directory the ranked artifacts are written to
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(DEFAULT_INPUT_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}
