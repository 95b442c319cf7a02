//! Proxy module for validating, probing and ranking proxy configs
//!
//! This module provides functionality for:
//! - Validating vless/vmess/shadowsocks/trojan URLs and extracting their servers
//! - Probing servers for TLS, latency, packet loss, throughput and DNS timing
//! - Scoring measurements and ranking configs with bounded concurrency
//! - Saving the best configs to text and JSON files

pub mod checker;
pub mod models;
pub mod output;
pub mod parser;
pub mod ranker;
pub mod scorer;

pub use checker::{CheckerConfig, Prober, ProxyChecker};
pub use models::{Endpoint, Measurement, Protocol, ProxyConfig, RawBatch};
pub use output::{save_artifacts, Artifacts};
pub use parser::ConfigParser;
pub use ranker::{rank_configs, ConfigRanker};
pub use scorer::score;
