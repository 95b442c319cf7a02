//! Writers for the ranked output artifacts

use crate::proxy::models::ProxyConfig;
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Plain list of ranked URLs, one per line
pub const BEST_CONFIGS_TXT: &str = "BestConfigs.txt";

/// Ranked configs with their scores and measurements
pub const BEST_CONFIGS_JSON: &str = "BestConfigs_scored.json";

/// Paths of the written artifacts
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub urls: PathBuf,
    pub scored: PathBuf,
}

/// Render ranked configs as one URL per line
pub fn render_urls(configs: &[ProxyConfig]) -> String {
    configs.iter().map(|c| format!("{}\n", c.url)).collect()
}

/// Write both artifacts into `dir`, creating it if needed
pub fn save_artifacts<P: AsRef<Path>>(configs: &[ProxyConfig], dir: P) -> Result<Artifacts> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let urls = dir.join(BEST_CONFIGS_TXT);
    fs::write(&urls, render_urls(configs))
        .with_context(|| format!("Failed to write {}", urls.display()))?;

    let scored = dir.join(BEST_CONFIGS_JSON);
    let json = serde_json::to_string_pretty(configs).context("Failed to serialize scored configs")?;
    fs::write(&scored, json).with_context(|| format!("Failed to write {}", scored.display()))?;

    Ok(Artifacts { urls, scored })
}
