//! Ranking pipeline: validate, probe concurrently, score and keep the best

use crate::proxy::checker::{CheckerConfig, Prober};
use crate::proxy::models::{Protocol, ProxyConfig, RawBatch};
use crate::proxy::scorer::score;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn, Instrument, Span};

/// Sort by score, highest first, keeping input order for equal scores,
/// then keep the first `top_n`
pub fn rank_configs(mut configs: Vec<ProxyConfig>, top_n: usize) -> Vec<ProxyConfig> {
    // `sort_by` is stable
    configs.sort_by(|a, b| b.score.total_cmp(&a.score));
    configs.truncate(top_n);
    configs
}

/// Drives the probe harness over a batch and ranks the results
pub struct ConfigRanker<P> {
    prober: Arc<P>,
    config: CheckerConfig,
    span: Span,
}

impl<P: Prober + 'static> ConfigRanker<P> {
    pub fn new(prober: P, config: CheckerConfig) -> Self {
        Self {
            prober: Arc::new(prober),
            config,
            span: tracing::info_span!("ranker"),
        }
    }

    /// Log ranking events under `span` instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Flatten a raw batch into unprobed configs, in input order.
    /// URLs that fail validation (including every URL under an unknown
    /// protocol key) are dropped with a warning.
    pub fn collect_configs(&self, batch: &RawBatch) -> Vec<ProxyConfig> {
        let _enter = self.span.enter();
        let mut configs = Vec::new();

        for (tag, urls) in batch {
            let protocol = tag.parse::<Protocol>().ok();
            for url in urls {
                match protocol {
                    Some(protocol) if protocol.validate(url) => {
                        configs.push(ProxyConfig::new(protocol, url.as_str()));
                    }
                    _ => warn!(protocol = %tag, url = %url, "Invalid URL"),
                }
            }
        }

        info!(count = configs.len(), "Parsed configs");
        configs
    }

    /// Probe and score every config, at most `concurrency` at a time.
    ///
    /// The returned configs are in the same order as the input; each task
    /// only fills in the slot at its own index.
    pub async fn probe_all(&self, configs: Vec<ProxyConfig>) -> Vec<ProxyConfig> {
        let permits = self.config.concurrency.clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));

        let handles: Vec<_> = configs
            .iter()
            .map(|config| {
                let sem = Arc::clone(&semaphore);
                let prober = Arc::clone(&self.prober);
                let protocol = config.protocol;
                let url = config.url.clone();

                tokio::spawn(
                    async move {
                        let _permit = sem
                            .acquire_owned()
                            .await
                            .expect("Semaphore closed unexpectedly");
                        let measurement = prober.probe(protocol, &url).await;
                        let score = score(&measurement);
                        info!(url = %url, score, "Tested config");
                        (measurement, score)
                    }
                    .instrument(self.span.clone()),
                )
            })
            .collect();

        let results = join_all(handles).await;

        let mut slots = configs;
        for (slot, result) in slots.iter_mut().zip(results) {
            match result {
                Ok((measurement, score)) => {
                    slot.measurement = measurement;
                    slot.score = score;
                }
                Err(e) => {
                    error!(parent: &self.span, url = %slot.url, error = %e, "Probe task failed")
                }
            }
        }

        slots
    }

    /// Run the whole pipeline over a raw batch and return the top configs
    pub async fn rank(&self, batch: &RawBatch) -> Vec<ProxyConfig> {
        let configs = self.collect_configs(batch);
        let probed = self.probe_all(configs).await;
        rank_configs(probed, self.config.top_n)
    }
}
