//! Probe harness module for measuring proxy servers
//!
//! A probe runs four independent measurements against a config's server
//! in order: TLS handshake, latency/packet loss, throughput and DNS
//! resolution time. A failed measurement is logged and leaves its field
//! at the default value; it never stops the ones after it.

use crate::proxy::models::{Endpoint, Measurement, Protocol};
use crate::Result;
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};
use surge_ping::{
    Client as PingClient, Config as PingConfig, PingIdentifier, PingSequence, SurgeError, ICMP,
};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_native_tls::TlsConnector;
use tracing::{debug, warn, Instrument, Span};

/// Default timeout for each network operation in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of concurrent probes
const DEFAULT_CONCURRENCY: usize = 10;

/// Default number of configs kept after ranking
const DEFAULT_TOP_N: usize = 10;

/// Default resource fetched for the throughput test
const DEFAULT_THROUGHPUT_PATH: &str = "/1mb.bin";

/// Size of the throughput resource (1 MiB) in megabits
const THROUGHPUT_MEGABITS: f64 = 8.0;

/// Number of ICMP echo requests per probe
const PING_COUNT: u16 = 5;

const PING_PAYLOAD: [u8; 56] = [0; 56];

/// ICMP identifiers, unique per pinger so concurrent probes of the same
/// host don't steal each other's replies
static NEXT_PING_ID: AtomicU16 = AtomicU16::new(1);

/// Smallest value a successful timing is recorded as, so it never reads
/// as "not measured"
const MIN_MEASURED_MS: f64 = 0.001;

/// Convert a successful timing to fractional milliseconds
fn elapsed_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).max(MIN_MEASURED_MS)
}

/// Configuration for the probe harness and the ranking run
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Timeout for each network operation
    pub timeout: Duration,
    /// Maximum number of configs probed at once
    pub concurrency: usize,
    /// Number of configs kept after ranking
    pub top_n: usize,
    /// Path of the resource fetched for the throughput test
    pub throughput_path: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            top_n: DEFAULT_TOP_N,
            throughput_path: DEFAULT_THROUGHPUT_PATH.to_string(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the concurrency limit, clamped to what a semaphore can hold
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_throughput_path(mut self, path: String) -> Self {
        self.throughput_path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }
}

/// Something that can measure a config.
///
/// Implementations must always return a complete measurement; failures
/// show up as default field values, never as errors.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, protocol: Protocol, url: &str) -> Measurement;
}

/// Result of an ICMP echo run
#[derive(Debug, Clone, Copy)]
struct PingStats {
    avg_rtt_ms: f64,
    packet_loss_pct: f64,
}

/// Network probe harness for proxy configs
#[derive(Clone)]
pub struct ProxyChecker {
    config: CheckerConfig,
    http: Client,
    tls: TlsConnector,
    span: Span,
}

impl ProxyChecker {
    /// Create a new proxy checker with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(CheckerConfig::default())
    }

    /// Create a new proxy checker with custom configuration
    pub fn with_config(config: CheckerConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;

        // Reachability probe only, so any certificate is accepted
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;

        Ok(Self {
            config,
            http,
            tls: TlsConnector::from(tls),
            span: tracing::info_span!("checker"),
        })
    }

    /// Log probe events under `span` instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Run every measurement against `endpoint`
    pub async fn measure(&self, endpoint: &Endpoint) -> Measurement {
        let mut m = Measurement::default();
        let host = endpoint.host.as_str();

        match self.tls_handshake(endpoint).await {
            Ok(()) => m.tls_ok = true,
            Err(e) => warn!(host, error = %e, "TLS handshake failed"),
        }

        let ping = self.icmp_ping(endpoint).await;
        let (latency_ms, packet_loss_pct) =
            latency_with_fallback(host, ping, self.tcp_connect_time(endpoint)).await;
        m.latency_ms = latency_ms;
        m.packet_loss_pct = packet_loss_pct;

        match self.throughput(endpoint).await {
            Ok(mbps) => m.throughput_mbps = mbps,
            Err(e) => warn!(host, error = %e, "Throughput test failed"),
        }

        match self.dns_resolution_time(host).await {
            Ok(ms) => m.dns_resolution_ms = ms,
            Err(e) => warn!(host, error = %e, "DNS resolution failed"),
        }

        debug!(host, ?m, "Probe finished");
        m
    }

    /// Complete a TLS handshake and close the connection right away
    async fn tls_handshake(&self, endpoint: &Endpoint) -> Result<()> {
        let handshake = async {
            let stream = TcpStream::connect(endpoint.address()).await?;
            let tls_stream = self.tls.connect(&endpoint.host, stream).await?;
            drop(tls_stream);
            Ok::<(), anyhow::Error>(())
        };

        timeout(self.config.timeout, handshake)
            .await
            .map_err(|_| anyhow!("timed out after {:?}", self.config.timeout))?
    }

    /// Send `PING_COUNT` echo requests and average the replies.
    ///
    /// Lost replies only count towards packet loss. Any other failure
    /// (no permission to open the socket, unresolvable host) is an error
    /// so the caller can fall back to a TCP connect.
    async fn icmp_ping(&self, endpoint: &Endpoint) -> Result<PingStats> {
        let ip = self.resolve(&endpoint.host).await?;
        let ping_config = match ip {
            IpAddr::V4(_) => PingConfig::default(),
            IpAddr::V6(_) => PingConfig::builder().kind(ICMP::V6).build(),
        };

        let client = PingClient::new(&ping_config)?;
        let id = PingIdentifier(NEXT_PING_ID.fetch_add(1, Ordering::Relaxed));
        let mut pinger = client.pinger(ip, id).await;
        pinger.timeout(self.config.timeout / u32::from(PING_COUNT));

        let mut rtts = Vec::with_capacity(usize::from(PING_COUNT));
        for seq in 0..PING_COUNT {
            match pinger.ping(PingSequence(seq), &PING_PAYLOAD).await {
                Ok((_, rtt)) => rtts.push(rtt),
                Err(SurgeError::Timeout { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let received = rtts.len();
        let avg_rtt_ms = if received == 0 {
            0.0
        } else {
            let total: Duration = rtts.iter().sum();
            elapsed_ms(total / received as u32)
        };
        let lost = usize::from(PING_COUNT) - received;

        Ok(PingStats {
            avg_rtt_ms,
            packet_loss_pct: lost as f64 * 100.0 / f64::from(PING_COUNT),
        })
    }

    /// Time a plain TCP connect in milliseconds
    async fn tcp_connect_time(&self, endpoint: &Endpoint) -> Result<f64> {
        let start = Instant::now();
        let stream = timeout(self.config.timeout, TcpStream::connect(endpoint.address())).await??;
        let elapsed = start.elapsed();
        drop(stream);
        Ok(elapsed_ms(elapsed))
    }

    /// Download the throughput resource over HTTPS, in Mbps
    async fn throughput(&self, endpoint: &Endpoint) -> Result<f64> {
        let url = format!("https://{}{}", endpoint.address(), self.config.throughput_path);

        let start = Instant::now();
        let response = self.http.get(&url).send().await?;
        response.bytes().await?;
        let secs = start.elapsed().as_secs_f64();

        if secs <= 0.0 {
            bail!("download finished in zero time");
        }
        Ok(THROUGHPUT_MEGABITS / secs)
    }

    /// Time a single hostname resolution in milliseconds
    async fn dns_resolution_time(&self, host: &str) -> Result<f64> {
        let start = Instant::now();
        let addrs = timeout(self.config.timeout, lookup_host((host, 0))).await??;
        if addrs.count() == 0 {
            bail!("no addresses found");
        }
        Ok(elapsed_ms(start.elapsed()))
    }

    async fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let mut addrs = timeout(self.config.timeout, lookup_host((host, 0))).await??;
        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| anyhow!("no addresses found for {}", host))
    }
}

/// Pick latency and packet loss from an echo run, or time `fallback`
/// when the echo run could not happen at all.
///
/// `fallback` is only awaited on the error path. It cannot measure loss,
/// so loss stays 0 after it; if it fails too, both stay at 0.
async fn latency_with_fallback<F>(host: &str, ping: Result<PingStats>, fallback: F) -> (f64, f64)
where
    F: Future<Output = Result<f64>>,
{
    match ping {
        Ok(stats) => (stats.avg_rtt_ms, stats.packet_loss_pct),
        Err(e) => {
            warn!(host, error = %e, "ICMP ping failed, falling back to TCP");
            match fallback.await {
                Ok(ms) => (ms, 0.0),
                Err(e) => {
                    warn!(host, error = %e, "TCP ping fallback failed");
                    (0.0, 0.0)
                }
            }
        }
    }
}

#[async_trait]
impl Prober for ProxyChecker {
    async fn probe(&self, protocol: Protocol, url: &str) -> Measurement {
        let Some(endpoint) = protocol.extract_endpoint(url) else {
            warn!(parent: &self.span, %protocol, url, "Invalid server or port");
            return Measurement::default();
        };

        self.measure(&endpoint)
            .instrument(self.span.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::scorer::score;
    use std::net::TcpListener;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.top_n, DEFAULT_TOP_N);
        assert_eq!(config.throughput_path, DEFAULT_THROUGHPUT_PATH);
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_concurrency(20)
            .with_top_n(3)
            .with_throughput_path("speed/10mb.bin".to_string());

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency, 20);
        assert_eq!(config.top_n, 3);
        assert_eq!(config.throughput_path, "/speed/10mb.bin");
    }

    #[test]
    fn test_checker_config_clamps_concurrency() {
        let config = CheckerConfig::new().with_concurrency(0);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn test_checker_config_clamps_huge_concurrency() {
        let config = CheckerConfig::new().with_concurrency(usize::MAX);
        assert_eq!(config.concurrency, Semaphore::MAX_PERMITS);
    }

    #[test]
    fn test_elapsed_ms_keeps_sub_millisecond() {
        assert!((elapsed_ms(Duration::from_micros(300)) - 0.3).abs() < 1e-9);
        assert!((elapsed_ms(Duration::from_millis(42)) - 42.0).abs() < 1e-9);
        assert_eq!(elapsed_ms(Duration::ZERO), MIN_MEASURED_MS);
    }

    #[test]
    fn test_sub_millisecond_echo_scores_as_measured() {
        let m = Measurement {
            latency_ms: elapsed_ms(Duration::from_micros(250)),
            packet_loss_pct: 0.0,
            ..Measurement::default()
        };
        // +30 latency, +5 no loss
        assert_eq!(score(&m), 35.0);
    }

    #[tokio::test]
    async fn test_fallback_used_when_ping_cannot_run() {
        let ping = Err(anyhow!("operation not permitted"));
        let (latency, loss) = latency_with_fallback("h", ping, async { Ok::<_, anyhow::Error>(12.5) }).await;
        assert_eq!(latency, 12.5);
        assert_eq!(loss, 0.0);
    }

    #[tokio::test]
    async fn test_fallback_failure_leaves_defaults() {
        let ping = Err(anyhow!("operation not permitted"));
        let fallback = async { Err::<f64, _>(anyhow!("connection refused")) };
        let (latency, loss) = latency_with_fallback("h", ping, fallback).await;
        assert_eq!(latency, 0.0);
        assert_eq!(loss, 0.0);
    }

    #[tokio::test]
    async fn test_total_loss_does_not_fall_back() {
        let called = AtomicBool::new(false);
        let ping = Ok(PingStats {
            avg_rtt_ms: 0.0,
            packet_loss_pct: 100.0,
        });
        let fallback = async {
            called.store(true, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(5.0)
        };

        let (latency, loss) = latency_with_fallback("h", ping, fallback).await;
        assert_eq!(latency, 0.0);
        assert_eq!(loss, 100.0);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_successful_ping_is_kept() {
        let ping = Ok(PingStats {
            avg_rtt_ms: 0.4,
            packet_loss_pct: 20.0,
        });
        let (latency, loss) = latency_with_fallback("h", ping, async { Ok::<_, anyhow::Error>(99.0) }).await;
        assert_eq!(latency, 0.4);
        assert_eq!(loss, 20.0);
    }

    #[tokio::test]
    async fn test_proxy_checker_with_config() {
        let config = CheckerConfig::new().with_concurrency(50);
        let checker = ProxyChecker::with_config(config).unwrap();
        assert_eq!(checker.config().concurrency, 50);
    }

    #[tokio::test]
    async fn test_probe_unprobeable_url_is_default() {
        let checker = ProxyChecker::new().unwrap();
        let m = checker.probe(Protocol::Trojan, "not a trojan url").await;
        assert_eq!(m, Measurement::default());
        assert_eq!(score(&m), 0.0);
    }

    #[tokio::test]
    async fn test_probe_closed_port_degrades() {
        // Bind and drop to get a loopback port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let checker =
            ProxyChecker::with_config(CheckerConfig::new().with_timeout(Duration::from_secs(1)))
                .unwrap();
        let url = format!("trojan://secret@127.0.0.1:{}", port);
        let m = checker.probe(Protocol::Trojan, &url).await;

        assert!(!m.tls_ok);
        assert_eq!(m.throughput_mbps, 0.0);
    }

    #[tokio::test]
    async fn test_tcp_connect_time_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port().to_string());

        let checker = ProxyChecker::new().unwrap();
        let ms = checker.tcp_connect_time(&endpoint).await.unwrap();
        // Loopback connects are sub-millisecond but still count as measured
        assert!(ms > 0.0);
    }

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let checker = ProxyChecker::new().unwrap();
        let ip = checker.resolve("127.0.0.1").await.unwrap();
        assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().unwrap());
    }
}
