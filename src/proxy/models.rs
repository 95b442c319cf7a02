//! Proxy config data models

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw input batch: protocol name -> URLs, in file order
pub type RawBatch = IndexMap<String, Vec<String>>;

/// Supported proxy protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vless,
    Vmess,
    Shadowsocks,
    Trojan,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Vless,
        Protocol::Vmess,
        Protocol::Shadowsocks,
        Protocol::Trojan,
    ];

    /// Tag used as the key in the input batch
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vless => "vless",
            Protocol::Vmess => "vmess",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Trojan => "trojan",
        }
    }

    /// URL scheme prefix for this protocol
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Vless => "vless://",
            Protocol::Vmess => "vmess://",
            Protocol::Shadowsocks => "ss://",
            Protocol::Trojan => "trojan://",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vless" => Ok(Protocol::Vless),
            "vmess" => Ok(Protocol::Vmess),
            "shadowsocks" => Ok(Protocol::Shadowsocks),
            "trojan" => Ok(Protocol::Trojan),
            _ => Err(anyhow::anyhow!(
                "Unknown protocol: {}. Use: vless, vmess, shadowsocks, trojan",
                s
            )),
        }
    }
}

/// Server endpoint extracted from a config URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }

    /// Get the endpoint in HOST:PORT format
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// An endpoint with an empty host or port cannot be probed
    pub fn is_probeable(&self) -> bool {
        !self.host.is_empty() && !self.port.is_empty()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address())
    }
}

/// Network measurements for one config.
///
/// Every field starts at its zero value and is only set by a probe that
/// succeeded, so a failed probe reads as "no signal".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(rename = "TLSOK")]
    pub tls_ok: bool,
    /// Average round trip in milliseconds
    #[serde(rename = "Latency")]
    pub latency_ms: f64,
    #[serde(rename = "Throughput")]
    pub throughput_mbps: f64,
    #[serde(rename = "DNSResolution")]
    pub dns_resolution_ms: f64,
    /// Percentage of echo probes lost (0-100)
    #[serde(rename = "PacketLoss")]
    pub packet_loss_pct: f64,
}

/// A validated proxy config together with its probe results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(rename = "Protocol")]
    pub protocol: Protocol,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Score")]
    pub score: f64,
    #[serde(rename = "Results")]
    pub measurement: Measurement,
}

impl ProxyConfig {
    /// Create an unprobed config
    pub fn new(protocol: Protocol, url: impl Into<String>) -> Self {
        Self {
            protocol,
            url: url.into(),
            score: 0.0,
            measurement: Measurement::default(),
        }
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({:.0})", self.protocol, self.url, self.score)
    }
}
