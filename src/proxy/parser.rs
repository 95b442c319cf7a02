//! Config parser module for validating proxy config URLs
//!
//! Every protocol has a fixed URL shape. vmess carries its server address
//! inside a base64 JSON payload instead of the URL itself, so validating a
//! vmess config means decoding that payload.

use crate::proxy::models::{Endpoint, Protocol, RawBatch};
use crate::Result;
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// vless://UUID@HOST:PORT[?query][#fragment]
static VLESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^vless://([0-9a-fA-F-]+)@([^\s:/?#@]+):(\d+)(?:[/?#]\S*)?$")
        .expect("Invalid vless regex")
});

/// vmess://BASE64[#fragment]
static VMESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^vmess://([A-Za-z0-9+/=]+)(?:#\S*)?$").expect("Invalid vmess regex")
});

/// ss://USERINFO@HOST:PORT[?query][#fragment]
static SHADOWSOCKS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ss://([A-Za-z0-9_+/=-]+)@([^\s:/?#@]+):(\d+)(?:[/?#]\S*)?$")
        .expect("Invalid shadowsocks regex")
});

/// trojan://PASSWORD@HOST:PORT[?query][#fragment]
static TROJAN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^trojan://([^\s@]+)@([^\s:/?#@]+):(\d+)(?:[/?#]\S*)?$")
        .expect("Invalid trojan regex")
});

/// The subset of the vmess JSON payload needed to reach the server
#[derive(Debug, Deserialize)]
struct VmessPayload {
    #[serde(default)]
    add: Option<String>,
    #[serde(default)]
    port: Option<VmessPort>,
}

/// Clients write the vmess port either as a string or as a number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VmessPort {
    Text(String),
    Number(u64),
}

impl VmessPort {
    fn into_string(self) -> String {
        match self {
            VmessPort::Text(port) => port,
            VmessPort::Number(port) => port.to_string(),
        }
    }
}

impl Protocol {
    fn pattern(&self) -> &'static Regex {
        match self {
            Protocol::Vless => &*VLESS_REGEX,
            Protocol::Vmess => &*VMESS_REGEX,
            Protocol::Shadowsocks => &*SHADOWSOCKS_REGEX,
            Protocol::Trojan => &*TROJAN_REGEX,
        }
    }

    /// Check that `url` has this protocol's shape (and, for vmess, a
    /// decodable payload with a host and port)
    pub fn validate(&self, url: &str) -> bool {
        self.extract_endpoint(url).is_some()
    }

    /// Extract the server endpoint from `url`.
    ///
    /// Returns `None` for any URL that does not validate; a returned
    /// endpoint always has a non-empty host and port.
    pub fn extract_endpoint(&self, url: &str) -> Option<Endpoint> {
        let caps = self.pattern().captures(url)?;

        let endpoint = match self {
            Protocol::Vmess => decode_vmess(&caps[1])?,
            Protocol::Vless | Protocol::Shadowsocks | Protocol::Trojan => {
                Endpoint::new(&caps[2], &caps[3])
            }
        };

        endpoint.is_probeable().then_some(endpoint)
    }
}

/// Decode a vmess payload into its endpoint
fn decode_vmess(encoded: &str) -> Option<Endpoint> {
    let bytes = STANDARD.decode(encoded).ok()?;
    let payload: VmessPayload = serde_json::from_slice(&bytes).ok()?;

    let host = payload.add?;
    let port = payload.port?.into_string();

    Some(Endpoint::new(host, port))
}

/// Config parser for validating config URLs and loading input batches
pub struct ConfigParser;

impl ConfigParser {
    /// Validate a URL against the protocol named by `protocol`.
    /// Unknown protocol names never validate.
    pub fn validate(protocol: &str, url: &str) -> bool {
        protocol
            .parse::<Protocol>()
            .map_or(false, |p| p.validate(url))
    }

    /// Extract the endpoint of a URL for the protocol named by `protocol`
    pub fn extract_endpoint(protocol: &str, url: &str) -> Option<Endpoint> {
        protocol.parse::<Protocol>().ok()?.extract_endpoint(url)
    }

    /// Parse a raw batch from a JSON object of protocol -> URL list
    pub fn parse_string(content: &str) -> Result<RawBatch> {
        let batch = serde_json::from_str(content)?;
        Ok(batch)
    }

    /// Load a raw batch from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<RawBatch> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse_string(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}
