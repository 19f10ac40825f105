//! Gateway configuration types.

use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

/// Hard cap on request body size. Bodies past this are rejected with 413.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// The service's own domain; drives cookie scoping and the implicit
    /// CORS wildcard.
    #[serde(default = "GatewayConfig::default_domain")]
    pub domain: String,

    /// Development mode relaxes cookie attributes.
    #[serde(default)]
    pub development_mode: bool,

    /// Extra allowed origins on top of the service's own domain wildcard.
    /// `*` matches any run of characters.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Per-IP request budget per minute.
    #[serde(default = "GatewayConfig::default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Reject traffic that arrives neither through the CDN nor from a
    /// whitelisted range.
    #[serde(default)]
    pub force_cdn: bool,

    /// Shared secret the CDN attaches in `X-CDN-SECRET`.
    #[serde(default)]
    pub cdn_secret: String,

    /// IP ranges allowed to bypass the CDN.
    #[serde(default)]
    pub cdn_whitelist: Vec<IpNetwork>,

    /// Node number for snowflake request IDs.
    #[serde(default)]
    pub node_id: u16,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_domain() -> String {
        "gigo.dev".to_string()
    }

    const fn default_rate_limit() -> u32 {
        1000
    }

    /// The full origin allow-list: a wildcard for every subdomain of the
    /// service's own domain, the apex itself, plus the configured extras.
    #[must_use]
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![
            format!("https://*.{}", self.domain),
            format!("https://{}", self.domain),
        ];
        origins.extend(self.cors_origins.iter().cloned());
        origins
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            domain: Self::default_domain(),
            development_mode: false,
            cors_origins: Vec::new(),
            rate_limit_per_minute: Self::default_rate_limit(),
            force_cdn: false,
            cdn_secret: String::new(),
            cdn_whitelist: Vec::new(),
            node_id: 0,
        }
    }
}

/// An IP range in CIDR notation. A bare address is a full-length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    /// Whether `ip` falls within this range. Families never match each other.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let shift = 32 - u32::from(self.prefix);
                if shift >= 32 {
                    return true;
                }
                (u32::from(net) >> shift) == (u32::from(ip) >> shift)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let shift = 128 - u32::from(self.prefix);
                if shift >= 128 {
                    return true;
                }
                (u128::from(net) >> shift) == (u128::from(ip) >> shift)
            }
            _ => false,
        }
    }
}

/// Error from parsing an [`IpNetwork`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid ip range: {0:?}")]
pub struct IpNetworkError(String);

impl FromStr for IpNetwork {
    type Err = IpNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, prefix_part) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| IpNetworkError(s.to_string()))?;
        let max_prefix = if addr.is_ipv4() { 32 } else { 128 };

        let prefix = match prefix_part {
            Some(p) => p.parse::<u8>().map_err(|_| IpNetworkError(s.to_string()))?,
            None => max_prefix,
        };
        if prefix > max_prefix {
            return Err(IpNetworkError(s.to_string()));
        }

        Ok(Self { addr, prefix })
    }
}

impl<'de> Deserialize<'de> for IpNetwork {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
