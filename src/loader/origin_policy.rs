use crate::error::ShimError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Checks applied to origin URLs recovered from artifacts.
///
/// Artifacts come from an unauthenticated distribution point, so whoever can
/// publish there decides what the loader fetches next. The scheme check is
/// always on; private-address blocking is for relays reachable by others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginPolicy {
    /// Reject loopback, private and link-local IP literals
    pub block_private: bool,
}

impl OriginPolicy {
    pub fn permissive() -> Self {
        Self {
            block_private: false,
        }
    }

    pub fn strict() -> Self {
        Self {
            block_private: true,
        }
    }

    /// Validate an origin URL.
    ///
    /// **IP literals** are checked against blocked ranges when
    /// `block_private` is set. **Hostnames** are accepted without DNS
    /// resolution; DNS rebinding is not covered.
    ///
    /// # Errors
    /// - [`OriginRejection::Malformed`] for unparsable URLs, non-HTTP(S)
    ///   schemes or a missing host
    /// - [`OriginRejection::Blocked`] for blocked addresses
    pub fn check(&self, url: &str) -> Result<Url, OriginRejection> {
        let parsed =
            Url::parse(url).map_err(|e| OriginRejection::Malformed(format!("invalid URL: {e}")))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(OriginRejection::Malformed(format!(
                    "scheme '{scheme}' not allowed, only http/https"
                )));
            }
        }

        let host = parsed
            .host()
            .ok_or_else(|| OriginRejection::Malformed("URL has no host".to_string()))?;

        if self.block_private {
            match host {
                Host::Ipv4(ip) if is_blocked_ipv4(ip) => {
                    return Err(OriginRejection::Blocked(format!(
                        "private or reserved IPv4 address: {ip}"
                    )));
                }
                Host::Ipv6(ip) if is_blocked_ipv6(ip) => {
                    return Err(OriginRejection::Blocked(format!(
                        "private or reserved IPv6 address: {ip}"
                    )));
                }
                _ => {}
            }
        }

        Ok(parsed)
    }
}

/// Why [`OriginPolicy::check`] refused a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginRejection {
    /// Not an absolute http(s) URL
    Malformed(String),
    /// Well-formed but pointing at a blocked address
    Blocked(String),
}

impl OriginRejection {
    /// Convert into the loader error for the artifact at `artifact_url`.
    pub fn into_error(self, artifact_url: &str, origin_url: &str) -> ShimError {
        match self {
            OriginRejection::Malformed(reason) => ShimError::MalformedArtifact {
                url: artifact_url.to_string(),
                reason: format!("origin {origin_url:?}: {reason}"),
            },
            OriginRejection::Blocked(reason) => {
                ShimError::InvalidOrigin(format!("{origin_url}: {reason}"))
            }
        }
    }
}

/// Returns `true` for IPv4 addresses in private or reserved ranges.
///
/// Blocked ranges:
/// - `0.0.0.0/8`      "this" network (RFC 1122)
/// - `10.0.0.0/8`     RFC 1918 private
/// - `127.0.0.0/8`    loopback
/// - `169.254.0.0/16` link-local / cloud metadata
/// - `172.16.0.0/12`  RFC 1918 private
/// - `192.168.0.0/16` RFC 1918 private
fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    let (a, b) = (octets[0], octets[1]);

    a == 0
        || a == 10
        || a == 127
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
}

/// Returns `true` for IPv6 loopback, link-local (`fe80::/10`) and
/// unique-local (`fc00::/7`) addresses.
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    let s = ip.segments();

    ip.is_loopback() || (s[0] & 0xffc0) == 0xfe80 || (s[0] & 0xfe00) == 0xfc00
}
