//! Server endpoints and the resolver that maps selectors onto them.
//!
//! Endpoints come from a single spec string of the form
//! `host1:port1,host2:port2 host3:port3`. Order matters: the resolver maps a
//! selector to `endpoints[|selector| mod len]`, so sequential selectors walk
//! the list in the order it was written.

mod resolver;

pub use resolver::EndpointResolver;

use std::fmt;

/// One reachable server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse one `host[:port]` token. Returns None when the token has no
    /// host part.
    ///
    /// A missing port becomes 0. So does any port that is not a `u16`:
    /// non-numeric text, negative numbers and values above 65535 alike. The
    /// latter cases log a warning, and connecting to port 0 then fails as an
    /// ordinary restartable transport fault.
    pub fn parse_token(token: &str) -> Option<Self> {
        let mut parts = token.split(':');
        let host = parts.next().unwrap_or("").trim();
        if host.is_empty() {
            return None;
        }
        let port = match parts.find(|p| !p.is_empty()).map(str::trim) {
            None => 0,
            Some(raw) => raw.parse::<u16>().unwrap_or_else(|e| {
                tracing::warn!(token, port = raw, error = %e, "invalid port, using 0");
                0
            }),
        };
        Some(Self::new(host, port))
    }

    /// `host:port` form suitable for `ToSocketAddrs`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Split a spec string on runs of commas and whitespace and parse each token.
/// Tokens without a host are skipped.
pub fn parse_endpoints(spec: &str) -> Vec<Endpoint> {
    spec.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .filter_map(Endpoint::parse_token)
        .collect()
}
