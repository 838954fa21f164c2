//! Opaque connection destinations (§3 `Endpoint`).

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp { ip: IpAddr, port: u16 },
    Unix(PathBuf),
    /// The sentinel returned by a closed [`crate::connection::Connection`];
    /// never an error.
    Unknown,
}

impl Endpoint {
    pub fn tcp(addr: SocketAddr) -> Self {
        Endpoint::Tcp {
            ip: addr.ip(),
            port: addr.port(),
        }
    }

    pub fn is_v6(&self) -> bool {
        matches!(self, Endpoint::Tcp { ip, .. } if ip.is_ipv6())
    }

    /// Renders this endpoint's own scheme-qualified form, e.g.
    /// `tcp://1.2.3.4:80` or `unix:///var/run/app.sock`. An encrypted
    /// connection always reports `tls://` regardless of the underlying
    /// transport.
    pub fn render(&self, encrypted: bool) -> String {
        match self {
            Endpoint::Tcp { ip, port } => {
                let scheme = if encrypted { "tls" } else { "tcp" };
                if ip.is_ipv6() {
                    format!("{scheme}://[{ip}]:{port}")
                } else {
                    format!("{scheme}://{ip}:{port}")
                }
            }
            Endpoint::Unix(path) => {
                let scheme = if encrypted { "tls" } else { "unix" };
                format!("{scheme}://{}", path.display())
            }
            Endpoint::Unknown => "unknown://".to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_endpoint_always_renders_tls_scheme() {
        let ep = Endpoint::tcp("1.2.3.4:80".parse().unwrap());
        assert_eq!(ep.render(false), "tcp://1.2.3.4:80");
        assert_eq!(ep.render(true), "tls://1.2.3.4:80");
    }

    #[test]
    fn unknown_sentinel_is_infallible() {
        let ep = Endpoint::Unknown;
        assert_eq!(ep.render(false), "unknown://");
    }
}
