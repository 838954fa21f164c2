//! URI model (C1): parse/render `scheme://host:port/path?query#fragment`,
//! classify literal IP vs hostname, and carry the `hostname=` hint injected
//! by the DNS-aware layers.
//!
//! Deliberately hand-rolled rather than built on the `url` crate: the
//! surface this system needs (bracketed-IPv6 authorities, an optional
//! scheme with a caller-supplied default, byte-exact re-rendering, and a
//! single well-known query parameter) is small enough that a dedicated
//! parser is both simpler and keeps control over the one thing that
//! matters here — round-tripping exactly what was fed in.

use std::fmt;
use std::net::IpAddr;

use crate::error::ConnectError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
    pub scheme: String,
    /// Unbracketed: an IPv6 literal is stored as `::1`, never `[::1]`.
    pub host: String,
    pub port: Option<u16>,
    /// Empty string if the input had no path component.
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl ParsedUri {
    /// Parses `input`, defaulting the scheme to `default_scheme` when the
    /// string carries no `://`. Fails with `InvalidArgument`/`EINVAL` on any
    /// malformed input or a missing host.
    pub fn parse(input: &str, default_scheme: &str) -> Result<Self, ConnectError> {
        let owned;
        let full = if input.contains("://") {
            input
        } else {
            owned = format!("{default_scheme}://{input}");
            &owned
        };

        let (scheme, rest) = full
            .split_once("://")
            .ok_or_else(|| ConnectError::invalid_argument(format!("invalid URI: {input}")))?;
        let scheme = scheme.to_ascii_lowercase();

        let (rest, fragment) = match rest.split_once('#') {
            Some((r, f)) => (r, Some(f.to_string())),
            None => (rest, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((r, q)) => (r, Some(q.to_string())),
            None => (rest, None),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx..].to_string()),
            None => (rest, String::new()),
        };

        let (host, port) = parse_authority(authority)
            .ok_or_else(|| ConnectError::invalid_argument(format!("invalid authority in URI: {input}")))?;

        // `unix://` legitimately carries no host — the destination is the
        // path, e.g. `unix:///var/run/app.sock` has an empty authority.
        if host.is_empty() && scheme != "unix" {
            return Err(ConnectError::invalid_argument(format!("missing host in URI: {input}")));
        }

        Ok(ParsedUri {
            scheme,
            host,
            port,
            path,
            query,
            fragment,
        })
    }

    /// True for both IPv4 and IPv6 literal hosts; false for anything that
    /// needs a resolver.
    pub fn is_literal_ip(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }

    /// Requires `port` to be present, as TCP/TLS destinations must carry
    /// one. Unix-domain URIs never call this.
    pub fn require_port(&self, uri: &str) -> Result<u16, ConnectError> {
        self.port
            .ok_or_else(|| ConnectError::invalid_argument(format!("missing port in URI: {uri}")))
    }

    /// The value of a pre-existing `hostname=` query parameter, if any.
    pub fn hostname_param(&self) -> Option<&str> {
        let query = self.query.as_deref()?;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == "hostname").then_some(v)
        })
    }

    /// Returns a copy of this URI with `host` replaced by `ip` and, unless
    /// the URI already carries an explicit `hostname=` parameter, a
    /// `hostname=<original_host>` query parameter appended. The existing
    /// query/fragment are preserved; the pre-existing `hostname=`, if any,
    /// always wins over the injected one.
    pub fn with_candidate(&self, ip: IpAddr, original_host: &str) -> ParsedUri {
        let mut out = self.clone();
        out.host = ip.to_string();
        if self.hostname_param().is_none() {
            out.query = Some(match &self.query {
                Some(existing) => format!("{existing}&hostname={original_host}"),
                None => format!("hostname={original_host}"),
            });
        }
        out
    }

    /// Same authority/path/query/fragment under a different scheme, e.g.
    /// rewriting `tls://` to `tcp://` before delegating to the inner
    /// transport connector.
    pub fn with_scheme(&self, scheme: &str) -> ParsedUri {
        let mut out = self.clone();
        out.scheme = scheme.to_string();
        out
    }
}

impl fmt::Display for ParsedUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

/// Splits `authority` into an unbracketed host and an optional port.
/// Returns `None` on malformed bracket syntax or a non-numeric port.
fn parse_authority(authority: &str) -> Option<(String, Option<u16>)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = match after.strip_prefix(':') {
            Some(p) if !p.is_empty() => Some(p.parse().ok()?),
            Some(_) => None,
            None if after.is_empty() => None,
            None => return None,
        };
        Some((host.to_string(), port))
    } else {
        match authority.split_once(':') {
            Some((host, port)) => Some((host.to_string(), Some(port.parse().ok()?))),
            None => Some((authority.to_string(), None)),
        }
    }
}
