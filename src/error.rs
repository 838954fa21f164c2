//! Unified error type for the connector/dialer pipeline.
//!
//! Every layer (C2–C8) rewraps the message with its own URI context while
//! preserving the integer code and a chain reference to the prior error,
//! per the propagation policy in the design notes. Rather than building the
//! final string by hand at every call site, [`ConnectError`] keeps the URI
//! and the "rest of the message" as separate fields so a higher layer can
//! swap the URI in without re-parsing anything it prints.

use std::fmt;

/// Fallback errno-style constants used when the OS doesn't hand us a raw
/// value. These match the real Linux errno numbers so the fallback is at
/// least consistent with what `strerror` would report.
pub const EINVAL: i32 = 22;
pub const EADDRINUSE: i32 = 98;
pub const EADDRNOTAVAIL: i32 = 99;
pub const ENETUNREACH: i32 = 101;
pub const ECONNABORTED: i32 = 103;
pub const ECONNREFUSED: i32 = 111;
pub const ETIMEDOUT: i32 = 110;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Transport,
    Dns,
    Tls,
    Cancelled,
    Timeout,
    Unexpected,
}

/// Returns the symbolic name for one of the documented/fallback codes, or
/// a synthesized `E<n>` for anything else (e.g. a raw OS errno we don't
/// special-case).
pub fn code_name(code: i32) -> String {
    match code {
        EINVAL => "EINVAL".to_string(),
        EADDRINUSE => "EADDRINUSE".to_string(),
        EADDRNOTAVAIL => "EADDRNOTAVAIL".to_string(),
        ENETUNREACH => "ENETUNREACH".to_string(),
        ECONNABORTED => "ECONNABORTED".to_string(),
        ECONNREFUSED => "ECONNREFUSED".to_string(),
        ETIMEDOUT => "ETIMEDOUT".to_string(),
        other => format!("E{other}"),
    }
}

/// Maps an I/O error to an errno-style code, preferring the OS's own value
/// and falling back to the documented constants by `ErrorKind` otherwise.
pub fn errno_from_io(err: &std::io::Error) -> i32 {
    if let Some(raw) = err.raw_os_error() {
        return raw;
    }
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => ECONNREFUSED,
        std::io::ErrorKind::ConnectionAborted => ECONNABORTED,
        std::io::ErrorKind::AddrInUse => EADDRINUSE,
        std::io::ErrorKind::AddrNotAvailable => EADDRNOTAVAIL,
        std::io::ErrorKind::TimedOut => ETIMEDOUT,
        _ => ENETUNREACH,
    }
}

/// The crate's single error type. `uri` and `detail` are kept apart so a
/// wrapping layer can graft on its own URI (see [`ConnectError::rewrap_uri`])
/// without reparsing a rendered string.
#[derive(Debug, Clone)]
pub struct ConnectError {
    kind: ErrorKind,
    code: i32,
    uri: Option<String>,
    detail: String,
    source: Option<Box<ConnectError>>,
}

impl ConnectError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn bare(kind: ErrorKind, code: i32, detail: impl Into<String>) -> Self {
        ConnectError {
            kind,
            code,
            uri: None,
            detail: detail.into(),
            source: None,
        }
    }

    fn scoped(kind: ErrorKind, code: i32, uri: impl Into<String>, detail: impl Into<String>) -> Self {
        ConnectError {
            kind,
            code,
            uri: Some(uri.into()),
            detail: detail.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: ConnectError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Rebuild this error under a different URI, e.g. when an outer
    /// connector (C6's `tls://`) wraps an inner one (C5's `tcp://`). The
    /// original becomes the `source` of the returned error.
    pub fn rewrap_uri(&self, new_uri: impl Into<String>) -> Self {
        ConnectError {
            kind: self.kind,
            code: self.code,
            uri: Some(new_uri.into()),
            detail: self.detail.clone(),
            source: Some(Box::new(self.clone())),
        }
    }

    // ---- InvalidArgument -------------------------------------------------

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::bare(ErrorKind::InvalidArgument, EINVAL, detail)
    }

    pub fn unknown_scheme(scheme: &str) -> Self {
        Self::invalid_argument(format!(
            "No connector available for URI scheme \"{scheme}\" ({})",
            code_name(EINVAL)
        ))
    }

    // ---- Transport (C2) ----------------------------------------------------

    pub fn transport_failed(uri: &str, detail: &str, code: i32) -> Self {
        Self::scoped(
            ErrorKind::Transport,
            code,
            uri,
            format!("failed: {detail} ({})", code_name(code)),
        )
    }

    pub fn transport_cancelled(uri: &str) -> Self {
        Self::scoped(
            ErrorKind::Cancelled,
            ECONNABORTED,
            uri,
            format!("cancelled ({})", code_name(ECONNABORTED)),
        )
    }

    // ---- TLS (C3) ------------------------------------------------------

    pub fn tls_handshake_cancelled(uri: &str) -> Self {
        Self::scoped(
            ErrorKind::Cancelled,
            ECONNABORTED,
            uri,
            format!("cancelled during TLS handshake ({})", code_name(ECONNABORTED)),
        )
    }

    pub fn tls_handshake_failed(uri: &str, underlying: &str, code: i32) -> Self {
        Self::scoped(
            ErrorKind::Tls,
            code,
            uri,
            format!("failed during TLS handshake: {underlying}"),
        )
    }

    // ---- Happy Eyeballs (C4) --------------------------------------------

    pub fn dial_cancelled(uri: &str, during_dns: bool) -> Self {
        let detail = if during_dns {
            format!("cancelled during DNS lookup ({})", code_name(ECONNABORTED))
        } else {
            format!("cancelled ({})", code_name(ECONNABORTED))
        };
        Self::scoped(ErrorKind::Cancelled, ECONNABORTED, uri, detail)
    }

    pub fn aggregate_failure(uri: &str, dns_only: bool, code: i32, body: &str) -> Self {
        let kind = if dns_only { ErrorKind::Dns } else { ErrorKind::Transport };
        let detail = if dns_only {
            format!("failed during DNS lookup: {body}")
        } else {
            format!("failed: {body}")
        };
        Self::scoped(kind, code, uri, detail)
    }

    // ---- Timeout (C8) -----------------------------------------------------

    pub fn timeout(uri: &str, after: std::time::Duration) -> Self {
        Self::scoped(
            ErrorKind::Timeout,
            ETIMEDOUT,
            uri,
            format!("timed out after {after:?} ({})", code_name(ETIMEDOUT)),
        )
    }

    // ---- Programmer error (C6) --------------------------------------------

    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self::bare(ErrorKind::Unexpected, ECONNABORTED, detail)
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.uri {
            Some(uri) => write!(f, "Connection to {uri} {}", self.detail),
            None => f.write_str(&self.detail),
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for ConnectError {
    fn from(err: std::io::Error) -> Self {
        let code = errno_from_io(&err);
        ConnectError::bare(ErrorKind::Transport, code, err.to_string())
    }
}
