//! Transport Dialer (C2): opens a single TCP or Unix connection to an
//! already-resolved IP/path.

use tokio::net::{TcpStream, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::ConnectError;
use crate::uri::ParsedUri;

/// `dial(endpoint, options) -> Connection | error` from §4.2. Takes the
/// already-rendered URI string so error messages can quote it verbatim.
pub struct TransportDialer;

impl TransportDialer {
    pub async fn dial(uri: &str, cancel: CancellationToken) -> Result<Connection, ConnectError> {
        let parsed = ParsedUri::parse(uri, "tcp")?;
        match parsed.scheme.as_str() {
            "tcp" => Self::dial_tcp(uri, &parsed, cancel).await,
            "unix" => Self::dial_unix(uri, &parsed, cancel).await,
            other => Err(ConnectError::invalid_argument(format!(
                "transport dialer cannot handle scheme \"{other}\""
            ))),
        }
    }

    async fn dial_tcp(uri: &str, parsed: &ParsedUri, cancel: CancellationToken) -> Result<Connection, ConnectError> {
        let port = parsed.require_port(uri)?;

        let addr = match parsed.host.parse() {
            Ok(ip) => std::net::SocketAddr::new(ip, port),
            // Not a literal — this is the `dns: false` pass-through path
            // (router.rs wires `PlainTransportConnector` straight to us when
            // no resolver is configured): resolve through the OS stub
            // resolver and take its first answer, with no Happy Eyeballs
            // racing or interleaving.
            Err(_) => {
                let lookup = format!("{}:{port}", parsed.host);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Cancelled before DNS lookup for {uri}");
                        return Err(ConnectError::transport_cancelled(uri));
                    }
                    result = tokio::net::lookup_host(lookup) => {
                        let mut addrs = result.map_err(|e| {
                            ConnectError::invalid_argument(format!("DNS lookup for {} failed: {e}", parsed.host))
                        })?;
                        addrs
                            .next()
                            .ok_or_else(|| ConnectError::invalid_argument(format!("no addresses found for host {}", parsed.host)))?
                    }
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Cancelled dialing {uri}");
                Err(ConnectError::transport_cancelled(uri))
            }
            result = TcpStream::connect(addr) => match result {
                Ok(stream) => {
                    let local = stream
                        .local_addr()
                        .map(Endpoint::tcp)
                        .unwrap_or(Endpoint::Unknown);
                    let remote = Endpoint::tcp(addr);
                    Ok(Connection::new(Box::pin(stream), local, remote, false, false))
                }
                Err(e) => {
                    warn!("Failed to connect to {uri}: {e}");
                    Err(ConnectError::transport_failed(uri, &e.to_string(), crate::error::errno_from_io(&e)))
                }
            },
        }
    }

    async fn dial_unix(uri: &str, parsed: &ParsedUri, cancel: CancellationToken) -> Result<Connection, ConnectError> {
        let path = format!("{}{}", parsed.host, parsed.path);
        let path = if parsed.host.is_empty() { parsed.path.clone() } else { path };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Cancelled dialing {uri}");
                Err(ConnectError::transport_cancelled(uri))
            }
            result = UnixStream::connect(&path) => match result {
                Ok(stream) => {
                    let remote = Endpoint::Unix(path.into());
                    Ok(Connection::new(Box::pin(stream), Endpoint::Unknown, remote, true, false))
                }
                Err(e) => {
                    warn!("Failed to connect to {uri}: {e}");
                    Err(ConnectError::transport_failed(uri, &e.to_string(), crate::error::errno_from_io(&e)))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn dials_a_live_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let uri = format!("tcp://{addr}");
        let conn = TransportDialer::dial(&uri, CancellationToken::new()).await.unwrap();
        assert!(!conn.is_encrypted());
        assert!(!conn.is_unix());
    }

    #[tokio::test]
    async fn hostname_pass_through_resolves_without_a_resolver() {
        // `localhost` is not a literal IP, so this exercises dial_tcp's
        // fallback OS-resolution path used when `dns: false`.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let uri = format!("tcp://localhost:{port}");
        let conn = TransportDialer::dial(&uri, CancellationToken::new()).await.unwrap();
        assert!(!conn.is_encrypted());
    }

    #[tokio::test]
    async fn refused_connection_reports_econnrefused() {
        // Port 1 is privileged and essentially never listening in test sandboxes.
        let uri = "tcp://127.0.0.1:1";
        let err = TransportDialer::dial(uri, CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("Connection to tcp://127.0.0.1:1 failed:"));
    }

    #[tokio::test]
    async fn cancellation_before_connect_yields_econnaborted() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = TransportDialer::dial("tcp://127.0.0.1:80", cancel).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ECONNABORTED);
        assert!(err.to_string().contains("cancelled (ECONNABORTED)"));
    }
}
