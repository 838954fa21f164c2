//! DNS-Dispatching Connector (C5): the literal-IP fast path, with hostnames
//! falling through to the Happy Eyeballs dialer.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::connector::Connector;
use crate::dns::Resolver;
use crate::error::ConnectError;
use crate::happy_eyeballs::{DialAttempt, Pacing};
use crate::transport::TransportDialer;
use crate::uri::ParsedUri;

pub struct DnsConnector {
    resolver: Arc<dyn Resolver>,
    pacing: Pacing,
}

impl DnsConnector {
    pub fn new(resolver: Arc<dyn Resolver>, pacing: Pacing) -> Self {
        DnsConnector { resolver, pacing }
    }
}

#[async_trait]
impl Connector for DnsConnector {
    /// `connect(uri) -> Connection | error` from §4.5. A literal IP host
    /// forwards the *original* URI string to C2 unchanged — the Open
    /// Question in §9 resolves in favour of this over reconstructing it.
    async fn connect(&self, uri: &str, cancel: CancellationToken) -> Result<Connection, ConnectError> {
        let parsed = ParsedUri::parse(uri, "tcp")?;

        if parsed.is_literal_ip() {
            return TransportDialer::dial(uri, cancel).await;
        }

        let host = parsed.host.clone();
        DialAttempt::connect(uri.to_string(), host, parsed, self.resolver.clone(), self.pacing, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::test_support::FakeResolver;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn literal_ip_bypasses_the_resolver_entirely() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        // A resolver with no answers configured would fail any hostname
        // lookup; the literal-IP path must never touch it.
        let resolver = Arc::new(FakeResolver::new());
        let connector = DnsConnector::new(resolver, Pacing::Staggered);

        let uri = format!("tcp://{addr}");
        let conn = connector.connect(&uri, CancellationToken::new()).await.unwrap();
        assert!(!conn.is_encrypted());
    }

    #[tokio::test]
    async fn malformed_uri_is_invalid_argument() {
        let resolver = Arc::new(FakeResolver::new());
        let connector = DnsConnector::new(resolver, Pacing::Staggered);
        let err = connector.connect("tcp://:80", CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code(), crate::error::EINVAL);
    }
}
