//! Scheme Router (C7): the top-level connector. Dispatches a URI to a
//! configured per-scheme sub-connector, applying the optional timeout
//! wrapper uniformly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::ClientConfig;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::connector::{Connector, PlainTransportConnector};
use crate::dns::Resolver;
use crate::dns_connector::DnsConnector;
use crate::error::ConnectError;
use crate::happy_eyeballs::Pacing;
use crate::secure_connector::SecureConnector;
use crate::uri::ParsedUri;

/// A per-scheme slot: either routed to a connector or explicitly
/// disabled. §9's Design Notes call for a sentinel variant here rather
/// than overloading `Option` so a caller can't confuse "not configured"
/// with "deliberately turned off".
pub enum SchemeConfig {
    Enabled(Arc<dyn Connector>),
    Disabled,
}

/// Inputs to [`Router::new`], mirroring the option set enumerated in
/// §4.7: `{tcp, tls, unix, dns, timeout, happy_eyeballs}`.
pub struct RouterConfig {
    pub enable_tcp: bool,
    pub enable_tls: bool,
    pub enable_unix: bool,
    /// `None` means `dns: false` — hostnames pass straight through to C2,
    /// which resolves them itself with a single OS lookup and no Happy
    /// Eyeballs racing. `Some` enables C5/C4 for the `tcp`/`tls` schemes.
    pub resolver: Option<Arc<dyn Resolver>>,
    pub happy_eyeballs: bool,
    pub timeout: Option<Duration>,
    /// Required when `enable_tls` is set.
    pub tls_client_config: Option<Arc<ClientConfig>>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            enable_tcp: true,
            enable_tls: false,
            enable_unix: true,
            resolver: None,
            happy_eyeballs: true,
            timeout: None,
            tls_client_config: None,
        }
    }
}

pub struct Router {
    routes: HashMap<String, SchemeConfig>,
    timeout: Option<Duration>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Result<Self, ConnectError> {
        let mut routes = HashMap::new();

        // The "tcp" route also backs `tls://`'s inner dial — built once so
        // both schemes share the same DNS-resolution behaviour.
        let tcp_connector: Arc<dyn Connector> = match &config.resolver {
            Some(resolver) => {
                let pacing = if config.happy_eyeballs { Pacing::Staggered } else { Pacing::Immediate };
                Arc::new(DnsConnector::new(resolver.clone(), pacing))
            }
            None => Arc::new(PlainTransportConnector),
        };

        routes.insert(
            "tcp".to_string(),
            if config.enable_tcp {
                SchemeConfig::Enabled(tcp_connector.clone())
            } else {
                SchemeConfig::Disabled
            },
        );

        if config.enable_tls {
            let client_config = config
                .tls_client_config
                .ok_or_else(|| ConnectError::invalid_argument("tls scheme enabled without a TLS client configuration"))?;
            let secure = Arc::new(SecureConnector::new(tcp_connector, client_config));
            routes.insert("tls".to_string(), SchemeConfig::Enabled(secure));
        } else {
            routes.insert("tls".to_string(), SchemeConfig::Disabled);
        }

        routes.insert(
            "unix".to_string(),
            if config.enable_unix {
                SchemeConfig::Enabled(Arc::new(PlainTransportConnector))
            } else {
                SchemeConfig::Disabled
            },
        );

        Ok(Router {
            routes,
            timeout: config.timeout,
        })
    }

    /// Registers or replaces a sub-connector for a user-supplied scheme
    /// beyond the three recognised defaults (§4.7: "user-supplied").
    pub fn with_scheme(mut self, scheme: &str, connector: Arc<dyn Connector>) -> Self {
        self.routes.insert(scheme.to_ascii_lowercase(), SchemeConfig::Enabled(connector));
        self
    }
}

#[async_trait]
impl Connector for Router {
    async fn connect(&self, uri: &str, cancel: CancellationToken) -> Result<Connection, ConnectError> {
        let parsed = ParsedUri::parse(uri, "tcp")?;
        let scheme = &parsed.scheme;

        let connector = match self.routes.get(scheme) {
            Some(SchemeConfig::Enabled(c)) => c.clone(),
            Some(SchemeConfig::Disabled) | None => return Err(ConnectError::unknown_scheme(scheme)),
        };

        match self.timeout {
            Some(deadline) => {
                crate::timeout::TimeoutConnector::new(connector, deadline)
                    .connect(uri, cancel)
                    .await
            }
            None => connector.connect(uri, cancel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn default_scheme_is_tcp_when_uri_has_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let router = Router::new(RouterConfig::default()).unwrap();
        let conn = router.connect(&addr.to_string(), CancellationToken::new()).await.unwrap();
        assert!(!conn.is_encrypted());
    }

    #[tokio::test]
    async fn disabled_scheme_rejects_with_fixed_message() {
        let mut config = RouterConfig::default();
        config.enable_tcp = false;
        let router = Router::new(config).unwrap();

        let err = router.connect("tcp://127.0.0.1:80", CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "No connector available for URI scheme \"tcp\" (EINVAL)");
    }

    #[tokio::test]
    async fn unknown_scheme_rejects_with_einval() {
        let router = Router::new(RouterConfig::default()).unwrap();
        let err = router.connect("ftp://example.com", CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.code(), crate::error::EINVAL);
    }

    #[tokio::test]
    async fn tls_enabled_without_client_config_is_rejected_at_construction() {
        let mut config = RouterConfig::default();
        config.enable_tls = true;
        let err = Router::new(config).unwrap_err();
        assert_eq!(err.code(), crate::error::EINVAL);
    }
}
