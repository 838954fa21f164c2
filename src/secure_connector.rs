//! Secure Connector (C6): composes the DNS-dispatching connector with the
//! TLS wrapper — TCP-connect, then TLS-upgrade.

use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::connector::Connector;
use crate::error::ConnectError;
use crate::tls::{self, Role};
use crate::uri::ParsedUri;

pub struct SecureConnector {
    inner: Arc<dyn Connector>,
    client_config: Arc<ClientConfig>,
}

impl SecureConnector {
    pub fn new(inner: Arc<dyn Connector>, client_config: Arc<ClientConfig>) -> Self {
        SecureConnector { inner, client_config }
    }
}

#[async_trait]
impl Connector for SecureConnector {
    /// `connect(uri) -> Connection | error` from §4.6. Accepts a `tls://`
    /// URI (default-prefixed if bare), dials the inner `tcp://` form, then
    /// layers TLS on the result.
    async fn connect(&self, uri: &str, cancel: CancellationToken) -> Result<Connection, ConnectError> {
        let outer = ParsedUri::parse(uri, "tls")?;
        let outer_rendered = outer.to_string();
        let inner_uri = outer.with_scheme("tcp").to_string();

        let conn = self
            .inner
            .connect(&inner_uri, cancel.clone())
            .await
            .map_err(|e| {
                warn!("Base connect for {outer_rendered} failed: {e}");
                e.rewrap_uri(outer_rendered.clone())
            })?;

        if conn.is_closed() {
            return Err(ConnectError::unexpected(
                "Base connector does not use internal Connection class exposing stream resource",
            ));
        }

        let server_name = ServerName::try_from(outer.host.clone())
            .map_err(|_| ConnectError::invalid_argument(format!("invalid TLS server name: {}", outer.host)))?;

        debug!("Upgrading {outer_rendered} to TLS");
        tls::enable(
            conn,
            Role::Client,
            None,
            Some(self.client_config.clone()),
            Some(server_name),
            &outer_rendered,
            cancel,
        )
        .await
    }
}
