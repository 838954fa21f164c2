//! The `Connector` contract (§6): every sub-connector in the pipeline —
//! transport, DNS-dispatching, secure, and the top-level router — answers
//! to the same `connect(uri) -> Connection` shape so C7 can hold them
//! behind one trait object per configured scheme.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::error::ConnectError;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, uri: &str, cancel: CancellationToken) -> Result<Connection, ConnectError>;
}

/// Adapts the bare [`crate::transport::TransportDialer`] to the
/// `Connector` trait — used directly for `unix://` and, when DNS
/// resolution is disabled, for `tcp://` with hostname pass-through.
pub struct PlainTransportConnector;

#[async_trait]
impl Connector for PlainTransportConnector {
    async fn connect(&self, uri: &str, cancel: CancellationToken) -> Result<Connection, ConnectError> {
        crate::transport::TransportDialer::dial(uri, cancel).await
    }
}
