//! Timeout Wrapper (C8): races a connector's result against a deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::connector::Connector;
use crate::error::ConnectError;

pub struct TimeoutConnector {
    inner: Arc<dyn Connector>,
    deadline: Duration,
}

impl TimeoutConnector {
    pub fn new(inner: Arc<dyn Connector>, deadline: Duration) -> Self {
        TimeoutConnector { inner, deadline }
    }
}

#[async_trait]
impl Connector for TimeoutConnector {
    /// `connect(uri) -> Connection | error` from §4.8. On timer-first,
    /// cancels the inner attempt via `cancel` and fails with `Timeout`;
    /// on inner-first, the result passes through unchanged; a caller
    /// cancellation is forwarded straight to the inner connector.
    async fn connect(&self, uri: &str, cancel: CancellationToken) -> Result<Connection, ConnectError> {
        let inner_cancel = cancel.child_token();
        let inner_fut = self.inner.connect(uri, inner_cancel.clone());
        tokio::pin!(inner_fut);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                inner_cancel.cancel();
                inner_fut.await
            }
            result = &mut inner_fut => result,
            _ = tokio::time::sleep(self.deadline) => {
                inner_cancel.cancel();
                let _ = inner_fut.await;
                Err(ConnectError::timeout(uri, self.deadline))
            }
        }
    }
}
