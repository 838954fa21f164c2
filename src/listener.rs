//! Server-side listeners (A3). Mirrors the client connectors' shape —
//! `accept()` returns the same [`Connection`] type `connect()` does — but
//! stays intentionally thin: accept-loop scheduling, FD inheritance, and
//! connection-count limiting are explicitly out of scope (§1).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustls::ServerConfig;
use tokio::net::{TcpListener as TokioTcpListener, UnixListener as TokioUnixListener};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::ConnectError;
use crate::tls::{self, Role};

/// Plain TCP listener. `pause`/`resume` only gate whether `accept()` is
/// willing to hand out new connections — an idle (never-paused) listener
/// is unaffected, keeping the round-trip property from §8 trivially true.
pub struct TcpListener {
    inner: TokioTcpListener,
    paused: AtomicBool,
    resumed: Notify,
}

impl TcpListener {
    pub async fn bind(addr: std::net::SocketAddr) -> std::io::Result<Self> {
        Ok(TcpListener {
            inner: TokioTcpListener::bind(addr).await?,
            paused: AtomicBool::new(false),
            resumed: Notify::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Accepts the next connection. While paused, waits for `resume()` to
    /// be called before completing — it does not drop or refuse the
    /// pending peer, it simply defers handing it to the caller.
    pub async fn accept(&self) -> std::io::Result<Connection> {
        loop {
            let (stream, peer) = self.inner.accept().await?;
            loop {
                let notified = self.resumed.notified();
                if !self.is_paused() {
                    break;
                }
                notified.await;
            }
            let local = stream.local_addr().map(Endpoint::tcp).unwrap_or(Endpoint::Unknown);
            debug!("Accepted connection from {peer}");
            return Ok(Connection::new(Box::pin(stream), local, Endpoint::tcp(peer), false, false));
        }
    }
}

pub struct UnixListener {
    inner: TokioUnixListener,
    paused: AtomicBool,
    resumed: Notify,
}

impl UnixListener {
    pub fn bind<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        Ok(UnixListener {
            inner: TokioUnixListener::bind(path)?,
            paused: AtomicBool::new(false),
            resumed: Notify::new(),
        })
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    pub async fn accept(&self) -> std::io::Result<Connection> {
        loop {
            let (stream, _addr) = self.inner.accept().await?;
            loop {
                let notified = self.resumed.notified();
                if !self.paused.load(Ordering::SeqCst) {
                    break;
                }
                notified.await;
            }
            debug!("Accepted Unix-domain connection");
            return Ok(Connection::new(Box::pin(stream), Endpoint::Unknown, Endpoint::Unknown, true, false));
        }
    }
}

/// Layers C3's server-side handshake over any of the above, producing an
/// encrypted [`Connection`] per accepted peer.
pub struct TlsListener<L> {
    inner: L,
    server_config: Arc<ServerConfig>,
}

impl<L> TlsListener<L> {
    pub fn new(inner: L, server_config: Arc<ServerConfig>) -> Self {
        TlsListener { inner, server_config }
    }
}

impl TlsListener<TcpListener> {
    pub async fn accept(&self) -> Result<Connection, ConnectError> {
        let conn = self
            .inner
            .accept()
            .await
            .map_err(|e| ConnectError::transport_failed("tls://listener", &e.to_string(), crate::error::errno_from_io(&e)))?;
        tls::enable(
            conn,
            Role::Server,
            Some(self.server_config.clone()),
            None,
            None,
            "tls://listener",
            CancellationToken::new(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pause_then_resume_on_an_idle_listener_is_a_no_op() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert!(!listener.is_paused());
        listener.pause();
        assert!(listener.is_paused());
        listener.resume();
        assert!(!listener.is_paused());
    }

    #[tokio::test]
    async fn accept_hands_back_a_plaintext_connection() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { tokio::net::TcpStream::connect(addr).await.unwrap() });

        let conn = listener.accept().await.unwrap();
        let _client_stream = client.await.unwrap();

        assert!(!conn.is_encrypted());
        assert!(!conn.is_unix());
    }
}
