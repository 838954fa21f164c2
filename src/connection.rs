//! The live, bidirectional byte stream handed back to callers (§3
//! `Connection`), plus the endpoint/encryption metadata that survives
//! `close()`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::endpoint::Endpoint;

pub type BoxedStream = Pin<Box<dyn AsyncStream>>;

/// A plain marker trait so [`Connection`] can hold one trait object instead
/// of threading `AsyncRead + AsyncWrite + Unpin + Send` through every
/// signature that touches it.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send + ?Sized> AsyncStream for T {}

/// A live connection. Owned wholly by whichever caller received it —
/// closing or dropping it releases the underlying socket, and subsequent
/// endpoint queries report [`Endpoint::Unknown`] rather than erroring.
pub struct Connection {
    stream: Option<BoxedStream>,
    local: Endpoint,
    remote: Endpoint,
    is_unix: bool,
    is_encrypted: bool,
}

impl Connection {
    pub fn new(stream: BoxedStream, local: Endpoint, remote: Endpoint, is_unix: bool, is_encrypted: bool) -> Self {
        Connection {
            stream: Some(stream),
            local,
            remote,
            is_unix,
            is_encrypted,
        }
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }

    pub fn remote_endpoint(&self) -> Endpoint {
        self.remote.clone()
    }

    /// Renders the local endpoint through its own scheme — `tls://` once
    /// `is_encrypted()`, regardless of the underlying transport.
    pub fn local_endpoint_string(&self) -> String {
        self.local.render(self.is_encrypted)
    }

    /// Renders the remote endpoint through its own scheme — `tls://` once
    /// `is_encrypted()`, regardless of the underlying transport.
    pub fn remote_endpoint_string(&self) -> String {
        self.remote.render(self.is_encrypted)
    }

    pub fn is_unix(&self) -> bool {
        self.is_unix
    }

    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Shuts the stream down and clears the endpoint metadata to the
    /// `Unknown` sentinel. Idempotent.
    pub async fn close(&mut self) -> io::Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.as_mut().shutdown().await?;
        }
        self.local = Endpoint::Unknown;
        self.remote = Endpoint::Unknown;
        Ok(())
    }

    /// Detaches the raw stream so a wrapping layer (C3's TLS handshake) can
    /// take ownership of it. The `Connection` is left closed — the caller
    /// is expected to build a fresh `Connection` around whatever it layers
    /// on top.
    pub(crate) fn into_parts(mut self) -> (BoxedStream, Endpoint, Endpoint, bool) {
        let stream = self.stream.take().expect("into_parts called on a closed connection");
        (stream, self.local.clone(), self.remote.clone(), self.is_unix)
    }
}

impl AsyncRead for Connection {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.stream.as_mut() {
            Some(stream) => stream.as_mut().poll_read(cx, buf),
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"))),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match this.stream.as_mut() {
            Some(stream) => stream.as_mut().poll_write(cx, buf),
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.stream.as_mut() {
            Some(stream) => stream.as_mut().poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.stream.as_mut() {
            Some(stream) => stream.as_mut().poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// Renders both endpoints through [`Connection::remote_endpoint_string`]'s
/// scheme-aware form, so logging a `Connection` directly (e.g. via
/// tracing's `%`) never understates an encrypted connection as `tcp://`.
impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.local_endpoint_string(), self.remote_endpoint_string())
    }
}
