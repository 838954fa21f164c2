//! TLS Wrapper (C3): upgrades an established transport to TLS, client- or
//! server-side, with a cancellable handshake. Certificate/key loading
//! follows the teacher's mTLS proxy conventions — PEM files read through
//! `rustls-pemfile`, client auth optional on both sides so plain TLS and
//! mutual TLS share the same builder.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::ConnectError;

pub fn cert_reader<P: AsRef<Path>>(cert_path: P) -> Result<Vec<CertificateDer<'static>>> {
    let cert_file = File::open(cert_path)?;
    let mut reader = BufReader::new(cert_file);
    let parsed = certs(&mut reader);

    let certs: Result<Vec<CertificateDer>, _> = parsed.map(|res| res.map(CertificateDer::from)).collect();
    Ok(certs?)
}

pub fn privkey_reader<P: AsRef<Path>>(key_path: P) -> Result<PrivateKeyDer<'static>> {
    let key_file = File::open(key_path.as_ref())?;
    let mut reader = BufReader::new(key_file);

    let key = pkcs8_private_keys(&mut reader)
        .next()
        .transpose()?
        .ok_or_else(|| anyhow::anyhow!("no PKCS8 key found in {}", key_path.as_ref().display()))?;

    Ok(PrivateKeyDer::Pkcs8(key))
}

pub fn load_root_store<P: AsRef<Path>>(ca_path: P) -> Result<RootCertStore> {
    let ca_certs = cert_reader(&ca_path)?;

    let mut root_store = RootCertStore::empty();
    root_store.add_parsable_certificates(ca_certs);

    if root_store.is_empty() {
        anyhow::bail!("CA-file did not contain any valid certs")
    }
    Ok(root_store)
}

/// Server-side config. `client_cert_ca` enables mutual TLS by requiring and
/// verifying a client certificate against that CA file; `None` accepts any
/// client the way a plain (non-mutual) TLS listener would.
pub fn build_server_config(server_cert: &str, server_key: &str, client_cert_ca: Option<&str>) -> Result<ServerConfig> {
    let cert = cert_reader(server_cert)?;
    let key = privkey_reader(server_key)?;

    let builder = ServerConfig::builder();
    let mut config = match client_cert_ca {
        Some(ca) => {
            let root_store = load_root_store(ca)?;
            let verifier = rustls::server::WebPkiClientVerifier::builder(root_store.into())
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build client verifier: {e}"))?;
            builder.with_client_cert_verifier(verifier).with_single_cert(cert, key)?
        }
        None => builder.with_no_client_auth().with_single_cert(cert, key)?,
    };

    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(config)
}

/// Client-side config. `client_cert` enables mutual TLS by presenting a
/// client certificate; `None` is a plain TLS client.
pub fn build_client_config(
    root_ca: &str,
    client_cert: Option<(&str, &str)>,
) -> Result<ClientConfig> {
    let root_store = load_root_store(root_ca)?;
    let builder = ClientConfig::builder().with_root_certificates(root_store);

    let mut config = match client_cert {
        Some((cert_path, key_path)) => {
            let cert = cert_reader(cert_path)?;
            let key = privkey_reader(key_path)?;
            builder.with_client_auth_cert(cert, key)?
        }
        None => builder.with_no_client_auth(),
    };

    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// `enable(conn, role, context) -> Connection | error` from §4.3. Consumes
/// `conn` and returns a fresh encrypted `Connection` reporting the same
/// endpoints (now rendered with the `tls://` scheme). On any failure the
/// underlying transport is dropped (closing it); on success it is not.
pub async fn enable(
    conn: Connection,
    role: Role,
    server_config: Option<Arc<ServerConfig>>,
    client_config: Option<Arc<ClientConfig>>,
    server_name: Option<ServerName<'static>>,
    uri: &str,
    cancel: CancellationToken,
) -> Result<Connection, ConnectError> {
    let (raw, local, remote, is_unix) = conn.into_parts();

    match role {
        Role::Client => {
            let client_config = client_config.expect("client role requires a ClientConfig");
            let name = server_name.ok_or_else(|| ConnectError::unexpected("TLS client role requires a server name"))?;
            let connector = TlsConnector::from(client_config);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Cancelled TLS handshake (client) for {uri}");
                    Err(ConnectError::tls_handshake_cancelled(uri))
                }
                result = connector.connect(name, raw) => match result {
                    Ok(stream) => Ok(Connection::new(Box::pin(stream), local, remote, is_unix, true)),
                    Err(e) => {
                        warn!("Client TLS handshake failed for {uri}: {e}");
                        Err(ConnectError::tls_handshake_failed(uri, &e.to_string(), crate::error::errno_from_io(&e)))
                    }
                },
            }
        }
        Role::Server => {
            let server_config = server_config.expect("server role requires a ServerConfig");
            let acceptor = TlsAcceptor::from(server_config);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Cancelled TLS handshake (server) for {uri}");
                    Err(ConnectError::tls_handshake_cancelled(uri))
                }
                result = acceptor.accept(raw) => match result {
                    Ok(stream) => Ok(Connection::new(Box::pin(stream), local, remote, is_unix, true)),
                    Err(e) => {
                        warn!("Server TLS handshake failed for {uri}: {e}");
                        Err(ConnectError::tls_handshake_failed(uri, &e.to_string(), crate::error::errno_from_io(&e)))
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use rcgen::generate_simple_self_signed;
    use std::io::Write;
    use tempfile_like::NamedTempFile;

    // Minimal temp-file helper so tests don't need the `tempfile` crate —
    // mirrors what the teacher's cert-loading helpers already expect
    // (paths on disk), without adding a new dependency just for tests.
    mod tempfile_like {
        use std::io::Write;
        use std::path::PathBuf;

        pub struct NamedTempFile {
            path: PathBuf,
        }

        impl NamedTempFile {
            pub fn write(contents: &[u8]) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("happy-connect-test-{}.pem", rand::random::<u64>()));
                let mut f = std::fs::File::create(&path).unwrap();
                f.write_all(contents).unwrap();
                NamedTempFile { path }
            }

            pub fn path(&self) -> &std::path::Path {
                &self.path
            }
        }

        impl Drop for NamedTempFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    fn self_signed_pair(name: &str) -> (NamedTempFile, NamedTempFile, NamedTempFile) {
        let cert = generate_simple_self_signed(vec![name.to_string()]).unwrap();
        let cert_pem = cert.cert.pem();
        let key_pem = cert.key_pair.serialize_pem();
        let cert_file = NamedTempFile::write(cert_pem.as_bytes());
        let key_file = NamedTempFile::write(key_pem.as_bytes());
        let ca_file = NamedTempFile::write(cert_pem.as_bytes());
        (cert_file, key_file, ca_file)
    }

    #[tokio::test]
    async fn client_and_server_handshake_roundtrip() {
        let (cert, key, ca) = self_signed_pair("localhost");
        let server_config = build_server_config(
            cert.path().to_str().unwrap(),
            key.path().to_str().unwrap(),
            None,
        )
        .unwrap();
        let client_config = build_client_config(ca.path().to_str().unwrap(), None).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_cfg = Arc::new(server_config);
        let server_task = tokio::spawn(async move {
            let (sock, peer) = listener.accept().await.unwrap();
            let conn = Connection::new(
                Box::pin(sock),
                Endpoint::tcp(addr),
                Endpoint::tcp(peer),
                false,
                false,
            );
            enable(
                conn,
                Role::Server,
                Some(server_cfg),
                None,
                None,
                "tls://server",
                CancellationToken::new(),
            )
            .await
        });

        let client_sock = tokio::net::TcpStream::connect(addr).await.unwrap();
        let client_conn = Connection::new(
            Box::pin(client_sock),
            Endpoint::Unknown,
            Endpoint::tcp(addr),
            false,
            false,
        );
        let name = ServerName::try_from("localhost").unwrap();
        let client_result = enable(
            client_conn,
            Role::Client,
            None,
            Some(Arc::new(client_config)),
            Some(name),
            "tls://localhost:443",
            CancellationToken::new(),
        )
        .await;

        let server_result = server_task.await.unwrap();

        assert!(client_result.is_ok(), "{:?}", client_result.err());
        assert!(server_result.is_ok(), "{:?}", server_result.err());
        assert!(client_result.unwrap().is_encrypted());
        assert!(server_result.unwrap().is_encrypted());
    }

    #[tokio::test]
    async fn cancellation_during_handshake_yields_econnaborted() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let (_cert, _key, ca) = self_signed_pair("localhost");
        let client_config = build_client_config(ca.path().to_str().unwrap(), None).unwrap();

        let client_sock = tokio::net::TcpStream::connect(addr).await.unwrap();
        let client_conn = Connection::new(
            Box::pin(client_sock),
            Endpoint::Unknown,
            Endpoint::tcp(addr),
            false,
            false,
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let name = ServerName::try_from("localhost").unwrap();
        let err = enable(
            client_conn,
            Role::Client,
            None,
            Some(Arc::new(client_config)),
            Some(name),
            "tls://localhost:443",
            cancel,
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), crate::error::ECONNABORTED);
        assert!(err.to_string().contains("cancelled during TLS handshake"));
    }
}
