//! A cancellable TCP/TLS/Unix connector pipeline built around an RFC
//! 8305-style Happy Eyeballs dialer: concurrent A/AAAA resolution,
//! interleaved candidate racing, and a scheme-routed composition of
//! transport, TLS, and timeout wrappers.

pub mod config;
pub mod connection;
pub mod connector;
pub mod dns;
pub mod dns_connector;
pub mod endpoint;
pub mod error;
pub mod happy_eyeballs;
pub mod listener;
pub mod router;
pub mod secure_connector;
pub mod timeout;
pub mod tls;
pub mod transport;
pub mod uri;

pub use connection::Connection;
pub use connector::Connector;
pub use dns::{RecordType, Resolver, TokioResolver};
pub use endpoint::Endpoint;
pub use error::ConnectError;
pub use happy_eyeballs::Pacing;
pub use router::{Router, RouterConfig, SchemeConfig};
pub use uri::ParsedUri;
