//! Binary entry-point: dials a single URI through the Happy Eyeballs
//! connector pipeline and reports what it connected to.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter};

use happy_connect::config::{self, Config};
use happy_connect::router::{Router, RouterConfig};
use happy_connect::tls::build_client_config;
use happy_connect::{Connector, Resolver, TokioResolver};

#[tokio::main]
async fn main() -> Result<()> {
    let (cli, cfg) = config::load_config()?;

    let log_level = cli.log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    info!(uri = %cli.uri, "dialing");

    let router = build_router(&cfg)?;

    match router.connect(&cli.uri, CancellationToken::new()).await {
        Ok(conn) => {
            info!(
                remote = %conn.remote_endpoint_string(),
                local = %conn.local_endpoint_string(),
                encrypted = conn.is_encrypted(),
                "connected"
            );
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}

fn build_router(cfg: &Config) -> Result<Router> {
    let tls_client_config = match &cfg.tls {
        Some(tls) => {
            let client_cert = match (&tls.client_cert, &tls.client_key) {
                (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
                _ => None,
            };
            Some(Arc::new(build_client_config(&tls.ca_file, client_cert)?))
        }
        None => None,
    };

    let router_config = RouterConfig {
        enable_tcp: true,
        enable_tls: tls_client_config.is_some(),
        enable_unix: true,
        resolver: cfg.dns.enabled.then(|| Arc::new(TokioResolver) as Arc<dyn Resolver>),
        happy_eyeballs: cfg.happy_eyeballs,
        timeout: cfg.timeout_ms.map(Duration::from_millis),
        tls_client_config,
    };

    Ok(Router::new(router_config)?)
}
