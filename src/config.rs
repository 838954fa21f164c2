//! CLI flags + YAML configuration (A4), in the same `clap` + `serde_yaml`
//! shape the proxy binary this crate started from used.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "happy-connect", version, about = "Happy Eyeballs TCP/TLS/Unix connector demo")]
pub struct Cli {
    /// Optional YAML file overriding the defaults below.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// URI to dial, e.g. `tls://example.com:443` or `1.2.3.4:80`.
    pub uri: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default = "default_true")]
    pub happy_eyeballs: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dns: DnsConfig::default(),
            happy_eyeballs: true,
            timeout_ms: None,
            tls: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DnsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DnsConfig {
    fn default() -> Self {
        DnsConfig { enabled: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsConfig {
    pub ca_file: String,
    /// Present only for mutual TLS.
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

fn default_true() -> bool {
    true
}

pub fn load_config() -> Result<(Cli, Config)> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => {
            let yaml = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            serde_yaml::from_str(&yaml).with_context(|| format!("Failed to parse YAML in {}", path.display()))?
        }
        None => Config::default(),
    };

    Ok((cli, cfg))
}
