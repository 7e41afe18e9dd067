//! Per-watcher and generator-wide options.
//!
//! Values arrive already parsed from the service manifest. Anything whose
//! validity depends on the generator (the service mode, required commands)
//! is checked by the generators themselves, not by serde.

use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::GeneratorError;
use crate::models::UpstreamOrder;

pub const DEFAULT_LISTEN_ADDRESS: &str = "localhost";

const fn default_true() -> bool {
    true
}

const fn default_restart_interval() -> u64 {
    2
}

/// Options a watcher carries for one generator
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeneratorOptions {
    #[serde(default)]
    pub mode: Option<String>,
    /// Listener port; without one only the upstream is rendered
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub listen_address: Option<String>,
    #[serde(default)]
    pub upstream_name: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    /// Listener-scope directives
    #[serde(default, alias = "listen")]
    pub server: Vec<String>,
    /// Upstream-scope directives
    #[serde(default)]
    pub upstream: Vec<String>,
    #[serde(default)]
    pub server_options: Option<String>,
    #[serde(default)]
    pub upstream_order: Option<UpstreamOrder>,
}

impl GeneratorOptions {
    pub fn mode(&self, watcher: &str) -> Result<ProxyMode, GeneratorError> {
        match self.mode.as_deref() {
            None => Ok(ProxyMode::Http),
            Some(mode) => mode.parse().map_err(|_| GeneratorError::UnknownMode {
                watcher: watcher.to_string(),
                mode: mode.to_string(),
            }),
        }
    }

    pub fn upstream_name<'a>(&'a self, watcher: &'a str) -> &'a str {
        self.upstream_name.as_deref().unwrap_or(watcher)
    }

    pub fn upstream_order(&self) -> UpstreamOrder {
        self.upstream_order.unwrap_or_default()
    }

    /// Watcher address, then generator address, then localhost
    pub fn listen_address<'a>(&'a self, fallback: Option<&'a str>) -> &'a str {
        self.listen_address
            .as_deref()
            .or(fallback)
            .unwrap_or(DEFAULT_LISTEN_ADDRESS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    Http,
    Tcp,
}

impl FromStr for ProxyMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ProxyMode::Http),
            "tcp" => Ok(ProxyMode::Tcp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyMode::Http => f.write_str("http"),
            ProxyMode::Tcp => f.write_str("tcp"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NginxConfig {
    /// Context name to directives, rendered in declaration order
    #[serde(default)]
    pub contexts: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub listen_address: Option<String>,
    #[serde(default)]
    pub config_file_path: Option<PathBuf>,
    #[serde(default)]
    pub check_command: Option<String>,
    #[serde(default)]
    pub reload_command: Option<String>,
    #[serde(default)]
    pub start_command: Option<String>,
    #[serde(default = "default_true")]
    pub do_writes: bool,
    #[serde(default = "default_true")]
    pub do_reloads: bool,
    #[serde(default = "default_restart_interval")]
    pub restart_interval: u64,
    /// Fraction of `restart_interval` added as random delay
    #[serde(default)]
    pub restart_jitter: f64,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            contexts: IndexMap::new(),
            listen_address: None,
            config_file_path: None,
            check_command: None,
            reload_command: None,
            start_command: None,
            do_writes: default_true(),
            do_reloads: default_true(),
            restart_interval: default_restart_interval(),
            restart_jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HaproxyConfig {
    #[serde(default)]
    pub global: Option<Vec<String>>,
    #[serde(default)]
    pub defaults: Option<Vec<String>>,
    #[serde(default)]
    pub listen_address: Option<String>,
    #[serde(default)]
    pub config_file_path: Option<PathBuf>,
    #[serde(default)]
    pub reload_command: Option<String>,
    #[serde(default)]
    pub start_command: Option<String>,
    #[serde(default = "default_true")]
    pub do_writes: bool,
    #[serde(default = "default_true")]
    pub do_reloads: bool,
    #[serde(default = "default_restart_interval")]
    pub restart_interval: u64,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            global: None,
            defaults: None,
            listen_address: None,
            config_file_path: None,
            reload_command: None,
            start_command: None,
            do_writes: default_true(),
            do_reloads: default_true(),
            restart_interval: default_restart_interval(),
        }
    }
}

/// Names of the options flagged as absent
pub(crate) fn missing_options(options: &[(&'static str, bool)]) -> Vec<&'static str> {
    options
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect()
}
