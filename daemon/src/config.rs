use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use suggest_core::DEFAULT_SOURCE_PATH;

use crate::session::SessionSettings;
use crate::util::{env_parse, env_string};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

impl DaemonConfig {
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path();
        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            DaemonConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse TOML from {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(host) = env_string("SUGGESTD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("SUGGESTD_PORT") {
            self.server.port = port;
        }
        if let Some(path) = env_string("SUGGESTD_SOURCE") {
            self.refresh.source_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh.interval_secs == 0 {
            bail!("refresh.interval_secs must be greater than zero");
        }
        if !self.server.route.starts_with('/') {
            bail!("server.route must be an absolute path, got {:?}", self.server.route);
        }
        self.server.bind_addr()?;
        Ok(())
    }
}

fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("SUGGESTD_CONFIG") {
        return Path::new(&path).to_path_buf();
    }

    if let Some(base) = dirs::config_dir() {
        return base.join("suggestd").join("config.toml");
    }

    Path::new("/etc/suggestd.toml").to_path_buf()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_route")]
    pub route: String,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    /// Accepts IPv4 and IPv6 literals (bracketed or not) and host names.
    /// A name resolving to several addresses binds the first one.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let host = self
            .host
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(&self.host);
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        (host, self.port)
            .to_socket_addrs()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("host {} resolved to no addresses", self.host))
    }

    /// Bounds the wait for the head of the next request on a connection.
    /// `None` disables it.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_body_bytes: self.max_body_bytes,
            idle_timeout: self.idle_timeout(),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            route: default_route(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_route() -> String {
    "/v1/app/suggest".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_source_path")]
    pub source_path: PathBuf,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            source_path: default_source_path(),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_source_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOURCE_PATH)
}

fn default_interval_secs() -> u64 {
    900
}
