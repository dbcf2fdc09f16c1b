use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

pub const DEFAULT_NAME: &str = "Heliotherm Heatpump";
pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_UNIT_ID: u8 = 1;
/// Seconds between two poll cycles.
pub const DEFAULT_SCAN_INTERVAL: u64 = 15;
/// Shorter scan intervals fall back to [`DEFAULT_SCAN_INTERVAL`].
pub const MIN_SCAN_INTERVAL: u64 = 5;

/// Environment variables with this prefix override file values, e.g. `HELIOTHERM_HOST`.
pub const ENV_PREFIX: &str = "HELIOTHERM_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Connection parameters of one heat pump.
pub struct GatewayConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Seconds.
    pub scan_interval: u64,
    /// Seconds, per connect and per request.
    pub timeout: u64,
    pub retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            host: String::new(),
            port: DEFAULT_PORT,
            unit_id: DEFAULT_UNIT_ID,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            timeout: 3,
            retries: 3,
        }
    }
}

impl GatewayConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Self::default()
        }
    }

    /// Defaults, then the TOML file if given, then `HELIOTHERM_*` environment variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(GatewayConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: GatewayConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Configuration("host must not be empty".to_string()));
        }
        if self.timeout == 0 {
            return Err(Error::Configuration(
                "timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| {
                Error::Configuration(format!("cannot resolve {}:{}: {err}", self.host, self.port))
            })?
            .next()
            .ok_or_else(|| {
                Error::Configuration(format!("{}:{} resolves to no address", self.host, self.port))
            })
    }

    /// Poll interval with the floor applied.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(effective_scan_interval(self.scan_interval))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

pub fn effective_scan_interval(seconds: u64) -> u64 {
    if seconds < MIN_SCAN_INTERVAL {
        warn!(
            seconds,
            fallback = DEFAULT_SCAN_INTERVAL,
            "scan interval below {MIN_SCAN_INTERVAL}s, using default"
        );
        DEFAULT_SCAN_INTERVAL
    } else {
        seconds
    }
}
