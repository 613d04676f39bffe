use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use log::debug;

use crate::error::ConfigError;
use crate::protocol::{RouterId, MAX_ROUTER_ID};

/// Startup parameters as supplied by the driver, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterSettings {
    pub router_id: i64,
    pub server_name: String,
    pub server_port: u16,
    pub update_interval_ms: i64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            router_id: 0,
            server_name: "localhost".to_string(),
            server_port: 2227,
            update_interval_ms: 1000,
        }
    }
}

impl RouterSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let settings: RouterSettings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Validated configuration of one router node.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub router_id: RouterId,
    pub server_name: String,
    pub relay_addr: SocketAddr,
    pub update_interval: Duration,
}

impl RouterConfig {
    pub fn new(
        router_id: i64,
        server_name: &str,
        server_port: u16,
        update_interval_ms: i64,
    ) -> Result<Self, ConfigError> {
        let router_id = validate_router_id(router_id)?;
        if update_interval_ms < 0 {
            return Err(ConfigError::NegativeInterval(update_interval_ms));
        }
        let relay_addr = resolve_relay(server_name, server_port)?;

        Ok(Self {
            router_id,
            server_name: server_name.to_string(),
            relay_addr,
            update_interval: Duration::from_millis(update_interval_ms as u64),
        })
    }

    pub fn from_settings(settings: &RouterSettings) -> Result<Self, ConfigError> {
        Self::new(
            settings.router_id,
            &settings.server_name,
            settings.server_port,
            settings.update_interval_ms,
        )
    }
}

fn validate_router_id(raw: i64) -> Result<RouterId, ConfigError> {
    if raw < 0 || raw > i64::from(MAX_ROUTER_ID) {
        return Err(ConfigError::InvalidRouterId(raw));
    }
    Ok(raw as RouterId)
}

fn resolve_relay(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let unresolvable = || ConfigError::UnresolvableRelay {
        host: host.to_string(),
        port,
    };

    let mut addrs = (host, port).to_socket_addrs().map_err(|e| {
        debug!("Resolving {}:{} failed: {}", host, port, e);
        unresolvable()
    })?;
    addrs.next().ok_or_else(unresolvable)
}
