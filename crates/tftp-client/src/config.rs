use std::net::Ipv4Addr;
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TftpError};

/// Process-wide engine configuration: block size preference, the
/// well-known MTFTP multicast endpoint, and retry-timer bounds. Read by
/// every transfer at open time; mutation is rare (a config reload) and
/// does not need to be synchronized with transfers already in flight,
/// since each holds its own copy captured when it started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_block_size: usize,
    pub mtftp_multicast_addr: Ipv4Addr,
    pub mtftp_multicast_port: u16,
    pub timer_initial_ms: u64,
    pub timer_cap_ms: u64,
    pub timer_max_attempts: u32,
    /// Consecutive RRQ-timer expirations with no reply, while waiting for
    /// an MTFTP transfer's first reply, before falling back to plain TFTP.
    pub mtftp_fallback_cap: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_block_size: crate::DEFAULT_BLOCK_SIZE,
            mtftp_multicast_addr: Ipv4Addr::new(239, 255, 1, 1),
            mtftp_multicast_port: 3001,
            timer_initial_ms: 1_000,
            timer_cap_ms: 8_000,
            timer_max_attempts: 5,
            mtftp_fallback_cap: 3,
        }
    }
}

static GLOBAL: OnceLock<RwLock<EngineConfig>> = OnceLock::new();

fn global_lock() -> &'static RwLock<EngineConfig> {
    GLOBAL.get_or_init(|| RwLock::new(EngineConfig::default()))
}

/// Returns a snapshot of the current process-wide configuration.
pub fn global_config() -> EngineConfig {
    global_lock().read().unwrap().clone()
}

/// Replaces the process-wide configuration. Transfers already running
/// keep the snapshot they opened with.
pub fn set_global_config(config: EngineConfig) {
    *global_lock().write().unwrap() = config;
}

pub fn load_config(path: &std::path::Path) -> Result<EngineConfig> {
    let contents = std::fs::read_to_string(path).map_err(TftpError::Network)?;
    toml::from_str(&contents)
        .map_err(|e| TftpError::InvalidArgument(format!("invalid config file {}: {e}", path.display())))
}

pub fn write_default_config(path: &std::path::Path) -> Result<()> {
    write_config(path, &EngineConfig::default())
}

pub fn write_config(path: &std::path::Path, config: &EngineConfig) -> Result<()> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| TftpError::InvalidArgument(format!("failed to serialize config: {e}")))?;
    std::fs::write(path, contents).map_err(TftpError::Network)
}

/// Validates that a loaded configuration is usable before it is
/// installed as the process-wide default.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    if config.default_block_size < 8 || config.default_block_size > crate::MAX_BLOCK_SIZE {
        return Err(TftpError::InvalidArgument(format!(
            "default_block_size must be between 8 and {}",
            crate::MAX_BLOCK_SIZE
        )));
    }
    if !(1024..=65535).contains(&config.mtftp_multicast_port) {
        return Err(TftpError::InvalidArgument(
            "mtftp_multicast_port must be in range 1024-65535".to_string(),
        ));
    }
    if !config.mtftp_multicast_addr.is_multicast() {
        return Err(TftpError::InvalidArgument(
            "mtftp_multicast_addr must be a multicast address".to_string(),
        ));
    }
    if config.timer_initial_ms == 0 || config.timer_cap_ms < config.timer_initial_ms {
        return Err(TftpError::InvalidArgument(
            "timer_cap_ms must be non-zero and at least timer_initial_ms".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "tftp_client_test_{name}_{}",
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn rejects_block_size_too_small() {
        let mut config = EngineConfig::default();
        config.default_block_size = 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_non_multicast_mtftp_address() {
        let mut config = EngineConfig::default();
        config.mtftp_multicast_addr = Ipv4Addr::new(10, 0, 0, 1);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_multicast_port_out_of_range() {
        let mut config = EngineConfig::default();
        config.mtftp_multicast_port = 80;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn round_trips_through_toml_file() {
        let path = temp_path("roundtrip");
        write_default_config(&path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.default_block_size, EngineConfig::default().default_block_size);
        std::fs::remove_file(&path).ok();
    }
}
