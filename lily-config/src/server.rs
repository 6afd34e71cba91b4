use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, format_err, Error};
use serde::{Deserialize, Serialize};

fn default_name() -> String {
    "lily".to_string()
}

fn default_host() -> String {
    "::".to_string()
}

fn default_port() -> u16 {
    8008
}

fn default_num_workers() -> usize {
    16
}

fn default_network_timeout() -> u64 {
    30
}

fn default_chunk_idle_timeout() -> u64 {
    10
}

fn default_session_sweep_interval() -> u64 {
    60
}

fn default_flush_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_per_user_limit() -> usize {
    8
}

fn default_expire_secs() -> u64 {
    3600
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriveConfig {
    pub name: String,
    /// Backing directory holding the drive's actual file data.
    pub dir: PathBuf,
    /// Snapshot file holding the serialised tree.
    pub file: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionPolicy {
    #[serde(default = "default_per_user_limit")]
    pub per_user_limit: usize,
    #[serde(default = "default_expire_secs")]
    pub default_expire_secs: u64,
    /// Upper bound a client may ask for; unlimited when absent.
    #[serde(default)]
    pub max_expire_secs: Option<u64>,
    #[serde(default)]
    pub allow_non_expiring: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            per_user_limit: default_per_user_limit(),
            default_expire_secs: default_expire_secs(),
            max_expire_secs: None,
            allow_non_expiring: false,
        }
    }
}

/// The server configuration file (JSON).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    pub users_file: PathBuf,
    #[serde(default)]
    pub drives: Vec<DriveConfig>,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,
    #[serde(default = "default_chunk_idle_timeout")]
    pub chunk_idle_timeout_secs: u64,
    #[serde(default = "default_session_sweep_interval")]
    pub session_sweep_interval_secs: u64,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted connections per second; zero disables the throttle.
    #[serde(default)]
    pub rate_limit_per_sec: u32,
    #[serde(default)]
    pub session: SessionPolicy,
    /// Bootstrap administrator, applied when the users file does not exist
    /// yet.
    #[serde(default)]
    pub admin_user: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read(path)
            .map_err(|err| format_err!("unable to read config {:?} - {}", path, err))?;
        let config: ServerConfig = serde_json::from_slice(&raw)
            .map_err(|err| format_err!("unable to parse config {:?} - {}", path, err))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.num_workers == 0 {
            bail!("invalid number of workers (0)");
        }
        if self.network_timeout_secs == 0 {
            bail!("invalid network timeout (0)");
        }
        if log_level_from_str(&self.log_level).is_none() {
            bail!("invalid log level '{}'", self.log_level);
        }
        for drive in &self.drives {
            if drive.name.is_empty() || drive.name.contains('/') {
                bail!("invalid drive name '{}'", drive.name);
            }
        }
        Ok(())
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn chunk_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_idle_timeout_secs)
    }
}

/// Parse a config/command log level name.
pub fn log_level_from_str(name: &str) -> Option<log::LevelFilter> {
    let level = match name.to_lowercase().as_str() {
        "off" => log::LevelFilter::Off,
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => return None,
    };
    Some(level)
}

#[cfg(test)]
mod test {
    use super::{log_level_from_str, ServerConfig};

    #[test]
    fn test_minimal_config() {
        let raw = r#"{ "users_file": "/tmp/users.json" }"#;
        let config: ServerConfig = serde_json::from_str(raw).unwrap();
        config.validate().unwrap();

        assert_eq!(config.name, "lily");
        assert_eq!(config.port, 8008);
        assert_eq!(config.num_workers, 16);
        assert!(config.tls.is_none());
        assert!(!config.session.allow_non_expiring);
    }

    #[test]
    fn test_invalid_workers() {
        let raw = r#"{ "users_file": "/tmp/u.json", "num_workers": 0 }"#;
        let config: ServerConfig = serde_json::from_str(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_levels() {
        assert!(log_level_from_str("info").is_some());
        assert!(log_level_from_str("TRACE").is_some());
        assert!(log_level_from_str("loud").is_none());
    }
}
