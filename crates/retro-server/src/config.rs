use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: PathBuf,
    /// Salt mixed into every identity hash.
    pub identity_salt: String,
    pub active_window: Duration,
    /// Mutating requests allowed per identity per second. `0` disables the limit.
    pub write_limit_per_sec: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = std::env::var("RETRO_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("RETRO_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let db_path = std::env::var("RETRO_DB_PATH")
            .unwrap_or_else(|_| "./retro.redb".to_string())
            .into();

        let identity_salt = match std::env::var("RETRO_IDENTITY_SALT") {
            Ok(s) if !s.is_empty() => s,
            _ => return Err(ConfigError::Missing("RETRO_IDENTITY_SALT")),
        };

        let active_window_secs = std::env::var("RETRO_ACTIVE_WINDOW_SECS")
            .unwrap_or_else(|_| "120".to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid("RETRO_ACTIVE_WINDOW_SECS", "must be a number of seconds")
            })?;

        let write_limit_per_sec = std::env::var("RETRO_WRITE_LIMIT_PER_SEC")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .map_err(|_| ConfigError::Invalid("RETRO_WRITE_LIMIT_PER_SEC", "must be a valid u32"))?;

        Ok(Config {
            listen_addr,
            db_path,
            identity_salt,
            active_window: Duration::from_secs(active_window_secs),
            write_limit_per_sec,
        })
    }

    /// Create a test configuration.
    pub fn for_testing() -> Self {
        Config {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            db_path: PathBuf::from("/tmp/retro-test.redb"),
            identity_salt: "test-salt".to_string(),
            active_window: Duration::from_secs(120),
            write_limit_per_sec: 0,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(var) => {
                write!(f, "Missing required environment variable: {}", var)
            }
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::Missing("RETRO_IDENTITY_SALT").to_string(),
            "Missing required environment variable: RETRO_IDENTITY_SALT"
        );
        assert_eq!(
            ConfigError::Invalid("RETRO_DB_PATH", "bad").to_string(),
            "Invalid value for RETRO_DB_PATH: bad"
        );
    }

    #[test]
    fn test_testing_config_disables_rate_limit() {
        let config = Config::for_testing();
        assert_eq!(config.write_limit_per_sec, 0);
        assert_eq!(config.active_window, Duration::from_secs(120));
    }
}
