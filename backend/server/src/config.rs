use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sqlite,
    Redis,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "sqlite" => Ok(Backend::Sqlite),
            "redis" => Ok(Backend::Redis),
            other => Err(format!("unknown backend {other:?}")),
        }
    }
}

/// Who gets unlocked by a "reset counts" press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetScope {
    /// Every open session, through the reset epoch.
    Global,
    /// Only the session that pressed the button.
    Session,
}

impl FromStr for ResetScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "global" => Ok(ResetScope::Global),
            "session" => Ok(ResetScope::Session),
            other => Err(format!("unknown reset scope {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    pub redis_url: String,
    pub sqlite_path: String,
    pub track_names: bool,
    pub allow_switch: bool,
    pub reset_scope: ResetScope,
    pub refresh_ms: u64,
    /// Seconds without a request before a session's gate is dropped.
    pub session_idle_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            backend: try_load("STORE_BACKEND", "memory")?,
            redis_url: read_secret("REDIS_URL")
                .map_or_else(|| try_load("REDIS_URL", "redis://127.0.0.1:6379"), Ok)?,
            sqlite_path: try_load("SQLITE_PATH", "votes.db")?,
            track_names: try_load("TRACK_NAMES", "true")?,
            allow_switch: try_load("ALLOW_SWITCH", "true")?,
            reset_scope: try_load("RESET_SCOPE", "global")?,
            refresh_ms: try_load("REFRESH_MS", "2000")?,
            session_idle_secs: try_load("SESSION_IDLE_SECS", "1800")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            backend: Backend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            sqlite_path: "votes.db".to_string(),
            track_names: true,
            allow_switch: true,
            reset_scope: ResetScope::Global,
            refresh_ms: 2000,
            session_idle_secs: 1800,
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("No {secret_name} secret file ({e}), falling back to environment");
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("memory".parse::<Backend>(), Ok(Backend::Memory));
        assert_eq!(" Redis ".parse::<Backend>(), Ok(Backend::Redis));
        assert_eq!("SQLITE".parse::<Backend>(), Ok(Backend::Sqlite));
        assert!("postgres".parse::<Backend>().is_err());
    }

    #[test]
    fn test_reset_scope_parse() {
        assert_eq!("global".parse::<ResetScope>(), Ok(ResetScope::Global));
        assert_eq!("session".parse::<ResetScope>(), Ok(ResetScope::Session));
        assert!("everyone".parse::<ResetScope>().is_err());
    }

    #[test]
    fn test_try_load_default() {
        let port: u16 = try_load("VOTER_TEST_UNSET_PORT", "4242").unwrap();
        assert_eq!(port, 4242);
    }

    #[test]
    fn test_try_load_invalid_default() {
        let err = try_load::<u16>("VOTER_TEST_UNSET_PORT", "not-a-port").unwrap_err();
        assert!(err.to_string().contains("VOTER_TEST_UNSET_PORT"));
    }
}
