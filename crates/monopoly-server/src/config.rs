//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Banter rate limiting and timing
#[derive(Debug, Clone, PartialEq)]
pub struct BanterConfig {
    /// Minimum gap between two banter lines in one game
    pub cooldown: Duration,
    /// Chance that an untriggered chat line draws a reply
    pub chance: f64,
    /// How long a completion may take before the fallback line is used
    pub timeout: Duration,
}

impl Default for BanterConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(20),
            chance: 0.15,
            timeout: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// File-backed store directory; in-memory store when unset
    pub data_dir: Option<PathBuf>,
    /// Write the lightweight snapshot after every commit
    pub snapshots: bool,
    pub banter: BanterConfig,
    /// How long a game with no sessions stays loaded
    pub actor_idle: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: None,
            snapshots: false,
            banter: BanterConfig::default(),
            actor_idle: Duration::from_secs(300),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let chance = parse_var(&lookup, "BANTER_CHANCE", defaults.banter.chance)?;
        if !(0.0..=1.0).contains(&chance) {
            return Err(ConfigError::Invalid {
                name: "BANTER_CHANCE",
                value: chance.to_string(),
            });
        }

        Ok(Self {
            addr: parse_var(&lookup, "SERVER_ADDR", defaults.addr)?,
            data_dir: lookup("DATA_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            snapshots: parse_flag(&lookup, "SNAPSHOTS")?,
            banter: BanterConfig {
                cooldown: Duration::from_secs(parse_var(&lookup, "BANTER_COOLDOWN_SECS", 20)?),
                chance,
                timeout: Duration::from_secs(parse_var(&lookup, "BANTER_TIMEOUT_SECS", 8)?),
            },
            actor_idle: Duration::from_secs(parse_var(&lookup, "ACTOR_IDLE_SECS", 300)?),
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_flag<F>(lookup: &F, name: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}
