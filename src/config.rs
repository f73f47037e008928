//! Server configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_STATIC_DIR: &str = "./static";
pub const DEFAULT_HUB_COMMAND_CAPACITY: usize = 256;
pub const DEFAULT_PLAYER_OUTBOUND_CAPACITY: usize = 32;
pub const DEFAULT_REWARD_SCORE: u32 = 10;

/// Tuning knobs for the hub and the per-player channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Bounded capacity of the orchestrator command channel.
    pub command_capacity: usize,
    /// Bounded capacity of each of a player's four outbound channels.
    pub outbound_capacity: usize,
    /// Score carried in every `ended` message.
    pub reward_score: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_HUB_COMMAND_CAPACITY,
            outbound_capacity: DEFAULT_PLAYER_OUTBOUND_CAPACITY,
            reward_score: DEFAULT_REWARD_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub hub: HubConfig,
}

impl ServerConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `BIND_ADDR`: default `0.0.0.0`
    /// - `PORT`: default 8080
    /// - `STATIC_DIR`: default `./static`
    /// - `HUB_COMMAND_CAPACITY`: default 256
    /// - `PLAYER_OUTBOUND_CAPACITY`: default 32
    /// - `REWARD_SCORE`: default 10
    #[must_use]
    pub fn from_env() -> Self {
        let hub = HubConfig {
            command_capacity: env_parse("HUB_COMMAND_CAPACITY", DEFAULT_HUB_COMMAND_CAPACITY).max(1),
            outbound_capacity: env_parse("PLAYER_OUTBOUND_CAPACITY", DEFAULT_PLAYER_OUTBOUND_CAPACITY).max(1),
            reward_score: env_parse("REWARD_SCORE", DEFAULT_REWARD_SCORE),
        };

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            port: env_parse("PORT", DEFAULT_PORT),
            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATIC_DIR)),
            hub,
        }
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
