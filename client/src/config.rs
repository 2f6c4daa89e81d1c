use std::{env, path::PathBuf, time::Duration};

use tracing::info;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// Runtime settings for [`MinesGame`](crate::MinesGame)
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Candidate server endpoints, tried in order
    pub endpoints: Vec<String>,
    pub connect_timeout: Duration,
    pub data_dir: PathBuf,
    /// How long a resolved round stays on screen when the local player had a bet
    pub reveal_delay: Duration,
    /// How long a resolved round stays on screen without a local bet
    pub idle_reveal_delay: Duration,
    pub offline_bet_interval: Duration,
    /// Chance per tick that a simulated player bets
    pub offline_bet_chance: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_SERVER_URL.to_string()],
            connect_timeout: Duration::from_millis(5000),
            data_dir: PathBuf::from(".mines"),
            reveal_delay: Duration::from_millis(7000),
            idle_reveal_delay: Duration::from_millis(3000),
            offline_bet_interval: Duration::from_millis(3000),
            offline_bet_chance: 0.3,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let endpoints: Vec<String> = env::var("MINES_SERVER_URLS")
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string())
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();

        let data_dir = env::var("MINES_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let config = Self {
            endpoints,
            connect_timeout: env_millis("MINES_CONNECT_TIMEOUT_MS", 5000),
            data_dir,
            reveal_delay: env_millis("MINES_REVEAL_DELAY_MS", 7000),
            idle_reveal_delay: env_millis("MINES_IDLE_REVEAL_DELAY_MS", 3000),
            offline_bet_interval: env_millis("MINES_OFFLINE_BET_INTERVAL_MS", 3000),
            offline_bet_chance: defaults.offline_bet_chance,
        };

        info!(
            "Client configured: {} endpoint(s), connect timeout {}ms, data dir {}",
            config.endpoints.len(),
            config.connect_timeout.as_millis(),
            config.data_dir.display()
        );

        config
    }
}

fn env_millis(name: &str, default: u64) -> Duration {
    let millis: u64 = env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default);
    Duration::from_millis(millis)
}
