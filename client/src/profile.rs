//! Local player identity, balance and lifetime stats.
//!
//! None of this is reconciled against the server: the balance and stats are
//! owned by the client and persisted under [`GAME_DATA_KEY`].

use chrono::{DateTime, SecondsFormat, Utc};
use nanoid::nanoid;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::storage::{GAME_DATA_KEY, PLAYER_ID_KEY, PLAYER_NAME_KEY, Storage, StorageExt};

pub const STARTING_BALANCE: f64 = 10.0;

const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const FIRST_NAMES: [&str; 8] = [
    "Alexei", "Maria", "Dmitry", "Anna", "Sergei", "Olga", "Ivan", "Elena",
];

pub fn generate_player_id() -> String {
    format!("player_{}", nanoid!(9, &ID_ALPHABET))
}

pub fn generate_player_name() -> String {
    let mut rng = rand::rng();
    let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
    format!("{}{}", first, rng.random_range(0..1000))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_wagered: f64,
}

impl Stats {
    /// Share of won games in percent
    pub fn win_rate(&self) -> f64 {
        if self.games_played == 0 {
            0.0
        } else {
            f64::from(self.wins) / f64::from(self.games_played) * 100.0
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub stats: Stats,
    pub user_balance: f64,
    pub player_id: String,
    pub player_name: String,
}

/// Stored form of [`Profile`]; every field may be missing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredProfile {
    stats: Option<Stats>,
    user_balance: Option<f64>,
    player_id: Option<String>,
    player_name: Option<String>,
}

/// Downloadable stats document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsExport {
    pub file_name: String,
    pub contents: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    player_id: &'a str,
    player_name: &'a str,
    stats: &'a Stats,
    balance: f64,
    export_time: String,
}

impl Profile {
    /// Loads the profile, generating and persisting an identity on first run.
    ///
    /// An unreadable game-data record is treated as absent.
    pub fn load(storage: &dyn Storage) -> Self {
        let player_id = load_or_create(storage, PLAYER_ID_KEY, generate_player_id);
        let player_name = load_or_create(storage, PLAYER_NAME_KEY, generate_player_name);

        let stored = match storage.get::<StoredProfile>(GAME_DATA_KEY) {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring unreadable game data: {}", e);
                StoredProfile::default()
            }
        };

        Self {
            stats: stored.stats.unwrap_or_default(),
            user_balance: stored.user_balance.unwrap_or(STARTING_BALANCE),
            player_id: stored.player_id.filter(|id| !id.is_empty()).unwrap_or(player_id),
            player_name: stored
                .player_name
                .filter(|name| !name.is_empty())
                .unwrap_or(player_name),
        }
    }

    pub fn save(&self, storage: &dyn Storage) {
        if let Err(e) = storage.set(GAME_DATA_KEY, self) {
            warn!("Failed to persist game data: {}", e);
        }
    }

    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
    }

    /// Starts over: default balance and empty stats, same identity
    pub fn reset_game(&mut self) {
        self.user_balance = STARTING_BALANCE;
        self.stats = Stats::default();
    }

    pub fn export(&self, exported_at: DateTime<Utc>) -> serde_json::Result<StatsExport> {
        let document = ExportDocument {
            player_id: &self.player_id,
            player_name: &self.player_name,
            stats: &self.stats,
            balance: self.user_balance,
            export_time: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        Ok(StatsExport {
            file_name: format!("mines_game_data_{}.json", self.player_id),
            contents: serde_json::to_string_pretty(&document)?,
        })
    }
}

fn load_or_create(storage: &dyn Storage, key: &str, generate: fn() -> String) -> String {
    match storage.get::<String>(key) {
        Ok(Some(value)) if !value.is_empty() => return value,
        Ok(_) => {}
        Err(e) => warn!("Ignoring unreadable {}: {}", key, e),
    }

    let value = generate();
    info!("Generated new {}: {}", key, value);
    if let Err(e) = storage.set(key, &value) {
        warn!("Failed to persist {}: {}", key, e);
    }
    value
}
