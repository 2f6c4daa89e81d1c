//! Mines Round Client Library
//!
//! This library provides a Rust client for the "pick a cell, avoid the mine"
//! betting round server. It keeps a local view of the round in sync with the
//! server over a WebSocket, persists identity, stats and the in-flight round
//! between restarts, and falls back to a simulated offline table when no
//! server can be reached.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mines_client::{ClientConfig, FileStorage, GameEvent, MinesGame};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ClientConfig::from_env();
//!     let storage = FileStorage::new(&config.data_dir)?;
//!
//!     let game = MinesGame::new(config, Box::new(storage));
//!     let mut events = game.subscribe_to_events().await;
//!     game.connect().await?;
//!
//!     game.select_cell(3).await?;
//!     while let Some(event) = events.recv().await {
//!         if let GameEvent::RoundStarted { .. } = event {
//!             game.place_bet(2.0).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The round state machine itself lives in [`Session`], which is plain
//! synchronous code and can be driven headlessly.

pub mod clock;
pub mod config;
mod connection;
mod game;
mod offline;
pub mod profile;
mod session;
pub mod storage;
mod view;
mod websocket;

pub use clock::ClockSync;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, LinkEvent, websocket_url};
pub use game::MinesGame;
pub use offline::OfflineSimulator;
pub use profile::{Profile, Stats, StatsExport};
pub use session::{RESUME_WINDOW_MS, RoundPhase, RoundState, Session, Settlement, WIN_MULTIPLIER};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use view::{GameEvent, LinkStatus, Notice, NoticeKind, SessionView, TimerUrgency};
pub use websocket::RoundSocket;

// Re-export common types for convenience
pub use mines_common::{models::*, protocol::*};

use thiserror::Error;

/// Error type for transport and persistence failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http, https, ws or wss)")]
    InvalidScheme(String),
    #[error("dial timeout")]
    DialTimeout,
    #[error("connection closed")]
    ConnectionClosed,
}

/// Player intents rejected locally, before anything reaches the network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntentError {
    #[error("the round has not started yet, wait for the next one")]
    RoundNotActive,
    #[error("enter a positive bet")]
    InvalidAmount,
    #[error("insufficient balance: {balance:.1} available, {amount} requested")]
    InsufficientBalance { balance: f64, amount: f64 },
    #[error("select a cell before betting")]
    NoCellSelected,
    #[error("you already have a bet in this round")]
    AlreadyBet,
    #[error("no connection to the server")]
    NotConnected,
    #[error("the round is already running, wait for the next one")]
    SelectionLocked,
    #[error(transparent)]
    InvalidCell(#[from] InvalidCell),
}

pub type Result<T> = std::result::Result<T, Error>;
