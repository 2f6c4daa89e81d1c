use serde::{Deserialize, Serialize};

use crate::models::{
    GameStatePatch, PlaceBet, Player, PlayerBet, PlayerJoin, Roster, RoundResult, RoundStart,
    ServerError,
};

/// Intents sent from the client to the round server
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "player_join")]
    PlayerJoin(PlayerJoin),
    #[serde(rename = "place_bet")]
    PlaceBet(PlaceBet),
}

/// Authoritative events pushed by the round server
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "online_players")]
    OnlinePlayers(Roster),
    #[serde(rename = "player_joined")]
    PlayerJoined(Player),
    #[serde(rename = "player_left")]
    PlayerLeft(String),
    #[serde(rename = "player_bet")]
    PlayerBet(PlayerBet),
    #[serde(rename = "game_state")]
    GameState(GameStatePatch),
    #[serde(rename = "round_start")]
    RoundStart(RoundStart),
    #[serde(rename = "round_result")]
    RoundResult(RoundResult),
    #[serde(rename = "error")]
    Error(ServerError),
}
