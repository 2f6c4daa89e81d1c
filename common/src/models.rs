use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the nine cells of the round grid, numbered 1 through 9
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Cell(u8);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cell {0} is outside 1..=9")]
pub struct InvalidCell(pub u8);

impl Cell {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 9;

    pub fn new(number: u8) -> Result<Self, InvalidCell> {
        if (Self::MIN..=Self::MAX).contains(&number) {
            Ok(Self(number))
        } else {
            Err(InvalidCell(number))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Every cell of the grid in display order
    pub fn all() -> impl Iterator<Item = Cell> {
        (Self::MIN..=Self::MAX).map(Cell)
    }
}

impl TryFrom<u8> for Cell {
    type Error = InvalidCell;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Cell::new(value)
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> Self {
        cell.0
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque round token; servers send either strings or integers
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoundId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundId::Number(n) => write!(f, "{n}"),
            RoundId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub balance: f64,
}

/// Roster payload of `online_players`.
///
/// The reference server ships map entries (`[[id, player], ...]`); a flat
/// player list is accepted as well.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Roster {
    Entries(Vec<(String, Player)>),
    Players(Vec<Player>),
}

impl Roster {
    pub fn into_players(self) -> Vec<(String, Player)> {
        match self {
            Roster::Entries(entries) => entries,
            Roster::Players(players) => players
                .into_iter()
                .map(|player| (player.id.clone(), player))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerBet {
    pub player_id: String,
    pub bet: f64,
    pub cell: Cell,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStart {
    pub round_id: RoundId,
    pub start_time: i64,
    pub end_time: i64,
    pub round_number: u64,
    pub server_time: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub mine_cell: Cell,
}

/// Partial update of the round state; absent fields are left untouched
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameStatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_round_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time_offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<RoundId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoin {
    pub id: String,
    pub name: String,
    pub balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBet {
    pub player_id: String,
    pub bet: f64,
    pub cell: Cell,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_rejects_out_of_range_numbers() {
        assert_eq!(Cell::new(0), Err(InvalidCell(0)));
        assert_eq!(Cell::new(10), Err(InvalidCell(10)));
        assert_eq!(Cell::new(9).map(Cell::get), Ok(9));
        assert_eq!(Cell::all().count(), 9);
    }

    #[test]
    fn cell_deserialization_is_validated() {
        let cell: Cell = serde_json::from_str("3").unwrap();
        assert_eq!(cell.get(), 3);
        assert!(serde_json::from_str::<Cell>("12").is_err());
    }

    #[test]
    fn roster_accepts_entries_and_plain_lists() {
        let entries: Roster =
            serde_json::from_str(r#"[["p1", {"id": "p1", "name": "Ann", "balance": 3}]]"#).unwrap();
        let plain: Roster = serde_json::from_str(r#"[{"id": "p1", "name": "Ann"}]"#).unwrap();

        let entries = entries.into_players();
        let plain = plain.into_players();
        assert_eq!(entries[0].0, "p1");
        assert_eq!(entries[0].1.balance, 3.0);
        assert_eq!(plain[0].0, "p1");
        assert_eq!(plain[0].1.balance, 0.0);
    }

    #[test]
    fn round_id_keeps_its_wire_shape() {
        let text: RoundId = serde_json::from_str(r#""r-17""#).unwrap();
        let number: RoundId = serde_json::from_str("17").unwrap();
        assert_eq!(text, RoundId::Text("r-17".into()));
        assert_eq!(number, RoundId::Number(17));
        assert_eq!(number.to_string(), "17");
    }
}
