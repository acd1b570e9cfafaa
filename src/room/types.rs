//! Room, claim, game and settlement records
//!
//! Everything here is plain serde data; the ephemeral store keeps these as
//! JSON so field names follow the camelCase wire convention.

use super::patterns::{FREE_INDEX, GRID_CELLS};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Highest ball number
pub const MAX_NUMBER: u8 = 75;
/// Numbers revealed before near-miss numbers start appearing
pub const MEANINGFUL_DRAWS: usize = 25;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One fixed 5×5 grid from a room's catalog, stored row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BingoCard {
    pub id: u32,
    pub grid: [[u8; 5]; 5],
}

impl BingoCard {
    pub fn new(id: u32, grid: [[u8; 5]; 5]) -> Self {
        Self { id, grid }
    }

    /// Number at a row-major cell index; the free cell reads as 0
    pub fn number_at(&self, index: usize) -> u8 {
        if index == FREE_INDEX || index >= GRID_CELLS {
            return 0;
        }
        self.grid[index / 5][index % 5]
    }

    /// Every non-free cell holds a distinct number in 1..=75
    pub fn is_valid(&self) -> bool {
        let mut seen = HashSet::with_capacity(GRID_CELLS);
        (0..GRID_CELLS)
            .filter(|&index| index != FREE_INDEX)
            .all(|index| {
                let number = self.number_at(index);
                (1..=MAX_NUMBER).contains(&number) && seen.insert(number)
            })
    }

    /// Standard B-I-N-G-O card: column `c` draws from `15c+1 ..= 15c+15`
    pub fn random<R: Rng + ?Sized>(id: u32, rng: &mut R) -> Self {
        let mut grid = [[0u8; 5]; 5];
        for col in 0..5 {
            let low = (col as u8) * 15 + 1;
            let mut column: Vec<u8> = (low..low + 15).collect();
            column.shuffle(rng);
            for row in 0..5 {
                grid[row][col] = column[row];
            }
        }
        grid[2][2] = 0;
        Self { id, grid }
    }
}

/// Admin-authored room definition, read-only to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    pub room_id: String,
    pub name: String,
    pub bet_amount: i64,
    /// Maximum simultaneous claims; 0 means the catalog size
    pub capacity: usize,
    pub cards: Vec<BingoCard>,
}

impl RoomConfig {
    pub fn card(&self, card_id: u32) -> Option<&BingoCard> {
        self.cards.iter().find(|card| card.id == card_id)
    }

    pub fn effective_capacity(&self) -> usize {
        if self.capacity == 0 {
            self.cards.len()
        } else {
            self.capacity.min(self.cards.len())
        }
    }

    /// Room with `count` randomly generated cards numbered from 1
    pub fn generated<R: Rng + ?Sized>(
        room_id: &str,
        name: &str,
        bet_amount: i64,
        count: u32,
        rng: &mut R,
    ) -> Self {
        Self {
            room_id: room_id.to_string(),
            name: name.to_string(),
            bet_amount,
            capacity: 0,
            cards: (1..=count).map(|id| BingoCard::random(id, rng)).collect(),
        }
    }
}

/// Room lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Waiting,
    Countdown,
    Playing,
    Ended,
}

impl GameStatus {
    pub fn accepts_bets(&self) -> bool {
        matches!(self, GameStatus::Waiting | GameStatus::Countdown)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Waiting => write!(f, "waiting"),
            GameStatus::Countdown => write!(f, "countdown"),
            GameStatus::Playing => write!(f, "playing"),
            GameStatus::Ended => write!(f, "ended"),
        }
    }
}

/// Confirmed winner of a game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerRecord {
    pub player_id: String,
    pub username: String,
    pub card_id: u32,
    pub pattern_index: usize,
    pub prize: i64,
}

/// Per-room runtime snapshot kept in the ephemeral store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomRuntimeState {
    pub game_status: GameStatus,
    pub countdown_end_at: Option<i64>,
    pub countdown_started_by: Option<String>,
    pub current_game_id: Option<String>,
    pub called_numbers: Vec<u8>,
    pub winner: Option<WinnerRecord>,
    pub winners: Vec<WinnerRecord>,
    pub payout: i64,
    pub payed: bool,
}

/// Who is acting on a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    pub player_id: String,
    pub username: String,
}

impl PlayerRef {
    pub fn new(player_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            username: username.into(),
        }
    }
}

/// A player's hold on one card for the current game cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedCard {
    pub claimed_by: String,
    pub username: String,
    pub claimed_at: i64,
    pub bet_amount: i64,
    /// One-shot bingo attempt; cleared only when the card carries into a new round
    pub attempted_bingo: bool,
    pub auto: bool,
    pub auto_until: Option<i64>,
}

impl ClaimedCard {
    pub fn new(player: &PlayerRef, bet_amount: i64, now: i64) -> Self {
        Self {
            claimed_by: player.player_id.clone(),
            username: player.username.clone(),
            claimed_at: now,
            bet_amount,
            attempted_bingo: false,
            auto: false,
            auto_until: None,
        }
    }

    pub fn player(&self) -> PlayerRef {
        PlayerRef::new(self.claimed_by.clone(), self.username.clone())
    }

    pub fn auto_active(&self, now: i64) -> bool {
        self.auto && self.auto_until.map_or(false, |until| until > now)
    }

    /// Same claim, ready for the next round
    pub fn carry_over(mut self, now: i64) -> Self {
        self.attempted_bingo = false;
        self.claimed_at = now;
        self
    }
}

/// Claims of one room keyed by card id
pub type ClaimMap = BTreeMap<u32, ClaimedCard>;

/// Game record lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameRecordStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Bingo,
    AllNumbersDrawn,
    Reset,
}

/// Winner chosen by the selector before the first number is drawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedWinner {
    pub card_id: u32,
    pub player_id: String,
    pub pattern_index: usize,
}

/// Losing card held one number short of its pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearMiss {
    pub card_id: u32,
    pub pattern_index: usize,
    pub missing_number: u8,
}

/// One game of one room
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub game_id: String,
    pub room_id: String,
    pub drawn_numbers: Vec<u8>,
    pub current_number_index: usize,
    pub planned_winners: Vec<PlannedWinner>,
    pub winners: Vec<WinnerRecord>,
    pub total_cards: usize,
    pub bet_amount: i64,
    pub total_payout: i64,
    pub status: GameRecordStatus,
    pub bets_deducted: bool,
    pub end_reason: Option<EndReason>,
    pub created_at: i64,
}

impl Game {
    /// Numbers revealed so far
    pub fn called(&self) -> &[u8] {
        let revealed = self.current_number_index.min(self.drawn_numbers.len());
        &self.drawn_numbers[..revealed]
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_number_index >= self.drawn_numbers.len()
    }

    pub fn is_active(&self) -> bool {
        self.status == GameRecordStatus::Active
    }
}

/// Durable per-player aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub balance: i64,
    pub games_played: u64,
    pub games_won: u64,
    /// Synthetic house account
    pub is_demo: bool,
}

impl UserProfile {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            balance: 0,
            games_played: 0,
            games_won: 0,
            is_demo: false,
        }
    }

    pub fn with_balance(mut self, balance: i64) -> Self {
        self.balance = balance;
        self
    }

    pub fn demo(mut self) -> Self {
        self.is_demo = true;
        self
    }
}

/// House revenue booked at settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueEntry {
    pub game_id: String,
    pub room_id: String,
    pub amount: i64,
    pub created_at: i64,
}

/// Catalog card merged with its claim status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub card_id: u32,
    pub grid: [[u8; 5]; 5],
    pub claimed: bool,
    pub claimed_by: Option<String>,
    pub username: Option<String>,
    pub auto: bool,
    pub auto_until: Option<i64>,
}

/// Merged durable config and ephemeral runtime for clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub name: String,
    pub bet_amount: i64,
    pub capacity: usize,
    pub runtime: RoomRuntimeState,
    pub cards: Vec<CardView>,
    /// Derived from the claim ledger
    pub players: Vec<PlayerRef>,
}
