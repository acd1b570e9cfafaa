//! Error types for the bingo room orchestrator
//!
//! Every failure a room operation can report is a `RoomError` variant. Store
//! I/O problems are carried separately as `StoreError` and wrapped on the way
//! out so callers can tell a rejected request from a broken backend.

use crate::room::types::GameStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failures raised by the durable or ephemeral store implementations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Read failed for {key}: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("Write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Corrupted record at {key}: {reason}")]
    Corrupted { key: String, reason: String },
}

/// Error taxonomy used for logging and status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed input, rejected before any state is touched
    Validation,
    /// Request does not fit the current room phase or claim state
    StateConflict,
    /// Lock timeout or a lost race; safe to retry
    Concurrency,
    /// Backend failure
    Store,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::StateConflict => write!(f, "state_conflict"),
            ErrorCategory::Concurrency => write!(f, "concurrency"),
            ErrorCategory::Store => write!(f, "store"),
        }
    }
}

/// Root error type for all room operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoomError {
    #[error("Room {0} not found")]
    RoomNotFound(String),

    #[error("Room is not accepting bets right now")]
    RoomNotAcceptingBets,

    #[error("Card {0} is not part of this room")]
    InvalidCard(u32),

    #[error("Card {0} is already claimed")]
    CardAlreadyClaimed(u32),

    #[error("You already hold card {0} in this room")]
    DuplicateClaim(u32),

    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("Bets cannot be cancelled once the game has started")]
    CannotCancelNow,

    #[error("Card {0} is not claimed")]
    NotClaimed(u32),

    #[error("Card {0} belongs to another player")]
    NotOwner(u32),

    #[error("A countdown is already running for this room")]
    CountdownAlreadyRunning,

    #[error("A countdown cannot start while the room is {0}")]
    CountdownNotAllowed(GameStatus),

    #[error("At least {required} players are needed, found {found}")]
    NotEnoughPlayers { required: usize, found: usize },

    #[error("Room is busy, try again")]
    LockTimeout,

    #[error("No game is being played in this room")]
    GameNotPlaying,

    #[error("You have no card in this room")]
    NoClaimedCard,

    #[error("You already used your bingo attempt for this game")]
    AlreadyAttempted,

    #[error("Invalid bingo: {0}")]
    InvalidPattern(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoomError {
    /// Taxonomy bucket for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            RoomError::RoomNotFound(_)
            | RoomError::InvalidCard(_)
            | RoomError::InvalidPattern(_)
            | RoomError::Validation(_) => ErrorCategory::Validation,
            RoomError::LockTimeout => ErrorCategory::Concurrency,
            RoomError::Store(_) => ErrorCategory::Store,
            _ => ErrorCategory::StateConflict,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            RoomError::RoomNotAcceptingBets => "ROOM_NOT_ACCEPTING_BETS",
            RoomError::InvalidCard(_) => "INVALID_CARD",
            RoomError::CardAlreadyClaimed(_) => "CARD_ALREADY_CLAIMED",
            RoomError::DuplicateClaim(_) => "DUPLICATE_CLAIM",
            RoomError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            RoomError::CannotCancelNow => "CANNOT_CANCEL_NOW",
            RoomError::NotClaimed(_) => "NOT_CLAIMED",
            RoomError::NotOwner(_) => "NOT_OWNER",
            RoomError::CountdownAlreadyRunning => "COUNTDOWN_ALREADY_RUNNING",
            RoomError::CountdownNotAllowed(_) => "COUNTDOWN_NOT_ALLOWED",
            RoomError::NotEnoughPlayers { .. } => "NOT_ENOUGH_PLAYERS",
            RoomError::LockTimeout => "LOCK_TIMEOUT",
            RoomError::GameNotPlaying => "GAME_NOT_PLAYING",
            RoomError::NoClaimedCard => "NO_CLAIMED_CARD",
            RoomError::AlreadyAttempted => "ALREADY_ATTEMPTED",
            RoomError::InvalidPattern(_) => "INVALID_PATTERN",
            RoomError::Validation(_) => "VALIDATION_FAILED",
            RoomError::Store(_) => "STORE_ERROR",
        }
    }

    /// Message safe to show to a player; store details stay in the logs
    pub fn public_message(&self) -> String {
        match self {
            RoomError::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type RoomResult<T> = Result<T, RoomError>;

/// Uniform `{success, message?, code?, ...}` result shape for the request layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            code: None,
            data: Some(data),
        }
    }

    pub fn failure(error: &RoomError) -> Self {
        Self {
            success: false,
            message: Some(error.public_message()),
            code: Some(error.code().to_string()),
            data: None,
        }
    }
}

impl<T> From<RoomResult<T>> for Envelope<T> {
    fn from(result: RoomResult<T>) -> Self {
        match result {
            Ok(data) => Envelope::ok(data),
            Err(e) => {
                if e.category() == ErrorCategory::Store {
                    tracing::error!(error = %e, "room operation failed on store access");
                }
                Envelope::failure(&e)
            }
        }
    }
}
