//! Bingo room orchestrator
//!
//! Turns configured betting rooms into running bingo games: players claim
//! cards, a countdown starts the game, a precomputed draw is revealed on a
//! timer and the first valid bingo is paid out.

pub mod api;
pub mod config;
pub mod errors;
pub mod events;
pub mod room;
pub mod store;

pub use config::{BingoConfig, ConfigLoader};
pub use errors::{Envelope, RoomError, RoomResult, StoreError, StoreResult};
pub use events::{BroadcastHub, EventSink, RoomEvent};
pub use room::RoomOrchestrator;
pub use store::RoomStore;
