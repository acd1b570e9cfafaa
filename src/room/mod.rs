//! Room lifecycle: claims, countdown, draw planning, drawing and settlement

pub mod claims;
mod countdown;
mod draw;
pub mod lock;
pub mod orchestrator;
pub mod patterns;
pub mod scheduler;
pub mod selector;
pub mod settlement;
pub mod types;

pub use claims::ClaimLedger;
pub use lock::{LockGuard, RoomLock};
pub use orchestrator::{AutoPlayStatus, BetReceipt, BingoOutcome, CountdownInfo, RoomOrchestrator};
pub use scheduler::{TaskKind, TaskRegistry};
pub use selector::{Contender, DrawPlan, WinnerSelector};
pub use settlement::{SettlementEngine, SettlementPlan};
pub use types::{
    BingoCard, CardView, ClaimMap, ClaimedCard, EndReason, Game, GameStatus, PlayerRef,
    RoomConfig, RoomRuntimeState, RoomSnapshot, UserProfile,
};
