//! Payout arithmetic and balance bookkeeping
//!
//! Every balance change is an atomic delta against the durable store. Both
//! money-moving steps are guarded: bet deduction by `Game::bets_deducted`,
//! settlement by the room's `payed` flag.

use super::claims::ClaimLedger;
use super::types::{now_ms, ClaimMap, Game, GameRecordStatus, RevenueEntry, RoomRuntimeState};
use crate::config::PayoutConfig;
use crate::errors::StoreResult;
use crate::store::RoomStore;
use tracing::{debug, info, warn};

/// `floor(amount × ratio)`, tolerant of binary rounding in the ratio
pub fn apply_ratio(amount: i64, ratio: f64) -> i64 {
    (amount as f64 * ratio + 1e-9).floor() as i64
}

/// Theoretical prize pool of a game
pub fn payout_pool(total_cards: usize, bet_amount: i64, config: &PayoutConfig) -> i64 {
    apply_ratio(total_cards as i64 * bet_amount, config.payout_ratio)
}

/// What a finished game pays out and books
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub pool: i64,
    pub per_winner: i64,
    /// `(player_id, amount)` credits, one per winner record
    pub credits: Vec<(String, i64)>,
    pub revenue: i64,
}

impl SettlementPlan {
    pub fn compute(game: &Game, config: &PayoutConfig) -> Self {
        let pool = game.total_payout;
        if game.winners.is_empty() {
            return Self {
                pool,
                per_winner: 0,
                credits: Vec::new(),
                revenue: apply_ratio(pool, config.no_winner_markup),
            };
        }

        let per_winner = pool / game.winners.len() as i64;
        Self {
            pool,
            per_winner,
            credits: game
                .winners
                .iter()
                .map(|w| (w.player_id.clone(), per_winner))
                .collect(),
            revenue: apply_ratio(pool, config.revenue_share),
        }
    }
}

#[derive(Clone)]
pub struct SettlementEngine {
    store: RoomStore,
    ledger: ClaimLedger,
    payout: PayoutConfig,
}

impl SettlementEngine {
    pub fn new(store: RoomStore, payout: PayoutConfig) -> Self {
        Self {
            ledger: ClaimLedger::new(store.clone()),
            store,
            payout,
        }
    }

    pub fn payout_config(&self) -> &PayoutConfig {
        &self.payout
    }

    /// Charge every claimant once per game. Returns false when already charged.
    pub async fn deduct_bets(&self, game: &mut Game, claims: &ClaimMap) -> StoreResult<bool> {
        if game.bets_deducted {
            debug!(game_id = %game.game_id, "bets already deducted");
            return Ok(false);
        }
        game.bets_deducted = true;
        self.store.save_game(game).await?;

        let durable = self.store.durable();
        for (card_id, claim) in claims {
            let balance = durable
                .adjust_balance(&claim.claimed_by, -claim.bet_amount)
                .await?;
            durable.increment_games_played(&claim.claimed_by).await?;
            debug!(
                game_id = %game.game_id,
                card_id,
                player_id = %claim.claimed_by,
                balance,
                "bet deducted"
            );
        }
        Ok(true)
    }

    /// Pay winners and book revenue for an ended `game_id`. A second call,
    /// or a call before the game has ended, is a no-op.
    pub async fn finalize(&self, room_id: &str, game_id: &str) -> StoreResult<Option<SettlementPlan>> {
        let runtime = self.store.runtime(room_id).await?;
        if runtime.current_game_id.as_deref() != Some(game_id) {
            debug!(room_id, game_id, "settlement skipped for a game that is not current");
            return Ok(None);
        }
        if runtime.payed {
            debug!(room_id, game_id, "game already settled");
            return Ok(None);
        }
        let Some(game) = self.store.game(game_id).await? else {
            debug!(room_id, game_id, "settlement skipped, game record gone");
            return Ok(None);
        };
        if game.status != GameRecordStatus::Ended {
            warn!(room_id, game_id, "settlement refused, game still running");
            return Ok(None);
        }

        self.store.patch_runtime(room_id, |state| state.payed = true).await?;

        let plan = SettlementPlan::compute(&game, &self.payout);
        let durable = self.store.durable();
        for (player_id, amount) in &plan.credits {
            let balance = durable.adjust_balance(player_id, *amount).await?;
            durable.increment_games_won(player_id).await?;
            info!(room_id, game_id, player_id = %player_id, amount, balance, "winner credited");
        }

        durable
            .save_revenue_entry(RevenueEntry {
                game_id: game_id.to_string(),
                room_id: room_id.to_string(),
                amount: plan.revenue,
                created_at: now_ms(),
            })
            .await?;

        info!(
            room_id,
            game_id,
            pool = plan.pool,
            winners = plan.credits.len(),
            revenue = plan.revenue,
            "game settled"
        );
        Ok(Some(plan))
    }

    /// Start a fresh round: drop the game record, carry funded auto-play
    /// cards over and put the room back in `waiting`.
    pub async fn reset(&self, room_id: &str, bet_amount: i64) -> StoreResult<Vec<u32>> {
        let runtime = self.store.runtime(room_id).await?;
        if let Some(game_id) = runtime.current_game_id.as_deref() {
            self.store.delete_game(game_id).await?;
        }

        let retained = self.ledger.carry_over(room_id, bet_amount, now_ms()).await?;
        self.store
            .save_runtime(room_id, &RoomRuntimeState::default())
            .await?;

        info!(room_id, retained = retained.len(), "room reset");
        Ok(retained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TtlConfig;
    use crate::room::types::{ClaimedCard, GameRecordStatus, GameStatus, PlayerRef, WinnerRecord};
    use crate::store::{DurableStore, MemoryDurableStore, MemoryEphemeralStore};
    use std::sync::Arc;

    fn game(winners: &[&str], pool: i64) -> Game {
        Game {
            game_id: "g1".to_string(),
            room_id: "r1".to_string(),
            drawn_numbers: (1..=75).collect(),
            current_number_index: 0,
            planned_winners: Vec::new(),
            winners: winners
                .iter()
                .enumerate()
                .map(|(i, id)| WinnerRecord {
                    player_id: id.to_string(),
                    username: id.to_string(),
                    card_id: i as u32 + 1,
                    pattern_index: 0,
                    prize: pool,
                })
                .collect(),
            total_cards: 2,
            bet_amount: 100,
            total_payout: pool,
            status: GameRecordStatus::Ended,
            bets_deducted: false,
            end_reason: None,
            created_at: 0,
        }
    }

    fn engine() -> (SettlementEngine, Arc<MemoryDurableStore>, RoomStore) {
        let durable = Arc::new(MemoryDurableStore::new());
        let store = RoomStore::new(
            durable.clone(),
            Arc::new(MemoryEphemeralStore::new()),
            TtlConfig::default(),
        );
        (
            SettlementEngine::new(store.clone(), PayoutConfig::default()),
            durable,
            store,
        )
    }

    #[test]
    fn test_pool_and_ratios() {
        let config = PayoutConfig::default();
        assert_eq!(payout_pool(2, 100, &config), 160);
        assert_eq!(payout_pool(3, 35, &config), 84);
        assert_eq!(apply_ratio(160, 0.25), 40);
        assert_eq!(apply_ratio(7, 0.25), 1);
    }

    #[test]
    fn test_plan_with_winners() {
        let plan = SettlementPlan::compute(&game(&["p1", "p2", "p3"], 160), &PayoutConfig::default());
        assert_eq!(plan.per_winner, 53);
        assert_eq!(plan.credits.len(), 3);
        assert_eq!(plan.revenue, 40);
    }

    #[test]
    fn test_plan_without_winners_books_markup() {
        let plan = SettlementPlan::compute(&game(&[], 160), &PayoutConfig::default());
        assert!(plan.credits.is_empty());
        assert_eq!(plan.revenue, 200);
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let (engine, durable, store) = engine();
        store.save_game(&game(&["p1"], 160)).await.unwrap();
        store
            .patch_runtime("r1", |s| {
                s.current_game_id = Some("g1".to_string());
                s.game_status = GameStatus::Ended;
            })
            .await
            .unwrap();

        assert!(engine.finalize("r1", "g1").await.unwrap().is_some());
        assert!(engine.finalize("r1", "g1").await.unwrap().is_none());

        assert_eq!(durable.get_balance("p1").await.unwrap(), 160);
        assert_eq!(durable.get_user("p1").await.unwrap().unwrap().games_won, 1);
        assert_eq!(durable.revenue_entries().len(), 1);
        assert_eq!(durable.revenue_entries()[0].amount, 40);
    }

    #[tokio::test]
    async fn test_finalize_waits_for_game_end() {
        let (engine, durable, store) = engine();
        let mut running = game(&[], 0);
        running.status = GameRecordStatus::Active;
        store.save_game(&running).await.unwrap();
        store
            .patch_runtime("r1", |s| {
                s.current_game_id = Some("g1".to_string());
                s.game_status = GameStatus::Playing;
            })
            .await
            .unwrap();

        assert!(engine.finalize("r1", "g1").await.unwrap().is_none());
        assert!(!store.runtime("r1").await.unwrap().payed);
        assert!(durable.revenue_entries().is_empty());

        running.status = GameRecordStatus::Ended;
        running.winners = game(&["p1"], 160).winners;
        running.total_payout = 160;
        store.save_game(&running).await.unwrap();

        let plan = engine.finalize("r1", "g1").await.unwrap().unwrap();
        assert_eq!(plan.per_winner, 160);
        assert_eq!(durable.get_balance("p1").await.unwrap(), 160);
    }

    #[tokio::test]
    async fn test_deduct_bets_once() {
        let (engine, durable, _) = engine();
        let mut claims = ClaimMap::new();
        claims.insert(1, ClaimedCard::new(&PlayerRef::new("p1", "a"), 100, 0));
        claims.insert(2, ClaimedCard::new(&PlayerRef::new("p2", "b"), 100, 0));
        let mut game = game(&[], 160);

        assert!(engine.deduct_bets(&mut game, &claims).await.unwrap());
        assert!(!engine.deduct_bets(&mut game, &claims).await.unwrap());

        assert_eq!(durable.get_balance("p1").await.unwrap(), -100);
        assert_eq!(durable.get_user("p2").await.unwrap().unwrap().games_played, 1);
    }

    #[tokio::test]
    async fn test_reset_returns_room_to_waiting() {
        let (engine, _, store) = engine();
        store.save_game(&game(&[], 160)).await.unwrap();
        store
            .patch_runtime("r1", |s| {
                s.current_game_id = Some("g1".to_string());
                s.game_status = GameStatus::Ended;
                s.payed = true;
            })
            .await
            .unwrap();
        let mut claims = ClaimMap::new();
        claims.insert(1, ClaimedCard::new(&PlayerRef::new("p1", "a"), 100, 0));
        store.save_claims("r1", &claims).await.unwrap();

        let retained = engine.reset("r1", 100).await.unwrap();

        assert!(retained.is_empty());
        assert!(store.claims("r1").await.unwrap().is_empty());
        assert!(store.game("g1").await.unwrap().is_none());
        assert_eq!(store.runtime("r1").await.unwrap(), RoomRuntimeState::default());
    }
}
