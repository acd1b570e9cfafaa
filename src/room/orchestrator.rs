//! Room orchestration: the operations exposed to the request layer
//!
//! Every state-changing operation runs under the room lock. The countdown and
//! draw tickers live in `countdown.rs` and `draw.rs` as further `impl` blocks
//! on [`RoomOrchestrator`].

use super::claims::{self, ClaimLedger};
use super::lock::RoomLock;
use super::patterns::{all_patterns, match_claim, FREE_INDEX, GRID_CELLS};
use super::scheduler::{TaskKind, TaskRegistry};
use super::selector::WinnerSelector;
use super::settlement::{payout_pool, SettlementEngine};
use super::types::{
    now_ms, CardView, ClaimedCard, EndReason, GameRecordStatus, GameStatus, PlayerRef,
    RoomSnapshot, WinnerRecord,
};
use crate::config::BingoConfig;
use crate::errors::{RoomError, RoomResult};
use crate::events::{EventSink, RoomEvent};
use crate::store::RoomStore;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetReceipt {
    pub room_id: String,
    pub card_id: u32,
    pub population: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPlayStatus {
    pub card_id: u32,
    pub auto: bool,
    pub auto_until: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownInfo {
    pub room_id: String,
    pub ends_at: i64,
    pub population: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BingoOutcome {
    pub game_id: String,
    pub card_id: u32,
    pub patterns: Vec<usize>,
    pub payout: i64,
}

pub(super) struct Inner {
    pub(super) config: BingoConfig,
    pub(super) store: RoomStore,
    pub(super) lock: RoomLock,
    pub(super) ledger: ClaimLedger,
    pub(super) settlement: SettlementEngine,
    pub(super) selector: WinnerSelector,
    pub(super) registry: Arc<TaskRegistry>,
    pub(super) events: Arc<dyn EventSink>,
}

/// Cheap to clone; all clones drive the same rooms
#[derive(Clone)]
pub struct RoomOrchestrator {
    pub(super) inner: Arc<Inner>,
}

impl RoomOrchestrator {
    pub fn new(config: BingoConfig, store: RoomStore, events: Arc<dyn EventSink>) -> Self {
        Self::with_registry(config, store, events, Arc::new(TaskRegistry::new()))
    }

    pub fn with_registry(
        config: BingoConfig,
        store: RoomStore,
        events: Arc<dyn EventSink>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        let lock = RoomLock::new(store.ephemeral().clone(), &config.timing);
        let ledger = ClaimLedger::new(store.clone());
        let settlement = SettlementEngine::new(store.clone(), config.payout.clone());
        let selector = WinnerSelector::new(config.winners.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                lock,
                ledger,
                settlement,
                selector,
                registry,
                events,
            }),
        }
    }

    pub fn config(&self) -> &BingoConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &RoomStore {
        &self.inner.store
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    pub(super) fn publish(&self, event: RoomEvent) {
        self.inner.events.publish(event);
    }

    pub(super) fn min_players(&self) -> usize {
        self.inner.config.winners.min_players
    }

    /// Claim a card for the current cycle
    pub async fn place_bet(
        &self,
        room_id: &str,
        card_id: u32,
        player: &PlayerRef,
    ) -> RoomResult<BetReceipt> {
        require_id("room id", room_id)?;
        require_id("player id", &player.player_id)?;
        let config = self.inner.store.room_config(room_id).await?;

        let guard = self.inner.lock.acquire(room_id).await?;
        let outcome = self
            .inner
            .ledger
            .place(&config, card_id, player, now_ms())
            .await;
        guard.release().await;
        let outcome = outcome?;

        self.publish(RoomEvent::CardClaimed {
            room_id: room_id.to_string(),
            card_id,
            player_id: player.player_id.clone(),
            username: player.username.clone(),
            population: outcome.population,
        });

        if self.inner.config.auto_start_countdown
            && outcome.status == GameStatus::Waiting
            && outcome.population >= self.min_players()
        {
            match self.start_countdown(room_id, Some(&player.player_id)).await {
                Ok(_) | Err(RoomError::CountdownAlreadyRunning) => {}
                Err(e) => debug!(room_id, error = %e, "automatic countdown not started"),
            }
        }

        Ok(BetReceipt {
            room_id: room_id.to_string(),
            card_id,
            population: outcome.population,
        })
    }

    /// Give a card back before the game starts
    pub async fn cancel_bet(
        &self,
        room_id: &str,
        card_id: u32,
        player_id: &str,
    ) -> RoomResult<BetReceipt> {
        require_id("room id", room_id)?;
        require_id("player id", player_id)?;
        self.inner.store.room_config(room_id).await?;

        let guard = self.inner.lock.acquire(room_id).await?;
        let result = self.cancel_bet_locked(room_id, card_id, player_id).await;
        guard.release().await;
        result
    }

    async fn cancel_bet_locked(
        &self,
        room_id: &str,
        card_id: u32,
        player_id: &str,
    ) -> RoomResult<BetReceipt> {
        let outcome = self.inner.ledger.release(room_id, card_id, player_id).await?;

        self.publish(RoomEvent::CardUnclaimed {
            room_id: room_id.to_string(),
            card_id,
            player_id: player_id.to_string(),
            population: outcome.population,
        });

        if outcome.status == GameStatus::Countdown && outcome.population < self.min_players() {
            self.inner.registry.cancel(room_id, TaskKind::Countdown);
            self.revert_countdown(room_id, "not enough players").await?;
        }

        Ok(BetReceipt {
            room_id: room_id.to_string(),
            card_id,
            population: outcome.population,
        })
    }

    /// Switch auto-play on or off for the caller's card
    pub async fn toggle_auto_play(
        &self,
        room_id: &str,
        card_id: u32,
        player_id: &str,
        enabled: bool,
    ) -> RoomResult<AutoPlayStatus> {
        require_id("room id", room_id)?;
        require_id("player id", player_id)?;
        self.inner.store.room_config(room_id).await?;

        let until = enabled.then(|| now_ms() + self.inner.config.timing.auto_play_ms as i64);
        let guard = self.inner.lock.acquire(room_id).await?;
        let claim = self
            .inner
            .ledger
            .set_auto(room_id, card_id, player_id, until)
            .await;
        guard.release().await;
        let claim = claim?;

        self.publish(RoomEvent::CardAutoUpdated {
            room_id: room_id.to_string(),
            card_id,
            player_id: player_id.to_string(),
            auto: claim.auto,
            auto_until: claim.auto_until,
        });

        Ok(AutoPlayStatus {
            card_id,
            auto: claim.auto,
            auto_until: claim.auto_until,
        })
    }

    /// Begin the countdown to the next game
    pub async fn start_countdown(
        &self,
        room_id: &str,
        started_by: Option<&str>,
    ) -> RoomResult<CountdownInfo> {
        require_id("room id", room_id)?;
        self.inner.store.room_config(room_id).await?;

        let guard = self.inner.lock.acquire(room_id).await?;
        let result = self.start_countdown_locked(room_id, started_by).await;
        guard.release().await;
        result
    }

    async fn start_countdown_locked(
        &self,
        room_id: &str,
        started_by: Option<&str>,
    ) -> RoomResult<CountdownInfo> {
        let runtime = self.inner.store.runtime(room_id).await?;
        if runtime.game_status == GameStatus::Countdown
            || self.inner.registry.is_running(room_id, TaskKind::Countdown)
        {
            return Err(RoomError::CountdownAlreadyRunning);
        }
        if runtime.game_status != GameStatus::Waiting {
            return Err(RoomError::CountdownNotAllowed(runtime.game_status));
        }

        let claims = self.inner.ledger.claims(room_id).await?;
        let population = claims::population(&claims);
        if population < self.min_players() {
            return Err(RoomError::NotEnoughPlayers {
                required: self.min_players(),
                found: population,
            });
        }

        let ends_at = now_ms() + self.inner.config.timing.countdown_ms as i64;
        let started_by = started_by.map(str::to_string);
        self.inner
            .store
            .patch_runtime(room_id, |state| {
                state.game_status = GameStatus::Countdown;
                state.countdown_end_at = Some(ends_at);
                state.countdown_started_by = started_by.clone();
            })
            .await?;

        info!(room_id, population, ends_at, "countdown started");
        self.publish(RoomEvent::CountdownStarted {
            room_id: room_id.to_string(),
            ends_at,
            started_by,
        });
        self.spawn_countdown(room_id);

        Ok(CountdownInfo {
            room_id: room_id.to_string(),
            ends_at,
            population,
        })
    }

    /// One-shot win claim for the caller's card.
    ///
    /// `cells` are row-major indices on the card; they must spell out one or
    /// more complete patterns whose numbers have all been called.
    pub async fn check_bingo(
        &self,
        room_id: &str,
        player_id: &str,
        cells: &[usize],
    ) -> RoomResult<BingoOutcome> {
        require_id("room id", room_id)?;
        require_id("player id", player_id)?;
        if cells.is_empty() {
            return Err(RoomError::Validation("no cells submitted".to_string()));
        }
        if let Some(bad) = cells.iter().find(|&&cell| cell >= GRID_CELLS) {
            return Err(RoomError::Validation(format!(
                "cell index {} is outside the card",
                bad
            )));
        }
        let config = self.inner.store.room_config(room_id).await?;

        let guard = self.inner.lock.acquire(room_id).await?;
        let result = self.check_bingo_locked(&config.room_id, player_id, cells).await;
        guard.release().await;

        let outcome = result?;
        self.schedule_reset(room_id);
        Ok(outcome)
    }

    async fn check_bingo_locked(
        &self,
        room_id: &str,
        player_id: &str,
        cells: &[usize],
    ) -> RoomResult<BingoOutcome> {
        let store = &self.inner.store;
        let runtime = store.runtime(room_id).await?;
        let game_id = match (&runtime.game_status, &runtime.current_game_id) {
            (GameStatus::Playing, Some(game_id)) => game_id.clone(),
            _ => return Err(RoomError::GameNotPlaying),
        };
        let game = match store.game(&game_id).await? {
            Some(game) if game.is_active() => game,
            _ => return Err(RoomError::GameNotPlaying),
        };

        let claims = self.inner.ledger.claims(room_id).await?;
        let card_id = claims::card_of(&claims, player_id).ok_or(RoomError::NoClaimedCard)?;
        let claim = &claims[&card_id];
        if claim.attempted_bingo {
            return Err(RoomError::AlreadyAttempted);
        }

        let config = store.room_config(room_id).await?;
        let card = config.card(card_id).ok_or(RoomError::InvalidCard(card_id))?;
        let called: HashSet<u8> = game.called().iter().copied().collect();

        let verdict = match_claim(cells).and_then(|matched| {
            let uncalled = cells
                .iter()
                .filter(|&&cell| cell != FREE_INDEX)
                .map(|&cell| card.number_at(cell))
                .find(|n| !called.contains(n));
            match uncalled {
                Some(n) => Err(format!("number {} has not been called", n)),
                None => Ok(matched),
            }
        });

        let matched = match verdict {
            Ok(matched) => matched,
            Err(reason) => {
                self.inner.ledger.record_attempt(room_id, card_id).await?;
                info!(room_id, player_id, card_id, reason = %reason, "bingo claim rejected");
                return Err(RoomError::InvalidPattern(reason));
            }
        };

        // The ticker must not write the game record while the win lands.
        self.inner.registry.stop(room_id, TaskKind::Draw).await;

        let mut ended = false;
        let result = self
            .confirm_win(room_id, &game_id, card_id, claim, matched, &mut ended)
            .await;
        if let Err(e) = &result {
            if ended {
                error!(room_id, game_id = %game_id, error = %e, "win recorded but not completed, resetting room");
                self.schedule_reset(room_id);
            } else {
                warn!(room_id, game_id = %game_id, error = %e, "win confirmation aborted, resuming draw");
                self.spawn_draw(room_id, &game_id);
            }
        }
        result
    }

    /// End the game for a verified claim and settle it.
    ///
    /// `ended` turns true once the game record is saved as ended; before that
    /// point the claim attempt is still unspent.
    async fn confirm_win(
        &self,
        room_id: &str,
        game_id: &str,
        card_id: u32,
        claim: &ClaimedCard,
        matched: Vec<usize>,
        ended: &mut bool,
    ) -> RoomResult<BingoOutcome> {
        let store = &self.inner.store;
        let player_id = claim.claimed_by.as_str();
        let mut game = store.game(game_id).await?.ok_or(RoomError::GameNotPlaying)?;
        if !game.is_active() {
            return Err(RoomError::GameNotPlaying);
        }

        let pool = payout_pool(
            game.total_cards,
            game.bet_amount,
            self.inner.settlement.payout_config(),
        );
        let pattern_index = matched[0];
        let winner = WinnerRecord {
            player_id: player_id.to_string(),
            username: claim.username.clone(),
            card_id,
            pattern_index,
            prize: pool,
        };

        game.winners = vec![winner.clone()];
        game.total_payout = pool;
        game.status = GameRecordStatus::Ended;
        game.end_reason = Some(EndReason::Bingo);
        store.save_game(&game).await?;
        *ended = true;

        self.inner.ledger.record_attempt(room_id, card_id).await?;
        store
            .patch_runtime(room_id, |state| {
                state.game_status = GameStatus::Ended;
                state.winner = Some(winner.clone());
                state.winners = vec![winner.clone()];
                state.payout = pool;
            })
            .await?;

        info!(
            room_id,
            game_id,
            player_id,
            card_id,
            pattern = %all_patterns()[pattern_index].kind,
            pool,
            "bingo confirmed"
        );

        let payout = match self.inner.settlement.finalize(room_id, game_id).await? {
            Some(plan) => plan.per_winner,
            None => {
                error!(room_id, game_id, player_id, "winning game was already settled, no credit made");
                0
            }
        };

        self.publish(RoomEvent::WinnerConfirmed {
            room_id: room_id.to_string(),
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            username: winner.username.clone(),
            card_id,
            pattern_index,
            payout,
        });
        self.publish(RoomEvent::GameEnded {
            room_id: room_id.to_string(),
            game_id: game_id.to_string(),
            reason: EndReason::Bingo,
            winners: vec![player_id.to_string()],
            payout,
        });

        Ok(BingoOutcome {
            game_id: game_id.to_string(),
            card_id,
            patterns: matched,
            payout,
        })
    }

    /// Settle a finished game; repeated calls change nothing
    pub async fn settle_game(&self, room_id: &str, game_id: &str) -> RoomResult<bool> {
        require_id("room id", room_id)?;
        require_id("game id", game_id)?;

        let guard = self.inner.lock.acquire(room_id).await?;
        let result = self.inner.settlement.finalize(room_id, game_id).await;
        guard.release().await;
        Ok(result?.is_some())
    }

    /// Room config merged with runtime state and claim status of every card
    pub async fn room_snapshot(&self, room_id: &str) -> RoomResult<RoomSnapshot> {
        require_id("room id", room_id)?;
        let config = self.inner.store.room_config(room_id).await?;
        let runtime = self.inner.store.runtime(room_id).await?;
        let claims = self.inner.ledger.claims(room_id).await?;

        let cards = config
            .cards
            .iter()
            .map(|card| {
                let claim = claims.get(&card.id);
                CardView {
                    card_id: card.id,
                    grid: card.grid,
                    claimed: claim.is_some(),
                    claimed_by: claim.map(|c| c.claimed_by.clone()),
                    username: claim.map(|c| c.username.clone()),
                    auto: claim.map_or(false, |c| c.auto),
                    auto_until: claim.and_then(|c| c.auto_until),
                }
            })
            .collect();

        Ok(RoomSnapshot {
            capacity: config.effective_capacity(),
            room_id: config.room_id,
            name: config.name,
            bet_amount: config.bet_amount,
            runtime,
            cards,
            players: claims::players(&claims),
        })
    }

    /// Abandon whatever the room is doing and start a fresh round
    pub async fn reset_room(&self, room_id: &str) -> RoomResult<Vec<u32>> {
        require_id("room id", room_id)?;
        let config = self.inner.store.room_config(room_id).await?;

        // No game start is mid-flight while the lock is held.
        let guard = self.inner.lock.acquire(room_id).await?;
        let registry = &self.inner.registry;
        registry.stop(room_id, TaskKind::Countdown).await;
        registry.stop(room_id, TaskKind::Draw).await;
        registry.cancel(room_id, TaskKind::Reset);
        let result = self.reset_locked(room_id, config.bet_amount).await;
        guard.release().await;

        self.after_reset(room_id, result?).await
    }

    /// Apply the reset retention rule under the lock, then maybe restart
    pub(super) async fn reset_now(&self, room_id: &str) -> RoomResult<Vec<u32>> {
        let config = self.inner.store.room_config(room_id).await?;

        let guard = self.inner.lock.acquire(room_id).await?;
        let result = self.reset_locked(room_id, config.bet_amount).await;
        guard.release().await;

        self.after_reset(room_id, result?).await
    }

    async fn reset_locked(&self, room_id: &str, bet_amount: i64) -> RoomResult<ResetOutcome> {
        let runtime = self.inner.store.runtime(room_id).await?;
        let discarded = match (&runtime.game_status, runtime.current_game_id) {
            (GameStatus::Playing, Some(game_id)) => {
                warn!(room_id, game_id = %game_id, "discarding a game in progress");
                Some(game_id)
            }
            _ => None,
        };
        let retained = self.inner.settlement.reset(room_id, bet_amount).await?;
        Ok(ResetOutcome { retained, discarded })
    }

    async fn after_reset(&self, room_id: &str, outcome: ResetOutcome) -> RoomResult<Vec<u32>> {
        if let Some(game_id) = outcome.discarded {
            self.publish(RoomEvent::GameEnded {
                room_id: room_id.to_string(),
                game_id,
                reason: EndReason::Reset,
                winners: Vec::new(),
                payout: 0,
            });
        }
        self.publish(RoomEvent::RoomReset {
            room_id: room_id.to_string(),
            retained_cards: outcome.retained.clone(),
        });

        let population = claims::population(&self.inner.ledger.claims(room_id).await?);
        if self.inner.config.auto_start_countdown && population >= self.min_players() {
            if let Err(e) = self.start_countdown(room_id, None).await {
                debug!(room_id, error = %e, "countdown after reset not started");
            }
        }
        Ok(outcome.retained)
    }
}

struct ResetOutcome {
    retained: Vec<u32>,
    /// Game that was still being played when the reset landed
    discarded: Option<String>,
}

fn require_id(field: &str, value: &str) -> RoomResult<()> {
    if value.trim().is_empty() {
        return Err(RoomError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastHub;
    use crate::room::types::{Game, RoomConfig, UserProfile};
    use crate::store::testing::FaultyEphemeralStore;
    use crate::store::{EphemeralStore, MemoryDurableStore, MemoryEphemeralStore};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    async fn orchestrator(auto_start: bool) -> (RoomOrchestrator, BroadcastHub) {
        let mut config = BingoConfig::fast();
        config.auto_start_countdown = auto_start;
        orchestrator_on(config, Arc::new(MemoryEphemeralStore::new())).await
    }

    async fn orchestrator_on(
        config: BingoConfig,
        ephemeral: Arc<dyn EphemeralStore>,
    ) -> (RoomOrchestrator, BroadcastHub) {
        let durable = Arc::new(MemoryDurableStore::new());
        for id in ["p1", "p2", "p3"] {
            durable.upsert_user(UserProfile::new(id).with_balance(1_000));
        }
        let store = RoomStore::new(durable, ephemeral, config.ttl.clone());
        store
            .durable()
            .save_room_config(RoomConfig::generated(
                "r1",
                "Test",
                100,
                6,
                &mut StdRng::seed_from_u64(1),
            ))
            .await
            .unwrap();
        let hub = BroadcastHub::new(64);
        (
            RoomOrchestrator::new(config, store, Arc::new(hub.clone())),
            hub,
        )
    }

    /// Put p1 (card 1) and p2 (card 2) into a running game `g1` where card
    /// 1's top row has been called. Returns the top row cells.
    async fn stage_game(orch: &RoomOrchestrator) -> Vec<usize> {
        orch.place_bet("r1", 1, &PlayerRef::new("p1", "a")).await.unwrap();
        orch.place_bet("r1", 2, &PlayerRef::new("p2", "b")).await.unwrap();

        let config = orch.store().room_config("r1").await.unwrap();
        let card = config.card(1).unwrap();
        let top_row: Vec<usize> = (0..5).collect();
        let mut drawn: Vec<u8> = top_row.iter().map(|&i| card.number_at(i)).collect();
        let rest: Vec<u8> = (1..=75u8).filter(|n| !drawn.contains(n)).collect();
        drawn.extend(rest);

        let game = Game {
            game_id: "g1".to_string(),
            room_id: "r1".to_string(),
            drawn_numbers: drawn,
            current_number_index: 5,
            planned_winners: Vec::new(),
            winners: Vec::new(),
            total_cards: 2,
            bet_amount: 100,
            total_payout: 0,
            status: GameRecordStatus::Active,
            bets_deducted: true,
            end_reason: None,
            created_at: now_ms(),
        };
        orch.store().save_game(&game).await.unwrap();
        orch.store()
            .patch_runtime("r1", |s| {
                s.game_status = GameStatus::Playing;
                s.current_game_id = Some("g1".to_string());
            })
            .await
            .unwrap();
        top_row
    }

    #[tokio::test]
    async fn test_missing_room() {
        let (orch, _) = orchestrator(false).await;
        let result = orch.place_bet("nope", 1, &PlayerRef::new("p1", "a")).await;
        assert!(matches!(result, Err(RoomError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn test_blank_ids_are_validation_errors() {
        let (orch, _) = orchestrator(false).await;
        assert!(matches!(
            orch.cancel_bet("r1", 1, " ").await,
            Err(RoomError::Validation(_))
        ));
        assert!(matches!(
            orch.check_bingo("r1", "p1", &[30]).await,
            Err(RoomError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_countdown_needs_two_players() {
        let (orch, _) = orchestrator(false).await;
        orch.place_bet("r1", 1, &PlayerRef::new("p1", "a")).await.unwrap();

        assert!(matches!(
            orch.start_countdown("r1", Some("p1")).await,
            Err(RoomError::NotEnoughPlayers { required: 2, found: 1 })
        ));

        orch.place_bet("r1", 2, &PlayerRef::new("p2", "b")).await.unwrap();
        orch.start_countdown("r1", Some("p1")).await.unwrap();
        assert!(matches!(
            orch.start_countdown("r1", Some("p2")).await,
            Err(RoomError::CountdownAlreadyRunning)
        ));
        orch.registry().cancel_room("r1");
    }

    #[tokio::test]
    async fn test_bingo_outside_game_is_rejected() {
        let (orch, _) = orchestrator(false).await;
        orch.place_bet("r1", 1, &PlayerRef::new("p1", "a")).await.unwrap();
        assert!(matches!(
            orch.check_bingo("r1", "p1", &[0, 1, 2, 3, 4]).await,
            Err(RoomError::GameNotPlaying)
        ));
    }

    #[tokio::test]
    async fn test_auto_play_toggle_publishes() {
        let (orch, hub) = orchestrator(false).await;
        let mut rx = hub.subscribe();
        orch.place_bet("r1", 3, &PlayerRef::new("p1", "a")).await.unwrap();

        let status = orch.toggle_auto_play("r1", 3, "p1", true).await.unwrap();
        assert!(status.auto);
        assert!(status.auto_until.unwrap() > now_ms());
        assert!(matches!(
            orch.toggle_auto_play("r1", 3, "p2", false).await,
            Err(RoomError::NotOwner(3))
        ));

        assert_eq!(rx.recv().await.unwrap().name(), "cardClaimed");
        assert_eq!(rx.recv().await.unwrap().name(), "cardAutoUpdated");
    }

    #[tokio::test]
    async fn test_snapshot_derives_players_from_claims() {
        let (orch, _) = orchestrator(false).await;
        orch.place_bet("r1", 4, &PlayerRef::new("p2", "bob")).await.unwrap();

        let snapshot = orch.room_snapshot("r1").await.unwrap();
        assert_eq!(snapshot.cards.len(), 6);
        assert_eq!(snapshot.capacity, 6);
        assert_eq!(snapshot.players, vec![PlayerRef::new("p2", "bob")]);
        let card = snapshot.cards.iter().find(|c| c.card_id == 4).unwrap();
        assert!(card.claimed);
        assert_eq!(card.username.as_deref(), Some("bob"));
        assert_eq!(snapshot.runtime.game_status, GameStatus::Waiting);
    }

    #[tokio::test]
    async fn test_reset_room_clears_claims() {
        let (orch, _) = orchestrator(false).await;
        orch.place_bet("r1", 1, &PlayerRef::new("p1", "a")).await.unwrap();
        orch.place_bet("r1", 2, &PlayerRef::new("p2", "b")).await.unwrap();
        orch.start_countdown("r1", None).await.unwrap();

        let retained = orch.reset_room("r1").await.unwrap();

        assert!(retained.is_empty());
        let snapshot = orch.room_snapshot("r1").await.unwrap();
        assert_eq!(snapshot.runtime.game_status, GameStatus::Waiting);
        assert!(snapshot.players.is_empty());
        assert!(!orch.registry().is_running("r1", TaskKind::Countdown));
    }

    #[tokio::test]
    async fn test_settling_a_running_game_keeps_the_prize() {
        let (orch, _) = orchestrator(false).await;
        let cells = stage_game(&orch).await;

        assert!(!orch.settle_game("r1", "g1").await.unwrap());
        assert!(!orch.store().runtime("r1").await.unwrap().payed);

        let outcome = orch.check_bingo("r1", "p1", &cells).await.unwrap();
        assert_eq!(outcome.payout, 160);
        assert_eq!(orch.store().durable().get_balance("p1").await.unwrap(), 1_160);
        assert!(!orch.settle_game("r1", "g1").await.unwrap());
        orch.registry().cancel_room("r1");
    }

    #[tokio::test]
    async fn test_failed_win_write_resumes_draw() {
        let mut config = BingoConfig::fast();
        config.auto_start_countdown = false;
        config.timing.draw_interval_ms = 60_000;
        let ephemeral = Arc::new(FaultyEphemeralStore::new());
        let (orch, _) = orchestrator_on(config, ephemeral.clone()).await;
        let cells = stage_game(&orch).await;

        ephemeral.fail_writes("bingo:game:");
        assert!(matches!(
            orch.check_bingo("r1", "p1", &cells).await,
            Err(RoomError::Store(_))
        ));
        ephemeral.heal();

        assert!(orch.registry().is_running("r1", TaskKind::Draw));
        assert!(!orch.store().claims("r1").await.unwrap()[&1].attempted_bingo);
        assert_eq!(
            orch.store().runtime("r1").await.unwrap().game_status,
            GameStatus::Playing
        );

        let outcome = orch.check_bingo("r1", "p1", &cells).await.unwrap();
        assert_eq!(outcome.payout, 160);
        assert!(!orch.registry().is_running("r1", TaskKind::Draw));
        orch.registry().cancel_room("r1");
    }

    #[tokio::test]
    async fn test_countdown_refused_while_playing() {
        let (orch, _) = orchestrator(false).await;
        stage_game(&orch).await;

        let err = orch.start_countdown("r1", Some("p1")).await.unwrap_err();
        assert!(matches!(err, RoomError::CountdownNotAllowed(GameStatus::Playing)));
        assert_eq!(err.code(), "COUNTDOWN_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_reset_mid_game_reports_discarded_game() {
        let (orch, hub) = orchestrator(false).await;
        stage_game(&orch).await;
        let mut rx = hub.subscribe();

        orch.reset_room("r1").await.unwrap();

        match rx.recv().await.unwrap() {
            RoomEvent::GameEnded {
                game_id,
                reason,
                payout,
                ..
            } => {
                assert_eq!(game_id, "g1");
                assert_eq!(reason, EndReason::Reset);
                assert_eq!(payout, 0);
            }
            other => panic!("unexpected event {}", other.name()),
        }
        assert_eq!(rx.recv().await.unwrap().name(), "roomReset");
        assert!(orch.store().game("g1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_during_game_start_charges_all_or_none() {
        let mut config = BingoConfig::fast();
        config.auto_start_countdown = false;
        config.timing.countdown_ms = 0;
        config.timing.countdown_check_ms = 1;
        let (orch, _) = orchestrator_on(config, Arc::new(MemoryEphemeralStore::new())).await;
        orch.place_bet("r1", 1, &PlayerRef::new("p1", "a")).await.unwrap();
        orch.place_bet("r1", 2, &PlayerRef::new("p2", "b")).await.unwrap();

        orch.start_countdown("r1", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        orch.reset_room("r1").await.unwrap();

        let durable = orch.store().durable();
        let p1 = durable.get_user("p1").await.unwrap().unwrap();
        let p2 = durable.get_user("p2").await.unwrap().unwrap();
        assert_eq!(p1.balance, p2.balance);
        assert_eq!(p1.games_played, p2.games_played);
        assert_eq!(
            orch.store().runtime("r1").await.unwrap().game_status,
            GameStatus::Waiting
        );
        assert!(!orch.registry().is_running("r1", TaskKind::Countdown));
        assert!(!orch.registry().is_running("r1", TaskKind::Draw));
    }
}
