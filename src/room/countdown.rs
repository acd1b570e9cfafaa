//! Countdown ticker: `waiting → countdown → playing`
//!
//! Ticks are not locked; each one re-reads the room and falls back to
//! `waiting` as soon as the population drops below the minimum. Only the
//! hand-off at expiry takes the room lock.

use super::claims;
use super::orchestrator::RoomOrchestrator;
use super::scheduler::{TaskKind, TaskTicket};
use super::selector::Contender;
use super::settlement::payout_pool;
use super::types::{now_ms, ClaimMap, Game, GameRecordStatus, GameStatus, RoomConfig};
use crate::errors::{RoomResult, StoreResult};
use crate::events::RoomEvent;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

enum Tick {
    Continue,
    Done,
}

impl RoomOrchestrator {
    pub(super) fn spawn_countdown(&self, room_id: &str) {
        let this = self.clone();
        self.inner
            .registry
            .spawn(room_id, TaskKind::Countdown, move |ticket| async move {
                this.run_countdown(&ticket).await;
                this.inner.registry.finish(&ticket);
            });
    }

    async fn run_countdown(&self, ticket: &TaskTicket) {
        let room_id = ticket.room_id.as_str();
        let mut ticker = tokio::time::interval(self.inner.config.countdown_check());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.countdown_tick(room_id).await {
                Ok(Tick::Continue) => {}
                Ok(Tick::Done) => break,
                Err(e) => {
                    warn!(room_id, error = %e, "countdown stopped on error");
                    break;
                }
            }
        }
    }

    async fn countdown_tick(&self, room_id: &str) -> RoomResult<Tick> {
        let store = &self.inner.store;
        let runtime = store.runtime(room_id).await?;
        if runtime.game_status != GameStatus::Countdown {
            debug!(room_id, status = %runtime.game_status, "countdown no longer current");
            return Ok(Tick::Done);
        }

        let population = claims::population(&self.inner.ledger.claims(room_id).await?);
        if population < self.min_players() {
            self.revert_countdown(room_id, "not enough players").await?;
            return Ok(Tick::Done);
        }

        let ends_at = runtime.countdown_end_at.unwrap_or_default();
        if now_ms() < ends_at {
            return Ok(Tick::Continue);
        }

        let config = store.room_config(room_id).await?;
        let guard = self.inner.lock.acquire(room_id).await?;
        let result = self.expire_countdown(&config).await;
        guard.release().await;
        result.map(|_| Tick::Done)
    }

    /// Final population check at expiry, then hand off to the draw
    async fn expire_countdown(&self, config: &RoomConfig) -> RoomResult<()> {
        let room_id = config.room_id.as_str();
        let runtime = self.inner.store.runtime(room_id).await?;
        if runtime.game_status != GameStatus::Countdown {
            return Ok(());
        }

        let claims = self.inner.ledger.claims(room_id).await?;
        if claims::population(&claims) < self.min_players() {
            self.revert_countdown(room_id, "not enough players").await?;
            return Ok(());
        }

        if let Err(e) = self.start_game(config, &claims).await {
            error!(room_id, error = %e, "game start failed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Put the room back in `waiting` if it is still counting down
    pub(super) async fn revert_countdown(&self, room_id: &str, reason: &str) -> StoreResult<()> {
        let mut reverted = false;
        self.inner
            .store
            .patch_runtime(room_id, |state| {
                if state.game_status == GameStatus::Countdown {
                    state.game_status = GameStatus::Waiting;
                    state.countdown_end_at = None;
                    state.countdown_started_by = None;
                    reverted = true;
                }
            })
            .await?;

        if reverted {
            info!(room_id, reason, "countdown stopped");
            self.publish(RoomEvent::CountdownStopped {
                room_id: room_id.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    /// Plan the draw, charge the bets and start revealing numbers
    async fn start_game(&self, config: &RoomConfig, claims: &ClaimMap) -> StoreResult<()> {
        let room_id = config.room_id.as_str();
        let store = &self.inner.store;
        self.inner.registry.cancel(room_id, TaskKind::Reset);

        let mut contenders = Vec::with_capacity(claims.len());
        for (card_id, claim) in claims {
            let Some(card) = config.card(*card_id) else {
                warn!(room_id, card_id, "claimed card missing from catalog");
                continue;
            };
            let profile = store.durable().get_user(&claim.claimed_by).await?;
            contenders.push(Contender {
                card: card.clone(),
                player_id: claim.claimed_by.clone(),
                is_demo: profile.as_ref().map_or(false, |p| p.is_demo),
                games_played: profile.as_ref().map_or(0, |p| p.games_played),
            });
        }

        let recent = store.recent_winners(room_id).await?;
        let plan = {
            let mut rng = StdRng::from_entropy();
            self.inner
                .selector
                .generate_draw_sequence(&contenders, &recent, &mut rng)
        };
        store.save_recent_winners(room_id, &plan.recent_winners).await?;

        let pot = payout_pool(
            claims.len(),
            config.bet_amount,
            self.inner.settlement.payout_config(),
        );
        let mut game = Game {
            game_id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            drawn_numbers: plan.drawn_numbers,
            current_number_index: 0,
            planned_winners: plan.winners,
            winners: Vec::new(),
            total_cards: claims.len(),
            bet_amount: config.bet_amount,
            total_payout: 0,
            status: GameRecordStatus::Active,
            bets_deducted: false,
            end_reason: None,
            created_at: now_ms(),
        };
        store.save_game(&game).await?;
        self.inner.settlement.deduct_bets(&mut game, claims).await?;

        let game_id = game.game_id.clone();
        store
            .patch_runtime(room_id, |state| {
                state.game_status = GameStatus::Playing;
                state.countdown_end_at = None;
                state.current_game_id = Some(game_id.clone());
                state.called_numbers.clear();
                state.winner = None;
                state.winners.clear();
                state.payout = 0;
                state.payed = false;
            })
            .await?;

        let players = claims::population(claims);
        info!(
            room_id,
            game_id = %game_id,
            players,
            planned_winners = game.planned_winners.len(),
            "game started"
        );
        self.publish(RoomEvent::GameStarted {
            room_id: room_id.to_string(),
            game_id: game_id.clone(),
            players,
            pot,
        });
        self.spawn_draw(room_id, &game_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BingoConfig;
    use crate::events::{BroadcastHub, RoomEvent};
    use crate::room::scheduler::TaskKind;
    use crate::room::types::{GameStatus, PlayerRef, RoomConfig, UserProfile};
    use crate::room::RoomOrchestrator;
    use crate::store::{DurableStore, MemoryDurableStore, MemoryEphemeralStore, RoomStore};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::time::Duration;

    async fn setup() -> (RoomOrchestrator, BroadcastHub) {
        let mut config = BingoConfig::fast();
        config.auto_start_countdown = false;
        let durable = Arc::new(MemoryDurableStore::new());
        for id in ["p1", "p2"] {
            durable.upsert_user(UserProfile::new(id).with_balance(500));
        }
        let store = RoomStore::new(durable, Arc::new(MemoryEphemeralStore::new()), config.ttl.clone());
        store
            .durable()
            .save_room_config(RoomConfig::generated("r1", "Test", 100, 4, &mut StdRng::seed_from_u64(2)))
            .await
            .unwrap();
        let hub = BroadcastHub::new(256);
        (RoomOrchestrator::new(config, store, Arc::new(hub.clone())), hub)
    }

    #[tokio::test]
    async fn test_countdown_hands_off_to_game() {
        let (orch, hub) = setup().await;
        let mut rx = hub.subscribe();
        orch.place_bet("r1", 1, &PlayerRef::new("p1", "a")).await.unwrap();
        orch.place_bet("r1", 2, &PlayerRef::new("p2", "b")).await.unwrap();
        orch.start_countdown("r1", Some("p1")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;

        let runtime = orch.store().runtime("r1").await.unwrap();
        assert_eq!(runtime.game_status, GameStatus::Playing);
        assert!(runtime.current_game_id.is_some());
        assert!(!orch.registry().is_running("r1", TaskKind::Countdown));

        let mut started = false;
        while let Ok(event) = rx.try_recv() {
            if let RoomEvent::GameStarted { players, pot, .. } = event {
                assert_eq!(players, 2);
                assert_eq!(pot, 160);
                started = true;
            }
        }
        assert!(started);

        // Bets are charged once at game creation.
        let durable = orch.store().durable();
        assert_eq!(durable.get_balance("p1").await.unwrap(), 400);
        assert_eq!(durable.get_user("p2").await.unwrap().unwrap().games_played, 1);
        orch.registry().cancel_room("r1");
    }

    #[tokio::test]
    async fn test_population_loss_reverts_to_waiting() {
        let (orch, hub) = setup().await;
        let mut rx = hub.subscribe();
        orch.place_bet("r1", 1, &PlayerRef::new("p1", "a")).await.unwrap();
        orch.place_bet("r1", 2, &PlayerRef::new("p2", "b")).await.unwrap();
        orch.start_countdown("r1", None).await.unwrap();

        orch.cancel_bet("r1", 2, "p2").await.unwrap();

        let runtime = orch.store().runtime("r1").await.unwrap();
        assert_eq!(runtime.game_status, GameStatus::Waiting);
        assert_eq!(runtime.countdown_end_at, None);
        assert!(!orch.registry().is_running("r1", TaskKind::Countdown));

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert!(names.contains(&"countdownStopped"));
    }
}
