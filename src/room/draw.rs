//! Draw ticker and post-game reset
//!
//! One number is revealed per tick from the precomputed sequence. After each
//! reveal, auto-play cards are checked; the first covered card files a claim
//! from its own task so the ticker never waits on the room lock.

use super::orchestrator::RoomOrchestrator;
use super::patterns::{all_patterns, first_covered};
use super::scheduler::{TaskKind, TaskTicket};
use super::settlement::payout_pool;
use super::types::{now_ms, EndReason, GameRecordStatus, GameStatus};
use crate::errors::{RoomError, RoomResult};
use crate::events::RoomEvent;
use std::collections::HashSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

enum Step {
    Drawn,
    Finished,
}

impl RoomOrchestrator {
    pub(super) fn spawn_draw(&self, room_id: &str, game_id: &str) {
        let this = self.clone();
        let game_id = game_id.to_string();
        self.inner
            .registry
            .spawn(room_id, TaskKind::Draw, move |ticket| async move {
                this.run_draw(&ticket, &game_id).await;
                this.inner.registry.finish(&ticket);
            });
    }

    async fn run_draw(&self, ticket: &TaskTicket, game_id: &str) {
        let room_id = ticket.room_id.as_str();
        let mut ticker = tokio::time::interval(self.inner.config.draw_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.draw_tick(room_id, game_id).await {
                Ok(Step::Drawn) => {}
                Ok(Step::Finished) => break,
                Err(e) => {
                    warn!(room_id, game_id, error = %e, "draw stopped on error");
                    break;
                }
            }
        }
    }

    async fn draw_tick(&self, room_id: &str, game_id: &str) -> RoomResult<Step> {
        let store = &self.inner.store;
        let Some(mut game) = store.game(game_id).await? else {
            warn!(room_id, game_id, "game record missing, stopping draw");
            return Ok(Step::Finished);
        };
        if !game.is_active() {
            return Ok(Step::Finished);
        }

        let runtime = store.runtime(room_id).await?;
        if runtime.game_status != GameStatus::Playing
            || runtime.current_game_id.as_deref() != Some(game_id)
        {
            debug!(room_id, game_id, "draw no longer current");
            return Ok(Step::Finished);
        }

        if game.is_exhausted() {
            self.end_exhausted(room_id, game_id).await?;
            return Ok(Step::Finished);
        }

        let number = game.drawn_numbers[game.current_number_index];
        game.current_number_index += 1;
        store.save_game(&game).await?;

        let called = game.called().to_vec();
        store
            .patch_runtime(room_id, |state| {
                if state.current_game_id.as_deref() == Some(game_id) {
                    state.called_numbers = called.clone();
                }
            })
            .await?;

        debug!(room_id, game_id, number, index = game.current_number_index, "number drawn");
        self.publish(RoomEvent::NumberDrawn {
            room_id: room_id.to_string(),
            game_id: game_id.to_string(),
            number,
            index: game.current_number_index,
        });

        self.evaluate_auto_play(room_id, &called).await?;
        Ok(Step::Drawn)
    }

    /// File a claim for the first auto-play card whose pattern is covered
    async fn evaluate_auto_play(&self, room_id: &str, called: &[u8]) -> RoomResult<()> {
        let claims = self.inner.ledger.claims(room_id).await?;
        let now = now_ms();
        if !claims.values().any(|c| c.auto_active(now) && !c.attempted_bingo) {
            return Ok(());
        }

        let config = self.inner.store.room_config(room_id).await?;
        let called: HashSet<u8> = called.iter().copied().collect();
        for (card_id, claim) in &claims {
            if !claim.auto_active(now) || claim.attempted_bingo {
                continue;
            }
            let Some(card) = config.card(*card_id) else {
                continue;
            };
            if let Some(pattern_index) = first_covered(card, &called) {
                info!(room_id, card_id, pattern_index, "auto-play claiming bingo");
                self.spawn_auto_claim(
                    room_id,
                    &claim.claimed_by,
                    all_patterns()[pattern_index].cells.clone(),
                );
                break;
            }
        }
        Ok(())
    }

    fn spawn_auto_claim(&self, room_id: &str, player_id: &str, cells: Vec<usize>) {
        let this = self.clone();
        let room_id = room_id.to_string();
        let player_id = player_id.to_string();
        tokio::spawn(async move {
            match this.check_bingo(&room_id, &player_id, &cells).await {
                Ok(outcome) => {
                    debug!(room_id = %room_id, game_id = %outcome.game_id, "auto-play bingo confirmed")
                }
                Err(RoomError::GameNotPlaying) | Err(RoomError::AlreadyAttempted) => {}
                Err(e) => warn!(room_id = %room_id, player_id = %player_id, error = %e, "auto-play claim failed"),
            }
        });
    }

    /// Close a game whose sequence ran out without a confirmed bingo
    async fn end_exhausted(&self, room_id: &str, game_id: &str) -> RoomResult<()> {
        let guard = self.inner.lock.acquire(room_id).await?;
        let result = async {
            let store = &self.inner.store;
            let Some(mut game) = store.game(game_id).await? else {
                return Ok(false);
            };
            if !game.is_active() {
                return Ok(false);
            }

            game.status = GameRecordStatus::Ended;
            game.end_reason = Some(EndReason::AllNumbersDrawn);
            game.total_payout = payout_pool(
                game.total_cards,
                game.bet_amount,
                self.inner.settlement.payout_config(),
            );
            store.save_game(&game).await?;
            store
                .patch_runtime(room_id, |state| {
                    state.game_status = GameStatus::Ended;
                    state.payout = 0;
                })
                .await?;

            self.inner.settlement.finalize(room_id, game_id).await?;
            Ok::<bool, RoomError>(true)
        }
        .await;
        guard.release().await;

        if result? {
            info!(room_id, game_id, "all numbers drawn without a winner");
            self.publish(RoomEvent::GameEnded {
                room_id: room_id.to_string(),
                game_id: game_id.to_string(),
                reason: EndReason::AllNumbersDrawn,
                winners: Vec::new(),
                payout: 0,
            });
            self.schedule_reset(room_id);
        }
        Ok(())
    }

    /// Reset the room after the grace delay unless a new game gets there first
    pub(super) fn schedule_reset(&self, room_id: &str) {
        let this = self.clone();
        let delay = self.inner.config.reset_delay();
        self.inner
            .registry
            .spawn(room_id, TaskKind::Reset, move |ticket| async move {
                tokio::time::sleep(delay).await;
                this.inner.registry.finish(&ticket);
                if let Err(e) = this.reset_now(&ticket.room_id).await {
                    warn!(room_id = %ticket.room_id, error = %e, "scheduled reset failed");
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BingoConfig;
    use crate::events::{BroadcastHub, RoomEvent};
    use crate::room::scheduler::TaskKind;
    use crate::room::types::{GameStatus, PlayerRef, RoomConfig, UserProfile};
    use crate::room::RoomOrchestrator;
    use crate::store::testing::FaultyEphemeralStore;
    use crate::store::{DurableStore, MemoryDurableStore, MemoryEphemeralStore, RoomStore};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::time::Duration;

    async fn playing_room(auto_play: bool) -> (RoomOrchestrator, BroadcastHub, Arc<MemoryDurableStore>) {
        let mut config = BingoConfig::fast();
        config.auto_start_countdown = false;
        config.timing.countdown_ms = 0;
        config.timing.draw_interval_ms = 5;
        config.timing.reset_delay_ms = 5_000;
        let durable = Arc::new(MemoryDurableStore::new());
        for id in ["p1", "p2"] {
            durable.upsert_user(UserProfile::new(id).with_balance(500));
        }
        let store = RoomStore::new(durable.clone(), Arc::new(MemoryEphemeralStore::new()), config.ttl.clone());
        store
            .durable()
            .save_room_config(RoomConfig::generated("r1", "Test", 100, 2, &mut StdRng::seed_from_u64(5)))
            .await
            .unwrap();
        let hub = BroadcastHub::new(1024);
        let orch = RoomOrchestrator::new(config, store, Arc::new(hub.clone()));

        orch.place_bet("r1", 1, &PlayerRef::new("p1", "a")).await.unwrap();
        orch.place_bet("r1", 2, &PlayerRef::new("p2", "b")).await.unwrap();
        if auto_play {
            orch.toggle_auto_play("r1", 1, "p1", true).await.unwrap();
            orch.toggle_auto_play("r1", 2, "p2", true).await.unwrap();
        }
        (orch, hub, durable)
    }

    #[tokio::test]
    async fn test_auto_play_claims_the_win() {
        let (orch, hub, durable) = playing_room(true).await;
        let mut rx = hub.subscribe();
        orch.start_countdown("r1", None).await.unwrap();

        let ended = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(RoomEvent::GameEnded { reason, winners, payout, .. }) = rx.recv().await {
                    return (reason, winners, payout);
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(ended.0, crate::room::types::EndReason::Bingo);
        assert_eq!(ended.1.len(), 1);
        assert_eq!(ended.2, 160);

        let runtime = orch.store().runtime("r1").await.unwrap();
        assert_eq!(runtime.game_status, GameStatus::Ended);
        assert!(runtime.payed);
        assert_eq!(durable.revenue_entries()[0].amount, 40);
        orch.registry().cancel_room("r1");
    }

    #[tokio::test]
    async fn test_sequence_exhaustion_ends_without_winner() {
        let (orch, hub, durable) = playing_room(false).await;
        let mut rx = hub.subscribe();
        orch.start_countdown("r1", None).await.unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(RoomEvent::GameEnded { reason, .. }) = rx.recv().await {
                    return reason;
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(reason, crate::room::types::EndReason::AllNumbersDrawn);
        let runtime = orch.store().runtime("r1").await.unwrap();
        assert_eq!(runtime.called_numbers.len(), 75);
        // Nobody wins: the full pool of 160 is booked at the 1.25 markup.
        assert_eq!(durable.revenue_entries()[0].amount, 200);
        assert_eq!(durable.get_balance("p1").await.unwrap(), 400);
        orch.registry().cancel_room("r1");
    }

    #[tokio::test]
    async fn test_store_fault_stops_only_that_room() {
        let mut config = BingoConfig::fast();
        config.auto_start_countdown = false;
        config.timing.countdown_ms = 0;
        config.timing.draw_interval_ms = 20;
        let durable = Arc::new(MemoryDurableStore::new());
        for id in ["p1", "p2", "p3", "p4"] {
            durable.upsert_user(UserProfile::new(id).with_balance(500));
        }
        let ephemeral = Arc::new(FaultyEphemeralStore::new());
        let store = RoomStore::new(durable, ephemeral.clone(), config.ttl.clone());
        let mut rng = StdRng::seed_from_u64(9);
        for room in ["r1", "r2"] {
            store
                .durable()
                .save_room_config(RoomConfig::generated(room, room, 100, 2, &mut rng))
                .await
                .unwrap();
        }
        let hub = BroadcastHub::new(1024);
        let mut rx = hub.subscribe();
        let orch = RoomOrchestrator::new(config, store, Arc::new(hub.clone()));

        for (room, first, second) in [("r1", "p1", "p2"), ("r2", "p3", "p4")] {
            orch.place_bet(room, 1, &PlayerRef::new(first, first)).await.unwrap();
            orch.place_bet(room, 2, &PlayerRef::new(second, second)).await.unwrap();
            orch.start_countdown(room, None).await.unwrap();
        }

        let mut started = 0;
        tokio::time::timeout(Duration::from_secs(5), async {
            while started < 2 {
                if let Ok(RoomEvent::GameStarted { .. }) = rx.recv().await {
                    started += 1;
                }
            }
        })
        .await
        .unwrap();

        ephemeral.fail_keys("bingo:room:r1:");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!orch.registry().is_running("r1", TaskKind::Draw));
        assert!(orch.registry().is_running("r2", TaskKind::Draw));

        let before = orch.store().runtime("r2").await.unwrap().called_numbers.len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after = orch.store().runtime("r2").await.unwrap().called_numbers.len();
        assert!(after > before);

        ephemeral.heal();
        orch.registry().cancel_room("r1");
        orch.registry().cancel_room("r2");
    }
}
