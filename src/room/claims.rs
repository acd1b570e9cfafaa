//! Claim ledger: which card belongs to which player in a room
//!
//! The ledger is the only source of truth for who is playing. Any player list
//! shown to clients is derived from it. Callers hold the room lock around
//! every mutation.

use super::types::{ClaimMap, ClaimedCard, GameStatus, PlayerRef, RoomConfig};
use crate::errors::{RoomError, RoomResult, StoreResult};
use crate::store::RoomStore;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Result of a successful bet placement
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub claim: ClaimedCard,
    pub population: usize,
    pub status: GameStatus,
}

/// Result of a successful cancellation
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub population: usize,
    pub status: GameStatus,
}

/// Distinct players holding a card
pub fn population(claims: &ClaimMap) -> usize {
    claims
        .values()
        .map(|claim| claim.claimed_by.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Card currently held by `player_id`, if any
pub fn card_of(claims: &ClaimMap, player_id: &str) -> Option<u32> {
    claims
        .iter()
        .find(|(_, claim)| claim.claimed_by == player_id)
        .map(|(&card_id, _)| card_id)
}

/// Players derived from the ledger, ordered by card id
pub fn players(claims: &ClaimMap) -> Vec<PlayerRef> {
    claims.values().map(ClaimedCard::player).collect()
}

/// Validation shared by every claim path; mutates nothing
pub fn check_claim(
    claims: &ClaimMap,
    status: GameStatus,
    config: &RoomConfig,
    card_id: u32,
    player_id: &str,
) -> RoomResult<()> {
    if !status.accepts_bets() {
        return Err(RoomError::RoomNotAcceptingBets);
    }
    if config.card(card_id).is_none() {
        return Err(RoomError::InvalidCard(card_id));
    }
    if claims.contains_key(&card_id) {
        return Err(RoomError::CardAlreadyClaimed(card_id));
    }
    if let Some(held) = card_of(claims, player_id) {
        return Err(RoomError::DuplicateClaim(held));
    }
    if claims.len() >= config.effective_capacity() {
        return Err(RoomError::RoomNotAcceptingBets);
    }
    Ok(())
}

/// Validation for removing a claim; mutates nothing
pub fn check_release(
    claims: &ClaimMap,
    status: GameStatus,
    card_id: u32,
    player_id: &str,
) -> RoomResult<()> {
    if !status.accepts_bets() {
        return Err(RoomError::CannotCancelNow);
    }
    match claims.get(&card_id) {
        None => Err(RoomError::NotClaimed(card_id)),
        Some(claim) if claim.claimed_by != player_id => Err(RoomError::NotOwner(card_id)),
        Some(_) => Ok(()),
    }
}

#[derive(Clone)]
pub struct ClaimLedger {
    store: RoomStore,
}

impl ClaimLedger {
    pub fn new(store: RoomStore) -> Self {
        Self { store }
    }

    pub async fn claims(&self, room_id: &str) -> StoreResult<ClaimMap> {
        self.store.claims(room_id).await
    }

    /// Claim `card_id` for `player` after checking phase, catalog, ownership and funds
    pub async fn place(
        &self,
        config: &RoomConfig,
        card_id: u32,
        player: &PlayerRef,
        now: i64,
    ) -> RoomResult<ClaimOutcome> {
        let room_id = config.room_id.as_str();
        let status = self.store.runtime(room_id).await?.game_status;
        let mut claims = self.store.claims(room_id).await?;

        check_claim(&claims, status, config, card_id, &player.player_id)?;

        let available = self
            .store
            .durable()
            .get_balance(&player.player_id)
            .await?;
        if available < config.bet_amount {
            return Err(RoomError::InsufficientBalance {
                required: config.bet_amount,
                available,
            });
        }

        let claim = ClaimedCard::new(player, config.bet_amount, now);
        claims.insert(card_id, claim.clone());
        self.store.save_claims(room_id, &claims).await?;

        let population = population(&claims);
        info!(room_id, card_id, player_id = %player.player_id, population, "card claimed");
        Ok(ClaimOutcome {
            claim,
            population,
            status,
        })
    }

    /// Remove the player's claim on `card_id`
    pub async fn release(
        &self,
        room_id: &str,
        card_id: u32,
        player_id: &str,
    ) -> RoomResult<ReleaseOutcome> {
        let status = self.store.runtime(room_id).await?.game_status;
        let mut claims = self.store.claims(room_id).await?;

        check_release(&claims, status, card_id, player_id)?;

        claims.remove(&card_id);
        self.store.save_claims(room_id, &claims).await?;

        let population = population(&claims);
        info!(room_id, card_id, player_id, population, "card released");
        Ok(ReleaseOutcome { population, status })
    }

    /// Switch auto-play on (until `until`) or off for the owner's card
    pub async fn set_auto(
        &self,
        room_id: &str,
        card_id: u32,
        player_id: &str,
        until: Option<i64>,
    ) -> RoomResult<ClaimedCard> {
        let mut claims = self.store.claims(room_id).await?;
        let claim = claims
            .get_mut(&card_id)
            .ok_or(RoomError::NotClaimed(card_id))?;
        if claim.claimed_by != player_id {
            return Err(RoomError::NotOwner(card_id));
        }

        claim.auto = until.is_some();
        claim.auto_until = until;
        let updated = claim.clone();
        self.store.save_claims(room_id, &claims).await?;

        debug!(room_id, card_id, auto = updated.auto, "auto-play updated");
        Ok(updated)
    }

    /// Spend the card's one bingo attempt for this game
    pub async fn record_attempt(&self, room_id: &str, card_id: u32) -> StoreResult<()> {
        let mut claims = self.store.claims(room_id).await?;
        if let Some(claim) = claims.get_mut(&card_id) {
            claim.attempted_bingo = true;
            self.store.save_claims(room_id, &claims).await?;
        }
        Ok(())
    }

    /// Clear the ledger for a new round, keeping funded auto-play cards.
    ///
    /// Returns the card ids carried over.
    pub async fn carry_over(&self, room_id: &str, bet_amount: i64, now: i64) -> StoreResult<Vec<u32>> {
        let claims = self.store.claims(room_id).await?;
        let mut retained = ClaimMap::new();

        for (card_id, claim) in claims {
            if !claim.auto_active(now) {
                continue;
            }
            let balance = self
                .store
                .durable()
                .get_balance(&claim.claimed_by)
                .await?;
            if balance >= bet_amount {
                retained.insert(card_id, claim.carry_over(now));
            } else {
                debug!(room_id, card_id, balance, "auto-play card dropped for low balance");
            }
        }

        self.store.save_claims(room_id, &retained).await?;
        Ok(retained.keys().copied().collect())
    }
}
