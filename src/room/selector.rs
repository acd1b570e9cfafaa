//! Draw planning
//!
//! The whole 75-number sequence and its winners are fixed before the first
//! number is revealed. Winning patterns are placed inside the first 25 draws;
//! every other card gets one pattern completed except for a single reserved
//! number that is held back until after the meaningful draws.

use super::patterns::{all_patterns, valid_patterns};
use super::types::{BingoCard, NearMiss, PlannedWinner, MAX_NUMBER, MEANINGFUL_DRAWS};
use crate::config::WinnerPolicy;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// A claimed card entering selection, with the owner's standing
#[derive(Debug, Clone)]
pub struct Contender {
    pub card: BingoCard,
    pub player_id: String,
    pub is_demo: bool,
    pub games_played: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DrawPlan {
    pub drawn_numbers: Vec<u8>,
    pub winners: Vec<PlannedWinner>,
    pub near_misses: Vec<NearMiss>,
    /// Cooldown list to persist for the next game
    pub recent_winners: Vec<String>,
}

impl DrawPlan {
    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }
}

pub struct WinnerSelector {
    policy: WinnerPolicy,
}

impl WinnerSelector {
    pub fn new(policy: WinnerPolicy) -> Self {
        Self { policy }
    }

    /// How many winners this game should have before capping by card count
    pub fn desired_winner_count<R: Rng + ?Sized>(&self, population: usize, rng: &mut R) -> usize {
        let p = self.policy.multi_winner_probability;
        if population > self.policy.three_winner_population && rng.gen_bool(p) {
            rng.gen_range(2..=3)
        } else if population > self.policy.two_winner_population && rng.gen_bool(p) {
            2
        } else {
            1
        }
    }

    /// Plan the full draw for the cards claimed at countdown expiry.
    ///
    /// `recent` is the room's cooldown list, most recent first.
    pub fn generate_draw_sequence<R: Rng + ?Sized>(
        &self,
        contenders: &[Contender],
        recent: &[String],
        rng: &mut R,
    ) -> DrawPlan {
        let valid: Vec<&Contender> = contenders.iter().filter(|c| c.card.is_valid()).collect();
        if valid.is_empty() {
            warn!(
                supplied = contenders.len(),
                "no valid cards for draw planning, drawing without winners"
            );
            let mut drawn: Vec<u8> = (1..=MAX_NUMBER).collect();
            drawn.shuffle(rng);
            return DrawPlan {
                drawn_numbers: drawn,
                recent_winners: recent.to_vec(),
                ..Default::default()
            };
        }

        let population = valid
            .iter()
            .map(|c| c.player_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let target = self
            .desired_winner_count(population, rng)
            .min(valid.len());

        let chosen = self.pick_winners(&valid, recent, target, rng);

        let mut must = NumberSet::default();
        let mut winners = Vec::with_capacity(chosen.len());
        for contender in &chosen {
            let patterns = valid_patterns(&contender.card);
            let Some(&pattern_index) = patterns.choose(rng) else {
                continue;
            };
            must.extend(all_patterns()[pattern_index].numbers(&contender.card));
            winners.push(PlannedWinner {
                card_id: contender.card.id,
                player_id: contender.player_id.clone(),
                pattern_index,
            });
        }

        let winner_cards: HashSet<u32> = winners.iter().map(|w| w.card_id).collect();
        let mut losers: Vec<&Contender> = valid
            .iter()
            .copied()
            .filter(|c| !winner_cards.contains(&c.card.id))
            .collect();
        losers.shuffle(rng);

        let mut reserved = NumberSet::default();
        let mut near_misses = Vec::with_capacity(losers.len());
        for loser in losers {
            if let Some(miss) = plant_near_miss(&loser.card, &mut must, &mut reserved, rng) {
                near_misses.push(miss);
            }
        }

        let drawn_numbers = assemble_sequence(&must, &reserved, rng);

        let mut recent_winners: Vec<String> = Vec::new();
        for winner in &winners {
            if !recent_winners.contains(&winner.player_id) {
                recent_winners.push(winner.player_id.clone());
            }
        }
        for id in recent {
            if !recent_winners.contains(id) {
                recent_winners.push(id.clone());
            }
        }
        recent_winners.truncate((population / 2).max(1));

        debug!(
            population,
            winners = winners.len(),
            near_misses = near_misses.len(),
            "draw planned"
        );

        DrawPlan {
            drawn_numbers,
            winners,
            near_misses,
            recent_winners,
        }
    }

    fn pick_winners<'a, R: Rng + ?Sized>(
        &self,
        valid: &[&'a Contender],
        recent: &[String],
        target: usize,
        rng: &mut R,
    ) -> Vec<&'a Contender> {
        let rested: Vec<&Contender> = valid
            .iter()
            .copied()
            .filter(|c| !recent.contains(&c.player_id))
            .collect();
        let mut pool = if rested.is_empty() {
            valid.to_vec()
        } else {
            rested
        };

        let demo = valid.iter().filter(|c| c.is_demo).count();
        let real = valid.len() - demo;
        if demo > real {
            let eligible: Vec<&Contender> = pool
                .iter()
                .copied()
                .filter(|c| c.is_demo || c.games_played >= self.policy.eligibility_games_played)
                .collect();
            if eligible.is_empty() {
                debug!("eligibility filter would leave no winner, bypassing");
            } else {
                pool = eligible;
            }
        }

        pool.shuffle(rng);
        if pool.len() < target {
            let picked: HashSet<u32> = pool.iter().map(|c| c.card.id).collect();
            let mut rest: Vec<&Contender> = valid
                .iter()
                .copied()
                .filter(|c| !picked.contains(&c.card.id))
                .collect();
            rest.shuffle(rng);
            pool.extend(rest);
        }

        let mut seen_players = HashSet::new();
        pool.into_iter()
            .filter(|c| seen_players.insert(c.player_id.clone()))
            .take(target)
            .collect()
    }
}

/// Insertion-ordered set of ball numbers
#[derive(Default)]
struct NumberSet {
    order: Vec<u8>,
    members: BTreeSet<u8>,
}

impl NumberSet {
    fn contains(&self, n: u8) -> bool {
        self.members.contains(&n)
    }

    fn insert(&mut self, n: u8) {
        if self.members.insert(n) {
            self.order.push(n);
        }
    }

    fn extend(&mut self, numbers: impl IntoIterator<Item = u8>) {
        for n in numbers {
            self.insert(n);
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Commit one pattern of a losing card as "all but one number" if it fits
fn plant_near_miss<R: Rng + ?Sized>(
    card: &BingoCard,
    must: &mut NumberSet,
    reserved: &mut NumberSet,
    rng: &mut R,
) -> Option<NearMiss> {
    let mut patterns = valid_patterns(card);
    patterns.shuffle(rng);

    for pattern_index in patterns {
        let numbers = all_patterns()[pattern_index].numbers(card);
        let open: Vec<u8> = numbers.iter().copied().filter(|&n| !must.contains(n)).collect();
        let Some(&missing) = open.choose(rng) else {
            // Already complete inside the meaningful draws
            continue;
        };
        let to_add: Vec<u8> = open.iter().copied().filter(|&n| n != missing).collect();
        if to_add.iter().any(|&n| reserved.contains(n)) {
            continue;
        }
        if must.len() + to_add.len() > MEANINGFUL_DRAWS {
            continue;
        }

        must.extend(to_add);
        reserved.insert(missing);
        return Some(NearMiss {
            card_id: card.id,
            pattern_index,
            missing_number: missing,
        });
    }
    None
}

fn assemble_sequence<R: Rng + ?Sized>(must: &NumberSet, reserved: &NumberSet, rng: &mut R) -> Vec<u8> {
    let mut spare: Vec<u8> = (1..=MAX_NUMBER)
        .filter(|&n| !must.contains(n) && !reserved.contains(n))
        .collect();
    spare.shuffle(rng);

    let mut head = must.order.clone();
    while head.len() < MEANINGFUL_DRAWS {
        match spare.pop() {
            Some(n) => head.push(n),
            None => break,
        }
    }
    head.shuffle(rng);

    let mut drawn = head;
    drawn.extend(reserved.order.iter().copied());
    spare.shuffle(rng);
    drawn.extend(spare);
    drawn
}
