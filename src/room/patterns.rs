//! Canonical winning shapes on a 5×5 card
//!
//! Cells are addressed row-major (`row * 5 + col`); index 12 is the free
//! space and always counts as marked. Pattern indices are stable: rows 0-4,
//! columns 5-9, diagonals 10-11, four corners 12, centre cluster 13.

use super::types::BingoCard;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::OnceLock;

pub const GRID_CELLS: usize = 25;
pub const FREE_INDEX: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Row(u8),
    Column(u8),
    Diagonal,
    AntiDiagonal,
    FourCorners,
    /// The 3×3 block around the free space
    CenterCluster,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Row(r) => write!(f, "row {}", r + 1),
            PatternKind::Column(c) => write!(f, "column {}", c + 1),
            PatternKind::Diagonal => write!(f, "diagonal"),
            PatternKind::AntiDiagonal => write!(f, "anti-diagonal"),
            PatternKind::FourCorners => write!(f, "four corners"),
            PatternKind::CenterCluster => write!(f, "center cluster"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub cells: Vec<usize>,
}

impl Pattern {
    /// Numbers a card must have called to complete this pattern
    pub fn numbers(&self, card: &BingoCard) -> Vec<u8> {
        self.cells
            .iter()
            .filter(|&&cell| cell != FREE_INDEX)
            .map(|&cell| card.number_at(cell))
            .collect()
    }

    pub fn is_covered(&self, card: &BingoCard, called: &HashSet<u8>) -> bool {
        self.numbers(card).iter().all(|n| called.contains(n))
    }
}

/// All canonical patterns, in index order
pub fn all_patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let mut patterns = Vec::with_capacity(14);
        for r in 0..5u8 {
            patterns.push(Pattern {
                kind: PatternKind::Row(r),
                cells: (0..5).map(|c| r as usize * 5 + c).collect(),
            });
        }
        for c in 0..5u8 {
            patterns.push(Pattern {
                kind: PatternKind::Column(c),
                cells: (0..5).map(|r| r * 5 + c as usize).collect(),
            });
        }
        patterns.push(Pattern {
            kind: PatternKind::Diagonal,
            cells: vec![0, 6, 12, 18, 24],
        });
        patterns.push(Pattern {
            kind: PatternKind::AntiDiagonal,
            cells: vec![4, 8, 12, 16, 20],
        });
        patterns.push(Pattern {
            kind: PatternKind::FourCorners,
            cells: vec![0, 4, 20, 24],
        });
        patterns.push(Pattern {
            kind: PatternKind::CenterCluster,
            cells: vec![6, 7, 8, 11, 12, 13, 16, 17, 18],
        });
        patterns
    })
}

pub fn pattern(index: usize) -> Option<&'static Pattern> {
    all_patterns().get(index)
}

/// Patterns whose cells all hold playable numbers on this card
pub fn valid_patterns(card: &BingoCard) -> Vec<usize> {
    all_patterns()
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            p.cells
                .iter()
                .all(|&cell| cell == FREE_INDEX || (1..=75).contains(&card.number_at(cell)))
        })
        .map(|(index, _)| index)
        .collect()
}

/// First pattern fully covered by the called numbers
pub fn first_covered(card: &BingoCard, called: &HashSet<u8>) -> Option<usize> {
    valid_patterns(card)
        .into_iter()
        .find(|&index| all_patterns()[index].is_covered(card, called))
}

/// Resolve submitted cell indices to the canonical patterns they spell out.
///
/// The submission is accepted when it is exactly the union of one or more
/// canonical patterns; stray cells or out-of-range indices are rejected.
/// Returns the matched pattern indices, lowest first.
pub fn match_claim(submitted: &[usize]) -> Result<Vec<usize>, String> {
    if submitted.is_empty() {
        return Err("no cells submitted".to_string());
    }
    if let Some(bad) = submitted.iter().find(|&&cell| cell >= GRID_CELLS) {
        return Err(format!("cell index {} is outside the card", bad));
    }

    let cells: BTreeSet<usize> = submitted.iter().copied().collect();
    let matched: Vec<usize> = all_patterns()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.cells.iter().all(|cell| cells.contains(cell)))
        .map(|(index, _)| index)
        .collect();

    if matched.is_empty() {
        return Err("cells do not form a winning pattern".to_string());
    }

    let covered: BTreeSet<usize> = matched
        .iter()
        .flat_map(|&index| all_patterns()[index].cells.iter().copied())
        .collect();
    if let Some(stray) = cells.difference(&covered).next() {
        return Err(format!("cell {} is not part of a winning pattern", stray));
    }

    Ok(matched)
}
