//! Matching algorithms: exact, multi-leg, and partial.
//!
//! All three operate on pool snapshots pre-sorted by descending
//! priority, never mutate their inputs, and use decimal arithmetic
//! throughout. The orchestrator scrubs consumed entries between passes
//! so no entry is matched twice within a cycle.

use std::collections::HashSet;

use rust_decimal::Decimal;

use tradeflow_pool::SnapshotEntry;

/// Maximum amount difference, in percent, for an exact match.
pub const EXACT_TOLERANCE_PCT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Assembled legs must reach this percentage of the target.
pub const MULTI_MIN_FILL_PCT: Decimal = Decimal::from_parts(95, 0, 0, false, 0);

/// Maximum legs in one multi-leg match.
pub const MULTI_MAX_LEGS: usize = 10;

/// Overlap must be at least this percentage of both sides.
pub const PARTIAL_MIN_PCT: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

/// An exact pairing of two opposite-direction entries.
#[derive(Debug, Clone)]
pub struct ExactMatch {
    pub pool_a_entry: SnapshotEntry,
    pub pool_b_entry: SnapshotEntry,
    pub matched_amount: Decimal,
}

/// One target filled by several smaller opposite-direction legs.
///
/// The target is always `pool_a_entry` regardless of which pool it came
/// from; consumers classify sides by each entry's `direction` field.
#[derive(Debug, Clone)]
pub struct MultiMatch {
    pub pool_a_entry: SnapshotEntry,
    pub pool_b_entries: Vec<SnapshotEntry>,
    pub matched_amount: Decimal,
    pub leg_count: usize,
    pub fill_pct: Decimal,
}

/// A partial overlap match with per-side remainders.
#[derive(Debug, Clone)]
pub struct PartialMatch {
    pub pool_a_entry: SnapshotEntry,
    pub pool_b_entry: SnapshotEntry,
    pub matched_amount: Decimal,
    pub pool_a_remaining: Decimal,
    pub pool_b_remaining: Decimal,
}

/// Pair entries whose amounts are within [`EXACT_TOLERANCE_PCT`] of
/// each other.
///
/// For each entry in `pool_a` (priority order) the first eligible
/// `pool_b` entry wins; both are then consumed. Entries with
/// non-positive amounts are skipped.
pub fn run_exact_matching(
    pool_a: &[SnapshotEntry],
    pool_b: &[SnapshotEntry],
) -> Vec<ExactMatch> {
    let mut matches = Vec::new();
    let mut used_b: HashSet<usize> = HashSet::new();

    for a in pool_a {
        let a_amt = a.source_amount;
        if a_amt <= Decimal::ZERO {
            continue;
        }

        for (j, b) in pool_b.iter().enumerate() {
            if used_b.contains(&j) {
                continue;
            }
            let b_amt = b.source_amount;
            if b_amt <= Decimal::ZERO {
                continue;
            }

            let diff_pct = (a_amt - b_amt).abs() / a_amt * Decimal::ONE_HUNDRED;
            if diff_pct <= EXACT_TOLERANCE_PCT {
                matches.push(ExactMatch {
                    pool_a_entry: a.clone(),
                    pool_b_entry: b.clone(),
                    matched_amount: a_amt.min(b_amt),
                });
                used_b.insert(j);
                break;
            }
        }
    }

    matches
}

/// Try to fill `target` with smaller `candidates` (greedy knapsack).
///
/// Candidates are consumed in priority order; only amounts strictly
/// below the target qualify (anything closer belongs to exact
/// matching). Accepts when the assembled total reaches
/// [`MULTI_MIN_FILL_PCT`] of the target within [`MULTI_MAX_LEGS`] legs.
fn greedy_fill(
    target: &SnapshotEntry,
    candidates: &[SnapshotEntry],
    used: &mut HashSet<usize>,
) -> Option<MultiMatch> {
    let target_amt = target.source_amount;
    if target_amt <= Decimal::ZERO {
        return None;
    }

    let mut legs: Vec<SnapshotEntry> = Vec::new();
    let mut leg_indices: Vec<usize> = Vec::new();
    let mut assembled = Decimal::ZERO;

    for (idx, c) in candidates.iter().enumerate() {
        if used.contains(&idx) {
            continue;
        }
        let c_amt = c.source_amount;
        if c_amt <= Decimal::ZERO || c_amt >= target_amt {
            continue;
        }

        legs.push(c.clone());
        leg_indices.push(idx);
        assembled += c_amt;

        if legs.len() >= MULTI_MAX_LEGS {
            break;
        }
        if assembled >= target_amt {
            break;
        }
    }

    if legs.is_empty() {
        return None;
    }

    let fill_pct = assembled / target_amt * Decimal::ONE_HUNDRED;
    if fill_pct < MULTI_MIN_FILL_PCT {
        return None;
    }

    for idx in leg_indices {
        used.insert(idx);
    }

    Some(MultiMatch {
        pool_a_entry: target.clone(),
        matched_amount: assembled.min(target_amt),
        leg_count: legs.len(),
        fill_pct,
        pool_b_entries: legs,
    })
}

/// Greedy multi-leg matching: one large entry against several small.
///
/// Runs in both directions: first each `pool_a` entry as the target
/// filled from `pool_b`, then each remaining `pool_b` entry as the
/// target filled from `pool_a`.
pub fn run_multi_matching(
    pool_a: &[SnapshotEntry],
    pool_b: &[SnapshotEntry],
) -> Vec<MultiMatch> {
    let mut matches = Vec::new();
    let mut used_a: HashSet<usize> = HashSet::new();
    let mut used_b: HashSet<usize> = HashSet::new();

    for (i, a) in pool_a.iter().enumerate() {
        if used_a.contains(&i) {
            continue;
        }
        if let Some(m) = greedy_fill(a, pool_b, &mut used_b) {
            used_a.insert(i);
            matches.push(m);
        }
    }

    for (j, b) in pool_b.iter().enumerate() {
        if used_b.contains(&j) {
            continue;
        }
        if let Some(m) = greedy_fill(b, pool_a, &mut used_a) {
            used_b.insert(j);
            matches.push(m);
        }
    }

    matches
}

/// Partial matching with the remainder carried back into the pool.
///
/// The overlap `min(a, b)` must be at least [`PARTIAL_MIN_PCT`] of both
/// the smaller and the larger side.
pub fn run_partial_matching(
    pool_a: &[SnapshotEntry],
    pool_b: &[SnapshotEntry],
) -> Vec<PartialMatch> {
    let mut matches = Vec::new();
    let mut used_b: HashSet<usize> = HashSet::new();

    for a in pool_a {
        let a_amt = a.source_amount;
        if a_amt <= Decimal::ZERO {
            continue;
        }

        for (j, b) in pool_b.iter().enumerate() {
            if used_b.contains(&j) {
                continue;
            }
            let b_amt = b.source_amount;
            if b_amt <= Decimal::ZERO {
                continue;
            }

            let matched = a_amt.min(b_amt);
            let smaller = a_amt.min(b_amt);
            let larger = a_amt.max(b_amt);

            if matched / smaller * Decimal::ONE_HUNDRED < PARTIAL_MIN_PCT {
                continue;
            }
            if matched / larger * Decimal::ONE_HUNDRED < PARTIAL_MIN_PCT {
                continue;
            }

            matches.push(PartialMatch {
                pool_a_entry: a.clone(),
                pool_b_entry: b.clone(),
                matched_amount: matched,
                pool_a_remaining: a_amt - matched,
                pool_b_remaining: b_amt - matched,
            });
            used_b.insert(j);
            break;
        }
    }

    matches
}

/// Drop every entry whose ID appears in `consumed`.
///
/// Applied to the local snapshots between passes; the shared pool store
/// is untouched until after the database commit.
pub fn scrub(entries: &[SnapshotEntry], consumed: &HashSet<String>) -> Vec<SnapshotEntry> {
    entries
        .iter()
        .filter(|e| !consumed.contains(&e.id))
        .cloned()
        .collect()
}
