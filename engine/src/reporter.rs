//! Cycle reporting.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradeflow_common::CycleId;

use crate::matcher::{ExactMatch, MultiMatch, PartialMatch};

/// Pool sizes at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSizes {
    pub buy: usize,
    pub sell: usize,
    pub total: usize,
}

/// Structured summary of one completed matching cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub pool_size_start: PoolSizes,
    pub exact_matches: usize,
    pub multi_matches: usize,
    pub partial_matches: usize,
    pub timeouts: usize,
    /// Sum of matched amounts across all match descriptors.
    pub total_matched_volume: Decimal,
    /// Distinct matched entries over total pool size, in percent.
    pub matching_efficiency: Decimal,
}

/// Build the report for a completed cycle.
#[allow(clippy::too_many_arguments)]
pub fn build_cycle_report(
    cycle_id: CycleId,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    pool_size_start: PoolSizes,
    exact: &[ExactMatch],
    multi: &[MultiMatch],
    partial: &[PartialMatch],
    timeouts: usize,
) -> CycleReport {
    let total_matched_volume = exact.iter().map(|m| m.matched_amount).sum::<Decimal>()
        + multi.iter().map(|m| m.matched_amount).sum::<Decimal>()
        + partial.iter().map(|m| m.matched_amount).sum::<Decimal>();

    let mut matched_entries: HashSet<&str> = HashSet::new();
    for m in exact {
        matched_entries.insert(&m.pool_a_entry.id);
        matched_entries.insert(&m.pool_b_entry.id);
    }
    for m in multi {
        matched_entries.insert(&m.pool_a_entry.id);
        for leg in &m.pool_b_entries {
            matched_entries.insert(&leg.id);
        }
    }
    for m in partial {
        matched_entries.insert(&m.pool_a_entry.id);
        matched_entries.insert(&m.pool_b_entry.id);
    }

    let matching_efficiency = if pool_size_start.total > 0 {
        (Decimal::from(matched_entries.len()) / Decimal::from(pool_size_start.total)
            * Decimal::ONE_HUNDRED)
            .round_dp(2)
    } else {
        Decimal::ZERO
    };

    CycleReport {
        cycle_id,
        started_at,
        completed_at,
        duration_ms: (completed_at - started_at).num_milliseconds(),
        pool_size_start,
        exact_matches: exact.len(),
        multi_matches: multi.len(),
        partial_matches: partial.len(),
        timeouts,
        total_matched_volume,
        matching_efficiency,
    }
}
