//! Matching engine orchestrator.
//!
//! One cycle: acquire the distributed lock, snapshot both pools, run
//! the three matchers with scrubbing in between, sweep timeouts,
//! persist everything in a single database transaction, then apply
//! pool-store cleanup and notifications after the commit. The database
//! is the source of truth; pool cleanup failures are logged and left
//! for the next cycle to repair.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use tracing::{error, info, instrument, warn};

use tradeflow_common::{
    CycleId, Direction, InvalidTransition, MatchId, MatchRecord, MatchType, PoolEntryId,
    SettlementMethod, TradeFlowError, TraderId, Transaction, TransactionId, TransactionStatus,
};
use tradeflow_db::{MatchRepo, PoolEntryRepo, TraderRepo, TransactionRepo};
use tradeflow_pool::{PoolStore, SnapshotEntry};

use crate::config::EngineConfig;
use crate::matcher::{
    run_exact_matching, run_multi_matching, run_partial_matching, scrub, ExactMatch, MultiMatch,
    PartialMatch,
};
use crate::notify::{dispatch_detached, Notification, NotificationDispatcher};
use crate::reporter::{build_cycle_report, CycleReport, PoolSizes};

/// Result of invoking [`MatchingEngine::run_cycle`].
#[derive(Debug)]
pub enum CycleOutcome {
    /// Another process holds the cycle lock; nothing was done.
    Skipped,
    /// The cycle ran to completion.
    Completed(CycleReport),
}

type DbTx<'t> = sqlx::Transaction<'t, Postgres>;

/// Deferred side effects applied only after the database commit.
#[derive(Default)]
struct DeferredOps {
    pool_removals: Vec<(String, Direction)>,
    pool_amount_updates: Vec<(String, Decimal)>,
    notifications: Vec<(TraderId, Notification)>,
}

/// Orchestrates the periodic matching cycle.
pub struct MatchingEngine {
    db: PgPool,
    pool: PoolStore,
    notifier: Arc<dyn NotificationDispatcher>,
    /// Engine configuration; drives the scheduler wrapping this engine.
    #[allow(dead_code)]
    config: EngineConfig,
}

impl MatchingEngine {
    /// Create a new matching engine.
    pub fn new(
        db: PgPool,
        pool: PoolStore,
        notifier: Arc<dyn NotificationDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            pool,
            notifier,
            config,
        }
    }

    /// Execute one matching cycle.
    ///
    /// Returns [`CycleOutcome::Skipped`] without error when the lock is
    /// held elsewhere. The lock is released on every exit path; if the
    /// process dies anyway, the 5-minute auto-expiry recovers it.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleOutcome, TradeFlowError> {
        let Some(lock) = self
            .pool
            .acquire_lock()
            .await
            .map_err(|e| TradeFlowError::Cache(e.to_string()))?
        else {
            info!("Cycle skipped; lock held by another process");
            return Ok(CycleOutcome::Skipped);
        };

        let result = self.run_locked_cycle().await;

        if let Err(e) = self.pool.release_lock(&lock).await {
            warn!(error = %e, "Failed to release pool lock; it will auto-expire");
        }

        result.map(CycleOutcome::Completed)
    }

    async fn run_locked_cycle(&self) -> Result<CycleReport, TradeFlowError> {
        let started_at = Utc::now();
        let cycle_id = CycleId::for_instant(started_at);
        info!(cycle_id = %cycle_id, "Matching cycle started");

        let buy = self
            .pool
            .snapshot(Direction::NgnToCny)
            .await
            .map_err(|e| TradeFlowError::Cache(e.to_string()))?;
        let sell = self
            .pool
            .snapshot(Direction::CnyToNgn)
            .await
            .map_err(|e| TradeFlowError::Cache(e.to_string()))?;

        let pool_size_start = PoolSizes {
            buy: buy.len(),
            sell: sell.len(),
            total: buy.len() + sell.len(),
        };

        // Pass 1: exact
        let exact = run_exact_matching(&buy, &sell);
        let mut consumed: HashSet<String> = HashSet::new();
        for m in &exact {
            consumed.insert(m.pool_a_entry.id.clone());
            consumed.insert(m.pool_b_entry.id.clone());
        }
        let buy = scrub(&buy, &consumed);
        let sell = scrub(&sell, &consumed);

        // Pass 2: multi-leg
        let multi = run_multi_matching(&buy, &sell);
        for m in &multi {
            consumed.insert(m.pool_a_entry.id.clone());
            for leg in &m.pool_b_entries {
                consumed.insert(leg.id.clone());
            }
        }
        let buy = scrub(&buy, &consumed);
        let sell = scrub(&sell, &consumed);

        // Pass 3: partial
        let partial = run_partial_matching(&buy, &sell);
        for m in &partial {
            consumed.insert(m.pool_a_entry.id.clone());
            consumed.insert(m.pool_b_entry.id.clone());
        }
        let buy = scrub(&buy, &consumed);
        let sell = scrub(&sell, &consumed);

        // Timeout sweep over whatever no pass consumed
        let now = Utc::now();
        let timeouts: Vec<SnapshotEntry> = buy
            .iter()
            .chain(sell.iter())
            .filter(|e| e.expires_at < now)
            .cloned()
            .collect();

        // Persist matches, status transitions, and timeouts in one
        // database transaction.
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| TradeFlowError::Database(e.to_string()))?;
        let mut ops = DeferredOps::default();

        for m in &exact {
            self.persist_pair(&mut tx, &cycle_id, m, &mut ops).await?;
        }
        for m in &multi {
            self.persist_multi(&mut tx, &cycle_id, m, &mut ops).await?;
        }
        for m in &partial {
            self.persist_partial(&mut tx, &cycle_id, m, &mut ops).await?;
        }
        for entry in &timeouts {
            self.persist_timeout(&mut tx, entry, &mut ops).await?;
        }

        tx.commit()
            .await
            .map_err(|e| TradeFlowError::Database(e.to_string()))?;

        // After commit: pool-store cleanup. Failures are logged only;
        // the next cycle's snapshot scrub or timeout sweep self-heals.
        for (entry_id, direction) in &ops.pool_removals {
            if let Err(e) = self.pool.remove(entry_id, *direction).await {
                error!(%entry_id, error = %e, "Pool removal failed after commit");
            }
        }
        for (entry_id, amount) in &ops.pool_amount_updates {
            if let Err(e) = self.pool.update_amount(entry_id, *amount).await {
                error!(%entry_id, error = %e, "Pool amount update failed after commit");
            }
        }

        // After commit: fire-and-forget notifications.
        for (trader_id, notification) in ops.notifications {
            match TraderRepo::find_by_id(&self.db, trader_id).await {
                Ok(Some(trader)) => {
                    let notification = notification.with_phone(trader.phone);
                    dispatch_detached(self.notifier.clone(), notification);
                }
                Ok(None) => warn!(%trader_id, "Trader missing for notification"),
                Err(e) => warn!(%trader_id, error = %e, "Trader lookup failed for notification"),
            }
        }

        let completed_at = Utc::now();
        let report = build_cycle_report(
            cycle_id.clone(),
            started_at,
            completed_at,
            pool_size_start,
            &exact,
            &multi,
            &partial,
            timeouts.len(),
        );

        info!(
            cycle_id = %cycle_id,
            exact = report.exact_matches,
            multi = report.multi_matches,
            partial = report.partial_matches,
            timeouts = report.timeouts,
            volume = %report.total_matched_volume,
            duration_ms = report.duration_ms,
            "Matching cycle completed"
        );

        Ok(report)
    }

    /// Rebuild the volatile pool from the active database rows.
    ///
    /// Run at startup; the database is authoritative and the pool store
    /// must never be trusted across restarts.
    #[instrument(skip(self))]
    pub async fn reconcile_pool(&self) -> Result<usize, TradeFlowError> {
        let entries = PoolEntryRepo::find_all_active(&self.db).await?;
        let mut restored = 0;

        for entry in entries {
            let entry_id = entry.id.to_string();
            let present = self
                .pool
                .get_entry(&entry_id)
                .await
                .map_err(|e| TradeFlowError::Cache(e.to_string()))?;
            if present.is_some() {
                continue;
            }

            let Some(txn) = TransactionRepo::find_by_id(&self.db, entry.transaction_id).await?
            else {
                warn!(%entry_id, "Active pool row without transaction; skipping");
                continue;
            };

            let data = tradeflow_pool::store::EntryData {
                transaction_id: entry.transaction_id.to_string(),
                reference: txn.reference.as_str().to_string(),
                source_amount: entry.amount,
                target_amount: txn.target_amount,
                direction: entry.direction,
                currency: entry.currency,
                trader_id: entry.trader_id.to_string(),
                entered_pool_at: entry.entered_pool_at,
                expires_at: entry.expires_at,
            };
            let score = entry.priority_score.to_f64().unwrap_or(0.0);
            self.pool
                .add(&entry_id, &data, score)
                .await
                .map_err(|e| TradeFlowError::Cache(e.to_string()))?;
            restored += 1;
        }

        if restored > 0 {
            info!(restored, "Pool reconciled from database");
        }
        Ok(restored)
    }

    // --- Persistence helpers ---

    /// Load the transaction behind a pool entry; `None` (with a log)
    /// when the entry is stale.
    async fn load_entry_txn(
        &self,
        tx: &mut DbTx<'_>,
        entry: &SnapshotEntry,
    ) -> Result<Option<Transaction>, TradeFlowError> {
        let Ok(txn_id) = TransactionId::parse(&entry.transaction_id) else {
            warn!(entry_id = %entry.id, "Pool entry carries an unparseable transaction id");
            return Ok(None);
        };
        let txn = TransactionRepo::find_by_id(&mut **tx, txn_id).await?;
        if txn.is_none() {
            warn!(entry_id = %entry.id, txn_id = %txn_id, "Pool entry references a missing transaction");
        }
        Ok(txn)
    }

    fn matched_rate(buy: &Transaction, sell: &Transaction) -> Decimal {
        buy.exchange_rate
            .or(sell.exchange_rate)
            .unwrap_or(Decimal::ZERO)
    }

    /// Order a pair of opposite-direction entries as (buy, sell).
    fn classify_sides<'a>(
        a: &'a SnapshotEntry,
        b: &'a SnapshotEntry,
    ) -> (&'a SnapshotEntry, &'a SnapshotEntry) {
        if a.direction == Direction::NgnToCny {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// FUNDED -> MATCHING -> terminal match state, tolerating entries
    /// that re-entered MATCHING from an earlier partial match.
    fn advance_for_match(
        txn: &mut Transaction,
        target: TransactionStatus,
    ) -> Result<(), InvalidTransition> {
        if txn.status == TransactionStatus::Funded {
            txn.transition_to(TransactionStatus::Matching)?;
        }
        txn.transition_to(target)
    }

    async fn persist_pair(
        &self,
        tx: &mut DbTx<'_>,
        cycle_id: &CycleId,
        m: &ExactMatch,
        ops: &mut DeferredOps,
    ) -> Result<(), TradeFlowError> {
        let (buy_entry, sell_entry) = Self::classify_sides(&m.pool_a_entry, &m.pool_b_entry);

        let (Some(mut buy_txn), Some(mut sell_txn)) = (
            self.load_entry_txn(tx, buy_entry).await?,
            self.load_entry_txn(tx, sell_entry).await?,
        ) else {
            // Stale entries: clean them out, record nothing.
            ops.pool_removals
                .push((buy_entry.id.clone(), buy_entry.direction));
            ops.pool_removals
                .push((sell_entry.id.clone(), sell_entry.direction));
            return Ok(());
        };

        let record = MatchRecord::new(
            cycle_id.clone(),
            buy_txn.id,
            sell_txn.id,
            MatchType::Exact,
            m.matched_amount,
            Self::matched_rate(&buy_txn, &sell_txn),
        );
        MatchRepo::insert(&mut **tx, &record).await?;

        for (txn, entry) in [(&mut buy_txn, buy_entry), (&mut sell_txn, sell_entry)] {
            Self::advance_for_match(txn, TransactionStatus::Matched)?;
            txn.match_id = Some(record.id);
            txn.settlement_method = Some(SettlementMethod::Matched);
            TransactionRepo::update(&mut **tx, txn).await?;
            self.deactivate_entry_row(tx, &entry.id).await?;

            ops.pool_removals.push((entry.id.clone(), entry.direction));
            ops.notifications.push((
                txn.trader_id,
                Notification::Matched {
                    phone: String::new(),
                    reference: txn.reference.as_str().to_string(),
                    amount: m.matched_amount,
                    currency: entry.currency.code().to_string(),
                },
            ));
        }

        Ok(())
    }

    async fn persist_multi(
        &self,
        tx: &mut DbTx<'_>,
        cycle_id: &CycleId,
        m: &MultiMatch,
        ops: &mut DeferredOps,
    ) -> Result<(), TradeFlowError> {
        let target_entry = &m.pool_a_entry;
        let Some(mut target_txn) = self.load_entry_txn(tx, target_entry).await? else {
            ops.pool_removals
                .push((target_entry.id.clone(), target_entry.direction));
            return Ok(());
        };

        // One record per leg, all sharing the cycle id. The final leg's
        // recorded amount is capped so the legs sum to the matched
        // amount even when the greedy fill overshot the target.
        let mut remaining = m.matched_amount;
        let mut first_record_id: Option<MatchId> = None;

        for leg_entry in &m.pool_b_entries {
            let Some(mut leg_txn) = self.load_entry_txn(tx, leg_entry).await? else {
                ops.pool_removals
                    .push((leg_entry.id.clone(), leg_entry.direction));
                continue;
            };

            let leg_amount = leg_entry.source_amount.min(remaining);
            remaining -= leg_amount;

            let (buy_id, sell_id) = if target_entry.direction == Direction::NgnToCny {
                (target_txn.id, leg_txn.id)
            } else {
                (leg_txn.id, target_txn.id)
            };

            let record = MatchRecord::new(
                cycle_id.clone(),
                buy_id,
                sell_id,
                MatchType::Multi,
                leg_amount,
                Self::matched_rate(&target_txn, &leg_txn),
            );
            MatchRepo::insert(&mut **tx, &record).await?;
            first_record_id.get_or_insert(record.id);

            Self::advance_for_match(&mut leg_txn, TransactionStatus::Matched)?;
            leg_txn.match_id = Some(record.id);
            leg_txn.settlement_method = Some(SettlementMethod::Matched);
            TransactionRepo::update(&mut **tx, &leg_txn).await?;
            self.deactivate_entry_row(tx, &leg_entry.id).await?;

            ops.pool_removals
                .push((leg_entry.id.clone(), leg_entry.direction));
            ops.notifications.push((
                leg_txn.trader_id,
                Notification::Matched {
                    phone: String::new(),
                    reference: leg_txn.reference.as_str().to_string(),
                    amount: leg_amount,
                    currency: leg_entry.currency.code().to_string(),
                },
            ));
        }

        Self::advance_for_match(&mut target_txn, TransactionStatus::Matched)?;
        target_txn.match_id = first_record_id;
        target_txn.settlement_method = Some(SettlementMethod::Matched);
        TransactionRepo::update(&mut **tx, &target_txn).await?;
        self.deactivate_entry_row(tx, &target_entry.id).await?;

        ops.pool_removals
            .push((target_entry.id.clone(), target_entry.direction));
        ops.notifications.push((
            target_txn.trader_id,
            Notification::Matched {
                phone: String::new(),
                reference: target_txn.reference.as_str().to_string(),
                amount: m.matched_amount,
                currency: target_entry.currency.code().to_string(),
            },
        ));

        Ok(())
    }

    async fn persist_partial(
        &self,
        tx: &mut DbTx<'_>,
        cycle_id: &CycleId,
        m: &PartialMatch,
        ops: &mut DeferredOps,
    ) -> Result<(), TradeFlowError> {
        let (buy_entry, sell_entry) = Self::classify_sides(&m.pool_a_entry, &m.pool_b_entry);
        let (buy_remaining, sell_remaining) = if buy_entry.id == m.pool_a_entry.id {
            (m.pool_a_remaining, m.pool_b_remaining)
        } else {
            (m.pool_b_remaining, m.pool_a_remaining)
        };

        let (Some(mut buy_txn), Some(mut sell_txn)) = (
            self.load_entry_txn(tx, buy_entry).await?,
            self.load_entry_txn(tx, sell_entry).await?,
        ) else {
            ops.pool_removals
                .push((buy_entry.id.clone(), buy_entry.direction));
            ops.pool_removals
                .push((sell_entry.id.clone(), sell_entry.direction));
            return Ok(());
        };

        let record = MatchRecord::new(
            cycle_id.clone(),
            buy_txn.id,
            sell_txn.id,
            MatchType::Partial,
            m.matched_amount,
            Self::matched_rate(&buy_txn, &sell_txn),
        );
        MatchRepo::insert(&mut **tx, &record).await?;

        for (txn, entry, remaining) in [
            (&mut buy_txn, buy_entry, buy_remaining),
            (&mut sell_txn, sell_entry, sell_remaining),
        ] {
            Self::advance_for_match(txn, TransactionStatus::PartialMatched)?;
            txn.match_id = Some(record.id);
            txn.settlement_method = Some(SettlementMethod::PartialMatched);

            if remaining > Decimal::ZERO {
                // Remainder re-enters the pool for the next cycle.
                txn.transition_to(TransactionStatus::Matching)?;
                self.update_entry_row_amount(tx, &entry.id, remaining).await?;
                ops.pool_amount_updates.push((entry.id.clone(), remaining));
            } else {
                self.deactivate_entry_row(tx, &entry.id).await?;
                ops.pool_removals.push((entry.id.clone(), entry.direction));
            }

            TransactionRepo::update(&mut **tx, txn).await?;
            ops.notifications.push((
                txn.trader_id,
                Notification::Matched {
                    phone: String::new(),
                    reference: txn.reference.as_str().to_string(),
                    amount: m.matched_amount,
                    currency: entry.currency.code().to_string(),
                },
            ));
        }

        Ok(())
    }

    async fn persist_timeout(
        &self,
        tx: &mut DbTx<'_>,
        entry: &SnapshotEntry,
        ops: &mut DeferredOps,
    ) -> Result<(), TradeFlowError> {
        ops.pool_removals.push((entry.id.clone(), entry.direction));
        self.deactivate_entry_row(tx, &entry.id).await?;

        let Some(mut txn) = self.load_entry_txn(tx, entry).await? else {
            return Ok(());
        };

        if !txn.status.can_transition_to(TransactionStatus::Expired) {
            warn!(
                reference = %txn.reference,
                status = %txn.status,
                "Timed-out pool entry with non-expirable transaction"
            );
            return Ok(());
        }

        txn.transition_to(TransactionStatus::Expired)?;
        txn.settlement_method = Some(SettlementMethod::CipsSettled);
        TransactionRepo::update(&mut **tx, &txn).await?;

        info!(
            reference = %txn.reference,
            entry_id = %entry.id,
            "Pool entry timed out; routed to CIPS"
        );

        ops.notifications.push((
            txn.trader_id,
            Notification::Expired {
                phone: String::new(),
                reference: txn.reference.as_str().to_string(),
            },
        ));

        Ok(())
    }

    async fn deactivate_entry_row(
        &self,
        tx: &mut DbTx<'_>,
        entry_id: &str,
    ) -> Result<(), TradeFlowError> {
        match PoolEntryId::parse(entry_id) {
            Ok(id) => {
                PoolEntryRepo::deactivate(&mut **tx, id).await?;
                Ok(())
            }
            Err(_) => {
                warn!(entry_id, "Unparseable pool entry id; row left untouched");
                Ok(())
            }
        }
    }

    async fn update_entry_row_amount(
        &self,
        tx: &mut DbTx<'_>,
        entry_id: &str,
        amount: Decimal,
    ) -> Result<(), TradeFlowError> {
        match PoolEntryId::parse(entry_id) {
            Ok(id) => {
                PoolEntryRepo::update_amount(&mut **tx, id, amount).await?;
                Ok(())
            }
            Err(_) => {
                warn!(entry_id, "Unparseable pool entry id; row left untouched");
                Ok(())
            }
        }
    }
}

impl Notification {
    /// Attach the recipient phone resolved after commit.
    fn with_phone(self, phone: String) -> Self {
        match self {
            Notification::Funded { reference, .. } => Notification::Funded { phone, reference },
            Notification::Matched {
                reference,
                amount,
                currency,
                ..
            } => Notification::Matched {
                phone,
                reference,
                amount,
                currency,
            },
            Notification::PaymentHeld {
                reference,
                expected,
                paid,
                ..
            } => Notification::PaymentHeld {
                phone,
                reference,
                expected,
                paid,
            },
            Notification::Expired { reference, .. } => Notification::Expired { phone, reference },
        }
    }
}
