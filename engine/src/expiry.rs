//! Scheduled expiry of stale unfunded transactions.
//!
//! Transactions still INITIATED past the payment window are moved to
//! EXPIRED in one sweep transaction. Independent of the matching lock.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{info, instrument};

use tradeflow_common::{TradeFlowError, TransactionStatus};
use tradeflow_db::{TraderRepo, TransactionRepo};

use crate::config::EngineConfig;
use crate::notify::{dispatch_detached, Notification, NotificationDispatcher};

/// Summary of one expiry sweep.
#[derive(Debug, Clone)]
pub struct ExpirySweep {
    pub expired_count: usize,
    pub expired_references: Vec<String>,
}

/// Worker that expires stale INITIATED transactions.
pub struct ExpiryWorker {
    db: PgPool,
    notifier: Arc<dyn NotificationDispatcher>,
    config: EngineConfig,
}

impl ExpiryWorker {
    /// Create a new expiry worker.
    pub fn new(db: PgPool, notifier: Arc<dyn NotificationDispatcher>, config: EngineConfig) -> Self {
        Self {
            db,
            notifier,
            config,
        }
    }

    /// Run one sweep: expire every INITIATED transaction older than the
    /// payment window, committing the batch in one transaction.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<ExpirySweep, TradeFlowError> {
        let cutoff = Utc::now() - Duration::hours(self.config.payment_expiry_hours);

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| TradeFlowError::Database(e.to_string()))?;

        let stale = TransactionRepo::find_stale_initiated(&mut *tx, cutoff).await?;
        let mut expired_references = Vec::with_capacity(stale.len());
        let mut notifications = Vec::with_capacity(stale.len());

        for mut txn in stale {
            txn.transition_to(TransactionStatus::Expired)?;
            TransactionRepo::update(&mut *tx, &txn).await?;
            info!(reference = %txn.reference, "Expired stale transaction");
            expired_references.push(txn.reference.as_str().to_string());
            notifications.push((txn.trader_id, txn.reference.as_str().to_string()));
        }

        tx.commit()
            .await
            .map_err(|e| TradeFlowError::Database(e.to_string()))?;

        for (trader_id, reference) in notifications {
            if let Ok(Some(trader)) = TraderRepo::find_by_id(&self.db, trader_id).await {
                dispatch_detached(
                    self.notifier.clone(),
                    Notification::Expired {
                        phone: trader.phone,
                        reference,
                    },
                );
            }
        }

        Ok(ExpirySweep {
            expired_count: expired_references.len(),
            expired_references,
        })
    }
}
