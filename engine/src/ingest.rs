//! Payment-to-pool ingestion.
//!
//! A validated bank webhook carries the amount paid into a
//! transaction's virtual account. The payment is classified against the
//! expected deposit, the transaction moves to FUNDED, and a pool entry
//! is written to both the database and the volatile pool store.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use tradeflow_common::{quantize_amount, PoolEntry, Reference, TradeFlowError, TransactionStatus};
use tradeflow_db::{PoolEntryRepo, TraderRepo, TransactionRepo};
use tradeflow_fx::RateEngine;
use tradeflow_pool::store::EntryData;
use tradeflow_pool::PoolStore;

use crate::config::EngineConfig;
use crate::notify::{dispatch_detached, Notification, NotificationDispatcher};
use crate::priority::priority_score;

/// Payments within this many NGN of the expected deposit count as exact.
pub const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Minimum paid/expected ratio accepted (with adjustment) before the
/// payment is held.
pub const MIN_ACCEPT_RATIO: Decimal = Decimal::from_parts(95, 0, 0, false, 2);

/// A validated bank webhook payment.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayment {
    pub session_id: String,
    pub account_number: String,
    pub amount: Decimal,
}

/// Verdict on an inbound payment amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentClassification {
    /// Within tolerance of the expected deposit.
    Exact,
    /// Accepted with source and fee scaled down proportionally.
    Adjusted,
    /// More than expected; accepted as-is.
    Overpayment,
    /// Below the acceptance ratio; no state change.
    Held,
}

impl PaymentClassification {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentClassification::Exact => "exact",
            PaymentClassification::Adjusted => "adjusted",
            PaymentClassification::Overpayment => "overpayment",
            PaymentClassification::Held => "held",
        }
    }
}

/// Classify a paid amount against the expected deposit.
pub fn classify_payment(expected: Decimal, paid: Decimal) -> PaymentClassification {
    if (paid - expected).abs() <= AMOUNT_TOLERANCE {
        return PaymentClassification::Exact;
    }
    if paid > expected {
        return PaymentClassification::Overpayment;
    }
    if expected > Decimal::ZERO && paid / expected >= MIN_ACCEPT_RATIO {
        return PaymentClassification::Adjusted;
    }
    PaymentClassification::Held
}

/// Outcome of processing one webhook payment.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Transaction funded and pooled.
    Success {
        reference: String,
        classification: PaymentClassification,
        paid_amount: Decimal,
        expected_amount: Decimal,
        transaction_status: TransactionStatus,
        pool_entry_id: String,
    },
    /// Payment held pending a top-up; no state change.
    Held {
        reference: String,
        expected_amount: Decimal,
        paid_amount: Decimal,
        shortfall: Decimal,
    },
    /// The transaction was already funded; safe to retry.
    Duplicate {
        reference: String,
        transaction_status: TransactionStatus,
    },
}

/// The webhook-to-pool ingestion path.
pub struct PaymentIngestor {
    db: PgPool,
    pool: PoolStore,
    rates: Arc<RateEngine>,
    notifier: Arc<dyn NotificationDispatcher>,
    config: EngineConfig,
}

impl PaymentIngestor {
    /// Create a new ingestor.
    pub fn new(
        db: PgPool,
        pool: PoolStore,
        rates: Arc<RateEngine>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            pool,
            rates,
            notifier,
            config,
        }
    }

    /// Process one webhook payment.
    ///
    /// Idempotent: replaying a payment for an already-funded transaction
    /// returns [`IngestOutcome::Duplicate`] without touching state.
    #[instrument(skip(self, payment), fields(session_id = %payment.session_id))]
    pub async fn process(&self, payment: WebhookPayment) -> Result<IngestOutcome, TradeFlowError> {
        let reference =
            Reference::from_virtual_account(&payment.account_number).map_err(|e| {
                TradeFlowError::Validation {
                    message: e.to_string(),
                    field: Some("accountNumber".to_string()),
                }
            })?;

        let mut txn = TransactionRepo::find_by_reference(&self.db, reference.as_str())
            .await?
            .ok_or_else(|| TradeFlowError::TransactionNotFound(reference.to_string()))?;

        if txn.status != TransactionStatus::Initiated {
            info!(reference = %reference, status = %txn.status, "Duplicate payment ignored");
            return Ok(IngestOutcome::Duplicate {
                reference: reference.to_string(),
                transaction_status: txn.status,
            });
        }

        let expected = txn.expected_deposit();
        let paid = payment.amount;
        let classification = classify_payment(expected, paid);

        let trader = TraderRepo::find_by_id(&self.db, txn.trader_id).await?;

        if classification == PaymentClassification::Held {
            if let Some(trader) = &trader {
                dispatch_detached(
                    self.notifier.clone(),
                    Notification::PaymentHeld {
                        phone: trader.phone.clone(),
                        reference: reference.to_string(),
                        expected,
                        paid,
                    },
                );
            }
            info!(
                reference = %reference,
                %expected,
                %paid,
                "Payment held below acceptance threshold"
            );
            return Ok(IngestOutcome::Held {
                reference: reference.to_string(),
                expected_amount: expected,
                paid_amount: paid,
                shortfall: expected - paid,
            });
        }

        if classification == PaymentClassification::Adjusted {
            let ratio = paid / expected;
            txn.source_amount = quantize_amount(txn.source_amount * ratio);
            txn.fee_amount = quantize_amount(txn.fee_amount * ratio);
        }

        txn.transition_to(TransactionStatus::Funded)?;

        let amount_usd = match self
            .rates
            .amount_to_usd(txn.source_amount, txn.direction.source_currency())
            .await
        {
            Ok(usd) => usd,
            Err(e) => {
                // Ingestion must not fail on a rate outage; the amount
                // component of the score drops to zero instead.
                warn!(error = %e, "USD normalisation unavailable; scoring amount as zero");
                Decimal::ZERO
            }
        };
        let score = priority_score(0.0, amount_usd, trader.as_ref().map(|t| t.kyc_tier));

        let entry = PoolEntry::new(
            txn.id,
            txn.trader_id,
            txn.direction,
            txn.source_amount,
            Decimal::from_f64_retain(score).unwrap_or_default().round_dp(4),
            self.config.pool_timeout_hours,
        );

        let mut tx = self.db.begin().await.map_err(|e| TradeFlowError::Database(e.to_string()))?;
        TransactionRepo::update(&mut *tx, &txn).await?;
        PoolEntryRepo::insert(&mut *tx, &entry).await?;
        tx.commit()
            .await
            .map_err(|e| TradeFlowError::Database(e.to_string()))?;

        let data = EntryData {
            transaction_id: txn.id.to_string(),
            reference: txn.reference.as_str().to_string(),
            source_amount: txn.source_amount,
            target_amount: txn.target_amount,
            direction: txn.direction,
            currency: txn.direction.source_currency(),
            trader_id: txn.trader_id.to_string(),
            entered_pool_at: entry.entered_pool_at,
            expires_at: entry.expires_at,
        };
        self.pool
            .add(&entry.id.to_string(), &data, score)
            .await
            .map_err(|e| TradeFlowError::Cache(e.to_string()))?;

        if let Some(trader) = &trader {
            dispatch_detached(
                self.notifier.clone(),
                Notification::Funded {
                    phone: trader.phone.clone(),
                    reference: reference.to_string(),
                },
            );
        }

        info!(
            reference = %reference,
            classification = classification.as_str(),
            %paid,
            %expected,
            pool_entry_id = %entry.id,
            "Payment processed; transaction funded"
        );

        Ok(IngestOutcome::Success {
            reference: reference.to_string(),
            classification,
            paid_amount: paid,
            expected_amount: expected,
            transaction_status: txn.status,
            pool_entry_id: entry.id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_exact_within_tolerance() {
        assert_eq!(
            classify_payment(dec!(1020000), dec!(1020000)),
            PaymentClassification::Exact
        );
        // 100 NGN under is still exact
        assert_eq!(
            classify_payment(dec!(1020000), dec!(1019900)),
            PaymentClassification::Exact
        );
        // 100 NGN over is still exact
        assert_eq!(
            classify_payment(dec!(1020000), dec!(1020100)),
            PaymentClassification::Exact
        );
    }

    #[test]
    fn test_overpayment_accepted_as_is() {
        assert_eq!(
            classify_payment(dec!(1020000), dec!(1100000)),
            PaymentClassification::Overpayment
        );
    }

    #[test]
    fn test_adjusted_at_97_percent() {
        assert_eq!(
            classify_payment(dec!(1020000), dec!(989400)),
            PaymentClassification::Adjusted
        );
    }

    #[test]
    fn test_adjusted_boundary_at_95_percent() {
        assert_eq!(
            classify_payment(dec!(1000000), dec!(950000)),
            PaymentClassification::Adjusted
        );
        assert_eq!(
            classify_payment(dec!(1000000), dec!(949999)),
            PaymentClassification::Held
        );
    }

    #[test]
    fn test_held_at_80_percent() {
        assert_eq!(
            classify_payment(dec!(1020000), dec!(816000)),
            PaymentClassification::Held
        );
    }

    #[test]
    fn test_adjustment_scaling_is_proportional() {
        // The scenario from the webhook path: expected 1,020,000 paid
        // 989,400 (97%) scales 1,000,000 -> 970,000 and 20,000 -> 19,400.
        let ratio = dec!(989400) / dec!(1020000);
        assert_eq!(quantize_amount(dec!(1000000) * ratio), dec!(970000.00));
        assert_eq!(quantize_amount(dec!(20000) * ratio), dec!(19400.00));
    }
}
