//! Transaction creation and cancellation.
//!
//! Creation validates the currency pair and amount, enforces the
//! trader's monthly USD limit, prices the transaction from a quote or
//! fresh rates, encrypts the supplier account, and returns deposit
//! instructions carrying the derived virtual account number.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};

use tradeflow_common::{
    quantize_amount, Currency, Direction, TradeFlowError, TraderId, Transaction, TransactionId,
    TransactionStatus,
};
use tradeflow_crypto::FieldCipher;
use tradeflow_db::{PoolEntryRepo, TraderRepo, TransactionRepo};
use tradeflow_fx::engine::MIN_FEE_NGN;
use tradeflow_fx::{FeeTier, RateEngine};
use tradeflow_pool::PoolStore;

/// Minimum NGN-side transaction amount.
pub const MIN_AMOUNT_NGN: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Minimum CNY-side transaction amount.
pub const MIN_AMOUNT_CNY: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Request to create a transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransactionRequest {
    pub source_currency: Currency,
    pub target_currency: Currency,
    pub source_amount: Decimal,
    pub supplier_name: String,
    pub supplier_bank: String,
    pub supplier_account: String,
    /// Previously minted quote to price against; fresh rates otherwise.
    pub quote_id: Option<String>,
}

/// Where and how much the trader must deposit.
#[derive(Debug, Clone, Serialize)]
pub struct DepositInstructions {
    pub account_number: String,
    pub bank_name: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub reference: String,
}

/// Transaction creation and cancellation service.
pub struct TransactionService {
    db: PgPool,
    pool: PoolStore,
    rates: Arc<RateEngine>,
    cipher: FieldCipher,
}

impl TransactionService {
    /// Create a new transaction service.
    pub fn new(db: PgPool, pool: PoolStore, rates: Arc<RateEngine>, cipher: FieldCipher) -> Self {
        Self {
            db,
            pool,
            rates,
            cipher,
        }
    }

    /// Create a transaction for a trader.
    #[instrument(skip(self, request), fields(trader_id = %trader_id))]
    pub async fn create(
        &self,
        trader_id: TraderId,
        request: CreateTransactionRequest,
    ) -> Result<(Transaction, DepositInstructions), TradeFlowError> {
        let direction = match (request.source_currency, request.target_currency) {
            (Currency::Ngn, Currency::Cny) => Direction::NgnToCny,
            (Currency::Cny, Currency::Ngn) => Direction::CnyToNgn,
            (source, target) => {
                return Err(TradeFlowError::Validation {
                    message: format!("Unsupported currency pair: {source}/{target}"),
                    field: Some("source_currency".to_string()),
                })
            }
        };

        let min_amount = match request.source_currency {
            Currency::Ngn => MIN_AMOUNT_NGN,
            _ => MIN_AMOUNT_CNY,
        };
        if request.source_amount < min_amount {
            return Err(TradeFlowError::Validation {
                message: format!(
                    "Minimum transaction amount is {} {min_amount}",
                    request.source_currency
                ),
                field: Some("source_amount".to_string()),
            });
        }

        let trader = TraderRepo::find_by_id(&self.db, trader_id)
            .await?
            .ok_or(TradeFlowError::TraderNotFound(trader_id))?;

        let rates = self
            .rates
            .get_rates()
            .await
            .map_err(|e| TradeFlowError::Provider(e.to_string()))?;
        let amount_usd = self
            .rates
            .amount_to_usd(request.source_amount, request.source_currency)
            .await
            .map_err(|e| TradeFlowError::Provider(e.to_string()))?;

        if trader.exceeds_monthly_limit(amount_usd) {
            return Err(TradeFlowError::MonthlyLimitExceeded {
                used: trader.monthly_used_usd.to_string(),
                limit: trader.monthly_limit_usd.to_string(),
            });
        }

        // Price from the quote when one is supplied, otherwise compute
        // against fresh rates with the tier for this amount.
        let (exchange_rate, target_amount, fee_pct, fee_amount) = match &request.quote_id {
            Some(quote_id) => {
                let quote = self
                    .rates
                    .get_quote(quote_id)
                    .await
                    .map_err(|e| TradeFlowError::Provider(e.to_string()))?
                    .ok_or_else(|| TradeFlowError::QuoteNotFound(quote_id.clone()))?;
                (
                    quote.mid_market_rate,
                    quote.target_amount,
                    quote.fee_percentage,
                    quote.fee_amount,
                )
            }
            None => {
                let rate = rates.ngn_per_cny;
                let fee_pct = FeeTier::for_monthly_volume(amount_usd).percentage();
                let min_fee = match request.source_currency {
                    Currency::Ngn => MIN_FEE_NGN,
                    _ => quantize_amount(MIN_FEE_NGN / rate),
                };
                let fee_amount = quantize_amount(
                    (request.source_amount * fee_pct / Decimal::ONE_HUNDRED).max(min_fee),
                );
                let target_amount = match request.source_currency {
                    Currency::Ngn => quantize_amount(request.source_amount / rate),
                    _ => quantize_amount(request.source_amount * rate),
                };
                (rate, target_amount, fee_pct, fee_amount)
            }
        };

        let mut txn = Transaction::new(trader_id, direction, request.source_amount);
        txn.target_amount = Some(target_amount);
        txn.exchange_rate = Some(exchange_rate);
        txn.fee_amount = fee_amount;
        txn.fee_percentage = fee_pct;
        txn.supplier_name = Some(request.supplier_name);
        txn.supplier_bank = Some(request.supplier_bank);
        txn.supplier_account = Some(
            self.cipher
                .encrypt_field("supplier_account", &request.supplier_account)
                .map_err(|e| TradeFlowError::Crypto(e.to_string()))?,
        );

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| TradeFlowError::Database(e.to_string()))?;
        TransactionRepo::insert(&mut *tx, &txn).await?;
        TraderRepo::add_monthly_used(&mut *tx, trader_id, amount_usd).await?;
        tx.commit()
            .await
            .map_err(|e| TradeFlowError::Database(e.to_string()))?;

        let instructions = DepositInstructions {
            account_number: txn.reference.virtual_account_number(),
            bank_name: "Providus Bank".to_string(),
            amount: txn.expected_deposit(),
            currency: request.source_currency,
            reference: txn.reference.as_str().to_string(),
        };

        info!(
            reference = %txn.reference,
            direction = %direction,
            amount = %txn.source_amount,
            fee = %txn.fee_amount,
            "Transaction created"
        );

        Ok((txn, instructions))
    }

    /// Cancel a transaction the trader still owns the lifecycle of.
    ///
    /// Valid from INITIATED or FUNDED; a funded transaction's pool
    /// entry is removed as part of the cancellation.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        trader_id: TraderId,
        transaction_id: TransactionId,
    ) -> Result<Transaction, TradeFlowError> {
        let mut txn = TransactionRepo::find_by_id(&self.db, transaction_id)
            .await?
            .ok_or_else(|| TradeFlowError::TransactionNotFound(transaction_id.to_string()))?;

        if txn.trader_id != trader_id {
            return Err(TradeFlowError::TransactionNotFound(
                transaction_id.to_string(),
            ));
        }

        let pool_entry =
            PoolEntryRepo::find_active_by_transaction(&self.db, transaction_id).await?;

        txn.transition_to(TransactionStatus::Cancelled)?;

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| TradeFlowError::Database(e.to_string()))?;
        TransactionRepo::update(&mut *tx, &txn).await?;
        if let Some(entry) = &pool_entry {
            PoolEntryRepo::deactivate(&mut *tx, entry.id).await?;
        }
        tx.commit()
            .await
            .map_err(|e| TradeFlowError::Database(e.to_string()))?;

        if let Some(entry) = &pool_entry {
            if let Err(e) = self
                .pool
                .remove(&entry.id.to_string(), entry.direction)
                .await
            {
                tracing::warn!(error = %e, "Pool removal failed during cancellation");
            }
        }

        info!(reference = %txn.reference, "Transaction cancelled");
        Ok(txn)
    }

    /// Decrypt the supplier account for display to its owner.
    pub fn reveal_supplier_account(&self, txn: &Transaction) -> Result<Option<String>, TradeFlowError> {
        match &txn.supplier_account {
            Some(armoured) => self
                .cipher
                .decrypt_field("supplier_account", armoured)
                .map(Some)
                .map_err(|e| TradeFlowError::Crypto(e.to_string())),
            None => Ok(None),
        }
    }
}
