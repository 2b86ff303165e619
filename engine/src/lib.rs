//! TradeFlow Matching Engine
//!
//! The scheduled heart of the platform: priority scoring, the three
//! matching algorithms, the cycle orchestrator, the payment-to-pool
//! ingestion path, and the background workers that keep the pool and
//! transaction lifecycle moving.

pub mod config;
pub mod engine;
pub mod expiry;
pub mod ingest;
pub mod matcher;
pub mod notify;
pub mod priority;
pub mod reporter;
pub mod scheduler;
pub mod transactions;

pub use config::EngineConfig;
pub use engine::{CycleOutcome, MatchingEngine};
pub use expiry::ExpiryWorker;
pub use ingest::{IngestOutcome, PaymentClassification, PaymentIngestor, WebhookPayment};
pub use notify::{LogDispatcher, Notification, NotificationDispatcher, RecordingDispatcher};
pub use reporter::CycleReport;
pub use transactions::{CreateTransactionRequest, DepositInstructions, TransactionService};
