//! TradeFlow FX Engine
//!
//! NGN/CNY rate sourcing with shared-cache discipline:
//!
//! - Rate providers behind one trait, with a deterministic mock and a
//!   live HTTP provider selected by configuration
//! - Cross rates cached in the key-value store with a short TTL
//! - Monthly-volume fee tiers and quote minting
//! - A circuit breaker that pauses quoting on anomalous rate movement

pub mod engine;
pub mod error;
pub mod provider;
pub mod quote;
pub mod tiers;

pub use engine::{CurrentRates, RateEngine, RateEngineConfig};
pub use error::{FxError, FxResult};
pub use provider::{HttpRateProvider, MockRateProvider, ProviderRates, RateProvider};
pub use quote::Quote;
pub use tiers::FeeTier;
