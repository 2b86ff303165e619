//! TradeFlow Common Types
//!
//! Shared types used across the TradeFlow matching core: identifiers,
//! currency and rounding helpers, the transaction lifecycle state machine,
//! trader and match records, and the durable pool entry.

pub mod error;
pub mod identifiers;
pub mod matching;
pub mod monetary;
pub mod pool;
pub mod trader;
pub mod transaction;

pub use error::*;
pub use identifiers::*;
pub use matching::*;
pub use monetary::*;
pub use pool::*;
pub use trader::*;
pub use transaction::*;

/// A timestamp with timezone (always UTC for TradeFlow).
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
