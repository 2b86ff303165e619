//! Redis pool operations.
//!
//! Layout per direction:
//!
//! - `pool:ngn_to_cny` / `pool:cny_to_ngn` — sorted set of pool entry
//!   IDs scored by priority
//! - `pool_entry:<id>` — hash with the entry details
//! - `pool:lock` — distributed cycle lock with 5-minute auto-expiry
//!
//! Writes that touch both the index and the detail hash go through one
//! atomic pipeline so a crash can never leave a member without details.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::Pool as RedisPool;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tradeflow_common::{Currency, Direction};

use crate::{PoolError, Result};

/// Sorted set of NGN->CNY entries.
pub const POOL_KEY_BUY: &str = "pool:ngn_to_cny";

/// Sorted set of CNY->NGN entries.
pub const POOL_KEY_SELL: &str = "pool:cny_to_ngn";

/// Distributed cycle lock key.
pub const POOL_LOCK_KEY: &str = "pool:lock";

/// Lock auto-expiry; bounds the maximum cycle duration.
pub const LOCK_TIMEOUT_SECS: u64 = 300;

/// Key of the detail hash for a pool entry.
pub fn entry_hash_key(entry_id: &str) -> String {
    format!("pool_entry:{entry_id}")
}

/// Sorted-set key for a direction.
pub fn pool_key(direction: Direction) -> &'static str {
    match direction {
        Direction::NgnToCny => POOL_KEY_BUY,
        Direction::CnyToNgn => POOL_KEY_SELL,
    }
}

/// Detail payload written at insertion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryData {
    pub transaction_id: String,
    pub reference: String,
    pub source_amount: Decimal,
    pub target_amount: Option<Decimal>,
    pub direction: Direction,
    pub currency: Currency,
    pub trader_id: String,
    pub entered_pool_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A pool entry as returned by [`PoolStore::snapshot`], augmented with
/// its priority score.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub id: String,
    pub transaction_id: String,
    pub reference: String,
    pub source_amount: Decimal,
    pub target_amount: Option<Decimal>,
    pub direction: Direction,
    pub currency: Currency,
    pub trader_id: String,
    pub entered_pool_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub score: f64,
}

impl SnapshotEntry {
    fn from_hash(id: String, score: f64, mut h: HashMap<String, String>) -> Option<Self> {
        let direction = Direction::parse(h.get("direction")?.as_str())?;
        let currency = Currency::from_str(h.get("currency")?.as_str()).ok()?;
        let target_amount = match h.remove("target_amount") {
            Some(raw) if !raw.is_empty() => Some(Decimal::from_str(&raw).ok()?),
            _ => None,
        };
        Some(Self {
            id,
            transaction_id: h.remove("transaction_id")?,
            reference: h.remove("reference")?,
            source_amount: Decimal::from_str(h.get("source_amount")?).ok()?,
            target_amount,
            direction,
            currency,
            trader_id: h.remove("trader_id")?,
            entered_pool_at: parse_ts(h.get("entered_pool_at")?)?,
            expires_at: parse_ts(h.get("expires_at")?)?,
            score,
        })
    }
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Token proving ownership of the distributed cycle lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLock {
    token: String,
}

impl PoolLock {
    /// The raw lock token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Per-direction pool statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub ngn_to_cny_count: usize,
    pub ngn_to_cny_volume: Decimal,
    pub cny_to_ngn_count: usize,
    pub cny_to_ngn_volume: Decimal,
}

impl PoolStats {
    /// Total entries across both directions.
    pub fn total(&self) -> usize {
        self.ngn_to_cny_count + self.cny_to_ngn_count
    }
}

/// The Redis-backed matching pool.
#[derive(Clone)]
pub struct PoolStore {
    redis: RedisPool,
}

impl PoolStore {
    /// Create a new pool store on the given connection pool.
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    /// Add an entry to its direction's pool.
    ///
    /// Writes the sorted-set member and the detail hash in one atomic
    /// pipeline.
    pub async fn add(&self, entry_id: &str, data: &EntryData, score: f64) -> Result<()> {
        let mut conn = self.redis.get().await?;
        let hash_key = entry_hash_key(entry_id);

        let mut fields: Vec<(String, String)> = vec![
            ("id".into(), entry_id.to_string()),
            ("transaction_id".into(), data.transaction_id.clone()),
            ("reference".into(), data.reference.clone()),
            ("source_amount".into(), data.source_amount.to_string()),
            ("direction".into(), data.direction.as_str().to_string()),
            ("currency".into(), data.currency.code().to_string()),
            ("trader_id".into(), data.trader_id.clone()),
            ("entered_pool_at".into(), data.entered_pool_at.to_rfc3339()),
            ("expires_at".into(), data.expires_at.to_rfc3339()),
        ];
        if let Some(target) = data.target_amount {
            fields.push(("target_amount".into(), target.to_string()));
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zadd(pool_key(data.direction), entry_id, score)
            .ignore()
            .hset_multiple(&hash_key, &fields)
            .ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;

        debug!(entry_id, direction = %data.direction, score, "Pool entry added");
        Ok(())
    }

    /// Remove an entry from its direction's pool; no-op if absent.
    pub async fn remove(&self, entry_id: &str, direction: Direction) -> Result<()> {
        let mut conn = self.redis.get().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(pool_key(direction), entry_id)
            .ignore()
            .del(entry_hash_key(entry_id))
            .ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;

        debug!(entry_id, direction = %direction, "Pool entry removed");
        Ok(())
    }

    /// Update the matchable amount of an entry after a partial match.
    ///
    /// Touches the detail hash only; the priority score is preserved.
    pub async fn update_amount(&self, entry_id: &str, new_amount: Decimal) -> Result<()> {
        let mut conn = self.redis.get().await?;
        conn.hset::<_, _, _, ()>(
            entry_hash_key(entry_id),
            "source_amount",
            new_amount.to_string(),
        )
        .await?;

        debug!(entry_id, %new_amount, "Pool entry amount updated");
        Ok(())
    }

    /// Fetch a single entry's details.
    pub async fn get_entry(&self, entry_id: &str) -> Result<Option<SnapshotEntry>> {
        let mut conn = self.redis.get().await?;
        let h: HashMap<String, String> = conn.hgetall(entry_hash_key(entry_id)).await?;
        if h.is_empty() {
            return Ok(None);
        }
        let score: Option<f64> = {
            let direction = h.get("direction").and_then(|d| Direction::parse(d));
            match direction {
                Some(d) => conn.zscore(pool_key(d), entry_id).await?,
                None => None,
            }
        };
        Ok(SnapshotEntry::from_hash(
            entry_id.to_string(),
            score.unwrap_or(0.0),
            h,
        ))
    }

    /// Snapshot a direction's pool, highest priority first.
    ///
    /// Detail hashes are fetched in one pipeline to avoid per-entry
    /// round-trips. Members whose hash has gone missing are skipped;
    /// the next cycle's scrub or timeout sweep clears them.
    pub async fn snapshot(&self, direction: Direction) -> Result<Vec<SnapshotEntry>> {
        let mut conn = self.redis.get().await?;

        let members: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
            .arg(pool_key(direction))
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;

        if members.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for (id, _) in &members {
            pipe.hgetall(entry_hash_key(id));
        }
        let hashes: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        let mut entries = Vec::with_capacity(members.len());
        for ((id, score), h) in members.into_iter().zip(hashes) {
            if h.is_empty() {
                warn!(entry_id = %id, "Pool member without detail hash; skipping");
                continue;
            }
            match SnapshotEntry::from_hash(id.clone(), score, h) {
                Some(entry) => entries.push(entry),
                None => warn!(entry_id = %id, "Unparseable pool entry; skipping"),
            }
        }

        Ok(entries)
    }

    /// Summary statistics for both pools.
    pub async fn stats(&self) -> Result<PoolStats> {
        let buy = self.snapshot(Direction::NgnToCny).await?;
        let sell = self.snapshot(Direction::CnyToNgn).await?;

        Ok(PoolStats {
            ngn_to_cny_count: buy.len(),
            ngn_to_cny_volume: buy.iter().map(|e| e.source_amount).sum(),
            cny_to_ngn_count: sell.len(),
            cny_to_ngn_volume: sell.iter().map(|e| e.source_amount).sum(),
        })
    }

    /// Try to acquire the cycle lock without blocking.
    ///
    /// Returns `None` if another process holds it. The lock auto-expires
    /// after [`LOCK_TIMEOUT_SECS`] so a crashed holder cannot wedge the
    /// scheduler.
    pub async fn acquire_lock(&self) -> Result<Option<PoolLock>> {
        let mut conn = self.redis.get().await?;
        let token = Uuid::new_v4().to_string();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(POOL_LOCK_KEY)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(LOCK_TIMEOUT_SECS)
            .query_async(&mut conn)
            .await?;

        if acquired.is_some() {
            info!("Pool lock acquired");
            Ok(Some(PoolLock { token }))
        } else {
            debug!("Pool lock held elsewhere");
            Ok(None)
        }
    }

    /// Release the cycle lock.
    ///
    /// Idempotent: an expired or already-released token is logged and
    /// tolerated. The compare-and-delete runs server-side so a stale
    /// holder can never delete a newer owner's lock.
    pub async fn release_lock(&self, lock: &PoolLock) -> Result<()> {
        const RELEASE_SCRIPT: &str = r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
        "#;

        let mut conn = self.redis.get().await?;
        let released: i64 = redis::cmd("EVAL")
            .arg(RELEASE_SCRIPT)
            .arg(1)
            .arg(POOL_LOCK_KEY)
            .arg(&lock.token)
            .query_async(&mut conn)
            .await?;

        if released == 1 {
            info!("Pool lock released");
        } else {
            warn!("Pool lock already expired or owned elsewhere");
        }
        Ok(())
    }
}

impl std::fmt::Debug for PoolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_key_layout() {
        assert_eq!(pool_key(Direction::NgnToCny), "pool:ngn_to_cny");
        assert_eq!(pool_key(Direction::CnyToNgn), "pool:cny_to_ngn");
        assert_eq!(entry_hash_key("pe-1"), "pool_entry:pe-1");
    }

    #[test]
    fn test_snapshot_entry_parsing() {
        let mut h = HashMap::new();
        h.insert("transaction_id".to_string(), "txn-1".to_string());
        h.insert("reference".to_string(), "TXN-ABC123XY".to_string());
        h.insert("source_amount".to_string(), "1000000".to_string());
        h.insert("target_amount".to_string(), "4677.42".to_string());
        h.insert("direction".to_string(), "ngn_to_cny".to_string());
        h.insert("currency".to_string(), "NGN".to_string());
        h.insert("trader_id".to_string(), "trader-1".to_string());
        h.insert(
            "entered_pool_at".to_string(),
            "2026-01-01T00:00:00+00:00".to_string(),
        );
        h.insert(
            "expires_at".to_string(),
            "2026-01-02T00:00:00+00:00".to_string(),
        );

        let entry = SnapshotEntry::from_hash("pe-1".to_string(), 72.5, h).unwrap();
        assert_eq!(entry.id, "pe-1");
        assert_eq!(entry.source_amount, dec!(1000000));
        assert_eq!(entry.target_amount, Some(dec!(4677.42)));
        assert_eq!(entry.direction, Direction::NgnToCny);
        assert_eq!(entry.currency, Currency::Ngn);
        assert_eq!(entry.score, 72.5);
        assert!(entry.expires_at > entry.entered_pool_at);
    }

    #[test]
    fn test_snapshot_entry_missing_field_rejected() {
        let mut h = HashMap::new();
        h.insert("direction".to_string(), "ngn_to_cny".to_string());
        assert!(SnapshotEntry::from_hash("pe-1".to_string(), 0.0, h).is_none());
    }

    #[test]
    fn test_pool_stats_total() {
        let stats = PoolStats {
            ngn_to_cny_count: 2,
            ngn_to_cny_volume: dec!(3000000),
            cny_to_ngn_count: 1,
            cny_to_ngn_volume: dec!(75000),
        };
        assert_eq!(stats.total(), 3);
    }
}
