//! Identifier types for TradeFlow entities.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraderId(Uuid);

impl TraderId {
    /// Create a new trader ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TraderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Create a new transaction ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolEntryId(Uuid);

impl PoolEntryId {
    /// Create a new pool entry ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PoolEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a match record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(Uuid);

impl MatchId {
    /// Create a new match ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-readable transaction reference in `TXN-XXXXXXXX` format
/// (8 uppercase alphanumeric characters, unique per transaction).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference(String);

/// Prefix of the virtual account number derived from a reference.
pub const VIRTUAL_ACCOUNT_PREFIX: &str = "TF";

const REFERENCE_PREFIX: &str = "TXN-";
const REFERENCE_SUFFIX_LEN: usize = 8;

impl Reference {
    /// Generate a fresh `TXN-XXXXXXXX` reference.
    pub fn generate() -> Self {
        const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..REFERENCE_SUFFIX_LEN)
            .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
            .collect();
        Self(format!("{REFERENCE_PREFIX}{suffix}"))
    }

    /// Parse and validate an existing reference string.
    pub fn parse(s: &str) -> Result<Self, InvalidReference> {
        let suffix = s
            .strip_prefix(REFERENCE_PREFIX)
            .ok_or_else(|| InvalidReference(s.to_string()))?;
        if suffix.len() != REFERENCE_SUFFIX_LEN
            || !suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(InvalidReference(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The suffix after `TXN-`.
    pub fn suffix(&self) -> &str {
        &self.0[REFERENCE_PREFIX.len()..]
    }

    /// Derive the virtual deposit account number (`TF<suffix>`).
    pub fn virtual_account_number(&self) -> String {
        format!("{VIRTUAL_ACCOUNT_PREFIX}{}", self.suffix())
    }

    /// Reverse the virtual-account encoding: `TF<suffix>` -> `TXN-<suffix>`.
    ///
    /// The account number must carry the `TF` prefix and at least one
    /// suffix character; anything else is rejected.
    pub fn from_virtual_account(account_number: &str) -> Result<Self, InvalidReference> {
        if account_number.len() < 3 {
            return Err(InvalidReference(account_number.to_string()));
        }
        let suffix = account_number
            .strip_prefix(VIRTUAL_ACCOUNT_PREFIX)
            .ok_or_else(|| InvalidReference(account_number.to_string()))?;
        Ok(Self(format!("{REFERENCE_PREFIX}{suffix}")))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error for malformed references or virtual account numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidReference(pub String);

impl fmt::Display for InvalidReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid reference or account number: {}", self.0)
    }
}

impl std::error::Error for InvalidReference {}

/// Identifier of one matching cycle, in `MC-YYYYMMDD-HHMM` format (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(String);

impl CycleId {
    /// Build a cycle ID for the given instant.
    pub fn for_instant(at: chrono::DateTime<chrono::Utc>) -> Self {
        Self(format!("MC-{}", at.format("%Y%m%d-%H%M")))
    }

    /// Wrap an existing cycle ID string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an ephemeral rate quote, in `QT-<12 hex>` format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(String);

impl QuoteId {
    /// Generate a fresh quote ID.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("QT-{}", &hex[..12]))
    }

    /// Wrap an existing quote ID string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
