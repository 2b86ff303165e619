//! TradeFlow Field Encryption
//!
//! AES-256-GCM encryption for sensitive trader fields (BVN, NIN,
//! supplier account numbers) stored in the database.

pub mod encryption;

pub use encryption::{derive_key, FieldCipher};

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
