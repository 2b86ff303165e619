//! AES-GCM field encryption.
//!
//! Sensitive columns (supplier account numbers, BVN, NIN) are stored as
//! hex-armoured strings in the format `v1:<nonce-hex>:<ciphertext-hex>`.
//! The field name is bound as additional authenticated data so a value
//! cannot be transplanted between columns.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::{CryptoError, Result};

const FORMAT_VERSION: &str = "v1";
const NONCE_LEN: usize = 12;

/// Derive a 32-byte field-encryption key from a configured secret using HKDF.
pub fn derive_key(secret: &[u8], salt: &[u8]) -> Result<[u8; 32]> {
    use hkdf::Hkdf;
    use sha2::Sha256;

    let hk = Hkdf::<Sha256>::new(Some(salt), secret);
    let mut key = [0u8; 32];
    hk.expand(b"tradeflow-field-encryption", &mut key)
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;

    Ok(key)
}

/// Encrypts and decrypts individual database fields.
#[derive(Clone)]
pub struct FieldCipher {
    key: [u8; 32],
}

impl FieldCipher {
    /// Create a cipher from a raw 32-byte key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Create a cipher by deriving the key from a configured secret.
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(CryptoError::InvalidKey(
                "Field encryption secret must not be empty".to_string(),
            ));
        }
        let key = derive_key(secret.as_bytes(), b"tradeflow")?;
        Ok(Self::new(key))
    }

    /// Encrypt a field value, binding `field` as authenticated data.
    pub fn encrypt_field(&self, field: &str, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: field.as_bytes(),
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(format!(
            "{FORMAT_VERSION}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a field value previously produced by [`encrypt_field`].
    ///
    /// [`encrypt_field`]: FieldCipher::encrypt_field
    pub fn decrypt_field(&self, field: &str, armoured: &str) -> Result<String> {
        let mut parts = armoured.splitn(3, ':');
        let (version, nonce_hex, ct_hex) = match (parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(n), Some(c)) => (v, n, c),
            _ => {
                return Err(CryptoError::DecryptionFailed(
                    "Malformed encrypted field".to_string(),
                ))
            }
        };

        if version != FORMAT_VERSION {
            return Err(CryptoError::DecryptionFailed(format!(
                "Unsupported format version: {version}"
            )));
        }

        let nonce_bytes: [u8; NONCE_LEN] = hex::decode(nonce_hex)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::DecryptionFailed("Invalid nonce length".to_string()))?;

        let ciphertext = hex::decode(ct_hex)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: ciphertext.as_slice(),
                    aad: field.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed("Decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::from_secret("test-secret").unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let c = cipher();
        let account = "6217000010012345678";

        let encrypted = c.encrypt_field("supplier_account", account).unwrap();
        let decrypted = c.decrypt_field("supplier_account", &encrypted).unwrap();

        assert_eq!(decrypted, account);
        assert_ne!(encrypted, account);
    }

    #[test]
    fn test_bvn_round_trip() {
        let c = cipher();
        let bvn = "22345678901";

        let encrypted = c.encrypt_field("bvn", bvn).unwrap();
        assert_eq!(c.decrypt_field("bvn", &encrypted).unwrap(), bvn);
    }

    #[test]
    fn test_different_nonces() {
        let c = cipher();
        let enc1 = c.encrypt_field("bvn", "22345678901").unwrap();
        let enc2 = c.encrypt_field("bvn", "22345678901").unwrap();
        assert_ne!(enc1, enc2);
    }

    #[test]
    fn test_field_binding_rejected() {
        let c = cipher();
        let encrypted = c.encrypt_field("bvn", "22345678901").unwrap();
        // Same ciphertext under a different field name must not decrypt
        assert!(c.decrypt_field("nin", &encrypted).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let c1 = cipher();
        let c2 = FieldCipher::from_secret("other-secret").unwrap();

        let encrypted = c1.encrypt_field("bvn", "22345678901").unwrap();
        assert!(c2.decrypt_field("bvn", &encrypted).is_err());
    }

    #[test]
    fn test_malformed_input_rejected() {
        let c = cipher();
        assert!(c.decrypt_field("bvn", "not-encrypted").is_err());
        assert!(c.decrypt_field("bvn", "v2:00:00").is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(FieldCipher::from_secret("").is_err());
    }
}
