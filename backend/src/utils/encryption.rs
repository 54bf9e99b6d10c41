//! Field-level encryption for task data at rest.
//!
//! Every backend adapter encrypts sensitive fields through the same cipher,
//! so at-rest confidentiality does not depend on what the physical store
//! offers. Wire format: `base64(iv) + ":" + base64(ciphertext)`.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::error::AppError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;

/// AES-256-CBC cipher over individual string fields.
///
/// Holds only the immutable key, so a single instance is shared freely
/// across concurrent callers; per-call state lives on the stack.
pub struct FieldCipher {
    key: [u8; KEY_LENGTH],
}

impl FieldCipher {
    /// Builds a cipher from a base64-encoded 256-bit key. Fails here, at
    /// construction, when the key is absent or malformed.
    pub fn new(encoded_key: &str) -> Result<Self, AppError> {
        let bytes = STANDARD
            .decode(encoded_key.trim())
            .map_err(|_| AppError::InvalidEncryptionKey)?;
        let key: [u8; KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| AppError::InvalidEncryptionKey)?;
        Ok(Self { key })
    }

    /// Encrypts a field. Empty input stays empty rather than erroring.
    /// Every call draws a fresh random IV, so equal plaintexts never
    /// produce equal ciphertexts.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(format!(
            "{}:{}",
            STANDARD.encode(iv),
            STANDARD.encode(ciphertext)
        ))
    }

    /// Decrypts a field produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, encoded: &str) -> Result<String, AppError> {
        if encoded.is_empty() {
            return Ok(String::new());
        }

        let (iv_part, cipher_part) = encoded
            .split_once(':')
            .ok_or(AppError::MalformedCiphertext("missing separator"))?;

        let iv_bytes = STANDARD
            .decode(iv_part)
            .map_err(|_| AppError::MalformedCiphertext("invalid iv encoding"))?;
        let iv: [u8; IV_LENGTH] = iv_bytes.try_into().map_err(|_| AppError::InvalidIvLength)?;

        let ciphertext = STANDARD
            .decode(cipher_part)
            .map_err(|_| AppError::MalformedCiphertext("invalid ciphertext encoding"))?;

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| AppError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| AppError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_key() -> String {
        STANDARD.encode([7u8; KEY_LENGTH])
    }

    fn cipher() -> FieldCipher {
        FieldCipher::new(&test_key()).expect("valid key")
    }

    #[test]
    fn round_trip_restores_plaintext() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("Buy milk").unwrap();
        assert_ne!(encrypted, "Buy milk");
        assert!(encrypted.contains(':'));
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "Buy milk");
    }

    #[test]
    fn empty_input_is_a_no_op_both_ways() {
        let cipher = cipher();
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn repeated_encryption_differs_by_iv() {
        let cipher = cipher();
        let a = cipher.encrypt("same plaintext").unwrap();
        let b = cipher.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), cipher.decrypt(&b).unwrap());
    }

    #[test]
    fn short_iv_is_rejected() {
        let cipher = cipher();
        let payload = format!("{}:{}", STANDARD.encode([0u8; 8]), STANDARD.encode(b"junk"));
        assert!(matches!(
            cipher.decrypt(&payload),
            Err(AppError::InvalidIvLength)
        ));
    }

    #[test]
    fn missing_separator_is_rejected() {
        let cipher = cipher();
        assert!(matches!(
            cipher.decrypt("no-separator-here"),
            Err(AppError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn invalid_base64_halves_are_rejected() {
        let cipher = cipher();
        assert!(matches!(
            cipher.decrypt("!!!:AAAA"),
            Err(AppError::MalformedCiphertext(_))
        ));
        let payload = format!("{}:%%%", STANDARD.encode([0u8; 16]));
        assert!(matches!(
            cipher.decrypt(&payload),
            Err(AppError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn garbage_ciphertext_fails_decryption() {
        let cipher = cipher();
        let payload = format!(
            "{}:{}",
            STANDARD.encode([0u8; 16]),
            STANDARD.encode([1u8; 32])
        );
        assert!(matches!(
            cipher.decrypt(&payload),
            Err(AppError::DecryptionFailed)
        ));
    }

    #[test]
    fn malformed_key_fails_at_construction() {
        assert!(matches!(
            FieldCipher::new("not base64 at all!!"),
            Err(AppError::InvalidEncryptionKey)
        ));
        let short = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            FieldCipher::new(&short),
            Err(AppError::InvalidEncryptionKey)
        ));
    }
}
