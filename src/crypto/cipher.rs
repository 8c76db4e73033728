use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::{Zeroize, ZeroizeOnDrop};
use crate::error::{AppError, Result};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the CBC initialization vector in bytes.
pub const IV_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Symmetric cipher for license keys exchanged with clients.
///
/// Keys travel as hex-encoded AES-256-CBC ciphertext under a process-wide
/// key/IV pair. The IV is fixed, so the same plaintext always yields the same
/// ciphertext.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LicenseCipher {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl LicenseCipher {
    /// Creates a new `LicenseCipher` from configured secret material.
    pub fn new(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE]) -> Self {
        Self { key: *key, iv: *iv }
    }

    /// Encrypts a plaintext license key.
    ///
    /// # Returns
    ///
    /// The lowercase hex ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let encryptor = Aes256CbcEnc::new_from_slices(&self.key, &self.iv)
            .map_err(|e| AppError::Crypto(format!("Cipher init failed: {}", e)))?;
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        Ok(hex::encode(ciphertext))
    }

    /// Decrypts a hex ciphertext back to the plaintext license key.
    ///
    /// Foreign or malformed input yields `AppError::Decryption`.
    pub fn decrypt(&self, ciphertext_hex: &str) -> Result<String> {
        let ciphertext = hex::decode(ciphertext_hex.trim())
            .map_err(|_| AppError::Decryption("ciphertext is not valid hex".to_string()))?;

        if ciphertext.is_empty() || ciphertext.len() % IV_SIZE != 0 {
            return Err(AppError::Decryption(
                "ciphertext length is not a multiple of the block size".to_string(),
            ));
        }

        let decryptor = Aes256CbcDec::new_from_slices(&self.key, &self.iv)
            .map_err(|e| AppError::Crypto(format!("Cipher init failed: {}", e)))?;
        let mut plaintext = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| AppError::Decryption("bad padding".to_string()))?;

        match String::from_utf8(plaintext.clone()) {
            Ok(key) => {
                plaintext.zeroize();
                Ok(key)
            }
            Err(_) => {
                plaintext.zeroize();
                Err(AppError::Decryption("plaintext is not UTF-8".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> LicenseCipher {
        LicenseCipher::new(&[7u8; KEY_SIZE], &[3u8; IV_SIZE])
    }

    #[test]
    fn decrypt_inverts_encrypt() {
        let cipher = cipher();
        let long = "x".repeat(200);
        for key in ["", "A", "LIC-0000-1111-2222", "ключ-лицензии", long.as_str()] {
            let encrypted = cipher.encrypt(key).unwrap();
            assert_eq!(cipher.decrypt(&encrypted).unwrap(), key);
        }
    }

    #[test]
    fn encryption_is_deterministic() {
        let cipher = cipher();
        assert_eq!(cipher.encrypt("LIC-1").unwrap(), cipher.encrypt("LIC-1").unwrap());
        assert_ne!(cipher.encrypt("LIC-1").unwrap(), cipher.encrypt("LIC-2").unwrap());
    }

    #[test]
    fn foreign_input_is_a_decryption_error() {
        let cipher = cipher();
        for input in ["not-hex", "abcd", "", "zz11"] {
            assert!(matches!(cipher.decrypt(input), Err(AppError::Decryption(_))));
        }
    }

    #[test]
    fn ciphertext_from_another_key_does_not_decrypt() {
        let other = LicenseCipher::new(&[9u8; KEY_SIZE], &[3u8; IV_SIZE]);
        let encrypted = other.encrypt("LIC-ABC").unwrap();
        match cipher().decrypt(&encrypted) {
            Ok(plaintext) => assert_ne!(plaintext, "LIC-ABC"),
            Err(e) => assert!(matches!(e, AppError::Decryption(_))),
        }
    }
}
