//! Encryption of the gateway credentials stored in merchant configuration.
//!
//! Values are sealed with XChaCha20-Poly1305 under a key derived per value
//! (HKDF-SHA256 over the process key and a random salt) and stored as
//! `pbenc:v1:<base64(salt || nonce || ciphertext)>`. Values without the
//! prefix were written by the old back-office and are decoded with its
//! character-divisor scheme so existing configuration keeps working.

use crate::error::CryptoError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const ENCRYPTED_PREFIX: &str = "pbenc:v1:";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const HKDF_INFO: &[u8] = b"powerboard-connector credentials";

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CredentialKey {
    material: Vec<u8>,
}

impl std::fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialKey(..)")
    }
}

impl CredentialKey {
    pub fn from_bytes(material: &[u8]) -> Result<Self, CryptoError> {
        if material.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        Ok(Self {
            material: material.to_vec(),
        })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let decoded = Zeroizing::new(STANDARD.decode(encoded.trim()).map_err(|_| CryptoError::Malformed)?);
        Self::from_bytes(&decoded)
    }

    fn cipher(&self, salt: &[u8]) -> Result<XChaCha20Poly1305, CryptoError> {
        let mut okm = Zeroizing::new([0u8; 32]);
        Hkdf::<Sha256>::new(Some(salt), &self.material)
            .expand(HKDF_INFO, &mut okm[..])
            .map_err(|_| CryptoError::Malformed)?;
        Ok(XChaCha20Poly1305::new(Key::from_slice(&okm[..])))
    }
}

pub fn is_encrypted(stored: &str) -> bool {
    stored.starts_with(ENCRYPTED_PREFIX)
}

pub fn encrypt_credential(key: &CredentialKey, plaintext: &str) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher(&salt)?
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: ENCRYPTED_PREFIX.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Encrypt)?;

    let mut envelope = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(nonce.as_slice());
    envelope.extend_from_slice(&ciphertext);
    Ok(format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(envelope)))
}

/// Opens a stored credential. `legacy_secret` is only used for values that
/// predate the sealed format.
pub fn decrypt_credential(
    key: Option<&CredentialKey>,
    legacy_secret: &str,
    stored: &str,
) -> Result<String, CryptoError> {
    let Some(encoded) = stored.strip_prefix(ENCRYPTED_PREFIX) else {
        return legacy_decode(stored, legacy_secret);
    };
    let key = key.ok_or(CryptoError::EmptyKey)?;
    let envelope = STANDARD.decode(encoded).map_err(|_| CryptoError::Malformed)?;
    if envelope.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Malformed);
    }
    let (salt, rest) = envelope.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    let plaintext = key
        .cipher(salt)?
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: ENCRYPTED_PREFIX.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Decrypt)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Malformed)
}

/// Old back-office scheme: each UTF-16 unit was multiplied by the matching
/// unit of the platform client secret.
pub fn legacy_decode(stored: &str, secret: &str) -> Result<String, CryptoError> {
    let secret: Vec<u16> = secret.encode_utf16().collect();
    if secret.is_empty() || secret.contains(&0) {
        return Err(CryptoError::EmptyKey);
    }
    let units: Vec<u16> = stored
        .encode_utf16()
        .enumerate()
        .map(|(i, unit)| unit / secret[i % secret.len()])
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CredentialKey {
        CredentialKey::from_bytes(&[7u8; 32]).unwrap()
    }

    #[test]
    fn sealed_values_open_with_the_same_key() {
        let sealed = encrypt_credential(&key(), "sk_live_123").unwrap();
        assert!(is_encrypted(&sealed));
        assert_eq!(decrypt_credential(Some(&key()), "", &sealed).unwrap(), "sk_live_123");
    }

    #[test]
    fn two_seals_of_one_value_differ() {
        let a = encrypt_credential(&key(), "x").unwrap();
        let b = encrypt_credential(&key(), "x").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = encrypt_credential(&key(), "secret").unwrap();
        let other = CredentialKey::from_bytes(&[8u8; 32]).unwrap();
        assert!(matches!(
            decrypt_credential(Some(&other), "", &sealed),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn sealed_value_without_key_is_rejected() {
        let sealed = encrypt_credential(&key(), "secret").unwrap();
        assert!(matches!(decrypt_credential(None, "s", &sealed), Err(CryptoError::EmptyKey)));
    }

    #[test]
    fn legacy_values_still_decode() {
        // 'a' (97) * 'B' (66) = 6402, 'b' (98) * 'C' (67) = 6566
        let stored: String = String::from_utf16_lossy(&[6402, 6566]);
        assert_eq!(legacy_decode(&stored, "BC").unwrap(), "ab");
        assert_eq!(decrypt_credential(None, "BC", &stored).unwrap(), "ab");
    }

    #[test]
    fn empty_key_material_is_refused() {
        assert!(matches!(CredentialKey::from_bytes(&[]), Err(CryptoError::EmptyKey)));
        assert!(matches!(CredentialKey::from_base64("not base64!"), Err(CryptoError::Malformed)));
    }
}
