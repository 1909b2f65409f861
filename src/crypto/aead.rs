//! ChaCha20-Poly1305 payload protection.
//!
//! A sealed payload is a fresh random 12-byte nonce followed by the
//! ciphertext with its 16-byte tag appended:
//!
//! ```text
//! nonce (12) || ciphertext || tag (16)
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{CryptoError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, SESSION_KEY_SIZE};

/// Symmetric key protecting one connection.
///
/// Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Create a new session key from bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Smallest possible sealed payload (empty plaintext).
pub const SEALED_OVERHEAD: usize = AEAD_NONCE_SIZE + AEAD_TAG_SIZE;

/// Encrypt `plaintext` under a fresh random nonce.
pub fn seal(key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    seal_with_nonce(key, &nonce, plaintext)
}

/// Encrypt `plaintext` under the given nonce.
///
/// A nonce must never repeat under one key; callers other than [`seal`]
/// are expected to be tests pinning known vectors.
pub fn seal_with_nonce(
    key: &SessionKey,
    nonce: &[u8; AEAD_NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(AEAD_NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Verify and decrypt a sealed payload.
///
/// Too-short input, a wrong key and any modified byte all fail the same way.
pub fn open(key: &SessionKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SEALED_OVERHEAD {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce, ciphertext) = sealed.split_at(AEAD_NONCE_SIZE);

    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SessionKey {
        SessionKey::from_bytes([byte; SESSION_KEY_SIZE])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let k = key(0x42);
        let sealed = seal(&k, b"hello, world").unwrap();
        assert_eq!(sealed.len(), SEALED_OVERHEAD + 12);
        assert_eq!(open(&k, &sealed).unwrap(), b"hello, world");
    }

    #[test]
    fn test_empty_plaintext() {
        let k = key(1);
        let sealed = seal(&k, b"").unwrap();
        assert_eq!(sealed.len(), SEALED_OVERHEAD);
        assert!(open(&k, &sealed).unwrap().is_empty());
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let k = key(7);
        let a = seal(&k, b"same").unwrap();
        let b = seal(&k, b"same").unwrap();
        assert_ne!(a[..AEAD_NONCE_SIZE], b[..AEAD_NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&key(1), b"secret").unwrap();
        assert_eq!(open(&key(2), &sealed), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_any_flipped_bit_fails() {
        let k = key(9);
        let sealed = seal(&k, b"integrity").unwrap();

        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                open(&k, &tampered),
                Err(CryptoError::DecryptionFailed),
                "flip at byte {i} was accepted"
            );
        }
    }

    #[test]
    fn test_truncated_input_fails() {
        let k = key(3);
        assert_eq!(open(&k, &[]), Err(CryptoError::DecryptionFailed));
        assert_eq!(
            open(&k, &[0u8; SEALED_OVERHEAD - 1]),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_known_nonce_layout() {
        let k = key(5);
        let nonce = [0xAB; AEAD_NONCE_SIZE];
        let sealed = seal_with_nonce(&k, &nonce, b"xyz").unwrap();
        assert_eq!(&sealed[..AEAD_NONCE_SIZE], &nonce);
        assert_eq!(open(&k, &sealed).unwrap(), b"xyz");
    }
}
