//! Finite-field Diffie-Hellman over the RFC 3526 2048-bit MODP group.
//!
//! Private exponents are 32 random bytes. Public values and shared secrets
//! travel as 256-byte big-endian integers.

use std::sync::OnceLock;

use num_bigint::BigUint;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{CryptoError, DH_PRIVATE_SIZE, DH_PUBLIC_SIZE, SESSION_KEY_SIZE};

use super::aead::SessionKey;

/// Group generator.
pub const GENERATOR: u32 = 2;

/// RFC 3526 group 14 prime, big-endian.
pub const MODP_2048_PRIME: [u8; DH_PUBLIC_SIZE] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2, 0x21, 0x68, 0xc2, 0x34,
    0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1, 0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67, 0xcc, 0x74,
    0x02, 0x0b, 0xbe, 0xa6, 0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e, 0x34, 0x04, 0xdd,
    0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d, 0xf2, 0x5f, 0x14, 0x37,
    0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45, 0xe4, 0x85, 0xb5, 0x76, 0x62, 0x5e, 0x7e, 0xc6,
    0xf4, 0x4c, 0x42, 0xe9, 0xa6, 0x37, 0xed, 0x6b, 0x0b, 0xff, 0x5c, 0xb6, 0xf4, 0x06, 0xb7, 0xed,
    0xee, 0x38, 0x6b, 0xfb, 0x5a, 0x89, 0x9f, 0xa5, 0xae, 0x9f, 0x24, 0x11, 0x7c, 0x4b, 0x1f, 0xe6,
    0x49, 0x28, 0x66, 0x51, 0xec, 0xe4, 0x5b, 0x3d, 0xc2, 0x00, 0x7c, 0xb8, 0xa1, 0x63, 0xbf, 0x05,
    0x98, 0xda, 0x48, 0x36, 0x1c, 0x55, 0xd3, 0x9a, 0x69, 0x16, 0x3f, 0xa8, 0xfd, 0x24, 0xcf, 0x5f,
    0x83, 0x65, 0x5d, 0x23, 0xdc, 0xa3, 0xad, 0x96, 0x1c, 0x62, 0xf3, 0x56, 0x20, 0x85, 0x52, 0xbb,
    0x9e, 0xd5, 0x29, 0x07, 0x70, 0x96, 0x96, 0x6d, 0x67, 0x0c, 0x35, 0x4e, 0x4a, 0xbc, 0x98, 0x04,
    0xf1, 0x74, 0x6c, 0x08, 0xca, 0x18, 0x21, 0x7c, 0x32, 0x90, 0x5e, 0x46, 0x2e, 0x36, 0xce, 0x3b,
    0xe3, 0x9e, 0x77, 0x2c, 0x18, 0x0e, 0x86, 0x03, 0x9b, 0x27, 0x83, 0xa2, 0xec, 0x07, 0xa2, 0x8f,
    0xb5, 0xc5, 0x5d, 0xf0, 0x6f, 0x4c, 0x52, 0xc9, 0xde, 0x2b, 0xcb, 0xf6, 0x95, 0x58, 0x17, 0x18,
    0x39, 0x95, 0x49, 0x7c, 0xea, 0x95, 0x6a, 0xe5, 0x15, 0xd2, 0x26, 0x18, 0x98, 0xfa, 0x05, 0x10,
    0x15, 0x72, 0x8e, 0x5a, 0x8a, 0xac, 0xaa, 0x68, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

fn prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| BigUint::from_bytes_be(&MODP_2048_PRIME))
}

/// Left-pad a big-endian integer to exactly 256 bytes.
fn to_fixed_be(value: &BigUint) -> [u8; DH_PUBLIC_SIZE] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; DH_PUBLIC_SIZE];
    // Every value here is reduced mod p, so it never exceeds 256 bytes.
    out[DH_PUBLIC_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// A DH private exponent with its public value.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DhKeyPair {
    private: [u8; DH_PRIVATE_SIZE],
    public: [u8; DH_PUBLIC_SIZE],
}

impl DhKeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut private = [0u8; DH_PRIVATE_SIZE];
        OsRng.fill_bytes(&mut private);
        let pair = Self::from_private(private);
        private.zeroize();
        pair
    }

    /// Rebuild a keypair from a stored private exponent.
    pub fn from_private(private: [u8; DH_PRIVATE_SIZE]) -> Self {
        let exponent = BigUint::from_bytes_be(&private);
        let public = BigUint::from(GENERATOR).modpow(&exponent, prime());
        Self {
            private,
            public: to_fixed_be(&public),
        }
    }

    /// Our public value, 256 bytes big-endian.
    pub fn public_value(&self) -> &[u8; DH_PUBLIC_SIZE] {
        &self.public
    }

    /// The private exponent.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn private_bytes(&self) -> &[u8; DH_PRIVATE_SIZE] {
        &self.private
    }

    /// Combine with a peer's public value.
    ///
    /// Rejects peer values outside `[2, p - 2]`, which would force the shared
    /// secret into a trivial subgroup.
    pub fn diffie_hellman(
        &self,
        peer_public: &[u8; DH_PUBLIC_SIZE],
    ) -> Result<SharedSecret, CryptoError> {
        let peer = validate_public_value(peer_public)?;
        let exponent = BigUint::from_bytes_be(&self.private);
        let shared = peer.modpow(&exponent, prime());
        Ok(SharedSecret(to_fixed_be(&shared)))
    }
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public", &hex::encode(&self.public[..8]))
            .finish_non_exhaustive()
    }
}

/// Check that a public value lies in `[2, p - 2]`.
pub fn validate_public_value(value: &[u8; DH_PUBLIC_SIZE]) -> Result<BigUint, CryptoError> {
    let y = BigUint::from_bytes_be(value);
    let upper = prime() - 2u32;
    if y < BigUint::from(2u32) || y > upper {
        return Err(CryptoError::InvalidPublicValue);
    }
    Ok(y)
}

/// Raw DH output, 256 bytes big-endian.
///
/// Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; DH_PUBLIC_SIZE]);

impl SharedSecret {
    /// SHA-256 over the 256-byte big-endian encoding.
    pub fn derive_session_key(&self) -> SessionKey {
        let digest = Sha256::digest(&self.0[..]);
        let mut key = [0u8; SESSION_KEY_SIZE];
        key.copy_from_slice(&digest);
        let session = SessionKey::from_bytes(key);
        key.zeroize();
        session
    }

    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; DH_PUBLIC_SIZE] {
        &self.0
    }
}
