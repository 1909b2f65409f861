//! On-disk key material.
//!
//! Two raw big-endian files: a client's cached copy of the responder's
//! public value (256 bytes), and a server's long-term private exponent
//! (32 bytes).

use std::fs;
use std::io;
use std::path::Path;

use crate::core::{CryptoError, QuayError, DH_PRIVATE_SIZE, DH_PUBLIC_SIZE};

use super::dh::{validate_public_value, DhKeyPair};

/// Read a cached peer public value.
///
/// A missing file is `Ok(None)`; a file of the wrong size or holding an
/// invalid group element is an error.
pub fn load_peer_public(path: &Path) -> Result<Option<[u8; DH_PUBLIC_SIZE]>, QuayError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let value: [u8; DH_PUBLIC_SIZE] = bytes.as_slice().try_into().map_err(|_| {
        CryptoError::InvalidKeyMaterial(format!(
            "{}: expected {DH_PUBLIC_SIZE} bytes, found {}",
            path.display(),
            bytes.len()
        ))
    })?;
    validate_public_value(&value)?;
    Ok(Some(value))
}

/// Persist a peer public value for later 0-RTT connects.
pub fn store_peer_public(path: &Path, value: &[u8; DH_PUBLIC_SIZE]) -> Result<(), QuayError> {
    write_file(path, value)?;
    tracing::debug!(path = %path.display(), "cached peer public value");
    Ok(())
}

/// Load the server's long-term keypair, generating and saving one on first run.
pub fn load_or_generate_static_key(path: &Path) -> Result<DhKeyPair, QuayError> {
    match fs::read(path) {
        Ok(bytes) => {
            let private: [u8; DH_PRIVATE_SIZE] = bytes.as_slice().try_into().map_err(|_| {
                CryptoError::InvalidKeyMaterial(format!(
                    "{}: expected {DH_PRIVATE_SIZE} bytes, found {}",
                    path.display(),
                    bytes.len()
                ))
            })?;
            tracing::info!(path = %path.display(), "loaded existing server keypair");
            Ok(DhKeyPair::from_private(private))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let pair = DhKeyPair::generate();
            write_file(path, pair.private_bytes())?;
            tracing::info!(path = %path.display(), "generated new server keypair");
            Ok(pair)
        }
        Err(e) => Err(e.into()),
    }
}

fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}
