//! Cryptographic primitives for the verification engine.
//!
//! Three concerns live here:
//!
//! - **Lookup key derivation**: a keyed HMAC-SHA256 digest of the raw
//!   license key scoped to a team. Deterministic, equality-lookup only,
//!   never reversed. The raw key is never used as a search key.
//! - **Challenge signing**: Ed25519 signatures over a caller-supplied
//!   nonce, proving the verdict came from the holder of the team's
//!   private key. Signing only ever happens on a fully valid verdict.
//! - **At-rest encryption**: AES-256-GCM for the stored raw license key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use rand::rngs::OsRng;
use rand::TryRngCore;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use ring::hmac;
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair};

use crate::errors::{EngineError, EngineResult};

/// AES-256 key size in bytes.
pub const STORAGE_KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96-bit).
const NONCE_SIZE: usize = 12;

/// Derive the lookup key for a raw license key within a team.
///
/// The digest is `HMAC-SHA256(secret, "{raw}:{team_id}")`, hex-encoded.
/// Same inputs always produce the same output, so it can serve as the only
/// on-disk search key for licenses.
pub fn lookup_key(raw_license_key: &str, team_id: &str, secret: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, format!("{raw_license_key}:{team_id}").as_bytes());
    hex::encode(tag.as_ref())
}

/// Generate a fresh Ed25519 key pair for a team.
///
/// Returns `(pkcs8_private_key, public_key)`. The private key document is
/// what gets stored; the public key is handed to clients for signature
/// verification.
pub fn generate_signing_key_pair() -> EngineResult<(Vec<u8>, Vec<u8>)> {
    let rng = SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
        .map_err(|_| EngineError::CryptoError("failed to generate signing key pair".to_string()))?;
    let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
        .map_err(|e| EngineError::CryptoError(format!("generated key pair is unusable: {e}")))?;

    Ok((
        pkcs8.as_ref().to_vec(),
        key_pair.public_key().as_ref().to_vec(),
    ))
}

/// Sign a challenge nonce with a team's private key.
///
/// Returns the hex-encoded Ed25519 signature over the challenge bytes.
/// An undecodable private key is an infrastructure failure, not a policy
/// rejection, and must surface as such.
pub fn sign_challenge(challenge: &str, pkcs8_private_key: &[u8]) -> EngineResult<String> {
    let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8_private_key)
        .map_err(|e| EngineError::CryptoError(format!("invalid signing key: {e}")))?;
    let signature = key_pair.sign(challenge.as_bytes());
    Ok(hex::encode(signature.as_ref()))
}

/// Verify a hex-encoded challenge signature against a public key.
///
/// The server never needs this on the request path; it exists so clients
/// (and our tests) can confirm a verdict's provenance.
pub fn verify_challenge_signature(challenge: &str, signature_hex: &str, public_key: &[u8]) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let public_key = signature::UnparsedPublicKey::new(&signature::ED25519, public_key);
    public_key.verify(challenge.as_bytes(), &signature).is_ok()
}

/// Generate a new random AES-256 storage key.
///
/// Caller is responsible for storing this safely.
pub fn generate_storage_key() -> [u8; STORAGE_KEY_SIZE] {
    let mut key = [0u8; STORAGE_KEY_SIZE];
    let mut rng = OsRng;

    // If OsRng fails here, the environment is badly broken → hard panic is acceptable.
    rng.try_fill_bytes(&mut key)
        .expect("OsRng failed to generate storage key");

    key
}

/// Encrypt a raw license key for at-rest storage.
///
/// Output is base64 of `[nonce (12 bytes)] || [ciphertext+tag]`.
pub fn encrypt_license_key(raw_license_key: &str, key: &[u8]) -> EngineResult<String> {
    if key.len() != STORAGE_KEY_SIZE {
        return Err(EngineError::CryptoError(format!(
            "invalid storage key length: expected {} bytes, got {}",
            STORAGE_KEY_SIZE,
            key.len()
        )));
    }

    let key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(key);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    let mut rng = OsRng;
    rng.try_fill_bytes(&mut nonce_bytes)
        .expect("OsRng failed to generate nonce");
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(nonce, raw_license_key.as_bytes())
        .map_err(|e| EngineError::CryptoError(format!("encryption failed: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.append(&mut ciphertext);

    Ok(B64.encode(output))
}

/// Decrypt a license key previously produced by `encrypt_license_key`.
pub fn decrypt_license_key(ciphertext_b64: &str, key: &[u8]) -> EngineResult<String> {
    if key.len() != STORAGE_KEY_SIZE {
        return Err(EngineError::CryptoError(format!(
            "invalid storage key length: expected {} bytes, got {}",
            STORAGE_KEY_SIZE,
            key.len()
        )));
    }

    let decoded = B64
        .decode(ciphertext_b64)
        .map_err(|e| EngineError::CryptoError(format!("base64 decode failed: {e}")))?;

    if decoded.len() <= NONCE_SIZE {
        return Err(EngineError::CryptoError("ciphertext too short".to_string()));
    }

    let (nonce_bytes, ct) = decoded.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(key);

    let plaintext = cipher
        .decrypt(nonce, ct)
        .map_err(|e| EngineError::CryptoError(format!("decryption failed: {e}")))?;

    String::from_utf8(plaintext)
        .map_err(|e| EngineError::CryptoError(format!("decrypted key is not UTF-8: {e}")))
}
