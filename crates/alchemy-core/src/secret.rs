//! Versioned symmetric encryption for secret values
//!
//! Two wire formats coexist:
//!
//! - `v1:` (legacy) — key is the BLAKE3 hash of the passphrase, payload
//!   is `base64(nonce ‖ ciphertext)`. Data without a recognized prefix
//!   predates versioning and is treated as v1.
//! - `v2:` (current) — a random 32-byte salt is mixed into a BLAKE3
//!   subkey derivation, payload is `base64(salt ‖ nonce ‖ ciphertext)`.
//!
//! New encryption always emits v2; v1 exists only to decrypt previously
//! persisted secrets. There is no bulk re-encryption: reading and
//! re-writing the owning resource migrates its secrets through the
//! normal codec round-trip.

use crate::error::{CoreError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;

const V1_PREFIX: &str = "v1:";
const V2_PREFIX: &str = "v2:";

/// Derivation context for v2 subkeys
const KDF_CONTEXT: &str = "alchemy";
/// Subkey index within the context
const KDF_INDEX: u8 = 1;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag
const TAG_LEN: usize = 16;

/// Symmetric cipher for single string secrets, keyed by a passphrase.
pub struct SecretCipher {
    /// BLAKE3 hash of the passphrase. Doubles as the v1 key and as the
    /// master key for v2 subkey derivation.
    master: [u8; 32],
}

impl SecretCipher {
    pub fn new(passphrase: &str) -> Self {
        Self {
            master: *blake3::hash(passphrase.as_bytes()).as_bytes(),
        }
    }

    /// Encrypt a plaintext secret. Always emits the v2 format.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let key = self.derive_v2_key(&salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CoreError::Encryption("AEAD seal failed".to_string()))?;

        let mut payload = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&salt);
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", V2_PREFIX, BASE64.encode(payload)))
    }

    /// Decrypt a secret, dispatching on its version prefix.
    pub fn decrypt(&self, data: &str) -> Result<String> {
        if let Some(rest) = data.strip_prefix(V2_PREFIX) {
            self.decrypt_v2(rest)
        } else if let Some(rest) = data.strip_prefix(V1_PREFIX) {
            self.decrypt_v1(rest)
        } else {
            // Unprefixed data predates versioning
            self.decrypt_v1(data)
        }
    }

    fn decrypt_v1(&self, encoded: &str) -> Result<String> {
        let payload = decode_base64(encoded)?;
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(CoreError::Decryption("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.master));
        open(&cipher, nonce, ciphertext)
    }

    fn decrypt_v2(&self, encoded: &str) -> Result<String> {
        let payload = decode_base64(encoded)?;
        if payload.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(CoreError::Decryption("ciphertext too short".to_string()));
        }
        let (salt, rest) = payload.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_v2_key(salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        open(&cipher, nonce, ciphertext)
    }

    /// Derive the v2 subkey: `derive_key(context, master ‖ salt ‖ index)`.
    fn derive_v2_key(&self, salt: &[u8]) -> [u8; 32] {
        let mut material = Vec::with_capacity(self.master.len() + salt.len() + 1);
        material.extend_from_slice(&self.master);
        material.extend_from_slice(salt);
        material.push(KDF_INDEX);
        blake3::derive_key(KDF_CONTEXT, &material)
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(encoded)
        .map_err(|e| CoreError::Decryption(format!("malformed base64 payload: {e}")))
}

fn open(cipher: &Aes256Gcm, nonce: &[u8], ciphertext: &[u8]) -> Result<String> {
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            CoreError::Decryption(
                "authentication failed (wrong passphrase or corrupt ciphertext)".to_string(),
            )
        })?;
    String::from_utf8(plaintext)
        .map_err(|_| CoreError::Decryption("plaintext is not valid UTF-8".to_string()))
}
