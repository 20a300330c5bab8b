//! Session vault: encrypted storage for the pad signing key.
//!
//! The signing key never touches disk in the clear. It is sealed with
//! ChaCha20-Poly1305 under a key held by a [`KeyStore`], and the sealed
//! record carries an integrity tag recomputed on every read; a record
//! that fails the check is treated as absent, never repaired.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use pad_core::SecretSeed;
use pad_types::PadId;

use crate::error::ClientError;
use crate::store::LocalStore;

const SESSION_FILE: &str = "session.json";
const KEYRING_FILE: &str = "keyring.json";

/// Vault AEAD nonce length in bytes.
const IV_LEN: usize = 12;

/// Opaque name of a key inside a [`KeyStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyHandle(String);

impl KeyHandle {
    fn random() -> Self {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(hex::encode(bytes))
    }

    /// The handle's string form, as persisted in session records.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host key-management capability.
///
/// Raw key bytes never cross this API: callers hold handles and ask the
/// store to seal or open on their behalf.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Create a new key and return its handle.
    async fn generate(&self) -> Result<KeyHandle, ClientError>;

    /// AEAD-encrypt `plaintext` with the named key.
    async fn seal(
        &self,
        handle: &KeyHandle,
        nonce: &[u8; IV_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, ClientError>;

    /// AEAD-decrypt `ciphertext` with the named key. Any failure, a
    /// missing key included, reads as `None`.
    async fn open(
        &self,
        handle: &KeyHandle,
        nonce: &[u8; IV_LEN],
        ciphertext: &[u8],
    ) -> Option<Vec<u8>>;

    /// Destroy the named key. Discarding an unknown handle is not an
    /// error.
    async fn discard(&self, handle: &KeyHandle) -> Result<(), ClientError>;
}

/// Software keystore.
///
/// Keys live in an owner-readable file under the local store; a platform
/// keystore implementation would hold them in hardware instead. Either
/// way the raw bytes stay behind the [`KeyStore`] API and are zeroed in
/// memory when dropped.
pub struct SoftKeyStore {
    store: Arc<LocalStore>,
    keys: Mutex<HashMap<String, Zeroizing<[u8; 32]>>>,
}

impl SoftKeyStore {
    /// Load the keyring from the store, creating an empty one if absent.
    pub async fn load(store: Arc<LocalStore>) -> Result<Self, ClientError> {
        let raw: Option<HashMap<String, String>> = store.read_json(KEYRING_FILE).await?;
        let mut keys = HashMap::new();
        for (handle, encoded) in raw.unwrap_or_default() {
            match decode_key(&encoded) {
                Some(key) => {
                    keys.insert(handle, Zeroizing::new(key));
                }
                None => {
                    tracing::warn!(handle = %handle, "dropping malformed keyring entry");
                }
            }
        }
        Ok(Self {
            store,
            keys: Mutex::new(keys),
        })
    }

    async fn persist(&self, keys: &HashMap<String, Zeroizing<[u8; 32]>>) -> Result<(), ClientError> {
        let raw: HashMap<&String, String> = keys
            .iter()
            .map(|(handle, key)| (handle, hex::encode(&key[..])))
            .collect();
        self.store.write_json(KEYRING_FILE, &raw).await
    }
}

fn decode_key(encoded: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(encoded).ok()?;
    bytes.try_into().ok()
}

#[async_trait]
impl KeyStore for SoftKeyStore {
    async fn generate(&self) -> Result<KeyHandle, ClientError> {
        let mut key = [0u8; 32];
        getrandom::getrandom(&mut key).expect("getrandom failed");
        let handle = KeyHandle::random();
        let mut keys = self.keys.lock().await;
        keys.insert(handle.as_str().to_string(), Zeroizing::new(key));
        self.persist(&keys).await?;
        Ok(handle)
    }

    async fn seal(
        &self,
        handle: &KeyHandle,
        nonce: &[u8; IV_LEN],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, ClientError> {
        let keys = self.keys.lock().await;
        let key = keys
            .get(handle.as_str())
            .ok_or_else(|| ClientError::KeyStore(format!("unknown key handle {handle}")))?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
            .map_err(|e| ClientError::Crypto(format!("bad key length: {e}")))?;
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|e| ClientError::Crypto(format!("vault encryption failed: {e}")))
    }

    async fn open(
        &self,
        handle: &KeyHandle,
        nonce: &[u8; IV_LEN],
        ciphertext: &[u8],
    ) -> Option<Vec<u8>> {
        let keys = self.keys.lock().await;
        let key = keys.get(handle.as_str())?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key[..]).ok()?;
        cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
    }

    async fn discard(&self, handle: &KeyHandle) -> Result<(), ClientError> {
        let mut keys = self.keys.lock().await;
        keys.remove(handle.as_str());
        self.persist(&keys).await
    }
}

/// The persisted session record.
///
/// `created_at_ms` is optional on read so records written before the
/// field existed parse instead of erroring; they then fail the integrity
/// check, which covers the field, and read as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Pad this session writes to.
    pub pad_id: PadId,
    /// Keystore handle of the key sealing the ciphertext.
    pub key_handle: KeyHandle,
    /// AEAD nonce, hex.
    pub iv: String,
    /// Sealed signing-key seed, hex.
    pub ciphertext: String,
    /// When the session was established, unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_ms: Option<u64>,
    /// Hash binding every field above together, hex.
    pub integrity_tag: String,
}

impl SessionRecord {
    fn compute_tag(pad_id: &PadId, created_at_ms: u64, iv: &[u8], ciphertext: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(pad_id.to_string().as_bytes());
        hasher.update(created_at_ms.to_be_bytes());
        hasher.update(iv);
        hasher.update(ciphertext);
        hex::encode(hasher.finalize())
    }

    /// Recompute the integrity tag and compare. A record missing
    /// `created_at_ms` can never verify.
    pub fn verify_integrity(&self) -> bool {
        let Some(created_at_ms) = self.created_at_ms else {
            return false;
        };
        let Ok(iv) = hex::decode(&self.iv) else {
            return false;
        };
        let Ok(ciphertext) = hex::decode(&self.ciphertext) else {
            return false;
        };
        self.integrity_tag == Self::compute_tag(&self.pad_id, created_at_ms, &iv, &ciphertext)
    }
}

/// Encrypted storage for the active session's signing key.
pub struct SessionVault<K: KeyStore> {
    store: Arc<LocalStore>,
    keystore: K,
}

impl<K: KeyStore> SessionVault<K> {
    /// Build a vault over a store and keystore.
    pub fn new(store: Arc<LocalStore>, keystore: K) -> Self {
        Self { store, keystore }
    }

    /// Seal a signing-key seed into a fresh session, replacing any
    /// existing one. The previous session's vault key is destroyed.
    pub async fn create_session(
        &self,
        pad_id: &PadId,
        seed: &SecretSeed,
        created_at_ms: u64,
    ) -> Result<SessionRecord, ClientError> {
        if let Ok(Some(old)) = self.store.read_json::<SessionRecord>(SESSION_FILE).await {
            let _ = self.keystore.discard(&old.key_handle).await;
        }

        let handle = self.keystore.generate().await?;
        let mut iv = [0u8; IV_LEN];
        getrandom::getrandom(&mut iv).expect("getrandom failed");
        let ciphertext = self.keystore.seal(&handle, &iv, seed.as_bytes()).await?;
        let integrity_tag = SessionRecord::compute_tag(pad_id, created_at_ms, &iv, &ciphertext);
        let record = SessionRecord {
            pad_id: *pad_id,
            key_handle: handle,
            iv: hex::encode(iv),
            ciphertext: hex::encode(&ciphertext),
            created_at_ms: Some(created_at_ms),
            integrity_tag,
        };
        self.store.write_json(SESSION_FILE, &record).await?;
        Ok(record)
    }

    /// The current session record, if present and intact.
    pub async fn session(&self) -> Option<SessionRecord> {
        let record: SessionRecord = self.store.read_json(SESSION_FILE).await.ok().flatten()?;
        if record.verify_integrity() {
            Some(record)
        } else {
            tracing::warn!("session record failed integrity check, treating as absent");
            None
        }
    }

    /// Unseal the signing-key seed for `pad_id`. `None` when there is no
    /// session, the session belongs to another pad, or the record fails
    /// its integrity check.
    pub async fn secret_key(&self, pad_id: &PadId) -> Option<SecretSeed> {
        let record = self.session().await?;
        if record.pad_id != *pad_id {
            return None;
        }
        let iv_bytes = hex::decode(&record.iv).ok()?;
        let iv: [u8; IV_LEN] = iv_bytes.try_into().ok()?;
        let ciphertext = hex::decode(&record.ciphertext).ok()?;
        let plaintext = Zeroizing::new(self.keystore.open(&record.key_handle, &iv, &ciphertext).await?);
        if plaintext.len() != 32 {
            return None;
        }
        let mut seed_bytes = [0u8; 32];
        seed_bytes.copy_from_slice(&plaintext);
        Some(SecretSeed::from_bytes(seed_bytes))
    }

    /// Destroy the session record and its vault key.
    pub async fn clear(&self) -> Result<(), ClientError> {
        // Read raw rather than verified: an orphaned key should be
        // discarded even when the record's tag is broken.
        if let Ok(Some(record)) = self.store.read_json::<SessionRecord>(SESSION_FILE).await {
            let _ = self.keystore.discard(&record.key_handle).await;
        }
        self.store.remove(SESSION_FILE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn vault_in(dir: &std::path::Path) -> SessionVault<SoftKeyStore> {
        let store = Arc::new(LocalStore::open(dir.join("store")).await.unwrap());
        let keystore = SoftKeyStore::load(store.clone()).await.unwrap();
        SessionVault::new(store, keystore)
    }

    fn pad_and_seed(seed_byte: u8) -> (PadId, SecretSeed) {
        let seed = SecretSeed::from_bytes([seed_byte; 32]);
        let key = ed25519_dalek::SigningKey::from_bytes(seed.as_bytes());
        let pad_id = PadId::from_public_key(&key.verifying_key().to_bytes());
        (pad_id, seed)
    }

    // ===== Round trips =====

    #[tokio::test]
    async fn created_session_unseals_to_the_same_seed() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path()).await;
        let (pad_id, seed) = pad_and_seed(1);

        vault.create_session(&pad_id, &seed, 1_000).await.unwrap();
        let unsealed = vault.secret_key(&pad_id).await.expect("session exists");
        assert_eq!(unsealed, seed);
    }

    #[tokio::test]
    async fn session_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (pad_id, seed) = pad_and_seed(2);
        {
            let vault = vault_in(dir.path()).await;
            vault.create_session(&pad_id, &seed, 1_000).await.unwrap();
        }
        // Fresh store and keystore, same directory.
        let vault = vault_in(dir.path()).await;
        let unsealed = vault.secret_key(&pad_id).await.expect("session persisted");
        assert_eq!(unsealed, seed);
    }

    #[tokio::test]
    async fn secret_key_for_another_pad_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path()).await;
        let (pad_id, seed) = pad_and_seed(3);
        let (other_pad, _) = pad_and_seed(4);

        vault.create_session(&pad_id, &seed, 1_000).await.unwrap();
        assert!(vault.secret_key(&other_pad).await.is_none());
    }

    #[tokio::test]
    async fn creating_a_session_replaces_the_previous_one() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path()).await;
        let (pad_a, seed_a) = pad_and_seed(5);
        let (pad_b, seed_b) = pad_and_seed(6);

        let first = vault.create_session(&pad_a, &seed_a, 1_000).await.unwrap();
        vault.create_session(&pad_b, &seed_b, 2_000).await.unwrap();

        assert!(vault.secret_key(&pad_a).await.is_none());
        assert_eq!(vault.secret_key(&pad_b).await, Some(seed_b));
        // The first session's vault key was destroyed, not orphaned.
        let iv: [u8; IV_LEN] = hex::decode(&first.iv).unwrap().try_into().unwrap();
        let ciphertext = hex::decode(&first.ciphertext).unwrap();
        assert!(vault
            .keystore
            .open(&first.key_handle, &iv, &ciphertext)
            .await
            .is_none());
    }

    // ===== Integrity =====

    #[tokio::test]
    async fn tampered_ciphertext_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path()).await;
        let (pad_id, seed) = pad_and_seed(7);
        let mut record = vault.create_session(&pad_id, &seed, 1_000).await.unwrap();

        let flipped = if record.ciphertext.starts_with('0') { "1" } else { "0" };
        record.ciphertext.replace_range(0..1, flipped);
        vault.store.write_json(SESSION_FILE, &record).await.unwrap();

        assert!(vault.session().await.is_none());
        assert!(vault.secret_key(&pad_id).await.is_none());
    }

    #[tokio::test]
    async fn tampered_timestamp_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path()).await;
        let (pad_id, seed) = pad_and_seed(8);
        let mut record = vault.create_session(&pad_id, &seed, 1_000).await.unwrap();

        record.created_at_ms = Some(999_999);
        vault.store.write_json(SESSION_FILE, &record).await.unwrap();

        assert!(vault.secret_key(&pad_id).await.is_none());
    }

    #[tokio::test]
    async fn record_missing_created_at_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path()).await;
        let (pad_id, seed) = pad_and_seed(9);
        let mut record = vault.create_session(&pad_id, &seed, 1_000).await.unwrap();

        // Simulate a record written before timestamps were recorded.
        record.created_at_ms = None;
        vault.store.write_json(SESSION_FILE, &record).await.unwrap();

        assert!(vault.session().await.is_none());
    }

    #[tokio::test]
    async fn tampered_tag_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path()).await;
        let (pad_id, seed) = pad_and_seed(10);
        let mut record = vault.create_session(&pad_id, &seed, 1_000).await.unwrap();

        record.integrity_tag = "00".repeat(32);
        vault.store.write_json(SESSION_FILE, &record).await.unwrap();

        assert!(vault.session().await.is_none());
    }

    // ===== Clearing =====

    #[tokio::test]
    async fn clear_removes_session_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path()).await;
        let (pad_id, seed) = pad_and_seed(11);
        let record = vault.create_session(&pad_id, &seed, 1_000).await.unwrap();

        vault.clear().await.unwrap();
        assert!(vault.session().await.is_none());
        assert!(vault.secret_key(&pad_id).await.is_none());

        let iv: [u8; IV_LEN] = hex::decode(&record.iv).unwrap().try_into().unwrap();
        let ciphertext = hex::decode(&record.ciphertext).unwrap();
        assert!(vault
            .keystore
            .open(&record.key_handle, &iv, &ciphertext)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn clear_without_a_session_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path()).await;
        vault.clear().await.unwrap();
    }
}
