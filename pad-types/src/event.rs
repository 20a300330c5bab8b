//! Signed relay events.
//!
//! Every message that crosses a relay is a [`RelayEvent`]: a kind, a tag
//! list, a content string, an author key, and an Ed25519 signature over the
//! SHA-256 of the event's canonical form. Relays store and forward events
//! without understanding them; all meaning lives in the kind and tags.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::{ClientId, EventId, PadId, WireError};

/// Kind of the encrypted pad content event (replaceable range).
pub const KIND_PAD_CONTENT: u16 = 31180;

/// Kind of the relay-set announcement event (replaceable range).
pub const KIND_PAD_RELAYS: u16 = 31181;

/// Kind of the cross-device logout signal (ephemeral range).
pub const KIND_PAD_LOGOUT: u16 = 21180;

/// Kind of peers' preferred-relay lists, read during discovery.
pub const KIND_RELAY_PREFS: u16 = 10002;

/// Kind of network-wide relay directory entries, read during discovery.
pub const KIND_RELAY_DIRECTORY: u16 = 30166;

/// Discriminator value shared by all content events of this application.
pub const APP_DISCRIMINATOR: &str = "driftpad";

/// Fixed content of a logout signal.
pub const LOGOUT_CONTENT: &str = "logout";

/// A single event tag: a name followed by zero or more values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// `d` tag carrying a replaceable-event discriminator.
    pub fn discriminator(value: &str) -> Self {
        Self(vec!["d".to_string(), value.to_string()])
    }

    /// `pad` tag carrying a pad identifier for server-side filtering.
    pub fn pad(pad_id: &PadId) -> Self {
        Self(vec!["pad".to_string(), pad_id.to_string()])
    }

    /// `r` tag advertising a relay URL.
    pub fn relay(url: &str) -> Self {
        Self(vec!["r".to_string(), url.to_string()])
    }

    /// `r` tag advertising a relay URL qualified as read or write.
    pub fn relay_with_role(url: &str, role: &str) -> Self {
        Self(vec!["r".to_string(), url.to_string(), role.to_string()])
    }

    /// `client` tag naming the publishing engine instance.
    pub fn client(client_id: &ClientId) -> Self {
        Self(vec!["client".to_string(), client_id.to_string()])
    }

    /// The tag's name, if present.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The tag's first value, if present.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// A signed event as it travels between client and relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// SHA-256 of the canonical signing form
    pub id: EventId,
    /// Author's Ed25519 verifying key
    #[serde(with = "hex32")]
    pub author: [u8; 32],
    /// Client wall-clock milliseconds at creation
    pub created_at_ms: u64,
    /// Application event kind
    pub kind: u16,
    /// Tag list
    pub tags: Vec<Tag>,
    /// Content string (ciphertext, relay list payload, or fixed literal)
    pub content: String,
    /// Ed25519 signature over the id bytes
    #[serde(with = "hex64")]
    pub sig: [u8; 64],
}

impl RelayEvent {
    /// Build and sign a new event.
    pub fn signed(
        kind: u16,
        tags: Vec<Tag>,
        content: String,
        created_at_ms: u64,
        key: &SigningKey,
    ) -> Result<Self, WireError> {
        let author = key.verifying_key().to_bytes();
        let canonical = signing_bytes(&author, created_at_ms, kind, &tags, &content)?;
        let id = EventId::digest(&canonical);
        let sig = key.sign(id.as_bytes()).to_bytes();
        Ok(Self {
            id,
            author,
            created_at_ms,
            kind,
            tags,
            content,
            sig,
        })
    }

    /// Check the event's id and signature.
    ///
    /// Returns false for any failure: a non-canonical id, an author key
    /// that is not a valid curve point, or a bad signature.
    pub fn verify(&self) -> bool {
        let Ok(canonical) = signing_bytes(
            &self.author,
            self.created_at_ms,
            self.kind,
            &self.tags,
            &self.content,
        ) else {
            return false;
        };
        if EventId::digest(&canonical) != self.id {
            return false;
        }
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.author) else {
            return false;
        };
        let sig = Signature::from_bytes(&self.sig);
        verifying_key.verify(self.id.as_bytes(), &sig).is_ok()
    }

    /// The pad identifier derived from this event's author key.
    pub fn author_pad_id(&self) -> PadId {
        PadId::from_public_key(&self.author)
    }

    /// First value of the first tag with the given name.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name() == Some(name))
            .and_then(Tag::value)
    }

    /// All relay URLs advertised in `r` tags, in tag order.
    pub fn relay_urls(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter(|t| t.name() == Some("r"))
            .filter_map(Tag::value)
            .map(str::to_string)
            .collect()
    }
}

/// The canonical signing form: a JSON array with a fixed field order.
fn signing_bytes(
    author: &[u8; 32],
    created_at_ms: u64,
    kind: u16,
    tags: &[Tag],
    content: &str,
) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(&(0u8, hex::encode(author), created_at_ms, kind, tags, content))
        .map_err(WireError::Json)
}

mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let v = hex::decode(&s).map_err(serde::de::Error::custom)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

mod hex64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 64], D::Error> {
        let s = String::deserialize(deserializer)?;
        let v = hex::decode(&s).map_err(serde::de::Error::custom)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn signed_event_verifies() {
        let key = test_key(1);
        let event = RelayEvent::signed(
            KIND_PAD_CONTENT,
            vec![Tag::discriminator(APP_DISCRIMINATOR)],
            "ciphertext".to_string(),
            1_700_000_000_000,
            &key,
        )
        .unwrap();
        assert!(event.verify());
    }

    #[test]
    fn tampered_content_fails_verification() {
        let key = test_key(2);
        let mut event = RelayEvent::signed(
            KIND_PAD_CONTENT,
            vec![],
            "original".to_string(),
            1_700_000_000_000,
            &key,
        )
        .unwrap();
        event.content = "altered".to_string();
        assert!(!event.verify());
    }

    #[test]
    fn tampered_timestamp_fails_verification() {
        let key = test_key(3);
        let mut event =
            RelayEvent::signed(KIND_PAD_LOGOUT, vec![], LOGOUT_CONTENT.to_string(), 1000, &key)
                .unwrap();
        event.created_at_ms += 1;
        assert!(!event.verify());
    }

    #[test]
    fn foreign_signature_fails_verification() {
        let key = test_key(4);
        let other = test_key(5);
        let mut event =
            RelayEvent::signed(KIND_PAD_CONTENT, vec![], "text".to_string(), 1000, &key).unwrap();
        // Replace the author without re-signing.
        event.author = other.verifying_key().to_bytes();
        assert!(!event.verify());
    }

    #[test]
    fn author_pad_id_matches_key_prefix() {
        let key = test_key(6);
        let event =
            RelayEvent::signed(KIND_PAD_CONTENT, vec![], String::new(), 1, &key).unwrap();
        let expected = PadId::from_public_key(&key.verifying_key().to_bytes());
        assert_eq!(event.author_pad_id(), expected);
    }

    #[test]
    fn tag_value_finds_first_match() {
        let key = test_key(7);
        let pad_id = PadId::from_public_key(&key.verifying_key().to_bytes());
        let event = RelayEvent::signed(
            KIND_PAD_RELAYS,
            vec![
                Tag::discriminator("driftpad:abc"),
                Tag::pad(&pad_id),
                Tag::relay("wss://a.example"),
                Tag::relay_with_role("wss://b.example", "write"),
            ],
            String::new(),
            1,
            &key,
        )
        .unwrap();
        assert_eq!(event.tag_value("d"), Some("driftpad:abc"));
        assert_eq!(event.tag_value("pad"), Some(pad_id.to_string().as_str()));
        assert_eq!(
            event.relay_urls(),
            vec!["wss://a.example".to_string(), "wss://b.example".to_string()]
        );
    }

    #[test]
    fn event_json_roundtrip() {
        let key = test_key(8);
        let event = RelayEvent::signed(
            KIND_PAD_CONTENT,
            vec![Tag::discriminator(APP_DISCRIMINATOR), Tag::client(&ClientId::new())],
            "YWJjZGVm".to_string(),
            1_712_345_678_901,
            &key,
        )
        .unwrap();
        let json = serde_json::to_string(&event).unwrap();
        let back: RelayEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
        assert!(back.verify());
    }

    #[test]
    fn event_json_uses_hex_strings() {
        let key = test_key(9);
        let event =
            RelayEvent::signed(KIND_PAD_CONTENT, vec![], String::new(), 1, &key).unwrap();
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert!(value["author"].is_string());
        assert!(value["sig"].is_string());
        assert_eq!(value["author"].as_str().unwrap().len(), 64);
        assert_eq!(value["sig"].as_str().unwrap().len(), 128);
    }

    #[test]
    fn distinct_inputs_yield_distinct_ids() {
        let key = test_key(10);
        let a = RelayEvent::signed(KIND_PAD_CONTENT, vec![], "x".to_string(), 1, &key).unwrap();
        let b = RelayEvent::signed(KIND_PAD_CONTENT, vec![], "y".to_string(), 1, &key).unwrap();
        let c = RelayEvent::signed(KIND_PAD_CONTENT, vec![], "x".to_string(), 2, &key).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }
}
