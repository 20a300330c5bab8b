//! Client/relay wire frames and subscription filters.
//!
//! Frames are JSON text messages in the conventional tagged-array relay
//! shape: the first element labels the frame, the rest carry its fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EventId, PadId, RelayEvent, SubId, WireError};

/// A subscription filter. An event matches when every present field does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Event kinds to accept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,
    /// Author keys to accept, lowercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    /// Accepted `d` tag values.
    #[serde(rename = "#d", skip_serializing_if = "Option::is_none")]
    pub d_tags: Option<Vec<String>>,
    /// Accepted `pad` tag values.
    #[serde(rename = "#pad", skip_serializing_if = "Option::is_none")]
    pub pad_tags: Option<Vec<String>>,
    /// Minimum creation time in milliseconds, inclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    /// Maximum number of stored events the relay should return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl Filter {
    /// Start an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept events of this kind.
    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Accept events signed by this author key.
    pub fn author(mut self, public_key: &[u8; 32]) -> Self {
        self.authors
            .get_or_insert_with(Vec::new)
            .push(hex::encode(public_key));
        self
    }

    /// Accept events carrying this `d` tag value.
    pub fn d_tag(mut self, value: &str) -> Self {
        self.d_tags
            .get_or_insert_with(Vec::new)
            .push(value.to_string());
        self
    }

    /// Accept events carrying this `pad` tag value.
    pub fn pad_tag(mut self, pad_id: &PadId) -> Self {
        self.pad_tags
            .get_or_insert_with(Vec::new)
            .push(pad_id.to_string());
        self
    }

    /// Accept events created at or after this time.
    pub fn since_ms(mut self, ms: u64) -> Self {
        self.since = Some(ms);
        self
    }

    /// Cap the number of stored events returned.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether the event satisfies every present constraint.
    ///
    /// `limit` shapes the stored-event query only and is ignored here.
    pub fn matches(&self, event: &RelayEvent) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            let author_hex = hex::encode(event.author);
            if !authors.iter().any(|a| *a == author_hex) {
                return false;
            }
        }
        if let Some(values) = &self.d_tags {
            if !tag_matches(event, "d", values) {
                return false;
            }
        }
        if let Some(values) = &self.pad_tags {
            if !tag_matches(event, "pad", values) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at_ms < since {
                return false;
            }
        }
        true
    }
}

fn tag_matches(event: &RelayEvent, name: &str, accepted: &[String]) -> bool {
    event.tags.iter().any(|tag| {
        tag.name() == Some(name)
            && tag
                .value()
                .map(|v| accepted.iter().any(|a| a == v))
                .unwrap_or(false)
    })
}

/// Frames a client sends to a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Publish an event.
    Publish(RelayEvent),
    /// Open a subscription with one or more filters.
    Subscribe {
        /// Subscription id echoed in matching relay frames.
        sub_id: SubId,
        /// Filters, matched disjunctively by the relay.
        filters: Vec<Filter>,
    },
    /// Close a subscription.
    Unsubscribe {
        /// Subscription to close.
        sub_id: SubId,
    },
}

impl ClientFrame {
    /// Encode to the JSON text form.
    pub fn to_text(&self) -> Result<String, WireError> {
        let value = match self {
            ClientFrame::Publish(event) => Value::Array(vec![
                Value::from("EVENT"),
                serde_json::to_value(event).map_err(WireError::Json)?,
            ]),
            ClientFrame::Subscribe { sub_id, filters } => {
                let mut arr = vec![Value::from("REQ"), Value::from(sub_id.as_str())];
                for filter in filters {
                    arr.push(serde_json::to_value(filter).map_err(WireError::Json)?);
                }
                Value::Array(arr)
            }
            ClientFrame::Unsubscribe { sub_id } => {
                Value::Array(vec![Value::from("CLOSE"), Value::from(sub_id.as_str())])
            }
        };
        serde_json::to_string(&value).map_err(WireError::Json)
    }

    /// Decode from the JSON text form.
    pub fn from_text(text: &str) -> Result<Self, WireError> {
        let arr = parse_array(text)?;
        let label = frame_label(&arr)?;
        match label {
            "EVENT" => {
                let event = arr
                    .get(1)
                    .cloned()
                    .ok_or_else(|| WireError::Frame("EVENT missing event".to_string()))?;
                Ok(ClientFrame::Publish(
                    serde_json::from_value(event).map_err(WireError::Json)?,
                ))
            }
            "REQ" => {
                let sub_id = frame_str(&arr, 1, "REQ missing subscription id")?;
                let mut filters = Vec::new();
                for value in arr.iter().skip(2) {
                    filters.push(serde_json::from_value(value.clone()).map_err(WireError::Json)?);
                }
                Ok(ClientFrame::Subscribe {
                    sub_id: SubId::from_string(sub_id.to_string()),
                    filters,
                })
            }
            "CLOSE" => {
                let sub_id = frame_str(&arr, 1, "CLOSE missing subscription id")?;
                Ok(ClientFrame::Unsubscribe {
                    sub_id: SubId::from_string(sub_id.to_string()),
                })
            }
            other => Err(WireError::Frame(format!("unknown client frame: {other}"))),
        }
    }
}

/// Frames a relay sends to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    /// An event matching one of the subscription's filters.
    Event {
        /// Subscription that matched.
        sub_id: SubId,
        /// The matching event.
        event: RelayEvent,
    },
    /// All stored events for the subscription have been delivered.
    EndOfStored {
        /// Subscription that is now live-only.
        sub_id: SubId,
    },
    /// Publish outcome for an event.
    Accepted {
        /// The event the relay is answering about.
        event_id: EventId,
        /// Whether the relay stored it.
        ok: bool,
        /// Human-readable detail, possibly empty.
        message: String,
    },
    /// Free-form relay notice.
    Notice {
        /// The notice text.
        message: String,
    },
}

impl RelayFrame {
    /// Encode to the JSON text form.
    pub fn to_text(&self) -> Result<String, WireError> {
        let value = match self {
            RelayFrame::Event { sub_id, event } => Value::Array(vec![
                Value::from("EVENT"),
                Value::from(sub_id.as_str()),
                serde_json::to_value(event).map_err(WireError::Json)?,
            ]),
            RelayFrame::EndOfStored { sub_id } => {
                Value::Array(vec![Value::from("EOSE"), Value::from(sub_id.as_str())])
            }
            RelayFrame::Accepted {
                event_id,
                ok,
                message,
            } => Value::Array(vec![
                Value::from("OK"),
                Value::from(event_id.to_string()),
                Value::from(*ok),
                Value::from(message.as_str()),
            ]),
            RelayFrame::Notice { message } => {
                Value::Array(vec![Value::from("NOTICE"), Value::from(message.as_str())])
            }
        };
        serde_json::to_string(&value).map_err(WireError::Json)
    }

    /// Decode from the JSON text form.
    pub fn from_text(text: &str) -> Result<Self, WireError> {
        let arr = parse_array(text)?;
        let label = frame_label(&arr)?;
        match label {
            "EVENT" => {
                let sub_id = frame_str(&arr, 1, "EVENT missing subscription id")?;
                let event = arr
                    .get(2)
                    .cloned()
                    .ok_or_else(|| WireError::Frame("EVENT missing event".to_string()))?;
                Ok(RelayFrame::Event {
                    sub_id: SubId::from_string(sub_id.to_string()),
                    event: serde_json::from_value(event).map_err(WireError::Json)?,
                })
            }
            "EOSE" => {
                let sub_id = frame_str(&arr, 1, "EOSE missing subscription id")?;
                Ok(RelayFrame::EndOfStored {
                    sub_id: SubId::from_string(sub_id.to_string()),
                })
            }
            "OK" => {
                let event_id = EventId::parse(frame_str(&arr, 1, "OK missing event id")?)?;
                let ok = arr
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| WireError::Frame("OK missing outcome".to_string()))?;
                let message = arr
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(RelayFrame::Accepted {
                    event_id,
                    ok,
                    message,
                })
            }
            "NOTICE" => {
                let message = frame_str(&arr, 1, "NOTICE missing message")?;
                Ok(RelayFrame::Notice {
                    message: message.to_string(),
                })
            }
            other => Err(WireError::Frame(format!("unknown relay frame: {other}"))),
        }
    }
}

fn parse_array(text: &str) -> Result<Vec<Value>, WireError> {
    let value: Value = serde_json::from_str(text).map_err(WireError::Json)?;
    match value {
        Value::Array(arr) => Ok(arr),
        _ => Err(WireError::Frame("frame is not a JSON array".to_string())),
    }
}

fn frame_label(arr: &[Value]) -> Result<&str, WireError> {
    arr.first()
        .and_then(Value::as_str)
        .ok_or_else(|| WireError::Frame("frame missing label".to_string()))
}

fn frame_str<'a>(arr: &'a [Value], index: usize, what: &str) -> Result<&'a str, WireError> {
    arr.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| WireError::Frame(what.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Tag, APP_DISCRIMINATOR, KIND_PAD_CONTENT, KIND_PAD_LOGOUT};
    use ed25519_dalek::SigningKey;

    fn sample_event(seed: u8) -> RelayEvent {
        let key = SigningKey::from_bytes(&[seed; 32]);
        RelayEvent::signed(
            KIND_PAD_CONTENT,
            vec![Tag::discriminator(APP_DISCRIMINATOR)],
            "Y2lwaGVydGV4dA".to_string(),
            1_700_000_000_000,
            &key,
        )
        .unwrap()
    }

    // ===== Frame encoding =====

    #[test]
    fn publish_frame_roundtrip() {
        let frame = ClientFrame::Publish(sample_event(1));
        let text = frame.to_text().unwrap();
        assert!(text.starts_with("[\"EVENT\","));
        assert_eq!(ClientFrame::from_text(&text).unwrap(), frame);
    }

    #[test]
    fn subscribe_frame_roundtrip() {
        let frame = ClientFrame::Subscribe {
            sub_id: SubId::from_string("sub-1".to_string()),
            filters: vec![
                Filter::new().kind(KIND_PAD_CONTENT).d_tag(APP_DISCRIMINATOR),
                Filter::new().kind(KIND_PAD_LOGOUT).limit(1),
            ],
        };
        let text = frame.to_text().unwrap();
        assert!(text.starts_with("[\"REQ\",\"sub-1\","));
        assert_eq!(ClientFrame::from_text(&text).unwrap(), frame);
    }

    #[test]
    fn unsubscribe_frame_roundtrip() {
        let frame = ClientFrame::Unsubscribe {
            sub_id: SubId::from_string("sub-2".to_string()),
        };
        let text = frame.to_text().unwrap();
        assert_eq!(text, "[\"CLOSE\",\"sub-2\"]");
        assert_eq!(ClientFrame::from_text(&text).unwrap(), frame);
    }

    #[test]
    fn relay_event_frame_roundtrip() {
        let frame = RelayFrame::Event {
            sub_id: SubId::from_string("sub-3".to_string()),
            event: sample_event(2),
        };
        let text = frame.to_text().unwrap();
        assert_eq!(RelayFrame::from_text(&text).unwrap(), frame);
    }

    #[test]
    fn eose_frame_roundtrip() {
        let frame = RelayFrame::EndOfStored {
            sub_id: SubId::from_string("sub-4".to_string()),
        };
        let text = frame.to_text().unwrap();
        assert_eq!(text, "[\"EOSE\",\"sub-4\"]");
        assert_eq!(RelayFrame::from_text(&text).unwrap(), frame);
    }

    #[test]
    fn ok_frame_roundtrip() {
        let event = sample_event(3);
        let frame = RelayFrame::Accepted {
            event_id: event.id,
            ok: true,
            message: String::new(),
        };
        let text = frame.to_text().unwrap();
        assert_eq!(RelayFrame::from_text(&text).unwrap(), frame);
    }

    #[test]
    fn ok_frame_without_message_decodes() {
        let event = sample_event(4);
        let text = format!("[\"OK\",\"{}\",false]", event.id);
        let frame = RelayFrame::from_text(&text).unwrap();
        assert_eq!(
            frame,
            RelayFrame::Accepted {
                event_id: event.id,
                ok: false,
                message: String::new(),
            }
        );
    }

    #[test]
    fn malformed_frames_rejected() {
        assert!(ClientFrame::from_text("not json").is_err());
        assert!(ClientFrame::from_text("{}").is_err());
        assert!(ClientFrame::from_text("[\"BOGUS\"]").is_err());
        assert!(ClientFrame::from_text("[\"REQ\"]").is_err());
        assert!(RelayFrame::from_text("[\"OK\",\"deadbeef\"]").is_err());
        assert!(RelayFrame::from_text("[42]").is_err());
    }

    // ===== Filter matching =====

    #[test]
    fn filter_matches_kind_and_d_tag() {
        let event = sample_event(5);
        let hit = Filter::new().kind(KIND_PAD_CONTENT).d_tag(APP_DISCRIMINATOR);
        let wrong_kind = Filter::new().kind(KIND_PAD_LOGOUT).d_tag(APP_DISCRIMINATOR);
        let wrong_tag = Filter::new().kind(KIND_PAD_CONTENT).d_tag("elsewhere");
        assert!(hit.matches(&event));
        assert!(!wrong_kind.matches(&event));
        assert!(!wrong_tag.matches(&event));
    }

    #[test]
    fn filter_matches_author() {
        let event = sample_event(6);
        let other = sample_event(7);
        let filter = Filter::new().author(&event.author);
        assert!(filter.matches(&event));
        assert!(!filter.matches(&other));
    }

    #[test]
    fn filter_since_is_inclusive() {
        let event = sample_event(8);
        assert!(Filter::new().since_ms(event.created_at_ms).matches(&event));
        assert!(!Filter::new()
            .since_ms(event.created_at_ms + 1)
            .matches(&event));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&sample_event(9)));
    }

    #[test]
    fn filter_limit_does_not_constrain_matches() {
        let event = sample_event(10);
        assert!(Filter::new().limit(0).matches(&event));
    }

    #[test]
    fn filter_serde_uses_tag_selectors() {
        let filter = Filter::new().kind(KIND_PAD_CONTENT).d_tag("driftpad:x");
        let json = serde_json::to_string(&filter).unwrap();
        assert!(json.contains("\"#d\""));
        assert!(!json.contains("authors"));
        let back: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(filter, back);
    }
}
