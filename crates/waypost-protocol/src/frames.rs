use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypost_core::{Identity, LocationSample, SubscriberId};

use crate::events;

/// Server → Client unsolicited push event.
/// Wire: `{ "type": "event", "event": "location", "payload": {...}, "seq": 42 }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: "event".to_string(),
            event: event.into(),
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
            seq: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// `location` event carrying one published sample and its publish sequence.
    pub fn location(sample: &LocationSample, seq: u64) -> Self {
        Self::new(events::LOCATION, sample).with_seq(seq)
    }

    /// `hello` event sent once the connection's subscription is registered.
    pub fn hello(subscriber: &SubscriberId, identity: Option<&Identity>) -> Self {
        Self::new(
            events::HELLO,
            Hello {
                subscriber: subscriber.to_string(),
                identity: identity.map(|i| i.to_string()),
            },
        )
    }

    /// Serialize to the JSON text sent in a WS text frame.
    pub fn to_text(&self) -> waypost_core::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the payload of a `location` event back into a sample.
    pub fn sample(&self) -> Option<LocationSample> {
        if self.event != events::LOCATION {
            return None;
        }
        self.payload
            .clone()
            .and_then(|p| serde_json::from_value(p).ok())
    }
}

/// Payload of the `hello` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub subscriber: String,
    /// Identity filter in effect, absent when the connection receives everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}
