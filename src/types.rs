use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Flat event record as posted by the tracking snippet.
///
/// Every field is a string and absent fields read as the empty string, so an
/// `InboundEvent` never distinguishes "missing" from "empty".
///
/// Decoding is lenient in the same ways as the tracking endpoint it
/// replaces: keys match case-insensitively, a repeated key overwrites the
/// earlier value, `null` leaves a field untouched, unknown keys are ignored,
/// and a top-level `null` is an empty event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InboundEvent {
    #[serde(rename = "ev")]
    pub event: String,
    #[serde(rename = "et")]
    pub event_type: String,
    #[serde(rename = "id")]
    pub app_id: String,
    #[serde(rename = "uid")]
    pub user_id: String,
    #[serde(rename = "mid")]
    pub message_id: String,
    #[serde(rename = "t")]
    pub page_title: String,
    #[serde(rename = "p")]
    pub page_url: String,
    #[serde(rename = "l")]
    pub browser_language: String,
    #[serde(rename = "sc")]
    pub screen_size: String,

    #[serde(rename = "atrk1")]
    pub attr1_key: String,
    #[serde(rename = "atrv1")]
    pub attr1_value: String,
    #[serde(rename = "atrt1")]
    pub attr1_type: String,
    #[serde(rename = "atrk2")]
    pub attr2_key: String,
    #[serde(rename = "atrv2")]
    pub attr2_value: String,
    #[serde(rename = "atrt2")]
    pub attr2_type: String,

    #[serde(rename = "uatrk1")]
    pub trait1_key: String,
    #[serde(rename = "uatrv1")]
    pub trait1_value: String,
    #[serde(rename = "uatrt1")]
    pub trait1_type: String,
    #[serde(rename = "uatrk2")]
    pub trait2_key: String,
    #[serde(rename = "uatrv2")]
    pub trait2_value: String,
    #[serde(rename = "uatrt2")]
    pub trait2_type: String,
    #[serde(rename = "uatrk3")]
    pub trait3_key: String,
    #[serde(rename = "uatrv3")]
    pub trait3_value: String,
    #[serde(rename = "uatrt3")]
    pub trait3_type: String,
}

impl InboundEvent {
    /// Decode the first JSON value in a request body.
    ///
    /// Anything after the first complete value is ignored. An empty or
    /// whitespace-only body is an error.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        match serde_json::Deserializer::from_slice(body)
            .into_iter::<InboundEvent>()
            .next()
        {
            Some(result) => result,
            None => Err(<serde_json::Error as de::Error>::custom("empty request body")),
        }
    }

    /// Field addressed by a wire key. Wire names are all lower case, so
    /// folding the key gives a case-insensitive match.
    fn field_mut(&mut self, key: &str) -> Option<&mut String> {
        let field = match key.to_ascii_lowercase().as_str() {
            "ev" => &mut self.event,
            "et" => &mut self.event_type,
            "id" => &mut self.app_id,
            "uid" => &mut self.user_id,
            "mid" => &mut self.message_id,
            "t" => &mut self.page_title,
            "p" => &mut self.page_url,
            "l" => &mut self.browser_language,
            "sc" => &mut self.screen_size,
            "atrk1" => &mut self.attr1_key,
            "atrv1" => &mut self.attr1_value,
            "atrt1" => &mut self.attr1_type,
            "atrk2" => &mut self.attr2_key,
            "atrv2" => &mut self.attr2_value,
            "atrt2" => &mut self.attr2_type,
            "uatrk1" => &mut self.trait1_key,
            "uatrv1" => &mut self.trait1_value,
            "uatrt1" => &mut self.trait1_type,
            "uatrk2" => &mut self.trait2_key,
            "uatrv2" => &mut self.trait2_value,
            "uatrt2" => &mut self.trait2_type,
            "uatrk3" => &mut self.trait3_key,
            "uatrv3" => &mut self.trait3_value,
            "uatrt3" => &mut self.trait3_type,
            _ => return None,
        };
        Some(field)
    }
}

impl<'de> Deserialize<'de> for InboundEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(InboundEventVisitor)
    }
}

struct InboundEventVisitor;

impl<'de> Visitor<'de> for InboundEventVisitor {
    type Value = InboundEvent;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object of string fields")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(InboundEvent::default())
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut event = InboundEvent::default();

        // Keys are applied in document order, so the last occurrence wins.
        while let Some(key) = map.next_key::<String>()? {
            match event.field_mut(&key) {
                Some(field) => {
                    if let Some(value) = map.next_value::<Option<String>>()? {
                        *field = value;
                    }
                }
                None => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(event)
    }
}

/// A value tagged with its declared type, used for both attributes and traits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TypedValue {
    pub fn new(value: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: kind.into(),
        }
    }
}

/// Nested record forwarded to the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event: String,
    pub event_type: String,
    pub app_id: String,
    pub user_id: String,
    pub message_id: String,
    pub page_title: String,
    pub page_url: String,
    pub browser_language: String,
    pub screen_size: String,
    pub attributes: BTreeMap<String, TypedValue>,
    pub traits: BTreeMap<String, TypedValue>,
}

/// Downstream destination for canonical events.
///
/// A `Collector` is a pure configuration object. It is built once at startup
/// and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct Collector {
    /// Target URL for delivery.
    pub url: String,

    /// Maximum time allowed for a single delivery attempt.
    pub timeout: Duration,

    /// Maximum number of retry attempts after the initial attempt.
    pub max_retries: u32,
}

impl Collector {
    /// Create a collector with default delivery settings.
    ///
    /// Defaults:
    /// - timeout: 5 seconds
    /// - max_retries: 0 (a failed delivery is dead-lettered immediately)
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(5),
            max_retries: 0,
        }
    }

    /// Set a custom timeout for delivery attempts.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of retry attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// An event whose delivery was given up on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub event: CanonicalEvent,
    pub error: String,
    /// Collector response status, if the collector answered at all.
    pub status: Option<u16>,
    pub attempts: u32,
    pub failed_at_secs: u64,
}
