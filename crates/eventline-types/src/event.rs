//! Write-side event types.

use std::collections::BTreeMap;

use serde::{ser::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Delivery channel an event was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Web,
    Mobile,
    Api,
    Email,
    Push,
}

impl Channel {
    /// Returns the canonical lowercase label for this channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Mobile => "mobile",
            Self::Api => "api",
            Self::Email => "email",
            Self::Push => "push",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "mobile" => Ok(Self::Mobile),
            "api" => Ok(Self::Api),
            "email" => Ok(Self::Email),
            "push" => Ok(Self::Push),
            _ => Err(ValidationError::UnsupportedChannel(s.to_string())),
        }
    }
}

/// A JSON-like metadata value.
///
/// Mirrors the JSON data model with one difference: a [`MetaValue::Float`]
/// may hold NaN or an infinity, which JSON cannot express. Serializing such
/// a value fails instead of silently writing `null`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    List(Vec<MetaValue>),
    Map(BTreeMap<String, MetaValue>),
}

impl Serialize for MetaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::UInt(u) => serializer.serialize_u64(*u),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(f) => Err(S::Error::custom(format!(
                "non-finite number {f} has no JSON representation"
            ))),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => items.serialize(serializer),
            Self::Map(map) => map.serialize(serializer),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Free-form event metadata. Keys are kept sorted so the encoded form is canonical.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A behavioural event submitted by a client.
///
/// The event identity (`event_hash`) is deliberately not a field: it is
/// derived from `(event_name, user_id, timestamp)` at publish time and can
/// never be supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_name: String,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    pub user_id: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,
}

/// An explicit `null` reads the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Event {
    /// Creates an event with no channel, campaign, tags or metadata.
    pub fn new(event_name: impl Into<String>, user_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            event_name: event_name.into(),
            channel: None,
            campaign_id: None,
            user_id: user_id.into(),
            timestamp,
            tags: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Checks the fields a client must supply.
    ///
    /// `event_name` and `user_id` must be non-blank and `timestamp` must be
    /// non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.event_name.trim().is_empty() {
            return Err(ValidationError::MissingField("event_name"));
        }
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::MissingField("user_id"));
        }
        if self.timestamp == 0 {
            return Err(ValidationError::MissingField("timestamp"));
        }
        Ok(())
    }
}
