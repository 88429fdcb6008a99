//! Analytics event names and flat scalar parameters

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Event names emitted by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardEvent {
    /// Visitor clicked a `tel:` link
    CallClick,
    /// A scroll-depth threshold was reached for the first time on this page view
    ScrollDepth,
    /// First click on an FAQ entry during this page view
    FaqInteraction,
    /// First exposure to an experiment variant in this session
    AbTestAssignment,
    /// A tracking session was created or replaced
    TrackingNumberAssigned,
    /// An existing tracking session was extended (keepalive)
    TrackingSessionRefreshed,
    PageView,
}

impl StandardEvent {
    pub const ALL: [StandardEvent; 7] = [
        StandardEvent::CallClick,
        StandardEvent::ScrollDepth,
        StandardEvent::FaqInteraction,
        StandardEvent::AbTestAssignment,
        StandardEvent::TrackingNumberAssigned,
        StandardEvent::TrackingSessionRefreshed,
        StandardEvent::PageView,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StandardEvent::CallClick => "call_click",
            StandardEvent::ScrollDepth => "scroll_depth",
            StandardEvent::FaqInteraction => "faq_interaction",
            StandardEvent::AbTestAssignment => "ab_test_assignment",
            StandardEvent::TrackingNumberAssigned => "tracking_number_assigned",
            StandardEvent::TrackingSessionRefreshed => "tracking_session_refreshed",
            StandardEvent::PageView => "page_view",
        }
    }

    /// Session keepalive noise, filterable downstream
    pub fn is_keepalive(&self) -> bool {
        matches!(self, StandardEvent::TrackingSessionRefreshed)
    }

    /// Wire names of every keepalive event
    pub fn keepalive_names() -> Vec<&'static str> {
        Self::ALL
            .into_iter()
            .filter(StandardEvent::is_keepalive)
            .map(|event| event.as_str())
            .collect()
    }
}

impl fmt::Display for StandardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ParamValue {
    /// Scalar form of a JSON value
    ///
    /// `null` has no scalar form. Arrays and objects are flattened to their
    /// JSON text.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ParamValue::Bool(b)),
            Value::Number(n) => Some(match n.as_f64() {
                Some(f) => ParamValue::Number(f),
                None => ParamValue::String(n.to_string()),
            }),
            Value::String(s) => Some(ParamValue::String(s)),
            other @ (Value::Array(_) | Value::Object(_)) => Some(ParamValue::String(other.to_string())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(value as f64)
    }
}

impl From<u8> for ParamValue {
    fn from(value: u8) -> Self {
        ParamValue::Number(f64::from(value))
    }
}

/// Flat name → scalar map
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventParams(BTreeMap<String, ParamValue>);

impl EventParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize an arbitrary JSON object
    ///
    /// Null entries are dropped and nested values become strings. A non-object
    /// value yields an empty map.
    pub fn from_json(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::new();
        };
        Self(
            map.into_iter()
                .filter_map(|(k, v)| ParamValue::from_json(v).map(|v| (k, v)))
                .collect(),
        )
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert only when `key` is not already present
    pub fn insert_default(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Builder form of [`EventParams::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder that skips `None`
    pub fn with_opt<V: Into<ParamValue>>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.insert(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}
