//! Lax shape checks for third-party payloads.
//!
//! The upstream API is semi-structured and its shapes vary by endpoint, so
//! validation only asks whether a payload is an object carrying at least one
//! of the fields expected for its entity. Partial responses pass. A `false`
//! result is advisory: callers log it and fall back to an empty value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Schema {
    Player,
    Team,
    Game,
    Odds,
}

impl Schema {
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Schema::Player => &["id", "fullName", "position"],
            Schema::Team => &["id", "displayName", "abbreviation"],
            Schema::Game => &["id", "date", "competitions"],
            Schema::Odds => &["provider", "details", "overUnder", "spread"],
        }
    }
}

/// True when `data` is an object holding at least one of the schema's
/// required fields as a direct property.
pub fn validate(data: &Value, schema: Schema) -> bool {
    let Some(object) = data.as_object() else {
        return false;
    };
    schema
        .required_fields()
        .iter()
        .any(|field| object.contains_key(*field))
}

/// Like [`validate`] for a value that may be missing altogether.
pub fn validate_opt(data: Option<&Value>, schema: Schema) -> bool {
    data.map(|value| validate(value, schema)).unwrap_or(false)
}

/// Minimal shape every cached response must have: an object or an array.
pub fn is_structured(data: &Value) -> bool {
    data.is_object() || data.is_array()
}
