//! Filter object -> URL query parameters
//!
//! Fields are emitted in declaration order. `None` fields are skipped; dates
//! should be annotated with `iso_millis` so they render the way the backend
//! parses them.

use serde::Serialize;
use serde_json::Value;
use shared::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpParams {
    pairs: Vec<(String, String)>,
}

impl HttpParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter, keeping earlier ones with the same name.
    pub fn append(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.pairs
    }
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Convert a filter struct into query parameters.
///
/// Only objects are accepted; anything else is a caller bug and reported as
/// a serialization error.
pub fn build_http_params<F: Serialize + ?Sized>(filter: &F) -> Result<HttpParams> {
    match serde_json::to_value(filter)? {
        Value::Object(fields) => Ok(HttpParams {
            pairs: fields
                .iter()
                .filter_map(|(name, value)| render(value).map(|v| (name.clone(), v)))
                .collect(),
        }),
        Value::Null => Ok(HttpParams::new()),
        other => Err(AppError::serialization(format!(
            "query parameters must come from an object, got {}",
            other
        ))),
    }
}

/// `DateTime<Utc>` as `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(date: &DateTime<Utc>) -> String {
        date.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }

    /// Same format for optional dates; `None` serializes as null and is
    /// dropped from query parameters.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            date: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => serializer.serialize_str(&super::format(date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<DateTime<Utc>>::deserialize(deserializer)
        }
    }
}
