use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a payload was recovered from model output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    /// Nothing was found.
    #[default]
    None,
    /// A complete embedded JSON object parsed.
    Embedded,
    /// Individual fields were pattern-matched; the mapping may be partial.
    Fields,
}

impl PayloadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadSource::None => "none",
            PayloadSource::Embedded => "embedded",
            PayloadSource::Fields => "fields",
        }
    }
}

/// Structured data recovered from free-form text.
///
/// Carries no validity guarantee: consumers check the keys they need with
/// [`ExtractedPayload::require`] before use. An empty payload means "no data
/// available", not a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPayload {
    #[serde(default)]
    pub source: PayloadSource,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl ExtractedPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn embedded(fields: Map<String, Value>) -> Self {
        Self {
            source: PayloadSource::Embedded,
            fields,
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        if fields.is_empty() {
            return Self::empty();
        }
        Self {
            source: PayloadSource::Fields,
            fields,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Keys from `required` that are absent.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|k| !self.fields.contains_key(*k))
            .collect()
    }

    /// The field map, if every key in `required` is present.
    pub fn require(&self, required: &[&str]) -> Result<&Map<String, Value>, MissingKeys> {
        let missing = self.missing(required);
        if missing.is_empty() {
            Ok(&self.fields)
        } else {
            Err(MissingKeys(missing.into_iter().map(str::to_owned).collect()))
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("payload is missing required keys: {}", .0.join(", "))]
pub struct MissingKeys(pub Vec<String>);
