use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Embedded payload extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Keys that mark a JSON object as the payload we are looking for.
    /// An empty list disables extraction.
    #[serde(default = "d_hints")]
    pub required_key_hints: Vec<String>,
    /// Fields pulled out individually when no complete object parses.
    #[serde(default = "d_fallback_fields")]
    pub fallback_fields: Vec<FallbackField>,
    /// Name of the schema-version field.
    #[serde(default = "d_version_field")]
    pub version_field: String,
    /// Value used for the version field when the fallback pass found other
    /// fields but no version.
    #[serde(default = "d_default_version")]
    pub default_version: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            required_key_hints: d_hints(),
            fallback_fields: d_fallback_fields(),
            version_field: d_version_field(),
            default_version: d_default_version(),
        }
    }
}

/// A field recovered by pattern matching in the fallback pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackField {
    pub key: String,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FallbackField {
    pub fn new(key: impl Into<String>, kind: FieldKind) -> Self {
        Self { key: key.into(), kind }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    String,
    Number,
    Array,
}

fn d_hints() -> Vec<String> {
    vec!["offers".into(), "payment_context_token".into(), "amount".into()]
}
fn d_fallback_fields() -> Vec<FallbackField> {
    vec![
        FallbackField::new("offers", FieldKind::Array),
        FallbackField::new("payment_context_token", FieldKind::String),
        FallbackField::new("version", FieldKind::String),
    ]
}
fn d_version_field() -> String {
    "version".into()
}
fn d_default_version() -> String {
    "0.2.2".into()
}
