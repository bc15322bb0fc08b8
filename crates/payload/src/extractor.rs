use ac_domain::config::ExtractionConfig;
use ac_domain::payload::ExtractedPayload;

use crate::fields::{self, FieldPattern};
use crate::scan::scan_balanced;

/// Extraction with the configured hints and fallback fields.
///
/// Stateless after construction; safe to share across tasks.
#[derive(Debug, Clone)]
pub struct PayloadExtractor {
    hints: Vec<String>,
    patterns: Vec<FieldPattern>,
    version_field: String,
    default_version: String,
}

impl PayloadExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            hints: config.required_key_hints.clone(),
            patterns: fields::compile_all(&config.fallback_fields),
            version_field: config.version_field.clone(),
            default_version: config.default_version.clone(),
        }
    }

    /// An extractor with no hints never finds anything.
    pub fn is_enabled(&self) -> bool {
        !self.hints.is_empty()
    }

    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    pub fn extract(&self, text: &str) -> ExtractedPayload {
        self.extract_with_hints(text, &self.hints)
    }

    /// Run both passes with an explicit hint set. Never fails; an empty
    /// payload means nothing usable was found.
    pub fn extract_with_hints<S: AsRef<str>>(&self, text: &str, hints: &[S]) -> ExtractedPayload {
        if hints.is_empty() || text.is_empty() {
            return ExtractedPayload::empty();
        }

        if let Some(object) = scan_balanced(text, hints) {
            tracing::debug!(keys = object.len(), "extracted embedded payload object");
            return ExtractedPayload::embedded(object);
        }

        let version = (!self.version_field.is_empty())
            .then(|| (self.version_field.as_str(), self.default_version.as_str()));
        let found = fields::collect(text, &self.patterns, version);
        if !found.is_empty() {
            tracing::debug!(keys = found.len(), "recovered payload fields by pattern");
        }
        ExtractedPayload::from_fields(found)
    }
}

impl Default for PayloadExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

/// Extract with `hints` and the default fallback fields.
pub fn extract<S: AsRef<str>>(text: &str, hints: &[S]) -> ExtractedPayload {
    PayloadExtractor::default().extract_with_hints(text, hints)
}
