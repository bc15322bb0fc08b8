//! Recovery of structured payloads embedded in language-model output.
//!
//! Model output mixes prose and JSON with inconsistent quoting and
//! whitespace, so a strict parse of the whole text rarely works. Extraction
//! runs in two passes:
//!
//! 1. [`scan::scan_balanced`]: line-oriented brace-balanced scan for the first
//!    complete JSON object that carries one of the hint keys.
//! 2. [`fields`]: when no object parses, pattern-match a fixed set of
//!    fields independently and return whatever subset was found.
//!
//! Neither pass ever fails; the worst case is an empty payload.

pub mod fields;
pub mod scan;

mod extractor;

pub use extractor::{extract, PayloadExtractor};
pub use scan::scan_balanced;
