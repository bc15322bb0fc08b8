//! Brace-balanced scan for the first embedded JSON object.

use serde_json::{Map, Value};

/// Find the first complete JSON object in `text` that has one of `hints` as
/// a top-level key.
///
/// The scan is line-oriented. A candidate opens on a line that starts with
/// `{`, or at the first `{` of a line, provided the opened text mentions a
/// hint. Lines are then accumulated while the running count of `{` minus `}`
/// stays positive. When it drops to zero or below, the leading JSON value of
/// the accumulated text is parsed; anything after it is ignored. Candidates
/// that fail to parse or lack a hint key are discarded and scanning resumes
/// on the next line.
///
/// Braces inside string literals are counted too. That only delays or
/// advances the parse attempt; a miscounted candidate fails to parse and is
/// dropped.
pub fn scan_balanced<S: AsRef<str>>(text: &str, hints: &[S]) -> Option<Map<String, Value>> {
    let mut candidate = String::new();
    let mut depth: i64 = 0;
    let mut open = false;

    for line in text.lines() {
        let line = line.trim();

        if open {
            candidate.push('\n');
            candidate.push_str(line);
            depth += brace_delta(line);
        } else {
            let Some(start) = candidate_start(line, hints) else {
                continue;
            };
            candidate.clear();
            candidate.push_str(start);
            depth = brace_delta(start);
            open = true;
        }

        if depth <= 0 {
            open = false;
            if let Some(found) = parse_leading_object(&candidate, hints) {
                return Some(found);
            }
            tracing::trace!(len = candidate.len(), "discarding unparseable payload candidate");
        }
    }

    None
}

/// The part of `line` a candidate would start with, if any.
fn candidate_start<'a, S: AsRef<str>>(line: &'a str, hints: &[S]) -> Option<&'a str> {
    let start = &line[line.find('{')?..];
    mentions_hint(start, hints).then_some(start)
}

fn mentions_hint<S: AsRef<str>>(text: &str, hints: &[S]) -> bool {
    hints.iter().any(|h| text.contains(h.as_ref()))
}

fn brace_delta(line: &str) -> i64 {
    line.chars().fold(0, |acc, c| match c {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

fn parse_leading_object<S: AsRef<str>>(candidate: &str, hints: &[S]) -> Option<Map<String, Value>> {
    let mut values = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
    match values.next() {
        Some(Ok(Value::Object(map))) if hints.iter().any(|h| map.contains_key(h.as_ref())) => Some(map),
        _ => None,
    }
}
