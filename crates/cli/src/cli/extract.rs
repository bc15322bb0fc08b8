use std::io::Read;
use std::path::Path;

use anyhow::Context;

use ac_domain::config::ExtractionConfig;
use ac_domain::payload::ExtractedPayload;
use ac_payload::PayloadExtractor;

/// Run the configured extractor over `file` (or stdin) and print the
/// payload as JSON. Fails when a `required` key is missing.
pub fn run(config: &ExtractionConfig, file: Option<&Path>, required: &[String]) -> anyhow::Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };

    let payload = extract(config, &text, required)?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn extract(config: &ExtractionConfig, text: &str, required: &[String]) -> anyhow::Result<ExtractedPayload> {
    let payload = PayloadExtractor::new(config).extract(text);
    let keys: Vec<&str> = required.iter().map(String::as_str).collect();
    payload.require(&keys)?;
    Ok(payload)
}
