//! Post-processing of rendered text.

use log::error;
use regex::Regex;
use std::sync::LazyLock;

use crate::config::Condition;
use crate::substitution::BACKSLASH_APOSTROPHE;

/// Cleanups for JSON assembled from fragments, applied in order.
static JSON_REPAIRS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\}\s*\{", "},{"),
        (r#""""""#, r#""""#),
        (r"\},\s+\],", "}],"),
        (r#"[\[\s]*""[\[\s]*\]"#, "[]"),
        (r",\s*\}", "}"),
        (r"\[\s*\{\s*\}\s*\]", "[]"),
        (r#""\s+""#, r#"",""#),
        (r#""?:\s+\}"#, r#"":{}"#),
        (r#"":\s?[\r\n]+""#, r#"":{""#),
        (r#"":\s*,"#, r#"":{},"#),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("valid JSON repair pattern"),
            replacement,
        )
    })
    .collect()
});

static SIM_ADJACENT_OBJECTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\}\s*\{").expect("valid adjacent object pattern"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

pub const NO_SPACES: &str = "%NO SPACES%";
pub const ENCODE_SPACES: &str = "%ENCODE SPACES%";
pub const USE_BACKSLASH_APOSTROPHE: &str = "%USE_BACKSLASH_APOSTROPHE%";

/// Applies output-type specific cleanup before a file is written.
pub fn format_content(content: &str, extension: &str) -> String {
    match extension {
        ".json" => repair_json(content),
        _ => content.to_string(),
    }
}

/// Repairs common artifacts of fragment assembly (missing or doubled
/// commas, empty arrays, doubled quotes) and pretty-prints the result.
///
/// Text that still fails to parse is logged and returned with only the
/// textual repairs applied.
pub fn repair_json(content: &str) -> String {
    let repaired = JSON_REPAIRS
        .iter()
        .fold(content.to_string(), |text, (pattern, replacement)| {
            pattern.replace_all(&text, *replacement).into_owned()
        });

    match serde_json::from_str::<serde_json::Value>(&repaired)
        .and_then(|value| serde_json::to_string_pretty(&value))
    {
        Ok(pretty) => pretty,
        Err(e) => {
            error!(">>> JSON formatting ERROR: {}", e);
            repaired
        }
    }
}

/// Rewrites a simulator value according to its condition's `format`.
pub fn apply_condition_format(value: &str, condition: &Condition) -> String {
    match condition.format.as_deref() {
        Some(NO_SPACES) => WHITESPACE.replace_all(value, "").into_owned(),
        Some(ENCODE_SPACES) => {
            let with = condition.encode_with.as_deref().unwrap_or("%20");
            WHITESPACE.replace_all(value, with).into_owned()
        }
        Some(USE_BACKSLASH_APOSTROPHE) => value.replace('\'', BACKSLASH_APOSTROPHE),
        _ => value.to_string(),
    }
}

/// Joins concatenated simulator objects with commas and turns XML
/// apostrophe entities into JSON-escaped quotes.
pub fn fixup_simulator_json(content: &str) -> String {
    SIM_ADJACENT_OBJECTS
        .replace_all(content, "},{")
        .replace("&apos;", "\\'")
}
