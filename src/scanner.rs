use regex::Regex;
use std::sync::LazyLock;

use crate::config::ConfigError;
use crate::delimiters::Delimiters;

/// Mock-server response helpers such as `{{faker 'random.uuid'}}` or
/// `{{date 1 2}}`. These look like placeholders but are not.
static RESPONSE_HELPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\w+ |\d+ \d+|'[\w.\-: ]+'").expect("valid response helper pattern")
});

/// Finds placeholder names in template text.
#[derive(Debug, Clone)]
pub struct ParameterScanner {
    pattern: Regex,
    skip_response_helpers: bool,
}

impl ParameterScanner {
    pub fn new(delimiters: &Delimiters, skip_response_helpers: bool) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: Regex::new(&delimiters.pattern())?,
            skip_response_helpers,
        })
    }

    /// Placeholder names in match order, duplicates kept.
    pub fn scan(&self, template: &str) -> Vec<String> {
        self.pattern
            .captures_iter(template)
            .filter(|caps| !(self.skip_response_helpers && RESPONSE_HELPER.is_match(&caps[0])))
            .map(|caps| caps[1].to_string())
            .filter(|name| !name.trim().is_empty())
            .collect()
    }
}
