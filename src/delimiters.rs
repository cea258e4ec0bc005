use crate::config::{ConfigError, CustomDelimiter};

/// Parameter markers, `{NAME}` unless the profile sets `customDelimiter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub start: String,
    pub end: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            start: "{".to_string(),
            end: "}".to_string(),
        }
    }
}

impl Delimiters {
    /// Both `startsWith` and `endsWith` are required once `customDelimiter`
    /// is present.
    pub fn resolve(custom: Option<&CustomDelimiter>) -> Result<Self, ConfigError> {
        match custom {
            None => Ok(Self::default()),
            Some(CustomDelimiter {
                starts_with: Some(start),
                ends_with: Some(end),
            }) => Ok(Self {
                start: start.clone(),
                end: end.clone(),
            }),
            Some(_) => Err(ConfigError::IncompleteDelimiter),
        }
    }

    /// `NAME` -> `{NAME}`
    pub fn wrap(&self, name: &str) -> String {
        format!("{}{}{}", self.start, name, self.end)
    }

    /// Regex source matching one placeholder and capturing its name.
    pub fn pattern(&self) -> String {
        format!(
            r#"{}([^"]*?){}"#,
            regex::escape(&self.start),
            regex::escape(&self.end)
        )
    }
}
