//! Placeholder substitution.
//!
//! Templates are plain text; a placeholder is replaced by splicing the
//! resolved value over every literal occurrence of its delimited token.
//! Callers compose documents by substituting sub-templates and passing the
//! partially-resolved text back in, so a call only touches the parameter
//! names it is given.

use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::{scalar_text, ConfigError, PositionRule, Profile, SimulatorEntry, TransformRule};
use crate::delimiters::Delimiters;
use crate::files::{self, FileError};
use crate::scanner::ParameterScanner;
use crate::workbook::DataRow;

/// Resolves to the increment value passed by the caller.
pub const AUTO_INCREMENT: &str = "%AUTO_INCREMENT%";

/// Resolves to the most recent increment value seen in this run.
pub const SUM_TOTAL: &str = "%SUM_TOTAL%";

/// Marker left by simulator formatting, emitted as `\'`.
pub const BACKSLASH_APOSTROPHE: &str = "%BACKSLASH_APOSTROPHE%";

/// Output options that shape how a value is rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueScope<'a> {
    /// Target extension including the dot, e.g. `.xml`.
    pub extension: &'a str,
    /// Rendering a simulator file rather than row output.
    pub simulator: bool,
    pub default_value: Option<&'a str>,
    pub json_default: Option<&'a Value>,
    pub positions: &'a [PositionRule],
    pub transforms: &'a [TransformRule],
}

impl<'a> ValueScope<'a> {
    pub fn for_output(profile: &'a Profile) -> Self {
        Self {
            extension: &profile.output.file_extension,
            simulator: false,
            default_value: profile.set_as_default_value.as_deref(),
            json_default: profile.json_default_value.as_ref(),
            positions: &profile.position_based_template,
            transforms: &profile.transform,
        }
    }

    pub fn for_simulator(entry: &'a SimulatorEntry, extension: &'a str) -> Self {
        Self {
            extension,
            simulator: true,
            default_value: entry.set_as_default_value.as_deref(),
            json_default: entry.json_default_value.as_ref(),
            positions: &[],
            transforms: &[],
        }
    }

    fn is_json(&self) -> bool {
        self.extension == ".json"
    }
}

/// Per-run rendering state: active delimiters, the placeholder scanner, the
/// data folder that relative template paths resolve against, and the
/// running total behind `%SUM_TOTAL%`.
#[derive(Debug, Clone)]
pub struct RenderContext {
    delimiters: Delimiters,
    scanner: ParameterScanner,
    data_dir: PathBuf,
    running_total: Option<usize>,
}

impl RenderContext {
    pub fn new(
        delimiters: Delimiters,
        skip_response_helpers: bool,
        data_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let scanner = ParameterScanner::new(&delimiters, skip_response_helpers)?;
        Ok(Self {
            delimiters,
            scanner,
            data_dir: data_dir.into(),
            running_total: None,
        })
    }

    pub fn for_profile(profile: &Profile, data_dir: &Path) -> Result<Self, ConfigError> {
        Self::new(
            Delimiters::resolve(profile.custom_delimiter.as_ref())?,
            profile.has_mockoon_response_helper_format,
            data_dir,
        )
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    pub fn scan(&self, template: &str) -> Vec<String> {
        self.scanner.scan(template)
    }

    pub fn running_total(&self) -> Option<usize> {
        self.running_total
    }

    /// Resolves a config path against the data folder.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.data_dir.join(relative)
    }

    pub fn read_template(&self, relative: &str) -> Result<String, FileError> {
        files::read_file(&self.resolve(relative))
    }

    /// Substitutes each of `params` into `template` using values from `row`.
    ///
    /// `increment` feeds `%AUTO_INCREMENT%` and, when present, becomes the
    /// new `%SUM_TOTAL%`.
    pub fn replace_values(
        &mut self,
        scope: &ValueScope<'_>,
        row: &DataRow,
        params: &[String],
        template: &str,
        increment: Option<usize>,
    ) -> Result<String, ConfigError> {
        if let Some(n) = increment.filter(|n| *n > 0) {
            self.running_total = Some(n);
        }

        let mut result = template.to_string();
        for name in params {
            let token = self.delimiters.wrap(name);
            let raw = match name.as_str() {
                AUTO_INCREMENT => increment.map(|n| n.to_string()),
                SUM_TOTAL => self.running_total.map(|n| n.to_string()),
                _ => row.get(name).cloned(),
            };

            let (target, mut value) = match raw {
                Some(value) => (token.clone(), escape_value(scope, &value)),
                None => self.missing_value(scope, &token, &result)?,
            };

            if let Some(rule) = scope.positions.iter().find(|r| r.param_name == token) {
                value = pad_out_param_value(rule, &value);
            }

            if scope
                .transforms
                .iter()
                .any(|r| r.column_name.as_deref() == Some(name.as_str()))
            {
                for rule in scope.transforms {
                    if let Some(replacement) = rule.apply(name, &value)? {
                        if !replacement.is_empty() {
                            value = replacement.to_string();
                            break;
                        }
                    }
                }
            }

            result = result
                .replace(&target, &value)
                .replace(BACKSLASH_APOSTROPHE, "\\'");
        }
        Ok(result)
    }

    /// Picks the text to splice for a parameter the row does not supply.
    ///
    /// JSON output is probed around the placeholder: a quoted value becomes
    /// `""`, a bare value becomes `jsonDefaultValue` (or `null`), and a
    /// quoted token that is not a value is removed outright.
    fn missing_value(
        &self,
        scope: &ValueScope<'_>,
        token: &str,
        template: &str,
    ) -> Result<(String, String), ConfigError> {
        if let Some(default) = scope.default_value {
            return Ok((token.to_string(), escape_value(scope, default)));
        }
        if !scope.is_json() {
            return Ok((token.to_string(), String::new()));
        }

        let escaped = regex::escape(token);
        let quoted = format!("\"{}\"", token);
        let json_default = || scope.json_default.map(json_default_text);

        if Regex::new(&format!(r#":\s*"{}""#, escaped))?.is_match(template) {
            Ok((quoted, "\"\"".to_string()))
        } else if Regex::new(&format!(r":\s*{}", escaped))?.is_match(template) {
            Ok((token.to_string(), json_default().unwrap_or_else(|| "null".to_string())))
        } else if template.contains(&quoted) {
            Ok((quoted, String::new()))
        } else {
            Ok((token.to_string(), json_default().unwrap_or_default()))
        }
    }
}

fn json_default_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => scalar_text(other),
    }
}

fn escape_value(scope: &ValueScope<'_>, value: &str) -> String {
    if scope.extension == ".xml" {
        quick_xml::escape::escape(value).into_owned()
    } else if scope.simulator && scope.is_json() {
        escape_json(value)
    } else {
        value.to_string()
    }
}

/// Escapes `value` for use inside a JSON string literal.
pub fn escape_json(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Pads `value` to `paramLength` characters with the configured pad string,
/// leading or trailing. Values already at or beyond the width are returned
/// unchanged.
pub fn pad_out_param_value(rule: &PositionRule, value: &str) -> String {
    let pad = rule.padding.pad_with.repeat(rule.param_length);
    let fill = pad.chars().count().saturating_sub(value.chars().count());
    let pad: String = pad.chars().take(fill).collect();
    if rule.padding.leading_with {
        format!("{}{}", pad, value)
    } else {
        format!("{}{}", value, pad)
    }
}

impl TransformRule {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (
            &self.column_name,
            &self.conditional_value,
            &self.column_value,
            &self.replacement_value,
        ) {
            (Some(_), Some(_), Some(_), Some(_)) => Ok(()),
            _ => Err(ConfigError::IncompleteTransform),
        }
    }

    /// The replacement when this rule targets `param_name` and `value`.
    pub fn apply(&self, param_name: &str, value: &str) -> Result<Option<&str>, ConfigError> {
        self.validate()?;
        let matches = self.column_name.as_deref() == Some(param_name)
            && self.column_value.as_deref() == Some(value);
        Ok(matches.then(|| self.replacement_value.as_deref()).flatten())
    }
}
