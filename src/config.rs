use log::{debug, warn};
use serde::de::Error as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::delimiters::Delimiters;
use crate::files::{self, FileError};
use crate::selector;

/// File in the working directory whose contents name the data folder.
pub const DATAFILE_OPT: &str = "datafile.opt";

/// Data folder used when neither `--data-dir` nor `datafile.opt` is given.
pub const DEFAULT_DATA_DIR: &str = "data-files";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    File(#[from] FileError),
    #[error("Failed to parse JSON config {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to parse YAML config {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid profile {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("generator config > [ customDelimiter ] missing \"startsWith\" and \"endsWith\"")]
    IncompleteDelimiter,
    #[error("template condition does not have \"columnValue\" or \"uniqueIdentifier\" property")]
    ConditionTarget,
    #[error("config for transform object has to have all the following values: columnName, conditionalValue, columnValue and replacementValue")]
    IncompleteTransform,
    #[error("Unable to find default template in {0}")]
    MissingDefaultTemplate(String),
    #[error("More than one default template in {0}")]
    DuplicateDefaultTemplate(String),
    #[error("Non-default template \"{0}\" must have \"condition\" or \"parameterTemplate\"")]
    VariantWithoutSelector(String),
    #[error("Unable to find property \"templates\" or \"templateFromFile\" in filtered section for sheet ({0})")]
    FilteredSourceMissing(String),
    #[error("{section} is missing required property \"{field}\"")]
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    #[error("Invalid row number: {0}")]
    InvalidRowNumber(String),
    #[error("Filtered templates nested deeper than {0} levels")]
    FilterDepth(usize),
    #[error("Could not find profile ({0})")]
    UnknownProfile(String),
}

/// A config value that may be written as a single object or as a list.
#[derive(Debug, Clone)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

// Items are decoded one by one so their own errors reach the caller.
impl<'de, T: DeserializeOwned> Deserialize<'de> for OneOrMany<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<Vec<T>, _>>()
                .map(OneOrMany::Many)
                .map_err(D::Error::custom),
            single => serde_json::from_value(single)
                .map(OneOrMany::One)
                .map_err(D::Error::custom),
        }
    }
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item),
            OneOrMany::Many(items) => items,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Merged generator profile (`config/default.json` underneath the profile file).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub profile_name: Option<String>,
    pub input_sheet: String,
    pub sheet_name: String,
    pub templates: Vec<TemplateDescriptor>,
    pub output: OutputConfig,

    #[serde(default)]
    pub mapped_section: Vec<RepeatingGroup>,
    #[serde(default)]
    pub conditional_section: Vec<ConditionalSection>,
    #[serde(default, rename = "mappedJSONSection")]
    pub mapped_json_section: Option<MappedJsonSection>,
    #[serde(default)]
    pub filtered_section: Option<OneOrMany<FilteredSection>>,
    #[serde(default)]
    pub simulator: Option<OneOrMany<SimulatorEntry>>,

    #[serde(default)]
    pub position_based_template: Vec<PositionRule>,
    #[serde(default)]
    pub transform: Vec<TransformRule>,
    #[serde(default)]
    pub fixed_mapping_values: BTreeMap<String, Value>,

    #[serde(default)]
    pub custom_delimiter: Option<CustomDelimiter>,
    #[serde(default)]
    pub has_mockoon_response_helper_format: bool,
    #[serde(default)]
    pub use_gen_row_flag: Option<GenRowFlag>,
    #[serde(default)]
    pub start_row: Option<RowNumber>,
    #[serde(default)]
    pub end_row: Option<RowNumber>,
    #[serde(default, deserialize_with = "opt_scalar")]
    pub set_as_default_value: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub json_default_value: Option<Value>,
    #[serde(default)]
    pub use_existing_filename_column: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDescriptor {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub condition: Option<OneOrMany<Condition>>,
    #[serde(default)]
    pub replacement_param_name: Option<String>,
    #[serde(default)]
    pub parameter_template: Option<ParameterTemplate>,
    #[serde(default)]
    pub use_generated_template: bool,
}

impl TemplateDescriptor {
    pub fn location(&self) -> String {
        format!("{}{}", self.path, self.file_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterTemplate {
    pub template_file: String,
    pub parameter: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub file_name_prefix: String,
    #[serde(default)]
    pub file_id_column: Option<String>,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    /// `%SET_FILENAME_TO%` switches naming to the `setFilenameTo` column.
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub set_filename_to: Option<String>,
}

fn default_file_extension() -> String {
    ".xml".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub column_name: Option<String>,
    /// Comparison operator.
    #[serde(default)]
    pub conditional_value: String,
    #[serde(default, deserialize_with = "opt_scalar")]
    pub column_value: Option<String>,
    #[serde(default)]
    pub unique_identifier: Option<UniqueIdentifier>,
    /// Simulator-only value rewrite (`%NO SPACES%`, `%ENCODE SPACES%`, ...).
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub encode_with: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueIdentifier {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRule {
    #[serde(default)]
    pub column_name: Option<String>,
    #[serde(default)]
    pub conditional_value: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar")]
    pub column_value: Option<String>,
    #[serde(default, deserialize_with = "opt_scalar")]
    pub replacement_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRule {
    /// Delimited placeholder, e.g. `{ACCOUNT_NAME}`.
    pub param_name: String,
    pub param_length: usize,
    pub padding: Padding,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Padding {
    pub pad_with: String,
    #[serde(default)]
    pub leading_with: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatingGroup {
    #[serde(default)]
    pub map: BTreeMap<String, String>,
    #[serde(default)]
    pub unique_identifier: Option<UniqueIdentifier>,
    pub template_file: String,
    pub parameter: String,
    #[serde(default)]
    pub condition: Option<OneOrMany<Condition>>,
    #[serde(default)]
    pub transform: Vec<TransformRule>,
    #[serde(default)]
    pub split_values: Option<SplitValues>,
    #[serde(default, rename = "isInJSONArray")]
    pub is_in_json_array: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitValues {
    pub column_name: String,
    pub split_with: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalSection {
    pub template_file: String,
    pub parameter: String,
    #[serde(default)]
    pub condition: Option<OneOrMany<Condition>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedJsonSection {
    pub template_file: String,
    pub parameter: String,
    #[serde(default)]
    pub child_map: Vec<RepeatingGroup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub from_sheet_name: String,
    pub from_sheet_column: String,
    pub to_sheet_name: String,
    pub to_sheet_column: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePath {
    #[serde(default)]
    pub path: String,
    pub file_name: String,
}

/// Template entry of a filtered section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredTemplate {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub replacement_param_name: Option<String>,
    #[serde(default)]
    pub condition: Option<OneOrMany<Condition>>,
    #[serde(default)]
    pub use_generated_template: bool,
    /// Joins rendered JSON fragments; `,` when absent.
    #[serde(default)]
    pub separator: Option<String>,
    /// Conditional sub-templates spliced into this template per matched row.
    #[serde(default)]
    pub templates: Vec<TemplateDescriptor>,
    /// Child filtered sections rendered against each matched row.
    #[serde(default)]
    pub apply_template: Option<OneOrMany<FilteredSection>>,
}

impl FilteredTemplate {
    pub fn location(&self) -> String {
        format!("{}{}", self.path, self.file_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFromFile {
    #[serde(default)]
    pub template_input_folder: String,
    pub template_file_name_format: String,
    pub template_file_param_name: String,
    pub template_file_param_column: String,
    #[serde(default)]
    pub replacement_param_name: Option<String>,
}

/// How each matched secondary row is rendered.
#[derive(Debug, Clone)]
pub enum FilteredSource {
    /// Render the section's `default` template per match.
    Templates(Box<FilteredTemplate>),
    /// Read an existing file named after the match.
    File(TemplateFromFile),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawFilteredSection")]
pub struct FilteredSection {
    pub section_sheet_name: String,
    pub section_sheet_tag_column: String,
    pub primary_sheet_tag_column: String,
    pub column_mappings: Vec<ColumnMapping>,
    /// Placeholder in the host template that receives the rendered set.
    pub replacement_param_name: String,
    pub apply_to_template: Option<TemplatePath>,
    pub source: FilteredSource,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFilteredSection {
    #[serde(default)]
    section_sheet_name: String,
    #[serde(default)]
    section_sheet_tag_column: String,
    #[serde(default)]
    primary_sheet_tag_column: String,
    #[serde(default)]
    column_mappings: Vec<ColumnMapping>,
    #[serde(default)]
    replacement_param_name: Option<String>,
    #[serde(default)]
    apply_to_template: Option<TemplatePath>,
    #[serde(default)]
    templates: Option<Vec<FilteredTemplate>>,
    #[serde(default)]
    template_from_file: Option<TemplateFromFile>,
}

impl TryFrom<RawFilteredSection> for FilteredSection {
    type Error = ConfigError;

    fn try_from(raw: RawFilteredSection) -> Result<Self, Self::Error> {
        let first_param = raw
            .templates
            .as_ref()
            .and_then(|t| t.first())
            .and_then(|t| t.replacement_param_name.clone());

        let source = match (raw.templates, raw.template_from_file) {
            (Some(templates), _) => {
                let (defaults, ignored): (Vec<_>, Vec<_>) =
                    templates.into_iter().partition(|t| t.name == "default");
                for template in &ignored {
                    warn!(
                        "filteredSection ({}) ignores template \"{}\"; only \"default\" is rendered",
                        raw.section_sheet_name, template.name
                    );
                }
                let mut defaults = defaults.into_iter();
                let default = defaults.next().ok_or_else(|| {
                    ConfigError::MissingDefaultTemplate(format!(
                        "filteredSection ({})",
                        raw.section_sheet_name
                    ))
                })?;
                if defaults.next().is_some() {
                    return Err(ConfigError::DuplicateDefaultTemplate(format!(
                        "filteredSection ({})",
                        raw.section_sheet_name
                    )));
                }
                FilteredSource::Templates(Box::new(default))
            }
            (None, Some(from_file)) => FilteredSource::File(from_file),
            (None, None) => {
                return Err(ConfigError::FilteredSourceMissing(raw.section_sheet_name))
            }
        };

        let replacement_param_name = raw
            .replacement_param_name
            .or(first_param)
            .or_else(|| match &source {
                FilteredSource::Templates(t) => t.replacement_param_name.clone(),
                FilteredSource::File(f) => f.replacement_param_name.clone(),
            })
            .ok_or(ConfigError::MissingField {
                section: "filteredSection",
                field: "replacementParamName",
            })?;

        Ok(Self {
            section_sheet_name: raw.section_sheet_name,
            section_sheet_tag_column: raw.section_sheet_tag_column,
            primary_sheet_tag_column: raw.primary_sheet_tag_column,
            column_mappings: raw.column_mappings,
            replacement_param_name,
            apply_to_template: raw.apply_to_template,
            source,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub simulator_config_template_path: String,
    #[serde(default)]
    pub simulator_config_template: Option<String>,
    #[serde(default)]
    pub simulator_config_filename_param: Option<String>,
    #[serde(default)]
    pub simulator_config_output: String,
    #[serde(default)]
    pub simulator_filename: String,
    #[serde(default)]
    pub condition: Option<OneOrMany<Condition>>,
    #[serde(default)]
    pub additional_simulator_config: Vec<AdditionalSimulatorConfig>,
    #[serde(default)]
    pub json_primary_node: Option<String>,
    #[serde(default)]
    pub json_map: Option<serde_json::Map<String, Value>>,
    #[serde(default, deserialize_with = "opt_scalar")]
    pub set_as_default_value: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub json_default_value: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalSimulatorConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub simulator_config_template_path: String,
    pub simulator_config_template: String,
    #[serde(default)]
    pub simulator_config_filename_param: Option<String>,
    #[serde(default)]
    pub condition: OneOrMany<Condition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDelimiter {
    #[serde(default)]
    pub starts_with: Option<String>,
    #[serde(default)]
    pub ends_with: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenRowFlag {
    #[serde(default = "default_true")]
    pub set_gen_row_flag: bool,
    #[serde(default)]
    pub gen_row_column_name: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Spreadsheet row number, written either as a number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RowNumber {
    Number(i64),
    Text(String),
}

impl RowNumber {
    pub fn value(&self) -> Result<i64, ConfigError> {
        match self {
            RowNumber::Number(n) => Ok(*n),
            RowNumber::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidRowNumber(s.clone())),
        }
    }
}

/// Accepts a string, number or boolean and keeps its text form.
fn opt_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(other.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)`; only absence maps to `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Profile {
    /// Loads `profile_path` merged over `<data_dir>/config/default.json`.
    pub fn load(data_dir: &Path, profile_path: &Path) -> Result<Self, ConfigError> {
        let default_path = data_dir.join("config").join("default.json");
        let mut merged = if default_path.is_file() && default_path.as_path() != profile_path {
            read_config_value(&default_path)?
        } else {
            debug!("No default config at {:?}", default_path);
            Value::Object(serde_json::Map::new())
        };
        deep_merge(&mut merged, read_config_value(profile_path)?);

        let profile: Profile =
            serde_json::from_value(merged).map_err(|source| ConfigError::Invalid {
                path: profile_path.to_path_buf(),
                source,
            })?;
        profile.validate()?;
        Ok(profile)
    }

    /// Checks the rules that serde alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Delimiters::resolve(self.custom_delimiter.as_ref())?;
        selector::resolve_templates(&self.templates)?;

        let group_transforms = self
            .mapped_section
            .iter()
            .chain(self.mapped_json_section.iter().flat_map(|m| &m.child_map))
            .flat_map(|g| &g.transform);
        for rule in self.transform.iter().chain(group_transforms) {
            rule.validate()?;
        }

        if let Some(flag) = &self.use_gen_row_flag {
            if flag.set_gen_row_flag && flag.gen_row_column_name.is_none() {
                return Err(ConfigError::MissingField {
                    section: "useGenRowFlag",
                    field: "genRowColumnName",
                });
            }
        }
        if let Some(row) = &self.start_row {
            row.value()?;
        }
        if let Some(row) = &self.end_row {
            row.value()?;
        }
        Ok(())
    }

    pub fn filtered_sections(&self) -> &[FilteredSection] {
        self.filtered_section
            .as_ref()
            .map(OneOrMany::as_slice)
            .unwrap_or_default()
    }

    pub fn simulators(&self) -> &[SimulatorEntry] {
        self.simulator
            .as_ref()
            .map(OneOrMany::as_slice)
            .unwrap_or_default()
    }
}

/// Parses a config file, choosing YAML by extension and JSON otherwise.
pub fn read_config_value(path: &Path) -> Result<Value, ConfigError> {
    let content = files::read_file(path)?;
    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    if is_yaml {
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Recursively merges `overlay` into `base`. Objects merge key by key,
/// arrays merge index by index, anything else in `overlay` wins.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(overlay)) => {
            for (index, value) in overlay.into_iter().enumerate() {
                match base.get_mut(index) {
                    Some(existing) => deep_merge(existing, value),
                    None => base.push(value),
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// A profile found in the config folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub profile_name: Option<String>,
    pub path: PathBuf,
    pub output_folder: String,
    pub file_name_prefix: Option<String>,
}

/// Lists every config file under `config_dir` that declares an `output`
/// section. Files that fail to parse are logged and skipped.
pub fn discover_profiles(config_dir: &Path) -> Result<Vec<ProfileEntry>, ConfigError> {
    let mut entries = Vec::new();
    for path in files::get_files(config_dir)? {
        let value = match read_config_value(&path) {
            Ok(value) => value,
            Err(e) => {
                warn!("File {:?} failed and was ignored. {}", path, e);
                continue;
            }
        };
        let Some(output) = value.get("output").filter(|o| o.is_object()) else {
            continue;
        };
        entries.push(ProfileEntry {
            profile_name: value
                .get("profileName")
                .and_then(Value::as_str)
                .map(str::to_string),
            path,
            output_folder: output
                .get("folder")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            file_name_prefix: output
                .get("fileNamePrefix")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
    Ok(entries)
}

/// Resolves the data folder: `explicit`, else the folder named in
/// `<cwd>/datafile.opt`, else [`DEFAULT_DATA_DIR`].
pub fn locate_data_dir(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    match std::fs::read_to_string(cwd.join(DATAFILE_OPT)) {
        Ok(content) if !content.trim().is_empty() => cwd.join(content.trim()),
        _ => cwd.join(DEFAULT_DATA_DIR),
    }
}
