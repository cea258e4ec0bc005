use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{discover_profiles, scalar_text, ConfigError, Profile};
use crate::error::GenerateError;
use crate::files::{self, FileError};
use crate::formatting::format_content;
use crate::selector::{RowOutcome, TemplateSet};
use crate::simulator::SimulatorSet;
use crate::substitution::{RenderContext, ValueScope};
use crate::workbook::{DataRow, Workbook};

/// `output.fileName` value that names files from the `setFilenameTo` column.
pub const SET_FILENAME_TO: &str = "%SET_FILENAME_TO%";

/// Gen-row flag values that disable a row, compared case-insensitively.
const FALSEY: &[&str] = &["none", "nil", "nope", "no", "nada", "0", "false", "n"];

/// Writes output files, or only logs them in dry-run mode.
#[derive(Debug, Clone, Copy)]
pub struct OutputWriter {
    dry_run: bool,
}

impl OutputWriter {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn write(&self, folder: &Path, name: &str, contents: &str) -> Result<PathBuf, FileError> {
        if self.dry_run {
            let path = folder.join(name);
            info!("[DRY RUN] Would write: {:?}", path);
            return Ok(path);
        }
        let path = files::write_file(folder, name, contents)?;
        info!("{:?}", path);
        Ok(path)
    }
}

/// What a profile run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub profile_name: Option<String>,
    pub files_written: Vec<PathBuf>,
    pub rows_suppressed: usize,
    pub rows_reused: usize,
    pub simulator_files: Vec<PathBuf>,
}

/// Eligible 0-based data row indexes, from the 1-based spreadsheet row
/// numbers in `startRow`/`endRow` (row 1 is the header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    start: i64,
    end: i64,
}

impl RowWindow {
    pub fn new(profile: &Profile, row_count: usize) -> Result<Self, ConfigError> {
        let len = row_count as i64;
        let start = match &profile.start_row {
            Some(row) => (row.value()? - 2).max(0),
            None => 0,
        };
        let end = match &profile.end_row {
            Some(row) => {
                let end = row.value()?;
                if end > len {
                    len
                } else {
                    end - 2
                }
            }
            None => len,
        };
        Ok(Self { start, end })
    }

    pub fn contains(&self, index: usize) -> bool {
        let index = index as i64;
        index >= self.start && index <= self.end
    }
}

/// A missing or blank cell, or a negative word such as `no` or `0`.
pub fn is_falsey(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => true,
        Some(value) => FALSEY.contains(&value.to_lowercase().as_str()),
    }
}

/// Output file name for a rendered row. `index` is the 0-based data row.
pub fn output_file_name(
    profile: &Profile,
    row: &DataRow,
    index: usize,
) -> Result<String, GenerateError> {
    let output = &profile.output;
    let missing_column = |column: &str| GenerateError::MissingColumn {
        row: index + 2,
        column: column.to_string(),
    };

    if output.file_name.as_deref() == Some(SET_FILENAME_TO) {
        let column = output
            .set_filename_to
            .as_deref()
            .ok_or(ConfigError::MissingField {
                section: "output",
                field: "setFilenameTo",
            })?
            .replace(['{', '}'], "");
        let name = row.get(&column).ok_or_else(|| missing_column(&column))?;
        return Ok(format!("{}{}", name, output.file_extension));
    }

    let column = output
        .file_id_column
        .as_deref()
        .ok_or(ConfigError::MissingField {
            section: "output",
            field: "fileIdColumn",
        })?;
    let id = row.get(column).ok_or_else(|| missing_column(column))?;
    Ok(format!(
        "{}{}{}",
        output.file_name_prefix, id, output.file_extension
    ))
}

/// Renders every eligible row of one profile.
pub struct ProfileGenerator {
    data_dir: PathBuf,
    profile: Profile,
    workbook: Workbook,
    dry_run: bool,
}

impl ProfileGenerator {
    pub fn new(data_dir: impl Into<PathBuf>, profile: Profile, workbook: Workbook) -> Self {
        Self {
            data_dir: data_dir.into(),
            profile,
            workbook,
            dry_run: false,
        }
    }

    /// Loads the profile at `profile_path` and the workbook it names.
    pub fn load(data_dir: &Path, profile_path: &Path) -> Result<Self, GenerateError> {
        let profile = Profile::load(data_dir, profile_path)?;
        let workbook = Workbook::open(&data_dir.join(&profile.input_sheet))?;
        Ok(Self::new(data_dir, profile, workbook))
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn generate(&self) -> Result<GenerationReport, GenerateError> {
        let profile = &self.profile;
        let rows = self.workbook.sheet(&profile.sheet_name)?;
        let mut ctx = RenderContext::for_profile(profile, &self.data_dir)?;
        let templates = TemplateSet::load(&ctx, &profile.templates)?;
        let mut simulators = SimulatorSet::load(&ctx, profile.simulators())?;
        let window = RowWindow::new(profile, rows.len())?;
        let scope = ValueScope::for_output(profile);
        let writer = OutputWriter::new(self.dry_run);
        let output_dir = ctx.resolve(&profile.output.folder);

        info!(
            "Generating {} from {} ({} rows)",
            profile.profile_name.as_deref().unwrap_or("profile"),
            profile.sheet_name,
            rows.len()
        );
        debug!("row window: {:?}", window);

        let mut report = GenerationReport {
            profile_name: profile.profile_name.clone(),
            ..Default::default()
        };
        for (index, row) in rows.iter().enumerate() {
            if !window.contains(index) || !self.gen_row_enabled(row, index) {
                continue;
            }

            let file_name = match self.render_row(&mut ctx, &templates, &scope, row)? {
                RowOutcome::Suppressed => {
                    info!("> {} > don't create file", index);
                    report.rows_suppressed += 1;
                    continue;
                }
                RowOutcome::UseExisting(name) => {
                    info!("> {} > use existing file: {}", index, name);
                    report.rows_reused += 1;
                    name
                }
                RowOutcome::Render(text) => {
                    let name = output_file_name(profile, row, index)?;
                    let text = format_content(&text, &profile.output.file_extension);
                    report.files_written.push(writer.write(&output_dir, &name, &text)?);
                    info!("> {} > create file >> {}", index, name);
                    name
                }
            };
            simulators.record_row(&mut ctx, row, &file_name)?;
        }

        report.simulator_files = simulators.write_all(&ctx, &writer)?;
        Ok(report)
    }

    fn gen_row_enabled(&self, row: &DataRow, index: usize) -> bool {
        let Some(flag) = &self.profile.use_gen_row_flag else {
            return true;
        };
        if !flag.set_gen_row_flag {
            return true;
        }
        let value = flag
            .gen_row_column_name
            .as_deref()
            .and_then(|column| row.get(column))
            .map(String::as_str);
        let enabled = !is_falsey(value);
        if enabled {
            debug!("genRowFlag active for row [ {} ]", index);
        }
        enabled
    }

    fn render_row(
        &self,
        ctx: &mut RenderContext,
        templates: &TemplateSet,
        scope: &ValueScope<'_>,
        row: &DataRow,
    ) -> Result<RowOutcome, GenerateError> {
        let profile = &self.profile;
        let extension = profile.output.file_extension.as_str();
        let mut results = templates.text.clone();

        if !profile.fixed_mapping_values.is_empty() {
            let fixed: DataRow = profile
                .fixed_mapping_values
                .iter()
                .map(|(k, v)| (k.clone(), scalar_text(v)))
                .collect();
            let names: Vec<String> = fixed.keys().cloned().collect();
            results = ctx.replace_values(scope, &fixed, &names, &results, None)?;
        }
        for group in &profile.mapped_section {
            results = ctx.add_repeating_group(&results, row, group, extension)?;
        }
        for section in &profile.conditional_section {
            results = ctx.add_conditional_section(scope, &results, row, section)?;
        }
        if let Some(section) = &profile.mapped_json_section {
            results = ctx.add_mapped_json_section(&results, row, section)?;
        }

        if !templates.applies_to(row)? {
            return Ok(RowOutcome::Suppressed);
        }
        if let Some(existing) = profile
            .use_existing_filename_column
            .as_deref()
            .and_then(|column| row.get(column))
        {
            return Ok(RowOutcome::UseExisting(existing.clone()));
        }

        let results = ctx.apply_filtered_sections(
            scope,
            &self.workbook,
            row,
            &results,
            profile.filtered_sections(),
        )?;
        match templates.render(ctx, scope, row, results)? {
            RowOutcome::Render(text) => Ok(RowOutcome::Render(self.final_sweep(ctx, scope, text)?)),
            other => Ok(other),
        }
    }

    /// Reports placeholders nothing resolved and fills them with
    /// `setAsDefaultValue` when one is configured.
    fn final_sweep(
        &self,
        ctx: &mut RenderContext,
        scope: &ValueScope<'_>,
        text: String,
    ) -> Result<String, GenerateError> {
        let leftovers = ctx.scan(&text);
        if leftovers.is_empty() {
            return Ok(text);
        }
        warn!("NOT all PARAMETERS have been mapped: {:?}", leftovers);
        match scope.default_value {
            Some(default) => {
                info!("APPLYING default param value: {}", default);
                Ok(ctx.replace_values(scope, &BTreeMap::new(), &leftovers, &text, None)?)
            }
            None => Ok(text),
        }
    }
}

/// Generates each profile named in the comma-separated `profiles`, found
/// by `profileName` among the configs in `<data_dir>/config`.
///
/// Outside dry-run mode each profile's output folder is first cleared of
/// files carrying its `fileNamePrefix`.
pub fn generate_profiles(
    data_dir: &Path,
    profiles: &str,
    dry_run: bool,
) -> Result<Vec<GenerationReport>, GenerateError> {
    let entries = discover_profiles(&data_dir.join("config"))?;
    let mut reports = Vec::new();

    for name in profiles.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let entry = entries
            .iter()
            .find(|e| e.profile_name.as_deref() == Some(name))
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;
        info!("Profile {} -> {:?}", name, entry.path);

        if !dry_run {
            files::remove_files_from_dir(
                &data_dir.join(&entry.output_folder),
                entry.file_name_prefix.as_deref(),
            )?;
        }
        let report = ProfileGenerator::load(data_dir, &entry.path)?
            .with_dry_run(dry_run)
            .generate()?;
        reports.push(report);
    }
    Ok(reports)
}
