//! Filtered sections: rows from a secondary sheet, selected by tags,
//! rendered per match and spliced into the host template.

use log::{debug, warn};
use std::ptr;

use crate::conditions::check_all_conditions;
use crate::config::{
    Condition, ConfigError, FilteredSection, FilteredSource, FilteredTemplate, OneOrMany,
    TemplateFromFile,
};
use crate::error::GenerateError;
use crate::substitution::{RenderContext, ValueScope};
use crate::workbook::{DataRow, Workbook, WorkbookError};

/// Nesting limit for `applyTemplate` children.
pub const MAX_FILTER_DEPTH: usize = 8;

/// True when any comma-separated entry of `tags` equals `tag`, both trimmed.
pub fn check_tags_match(tags: Option<&str>, tag: &str) -> bool {
    tags.is_some_and(|tags| tags.split(',').any(|t| t.trim() == tag.trim()))
}

/// Rows whose `tag_column` holds at least one tag found in `tags`.
pub fn filter_rows<'a>(rows: &'a [DataRow], tag_column: &str, tags: &str) -> Vec<&'a DataRow> {
    rows.iter()
        .filter(|row| {
            row.get(tag_column)
                .filter(|value| !value.is_empty())
                .is_some_and(|value| value.split(',').any(|tag| check_tags_match(Some(tags), tag)))
        })
        .collect()
}

/// Secondary rows matching `row`.
///
/// Without column mappings the section sheet is filtered by the primary
/// row's tag column. With mappings each step filters its target sheet by
/// the tags of the previous step's rows; matches accumulate without
/// duplicates.
pub fn matching_rows<'a>(
    workbook: &'a Workbook,
    row: &'a DataRow,
    section: &FilteredSection,
) -> Result<Vec<&'a DataRow>, WorkbookError> {
    if section.column_mappings.is_empty() {
        let Some(tags) = row.get(&section.primary_sheet_tag_column) else {
            return Ok(Vec::new());
        };
        let sheet = workbook.sheet(&section.section_sheet_name)?;
        return Ok(filter_rows(sheet, &section.section_sheet_tag_column, tags));
    }

    let mut sources = vec![row];
    for mapping in &section.column_mappings {
        let target = workbook.sheet(&mapping.to_sheet_name)?;
        let tag_column = if mapping.from_sheet_name == mapping.to_sheet_name {
            &mapping.to_sheet_column
        } else {
            &mapping.from_sheet_column
        };

        let mut hits: Vec<&DataRow> = Vec::new();
        for source in &sources {
            let Some(tag) = source.get(tag_column).filter(|t| !t.is_empty()) else {
                continue;
            };
            for hit in filter_rows(target, &mapping.to_sheet_column, tag) {
                if !hits.iter().any(|h| ptr::eq(*h, hit)) {
                    hits.push(hit);
                }
            }
        }
        sources = hits;
    }
    Ok(sources)
}

fn conditions(condition: &Option<OneOrMany<Condition>>) -> &[Condition] {
    condition.as_ref().map(OneOrMany::as_slice).unwrap_or_default()
}

fn passes(row: &DataRow, condition: &Option<OneOrMany<Condition>>) -> Result<bool, ConfigError> {
    let condition = conditions(condition);
    Ok(condition.is_empty() || check_all_conditions(row, condition, false, None)?)
}

impl RenderContext {
    /// Runs every filtered section of a row.
    ///
    /// Sections with `applyToTemplate` render into their own host file,
    /// which later sections can pick up through `useGeneratedTemplate`.
    pub fn apply_filtered_sections(
        &mut self,
        scope: &ValueScope<'_>,
        workbook: &Workbook,
        row: &DataRow,
        results: &str,
        sections: &[FilteredSection],
    ) -> Result<String, GenerateError> {
        let mut generated = results.to_string();
        let mut results = results.to_string();
        for section in sections {
            match &section.apply_to_template {
                Some(host) => {
                    let host = self.read_template(&format!("{}{}", host.path, host.file_name))?;
                    generated = self.apply_filtered_section(scope, workbook, row, &host, section, None)?;
                }
                None => {
                    results = self.apply_filtered_section(
                        scope,
                        workbook,
                        row,
                        &results,
                        section,
                        Some(&generated),
                    )?;
                }
            }
        }
        Ok(results)
    }

    /// Renders `section` for `row` and splices the set over its
    /// replacement parameter; no matches removes the parameter.
    pub fn apply_filtered_section(
        &mut self,
        scope: &ValueScope<'_>,
        workbook: &Workbook,
        row: &DataRow,
        results: &str,
        section: &FilteredSection,
        generated: Option<&str>,
    ) -> Result<String, GenerateError> {
        let set = self.render_filtered_set(scope, workbook, row, section, generated, 0)?;
        Ok(results.replace(&section.replacement_param_name, &set))
    }

    fn render_filtered_set(
        &mut self,
        scope: &ValueScope<'_>,
        workbook: &Workbook,
        row: &DataRow,
        section: &FilteredSection,
        generated: Option<&str>,
        depth: usize,
    ) -> Result<String, GenerateError> {
        if depth > MAX_FILTER_DEPTH {
            return Err(ConfigError::FilterDepth(MAX_FILTER_DEPTH).into());
        }
        let matches = matching_rows(workbook, row, section)?;
        debug!("num of matches: {}", matches.len());
        if matches.is_empty() {
            return Ok(String::new());
        }

        match &section.source {
            FilteredSource::Templates(template) => {
                self.render_matches(scope, workbook, template, &matches, generated, depth)
            }
            FilteredSource::File(from_file) => self.read_matched_files(from_file, &matches),
        }
    }

    fn render_matches(
        &mut self,
        scope: &ValueScope<'_>,
        workbook: &Workbook,
        template: &FilteredTemplate,
        matches: &[&DataRow],
        generated: Option<&str>,
        depth: usize,
    ) -> Result<String, GenerateError> {
        let base = if template.use_generated_template {
            generated.unwrap_or_default().to_string()
        } else {
            self.read_template(&template.location())?
        };
        let params = self.scan(&base);
        let is_json = template.file_name.contains(".json");
        let separator = template.separator.as_deref().unwrap_or(",");
        let children = template
            .apply_template
            .as_ref()
            .map(OneOrMany::as_slice)
            .unwrap_or_default();

        let mut set = String::new();
        for (index, matched) in matches.iter().enumerate() {
            let mut current = base.clone();

            for sub in &template.templates {
                if !passes(matched, &sub.condition)? {
                    continue;
                }
                let text = if sub.use_generated_template {
                    generated.unwrap_or_default().to_string()
                } else {
                    self.read_template(&sub.location())?
                };
                let sub_params = self.scan(&text);
                let rendered = self.replace_values(scope, matched, &sub_params, &text, None)?;
                if let Some(param) = &sub.replacement_param_name {
                    current = current.replace(param, &rendered);
                }
            }

            for child in children {
                let include = match &child.source {
                    FilteredSource::Templates(t) => passes(matched, &t.condition)?,
                    FilteredSource::File(_) => true,
                };
                let child_set = if include {
                    self.render_filtered_set(scope, workbook, matched, child, generated, depth + 1)?
                } else {
                    String::new()
                };
                current = current.replace(&child.replacement_param_name, &child_set);
            }

            let count = index + 1;
            let values = self.replace_values(scope, matched, &params, &current, Some(count))?;
            if is_json && count > 1 && !values.is_empty() && !set.is_empty() && !set.ends_with(',') {
                set.push_str(separator);
            }
            set.push_str(&values);
        }
        Ok(set)
    }

    fn read_matched_files(
        &self,
        from_file: &TemplateFromFile,
        matches: &[&DataRow],
    ) -> Result<String, GenerateError> {
        let format = format!(
            "{}{}",
            from_file.template_input_folder, from_file.template_file_name_format
        );
        let mut set = String::new();
        for matched in matches {
            match matched.get(&from_file.template_file_param_column) {
                Some(id) => {
                    let path = format.replace(&from_file.template_file_param_name, id);
                    set.push_str(&self.read_template(&path)?);
                }
                None => warn!(
                    "matched row has no {} column, skipped",
                    from_file.template_file_param_column
                ),
            }
        }
        Ok(set)
    }
}
