//! Simulator (mock response) files.
//!
//! Every generated row contributes an entry to each configured simulator.
//! Entries accumulate over the run and each simulator is written once at the
//! end.

use log::{debug, info};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::conditions::check_condition;
use crate::config::{AdditionalSimulatorConfig, Condition, OneOrMany, SimulatorEntry};
use crate::error::GenerateError;
use crate::formatting::{apply_condition_format, fixup_simulator_json};
use crate::generator::OutputWriter;
use crate::substitution::{RenderContext, ValueScope};
use crate::workbook::DataRow;

/// `jsonMap` value that resolves to the generated file name.
pub const FILE_NAME_PARAM: &str = "{FILE_NAME}";

fn extension_of(file: &str) -> String {
    Path::new(file)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

#[derive(Debug)]
struct LoadedTemplate {
    text: String,
    params: Vec<String>,
    extension: String,
}

impl LoadedTemplate {
    fn load(ctx: &RenderContext, path: &str, file: &str) -> Result<Self, GenerateError> {
        let text = ctx.read_template(&format!("{}{}", path, file))?;
        let params = ctx.scan(&text);
        Ok(Self {
            text,
            params,
            extension: extension_of(file),
        })
    }
}

#[derive(Debug)]
struct TemplateSimulator {
    entry: SimulatorEntry,
    template: LoadedTemplate,
    additional: Vec<(AdditionalSimulatorConfig, LoadedTemplate)>,
    content: String,
    touched: bool,
}

#[derive(Debug)]
struct JsonMapSimulator {
    entry: SimulatorEntry,
    node: String,
    map: Map<String, Value>,
    items: Vec<Value>,
}

/// Accumulates simulator output across the rows of one profile run.
#[derive(Debug, Default)]
pub struct SimulatorSet {
    templates: Vec<TemplateSimulator>,
    json_maps: Vec<JsonMapSimulator>,
}

impl SimulatorSet {
    pub fn load(ctx: &RenderContext, entries: &[SimulatorEntry]) -> Result<Self, GenerateError> {
        let mut set = Self::default();
        for entry in entries {
            if let Some(template) = &entry.simulator_config_template {
                let additional = entry
                    .additional_simulator_config
                    .iter()
                    .map(|add| {
                        LoadedTemplate::load(
                            ctx,
                            &add.simulator_config_template_path,
                            &add.simulator_config_template,
                        )
                        .map(|loaded| (add.clone(), loaded))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                set.templates.push(TemplateSimulator {
                    template: LoadedTemplate::load(
                        ctx,
                        &entry.simulator_config_template_path,
                        template,
                    )?,
                    entry: entry.clone(),
                    additional,
                    content: String::new(),
                    touched: false,
                });
            }
            if let (Some(node), Some(map)) = (&entry.json_primary_node, &entry.json_map) {
                set.json_maps.push(JsonMapSimulator {
                    entry: entry.clone(),
                    node: node.clone(),
                    map: map.clone(),
                    items: Vec::new(),
                });
            }
        }
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty() && self.json_maps.is_empty()
    }

    /// Adds the entries for one generated row named `file_name`.
    pub fn record_row(
        &mut self,
        ctx: &mut RenderContext,
        row: &DataRow,
        file_name: &str,
    ) -> Result<(), GenerateError> {
        for sim in &mut self.templates {
            let rendered = render_entry(ctx, sim, row, file_name)?;
            sim.content.push_str(&rendered);
            for (add, template) in &sim.additional {
                let extra = render_additional(ctx, &sim.entry, add, template, row, file_name)?;
                sim.content.push_str(&extra);
            }
            if sim.template.extension == ".json" {
                sim.content = fixup_simulator_json(&sim.content);
            }
            sim.touched = true;
        }

        for sim in &mut self.json_maps {
            sim.items.push(json_map_item(&sim.map, row, file_name));
        }
        Ok(())
    }

    /// Writes each simulator that received at least one row.
    pub fn write_all(
        &self,
        ctx: &RenderContext,
        writer: &OutputWriter,
    ) -> Result<Vec<PathBuf>, GenerateError> {
        let mut written = Vec::new();
        for sim in self.templates.iter().filter(|s| s.touched) {
            let folder = ctx.resolve(&sim.entry.simulator_config_output);
            written.push(writer.write(&folder, &sim.entry.simulator_filename, &sim.content)?);
        }
        for sim in self.json_maps.iter().filter(|s| !s.items.is_empty()) {
            let content = json_map_document(&sim.node, &sim.items).map_err(|source| {
                GenerateError::SimulatorJson {
                    file: sim.entry.simulator_filename.clone(),
                    source,
                }
            })?;
            let folder = ctx.resolve(&sim.entry.simulator_config_output);
            written.push(writer.write(&folder, &sim.entry.simulator_filename, &content)?);
        }
        if !written.is_empty() {
            info!("Wrote {} simulator file(s)", written.len());
        }
        Ok(written)
    }
}

/// Evaluates every condition of `entry` against `row`, applying each
/// passing condition's format to the row. All must pass.
fn apply_entry_conditions(
    row: &mut DataRow,
    conditions: &[Condition],
) -> Result<bool, GenerateError> {
    for condition in conditions {
        let Some(column) = condition.column_name.as_deref() else {
            continue;
        };
        let value = row.get(column).cloned();
        if !check_condition(value.as_deref(), condition, None)? {
            return Ok(false);
        }
        if let Some(value) = value {
            row.insert(column.to_string(), apply_condition_format(&value, condition));
        }
    }
    Ok(true)
}

fn render_entry(
    ctx: &mut RenderContext,
    sim: &TemplateSimulator,
    row: &DataRow,
    file_name: &str,
) -> Result<String, GenerateError> {
    let mut row = row.clone();
    let conditions = sim
        .entry
        .condition
        .as_ref()
        .map(OneOrMany::as_slice)
        .unwrap_or_default();
    if !apply_entry_conditions(&mut row, conditions)? {
        debug!("simulator condition not met for {}", file_name);
        return Ok(String::new());
    }

    let template = match &sim.entry.simulator_config_filename_param {
        Some(param) => sim.template.text.replace(param.as_str(), file_name),
        None => sim.template.text.clone(),
    };
    let scope = ValueScope::for_simulator(&sim.entry, &sim.template.extension);
    Ok(ctx.replace_values(&scope, &row, &sim.template.params, &template, None)?)
}

/// Renders an additional simulator template once for each of its
/// conditions that holds on a non-empty cell.
fn render_additional(
    ctx: &mut RenderContext,
    entry: &SimulatorEntry,
    add: &AdditionalSimulatorConfig,
    template: &LoadedTemplate,
    row: &DataRow,
    file_name: &str,
) -> Result<String, GenerateError> {
    let mut row = row.clone();
    let mut result = String::new();
    for condition in add.condition.as_slice() {
        let Some(column) = condition.column_name.as_deref() else {
            continue;
        };
        let Some(value) = row.get(column).filter(|v| !v.is_empty()).cloned() else {
            continue;
        };
        if !check_condition(Some(&value), condition, None)? {
            continue;
        }

        row.insert(column.to_string(), apply_condition_format(&value, condition));
        if let Some(param) = &add.simulator_config_filename_param {
            row.insert(param.replace(['{', '}'], ""), file_name.to_string());
        }
        let scope = ValueScope::for_simulator(entry, &template.extension);
        result.push_str(&ctx.replace_values(&scope, &row, &template.params, &template.text, None)?);
    }
    Ok(result)
}

/// `{ "<node>": [items] }`, pretty-printed.
fn json_map_document(node: &str, items: &[Value]) -> Result<String, serde_json::Error> {
    let mut document = Map::new();
    document.insert(node.to_string(), Value::Array(items.to_vec()));
    serde_json::to_string_pretty(&Value::Object(document))
}

/// One `jsonMap` object: `{FILE_NAME}` is the generated file name, `{COL}`
/// a cell (omitted when empty), anything else is copied through.
fn json_map_item(map: &Map<String, Value>, row: &DataRow, file_name: &str) -> Value {
    let mut item = Map::new();
    for (key, value) in map {
        let mapped = match value.as_str() {
            Some(FILE_NAME_PARAM) => Some(Value::String(file_name.to_string())),
            Some(param) if param.len() > 2 && param.starts_with('{') && param.ends_with('}') => row
                .get(&param[1..param.len() - 1])
                .map(|v| Value::String(v.clone())),
            _ => Some(value.clone()),
        };
        if let Some(mapped) = mapped {
            item.insert(key.clone(), mapped);
        }
    }
    Value::Object(item)
}
