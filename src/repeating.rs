//! Repeating groups (`mappedSection`), the mapped JSON section and
//! conditional sections.
//!
//! A repeating group renders one fragment per index found in the row's
//! indexed columns (`ADDR1_TYPE`, `ADDR2_TYPE`, ...) and splices the joined
//! fragments over the group's parameter.

use log::debug;
use regex::Regex;
use std::sync::LazyLock;

use crate::conditions::check_all_conditions;
use crate::config::{
    Condition, ConditionalSection, MappedJsonSection, OneOrMany, RepeatingGroup, SplitValues,
};
use crate::error::GenerateError;
use crate::substitution::{RenderContext, ValueScope, AUTO_INCREMENT};
use crate::workbook::DataRow;

static ADJACENT_OBJECTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\}\s+\{").expect("valid adjacent object pattern"));

/// Counts non-empty columns whose name contains `prefix` and, when given,
/// `suffix`.
pub fn count_indexed_columns(row: &DataRow, prefix: &str, suffix: &str) -> usize {
    row.iter()
        .filter(|(key, value)| {
            !value.is_empty()
                && key.contains(prefix)
                && (suffix.is_empty() || key.contains(suffix))
        })
        .count()
}

/// `VALUE_ONE` at index 2 -> `VALUE2_ONE`; a name without `_` gets the
/// index appended.
pub fn indexed_column(value_name: &str, index: usize) -> String {
    match value_name.split_once('_') {
        Some((prefix, suffix)) => format!("{}{}_{}", prefix, index, suffix),
        None => format!("{}{}", value_name, index),
    }
}

fn conditions(condition: &Option<OneOrMany<Condition>>) -> &[Condition] {
    condition.as_ref().map(OneOrMany::as_slice).unwrap_or_default()
}

/// Conditions that apply to a whole row; indexed conditions are left for
/// each fragment.
fn row_gate(row: &DataRow, group: &RepeatingGroup) -> Result<bool, GenerateError> {
    let row_level: Vec<Condition> = conditions(&group.condition)
        .iter()
        .filter(|c| c.unique_identifier.is_none())
        .cloned()
        .collect();
    if row_level.is_empty() {
        return Ok(true);
    }
    Ok(check_all_conditions(row, &row_level, false, None)?)
}

impl RenderContext {
    /// Renders every fragment of `group` for `row`, joined.
    pub fn expand_repeating_group(
        &self,
        row: &DataRow,
        group: &RepeatingGroup,
        extension: &str,
    ) -> Result<String, GenerateError> {
        let template = self.read_template(&group.template_file)?;
        if let Some(split) = &group.split_values {
            return self.expand_split_values(row, group, split, &template);
        }

        let (prefix, suffix) = group
            .unique_identifier
            .as_ref()
            .map(|id| (id.prefix.as_str(), id.suffix.as_str()))
            .unwrap_or_default();
        let count = count_indexed_columns(row, prefix, suffix);
        let json = extension == ".json";

        let mut result = String::new();
        for index in 1..=count {
            let fragment = self.group_fragment(row, group, &template, index)?;
            if index > 1
                && json
                && !fragment.is_empty()
                && !result.is_empty()
                && !result.ends_with(',')
            {
                result.push(',');
            }
            result.push_str(&fragment);
        }

        if json {
            result = ADJACENT_OBJECTS.replace_all(&result, "},{").into_owned();
        }
        Ok(result)
    }

    fn group_fragment(
        &self,
        row: &DataRow,
        group: &RepeatingGroup,
        template: &str,
        index: usize,
    ) -> Result<String, GenerateError> {
        let group_conditions = conditions(&group.condition);
        if !group_conditions.is_empty()
            && !check_all_conditions(row, group_conditions, false, Some(index))?
        {
            return Ok(String::new());
        }

        let json_template = group.template_file.ends_with("json");
        let mut fragment = template.to_string();
        for (key, value_name) in &group.map {
            let token = self.delimiters().wrap(key);
            if value_name == AUTO_INCREMENT {
                fragment = fragment.replace(&token, &index.to_string());
                continue;
            }

            let column = indexed_column(value_name, index);
            match row.get(&column) {
                Some(value) => {
                    let mut value = value.as_str();
                    for rule in &group.transform {
                        if let Some(replacement) = rule.apply(value_name, value)? {
                            value = replacement;
                            break;
                        }
                    }
                    fragment = fragment.replace(&token, value);
                }
                None if json_template => {
                    fragment = fragment
                        .replace(&format!("\"{}\"", token), "null")
                        .replace(&token, "null");
                }
                None => fragment = fragment.replace(&token, ""),
            }
        }
        Ok(fragment)
    }

    /// One fragment per element of the split column; every mapped key
    /// receives the element itself.
    ///
    /// Group conditions read the primary row, with indexed conditions
    /// resolved at the element's 1-based position, not the element value.
    fn expand_split_values(
        &self,
        row: &DataRow,
        group: &RepeatingGroup,
        split: &SplitValues,
        template: &str,
    ) -> Result<String, GenerateError> {
        let column = split.column_name.replace(['{', '}'], "");
        let Some(values) = row.get(&column) else {
            debug!("split column {} is empty", column);
            return Ok(String::new());
        };

        let group_conditions = conditions(&group.condition);
        let mut result = String::new();
        for (index, element) in values.split(split.split_with.as_str()).enumerate() {
            if !group_conditions.is_empty()
                && !check_all_conditions(row, group_conditions, false, Some(index + 1))?
            {
                continue;
            }
            let mut fragment = template.to_string();
            for (key, value_name) in &group.map {
                let value = if value_name == AUTO_INCREMENT {
                    (index + 1).to_string()
                } else {
                    element.to_string()
                };
                fragment = fragment.replace(&self.delimiters().wrap(key), &value);
            }
            result.push_str(&fragment);
        }
        Ok(result)
    }

    /// Expands `group` into `results` at its parameter. The parameter is
    /// left in place when the group's row-level conditions fail.
    pub fn add_repeating_group(
        &self,
        results: &str,
        row: &DataRow,
        group: &RepeatingGroup,
        extension: &str,
    ) -> Result<String, GenerateError> {
        if !row_gate(row, group)? {
            return Ok(results.to_string());
        }
        let expanded = self.expand_repeating_group(row, group, extension)?;
        Ok(results.replace(&group.parameter, &expanded))
    }

    /// Builds the JSON parent template from its child groups and splices it
    /// into `results`.
    pub fn add_mapped_json_section(
        &self,
        results: &str,
        row: &DataRow,
        section: &MappedJsonSection,
    ) -> Result<String, GenerateError> {
        let mut parent = self.read_template(&section.template_file)?;
        let mut add_comma = false;

        for (index, child) in section.child_map.iter().enumerate() {
            let expanded = self.expand_repeating_group(row, child, ".json")?;
            let spliced = if child.is_in_json_array {
                let mut spliced = String::new();
                if index > 0
                    && add_comma
                    && !expanded.is_empty()
                    && !expanded.ends_with(',')
                    && expanded.ends_with('}')
                {
                    spliced.push(',');
                }
                spliced.push_str(&expanded);
                add_comma = !spliced.is_empty();
                spliced
            } else {
                expanded
            };
            parent = parent.replace(&child.parameter, &spliced);
        }
        Ok(results.replace(&section.parameter, &parent))
    }

    /// Splices the rendered section template when its conditions hold, or
    /// removes the parameter otherwise.
    pub fn add_conditional_section(
        &mut self,
        scope: &ValueScope<'_>,
        results: &str,
        row: &DataRow,
        section: &ConditionalSection,
    ) -> Result<String, GenerateError> {
        let section_conditions = conditions(&section.condition);
        let include = section_conditions.is_empty()
            || check_all_conditions(row, section_conditions, false, None)?;

        let rendered = if include {
            let template = self.read_template(&section.template_file)?;
            let params = self.scan(&template);
            self.replace_values(scope, row, &params, &template, None)?
        } else {
            String::new()
        };
        Ok(results.replace(&section.parameter, &rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TransformRule, UniqueIdentifier};
    use crate::delimiters::Delimiters;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn row(pairs: &[(&str, &str)]) -> DataRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn setup(files: &[(&str, &str)]) -> (TempDir, RenderContext) {
        let dir = tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let ctx = RenderContext::new(Delimiters::default(), false, dir.path()).unwrap();
        (dir, ctx)
    }

    fn group(template_file: &str, map: &[(&str, &str)]) -> RepeatingGroup {
        RepeatingGroup {
            map: map
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            unique_identifier: Some(UniqueIdentifier {
                prefix: "VALUE".into(),
                suffix: "_ONE".into(),
            }),
            template_file: template_file.into(),
            parameter: "{GROUP}".into(),
            ..Default::default()
        }
    }

    fn values_row() -> DataRow {
        row(&[
            ("VALUE1_ONE", "four"),
            ("VALUE1_TWO", "two"),
            ("VALUE2_ONE", "one"),
            ("VALUE2_TWO", "three"),
        ])
    }

    #[test]
    fn test_count_indexed_columns() {
        let data = row(&[
            ("ADDR1_TYPE", "HOME"),
            ("ADDR2_TYPE", "WORK"),
            ("ADDR3_TYPE", ""),
            ("ADDR1_STREET", "Main St"),
        ]);
        assert_eq!(count_indexed_columns(&data, "ADDR", "_TYPE"), 2);
        assert_eq!(count_indexed_columns(&data, "ADDR", ""), 3);
        assert_eq!(count_indexed_columns(&data, "PHONE", ""), 0);
    }

    #[test]
    fn test_indexed_column() {
        assert_eq!(indexed_column("VALUE_ONE", 2), "VALUE2_ONE");
        assert_eq!(indexed_column("ADDR_LINE_1", 1), "ADDR1_LINE_1");
        assert_eq!(indexed_column("PHONE", 3), "PHONE3");
    }

    #[test]
    fn test_expand_repeating_group() {
        let (_dir, ctx) = setup(&[("grp.xml", "<ONE>{ONE}</ONE><TWO>{TWO}</TWO>")]);
        let grp = group("grp.xml", &[("ONE", "VALUE_ONE"), ("TWO", "VALUE_TWO")]);

        let out = ctx.expand_repeating_group(&values_row(), &grp, ".xml").unwrap();

        assert_eq!(
            out,
            "<ONE>four</ONE><TWO>two</TWO><ONE>one</ONE><TWO>three</TWO>"
        );
    }

    #[test]
    fn test_group_fragment_per_index() {
        let (_dir, ctx) = setup(&[("grp.xml", "<ONE>{ONE}</ONE><TWO>{TWO}</TWO>")]);
        let grp = group("grp.xml", &[("ONE", "VALUE_ONE"), ("TWO", "VALUE_TWO")]);
        let template = ctx.read_template("grp.xml").unwrap();

        let out = ctx.group_fragment(&values_row(), &grp, &template, 2).unwrap();

        assert_eq!(out, "<ONE>one</ONE><TWO>three</TWO>");
    }

    #[test]
    fn test_json_group_commas_and_nulls() {
        let (_dir, ctx) = setup(&[("grp.json", r#"{"n": {%AUTO_INCREMENT%}, "one": "{ONE}", "x": "{X}"}"#)]);
        let grp = group(
            "grp.json",
            &[("%AUTO_INCREMENT%", "%AUTO_INCREMENT%"), ("ONE", "VALUE_ONE"), ("X", "VALUE_X")],
        );

        let out = ctx.expand_repeating_group(&values_row(), &grp, ".json").unwrap();

        assert_eq!(
            out,
            r#"{"n": 1, "one": "four", "x": null},{"n": 2, "one": "one", "x": null}"#
        );
    }

    #[test]
    fn test_indexed_condition_skips_fragment() {
        let (_dir, ctx) = setup(&[("grp.xml", "<ONE>{ONE}</ONE>")]);
        let mut grp = group("grp.xml", &[("ONE", "VALUE_ONE")]);
        grp.condition = Some(OneOrMany::One(Condition {
            conditional_value: "!=".into(),
            column_value: Some("four".into()),
            unique_identifier: Some(UniqueIdentifier {
                prefix: "VALUE".into(),
                suffix: "_ONE".into(),
            }),
            ..Default::default()
        }));

        let out = ctx
            .add_repeating_group("<G>{GROUP}</G>", &values_row(), &grp, ".xml")
            .unwrap();

        assert_eq!(out, "<G><ONE>one</ONE></G>");
    }

    #[test]
    fn test_row_gate_leaves_parameter() {
        let (_dir, ctx) = setup(&[("grp.xml", "<ONE>{ONE}</ONE>")]);
        let mut grp = group("grp.xml", &[("ONE", "VALUE_ONE")]);
        grp.condition = Some(OneOrMany::One(Condition {
            column_name: Some("TYPE".into()),
            conditional_value: "=".into(),
            column_value: Some("HOME".into()),
            ..Default::default()
        }));

        let out = ctx
            .add_repeating_group("<G>{GROUP}</G>", &values_row(), &grp, ".xml")
            .unwrap();

        assert_eq!(out, "<G>{GROUP}</G>");
    }

    #[test]
    fn test_group_transform_uses_value_name() {
        let (_dir, ctx) = setup(&[("grp.xml", "[{ONE}]")]);
        let mut grp = group("grp.xml", &[("ONE", "VALUE_ONE")]);
        grp.transform = vec![TransformRule {
            column_name: Some("VALUE_ONE".into()),
            conditional_value: Some("==".into()),
            column_value: Some("four".into()),
            replacement_value: Some("4".into()),
        }];

        let out = ctx.expand_repeating_group(&values_row(), &grp, ".xml").unwrap();

        assert_eq!(out, "[4][one]");
    }

    #[test]
    fn test_split_values() {
        let (_dir, ctx) = setup(&[("tag.xml", "<T n=\"{N}\">{TAG}</T>")]);
        let mut grp = group("tag.xml", &[("TAG", "TAGS"), ("N", "%AUTO_INCREMENT%")]);
        grp.split_values = Some(SplitValues {
            column_name: "{TAGS}".into(),
            split_with: "|".into(),
        });

        let out = ctx
            .add_repeating_group("{GROUP}", &row(&[("TAGS", "a|b")]), &grp, ".xml")
            .unwrap();
        assert_eq!(out, "<T n=\"1\">a</T><T n=\"2\">b</T>");

        let out = ctx
            .add_repeating_group("{GROUP}", &DataRow::new(), &grp, ".xml")
            .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_split_values_conditions_read_primary_row() {
        let (_dir, ctx) = setup(&[("tag.xml", "<T>{TAG}</T>")]);
        let mut grp = group("tag.xml", &[("TAG", "TAGS")]);
        grp.split_values = Some(SplitValues {
            column_name: "TAGS".into(),
            split_with: "|".into(),
        });
        grp.condition = Some(OneOrMany::One(Condition {
            unique_identifier: Some(UniqueIdentifier {
                prefix: "FLAG".into(),
                suffix: String::new(),
            }),
            conditional_value: "=".into(),
            column_value: Some("Y".into()),
            ..Default::default()
        }));
        let data = row(&[("TAGS", "a|b|c"), ("FLAG1", "Y"), ("FLAG2", "N"), ("FLAG3", "Y")]);

        let out = ctx.expand_repeating_group(&data, &grp, ".xml").unwrap();
        assert_eq!(out, "<T>a</T><T>c</T>");

        grp.condition = Some(OneOrMany::One(Condition {
            column_name: Some("TYPE".into()),
            conditional_value: "=".into(),
            column_value: Some("X".into()),
            ..Default::default()
        }));
        let mut data = data;
        data.insert("TYPE".into(), "Y".into());
        assert_eq!(ctx.expand_repeating_group(&data, &grp, ".xml").unwrap(), "");
        data.insert("TYPE".into(), "X".into());
        assert_eq!(
            ctx.expand_repeating_group(&data, &grp, ".xml").unwrap(),
            "<T>a</T><T>b</T><T>c</T>"
        );
    }

    #[test]
    fn test_mapped_json_section() {
        let (_dir, ctx) = setup(&[
            ("parent.json", r#"{"items": [{A}{B}]}"#),
            ("a.json", r#"{"a": "{ONE}"}"#),
            ("b.json", r#"{"b": "{TWO}"}"#),
        ]);
        let mut a = group("a.json", &[("ONE", "VALUE_ONE")]);
        a.parameter = "{A}".into();
        a.is_in_json_array = true;
        let mut b = group("b.json", &[("TWO", "VALUE_TWO")]);
        b.parameter = "{B}".into();
        b.is_in_json_array = true;
        let section = MappedJsonSection {
            template_file: "parent.json".into(),
            parameter: "{JSON}".into(),
            child_map: vec![a, b],
        };

        let out = ctx
            .add_mapped_json_section(r#"{"body": {JSON}}"#, &values_row(), &section)
            .unwrap();

        assert_eq!(
            out,
            r#"{"body": {"items": [{"a": "four"},{"a": "one"},{"b": "two"},{"b": "three"}]}}"#
        );
    }

    #[test]
    fn test_conditional_section() {
        let (_dir, mut ctx) = setup(&[("extra.xml", "<X>{ID}</X>")]);
        let section = ConditionalSection {
            template_file: "extra.xml".into(),
            parameter: "{EXTRA}".into(),
            condition: Some(OneOrMany::One(Condition {
                column_name: Some("TYPE".into()),
                conditional_value: "=".into(),
                column_value: Some("HOME".into()),
                ..Default::default()
            })),
        };
        let scope = ValueScope {
            extension: ".xml",
            ..Default::default()
        };

        let home = row(&[("ID", "7"), ("TYPE", "HOME")]);
        let out = ctx
            .add_conditional_section(&scope, "<R>{EXTRA}</R>", &home, &section)
            .unwrap();
        assert_eq!(out, "<R><X>7</X></R>");

        let work = row(&[("ID", "7"), ("TYPE", "WORK")]);
        let out = ctx
            .add_conditional_section(&scope, "<R>{EXTRA}</R>", &work, &section)
            .unwrap();
        assert_eq!(out, "<R></R>");
    }
}
