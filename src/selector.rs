//! Chooses which template a row renders with.
//!
//! A profile has exactly one `default` template. Other entries are variants:
//! either a conditional replacement for the whole document, or a file spliced
//! over a parameter before the default values are applied.

use log::info;

use crate::conditions::check_all_conditions;
use crate::config::{Condition, ConfigError, OneOrMany, TemplateDescriptor};
use crate::error::GenerateError;
use crate::substitution::{RenderContext, ValueScope};
use crate::workbook::DataRow;

/// File name of a variant that suppresses output.
pub const NONE_TEMPLATE: &str = "%NONE%";

#[derive(Debug, Clone)]
pub enum TemplateVariant {
    /// Replaces the whole document when its conditions hold.
    Conditional {
        name: String,
        conditions: Vec<Condition>,
        location: String,
    },
    /// Splices `template_file` over `parameter` on every row.
    ParameterSplice {
        name: String,
        template_file: String,
        parameter: String,
    },
}

/// Result of rendering one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Render(String),
    /// No file for this row.
    Suppressed,
    /// The row names an existing file instead.
    UseExisting(String),
}

/// Splits `templates` into the default entry and its variants.
pub fn resolve_templates(
    templates: &[TemplateDescriptor],
) -> Result<(&TemplateDescriptor, Vec<TemplateVariant>), ConfigError> {
    let mut default = None;
    let mut variants = Vec::new();

    for template in templates {
        if template.name == "default" {
            if default.replace(template).is_some() {
                return Err(ConfigError::DuplicateDefaultTemplate("templates".to_string()));
            }
            continue;
        }

        let variant = match (&template.condition, &template.parameter_template) {
            (Some(_), _) => TemplateVariant::Conditional {
                name: template.name.clone(),
                conditions: template.conditions().to_vec(),
                location: template.location(),
            },
            (None, Some(param)) => TemplateVariant::ParameterSplice {
                name: template.name.clone(),
                template_file: param.template_file.clone(),
                parameter: param.parameter.clone(),
            },
            (None, None) => return Err(ConfigError::VariantWithoutSelector(template.name.clone())),
        };
        variants.push(variant);
    }

    let default =
        default.ok_or_else(|| ConfigError::MissingDefaultTemplate("templates".to_string()))?;
    Ok((default, variants))
}

/// The default template, loaded, plus the variants that may replace it.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub text: String,
    pub params: Vec<String>,
    conditions: Vec<Condition>,
    variants: Vec<TemplateVariant>,
}

impl TemplateSet {
    pub fn load(ctx: &RenderContext, templates: &[TemplateDescriptor]) -> Result<Self, GenerateError> {
        let (default, variants) = resolve_templates(templates)?;
        let text = ctx.read_template(&default.location())?;
        let params = ctx.scan(&text);
        info!(
            "Loaded default template {} with {} parameters",
            default.location(),
            params.len()
        );
        Ok(Self {
            text,
            params,
            conditions: default.conditions().to_vec(),
            variants,
        })
    }

    /// Whether the default template applies to `row`; no conditions means
    /// always.
    pub fn applies_to(&self, row: &DataRow) -> Result<bool, ConfigError> {
        Ok(self.conditions.is_empty() || check_all_conditions(row, &self.conditions, false, None)?)
    }

    /// Applies the variants to `results` (the default template after
    /// section expansion) and substitutes the row.
    ///
    /// The first passing conditional variant wins; later conditional
    /// variants then fall through to the default values.
    pub fn render(
        &self,
        ctx: &mut RenderContext,
        scope: &ValueScope<'_>,
        row: &DataRow,
        results: String,
    ) -> Result<RowOutcome, GenerateError> {
        if self.variants.is_empty() {
            let rendered = ctx.replace_values(scope, row, &self.params, &results, None)?;
            return Ok(RowOutcome::Render(rendered));
        }

        let mut results = results;
        let mut used = false;
        for variant in &self.variants {
            match variant {
                TemplateVariant::Conditional {
                    name,
                    conditions,
                    location,
                } => {
                    if check_all_conditions(row, conditions, used, None)? {
                        used = true;
                        if location.ends_with(NONE_TEMPLATE) {
                            info!("template {} suppresses this row", name);
                            return Ok(RowOutcome::Suppressed);
                        }
                        let template = ctx.read_template(location)?;
                        let params = ctx.scan(&template);
                        results = ctx.replace_values(scope, row, &params, &template, None)?;
                    } else {
                        results = ctx.replace_values(scope, row, &self.params, &results, None)?;
                    }
                }
                TemplateVariant::ParameterSplice {
                    template_file,
                    parameter,
                    ..
                } => {
                    let fragment = ctx.read_template(template_file)?;
                    results = results.replace(parameter.as_str(), &fragment);
                    results = ctx.replace_values(scope, row, &self.params, &results, None)?;
                }
            }
        }
        Ok(RowOutcome::Render(results))
    }
}

impl TemplateDescriptor {
    pub fn conditions(&self) -> &[Condition] {
        self.condition
            .as_ref()
            .map(OneOrMany::as_slice)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParameterTemplate;
    use crate::delimiters::Delimiters;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn row(pairs: &[(&str, &str)]) -> DataRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn descriptor(name: &str, file_name: &str) -> TemplateDescriptor {
        TemplateDescriptor {
            name: name.into(),
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    fn when(column: &str, value: &str) -> Option<OneOrMany<Condition>> {
        Some(OneOrMany::One(Condition {
            column_name: Some(column.into()),
            conditional_value: "=".into(),
            column_value: Some(value.into()),
            ..Default::default()
        }))
    }

    fn setup(files: &[(&str, &str)]) -> (TempDir, RenderContext) {
        let dir = tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let ctx = RenderContext::new(Delimiters::default(), false, dir.path()).unwrap();
        (dir, ctx)
    }

    #[test]
    fn test_resolve_templates() {
        let mut other = descriptor("other", "other.xml");
        other.condition = when("TYPE", "B");
        let templates = vec![descriptor("default", "a.xml"), other];

        let (default, variants) = resolve_templates(&templates).unwrap();

        assert_eq!(default.file_name, "a.xml");
        assert_eq!(variants.len(), 1);
        assert!(matches!(&variants[0], TemplateVariant::Conditional { name, .. } if name == "other"));
    }

    #[test]
    fn test_resolve_templates_errors() {
        assert!(matches!(
            resolve_templates(&[descriptor("x", "x.xml")]),
            Err(ConfigError::VariantWithoutSelector(_))
        ));
        assert!(matches!(
            resolve_templates(&[]),
            Err(ConfigError::MissingDefaultTemplate(_))
        ));
        assert!(matches!(
            resolve_templates(&[descriptor("default", "a"), descriptor("default", "b")]),
            Err(ConfigError::DuplicateDefaultTemplate(_))
        ));
    }

    #[test]
    fn test_default_condition() {
        let (_dir, ctx) = setup(&[("a.xml", "<A>{ID}</A>")]);
        let mut default = descriptor("default", "a.xml");
        default.condition = when("ACTIVE", "Y");
        let set = TemplateSet::load(&ctx, &[default]).unwrap();

        assert!(set.applies_to(&row(&[("ACTIVE", "Y")])).unwrap());
        assert!(!set.applies_to(&row(&[("ACTIVE", "N")])).unwrap());
    }

    #[test]
    fn test_conditional_variant_replaces_document() {
        let (_dir, mut ctx) = setup(&[("a.xml", "<A>{ID}</A>"), ("b.xml", "<B>{ID}</B>")]);
        let mut other = descriptor("b", "b.xml");
        other.condition = when("TYPE", "B");
        let set = TemplateSet::load(&ctx, &[descriptor("default", "a.xml"), other]).unwrap();
        let scope = ValueScope::default();

        let b = row(&[("ID", "1"), ("TYPE", "B")]);
        let out = set.render(&mut ctx, &scope, &b, set.text.clone()).unwrap();
        assert_eq!(out, RowOutcome::Render("<B>1</B>".into()));

        let a = row(&[("ID", "2"), ("TYPE", "A")]);
        let out = set.render(&mut ctx, &scope, &a, set.text.clone()).unwrap();
        assert_eq!(out, RowOutcome::Render("<A>2</A>".into()));
    }

    #[test]
    fn test_none_variant_suppresses() {
        let (_dir, mut ctx) = setup(&[("a.xml", "<A>{ID}</A>")]);
        let mut none = descriptor("skip", NONE_TEMPLATE);
        none.condition = when("SKIP", "Y");
        let set = TemplateSet::load(&ctx, &[descriptor("default", "a.xml"), none]).unwrap();

        let out = set
            .render(&mut ctx, &ValueScope::default(), &row(&[("SKIP", "Y")]), set.text.clone())
            .unwrap();
        assert_eq!(out, RowOutcome::Suppressed);
    }

    #[test]
    fn test_parameter_splice() {
        let (_dir, mut ctx) = setup(&[
            ("a.xml", "<A>{ID}{EXTRA}</A>"),
            ("extra.xml", "<E>fixed</E>"),
        ]);
        let mut splice = descriptor("extra", "");
        splice.parameter_template = Some(ParameterTemplate {
            template_file: "extra.xml".into(),
            parameter: "{EXTRA}".into(),
        });
        let set = TemplateSet::load(&ctx, &[descriptor("default", "a.xml"), splice]).unwrap();

        let out = set
            .render(&mut ctx, &ValueScope::default(), &row(&[("ID", "9")]), set.text.clone())
            .unwrap();
        assert_eq!(out, RowOutcome::Render("<A>9<E>fixed</E></A>".into()));
    }
}
