//! Row conditions used to gate templates, sections and simulator entries.

use log::warn;
use std::cmp::Ordering;

use crate::config::{Condition, ConfigError};
use crate::workbook::DataRow;

/// Comparison target meaning "empty cell".
pub const EMPTY_SENTINEL: &str = "%EMPTY%";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "=" | "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            "<" => Some(Operator::Lt),
            ">" => Some(Operator::Gt),
            "<=" => Some(Operator::Le),
            ">=" => Some(Operator::Ge),
            _ => None,
        }
    }

    /// String comparison; values are never coerced to numbers.
    pub fn compare(self, left: &str, right: &str) -> bool {
        let ord = left.cmp(right);
        match self {
            Operator::Eq => ord == Ordering::Equal,
            Operator::Ne => ord != Ordering::Equal,
            Operator::Lt => ord == Ordering::Less,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Le => ord != Ordering::Greater,
            Operator::Ge => ord != Ordering::Less,
        }
    }
}

fn index_text(index: Option<usize>) -> String {
    index.map(|i| i.to_string()).unwrap_or_default()
}

/// Column a condition reads: `prefix + index + suffix` when it carries a
/// `uniqueIdentifier`, else its `columnName`.
pub fn condition_column(condition: &Condition, index: Option<usize>) -> Option<String> {
    match &condition.unique_identifier {
        Some(id) => Some(format!("{}{}{}", id.prefix, index_text(index), id.suffix)),
        None => condition.column_name.clone(),
    }
}

/// Evaluates one condition against a cell value. A missing cell compares
/// as the empty string; an unknown operator is logged and evaluates false.
pub fn check_condition(
    row_value: Option<&str>,
    condition: &Condition,
    index: Option<usize>,
) -> Result<bool, ConfigError> {
    let target = match (&condition.column_value, &condition.unique_identifier) {
        (Some(value), _) => value.clone(),
        (None, Some(id)) => format!("{}{}{}", id.prefix, index_text(index), id.suffix),
        (None, None) => return Err(ConfigError::ConditionTarget),
    };
    let target = if target == EMPTY_SENTINEL { "" } else { target.as_str() };
    let value = row_value.unwrap_or_default();

    match Operator::parse(&condition.conditional_value) {
        Some(op) => Ok(op.compare(value, target)),
        None => {
            warn!(
                "template condition ({:?}) is not valid",
                condition.conditional_value
            );
            Ok(false)
        }
    }
}

/// ANDs every condition against `row`.
///
/// Returns false without evaluating when `already_used` is set (an earlier
/// alternative already matched) or when `conditions` is empty.
pub fn check_all_conditions(
    row: &DataRow,
    conditions: &[Condition],
    already_used: bool,
    index: Option<usize>,
) -> Result<bool, ConfigError> {
    if already_used || conditions.is_empty() {
        return Ok(false);
    }
    for condition in conditions {
        let column = condition_column(condition, index);
        let value = column.as_deref().and_then(|c| row.get(c)).map(String::as_str);
        if !check_condition(value, condition, index)? {
            return Ok(false);
        }
    }
    Ok(true)
}
