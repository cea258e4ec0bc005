//! Spreadsheet-driven file generation.
//!
//! A *profile* (JSON or YAML) names a worksheet, a default template and any
//! number of sections that expand, filter or splice fragments into it. Each
//! eligible worksheet row is merged into the template and written as one
//! output file, optionally alongside aggregated simulator (mock response)
//! files.

pub mod conditions;
pub mod config;
pub mod delimiters;
pub mod error;
pub mod files;
pub mod filtered;
pub mod formatting;
pub mod generator;
pub mod repeating;
pub mod scanner;
pub mod selector;
pub mod simulator;
pub mod substitution;
pub mod workbook;

pub use config::{ConfigError, Profile};
pub use error::GenerateError;
pub use generator::{generate_profiles, GenerationReport, ProfileGenerator};
pub use substitution::{RenderContext, ValueScope};
pub use workbook::{DataRow, Workbook};
