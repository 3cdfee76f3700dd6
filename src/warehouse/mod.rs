//! Warehouse layer - connection handling, SQL construction, and the load
//! state machine.

pub mod connection;
pub mod loader;
pub mod sql;

pub use connection::{ConnectionParams, ConnectionParamsBuilder, Connector};
pub use loader::{LoadOutcome, WarehouseLoader};

use crate::error::{LoadError, Result};

/// The table a load writes into. Assumed to pre-exist with columns
/// compatible with the batch.
#[derive(Debug, Clone)]
pub struct Target {
    pub schema: String,
    pub table: String,
}

impl Target {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

/// Role the warehouse assumes when it reads the staging artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IamRole {
    /// The warehouse's default associated role.
    #[default]
    Default,
    Arn(String),
}

impl IamRole {
    /// Treats `None` and blank ARNs as the default role.
    pub fn from_arn(arn: Option<String>) -> Self {
        match arn {
            Some(arn) if !arn.trim().is_empty() => IamRole::Arn(arn),
            _ => IamRole::Default,
        }
    }
}

/// What to do with batch rows whose dedup key already exists in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateAction {
    /// Keep the target row, drop the batch row.
    Ignore,
    /// Update every non-key column from the batch row.
    Overwrite,
    /// Update only the listed columns.
    Merge(Vec<String>),
}

impl DuplicateAction {
    /// Parse an action string. Anything other than `ignore`, `overwrite`,
    /// or a well-formed `merge(col1, col2, ...)` is rejected.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        match trimmed {
            "ignore" => Ok(DuplicateAction::Ignore),
            "overwrite" => Ok(DuplicateAction::Overwrite),
            _ => {
                let Some(body) = trimmed.strip_prefix("merge(") else {
                    return Err(LoadError::configuration(format!(
                        "unrecognized on-duplicate action '{text}'"
                    )));
                };
                let body = body.strip_suffix(')').ok_or_else(|| {
                    LoadError::configuration(format!(
                        "unterminated on-duplicate action '{text}'"
                    ))
                })?;
                let columns: Vec<String> = body
                    .split(',')
                    .map(|column| column.trim().to_string())
                    .filter(|column| !column.is_empty())
                    .collect();
                if columns.is_empty() {
                    return Err(LoadError::configuration(
                        "merge(...) action lists no columns",
                    ));
                }
                Ok(DuplicateAction::Merge(columns))
            }
        }
    }
}

/// Deduplication request: the key columns plus the on-duplicate action.
#[derive(Debug, Clone)]
pub struct DedupSpec {
    pub key_columns: Vec<String>,
    pub action: DuplicateAction,
}

impl DedupSpec {
    /// Build a spec from CLI-shaped inputs. A missing action defaults to
    /// `ignore`; an empty key set is rejected here, before any I/O.
    pub fn new(key_columns: Vec<String>, action: Option<&str>) -> Result<Self> {
        if key_columns.is_empty() {
            return Err(LoadError::configuration(
                "deduplication requires at least one key column",
            ));
        }
        let action = match action {
            Some(text) => DuplicateAction::parse(text)?,
            None => DuplicateAction::Ignore,
        };
        Ok(Self {
            key_columns,
            action,
        })
    }
}
