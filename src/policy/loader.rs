use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::domain::{RuleSet, RuleSetError};

/// Errors that can occur loading a rule-set definition file.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Invalid(#[from] RuleSetError),

    #[error(transparent)]
    Store(#[from] crate::storage::StoreError),
}

/// Load a rule-set definition from a YAML file.
///
/// The definition is fully validated before use; the commit path performs
/// the same validation again on the serialized bytes.
pub fn load_rule_set(path: impl AsRef<Path>) -> Result<RuleSet, PolicyError> {
    let content = fs::read_to_string(path)?;
    let rule_set: RuleSet = serde_yaml::from_str(&content)?;

    rule_set.validate()?;

    Ok(rule_set)
}

/// Loader bound to a definition file path.
pub struct RuleSetLoader {
    path: String,
}

impl RuleSetLoader {
    pub fn new(path: impl Into<String>) -> Self {
        RuleSetLoader { path: path.into() }
    }

    /// Load the definition and its serialized commit bytes.
    pub fn load(&self) -> Result<(RuleSet, Vec<u8>), PolicyError> {
        let rule_set = load_rule_set(&self.path)?;
        let bytes = rule_set.to_bytes()?;
        Ok((rule_set, bytes))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
