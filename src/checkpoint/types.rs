//! Parameter file types
//!
//! The file backend keeps every checkpoint of the job in one JSON document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All named parameters persisted by the file backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterFile {
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,
}

impl ParameterFile {
    /// Create an empty parameter file
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a parameter
    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(|p| p.value.as_str())
    }

    /// Overwrite a parameter
    pub fn set(&mut self, name: &str, value: impl Into<String>, now: DateTime<Utc>) {
        self.parameters.insert(
            name.to_string(),
            Parameter {
                value: value.into(),
                updated_at: now,
            },
        );
    }
}

/// One stored parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Stored string value
    pub value: String,
    /// Last overwrite
    pub updated_at: DateTime<Utc>,
}
