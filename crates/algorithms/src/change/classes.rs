//! Land-cover class scheme

use serde::{Deserialize, Serialize};

use covershift_core::{Error, Result};

use super::transition::MAX_TRANSITION_CLASS;

/// A class code and its display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub code: u8,
    pub name: String,
}

/// Ordered list of the classes reported by change analysis.
///
/// The order is the order of rows in every statistics product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassScheme {
    classes: Vec<ClassEntry>,
}

impl Default for ClassScheme {
    fn default() -> Self {
        let classes = [
            (1, "Forest"),
            (2, "Water"),
            (3, "Agriculture"),
            (4, "Barren"),
            (5, "Built-up"),
        ]
        .into_iter()
        .map(|(code, name)| ClassEntry {
            code,
            name: name.to_string(),
        })
        .collect();
        Self { classes }
    }
}

impl ClassScheme {
    pub fn new(classes: Vec<ClassEntry>) -> Result<Self> {
        let scheme = Self { classes };
        scheme.validate()?;
        Ok(scheme)
    }

    /// Codes must be unique and transition-encodable.
    pub fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(Error::InvalidParameter {
                name: "classes",
                value: "[]".into(),
                reason: "at least one class is required".into(),
            });
        }
        for (i, entry) in self.classes.iter().enumerate() {
            if entry.code == 0 || entry.code > MAX_TRANSITION_CLASS {
                return Err(Error::InvalidParameter {
                    name: "classes",
                    value: entry.code.to_string(),
                    reason: format!("class codes must be in 1..={}", MAX_TRANSITION_CLASS),
                });
            }
            if self.classes[..i].iter().any(|e| e.code == entry.code) {
                return Err(Error::InvalidParameter {
                    name: "classes",
                    value: entry.code.to_string(),
                    reason: "duplicate class code".into(),
                });
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.iter()
    }

    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.classes.iter().map(|e| e.code)
    }

    pub fn name(&self, code: u8) -> Option<&str> {
        self.classes
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
