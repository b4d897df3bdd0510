use std::collections::HashMap;

use crate::error::StructureError;

/// Names and short codes of a model's compartments, in state order.
///
/// Lookups accept either the name or the code, case-insensitively.
#[derive(Debug, Clone, PartialEq)]
pub struct Compartments {
    names: Vec<String>,
    codes: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl Compartments {
    pub fn new(names: &[&str], codes: &[&str]) -> Result<Self, StructureError> {
        if names.len() != codes.len() {
            return Err(StructureError::LengthMismatch {
                names: names.len(),
                codes: codes.len(),
            });
        }
        let mut lookup = HashMap::with_capacity(2 * names.len());
        for (index, code) in codes.iter().enumerate() {
            if lookup.insert(code.to_lowercase(), index).is_some() {
                return Err(StructureError::DuplicateCode {
                    code: code.to_string(),
                });
            }
        }
        for (index, name) in names.iter().enumerate() {
            match lookup.insert(name.to_lowercase(), index) {
                Some(other) if other != index => {
                    return Err(StructureError::DuplicateCompartment {
                        name: name.to_string(),
                    })
                }
                _ => {}
            }
        }
        Ok(Self {
            names: names.iter().map(|s| s.to_string()).collect(),
            codes: codes.iter().map(|s| s.to_lowercase()).collect(),
            lookup,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn code(&self, index: usize) -> Option<&str> {
        self.codes.get(index).map(String::as_str)
    }

    /// Index of the compartment called `key` (name or code).
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.lookup.get(&key.to_lowercase()).copied()
    }
}
