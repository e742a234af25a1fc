use std::fmt;

use serde::{Deserialize, Serialize};

use super::manager::ManagerError;

pub const IMPORT_ID_SEPARATOR: char = '/';

/// Stable key of a resource instance at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Hierarchical { parent: String, name: String },
    Flat { name: String },
}

impl Identity {
    pub fn flat(name: impl Into<String>) -> Self {
        Identity::Flat { name: name.into() }
    }
    pub fn hierarchical(parent: impl Into<String>, name: impl Into<String>) -> Self {
        Identity::Hierarchical {
            parent: parent.into(),
            name: name.into(),
        }
    }
    pub fn name(&self) -> &str {
        match self {
            Identity::Flat { name } | Identity::Hierarchical { name, .. } => name,
        }
    }
    pub fn parent(&self) -> Option<&str> {
        match self {
            Identity::Hierarchical { parent, .. } => Some(parent),
            Identity::Flat { .. } => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Flat { name } => write!(f, "{}", name),
            Identity::Hierarchical { parent, name } => {
                write!(f, "{}{}{}", parent, IMPORT_ID_SEPARATOR, name)
            }
        }
    }
}

/// Shape of the external identifier accepted by `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    /// A bare name, e.g. `<map-name>`.
    Flat { pattern: &'static str },
    /// Exactly two non-empty parts, e.g. `<asg-name>/<lifecycle-hook-name>`.
    Hierarchical { pattern: &'static str },
}

impl ImportFormat {
    pub fn pattern(&self) -> &'static str {
        match self {
            ImportFormat::Flat { pattern } | ImportFormat::Hierarchical { pattern } => pattern,
        }
    }

    /// Parses an external identifier without contacting the provider.
    pub fn parse(&self, external_id: &str) -> Result<Identity, ManagerError> {
        let format_error = || ManagerError::ImportFormat {
            id: external_id.to_string(),
            expected: self.pattern().to_string(),
        };
        match self {
            ImportFormat::Flat { .. } => {
                if external_id.is_empty() || external_id.contains(IMPORT_ID_SEPARATOR) {
                    return Err(format_error());
                }
                Ok(Identity::flat(external_id))
            }
            ImportFormat::Hierarchical { .. } => {
                let mut parts = external_id.splitn(2, IMPORT_ID_SEPARATOR);
                match (parts.next(), parts.next()) {
                    (Some(parent), Some(name)) if !parent.is_empty() && !name.is_empty() => {
                        Ok(Identity::hierarchical(parent, name))
                    }
                    _ => Err(format_error()),
                }
            }
        }
    }
}
