//! Identity of an operation or sequence.

use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{OpflowError, Result};

/// Name, version and description of a unit of work.
///
/// Two definitions with the same name but different versions are distinct
/// units of work; reports always record the version that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Definition {
    /// Unique, human-readable name (e.g. "deploy-registry").
    pub name: String,

    /// Semantic version of the handler logic.
    pub version: Version,

    /// Free-form description.
    pub description: String,
}

impl Definition {
    /// Create a new definition.
    pub fn new(name: impl Into<String>, version: Version, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version,
            description: description.into(),
        }
    }

    /// Create a definition from a version string such as "1.2.0".
    pub fn parse(
        name: impl Into<String>,
        version: &str,
        description: impl Into<String>,
    ) -> Result<Self> {
        let version = Version::parse(version).map_err(|e| OpflowError::InvalidVersion {
            version: version.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(name, version, description))
    }

    /// Returns true if `other` names the same unit of work at the same version.
    pub fn same_identity(&self, other: &Definition) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}
