use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {0}: {1}")]
    Read(String, std::io::Error),
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Ordered class names, indexed by model output position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassCatalog {
    #[serde(default = "default_version")]
    pub version: u32,
    pub classes: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl ClassCatalog {
    pub fn new(classes: Vec<String>) -> Self {
        Self {
            version: default_version(),
            classes,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Read(path.display().to_string(), e))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, CatalogError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}
