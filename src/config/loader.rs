/// Configuration loading from a JSON file
use crate::config::types::{FilterError, Result, RunConfig};
use std::path::Path;

impl RunConfig {
    /// Load a run configuration. Missing fields take their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_content = std::fs::read_to_string(path).map_err(|e| {
            FilterError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&config_content)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| FilterError::Config(format!("Failed to parse config JSON: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FilterError::Config(format!("Failed to encode config JSON: {}", e)))
    }
}
