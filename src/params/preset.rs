use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use super::TransformSpec;
use crate::error::PresetError;

/// Named transform templates, loaded once at startup.
///
/// The table is immutable after construction and shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Presets {
    entries: HashMap<String, TransformSpec>,
}

impl Presets {
    /// An empty table. Every `_name` token fails against it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON object mapping preset names to transform specs.
    ///
    /// Fields missing from a preset take the `TransformSpec` defaults.
    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        let entries: HashMap<String, TransformSpec> =
            serde_json::from_str(json).map_err(|e| PresetError::Json(e.to_string()))?;

        for (name, spec) in &entries {
            spec.validate().map_err(|reason| PresetError::Invalid {
                name: name.clone(),
                reason,
            })?;
        }

        Ok(Self { entries })
    }

    /// Load presets from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, PresetError> {
        let json = std::fs::read_to_string(path).map_err(|e| PresetError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let presets = Self::from_json(&json)?;
        info!(path = %path.display(), count = presets.len(), "Loaded presets");
        Ok(presets)
    }

    /// Look up a preset by exact name.
    pub fn get(&self, name: &str) -> Option<&TransformSpec> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
