//! Export configuration
//!
//! Options controlling one export. They can be read from a JSON file and
//! then overridden field by field (the CLI does this with its flags).
//!
//! ```text
//! { "name": "net", "scratch": "static", "weight_alignment": 4, "weights_header": true }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ExportError;
use crate::scratch::ScratchStrategy;
use crate::trace::is_c_identifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Namespace of every generated symbol (`<name>_t`, `<name>_fn`, ...)
    pub name: String,
    #[serde(default)]
    pub scratch: ScratchStrategy,
    /// Byte alignment of each weight offset; 1 packs spans back-to-back
    #[serde(default = "default_alignment")]
    pub weight_alignment: usize,
    /// Also render the blob as a C array header
    #[serde(default)]
    pub weights_header: bool,
}

fn default_alignment() -> usize {
    1
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::new("net")
    }
}

impl ExportConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scratch: ScratchStrategy::default(),
            weight_alignment: default_alignment(),
            weights_header: false,
        }
    }

    pub fn with_scratch(mut self, scratch: ScratchStrategy) -> Self {
        self.scratch = scratch;
        self
    }

    pub fn with_weight_alignment(mut self, alignment: usize) -> Self {
        self.weight_alignment = alignment;
        self
    }

    pub fn with_weights_header(mut self, enabled: bool) -> Self {
        self.weights_header = enabled;
        self
    }

    /// Load a configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let bytes = std::fs::read(path)?;
        let config: ExportConfig = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        if !is_c_identifier(&self.name) {
            return Err(ExportError::InvalidConfig(format!(
                "export name {:?} is not a C identifier",
                self.name
            )));
        }
        if self.weight_alignment == 0 || !self.weight_alignment.is_power_of_two() {
            return Err(ExportError::InvalidConfig(format!(
                "weight alignment must be a power of two, got {}",
                self.weight_alignment
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config: ExportConfig = serde_json::from_str(r#"{ "name": "train" }"#).unwrap();
        assert_eq!(config.name, "train");
        assert_eq!(config.scratch, ScratchStrategy::Heap);
        assert_eq!(config.weight_alignment, 1);
        assert!(!config.weights_header);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{ "name": "net", "scratch": "static", "weight_alignment": 4, "weights_header": true }}"#
        )
        .unwrap();

        let config = ExportConfig::load(file.path()).unwrap();
        assert_eq!(config.scratch, ScratchStrategy::Static);
        assert_eq!(config.weight_alignment, 4);
        assert!(config.weights_header);
    }

    #[test]
    fn test_invalid_name() {
        let config = ExportConfig::new("my-net");
        assert!(matches!(
            config.validate(),
            Err(ExportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_alignment() {
        assert!(ExportConfig::new("net").with_weight_alignment(0).validate().is_err());
        assert!(ExportConfig::new("net").with_weight_alignment(3).validate().is_err());
        assert!(ExportConfig::new("net").with_weight_alignment(8).validate().is_ok());
    }
}
