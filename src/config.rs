//! Engine configuration loaded from TOML.
//!
//! ```toml
//! [interpreter]
//! number = 6
//! revision = "A"
//!
//! [screen]
//! width = 80
//! height = 24
//!
//! [engine]
//! max_stack_depth = 32768
//! instruction_limit = 5000000
//! random_seed = 42
//! ```

use crate::error::{VmError, VmResult};
use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub interpreter: InterpreterConfig,
    pub screen: ScreenConfig,
    pub engine: ExecutionConfig,
}

/// Values reported to the story in header bytes 0x1E/0x1F.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InterpreterConfig {
    pub number: u8,
    pub revision: char,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            number: 6,
            revision: 'A',
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: u8,
    pub height: u8,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        ScreenConfig {
            width: 80,
            height: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on the evaluation stack, catches runaway recursion
    pub max_stack_depth: usize,
    /// Stop `run()` after this many instructions
    pub instruction_limit: Option<u64>,
    /// Seed for the story's random number generator; entropy when absent
    pub random_seed: Option<u64>,
    /// Instructions a timed-input interrupt routine may execute
    pub timer_instruction_limit: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            max_stack_depth: 32768,
            instruction_limit: None,
            random_seed: None,
            timer_instruction_limit: 100_000,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> VmResult<Self> {
        toml::from_str(text).map_err(|e| VmError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> VmResult<Self> {
        debug!("Loading engine configuration from {}", path.display());
        let text = fs::read_to_string(path)
            .map_err(|e| VmError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.screen.width, 80);
        assert_eq!(config.interpreter.number, 6);
        assert_eq!(config.engine.max_stack_depth, 32768);
    }

    #[test]
    fn test_partial_config_overrides_only_given_keys() {
        let config = EngineConfig::from_toml_str(
            r#"
            [screen]
            height = 50

            [engine]
            random_seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.screen.height, 50);
        assert_eq!(config.screen.width, 80);
        assert_eq!(config.engine.random_seed, Some(7));
        assert_eq!(config.engine.instruction_limit, None);
    }

    #[test]
    fn test_bad_config_is_reported() {
        let err = EngineConfig::from_toml_str("[screen]\nwidth = \"wide\"").unwrap_err();
        assert!(matches!(err, VmError::Config(_)));
    }
}
