//! Compiler configuration: target selection, target options and logging.
//!
//! Everything deserializes from JSON with defaults for missing fields, so a
//! config file only names what it changes.

use std::path::Path;

use ember_bc::ZdacsConfig;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::CompileError;

// ══════════════════════════════════════════════════════════════════════════════
// Logging
// ══════════════════════════════════════════════════════════════════════════════

/// Verbosity of one log target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored; for development.
    Pretty,
    #[default]
    Compact,
    /// One JSON object per event; for tool integration.
    Json,
}

/// Log targets, one per pipeline layer.
pub const TARGET_IR: &str = "ember::ir";
pub const TARGET_BC: &str = "ember::bc";
pub const TARGET_COMPILER: &str = "ember::compiler";

/// Global log level with optional per-layer overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub global: LogLevel,
    pub ir: Option<LogLevel>,
    pub bc: Option<LogLevel>,
    pub compiler: Option<LogLevel>,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: LogLevel::Warn,
            ir: None,
            bc: None,
            compiler: None,
            format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    /// Effective level for a log target.
    pub fn level_for(&self, target: &str) -> Level {
        let level = match target {
            TARGET_IR => self.ir,
            TARGET_BC => self.bc,
            TARGET_COMPILER => self.compiler,
            _ => None,
        };
        level.unwrap_or(self.global).into()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Compile configuration
// ══════════════════════════════════════════════════════════════════════════════

/// Bytecode target to compile for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Zdacs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    pub target: TargetKind,
    pub zdacs: ZdacsConfig,
    pub log: LogConfig,
}

impl CompileConfig {
    pub fn from_json(text: &str) -> Result<Self, CompileError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CompileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let cfg = CompileConfig::from_json("{}").unwrap();
        assert_eq!(cfg, CompileConfig::default());
        assert_eq!(cfg.target, TargetKind::Zdacs);
        assert_eq!(cfg.zdacs.init_script_number, 999);
    }

    #[test]
    fn test_nested_overrides() {
        let cfg = CompileConfig::from_json(
            r#"{
                "zdacs": { "use_fake_acs0": true, "init_script_number": 900 },
                "log": { "global": "info", "bc": "trace", "format": "json" }
            }"#,
        )
        .unwrap();
        assert!(cfg.zdacs.use_fake_acs0);
        assert_eq!(cfg.zdacs.init_script_number, 900);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level_for(TARGET_BC), Level::TRACE);
        assert_eq!(cfg.log.level_for(TARGET_IR), Level::INFO);
    }

    #[test]
    fn test_unknown_target_rejected() {
        let err = CompileConfig::from_json(r#"{"target": "wasm"}"#).unwrap_err();
        assert!(matches!(err, CompileError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CompileConfig::load("/nonexistent/ember.json").unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }
}
