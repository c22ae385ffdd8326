//! Compiler error types.

use std::path::PathBuf;

use ember_bc::BcError;
use ember_ir::{Diagnostic, ErrorClass, Origin};
use thiserror::Error;

/// Errors surfaced by the compiler pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The backend rejected the program.
    #[error(transparent)]
    Backend(#[from] BcError),

    /// A configuration document could not be read.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A global log subscriber was already installed.
    #[error("logging already initialized: {0}")]
    Logging(String),
}

impl CompileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Backend errors keep their own class; everything else is an
    /// environment problem the target side reports.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Backend(e) => e.class(),
            Self::Config(_) | Self::Io { .. } | Self::Logging(_) => ErrorClass::Target,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Backend(e) => e.to_diagnostic(),
            Self::Io { path, source } => Diagnostic::new(
                self.class(),
                source.to_string(),
                &Origin::new(path.display().to_string(), 0, 0),
            ),
            other => Diagnostic::new(other.class(), other.to_string(), &Origin::builtin()),
        }
    }
}
