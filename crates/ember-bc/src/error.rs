//! Backend error types.

use ember_ir::{Code, Diagnostic, ErrorClass, ExpError, GlyphError, Origin};
use thiserror::Error;

/// Errors that can occur while translating a program to bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BcError {
    /// A statement or operand shape the active target cannot encode.
    #[error("{pos}: {what} is not supported by {target}")]
    Unsupported {
        what: String,
        target: &'static str,
        pos: Origin,
    },

    /// A statement whose operands are malformed regardless of target.
    #[error("{pos}: bad operand {index} to {code}: {reason}")]
    BadArg {
        code: Code,
        index: usize,
        reason: String,
        pos: Origin,
    },

    /// A glyph still had no value when its bytes were emitted.
    #[error("unbound glyph '{0}'")]
    UnboundGlyph(String),

    #[error(transparent)]
    Exp(#[from] ExpError),

    #[error(transparent)]
    Glyph(#[from] GlyphError),

    /// An internal consistency check failed.
    #[error("internal backend error: {0}")]
    Internal(String),
}

impl BcError {
    pub fn unsupported(what: impl Into<String>, target: &'static str, pos: &Origin) -> Self {
        Self::Unsupported {
            what: what.into(),
            target,
            pos: pos.clone(),
        }
    }

    pub fn bad_arg(code: Code, index: usize, reason: impl Into<String>, pos: &Origin) -> Self {
        Self::BadArg {
            code,
            index,
            reason: reason.into(),
            pos: pos.clone(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unsupported { .. } | Self::Internal(_) => ErrorClass::Target,
            Self::BadArg { .. } | Self::UnboundGlyph(_) | Self::Glyph(_) => ErrorClass::Source,
            Self::Exp(e) => e.class(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let builtin = Origin::builtin();
        match self {
            Self::Unsupported { what, target, pos } => Diagnostic::new(
                self.class(),
                format!("{what} is not supported by {target}"),
                pos,
            ),
            Self::BadArg {
                code,
                index,
                reason,
                pos,
            } => Diagnostic::new(
                self.class(),
                format!("bad operand {index} to {code}: {reason}"),
                pos,
            ),
            Self::Exp(e) => e.to_diagnostic(),
            other => Diagnostic::new(other.class(), other.to_string(), &builtin),
        }
    }
}

/// Backend result type alias.
pub type BcResult<T> = Result<T, BcError>;
