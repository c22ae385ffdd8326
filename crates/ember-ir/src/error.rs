//! Error types shared by every stage of the IR.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::origin::Origin;
use crate::ty::TypeKind;

// ══════════════════════════════════════════════════════════════════════════════
// Classification
// ══════════════════════════════════════════════════════════════════════════════

/// The three classes of fatal conditions a compilation can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Malformed operands, incomplete types, redefinitions, bad literals.
    Source,
    /// Something the active backend cannot encode.
    Target,
    /// Incompatible operand kinds or arithmetic failure during folding.
    Numeric,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
            Self::Numeric => write!(f, "numeric"),
        }
    }
}

/// A structured, serializable report of the first fatal error.
///
/// Tools render these; they must not parse free-form strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub class: ErrorClass,
    pub message: String,
    /// Source file name, or `<builtin>` for synthesized code.
    pub file: String,
    /// 1-based line; 0 when unknown.
    pub line: u32,
    /// 1-based column; 0 when unknown.
    pub column: u32,
}

impl Diagnostic {
    pub fn new(class: ErrorClass, message: impl Into<String>, pos: &Origin) -> Self {
        Self {
            class,
            message: message.into(),
            file: pos.file.to_string(),
            line: pos.line,
            column: pos.col,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file)?;
        if self.line != 0 {
            write!(f, ":{}", self.line)?;
            if self.column != 0 {
                write!(f, ":{}", self.column)?;
            }
        }
        write!(f, ": {} error: {}", self.class, self.message)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Algebra errors
// ══════════════════════════════════════════════════════════════════════════════

/// Failure raised by type promotion and value arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("invalid operands to {op}: {left} and {right}")]
    Binary {
        op: &'static str,
        left: TypeKind,
        right: TypeKind,
    },

    #[error("invalid operand to {op}: {operand}")]
    Unary { op: &'static str, operand: TypeKind },

    #[error("cannot convert {from} to {to}")]
    Convert { from: TypeKind, to: TypeKind },

    #[error("division by zero")]
    DivByZero,

    #[error("shift amount {0} out of range")]
    ShiftRange(String),
}

impl TypeError {
    pub fn binary(op: &'static str, left: TypeKind, right: TypeKind) -> Self {
        Self::Binary { op, left, right }
    }
}

/// Failure decoding a numeric literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("empty numeric literal")]
    Empty,

    #[error("invalid digit '{digit}' in base {base} literal")]
    BadDigit { digit: char, base: u32 },

    #[error("malformed literal suffix '{0}'")]
    BadSuffix(String),

    #[error("malformed exponent in '{0}'")]
    BadExponent(String),

    #[error("literal width {bits} exceeds {max} bits")]
    TooWide { bits: u32, max: u32 },

    #[error("exponent {0} out of range")]
    ExponentRange(i64),

    #[error("unexpected trailing characters '{0}'")]
    Trailing(String),
}

/// Failure in the glyph table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlyphError {
    #[error("glyph '{0}' is already bound")]
    AlreadyBound(String),

    #[error("glyph '{0}' is not bound")]
    Unbound(String),

    #[error("glyph '{0}' is bound to a value of a different type")]
    TypeMismatch(String),

    #[error("'{0}' is already defined")]
    Redefined(String),

    #[error("glyph '{0}' would be bound to an expression that refers to itself")]
    Cyclic(String),
}

// ══════════════════════════════════════════════════════════════════════════════
// Expression errors
// ══════════════════════════════════════════════════════════════════════════════

/// Failure while typing, folding or generating code for an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpError {
    /// The expression references something only known at run time.
    #[error("{pos}: expression is not constant")]
    NotConstant { pos: Origin },

    #[error("{pos}: {source}")]
    Type {
        #[source]
        source: TypeError,
        pos: Origin,
    },

    #[error("{pos}: {source}")]
    Glyph {
        #[source]
        source: GlyphError,
        pos: Origin,
    },

    /// Code generation has no instruction shape for this expression.
    #[error("{pos}: cannot generate code for {what}")]
    Unsupported { what: String, pos: Origin },

    #[error("{pos}: {message}")]
    Malformed { message: String, pos: Origin },
}

impl ExpError {
    pub fn not_constant(pos: &Origin) -> Self {
        Self::NotConstant { pos: pos.clone() }
    }

    pub fn ty(source: TypeError, pos: &Origin) -> Self {
        Self::Type {
            source,
            pos: pos.clone(),
        }
    }

    pub fn unsupported(what: impl Into<String>, pos: &Origin) -> Self {
        Self::Unsupported {
            what: what.into(),
            pos: pos.clone(),
        }
    }

    pub fn malformed(message: impl Into<String>, pos: &Origin) -> Self {
        Self::Malformed {
            message: message.into(),
            pos: pos.clone(),
        }
    }

    pub fn pos(&self) -> &Origin {
        match self {
            Self::NotConstant { pos }
            | Self::Type { pos, .. }
            | Self::Glyph { pos, .. }
            | Self::Unsupported { pos, .. }
            | Self::Malformed { pos, .. } => pos,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Type { .. } | Self::NotConstant { .. } => ErrorClass::Numeric,
            Self::Unsupported { .. } => ErrorClass::Target,
            Self::Glyph { .. } | Self::Malformed { .. } => ErrorClass::Source,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let message = match self {
            Self::NotConstant { .. } => "expression is not constant".to_string(),
            Self::Type { source, .. } => source.to_string(),
            Self::Glyph { source, .. } => source.to_string(),
            Self::Unsupported { what, .. } => format!("cannot generate code for {what}"),
            Self::Malformed { message, .. } => message.clone(),
        };
        Diagnostic::new(self.class(), message, self.pos())
    }
}
