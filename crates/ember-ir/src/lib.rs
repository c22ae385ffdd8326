//! Intermediate representation for the Ember compiler.
//!
//! This crate defines the value/type algebra, numeric literal decoding,
//! expression trees with constant folding and code generation, the program
//! model walked by the backend, the glyph table and the shared error types.

mod code;
mod error;
mod glyph;
mod literal;
mod origin;
pub mod exp;
pub mod program;
pub mod ty;
pub mod value;

pub use code::Code;
pub use error::{Diagnostic, ErrorClass, ExpError, GlyphError, LiteralError, TypeError};
pub use exp::{BinaryOp, Exp, ExpKind, ExpRef, GenCtx, UnaryOp};
pub use glyph::{GlyphData, GlyphTable};
pub use literal::{parse_number, LiteralSuffix};
pub use origin::Origin;
pub use program::{
    Arg, ArgArr, ArgLit, ArgReg, Block, Function, Linkage, Object, Program, ScriptType, Space,
    SpaceKey, Statement, StrEnt,
};
pub use ty::{AddrBase, CallType, Type, TypeFixed, TypeFloat, TypeKind, TypePoint, WORD_BITS};
pub use value::{Value, ValueFixed, ValueFloat, ValuePoint};

/// Result type used by expression evaluation.
pub type ExpResult<T> = std::result::Result<T, ExpError>;
