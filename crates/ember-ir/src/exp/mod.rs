//! Expression trees and the constant evaluator.
//!
//! Nodes are immutable and shared through [`ExpRef`]. Rewrites build new
//! nodes; nothing in the backend mutates an expression in place.
//!
//! Every node answers three questions, each given the glyph table:
//!
//! - [`Exp::get_type`]: the result type, derived from the children's types.
//! - [`Exp::get_value`]: the folded constant, or [`ExpError::NotConstant`].
//! - [`Exp::gen_stmnt`]: code computing the node at run time (see [`gen`]).
//!
//! [`Exp::is_constant_foldable`] is the structural twin of `get_value`: a
//! node reporting itself foldable never yields `NotConstant`, and code
//! generation relies on that to decide whether branches are needed.

pub mod gen;

use std::fmt;
use std::rc::Rc;

use crate::error::{ExpError, GlyphError, TypeError};
use crate::glyph::GlyphTable;
use crate::origin::Origin;
use crate::program::Arg;
use crate::ty::{
    promote_add, promote_bit_and, promote_bit_or_i, promote_bit_or_x, promote_cmp, promote_div,
    promote_mod, promote_mul, promote_shl, promote_shr, promote_sub, CallType, Type,
};
use crate::value::Value;

pub use gen::GenCtx;

/// Shared handle to an immutable expression node.
pub type ExpRef = Rc<Exp>;

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    Inv,
    /// Logical not.
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    ShL,
    ShR,
    BitAnd,
    BitOrI,
    BitOrX,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
    /// `l && r`, yields 0 or 1.
    LogAnd,
    /// `l || r`, yields 0 or 1.
    LogOrI,
    /// `l ^^ r`, yields 0 or 1. Both sides always evaluated.
    LogOrX,
    /// Yields `l` when `l` is false, otherwise `r`.
    NulAnd,
    /// Yields `l` when `l` is true, otherwise `r`.
    NulOrI,
    /// Pointer plus integer without scaling.
    AddPtrRaw,
}

/// How a short-circuiting operator behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ShortCircuit {
    /// Truth value of the left operand that skips the right one.
    pub on: bool,
    /// Result is normalized to 0/1 rather than passing an operand through.
    pub logical: bool,
}

impl BinaryOp {
    pub fn is_compare(self) -> bool {
        matches!(
            self,
            Self::CmpEq | Self::CmpNe | Self::CmpLt | Self::CmpLe | Self::CmpGt | Self::CmpGe
        )
    }

    pub(crate) fn short_circuit(self) -> Option<ShortCircuit> {
        match self {
            Self::NulAnd => Some(ShortCircuit {
                on: false,
                logical: false,
            }),
            Self::NulOrI => Some(ShortCircuit {
                on: true,
                logical: false,
            }),
            Self::LogAnd => Some(ShortCircuit {
                on: false,
                logical: true,
            }),
            Self::LogOrI => Some(ShortCircuit {
                on: true,
                logical: true,
            }),
            _ => None,
        }
    }

    pub fn is_short_circuit(self) -> bool {
        self.short_circuit().is_some()
    }

    fn promote(self, l: &Type, r: &Type) -> Result<Type, TypeError> {
        match self {
            Self::Add | Self::AddPtrRaw => promote_add(l, r),
            Self::Sub => promote_sub(l, r),
            Self::Mul => promote_mul(l, r),
            Self::Div => promote_div(l, r),
            Self::Mod => promote_mod(l, r),
            Self::ShL => promote_shl(l, r),
            Self::ShR => promote_shr(l, r),
            Self::BitAnd => promote_bit_and(l, r),
            Self::BitOrI => promote_bit_or_i(l, r),
            Self::BitOrX => promote_bit_or_x(l, r),
            Self::CmpEq | Self::CmpNe | Self::CmpLt | Self::CmpLe | Self::CmpGt | Self::CmpGe => {
                promote_cmp(l, r).map(|_| Type::BOOL)
            }
            Self::LogAnd | Self::LogOrI | Self::LogOrX => Ok(Type::BOOL),
            // Typed by the caller from operand constancy.
            Self::NulAnd | Self::NulOrI => Ok(r.clone()),
        }
    }

    fn fold(self, l: &Value, r: &Value) -> Result<Value, TypeError> {
        match self {
            Self::Add => l.add(r),
            Self::AddPtrRaw => l.add_ptr_raw(r),
            Self::Sub => l.sub(r),
            Self::Mul => l.mul(r),
            Self::Div => l.div(r),
            Self::Mod => l.rem(r),
            Self::ShL => l.shl(r),
            Self::ShR => l.shr(r),
            Self::BitAnd => l.bit_and(r),
            Self::BitOrI => l.bit_or_i(r),
            Self::BitOrX => l.bit_or_x(r),
            Self::CmpEq => l.cmp_eq(r),
            Self::CmpNe => l.cmp_ne(r),
            Self::CmpLt => l.cmp_lt(r),
            Self::CmpLe => l.cmp_le(r),
            Self::CmpGt => l.cmp_gt(r),
            Self::CmpGe => l.cmp_ge(r),
            Self::LogOrX => Ok(Value::bool(l.is_true() != r.is_true())),
            Self::LogAnd => Ok(Value::bool(l.is_true() && r.is_true())),
            Self::LogOrI => Ok(Value::bool(l.is_true() || r.is_true())),
            Self::NulAnd => Ok(if l.is_true() { r.clone() } else { l.clone() }),
            Self::NulOrI => Ok(if l.is_true() { l.clone() } else { r.clone() }),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::ShL => "<<",
            Self::ShR => ">>",
            Self::BitAnd => "&",
            Self::BitOrI => "|",
            Self::BitOrX => "^",
            Self::CmpEq => "==",
            Self::CmpNe => "!=",
            Self::CmpLt => "<",
            Self::CmpLe => "<=",
            Self::CmpGt => ">",
            Self::CmpGe => ">=",
            Self::LogAnd => "&&",
            Self::LogOrI => "||",
            Self::LogOrX => "^^",
            Self::NulAnd => "?&",
            Self::NulOrI => "?:",
            Self::AddPtrRaw => "+raw",
        };
        f.write_str(s)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Nodes
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum ExpKind {
    /// A constant.
    Value(Value),
    /// A symbolic name, constant once bound.
    Glyph { name: String },
    /// A run-time read of an operand, e.g. a register.
    Arg { arg: Arg, ty: Type },
    Unary { op: UnaryOp, exp: ExpRef },
    Binary { op: BinaryOp, l: ExpRef, r: ExpRef },
    /// `c ? l : r`
    Cnd { c: ExpRef, l: ExpRef, r: ExpRef },
    Tuple(Vec<ExpRef>),
    /// Element `index` of a tuple-typed expression.
    Index { exp: ExpRef, index: u32 },
    /// Conversion to `ty`.
    Cst { ty: Type, exp: ExpRef },
    /// Call returning `ty`. The only node with side effects.
    Call {
        target: ExpRef,
        args: Vec<ExpRef>,
        ty: Type,
    },
}

/// An expression node and its source origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Exp {
    pub kind: ExpKind,
    pub pos: Origin,
}

impl Exp {
    // ── Factories ──

    fn new(kind: ExpKind, pos: Origin) -> ExpRef {
        Rc::new(Exp { kind, pos })
    }

    pub fn value(value: Value, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Value(value), pos)
    }

    /// A literal unsigned word.
    pub fn word(w: u32, pos: Origin) -> ExpRef {
        Self::value(Value::word(w), pos)
    }

    pub fn glyph(name: impl Into<String>, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Glyph { name: name.into() }, pos)
    }

    pub fn arg(arg: Arg, ty: Type, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Arg { arg, ty }, pos)
    }

    pub fn unary(op: UnaryOp, exp: ExpRef, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Unary { op, exp }, pos)
    }

    pub fn binary(op: BinaryOp, l: ExpRef, r: ExpRef, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Binary { op, l, r }, pos)
    }

    pub fn add(l: ExpRef, r: ExpRef, pos: Origin) -> ExpRef {
        Self::binary(BinaryOp::Add, l, r, pos)
    }

    pub fn sub(l: ExpRef, r: ExpRef, pos: Origin) -> ExpRef {
        Self::binary(BinaryOp::Sub, l, r, pos)
    }

    pub fn log_and(l: ExpRef, r: ExpRef, pos: Origin) -> ExpRef {
        Self::binary(BinaryOp::LogAnd, l, r, pos)
    }

    pub fn log_or_i(l: ExpRef, r: ExpRef, pos: Origin) -> ExpRef {
        Self::binary(BinaryOp::LogOrI, l, r, pos)
    }

    pub fn nul_and(l: ExpRef, r: ExpRef, pos: Origin) -> ExpRef {
        Self::binary(BinaryOp::NulAnd, l, r, pos)
    }

    pub fn nul_or_i(l: ExpRef, r: ExpRef, pos: Origin) -> ExpRef {
        Self::binary(BinaryOp::NulOrI, l, r, pos)
    }

    pub fn cnd(c: ExpRef, l: ExpRef, r: ExpRef, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Cnd { c, l, r }, pos)
    }

    pub fn tuple(exps: Vec<ExpRef>, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Tuple(exps), pos)
    }

    pub fn index(exp: ExpRef, index: u32, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Index { exp, index }, pos)
    }

    pub fn cst(ty: Type, exp: ExpRef, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Cst { ty, exp }, pos)
    }

    pub fn call(target: ExpRef, args: Vec<ExpRef>, ty: Type, pos: Origin) -> ExpRef {
        Self::new(ExpKind::Call { target, args, ty }, pos)
    }

    // ── Typing ──

    fn type_err(&self, e: TypeError) -> ExpError {
        ExpError::ty(e, &self.pos)
    }

    fn glyph_err(&self, e: GlyphError) -> ExpError {
        ExpError::Glyph {
            source: e,
            pos: self.pos.clone(),
        }
    }

    /// Result type. Never evaluates operands, except that the left side of
    /// a nullable operator selects which operand's type is passed through
    /// when it is constant.
    pub fn get_type(&self, glyphs: &GlyphTable) -> Result<Type, ExpError> {
        match &self.kind {
            ExpKind::Value(v) => Ok(v.ty()),
            ExpKind::Glyph { name } => {
                let data = glyphs
                    .get(name)
                    .ok_or_else(|| self.glyph_err(GlyphError::Unbound(name.clone())))?;
                match (&data.ty, &data.value) {
                    (Some(ty), _) => Ok(ty.clone()),
                    (None, Some(exp)) => exp.get_type(glyphs),
                    (None, None) => Err(self.glyph_err(GlyphError::Unbound(name.clone()))),
                }
            }
            ExpKind::Arg { ty, .. } => Ok(ty.clone()),
            ExpKind::Unary { op, exp } => {
                let ty = exp.get_type(glyphs)?;
                match op {
                    UnaryOp::Not => Ok(Type::BOOL),
                    UnaryOp::Neg | UnaryOp::Inv => match ty {
                        Type::Fixed(_) => Ok(ty),
                        Type::Float(_) if *op == UnaryOp::Neg => Ok(ty),
                        _ => Err(self.type_err(TypeError::Unary {
                            op: if *op == UnaryOp::Neg { "negate" } else { "bitwise not" },
                            operand: ty.kind(),
                        })),
                    },
                }
            }
            ExpKind::Binary { op, l, r } => {
                let lt = l.get_type(glyphs)?;
                let rt = r.get_type(glyphs)?;
                if let Some(sc) = op.short_circuit().filter(|sc| !sc.logical) {
                    if l.is_constant_foldable(glyphs) {
                        let lv = l.get_value(glyphs)?;
                        if lv.is_true() == sc.on {
                            return Ok(lt);
                        }
                    }
                    return Ok(rt);
                }
                op.promote(&lt, &rt).map_err(|e| self.type_err(e))
            }
            ExpKind::Cnd { c, l, r } => {
                if c.is_constant_foldable(glyphs) {
                    if c.get_value(glyphs)?.is_true() {
                        return l.get_type(glyphs);
                    }
                    return r.get_type(glyphs);
                }
                l.get_type(glyphs)
            }
            ExpKind::Tuple(exps) => exps
                .iter()
                .map(|e| e.get_type(glyphs))
                .collect::<Result<Vec<_>, _>>()
                .map(Type::Multi),
            ExpKind::Index { exp, index } => match exp.get_type(glyphs)? {
                Type::Multi(mut types) if (*index as usize) < types.len() => {
                    Ok(types.swap_remove(*index as usize))
                }
                other => Err(ExpError::malformed(
                    format!("cannot index {other} with element {index}"),
                    &self.pos,
                )),
            },
            ExpKind::Cst { ty, .. } => Ok(ty.clone()),
            ExpKind::Call { ty, .. } => Ok(ty.clone()),
        }
    }

    // ── Folding ──

    /// Fold to a constant.
    pub fn get_value(&self, glyphs: &GlyphTable) -> Result<Value, ExpError> {
        match &self.kind {
            ExpKind::Value(v) => Ok(v.clone()),
            ExpKind::Glyph { name } => match glyphs.value(name) {
                Some(exp) => exp.get_value(glyphs),
                None => Err(ExpError::not_constant(&self.pos)),
            },
            ExpKind::Arg { .. } | ExpKind::Call { .. } => Err(ExpError::not_constant(&self.pos)),
            ExpKind::Unary { op, exp } => {
                let v = exp.get_value(glyphs)?;
                match op {
                    UnaryOp::Neg => v.neg().map_err(|e| self.type_err(e)),
                    UnaryOp::Inv => v.inv().map_err(|e| self.type_err(e)),
                    UnaryOp::Not => Ok(v.not()),
                }
            }
            ExpKind::Binary { op, l, r } => {
                let lv = l.get_value(glyphs)?;
                if let Some(sc) = op.short_circuit() {
                    if lv.is_true() == sc.on {
                        return Ok(if sc.logical { Value::bool(sc.on) } else { lv });
                    }
                }
                let rv = r.get_value(glyphs)?;
                op.fold(&lv, &rv).map_err(|e| self.type_err(e))
            }
            ExpKind::Cnd { c, l, r } => {
                if c.get_value(glyphs)?.is_true() {
                    l.get_value(glyphs)
                } else {
                    r.get_value(glyphs)
                }
            }
            ExpKind::Tuple(exps) => exps
                .iter()
                .map(|e| e.get_value(glyphs))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Multi),
            ExpKind::Index { exp, index } => match exp.get_value(glyphs)? {
                Value::Multi(mut vs) if (*index as usize) < vs.len() => {
                    Ok(vs.swap_remove(*index as usize))
                }
                other => Err(ExpError::malformed(
                    format!("cannot index {} with element {index}", other.ty()),
                    &self.pos,
                )),
            },
            ExpKind::Cst { ty, exp } => exp
                .get_value(glyphs)?
                .convert(ty)
                .map_err(|e| self.type_err(e)),
        }
    }

    /// Whether [`Exp::get_value`] can succeed without hitting a run-time
    /// reference. Numeric failures during folding are still possible.
    pub fn is_constant_foldable(&self, glyphs: &GlyphTable) -> bool {
        match &self.kind {
            ExpKind::Value(_) => true,
            ExpKind::Glyph { name } => glyphs
                .value(name)
                .is_some_and(|exp| exp.is_constant_foldable(glyphs)),
            ExpKind::Arg { .. } | ExpKind::Call { .. } => false,
            ExpKind::Unary { exp, .. } | ExpKind::Index { exp, .. } | ExpKind::Cst { exp, .. } => {
                exp.is_constant_foldable(glyphs)
            }
            ExpKind::Binary { op, l, r } => {
                if !l.is_constant_foldable(glyphs) {
                    return false;
                }
                if let Some(sc) = op.short_circuit() {
                    if l.get_value(glyphs).is_ok_and(|v| v.is_true() == sc.on) {
                        return true;
                    }
                }
                r.is_constant_foldable(glyphs)
            }
            ExpKind::Cnd { c, l, r } => {
                if !c.is_constant_foldable(glyphs) {
                    return false;
                }
                match c.get_value(glyphs) {
                    Ok(v) if v.is_true() => l.is_constant_foldable(glyphs),
                    Ok(_) => r.is_constant_foldable(glyphs),
                    Err(_) => true,
                }
            }
            ExpKind::Tuple(exps) => exps.iter().all(|e| e.is_constant_foldable(glyphs)),
        }
    }

    /// Whether evaluating the node can have side effects.
    pub fn is_effect(&self, glyphs: &GlyphTable) -> bool {
        match &self.kind {
            ExpKind::Value(_) | ExpKind::Glyph { .. } | ExpKind::Arg { .. } => false,
            ExpKind::Call { .. } => true,
            ExpKind::Unary { exp, .. } | ExpKind::Index { exp, .. } | ExpKind::Cst { exp, .. } => {
                exp.is_effect(glyphs)
            }
            ExpKind::Binary { l, r, .. } => l.is_effect(glyphs) || r.is_effect(glyphs),
            ExpKind::Cnd { c, l, r } => {
                c.is_effect(glyphs) || l.is_effect(glyphs) || r.is_effect(glyphs)
            }
            ExpKind::Tuple(exps) => exps.iter().any(|e| e.is_effect(glyphs)),
        }
    }

    /// Foldable and false.
    pub fn is_zero(&self, glyphs: &GlyphTable) -> bool {
        self.is_constant_foldable(glyphs)
            && self.get_value(glyphs).is_ok_and(|v| !v.is_true())
    }

    /// Foldable and true.
    pub fn is_nonzero(&self, glyphs: &GlyphTable) -> bool {
        self.is_constant_foldable(glyphs) && self.get_value(glyphs).is_ok_and(|v| v.is_true())
    }

    /// Whether folding or typing this expression would resolve `name`,
    /// directly or through bound glyphs.
    pub fn refers_to(&self, name: &str, glyphs: &GlyphTable) -> bool {
        match &self.kind {
            ExpKind::Value(_) | ExpKind::Arg { .. } => false,
            ExpKind::Glyph { name: g } => {
                g == name || glyphs.value(g).is_some_and(|e| e.refers_to(name, glyphs))
            }
            ExpKind::Unary { exp, .. } | ExpKind::Index { exp, .. } | ExpKind::Cst { exp, .. } => {
                exp.refers_to(name, glyphs)
            }
            ExpKind::Binary { l, r, .. } => l.refers_to(name, glyphs) || r.refers_to(name, glyphs),
            ExpKind::Cnd { c, l, r } => [c, l, r].iter().any(|e| e.refers_to(name, glyphs)),
            ExpKind::Tuple(exps) => exps.iter().any(|e| e.refers_to(name, glyphs)),
            ExpKind::Call { target, args, .. } => {
                target.refers_to(name, glyphs) || args.iter().any(|e| e.refers_to(name, glyphs))
            }
        }
    }

    /// The callee convention of a call target, if its type says so.
    pub(crate) fn call_type(&self, glyphs: &GlyphTable) -> Option<CallType> {
        match self.get_type(glyphs) {
            Ok(Type::Funct(ct)) => Some(ct),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeFixed;

    const U32: TypeFixed = TypeFixed::new(32, 0, false, false);

    fn lit(n: u32) -> ExpRef {
        Exp::value(Value::fixed(n, U32), Origin::builtin())
    }

    fn call() -> ExpRef {
        Exp::call(
            Exp::value(Value::funct(3, CallType::StdCall), Origin::builtin()),
            vec![],
            Type::WORD,
            Origin::builtin(),
        )
    }

    #[test]
    fn test_add_folds() {
        let glyphs = GlyphTable::new();
        let e = Exp::add(lit(2), lit(3), Origin::builtin());
        assert!(e.is_constant_foldable(&glyphs));
        assert_eq!(e.get_value(&glyphs).unwrap(), Value::fixed(5, U32));
        assert_eq!(e.get_type(&glyphs).unwrap(), Type::Fixed(U32));
    }

    #[test]
    fn test_unbound_glyph_not_constant() {
        let mut glyphs = GlyphTable::new();
        glyphs.declare("g", Some(Type::WORD));
        let e = Exp::add(Exp::glyph("g", Origin::builtin()), lit(1), Origin::builtin());
        assert!(!e.is_constant_foldable(&glyphs));
        assert!(matches!(
            e.get_value(&glyphs),
            Err(ExpError::NotConstant { .. })
        ));

        glyphs.bind("g", lit(4)).unwrap();
        assert_eq!(e.get_value(&glyphs).unwrap(), Value::fixed(5, U32));
    }

    #[test]
    fn test_nul_and_zero_folds_past_call() {
        let glyphs = GlyphTable::new();
        let e = Exp::nul_and(lit(0), call(), Origin::builtin());
        assert!(e.is_constant_foldable(&glyphs));
        assert_eq!(e.get_value(&glyphs).unwrap(), Value::fixed(0, U32));
    }

    #[test]
    fn test_nul_or_i_folds() {
        let glyphs = GlyphTable::new();
        let e = Exp::nul_or_i(lit(0), lit(7), Origin::builtin());
        assert_eq!(e.get_value(&glyphs).unwrap(), Value::fixed(7, U32));
        let e = Exp::nul_or_i(lit(5), call(), Origin::builtin());
        assert!(e.is_constant_foldable(&glyphs));
        assert_eq!(e.get_value(&glyphs).unwrap(), Value::fixed(5, U32));
    }

    #[test]
    fn test_nul_and_nonzero_needs_right() {
        let glyphs = GlyphTable::new();
        let e = Exp::nul_and(lit(1), call(), Origin::builtin());
        assert!(!e.is_constant_foldable(&glyphs));
        assert!(e.is_effect(&glyphs));
    }

    #[test]
    fn test_logical_normalizes() {
        let glyphs = GlyphTable::new();
        let e = Exp::log_or_i(lit(9), call(), Origin::builtin());
        assert_eq!(e.get_value(&glyphs).unwrap(), Value::bool(true));
        let e = Exp::log_and(lit(9), lit(4), Origin::builtin());
        assert_eq!(e.get_value(&glyphs).unwrap(), Value::bool(true));
        assert_eq!(e.get_type(&glyphs).unwrap(), Type::BOOL);
    }

    #[test]
    fn test_foldable_agrees_with_get_value() {
        let glyphs = GlyphTable::new();
        let exps = [
            lit(1),
            call(),
            Exp::nul_and(lit(0), call(), Origin::builtin()),
            Exp::nul_and(lit(1), call(), Origin::builtin()),
            Exp::nul_or_i(call(), lit(1), Origin::builtin()),
            Exp::log_and(lit(0), call(), Origin::builtin()),
            Exp::log_or_i(lit(0), call(), Origin::builtin()),
            Exp::cnd(lit(1), lit(2), call(), Origin::builtin()),
            Exp::cnd(lit(0), lit(2), call(), Origin::builtin()),
            Exp::tuple(vec![lit(1), call()], Origin::builtin()),
            Exp::index(Exp::tuple(vec![lit(1), lit(2)], Origin::builtin()), 1, Origin::builtin()),
        ];
        for e in &exps {
            let not_constant = matches!(e.get_value(&glyphs), Err(ExpError::NotConstant { .. }));
            assert_eq!(e.is_constant_foldable(&glyphs), !not_constant, "{e:?}");
        }
    }

    #[test]
    fn test_cast_saturates() {
        let glyphs = GlyphTable::new();
        let sat = Type::fixed(8, 0, false, true);
        let e = Exp::cst(sat.clone(), lit(300), Origin::builtin());
        assert_eq!(
            e.get_value(&glyphs).unwrap(),
            Value::fixed(255, TypeFixed::new(8, 0, false, true))
        );
        let wrap = Type::fixed(8, 0, false, false);
        let e = Exp::cst(wrap, lit(300), Origin::builtin());
        assert_eq!(
            e.get_value(&glyphs).unwrap(),
            Value::fixed(44, TypeFixed::new(8, 0, false, false))
        );
    }

    #[test]
    fn test_index_out_of_range() {
        let glyphs = GlyphTable::new();
        let e = Exp::index(Exp::tuple(vec![lit(1)], Origin::builtin()), 3, Origin::builtin());
        assert!(matches!(e.get_type(&glyphs), Err(ExpError::Malformed { .. })));
        assert!(matches!(e.get_value(&glyphs), Err(ExpError::Malformed { .. })));
    }

    #[test]
    fn test_type_error_carries_position() {
        let glyphs = GlyphTable::new();
        let pos = Origin::new("t.c", 2, 5);
        let e = Exp::add(lit(1), Exp::value(Value::StrEn(1), Origin::builtin()), pos.clone());
        let err = e.get_type(&glyphs).unwrap_err();
        assert_eq!(err.pos(), &pos);
    }

    #[test]
    fn test_zero_and_nonzero() {
        let glyphs = GlyphTable::new();
        assert!(lit(0).is_zero(&glyphs));
        assert!(lit(3).is_nonzero(&glyphs));
        assert!(!call().is_zero(&glyphs));
        assert!(!call().is_nonzero(&glyphs));
    }
}
