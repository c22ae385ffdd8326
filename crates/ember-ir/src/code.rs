//! Statement opcodes.
//!
//! Every opcode operates on one target word per operand unless its operands
//! say otherwise. Operand order is destination first, then sources.

use std::fmt;

/// An IR statement opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Nop,

    // ── Arithmetic: (dst, l, r) ──
    AddI,
    AddU,
    SubI,
    SubU,
    MulI,
    MulU,
    /// Fixed-point multiply with 16 fraction bits.
    MulX,
    DivI,
    DivU,
    /// Fixed-point divide with 16 fraction bits.
    DivX,
    ModI,
    ModU,

    // ── Bitwise: (dst, l, r) ──
    BAnd,
    BOrI,
    BOrX,
    ShLU,
    ShRI,
    ShRU,

    // ── Unary: (dst, src) ──
    /// Bitwise complement.
    BNot,
    /// Logical not; yields 0 or 1.
    LNot,
    NegI,

    // ── Comparison: (dst, l, r), yields 0 or 1 ──
    CmpEq,
    CmpNe,
    CmpLtI,
    CmpLeI,
    CmpGtI,
    CmpGeI,
    CmpLtU,
    CmpLeU,
    CmpGtU,
    CmpGeU,

    // ── Data movement ──
    /// (dst, src)
    Move,
    /// (a, b): exchange the two topmost stack words.
    Swap,

    // ── Calls ──
    /// (target, ret-count, args...)
    Call,
    /// Line special: (special, ret-count, args...)
    Cspe,
    /// Native function: (index, ret-count, args...)
    Cnat,
    /// Raw instruction words: (opcode, immediates...)
    Casm,
    /// (values...)
    Retn,

    // ── Branches ──
    /// (target)
    Jump,
    /// (cond, target): branch when cond is zero.
    JcndNil,
    /// (cond, target): branch when cond is non-zero.
    JcndTru,
    /// (cond, value, target, value, target, ...): multi-way branch. The
    /// condition is left on the stack when no case matches.
    JcndTab,
}

impl Code {
    /// Three-operand arithmetic, bitwise and comparison opcodes.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Code::AddI
                | Code::AddU
                | Code::SubI
                | Code::SubU
                | Code::MulI
                | Code::MulU
                | Code::MulX
                | Code::DivI
                | Code::DivU
                | Code::DivX
                | Code::ModI
                | Code::ModU
                | Code::BAnd
                | Code::BOrI
                | Code::BOrX
                | Code::ShLU
                | Code::ShRI
                | Code::ShRU
                | Code::CmpEq
                | Code::CmpNe
                | Code::CmpLtI
                | Code::CmpLeI
                | Code::CmpGtI
                | Code::CmpGeI
                | Code::CmpLtU
                | Code::CmpLeU
                | Code::CmpGtU
                | Code::CmpGeU
        )
    }

    pub fn is_unary(self) -> bool {
        matches!(self, Code::BNot | Code::LNot | Code::NegI)
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Code::Jump | Code::JcndNil | Code::JcndTru | Code::JcndTab
        )
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
