//! Compile-time types and the promotion rules for binary operators.
//!
//! [`Type`] is a closed sum over the kinds the backend understands. Each kind
//! carries just enough to reconstruct size and layout; two types compare
//! equal only when they are the same kind with the same attributes.

use std::fmt;

use crate::error::TypeError;

/// Bits in one target word.
pub const WORD_BITS: u32 = 32;

// ══════════════════════════════════════════════════════════════════════════════
// Tags
// ══════════════════════════════════════════════════════════════════════════════

/// Storage class of an operand, object, space or pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddrBase {
    /// Generic pointer into any storage.
    Gen,
    /// Immediate literal.
    Lit,
    /// Discard destination.
    Nul,
    /// Top of the value stack.
    Stk,
    LocReg,
    GblReg,
    MapReg,
    WldReg,
    /// Automatic storage carved out of a global array.
    LocArs,
    GblArr,
    MapArr,
    WldArr,
}

impl AddrBase {
    /// Register banks indexed by a single literal.
    pub fn is_register(self) -> bool {
        matches!(
            self,
            Self::LocReg | Self::GblReg | Self::MapReg | Self::WldReg | Self::LocArs
        )
    }

    /// Array regions indexed by array number plus element.
    pub fn is_array(self) -> bool {
        matches!(self, Self::GblArr | Self::MapArr | Self::WldArr)
    }
}

impl fmt::Display for AddrBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Calling convention of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// Ordinary function, indexed in the function table.
    StdCall,
    /// Function taking its arguments on the stack.
    StkCall,
    /// Script addressed by number.
    ScriptI,
    /// Script addressed by name.
    ScriptS,
    /// Line special, addressed by special number.
    Special,
    /// Engine-native function.
    Native,
    /// Raw instruction sequence.
    AsmFunc,
}

impl CallType {
    pub fn is_script(self) -> bool {
        matches!(self, Self::ScriptI | Self::ScriptS)
    }

    /// Conventions whose functions live in the function table.
    pub fn is_indexed(self) -> bool {
        matches!(self, Self::StdCall | Self::StkCall)
    }
}

/// Kind tag of a [`Type`] or [`crate::Value`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Empty,
    Fixed,
    Float,
    Funct,
    Multi,
    Point,
    StrEn,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Type
// ══════════════════════════════════════════════════════════════════════════════

/// Fixed-point layout: `bits_i` integer bits, `bits_f` fraction bits and an
/// optional sign bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeFixed {
    pub bits_i: u32,
    pub bits_f: u32,
    pub signed: bool,
    pub satur: bool,
}

impl TypeFixed {
    pub const fn new(bits_i: u32, bits_f: u32, signed: bool, satur: bool) -> Self {
        Self {
            bits_i,
            bits_f,
            signed,
            satur,
        }
    }

    /// Total width in bits, sign bit included.
    pub fn bits(&self) -> u32 {
        self.bits_i
            .saturating_add(self.bits_f)
            .saturating_add(u32::from(self.signed))
    }

    fn promote(self, other: Self) -> Self {
        Self {
            bits_i: self.bits_i.max(other.bits_i),
            bits_f: self.bits_f.max(other.bits_f),
            signed: self.signed || other.signed,
            satur: self.satur || other.satur,
        }
    }
}

/// Floating layout; the same four attributes as [`TypeFixed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeFloat {
    pub bits_i: u32,
    pub bits_f: u32,
    pub signed: bool,
    pub satur: bool,
}

impl TypeFloat {
    pub const fn new(bits_i: u32, bits_f: u32, signed: bool, satur: bool) -> Self {
        Self {
            bits_i,
            bits_f,
            signed,
            satur,
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits_i
            .saturating_add(self.bits_f)
            .saturating_add(u32::from(self.signed))
    }

    fn promote(self, other: Self) -> Self {
        Self {
            bits_i: self.bits_i.max(other.bits_i),
            bits_f: self.bits_f.max(other.bits_f),
            signed: self.signed || other.signed,
            satur: self.satur || other.satur,
        }
    }
}

/// Pointer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypePoint {
    /// Storage the pointer addresses.
    pub base: AddrBase,
    /// Words in the pointer's representation.
    pub words: u32,
    /// Bytes per addressed word.
    pub word_size: u32,
}

impl TypePoint {
    pub const fn new(base: AddrBase, words: u32, word_size: u32) -> Self {
        Self {
            base,
            words,
            word_size,
        }
    }
}

/// A compile-time type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Empty,
    Fixed(TypeFixed),
    Float(TypeFloat),
    Funct(CallType),
    Multi(Vec<Type>),
    Point(TypePoint),
    StrEn,
}

impl Type {
    /// One unsigned word; the type of addresses and slot numbers.
    pub const WORD: Type = Type::Fixed(TypeFixed::new(WORD_BITS, 0, false, false));

    /// The result type of comparisons and logical operators.
    pub const BOOL: Type = Type::Fixed(TypeFixed::new(1, 0, false, false));

    pub fn fixed(bits_i: u32, bits_f: u32, signed: bool, satur: bool) -> Self {
        Type::Fixed(TypeFixed::new(bits_i, bits_f, signed, satur))
    }

    pub fn float(bits_i: u32, bits_f: u32, signed: bool, satur: bool) -> Self {
        Type::Float(TypeFloat::new(bits_i, bits_f, signed, satur))
    }

    pub fn point(base: AddrBase, words: u32, word_size: u32) -> Self {
        Type::Point(TypePoint::new(base, words, word_size))
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Type::Empty => TypeKind::Empty,
            Type::Fixed(_) => TypeKind::Fixed,
            Type::Float(_) => TypeKind::Float,
            Type::Funct(_) => TypeKind::Funct,
            Type::Multi(_) => TypeKind::Multi,
            Type::Point(_) => TypeKind::Point,
            Type::StrEn => TypeKind::StrEn,
        }
    }

    /// Size in target words.
    pub fn words(&self) -> u32 {
        match self {
            Type::Empty => 0,
            Type::Fixed(t) => t.bits().div_ceil(WORD_BITS),
            Type::Float(t) => t.bits().div_ceil(WORD_BITS),
            Type::Funct(_) | Type::StrEn => 1,
            Type::Multi(types) => types.iter().map(Type::words).sum(),
            Type::Point(t) => t.words,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Empty => write!(f, "Empty"),
            Type::Fixed(t) => write!(
                f,
                "Fixed({}{}.{}{})",
                if t.signed { "s" } else { "u" },
                t.bits_i,
                t.bits_f,
                if t.satur { " sat" } else { "" }
            ),
            Type::Float(t) => write!(
                f,
                "Float({}{}.{})",
                if t.signed { "s" } else { "u" },
                t.bits_i,
                t.bits_f
            ),
            Type::Funct(ct) => write!(f, "Funct({ct:?})"),
            Type::Multi(types) => {
                write!(f, "Multi(")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Type::Point(t) => write!(f, "Point({}, {}x{})", t.base, t.words, t.word_size),
            Type::StrEn => write!(f, "StrEn"),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Promotion
// ══════════════════════════════════════════════════════════════════════════════

/// Shared arithmetic promotion: Fixed and Float widen, mixes become Float.
fn promote_arith(op: &'static str, l: &Type, r: &Type) -> Result<Type, TypeError> {
    match (l, r) {
        (Type::Fixed(a), Type::Fixed(b)) => Ok(Type::Fixed(a.promote(*b))),
        (Type::Float(a), Type::Float(b)) => Ok(Type::Float(a.promote(*b))),
        (Type::Float(a), Type::Fixed(_)) | (Type::Fixed(_), Type::Float(a)) => {
            Ok(Type::Float(*a))
        }
        _ => Err(TypeError::binary(op, l.kind(), r.kind())),
    }
}

fn promote_bitwise(op: &'static str, l: &Type, r: &Type) -> Result<Type, TypeError> {
    match (l, r) {
        (Type::Fixed(a), Type::Fixed(b)) => Ok(Type::Fixed(a.promote(*b))),
        _ => Err(TypeError::binary(op, l.kind(), r.kind())),
    }
}

fn promote_shift(op: &'static str, l: &Type, r: &Type) -> Result<Type, TypeError> {
    match (l, r) {
        (Type::Fixed(_) | Type::Float(_), Type::Fixed(_)) => Ok(l.clone()),
        _ => Err(TypeError::binary(op, l.kind(), r.kind())),
    }
}

/// `l + r`. Pointer plus integer keeps the pointer type.
pub fn promote_add(l: &Type, r: &Type) -> Result<Type, TypeError> {
    match (l, r) {
        (Type::Point(_), Type::Fixed(_)) => Ok(l.clone()),
        (Type::Fixed(_), Type::Point(_)) => Ok(r.clone()),
        _ => promote_arith("add", l, r),
    }
}

/// `l - r`. Pointer minus pointer yields a signed word-width difference.
pub fn promote_sub(l: &Type, r: &Type) -> Result<Type, TypeError> {
    match (l, r) {
        (Type::Point(_), Type::Fixed(_)) => Ok(l.clone()),
        (Type::Point(a), Type::Point(b)) if a.base == b.base => {
            Ok(Type::fixed(a.words * WORD_BITS - 1, 0, true, false))
        }
        _ => promote_arith("sub", l, r),
    }
}

pub fn promote_mul(l: &Type, r: &Type) -> Result<Type, TypeError> {
    promote_arith("mul", l, r)
}

pub fn promote_div(l: &Type, r: &Type) -> Result<Type, TypeError> {
    promote_arith("div", l, r)
}

pub fn promote_mod(l: &Type, r: &Type) -> Result<Type, TypeError> {
    promote_arith("mod", l, r)
}

pub fn promote_bit_and(l: &Type, r: &Type) -> Result<Type, TypeError> {
    promote_bitwise("bitwise and", l, r)
}

pub fn promote_bit_or_i(l: &Type, r: &Type) -> Result<Type, TypeError> {
    promote_bitwise("bitwise or", l, r)
}

pub fn promote_bit_or_x(l: &Type, r: &Type) -> Result<Type, TypeError> {
    promote_bitwise("bitwise xor", l, r)
}

pub fn promote_shl(l: &Type, r: &Type) -> Result<Type, TypeError> {
    promote_shift("shift left", l, r)
}

pub fn promote_shr(l: &Type, r: &Type) -> Result<Type, TypeError> {
    promote_shift("shift right", l, r)
}

/// Operand type comparisons are performed in; the result is always
/// [`Type::BOOL`].
pub fn promote_cmp(l: &Type, r: &Type) -> Result<Type, TypeError> {
    match (l, r) {
        (Type::Point(a), Type::Point(b)) if a.base == b.base => Ok(l.clone()),
        (Type::Funct(a), Type::Funct(b)) if a == b => Ok(l.clone()),
        (Type::StrEn, Type::StrEn) => Ok(Type::StrEn),
        _ => promote_arith("compare", l, r),
    }
}
