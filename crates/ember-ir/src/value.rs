//! Compile-time constant values and their arithmetic.
//!
//! Every [`Value`] carries its own [`Type`]. Fixed-point values are stored as
//! an integer pre-scaled by `2^bits_f` and are clamped on every construction,
//! so a `ValueFixed` in hand is always representable in its type.

use std::cmp::Ordering;
use std::fmt;

use num::{BigInt, BigRational, Integer};
use num_traits::{One, ToPrimitive, Zero};

use crate::error::TypeError;
use crate::ty::{
    promote_add, promote_bit_and, promote_bit_or_i, promote_bit_or_x, promote_cmp, promote_div,
    promote_mod, promote_mul, promote_shl, promote_shr, promote_sub, AddrBase, CallType, Type,
    TypeFixed, TypeFloat, TypeKind, TypePoint, WORD_BITS,
};

/// Largest shift amount folding will perform.
const MAX_SHIFT: i64 = 1 << 16;

// ══════════════════════════════════════════════════════════════════════════════
// Payloads
// ══════════════════════════════════════════════════════════════════════════════

/// A fixed-point constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueFixed {
    /// Scaled representation: the real value times `2^ty.bits_f`.
    pub value: BigInt,
    pub ty: TypeFixed,
}

impl ValueFixed {
    /// Build from a raw scaled representation, clamping it into `ty`.
    pub fn new(value: BigInt, ty: TypeFixed) -> Self {
        let mut v = Self { value, ty };
        v.clamp();
        v
    }

    /// Build from an integer, scaling it by the fraction bits.
    pub fn from_int(n: impl Into<BigInt>, ty: TypeFixed) -> Self {
        Self::new(n.into() << ty.bits_f, ty)
    }

    /// Truncate to the declared width, or saturate if the type saturates.
    pub fn clamp(&mut self) {
        let ty = self.ty;
        if ty.satur {
            let mag = ty.bits_i + ty.bits_f;
            let max = (BigInt::one() << mag) - 1;
            let min = if ty.signed {
                -(BigInt::one() << mag)
            } else {
                BigInt::zero()
            };
            if self.value > max {
                self.value = max;
            } else if self.value < min {
                self.value = min;
            }
        } else {
            let bits = ty.bits();
            let modulus = BigInt::one() << bits;
            let mut v = self.value.mod_floor(&modulus);
            if ty.signed && bits > 0 && v >= (BigInt::one() << (bits - 1)) {
                v -= modulus;
            }
            self.value = v;
        }
    }

    /// Integer part, rounded toward negative infinity.
    pub fn integer(&self) -> BigInt {
        &self.value >> self.ty.bits_f
    }

    pub fn to_rational(&self) -> BigRational {
        BigRational::new(self.value.clone(), BigInt::one() << self.ty.bits_f)
    }

    /// Rescale into another fixed layout.
    pub fn convert(&self, ty: TypeFixed) -> Self {
        let value = match ty.bits_f.cmp(&self.ty.bits_f) {
            Ordering::Greater => &self.value << (ty.bits_f - self.ty.bits_f),
            Ordering::Less => &self.value >> (self.ty.bits_f - ty.bits_f),
            Ordering::Equal => self.value.clone(),
        };
        Self::new(value, ty)
    }
}

/// A floating constant, held exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueFloat {
    pub value: BigRational,
    pub ty: TypeFloat,
}

impl ValueFloat {
    pub fn new(value: BigRational, ty: TypeFloat) -> Self {
        let mut v = Self { value, ty };
        v.clamp();
        v
    }

    /// Floating values are not range-limited at compile time.
    pub fn clamp(&mut self) {}
}

/// A pointer constant: an offset into storage, possibly relative to a
/// symbol that is resolved during translation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValuePoint {
    pub value: u64,
    /// Storage actually addressed; may be narrower than `ty.base`.
    pub base: AddrBase,
    /// Glyph the offset is relative to, if any.
    pub name: Option<String>,
    pub ty: TypePoint,
}

impl ValuePoint {
    fn offset(&self, by: &BigInt) -> Self {
        let delta = by.mod_floor(&(BigInt::one() << 64u32)).to_u64().unwrap_or(0);
        Self {
            value: self.value.wrapping_add(delta),
            ..self.clone()
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Value
// ══════════════════════════════════════════════════════════════════════════════

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Empty,
    Fixed(ValueFixed),
    Float(ValueFloat),
    Funct { value: u64, call: CallType },
    Multi(Vec<Value>),
    Point(ValuePoint),
    StrEn(u64),
}

impl Value {
    // ── Constructors ──

    /// Integer `n` in fixed layout `ty`.
    pub fn fixed(n: impl Into<BigInt>, ty: TypeFixed) -> Self {
        Value::Fixed(ValueFixed::from_int(n, ty))
    }

    /// Raw scaled representation in fixed layout `ty`.
    pub fn fixed_raw(raw: impl Into<BigInt>, ty: TypeFixed) -> Self {
        Value::Fixed(ValueFixed::new(raw.into(), ty))
    }

    /// One unsigned target word.
    pub fn word(w: u32) -> Self {
        Value::fixed(w, TypeFixed::new(WORD_BITS, 0, false, false))
    }

    pub fn bool(b: bool) -> Self {
        Value::fixed(u8::from(b), TypeFixed::new(1, 0, false, false))
    }

    pub fn float(value: BigRational, ty: TypeFloat) -> Self {
        Value::Float(ValueFloat::new(value, ty))
    }

    pub fn funct(value: u64, call: CallType) -> Self {
        Value::Funct { value, call }
    }

    pub fn point(value: u64, ty: TypePoint) -> Self {
        Value::Point(ValuePoint {
            value,
            base: ty.base,
            name: None,
            ty,
        })
    }

    // ── Queries ──

    pub fn ty(&self) -> Type {
        match self {
            Value::Empty => Type::Empty,
            Value::Fixed(v) => Type::Fixed(v.ty),
            Value::Float(v) => Type::Float(v.ty),
            Value::Funct { call, .. } => Type::Funct(*call),
            Value::Multi(vs) => Type::Multi(vs.iter().map(Value::ty).collect()),
            Value::Point(v) => Type::Point(v.ty),
            Value::StrEn(_) => Type::StrEn,
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Value::Empty => TypeKind::Empty,
            Value::Fixed(_) => TypeKind::Fixed,
            Value::Float(_) => TypeKind::Float,
            Value::Funct { .. } => TypeKind::Funct,
            Value::Multi(_) => TypeKind::Multi,
            Value::Point(_) => TypeKind::Point,
            Value::StrEn(_) => TypeKind::StrEn,
        }
    }

    /// Truth value as seen by conditional branches.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Fixed(v) => !v.value.is_zero(),
            Value::Float(v) => !v.value.is_zero(),
            Value::Funct { value, .. } | Value::StrEn(value) => *value != 0,
            Value::Multi(vs) => !vs.is_empty(),
            Value::Point(p) => p.value != 0 || p.name.is_some(),
        }
    }

    /// Exact rational value of a numeric constant.
    pub fn to_rational(&self) -> Result<BigRational, TypeError> {
        match self {
            Value::Fixed(v) => Ok(v.to_rational()),
            Value::Float(v) => Ok(v.value.clone()),
            _ => Err(TypeError::Convert {
                from: self.kind(),
                to: TypeKind::Float,
            }),
        }
    }

    /// Integer view used for indices, shift counts and offsets.
    pub fn to_integer(&self) -> Result<BigInt, TypeError> {
        match self {
            Value::Fixed(v) => Ok(v.integer()),
            Value::Float(v) => Ok(v.value.trunc().to_integer()),
            Value::Funct { value, .. } | Value::StrEn(value) => Ok(BigInt::from(*value)),
            Value::Point(p) => Ok(BigInt::from(p.value)),
            _ => Err(TypeError::Convert {
                from: self.kind(),
                to: TypeKind::Fixed,
            }),
        }
    }

    /// Encode as 32-bit target words, least significant first.
    ///
    /// Pointer names are not resolved here; callers add the bound value of
    /// [`ValuePoint::name`] themselves.
    pub fn words(&self) -> Vec<u32> {
        match self {
            Value::Empty => Vec::new(),
            Value::Fixed(v) => {
                let modulus = BigInt::one() << WORD_BITS;
                (0..Type::Fixed(v.ty).words())
                    .map(|i| {
                        (&v.value >> (i * WORD_BITS))
                            .mod_floor(&modulus)
                            .to_u32()
                            .unwrap_or(0)
                    })
                    .collect()
            }
            Value::Float(v) => {
                let f = v.value.to_f64().unwrap_or(f64::NAN);
                if v.ty.bits() <= WORD_BITS {
                    vec![(f as f32).to_bits()]
                } else {
                    let bits = f.to_bits();
                    vec![bits as u32, (bits >> 32) as u32]
                }
            }
            Value::Funct { value, .. } | Value::StrEn(value) => vec![*value as u32],
            Value::Point(p) => {
                let mut words = vec![0; p.ty.words.max(1) as usize];
                words[0] = p.value as u32;
                words
            }
            Value::Multi(vs) => vs.iter().flat_map(Value::words).collect(),
        }
    }

    // ── Conversion ──

    /// Convert to another type, producing a new value.
    pub fn convert(&self, to: &Type) -> Result<Value, TypeError> {
        let fail = || TypeError::Convert {
            from: self.kind(),
            to: to.kind(),
        };
        match (self, to) {
            (_, Type::Empty) => Ok(Value::Empty),
            (Value::Fixed(v), Type::Fixed(t)) => Ok(Value::Fixed(v.convert(*t))),
            (Value::Float(v), Type::Fixed(t)) => {
                let scaled = &v.value * BigRational::from_integer(BigInt::one() << t.bits_f);
                Ok(Value::Fixed(ValueFixed::new(scaled.trunc().to_integer(), *t)))
            }
            (Value::Funct { .. } | Value::StrEn(_) | Value::Point(_), Type::Fixed(t)) => {
                Ok(Value::fixed(self.to_integer()?, *t))
            }
            (Value::Fixed(_) | Value::Float(_), Type::Float(t)) => {
                Ok(Value::float(self.to_rational()?, *t))
            }
            (Value::Fixed(v), Type::Point(t)) => {
                let p = ValuePoint {
                    value: 0,
                    base: t.base,
                    name: None,
                    ty: *t,
                };
                Ok(Value::Point(p.offset(&v.integer())))
            }
            (Value::Point(p), Type::Point(t)) => Ok(Value::Point(ValuePoint {
                ty: *t,
                ..p.clone()
            })),
            (Value::Funct { value, .. }, Type::Funct(call)) => Ok(Value::funct(*value, *call)),
            (Value::Fixed(v), Type::Funct(call)) => Ok(Value::funct(
                v.integer().to_u64().ok_or_else(fail)?,
                *call,
            )),
            (Value::StrEn(v), Type::StrEn) => Ok(Value::StrEn(*v)),
            (Value::Fixed(v), Type::StrEn) => {
                Ok(Value::StrEn(v.integer().to_u64().ok_or_else(fail)?))
            }
            (Value::Multi(vs), Type::Multi(ts)) if vs.len() == ts.len() => vs
                .iter()
                .zip(ts)
                .map(|(v, t)| v.convert(t))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Multi),
            _ => Err(fail()),
        }
    }

    // ── Arithmetic ──

    fn arith(
        &self,
        r: &Value,
        promote: fn(&Type, &Type) -> Result<Type, TypeError>,
        fix: impl Fn(&BigInt, &BigInt, &TypeFixed) -> Result<BigInt, TypeError>,
        flt: impl Fn(&BigRational, &BigRational) -> Result<BigRational, TypeError>,
    ) -> Result<Value, TypeError> {
        match promote(&self.ty(), &r.ty())? {
            Type::Fixed(t) => {
                let (a, b) = (self.as_fixed(t)?, r.as_fixed(t)?);
                Ok(Value::Fixed(ValueFixed::new(fix(&a.value, &b.value, &t)?, t)))
            }
            Type::Float(t) => {
                let (a, b) = (self.to_rational()?, r.to_rational()?);
                Ok(Value::float(flt(&a, &b)?, t))
            }
            other => Err(TypeError::Convert {
                from: self.kind(),
                to: other.kind(),
            }),
        }
    }

    fn as_fixed(&self, t: TypeFixed) -> Result<ValueFixed, TypeError> {
        match self {
            Value::Fixed(v) => Ok(v.convert(t)),
            _ => Err(TypeError::Convert {
                from: self.kind(),
                to: TypeKind::Fixed,
            }),
        }
    }

    pub fn add(&self, r: &Value) -> Result<Value, TypeError> {
        match (self, r) {
            (Value::Point(p), Value::Fixed(f)) | (Value::Fixed(f), Value::Point(p)) => {
                Ok(Value::Point(p.offset(&f.integer())))
            }
            _ => self.arith(r, promote_add, |a, b, _| Ok(a + b), |a, b| Ok(a + b)),
        }
    }

    /// Raw pointer addition: defined only on pointer/integer pairs.
    pub fn add_ptr_raw(&self, r: &Value) -> Result<Value, TypeError> {
        match (self, r) {
            (Value::Point(_), Value::Fixed(_))
            | (Value::Fixed(_), Value::Point(_))
            | (Value::Fixed(_), Value::Fixed(_)) => self.add(r),
            _ => Err(TypeError::binary("raw pointer add", self.kind(), r.kind())),
        }
    }

    pub fn sub(&self, r: &Value) -> Result<Value, TypeError> {
        match (self, r) {
            (Value::Point(p), Value::Fixed(f)) => Ok(Value::Point(p.offset(&-f.integer()))),
            (Value::Point(a), Value::Point(b)) => {
                let Type::Fixed(t) = promote_sub(&self.ty(), &r.ty())? else {
                    return Err(TypeError::binary("sub", self.kind(), r.kind()));
                };
                if a.name != b.name {
                    return Err(TypeError::binary("sub", self.kind(), r.kind()));
                }
                Ok(Value::fixed(BigInt::from(a.value) - BigInt::from(b.value), t))
            }
            _ => self.arith(r, promote_sub, |a, b, _| Ok(a - b), |a, b| Ok(a - b)),
        }
    }

    pub fn mul(&self, r: &Value) -> Result<Value, TypeError> {
        self.arith(
            r,
            promote_mul,
            |a, b, t| Ok((a * b) >> t.bits_f),
            |a, b| Ok(a * b),
        )
    }

    pub fn div(&self, r: &Value) -> Result<Value, TypeError> {
        self.arith(
            r,
            promote_div,
            |a, b, t| {
                if b.is_zero() {
                    return Err(TypeError::DivByZero);
                }
                Ok((a << t.bits_f) / b)
            },
            |a, b| {
                if b.is_zero() {
                    return Err(TypeError::DivByZero);
                }
                Ok(a / b)
            },
        )
    }

    pub fn rem(&self, r: &Value) -> Result<Value, TypeError> {
        self.arith(
            r,
            promote_mod,
            |a, b, _| {
                if b.is_zero() {
                    return Err(TypeError::DivByZero);
                }
                Ok(a % b)
            },
            |a, b| {
                if b.is_zero() {
                    return Err(TypeError::DivByZero);
                }
                Ok(a - b * (a / b).trunc())
            },
        )
    }

    fn bitwise(
        &self,
        r: &Value,
        promote: fn(&Type, &Type) -> Result<Type, TypeError>,
        op: impl Fn(&BigInt, &BigInt) -> BigInt,
    ) -> Result<Value, TypeError> {
        self.arith(
            r,
            promote,
            |a, b, _| Ok(op(a, b)),
            |_, _| Err(TypeError::binary("bitwise", TypeKind::Float, TypeKind::Float)),
        )
    }

    pub fn bit_and(&self, r: &Value) -> Result<Value, TypeError> {
        self.bitwise(r, promote_bit_and, |a, b| a & b)
    }

    pub fn bit_or_i(&self, r: &Value) -> Result<Value, TypeError> {
        self.bitwise(r, promote_bit_or_i, |a, b| a | b)
    }

    pub fn bit_or_x(&self, r: &Value) -> Result<Value, TypeError> {
        self.bitwise(r, promote_bit_or_x, |a, b| a ^ b)
    }

    fn shift_amount(&self, r: &Value) -> Result<i64, TypeError> {
        let n = r.to_integer()?;
        match n.to_i64() {
            Some(n) if (0..=MAX_SHIFT).contains(&n) => Ok(n),
            _ => Err(TypeError::ShiftRange(n.to_string())),
        }
    }

    pub fn shl(&self, r: &Value) -> Result<Value, TypeError> {
        promote_shl(&self.ty(), &r.ty())?;
        let n = self.shift_amount(r)?;
        match self {
            Value::Fixed(v) => Ok(Value::Fixed(ValueFixed::new(&v.value << n, v.ty))),
            Value::Float(v) => Ok(Value::float(
                &v.value * BigRational::from_integer(BigInt::one() << n),
                v.ty,
            )),
            _ => Err(TypeError::binary("shift left", self.kind(), r.kind())),
        }
    }

    pub fn shr(&self, r: &Value) -> Result<Value, TypeError> {
        promote_shr(&self.ty(), &r.ty())?;
        let n = self.shift_amount(r)?;
        match self {
            Value::Fixed(v) => Ok(Value::Fixed(ValueFixed::new(&v.value >> n, v.ty))),
            Value::Float(v) => Ok(Value::float(
                &v.value / BigRational::from_integer(BigInt::one() << n),
                v.ty,
            )),
            _ => Err(TypeError::binary("shift right", self.kind(), r.kind())),
        }
    }

    // ── Unary ──

    pub fn neg(&self) -> Result<Value, TypeError> {
        match self {
            Value::Fixed(v) => Ok(Value::Fixed(ValueFixed::new(-&v.value, v.ty))),
            Value::Float(v) => Ok(Value::float(-&v.value, v.ty)),
            _ => Err(TypeError::Unary {
                op: "negate",
                operand: self.kind(),
            }),
        }
    }

    pub fn inv(&self) -> Result<Value, TypeError> {
        match self {
            Value::Fixed(v) => Ok(Value::Fixed(ValueFixed::new(!&v.value, v.ty))),
            _ => Err(TypeError::Unary {
                op: "bitwise not",
                operand: self.kind(),
            }),
        }
    }

    pub fn not(&self) -> Value {
        Value::bool(!self.is_true())
    }

    // ── Comparison ──

    /// Three-way comparison after promotion to a common type.
    pub fn compare(&self, r: &Value) -> Result<Ordering, TypeError> {
        match promote_cmp(&self.ty(), &r.ty())? {
            Type::Fixed(t) => Ok(self.as_fixed(t)?.value.cmp(&r.as_fixed(t)?.value)),
            Type::Float(_) => Ok(self.to_rational()?.cmp(&r.to_rational()?)),
            Type::Point(_) | Type::Funct(_) | Type::StrEn => {
                if let (Value::Point(a), Value::Point(b)) = (self, r) {
                    if a.name != b.name {
                        return Err(TypeError::binary("compare", self.kind(), r.kind()));
                    }
                }
                Ok(self.to_integer()?.cmp(&r.to_integer()?))
            }
            _ => Err(TypeError::binary("compare", self.kind(), r.kind())),
        }
    }

    pub fn cmp_eq(&self, r: &Value) -> Result<Value, TypeError> {
        Ok(Value::bool(self.compare(r)? == Ordering::Equal))
    }

    pub fn cmp_ne(&self, r: &Value) -> Result<Value, TypeError> {
        Ok(Value::bool(self.compare(r)? != Ordering::Equal))
    }

    pub fn cmp_lt(&self, r: &Value) -> Result<Value, TypeError> {
        Ok(Value::bool(self.compare(r)? == Ordering::Less))
    }

    pub fn cmp_le(&self, r: &Value) -> Result<Value, TypeError> {
        Ok(Value::bool(self.compare(r)? != Ordering::Greater))
    }

    pub fn cmp_gt(&self, r: &Value) -> Result<Value, TypeError> {
        Ok(Value::bool(self.compare(r)? == Ordering::Greater))
    }

    pub fn cmp_ge(&self, r: &Value) -> Result<Value, TypeError> {
        Ok(Value::bool(self.compare(r)? != Ordering::Less))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "()"),
            Value::Fixed(v) => write!(f, "{}", v.to_rational()),
            Value::Float(v) => write!(f, "{}f", v.value),
            Value::Funct { value, call } => write!(f, "{call:?}#{value}"),
            Value::Multi(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Point(p) => match &p.name {
                Some(name) => write!(f, "&{name}+{}", p.value),
                None => write!(f, "&{}:{}", p.base, p.value),
            },
            Value::StrEn(v) => write!(f, "str#{v}"),
        }
    }
}
