//! The glyph table: symbolic names resolved to a type and value.
//!
//! Glyphs are declared when the construct that owns them is added to the
//! program and bound later, once, by whichever pass learns their value.

use indexmap::IndexMap;
use tracing::trace;

use crate::error::GlyphError;
use crate::exp::{ExpKind, ExpRef};
use crate::ty::Type;

/// What is known about one glyph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlyphData {
    pub ty: Option<Type>,
    pub value: Option<ExpRef>,
}

/// Symbol → type/value table, iterated in declaration order.
#[derive(Debug, Clone, Default)]
pub struct GlyphTable {
    map: IndexMap<String, GlyphData>,
}

impl GlyphTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a glyph, optionally with its type. Declaring twice is allowed;
    /// an existing type is kept.
    pub fn declare(&mut self, name: impl Into<String>, ty: Option<Type>) {
        let data = self.map.entry(name.into()).or_default();
        if data.ty.is_none() {
            data.ty = ty;
        }
    }

    /// Bind a glyph to its value. Fails if it is already bound.
    pub fn bind(&mut self, name: &str, value: ExpRef) -> Result<(), GlyphError> {
        if self.is_bound(name) {
            return Err(GlyphError::AlreadyBound(name.to_string()));
        }
        if value.refers_to(name, self) {
            return Err(GlyphError::Cyclic(name.to_string()));
        }
        let data = self.map.entry(name.to_string()).or_default();
        if let (Some(ty), ExpKind::Value(v)) = (&data.ty, &value.kind) {
            if ty.kind() != v.kind() {
                return Err(GlyphError::TypeMismatch(name.to_string()));
            }
        }
        if data.ty.is_none() {
            if let ExpKind::Value(v) = &value.kind {
                data.ty = Some(v.ty());
            }
        }
        trace!(target: "ember::ir", glyph = name, "bound");
        data.value = Some(value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&GlyphData> {
        self.map.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&ExpRef> {
        self.map.get(name).and_then(|d| d.value.as_ref())
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// Declared glyphs that have no value yet, in declaration order.
    pub fn unbound(&self) -> impl Iterator<Item = &str> {
        self.map
            .iter()
            .filter(|(_, d)| d.value.is_none())
            .map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GlyphData)> {
        self.map.iter().map(|(name, d)| (name.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
