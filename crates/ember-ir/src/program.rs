//! The program model walked by the backend.
//!
//! A [`Program`] owns every function, object, storage space, string and
//! glyph of one compilation unit. Front ends build it through the `add_*`
//! methods and [`Block`]'s statement builder; the backend then mutates it
//! pass by pass.

use std::fmt;

use indexmap::IndexMap;

use crate::code::Code;
use crate::error::GlyphError;
use crate::exp::{Exp, ExpRef};
use crate::glyph::GlyphTable;
use crate::origin::Origin;
use crate::ty::{AddrBase, CallType, Type};
use crate::value::Value;

// ══════════════════════════════════════════════════════════════════════════════
// Operands
// ══════════════════════════════════════════════════════════════════════════════

/// Literal operand: word `off` of the value of `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgLit {
    pub value: ExpRef,
    pub off: u32,
}

/// Register operand: register `idx + off`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgReg {
    pub idx: Box<Arg>,
    pub off: u32,
}

/// Array element operand: element `idx + off` of array `arr`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgArr {
    pub arr: Box<Arg>,
    pub idx: Box<Arg>,
    pub off: u32,
}

/// A statement operand, tagged by the storage it lives in.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Lit(ArgLit),
    Nul,
    Stk,
    LocReg(ArgReg),
    GblReg(ArgReg),
    MapReg(ArgReg),
    WldReg(ArgReg),
    LocArs(ArgReg),
    GblArr(ArgArr),
    MapArr(ArgArr),
    WldArr(ArgArr),
}

impl Arg {
    pub fn lit(value: ExpRef) -> Self {
        Arg::Lit(ArgLit { value, off: 0 })
    }

    /// A literal word with no source position.
    pub fn word(w: u32) -> Self {
        Arg::lit(Exp::value(Value::word(w), Origin::builtin()))
    }

    /// A literal reference to a glyph, resolved at emit time.
    pub fn glyph(name: impl Into<String>, pos: &Origin) -> Self {
        Arg::lit(Exp::glyph(name, pos.clone()))
    }

    /// A register operand at a literal index.
    pub fn reg(base: AddrBase, idx: Arg) -> Self {
        let r = ArgReg {
            idx: Box::new(idx),
            off: 0,
        };
        match base {
            AddrBase::LocReg => Arg::LocReg(r),
            AddrBase::GblReg => Arg::GblReg(r),
            AddrBase::MapReg => Arg::MapReg(r),
            AddrBase::WldReg => Arg::WldReg(r),
            _ => Arg::LocArs(r),
        }
    }

    /// An array element operand.
    pub fn arr(base: AddrBase, arr: Arg, idx: Arg) -> Self {
        let a = ArgArr {
            arr: Box::new(arr),
            idx: Box::new(idx),
            off: 0,
        };
        match base {
            AddrBase::GblArr => Arg::GblArr(a),
            AddrBase::WldArr => Arg::WldArr(a),
            _ => Arg::MapArr(a),
        }
    }

    /// Local register `n`, used for temporaries.
    pub fn loc_reg(n: u32) -> Self {
        Arg::reg(AddrBase::LocReg, Arg::word(n))
    }

    pub fn base(&self) -> AddrBase {
        match self {
            Arg::Lit(_) => AddrBase::Lit,
            Arg::Nul => AddrBase::Nul,
            Arg::Stk => AddrBase::Stk,
            Arg::LocReg(_) => AddrBase::LocReg,
            Arg::GblReg(_) => AddrBase::GblReg,
            Arg::MapReg(_) => AddrBase::MapReg,
            Arg::WldReg(_) => AddrBase::WldReg,
            Arg::LocArs(_) => AddrBase::LocArs,
            Arg::GblArr(_) => AddrBase::GblArr,
            Arg::MapArr(_) => AddrBase::MapArr,
            Arg::WldArr(_) => AddrBase::WldArr,
        }
    }

    pub fn is_stk(&self) -> bool {
        matches!(self, Arg::Stk)
    }

    pub fn is_nul(&self) -> bool {
        matches!(self, Arg::Nul)
    }

    /// The same operand `words` words further along. Stack and discard
    /// operands are positionless and returned unchanged.
    pub fn offset(&self, words: u32) -> Self {
        let mut arg = self.clone();
        match &mut arg {
            Arg::Lit(a) => a.off += words,
            Arg::LocReg(r) | Arg::GblReg(r) | Arg::MapReg(r) | Arg::WldReg(r) | Arg::LocArs(r) => {
                r.off += words
            }
            Arg::GblArr(a) | Arg::MapArr(a) | Arg::WldArr(a) => a.off += words,
            Arg::Nul | Arg::Stk => {}
        }
        arg
    }

    /// The literal expression of a `Lit` operand.
    pub fn as_lit(&self) -> Option<&ArgLit> {
        match self {
            Arg::Lit(a) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements and blocks
// ══════════════════════════════════════════════════════════════════════════════

/// One IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub code: Code,
    pub args: Vec<Arg>,
    /// Label glyphs bound to this statement's address.
    pub labels: Vec<String>,
    pub pos: Origin,
}

impl Statement {
    pub fn new(code: Code, args: Vec<Arg>, pos: Origin) -> Self {
        Self {
            code,
            args,
            labels: Vec::new(),
            pos,
        }
    }
}

/// An ordered statement list with a builder cursor.
///
/// Labels added with [`Block::add_label`] attach to the next statement
/// added. Labels still pending when the block ends address the end of the
/// block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub stmnts: Vec<Statement>,
    pub pending: Vec<String>,
    pos: Origin,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Origin given to subsequently added statements.
    pub fn set_origin(&mut self, pos: Origin) -> &mut Self {
        self.pos = pos;
        self
    }

    pub fn add_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.pending.push(label.into());
        self
    }

    pub fn add_stmnt(&mut self, code: Code, args: Vec<Arg>) -> &mut Self {
        let mut stmnt = Statement::new(code, args, self.pos.clone());
        stmnt.labels = std::mem::take(&mut self.pending);
        self.stmnts.push(stmnt);
        self
    }

    pub fn len(&self) -> usize {
        self.stmnts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmnts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.stmnts.iter()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions, objects, spaces, strings
// ══════════════════════════════════════════════════════════════════════════════

/// Visibility of a definition outside this compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Linkage {
    #[default]
    Internal,
    /// Exported when defined here, imported otherwise.
    External,
}

/// When the runtime starts a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScriptType {
    #[default]
    Closed,
    Open,
    Respawn,
    Death,
    Enter,
    Lightning,
    Unloading,
    Disconnect,
    Return,
    Event,
}

/// A function or script.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub glyph: String,
    /// Glyph of the entry address.
    pub label: String,
    pub ctype: CallType,
    pub block: Block,
    pub param: u32,
    pub retrn: u32,
    /// Local registers, parameters included.
    pub local_reg: u32,
    /// Words of automatic array storage.
    pub local_arr: u32,
    /// Script number, or preferred table index.
    pub value_int: u32,
    /// Script name for named scripts.
    pub value_str: String,
    pub stype: ScriptType,
    pub sflag_net: bool,
    pub sflag_cls: bool,
    pub defin: bool,
    /// Table index still to be assigned.
    pub alloc: bool,
    pub linka: Linkage,
    pub pos: Origin,
}

impl Function {
    pub fn new(glyph: impl Into<String>, ctype: CallType) -> Self {
        let glyph = glyph.into();
        Self {
            label: format!("{glyph}$label"),
            glyph,
            ctype,
            block: Block::new(),
            param: 0,
            retrn: 0,
            local_reg: 0,
            local_arr: 0,
            value_int: 0,
            value_str: String::new(),
            stype: ScriptType::Closed,
            sflag_net: false,
            sflag_cls: false,
            defin: true,
            alloc: true,
            linka: Linkage::Internal,
            pos: Origin::builtin(),
        }
    }
}

/// Identifies a storage space: a register bank (empty name) or a named
/// array region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceKey {
    pub base: AddrBase,
    pub name: String,
}

impl SpaceKey {
    /// The unnamed register bank for `base`.
    pub fn bank(base: AddrBase) -> Self {
        Self {
            base,
            name: String::new(),
        }
    }

    pub fn array(base: AddrBase, name: impl Into<String>) -> Self {
        Self {
            base,
            name: name.into(),
        }
    }
}

impl fmt::Display for SpaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.base)
        } else {
            write!(f, "{}:{}", self.base, self.name)
        }
    }
}

/// A storage region holding objects.
#[derive(Debug, Clone, PartialEq)]
pub struct Space {
    pub key: SpaceKey,
    /// Array number, for array regions.
    pub value: u32,
    /// Size in words, computed during translation.
    pub words: u32,
    /// Array number still to be assigned.
    pub alloc: bool,
    pub defin: bool,
    pub linka: Linkage,
}

impl Space {
    pub fn new(key: SpaceKey) -> Self {
        Self {
            key,
            value: 0,
            words: 0,
            alloc: true,
            defin: true,
            linka: Linkage::Internal,
        }
    }

    /// Glyph of the array number; register banks have none.
    pub fn glyph(&self) -> Option<&str> {
        (!self.key.name.is_empty()).then_some(self.key.name.as_str())
    }
}

/// A variable living in one space.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub glyph: String,
    pub space: SpaceKey,
    pub words: u32,
    /// Slot index (register number or array offset).
    pub value: u32,
    /// Slot still to be assigned.
    pub alloc: bool,
    pub defin: bool,
    pub initi: Option<ExpRef>,
    pub linka: Linkage,
}

impl Object {
    pub fn new(glyph: impl Into<String>, space: SpaceKey, words: u32) -> Self {
        Self {
            glyph: glyph.into(),
            space,
            words,
            value: 0,
            alloc: true,
            defin: true,
            initi: None,
            linka: Linkage::Internal,
        }
    }

    /// Pin the object to a fixed slot.
    pub fn at(mut self, value: u32) -> Self {
        self.value = value;
        self.alloc = false;
        self
    }

    pub fn with_init(mut self, initi: ExpRef) -> Self {
        self.initi = Some(initi);
        self
    }
}

/// A string table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StrEnt {
    pub glyph: String,
    pub value_str: String,
    /// String table index.
    pub value_int: u32,
    pub alloc: bool,
    pub defin: bool,
}

impl StrEnt {
    pub fn new(glyph: impl Into<String>, value_str: impl Into<String>) -> Self {
        Self {
            glyph: glyph.into(),
            value_str: value_str.into(),
            value_int: 0,
            alloc: true,
            defin: true,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Program
// ══════════════════════════════════════════════════════════════════════════════

/// One compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub funcs: IndexMap<String, Function>,
    pub objs: IndexMap<String, Object>,
    pub spaces: IndexMap<SpaceKey, Space>,
    pub strs: IndexMap<String, StrEnt>,
    /// Libraries loaded alongside this one.
    pub imports: Vec<String>,
    pub glyphs: GlyphTable,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, func: Function) -> Result<&mut Function, GlyphError> {
        if self.funcs.contains_key(&func.glyph) {
            return Err(GlyphError::Redefined(func.glyph));
        }
        self.glyphs
            .declare(func.glyph.clone(), Some(Type::Funct(func.ctype)));
        self.glyphs.declare(func.label.clone(), Some(Type::WORD));
        let name = func.glyph.clone();
        Ok(self.funcs.entry(name).or_insert(func))
    }

    /// Add an object, creating its space on first use.
    pub fn add_object(&mut self, obj: Object) -> Result<&mut Object, GlyphError> {
        if self.objs.contains_key(&obj.glyph) {
            return Err(GlyphError::Redefined(obj.glyph));
        }
        self.space_mut(&obj.space);
        self.glyphs.declare(obj.glyph.clone(), Some(Type::WORD));
        let name = obj.glyph.clone();
        Ok(self.objs.entry(name).or_insert(obj))
    }

    pub fn add_space(&mut self, space: Space) -> Result<&mut Space, GlyphError> {
        if self.spaces.contains_key(&space.key) {
            return Err(GlyphError::Redefined(space.key.to_string()));
        }
        if let Some(glyph) = space.glyph() {
            self.glyphs.declare(glyph, Some(Type::WORD));
        }
        let key = space.key.clone();
        Ok(self.spaces.entry(key).or_insert(space))
    }

    pub fn add_str(&mut self, s: StrEnt) -> Result<&mut StrEnt, GlyphError> {
        if self.strs.contains_key(&s.glyph) {
            return Err(GlyphError::Redefined(s.glyph));
        }
        self.glyphs.declare(s.glyph.clone(), Some(Type::StrEn));
        let name = s.glyph.clone();
        Ok(self.strs.entry(name).or_insert(s))
    }

    pub fn add_import(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.imports.contains(&name) {
            self.imports.push(name);
        }
    }

    /// The space for `key`, created with defaults if missing.
    pub fn space_mut(&mut self, key: &SpaceKey) -> &mut Space {
        if !self.spaces.contains_key(key) {
            if let Some(glyph) = (!key.name.is_empty()).then(|| key.name.clone()) {
                self.glyphs.declare(glyph, Some(Type::WORD));
            }
        }
        self.spaces
            .entry(key.clone())
            .or_insert_with(|| Space::new(key.clone()))
    }

    /// Objects of one space, in declaration order.
    pub fn objects_in<'a>(&'a self, key: &SpaceKey) -> impl Iterator<Item = &'a Object> + 'a {
        let key = key.clone();
        self.objs.values().filter(move |o| o.space == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_labels_attach_to_next_stmnt() {
        let mut block = Block::new();
        block.add_label("a").add_label("b");
        block.add_stmnt(Code::Nop, vec![]);
        block.add_stmnt(Code::Nop, vec![]);
        block.add_label("end");
        assert_eq!(block.stmnts[0].labels, vec!["a", "b"]);
        assert!(block.stmnts[1].labels.is_empty());
        assert_eq!(block.pending, vec!["end"]);
    }

    #[test]
    fn test_block_origin_applies_to_following() {
        let mut block = Block::new();
        block.set_origin(Origin::new("f.c", 3, 1));
        block.add_stmnt(Code::Nop, vec![]);
        assert_eq!(block.stmnts[0].pos.line, 3);
    }

    #[test]
    fn test_arg_offset() {
        let r = Arg::reg(AddrBase::MapReg, Arg::word(4)).offset(2);
        match r {
            Arg::MapReg(r) => assert_eq!(r.off, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(Arg::Stk.offset(3), Arg::Stk);
    }

    #[test]
    fn test_add_function_declares_glyphs() {
        let mut prog = Program::new();
        prog.add_function(Function::new("main", CallType::StdCall))
            .unwrap();
        assert_eq!(
            prog.glyphs.get("main").unwrap().ty,
            Some(Type::Funct(CallType::StdCall))
        );
        assert!(prog.glyphs.get("main$label").is_some());
    }

    #[test]
    fn test_redefinition_fails() {
        let mut prog = Program::new();
        prog.add_function(Function::new("f", CallType::StdCall))
            .unwrap();
        let err = prog
            .add_function(Function::new("f", CallType::StdCall))
            .unwrap_err();
        assert_eq!(err, GlyphError::Redefined("f".into()));
    }

    #[test]
    fn test_add_object_creates_space() {
        let mut prog = Program::new();
        let key = SpaceKey::array(AddrBase::MapArr, "arr");
        prog.add_object(Object::new("x", key.clone(), 3)).unwrap();
        assert!(prog.spaces.contains_key(&key));
        assert!(prog.glyphs.get("arr").is_some());
        assert_eq!(prog.objects_in(&key).count(), 1);
    }

    #[test]
    fn test_objects_in_outlives_key() {
        let mut prog = Program::new();
        prog.add_object(Object::new("r", SpaceKey::bank(AddrBase::MapReg), 1))
            .unwrap();
        let names: Vec<&str> = {
            let bank = SpaceKey::bank(AddrBase::MapReg);
            prog.objects_in(&bank).map(|o| o.glyph.as_str()).collect()
        };
        assert_eq!(names, vec!["r"]);
    }
}
