//! Instruction encoding for classified statements.

use ember_ir::{ArgArr, ArgLit, ArgReg, Exp, ExpError, ExpKind, GlyphTable, Value};

use super::code::{Pcd, RETN_ARRAY_BASE, SPECIAL_ARGS_MAX};
use super::shape::Shape;
use crate::container::PutBytes;
use crate::error::{BcError, BcResult};

// ══════════════════════════════════════════════════════════════════════════════
// Literal resolution
// ══════════════════════════════════════════════════════════════════════════════

/// Words of a constant, with named pointers rebased onto their glyph.
pub(crate) fn value_words(glyphs: &GlyphTable, value: &Value) -> BcResult<Vec<u32>> {
    let mut words = value.words();
    if let Value::Point(p) = value {
        if let Some(name) = &p.name {
            let base = glyphs
                .value(name)
                .ok_or_else(|| BcError::UnboundGlyph(name.clone()))?
                .get_value(glyphs)?;
            let base = base.words().first().copied().unwrap_or(0);
            if let Some(w) = words.first_mut() {
                *w = w.wrapping_add(base);
            }
        }
    }
    Ok(words)
}

/// Fold an expression that must be constant at emit time.
pub(crate) fn fold(glyphs: &GlyphTable, exp: &Exp) -> BcResult<Value> {
    exp.get_value(glyphs).map_err(|e| match (&e, &exp.kind) {
        (ExpError::NotConstant { .. }, ExpKind::Glyph { name }) => {
            BcError::UnboundGlyph(name.clone())
        }
        _ => e.into(),
    })
}

/// The single word a literal operand denotes.
pub(crate) fn lit_word(glyphs: &GlyphTable, lit: &ArgLit) -> BcResult<u32> {
    let value = fold(glyphs, &lit.value)?;
    value_words(glyphs, &value)?
        .get(lit.off as usize)
        .copied()
        .ok_or_else(|| {
            BcError::Internal(format!(
                "literal {} has no word {}",
                value.ty(),
                lit.off
            ))
        })
}

fn reg_index(glyphs: &GlyphTable, reg: &ArgReg) -> BcResult<u32> {
    let lit = reg
        .idx
        .as_lit()
        .ok_or_else(|| BcError::Internal("register index is not a literal".into()))?;
    Ok(lit_word(glyphs, lit)?.wrapping_add(reg.off))
}

fn arr_number(glyphs: &GlyphTable, arr: &ArgArr) -> BcResult<u32> {
    let lit = arr
        .arr
        .as_lit()
        .ok_or_else(|| BcError::Internal("array number is not a literal".into()))?;
    lit_word(glyphs, lit)
}

// ══════════════════════════════════════════════════════════════════════════════
// Encoder
// ══════════════════════════════════════════════════════════════════════════════

/// Writes instructions into the code stream.
pub(crate) struct Encoder<'a> {
    pub glyphs: &'a GlyphTable,
    /// Automatic-storage array number.
    pub loc_ars: u32,
    pub out: &'a mut Vec<u8>,
}

impl Encoder<'_> {
    fn op(&mut self, pcd: Pcd) {
        self.out.put_u32(pcd.word());
    }

    fn op1(&mut self, pcd: Pcd, a: u32) {
        self.op(pcd);
        self.out.put_u32(a);
    }

    fn push(&mut self, n: u32) {
        self.op1(Pcd::PushNumber, n);
    }

    fn lit(&self, lit: &ArgLit) -> BcResult<u32> {
        lit_word(self.glyphs, lit)
    }

    /// Push extra call results from the return array, lowest word first.
    fn fetch_extra(&mut self, ret: u32) {
        for i in 1..ret {
            self.push(RETN_ARRAY_BASE + i - 1);
            self.op1(Pcd::PushGlobalArray, self.loc_ars);
        }
    }

    /// Store all but the bottom of `words` stacked results, top first.
    fn store_extra(&mut self, words: u32) {
        for i in (1..words).rev() {
            self.push(RETN_ARRAY_BASE + i - 1);
            self.op(Pcd::Swap);
            self.op1(Pcd::AssignGlobalArray, self.loc_ars);
        }
    }

    pub fn put(&mut self, shape: &Shape<'_>) -> BcResult<()> {
        match shape {
            Shape::Nop => self.op(Pcd::Nop),
            Shape::Binary(pcd) | Shape::Unary(pcd) => self.op(*pcd),
            Shape::Swap => self.op(Pcd::Swap),
            Shape::Drop => self.op(Pcd::Drop),
            Shape::PushLit(l) => {
                let v = self.lit(l)?;
                self.push(v);
            }
            Shape::PushReg(pcd, r) | Shape::AssignReg(pcd, r) => {
                let idx = reg_index(self.glyphs, r)?;
                self.op1(*pcd, idx);
            }
            Shape::PushLocArs(r) => {
                let idx = reg_index(self.glyphs, r)?;
                self.push(idx);
                self.op1(Pcd::PushGlobalArray, self.loc_ars);
            }
            Shape::AssignLocArs(r) => {
                let idx = reg_index(self.glyphs, r)?;
                self.push(idx);
                self.op(Pcd::Swap);
                self.op1(Pcd::AssignGlobalArray, self.loc_ars);
            }
            Shape::PushArr(pcd, a) => {
                let arr = arr_number(self.glyphs, a)?;
                if a.off != 0 {
                    self.push(a.off);
                    self.op(Pcd::Add);
                }
                self.op1(*pcd, arr);
            }
            Shape::AssignArr(pcd, a) => {
                let arr = arr_number(self.glyphs, a)?;
                if a.off != 0 {
                    self.op(Pcd::Swap);
                    self.push(a.off);
                    self.op(Pcd::Add);
                    self.op(Pcd::Swap);
                }
                self.op1(*pcd, arr);
            }
            Shape::CallLit { target, ret } => {
                let f = self.lit(target)?;
                if *ret == 0 {
                    self.op1(Pcd::CallDiscard, f);
                } else {
                    self.op1(Pcd::Call, f);
                    self.fetch_extra(*ret);
                }
            }
            Shape::CallStk { ret } => {
                self.op(Pcd::CallStack);
                if *ret == 0 {
                    self.op(Pcd::Drop);
                } else {
                    self.fetch_extra(*ret);
                }
            }
            Shape::CspeLit { spec, ret, args } => {
                let spec = self.lit(spec)?;
                let mut words = Vec::with_capacity(args.len());
                for a in args {
                    words.push(self.lit(a)?);
                }
                if *ret == 0 {
                    self.op1(Pcd::LSpecDirect, spec);
                    self.out.put_u32(words.len() as u32);
                    for w in words {
                        self.out.put_u32(w);
                    }
                } else {
                    for &w in &words {
                        self.push(w);
                    }
                    for _ in words.len()..SPECIAL_ARGS_MAX {
                        self.push(0);
                    }
                    self.op1(Pcd::LSpecResult, spec);
                }
            }
            Shape::CspeStk { spec, ret, argc } => {
                let spec = self.lit(spec)?;
                if *ret == 0 {
                    self.op1(Pcd::LSpec, spec);
                    self.out.put_u32(*argc);
                } else {
                    for _ in *argc as usize..SPECIAL_ARGS_MAX {
                        self.push(0);
                    }
                    self.op1(Pcd::LSpecResult, spec);
                }
            }
            Shape::Cnat { index, ret, argc } => {
                let idx = self.lit(index)?;
                let pcd = if *ret == 0 {
                    Pcd::CallFuncVoid
                } else {
                    Pcd::CallFunc
                };
                self.op1(pcd, *argc);
                self.out.put_u32(idx);
            }
            Shape::Casm { op, imms } => {
                let w = self.lit(op)?;
                self.out.put_u32(w);
                for a in imms {
                    let w = self.lit(a)?;
                    self.out.put_u32(w);
                }
            }
            Shape::Retn { script, words } => {
                self.store_extra(*words);
                match (*script, *words) {
                    (false, 0) => self.op(Pcd::ReturnVoid),
                    (false, _) => self.op(Pcd::ReturnVal),
                    (true, 0) => self.op(Pcd::Terminate),
                    (true, _) => {
                        self.op(Pcd::SetResultValue);
                        self.op(Pcd::Terminate);
                    }
                }
            }
            Shape::JumpLit(l) => {
                let addr = self.lit(l)?;
                self.op1(Pcd::Goto, addr);
            }
            Shape::JumpStk => self.op(Pcd::GotoStack),
            Shape::Jcnd(pcd, l) => {
                let addr = self.lit(l)?;
                self.op1(*pcd, addr);
            }
            Shape::JcndTab(cases) => {
                let mut table = Vec::with_capacity(cases.len());
                for (v, a) in cases {
                    table.push((self.lit(v)? as i32, self.lit(a)?));
                }
                if let [(v, a)] = table[..] {
                    self.op1(Pcd::CaseGoto, v as u32);
                    self.out.put_u32(a);
                } else if !table.is_empty() {
                    table.sort_by_key(|(v, _)| *v);
                    self.op1(Pcd::CaseGotoSorted, table.len() as u32);
                    for (v, a) in table {
                        self.out.put_u32(v as u32);
                        self.out.put_u32(a);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ir::{
        AddrBase, Arg, CallType, Code, Function, Origin, Statement, TypePoint,
    };

    fn encode(glyphs: &GlyphTable, func: &Function, code: Code, args: Vec<Arg>) -> Vec<u32> {
        let stmnt = Statement::new(code, args, Origin::builtin());
        let shape = Shape::of(func, &stmnt).unwrap();
        let mut out = Vec::new();
        Encoder {
            glyphs,
            loc_ars: 7,
            out: &mut out,
        }
        .put(&shape)
        .unwrap();
        assert_eq!(out.len() as u32, shape.size());
        out.chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn std_func() -> Function {
        Function::new("f", CallType::StdCall)
    }

    #[test]
    fn test_push_assign_arr_with_offset() {
        let g = GlyphTable::new();
        let f = std_func();
        let arr = Arg::arr(AddrBase::MapArr, Arg::word(4), Arg::Stk).offset(3);
        assert_eq!(
            encode(&g, &f, Code::Move, vec![Arg::Stk, arr.clone()]),
            vec![3, 3, 14, 207, 4]
        );
        assert_eq!(
            encode(&g, &f, Code::Move, vec![arr, Arg::Stk]),
            vec![157, 3, 3, 14, 157, 208, 4]
        );
    }

    #[test]
    fn test_call_fetches_extra_words() {
        let g = GlyphTable::new();
        let words = encode(
            &g,
            &std_func(),
            Code::Call,
            vec![Arg::word(2), Arg::word(3)],
        );
        assert_eq!(words, vec![203, 2, 3, 1, 237, 7, 3, 2, 237, 7]);
    }

    #[test]
    fn test_retn_stores_extra_words_top_first() {
        let g = GlyphTable::new();
        let words = encode(&g, &std_func(), Code::Retn, vec![Arg::Stk; 3]);
        assert_eq!(
            words,
            vec![3, 2, 157, 238, 7, 3, 1, 157, 238, 7, 206]
        );
        let script = Function::new("s", CallType::ScriptI);
        assert_eq!(encode(&g, &script, Code::Retn, vec![Arg::Stk]), vec![254, 1]);
    }

    #[test]
    fn test_cspe_result_pads_to_five() {
        let g = GlyphTable::new();
        let words = encode(
            &g,
            &std_func(),
            Code::Cspe,
            vec![Arg::word(80), Arg::word(1), Arg::word(9)],
        );
        assert_eq!(words, vec![3, 9, 3, 0, 3, 0, 3, 0, 3, 0, 345, 80]);
    }

    #[test]
    fn test_case_table_sorted_signed() {
        let g = GlyphTable::new();
        let words = encode(
            &g,
            &std_func(),
            Code::JcndTab,
            vec![
                Arg::Stk,
                Arg::word(5),
                Arg::word(100),
                Arg::word(u32::MAX),
                Arg::word(200),
                Arg::word(0),
                Arg::word(300),
            ],
        );
        assert_eq!(
            words,
            vec![156, 3, u32::MAX, 200, 0, 300, 5, 100]
        );
    }

    #[test]
    fn test_named_pointer_rebased() {
        let mut g = GlyphTable::new();
        g.bind("base", Exp::word(40, Origin::builtin())).unwrap();
        let mut p = match Value::point(2, TypePoint::new(AddrBase::GblArr, 1, 1)) {
            Value::Point(p) => p,
            _ => unreachable!(),
        };
        p.name = Some("base".into());
        assert_eq!(value_words(&g, &Value::Point(p)).unwrap(), vec![42]);
    }

    #[test]
    fn test_unbound_glyph_literal() {
        let g = GlyphTable::new();
        let lit = ArgLit {
            value: Exp::glyph("nowhere", Origin::builtin()),
            off: 0,
        };
        assert_eq!(
            lit_word(&g, &lit).unwrap_err(),
            BcError::UnboundGlyph("nowhere".into())
        );
    }
}
