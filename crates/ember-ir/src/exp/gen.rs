//! Statement generation for expressions.
//!
//! Generated code is stack-oriented: operands are pushed, operators consume
//! the stack and push their result, and the result is finally moved into
//! the destination. A destination of [`Arg::Nul`] means only side effects
//! matter.
//!
//! Short-circuit operators pick one of these shapes, in order:
//!
//! ```text
//! foldable                 → literal move (nothing at all for Nul)
//! dst = Nul                → left only, or right only, or
//!                            left; jcnd end; right; end:
//! left known, not shorting → right (normalized for logical forms)
//! general                  → left; jcnd short; right; jump end;
//!                            short: <left or bool>; end: move dst
//! ```

use crate::code::Code;
use crate::error::ExpError;
use crate::glyph::GlyphTable;
use crate::origin::Origin;
use crate::program::{Arg, Block};
use crate::ty::{CallType, Type};
use crate::value::Value;

use super::{BinaryOp, Exp, ExpKind, ExpRef, ShortCircuit, UnaryOp};

// ══════════════════════════════════════════════════════════════════════════════
// Context
// ══════════════════════════════════════════════════════════════════════════════

/// Where generated statements go, plus label and temporary bookkeeping for
/// one function body.
pub struct GenCtx<'a> {
    pub block: &'a mut Block,
    pub glyphs: &'a mut GlyphTable,
    prefix: String,
    next_label: u32,
    local_reg: u32,
    max_reg: u32,
}

impl<'a> GenCtx<'a> {
    /// `prefix` makes generated labels unique; `local_reg` is the first
    /// local register free for temporaries.
    pub fn new(
        block: &'a mut Block,
        glyphs: &'a mut GlyphTable,
        prefix: impl Into<String>,
        local_reg: u32,
    ) -> Self {
        Self {
            block,
            glyphs,
            prefix: prefix.into(),
            next_label: 0,
            local_reg,
            max_reg: local_reg,
        }
    }

    /// A fresh label glyph, declared as an address.
    pub fn gen_label(&mut self) -> String {
        let name = format!("{}$L{}", self.prefix, self.next_label);
        self.next_label += 1;
        self.glyphs.declare(name.clone(), Some(Type::WORD));
        name
    }

    pub fn alloc_temp(&mut self) -> Arg {
        let reg = self.local_reg;
        self.local_reg += 1;
        self.max_reg = self.max_reg.max(self.local_reg);
        Arg::loc_reg(reg)
    }

    pub fn free_temp(&mut self) {
        self.local_reg = self.local_reg.saturating_sub(1);
    }

    /// Local registers the function needs, temporaries included.
    pub fn local_reg_count(&self) -> u32 {
        self.max_reg
    }

    fn stmnt(&mut self, code: Code, args: Vec<Arg>, pos: &Origin) {
        self.block.set_origin(pos.clone()).add_stmnt(code, args);
    }

    /// Move one word, routing through the stack when neither side is it.
    pub fn emit_move(&mut self, dst: &Arg, src: Arg, pos: &Origin) {
        match dst {
            Arg::Nul => {
                if src.is_stk() {
                    self.stmnt(Code::Move, vec![Arg::Nul, Arg::Stk], pos);
                }
            }
            Arg::Stk => {
                if !src.is_stk() {
                    self.stmnt(Code::Move, vec![Arg::Stk, src], pos);
                }
            }
            _ => {
                if !src.is_stk() {
                    self.stmnt(Code::Move, vec![Arg::Stk, src], pos);
                }
                self.stmnt(Code::Move, vec![dst.clone(), Arg::Stk], pos);
            }
        }
    }

    /// Move the top `words` stack words into `dst`, highest word first.
    fn pop_into(&mut self, dst: &Arg, words: u32, pos: &Origin) {
        if dst.is_stk() {
            return;
        }
        for w in (0..words).rev() {
            self.emit_move(&dst.offset(w), Arg::Stk, pos);
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Opcode selection
// ══════════════════════════════════════════════════════════════════════════════

/// Signedness and fraction bits of a one-word operand the machine can
/// operate on directly.
fn word_layout(ty: &Type) -> Option<(bool, u32)> {
    match ty {
        Type::Fixed(t) if ty.words() == 1 => Some((t.signed, t.bits_f)),
        Type::Point(p) if p.words == 1 => Some((false, 0)),
        Type::Funct(_) | Type::StrEn => Some((false, 0)),
        _ => None,
    }
}

fn pick(signed: bool, i: Code, u: Code) -> Code {
    if signed {
        i
    } else {
        u
    }
}

fn binary_code(op: BinaryOp, signed: bool, bits_f: u32) -> Option<Code> {
    let code = match op {
        BinaryOp::Add | BinaryOp::AddPtrRaw => pick(signed, Code::AddI, Code::AddU),
        BinaryOp::Sub => pick(signed, Code::SubI, Code::SubU),
        BinaryOp::Mul => match bits_f {
            0 => pick(signed, Code::MulI, Code::MulU),
            16 => Code::MulX,
            _ => return None,
        },
        BinaryOp::Div => match bits_f {
            0 => pick(signed, Code::DivI, Code::DivU),
            16 => Code::DivX,
            _ => return None,
        },
        BinaryOp::Mod => pick(signed, Code::ModI, Code::ModU),
        BinaryOp::ShL => Code::ShLU,
        BinaryOp::ShR => pick(signed, Code::ShRI, Code::ShRU),
        BinaryOp::BitAnd => Code::BAnd,
        BinaryOp::BitOrI => Code::BOrI,
        BinaryOp::BitOrX => Code::BOrX,
        BinaryOp::CmpEq => Code::CmpEq,
        BinaryOp::CmpNe => Code::CmpNe,
        BinaryOp::CmpLt => pick(signed, Code::CmpLtI, Code::CmpLtU),
        BinaryOp::CmpLe => pick(signed, Code::CmpLeI, Code::CmpLeU),
        BinaryOp::CmpGt => pick(signed, Code::CmpGtI, Code::CmpGtU),
        BinaryOp::CmpGe => pick(signed, Code::CmpGeI, Code::CmpGeU),
        BinaryOp::LogAnd
        | BinaryOp::LogOrI
        | BinaryOp::LogOrX
        | BinaryOp::NulAnd
        | BinaryOp::NulOrI => return None,
    };
    Some(code)
}

// ══════════════════════════════════════════════════════════════════════════════
// Generation
// ══════════════════════════════════════════════════════════════════════════════

impl Exp {
    fn unsupported(&self, what: impl Into<String>) -> ExpError {
        ExpError::unsupported(what, &self.pos)
    }

    /// Emit statements computing this expression into `dst`.
    pub fn gen_stmnt(&self, ctx: &mut GenCtx<'_>, dst: &Arg) -> Result<(), ExpError> {
        if self.is_constant_foldable(ctx.glyphs) {
            let value = self.get_value(ctx.glyphs)?;
            if !dst.is_nul() {
                self.gen_value(ctx, value, dst);
            }
            return Ok(());
        }

        match &self.kind {
            ExpKind::Value(v) => {
                self.gen_value(ctx, v.clone(), dst);
                Ok(())
            }
            ExpKind::Glyph { name } => {
                if dst.is_nul() {
                    return Ok(());
                }
                let words = self.get_type(ctx.glyphs).map_or(1, |t| t.words().max(1));
                let exp = Exp::glyph(name.clone(), self.pos.clone());
                for w in 0..words {
                    ctx.emit_move(&dst.offset(w), Arg::lit(exp.clone()).offset(w), &self.pos);
                }
                Ok(())
            }
            ExpKind::Arg { arg, ty } => {
                if dst.is_nul() {
                    return Ok(());
                }
                for w in 0..ty.words() {
                    ctx.emit_move(&dst.offset(w), arg.offset(w), &self.pos);
                }
                Ok(())
            }
            ExpKind::Unary { op, exp } => self.gen_unary(ctx, *op, exp, dst),
            ExpKind::Binary { op, l, r } => match op.short_circuit() {
                Some(sc) => self.gen_short_circuit(ctx, sc, l, r, dst),
                None if *op == BinaryOp::LogOrX => self.gen_log_or_x(ctx, l, r, dst),
                None => self.gen_binary(ctx, *op, l, r, dst),
            },
            ExpKind::Cnd { c, l, r } => self.gen_cnd(ctx, c, l, r, dst),
            ExpKind::Tuple(exps) => {
                let mut off = 0;
                for e in exps {
                    let words = e.get_type(ctx.glyphs)?.words();
                    e.gen_stmnt(ctx, &dst.offset(off))?;
                    off += words;
                }
                Ok(())
            }
            ExpKind::Index { exp, index } => match &exp.kind {
                ExpKind::Tuple(exps) => {
                    for (i, e) in exps.iter().enumerate() {
                        if i == *index as usize {
                            e.gen_stmnt(ctx, dst)?;
                        } else {
                            e.gen_stmnt(ctx, &Arg::Nul)?;
                        }
                    }
                    Ok(())
                }
                _ => Err(self.unsupported("index of a non-constant non-tuple")),
            },
            ExpKind::Cst { ty, exp } => self.gen_cst(ctx, ty, exp, dst),
            ExpKind::Call { target, args, ty } => self.gen_call(ctx, target, args, ty, dst),
        }
    }

    fn gen_value(&self, ctx: &mut GenCtx<'_>, value: Value, dst: &Arg) {
        let words = value.ty().words();
        let exp = Exp::value(value, self.pos.clone());
        for w in 0..words {
            ctx.emit_move(&dst.offset(w), Arg::lit(exp.clone()).offset(w), &self.pos);
        }
    }

    fn gen_unary(
        &self,
        ctx: &mut GenCtx<'_>,
        op: UnaryOp,
        exp: &ExpRef,
        dst: &Arg,
    ) -> Result<(), ExpError> {
        if dst.is_nul() {
            return exp.gen_stmnt(ctx, dst);
        }
        let ty = exp.get_type(ctx.glyphs)?;
        let code = match (op, &ty) {
            (UnaryOp::Not, _) if ty.words() == 1 => Code::LNot,
            (UnaryOp::Neg, Type::Fixed(_)) if ty.words() == 1 => Code::NegI,
            (UnaryOp::Inv, Type::Fixed(_)) if ty.words() == 1 => Code::BNot,
            _ => return Err(self.unsupported(format!("{op:?} on {ty}"))),
        };
        exp.gen_stmnt(ctx, &Arg::Stk)?;
        ctx.stmnt(code, vec![Arg::Stk, Arg::Stk], &self.pos);
        ctx.emit_move(dst, Arg::Stk, &self.pos);
        Ok(())
    }

    fn gen_binary(
        &self,
        ctx: &mut GenCtx<'_>,
        op: BinaryOp,
        l: &ExpRef,
        r: &ExpRef,
        dst: &Arg,
    ) -> Result<(), ExpError> {
        if dst.is_nul() {
            l.gen_stmnt(ctx, dst)?;
            return r.gen_stmnt(ctx, dst);
        }

        let lt = l.get_type(ctx.glyphs)?;
        let rt = r.get_type(ctx.glyphs)?;
        // Comparisons operate in the promoted operand type.
        let op_ty = if op.is_compare() {
            crate::ty::promote_cmp(&lt, &rt).map_err(|e| ExpError::ty(e, &self.pos))?
        } else {
            self.get_type(ctx.glyphs)?
        };
        let (signed, bits_f) = word_layout(&op_ty)
            .ok_or_else(|| self.unsupported(format!("{op} on {op_ty}")))?;
        let code = binary_code(op, signed, bits_f)
            .ok_or_else(|| self.unsupported(format!("{op} on {op_ty}")))?;

        // Rescale fixed operands whose fraction bits differ from the
        // operation's; shift counts are used as-is.
        let widen = |e: &ExpRef, t: &Type| -> ExpRef {
            match (t, &op_ty) {
                (Type::Fixed(a), Type::Fixed(b)) if a.bits_f != b.bits_f => {
                    Exp::cst(op_ty.clone(), e.clone(), e.pos.clone())
                }
                _ => e.clone(),
            }
        };
        let l = widen(l, &lt);
        let r = match op {
            BinaryOp::ShL | BinaryOp::ShR => r.clone(),
            _ => widen(r, &rt),
        };

        l.gen_stmnt(ctx, &Arg::Stk)?;
        r.gen_stmnt(ctx, &Arg::Stk)?;
        ctx.stmnt(code, vec![Arg::Stk, Arg::Stk, Arg::Stk], &self.pos);
        ctx.emit_move(dst, Arg::Stk, &self.pos);
        Ok(())
    }

    fn gen_log_or_x(
        &self,
        ctx: &mut GenCtx<'_>,
        l: &ExpRef,
        r: &ExpRef,
        dst: &Arg,
    ) -> Result<(), ExpError> {
        if dst.is_nul() {
            l.gen_stmnt(ctx, dst)?;
            return r.gen_stmnt(ctx, dst);
        }
        l.gen_stmnt(ctx, &Arg::Stk)?;
        ctx.stmnt(Code::LNot, vec![Arg::Stk, Arg::Stk], &self.pos);
        r.gen_stmnt(ctx, &Arg::Stk)?;
        ctx.stmnt(Code::LNot, vec![Arg::Stk, Arg::Stk], &self.pos);
        ctx.stmnt(Code::CmpNe, vec![Arg::Stk, Arg::Stk, Arg::Stk], &self.pos);
        ctx.emit_move(dst, Arg::Stk, &self.pos);
        Ok(())
    }

    fn gen_short_circuit(
        &self,
        ctx: &mut GenCtx<'_>,
        sc: ShortCircuit,
        l: &ExpRef,
        r: &ExpRef,
        dst: &Arg,
    ) -> Result<(), ExpError> {
        let jcnd = if sc.on { Code::JcndTru } else { Code::JcndNil };

        if dst.is_nul() {
            if !r.is_effect(ctx.glyphs) {
                return l.gen_stmnt(ctx, dst);
            }
            if l.is_constant_foldable(ctx.glyphs) {
                if l.get_value(ctx.glyphs)?.is_true() == sc.on {
                    return l.gen_stmnt(ctx, dst);
                }
                return r.gen_stmnt(ctx, dst);
            }
            let end = ctx.gen_label();
            l.gen_stmnt(ctx, &Arg::Stk)?;
            ctx.stmnt(jcnd, vec![Arg::Stk, Arg::glyph(&end, &self.pos)], &self.pos);
            r.gen_stmnt(ctx, dst)?;
            ctx.block.add_label(end);
            return Ok(());
        }

        let words = self.get_type(ctx.glyphs)?.words();
        if words != 1 {
            return Err(self.unsupported(format!("short-circuit result of {words} words")));
        }

        // Foldable left operands that short make the whole node foldable,
        // so a known left here always defers to the right.
        if l.is_constant_foldable(ctx.glyphs) {
            if !sc.logical {
                return r.gen_stmnt(ctx, dst);
            }
            r.gen_stmnt(ctx, &Arg::Stk)?;
            ctx.stmnt(Code::LNot, vec![Arg::Stk, Arg::Stk], &self.pos);
            ctx.stmnt(Code::LNot, vec![Arg::Stk, Arg::Stk], &self.pos);
            ctx.emit_move(dst, Arg::Stk, &self.pos);
            return Ok(());
        }

        let short = ctx.gen_label();
        let end = ctx.gen_label();
        l.gen_stmnt(ctx, &Arg::Stk)?;

        if sc.logical {
            ctx.stmnt(jcnd, vec![Arg::Stk, Arg::glyph(&short, &self.pos)], &self.pos);
            r.gen_stmnt(ctx, &Arg::Stk)?;
            ctx.stmnt(Code::LNot, vec![Arg::Stk, Arg::Stk], &self.pos);
            ctx.stmnt(Code::LNot, vec![Arg::Stk, Arg::Stk], &self.pos);
            ctx.stmnt(Code::Jump, vec![Arg::glyph(&end, &self.pos)], &self.pos);
            ctx.block.add_label(short);
            let result = Exp::value(Value::word(u32::from(sc.on)), self.pos.clone());
            ctx.stmnt(Code::Move, vec![Arg::Stk, Arg::lit(result)], &self.pos);
        } else {
            let tmp = ctx.alloc_temp();
            ctx.stmnt(Code::Move, vec![tmp.clone(), Arg::Stk], &self.pos);
            ctx.stmnt(jcnd, vec![tmp.clone(), Arg::glyph(&short, &self.pos)], &self.pos);
            r.gen_stmnt(ctx, &Arg::Stk)?;
            ctx.stmnt(Code::Jump, vec![Arg::glyph(&end, &self.pos)], &self.pos);
            ctx.block.add_label(short);
            ctx.stmnt(Code::Move, vec![Arg::Stk, tmp], &self.pos);
            ctx.free_temp();
        }

        ctx.block.add_label(end);
        ctx.emit_move(dst, Arg::Stk, &self.pos);
        Ok(())
    }

    fn gen_cnd(
        &self,
        ctx: &mut GenCtx<'_>,
        c: &ExpRef,
        l: &ExpRef,
        r: &ExpRef,
        dst: &Arg,
    ) -> Result<(), ExpError> {
        if c.is_constant_foldable(ctx.glyphs) {
            let taken = if c.get_value(ctx.glyphs)?.is_true() { l } else { r };
            return taken.gen_stmnt(ctx, dst);
        }
        let other = ctx.gen_label();
        let end = ctx.gen_label();
        c.gen_stmnt(ctx, &Arg::Stk)?;
        ctx.stmnt(
            Code::JcndNil,
            vec![Arg::Stk, Arg::glyph(&other, &self.pos)],
            &self.pos,
        );
        l.gen_stmnt(ctx, dst)?;
        ctx.stmnt(Code::Jump, vec![Arg::glyph(&end, &self.pos)], &self.pos);
        ctx.block.add_label(other);
        r.gen_stmnt(ctx, dst)?;
        ctx.block.add_label(end);
        Ok(())
    }

    fn gen_cst(
        &self,
        ctx: &mut GenCtx<'_>,
        to: &Type,
        exp: &ExpRef,
        dst: &Arg,
    ) -> Result<(), ExpError> {
        if dst.is_nul() {
            return exp.gen_stmnt(ctx, dst);
        }
        let from = exp.get_type(ctx.glyphs)?;
        if &from == to {
            return exp.gen_stmnt(ctx, dst);
        }
        match (word_layout(&from), word_layout(to)) {
            (Some((_, from_f)), Some((signed, to_f))) => {
                exp.gen_stmnt(ctx, &Arg::Stk)?;
                if from_f != to_f {
                    let (code, by) = if to_f > from_f {
                        (Code::ShLU, to_f - from_f)
                    } else {
                        (pick(signed, Code::ShRI, Code::ShRU), from_f - to_f)
                    };
                    ctx.stmnt(Code::Move, vec![Arg::Stk, Arg::word(by)], &self.pos);
                    ctx.stmnt(code, vec![Arg::Stk, Arg::Stk, Arg::Stk], &self.pos);
                }
                ctx.emit_move(dst, Arg::Stk, &self.pos);
                Ok(())
            }
            _ if from.words() == to.words() && from.kind() == to.kind() => {
                exp.gen_stmnt(ctx, dst)
            }
            _ => Err(self.unsupported(format!("conversion from {from} to {to}"))),
        }
    }

    fn gen_call(
        &self,
        ctx: &mut GenCtx<'_>,
        target: &ExpRef,
        args: &[ExpRef],
        ty: &Type,
        dst: &Arg,
    ) -> Result<(), ExpError> {
        let retn = ty.words();
        let ctype = target.call_type(ctx.glyphs);
        let code = match ctype {
            Some(CallType::Special) => Code::Cspe,
            Some(CallType::Native) => Code::Cnat,
            Some(CallType::AsmFunc) => Code::Casm,
            _ => Code::Call,
        };

        let mut stmnt_args = Vec::with_capacity(args.len() + 2);

        // Line specials take all-literal arguments inline when they can.
        let inline = code == Code::Cspe
            && args.iter().all(|a| {
                a.is_constant_foldable(ctx.glyphs)
                    && a.get_type(ctx.glyphs).is_ok_and(|t| t.words() == 1)
            });
        let mut arg_words = Vec::new();
        if inline {
            for a in args {
                arg_words.push(Arg::lit(Exp::value(a.get_value(ctx.glyphs)?, a.pos.clone())));
            }
        } else {
            for a in args {
                let words = a.get_type(ctx.glyphs)?.words();
                a.gen_stmnt(ctx, &Arg::Stk)?;
                arg_words.extend((0..words).map(|_| Arg::Stk));
            }
        }

        let static_target = matches!(target.kind, ExpKind::Value(_) | ExpKind::Glyph { .. })
            || target.is_constant_foldable(ctx.glyphs);
        if static_target {
            stmnt_args.push(Arg::lit(target.clone()));
        } else if code == Code::Call {
            target.gen_stmnt(ctx, &Arg::Stk)?;
            stmnt_args.push(Arg::Stk);
        } else {
            return Err(self.unsupported(format!("indirect {code}")));
        }
        stmnt_args.push(Arg::word(retn));
        stmnt_args.extend(arg_words);
        ctx.stmnt(code, stmnt_args, &self.pos);

        if dst.is_nul() {
            for _ in 0..retn {
                ctx.emit_move(&Arg::Nul, Arg::Stk, &self.pos);
            }
        } else {
            ctx.pop_into(dst, retn, &self.pos);
        }
        Ok(())
    }
}
