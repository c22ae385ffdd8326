//! Statement shapes: which encoding a statement gets, by operand bases.
//!
//! The check pass accepts a statement iff [`Shape::of`] classifies it; the
//! size pass asks the shape for its byte count; the put pass encodes the
//! shape. All three see the same classification.

use ember_ir::{Arg, ArgArr, ArgLit, ArgReg, Code, ExpKind, Function, Statement, Value};

use super::code::{Pcd, RETN_WORDS_MAX, SPECIAL_ARGS_MAX};
use super::TARGET_NAME;
use crate::error::{BcError, BcResult};

/// Encoding selected for one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape<'s> {
    Nop,
    /// Three stack operands.
    Binary(Pcd),
    /// Two stack operands.
    Unary(Pcd),
    Swap,
    /// `Move(Nul, Stk)`
    Drop,
    PushLit(&'s ArgLit),
    PushReg(Pcd, &'s ArgReg),
    AssignReg(Pcd, &'s ArgReg),
    PushLocArs(&'s ArgReg),
    AssignLocArs(&'s ArgReg),
    /// Element index already on the stack.
    PushArr(Pcd, &'s ArgArr),
    /// Element index and value already on the stack.
    AssignArr(Pcd, &'s ArgArr),
    CallLit {
        target: &'s ArgLit,
        ret: u32,
    },
    /// Function index on top of the stack.
    CallStk {
        ret: u32,
    },
    CspeLit {
        spec: &'s ArgLit,
        ret: u32,
        args: Vec<&'s ArgLit>,
    },
    CspeStk {
        spec: &'s ArgLit,
        ret: u32,
        argc: u32,
    },
    Cnat {
        index: &'s ArgLit,
        ret: u32,
        argc: u32,
    },
    /// Opcode word followed by its literal immediates; stack arguments are
    /// consumed by the instruction itself.
    Casm {
        op: &'s ArgLit,
        imms: Vec<&'s ArgLit>,
    },
    Retn {
        script: bool,
        words: u32,
    },
    JumpLit(&'s ArgLit),
    JumpStk,
    Jcnd(Pcd, &'s ArgLit),
    JcndTab(Vec<(&'s ArgLit, &'s ArgLit)>),
}

// ── Opcode tables ──

fn binary_pcd(code: Code) -> Option<Pcd> {
    Some(match code {
        Code::AddI | Code::AddU => Pcd::Add,
        Code::SubI | Code::SubU => Pcd::Subtract,
        Code::MulI | Code::MulU => Pcd::Multiply,
        Code::MulX => Pcd::FixedMul,
        Code::DivI => Pcd::Divide,
        Code::DivU => Pcd::DivideU,
        Code::DivX => Pcd::FixedDiv,
        Code::ModI => Pcd::Modulus,
        Code::ModU => Pcd::ModulusU,
        Code::BAnd => Pcd::AndBitwise,
        Code::BOrI => Pcd::OrBitwise,
        Code::BOrX => Pcd::EorBitwise,
        Code::ShLU => Pcd::LShift,
        Code::ShRI => Pcd::RShift,
        Code::CmpEq => Pcd::Eq,
        Code::CmpNe => Pcd::Ne,
        Code::CmpLtI => Pcd::Lt,
        Code::CmpLeI => Pcd::Le,
        Code::CmpGtI => Pcd::Gt,
        Code::CmpGeI => Pcd::Ge,
        Code::CmpLtU => Pcd::LtU,
        Code::CmpLeU => Pcd::LeU,
        Code::CmpGtU => Pcd::GtU,
        Code::CmpGeU => Pcd::GeU,
        _ => return None,
    })
}

fn unary_pcd(code: Code) -> Option<Pcd> {
    Some(match code {
        Code::BNot => Pcd::NegateBinary,
        Code::LNot => Pcd::NegateLogical,
        Code::NegI => Pcd::UnaryMinus,
        _ => return None,
    })
}

fn push_reg_pcd(arg: &Arg) -> Option<(Pcd, &ArgReg)> {
    match arg {
        Arg::LocReg(r) => Some((Pcd::PushScriptVar, r)),
        Arg::GblReg(r) => Some((Pcd::PushGlobalVar, r)),
        Arg::MapReg(r) => Some((Pcd::PushMapVar, r)),
        Arg::WldReg(r) => Some((Pcd::PushWorldVar, r)),
        _ => None,
    }
}

fn assign_reg_pcd(arg: &Arg) -> Option<(Pcd, &ArgReg)> {
    match arg {
        Arg::LocReg(r) => Some((Pcd::AssignScriptVar, r)),
        Arg::GblReg(r) => Some((Pcd::AssignGlobalVar, r)),
        Arg::MapReg(r) => Some((Pcd::AssignMapVar, r)),
        Arg::WldReg(r) => Some((Pcd::AssignWorldVar, r)),
        _ => None,
    }
}

fn push_arr_pcd(arg: &Arg) -> Option<(Pcd, &ArgArr)> {
    match arg {
        Arg::GblArr(a) => Some((Pcd::PushGlobalArray, a)),
        Arg::MapArr(a) => Some((Pcd::PushMapArray, a)),
        Arg::WldArr(a) => Some((Pcd::PushWorldArray, a)),
        _ => None,
    }
}

fn assign_arr_pcd(arg: &Arg) -> Option<(Pcd, &ArgArr)> {
    match arg {
        Arg::GblArr(a) => Some((Pcd::AssignGlobalArray, a)),
        Arg::MapArr(a) => Some((Pcd::AssignMapArray, a)),
        Arg::WldArr(a) => Some((Pcd::AssignWorldArray, a)),
        _ => None,
    }
}

/// The word of a plain literal constant, for counts that shape encoding.
fn lit_count(arg: &Arg) -> Option<u32> {
    let lit = arg.as_lit()?;
    match &lit.value.kind {
        ExpKind::Value(v @ Value::Fixed(_)) => v.words().get(lit.off as usize).copied(),
        _ => None,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Classification
// ══════════════════════════════════════════════════════════════════════════════

struct Classify<'s> {
    stmnt: &'s Statement,
}

impl<'s> Classify<'s> {
    fn unsupported(&self) -> BcError {
        let bases: Vec<String> = self
            .stmnt
            .args
            .iter()
            .map(|a| a.base().to_string())
            .collect();
        BcError::unsupported(
            format!("{}({})", self.stmnt.code, bases.join(", ")),
            TARGET_NAME,
            &self.stmnt.pos,
        )
    }

    fn bad(&self, index: usize, reason: impl Into<String>) -> BcError {
        BcError::bad_arg(self.stmnt.code, index, reason, &self.stmnt.pos)
    }

    fn arity(&self, n: usize) -> BcResult<()> {
        if self.stmnt.args.len() == n {
            Ok(())
        } else {
            Err(self.bad(
                self.stmnt.args.len().min(n),
                format!("expected {n} operands, got {}", self.stmnt.args.len()),
            ))
        }
    }

    fn min_arity(&self, n: usize) -> BcResult<()> {
        if self.stmnt.args.len() >= n {
            Ok(())
        } else {
            Err(self.bad(
                self.stmnt.args.len(),
                format!("expected at least {n} operands"),
            ))
        }
    }

    fn all_stk(&self, from: usize) -> BcResult<()> {
        if self.stmnt.args[from..].iter().all(Arg::is_stk) {
            Ok(())
        } else {
            Err(self.unsupported())
        }
    }

    fn lit(&self, index: usize) -> BcResult<&'s ArgLit> {
        self.stmnt.args[index]
            .as_lit()
            .ok_or_else(|| self.unsupported())
    }

    fn count(&self, index: usize) -> BcResult<u32> {
        lit_count(&self.stmnt.args[index])
            .ok_or_else(|| self.bad(index, "expected a constant count"))
    }

    fn lit_reg(&self, r: &'s ArgReg) -> BcResult<&'s ArgReg> {
        if matches!(*r.idx, Arg::Lit(_)) {
            Ok(r)
        } else {
            Err(self.unsupported())
        }
    }

    fn stk_arr(&self, a: &'s ArgArr) -> BcResult<&'s ArgArr> {
        if matches!(*a.arr, Arg::Lit(_)) && a.idx.is_stk() {
            Ok(a)
        } else {
            Err(self.unsupported())
        }
    }

    fn moves(&self) -> BcResult<Shape<'s>> {
        self.arity(2)?;
        let (dst, src) = (&self.stmnt.args[0], &self.stmnt.args[1]);
        match (dst, src) {
            (Arg::Nul, Arg::Stk) => Ok(Shape::Drop),
            (Arg::Stk, Arg::Lit(l)) => Ok(Shape::PushLit(l)),
            (Arg::Stk, Arg::LocArs(r)) => Ok(Shape::PushLocArs(self.lit_reg(r)?)),
            (Arg::LocArs(r), Arg::Stk) => Ok(Shape::AssignLocArs(self.lit_reg(r)?)),
            (Arg::Stk, src) => {
                if let Some((pcd, r)) = push_reg_pcd(src) {
                    return Ok(Shape::PushReg(pcd, self.lit_reg(r)?));
                }
                if let Some((pcd, a)) = push_arr_pcd(src) {
                    return Ok(Shape::PushArr(pcd, self.stk_arr(a)?));
                }
                Err(self.unsupported())
            }
            (dst, Arg::Stk) => {
                if let Some((pcd, r)) = assign_reg_pcd(dst) {
                    return Ok(Shape::AssignReg(pcd, self.lit_reg(r)?));
                }
                if let Some((pcd, a)) = assign_arr_pcd(dst) {
                    return Ok(Shape::AssignArr(pcd, self.stk_arr(a)?));
                }
                Err(self.unsupported())
            }
            _ => Err(self.unsupported()),
        }
    }

    fn call(&self) -> BcResult<Shape<'s>> {
        self.min_arity(2)?;
        let ret = self.count(1)?;
        if ret > 1 + RETN_WORDS_MAX {
            return Err(self.unsupported());
        }
        self.all_stk(2)?;
        match &self.stmnt.args[0] {
            Arg::Lit(target) => Ok(Shape::CallLit { target, ret }),
            Arg::Stk => Ok(Shape::CallStk { ret }),
            _ => Err(self.unsupported()),
        }
    }

    fn cspe(&self) -> BcResult<Shape<'s>> {
        self.min_arity(2)?;
        let spec = self.lit(0)?;
        let ret = self.count(1)?;
        let args = &self.stmnt.args[2..];
        if ret > 1 || args.len() > SPECIAL_ARGS_MAX {
            return Err(self.unsupported());
        }
        if args.iter().all(Arg::is_stk) && !args.is_empty() {
            return Ok(Shape::CspeStk {
                spec,
                ret,
                argc: args.len() as u32,
            });
        }
        let lits = args
            .iter()
            .map(Arg::as_lit)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| self.unsupported())?;
        Ok(Shape::CspeLit {
            spec,
            ret,
            args: lits,
        })
    }

    fn cnat(&self) -> BcResult<Shape<'s>> {
        self.min_arity(2)?;
        let index = self.lit(0)?;
        let ret = self.count(1)?;
        if ret > 1 {
            return Err(self.unsupported());
        }
        self.all_stk(2)?;
        Ok(Shape::Cnat {
            index,
            ret,
            argc: (self.stmnt.args.len() - 2) as u32,
        })
    }

    fn jcnd_tab(&self) -> BcResult<Shape<'s>> {
        self.min_arity(1)?;
        self.all_stk_at(0)?;
        let rest = &self.stmnt.args[1..];
        if rest.len() % 2 != 0 {
            return Err(self.bad(self.stmnt.args.len(), "case without a target"));
        }
        let mut cases = Vec::with_capacity(rest.len() / 2);
        for (i, pair) in rest.chunks(2).enumerate() {
            let value = pair[0].as_lit().ok_or_else(|| self.bad(1 + 2 * i, "case value"))?;
            let label = pair[1]
                .as_lit()
                .ok_or_else(|| self.bad(2 + 2 * i, "case target"))?;
            cases.push((value, label));
        }
        Ok(Shape::JcndTab(cases))
    }

    fn all_stk_at(&self, index: usize) -> BcResult<()> {
        if self.stmnt.args[index].is_stk() {
            Ok(())
        } else {
            Err(self.unsupported())
        }
    }
}

impl<'s> Shape<'s> {
    /// Classify a statement, or explain why the target cannot encode it.
    pub fn of(func: &Function, stmnt: &'s Statement) -> BcResult<Shape<'s>> {
        let c = Classify { stmnt };
        let code = stmnt.code;

        if let Some(pcd) = binary_pcd(code) {
            c.arity(3)?;
            c.all_stk(0)?;
            return Ok(Shape::Binary(pcd));
        }
        if let Some(pcd) = unary_pcd(code) {
            c.arity(2)?;
            c.all_stk(0)?;
            return Ok(Shape::Unary(pcd));
        }

        match code {
            Code::Nop => {
                c.arity(0)?;
                Ok(Shape::Nop)
            }
            Code::Swap => {
                c.arity(2)?;
                c.all_stk(0)?;
                Ok(Shape::Swap)
            }
            Code::Move => c.moves(),
            Code::Call => c.call(),
            Code::Cspe => c.cspe(),
            Code::Cnat => c.cnat(),
            Code::Casm => {
                c.min_arity(2)?;
                let op = c.lit(0)?;
                c.count(1)?;
                let imms = stmnt.args[2..].iter().filter_map(Arg::as_lit).collect();
                if stmnt.args[2..].iter().any(|a| !a.is_stk() && a.as_lit().is_none()) {
                    return Err(c.unsupported());
                }
                Ok(Shape::Casm { op, imms })
            }
            Code::Retn => {
                c.all_stk(0)?;
                let words = stmnt.args.len() as u32;
                if words > 1 + RETN_WORDS_MAX {
                    return Err(c.unsupported());
                }
                Ok(Shape::Retn {
                    script: func.ctype.is_script(),
                    words,
                })
            }
            Code::Jump => {
                c.arity(1)?;
                match &stmnt.args[0] {
                    Arg::Lit(l) => Ok(Shape::JumpLit(l)),
                    Arg::Stk => Ok(Shape::JumpStk),
                    _ => Err(c.unsupported()),
                }
            }
            Code::JcndNil | Code::JcndTru => {
                c.arity(2)?;
                c.all_stk_at(0)?;
                let pcd = if code == Code::JcndTru {
                    Pcd::IfGoto
                } else {
                    Pcd::IfNotGoto
                };
                Ok(Shape::Jcnd(pcd, c.lit(1)?))
            }
            Code::JcndTab => c.jcnd_tab(),
            // Only reachable for opcodes with no native encoding, e.g. ShRU
            // left in place when no helper was synthesized.
            _ => Err(c.unsupported()),
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> u32 {
        let extra_ret = |ret: u32| ret.saturating_sub(1) * 16;
        match self {
            Shape::Nop | Shape::Binary(_) | Shape::Unary(_) | Shape::Swap | Shape::Drop => 4,
            Shape::PushLit(_) | Shape::PushReg(..) | Shape::AssignReg(..) => 8,
            Shape::PushLocArs(_) => 16,
            Shape::AssignLocArs(_) => 20,
            Shape::PushArr(_, a) => {
                if a.off == 0 {
                    8
                } else {
                    20
                }
            }
            Shape::AssignArr(_, a) => {
                if a.off == 0 {
                    8
                } else {
                    28
                }
            }
            Shape::CallLit { ret, .. } => 8 + extra_ret(*ret),
            Shape::CallStk { ret } => {
                if *ret == 0 {
                    8
                } else {
                    4 + extra_ret(*ret)
                }
            }
            Shape::CspeLit { ret, args, .. } => {
                if *ret == 0 {
                    12 + 4 * args.len() as u32
                } else {
                    8 * SPECIAL_ARGS_MAX as u32 + 8
                }
            }
            Shape::CspeStk { ret, argc, .. } => {
                if *ret == 0 {
                    12
                } else {
                    8 * (SPECIAL_ARGS_MAX as u32 - argc) + 8
                }
            }
            Shape::Cnat { .. } => 12,
            Shape::Casm { imms, .. } => 4 + 4 * imms.len() as u32,
            Shape::Retn { script, words } => match (*script, *words) {
                (_, 0) => 4,
                (false, n) => 4 + (n - 1) * 20,
                (true, n) => 8 + (n - 1) * 20,
            },
            Shape::JumpLit(_) => 8,
            Shape::JumpStk => 4,
            Shape::Jcnd(..) => 8,
            Shape::JcndTab(cases) => match cases.len() {
                0 => 0,
                1 => 12,
                n => 8 + 8 * n as u32,
            },
        }
    }
}
