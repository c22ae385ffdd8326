//! Pre pass: support code synthesis and operand normalization.

use ember_ir::{
    AddrBase, Arg, ArgArr, Block, CallType, Code, Function, GlyphTable, Object, Origin, Program,
    ScriptType, Statement, Type,
};
use tracing::debug;

use super::config::ZdacsConfig;
use super::TARGET_NAME;
use crate::error::{BcError, BcResult};

/// Glyph of the synthesized unsigned right shift helper.
pub const SHRU_HELPER: &str = "___ember_ShRU";

/// Glyph of the synthesized initializer script.
pub const INIT_SCRIPT: &str = "___ember_init";

// ══════════════════════════════════════════════════════════════════════════════
// Unsigned right shift helper
// ══════════════════════════════════════════════════════════════════════════════

fn uses_shru(prog: &Program) -> bool {
    prog.funcs
        .values()
        .any(|f| f.block.iter().any(|s| s.code == Code::ShRU))
}

/// `(v >> s) & ((1 << (32 - s)) - 1)`, or `v` when `s` is zero.
fn shru_helper(glyphs: &mut GlyphTable) -> Function {
    let mut func = Function::new(SHRU_HELPER, CallType::StdCall);
    func.param = 2;
    func.retrn = 1;
    func.local_reg = 2;

    let shift = format!("{SHRU_HELPER}$shift");
    glyphs.declare(shift.clone(), Some(Type::WORD));
    let pos = Origin::builtin();
    let (val, sft) = (Arg::loc_reg(0), Arg::loc_reg(1));
    let b = &mut func.block;

    b.add_stmnt(Code::Move, vec![Arg::Stk, sft.clone()]);
    b.add_stmnt(Code::JcndTru, vec![Arg::Stk, Arg::glyph(&shift, &pos)]);
    b.add_stmnt(Code::Move, vec![Arg::Stk, val.clone()]);
    b.add_stmnt(Code::Retn, vec![Arg::Stk]);

    b.add_label(shift);
    b.add_stmnt(Code::Move, vec![Arg::Stk, val]);
    b.add_stmnt(Code::Move, vec![Arg::Stk, sft.clone()]);
    b.add_stmnt(Code::ShRI, vec![Arg::Stk; 3]);
    b.add_stmnt(Code::Move, vec![Arg::Stk, Arg::word(1)]);
    b.add_stmnt(Code::Move, vec![Arg::Stk, Arg::word(32)]);
    b.add_stmnt(Code::Move, vec![Arg::Stk, sft]);
    b.add_stmnt(Code::SubU, vec![Arg::Stk; 3]);
    b.add_stmnt(Code::ShLU, vec![Arg::Stk; 3]);
    b.add_stmnt(Code::Move, vec![Arg::Stk, Arg::word(1)]);
    b.add_stmnt(Code::SubU, vec![Arg::Stk; 3]);
    b.add_stmnt(Code::BAnd, vec![Arg::Stk; 3]);
    b.add_stmnt(Code::Retn, vec![Arg::Stk]);
    func
}

// ══════════════════════════════════════════════════════════════════════════════
// Initializer script
// ══════════════════════════════════════════════════════════════════════════════

/// Initialized objects whose storage is not preloaded from the object file.
fn run_time_inits(prog: &Program, world: bool) -> Vec<&Object> {
    prog.objs
        .values()
        .filter(|o| o.defin && o.initi.is_some())
        .filter(|o| match o.space.base {
            AddrBase::WldReg | AddrBase::WldArr => world,
            AddrBase::GblReg | AddrBase::GblArr | AddrBase::LocArs => !world,
            _ => false,
        })
        .collect()
}

fn flag_arg(base: AddrBase, arr: u32) -> Arg {
    Arg::arr(base, Arg::word(arr), Arg::Stk)
}

/// Emit `if flag { goto done }; <stores>; flag = 1; done:`.
fn guarded_stores(
    block: &mut Block,
    glyphs: &mut GlyphTable,
    objs: &[&Object],
    flag: (AddrBase, u32, u32),
    done: String,
) {
    let pos = Origin::builtin();
    let (base, arr, idx) = flag;
    glyphs.declare(done.clone(), Some(Type::WORD));

    block.add_stmnt(Code::Move, vec![Arg::Stk, Arg::word(idx)]);
    block.add_stmnt(Code::Move, vec![Arg::Stk, flag_arg(base, arr)]);
    block.add_stmnt(Code::JcndTru, vec![Arg::Stk, Arg::glyph(&done, &pos)]);

    for obj in objs {
        let Some(init) = &obj.initi else { continue };
        let at = Arg::glyph(&obj.glyph, &pos);
        for w in 0..obj.words {
            let value = Arg::lit(init.clone()).offset(w);
            match obj.space.base {
                AddrBase::GblArr | AddrBase::WldArr => {
                    let space = Arg::glyph(&obj.space.name, &pos);
                    block.add_stmnt(Code::Move, vec![Arg::Stk, at.clone()]);
                    block.add_stmnt(Code::Move, vec![Arg::Stk, value]);
                    block.add_stmnt(
                        Code::Move,
                        vec![Arg::arr(obj.space.base, space, Arg::Stk).offset(w), Arg::Stk],
                    );
                }
                reg => {
                    block.add_stmnt(Code::Move, vec![Arg::Stk, value]);
                    block.add_stmnt(
                        Code::Move,
                        vec![Arg::reg(reg, at.clone()).offset(w), Arg::Stk],
                    );
                }
            }
        }
    }

    block.add_stmnt(Code::Move, vec![Arg::Stk, Arg::word(idx)]);
    block.add_stmnt(Code::Move, vec![Arg::Stk, Arg::word(1)]);
    block.add_stmnt(Code::Move, vec![flag_arg(base, arr), Arg::Stk]);
    block.add_label(done);
}

fn init_script(prog: &mut Program, cfg: &ZdacsConfig) -> Option<Function> {
    let gbl: Vec<Object> = run_time_inits(prog, false).into_iter().cloned().collect();
    let wld: Vec<Object> = run_time_inits(prog, true).into_iter().cloned().collect();
    if gbl.is_empty() && wld.is_empty() {
        return None;
    }

    let mut func = Function::new(INIT_SCRIPT, CallType::ScriptI);
    func.value_int = cfg.init_script_number;
    func.alloc = false;
    func.stype = ScriptType::Open;

    let gbl_flag = (AddrBase::GblArr, cfg.init_gbl_array, cfg.init_gbl_index);
    let glyphs = &mut prog.glyphs;
    if cfg.has_wld_flag() {
        let flag = (AddrBase::WldArr, cfg.init_wld_array, cfg.init_wld_index);
        if !wld.is_empty() {
            let objs: Vec<&Object> = wld.iter().collect();
            guarded_stores(&mut func.block, glyphs, &objs, flag, format!("{INIT_SCRIPT}$wld"));
        }
        if !gbl.is_empty() {
            let objs: Vec<&Object> = gbl.iter().collect();
            guarded_stores(&mut func.block, glyphs, &objs, gbl_flag, format!("{INIT_SCRIPT}$gbl"));
        }
    } else {
        let objs: Vec<&Object> = wld.iter().chain(gbl.iter()).collect();
        guarded_stores(&mut func.block, glyphs, &objs, gbl_flag, format!("{INIT_SCRIPT}$gbl"));
    }
    func.block.add_stmnt(Code::Retn, vec![]);

    debug!(
        target: "ember::bc",
        global = gbl.len(),
        world = wld.len(),
        "synthesized initializer script"
    );
    Some(func)
}

/// Add the support functions the program needs.
pub fn pre_program(prog: &mut Program, cfg: &ZdacsConfig) -> BcResult<()> {
    if uses_shru(prog) && !prog.funcs.contains_key(SHRU_HELPER) {
        let helper = shru_helper(&mut prog.glyphs);
        prog.add_function(helper)?;
        debug!(target: "ember::bc", "synthesized {SHRU_HELPER}");
    }
    if !prog.funcs.contains_key(INIT_SCRIPT) {
        if let Some(init) = init_script(prog, cfg) {
            let taken = prog.funcs.values().find(|f| {
                f.ctype == CallType::ScriptI && f.value_int == cfg.init_script_number
            });
            if let Some(f) = taken {
                return Err(BcError::unsupported(
                    format!(
                        "script number {} of '{}' (reserved for the initializer script)",
                        cfg.init_script_number, f.glyph
                    ),
                    TARGET_NAME,
                    &f.pos,
                ));
            }
            prog.add_function(init)?;
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Operand normalization
// ══════════════════════════════════════════════════════════════════════════════

/// Whether an array operand still needs its index pushed.
fn arr_needs_push(arg: &Arg) -> Option<&ArgArr> {
    match arg {
        Arg::GblArr(a) | Arg::MapArr(a) | Arg::WldArr(a) if !a.idx.is_stk() => Some(a),
        _ => None,
    }
}

fn with_stk_idx(arg: &Arg) -> Arg {
    let mut arg = arg.clone();
    if let Arg::GblArr(a) | Arg::MapArr(a) | Arg::WldArr(a) = &mut arg {
        a.idx = Box::new(Arg::Stk);
    }
    arg
}

fn is_operand(arg: &Arg) -> bool {
    !arg.is_stk() && !arg.is_nul()
}

type Plain = (Code, Vec<Arg>);

fn push(src: Arg) -> Plain {
    (Code::Move, vec![Arg::Stk, src])
}

/// Rewrite a move into forms with at most one non-stack side.
fn split_move(dst: &Arg, src: &Arg, out: &mut Vec<Plain>) {
    // Source first: its value ends up below a destination index otherwise.
    if let Some(a) = arr_needs_push(src) {
        out.push(push((*a.idx).clone()));
        out.push(push(with_stk_idx(src)));
        if !dst.is_stk() {
            split_move(dst, &Arg::Stk, out);
        }
        return;
    }
    if let Some(a) = arr_needs_push(dst) {
        out.push(push((*a.idx).clone()));
        if src.is_stk() {
            out.push((Code::Swap, vec![Arg::Stk, Arg::Stk]));
        } else {
            out.push(push(src.clone()));
        }
        out.push((Code::Move, vec![with_stk_idx(dst), Arg::Stk]));
        return;
    }
    if is_operand(src) && !dst.is_stk() {
        out.push(push(src.clone()));
        out.push((Code::Move, vec![dst.clone(), Arg::Stk]));
        return;
    }
    out.push((Code::Move, vec![dst.clone(), src.clone()]));
}

fn normalize(stmnt: &Statement) -> Option<Vec<Plain>> {
    let args = &stmnt.args;
    let mut out = Vec::new();
    match stmnt.code {
        Code::Move if args.len() == 2 => {
            let (dst, src) = (&args[0], &args[1]);
            let simple = (dst.is_stk() || src.is_stk() || dst.is_nul())
                && arr_needs_push(dst).is_none()
                && arr_needs_push(src).is_none()
                && !(dst.is_nul() && is_operand(src));
            if simple {
                return None;
            }
            split_move(dst, src, &mut out);
        }
        Code::JcndNil | Code::JcndTru | Code::JcndTab
            if args.first().is_some_and(is_operand) =>
        {
            out.push(push(args[0].clone()));
            let mut rest = args.clone();
            rest[0] = Arg::Stk;
            out.push((stmnt.code, rest));
        }
        Code::Jump if args.len() == 1 && is_operand(&args[0]) && args[0].as_lit().is_none() => {
            out.push(push(args[0].clone()));
            out.push((Code::Jump, vec![Arg::Stk]));
        }
        // Stack-resident words must precede the direct ones.
        Code::Retn
            if args.iter().any(is_operand)
                && args.iter().skip_while(|a| a.is_stk()).all(is_operand) =>
        {
            for a in args.iter().skip_while(|a| a.is_stk()) {
                out.push(push(a.clone()));
            }
            out.push((Code::Retn, vec![Arg::Stk; args.len()]));
        }
        Code::ShRU => {
            let pos = &stmnt.pos;
            let mut call = vec![Arg::glyph(SHRU_HELPER, pos), Arg::word(1)];
            call.extend(args.iter().skip(1).cloned());
            out.push((Code::Call, call));
        }
        _ => return None,
    }
    Some(out)
}

/// Normalize every statement of a block in place.
pub fn pre_block(block: &mut Block) {
    let old = std::mem::take(&mut block.stmnts);
    for stmnt in old {
        match normalize(&stmnt) {
            None => block.stmnts.push(stmnt),
            Some(plain) => {
                let mut labels = Some(stmnt.labels);
                for (code, args) in plain {
                    let mut s = Statement::new(code, args, stmnt.pos.clone());
                    s.labels = labels.take().unwrap_or_default();
                    block.stmnts.push(s);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ir::{Exp, SpaceKey};

    fn codes(block: &Block) -> Vec<Code> {
        block.iter().map(|s| s.code).collect()
    }

    #[test]
    fn test_reg_to_reg_move_split() {
        let mut b = Block::new();
        b.add_label("l");
        b.add_stmnt(Code::Move, vec![Arg::loc_reg(0), Arg::loc_reg(1)]);
        pre_block(&mut b);
        assert_eq!(b.stmnts.len(), 2);
        assert_eq!(b.stmnts[0].args, vec![Arg::Stk, Arg::loc_reg(1)]);
        assert_eq!(b.stmnts[0].labels, vec!["l"]);
        assert_eq!(b.stmnts[1].args, vec![Arg::loc_reg(0), Arg::Stk]);
        assert!(b.stmnts[1].labels.is_empty());
    }

    #[test]
    fn test_branch_condition_pushed() {
        let mut b = Block::new();
        b.add_stmnt(Code::JcndTru, vec![Arg::loc_reg(2), Arg::word(0)]);
        b.add_stmnt(Code::Retn, vec![Arg::word(5)]);
        pre_block(&mut b);
        assert_eq!(
            codes(&b),
            vec![Code::Move, Code::JcndTru, Code::Move, Code::Retn]
        );
        assert_eq!(b.stmnts[1].args[0], Arg::Stk);
        assert_eq!(b.stmnts[3].args, vec![Arg::Stk]);
    }

    #[test]
    fn test_return_words_keep_their_order() {
        let mut b = Block::new();
        b.add_stmnt(Code::Retn, vec![Arg::Stk, Arg::word(5), Arg::loc_reg(1)]);
        pre_block(&mut b);
        assert_eq!(codes(&b), vec![Code::Move, Code::Move, Code::Retn]);
        assert_eq!(b.stmnts[0].args, vec![Arg::Stk, Arg::word(5)]);
        assert_eq!(b.stmnts[1].args, vec![Arg::Stk, Arg::loc_reg(1)]);
        assert_eq!(b.stmnts[2].args, vec![Arg::Stk; 3]);
    }

    #[test]
    fn test_direct_return_word_before_stack_word_left_alone() {
        let mut b = Block::new();
        b.add_stmnt(Code::Retn, vec![Arg::word(5), Arg::Stk]);
        pre_block(&mut b);
        assert_eq!(codes(&b), vec![Code::Retn]);
        assert_eq!(b.stmnts[0].args, vec![Arg::word(5), Arg::Stk]);
    }

    #[test]
    fn test_array_index_pushed_before_value() {
        let mut b = Block::new();
        let dst = Arg::arr(AddrBase::GblArr, Arg::word(3), Arg::word(6));
        b.add_stmnt(Code::Move, vec![dst, Arg::word(9)]);
        pre_block(&mut b);
        assert_eq!(b.stmnts[0].args[1], Arg::word(6));
        assert_eq!(b.stmnts[1].args[1], Arg::word(9));
        assert_eq!(
            b.stmnts[2].args[0],
            Arg::arr(AddrBase::GblArr, Arg::word(3), Arg::Stk)
        );
    }

    #[test]
    fn test_array_store_from_stack_swaps() {
        let mut b = Block::new();
        let dst = Arg::arr(AddrBase::MapArr, Arg::word(1), Arg::loc_reg(0));
        b.add_stmnt(Code::Move, vec![dst, Arg::Stk]);
        pre_block(&mut b);
        assert_eq!(codes(&b), vec![Code::Move, Code::Swap, Code::Move]);
    }

    #[test]
    fn test_shru_becomes_helper_call() {
        let mut prog = Program::new();
        let mut f = Function::new("f", CallType::StdCall);
        f.block.add_stmnt(Code::ShRU, vec![Arg::Stk; 3]);
        prog.add_function(f).unwrap();
        pre_program(&mut prog, &ZdacsConfig::default()).unwrap();
        assert!(prog.funcs.contains_key(SHRU_HELPER));
        let helper = &prog.funcs[SHRU_HELPER];
        assert_eq!((helper.param, helper.retrn), (2, 1));
        assert!(helper.block.iter().all(|s| s.code != Code::ShRU));

        let f = prog.funcs.get_mut("f").unwrap();
        pre_block(&mut f.block);
        assert_eq!(f.block.stmnts[0].code, Code::Call);
        assert_eq!(f.block.stmnts[0].args.len(), 4);
    }

    #[test]
    fn test_init_script_number_collision_rejected() {
        let mut prog = Program::new();
        let mut user = Function::new("user", CallType::ScriptI);
        user.value_int = 999;
        user.alloc = false;
        user.pos = Origin::new("s.c", 2, 1);
        prog.add_function(user).unwrap();
        let gbl = SpaceKey::bank(AddrBase::GblReg);
        prog.add_object(Object::new("g", gbl, 1).with_init(Exp::word(7, Origin::builtin())))
            .unwrap();

        let err = pre_program(&mut prog, &ZdacsConfig::default()).unwrap_err();
        assert!(matches!(err, BcError::Unsupported { ref pos, .. } if pos.line == 2));
        assert!(!prog.funcs.contains_key(INIT_SCRIPT));

        let moved = ZdacsConfig {
            init_script_number: 998,
            ..ZdacsConfig::default()
        };
        pre_program(&mut prog, &moved).unwrap();
        assert_eq!(prog.funcs[INIT_SCRIPT].value_int, 998);
    }

    #[test]
    fn test_init_script_only_when_needed() {
        let mut prog = Program::new();
        let map = SpaceKey::bank(AddrBase::MapReg);
        prog.add_object(Object::new("m", map, 1).with_init(Exp::word(1, Origin::builtin())))
            .unwrap();
        pre_program(&mut prog, &ZdacsConfig::default()).unwrap();
        assert!(!prog.funcs.contains_key(INIT_SCRIPT));

        let gbl = SpaceKey::bank(AddrBase::GblReg);
        prog.add_object(Object::new("g", gbl, 1).with_init(Exp::word(7, Origin::builtin())))
            .unwrap();
        pre_program(&mut prog, &ZdacsConfig::default()).unwrap();
        let init = &prog.funcs[INIT_SCRIPT];
        assert_eq!(init.value_int, 999);
        assert_eq!(init.stype, ScriptType::Open);
        assert_eq!(init.block.stmnts.last().map(|s| s.code), Some(Code::Retn));
        assert_eq!(
            init.block.stmnts.last().map(|s| s.labels.clone()),
            Some(vec![format!("{INIT_SCRIPT}$gbl")])
        );
        // flag check, one store, flag set, return
        assert_eq!(init.block.len(), 3 + 2 + 3 + 1);
    }
}
