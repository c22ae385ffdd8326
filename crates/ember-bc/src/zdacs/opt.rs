//! Peephole rewrites.
//!
//! Runs after check, so every statement here already has an encodable
//! shape; each rewrite keeps it that way. Labels of removed statements move
//! to the next surviving statement, or to the block's pending labels.

use ember_ir::{Arg, Block, Code, GlyphTable, Statement};

fn is_drop(stmnt: &Statement) -> bool {
    stmnt.code == Code::Move && matches!(stmnt.args.as_slice(), [Arg::Nul, Arg::Stk])
}

/// A push that reads nothing from the stack.
fn is_pure_push(stmnt: &Statement) -> bool {
    if stmnt.code != Code::Move {
        return false;
    }
    match stmnt.args.as_slice() {
        [Arg::Stk, src] => matches!(
            src,
            Arg::Lit(_)
                | Arg::LocReg(_)
                | Arg::GblReg(_)
                | Arg::MapReg(_)
                | Arg::WldReg(_)
                | Arg::LocArs(_)
        ),
        _ => false,
    }
}

fn is_special_with_result(stmnt: &Statement, glyphs: &GlyphTable) -> bool {
    stmnt.code == Code::Cspe
        && stmnt
            .args
            .get(1)
            .and_then(Arg::as_lit)
            .is_some_and(|l| l.value.is_nonzero(glyphs))
}

pub fn opt_block(block: &mut Block, glyphs: &GlyphTable) {
    let old = std::mem::take(&mut block.stmnts);
    let mut carry: Vec<String> = Vec::new();
    let mut iter = old.into_iter().peekable();

    while let Some(mut stmnt) = iter.next() {
        if stmnt.code == Code::Nop {
            carry.append(&mut stmnt.labels);
            continue;
        }
        let dropped = iter
            .peek()
            .is_some_and(|next| is_drop(next) && next.labels.is_empty());
        if dropped && is_pure_push(&stmnt) {
            carry.append(&mut stmnt.labels);
            iter.next();
            continue;
        }
        if dropped && is_special_with_result(&stmnt, glyphs) {
            stmnt.args[1] = Arg::word(0);
            iter.next();
        }
        if !carry.is_empty() {
            carry.append(&mut stmnt.labels);
            stmnt.labels = std::mem::take(&mut carry);
        }
        block.stmnts.push(stmnt);
    }

    if !carry.is_empty() {
        carry.append(&mut block.pending);
        block.pending = carry;
    }
}
