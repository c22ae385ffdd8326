//! The multi-pass translation driver.
//!
//! The driver owns traversal order; a [`Target`] only answers per-construct
//! hooks. Every hook except the statement-level check, size and put hooks
//! (and final container assembly) has a no-op default, so a target
//! overrides just the constructs it must special-case.
//!
//! Passes run in [`Pass::EXECUTION_ORDER`]:
//!
//! 1. **pre**: synthesize support code and normalize operands.
//! 2. **check**: reject shapes the target cannot encode.
//! 3. **opt**: peephole rewrites that are safe after check.
//! 4. **size**: replay encoding shapes, binding every label to the running
//!    position counter.
//! 5. **translate**: assign storage slots and indices, binding their glyphs.
//! 6. **emit**: stream the encoding; any unbound glyph is fatal.
//!
//! Sizing runs after every rewriting pass so the positions it binds match
//! the statements that are finally emitted.

use std::fmt;

use ember_ir::{
    Block, Exp, Function, GlyphTable, Object, Origin, Program, Space, SpaceKey, Statement, StrEnt,
    Value,
};
use tracing::{debug, trace};

use crate::error::{BcError, BcResult};

// ══════════════════════════════════════════════════════════════════════════════
// Passes
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    Check,
    Size,
    Pre,
    Opt,
    Translate,
    Emit,
}

impl Pass {
    /// The order the driver runs passes in.
    pub const EXECUTION_ORDER: [Pass; 6] = [
        Pass::Pre,
        Pass::Check,
        Pass::Opt,
        Pass::Size,
        Pass::Translate,
        Pass::Emit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::Check => "check",
            Pass::Size => "size",
            Pass::Pre => "pre",
            Pass::Opt => "opt",
            Pass::Translate => "translate",
            Pass::Emit => "emit",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Target
// ══════════════════════════════════════════════════════════════════════════════

/// A bytecode target: per-construct hooks invoked by the [`Driver`].
#[allow(unused_variables)]
pub trait Target {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    // ── pre ──

    fn pre_program(&mut self, prog: &mut Program) -> BcResult<()> {
        Ok(())
    }

    fn pre_func(&mut self, func: &mut Function, glyphs: &mut GlyphTable) -> BcResult<()> {
        Ok(())
    }

    fn pre_block(&mut self, block: &mut Block, glyphs: &mut GlyphTable) -> BcResult<()> {
        Ok(())
    }

    // ── check ──

    fn chk_space(&self, space: &Space) -> BcResult<()> {
        Ok(())
    }

    fn chk_obj(&self, obj: &Object) -> BcResult<()> {
        Ok(())
    }

    fn chk_func(&self, func: &Function) -> BcResult<()> {
        Ok(())
    }

    fn chk_str(&self, s: &StrEnt) -> BcResult<()> {
        Ok(())
    }

    /// Reject any statement code or operand shape the target cannot encode.
    fn chk_stmnt(&self, func: &Function, stmnt: &Statement) -> BcResult<()>;

    // ── opt ──

    fn opt_block(&mut self, block: &mut Block, glyphs: &GlyphTable) -> BcResult<()> {
        Ok(())
    }

    // ── size ──

    /// Encoded size of a statement in bytes. Must equal what
    /// [`Target::put_stmnt`] writes for the same statement.
    fn size_stmnt(&self, func: &Function, stmnt: &Statement) -> BcResult<u32>;

    // ── translate ──

    fn tr_program(&mut self, prog: &mut Program) -> BcResult<()> {
        Ok(())
    }

    fn tr_space(&mut self, prog: &mut Program, key: &SpaceKey) -> BcResult<()> {
        Ok(())
    }

    fn tr_func(&mut self, prog: &mut Program, name: &str) -> BcResult<()> {
        Ok(())
    }

    fn tr_str(&mut self, prog: &mut Program, name: &str) -> BcResult<()> {
        Ok(())
    }

    // ── emit ──

    fn put_stmnt(
        &self,
        glyphs: &GlyphTable,
        func: &Function,
        stmnt: &Statement,
        out: &mut Vec<u8>,
    ) -> BcResult<()>;

    /// Wrap the code bytes and the program's tables into the object file.
    fn put_program(&self, prog: &Program, code: Vec<u8>) -> BcResult<Vec<u8>>;
}

// ══════════════════════════════════════════════════════════════════════════════
// Driver
// ══════════════════════════════════════════════════════════════════════════════

/// Runs the passes of one target over one program.
pub struct Driver<'t, T: Target> {
    target: &'t mut T,
    /// Code size per function, recorded by the size pass.
    sizes: Vec<u32>,
}

impl<'t, T: Target> Driver<'t, T> {
    pub fn new(target: &'t mut T) -> Self {
        Self {
            target,
            sizes: Vec::new(),
        }
    }

    /// Run every pass and return the object bytes.
    pub fn run(&mut self, prog: &mut Program) -> BcResult<Vec<u8>> {
        let mut object = Vec::new();
        for pass in Pass::EXECUTION_ORDER {
            debug!(target: "ember::bc", target_name = self.target.name(), %pass, "pass start");
            match pass {
                Pass::Pre => self.pre(prog)?,
                Pass::Check => self.check(prog)?,
                Pass::Opt => self.opt(prog)?,
                Pass::Size => self.size(prog)?,
                Pass::Translate => self.translate(prog)?,
                Pass::Emit => object = self.emit(prog)?,
            }
        }
        debug!(target: "ember::bc", bytes = object.len(), "object complete");
        Ok(object)
    }

    pub fn pre(&mut self, prog: &mut Program) -> BcResult<()> {
        self.target.pre_program(prog)?;
        for func in prog.funcs.values_mut() {
            self.target.pre_func(func, &mut prog.glyphs)?;
            self.target.pre_block(&mut func.block, &mut prog.glyphs)?;
        }
        Ok(())
    }

    pub fn check(&mut self, prog: &Program) -> BcResult<()> {
        for space in prog.spaces.values() {
            self.target.chk_space(space)?;
        }
        for obj in prog.objs.values() {
            self.target.chk_obj(obj)?;
        }
        for func in prog.funcs.values() {
            self.target.chk_func(func)?;
            for stmnt in func.block.iter() {
                self.target.chk_stmnt(func, stmnt)?;
            }
        }
        for s in prog.strs.values() {
            self.target.chk_str(s)?;
        }
        Ok(())
    }

    pub fn opt(&mut self, prog: &mut Program) -> BcResult<()> {
        for func in prog.funcs.values_mut() {
            let before = func.block.len();
            self.target.opt_block(&mut func.block, &prog.glyphs)?;
            trace!(
                target: "ember::bc",
                func = %func.glyph,
                removed = before.saturating_sub(func.block.len()),
                "peephole"
            );
        }
        Ok(())
    }

    /// Bind every label to its byte offset in the code stream.
    pub fn size(&mut self, prog: &mut Program) -> BcResult<()> {
        let word = |n: u32| Exp::value(Value::word(n), Origin::builtin());
        let mut pos = 0u32;
        self.sizes.clear();

        for func in prog.funcs.values() {
            if !func.defin {
                prog.glyphs.bind(&func.label, word(0))?;
                self.sizes.push(0);
                continue;
            }
            let start = pos;
            prog.glyphs.bind(&func.label, word(pos))?;
            for stmnt in func.block.iter() {
                for label in &stmnt.labels {
                    prog.glyphs.bind(label, word(pos))?;
                }
                let size = self.target.size_stmnt(func, stmnt)?;
                pos = pos
                    .checked_add(size)
                    .ok_or_else(|| BcError::Internal("code size overflow".into()))?;
            }
            for label in &func.block.pending {
                prog.glyphs.bind(label, word(pos))?;
            }
            trace!(target: "ember::bc", func = %func.glyph, start, size = pos - start, "sized");
            self.sizes.push(pos - start);
        }
        debug!(target: "ember::bc", code_bytes = pos, "size complete");
        Ok(())
    }

    pub fn translate(&mut self, prog: &mut Program) -> BcResult<()> {
        self.target.tr_program(prog)?;
        let keys: Vec<SpaceKey> = prog.spaces.keys().cloned().collect();
        for key in &keys {
            self.target.tr_space(prog, key)?;
        }
        let funcs: Vec<String> = prog.funcs.keys().cloned().collect();
        for name in &funcs {
            self.target.tr_func(prog, name)?;
        }
        let strs: Vec<String> = prog.strs.keys().cloned().collect();
        for name in &strs {
            self.target.tr_str(prog, name)?;
        }
        Ok(())
    }

    pub fn emit(&mut self, prog: &Program) -> BcResult<Vec<u8>> {
        if let Some(name) = prog.glyphs.unbound().next() {
            return Err(BcError::UnboundGlyph(name.to_string()));
        }
        if self.sizes.len() != prog.funcs.len() {
            return Err(BcError::Internal("emit before size".into()));
        }

        let mut code = Vec::new();
        for (func, &expected) in prog.funcs.values().zip(&self.sizes) {
            if !func.defin {
                continue;
            }
            let start = code.len();
            for stmnt in func.block.iter() {
                self.target
                    .put_stmnt(&prog.glyphs, func, stmnt, &mut code)?;
            }
            let written = code.len() - start;
            if written != expected as usize {
                return Err(BcError::Internal(format!(
                    "function '{}' emitted {written} bytes but was sized at {expected}",
                    func.glyph
                )));
            }
        }
        self.target.put_program(prog, code)
    }
}
