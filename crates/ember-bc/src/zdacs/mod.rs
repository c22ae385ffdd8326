//! The ZDACS stack-machine target.
//!
//! Register banks (local, global, world, map), global/world/map arrays and
//! an operand stack. Every instruction is a sequence of 4-byte words, so a
//! statement's size follows from its [`Shape`] alone.

mod chunk;
mod code;
mod config;
mod opt;
mod pre;
mod put;
mod shape;
mod tr;

use ember_ir::{
    AddrBase, Block, CallType, Function, GlyphTable, Object, Origin, Program, Space, SpaceKey,
    Statement, StrEnt,
};

use crate::alloc::SlotAllocator;
use crate::driver::Target;
use crate::error::{BcError, BcResult};

pub use chunk::{stre_decode, FAKE_ACS0_LEN};
pub use code::{script_flag, script_type, Pcd, RETN_ARRAY_BASE, RETN_WORDS_MAX, SPECIAL_ARGS_MAX};
pub use config::ZdacsConfig;
pub use pre::{INIT_SCRIPT, SHRU_HELPER};
pub use shape::Shape;
pub use tr::LOC_ARS_FIRST;

use put::Encoder;

pub(crate) const TARGET_NAME: &str = "zdacs";

/// The ZDACS backend. Holds numbering state between translate hooks.
#[derive(Debug, Default)]
pub struct ZdacsTarget {
    config: ZdacsConfig,
    func_slots: SlotAllocator,
    next_sname: u32,
    next_str: u32,
}

impl ZdacsTarget {
    pub fn new(config: ZdacsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ZdacsConfig {
        &self.config
    }
}

impl Target for ZdacsTarget {
    fn name(&self) -> &'static str {
        TARGET_NAME
    }

    fn pre_program(&mut self, prog: &mut Program) -> BcResult<()> {
        pre::pre_program(prog, &self.config)
    }

    fn pre_block(&mut self, block: &mut Block, _glyphs: &mut GlyphTable) -> BcResult<()> {
        pre::pre_block(block);
        Ok(())
    }

    fn chk_space(&self, space: &Space) -> BcResult<()> {
        let key = &space.key;
        let ok = match key.base {
            AddrBase::GblReg | AddrBase::MapReg | AddrBase::WldReg | AddrBase::LocArs => {
                key.name.is_empty()
            }
            AddrBase::GblArr | AddrBase::MapArr | AddrBase::WldArr => !key.name.is_empty(),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(BcError::unsupported(
                format!("storage space {key}"),
                TARGET_NAME,
                &Origin::builtin(),
            ))
        }
    }

    fn chk_obj(&self, obj: &Object) -> BcResult<()> {
        if obj.words == 0 {
            return Err(BcError::Internal(format!(
                "object '{}' has no storage",
                obj.glyph
            )));
        }
        Ok(())
    }

    fn chk_func(&self, func: &Function) -> BcResult<()> {
        let unsupported = |what: String| -> BcResult<()> {
            Err(BcError::unsupported(what, TARGET_NAME, &func.pos))
        };
        if func.local_arr > 0 {
            return unsupported(format!("automatic array storage in '{}'", func.glyph));
        }
        if func.retrn > 1 + RETN_WORDS_MAX {
            return unsupported(format!("{} return words from '{}'", func.retrn, func.glyph));
        }
        match func.ctype {
            CallType::StdCall | CallType::StkCall => {
                if func.param > 255 || func.local_reg > 255 {
                    return unsupported(format!("{} locals in '{}'", func.local_reg, func.glyph));
                }
            }
            CallType::ScriptI | CallType::ScriptS => {
                if func.param > 255 || func.local_reg > u32::from(u16::MAX) {
                    return unsupported(format!("{} locals in '{}'", func.local_reg, func.glyph));
                }
                let number = func.value_int as i32;
                if func.ctype == CallType::ScriptI && i16::try_from(number).is_err() {
                    return unsupported(format!("script number {number}"));
                }
            }
            CallType::Special | CallType::Native | CallType::AsmFunc => {
                if func.defin && !func.block.is_empty() {
                    return unsupported(format!("a body for '{}'", func.glyph));
                }
            }
        }
        Ok(())
    }

    fn chk_str(&self, s: &StrEnt) -> BcResult<()> {
        if s.value_str.contains('\0') {
            return Err(BcError::unsupported(
                format!("NUL inside string '{}'", s.glyph),
                TARGET_NAME,
                &Origin::builtin(),
            ));
        }
        Ok(())
    }

    fn chk_stmnt(&self, func: &Function, stmnt: &Statement) -> BcResult<()> {
        Shape::of(func, stmnt).map(|_| ())
    }

    fn opt_block(&mut self, block: &mut Block, glyphs: &GlyphTable) -> BcResult<()> {
        opt::opt_block(block, glyphs);
        Ok(())
    }

    fn size_stmnt(&self, func: &Function, stmnt: &Statement) -> BcResult<u32> {
        Ok(Shape::of(func, stmnt)?.size())
    }

    fn tr_program(&mut self, prog: &mut Program) -> BcResult<()> {
        self.number_program(prog)
    }

    fn tr_space(&mut self, prog: &mut Program, key: &SpaceKey) -> BcResult<()> {
        self.number_space(prog, key)
    }

    fn tr_func(&mut self, prog: &mut Program, name: &str) -> BcResult<()> {
        self.number_func(prog, name)
    }

    fn tr_str(&mut self, prog: &mut Program, name: &str) -> BcResult<()> {
        self.number_str(prog, name)
    }

    fn put_stmnt(
        &self,
        glyphs: &GlyphTable,
        func: &Function,
        stmnt: &Statement,
        out: &mut Vec<u8>,
    ) -> BcResult<()> {
        let shape = Shape::of(func, stmnt)?;
        Encoder {
            glyphs,
            loc_ars: self.config.loc_ars_array,
            out,
        }
        .put(&shape)
    }

    fn put_program(&self, prog: &Program, code: Vec<u8>) -> BcResult<Vec<u8>> {
        chunk::put_program(prog, code, &self.config)
    }
}
