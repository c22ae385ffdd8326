//! Translate pass: storage numbering and index assignment.
//!
//! Numbering order matters for the shared map space: map array numbers are
//! chosen first, then map registers are placed around them.

use ember_ir::{AddrBase, CallType, Exp, ExpRef, Origin, Program, SpaceKey, Value};
use tracing::trace;

use super::code::{RETN_ARRAY_BASE, RETN_WORDS_MAX};
use super::{ZdacsTarget, TARGET_NAME};
use crate::alloc::SlotAllocator;
use crate::error::{BcError, BcResult};

const ARRAY_BASES: [AddrBase; 3] = [AddrBase::GblArr, AddrBase::MapArr, AddrBase::WldArr];
const REG_BASES: [AddrBase; 4] = [
    AddrBase::GblReg,
    AddrBase::MapReg,
    AddrBase::WldReg,
    AddrBase::LocArs,
];

/// First automatic-storage index not used for return words.
pub const LOC_ARS_FIRST: u32 = RETN_ARRAY_BASE + RETN_WORDS_MAX;

fn word(n: u32) -> ExpRef {
    Exp::word(n, Origin::builtin())
}

fn exhausted(what: impl std::fmt::Display) -> BcError {
    BcError::unsupported(
        format!("numbering for {what}"),
        TARGET_NAME,
        &Origin::builtin(),
    )
}

fn is_named_array(key: &SpaceKey) -> bool {
    key.base.is_array() && !key.name.is_empty()
}

impl ZdacsTarget {
    pub(super) fn number_program(&mut self, prog: &mut Program) -> BcResult<()> {
        self.number_arrays(prog)?;
        self.number_registers(prog)?;

        self.func_slots = SlotAllocator::new();
        for func in prog.funcs.values() {
            if func.ctype.is_indexed() && !func.alloc {
                self.func_slots.reserve(func.value_int, 1);
            }
        }
        self.next_sname = 0;
        self.next_str = 0;
        Ok(())
    }

    fn number_arrays(&mut self, prog: &mut Program) -> BcResult<()> {
        let cfg = &self.config;
        for base in ARRAY_BASES {
            let mut slots = SlotAllocator::new();
            match base {
                AddrBase::GblArr => {
                    slots.reserve(cfg.loc_ars_array, 1);
                    slots.reserve(cfg.init_gbl_array, 1);
                }
                AddrBase::WldArr if cfg.has_wld_flag() => slots.reserve(cfg.init_wld_array, 1),
                AddrBase::MapArr => {
                    let bank = SpaceKey::bank(AddrBase::MapReg);
                    for obj in prog.objects_in(&bank).filter(|o| !o.alloc) {
                        slots.reserve(obj.value, obj.words);
                    }
                }
                _ => {}
            }

            let keys: Vec<SpaceKey> = prog
                .spaces
                .keys()
                .filter(|k| k.base == base && is_named_array(k))
                .cloned()
                .collect();
            for space in keys.iter().filter_map(|k| prog.spaces.get(k)) {
                if !space.alloc {
                    slots.reserve(space.value, 1);
                }
            }
            for key in &keys {
                let Some(space) = prog.spaces.get_mut(key) else {
                    continue;
                };
                if space.alloc {
                    space.value = slots
                        .alloc(space.value, 1)
                        .ok_or_else(|| exhausted(key))?;
                    space.alloc = false;
                    trace!(target: "ember::bc", space = %key, number = space.value, "array numbered");
                }
            }
        }
        Ok(())
    }

    fn number_registers(&mut self, prog: &mut Program) -> BcResult<()> {
        for base in REG_BASES {
            let key = SpaceKey::bank(base);
            let mut slots = SlotAllocator::new();
            let mut hint = 0;
            match base {
                AddrBase::LocArs => {
                    hint = LOC_ARS_FIRST;
                    slots.reserve(0, LOC_ARS_FIRST);
                    if self.config.init_gbl_array == self.config.loc_ars_array {
                        slots.reserve(self.config.init_gbl_index, 1);
                    }
                }
                AddrBase::MapReg => {
                    for space in prog.spaces.values() {
                        if space.key.base == AddrBase::MapArr && is_named_array(&space.key) {
                            slots.reserve(space.value, 1);
                        }
                    }
                }
                _ => {}
            }

            for obj in prog.objects_in(&key).filter(|o| !o.alloc) {
                slots.reserve(obj.value, obj.words);
            }
            for obj in prog.objs.values_mut().filter(|o| o.space == key && o.alloc) {
                obj.value = slots
                    .alloc(obj.value.max(hint), obj.words)
                    .ok_or_else(|| exhausted(&obj.glyph))?;
                obj.alloc = false;
                trace!(target: "ember::bc", object = %obj.glyph, slot = obj.value, "register placed");
            }
            if let Some(space) = prog.spaces.get_mut(&key) {
                space.words = slots.end();
            }
        }
        Ok(())
    }

    /// Lay out the objects of an array region and bind the glyphs of the
    /// space and its objects.
    pub(super) fn number_space(&mut self, prog: &mut Program, key: &SpaceKey) -> BcResult<()> {
        if is_named_array(key) {
            let mut slots = SlotAllocator::new();
            for obj in prog.objects_in(key).filter(|o| !o.alloc) {
                slots.reserve(obj.value, obj.words);
            }
            for obj in prog.objs.values_mut().filter(|o| &o.space == key && o.alloc) {
                obj.value = slots
                    .alloc(obj.value, obj.words)
                    .ok_or_else(|| exhausted(&obj.glyph))?;
                obj.alloc = false;
            }
            if let Some(space) = prog.spaces.get_mut(key) {
                space.words = space.words.max(slots.end());
                let number = space.value;
                prog.glyphs.bind(&key.name, word(number))?;
            }
        }

        let placed: Vec<(String, u32)> = prog
            .objects_in(key)
            .map(|o| (o.glyph.clone(), o.value))
            .collect();
        for (glyph, slot) in placed {
            prog.glyphs.bind(&glyph, word(slot))?;
        }
        Ok(())
    }

    pub(super) fn number_func(&mut self, prog: &mut Program, name: &str) -> BcResult<()> {
        let Some(func) = prog.funcs.get_mut(name) else {
            return Err(BcError::Internal(format!("no function '{name}'")));
        };
        match func.ctype {
            CallType::StdCall | CallType::StkCall => {
                if func.alloc {
                    func.value_int = self
                        .func_slots
                        .alloc(0, 1)
                        .ok_or_else(|| exhausted(name))?;
                    func.alloc = false;
                }
            }
            CallType::ScriptS => {
                func.value_int = !self.next_sname;
                self.next_sname += 1;
            }
            CallType::ScriptI | CallType::Special | CallType::Native | CallType::AsmFunc => {}
        }
        let value = Value::funct(u64::from(func.value_int), func.ctype);
        trace!(target: "ember::bc", func = name, index = func.value_int, "function numbered");
        prog.glyphs
            .bind(name, Exp::value(value, Origin::builtin()))?;
        Ok(())
    }

    pub(super) fn number_str(&mut self, prog: &mut Program, name: &str) -> BcResult<()> {
        let Some(s) = prog.strs.get_mut(name) else {
            return Err(BcError::Internal(format!("no string '{name}'")));
        };
        s.value_int = self.next_str;
        s.alloc = false;
        self.next_str += 1;
        prog.glyphs.bind(
            name,
            Exp::value(Value::StrEn(u64::from(s.value_int)), Origin::builtin()),
        )?;
        Ok(())
    }
}
