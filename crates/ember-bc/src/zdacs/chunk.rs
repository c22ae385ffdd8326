//! Object assembly: the chunk tables around the code stream.

use std::collections::BTreeMap;

use ember_ir::{AddrBase, CallType, Function, Linkage, Program, ScriptType, SpaceKey};
use tracing::debug;

use super::code::{script_flag, script_type, SCRIPT_VARS_DEFAULT, STRE_KEY};
use super::config::ZdacsConfig;
use super::put::{fold, value_words};
use crate::container::{Chunk, ObjectWriter, PutBytes};
use crate::error::BcResult;

/// Header older loaders accept before a chunked object.
pub const FAKE_ACS0_LEN: usize = 24;

fn fake_acs0() -> Vec<u8> {
    let mut h = Vec::with_capacity(FAKE_ACS0_LEN);
    h.extend_from_slice(b"ACS\0");
    h.put_u32(8);
    h.put_u32(0);
    h.put_u32(0);
    h.extend_from_slice(b"ACSE");
    h.put_u32(FAKE_ACS0_LEN as u32);
    h
}

fn stype_code(stype: ScriptType) -> u8 {
    match stype {
        ScriptType::Closed => script_type::CLOSED,
        ScriptType::Open => script_type::OPEN,
        ScriptType::Respawn => script_type::RESPAWN,
        ScriptType::Death => script_type::DEATH,
        ScriptType::Enter => script_type::ENTER,
        ScriptType::Lightning => script_type::LIGHTNING,
        ScriptType::Unloading => script_type::UNLOADING,
        ScriptType::Disconnect => script_type::DISCONNECT,
        ScriptType::Return => script_type::RETURN,
        ScriptType::Event => script_type::EVENT,
    }
}

/// `count, offset*, string*`; offsets count from the payload start.
fn name_table<'a>(names: impl ExactSizeIterator<Item = &'a str> + Clone) -> Vec<u8> {
    let mut out = Vec::new();
    if names.len() == 0 {
        return out;
    }
    out.put_u32(names.len() as u32);
    let mut offset = 4 + 4 * names.len();
    for name in names.clone() {
        out.put_u32(offset as u32);
        offset += name.len() + 1;
    }
    for name in names {
        out.put_cstr(name);
    }
    out
}

/// Name table indexed by number; holes get empty names.
fn dense_names(entries: &BTreeMap<u32, &str>) -> Vec<u8> {
    let len = entries.keys().next_back().map_or(0, |&n| n as usize + 1);
    let names: Vec<&str> = (0..len as u32)
        .map(|i| entries.get(&i).copied().unwrap_or(""))
        .collect();
    name_table(names.iter().copied())
}

/// Per-string key for the obfuscated table.
fn stre_key(offset: u32) -> u32 {
    offset.wrapping_mul(STRE_KEY)
}

fn string_table(strings: &[&str], obfuscate: bool) -> Vec<u8> {
    let mut out = Vec::new();
    if strings.is_empty() {
        return out;
    }
    out.put_u32(0);
    out.put_u32(strings.len() as u32);
    out.put_u32(0);
    let mut offset = 12 + 4 * strings.len();
    let mut offsets = Vec::with_capacity(strings.len());
    for s in strings {
        out.put_u32(offset as u32);
        offsets.push(offset as u32);
        offset += s.len() + 1;
    }
    for (s, &at) in strings.iter().zip(&offsets) {
        if obfuscate {
            let key = stre_key(at);
            let bytes = s.bytes().chain(std::iter::once(0));
            for (i, b) in bytes.enumerate() {
                out.put_u8(b ^ key.wrapping_add(i as u32 / 2) as u8);
            }
        } else {
            out.put_cstr(s);
        }
    }
    out
}

/// Reverse [`string_table`]'s obfuscation for one string.
pub fn stre_decode(payload: &[u8], offset: u32) -> Option<String> {
    let key = stre_key(offset);
    let mut bytes = Vec::new();
    for (i, &b) in payload.get(offset as usize..)?.iter().enumerate() {
        let c = b ^ key.wrapping_add(i as u32 / 2) as u8;
        if c == 0 {
            return String::from_utf8(bytes).ok();
        }
        bytes.push(c);
    }
    None
}

struct Assembler<'a> {
    prog: &'a Program,
}

impl Assembler<'_> {
    fn addr(&self, func: &Function) -> BcResult<u32> {
        if !func.defin {
            return Ok(0);
        }
        let v = fold(&self.prog.glyphs, &ember_ir::Exp::glyph(&func.label, func.pos.clone()))?;
        Ok(value_words(&self.prog.glyphs, &v)?.first().copied().unwrap_or(0))
    }

    fn map_arrays(&self, defin: bool) -> impl Iterator<Item = &ember_ir::Space> + '_ {
        let mut spaces: Vec<_> = self
            .prog
            .spaces
            .values()
            .filter(move |s| {
                s.key.base == AddrBase::MapArr && s.glyph().is_some() && s.defin == defin
            })
            .collect();
        spaces.sort_by_key(|s| s.value);
        spaces.into_iter()
    }

    fn init_words(&self, key: &SpaceKey, words: u32) -> BcResult<Option<Vec<u32>>> {
        let mut data = vec![0u32; words as usize];
        let mut any = false;
        for obj in self.prog.objects_in(key) {
            let Some(init) = &obj.initi else { continue };
            any = true;
            let v = fold(&self.prog.glyphs, init)?;
            let vals = value_words(&self.prog.glyphs, &v)?;
            for w in 0..obj.words {
                if let Some(slot) = data.get_mut((obj.value + w) as usize) {
                    *slot = vals.get(w as usize).copied().unwrap_or(0);
                }
            }
        }
        Ok(any.then_some(data))
    }

    fn aray(&self) -> Chunk {
        let mut out = Vec::new();
        for s in self.map_arrays(true) {
            out.put_u32(s.value);
            out.put_u32(s.words);
        }
        Chunk::with_payload(b"ARAY", out)
    }

    fn aini(&self) -> BcResult<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for s in self.map_arrays(true) {
            if let Some(data) = self.init_words(&s.key, s.words)? {
                let mut out = Vec::new();
                out.put_u32(s.value);
                for w in data {
                    out.put_u32(w);
                }
                chunks.push(Chunk::with_payload(b"AINI", out));
            }
        }
        Ok(chunks)
    }

    fn aimp(&self) -> Chunk {
        let imported: Vec<_> = self.map_arrays(false).collect();
        let mut out = Vec::new();
        if !imported.is_empty() {
            out.put_u32(imported.len() as u32);
            for s in imported {
                out.put_u32(s.value);
                out.put_u32(s.words);
                out.put_cstr(&s.key.name);
            }
        }
        Chunk::with_payload(b"AIMP", out)
    }

    fn indexed_funcs(&self) -> BTreeMap<u32, &Function> {
        self.prog
            .funcs
            .values()
            .filter(|f| f.ctype.is_indexed())
            .map(|f| (f.value_int, f))
            .collect()
    }

    fn fnam(&self) -> Chunk {
        let names: BTreeMap<u32, &str> = self
            .indexed_funcs()
            .into_iter()
            .map(|(i, f)| (i, f.glyph.as_str()))
            .collect();
        Chunk::with_payload(b"FNAM", dense_names(&names))
    }

    fn func(&self) -> BcResult<Chunk> {
        let funcs = self.indexed_funcs();
        let len = funcs.keys().next_back().map_or(0, |&n| n + 1);
        let mut out = Vec::new();
        for i in 0..len {
            match funcs.get(&i) {
                Some(f) => {
                    out.put_u8(f.param as u8);
                    out.put_u8(f.local_reg as u8);
                    out.put_u8(u8::from(f.retrn > 0));
                    out.put_u8(0);
                    out.put_u32(self.addr(f)?);
                }
                None => out.extend_from_slice(&[0; 8]),
            }
        }
        Ok(Chunk::with_payload(b"FUNC", out))
    }

    fn load(&self) -> Chunk {
        let mut out = Vec::new();
        for lib in &self.prog.imports {
            out.put_cstr(lib);
        }
        Chunk::with_payload(b"LOAD", out)
    }

    fn map_names(&self, defin: bool) -> BTreeMap<u32, &str> {
        let mut names = BTreeMap::new();
        let bank = SpaceKey::bank(AddrBase::MapReg);
        for obj in self.prog.objects_in(&bank) {
            if obj.defin == defin && (!defin || obj.linka == Linkage::External) {
                names.insert(obj.value, obj.glyph.as_str());
            }
        }
        for s in self.map_arrays(defin) {
            if !defin || s.linka == Linkage::External {
                names.insert(s.value, s.key.name.as_str());
            }
        }
        names
    }

    fn mexp(&self) -> Chunk {
        Chunk::with_payload(b"MEXP", dense_names(&self.map_names(true)))
    }

    fn mimp(&self) -> Chunk {
        let mut out = Vec::new();
        for (n, name) in self.map_names(false) {
            out.put_u32(n);
            out.put_cstr(name);
        }
        Chunk::with_payload(b"MIMP", out)
    }

    fn mini(&self) -> BcResult<Vec<Chunk>> {
        let bank = SpaceKey::bank(AddrBase::MapReg);
        let mut chunks = Vec::new();
        for obj in self.prog.objects_in(&bank).filter(|o| o.defin) {
            let Some(init) = &obj.initi else { continue };
            let v = fold(&self.prog.glyphs, init)?;
            let vals = value_words(&self.prog.glyphs, &v)?;
            let mut out = Vec::new();
            out.put_u32(obj.value);
            for w in 0..obj.words {
                out.put_u32(vals.get(w as usize).copied().unwrap_or(0));
            }
            chunks.push(Chunk::with_payload(b"MINI", out));
        }
        Ok(chunks)
    }

    fn scripts(&self) -> impl Iterator<Item = &Function> + '_ {
        self.prog
            .funcs
            .values()
            .filter(|f| f.ctype.is_script() && f.defin)
    }

    fn sflg(&self) -> Chunk {
        let mut out = Vec::new();
        for f in self.scripts() {
            let mut flags = 0;
            if f.sflag_net {
                flags |= script_flag::NET;
            }
            if f.sflag_cls {
                flags |= script_flag::CLIENTSIDE;
            }
            if flags != 0 {
                out.put_i16(f.value_int as i16);
                out.put_u16(flags);
            }
        }
        Chunk::with_payload(b"SFLG", out)
    }

    fn snam(&self) -> Chunk {
        let named: BTreeMap<u32, &str> = self
            .scripts()
            .filter(|f| f.ctype == CallType::ScriptS)
            .map(|f| {
                let name = if f.value_str.is_empty() {
                    f.glyph.as_str()
                } else {
                    f.value_str.as_str()
                };
                (!f.value_int, name)
            })
            .collect();
        Chunk::with_payload(b"SNAM", dense_names(&named))
    }

    fn sptr(&self) -> BcResult<Chunk> {
        let mut out = Vec::new();
        for f in self.scripts() {
            out.put_i16(f.value_int as i16);
            out.put_u8(stype_code(f.stype));
            out.put_u8(f.param as u8);
            out.put_u32(self.addr(f)?);
        }
        Ok(Chunk::with_payload(b"SPTR", out))
    }

    fn strl(&self, obfuscate: bool) -> Chunk {
        let mut strs: Vec<_> = self.prog.strs.values().collect();
        strs.sort_by_key(|s| s.value_int);
        let strings: Vec<&str> = strs.iter().map(|s| s.value_str.as_str()).collect();
        let tag = if obfuscate { b"STRE" } else { b"STRL" };
        Chunk::with_payload(tag, string_table(&strings, obfuscate))
    }

    fn svct(&self) -> Chunk {
        let mut out = Vec::new();
        for f in self.scripts().filter(|f| f.local_reg > SCRIPT_VARS_DEFAULT) {
            out.put_i16(f.value_int as i16);
            out.put_u16(f.local_reg as u16);
        }
        Chunk::with_payload(b"SVCT", out)
    }
}

/// Assemble the object file from the code stream and the program tables.
pub fn put_program(prog: &Program, code: Vec<u8>, cfg: &ZdacsConfig) -> BcResult<Vec<u8>> {
    let asm = Assembler { prog };
    let mut chunks = vec![asm.aray()];
    chunks.extend(asm.aini()?);
    chunks.push(asm.aimp());
    chunks.push(Chunk::with_payload(b"CODE", code));
    chunks.push(asm.fnam());
    chunks.push(asm.func()?);
    chunks.push(asm.load());
    chunks.push(asm.mexp());
    chunks.push(asm.mimp());
    chunks.extend(asm.mini()?);
    chunks.push(asm.sflg());
    chunks.push(asm.snam());
    chunks.push(asm.sptr()?);
    chunks.push(asm.strl(cfg.use_chunk_stre));
    chunks.push(asm.svct());

    let mut w = ObjectWriter::new();
    if cfg.use_fake_acs0 {
        w.header(&fake_acs0());
    }
    for chunk in &chunks {
        w.chunk(chunk);
    }
    let tags: Vec<&str> = chunks
        .iter()
        .filter(|c| !c.is_empty())
        .map(Chunk::tag_str)
        .collect();
    debug!(target: "ember::bc", chunks = ?tags, "object assembled");
    Ok(w.finish())
}
