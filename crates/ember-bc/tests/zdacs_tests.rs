//! Integration tests for the ZDACS backend.
//!
//! Tests validate:
//! - Every encodable statement shape is sized exactly as it is emitted
//! - Labels resolve to byte offsets in the CODE chunk
//! - Case tables are emitted sorted by signed value
//! - Chunks with no backing table are absent
//! - Unbound glyphs and unsupported shapes are fatal, positioned errors
//! - Initializer script and shift helper synthesis
//! - Map register / map array numbering and their init chunks
//! - Registers placed at or above their preferred index
//! - String tables, plain and obfuscated
//! - Identical objects across repeated runs

use ember_bc::zdacs::{stre_decode, FAKE_ACS0_LEN, INIT_SCRIPT, SHRU_HELPER};
use ember_bc::{read_chunks, BcError, Chunk, Driver, ZdacsConfig, ZdacsTarget};
use ember_ir::{
    AddrBase, Arg, Block, CallType, Code, ErrorClass, Exp, Function, Linkage, Object, Origin,
    Program, ScriptType, SpaceKey, StrEnt, Type,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn compile_with(prog: &mut Program, config: ZdacsConfig) -> Result<Vec<u8>, BcError> {
    let mut target = ZdacsTarget::new(config);
    Driver::new(&mut target).run(prog)
}

fn compile(prog: &mut Program) -> Vec<u8> {
    compile_with(prog, ZdacsConfig::default()).unwrap_or_else(|e| panic!("compile failed: {e}"))
}

fn chunks(bytes: &[u8]) -> Vec<Chunk> {
    read_chunks(bytes, 0).expect("well-formed chunk stream")
}

fn tags(chunks: &[Chunk]) -> Vec<&str> {
    chunks.iter().map(Chunk::tag_str).collect()
}

fn find<'a>(chunks: &'a [Chunk], tag: &str) -> &'a Chunk {
    chunks
        .iter()
        .find(|c| c.tag_str() == tag)
        .unwrap_or_else(|| panic!("no {tag} chunk in {:?}", tags(chunks)))
}

fn words(payload: &[u8]) -> Vec<u32> {
    payload
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn func(name: &str, ctype: CallType, build: impl FnOnce(&mut Block)) -> Function {
    let mut f = Function::new(name, ctype);
    build(&mut f.block);
    f
}

fn label(prog: &mut Program, name: &str) -> Arg {
    prog.glyphs.declare(name, Some(Type::WORD));
    Arg::glyph(name, &Origin::builtin())
}

fn word(n: u32) -> Arg {
    Arg::word(n)
}

const STK: Arg = Arg::Stk;

// ══════════════════════════════════════════════════════════════════════════════
// Minimal objects
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn void_function_object() {
    let mut prog = Program::new();
    prog.add_function(func("main", CallType::StdCall, |b| {
        b.add_stmnt(Code::Retn, vec![]);
    }))
    .unwrap();
    let bytes = compile(&mut prog);
    let cs = chunks(&bytes);

    assert_eq!(tags(&cs), vec!["CODE", "FNAM", "FUNC"]);
    assert_eq!(words(&find(&cs, "CODE").payload), vec![205]);
    assert_eq!(find(&cs, "FUNC").payload, vec![0, 0, 0, 0, 0, 0, 0, 0]);
    assert!(find(&cs, "FNAM").payload.ends_with(b"main\0"));
}

#[test]
fn empty_program_has_no_chunks() {
    let mut prog = Program::new();
    assert!(compile(&mut prog).is_empty());
}

#[test]
fn fake_header_precedes_chunks() {
    let mut prog = Program::new();
    prog.add_function(func("main", CallType::StdCall, |b| {
        b.add_stmnt(Code::Retn, vec![]);
    }))
    .unwrap();
    let config = ZdacsConfig {
        use_fake_acs0: true,
        ..ZdacsConfig::default()
    };
    let bytes = compile_with(&mut prog, config).unwrap();
    assert_eq!(&bytes[..4], b"ACS\0");
    let cs = read_chunks(&bytes, FAKE_ACS0_LEN).unwrap();
    assert_eq!(tags(&cs), vec!["CODE", "FNAM", "FUNC"]);
}

#[test]
fn open_script_entry() {
    let mut prog = Program::new();
    let mut s = func("intro", CallType::ScriptI, |b| {
        b.add_stmnt(Code::Move, vec![STK, word(5)]);
        b.add_stmnt(Code::Retn, vec![STK]);
    });
    s.value_int = 12;
    s.stype = ScriptType::Open;
    s.sflag_net = true;
    prog.add_function(s).unwrap();
    let cs = chunks(&compile(&mut prog));

    assert_eq!(words(&find(&cs, "CODE").payload), vec![3, 5, 254, 1]);
    let sptr = &find(&cs, "SPTR").payload;
    assert_eq!(i16::from_le_bytes([sptr[0], sptr[1]]), 12);
    assert_eq!(sptr[2], 1);
    assert_eq!(&sptr[4..8], &0u32.to_le_bytes());
    assert_eq!(find(&cs, "SFLG").payload, vec![12, 0, 1, 0]);
    assert!(!tags(&cs).contains(&"SVCT"));
}

#[test]
fn named_script_and_variable_count() {
    let mut prog = Program::new();
    let mut s = func("hello_fn", CallType::ScriptS, |b| {
        b.add_stmnt(Code::Retn, vec![]);
    });
    s.value_str = "Hello".into();
    s.local_reg = 30;
    prog.add_function(s).unwrap();
    let cs = chunks(&compile(&mut prog));

    let sptr = &find(&cs, "SPTR").payload;
    assert_eq!(i16::from_le_bytes([sptr[0], sptr[1]]), -1);
    assert!(find(&cs, "SNAM").payload.ends_with(b"Hello\0"));
    let svct = &find(&cs, "SVCT").payload;
    assert_eq!(i16::from_le_bytes([svct[0], svct[1]]), -1);
    assert_eq!(u16::from_le_bytes([svct[2], svct[3]]), 30);
}

// ══════════════════════════════════════════════════════════════════════════════
// Sizes and labels
// ══════════════════════════════════════════════════════════════════════════════

/// One statement of every encodable shape.
fn every_shape(prog: &mut Program) -> Function {
    let end = label(prog, "shapes$end");
    let gbl = |n| Arg::reg(AddrBase::GblReg, word(n));
    let ars = |n| Arg::reg(AddrBase::LocArs, word(n));
    let marr = |off| Arg::arr(AddrBase::MapArr, word(2), STK).offset(off);
    let warr = |off| Arg::arr(AddrBase::WldArr, word(1), STK).offset(off);

    let mut f = func("shapes", CallType::StdCall, |b| {
        for code in [
            Code::AddI, Code::SubU, Code::MulX, Code::DivU, Code::DivX, Code::ModU,
            Code::BAnd, Code::BOrX, Code::ShLU, Code::ShRI, Code::CmpEq, Code::CmpLtU,
            Code::CmpGeI,
        ] {
            b.add_stmnt(code, vec![STK, STK, STK]);
        }
        for code in [Code::BNot, Code::LNot, Code::NegI, Code::Swap] {
            b.add_stmnt(code, vec![STK, STK]);
        }
        b.add_stmnt(Code::Nop, vec![]);
        b.add_stmnt(Code::Move, vec![STK, word(1)]);
        b.add_stmnt(Code::Move, vec![Arg::Nul, STK]);
        b.add_label("shapes$labeled_drop");
        b.add_stmnt(Code::Move, vec![Arg::Nul, STK]);
        b.add_stmnt(Code::Move, vec![STK, Arg::loc_reg(0)]);
        b.add_stmnt(Code::Move, vec![gbl(3), STK]);
        b.add_stmnt(Code::Move, vec![STK, Arg::reg(AddrBase::WldReg, word(2))]);
        b.add_stmnt(Code::Move, vec![ars(9), STK]);
        b.add_stmnt(Code::Move, vec![STK, ars(10)]);
        b.add_stmnt(Code::Move, vec![STK, marr(0)]);
        b.add_stmnt(Code::Move, vec![STK, warr(4)]);
        b.add_stmnt(Code::Move, vec![marr(0), STK]);
        b.add_stmnt(Code::Move, vec![warr(1), STK]);
        for ret in [0, 1, 3] {
            b.add_stmnt(Code::Call, vec![word(0), word(ret), STK]);
            b.add_stmnt(Code::Call, vec![STK, word(ret)]);
        }
        b.add_stmnt(Code::Cspe, vec![word(80), word(0), word(1), word(2)]);
        b.add_stmnt(Code::Cspe, vec![word(80), word(0), STK, STK]);
        b.add_stmnt(Code::Cspe, vec![word(80), word(1), word(1)]);
        b.add_stmnt(Code::Cspe, vec![word(80), word(1), STK, STK, STK]);
        b.add_stmnt(Code::Cnat, vec![word(15), word(1), STK]);
        b.add_stmnt(Code::Cnat, vec![word(15), word(0)]);
        b.add_stmnt(Code::Casm, vec![word(54), word(0), STK, word(7)]);
        b.add_stmnt(Code::Jump, vec![end.clone()]);
        b.add_stmnt(Code::Jump, vec![STK]);
        b.add_stmnt(Code::JcndTru, vec![STK, end.clone()]);
        b.add_stmnt(Code::JcndNil, vec![STK, end.clone()]);
        b.add_stmnt(Code::JcndTab, vec![STK]);
        b.add_stmnt(Code::JcndTab, vec![STK, word(1), end.clone()]);
        b.add_stmnt(Code::JcndTab, vec![STK, word(2), end.clone(), word(1), end.clone()]);
        b.add_stmnt(Code::Retn, vec![STK, STK]);
        b.add_stmnt(Code::Retn, vec![]);
        b.add_label("shapes$end");
    });
    f.local_reg = 1;
    prog.glyphs.declare("shapes$labeled_drop", Some(Type::WORD));
    f
}

#[test]
fn every_shape_sizes_match_emission() {
    let mut prog = Program::new();
    let f = every_shape(&mut prog);
    prog.add_function(f).unwrap();
    let cs = chunks(&compile(&mut prog));

    let code = &find(&cs, "CODE").payload;
    let end = prog
        .glyphs
        .value("shapes$end")
        .unwrap()
        .get_value(&prog.glyphs)
        .unwrap()
        .words()[0];
    assert_eq!(end as usize, code.len());
    // The unlabeled push/drop pair and the Nop are gone; the labeled drop stays.
    let w = words(code);
    assert_eq!(&w[17..19], &[54, 28]);
}

#[test]
fn forward_jump_resolves_to_byte_offset() {
    let mut prog = Program::new();
    let end = label(&mut prog, "f$end");
    prog.add_function(func("f", CallType::StdCall, |b| {
        b.add_stmnt(Code::Jump, vec![end]);
        b.add_stmnt(Code::Move, vec![STK, word(1)]);
        b.add_stmnt(Code::Move, vec![Arg::Nul, STK]);
        b.add_label("f$end");
        b.add_stmnt(Code::Retn, vec![]);
    }))
    .unwrap();
    let cs = chunks(&compile(&mut prog));
    assert_eq!(words(&find(&cs, "CODE").payload), vec![52, 8, 205]);
}

#[test]
fn second_function_address_in_func_table() {
    let mut prog = Program::new();
    for name in ["a", "b"] {
        prog.add_function(func(name, CallType::StdCall, |b| {
            b.add_stmnt(Code::Move, vec![STK, word(1)]);
            b.add_stmnt(Code::Retn, vec![STK]);
        }))
        .unwrap();
    }
    let cs = chunks(&compile(&mut prog));
    let table = &find(&cs, "FUNC").payload;
    assert_eq!(table.len(), 16);
    assert_eq!(&table[12..16], &12u32.to_le_bytes());
}

#[test]
fn case_table_sorted_in_code() {
    let mut prog = Program::new();
    let end = label(&mut prog, "sw$end");
    let mut f = func("sw", CallType::StdCall, |b| {
        b.add_stmnt(
            Code::JcndTab,
            vec![
                Arg::loc_reg(0),
                word(5),
                end.clone(),
                word(u32::MAX),
                end.clone(),
                word(0),
                end,
            ],
        );
        b.add_label("sw$end");
        b.add_stmnt(Code::Retn, vec![]);
    });
    f.local_reg = 1;
    prog.add_function(f).unwrap();
    let cs = chunks(&compile(&mut prog));
    assert_eq!(
        words(&find(&cs, "CODE").payload),
        vec![28, 0, 156, 3, u32::MAX, 40, 0, 40, 5, 40, 205]
    );
}

#[test]
fn discarded_special_result_becomes_direct() {
    let mut prog = Program::new();
    prog.add_function(func("f", CallType::StdCall, |b| {
        b.add_stmnt(Code::Cspe, vec![word(80), word(1), word(3)]);
        b.add_stmnt(Code::Move, vec![Arg::Nul, STK]);
        b.add_stmnt(Code::Retn, vec![]);
    }))
    .unwrap();
    let cs = chunks(&compile(&mut prog));
    assert_eq!(words(&find(&cs, "CODE").payload), vec![9, 80, 1, 3, 205]);
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn unbound_glyph_is_fatal() {
    let mut prog = Program::new();
    prog.glyphs.declare("missing", Some(Type::WORD));
    prog.add_function(func("f", CallType::StdCall, |b| {
        b.add_stmnt(Code::Move, vec![STK, Arg::glyph("missing", &Origin::builtin())]);
        b.add_stmnt(Code::Retn, vec![STK]);
    }))
    .unwrap();
    let err = compile_with(&mut prog, ZdacsConfig::default()).unwrap_err();
    assert_eq!(err, BcError::UnboundGlyph("missing".into()));
    assert_eq!(err.class(), ErrorClass::Source);
}

#[test]
fn unsupported_shape_is_positioned_target_error() {
    let mut prog = Program::new();
    prog.add_function(func("f", CallType::StdCall, |b| {
        b.set_origin(Origin::new("bad.c", 7, 3));
        b.add_stmnt(Code::Move, vec![STK, STK]);
    }))
    .unwrap();
    let err = compile_with(&mut prog, ZdacsConfig::default()).unwrap_err();
    let diag = err.to_diagnostic();
    assert_eq!(diag.class, ErrorClass::Target);
    assert_eq!((diag.file.as_str(), diag.line, diag.column), ("bad.c", 7, 3));
    assert!(diag.message.contains("zdacs"), "{}", diag.message);
}

#[test]
fn special_with_too_many_arguments_rejected() {
    let mut prog = Program::new();
    prog.add_function(func("f", CallType::StdCall, |b| {
        let mut args = vec![word(80), word(0)];
        args.extend(std::iter::repeat(STK).take(6));
        b.add_stmnt(Code::Cspe, args);
    }))
    .unwrap();
    let err = compile_with(&mut prog, ZdacsConfig::default()).unwrap_err();
    assert!(matches!(err, BcError::Unsupported { .. }));
}

#[test]
fn compiled_glyphs_cannot_be_rebound() {
    let mut prog = Program::new();
    prog.add_function(func("f", CallType::StdCall, |b| {
        b.add_stmnt(Code::Retn, vec![]);
    }))
    .unwrap();
    compile(&mut prog);
    assert!(prog.glyphs.unbound().next().is_none());
    assert!(prog.glyphs.bind("f$label", Exp::word(4, Origin::builtin())).is_err());
}

#[test]
fn function_glyph_rejects_plain_word() {
    let mut prog = Program::new();
    prog.add_function(func("f", CallType::StdCall, |b| {
        b.add_stmnt(Code::Retn, vec![]);
    }))
    .unwrap();
    prog.glyphs
        .bind("f", Exp::word(3, Origin::builtin()))
        .unwrap_err();
    assert!(!prog.glyphs.is_bound("f"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Synthesized code
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn initializer_script_for_global_register() {
    let mut prog = Program::new();
    let g = Object::new("g", SpaceKey::bank(AddrBase::GblReg), 1)
        .with_init(Exp::word(7, Origin::builtin()));
    prog.add_object(g).unwrap();
    let cs = chunks(&compile(&mut prog));

    assert!(prog.funcs.contains_key(INIT_SCRIPT));
    assert_eq!(
        words(&find(&cs, "CODE").payload),
        vec![3, 0, 237, 0, 53, 64, 3, 7, 181, 0, 3, 0, 3, 1, 238, 0, 1]
    );
    let sptr = &find(&cs, "SPTR").payload;
    assert_eq!(i16::from_le_bytes([sptr[0], sptr[1]]), 999);
    assert_eq!(sptr[2], 1);
}

#[test]
fn world_initializers_get_their_own_flag() {
    let mut prog = Program::new();
    let w = Object::new("w", SpaceKey::bank(AddrBase::WldReg), 1)
        .with_init(Exp::word(1, Origin::builtin()));
    let g = Object::new("g", SpaceKey::bank(AddrBase::GblReg), 1)
        .with_init(Exp::word(2, Origin::builtin()));
    prog.add_object(w).unwrap();
    prog.add_object(g).unwrap();
    let config = ZdacsConfig {
        init_wld_array: 4,
        init_wld_index: 0,
        ..ZdacsConfig::default()
    };
    let cs = chunks(&compile_with(&mut prog, config).unwrap());
    let code = words(&find(&cs, "CODE").payload);
    // PushWorldArray 4 guards the first section.
    assert_eq!(&code[..4], &[3, 0, 235, 4]);
    assert_eq!(prog.funcs[INIT_SCRIPT].block.iter().filter(|s| s.code == Code::JcndTru).count(), 2);
}

#[test]
fn unsigned_shift_uses_helper() {
    let mut prog = Program::new();
    let mut f = func("f", CallType::StdCall, |b| {
        b.add_stmnt(Code::Move, vec![STK, Arg::loc_reg(0)]);
        b.add_stmnt(Code::Move, vec![STK, Arg::loc_reg(1)]);
        b.add_stmnt(Code::ShRU, vec![STK, STK, STK]);
        b.add_stmnt(Code::Retn, vec![STK]);
    });
    f.param = 2;
    f.local_reg = 2;
    f.retrn = 1;
    prog.add_function(f).unwrap();
    let cs = chunks(&compile(&mut prog));

    let code = words(&find(&cs, "CODE").payload);
    assert_eq!(&code[..7], &[28, 0, 28, 1, 203, 1, 206]);
    let func_table = &find(&cs, "FUNC").payload;
    assert_eq!(&func_table[8..11], &[2, 2, 1]);
    assert_eq!(&func_table[12..16], &28u32.to_le_bytes());
    assert!(find(&cs, "FNAM")
        .payload
        .windows(SHRU_HELPER.len())
        .any(|w| w == SHRU_HELPER.as_bytes()));
}

// ══════════════════════════════════════════════════════════════════════════════
// Storage and tables
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn map_storage_numbering_and_init_chunks() {
    let mut prog = Program::new();
    let arr = SpaceKey::array(AddrBase::MapArr, "arr");
    let a = Object::new("a", arr, 2).with_init(Exp::tuple(
        vec![Exp::word(1, Origin::builtin()), Exp::word(2, Origin::builtin())],
        Origin::builtin(),
    ));
    let mut r = Object::new("r", SpaceKey::bank(AddrBase::MapReg), 1)
        .with_init(Exp::word(9, Origin::builtin()));
    r.linka = Linkage::External;
    prog.add_object(a).unwrap();
    prog.add_object(r).unwrap();
    let cs = chunks(&compile(&mut prog));

    assert_eq!(words(&find(&cs, "ARAY").payload), vec![0, 2]);
    assert_eq!(words(&find(&cs, "AINI").payload), vec![0, 1, 2]);
    assert_eq!(words(&find(&cs, "MINI").payload), vec![1, 9]);
    let mexp = &find(&cs, "MEXP").payload;
    assert_eq!(&mexp[..4], &2u32.to_le_bytes());
    assert!(mexp.ends_with(b"\0r\0"));
    assert!(!prog.funcs.contains_key(INIT_SCRIPT));
}

#[test]
fn map_registers_start_at_preferred_index() {
    let mut prog = Program::new();
    prog.add_object(Object::new("a", SpaceKey::array(AddrBase::MapArr, "arr"), 1))
        .unwrap();
    for (name, init) in [("r", 7), ("s", 8)] {
        let mut reg = Object::new(name, SpaceKey::bank(AddrBase::MapReg), 1)
            .with_init(Exp::word(init, Origin::builtin()));
        reg.value = 5;
        reg.linka = Linkage::External;
        prog.add_object(reg).unwrap();
    }
    let cs = chunks(&compile(&mut prog));

    assert_eq!(words(&find(&cs, "ARAY").payload), vec![0, 1]);
    let mini: Vec<Vec<u32>> = cs
        .iter()
        .filter(|c| c.tag_str() == "MINI")
        .map(|c| words(&c.payload))
        .collect();
    assert_eq!(mini, vec![vec![5, 7], vec![6, 8]]);
    assert_eq!(prog.objs["r"].value, 5);
    assert_eq!(prog.objs["s"].value, 6);
}

#[test]
fn imported_map_register_and_library() {
    let mut prog = Program::new();
    let mut r = Object::new("shared", SpaceKey::bank(AddrBase::MapReg), 1);
    r.defin = false;
    prog.add_object(r).unwrap();
    prog.add_import("common");
    let cs = chunks(&compile(&mut prog));
    assert_eq!(find(&cs, "LOAD").payload, b"common\0".to_vec());
    let mimp = &find(&cs, "MIMP").payload;
    assert_eq!(&mimp[..4], &0u32.to_le_bytes());
    assert_eq!(&mimp[4..], b"shared\0");
}

#[test]
fn imported_function_has_zero_address() {
    let mut prog = Program::new();
    let mut ext = Function::new("ext", CallType::StdCall);
    ext.defin = false;
    ext.linka = Linkage::External;
    prog.add_function(ext).unwrap();
    prog.add_function(func("main", CallType::StdCall, |b| {
        b.add_stmnt(
            Code::Call,
            vec![Arg::glyph("ext", &Origin::builtin()), word(0)],
        );
        b.add_stmnt(Code::Retn, vec![]);
    }))
    .unwrap();
    let cs = chunks(&compile(&mut prog));
    assert_eq!(words(&find(&cs, "CODE").payload), vec![204, 0, 205]);
    let table = &find(&cs, "FUNC").payload;
    assert_eq!(&table[4..8], &0u32.to_le_bytes());
}

#[test]
fn strings_plain_and_obfuscated() {
    let build = || {
        let mut prog = Program::new();
        prog.add_str(StrEnt::new("s0", "hello")).unwrap();
        prog.add_str(StrEnt::new("s1", "world")).unwrap();
        prog
    };

    let cs = chunks(&compile(&mut build()));
    let strl = &find(&cs, "STRL").payload;
    assert_eq!(&strl[4..8], &2u32.to_le_bytes());
    assert!(strl.ends_with(b"hello\0world\0"));

    let config: ZdacsConfig = serde_json::from_str(r#"{"use_chunk_stre": true}"#).unwrap();
    let cs = chunks(&compile_with(&mut build(), config).unwrap());
    assert!(!tags(&cs).contains(&"STRL"));
    let stre = &find(&cs, "STRE").payload;
    assert_eq!(stre_decode(stre, 20).as_deref(), Some("hello"));
    assert_eq!(stre_decode(stre, 26).as_deref(), Some("world"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism
// ══════════════════════════════════════════════════════════════════════════════

fn mixed_program() -> Program {
    let mut prog = Program::new();
    let f = every_shape(&mut prog);
    prog.add_function(f).unwrap();
    prog.add_object(
        Object::new("g", SpaceKey::bank(AddrBase::GblReg), 1)
            .with_init(Exp::word(3, Origin::builtin())),
    )
    .unwrap();
    prog.add_object(Object::new("m", SpaceKey::array(AddrBase::MapArr, "tbl"), 4))
        .unwrap();
    prog.add_str(StrEnt::new("greeting", "hi")).unwrap();
    prog
}

#[test]
fn repeated_compilation_is_byte_identical() {
    let first = compile(&mut mixed_program());
    for _ in 0..100 {
        assert_eq!(compile(&mut mixed_program()), first);
    }
}
