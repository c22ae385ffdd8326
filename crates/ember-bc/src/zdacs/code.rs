//! ZDACS instruction opcodes.
//!
//! Every opcode and immediate is one little-endian 32-bit word. The
//! numbering is this backend's own table; loaders must use the same one.

/// A ZDACS opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Pcd {
    Nop = 0,
    Terminate = 1,
    PushNumber = 3,
    /// (spec, argc): arguments on the stack.
    LSpec = 4,
    /// (spec, argc, args...): arguments inline.
    LSpecDirect = 9,
    Add = 14,
    Subtract = 15,
    Multiply = 16,
    Divide = 17,
    Modulus = 18,
    Eq = 19,
    Ne = 20,
    Lt = 21,
    Gt = 22,
    Le = 23,
    Ge = 24,
    AssignScriptVar = 25,
    AssignMapVar = 26,
    AssignWorldVar = 27,
    PushScriptVar = 28,
    PushMapVar = 29,
    PushWorldVar = 30,
    Goto = 52,
    IfGoto = 53,
    Drop = 54,
    AndBitwise = 76,
    OrBitwise = 77,
    EorBitwise = 78,
    NegateLogical = 79,
    LShift = 80,
    RShift = 81,
    UnaryMinus = 82,
    IfNotGoto = 83,
    /// (value, addr)
    CaseGoto = 84,
    FixedMul = 136,
    FixedDiv = 137,
    /// (count, (value, addr)*), values ascending.
    CaseGotoSorted = 156,
    Swap = 157,
    AssignGlobalVar = 181,
    PushGlobalVar = 182,
    /// (func)
    Call = 203,
    /// (func)
    CallDiscard = 204,
    ReturnVoid = 205,
    ReturnVal = 206,
    PushMapArray = 207,
    AssignMapArray = 208,
    PushWorldArray = 235,
    AssignWorldArray = 236,
    PushGlobalArray = 237,
    AssignGlobalArray = 238,
    SetResultValue = 254,
    NegateBinary = 330,
    /// (spec): five arguments on the stack, pushes the result.
    LSpecResult = 345,
    /// (argc, index): pushes the result.
    CallFunc = 351,
    /// (argc, index)
    CallFuncVoid = 352,
    /// Function index on top of the stack; pushes the result.
    CallStack = 359,
    /// Address on top of the stack.
    GotoStack = 363,
    DivideU = 400,
    ModulusU = 401,
    LtU = 402,
    GtU = 403,
    LeU = 404,
    GeU = 405,
}

impl Pcd {
    pub fn word(self) -> u32 {
        self as u32
    }
}

/// Script type codes for the SPTR table.
pub mod script_type {
    pub const CLOSED: u8 = 0;
    pub const OPEN: u8 = 1;
    pub const RESPAWN: u8 = 2;
    pub const DEATH: u8 = 3;
    pub const ENTER: u8 = 4;
    pub const LIGHTNING: u8 = 12;
    pub const UNLOADING: u8 = 13;
    pub const DISCONNECT: u8 = 14;
    pub const RETURN: u8 = 15;
    pub const EVENT: u8 = 16;
}

/// Script flag bits for the SFLG table.
pub mod script_flag {
    pub const NET: u16 = 0x0001;
    pub const CLIENTSIDE: u16 = 0x0002;
}

/// Line specials accept at most this many arguments.
pub const SPECIAL_ARGS_MAX: usize = 5;

/// Script variables every script gets without an SVCT entry.
pub const SCRIPT_VARS_DEFAULT: u32 = 20;

/// Extra return words are passed through the automatic-storage array,
/// starting at this index.
pub const RETN_ARRAY_BASE: u32 = 1;

/// Most extra return words a call may pass.
pub const RETN_WORDS_MAX: u32 = 8;

/// Multiplier for the STRE string key.
pub const STRE_KEY: u32 = 157_135;
