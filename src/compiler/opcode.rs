//! Bytecode instruction set.
//!
//! Every instruction is a single opcode byte, optionally followed by
//! immediates read from the code stream. Integer immediates are little
//! endian; number immediates are 8-byte IEEE-754; string immediates are a
//! u16 length followed by that many raw bytes.

/// Instruction opcodes. The discriminants are the wire encoding and must
/// never be reordered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Nop = 0,
    /// Pop a value and store it into a named global. `[ var:str ]`
    StoreGlobalName = 4,
    /// Push the value of a named global. `[ var:str ]`
    LoadGlobalName = 5,
    /// Push a string literal. `[ val:str ]`
    PushStr = 6,
    /// Push a number literal. `[ val:f64 ]`
    PushNum = 7,
    /// Pop `num` values and pack them into an array; the value popped
    /// first becomes element 0. `[ num:u16 ]`
    ArrayPack = 8,
    /// Call a host or script function by name. `[ fun:str ] [ argc:u8 ]`
    CallFn = 9,
    /// Call a method on an object. `[ fun:str ] [ argc:u8 ]`
    CallObj = 10,
    /// Discard the top of the stack.
    Pop = 11,
    Add = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    Mod = 16,
    And = 17,
    Or = 18,
    Not = 19,
    /// Arithmetically invert the top of the stack.
    Negate = 20,
    Eq = 21,
    Neq = 22,
    LessEq = 23,
    GreaterEq = 24,
    Less = 25,
    Greater = 26,
    /// Jump unconditionally. `[ target:u32 ]`
    Jmp = 27,
    /// Pop a boolean; jump when it is true. `[ target:u32 ]`
    Jnf = 28,
    /// Pop an array; push an enumerator over it.
    IterMake = 29,
    /// Advance the enumerator at the top of the stack. On success push
    /// the element, then `true`; otherwise push only `false`.
    IterNext = 30,
    /// Pop array, index, value; store the value; push the updated array.
    ArrayStore = 31,
    /// Pop array and index; push the element.
    ArrayLoad = 32,
    /// Return Void from the current function.
    Ret = 33,
    /// Pop a value and store it into a local slot. `[ index:u16 ]`
    StoreLocal = 34,
    /// Push a local slot. `[ index:u16 ]`
    LoadLocal = 35,
    /// Pop a value and return it from the current function.
    RetVal = 37,
    /// Pop a boolean; jump when it is false. `[ target:u32 ]`
    Jif = 38,
    /// Pop a value and store it into an indexed global. `[ idx:u16 ]`
    StoreGlobalIdx = 39,
    /// Push an indexed global. `[ idx:u16 ]`
    LoadGlobalIdx = 40,
    PushTrue = 41,
    PushFalse = 42,
    PushVoid = 43,
}

impl Opcode {
    /// Decode a single opcode byte. Unknown bytes are invalid
    /// instructions.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Some(match byte {
            0 => Opcode::Nop,
            4 => Opcode::StoreGlobalName,
            5 => Opcode::LoadGlobalName,
            6 => Opcode::PushStr,
            7 => Opcode::PushNum,
            8 => Opcode::ArrayPack,
            9 => Opcode::CallFn,
            10 => Opcode::CallObj,
            11 => Opcode::Pop,
            12 => Opcode::Add,
            13 => Opcode::Sub,
            14 => Opcode::Mul,
            15 => Opcode::Div,
            16 => Opcode::Mod,
            17 => Opcode::And,
            18 => Opcode::Or,
            19 => Opcode::Not,
            20 => Opcode::Negate,
            21 => Opcode::Eq,
            22 => Opcode::Neq,
            23 => Opcode::LessEq,
            24 => Opcode::GreaterEq,
            25 => Opcode::Less,
            26 => Opcode::Greater,
            27 => Opcode::Jmp,
            28 => Opcode::Jnf,
            29 => Opcode::IterMake,
            30 => Opcode::IterNext,
            31 => Opcode::ArrayStore,
            32 => Opcode::ArrayLoad,
            33 => Opcode::Ret,
            34 => Opcode::StoreLocal,
            35 => Opcode::LoadLocal,
            37 => Opcode::RetVal,
            38 => Opcode::Jif,
            39 => Opcode::StoreGlobalIdx,
            40 => Opcode::LoadGlobalIdx,
            41 => Opcode::PushTrue,
            42 => Opcode::PushFalse,
            43 => Opcode::PushVoid,
            _ => return None,
        })
    }

    /// The mnemonic used by the disassembler.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::StoreGlobalName => "store_global",
            Opcode::LoadGlobalName => "load_global",
            Opcode::PushStr => "push_str",
            Opcode::PushNum => "push_num",
            Opcode::ArrayPack => "array_pack",
            Opcode::CallFn => "call_fn",
            Opcode::CallObj => "call_obj",
            Opcode::Pop => "pop",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Not => "not",
            Opcode::Negate => "negate",
            Opcode::Eq => "eq",
            Opcode::Neq => "neq",
            Opcode::LessEq => "less_eq",
            Opcode::GreaterEq => "greater_eq",
            Opcode::Less => "less",
            Opcode::Greater => "greater",
            Opcode::Jmp => "jmp",
            Opcode::Jnf => "jnf",
            Opcode::IterMake => "iter_make",
            Opcode::IterNext => "iter_next",
            Opcode::ArrayStore => "array_store",
            Opcode::ArrayLoad => "array_load",
            Opcode::Ret => "ret",
            Opcode::StoreLocal => "store_local",
            Opcode::LoadLocal => "load_local",
            Opcode::RetVal => "retval",
            Opcode::Jif => "jif",
            Opcode::StoreGlobalIdx => "store_global",
            Opcode::LoadGlobalIdx => "load_global",
            Opcode::PushTrue => "push_true",
            Opcode::PushFalse => "push_false",
            Opcode::PushVoid => "push_void",
        }
    }
}
