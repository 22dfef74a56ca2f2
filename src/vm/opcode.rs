use serde::Serialize;

/// Encoded width of an instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgClass {
    /// Placeholder that never reaches the byte stream.
    Stripped,
    None,
    U8,
    I16,
    U16,
    I32,
}

impl ArgClass {
    pub fn width(self) -> usize {
        match self {
            ArgClass::Stripped | ArgClass::None => 0,
            ArgClass::U8 => 1,
            ArgClass::I16 | ArgClass::U16 => 2,
            ArgClass::I32 => 4,
        }
    }

    pub fn fits(self, arg: i32) -> bool {
        match self {
            ArgClass::Stripped | ArgClass::None => true,
            ArgClass::U8 => (0..=u8::MAX as i32).contains(&arg),
            ArgClass::I16 => (i16::MIN as i32..=i16::MAX as i32).contains(&arg),
            ArgClass::U16 => (0..=u16::MAX as i32).contains(&arg),
            ArgClass::I32 => true,
        }
    }
}

macro_rules! opcodes {
    ($($variant:ident = $mnemonic:literal, $class:ident;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[repr(u8)]
        pub enum Op {
            $($variant,)*
        }

        impl Op {
            pub const ALL: &'static [Op] = &[$(Op::$variant,)*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Op::$variant => $mnemonic,)*
                }
            }

            pub fn arg_class(self) -> ArgClass {
                match self {
                    $(Op::$variant => ArgClass::$class,)*
                }
            }
        }
    };
}

// One line per opcode; discriminants follow declaration order and are the
// byte values written to the program image.
opcodes! {
    Nop        = "NOP",         Stripped;
    PushI      = "PUSH_I",      I16;
    PushR      = "PUSH_R",      I32;
    Pop        = "POP",         None;
    Add        = "ADD",         None;
    Sub        = "SUB",         None;
    Mul        = "MUL",         None;
    Div        = "DIV",         None;
    Mod        = "MOD",         None;
    Teq        = "TEQ",         None;
    Tneq       = "TNEQ",        None;
    Tl         = "TL",          None;
    Tg         = "TG",          None;
    Tleq       = "TLEQ",        None;
    Tgeq       = "TGEQ",        None;
    LAnd       = "LAND",        None;
    LOr        = "LOR",         None;
    LNot       = "LNOT",        None;
    BAnd       = "BAND",        None;
    BOr        = "BOR",         None;
    BXor       = "BXOR",        None;
    BNot       = "BNOT",        None;
    Jmp        = "JMP",         U16;
    Jz         = "JZ",          U16;
    Enter      = "ENTER",       U16;
    Return     = "RETURN",      U8;
    Call       = "CALL",        U16;
    Syscall    = "SYSCALL",     U16;
    Lea        = "LEA",         I16;
    LeaG       = "LEA_G",       U16;
    LdL        = "LD_L",        I16;
    LdG        = "LD_G",        U16;
    StL        = "ST_L",        I16;
    StG        = "ST_G",        U16;
    Deref      = "DEREF",       None;
    WrVar      = "WR_VAR",      None;
    PreAdd     = "PRE_ADD",     I32;
    PostAdd    = "POST_ADD",    I32;
    ArrayIdx   = "ARRAY_IDX",   U16;
    StructIdx  = "STRUCT_IDX",  U16;
    Alloc      = "ALLOC",       U16;
    ScopeEnter = "SCOPE_ENTER", None;
    ScopeLeave = "SCOPE_LEAVE", None;
}

impl Op {
    pub fn from_byte(b: u8) -> Option<Op> {
        Op::ALL.get(b as usize).copied()
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Opcode byte plus operand bytes.
    pub fn encoded_len(self) -> usize {
        match self.arg_class() {
            ArgClass::Stripped => 0,
            class => 1 + class.width(),
        }
    }
}

/// Syscall operands pack the argument count above a 12-bit handle.
pub const SYSCALL_HANDLE_BITS: u32 = 12;
pub const SYSCALL_MAX_HANDLE: usize = (1 << SYSCALL_HANDLE_BITS) - 1;
pub const SYSCALL_MAX_ARGS: usize = 15;

pub fn syscall_operand(argc: usize, handle: usize) -> i32 {
    ((argc << SYSCALL_HANDLE_BITS) | handle) as i32
}

pub fn split_syscall_operand(arg: i32) -> (usize, usize) {
    let arg = arg as u32 as usize;
    (arg >> SYSCALL_HANDLE_BITS, arg & SYSCALL_MAX_HANDLE)
}
