//! Stack-machine opcodes
//!
//! Every opcode carries static metadata: its mnemonic, how many operand
//! lanes it uses, how it changes the stack depth, and the literal type it
//! leaves on top (if any). The code generator's stack simulation and the
//! handler stack-size computation both derive from this one table, so the
//! deltas here are load-bearing.

use crate::instruction::Instruction;
use ebb_core::LiteralType;

/// How many operand lanes an opcode consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSig {
    /// No operands
    V,
    /// One operand (A)
    I,
    /// Two operands (A, B)
    II,
    /// Three operands (A, B, C)
    III,
}

/// Bytecode opcode enumeration.
///
/// Opcodes are grouped by category; the numeric encoding is dense so that
/// dispatch compiles to a jump table.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== misc =====
    /// No operation
    Nop = 0,
    /// Push A zero values
    Alloca,
    /// Pop A values
    Discard,
    /// Move the value at depth A to the top, shifting intermediates down
    StackRot,

    // ===== globals =====
    /// Append a zero value to the globals vector
    GAlloca,
    /// Push globals[A]
    GLoad,
    /// Pop into globals[A]
    GStore,

    // ===== control =====
    /// Stop the handler; report "handled" iff A != 0
    Exit,
    /// Jump to absolute program counter A
    Jmp,
    /// Pop; jump to A if the value is non-zero
    Jn,
    /// Pop; jump to A if the value is zero
    Jz,

    // ===== constant arrays =====
    /// Push the integer array with pool id A
    ITLoad,
    /// Push the string array with pool id A
    STLoad,
    /// Push the IP-address array with pool id A
    PTLoad,
    /// Push the CIDR array with pool id A
    CTLoad,

    // ===== stack slots =====
    /// Duplicate stack[A] onto the top
    Load,
    /// Pop into stack[A]
    Store,

    // ===== numeric =====
    /// Push the immediate A
    ILoad,
    /// Push the integer with pool id A
    NLoad,
    /// Arithmetic negation of the top value
    NNeg,
    /// Bitwise complement of the top value
    NNot,
    NAdd,
    NSub,
    NMul,
    NDiv,
    NRem,
    NShl,
    NShr,
    NPow,
    NAnd,
    NOr,
    NXor,
    /// Replace top with (top == 0)
    NCmpZ,
    NCmpEq,
    NCmpNe,
    NCmpLe,
    NCmpGe,
    NCmpLt,
    NCmpGt,

    // ===== boolean =====
    BNot,
    BAnd,
    BOr,
    BXor,

    // ===== string =====
    /// Push the string with pool id A
    SLoad,
    /// Concatenate the two top strings
    SAdd,
    /// substring(string, offset, length) from the three top values
    SSubStr,
    SCmpEq,
    SCmpNe,
    SCmpLe,
    SCmpGe,
    SCmpLt,
    SCmpGt,
    /// String begins-with test
    SCmpBeg,
    /// String ends-with test
    SCmpEnd,
    /// Substring containment test
    SContains,
    SLen,
    SIsEmpty,
    /// Pop a string; jump through match table A (whole-string equality)
    SMatchEq,
    /// Pop a string; jump through match table A (longest prefix)
    SMatchBeg,
    /// Pop a string; jump through match table A (longest suffix)
    SMatchEnd,
    /// Pop a string; jump through match table A (first matching regex)
    SMatchR,

    // ===== IP address =====
    /// Push the IP address with pool id A
    PLoad,
    PCmpEq,
    PCmpNe,
    /// ip-in-network containment test
    PInCidr,

    // ===== CIDR =====
    /// Push the CIDR with pool id A
    CLoad,

    // ===== regex =====
    /// Match top string against the regex with pool id A, capturing groups
    SRegMatch,
    /// Push capture group A of the last regex match
    SRegGroup,

    // ===== conversions =====
    N2S,
    P2S,
    C2S,
    R2S,
    S2N,

    // ===== invocation =====
    /// Call native function A with B arguments; C != 0 iff a value is pushed
    Call,
    /// Invoke native handler A with B arguments
    Handler,
}

/// All opcodes in encoding order; index equals the numeric value.
const OPCODES: &[Opcode] = &[
    Opcode::Nop,
    Opcode::Alloca,
    Opcode::Discard,
    Opcode::StackRot,
    Opcode::GAlloca,
    Opcode::GLoad,
    Opcode::GStore,
    Opcode::Exit,
    Opcode::Jmp,
    Opcode::Jn,
    Opcode::Jz,
    Opcode::ITLoad,
    Opcode::STLoad,
    Opcode::PTLoad,
    Opcode::CTLoad,
    Opcode::Load,
    Opcode::Store,
    Opcode::ILoad,
    Opcode::NLoad,
    Opcode::NNeg,
    Opcode::NNot,
    Opcode::NAdd,
    Opcode::NSub,
    Opcode::NMul,
    Opcode::NDiv,
    Opcode::NRem,
    Opcode::NShl,
    Opcode::NShr,
    Opcode::NPow,
    Opcode::NAnd,
    Opcode::NOr,
    Opcode::NXor,
    Opcode::NCmpZ,
    Opcode::NCmpEq,
    Opcode::NCmpNe,
    Opcode::NCmpLe,
    Opcode::NCmpGe,
    Opcode::NCmpLt,
    Opcode::NCmpGt,
    Opcode::BNot,
    Opcode::BAnd,
    Opcode::BOr,
    Opcode::BXor,
    Opcode::SLoad,
    Opcode::SAdd,
    Opcode::SSubStr,
    Opcode::SCmpEq,
    Opcode::SCmpNe,
    Opcode::SCmpLe,
    Opcode::SCmpGe,
    Opcode::SCmpLt,
    Opcode::SCmpGt,
    Opcode::SCmpBeg,
    Opcode::SCmpEnd,
    Opcode::SContains,
    Opcode::SLen,
    Opcode::SIsEmpty,
    Opcode::SMatchEq,
    Opcode::SMatchBeg,
    Opcode::SMatchEnd,
    Opcode::SMatchR,
    Opcode::PLoad,
    Opcode::PCmpEq,
    Opcode::PCmpNe,
    Opcode::PInCidr,
    Opcode::CLoad,
    Opcode::SRegMatch,
    Opcode::SRegGroup,
    Opcode::N2S,
    Opcode::P2S,
    Opcode::C2S,
    Opcode::R2S,
    Opcode::S2N,
    Opcode::Call,
    Opcode::Handler,
];

impl Opcode {
    /// Decodes a numeric opcode.
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        OPCODES.get(byte as usize).copied()
    }

    /// Uppercase mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Alloca => "ALLOCA",
            Opcode::Discard => "DISCARD",
            Opcode::StackRot => "STACKROT",
            Opcode::GAlloca => "GALLOCA",
            Opcode::GLoad => "GLOAD",
            Opcode::GStore => "GSTORE",
            Opcode::Exit => "EXIT",
            Opcode::Jmp => "JMP",
            Opcode::Jn => "JN",
            Opcode::Jz => "JZ",
            Opcode::ITLoad => "ITLOAD",
            Opcode::STLoad => "STLOAD",
            Opcode::PTLoad => "PTLOAD",
            Opcode::CTLoad => "CTLOAD",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::ILoad => "ILOAD",
            Opcode::NLoad => "NLOAD",
            Opcode::NNeg => "NNEG",
            Opcode::NNot => "NNOT",
            Opcode::NAdd => "NADD",
            Opcode::NSub => "NSUB",
            Opcode::NMul => "NMUL",
            Opcode::NDiv => "NDIV",
            Opcode::NRem => "NREM",
            Opcode::NShl => "NSHL",
            Opcode::NShr => "NSHR",
            Opcode::NPow => "NPOW",
            Opcode::NAnd => "NAND",
            Opcode::NOr => "NOR",
            Opcode::NXor => "NXOR",
            Opcode::NCmpZ => "NCMPZ",
            Opcode::NCmpEq => "NCMPEQ",
            Opcode::NCmpNe => "NCMPNE",
            Opcode::NCmpLe => "NCMPLE",
            Opcode::NCmpGe => "NCMPGE",
            Opcode::NCmpLt => "NCMPLT",
            Opcode::NCmpGt => "NCMPGT",
            Opcode::BNot => "BNOT",
            Opcode::BAnd => "BAND",
            Opcode::BOr => "BOR",
            Opcode::BXor => "BXOR",
            Opcode::SLoad => "SLOAD",
            Opcode::SAdd => "SADD",
            Opcode::SSubStr => "SSUBSTR",
            Opcode::SCmpEq => "SCMPEQ",
            Opcode::SCmpNe => "SCMPNE",
            Opcode::SCmpLe => "SCMPLE",
            Opcode::SCmpGe => "SCMPGE",
            Opcode::SCmpLt => "SCMPLT",
            Opcode::SCmpGt => "SCMPGT",
            Opcode::SCmpBeg => "SCMPBEG",
            Opcode::SCmpEnd => "SCMPEND",
            Opcode::SContains => "SCONTAINS",
            Opcode::SLen => "SLEN",
            Opcode::SIsEmpty => "SISEMPTY",
            Opcode::SMatchEq => "SMATCHEQ",
            Opcode::SMatchBeg => "SMATCHBEG",
            Opcode::SMatchEnd => "SMATCHEND",
            Opcode::SMatchR => "SMATCHR",
            Opcode::PLoad => "PLOAD",
            Opcode::PCmpEq => "PCMPEQ",
            Opcode::PCmpNe => "PCMPNE",
            Opcode::PInCidr => "PINCIDR",
            Opcode::CLoad => "CLOAD",
            Opcode::SRegMatch => "SREGMATCH",
            Opcode::SRegGroup => "SREGGROUP",
            Opcode::N2S => "N2S",
            Opcode::P2S => "P2S",
            Opcode::C2S => "C2S",
            Opcode::R2S => "R2S",
            Opcode::S2N => "S2N",
            Opcode::Call => "CALL",
            Opcode::Handler => "HANDLER",
        }
    }

    /// Operand signature of this opcode.
    pub fn operand_sig(self) -> OperandSig {
        match self {
            Opcode::Call => OperandSig::III,
            Opcode::Handler => OperandSig::II,
            Opcode::Alloca
            | Opcode::Discard
            | Opcode::StackRot
            | Opcode::GAlloca
            | Opcode::GLoad
            | Opcode::GStore
            | Opcode::Exit
            | Opcode::Jmp
            | Opcode::Jn
            | Opcode::Jz
            | Opcode::ITLoad
            | Opcode::STLoad
            | Opcode::PTLoad
            | Opcode::CTLoad
            | Opcode::Load
            | Opcode::Store
            | Opcode::ILoad
            | Opcode::NLoad
            | Opcode::SLoad
            | Opcode::SMatchEq
            | Opcode::SMatchBeg
            | Opcode::SMatchEnd
            | Opcode::SMatchR
            | Opcode::PLoad
            | Opcode::CLoad
            | Opcode::SRegMatch
            | Opcode::SRegGroup => OperandSig::I,
            _ => OperandSig::V,
        }
    }

    /// Static stack delta; `ALLOCA`, `DISCARD`, `CALL` and `HANDLER` depend
    /// on their operands and are handled by [`stack_change`].
    fn static_stack_change(self) -> i64 {
        match self {
            Opcode::GLoad
            | Opcode::ITLoad
            | Opcode::STLoad
            | Opcode::PTLoad
            | Opcode::CTLoad
            | Opcode::Load
            | Opcode::ILoad
            | Opcode::NLoad
            | Opcode::SLoad
            | Opcode::PLoad
            | Opcode::CLoad
            | Opcode::SRegGroup => 1,

            Opcode::GStore
            | Opcode::Jn
            | Opcode::Jz
            | Opcode::Store
            | Opcode::NAdd
            | Opcode::NSub
            | Opcode::NMul
            | Opcode::NDiv
            | Opcode::NRem
            | Opcode::NShl
            | Opcode::NShr
            | Opcode::NPow
            | Opcode::NAnd
            | Opcode::NOr
            | Opcode::NXor
            | Opcode::NCmpEq
            | Opcode::NCmpNe
            | Opcode::NCmpLe
            | Opcode::NCmpGe
            | Opcode::NCmpLt
            | Opcode::NCmpGt
            | Opcode::BAnd
            | Opcode::BOr
            | Opcode::BXor
            | Opcode::SAdd
            | Opcode::SCmpEq
            | Opcode::SCmpNe
            | Opcode::SCmpLe
            | Opcode::SCmpGe
            | Opcode::SCmpLt
            | Opcode::SCmpGt
            | Opcode::SCmpBeg
            | Opcode::SCmpEnd
            | Opcode::SContains
            | Opcode::SMatchEq
            | Opcode::SMatchBeg
            | Opcode::SMatchEnd
            | Opcode::SMatchR
            | Opcode::PCmpEq
            | Opcode::PCmpNe
            | Opcode::PInCidr => -1,

            Opcode::SSubStr => -2,

            _ => 0,
        }
    }

    /// Literal type this opcode leaves on top of the stack, if any.
    pub fn result_type(self) -> LiteralType {
        match self {
            Opcode::ILoad | Opcode::NLoad => LiteralType::Number,
            Opcode::NNeg
            | Opcode::NNot
            | Opcode::NAdd
            | Opcode::NSub
            | Opcode::NMul
            | Opcode::NDiv
            | Opcode::NRem
            | Opcode::NShl
            | Opcode::NShr
            | Opcode::NPow
            | Opcode::NAnd
            | Opcode::NOr
            | Opcode::NXor
            | Opcode::SLen
            | Opcode::S2N => LiteralType::Number,
            Opcode::NCmpZ
            | Opcode::NCmpEq
            | Opcode::NCmpNe
            | Opcode::NCmpLe
            | Opcode::NCmpGe
            | Opcode::NCmpLt
            | Opcode::NCmpGt
            | Opcode::BNot
            | Opcode::BAnd
            | Opcode::BOr
            | Opcode::BXor
            | Opcode::SCmpEq
            | Opcode::SCmpNe
            | Opcode::SCmpLe
            | Opcode::SCmpGe
            | Opcode::SCmpLt
            | Opcode::SCmpGt
            | Opcode::SCmpBeg
            | Opcode::SCmpEnd
            | Opcode::SContains
            | Opcode::SIsEmpty
            | Opcode::PCmpEq
            | Opcode::PCmpNe
            | Opcode::PInCidr
            | Opcode::SRegMatch => LiteralType::Boolean,
            Opcode::SLoad
            | Opcode::SAdd
            | Opcode::SSubStr
            | Opcode::SRegGroup
            | Opcode::N2S
            | Opcode::P2S
            | Opcode::C2S
            | Opcode::R2S => LiteralType::String,
            Opcode::PLoad => LiteralType::IpAddress,
            Opcode::CLoad => LiteralType::Cidr,
            Opcode::ITLoad => LiteralType::IntArray,
            Opcode::STLoad => LiteralType::StringArray,
            Opcode::PTLoad => LiteralType::IpAddrArray,
            Opcode::CTLoad => LiteralType::CidrArray,
            _ => LiteralType::Void,
        }
    }

    /// Quota price of one execution of this opcode. Uniform for now.
    pub fn price(self) -> u64 {
        1
    }
}

/// Stack delta of one concrete instruction, operands included.
pub fn stack_change(instr: Instruction) -> i64 {
    let opcode = instr.opcode();
    match opcode {
        Opcode::Alloca => i64::from(instr.a()),
        Opcode::Discard => -i64::from(instr.a()),
        Opcode::Handler => -i64::from(instr.b()),
        Opcode::Call => i64::from(instr.c()) - i64::from(instr.b()),
        _ => opcode.static_stack_change(),
    }
}

/// Maximum stack depth reached by a straight-line walk over `code`.
///
/// Handlers cache this so a runner can reserve its stack up front.
pub fn compute_stack_size(code: &[Instruction]) -> usize {
    let mut depth: i64 = 0;
    let mut limit: i64 = 0;
    for &instr in code {
        depth += stack_change(instr);
        limit = limit.max(depth);
    }
    limit.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_roundtrip() {
        for (i, &opcode) in OPCODES.iter().enumerate() {
            assert_eq!(opcode as u8 as usize, i);
            assert_eq!(Opcode::from_u8(i as u8), Some(opcode));
        }
        assert_eq!(Opcode::from_u8(OPCODES.len() as u8), None);
    }

    #[test]
    fn test_dynamic_stack_change() {
        assert_eq!(stack_change(Instruction::with_a(Opcode::Alloca, 3)), 3);
        assert_eq!(stack_change(Instruction::with_a(Opcode::Discard, 2)), -2);
        assert_eq!(
            stack_change(Instruction::with_abc(Opcode::Call, 0, 2, 1)),
            -1
        );
        assert_eq!(
            stack_change(Instruction::with_abc(Opcode::Call, 0, 0, 1)),
            1
        );
        assert_eq!(stack_change(Instruction::with_ab(Opcode::Handler, 0, 2)), -2);
    }

    #[test]
    fn test_compute_stack_size() {
        let code = [
            Instruction::with_a(Opcode::ILoad, 3),
            Instruction::with_a(Opcode::ILoad, 4),
            Instruction::new(Opcode::NAdd),
            Instruction::with_a(Opcode::Exit, 0),
        ];
        assert_eq!(compute_stack_size(&code), 2);
    }
}
