//! IR instructions
//!
//! Instructions are values with an operand list and a parent block. The
//! opcode is a tagged enum over the fixed instruction set; per-opcode payload
//! (the match class of a `match`, the operator of an arithmetic node) lives
//! in the tag.

use crate::program::IrProgram;
use crate::value::ValueId;
use ebb_core::MatchClass;

/// Unary operators over a single typed operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    /// Arithmetic negation (Number)
    INeg,
    /// Bitwise complement (Number)
    INot,
    /// Logical not (Boolean)
    BNot,
    /// String length (String -> Number)
    SLen,
    /// String emptiness (String -> Boolean)
    SIsEmpty,
}

impl UnaryOperator {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryOperator::INeg => "ineg",
            UnaryOperator::INot => "inot",
            UnaryOperator::BNot => "bnot",
            UnaryOperator::SLen => "slen",
            UnaryOperator::SIsEmpty => "sisempty",
        }
    }
}

/// Binary operators; the prefix letter encodes the operand family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // numerical
    IAdd,
    ISub,
    IMul,
    IDiv,
    IRem,
    IPow,
    IAnd,
    IOr,
    IXor,
    IShl,
    IShr,
    ICmpEq,
    ICmpNe,
    ICmpLe,
    ICmpGe,
    ICmpLt,
    ICmpGt,
    // boolean
    BAnd,
    BOr,
    BXor,
    // string
    SAdd,
    SCmpEq,
    SCmpNe,
    SCmpLe,
    SCmpGe,
    SCmpLt,
    SCmpGt,
    /// String-against-regexp match (captures groups at runtime)
    SCmpRe,
    /// begins-with
    SCmpBeg,
    /// ends-with
    SCmpEnd,
    /// substring containment
    SIn,
    // IP
    PCmpEq,
    PCmpNe,
    /// address-in-network containment
    PInCidr,
}

impl BinaryOperator {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOperator::IAdd => "iadd",
            BinaryOperator::ISub => "isub",
            BinaryOperator::IMul => "imul",
            BinaryOperator::IDiv => "idiv",
            BinaryOperator::IRem => "irem",
            BinaryOperator::IPow => "ipow",
            BinaryOperator::IAnd => "iand",
            BinaryOperator::IOr => "ior",
            BinaryOperator::IXor => "ixor",
            BinaryOperator::IShl => "ishl",
            BinaryOperator::IShr => "ishr",
            BinaryOperator::ICmpEq => "icmpeq",
            BinaryOperator::ICmpNe => "icmpne",
            BinaryOperator::ICmpLe => "icmple",
            BinaryOperator::ICmpGe => "icmpge",
            BinaryOperator::ICmpLt => "icmplt",
            BinaryOperator::ICmpGt => "icmpgt",
            BinaryOperator::BAnd => "band",
            BinaryOperator::BOr => "bor",
            BinaryOperator::BXor => "bxor",
            BinaryOperator::SAdd => "sadd",
            BinaryOperator::SCmpEq => "scmpeq",
            BinaryOperator::SCmpNe => "scmpne",
            BinaryOperator::SCmpLe => "scmple",
            BinaryOperator::SCmpGe => "scmpge",
            BinaryOperator::SCmpLt => "scmplt",
            BinaryOperator::SCmpGt => "scmpgt",
            BinaryOperator::SCmpRe => "scmpre",
            BinaryOperator::SCmpBeg => "scmpbeg",
            BinaryOperator::SCmpEnd => "scmpend",
            BinaryOperator::SIn => "sin",
            BinaryOperator::PCmpEq => "pcmpeq",
            BinaryOperator::PCmpNe => "pcmpne",
            BinaryOperator::PInCidr => "pincidr",
        }
    }
}

/// The instruction set, as a tagged enum.
///
/// Operand layouts:
/// - `Alloca`: `[size]` (constant integer)
/// - `Load`: `[variable]`
/// - `Store`: `[variable, index, source]`
/// - `Phi`: `[incoming...]`
/// - `Call`: `[callee, args...]` (callee is a builtin-function value)
/// - `HandlerCall`: `[callee, args...]`
/// - `Br`: `[target-block]`
/// - `CondBr`: `[condition, true-block, false-block]`
/// - `Ret`: `[result]` (constant integer 0 or 1)
/// - `Match`: `[condition, else-block, (label, case-block)...]`
/// - `RegExpGroup`: `[group-id]` (constant integer)
/// - `Cast`: `[source]`; the result type is the instruction's value type
/// - `Unary`: `[operand]`, `Binary`: `[lhs, rhs]`
/// - `SSubStr`: `[string, offset, length]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrOp {
    Nop,
    Alloca,
    Load,
    Store,
    Phi,
    Call,
    HandlerCall,
    Br,
    CondBr,
    Ret,
    Match(MatchClass),
    RegExpGroup,
    Cast,
    SSubStr,
    Unary(UnaryOperator),
    Binary(BinaryOperator),
}

impl InstrOp {
    /// Terminators are the only instructions that may end a block and the
    /// only ones that may reference blocks as operands.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            InstrOp::Br | InstrOp::CondBr | InstrOp::Ret | InstrOp::Match(_)
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            InstrOp::Nop => "nop",
            InstrOp::Alloca => "alloca",
            InstrOp::Load => "load",
            InstrOp::Store => "store",
            InstrOp::Phi => "phi",
            InstrOp::Call => "call",
            InstrOp::HandlerCall => "handler",
            InstrOp::Br => "br",
            InstrOp::CondBr => "condbr",
            InstrOp::Ret => "ret",
            InstrOp::Match(MatchClass::Same) => "match.same",
            InstrOp::Match(MatchClass::Head) => "match.head",
            InstrOp::Match(MatchClass::Tail) => "match.tail",
            InstrOp::Match(MatchClass::RegExp) => "match.re",
            InstrOp::RegExpGroup => "reggroup",
            InstrOp::Cast => "cast",
            InstrOp::SSubStr => "ssubstr",
            InstrOp::Unary(op) => op.mnemonic(),
            InstrOp::Binary(op) => op.mnemonic(),
        }
    }
}

/// Instruction payload of a value: opcode, parent block, operand list.
///
/// An operand slot may be empty (`None`) while an instruction is being torn
/// down or, for a `match`, before the else block is attached.
#[derive(Debug)]
pub struct InstrData {
    pub(crate) op: InstrOp,
    pub(crate) block: Option<ValueId>,
    pub(crate) operands: Vec<Option<ValueId>>,
}

impl InstrData {
    pub fn op(&self) -> InstrOp {
        self.op
    }

    /// The block this instruction currently belongs to.
    pub fn block(&self) -> Option<ValueId> {
        self.block
    }

    pub fn operands(&self) -> &[Option<ValueId>] {
        &self.operands
    }

    /// Operand at `index`; panics if the slot is empty.
    pub fn operand(&self, index: usize) -> ValueId {
        self.operands[index].expect("operand slot is empty")
    }

    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }
}

/// Accessors over the `match` operand layout
/// `[condition, else-block, (label, case-block)...]`.
impl IrProgram {
    pub fn match_condition(&self, instr: ValueId) -> ValueId {
        debug_assert!(matches!(self.instr(instr).op(), InstrOp::Match(_)));
        self.instr(instr).operand(0)
    }

    pub fn match_else_block(&self, instr: ValueId) -> Option<ValueId> {
        debug_assert!(matches!(self.instr(instr).op(), InstrOp::Match(_)));
        self.instr(instr).operands()[1]
    }

    pub fn set_match_else_block(&mut self, instr: ValueId, block: ValueId) {
        debug_assert!(matches!(self.instr(instr).op(), InstrOp::Match(_)));
        self.set_operand(instr, 1, Some(block));
    }

    /// Appends a `(label, case-block)` pair.
    pub fn add_match_case(&mut self, instr: ValueId, label: ValueId, block: ValueId) {
        debug_assert!(matches!(self.instr(instr).op(), InstrOp::Match(_)));
        self.add_operand(instr, label);
        self.add_operand(instr, block);
    }

    pub fn match_cases(&self, instr: ValueId) -> Vec<(ValueId, ValueId)> {
        debug_assert!(matches!(self.instr(instr).op(), InstrOp::Match(_)));
        let operands = self.instr(instr).operands();
        operands[2..]
            .chunks(2)
            .map(|pair| {
                (
                    pair[0].expect("match case label is unset"),
                    pair[1].expect("match case block is unset"),
                )
            })
            .collect()
    }
}
