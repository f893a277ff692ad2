//! IR values
//!
//! Everything the IR talks about is a value: it has a literal type, a name
//! that is unique within its program, and a list of the instructions using
//! it. A value may not be destroyed while it is still used; replacing all
//! uses leaves it with a use count of zero.

use crate::instr::InstrData;
use ebb_core::{AttributeSet, Cidr, LiteralType, RegExp, Signature};
use std::fmt;
use std::net::IpAddr;

/// Index of a value in its program's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Index of a handler in its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u32);

impl HandlerId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A basic block: an ordered instruction list ending in one terminator, plus
/// its control-flow edges. Predecessor and successor lists are kept
/// symmetric by the arena's operand mutation methods.
#[derive(Debug, Default)]
pub struct BlockData {
    pub(crate) handler: Option<HandlerId>,
    pub(crate) instrs: Vec<ValueId>,
    pub(crate) predecessors: Vec<ValueId>,
    pub(crate) successors: Vec<ValueId>,
}

impl BlockData {
    pub fn handler(&self) -> HandlerId {
        self.handler.expect("block is not attached to a handler")
    }

    pub fn instrs(&self) -> &[ValueId] {
        &self.instrs
    }

    pub fn predecessors(&self) -> &[ValueId] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[ValueId] {
        &self.successors
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }
}

/// The payload of a value.
#[derive(Debug)]
pub enum ValueKind {
    /// Preallocated boolean literal
    ConstBoolean(bool),
    /// Interned integer literal
    ConstInt(i64),
    /// Interned string literal
    ConstString(String),
    /// Interned IP-address literal
    ConstIp(IpAddr),
    /// Interned CIDR literal
    ConstCidr(Cidr),
    /// Interned regular-expression literal
    ConstRegExp(RegExp),
    /// Interned constant array; elements are constant values
    ConstArray(Vec<ValueId>),
    /// Reference to a native function, by signature
    BuiltinFunction(Signature, AttributeSet),
    /// Reference to a native handler, by signature
    BuiltinHandler(Signature, AttributeSet),
    /// Symbolic reference to a handler of the same program
    HandlerRef(HandlerId),
    /// A basic block
    Block(BlockData),
    /// An instruction
    Instr(InstrData),
    /// Tombstone of a destroyed value; never referenced again
    Removed,
}

impl ValueKind {
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            ValueKind::ConstBoolean(_)
                | ValueKind::ConstInt(_)
                | ValueKind::ConstString(_)
                | ValueKind::ConstIp(_)
                | ValueKind::ConstCidr(_)
                | ValueKind::ConstRegExp(_)
                | ValueKind::ConstArray(_)
                | ValueKind::BuiltinFunction(..)
                | ValueKind::BuiltinHandler(..)
                | ValueKind::HandlerRef(_)
        )
    }
}

/// One arena slot: type, unique name, use-list and payload.
#[derive(Debug)]
pub struct ValueData {
    pub(crate) ty: LiteralType,
    pub(crate) name: String,
    pub(crate) uses: Vec<ValueId>,
    pub(crate) kind: ValueKind,
}

impl ValueData {
    pub fn ty(&self) -> LiteralType {
        self.ty
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instructions currently using this value as an operand. An
    /// instruction appears once per operand slot that references the value.
    pub fn uses(&self) -> &[ValueId] {
        &self.uses
    }

    pub fn is_used(&self) -> bool {
        !self.uses.is_empty()
    }

    pub fn use_count(&self) -> usize {
        self.uses.len()
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn as_block(&self) -> Option<&BlockData> {
        match &self.kind {
            ValueKind::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_instr(&self) -> Option<&InstrData> {
        match &self.kind {
            ValueKind::Instr(instr) => Some(instr),
            _ => None,
        }
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match &self.kind {
            ValueKind::ConstInt(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_const_bool(&self) -> Option<bool> {
        match &self.kind {
            ValueKind::ConstBoolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_const_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::ConstString(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.kind.is_constant()
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, ValueKind::Block(_))
    }
}
