//! Bytecode layer of the ebb expression VM
//!
//! Defines the stack-machine instruction set, the packed 64-bit instruction
//! word, per-opcode metadata (operand signature, stack delta, result type),
//! and the deduplicated constant pool a compiled program carries at runtime.

pub mod constants;
pub mod instruction;
pub mod opcode;

pub use constants::{ConstantPool, MatchCaseDef, MatchDef};
pub use instruction::{disassemble, disassemble_one, Code, Instruction, Operand};
pub use opcode::{compute_stack_size, stack_change, Opcode, OperandSig};
