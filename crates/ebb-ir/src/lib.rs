//! SSA intermediate representation of the ebb expression VM
//!
//! The IR is a handler-scoped control-flow graph of typed instructions in
//! static single assignment form. Every entity (constant, instruction, basic
//! block, builtin reference) is a *value* living in one arena owned by the
//! [`IrProgram`]; operands, use-lists and predecessor/successor edges are
//! index links kept bidirectionally consistent by the arena's mutation
//! methods.
//!
//! Construction goes through the [`IrBuilder`], which interns constants and
//! folds constant operands at construction time. The [`transform`] module
//! contains the handler-scoped rewrite passes and their fixed-point driver.

pub mod block;
pub mod builder;
pub mod handler;
pub mod instr;
pub mod pretty;
pub mod program;
pub mod transform;
pub mod value;

pub use builder::IrBuilder;
pub use instr::{BinaryOperator, InstrData, InstrOp, UnaryOperator};
pub use program::IrProgram;
pub use transform::PassManager;
pub use value::{HandlerId, ValueData, ValueId, ValueKind};
