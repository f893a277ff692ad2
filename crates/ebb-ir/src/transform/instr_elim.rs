//! Branch and instruction rewrites
//!
//! The four branch rewrites and the dead-call elimination. Every pass
//! applies at most one rewrite per invocation; the pass manager's fixed
//! point loop drives them to exhaustion.

use crate::instr::InstrOp;
use crate::program::IrProgram;
use crate::value::{HandlerId, ValueKind};
use ebb_core::{Attribute, LiteralType};

/// Rewrites `condbr %cond, %b, %b` to `br %b`.
pub fn rewrite_cond_br_to_same_branches(program: &mut IrProgram, handler: HandlerId) -> bool {
    for block in program.handler(handler).blocks().to_vec() {
        let Some(terminator) = program.terminator(block) else {
            continue;
        };
        if !matches!(program.instr(terminator).op(), InstrOp::CondBr) {
            continue;
        }
        let true_block = program.instr(terminator).operand(1);
        let false_block = program.instr(terminator).operand(2);
        if true_block != false_block {
            continue;
        }

        program.remove_instr(block, terminator);
        program.destroy_instr(terminator);
        let br = program.new_instr(
            LiteralType::Void,
            InstrOp::Br,
            vec![true_block],
            String::new(),
        );
        program.push_instr(block, br);
        return true;
    }
    false
}

/// Removes calls to side-effect-free builtins whose non-void result is
/// never used.
pub fn eliminate_unused_instr(program: &mut IrProgram, handler: HandlerId) -> bool {
    for block in program.handler(handler).blocks().to_vec() {
        for instr in program.block(block).instrs().to_vec() {
            if !matches!(program.instr(instr).op(), InstrOp::Call) {
                continue;
            }
            let callee = program.instr(instr).operand(0);
            let side_effect_free = match program.value(callee).kind() {
                ValueKind::BuiltinFunction(_, attrs) => attrs.contains(Attribute::SideEffectFree),
                _ => false,
            };
            if !side_effect_free {
                continue;
            }
            if program.ty(instr) != LiteralType::Void && !program.value(instr).is_used() {
                program.remove_instr(block, instr);
                program.destroy_instr(instr);
                return true;
            }
        }
    }
    false
}

/// Absorbs a branch target that has this block as its only predecessor.
pub fn eliminate_linear_br(program: &mut IrProgram, handler: HandlerId) -> bool {
    for block in program.handler(handler).blocks().to_vec() {
        let Some(terminator) = program.terminator(block) else {
            continue;
        };
        if !matches!(program.instr(terminator).op(), InstrOp::Br) {
            continue;
        }
        let target = program.instr(terminator).operand(0);
        if target == block {
            continue;
        }
        if program.block(target).predecessors() != [block] {
            continue;
        }

        program.remove_instr(block, terminator);
        program.destroy_instr(terminator);
        program.merge_back(block, target);
        return true;
    }
    false
}

/// Folds `condbr <constant>, %then, %else` into an unconditional branch to
/// the taken side.
pub fn fold_constant_cond_br(program: &mut IrProgram, handler: HandlerId) -> bool {
    for block in program.handler(handler).blocks().to_vec() {
        let Some(terminator) = program.terminator(block) else {
            continue;
        };
        if !matches!(program.instr(terminator).op(), InstrOp::CondBr) {
            continue;
        }
        let Some(condition) = program
            .value(program.instr(terminator).operand(0))
            .as_const_bool()
        else {
            continue;
        };
        let taken = if condition {
            program.instr(terminator).operand(1)
        } else {
            program.instr(terminator).operand(2)
        };

        program.remove_instr(block, terminator);
        program.destroy_instr(terminator);
        let br = program.new_instr(LiteralType::Void, InstrOp::Br, vec![taken], String::new());
        program.push_instr(block, br);
        return true;
    }
    false
}

/// Replaces a branch to a return-only block with a copy of that return.
///
/// Only applies when the target is not the next block in linear layout (the
/// branch would be elided by the code generator anyway).
pub fn rewrite_br_to_exit(program: &mut IrProgram, handler: HandlerId) -> bool {
    for block in program.handler(handler).blocks().to_vec() {
        let Some(terminator) = program.terminator(block) else {
            continue;
        };
        if !matches!(program.instr(terminator).op(), InstrOp::Br) {
            continue;
        }
        let target = program.instr(terminator).operand(0);
        if program.block(target).len() != 1 {
            continue;
        }
        if program.is_next_block(block, target) {
            continue;
        }
        let Some(ret) = program.terminator(target) else {
            continue;
        };
        if !matches!(program.instr(ret).op(), InstrOp::Ret) {
            continue;
        }

        program.remove_instr(block, terminator);
        program.destroy_instr(terminator);
        let clone = program.clone_instr(ret);
        program.push_instr(block, clone);
        return true;
    }
    false
}
