//! Empty-block elimination

use crate::instr::InstrOp;
use crate::program::IrProgram;
use crate::value::{HandlerId, ValueId};

/// Removes blocks that contain nothing but an unconditional branch by
/// retargeting every predecessor to the branch's target. The entry block is
/// never removed.
pub fn eliminate_empty_blocks(program: &mut IrProgram, handler: HandlerId) -> bool {
    let mut eliminated: Vec<ValueId> = Vec::new();

    for block in program.handler(handler).blocks().to_vec() {
        if program.block(block).len() != 1 {
            continue;
        }
        let Some(terminator) = program.terminator(block) else {
            continue;
        };
        if !matches!(program.instr(terminator).op(), InstrOp::Br) {
            continue;
        }
        if Some(block) == program.handler(handler).entry_block() {
            continue;
        }
        let target = program.instr(terminator).operand(0);
        if target == block {
            // a self-loop has no forwarding target
            continue;
        }

        for pred in program.block(block).predecessors().to_vec() {
            let pred_terminator = program
                .terminator(pred)
                .expect("predecessor must end in a terminator");
            if program
                .instr(pred_terminator)
                .operands()
                .contains(&Some(block))
            {
                program.replace_operand(pred_terminator, block, target);
            }
        }
        eliminated.push(block);
    }

    for block in &eliminated {
        program.erase_block(*block);
    }

    !eliminated.is_empty()
}
