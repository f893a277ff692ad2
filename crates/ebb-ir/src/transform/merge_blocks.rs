//! Duplicate-block merging

use crate::program::IrProgram;
use crate::value::{HandlerId, ValueId};

fn is_same_instr(program: &IrProgram, a: ValueId, b: ValueId) -> bool {
    let ia = program.instr(a);
    let ib = program.instr(b);
    ia.op() == ib.op() && ia.operands() == ib.operands()
}

fn is_same_block(program: &IrProgram, a: ValueId, b: ValueId) -> bool {
    let ba = program.block(a);
    let bb = program.block(b);
    if ba.len() != bb.len() || ba.successors() != bb.successors() {
        return false;
    }
    ba.instrs()
        .iter()
        .zip(bb.instrs())
        .all(|(&x, &y)| is_same_instr(program, x, y))
}

/// Retargets the predecessors of blocks with pairwise-identical instruction
/// sequences and successor lists onto one representative. The duplicates
/// become unreachable and are swept up by unused-block elimination.
pub fn merge_same_blocks(program: &mut IrProgram, handler: HandlerId) -> bool {
    let blocks = program.handler(handler).blocks().to_vec();

    for (at, &representative) in blocks.iter().enumerate() {
        let duplicates: Vec<ValueId> = blocks[at + 1..]
            .iter()
            .copied()
            .filter(|&other| is_same_block(program, representative, other))
            .collect();
        if duplicates.is_empty() {
            continue;
        }

        let mut changed = false;
        for duplicate in duplicates {
            for pred in program.block(duplicate).predecessors().to_vec() {
                let terminator = program
                    .terminator(pred)
                    .expect("predecessor must end in a terminator");
                if program
                    .instr(terminator)
                    .operands()
                    .contains(&Some(duplicate))
                {
                    program.replace_operand(terminator, duplicate, representative);
                    changed = true;
                }
            }
        }
        if changed {
            return true;
        }
    }
    false
}
