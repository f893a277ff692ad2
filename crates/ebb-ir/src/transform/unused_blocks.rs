//! Unreachable-block elimination

use crate::program::IrProgram;
use crate::value::{HandlerId, ValueId};

/// Erases every non-entry block without predecessors.
pub fn eliminate_unused_blocks(program: &mut IrProgram, handler: HandlerId) -> bool {
    let entry = program.handler(handler).entry_block();
    let mut unused: Vec<ValueId> = Vec::new();

    for block in program.handler(handler).blocks().to_vec() {
        if Some(block) == entry {
            continue;
        }
        if !program.block(block).predecessors().is_empty() {
            continue;
        }
        unused.push(block);
    }

    for block in &unused {
        program.erase_block(*block);
    }

    !unused.is_empty()
}
