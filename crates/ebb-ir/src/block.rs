//! Basic-block operations
//!
//! Blocks own their instruction order; the terminator policy and the
//! symmetry of predecessor/successor edges are enforced by `verify`. Every
//! mutation that moves instructions between blocks keeps CFG edges
//! consistent as it goes.

use crate::program::IrProgram;
use crate::value::{ValueId, ValueKind};
use ebb_core::Attribute;

impl IrProgram {
    /// The block's final instruction if it is a terminator.
    pub fn terminator(&self, block: ValueId) -> Option<ValueId> {
        let last = *self.block(block).instrs.last()?;
        if self.instr(last).op().is_terminator() {
            Some(last)
        } else {
            None
        }
    }

    /// A block is complete when it ends in a terminator or in a call to a
    /// native callable that never returns.
    pub fn is_complete(&self, block: ValueId) -> bool {
        let Some(&last) = self.block(block).instrs.last() else {
            return false;
        };
        if self.instr(last).op().is_terminator() {
            return true;
        }
        self.callee_never_returns(last)
    }

    fn callee_never_returns(&self, instr: ValueId) -> bool {
        use crate::instr::InstrOp;
        let data = self.instr(instr);
        if !matches!(data.op(), InstrOp::Call | InstrOp::HandlerCall) {
            return false;
        }
        let Some(callee) = data.operands().first().copied().flatten() else {
            return false;
        };
        match &self.value(callee).kind {
            ValueKind::BuiltinFunction(_, attrs) | ValueKind::BuiltinHandler(_, attrs) => {
                attrs.contains(Attribute::NoReturn)
            }
            _ => false,
        }
    }

    /// Appends a detached instruction to `block`, linking successor edges if
    /// it is a terminator.
    pub fn push_instr(&mut self, block: ValueId, instr: ValueId) -> ValueId {
        assert!(
            self.instr(instr).block.is_none(),
            "instruction {instr} already belongs to a block"
        );
        self.instr_mut(instr).block = Some(block);

        if self.instr(instr).op().is_terminator() {
            let operands: Vec<ValueId> = self
                .instr(instr)
                .operands()
                .iter()
                .copied()
                .flatten()
                .collect();
            for operand in operands {
                if self.value(operand).is_block() {
                    self.link_successor(block, operand);
                }
            }
        }

        self.block_mut(block).instrs.push(instr);
        instr
    }

    /// Detaches `instr` from `block` without destroying it. Removing the
    /// terminator also unlinks the block's successor edges.
    pub fn remove_instr(&mut self, block: ValueId, instr: ValueId) {
        if self.terminator(block) == Some(instr) {
            let operands: Vec<ValueId> = self
                .instr(instr)
                .operands()
                .iter()
                .copied()
                .flatten()
                .collect();
            for operand in operands {
                if self.value(operand).is_block() {
                    self.unlink_successor(block, operand);
                }
            }
        }

        let instrs = &mut self.block_mut(block).instrs;
        let at = instrs
            .iter()
            .position(|&i| i == instr)
            .unwrap_or_else(|| panic!("instruction {instr} is not in block {block}"));
        instrs.remove(at);
        self.instr_mut(instr).block = None;
    }

    /// Replaces `old` with the detached instruction `new` in place,
    /// redirecting all uses of `old` to `new`. Returns `old`, detached.
    pub fn replace_instr(&mut self, block: ValueId, old: ValueId, new: ValueId) -> ValueId {
        assert_eq!(self.instr(old).block, Some(block));
        assert!(self.instr(new).block.is_none());

        self.replace_all_uses_with(old, new);

        if self.terminator(block) == Some(old) {
            self.remove_instr(block, old);
            self.push_instr(block, new);
        } else {
            assert!(
                !self.instr(new).op().is_terminator(),
                "cannot place a terminator in the middle of a block"
            );
            let at = self
                .block(block)
                .instrs
                .iter()
                .position(|&i| i == old)
                .expect("old instruction not found in its block");
            self.instr_mut(old).block = None;
            self.instr_mut(new).block = Some(block);
            self.block_mut(block).instrs[at] = new;
        }
        old
    }

    /// Moves every instruction of `src` to the end of `dst`, retargeting
    /// successor edges, then erases the emptied `src` from its handler.
    pub fn merge_back(&mut self, dst: ValueId, src: ValueId) {
        assert!(
            self.terminator(dst).is_none(),
            "cannot merge into a block that already terminates"
        );

        let moved = std::mem::take(&mut self.block_mut(src).instrs);
        for &instr in &moved {
            self.instr_mut(instr).block = Some(dst);
            if self.instr(instr).op().is_terminator() {
                let operands: Vec<ValueId> = self
                    .instr(instr)
                    .operands()
                    .iter()
                    .copied()
                    .flatten()
                    .collect();
                for operand in operands {
                    if self.value(operand).is_block() {
                        self.unlink_successor(src, operand);
                        self.link_successor(dst, operand);
                    }
                }
            }
            self.block_mut(dst).instrs.push(instr);
        }

        for succ in self.block(src).successors.to_vec() {
            self.unlink_successor(src, succ);
        }

        self.erase_block(src);
    }

    /// Sanity checks for one block. Failures are fatal: the program is
    /// ill-formed by construction.
    pub fn verify_block(&self, block: ValueId) {
        let data = self.block(block);
        let name = self.name(block);
        assert!(
            !data.instrs.is_empty(),
            "block {name}: must contain at least one instruction"
        );
        assert!(
            self.is_complete(block),
            "block {name}: last instruction must be a terminator"
        );
        for &instr in &data.instrs[..data.instrs.len() - 1] {
            assert!(
                !self.instr(instr).op().is_terminator(),
                "block {name}: terminator in the middle of the block"
            );
        }

        // every successor edge must have its symmetric predecessor edge
        for &succ in &data.successors {
            let forward = data.successors.iter().filter(|&&s| s == succ).count();
            let backward = self
                .block(succ)
                .predecessors
                .iter()
                .filter(|&&p| p == block)
                .count();
            assert_eq!(
                forward,
                backward,
                "block {name}: asymmetric edge to {}",
                self.name(succ)
            );
        }
        for &pred in &data.predecessors {
            let backward = data.predecessors.iter().filter(|&&p| p == pred).count();
            let forward = self
                .block(pred)
                .successors
                .iter()
                .filter(|&&s| s == block)
                .count();
            assert_eq!(
                forward,
                backward,
                "block {name}: asymmetric edge from {}",
                self.name(pred)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::IrBuilder;
    use crate::instr::InstrOp;

    #[test]
    fn test_terminator_links_successor_edges() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("test");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        let next = builder.create_block("next");
        builder.set_insert_point(entry);
        builder.create_br(next);

        let program = builder.program();
        assert_eq!(program.block(entry).successors(), &[next]);
        assert_eq!(program.block(next).predecessors(), &[entry]);
    }

    #[test]
    fn test_remove_terminator_unlinks_edges() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("test");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        let next = builder.create_block("next");
        builder.set_insert_point(entry);
        let br = builder.create_br(next);

        let program = builder.program_mut();
        program.remove_instr(entry, br);
        assert!(program.block(entry).successors().is_empty());
        assert!(program.block(next).predecessors().is_empty());
        program.destroy_instr(br);
    }

    #[test]
    fn test_cond_br_produces_two_edges() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("test");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        let yes = builder.create_block("yes");
        let no = builder.create_block("no");
        builder.set_insert_point(entry);

        // a non-constant condition so the branch is not folded away
        let slot = builder.create_alloca(ebb_core::LiteralType::Boolean, None, "cond");
        let cond = builder.create_load(slot, "value");
        builder.create_cond_br(cond, yes, no);

        let program = builder.program();
        assert_eq!(program.block(entry).successors().len(), 2);
        assert_eq!(program.block(yes).predecessors(), &[entry]);
        assert_eq!(program.block(no).predecessors(), &[entry]);
        assert!(matches!(
            program
                .instr(program.terminator(entry).unwrap())
                .op(),
            InstrOp::CondBr
        ));
    }
}
