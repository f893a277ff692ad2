//! Handlers
//!
//! A handler is a named, ordered collection of basic blocks; the first block
//! is the entry. The block order is also the linear layout the code
//! generator emits, which is why the move/is-next queries live here.

use crate::program::IrProgram;
use crate::value::{BlockData, HandlerId, ValueId, ValueKind};
use ebb_core::LiteralType;

/// One handler: its name and block layout.
#[derive(Debug)]
pub struct HandlerData {
    pub(crate) name: String,
    pub(crate) blocks: Vec<ValueId>,
}

impl HandlerData {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks in layout order; the first is the entry block.
    pub fn blocks(&self) -> &[ValueId] {
        &self.blocks
    }

    pub fn entry_block(&self) -> Option<ValueId> {
        self.blocks.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl IrProgram {
    pub fn create_handler(&mut self, name: impl Into<String>) -> HandlerId {
        let name = name.into();
        assert!(
            self.find_handler(&name).is_none(),
            "handler {name:?} already exists"
        );
        let id = HandlerId(self.handlers.len() as u32);
        self.handlers.push(HandlerData {
            name,
            blocks: Vec::new(),
        });
        id
    }

    pub fn find_handler(&self, name: &str) -> Option<HandlerId> {
        self.handlers
            .iter()
            .position(|h| h.name == name)
            .map(|i| HandlerId(i as u32))
    }

    pub fn handler(&self, id: HandlerId) -> &HandlerData {
        &self.handlers[id.index()]
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn handler_ids(&self) -> impl Iterator<Item = HandlerId> {
        (0..self.handlers.len() as u32).map(HandlerId)
    }

    /// Creates a new block at the end of the handler's layout.
    pub fn create_block(&mut self, handler: HandlerId, name: impl Into<String>) -> ValueId {
        let block = self.new_value(
            LiteralType::Void,
            name.into(),
            ValueKind::Block(BlockData {
                handler: Some(handler),
                instrs: Vec::new(),
                predecessors: Vec::new(),
                successors: Vec::new(),
            }),
        );
        self.handlers[handler.index()].blocks.push(block);
        block
    }

    /// Moves `block` to the front of the layout, making it the entry block.
    pub fn set_entry_block(&mut self, block: ValueId) {
        let handler = self.block(block).handler();
        let blocks = &mut self.handlers[handler.index()].blocks;
        let at = blocks
            .iter()
            .position(|&b| b == block)
            .expect("block must belong to its handler");
        blocks.remove(at);
        blocks.insert(0, block);
    }

    /// True iff `candidate` is laid out directly after `block`.
    pub fn is_next_block(&self, block: ValueId, candidate: ValueId) -> bool {
        let handler = self.block(block).handler();
        let blocks = &self.handlers[handler.index()].blocks;
        match blocks.iter().position(|&b| b == block) {
            Some(at) => blocks.get(at + 1) == Some(&candidate),
            None => false,
        }
    }

    /// Moves `block` so it is laid out directly after `after`.
    pub fn move_block_after(&mut self, block: ValueId, after: ValueId) {
        let handler = self.block(block).handler();
        assert_eq!(self.block(after).handler(), handler);
        let blocks = &mut self.handlers[handler.index()].blocks;
        let at = blocks.iter().position(|&b| b == block).expect("block");
        blocks.remove(at);
        let anchor = blocks.iter().position(|&b| b == after).expect("anchor");
        blocks.insert(anchor + 1, block);
    }

    /// Moves `block` so it is laid out directly before `before`.
    pub fn move_block_before(&mut self, block: ValueId, before: ValueId) {
        let handler = self.block(block).handler();
        assert_eq!(self.block(before).handler(), handler);
        let blocks = &mut self.handlers[handler.index()].blocks;
        let at = blocks.iter().position(|&b| b == block).expect("block");
        blocks.remove(at);
        let anchor = blocks.iter().position(|&b| b == before).expect("anchor");
        blocks.insert(anchor, block);
    }

    /// Unlinks and destroys `block`.
    ///
    /// Operands of the block's instructions are nulled first, breaking
    /// use-def cycles inside the block; the block must have no predecessors
    /// left.
    pub fn erase_block(&mut self, block: ValueId) {
        let instrs = self.block(block).instrs.clone();
        for &instr in &instrs {
            self.clear_operands(instr);
        }

        assert!(
            self.block(block).predecessors.is_empty(),
            "cannot erase block {} while other blocks still branch to it",
            self.name(block)
        );

        for succ in self.block(block).successors.to_vec() {
            self.unlink_successor(block, succ);
        }

        // destroy in reverse order so later instructions release their uses
        // of earlier ones first
        for &instr in instrs.iter().rev() {
            self.instr_mut(instr).block = None;
            self.destroy_instr(instr);
        }
        self.block_mut(block).instrs.clear();

        let handler = self.block(block).handler();
        let blocks = &mut self.handlers[handler.index()].blocks;
        let at = blocks
            .iter()
            .position(|&b| b == block)
            .expect("block must belong to its handler");
        blocks.remove(at);

        self.destroy_value(block);
    }

    /// Runs block verification over the whole handler.
    pub fn verify_handler(&self, handler: HandlerId) {
        for &block in &self.handlers[handler.index()].blocks {
            self.verify_block(block);
        }
    }

    /// Runs verification over every handler.
    pub fn verify(&self) {
        for id in self.handler_ids() {
            self.verify_handler(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::IrBuilder;

    #[test]
    fn test_layout_queries() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("test");
        builder.set_handler(handler);
        let a = builder.create_block("a");
        let b = builder.create_block("b");
        let c = builder.create_block("c");

        let program = builder.program_mut();
        assert!(program.is_next_block(a, b));
        assert!(!program.is_next_block(a, c));

        program.move_block_after(c, a);
        assert!(program.is_next_block(a, c));
        assert!(program.is_next_block(c, b));

        program.move_block_before(b, c);
        assert!(program.is_next_block(a, b));
        assert!(program.is_next_block(b, c));

        program.set_entry_block(c);
        assert_eq!(program.handler(handler).entry_block(), Some(c));
    }

    #[test]
    fn test_erase_block_breaks_use_def_cycles() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("test");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        builder.set_insert_point(entry);

        let slot = builder.create_alloca(ebb_core::LiteralType::Number, None, "x");
        let loaded = builder.create_load(slot, "x.load");
        builder.create_store(slot, loaded, "");
        let zero = builder.get_int(0);
        builder.create_ret(zero);

        let program = builder.program_mut();
        program.erase_block(entry);
        assert!(program.handler(handler).is_empty());
    }
}
