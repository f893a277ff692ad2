//! The IR program arena
//!
//! Owns every value of a compilation unit: interned constants, builtin
//! references, handlers with their blocks and instructions. All use-def and
//! control-flow bookkeeping funnels through the mutation methods here so
//! both directions of every edge are updated in one place.

use crate::handler::HandlerData;
use crate::instr::{InstrData, InstrOp};
use crate::value::{BlockData, HandlerId, ValueData, ValueId, ValueKind};
use ebb_core::{AttributeSet, Cidr, LiteralType, RegExp, Signature};
use rustc_hash::FxHashMap;
use std::net::IpAddr;

/// A whole program in SSA form.
#[derive(Debug)]
pub struct IrProgram {
    pub(crate) values: Vec<ValueData>,
    pub(crate) handlers: Vec<HandlerData>,
    modules: Vec<(String, String)>,

    true_literal: ValueId,
    false_literal: ValueId,
    numbers: FxHashMap<i64, ValueId>,
    strings: FxHashMap<String, ValueId>,
    ipaddrs: FxHashMap<IpAddr, ValueId>,
    cidrs: FxHashMap<Cidr, ValueId>,
    regexps: FxHashMap<String, ValueId>,
    arrays: Vec<ValueId>,
    builtin_functions: Vec<ValueId>,
    builtin_handlers: Vec<ValueId>,
    handler_refs: FxHashMap<u32, ValueId>,

    unnamed_counter: u64,
}

impl Default for IrProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl IrProgram {
    pub fn new() -> Self {
        let mut program = Self {
            values: Vec::new(),
            handlers: Vec::new(),
            modules: Vec::new(),
            true_literal: ValueId(0),
            false_literal: ValueId(0),
            numbers: FxHashMap::default(),
            strings: FxHashMap::default(),
            ipaddrs: FxHashMap::default(),
            cidrs: FxHashMap::default(),
            regexps: FxHashMap::default(),
            arrays: Vec::new(),
            builtin_functions: Vec::new(),
            builtin_handlers: Vec::new(),
            handler_refs: FxHashMap::default(),
            unnamed_counter: 0,
        };
        program.true_literal = program.new_value(
            LiteralType::Boolean,
            "true".to_string(),
            ValueKind::ConstBoolean(true),
        );
        program.false_literal = program.new_value(
            LiteralType::Boolean,
            "false".to_string(),
            ValueKind::ConstBoolean(false),
        );
        program
    }

    // ----- arena access -----

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    fn value_mut(&mut self, id: ValueId) -> &mut ValueData {
        &mut self.values[id.index()]
    }

    pub fn ty(&self, id: ValueId) -> LiteralType {
        self.value(id).ty
    }

    pub fn name(&self, id: ValueId) -> &str {
        &self.value(id).name
    }

    pub fn set_name(&mut self, id: ValueId, name: impl Into<String>) {
        self.value_mut(id).name = name.into();
    }

    /// Instruction payload of `id`; panics if `id` is not an instruction.
    pub fn instr(&self, id: ValueId) -> &InstrData {
        match &self.value(id).kind {
            ValueKind::Instr(data) => data,
            other => panic!("value {id} is not an instruction: {other:?}"),
        }
    }

    pub(crate) fn instr_mut(&mut self, id: ValueId) -> &mut InstrData {
        match &mut self.values[id.index()].kind {
            ValueKind::Instr(data) => data,
            other => panic!("value {id} is not an instruction: {other:?}"),
        }
    }

    /// Block payload of `id`; panics if `id` is not a block.
    pub fn block(&self, id: ValueId) -> &BlockData {
        match &self.value(id).kind {
            ValueKind::Block(data) => data,
            other => panic!("value {id} is not a block: {other:?}"),
        }
    }

    pub(crate) fn block_mut(&mut self, id: ValueId) -> &mut BlockData {
        match &mut self.values[id.index()].kind {
            ValueKind::Block(data) => data,
            other => panic!("value {id} is not a block: {other:?}"),
        }
    }

    pub(crate) fn new_value(
        &mut self,
        ty: LiteralType,
        name: String,
        kind: ValueKind,
    ) -> ValueId {
        let name = if name.is_empty() {
            self.unnamed_counter += 1;
            format!("unnamed{}", self.unnamed_counter)
        } else {
            name
        };
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData {
            ty,
            name,
            uses: Vec::new(),
            kind,
        });
        id
    }

    // ----- use-def maintenance -----

    fn add_use(&mut self, value: ValueId, user: ValueId) {
        self.value_mut(value).uses.push(user);
    }

    fn remove_use(&mut self, value: ValueId, user: ValueId) {
        let uses = &mut self.value_mut(value).uses;
        match uses.iter().position(|&u| u == user) {
            Some(at) => {
                uses.remove(at);
            }
            None => panic!(
                "use-def inconsistency: {user} is not registered as a user of {value}"
            ),
        }
    }

    /// Sets operand `index` of `instr` and keeps use-lists and CFG edges in
    /// sync. Returns the previous operand.
    pub fn set_operand(
        &mut self,
        instr: ValueId,
        index: usize,
        new: Option<ValueId>,
    ) -> Option<ValueId> {
        let (old, parent) = {
            let data = self.instr(instr);
            (data.operands[index], data.block)
        };

        if old == new {
            if old.is_some() {
                panic!("cannot set operand {index} of {instr} to itself");
            }
            return old;
        }

        self.instr_mut(instr).operands[index] = new;

        if let Some(old_id) = old {
            self.remove_use(old_id, instr);
            if self.value(old_id).is_block() {
                if let Some(parent) = parent {
                    self.unlink_successor(parent, old_id);
                }
            }
        }

        if let Some(new_id) = new {
            self.add_use(new_id, instr);
            if self.value(new_id).is_block() {
                if let Some(parent) = parent {
                    self.link_successor(parent, new_id);
                }
            }
        }

        old
    }

    /// Appends an operand to `instr`.
    pub fn add_operand(&mut self, instr: ValueId, value: ValueId) {
        let parent = self.instr(instr).block;
        self.instr_mut(instr).operands.push(Some(value));
        self.add_use(value, instr);
        if self.value(value).is_block() {
            if let Some(parent) = parent {
                self.link_successor(parent, value);
            }
        }
    }

    /// Replaces every occurrence of `old` in the operand list of `instr`.
    /// Returns the number of replacements performed.
    pub fn replace_operand(&mut self, instr: ValueId, old: ValueId, new: ValueId) -> usize {
        assert!(old != new, "cannot replace operand with itself");
        let mut count = 0;
        for index in 0..self.instr(instr).operands.len() {
            if self.instr(instr).operands[index] == Some(old) {
                self.set_operand(instr, index, Some(new));
                count += 1;
            }
        }
        count
    }

    /// Empties every operand slot of `instr`, releasing uses and CFG edges.
    pub fn clear_operands(&mut self, instr: ValueId) {
        for index in 0..self.instr(instr).operands.len() {
            self.set_operand(instr, index, None);
        }
        self.instr_mut(instr).operands.clear();
    }

    /// Redirects every use of `old` to `new`. Afterwards `old` has a use
    /// count of zero.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        let users = self.value(old).uses.clone();
        for user in users {
            // a user may appear multiple times; later iterations find
            // nothing left to replace and are no-ops
            if self.instr(user).operands.contains(&Some(old)) {
                self.replace_operand(user, old, new);
            }
        }
    }

    /// Creates a detached instruction value.
    pub fn new_instr(
        &mut self,
        ty: LiteralType,
        op: InstrOp,
        operands: Vec<ValueId>,
        name: String,
    ) -> ValueId {
        let id = self.new_value(
            ty,
            name,
            ValueKind::Instr(InstrData {
                op,
                block: None,
                operands: operands.iter().copied().map(Some).collect(),
            }),
        );
        for operand in operands {
            self.add_use(operand, id);
        }
        id
    }

    /// Creates a detached instruction with possibly-empty operand slots
    /// (used by `match`, whose else block is attached later).
    pub(crate) fn new_instr_with_slots(
        &mut self,
        ty: LiteralType,
        op: InstrOp,
        operands: Vec<Option<ValueId>>,
        name: String,
    ) -> ValueId {
        let id = self.new_value(
            ty,
            name,
            ValueKind::Instr(InstrData {
                op,
                block: None,
                operands: operands.clone(),
            }),
        );
        for operand in operands.into_iter().flatten() {
            self.add_use(operand, id);
        }
        id
    }

    /// Clones an instruction. The copy shares the operand references (no
    /// deep copy), gets a fresh name, and belongs to no block.
    pub fn clone_instr(&mut self, instr: ValueId) -> ValueId {
        let data = self.instr(instr);
        let op = data.op();
        let operands = data.operands().to_vec();
        let ty = self.ty(instr);
        self.unnamed_counter += 1;
        let name = format!("{}_{}", self.name(instr), self.unnamed_counter);
        self.new_instr_with_slots(ty, op, operands, name)
    }

    /// Destroys a detached, unused instruction.
    pub fn destroy_instr(&mut self, instr: ValueId) {
        assert!(
            self.instr(instr).block.is_none(),
            "cannot destroy an instruction that is still inside a block"
        );
        self.clear_operands(instr);
        let data = self.value(instr);
        assert!(
            !data.is_used(),
            "value {} being destroyed is still in use",
            data.name
        );
        self.value_mut(instr).kind = ValueKind::Removed;
    }

    pub(crate) fn destroy_value(&mut self, id: ValueId) {
        let data = self.value(id);
        assert!(
            !data.is_used(),
            "value {} being destroyed is still in use",
            data.name
        );
        self.value_mut(id).kind = ValueKind::Removed;
    }

    // ----- CFG edges -----

    pub(crate) fn link_successor(&mut self, pred: ValueId, succ: ValueId) {
        self.block_mut(pred).successors.push(succ);
        self.block_mut(succ).predecessors.push(pred);
    }

    pub(crate) fn unlink_successor(&mut self, pred: ValueId, succ: ValueId) {
        let preds = &mut self.block_mut(succ).predecessors;
        let at = preds
            .iter()
            .position(|&p| p == pred)
            .unwrap_or_else(|| panic!("{pred} is not a predecessor of {succ}"));
        preds.remove(at);

        let succs = &mut self.block_mut(pred).successors;
        let at = succs
            .iter()
            .position(|&s| s == succ)
            .unwrap_or_else(|| panic!("{succ} is not a successor of {pred}"));
        succs.remove(at);
    }

    // ----- constant interning -----

    pub fn get_boolean(&mut self, literal: bool) -> ValueId {
        if literal {
            self.true_literal
        } else {
            self.false_literal
        }
    }

    pub fn get_int(&mut self, literal: i64) -> ValueId {
        if let Some(&id) = self.numbers.get(&literal) {
            return id;
        }
        let id = self.new_value(
            LiteralType::Number,
            String::new(),
            ValueKind::ConstInt(literal),
        );
        self.numbers.insert(literal, id);
        id
    }

    pub fn get_string(&mut self, literal: &str) -> ValueId {
        if let Some(&id) = self.strings.get(literal) {
            return id;
        }
        let id = self.new_value(
            LiteralType::String,
            String::new(),
            ValueKind::ConstString(literal.to_string()),
        );
        self.strings.insert(literal.to_string(), id);
        id
    }

    pub fn get_ip(&mut self, literal: IpAddr) -> ValueId {
        if let Some(&id) = self.ipaddrs.get(&literal) {
            return id;
        }
        let id = self.new_value(
            LiteralType::IpAddress,
            String::new(),
            ValueKind::ConstIp(literal),
        );
        self.ipaddrs.insert(literal, id);
        id
    }

    pub fn get_cidr(&mut self, literal: Cidr) -> ValueId {
        if let Some(&id) = self.cidrs.get(&literal) {
            return id;
        }
        let id = self.new_value(
            LiteralType::Cidr,
            String::new(),
            ValueKind::ConstCidr(literal.clone()),
        );
        self.cidrs.insert(literal, id);
        id
    }

    pub fn get_regexp(&mut self, literal: RegExp) -> ValueId {
        if let Some(&id) = self.regexps.get(literal.pattern()) {
            return id;
        }
        let pattern = literal.pattern().to_string();
        let id = self.new_value(
            LiteralType::RegExp,
            String::new(),
            ValueKind::ConstRegExp(literal),
        );
        self.regexps.insert(pattern, id);
        id
    }

    /// Interns a constant array of already-interned constant elements.
    pub fn get_array(&mut self, elements: Vec<ValueId>) -> ValueId {
        assert!(
            !elements.is_empty(),
            "constant arrays must have at least one element"
        );
        for &id in &self.arrays {
            if let ValueKind::ConstArray(existing) = &self.value(id).kind {
                if *existing == elements {
                    return id;
                }
            }
        }
        let element_ty = self.ty(elements[0]);
        let array_ty = match element_ty {
            LiteralType::Number => LiteralType::IntArray,
            LiteralType::String => LiteralType::StringArray,
            LiteralType::IpAddress => LiteralType::IpAddrArray,
            LiteralType::Cidr => LiteralType::CidrArray,
            other => panic!("unsupported constant array element type {other}"),
        };
        let id = self.new_value(array_ty, String::new(), ValueKind::ConstArray(elements));
        self.arrays.push(id);
        id
    }

    // ----- builtin references -----

    /// Finds or creates the builtin-function reference with this signature.
    pub fn builtin_function(&mut self, signature: Signature, attrs: AttributeSet) -> ValueId {
        for &id in &self.builtin_functions {
            if let ValueKind::BuiltinFunction(existing, _) = &self.value(id).kind {
                if *existing == signature {
                    return id;
                }
            }
        }
        let ty = signature.return_type();
        let name = signature.name().to_string();
        let id = self.new_value(ty, name, ValueKind::BuiltinFunction(signature, attrs));
        self.builtin_functions.push(id);
        id
    }

    /// Finds or creates the builtin-handler reference with this signature.
    pub fn builtin_handler(&mut self, signature: Signature, attrs: AttributeSet) -> ValueId {
        for &id in &self.builtin_handlers {
            if let ValueKind::BuiltinHandler(existing, _) = &self.value(id).kind {
                if *existing == signature {
                    return id;
                }
            }
        }
        let name = signature.name().to_string();
        let id = self.new_value(
            LiteralType::Boolean,
            name,
            ValueKind::BuiltinHandler(signature, attrs),
        );
        self.builtin_handlers.push(id);
        id
    }

    pub fn find_builtin_handler(&self, signature: &Signature) -> Option<ValueId> {
        self.builtin_handlers
            .iter()
            .copied()
            .find(|&id| match &self.value(id).kind {
                ValueKind::BuiltinHandler(existing, _) => existing == signature,
                _ => false,
            })
    }

    /// Interned symbolic reference to one of this program's handlers.
    pub fn handler_ref(&mut self, handler: HandlerId) -> ValueId {
        if let Some(&id) = self.handler_refs.get(&handler.0) {
            return id;
        }
        let name = self.handlers[handler.index()].name.clone();
        let id = self.new_value(LiteralType::Handler, name, ValueKind::HandlerRef(handler));
        self.handler_refs.insert(handler.0, id);
        id
    }

    // ----- imports -----

    pub fn add_import(&mut self, name: impl Into<String>, path: impl Into<String>) {
        self.modules.push((name.into(), path.into()));
    }

    pub fn modules(&self) -> &[(String, String)] {
        &self.modules
    }

    // ----- iteration support -----

    /// Ids of all instructions of all handlers, in layout order.
    pub fn all_instrs(&self) -> Vec<ValueId> {
        let mut out = Vec::new();
        for handler in &self.handlers {
            for &block in &handler.blocks {
                out.extend_from_slice(&self.block(block).instrs);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::InstrOp;

    #[test]
    fn test_constant_interning() {
        let mut program = IrProgram::new();
        assert_eq!(program.get_int(42), program.get_int(42));
        assert_ne!(program.get_int(42), program.get_int(7));
        assert_eq!(program.get_string("foo"), program.get_string("foo"));
        assert_eq!(program.get_boolean(true), program.get_boolean(true));
        assert_ne!(program.get_boolean(true), program.get_boolean(false));
    }

    #[test]
    fn test_array_interning() {
        let mut program = IrProgram::new();
        let a = program.get_int(1);
        let b = program.get_int(2);
        let first = program.get_array(vec![a, b]);
        let second = program.get_array(vec![a, b]);
        assert_eq!(first, second);
        assert_eq!(program.ty(first), LiteralType::IntArray);
    }

    #[test]
    fn test_use_def_bookkeeping() {
        let mut program = IrProgram::new();
        let lhs = program.get_int(1);
        let rhs = program.get_int(2);
        let add = program.new_instr(
            LiteralType::Number,
            InstrOp::Binary(crate::instr::BinaryOperator::IAdd),
            vec![lhs, rhs],
            "sum".to_string(),
        );
        assert_eq!(program.value(lhs).use_count(), 1);
        assert_eq!(program.value(rhs).use_count(), 1);

        let other = program.get_int(3);
        program.replace_operand(add, lhs, other);
        assert_eq!(program.value(lhs).use_count(), 0);
        assert_eq!(program.value(other).use_count(), 1);

        program.destroy_instr(add);
        assert_eq!(program.value(rhs).use_count(), 0);
        assert_eq!(program.value(other).use_count(), 0);
    }

    #[test]
    fn test_replace_all_uses_with() {
        let mut program = IrProgram::new();
        let old = program.get_int(1);
        let rhs = program.get_int(2);
        let first = program.new_instr(
            LiteralType::Number,
            InstrOp::Binary(crate::instr::BinaryOperator::IAdd),
            vec![old, rhs],
            String::new(),
        );
        let second = program.new_instr(
            LiteralType::Number,
            InstrOp::Binary(crate::instr::BinaryOperator::IMul),
            vec![old, old],
            String::new(),
        );
        assert_eq!(program.value(old).use_count(), 3);

        let new = program.get_int(9);
        program.replace_all_uses_with(old, new);
        assert_eq!(program.value(old).use_count(), 0);
        assert_eq!(program.value(new).use_count(), 3);
        assert_eq!(program.instr(first).operand(0), new);
        assert_eq!(program.instr(second).operand(0), new);
        assert_eq!(program.instr(second).operand(1), new);
    }

    #[test]
    fn test_builtin_interning_by_signature() {
        let mut program = IrProgram::new();
        let sig: Signature = "pure_len(S)I".parse().unwrap();
        let first = program.builtin_function(sig.clone(), AttributeSet::empty());
        let second = program.builtin_function(sig, AttributeSet::empty());
        assert_eq!(first, second);
        assert_eq!(program.ty(first), LiteralType::Number);
    }
}
