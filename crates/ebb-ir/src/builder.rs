//! IR builder
//!
//! The typed factory for IR construction. Every constructor folds constant
//! operands at construction time, returning an interned constant instead of
//! emitting an instruction; only the control-flow constructors never fold.

use crate::instr::{BinaryOperator, InstrOp, UnaryOperator};
use crate::program::IrProgram;
use crate::value::{HandlerId, ValueId, ValueKind};
use ebb_core::num::{ipow, parse_number_prefix};
use ebb_core::{AttributeSet, Cidr, LiteralType, MatchClass, RegExp, Signature};
use rustc_hash::FxHashMap;
use std::net::IpAddr;

/// Builds IR into an owned [`IrProgram`].
#[derive(Debug, Default)]
pub struct IrBuilder {
    program: IrProgram,
    handler: Option<HandlerId>,
    insert_point: Option<ValueId>,
    name_store: FxHashMap<String, u64>,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            program: IrProgram::new(),
            handler: None,
            insert_point: None,
            name_store: FxHashMap::default(),
        }
    }

    pub fn with_program(program: IrProgram) -> Self {
        Self {
            program,
            handler: None,
            insert_point: None,
            name_store: FxHashMap::default(),
        }
    }

    pub fn program(&self) -> &IrProgram {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut IrProgram {
        &mut self.program
    }

    pub fn into_program(self) -> IrProgram {
        self.program
    }

    // ----- name management -----

    /// Makes a program-unique value name by appending a counter to repeated
    /// base names.
    pub fn make_name(&mut self, name: &str) -> String {
        let base = if name.is_empty() { "tmp" } else { name };
        match self.name_store.get_mut(base) {
            None => {
                self.name_store.insert(base.to_string(), 0);
                base.to_string()
            }
            Some(count) => {
                *count += 1;
                format!("{base}{count}")
            }
        }
    }

    // ----- context management -----

    pub fn set_handler(&mut self, handler: HandlerId) -> HandlerId {
        self.handler = Some(handler);
        self.insert_point = None;
        handler
    }

    pub fn handler(&self) -> Option<HandlerId> {
        self.handler
    }

    /// Finds or creates the named handler.
    pub fn get_handler(&mut self, name: &str) -> HandlerId {
        match self.program.find_handler(name) {
            Some(handler) => handler,
            None => self.program.create_handler(name),
        }
    }

    pub fn find_handler(&self, name: &str) -> Option<HandlerId> {
        self.program.find_handler(name)
    }

    /// Creates a block in the current handler.
    pub fn create_block(&mut self, name: &str) -> ValueId {
        let handler = self.handler.expect("no current handler");
        let name = self.make_name(name);
        self.program.create_block(handler, name)
    }

    pub fn set_insert_point(&mut self, block: ValueId) {
        assert_eq!(
            self.program.block(block).handler(),
            self.handler.expect("no current handler"),
            "insert point must belong to the current handler"
        );
        self.insert_point = Some(block);
    }

    pub fn insert_point(&self) -> Option<ValueId> {
        self.insert_point
    }

    fn insert(
        &mut self,
        ty: LiteralType,
        op: InstrOp,
        operands: Vec<ValueId>,
        name: &str,
    ) -> ValueId {
        let block = self.insert_point.expect("no insertion point");
        let name = self.make_name(name);
        let instr = self.program.new_instr(ty, op, operands, name);
        self.program.push_instr(block, instr)
    }

    // ----- literals -----

    pub fn get_boolean(&mut self, literal: bool) -> ValueId {
        self.program.get_boolean(literal)
    }

    pub fn get_int(&mut self, literal: i64) -> ValueId {
        self.program.get_int(literal)
    }

    pub fn get_string(&mut self, literal: &str) -> ValueId {
        self.program.get_string(literal)
    }

    pub fn get_ip(&mut self, literal: IpAddr) -> ValueId {
        self.program.get_ip(literal)
    }

    pub fn get_cidr(&mut self, literal: Cidr) -> ValueId {
        self.program.get_cidr(literal)
    }

    pub fn get_regexp(&mut self, literal: RegExp) -> ValueId {
        self.program.get_regexp(literal)
    }

    pub fn get_array(&mut self, elements: Vec<ValueId>) -> ValueId {
        self.program.get_array(elements)
    }

    pub fn get_builtin_function(&mut self, signature: Signature, attrs: AttributeSet) -> ValueId {
        self.program.builtin_function(signature, attrs)
    }

    pub fn get_builtin_handler(&mut self, signature: Signature, attrs: AttributeSet) -> ValueId {
        self.program.builtin_handler(signature, attrs)
    }

    // ----- fold helpers -----

    fn const_int(&self, id: ValueId) -> Option<i64> {
        self.program.value(id).as_const_int()
    }

    fn const_ints(&self, lhs: ValueId, rhs: ValueId) -> Option<(i64, i64)> {
        Some((self.const_int(lhs)?, self.const_int(rhs)?))
    }

    fn const_bools(&self, lhs: ValueId, rhs: ValueId) -> Option<(bool, bool)> {
        Some((
            self.program.value(lhs).as_const_bool()?,
            self.program.value(rhs).as_const_bool()?,
        ))
    }

    fn const_strs(&self, lhs: ValueId, rhs: ValueId) -> Option<(&str, &str)> {
        Some((
            self.program.value(lhs).as_const_str()?,
            self.program.value(rhs).as_const_str()?,
        ))
    }

    // ----- storage -----

    /// Allocates storage; a `size` of one (or `None`) yields a scalar slot,
    /// larger constant sizes yield the matching array type.
    pub fn create_alloca(
        &mut self,
        element_ty: LiteralType,
        size: Option<ValueId>,
        name: &str,
    ) -> ValueId {
        let size = size.unwrap_or_else(|| self.get_int(1));
        let ty = match self.const_int(size) {
            Some(1) => element_ty,
            _ => match element_ty {
                LiteralType::Number => LiteralType::IntArray,
                LiteralType::String => LiteralType::StringArray,
                _ => LiteralType::Void,
            },
        };
        self.insert(ty, InstrOp::Alloca, vec![size], name)
    }

    /// Loads a variable; constants are returned as-is.
    pub fn create_load(&mut self, value: ValueId, name: &str) -> ValueId {
        if self.program.value(value).is_constant() {
            return value;
        }
        let ty = self.program.ty(value);
        self.insert(ty, InstrOp::Load, vec![value], name)
    }

    pub fn create_store(&mut self, variable: ValueId, source: ValueId, name: &str) -> ValueId {
        let index = self.get_int(0);
        self.create_store_indexed(variable, index, source, name)
    }

    pub fn create_store_indexed(
        &mut self,
        variable: ValueId,
        index: ValueId,
        source: ValueId,
        name: &str,
    ) -> ValueId {
        assert!(
            matches!(self.program.instr(variable).op(), InstrOp::Alloca),
            "store destination must be an alloca"
        );
        self.insert(
            LiteralType::Void,
            InstrOp::Store,
            vec![variable, index, source],
            name,
        )
    }

    pub fn create_phi(&mut self, incomings: Vec<ValueId>, name: &str) -> ValueId {
        let ty = self.program.ty(incomings[0]);
        self.insert(ty, InstrOp::Phi, incomings, name)
    }

    // ----- boolean ops -----

    pub fn create_bnot(&mut self, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::Boolean);
        if let Some(a) = self.program.value(rhs).as_const_bool() {
            return self.get_boolean(!a);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Unary(UnaryOperator::BNot),
            vec![rhs],
            name,
        )
    }

    pub fn create_band(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::Boolean);
        if let Some((a, b)) = self.const_bools(lhs, rhs) {
            return self.get_boolean(a && b);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(BinaryOperator::BAnd),
            vec![lhs, rhs],
            name,
        )
    }

    pub fn create_bor(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::Boolean);
        if let Some((a, b)) = self.const_bools(lhs, rhs) {
            return self.get_boolean(a || b);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(BinaryOperator::BOr),
            vec![lhs, rhs],
            name,
        )
    }

    pub fn create_bxor(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::Boolean);
        if let Some((a, b)) = self.const_bools(lhs, rhs) {
            return self.get_boolean(a ^ b);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(BinaryOperator::BXor),
            vec![lhs, rhs],
            name,
        )
    }

    // ----- numerical ops -----

    fn numeric_binary(
        &mut self,
        op: BinaryOperator,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
        fold: impl Fn(i64, i64) -> i64,
    ) -> ValueId {
        assert_eq!(self.program.ty(lhs), self.program.ty(rhs));
        assert_eq!(self.program.ty(lhs), LiteralType::Number);
        if let Some((a, b)) = self.const_ints(lhs, rhs) {
            let value = fold(a, b);
            return self.get_int(value);
        }
        self.insert(LiteralType::Number, InstrOp::Binary(op), vec![lhs, rhs], name)
    }

    fn numeric_compare(
        &mut self,
        op: BinaryOperator,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
        fold: impl Fn(i64, i64) -> bool,
    ) -> ValueId {
        assert_eq!(self.program.ty(lhs), self.program.ty(rhs));
        assert_eq!(self.program.ty(lhs), LiteralType::Number);
        if let Some((a, b)) = self.const_ints(lhs, rhs) {
            let value = fold(a, b);
            return self.get_boolean(value);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(op),
            vec![lhs, rhs],
            name,
        )
    }

    pub fn create_neg(&mut self, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::Number);
        if let Some(a) = self.const_int(rhs) {
            return self.get_int(a.wrapping_neg());
        }
        self.insert(
            LiteralType::Number,
            InstrOp::Unary(UnaryOperator::INeg),
            vec![rhs],
            name,
        )
    }

    pub fn create_not(&mut self, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::Number);
        if let Some(a) = self.const_int(rhs) {
            return self.get_int(!a);
        }
        self.insert(
            LiteralType::Number,
            InstrOp::Unary(UnaryOperator::INot),
            vec![rhs],
            name,
        )
    }

    pub fn create_add(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IAdd, lhs, rhs, name, i64::wrapping_add)
    }

    pub fn create_sub(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::ISub, lhs, rhs, name, i64::wrapping_sub)
    }

    pub fn create_mul(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IMul, lhs, rhs, name, i64::wrapping_mul)
    }

    /// Division by a constant zero is not intercepted; it surfaces as a
    /// runtime panic, the same exception the NDIV opcode raises.
    pub fn create_div(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IDiv, lhs, rhs, name, |a, b| a / b)
    }

    pub fn create_rem(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IRem, lhs, rhs, name, |a, b| a % b)
    }

    pub fn create_shl(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IShl, lhs, rhs, name, |a, b| {
            a.wrapping_shl(b as u32)
        })
    }

    pub fn create_shr(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IShr, lhs, rhs, name, |a, b| {
            a.wrapping_shr(b as u32)
        })
    }

    pub fn create_pow(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IPow, lhs, rhs, name, ipow)
    }

    pub fn create_and(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IAnd, lhs, rhs, name, |a, b| a & b)
    }

    pub fn create_or(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IOr, lhs, rhs, name, |a, b| a | b)
    }

    pub fn create_xor(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_binary(BinaryOperator::IXor, lhs, rhs, name, |a, b| a ^ b)
    }

    pub fn create_ncmp_eq(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_compare(BinaryOperator::ICmpEq, lhs, rhs, name, |a, b| a == b)
    }

    pub fn create_ncmp_ne(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_compare(BinaryOperator::ICmpNe, lhs, rhs, name, |a, b| a != b)
    }

    pub fn create_ncmp_le(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_compare(BinaryOperator::ICmpLe, lhs, rhs, name, |a, b| a <= b)
    }

    pub fn create_ncmp_ge(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_compare(BinaryOperator::ICmpGe, lhs, rhs, name, |a, b| a >= b)
    }

    pub fn create_ncmp_lt(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_compare(BinaryOperator::ICmpLt, lhs, rhs, name, |a, b| a < b)
    }

    pub fn create_ncmp_gt(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.numeric_compare(BinaryOperator::ICmpGt, lhs, rhs, name, |a, b| a > b)
    }

    // ----- string ops -----

    pub fn create_sadd(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(lhs), self.program.ty(rhs));
        assert_eq!(self.program.ty(lhs), LiteralType::String);
        if let Some((a, b)) = self.const_strs(lhs, rhs) {
            let folded = format!("{a}{b}");
            return self.get_string(&folded);
        }
        // an empty constant on either side folds to the other side
        if self.program.value(lhs).as_const_str() == Some("") {
            return rhs;
        }
        if self.program.value(rhs).as_const_str() == Some("") {
            return lhs;
        }
        self.insert(
            LiteralType::String,
            InstrOp::Binary(BinaryOperator::SAdd),
            vec![lhs, rhs],
            name,
        )
    }

    pub fn create_ssubstr(
        &mut self,
        subject: ValueId,
        offset: ValueId,
        length: ValueId,
        name: &str,
    ) -> ValueId {
        assert_eq!(self.program.ty(subject), LiteralType::String);
        self.insert(
            LiteralType::String,
            InstrOp::SSubStr,
            vec![subject, offset, length],
            name,
        )
    }

    fn string_compare(
        &mut self,
        op: BinaryOperator,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
        fold: impl Fn(&str, &str) -> bool,
    ) -> ValueId {
        assert_eq!(self.program.ty(lhs), self.program.ty(rhs));
        assert_eq!(self.program.ty(lhs), LiteralType::String);
        if let Some((a, b)) = self.const_strs(lhs, rhs) {
            let value = fold(a, b);
            return self.get_boolean(value);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(op),
            vec![lhs, rhs],
            name,
        )
    }

    pub fn create_scmp_eq(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.string_compare(BinaryOperator::SCmpEq, lhs, rhs, name, |a, b| a == b)
    }

    pub fn create_scmp_ne(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.string_compare(BinaryOperator::SCmpNe, lhs, rhs, name, |a, b| a != b)
    }

    pub fn create_scmp_le(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.string_compare(BinaryOperator::SCmpLe, lhs, rhs, name, |a, b| a <= b)
    }

    pub fn create_scmp_ge(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.string_compare(BinaryOperator::SCmpGe, lhs, rhs, name, |a, b| a >= b)
    }

    pub fn create_scmp_lt(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.string_compare(BinaryOperator::SCmpLt, lhs, rhs, name, |a, b| a < b)
    }

    pub fn create_scmp_gt(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.string_compare(BinaryOperator::SCmpGt, lhs, rhs, name, |a, b| a > b)
    }

    /// String-against-regexp comparison. Never folded: a successful match
    /// stores capture groups into the runner's regex context.
    pub fn create_scmp_re(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(lhs), LiteralType::String);
        assert_eq!(self.program.ty(rhs), LiteralType::RegExp);
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(BinaryOperator::SCmpRe),
            vec![lhs, rhs],
            name,
        )
    }

    pub fn create_scmp_begins(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.string_compare(BinaryOperator::SCmpBeg, lhs, rhs, name, |a, b| {
            a.starts_with(b)
        })
    }

    pub fn create_scmp_ends(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.string_compare(BinaryOperator::SCmpEnd, lhs, rhs, name, |a, b| {
            a.ends_with(b)
        })
    }

    /// Substring containment: is `needle` contained in `haystack`?
    pub fn create_sin(&mut self, needle: ValueId, haystack: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(needle), LiteralType::String);
        assert_eq!(self.program.ty(haystack), LiteralType::String);
        if let Some((a, b)) = self.const_strs(needle, haystack) {
            let value = b.contains(a);
            return self.get_boolean(value);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(BinaryOperator::SIn),
            vec![needle, haystack],
            name,
        )
    }

    pub fn create_slen(&mut self, value: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(value), LiteralType::String);
        if let Some(a) = self.program.value(value).as_const_str() {
            let len = a.len() as i64;
            return self.get_int(len);
        }
        self.insert(
            LiteralType::Number,
            InstrOp::Unary(UnaryOperator::SLen),
            vec![value],
            name,
        )
    }

    pub fn create_sis_empty(&mut self, value: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(value), LiteralType::String);
        if let Some(a) = self.program.value(value).as_const_str() {
            let empty = a.is_empty();
            return self.get_boolean(empty);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Unary(UnaryOperator::SIsEmpty),
            vec![value],
            name,
        )
    }

    // ----- IP ops -----

    fn const_ips(&self, lhs: ValueId, rhs: ValueId) -> Option<(IpAddr, IpAddr)> {
        match (self.program.value(lhs).kind(), self.program.value(rhs).kind()) {
            (ValueKind::ConstIp(a), ValueKind::ConstIp(b)) => Some((*a, *b)),
            _ => None,
        }
    }

    pub fn create_pcmp_eq(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        if let Some((a, b)) = self.const_ips(lhs, rhs) {
            return self.get_boolean(a == b);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(BinaryOperator::PCmpEq),
            vec![lhs, rhs],
            name,
        )
    }

    pub fn create_pcmp_ne(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        if let Some((a, b)) = self.const_ips(lhs, rhs) {
            return self.get_boolean(a != b);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(BinaryOperator::PCmpNe),
            vec![lhs, rhs],
            name,
        )
    }

    pub fn create_p_in_cidr(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        let folded = match (self.program.value(lhs).kind(), self.program.value(rhs).kind()) {
            (ValueKind::ConstIp(ip), ValueKind::ConstCidr(cidr)) => Some(cidr.contains(ip)),
            _ => None,
        };
        if let Some(value) = folded {
            return self.get_boolean(value);
        }
        self.insert(
            LiteralType::Boolean,
            InstrOp::Binary(BinaryOperator::PInCidr),
            vec![lhs, rhs],
            name,
        )
    }

    // ----- regexp -----

    pub fn create_regexp_group(&mut self, group_id: ValueId, name: &str) -> ValueId {
        assert!(self.const_int(group_id).is_some(), "group id must be a constant");
        self.insert(LiteralType::String, InstrOp::RegExpGroup, vec![group_id], name)
    }

    // ----- casts -----

    /// Generic cast dispatch; same-type casts degrade to a load.
    pub fn create_convert(&mut self, ty: LiteralType, rhs: ValueId, name: &str) -> ValueId {
        if self.program.ty(rhs) == ty {
            return self.create_load(rhs, name);
        }
        match (ty, self.program.ty(rhs)) {
            (LiteralType::String, LiteralType::Boolean) => self.create_b2s(rhs, name),
            (LiteralType::String, LiteralType::Number) => self.create_n2s(rhs, name),
            (LiteralType::String, LiteralType::IpAddress) => self.create_p2s(rhs, name),
            (LiteralType::String, LiteralType::Cidr) => self.create_c2s(rhs, name),
            (LiteralType::String, LiteralType::RegExp) => self.create_r2s(rhs, name),
            (LiteralType::Number, LiteralType::String) => self.create_s2n(rhs, name),
            (to, from) => panic!("unsupported cast from {from} to {to}"),
        }
    }

    pub fn create_b2s(&mut self, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::Boolean);
        if let Some(a) = self.program.value(rhs).as_const_bool() {
            return self.get_string(if a { "true" } else { "false" });
        }
        self.insert(LiteralType::String, InstrOp::Cast, vec![rhs], name)
    }

    pub fn create_n2s(&mut self, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::Number);
        if let Some(a) = self.const_int(rhs) {
            let text = a.to_string();
            return self.get_string(&text);
        }
        self.insert(LiteralType::String, InstrOp::Cast, vec![rhs], name)
    }

    pub fn create_p2s(&mut self, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::IpAddress);
        if let ValueKind::ConstIp(ip) = self.program.value(rhs).kind() {
            let text = ip.to_string();
            return self.get_string(&text);
        }
        self.insert(LiteralType::String, InstrOp::Cast, vec![rhs], name)
    }

    pub fn create_c2s(&mut self, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::Cidr);
        if let ValueKind::ConstCidr(cidr) = self.program.value(rhs).kind() {
            let text = cidr.to_string();
            return self.get_string(&text);
        }
        self.insert(LiteralType::String, InstrOp::Cast, vec![rhs], name)
    }

    pub fn create_r2s(&mut self, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::RegExp);
        if let ValueKind::ConstRegExp(re) = self.program.value(rhs).kind() {
            let text = re.pattern().to_string();
            return self.get_string(&text);
        }
        self.insert(LiteralType::String, InstrOp::Cast, vec![rhs], name)
    }

    /// String-to-number cast; an unparseable constant falls back to the
    /// runtime cast instruction.
    pub fn create_s2n(&mut self, rhs: ValueId, name: &str) -> ValueId {
        assert_eq!(self.program.ty(rhs), LiteralType::String);
        if let Some(text) = self.program.value(rhs).as_const_str() {
            if let Some(value) = parse_number_prefix(text) {
                return self.get_int(value);
            }
        }
        self.insert(LiteralType::Number, InstrOp::Cast, vec![rhs], name)
    }

    // ----- calls -----

    pub fn create_call_function(
        &mut self,
        callee: ValueId,
        args: Vec<ValueId>,
        name: &str,
    ) -> ValueId {
        let ty = match self.program.value(callee).kind() {
            ValueKind::BuiltinFunction(signature, _) => signature.return_type(),
            other => panic!("call callee must be a builtin function, got {other:?}"),
        };
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend(args);
        self.insert(ty, InstrOp::Call, operands, name)
    }

    pub fn create_invoke_handler(&mut self, callee: ValueId, args: Vec<ValueId>) -> ValueId {
        assert!(
            matches!(
                self.program.value(callee).kind(),
                ValueKind::BuiltinHandler(..)
            ),
            "invoke callee must be a builtin handler"
        );
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend(args);
        self.insert(LiteralType::Void, InstrOp::HandlerCall, operands, "")
    }

    // ----- terminators (never folded) -----

    pub fn create_ret(&mut self, result: ValueId) -> ValueId {
        self.insert(LiteralType::Void, InstrOp::Ret, vec![result], "")
    }

    pub fn create_br(&mut self, target: ValueId) -> ValueId {
        self.insert(LiteralType::Void, InstrOp::Br, vec![target], "")
    }

    pub fn create_cond_br(
        &mut self,
        condition: ValueId,
        true_block: ValueId,
        false_block: ValueId,
    ) -> ValueId {
        self.insert(
            LiteralType::Void,
            InstrOp::CondBr,
            vec![condition, true_block, false_block],
            "",
        )
    }

    /// Creates a `match` terminator with no cases and no else block yet.
    pub fn create_match(&mut self, class: MatchClass, condition: ValueId) -> ValueId {
        let block = self.insert_point.expect("no insertion point");
        let name = self.make_name("");
        let instr = self.program.new_instr_with_slots(
            LiteralType::Void,
            InstrOp::Match(class),
            vec![Some(condition), None],
            name,
        );
        self.program.push_instr(block, instr)
    }

    pub fn create_match_same(&mut self, condition: ValueId) -> ValueId {
        self.create_match(MatchClass::Same, condition)
    }

    pub fn create_match_head(&mut self, condition: ValueId) -> ValueId {
        self.create_match(MatchClass::Head, condition)
    }

    pub fn create_match_tail(&mut self, condition: ValueId) -> ValueId {
        self.create_match(MatchClass::Tail, condition)
    }

    pub fn create_match_regexp(&mut self, condition: ValueId) -> ValueId {
        self.create_match(MatchClass::RegExp, condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_folding() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("main");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        builder.set_insert_point(entry);

        let two = builder.get_int(2);
        let three = builder.get_int(3);
        let four = builder.get_int(4);
        let product = builder.create_mul(three, four, "");
        let sum = builder.create_add(two, product, "");

        assert_eq!(builder.program().value(sum).as_const_int(), Some(14));
        // nothing was emitted
        assert!(builder.program().block(entry).is_empty());
    }

    #[test]
    fn test_folding_is_idempotent() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("main");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        builder.set_insert_point(entry);

        let a = builder.get_int(6);
        let b = builder.get_int(7);
        let first = builder.create_mul(a, b, "");
        let second = builder.create_mul(a, b, "");
        assert_eq!(first, second);
    }

    #[test]
    fn test_string_folding() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("main");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        builder.set_insert_point(entry);

        let hello = builder.get_string("hello ");
        let world = builder.get_string("world");
        let cat = builder.create_sadd(hello, world, "");
        assert_eq!(
            builder.program().value(cat).as_const_str(),
            Some("hello world")
        );

        let len = builder.create_slen(cat, "");
        assert_eq!(builder.program().value(len).as_const_int(), Some(11));

        let begins = builder.create_scmp_begins(cat, hello, "");
        assert_eq!(builder.program().value(begins).as_const_bool(), Some(true));
    }

    #[test]
    fn test_empty_string_concat_folds_to_other_side() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("main");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        builder.set_insert_point(entry);

        let slot = builder.create_alloca(LiteralType::String, None, "s");
        let dynamic = builder.create_load(slot, "s.load");
        let empty = builder.get_string("");
        assert_eq!(builder.create_sadd(empty, dynamic, ""), dynamic);
        assert_eq!(builder.create_sadd(dynamic, empty, ""), dynamic);
    }

    #[test]
    fn test_cast_folding() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("main");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        builder.set_insert_point(entry);

        let yes = builder.get_boolean(true);
        let text = builder.create_b2s(yes, "");
        assert_eq!(builder.program().value(text).as_const_str(), Some("true"));

        let n = builder.get_int(-42);
        let text = builder.create_n2s(n, "");
        assert_eq!(builder.program().value(text).as_const_str(), Some("-42"));

        let s = builder.get_string("123");
        let parsed = builder.create_s2n(s, "");
        assert_eq!(builder.program().value(parsed).as_const_int(), Some(123));

        // unparseable strings fall back to a runtime cast
        let bad = builder.get_string("x");
        let cast = builder.create_s2n(bad, "");
        assert!(builder.program().value(cast).as_const_int().is_none());
        assert!(matches!(
            builder.program().instr(cast).op(),
            InstrOp::Cast
        ));
    }

    #[test]
    fn test_ip_and_cidr_folding() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("main");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        builder.set_insert_point(entry);

        let ip = builder.get_ip("10.1.2.3".parse().unwrap());
        let net = builder.get_cidr("10.0.0.0/8".parse().unwrap());
        let inside = builder.create_p_in_cidr(ip, net, "");
        assert_eq!(builder.program().value(inside).as_const_bool(), Some(true));

        let other = builder.get_ip("10.1.2.4".parse().unwrap());
        let eq = builder.create_pcmp_eq(ip, other, "");
        assert_eq!(builder.program().value(eq).as_const_bool(), Some(false));
    }

    #[test]
    fn test_pow_folding() {
        let mut builder = IrBuilder::new();
        let handler = builder.get_handler("main");
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        builder.set_insert_point(entry);

        let base = builder.get_int(2);
        let exp = builder.get_int(10);
        let result = builder.create_pow(base, exp, "");
        assert_eq!(builder.program().value(result).as_const_int(), Some(1024));
    }

    #[test]
    fn test_unique_names() {
        let mut builder = IrBuilder::new();
        assert_eq!(builder.make_name("x"), "x");
        assert_eq!(builder.make_name("x"), "x1");
        assert_eq!(builder.make_name("x"), "x2");
        assert_eq!(builder.make_name(""), "tmp");
        assert_eq!(builder.make_name(""), "tmp1");
    }
}
