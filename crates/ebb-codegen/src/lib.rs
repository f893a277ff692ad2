//! Target code generation
//!
//! Lowers an optimized SSA program to stack bytecode. The generator walks
//! each handler's blocks in layout order and maintains a compile-time
//! simulation of the runtime stack as a vector of IR value aliases: the
//! simulated depth always equals the depth the interpreter will see, which
//! lets local loads be elided (value already on top), rotated into place
//! (last use of a deeper value) or duplicated (`LOAD`).
//!
//! Jumps may reference blocks that have not been emitted yet; they are
//! recorded and back-patched with the block entry program counters once the
//! handler is complete, as are the case/else targets of match tables.

use ebb_bytecode::{ConstantPool, Instruction, Opcode, Operand};
use ebb_core::{LiteralType, MatchClass};
use ebb_ir::{BinaryOperator, HandlerId, InstrOp, IrProgram, UnaryOperator, ValueId, ValueKind};
use ebb_vm::Program;
use rustc_hash::FxHashMap;

/// Name of the synthetic handler whose allocas populate the global scope.
pub const GLOBAL_INIT_HANDLER: &str = "@main";

/// Lowers `ir` into a runnable (but not yet linked) program.
///
/// The global-initialization handler, if present, is generated first so its
/// global slots are known to every other handler.
pub fn generate(ir: &IrProgram) -> Program {
    let mut generator = Generator::default();

    let init = ir.find_handler(GLOBAL_INIT_HANDLER);
    if let Some(init) = init {
        generator.generate_handler(ir, init);
    }
    for handler in ir.handler_ids() {
        if Some(handler) != init {
            generator.generate_handler(ir, handler);
        }
    }

    generator.pool.set_modules(ir.modules().to_vec());
    Program::new(generator.pool)
}

#[derive(Default)]
struct Generator {
    pool: ConstantPool,
    handler_id: usize,

    /// current handler's code
    code: Vec<Instruction>,
    /// jump placeholders waiting for their target block's entry pc
    cond_jumps: FxHashMap<ValueId, Vec<(usize, Opcode)>>,
    uncond_jumps: FxHashMap<ValueId, Vec<usize>>,
    /// match instructions waiting for case/else pcs
    match_hints: Vec<(ValueId, usize)>,

    /// simulated runtime stack of value aliases
    stack: Vec<ValueId>,
    /// global scope slot mapping, shared across handlers
    globals: Vec<ValueId>,
}

impl Generator {
    fn generate_handler(&mut self, ir: &IrProgram, handler: HandlerId) {
        self.handler_id = self.pool.make_handler(ir.handler(handler).name());

        let mut entry_points: FxHashMap<ValueId, usize> = FxHashMap::default();

        for &block in ir.handler(handler).blocks() {
            entry_points.insert(block, self.code.len());
            for &instr in ir.block(block).instrs() {
                self.emit_instr(ir, instr);
            }
        }

        for (block, sources) in std::mem::take(&mut self.cond_jumps) {
            let target = entry_points[&block];
            for (pc, opcode) in sources {
                self.code[pc] = Instruction::with_a(opcode, as_operand(target));
            }
        }

        for (block, sources) in std::mem::take(&mut self.uncond_jumps) {
            let target = entry_points[&block];
            for pc in sources {
                self.code[pc] = Instruction::with_a(Opcode::Jmp, as_operand(target));
            }
        }

        for (match_instr, match_id) in std::mem::take(&mut self.match_hints) {
            let cases = ir.match_cases(match_instr);
            let def = self.pool.match_def_mut(match_id);
            for (index, (_, case_block)) in cases.iter().enumerate() {
                def.cases[index].pc = entry_points[case_block] as u64;
            }
            if let Some(else_block) = ir.match_else_block(match_instr) {
                def.else_pc = entry_points[&else_block] as u64;
            }
        }

        let code = std::mem::take(&mut self.code);
        self.pool.set_handler_code(self.handler_id, code);

        self.stack.clear();
    }

    // ----- emission helpers -----

    fn emit(&mut self, instr: Instruction) {
        self.code.push(instr);
    }

    fn pc(&self) -> usize {
        self.code.len()
    }

    fn emit_cond_jump(&mut self, opcode: Opcode, target: ValueId) {
        let pc = self.pc();
        self.emit(Instruction::new(opcode));
        self.pop(1);
        self.cond_jumps.entry(target).or_default().push((pc, opcode));
    }

    fn emit_jump(&mut self, target: ValueId) {
        let pc = self.pc();
        self.emit(Instruction::new(Opcode::Jmp));
        self.uncond_jumps.entry(target).or_default().push(pc);
    }

    fn pop(&mut self, count: usize) {
        assert!(
            count <= self.stack.len(),
            "simulated stack smaller than amount of elements to pop"
        );
        self.stack.truncate(self.stack.len() - count);
    }

    fn push(&mut self, alias: ValueId) {
        self.stack.push(alias);
    }

    fn stack_pointer_of(&self, value: ValueId) -> Option<usize> {
        self.stack.iter().position(|&v| v == value)
    }

    fn global_slot_of(&self, value: ValueId) -> Option<usize> {
        self.globals.iter().position(|&v| v == value)
    }

    /// Ensures `value` is on top of the runtime stack.
    ///
    /// Constants load through their typed opcode; values already on top
    /// cost nothing; a deeper value is rotated up when this is its only
    /// use, and duplicated otherwise.
    fn emit_load(&mut self, ir: &IrProgram, value: ValueId) {
        match ir.value(value).kind() {
            ValueKind::ConstInt(number) => {
                match Operand::try_from(*number) {
                    Ok(imm) => self.emit(Instruction::with_a(Opcode::ILoad, imm)),
                    Err(_) => {
                        let id = self.pool.make_integer(*number);
                        self.emit(Instruction::with_a(Opcode::NLoad, as_operand(id)));
                    }
                }
                self.push(value);
            }
            ValueKind::ConstBoolean(flag) => {
                self.emit(Instruction::with_a(Opcode::ILoad, *flag as Operand));
                self.push(value);
            }
            ValueKind::ConstString(text) => {
                let id = self.pool.make_string(text);
                self.emit(Instruction::with_a(Opcode::SLoad, as_operand(id)));
                self.push(value);
            }
            ValueKind::ConstIp(ip) => {
                let id = self.pool.make_ipaddr(*ip);
                self.emit(Instruction::with_a(Opcode::PLoad, as_operand(id)));
                self.push(value);
            }
            ValueKind::ConstCidr(cidr) => {
                let id = self.pool.make_cidr(cidr.clone());
                self.emit(Instruction::with_a(Opcode::CLoad, as_operand(id)));
                self.push(value);
            }
            ValueKind::ConstRegExp(re) => {
                // regexes travel as pool ids
                let id = self.pool.make_regexp(re.clone());
                self.emit(Instruction::with_a(Opcode::ILoad, as_operand(id)));
                self.push(value);
            }
            ValueKind::ConstArray(elements) => {
                let instr = self.load_array(ir, ir.ty(value), elements);
                self.emit(instr);
                self.push(value);
            }
            _ => {
                let si = self
                    .stack_pointer_of(value)
                    .unwrap_or_else(|| {
                        panic!(
                            "value %{} referenced as operand but not on the stack",
                            ir.name(value)
                        )
                    });

                if si + 1 == self.stack.len() {
                    return;
                }

                if ir.value(value).use_count() == 1 {
                    // last use: move it to the top instead of copying
                    self.emit(Instruction::with_a(Opcode::StackRot, as_operand(si)));
                    self.stack[si..].rotate_left(1);
                    return;
                }

                self.emit(Instruction::with_a(Opcode::Load, as_operand(si)));
                self.push(value);
            }
        }
    }

    fn load_array(&mut self, ir: &IrProgram, ty: LiteralType, elements: &[ValueId]) -> Instruction {
        match ty {
            LiteralType::IntArray => {
                let values = elements
                    .iter()
                    .map(|&e| ir.value(e).as_const_int().expect("int array element"))
                    .collect();
                Instruction::with_a(Opcode::ITLoad, as_operand(self.pool.make_int_array(values)))
            }
            LiteralType::StringArray => {
                let values = elements
                    .iter()
                    .map(|&e| {
                        ir.value(e)
                            .as_const_str()
                            .expect("string array element")
                            .to_string()
                    })
                    .collect();
                Instruction::with_a(
                    Opcode::STLoad,
                    as_operand(self.pool.make_string_array(values)),
                )
            }
            LiteralType::IpAddrArray => {
                let values = elements
                    .iter()
                    .map(|&e| match ir.value(e).kind() {
                        ValueKind::ConstIp(ip) => *ip,
                        other => panic!("IP array element expected, found {other:?}"),
                    })
                    .collect();
                Instruction::with_a(
                    Opcode::PTLoad,
                    as_operand(self.pool.make_ipaddr_array(values)),
                )
            }
            LiteralType::CidrArray => {
                let values = elements
                    .iter()
                    .map(|&e| match ir.value(e).kind() {
                        ValueKind::ConstCidr(cidr) => cidr.clone(),
                        other => panic!("CIDR array element expected, found {other:?}"),
                    })
                    .collect();
                Instruction::with_a(Opcode::CTLoad, as_operand(self.pool.make_cidr_array(values)))
            }
            other => panic!("unsupported constant array type {other}"),
        }
    }

    fn emit_unary(&mut self, ir: &IrProgram, instr: ValueId, opcode: Opcode) {
        let operand = ir.instr(instr).operand(0);
        self.emit_load(ir, operand);
        self.emit(Instruction::new(opcode));
        self.pop(1);
        self.push(instr);
    }

    fn emit_binary(&mut self, ir: &IrProgram, instr: ValueId, opcode: Opcode) {
        let lhs = ir.instr(instr).operand(0);
        let rhs = ir.instr(instr).operand(1);

        // reload only if the operands are not already on top in order and
        // solely consumed by this instruction
        let ready = self.stack.len() >= 2
            && self.stack[self.stack.len() - 2] == lhs
            && self.stack[self.stack.len() - 1] == rhs
            && ir.value(lhs).use_count() == 1
            && ir.value(rhs).use_count() == 1;
        if !ready {
            self.emit_load(ir, lhs);
            self.emit_load(ir, rhs);
        }

        self.emit(Instruction::new(opcode));
        self.pop(2);
        self.push(instr);
    }

    // ----- per-instruction lowering -----

    fn emit_instr(&mut self, ir: &IrProgram, instr: ValueId) {
        match ir.instr(instr).op() {
            InstrOp::Nop => self.emit(Instruction::new(Opcode::Nop)),

            InstrOp::Alloca => {
                let handler = ir.block(ir.instr(instr).block().expect("alloca outside block"))
                    .handler();
                if ir.handler(handler).name() == GLOBAL_INIT_HANDLER {
                    self.emit(Instruction::with_a(Opcode::GAlloca, 1));
                    self.globals.push(instr);
                } else {
                    self.emit(Instruction::with_a(Opcode::Alloca, 1));
                    self.push(instr);
                }
            }

            InstrOp::Store => {
                let variable = ir.instr(instr).operand(0);
                let source = ir.instr(instr).operand(2);

                if let Some(slot) = self.global_slot_of(variable) {
                    self.emit_load(ir, source);
                    self.emit(Instruction::with_a(Opcode::GStore, as_operand(slot)));
                    self.pop(1);
                    return;
                }

                let di = self
                    .stack_pointer_of(variable)
                    .expect("store destination not found on stack");

                if ir.value(source).use_count() == 1 && self.stack.last() == Some(&source) {
                    self.emit(Instruction::with_a(Opcode::Store, as_operand(di)));
                    self.pop(1);
                } else {
                    self.emit_load(ir, source);
                    self.emit(Instruction::with_a(Opcode::Store, as_operand(di)));
                    self.pop(1);
                }
            }

            InstrOp::Load => {
                let variable = ir.instr(instr).operand(0);

                if let Some(slot) = self.global_slot_of(variable) {
                    self.emit(Instruction::with_a(Opcode::GLoad, as_operand(slot)));
                    self.push(instr);
                    return;
                }

                let si = self
                    .stack_pointer_of(variable)
                    .expect("loaded variable not yet on the stack");
                self.emit(Instruction::with_a(Opcode::Load, as_operand(si)));
                self.push(instr);
            }

            InstrOp::Phi => {
                panic!("phi nodes must be eliminated before code generation")
            }

            InstrOp::Call => {
                let callee = ir.instr(instr).operand(0);
                let argc = ir.instr(instr).operand_count() - 1;
                for index in 1..=argc {
                    let arg = ir.instr(instr).operand(index);
                    self.emit_load(ir, arg);
                }

                let (signature, returns_value) = match ir.value(callee).kind() {
                    ValueKind::BuiltinFunction(signature, _) => (
                        signature.encode(),
                        signature.return_type() != LiteralType::Void,
                    ),
                    other => panic!("call callee must be a builtin function, got {other:?}"),
                };
                let id = self.pool.make_native_function(&signature);
                self.emit(Instruction::with_abc(
                    Opcode::Call,
                    as_operand(id),
                    as_operand(argc),
                    returns_value as Operand,
                ));
                self.pop(argc);

                if returns_value {
                    self.push(instr);
                    if !ir.value(instr).is_used() {
                        self.emit(Instruction::with_a(Opcode::Discard, 1));
                        self.pop(1);
                    }
                }
            }

            InstrOp::HandlerCall => {
                let callee = ir.instr(instr).operand(0);
                let argc = ir.instr(instr).operand_count() - 1;
                for index in 1..=argc {
                    let arg = ir.instr(instr).operand(index);
                    self.emit_load(ir, arg);
                }

                let signature = match ir.value(callee).kind() {
                    ValueKind::BuiltinHandler(signature, _) => signature.encode(),
                    other => panic!("invoke callee must be a builtin handler, got {other:?}"),
                };
                let id = self.pool.make_native_handler(&signature);
                self.emit(Instruction::with_ab(
                    Opcode::Handler,
                    as_operand(id),
                    as_operand(argc),
                ));
                self.pop(argc);
            }

            InstrOp::CondBr => {
                let parent = ir.instr(instr).block().expect("condbr outside block");
                let condition = ir.instr(instr).operand(0);
                let true_block = ir.instr(instr).operand(1);
                let false_block = ir.instr(instr).operand(2);

                if ir.is_next_block(parent, true_block) {
                    self.emit_load(ir, condition);
                    self.emit_cond_jump(Opcode::Jz, false_block);
                } else if ir.is_next_block(parent, false_block) {
                    self.emit_load(ir, condition);
                    self.emit_cond_jump(Opcode::Jn, true_block);
                } else {
                    self.emit_load(ir, condition);
                    self.emit_cond_jump(Opcode::Jn, true_block);
                    self.emit_jump(false_block);
                }
            }

            InstrOp::Br => {
                let parent = ir.instr(instr).block().expect("br outside block");
                let target = ir.instr(instr).operand(0);
                // fallthrough needs no jump
                if ir.is_next_block(parent, target) {
                    return;
                }
                self.emit_jump(target);
            }

            InstrOp::Ret => {
                let result = ir
                    .value(ir.instr(instr).operand(0))
                    .as_const_int()
                    .expect("return operand must be a constant integer");
                self.emit(Instruction::with_a(Opcode::Exit, as_operand(result as usize)));
            }

            InstrOp::Match(class) => {
                let match_id = self.pool.make_match_def();
                let cases = ir.match_cases(instr);

                {
                    let parent = ir.instr(instr).block().expect("match outside block");
                    let handler_name = ir.handler(ir.block(parent).handler()).name().to_string();
                    let handler_id = self.pool.make_handler(&handler_name);

                    let mut labels = Vec::with_capacity(cases.len());
                    for (label, _) in &cases {
                        let id = match ir.value(*label).kind() {
                            ValueKind::ConstString(text) => self.pool.make_string(text),
                            ValueKind::ConstRegExp(re) => self.pool.make_regexp(re.clone()),
                            other => panic!("unsupported match label {other:?}"),
                        };
                        labels.push(id as u64);
                    }

                    let def = self.pool.match_def_mut(match_id);
                    def.handler_id = handler_id;
                    def.op = class;
                    def.else_pc = 0; // patched after the handler is complete
                    def.cases = labels
                        .into_iter()
                        .map(ebb_bytecode::MatchCaseDef::new)
                        .collect();
                }

                self.match_hints.push((instr, match_id));

                let condition = ir.instr(instr).operand(0);
                self.emit_load(ir, condition);
                let opcode = match class {
                    MatchClass::Same => Opcode::SMatchEq,
                    MatchClass::Head => Opcode::SMatchBeg,
                    MatchClass::Tail => Opcode::SMatchEnd,
                    MatchClass::RegExp => Opcode::SMatchR,
                };
                self.emit(Instruction::with_a(opcode, as_operand(match_id)));
                self.pop(1);
            }

            InstrOp::RegExpGroup => {
                let group_id = ir
                    .value(ir.instr(instr).operand(0))
                    .as_const_int()
                    .expect("regex group id must be a constant integer");
                self.emit(Instruction::with_a(
                    Opcode::SRegGroup,
                    as_operand(group_id as usize),
                ));
                self.push(instr);
            }

            InstrOp::Cast => {
                let source = ir.instr(instr).operand(0);
                let from = ir.ty(source);
                let to = ir.ty(instr);

                // same-type casts are plain aliases
                if from == to {
                    self.emit_load(ir, source);
                    return;
                }

                let opcode = match (to, from) {
                    (LiteralType::String, LiteralType::Number) => Opcode::N2S,
                    (LiteralType::String, LiteralType::IpAddress) => Opcode::P2S,
                    (LiteralType::String, LiteralType::Cidr) => Opcode::C2S,
                    (LiteralType::String, LiteralType::RegExp) => Opcode::R2S,
                    (LiteralType::Number, LiteralType::String) => Opcode::S2N,
                    (to, from) => panic!("unsupported cast from {from} to {to}"),
                };
                self.emit_load(ir, source);
                self.emit(Instruction::new(opcode));
                self.pop(1);
                self.push(instr);
            }

            InstrOp::SSubStr => {
                for index in 0..3 {
                    let operand = ir.instr(instr).operand(index);
                    self.emit_load(ir, operand);
                }
                self.emit(Instruction::new(Opcode::SSubStr));
                self.pop(3);
                self.push(instr);
            }

            InstrOp::Unary(op) => {
                let opcode = match op {
                    UnaryOperator::INeg => Opcode::NNeg,
                    UnaryOperator::INot => Opcode::NNot,
                    UnaryOperator::BNot => Opcode::BNot,
                    UnaryOperator::SLen => Opcode::SLen,
                    UnaryOperator::SIsEmpty => Opcode::SIsEmpty,
                };
                self.emit_unary(ir, instr, opcode);
            }

            InstrOp::Binary(BinaryOperator::SCmpRe) => {
                // the regex operand becomes the opcode's pool immediate
                let lhs = ir.instr(instr).operand(0);
                let rhs = ir.instr(instr).operand(1);
                let id = match ir.value(rhs).kind() {
                    ValueKind::ConstRegExp(re) => self.pool.make_regexp(re.clone()),
                    other => panic!("regex comparison needs a constant regex, got {other:?}"),
                };
                self.emit_load(ir, lhs);
                self.emit(Instruction::with_a(Opcode::SRegMatch, as_operand(id)));
                self.pop(1);
                self.push(instr);
            }

            InstrOp::Binary(op) => {
                let opcode = match op {
                    BinaryOperator::IAdd => Opcode::NAdd,
                    BinaryOperator::ISub => Opcode::NSub,
                    BinaryOperator::IMul => Opcode::NMul,
                    BinaryOperator::IDiv => Opcode::NDiv,
                    BinaryOperator::IRem => Opcode::NRem,
                    BinaryOperator::IPow => Opcode::NPow,
                    BinaryOperator::IAnd => Opcode::NAnd,
                    BinaryOperator::IOr => Opcode::NOr,
                    BinaryOperator::IXor => Opcode::NXor,
                    BinaryOperator::IShl => Opcode::NShl,
                    BinaryOperator::IShr => Opcode::NShr,
                    BinaryOperator::ICmpEq => Opcode::NCmpEq,
                    BinaryOperator::ICmpNe => Opcode::NCmpNe,
                    BinaryOperator::ICmpLe => Opcode::NCmpLe,
                    BinaryOperator::ICmpGe => Opcode::NCmpGe,
                    BinaryOperator::ICmpLt => Opcode::NCmpLt,
                    BinaryOperator::ICmpGt => Opcode::NCmpGt,
                    BinaryOperator::BAnd => Opcode::BAnd,
                    BinaryOperator::BOr => Opcode::BOr,
                    BinaryOperator::BXor => Opcode::BXor,
                    BinaryOperator::SAdd => Opcode::SAdd,
                    BinaryOperator::SCmpEq => Opcode::SCmpEq,
                    BinaryOperator::SCmpNe => Opcode::SCmpNe,
                    BinaryOperator::SCmpLe => Opcode::SCmpLe,
                    BinaryOperator::SCmpGe => Opcode::SCmpGe,
                    BinaryOperator::SCmpLt => Opcode::SCmpLt,
                    BinaryOperator::SCmpGt => Opcode::SCmpGt,
                    BinaryOperator::SCmpBeg => Opcode::SCmpBeg,
                    BinaryOperator::SCmpEnd => Opcode::SCmpEnd,
                    BinaryOperator::SIn => Opcode::SContains,
                    BinaryOperator::PCmpEq => Opcode::PCmpEq,
                    BinaryOperator::PCmpNe => Opcode::PCmpNe,
                    BinaryOperator::PInCidr => Opcode::PInCidr,
                    BinaryOperator::SCmpRe => unreachable!("handled above"),
                };
                self.emit_binary(ir, instr, opcode);
            }
        }
    }
}

fn as_operand(value: usize) -> Operand {
    Operand::try_from(value).expect("operand does not fit the 16-bit instruction lane")
}
