//! The interpreter
//!
//! A `Runner` executes one handler of a linked program on a value stack
//! reserved to the handler's precomputed depth. Execution is strictly
//! single-threaded and cooperative: it leaves the dispatch loop only at an
//! `EXIT`, when a native callback suspends the runner, when the instruction
//! quota runs out, or when a callback fails.

use crate::error::RunnerError;
use crate::handler::Handler;
use crate::params::Params;
use crate::program::Program;
use crate::value::{Globals, Ref, Slot};
use ebb_bytecode::{ConstantPool, Instruction, Opcode};
use ebb_core::num::parse_number_prefix;
use ebb_core::{Cidr, RegexpContext};
use std::net::IpAddr;

/// Execution state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No handler running nor suspended.
    Inactive,
    /// The handler is currently executing.
    Running,
    /// The handler is parked inside a native callback.
    Suspended,
}

/// Trace hook, invoked before each opcode with the instruction, the
/// instruction pointer and the stack depth.
pub type TraceLogger<'a> = Box<dyn FnMut(Instruction, usize, usize) + 'a>;

/// Run-scoped allocations. Values produced during execution are referenced
/// from the stack by index and live until the runner is dropped.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    pub(crate) strings: Vec<String>,
    pub(crate) ipaddrs: Vec<IpAddr>,
    pub(crate) cidrs: Vec<Cidr>,
}

impl Heap {
    pub(crate) fn new_string(&mut self, value: String) -> Ref {
        self.strings.push(value);
        Ref::Heap((self.strings.len() - 1) as u32)
    }

    pub(crate) fn new_ip(&mut self, value: IpAddr) -> Ref {
        self.ipaddrs.push(value);
        Ref::Heap((self.ipaddrs.len() - 1) as u32)
    }

    pub(crate) fn new_cidr(&mut self, value: Cidr) -> Ref {
        self.cidrs.push(value);
        Ref::Heap((self.cidrs.len() - 1) as u32)
    }
}

pub(crate) fn resolve_str<'x>(pool: &'x ConstantPool, heap: &'x Heap, r: Ref) -> &'x str {
    match r {
        Ref::Pool(i) => pool.string(i as usize),
        Ref::Heap(i) => &heap.strings[i as usize],
    }
}

pub(crate) fn resolve_ip<'x>(pool: &'x ConstantPool, heap: &'x Heap, r: Ref) -> &'x IpAddr {
    match r {
        Ref::Pool(i) => pool.ipaddr(i as usize),
        Ref::Heap(i) => &heap.ipaddrs[i as usize],
    }
}

pub(crate) fn resolve_cidr<'x>(pool: &'x ConstantPool, heap: &'x Heap, r: Ref) -> &'x Cidr {
    match r {
        Ref::Pool(i) => pool.cidr(i as usize),
        Ref::Heap(i) => &heap.cidrs[i as usize],
    }
}

/// A single execution of one handler.
pub struct Runner<'a> {
    pub(crate) program: &'a Program,
    handler: &'a Handler,
    quota: Option<u64>,
    trace: Option<TraceLogger<'a>>,
    state: State,
    ip: usize,
    stack: Vec<Slot>,
    globals: &'a mut Globals,
    regexp_context: RegexpContext,
    pub(crate) heap: Heap,
}

impl<'a> Runner<'a> {
    /// Prepares a runner for the handler at `handler_index` of `program`.
    /// The globals vector is owned by the host and shared across runs.
    pub fn new(program: &'a Program, handler_index: usize, globals: &'a mut Globals) -> Self {
        let handler = program.handler(handler_index);
        Self {
            program,
            handler,
            quota: None,
            trace: None,
            state: State::Inactive,
            ip: 0,
            stack: Vec::with_capacity(handler.stack_size()),
            globals,
            regexp_context: RegexpContext::new(),
            heap: Heap::default(),
        }
    }

    /// Bounds this run to `quota` opcode-price units.
    pub fn with_quota(mut self, quota: u64) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Installs a trace hook invoked before each opcode.
    pub fn with_trace(mut self, trace: TraceLogger<'a>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn handler(&self) -> &'a Handler {
        self.handler
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The last saved program execution offset.
    pub fn instruction_pointer(&self) -> usize {
        self.ip
    }

    /// Number of elements on the value stack.
    pub fn stack_pointer(&self) -> usize {
        self.stack.len()
    }

    /// Stack inspection: negative indices address from the top
    /// (`-1` is the top of stack), non-negative from the bottom.
    pub fn stack(&self, index: isize) -> Slot {
        if index < 0 {
            self.stack[self.stack.len() - (-index) as usize]
        } else {
            self.stack[index as usize]
        }
    }

    pub fn globals(&self) -> &Globals {
        self.globals
    }

    pub fn regexp_context(&self) -> &RegexpContext {
        &self.regexp_context
    }

    /// Allocates a run-scoped string and returns its reference.
    pub fn new_string(&mut self, value: impl Into<String>) -> Ref {
        self.heap.new_string(value.into())
    }

    /// Starts execution from the beginning.
    pub fn run(&mut self) -> Result<bool, RunnerError> {
        assert_eq!(self.state, State::Inactive, "runner is already active");
        self.dispatch()
    }

    /// Parks the runner; the dispatch loop returns `false` after the
    /// current native call completes. Only callbacks may call this.
    pub fn suspend(&mut self) {
        assert_eq!(self.state, State::Running, "only a running handler can suspend");
        self.state = State::Suspended;
    }

    /// Continues a suspended run at the saved instruction pointer.
    pub fn resume(&mut self) -> Result<bool, RunnerError> {
        assert_eq!(self.state, State::Suspended, "runner is not suspended");
        self.dispatch()
    }

    /// Resets the instruction pointer to the handler entry. The stack must
    /// be empty.
    pub fn rewind(&mut self) {
        assert!(self.stack.is_empty(), "cannot rewind with values on the stack");
        self.ip = 0;
    }

    // ----- stack helpers -----

    fn push(&mut self, slot: Slot) {
        self.stack.push(slot);
    }

    fn pop(&mut self) -> Slot {
        self.stack.pop().expect("cannot pop from empty stack")
    }

    fn discard(&mut self, count: usize) {
        assert!(
            count <= self.stack.len(),
            "attempt to discard more items than available on stack"
        );
        self.stack.truncate(self.stack.len() - count);
    }

    /// `slot(1)` is the top of stack, `slot(2)` the value below it.
    fn slot(&self, below_top: usize) -> Slot {
        self.stack[self.stack.len() - below_top]
    }

    fn set_slot(&mut self, below_top: usize, slot: Slot) {
        let at = self.stack.len() - below_top;
        self.stack[at] = slot;
    }

    fn int(&self, below_top: usize) -> i64 {
        self.slot(below_top).as_int()
    }

    fn str_at(&self, below_top: usize) -> &str {
        resolve_str(
            self.program.constants(),
            &self.heap,
            self.slot(below_top).as_str_ref(),
        )
    }

    fn binary_int(&mut self, f: impl FnOnce(i64, i64) -> i64) {
        let rhs = self.int(1);
        let lhs = self.int(2);
        self.set_slot(2, Slot::Int(f(lhs, rhs)));
        self.pop();
    }

    fn compare_int(&mut self, f: impl FnOnce(i64, i64) -> bool) {
        self.binary_int(|lhs, rhs| f(lhs, rhs) as i64);
    }

    fn compare_str(&mut self, f: impl FnOnce(&str, &str) -> bool) {
        let result = f(self.str_at(2), self.str_at(1));
        self.set_slot(2, Slot::Int(result as i64));
        self.pop();
    }

    fn unary_str_to_int(&mut self, f: impl FnOnce(&str) -> i64) {
        let result = f(self.str_at(1));
        self.set_slot(1, Slot::Int(result));
    }

    // ----- quota -----

    fn consume(&mut self, opcode: Opcode, pc: usize) -> Result<(), RunnerError> {
        if let Some(quota) = self.quota.as_mut() {
            let price = opcode.price();
            if price > *quota {
                self.ip = pc;
                return Err(RunnerError::QuotaExceeded);
            }
            *quota -= price;
        }
        Ok(())
    }

    // ----- dispatch -----

    fn dispatch(&mut self) -> Result<bool, RunnerError> {
        let program = self.program;
        let pool = program.constants();
        let handler = self.handler;
        let code = handler.code();

        self.state = State::Running;
        let mut pc = self.ip;

        loop {
            assert!(pc < code.len(), "instruction pointer out of bounds");
            let instr = code[pc];
            let opcode = instr.opcode();

            self.consume(opcode, pc)?;
            if let Some(trace) = self.trace.as_mut() {
                trace(instr, pc, self.stack.len());
            }

            let a = instr.a();
            match opcode {
                // ----- misc -----
                Opcode::Nop => {
                    pc += 1;
                }
                Opcode::Alloca => {
                    for _ in 0..a {
                        self.push(Slot::default());
                    }
                    pc += 1;
                }
                Opcode::Discard => {
                    self.discard(a as usize);
                    pc += 1;
                }
                Opcode::StackRot => {
                    // moves stack[A] to the top, shifting intermediates down
                    self.stack[a as usize..].rotate_left(1);
                    pc += 1;
                }

                // ----- globals -----
                Opcode::GAlloca => {
                    self.globals.push(Slot::default());
                    pc += 1;
                }
                Opcode::GLoad => {
                    let slot = self.globals[a as usize];
                    self.push(slot);
                    pc += 1;
                }
                Opcode::GStore => {
                    self.globals[a as usize] = self.pop();
                    pc += 1;
                }

                // ----- control -----
                Opcode::Exit => {
                    self.state = State::Inactive;
                    self.ip = pc;
                    return Ok(a != 0);
                }
                Opcode::Jmp => {
                    pc = a as usize;
                }
                Opcode::Jn => {
                    if self.pop().truthy() {
                        pc = a as usize;
                    } else {
                        pc += 1;
                    }
                }
                Opcode::Jz => {
                    if !self.pop().truthy() {
                        pc = a as usize;
                    } else {
                        pc += 1;
                    }
                }

                // ----- constant arrays -----
                Opcode::ITLoad => {
                    self.push(Slot::IntArray(a as u32));
                    pc += 1;
                }
                Opcode::STLoad => {
                    self.push(Slot::StrArray(a as u32));
                    pc += 1;
                }
                Opcode::PTLoad => {
                    self.push(Slot::IpArray(a as u32));
                    pc += 1;
                }
                Opcode::CTLoad => {
                    self.push(Slot::CidrArray(a as u32));
                    pc += 1;
                }

                // ----- stack slots -----
                Opcode::Load => {
                    let slot = self.stack[a as usize];
                    self.push(slot);
                    pc += 1;
                }
                Opcode::Store => {
                    self.stack[a as usize] = self.pop();
                    pc += 1;
                }

                // ----- numeric -----
                Opcode::ILoad => {
                    self.push(Slot::Int(a as i64));
                    pc += 1;
                }
                Opcode::NLoad => {
                    self.push(Slot::Int(pool.integer(a as usize)));
                    pc += 1;
                }
                Opcode::NNeg => {
                    let value = self.int(1);
                    self.set_slot(1, Slot::Int(value.wrapping_neg()));
                    pc += 1;
                }
                Opcode::NNot => {
                    let value = self.int(1);
                    self.set_slot(1, Slot::Int(!value));
                    pc += 1;
                }
                Opcode::NAdd => {
                    self.binary_int(i64::wrapping_add);
                    pc += 1;
                }
                Opcode::NSub => {
                    self.binary_int(i64::wrapping_sub);
                    pc += 1;
                }
                Opcode::NMul => {
                    self.binary_int(i64::wrapping_mul);
                    pc += 1;
                }
                Opcode::NDiv => {
                    // division by zero surfaces as a panic, not a result
                    self.binary_int(|lhs, rhs| lhs / rhs);
                    pc += 1;
                }
                Opcode::NRem => {
                    self.binary_int(|lhs, rhs| lhs % rhs);
                    pc += 1;
                }
                Opcode::NShl => {
                    self.binary_int(|lhs, rhs| lhs.wrapping_shl(rhs as u32));
                    pc += 1;
                }
                Opcode::NShr => {
                    self.binary_int(|lhs, rhs| lhs.wrapping_shr(rhs as u32));
                    pc += 1;
                }
                Opcode::NPow => {
                    self.binary_int(ebb_core::num::ipow);
                    pc += 1;
                }
                Opcode::NAnd => {
                    self.binary_int(|lhs, rhs| lhs & rhs);
                    pc += 1;
                }
                Opcode::NOr => {
                    self.binary_int(|lhs, rhs| lhs | rhs);
                    pc += 1;
                }
                Opcode::NXor => {
                    self.binary_int(|lhs, rhs| lhs ^ rhs);
                    pc += 1;
                }
                Opcode::NCmpZ => {
                    let value = self.int(1);
                    self.set_slot(1, Slot::Int((value == 0) as i64));
                    pc += 1;
                }
                Opcode::NCmpEq => {
                    self.compare_int(|lhs, rhs| lhs == rhs);
                    pc += 1;
                }
                Opcode::NCmpNe => {
                    self.compare_int(|lhs, rhs| lhs != rhs);
                    pc += 1;
                }
                Opcode::NCmpLe => {
                    self.compare_int(|lhs, rhs| lhs <= rhs);
                    pc += 1;
                }
                Opcode::NCmpGe => {
                    self.compare_int(|lhs, rhs| lhs >= rhs);
                    pc += 1;
                }
                Opcode::NCmpLt => {
                    self.compare_int(|lhs, rhs| lhs < rhs);
                    pc += 1;
                }
                Opcode::NCmpGt => {
                    self.compare_int(|lhs, rhs| lhs > rhs);
                    pc += 1;
                }

                // ----- boolean -----
                Opcode::BNot => {
                    let value = self.int(1);
                    self.set_slot(1, Slot::Int((value == 0) as i64));
                    pc += 1;
                }
                Opcode::BAnd => {
                    self.binary_int(|lhs, rhs| (lhs != 0 && rhs != 0) as i64);
                    pc += 1;
                }
                Opcode::BOr => {
                    self.binary_int(|lhs, rhs| (lhs != 0 || rhs != 0) as i64);
                    pc += 1;
                }
                Opcode::BXor => {
                    self.binary_int(|lhs, rhs| ((lhs != 0) ^ (rhs != 0)) as i64);
                    pc += 1;
                }

                // ----- string -----
                Opcode::SLoad => {
                    self.push(Slot::Str(Ref::Pool(a as u32)));
                    pc += 1;
                }
                Opcode::SAdd => {
                    let cat = format!("{}{}", self.str_at(2), self.str_at(1));
                    let r = self.heap.new_string(cat);
                    self.set_slot(2, Slot::Str(r));
                    self.pop();
                    pc += 1;
                }
                Opcode::SSubStr => {
                    let length = self.int(1);
                    let offset = self.int(2);
                    let sub = substr(self.str_at(3), offset, length);
                    let r = self.heap.new_string(sub);
                    self.set_slot(3, Slot::Str(r));
                    self.discard(2);
                    pc += 1;
                }
                Opcode::SCmpEq => {
                    self.compare_str(|lhs, rhs| lhs == rhs);
                    pc += 1;
                }
                Opcode::SCmpNe => {
                    self.compare_str(|lhs, rhs| lhs != rhs);
                    pc += 1;
                }
                Opcode::SCmpLe => {
                    self.compare_str(|lhs, rhs| lhs <= rhs);
                    pc += 1;
                }
                Opcode::SCmpGe => {
                    self.compare_str(|lhs, rhs| lhs >= rhs);
                    pc += 1;
                }
                Opcode::SCmpLt => {
                    self.compare_str(|lhs, rhs| lhs < rhs);
                    pc += 1;
                }
                Opcode::SCmpGt => {
                    self.compare_str(|lhs, rhs| lhs > rhs);
                    pc += 1;
                }
                Opcode::SCmpBeg => {
                    self.compare_str(|lhs, rhs| lhs.starts_with(rhs));
                    pc += 1;
                }
                Opcode::SCmpEnd => {
                    self.compare_str(|lhs, rhs| lhs.ends_with(rhs));
                    pc += 1;
                }
                Opcode::SContains => {
                    self.compare_str(|lhs, rhs| lhs.contains(rhs));
                    pc += 1;
                }
                Opcode::SLen => {
                    self.unary_str_to_int(|s| s.len() as i64);
                    pc += 1;
                }
                Opcode::SIsEmpty => {
                    self.unary_str_to_int(|s| s.is_empty() as i64);
                    pc += 1;
                }
                Opcode::SMatchEq | Opcode::SMatchBeg | Opcode::SMatchEnd | Opcode::SMatchR => {
                    let subject_ref = self.pop().as_str_ref();
                    let matcher = program.matcher(a as usize);
                    let subject = resolve_str(pool, &self.heap, subject_ref);
                    let target = matcher.evaluate(subject, &mut self.regexp_context);
                    pc = target as usize;
                }

                // ----- IP address -----
                Opcode::PLoad => {
                    self.push(Slot::Ip(Ref::Pool(a as u32)));
                    pc += 1;
                }
                Opcode::PCmpEq | Opcode::PCmpNe => {
                    let rhs = *resolve_ip(pool, &self.heap, self.slot(1).as_ip_ref());
                    let lhs = *resolve_ip(pool, &self.heap, self.slot(2).as_ip_ref());
                    let result = if opcode == Opcode::PCmpEq {
                        lhs == rhs
                    } else {
                        lhs != rhs
                    };
                    self.set_slot(2, Slot::Int(result as i64));
                    self.pop();
                    pc += 1;
                }
                Opcode::PInCidr => {
                    let result = {
                        let cidr = resolve_cidr(pool, &self.heap, self.slot(1).as_cidr_ref());
                        let ip = resolve_ip(pool, &self.heap, self.slot(2).as_ip_ref());
                        cidr.contains(ip)
                    };
                    self.set_slot(2, Slot::Int(result as i64));
                    self.pop();
                    pc += 1;
                }

                // ----- CIDR -----
                Opcode::CLoad => {
                    self.push(Slot::Cidr(Ref::Pool(a as u32)));
                    pc += 1;
                }

                // ----- regex -----
                Opcode::SRegMatch => {
                    let re = pool.regexp(a as usize);
                    let subject_ref = self.slot(1).as_str_ref();
                    let matched = {
                        let subject = resolve_str(pool, &self.heap, subject_ref);
                        re.match_with(subject, &mut self.regexp_context)
                    };
                    self.set_slot(1, Slot::Int(matched as i64));
                    pc += 1;
                }
                Opcode::SRegGroup => {
                    let group = self.regexp_context.group(a as usize).to_string();
                    let r = self.heap.new_string(group);
                    self.push(Slot::Str(r));
                    pc += 1;
                }

                // ----- conversions -----
                Opcode::N2S => {
                    let value = self.int(1);
                    let r = self.heap.new_string(value.to_string());
                    self.set_slot(1, Slot::Str(r));
                    pc += 1;
                }
                Opcode::P2S => {
                    let text = resolve_ip(pool, &self.heap, self.slot(1).as_ip_ref()).to_string();
                    let r = self.heap.new_string(text);
                    self.set_slot(1, Slot::Str(r));
                    pc += 1;
                }
                Opcode::C2S => {
                    let text =
                        resolve_cidr(pool, &self.heap, self.slot(1).as_cidr_ref()).to_string();
                    let r = self.heap.new_string(text);
                    self.set_slot(1, Slot::Str(r));
                    pc += 1;
                }
                Opcode::R2S => {
                    // regexes travel as pool ids
                    let pattern = pool.regexp(self.int(1) as usize).pattern().to_string();
                    let r = self.heap.new_string(pattern);
                    self.set_slot(1, Slot::Str(r));
                    pc += 1;
                }
                Opcode::S2N => {
                    let value = parse_number_prefix(self.str_at(1)).unwrap_or(0);
                    self.set_slot(1, Slot::Int(value));
                    pc += 1;
                }

                // ----- invocation -----
                Opcode::Call => {
                    let id = a as usize;
                    let argc = instr.b() as usize;
                    let returns_value = instr.c() != 0;

                    self.ip = pc + 1;

                    let callback = program.native_function(id);
                    let mut argv = vec![Slot::default(); argc + 1];
                    let base = self.stack.len() - argc;
                    argv[1..].copy_from_slice(&self.stack[base..]);

                    let mut params = Params::new(self, argc, argv);
                    callback.invoke(&mut params)?;
                    let result = params.result();

                    self.discard(argc);
                    if returns_value {
                        self.push(result);
                    }

                    if self.state == State::Suspended {
                        return Ok(false);
                    }
                    pc = self.ip;
                }
                Opcode::Handler => {
                    let id = a as usize;
                    let argc = instr.b() as usize;

                    self.ip = pc + 1;

                    let callback = program.native_handler(id);
                    let mut argv = vec![Slot::default(); argc + 1];
                    let base = self.stack.len() - argc;
                    argv[1..].copy_from_slice(&self.stack[base..]);

                    let mut params = Params::new(self, argc, argv);
                    callback.invoke(&mut params)?;
                    let handled = params.result().truthy();

                    self.discard(argc);

                    if self.state == State::Suspended {
                        return Ok(false);
                    }
                    if handled {
                        self.state = State::Inactive;
                        return Ok(true);
                    }
                    pc = self.ip;
                }
            }
        }
    }
}

/// Byte-based substring with clamped bounds. Slices that would split a
/// UTF-8 sequence are repaired lossily.
fn substr(subject: &str, offset: i64, length: i64) -> String {
    let bytes = subject.as_bytes();
    let start = offset.clamp(0, bytes.len() as i64) as usize;
    let end = start.saturating_add(length.max(0) as usize).min(bytes.len());
    String::from_utf8_lossy(&bytes[start..end]).into_owned()
}
