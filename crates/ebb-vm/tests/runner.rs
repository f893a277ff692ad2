//! Opcode-level interpreter tests built from raw code vectors.

use ebb_bytecode::{ConstantPool, Instruction, Opcode};
use ebb_core::LiteralType;
use ebb_vm::{
    Globals, NativeCallbacks, NativeError, Program, Runner, RunnerError, Runtime, Slot, State,
};
use std::cell::Cell;
use std::rc::Rc;

#[derive(Default)]
struct TestRuntime {
    callbacks: NativeCallbacks,
}

impl Runtime for TestRuntime {
    fn callbacks(&self) -> &NativeCallbacks {
        &self.callbacks
    }

    fn callbacks_mut(&mut self) -> &mut NativeCallbacks {
        &mut self.callbacks
    }
}

fn program_with(code: Vec<Instruction>) -> Program {
    let mut pool = ConstantPool::new();
    pool.make_integer(3);
    pool.make_integer(4);
    pool.set_handler("main", code);
    Program::new(pool)
}

fn run_expect_top(code: Vec<Instruction>, expected: Slot) {
    let program = program_with(code);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack_pointer(), 1);
    assert_eq!(runner.stack(-1), expected);
}

// ===== numeric =====

#[test]
fn test_iload() {
    run_expect_top(vec![Instruction::with_a(Opcode::ILoad, 3)], Slot::Int(3));
}

#[test]
fn test_nload() {
    run_expect_top(vec![Instruction::with_a(Opcode::NLoad, 0)], Slot::Int(3));
}

#[test]
fn test_nneg() {
    run_expect_top(
        vec![
            Instruction::with_a(Opcode::ILoad, 3),
            Instruction::new(Opcode::NNeg),
        ],
        Slot::Int(-3),
    );
}

#[test]
fn test_nnot() {
    run_expect_top(
        vec![
            Instruction::with_a(Opcode::ILoad, 3),
            Instruction::new(Opcode::NNot),
        ],
        Slot::Int(!3),
    );
}

#[test]
fn test_nadd() {
    run_expect_top(
        vec![
            Instruction::with_a(Opcode::ILoad, 3),
            Instruction::with_a(Opcode::ILoad, 4),
            Instruction::new(Opcode::NAdd),
        ],
        Slot::Int(7),
    );
}

#[test]
fn test_nsub() {
    run_expect_top(
        vec![
            Instruction::with_a(Opcode::ILoad, 7),
            Instruction::with_a(Opcode::ILoad, 4),
            Instruction::new(Opcode::NSub),
        ],
        Slot::Int(3),
    );
}

#[test]
fn test_nmul() {
    run_expect_top(
        vec![
            Instruction::with_a(Opcode::ILoad, 3),
            Instruction::with_a(Opcode::ILoad, 4),
            Instruction::new(Opcode::NMul),
        ],
        Slot::Int(12),
    );
}

#[test]
fn test_ndiv() {
    run_expect_top(
        vec![
            Instruction::with_a(Opcode::ILoad, 12),
            Instruction::with_a(Opcode::ILoad, 4),
            Instruction::new(Opcode::NDiv),
        ],
        Slot::Int(3),
    );
}

#[test]
fn test_npow() {
    run_expect_top(
        vec![
            Instruction::with_a(Opcode::ILoad, 2),
            Instruction::with_a(Opcode::ILoad, 10),
            Instruction::new(Opcode::NPow),
        ],
        Slot::Int(1024),
    );
}

#[test]
fn test_ncmp() {
    run_expect_top(
        vec![
            Instruction::with_a(Opcode::ILoad, 3),
            Instruction::with_a(Opcode::ILoad, 4),
            Instruction::new(Opcode::NCmpLt),
        ],
        Slot::Int(1),
    );
}

#[test]
#[should_panic]
fn test_ndiv_by_zero_is_not_masked() {
    let program = program_with(vec![
        Instruction::with_a(Opcode::ILoad, 1),
        Instruction::with_a(Opcode::ILoad, 0),
        Instruction::new(Opcode::NDiv),
    ]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    let _ = runner.run();
}

// ===== stack discipline =====

#[test]
fn test_alloca_discard() {
    run_expect_top(
        vec![
            Instruction::with_a(Opcode::ILoad, 9),
            Instruction::with_a(Opcode::Alloca, 2),
            Instruction::with_a(Opcode::Discard, 2),
        ],
        Slot::Int(9),
    );
}

#[test]
fn test_stackrot() {
    // [1, 2, 3] -> rotate index 0 to top -> [2, 3, 1]
    let program = program_with(vec![
        Instruction::with_a(Opcode::ILoad, 1),
        Instruction::with_a(Opcode::ILoad, 2),
        Instruction::with_a(Opcode::ILoad, 3),
        Instruction::with_a(Opcode::StackRot, 0),
    ]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack(0), Slot::Int(2));
    assert_eq!(runner.stack(1), Slot::Int(3));
    assert_eq!(runner.stack(2), Slot::Int(1));
}

#[test]
fn test_load_store() {
    let program = program_with(vec![
        Instruction::with_a(Opcode::Alloca, 1),
        Instruction::with_a(Opcode::ILoad, 42),
        Instruction::with_a(Opcode::Store, 0),
        Instruction::with_a(Opcode::Load, 0),
        Instruction::with_a(Opcode::ILoad, 1),
        Instruction::new(Opcode::NAdd),
        Instruction::with_a(Opcode::Store, 0),
        Instruction::with_a(Opcode::Load, 0),
    ]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    // stack is [slot, duplicate]
    assert_eq!(runner.stack_pointer(), 2);
    assert_eq!(runner.stack(0), Slot::Int(43));
    assert_eq!(runner.stack(-1), Slot::Int(43));
}

// ===== globals =====

#[test]
fn test_globals_survive_across_runs() {
    let init = program_with(vec![
        Instruction::with_a(Opcode::GAlloca, 1),
        Instruction::with_a(Opcode::ILoad, 7),
        Instruction::with_a(Opcode::GStore, 0),
    ]);
    let reader = program_with(vec![Instruction::with_a(Opcode::GLoad, 0)]);

    let mut globals = Globals::new();
    {
        let mut runner = Runner::new(&init, 0, &mut globals);
        runner.run().unwrap();
    }
    assert_eq!(globals, vec![Slot::Int(7)]);
    {
        let mut runner = Runner::new(&reader, 0, &mut globals);
        runner.run().unwrap();
        assert_eq!(runner.stack(-1), Slot::Int(7));
    }
}

// ===== control =====

#[test]
fn test_exit_flag() {
    let program = program_with(vec![Instruction::with_a(Opcode::Exit, 1)]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(runner.run().unwrap(), true);
    assert_eq!(runner.state(), State::Inactive);
}

#[test]
fn test_jz_skips_taken_branch() {
    // 0 -> jump to EXIT 1; the fallthrough EXIT 0 is skipped
    let program = program_with(vec![
        Instruction::with_a(Opcode::ILoad, 0),
        Instruction::with_a(Opcode::Jz, 3),
        Instruction::with_a(Opcode::Exit, 0),
        Instruction::with_a(Opcode::Exit, 1),
    ]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(runner.run().unwrap(), true);
}

#[test]
fn test_jn_pops_condition() {
    let program = program_with(vec![
        Instruction::with_a(Opcode::ILoad, 5),
        Instruction::with_a(Opcode::Jn, 2),
        Instruction::with_a(Opcode::Exit, 0),
    ]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(runner.run().unwrap(), false);
    assert_eq!(runner.stack_pointer(), 0);
}

// ===== strings =====

#[test]
fn test_sload_sadd_slen() {
    let mut pool = ConstantPool::new();
    let hello = pool.make_string("hello ") as u16;
    let world = pool.make_string("world") as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_a(Opcode::SLoad, hello),
            Instruction::with_a(Opcode::SLoad, world),
            Instruction::new(Opcode::SAdd),
            Instruction::new(Opcode::SLen),
        ],
    );
    let program = Program::new(pool);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack(-1), Slot::Int(11));
}

#[test]
fn test_string_comparisons() {
    let mut pool = ConstantPool::new();
    let abc = pool.make_string("abcdef") as u16;
    let abc2 = pool.make_string("abc") as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_a(Opcode::SLoad, abc),
            Instruction::with_a(Opcode::SLoad, abc2),
            Instruction::new(Opcode::SCmpBeg),
        ],
    );
    let program = Program::new(pool);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack(-1), Slot::Int(1));
}

#[test]
fn test_ssubstr() {
    let mut pool = ConstantPool::new();
    let s = pool.make_string("hello world") as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_a(Opcode::SLoad, s),
            Instruction::with_a(Opcode::ILoad, 6),
            Instruction::with_a(Opcode::ILoad, 5),
            Instruction::new(Opcode::SSubStr),
            Instruction::new(Opcode::SLen),
        ],
    );
    let program = Program::new(pool);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack_pointer(), 1);
    assert_eq!(runner.stack(-1), Slot::Int(5));
}

#[test]
fn test_s2n_and_n2s() {
    let mut pool = ConstantPool::new();
    let s = pool.make_string("42abc") as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_a(Opcode::SLoad, s),
            Instruction::new(Opcode::S2N),
        ],
    );
    let program = Program::new(pool);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack(-1), Slot::Int(42));

    let program = program_with(vec![
        Instruction::with_a(Opcode::ILoad, 7),
        Instruction::new(Opcode::N2S),
        Instruction::new(Opcode::SLen),
    ]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack(-1), Slot::Int(1));
}

// ===== IP / CIDR =====

#[test]
fn test_pincidr() {
    let mut pool = ConstantPool::new();
    let ip = pool.make_ipaddr("10.1.2.3".parse().unwrap()) as u16;
    let net = pool.make_cidr("10.0.0.0/8".parse().unwrap()) as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_a(Opcode::PLoad, ip),
            Instruction::with_a(Opcode::CLoad, net),
            Instruction::new(Opcode::PInCidr),
        ],
    );
    let program = Program::new(pool);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack(-1), Slot::Int(1));
}

#[test]
fn test_pcmpeq() {
    let mut pool = ConstantPool::new();
    let a = pool.make_ipaddr("10.1.2.3".parse().unwrap()) as u16;
    let b = pool.make_ipaddr("10.1.2.4".parse().unwrap()) as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_a(Opcode::PLoad, a),
            Instruction::with_a(Opcode::PLoad, b),
            Instruction::new(Opcode::PCmpEq),
        ],
    );
    let program = Program::new(pool);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack(-1), Slot::Int(0));
}

// ===== regex =====

#[test]
fn test_sregmatch_and_sreggroup() {
    let mut pool = ConstantPool::new();
    let re = pool.make_regexp(ebb_core::RegExp::new(r"^(\w+)@(\w+)$").unwrap()) as u16;
    let subject = pool.make_string("user@host") as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_a(Opcode::SLoad, subject),
            Instruction::with_a(Opcode::SRegMatch, re),
            Instruction::with_a(Opcode::SRegGroup, 2),
            Instruction::new(Opcode::SLen),
        ],
    );
    let program = Program::new(pool);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    // stack: [match-flag, len("host")]
    assert_eq!(runner.stack(-1), Slot::Int(4));
    assert_eq!(runner.stack(-2), Slot::Int(1));
    assert_eq!(runner.regexp_context().group(1), "user");
}

// ===== match dispatch =====

#[test]
fn test_smatcheq_dispatch() {
    let mut pool = ConstantPool::new();
    let start = pool.make_string("start") as u64;
    let subject = pool.make_string("start") as u16;

    let handler_id = pool.make_handler("main");
    let match_id = pool.make_match_def();
    {
        let def = pool.match_def_mut(match_id);
        def.handler_id = handler_id;
        def.op = ebb_core::MatchClass::Same;
        def.else_pc = 3;
        def.cases = vec![ebb_bytecode::MatchCaseDef { label: start, pc: 2 }];
    }
    pool.set_handler_code(
        handler_id,
        vec![
            Instruction::with_a(Opcode::SLoad, subject),
            Instruction::with_a(Opcode::SMatchEq, match_id as u16),
            Instruction::with_a(Opcode::Exit, 1),
            Instruction::with_a(Opcode::Exit, 0),
        ],
    );

    let program = Program::new(pool);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(runner.run().unwrap(), true);
    assert_eq!(runner.stack_pointer(), 0);
}

// ===== native calls =====

#[test]
fn test_call_pushes_result() {
    let mut pool = ConstantPool::new();
    let id = pool.make_native_function("seven()I") as u16;
    pool.set_handler(
        "main",
        vec![Instruction::with_abc(Opcode::Call, id, 0, 1)],
    );

    let mut runtime = TestRuntime::default();
    runtime
        .callbacks_mut()
        .register_function("seven", LiteralType::Number)
        .bind(|params| {
            params.set_result_int(7);
            Ok(())
        });

    let mut program = Program::new(pool);
    let mut report = ebb_core::diagnostics::BufferedReport::new();
    assert!(program.link(&mut runtime, &mut report));

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack(-1), Slot::Int(7));
}

#[test]
fn test_call_consumes_arguments() {
    let mut pool = ConstantPool::new();
    let id = pool.make_native_function("add(II)I") as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_a(Opcode::ILoad, 3),
            Instruction::with_a(Opcode::ILoad, 4),
            Instruction::with_abc(Opcode::Call, id, 2, 1),
        ],
    );

    let mut runtime = TestRuntime::default();
    runtime
        .callbacks_mut()
        .register_function("add", LiteralType::Number)
        .param("a", LiteralType::Number)
        .param("b", LiteralType::Number)
        .bind(|params| {
            let sum = params.get_int(1) + params.get_int(2);
            params.set_result_int(sum);
            Ok(())
        });

    let mut program = Program::new(pool);
    let mut report = ebb_core::diagnostics::BufferedReport::new();
    assert!(program.link(&mut runtime, &mut report));

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack_pointer(), 1);
    assert_eq!(runner.stack(-1), Slot::Int(7));
}

#[test]
fn test_handler_call_stops_run_when_handled() {
    let mut pool = ConstantPool::new();
    let id = pool.make_native_handler("deny()B") as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_ab(Opcode::Handler, id, 0),
            Instruction::with_a(Opcode::Exit, 0),
        ],
    );

    let mut runtime = TestRuntime::default();
    runtime.callbacks_mut().register_handler("deny").bind(|params| {
        params.set_result_bool(true);
        Ok(())
    });

    let mut program = Program::new(pool);
    let mut report = ebb_core::diagnostics::BufferedReport::new();
    assert!(program.link(&mut runtime, &mut report));

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(runner.run().unwrap(), true);
    assert_eq!(runner.state(), State::Inactive);
}

#[test]
fn test_native_error_propagates() {
    let mut pool = ConstantPool::new();
    let id = pool.make_native_function("fail()V") as u16;
    pool.set_handler(
        "main",
        vec![Instruction::with_abc(Opcode::Call, id, 0, 0)],
    );

    let mut runtime = TestRuntime::default();
    runtime
        .callbacks_mut()
        .register_function("fail", LiteralType::Void)
        .bind(|_| Err(NativeError::new("boom")));

    let mut program = Program::new(pool);
    let mut report = ebb_core::diagnostics::BufferedReport::new();
    assert!(program.link(&mut runtime, &mut report));

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(
        runner.run(),
        Err(RunnerError::Native(NativeError::new("boom")))
    );
}

// ===== suspension =====

#[test]
fn test_suspend_and_resume() {
    let mut pool = ConstantPool::new();
    let id = pool.make_native_function("pause()V") as u16;
    pool.set_handler(
        "main",
        vec![
            Instruction::with_abc(Opcode::Call, id, 0, 0),
            Instruction::with_a(Opcode::Exit, 0),
        ],
    );

    let calls = Rc::new(Cell::new(0));
    let calls_in_callback = calls.clone();

    let mut runtime = TestRuntime::default();
    runtime
        .callbacks_mut()
        .register_function("pause", LiteralType::Void)
        .bind(move |params| {
            calls_in_callback.set(calls_in_callback.get() + 1);
            if calls_in_callback.get() == 1 {
                params.caller().suspend();
            }
            Ok(())
        });

    let mut program = Program::new(pool);
    let mut report = ebb_core::diagnostics::BufferedReport::new();
    assert!(program.link(&mut runtime, &mut report));

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);

    assert_eq!(runner.run().unwrap(), false);
    assert_eq!(runner.state(), State::Suspended);
    assert_eq!(runner.instruction_pointer(), 1);
    assert_eq!(calls.get(), 1);

    assert_eq!(runner.resume().unwrap(), false);
    assert_eq!(runner.state(), State::Inactive);
    // the callback is not re-invoked on resume
    assert_eq!(calls.get(), 1);
}

// ===== quota =====

#[test]
fn test_quota_exceeded_leaves_ip_on_unexecuted_opcode() {
    let program = program_with(vec![
        Instruction::with_a(Opcode::NLoad, 0),
        Instruction::with_a(Opcode::Exit, 0),
    ]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals).with_quota(1);

    assert_eq!(runner.run(), Err(RunnerError::QuotaExceeded));
    assert_eq!(runner.instruction_pointer(), 1);
    // the first opcode did execute
    assert_eq!(runner.stack_pointer(), 1);
    assert_eq!(runner.stack(-1), Slot::Int(3));
}

#[test]
fn test_sufficient_quota_completes() {
    let program = program_with(vec![
        Instruction::with_a(Opcode::NLoad, 0),
        Instruction::with_a(Opcode::Exit, 0),
    ]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals).with_quota(2);
    assert_eq!(runner.run().unwrap(), false);
}

// ===== trace hook =====

#[test]
fn test_trace_hook_sees_every_opcode() {
    let seen = Rc::new(Cell::new(0usize));
    let seen_in_trace = seen.clone();

    let program = program_with(vec![
        Instruction::with_a(Opcode::ILoad, 3),
        Instruction::with_a(Opcode::ILoad, 4),
        Instruction::new(Opcode::NAdd),
        Instruction::with_a(Opcode::Exit, 0),
    ]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals).with_trace(Box::new(
        move |_instr, ip, _sp| {
            assert_eq!(ip, seen_in_trace.get());
            seen_in_trace.set(seen_in_trace.get() + 1);
        },
    ));
    runner.run().unwrap();
    assert_eq!(seen.get(), 4);
}

// ===== misc =====

#[test]
fn test_rewind() {
    let program = program_with(vec![Instruction::with_a(Opcode::Exit, 1)]);
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(runner.run().unwrap(), true);
    runner.rewind();
    assert_eq!(runner.instruction_pointer(), 0);
    assert_eq!(runner.run().unwrap(), true);
}
