//! End-to-end pipeline tests: IR construction, optimization, code
//! generation, linking and execution.

use ebb_bytecode::{stack_change, Opcode};
use ebb_codegen::{generate, GLOBAL_INIT_HANDLER};
use ebb_core::diagnostics::{BufferedReport, Report};
use ebb_core::{Attribute, AttributeSet, LiteralType, Signature};
use ebb_ir::transform::PassManager;
use ebb_ir::IrBuilder;
use ebb_vm::{Globals, NativeCallbacks, Runner, RunnerError, Runtime, Slot, State};
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

/// `main` stores the folded value of `2 + 3 * 4` into a local and returns.
fn build_fold_program() -> IrBuilder {
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
    // the expression folded to a single constant
    assert_eq!(builder.program().value(sum).as_const_int(), Some(14));

    let slot = builder.create_alloca(LiteralType::Number, None, "result");
    builder.create_store(slot, sum, "");
    let zero = builder.get_int(0);
    builder.create_ret(zero);
    builder
}

#[test]
fn test_fold_and_run() {
    let builder = build_fold_program();
    let program = generate(builder.program());

    let handler = program.handler(program.find_handler("main").unwrap());
    // ALLOCA, ILOAD 14, STORE, EXIT
    assert_eq!(handler.code().len(), 4);
    assert_eq!(handler.code()[1].opcode(), Opcode::ILoad);
    assert_eq!(handler.code()[1].a(), 14);

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(runner.run().unwrap(), false);
    // the local slot holds the folded value at exit
    assert_eq!(runner.stack_pointer(), 1);
    assert_eq!(runner.stack(-1), Slot::Int(14));
}

#[test]
fn test_predicted_stack_depth_matches_runtime() {
    let builder = build_fold_program();
    let program = generate(builder.program());
    let handler_index = program.find_handler("main").unwrap();
    let declared = program.handler(handler_index).stack_size();

    let expected = Rc::new(Cell::new(0i64));
    let peak = Rc::new(Cell::new(0i64));
    let expected_in_trace = expected.clone();
    let peak_in_trace = peak.clone();

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, handler_index, &mut globals).with_trace(Box::new(
        move |instr, _ip, sp| {
            assert_eq!(sp as i64, expected_in_trace.get());
            expected_in_trace.set(expected_in_trace.get() + stack_change(instr));
            peak_in_trace.set(peak_in_trace.get().max(expected_in_trace.get()));
        },
    ));
    runner.run().unwrap();
    assert!(peak.get() as usize <= declared);
}

#[test]
fn test_constant_condbr_collapses_to_single_exit() {
    let mut builder = IrBuilder::new();
    let handler = builder.get_handler("main");
    builder.set_handler(handler);
    let entry = builder.create_block("entry");
    let then_block = builder.create_block("then");
    let else_block = builder.create_block("else");

    builder.set_insert_point(entry);
    let cond = builder.get_boolean(true);
    builder.create_cond_br(cond, then_block, else_block);

    builder.set_insert_point(then_block);
    let one = builder.get_int(1);
    builder.create_ret(one);

    builder.set_insert_point(else_block);
    let zero = builder.get_int(0);
    builder.create_ret(zero);

    let pm = PassManager::with_default_passes();
    pm.run_handler(builder.program_mut(), handler);
    assert_eq!(builder.program().handler(handler).blocks().len(), 1);

    let program = generate(builder.program());
    let handler = program.handler(program.find_handler("main").unwrap());
    assert_eq!(handler.code().len(), 1);
    assert_eq!(handler.code()[0].opcode(), Opcode::Exit);

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(runner.run().unwrap(), true);
}

#[test]
fn test_match_head_dispatch() {
    let mut builder = IrBuilder::new();

    // the global init handler allocates one global slot
    let init = builder.get_handler(GLOBAL_INIT_HANDLER);
    builder.set_handler(init);
    let init_entry = builder.create_block("entry");
    builder.set_insert_point(init_entry);
    let global = builder.create_alloca(LiteralType::Number, None, "outcome");
    let zero = builder.get_int(0);
    builder.create_store(global, zero, "");
    builder.create_ret(zero);

    // one probe handler per subject; every case records its id in the global
    for (probe, subject) in [
        ("probe_deep", "foobarbaz"),
        ("probe_shallow", "foozoo"),
        ("probe_miss", "quux"),
    ] {
        let handler = builder.get_handler(probe);
        builder.set_handler(handler);
        let entry = builder.create_block("entry");
        let case_foo = builder.create_block("case_foo");
        let case_foobar = builder.create_block("case_foobar");
        let case_else = builder.create_block("case_else");

        builder.set_insert_point(entry);
        let cond = builder.get_string(subject);
        let match_instr = builder.create_match_head(cond);
        let foo = builder.get_string("foo");
        let foobar = builder.get_string("foobar");
        builder
            .program_mut()
            .add_match_case(match_instr, foo, case_foo);
        builder
            .program_mut()
            .add_match_case(match_instr, foobar, case_foobar);
        builder
            .program_mut()
            .set_match_else_block(match_instr, case_else);

        for (block, outcome) in [(case_foo, 1), (case_foobar, 2), (case_else, 3)] {
            builder.set_insert_point(block);
            let value = builder.get_int(outcome);
            builder.create_store(global, value, "");
            let flag = builder.get_int(0);
            builder.create_ret(flag);
        }
        builder.program().verify_handler(handler);
    }

    let program = generate(builder.program());
    let mut globals = Globals::new();
    {
        let mut runner = Runner::new(
            &program,
            program.find_handler(GLOBAL_INIT_HANDLER).unwrap(),
            &mut globals,
        );
        runner.run().unwrap();
    }
    assert_eq!(globals.len(), 1);

    for (probe, expected) in [("probe_deep", 2), ("probe_shallow", 1), ("probe_miss", 3)] {
        let index = program.find_handler(probe).unwrap();
        {
            let mut runner = Runner::new(&program, index, &mut globals);
            runner.run().unwrap();
        }
        assert_eq!(globals[0], Slot::Int(expected), "probe {probe}");
    }
}

#[test]
fn test_dead_side_effect_free_call_is_not_emitted() {
    let mut builder = IrBuilder::new();
    let handler = builder.get_handler("main");
    builder.set_handler(handler);
    let entry = builder.create_block("entry");
    builder.set_insert_point(entry);

    let signature: Signature = "pure_len(S)I".parse().unwrap();
    let attrs = AttributeSet::empty().with(Attribute::SideEffectFree);
    let callee = builder.get_builtin_function(signature, attrs);
    let arg = builder.get_string("abc");
    builder.create_call_function(callee, vec![arg], "x");
    let zero = builder.get_int(0);
    builder.create_ret(zero);

    let pm = PassManager::with_default_passes();
    pm.run_handler(builder.program_mut(), handler);

    let program = generate(builder.program());
    let handler = program.handler(program.find_handler("main").unwrap());
    assert!(handler
        .code()
        .iter()
        .all(|instr| instr.opcode() != Opcode::Call));
    assert!(program.constants().native_function_signatures().is_empty());
}

#[test]
fn test_suspend_resume_through_pipeline() {
    let mut builder = IrBuilder::new();
    let handler = builder.get_handler("main");
    builder.set_handler(handler);
    let entry = builder.create_block("entry");
    builder.set_insert_point(entry);

    let signature: Signature = "pause()V".parse().unwrap();
    let callee = builder.get_builtin_function(signature, AttributeSet::empty());
    builder.create_call_function(callee, Vec::new(), "");
    let zero = builder.get_int(0);
    builder.create_ret(zero);

    let mut program = generate(builder.program());

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

    let mut report = BufferedReport::new();
    assert!(program.link(&mut runtime, &mut report));

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);

    assert_eq!(runner.run().unwrap(), false);
    assert_eq!(runner.state(), State::Suspended);

    assert_eq!(runner.resume().unwrap(), false);
    assert_eq!(runner.state(), State::Inactive);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_link_failure_reports_every_missing_signature() {
    let mut builder = IrBuilder::new();
    let handler = builder.get_handler("main");
    builder.set_handler(handler);
    let entry = builder.create_block("entry");
    builder.set_insert_point(entry);

    let signature: Signature = "missing(I)V".parse().unwrap();
    let callee = builder.get_builtin_function(signature, AttributeSet::empty());
    let arg = builder.get_int(1);
    builder.create_call_function(callee, vec![arg], "");
    let zero = builder.get_int(0);
    builder.create_ret(zero);

    let mut program = generate(builder.program());
    let mut runtime = TestRuntime::default();
    let mut report = BufferedReport::new();

    assert!(!program.link(&mut runtime, &mut report));
    assert!(report.contains_failures());
    assert_eq!(report.len(), 1);
    assert!(report.messages()[0].text.contains("missing(I)V"));
}

#[test]
fn test_quota_on_generated_program() {
    let builder = build_fold_program();
    let program = generate(builder.program());

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals).with_quota(1);
    assert_eq!(runner.run(), Err(RunnerError::QuotaExceeded));
    // exactly one opcode executed; the IP rests on the unexecuted one
    assert_eq!(runner.instruction_pointer(), 1);

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals).with_quota(64);
    assert_eq!(runner.run().unwrap(), false);
}

#[test]
fn test_integer_load_picks_immediate_or_pool() {
    let mut builder = IrBuilder::new();
    let handler = builder.get_handler("main");
    builder.set_handler(handler);
    let entry = builder.create_block("entry");
    builder.set_insert_point(entry);

    for value in [65_535i64, 65_536, -1] {
        let slot = builder.create_alloca(LiteralType::Number, None, "slot");
        let constant = builder.get_int(value);
        builder.create_store(slot, constant, "");
    }
    let zero = builder.get_int(0);
    builder.create_ret(zero);

    let program = generate(builder.program());
    let handler = program.handler(program.find_handler("main").unwrap());
    let loads: Vec<Opcode> = handler
        .code()
        .iter()
        .map(|i| i.opcode())
        .filter(|op| matches!(op, Opcode::ILoad | Opcode::NLoad))
        .collect();
    // the largest immediate still fits; everything else goes via the pool
    assert_eq!(loads, vec![Opcode::ILoad, Opcode::NLoad, Opcode::NLoad]);
    assert_eq!(program.constants().integer(0), 65_536);
    assert_eq!(program.constants().integer(1), -1);

    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    runner.run().unwrap();
    assert_eq!(runner.stack(0), Slot::Int(65_535));
    assert_eq!(runner.stack(1), Slot::Int(65_536));
    assert_eq!(runner.stack(2), Slot::Int(-1));
}

#[test]
fn test_cond_branch_layout_uses_fallthrough() {
    let mut builder = IrBuilder::new();
    let handler = builder.get_handler("main");
    builder.set_handler(handler);
    let entry = builder.create_block("entry");
    let then_block = builder.create_block("then");
    let else_block = builder.create_block("else");

    builder.set_insert_point(entry);
    let slot = builder.create_alloca(LiteralType::Boolean, None, "flag");
    let cond = builder.create_load(slot, "flag.value");
    builder.create_cond_br(cond, then_block, else_block);

    builder.set_insert_point(then_block);
    let one = builder.get_int(1);
    builder.create_ret(one);

    builder.set_insert_point(else_block);
    let zero = builder.get_int(0);
    builder.create_ret(zero);

    let program = generate(builder.program());
    let handler = program.handler(program.find_handler("main").unwrap());

    // the true block directly follows the branch, so a single JZ suffices
    let jumps: Vec<Opcode> = handler
        .code()
        .iter()
        .map(|i| i.opcode())
        .filter(|op| matches!(op, Opcode::Jz | Opcode::Jn | Opcode::Jmp))
        .collect();
    assert_eq!(jumps, vec![Opcode::Jz]);

    // flag is zero-initialized: the run takes the else side
    let mut globals = Globals::new();
    let mut runner = Runner::new(&program, 0, &mut globals);
    assert_eq!(runner.run().unwrap(), false);
}
