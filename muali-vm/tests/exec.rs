//! Handler-level tests over hand-assembled code.

use std::rc::Rc;

use muali_asm::{CmpKind, Encoder, FaultReason, Function, Imm, Opcode, Program};
use muali_vm::{Interpreter, Value};

fn function(
    num_args: usize,
    num_vars: usize,
    num_regs: usize,
    build: impl FnOnce(&mut Encoder),
) -> Function {
    let mut enc = Encoder::new();
    build(&mut enc);
    enc.push_u8(0x00); // sentinel
    Function {
        code: enc.into_code(),
        num_args,
        num_vars,
        num_regs,
    }
}

fn program_of(funcs: Vec<Function>) -> Program {
    let mut program = Program::default();
    for (index, func) in funcs.into_iter().enumerate() {
        program.func_names.insert(format!("f{index}"), index);
        program.funcs.push(Rc::new(func));
    }
    program
}

fn run(funcs: Vec<Function>, args: Vec<Value>) -> Result<Value, muali_vm::InterpreterError> {
    Interpreter::new(program_of(funcs)).call_func_by_name("f0", args)
}

#[test]
fn set_and_setimm_move_values_between_registers() {
    let f = function(0, 0, 2, |enc| {
        enc.push_op(Opcode::SETIMM);
        enc.push_reg(0);
        enc.push_imm(Imm::Int(7));
        enc.push_op(Opcode::SET);
        enc.push_reg(1);
        enc.push_reg(0);
        enc.push_op(Opcode::RETURNVAL);
        enc.push_reg(1);
    });
    assert_eq!(run(vec![f], vec![]).unwrap(), Value::Int(7));
}

#[test]
fn wide_opcodes_execute_through_the_two_byte_fetch() {
    let f = function(0, 0, 2, |enc| {
        enc.push_op(Opcode::SETIMM);
        enc.push_reg(0);
        enc.push_imm(Imm::Float(1.5));
        enc.push_op(Opcode::SETIMM);
        enc.push_reg(1);
        enc.push_imm(Imm::Float(2.0));
        enc.push_op(Opcode::ADD_FF);
        enc.push_reg(0);
        enc.push_reg(1);
        enc.push_op(Opcode::RETURNVAL);
        enc.push_reg(0);
    });
    assert_eq!(run(vec![f], vec![]).unwrap(), Value::Float(3.5));
}

#[test]
fn call_passes_arguments_and_stores_the_result() {
    let caller = function(0, 0, 2, |enc| {
        enc.push_op(Opcode::SETIMM);
        enc.push_reg(1);
        enc.push_imm(Imm::Int(40));
        enc.push_op(Opcode::CALL);
        enc.push_reg(1); // callee index
        enc.push_reg(0); // result register
        enc.push_u8(1);
        enc.push_reg(1); // argument
        enc.push_op(Opcode::RETURNVAL);
        enc.push_reg(0);
    });
    let callee = function(1, 1, 0, |enc| {
        enc.push_op(Opcode::ADDIMM);
        enc.push_reg(0);
        enc.push_imm(Imm::Int(2));
        enc.push_op(Opcode::RETURNVAL);
        enc.push_reg(0);
    });
    assert_eq!(run(vec![caller, callee], vec![]).unwrap(), Value::Int(42));
}

#[test]
fn call_with_the_wrong_arity_faults() {
    let caller = function(0, 1, 0, |enc| {
        enc.push_op(Opcode::CALL);
        enc.push_reg(1); // callee expects no arguments
        enc.push_reg(0);
        enc.push_u8(1);
        enc.push_reg(0);
    });
    let callee = function(0, 0, 0, |enc| {
        enc.push_op(Opcode::RETURNIMM);
        enc.push_imm(Imm::Null);
    });
    let err = run(vec![caller, callee], vec![]).unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::ArityFault));
}

#[test]
fn call_to_a_missing_function_index_faults() {
    let caller = function(0, 0, 1, |enc| {
        enc.push_op(Opcode::CALLDISCARD);
        enc.push_reg(9);
        enc.push_u8(0);
    });
    let err = run(vec![caller], vec![]).unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::UnknownFunction));
}

#[test]
fn indirect_calls_go_through_func_values() {
    let caller = function(1, 1, 1, |enc| {
        enc.push_op(Opcode::CALL_INDIRECT);
        enc.push_reg(0); // register holding the callee
        enc.push_reg(1); // result register
        enc.push_u8(0);
        enc.push_op(Opcode::RETURNVAL);
        enc.push_reg(1);
    });
    let callee = function(0, 0, 0, |enc| {
        enc.push_op(Opcode::RETURNIMM);
        enc.push_imm(Imm::Int(42));
    });

    let program = program_of(vec![caller, callee]);
    let callee_ref = Rc::clone(&program.funcs[1]);
    let mut vm = Interpreter::new(program);
    let result = vm
        .call_func_by_name("f0", vec![Value::Func(callee_ref)])
        .unwrap();
    assert_eq!(result, Value::Int(42));

    let err = vm
        .call_func_by_name("f0", vec![Value::Int(3)])
        .unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::TypeFault));
}

#[test]
fn become_reuses_the_frame_for_deep_tail_recursion() {
    // f0(n): if n < 100000 { n += 1; become f0(n) } else return n.
    // Recursing through CALL at this depth would exhaust the host stack;
    // the tail call must not.
    let f = function(1, 1, 0, |enc| {
        enc.push_op(Opcode::JILTIMM);
        enc.push_reg(0);
        enc.push_i64(100_000);
        let patch = enc.len();
        enc.push_i32(0);
        enc.push_op(Opcode::RETURNVAL);
        enc.push_reg(0);
        let target = enc.len();
        enc.patch_i32(patch, (target - (patch + 4)) as i32);
        enc.push_op(Opcode::INCI);
        enc.push_reg(0);
        enc.push_op(Opcode::BECOME);
        enc.push_reg(0); // own function index
        enc.push_u8(1);
        enc.push_reg(0);
    });
    assert_eq!(
        run(vec![f], vec![Value::Int(0)]).unwrap(),
        Value::Int(100_000)
    );
}

#[test]
fn exit_unwinds_nested_calls() {
    // f0 calls f1, which exits; f0's trailing return must not run.
    let caller = function(0, 0, 0, |enc| {
        enc.push_op(Opcode::CALLDISCARD);
        enc.push_reg(1);
        enc.push_u8(0);
        enc.push_op(Opcode::RETURNIMM);
        enc.push_imm(Imm::Int(7));
    });
    let callee = function(0, 0, 0, |enc| {
        enc.push_op(Opcode::EXIT);
    });
    assert_eq!(run(vec![caller, callee], vec![]).unwrap(), Value::Null);
}

#[test]
fn globals_are_indexed_slots() {
    let f = function(0, 0, 2, |enc| {
        enc.push_op(Opcode::SETGLOBALIMM);
        enc.push_reg(0);
        enc.push_imm(Imm::Int(9));
        enc.push_op(Opcode::GETGLOBAL);
        enc.push_reg(0);
        enc.push_reg(0);
        enc.push_op(Opcode::SETGLOBAL);
        enc.push_reg(1);
        enc.push_reg(0);
        enc.push_op(Opcode::RETURNVAL);
        enc.push_reg(0);
    });
    let mut program = program_of(vec![f]);
    program.var_names.insert("a".into(), 0);
    program.var_names.insert("b".into(), 1);

    let mut vm = Interpreter::new(program);
    assert_eq!(vm.call_func_by_name("f0", vec![]).unwrap(), Value::Int(9));
    assert_eq!(vm.global("a"), Some(&Value::Int(9)));
    assert_eq!(vm.global("b"), Some(&Value::Int(9)));
}

#[test]
fn global_access_outside_the_table_faults() {
    let f = function(0, 0, 1, |enc| {
        enc.push_op(Opcode::GETGLOBAL);
        enc.push_reg(0);
        enc.push_reg(3);
    });
    let err = run(vec![f], vec![]).unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::UnknownGlobal));
}

#[test]
fn conditional_jumps_follow_truthiness() {
    // f0(x): if x { return 1 } else { return 2 }
    let f = || {
        function(1, 1, 0, |enc| {
            enc.push_op(Opcode::JIF);
            enc.push_reg(0);
            let patch = enc.len();
            enc.push_i32(0);
            enc.push_op(Opcode::RETURNIMM);
            enc.push_imm(Imm::Int(2));
            let target = enc.len();
            enc.patch_i32(patch, (target - (patch + 4)) as i32);
            enc.push_op(Opcode::RETURNIMM);
            enc.push_imm(Imm::Int(1));
        })
    };
    for (arg, expected) in [
        (Value::Int(5), 1),
        (Value::Int(0), 2),
        (Value::Bool(true), 1),
        (Value::Float(0.0), 2),
        (Value::Null, 2),
    ] {
        assert_eq!(run(vec![f()], vec![arg]).unwrap(), Value::Int(expected));
    }

    // Heap values have no truthiness.
    let err = run(vec![f()], vec![Value::str("yes")]).unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::TypeFault));
}

#[test]
fn null_tests_jump_on_the_tag_alone() {
    // f0(x): if x == null { return 1 } else { return 0 }
    let f = || {
        function(1, 1, 0, |enc| {
            enc.push_op(Opcode::JIFNULL);
            enc.push_reg(0);
            let patch = enc.len();
            enc.push_i32(0);
            enc.push_op(Opcode::RETURNIMM);
            enc.push_imm(Imm::Int(0));
            let target = enc.len();
            enc.patch_i32(patch, (target - (patch + 4)) as i32);
            enc.push_op(Opcode::RETURNIMM);
            enc.push_imm(Imm::Int(1));
        })
    };
    assert_eq!(run(vec![f()], vec![Value::Null]).unwrap(), Value::Int(1));
    assert_eq!(
        run(vec![f()], vec![Value::str("")]).unwrap(),
        Value::Int(0)
    );
}

#[test]
fn compare_and_jump_coerces_numeric_tags() {
    // f0(x): if x < 10 { return 1 } else { return 0 }
    let f = || {
        function(1, 1, 0, |enc| {
            enc.push_op(Opcode::JCMPIMM);
            enc.push_reg(0);
            enc.push_u8(CmpKind::Lt as u8);
            enc.push_imm(Imm::Int(10));
            let patch = enc.len();
            enc.push_i32(0);
            enc.push_op(Opcode::RETURNIMM);
            enc.push_imm(Imm::Int(0));
            let target = enc.len();
            enc.patch_i32(patch, (target - (patch + 4)) as i32);
            enc.push_op(Opcode::RETURNIMM);
            enc.push_imm(Imm::Int(1));
        })
    };
    assert_eq!(run(vec![f()], vec![Value::Int(3)]).unwrap(), Value::Int(1));
    assert_eq!(
        run(vec![f()], vec![Value::Float(9.5)]).unwrap(),
        Value::Int(1)
    );
    assert_eq!(
        run(vec![f()], vec![Value::Int(10)]).unwrap(),
        Value::Int(0)
    );
}

#[test]
fn the_sentinel_and_unassigned_opcodes_fault() {
    let empty = Function {
        code: vec![0x00],
        num_args: 0,
        num_vars: 0,
        num_regs: 0,
    };
    let err = run(vec![empty], vec![]).unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::UnknownOpcode));

    let unassigned = Function {
        code: vec![0x7d, 0x00],
        num_args: 0,
        num_vars: 0,
        num_regs: 0,
    };
    let err = run(vec![unassigned], vec![]).unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::UnknownOpcode));
}

#[test]
fn explicit_fault_reports_its_opcode() {
    let f = function(0, 0, 0, |enc| {
        enc.push_op(Opcode::FAULT);
    });
    let err = run(vec![f], vec![]).unwrap_err();
    let muali_vm::InterpreterError::Fault(fault) = err else {
        panic!("expected a fault");
    };
    assert_eq!(fault.reason(), FaultReason::ExplicitFault);
    assert_eq!(fault.opcode(), Opcode::FAULT.raw());
}

#[test]
fn running_off_the_end_without_a_sentinel_faults() {
    let f = Function {
        code: Vec::new(),
        num_args: 0,
        num_vars: 0,
        num_regs: 0,
    };
    let err = run(vec![f], vec![]).unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::CodeOverrun));
}

#[test]
fn register_operands_are_bounds_checked() {
    let f = function(0, 0, 1, |enc| {
        enc.push_op(Opcode::SET);
        enc.push_reg(5);
        enc.push_reg(0);
    });
    let err = run(vec![f], vec![]).unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::RegisterOutOfBounds));
}

#[test]
fn constant_loads_cover_every_variant() {
    let cases: Vec<(Opcode, Value)> = vec![
        (Opcode::SETNULL, Value::Null),
        (Opcode::SETZEROI, Value::Int(0)),
        (Opcode::SETZEROF, Value::Float(0.0)),
        (Opcode::SETONEI, Value::Int(1)),
        (Opcode::SETONEF, Value::Float(1.0)),
        (Opcode::SETNEGONEI, Value::Int(-1)),
        (Opcode::SETNEGONEF, Value::Float(-1.0)),
        (Opcode::SETTRUE, Value::Bool(true)),
        (Opcode::SETFALSE, Value::Bool(false)),
        (Opcode::SETEMPTYSTR, Value::str("")),
    ];
    for (opcode, expected) in cases {
        let f = function(0, 0, 1, |enc| {
            enc.push_op(opcode);
            enc.push_reg(0);
            enc.push_op(Opcode::RETURNVAL);
            enc.push_reg(0);
        });
        assert_eq!(run(vec![f], vec![]).unwrap(), expected, "{opcode}");
    }
}

#[test]
fn empty_containers_load_and_compare_by_identity() {
    let f = function(0, 0, 1, |enc| {
        enc.push_op(Opcode::SETEMPTYARRAY);
        enc.push_reg(0);
        enc.push_op(Opcode::RETURNVAL);
        enc.push_reg(0);
    });
    let result = run(vec![f], vec![]).unwrap();
    assert!(matches!(result, Value::Array(ref a) if a.borrow().is_empty()));
}

#[test]
fn conversions_chain_in_registers() {
    // tostring(12) == "12"
    let f = function(1, 1, 0, |enc| {
        enc.push_op(Opcode::TOSTRING);
        enc.push_reg(0);
        enc.push_op(Opcode::RETURNVAL);
        enc.push_reg(0);
    });
    assert_eq!(
        run(vec![f], vec![Value::Int(12)]).unwrap(),
        Value::str("12")
    );
}

#[test]
fn jump_targets_outside_the_code_fault() {
    let f = function(0, 0, 0, |enc| {
        enc.push_op(Opcode::J);
        enc.push_i32(-100);
    });
    let err = run(vec![f], vec![]).unwrap_err();
    assert_eq!(err.fault_reason(), Some(FaultReason::JumpOutOfBounds));
}

#[cfg(feature = "debug")]
#[test]
fn previous_opcode_tracking_decorates_faults() {
    let f = function(0, 0, 1, |enc| {
        enc.push_op(Opcode::SETZEROI);
        enc.push_reg(0);
        enc.push_op(Opcode::FAULT);
    });
    let err = run(vec![f], vec![]).unwrap_err();
    let muali_vm::InterpreterError::Fault(fault) = err else {
        panic!("expected a fault");
    };
    assert_eq!(fault.previous(), Some(Opcode::SETZEROI.raw()));
}
