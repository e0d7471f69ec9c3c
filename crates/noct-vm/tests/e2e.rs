//! End-to-end boundary scenarios (spec §8): compile through `noct-compiler`
//! and drive the resulting bytecode through `Vm::enter`.

use noct_compiler::compile;
use noct_core::lir::{LirFunction, LirModule};
use noct_vm::{Value, Vm, VmConfig};

fn run(src: &str, func: &str) -> Result<Value, noct_vm::VmError> {
    let module = compile("e2e.noct", src).expect("compiles");
    let mut vm = Vm::new(VmConfig::default());
    vm.register_module(module);
    vm.enter(func, &[])
}

#[test]
fn string_concat_stringifies_the_non_string_operand() {
    let v = run(r#"func main(){ return "x" + 1 + "y"; }"#, "main").unwrap();
    match v {
        Value::Str(s) => assert_eq!(&*s, "x1y"),
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn dict_preserves_insertion_order_for_index_access_dot_syntax() {
    let v = run(
        r#"func main(){ var d = class { a: "x", b: "y" }; return d.keyAt(1); }"#,
        "main",
    )
    .unwrap();
    match v {
        Value::Str(s) => assert_eq!(&*s, "b"),
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn dict_preserves_insertion_order_for_index_access_arrow_syntax() {
    let v = run(
        r#"func main(){ var d = class { a: "x", b: "y" }; return d->valAt(1); }"#,
        "main",
    )
    .unwrap();
    match v {
        Value::Str(s) => assert_eq!(&*s, "y"),
        other => panic!("expected string, got {other:?}"),
    }
}

#[test]
fn lambda_is_hoisted_and_callable() {
    let v = run(
        "func main(){ var f = (x) => { return x + 1; }; return f(41); }",
        "main",
    )
    .unwrap();
    assert!(matches!(v, Value::Int(42)));
}

#[test]
fn broken_bytecode_with_an_unrecognized_opcode_fails_at_execution() {
    // A lone 0xFF byte is not a valid opcode (spec §4.7's container layer
    // catches this at load time via `LirFunction::verify`; this constructs
    // a module directly to exercise the interpreter's own decode failure).
    let module = LirModule {
        source_name: "broken.noct".into(),
        functions: vec![LirFunction {
            name: "main".into(),
            params: vec![],
            tmpvar_size: 0,
            bytecode: vec![0xFF],
        }],
    };

    let mut vm = Vm::new(VmConfig::default());
    vm.register_module(module);
    let err = vm.enter("main", &[]).unwrap_err();
    assert_eq!(err, noct_vm::VmError::BrokenBytecode);
}

#[test]
fn arithmetic_with_precedence() {
    let v = run("func main(){ var a = 1 + 2 * 3; return a; }", "main").unwrap();
    assert!(matches!(v, Value::Int(7)));
}

#[test]
fn array_mutation_through_subscript_assignment() {
    let v = run(
        "func main(){ var a = []; a[0] = 10; a[1] = 20; return a[0] + a[1]; }",
        "main",
    )
    .unwrap();
    assert!(matches!(v, Value::Int(30)));
}

#[test]
fn for_range_loop_accumulates() {
    let v = run("func main(){ var s = 0; for (i in 0..5) s += i; return s; }", "main").unwrap();
    assert!(matches!(v, Value::Int(10)));
}

#[test]
fn out_of_range_array_read_is_a_runtime_error() {
    let err = run("func main(){ var a = [1,2]; return a[10]; }", "main").unwrap_err();
    assert_eq!(err, noct_vm::VmError::IndexOutOfRange);
    assert!(err.to_string().to_lowercase().contains("out of range"));
}

#[test]
fn register_bytecode_rejects_a_jump_target_past_the_end() {
    // A JMP whose target is >= the function's bytecode length fails
    // `LirFunction::verify` during `register_bytecode`, before the VM ever
    // runs it (spec §8 boundary scenario 7).
    use noct_core::bytecode;

    let broken = LirModule {
        source_name: "broken.noct".into(),
        functions: vec![LirFunction {
            name: "main".into(),
            params: vec![],
            tmpvar_size: 0,
            bytecode: {
                let mut buf = Vec::new();
                buf.push(0x26); // OpCode::Jmp
                buf.extend_from_slice(&999u32.to_be_bytes());
                buf
            },
        }],
    };

    let container = bytecode::serialize(&broken);
    let mut vm = Vm::new(VmConfig::default());
    let err = vm.register_bytecode(&container).unwrap_err();
    assert!(matches!(err, bytecode::ContainerError::Broken { .. }));
    assert!(err.to_string().contains("Broken bytecode."));
    assert!(err.to_string().contains("main"));
}
