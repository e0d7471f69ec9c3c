//! LIR→C translation back end (spec §4.8).
//!
//! One `L_<name>(env)` C function per LIR function. Operands that are
//! already dynamically-typed values go through `rt_*_helper` runtime
//! entries rather than native C arithmetic, since LIR carries no static
//! types to dispatch on at translation time.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use noct_core::lir::{Instruction, LirFunction, LirModule, OpCode};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("broken bytecode in function '{function}' during C translation")]
    Broken { function: String },
}

/// Translates every function in `module` into one C translation unit,
/// ending with an `init_aot_code` that registers each by its original name
/// (spec §4.8's closing step).
pub fn translate_module(module: &LirModule) -> Result<String, CodegenError> {
    let mut out = String::new();
    writeln!(out, "/* Generated by noct-codegen (C back end). */").unwrap();
    writeln!(out, "#include \"noct_runtime.h\"").unwrap();
    out.push('\n');

    for func in &module.functions {
        out.push_str(&translate_function(func)?);
        out.push('\n');
    }

    writeln!(out, "void init_aot_code(NoctEnv *env) {{").unwrap();
    for func in &module.functions {
        writeln!(out, "    rt_register_aot_helper(env, \"{}\", L_{});", func.name, c_ident(&func.name)).unwrap();
    }
    writeln!(out, "}}").unwrap();
    Ok(out)
}

/// `$lambda0` etc. aren't valid C identifiers; sanitize for use in a symbol
/// name while keeping the original NoctLang name as the registered string.
fn c_ident(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

struct Decoded {
    offset: u32,
    instr: Instruction,
}

fn decode_all(bytecode: &[u8]) -> Option<Vec<Decoded>> {
    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < bytecode.len() {
        let offset = pc as u32;
        let instr = Instruction::decode(bytecode, &mut pc).ok()?;
        out.push(Decoded { offset, instr });
    }
    Some(out)
}

fn jump_target(instr: &Instruction) -> Option<u32> {
    match instr {
        Instruction::Jmp { addr }
        | Instruction::JmpIfTrue { addr, .. }
        | Instruction::JmpIfFalse { addr, .. }
        | Instruction::JmpIfEq { addr, .. } => Some(*addr),
        _ => None,
    }
}

fn translate_function(func: &LirFunction) -> Result<String, CodegenError> {
    let decoded = decode_all(&func.bytecode).ok_or_else(|| CodegenError::Broken { function: func.name.clone() })?;

    let mut labels: BTreeSet<u32> = decoded.iter().filter_map(|d| jump_target(&d.instr)).collect();
    labels.insert(func.bytecode.len() as u32); // fall-through exit, the $return read

    let mut out = String::new();
    writeln!(out, "NoctValue L_{}(NoctEnv *env) {{", c_ident(&func.name)).unwrap();
    writeln!(out, "    NoctValue tmpvar[{}];", func.tmpvar_size.max(1)).unwrap();
    writeln!(out, "    env->tmpvar = tmpvar;").unwrap();
    for (i, _) in func.params.iter().enumerate() {
        writeln!(out, "    tmpvar[{i}] = env->args[{i}];").unwrap();
    }

    for d in &decoded {
        if labels.contains(&d.offset) {
            writeln!(out, "L_pc_{}:", d.offset).unwrap();
        }
        emit_instr(&mut out, &d.instr);
    }
    if labels.contains(&(func.bytecode.len() as u32)) {
        writeln!(out, "L_pc_{}:", func.bytecode.len()).unwrap();
    }
    writeln!(out, "    return tmpvar[{}];", func.params.len()).unwrap();
    writeln!(out, "}}").unwrap();
    Ok(out)
}

fn binary_helper(op: OpCode) -> &'static str {
    use OpCode::*;
    match op {
        Add => "rt_add_helper",
        Sub => "rt_sub_helper",
        Mul => "rt_mul_helper",
        Div => "rt_div_helper",
        Mod => "rt_mod_helper",
        And => "rt_and_helper",
        Or => "rt_or_helper",
        Xor => "rt_xor_helper",
        Shl => "rt_shl_helper",
        Shr => "rt_shr_helper",
        Lt => "rt_lt_helper",
        Lte => "rt_lte_helper",
        Gt => "rt_gt_helper",
        Gte => "rt_gte_helper",
        Eq | Eqi => "rt_eq_helper",
        Neq => "rt_neq_helper",
        _ => unreachable!("not a binary opcode"),
    }
}

fn emit_instr(out: &mut String, instr: &Instruction) {
    match instr {
        Instruction::Nop => {
            writeln!(out, "    ;").unwrap();
        }
        Instruction::Assign { dst, src } => {
            writeln!(out, "    tmpvar[{dst}] = tmpvar[{src}];").unwrap();
        }
        Instruction::IConst { dst, value } => {
            writeln!(out, "    tmpvar[{dst}] = rt_mk_int_helper({value});").unwrap();
        }
        Instruction::FConst { dst, value } => {
            writeln!(out, "    tmpvar[{dst}] = rt_mk_float_helper({value:?});").unwrap();
        }
        Instruction::SConst { dst, value } => {
            writeln!(
                out,
                "    tmpvar[{dst}] = rt_mk_string_helper(env, {:?}, 0x{:08X}u);",
                value.text, value.hash
            )
            .unwrap();
        }
        Instruction::AConst { dst } => {
            writeln!(out, "    tmpvar[{dst}] = rt_mk_array_helper(env);").unwrap();
        }
        Instruction::DConst { dst } => {
            writeln!(out, "    tmpvar[{dst}] = rt_mk_dict_helper(env);").unwrap();
        }
        Instruction::Inc { dst } => {
            writeln!(out, "    tmpvar[{dst}] = rt_inc_helper(tmpvar[{dst}]);").unwrap();
        }
        Instruction::Neg { dst, src } => {
            writeln!(out, "    tmpvar[{dst}] = rt_neg_helper(tmpvar[{src}]);").unwrap();
        }
        Instruction::Not { dst, src } => {
            writeln!(out, "    tmpvar[{dst}] = rt_not_helper(tmpvar[{src}]);").unwrap();
        }
        Instruction::Binary { op, dst, lhs, rhs } => {
            writeln!(out, "    tmpvar[{dst}] = {}(env, tmpvar[{lhs}], tmpvar[{rhs}]);", binary_helper(*op)).unwrap();
        }
        Instruction::LoadArray { dst, arr, key } => {
            writeln!(out, "    tmpvar[{dst}] = rt_loadarray_helper(env, tmpvar[{arr}], tmpvar[{key}]);").unwrap();
        }
        Instruction::StoreArray { arr, key, value } => {
            writeln!(out, "    rt_storearray_helper(env, tmpvar[{arr}], tmpvar[{key}], tmpvar[{value}]);").unwrap();
        }
        Instruction::Len { dst, src } => {
            writeln!(out, "    tmpvar[{dst}] = rt_len_helper(env, tmpvar[{src}]);").unwrap();
        }
        Instruction::GetDictKeyByIndex { dst, dict, index } => {
            writeln!(out, "    tmpvar[{dst}] = rt_dict_key_at_helper(env, tmpvar[{dict}], tmpvar[{index}]);").unwrap();
        }
        Instruction::GetDictValByIndex { dst, dict, index } => {
            writeln!(out, "    tmpvar[{dst}] = rt_dict_val_at_helper(env, tmpvar[{dict}], tmpvar[{index}]);").unwrap();
        }
        Instruction::StoreDot { obj, field, value } => {
            writeln!(
                out,
                "    rt_storedot_helper(env, tmpvar[{obj}], {:?}, 0x{:08X}u, tmpvar[{value}]);",
                field.text, field.hash
            )
            .unwrap();
        }
        Instruction::LoadDot { dst, obj, field } => {
            writeln!(
                out,
                "    tmpvar[{dst}] = rt_loaddot_helper(env, tmpvar[{obj}], {:?}, 0x{:08X}u);",
                field.text, field.hash
            )
            .unwrap();
        }
        Instruction::StoreSymbol { name, src } => {
            writeln!(
                out,
                "    rt_store_global_helper(env, {:?}, 0x{:08X}u, tmpvar[{src}]);",
                name.text, name.hash
            )
            .unwrap();
        }
        Instruction::LoadSymbol { dst, name } => {
            writeln!(
                out,
                "    tmpvar[{dst}] = rt_load_global_helper(env, {:?}, 0x{:08X}u);",
                name.text, name.hash
            )
            .unwrap();
        }
        Instruction::Call { dst, func, args } => {
            let argv: Vec<String> = args.iter().map(|a| format!("tmpvar[{a}]")).collect();
            writeln!(out, "    {{").unwrap();
            writeln!(out, "        NoctValue argv[] = {{ {} }};", argv.join(", ")).unwrap();
            writeln!(
                out,
                "        tmpvar[{dst}] = rt_call_helper(env, tmpvar[{func}], argv, {});",
                args.len()
            )
            .unwrap();
            writeln!(out, "    }}").unwrap();
        }
        Instruction::ThisCall { dst, recv, name, args } => {
            let argv: Vec<String> = args.iter().map(|a| format!("tmpvar[{a}]")).collect();
            writeln!(out, "    {{").unwrap();
            writeln!(out, "        NoctValue argv[] = {{ {} }};", argv.join(", ")).unwrap();
            writeln!(
                out,
                "        tmpvar[{dst}] = rt_thiscall_helper(env, tmpvar[{recv}], {:?}, 0x{:08X}u, argv, {});",
                name.text,
                name.hash,
                args.len()
            )
            .unwrap();
            writeln!(out, "    }}").unwrap();
        }
        Instruction::Jmp { addr } => {
            writeln!(out, "    goto L_pc_{addr};").unwrap();
        }
        Instruction::JmpIfTrue { cond, addr } => {
            writeln!(out, "    if (rt_truthy_helper(tmpvar[{cond}])) goto L_pc_{addr};").unwrap();
        }
        Instruction::JmpIfFalse { cond, addr } => {
            writeln!(out, "    if (!rt_truthy_helper(tmpvar[{cond}])) goto L_pc_{addr};").unwrap();
        }
        Instruction::JmpIfEq { cond, addr } => {
            // JIT hint only (spec §9); the AOT translation treats it the
            // same as JMPIFTRUE, matching the interpreter.
            writeln!(out, "    if (rt_truthy_helper(tmpvar[{cond}])) goto L_pc_{addr};").unwrap();
        }
        Instruction::LineInfo { line } => {
            writeln!(out, "    env->line = {line};").unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noct_compiler::compile;

    #[test]
    fn translates_arithmetic_function_with_runtime_helpers() {
        let module = compile("t.noct", "func main(){ var a = 1 + 2; return a; }").unwrap();
        let c = translate_module(&module).unwrap();
        assert!(c.contains("NoctValue L_main(NoctEnv *env)"));
        assert!(c.contains("rt_add_helper"));
        assert!(c.contains("init_aot_code"));
    }

    #[test]
    fn branch_targets_become_local_labels() {
        let module = compile("t.noct", "func main(){ if (1) { return 1; } return 0; }").unwrap();
        let c = translate_module(&module).unwrap();
        assert!(c.contains("goto L_pc_"));
        assert!(c.contains("L_pc_"));
    }

    #[test]
    fn generated_c_and_the_interpreter_agree_on_which_constants_feed_which_helper() {
        // Spec §8's round-trip property ("executing LIR and executing the
        // C-translated output yield identical return values" for pure
        // arithmetic) can't be checked by actually invoking a C compiler
        // here; this instead checks the translated text reflects the exact
        // same constants and helper the interpreter itself would combine,
        // by running the LIR through the VM and the C back end side by side.
        let src = "func main(){ var a = 3 * 4; return a; }";
        let module = compile("t.noct", src).unwrap();
        let mut vm = noct_vm::Vm::new(noct_vm::VmConfig::default());
        vm.register_module(module.clone());
        let result = vm.enter("main", &[]).unwrap();
        assert!(matches!(result, noct_vm::Value::Int(12)));

        let c = translate_module(&module).unwrap();
        assert!(c.contains("rt_mk_int_helper(3)"));
        assert!(c.contains("rt_mk_int_helper(4)"));
        assert!(c.contains("rt_mul_helper"));
    }
}
