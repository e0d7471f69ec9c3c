//! The interactive REPL (spec §6).
//!
//! A single line is wrapped in a synthetic `func repl(){ ... }` and run
//! immediately. A line that opens with `func`, `if`, `for`, or `while`
//! switches to multi-line mode: input keeps accumulating until the brace
//! count returned to zero, at which point a `func` definition is compiled
//! and registered (not invoked) while anything else is wrapped the same
//! way a single line is and then invoked. A syntax error reports through
//! the same `(source, line, message)` shape as every other stage and
//! leaves the VM and history alone — it never aborts the session.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use noct_compiler::compile;
use noct_vm::{Value, Vm};

use crate::colors::{cyan, gray, green, red};

const MULTILINE_OPENERS: &[&str] = &["func", "if", "for", "while"];

fn brace_balance(src: &str) -> i64 {
    let mut depth = 0i64;
    for c in src.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn first_token(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

fn wrap_as_repl_func(body: &str) -> String {
    format!("func repl(){{ {body} }}")
}

pub fn run(vm: &mut Vm) {
    println!("{}", cyan("NoctLang REPL"));
    println!("{}", gray("Ctrl-D or :quit to exit."));

    let mut rl = DefaultEditor::new().expect("failed to create line editor");
    let mut buffer = String::new();
    let mut repl_seq = 0u32;

    loop {
        let prompt = if buffer.is_empty() { format!("{} ", green("noct>")) } else { format!("{}   ", gray("...")) };
        match rl.readline(&prompt) {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());

                if buffer.is_empty() {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    if MULTILINE_OPENERS.contains(&first_token(trimmed)) {
                        buffer.push_str(&line);
                        buffer.push('\n');
                        if brace_balance(&buffer) <= 0 {
                            // A one-line `if (x) y;` with no braces at all
                            // never enters multi-line mode; flush right away.
                            run_accumulated(vm, std::mem::take(&mut buffer), &mut repl_seq);
                        }
                        continue;
                    }
                    run_single_line(vm, trimmed, &mut repl_seq);
                } else {
                    buffer.push_str(&line);
                    buffer.push('\n');
                    if brace_balance(&buffer) <= 0 {
                        run_accumulated(vm, std::mem::take(&mut buffer), &mut repl_seq);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}", red(&format!("readline error: {e}")));
                break;
            }
        }
    }
}

fn run_single_line(vm: &mut Vm, line: &str, repl_seq: &mut u32) {
    let src = wrap_as_repl_func(line);
    *repl_seq += 1;
    let name = format!("$repl{repl_seq}");
    match compile(&name, &src) {
        Ok(module) => {
            vm.register_module(module);
            match vm.enter("repl", &[]) {
                Ok(Value::Null) => {}
                Ok(v) => println!("{v:?}"),
                Err(e) => eprintln!("{}", red(&format!("REPL:0: {e}"))),
            }
        }
        Err(e) => eprintln!("{}", red(&format!("REPL:{}: {e}", e.line()))),
    }
}

/// A multi-line chunk that opened with `func` compiles and registers its
/// functions without invoking them; any other opener (`if`/`for`/`while`)
/// is wrapped the same way a single line is and then invoked.
fn run_accumulated(vm: &mut Vm, src: String, repl_seq: &mut u32) {
    let trimmed = src.trim_start();
    *repl_seq += 1;
    let name = format!("$repl{repl_seq}");
    if trimmed.starts_with("func") {
        match compile(&name, &src) {
            Ok(module) => {
                let names: Vec<String> = module.functions.iter().map(|f| f.name.clone()).collect();
                vm.register_module(module);
                for n in names {
                    println!("{}", gray(&format!("defined {n}")));
                }
            }
            Err(e) => eprintln!("{}", red(&format!("REPL:{}: {e}", e.line()))),
        }
        return;
    }

    let wrapped = wrap_as_repl_func(&src);
    match compile(&name, &wrapped) {
        Ok(module) => {
            vm.register_module(module);
            match vm.enter("repl", &[]) {
                Ok(Value::Null) => {}
                Ok(v) => println!("{v:?}"),
                Err(e) => eprintln!("{}", red(&format!("REPL:0: {e}"))),
            }
        }
        Err(e) => eprintln!("{}", red(&format!("REPL:{}: {e}", e.line()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noct_vm::VmConfig;

    #[test]
    fn brace_balance_tracks_nesting() {
        assert_eq!(brace_balance("func f(){"), 1);
        assert_eq!(brace_balance("func f(){ if (x) {"), 2);
        assert_eq!(brace_balance("}"), -1);
        assert_eq!(brace_balance("no braces here"), 0);
    }

    #[test]
    fn first_token_splits_on_whitespace() {
        assert_eq!(first_token("func f(){"), "func");
        assert_eq!(first_token("  while (x) {"), "while");
        assert_eq!(first_token(""), "");
    }

    #[test]
    fn a_func_chunk_registers_without_invoking() {
        let mut vm = Vm::new(VmConfig::default());
        let mut seq = 0u32;
        run_accumulated(&mut vm, "func f(){ return 42; }\n".to_string(), &mut seq);
        assert!(matches!(vm.enter("f", &[]), Ok(Value::Int(42))));
    }

    #[test]
    fn a_registered_function_is_callable_from_a_later_single_line() {
        // Mirrors spec §8 boundary scenario 8: feeding `func f(){`, `  return 42;`,
        // `}` registers `f`, then a later `return f();`-style line invokes it.
        // `run_single_line` only prints its result, so this drives the same
        // wrap-then-compile-then-enter pipeline directly to observe the value.
        let mut vm = Vm::new(VmConfig::default());
        let mut seq = 0u32;
        run_accumulated(&mut vm, "func f(){ return 42; }\n".to_string(), &mut seq);

        let wrapped = wrap_as_repl_func("return f();");
        let module = compile("repl-test", &wrapped).expect("compiles");
        vm.register_module(module);
        assert!(matches!(vm.enter("repl", &[]), Ok(Value::Int(42))));
    }
}
