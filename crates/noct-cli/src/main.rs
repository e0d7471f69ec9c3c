//! The `noct` command-line tool (spec §6 CLI surface).
//!
//! Bare invocation starts the REPL; a single file argument runs it,
//! disambiguating a compiled `.nb` container from source text by its magic
//! string. `--compile` emits one `.nb` per input. `--ansic`/`--elisp`
//! translate to the two source-to-source back ends.

mod colors;
mod repl;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use colors::red;
use noct_codegen::{translate_to_c, translate_to_lisp};
use noct_compiler::{compile, hir, Lexer, Parser as NoctParser};
use noct_core::bytecode;
use noct_vm::{Value, Vm, VmConfig};

#[derive(Parser)]
#[command(name = "noct", version, about = "NoctLang compiler, VM, and translation back ends")]
struct Cli {
    /// Source or bytecode file to run. Omitted entirely, this starts the REPL.
    file: Option<PathBuf>,

    /// Compile each input to its own `.nb` bytecode container.
    #[arg(long, num_args = 1.., value_name = "FILES")]
    compile: Option<Vec<PathBuf>>,

    /// Translate to C: the first value is the output path, the rest are source inputs.
    #[arg(long, num_args = 2.., value_name = "OUT_THEN_INPUTS")]
    ansic: Option<Vec<PathBuf>>,

    /// Translate to Emacs Lisp: the first value is the output path, the rest are source inputs.
    #[arg(long, num_args = 2.., value_name = "OUT_THEN_INPUTS")]
    elisp: Option<Vec<PathBuf>>,

    /// Never promote a hot function to the baseline JIT.
    #[arg(long, conflicts_with = "force_jit")]
    disable_jit: bool,

    /// Promote every function to the baseline JIT on its first call.
    #[arg(long)]
    force_jit: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = if let Some(files) = cli.compile.clone() {
        run_compile(&files)
    } else if let Some(args) = cli.ansic.clone() {
        run_ansic(&args)
    } else if let Some(args) = cli.elisp.clone() {
        run_elisp(&args)
    } else if let Some(file) = cli.file.clone() {
        run_file(&file, &cli)
    } else {
        let mut vm = Vm::new(vm_config(&cli));
        register_builtins(&mut vm);
        repl::run(&mut vm);
        Ok(())
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{}", red(&msg));
            ExitCode::FAILURE
        }
    }
}

fn vm_config(cli: &Cli) -> VmConfig {
    let mut config = VmConfig::default();
    if cli.disable_jit {
        config.jit_enabled = false;
    } else if cli.force_jit {
        config.jit_enabled = true;
        config.jit_threshold = 0;
    }
    config
}

/// Registers the reference driver's FFI surface (the one script-visible
/// native function it ships, beyond the core language itself).
fn register_builtins(vm: &mut Vm) {
    vm.register_native("print", |vm, args| {
        let line = vm.current_line();
        let value = args.first().cloned().unwrap_or(Value::Null);
        let text = vm.stringify(&value, line)?;
        println!("{text}");
        Ok(Value::Null)
    });
}

fn read_source(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))
}

/// Runs `<tool> <file>`: a `.nb` container is deserialized and entered
/// directly, anything else is treated as NoctLang source and compiled first
/// (spec §6's magic-string disambiguation).
fn run_file(path: &Path, cli: &Cli) -> Result<(), String> {
    let bytes = fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut vm = Vm::new(vm_config(cli));
    register_builtins(&mut vm);

    if bytecode::has_bytecode_magic(&bytes) {
        tracing::debug!(file = %path.display(), "loading precompiled bytecode container");
        vm.register_bytecode(&bytes).map_err(|e| format!("{}: {e}", path.display()))?;
    } else {
        let src = String::from_utf8(bytes).map_err(|_| format!("{}: not valid UTF-8", path.display()))?;
        let name = path.display().to_string();
        tracing::debug!(file = %name, "compiling source file");
        let module = compile(&name, &src).map_err(|e| format!("{name}:{}: {e}", e.line()))?;
        vm.register_module(module);
    }

    match vm.enter("main", &[]) {
        Ok(_) => Ok(()),
        Err(e) => Err(format!("{}: {e}", path.display())),
    }
}

fn run_compile(files: &[PathBuf]) -> Result<(), String> {
    for path in files {
        let src = read_source(path)?;
        let name = path.display().to_string();
        let module = compile(&name, &src).map_err(|e| format!("{name}:{}: {e}", e.line()))?;
        let out_path = path.with_extension("nb");
        fs::write(&out_path, bytecode::serialize(&module)).map_err(|e| format!("{}: {e}", out_path.display()))?;
        println!("wrote {}", out_path.display());
    }
    Ok(())
}

fn run_ansic(args: &[PathBuf]) -> Result<(), String> {
    let (out, inputs) = args.split_first().expect("clap enforces at least 2 values");
    let mut combined = String::new();
    for path in inputs {
        let src = read_source(path)?;
        let name = path.display().to_string();
        let module = compile(&name, &src).map_err(|e| format!("{name}:{}: {e}", e.line()))?;
        let c = translate_to_c(&module).map_err(|e| format!("{name}: {e}"))?;
        combined.push_str(&c);
        combined.push('\n');
    }
    fs::write(out, combined).map_err(|e| format!("{}: {e}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

fn run_elisp(args: &[PathBuf]) -> Result<(), String> {
    let (out, inputs) = args.split_first().expect("clap enforces at least 2 values");
    let mut combined = String::new();
    for path in inputs {
        let src = read_source(path)?;
        let name = path.display().to_string();
        let hir_module = build_hir(&name, &src)?;
        let lisp = translate_to_lisp(&hir_module).map_err(|e| format!("{name}: {e}"))?;
        combined.push_str(&lisp);
        combined.push('\n');
    }
    fs::write(out, combined).map_err(|e| format!("{}: {e}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}

/// The Lisp back end consumes HIR directly (spec §4.9), so this bypasses
/// `compile`'s LIR lowering and verification stages.
fn build_hir(name: &str, src: &str) -> Result<hir::HirModule, String> {
    let tokens = Lexer::new(src).tokenize().map_err(|e| format!("{name}:{}: {e}", e.line()))?;
    let program = NoctParser::new(tokens).parse_program().map_err(|e| format!("{name}:{}: {e}", e.line()))?;
    hir::build(name, &program).map_err(|e| format!("{name}:{}: {e}", e.line()))
}
