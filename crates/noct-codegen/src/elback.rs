//! HIR→Emacs-Lisp translation back end (spec §4.9).
//!
//! Unlike the C back end this one consumes HIR rather than LIR: Lisp's
//! `cond`/`while`/`dolist` already give us structured control flow, so
//! there is no need to flatten to jump targets first. One `defun` per
//! `HirFunction`; `$return` becomes a `catch`/`throw` tag rather than a
//! plain local, since a `return` can fire from arbitrarily deep inside
//! nested blocks.

use std::fmt::Write as _;

use indexmap::IndexSet;
use noct_compiler::ast::{AssignOp, BinOp, Expr, IncDecOp, LValue, LogicalOp, UnOp};
use noct_compiler::hir::{HirBlock, HirFunction, HirModule, HirStmt, RETURN_SLOT};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("lambda literal reached the Lisp back end in function '{function}' (should have been hoisted)")]
    UnhoistedLambda { function: String },
}

/// Translates every function in `module` into one Emacs Lisp source string.
pub fn translate_module(module: &HirModule) -> Result<String, CodegenError> {
    let mut out = String::new();
    writeln!(out, ";;; Generated by noct-codegen (Lisp back end).").unwrap();
    out.push('\n');
    for func in &module.functions {
        out.push_str(&translate_function(func)?);
        out.push('\n');
    }
    Ok(out)
}

fn mangle(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    format!("v-{cleaned}")
}

fn fn_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    format!("noct--{cleaned}")
}

struct Ctx<'a> {
    function: &'a str,
    locals: &'a IndexSet<String>,
    tmp_counter: u32,
}

impl<'a> Ctx<'a> {
    fn fresh_tmp(&mut self) -> String {
        let n = self.tmp_counter;
        self.tmp_counter += 1;
        format!("v-tmp-{n}")
    }
}

fn translate_function(func: &HirFunction) -> Result<String, CodegenError> {
    let mut ctx = Ctx { function: &func.name, locals: &func.locals, tmp_counter: 0 };

    let params: Vec<String> = func.params.iter().map(|p| mangle(p)).collect();
    let extra_locals: Vec<&String> = func.locals.iter().filter(|l| !func.params.contains(l)).collect();

    let mut out = String::new();
    writeln!(out, "(defun {} ({})", fn_name(&func.name), params.join(" ")).unwrap();
    write!(out, "  (let (").unwrap();
    for (i, l) in extra_locals.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write!(out, "({} nil)", mangle(l)).unwrap();
    }
    writeln!(out, ")").unwrap();
    writeln!(out, "    (catch 'noct-return").unwrap();
    for form in translate_blocks(&func.body, &mut ctx)? {
        writeln!(out, "      {form}").unwrap();
    }
    writeln!(out, "      nil)").unwrap();
    writeln!(out, "    {})", mangle(RETURN_SLOT)).unwrap();
    writeln!(out, "  )").unwrap();
    Ok(out)
}

fn translate_blocks(blocks: &[HirBlock], ctx: &mut Ctx) -> Result<Vec<String>, CodegenError> {
    let mut forms = Vec::new();
    for block in blocks {
        match block {
            HirBlock::End => {}
            HirBlock::Basic(stmts) => {
                for stmt in stmts {
                    forms.push(translate_stmt(stmt, ctx)?);
                }
            }
            HirBlock::If { branches, else_branch } => {
                let mut clauses = Vec::new();
                for (cond, body) in branches {
                    let cond_form = translate_expr(cond, ctx)?;
                    let body_forms = translate_blocks(body, ctx)?;
                    clauses.push(format!("((noct-truthy {cond_form}) {})", body_forms.join(" ")));
                }
                let else_forms = match else_branch {
                    Some(body) => translate_blocks(body, ctx)?,
                    None => Vec::new(),
                };
                clauses.push(format!("(t {})", else_forms.join(" ")));
                forms.push(format!("(cond {})", clauses.join(" ")));
            }
            HirBlock::While { cond, body } => {
                let cond_form = translate_expr(cond, ctx)?;
                let body_forms = translate_blocks(body, ctx)?;
                forms.push(format!(
                    "(catch 'noct-break (while (noct-truthy {cond_form}) (catch 'noct-continue {})))",
                    body_forms.join(" ")
                ));
            }
            HirBlock::ForRange { var, start, end, body } => {
                let v = mangle(var);
                let start_form = translate_expr(start, ctx)?;
                let end_form = translate_expr(end, ctx)?;
                let body_forms = translate_blocks(body, ctx)?;
                forms.push(format!(
                    "(let (({v} {start_form}) (v-range-end {end_form})) \
                     (catch 'noct-break (while (noct-truthy (noct-lt {v} v-range-end)) \
                     (catch 'noct-continue {}) (setq {v} (noct-add {v} 1)))))",
                    body_forms.join(" ")
                ));
            }
            HirBlock::ForEach { key, value, iter, body } => {
                let v = mangle(value);
                let iter_form = translate_expr(iter, ctx)?;
                let body_forms = translate_blocks(body, ctx)?;
                match key {
                    Some(k) => {
                        let kk = mangle(k);
                        forms.push(format!(
                            "(catch 'noct-break (dolist (v-pair (noct-entries {iter_form})) \
                             (let (({kk} (car v-pair)) ({v} (cdr v-pair))) \
                             (catch 'noct-continue {}))))",
                            body_forms.join(" ")
                        ));
                    }
                    None => {
                        forms.push(format!(
                            "(catch 'noct-break (dolist ({v} (noct-values {iter_form})) \
                             (catch 'noct-continue {})))",
                            body_forms.join(" ")
                        ));
                    }
                }
            }
        }
    }
    Ok(forms)
}

fn place_ident_or_global(name: &str, ctx: &Ctx) -> String {
    if ctx.locals.contains(name) {
        mangle(name)
    } else {
        format!("(noct-get-global {:?})", name)
    }
}

fn translate_stmt(stmt: &HirStmt, ctx: &mut Ctx) -> Result<String, CodegenError> {
    Ok(match stmt {
        HirStmt::VarDecl { name, init, .. } => match init {
            Some(e) => format!("(setq {} {})", mangle(name), translate_expr(e, ctx)?),
            None => "nil".to_string(),
        },
        HirStmt::Expr(e, _) => translate_expr(e, ctx)?,
        HirStmt::Assign { target, op, value, .. } => translate_assign(target, *op, value, ctx)?,
        HirStmt::IncDec { op, target, .. } => {
            let delta = match op {
                IncDecOp::Inc => "1",
                IncDecOp::Dec => "-1",
            };
            translate_compound_place(target, &format!("(noct-add {{cur}} {delta})"), ctx)?
        }
        HirStmt::Return { .. } => format!("(throw 'noct-return {})", mangle(RETURN_SLOT)),
        HirStmt::Break { .. } => "(throw 'noct-break nil)".to_string(),
        HirStmt::Continue { .. } => "(throw 'noct-continue nil)".to_string(),
    })
}

fn binop_helper(op: BinOp) -> &'static str {
    use BinOp::*;
    match op {
        Add => "noct-add",
        Sub => "noct-sub",
        Mul => "noct-mul",
        Div => "noct-div",
        Mod => "noct-mod",
        BitAnd => "noct-band",
        BitOr => "noct-bor",
        BitXor => "noct-bxor",
        Shl => "noct-shl",
        Shr => "noct-shr",
        Lt => "noct-lt",
        Lte => "noct-lte",
        Gt => "noct-gt",
        Gte => "noct-gte",
        Eq => "noct-eq",
        Neq => "noct-neq",
    }
}

fn assign_op_to_binop(op: AssignOp) -> Option<BinOp> {
    use AssignOp::*;
    Some(match op {
        Assign => return None,
        AddAssign => BinOp::Add,
        SubAssign => BinOp::Sub,
        MulAssign => BinOp::Mul,
        DivAssign => BinOp::Div,
        ModAssign => BinOp::Mod,
        AndAssign => BinOp::BitAnd,
        OrAssign => BinOp::BitOr,
        ShlAssign => BinOp::Shl,
        ShrAssign => BinOp::Shr,
    })
}

/// Builds the assignment form for `target op= value`. `{cur}` in a
/// pre-built delta expression (see `IncDec` above) is substituted with the
/// place's current-read form so array/dict/field targets are only
/// evaluated once for their base/key, still twice for the compound
/// read-then-write (matching the generic lowering used by the other back
/// ends, which also re-reads through the same subscript).
fn translate_compound_place(target: &LValue, delta_template: &str, ctx: &mut Ctx) -> Result<String, CodegenError> {
    match target {
        LValue::Ident(name) => {
            let cur = place_ident_or_global(name, ctx);
            let new_value = delta_template.replace("{cur}", &cur);
            Ok(if ctx.locals.contains(name) {
                format!("(setq {} {})", mangle(name), new_value)
            } else {
                format!("(noct-set-global {:?} {})", name, new_value)
            })
        }
        LValue::Index { base, index } => {
            let base_form = translate_expr(base, ctx)?;
            let index_form = translate_expr(index, ctx)?;
            let base_tmp = ctx.fresh_tmp();
            let index_tmp = ctx.fresh_tmp();
            let cur = format!("(noct-array {base_tmp} {index_tmp})");
            let new_value = delta_template.replace("{cur}", &cur);
            Ok(format!(
                "(let (({base_tmp} {base_form}) ({index_tmp} {index_form})) \
                 (noct-array-assign {base_tmp} {index_tmp} {new_value}))"
            ))
        }
        LValue::Field { base, name } => {
            let base_form = translate_expr(base, ctx)?;
            let base_tmp = ctx.fresh_tmp();
            let cur = format!("(noct-dot {base_tmp} {name:?})");
            let new_value = delta_template.replace("{cur}", &cur);
            Ok(format!("(let (({base_tmp} {base_form})) (noct-dot-assign {base_tmp} {name:?} {new_value}))"))
        }
    }
}

fn translate_assign(target: &LValue, op: AssignOp, value: &Expr, ctx: &mut Ctx) -> Result<String, CodegenError> {
    let value_form = translate_expr(value, ctx)?;
    match assign_op_to_binop(op) {
        None => match target {
            LValue::Ident(name) => Ok(if ctx.locals.contains(name) {
                format!("(setq {} {})", mangle(name), value_form)
            } else {
                format!("(noct-set-global {:?} {})", name, value_form)
            }),
            LValue::Index { base, index } => {
                let base_form = translate_expr(base, ctx)?;
                let index_form = translate_expr(index, ctx)?;
                Ok(format!("(noct-array-assign {base_form} {index_form} {value_form})"))
            }
            LValue::Field { base, name } => {
                let base_form = translate_expr(base, ctx)?;
                Ok(format!("(noct-dot-assign {base_form} {name:?} {value_form})"))
            }
        },
        Some(binop) => {
            let helper = binop_helper(binop);
            let delta_template = format!("({helper} {{cur}} {value_form})");
            translate_compound_place(target, &delta_template, ctx)
        }
    }
}

fn translate_expr(expr: &Expr, ctx: &mut Ctx) -> Result<String, CodegenError> {
    Ok(match expr {
        Expr::Int(v) => v.to_string(),
        Expr::Float(v) => {
            if v.fract() == 0.0 {
                format!("{v:.1}")
            } else {
                v.to_string()
            }
        }
        Expr::Str(s) => format!("{s:?}"),
        Expr::Ident(name) => place_ident_or_global(name, ctx),
        Expr::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(translate_expr(item, ctx)?);
            }
            format!("(noct-array-lit {})", parts.join(" "))
        }
        Expr::Dict(fields) => {
            let mut parts = Vec::with_capacity(fields.len());
            for (k, v) in fields {
                let kf = translate_expr(k, ctx)?;
                let vf = translate_expr(v, ctx)?;
                parts.push(format!("(cons {kf} {vf})"));
            }
            format!("(noct-dict-lit {})", parts.join(" "))
        }
        Expr::Unary { op, expr } => {
            let inner = translate_expr(expr, ctx)?;
            match op {
                UnOp::Neg => format!("(noct-neg {inner})"),
                UnOp::Not => format!("(noct-not {inner})"),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = translate_expr(lhs, ctx)?;
            let r = translate_expr(rhs, ctx)?;
            format!("({} {l} {r})", binop_helper(*op))
        }
        Expr::Logical { op, lhs, rhs } => {
            let l = translate_expr(lhs, ctx)?;
            let r = translate_expr(rhs, ctx)?;
            let tmp = ctx.fresh_tmp();
            match op {
                LogicalOp::And => format!("(let (({tmp} {l})) (if (noct-truthy {tmp}) {r} {tmp}))"),
                LogicalOp::Or => format!("(let (({tmp} {l})) (if (noct-truthy {tmp}) {tmp} {r}))"),
                LogicalOp::Xor => format!("(noct-logical-xor {l} {r})"),
            }
        }
        Expr::Index { base, index } => {
            let b = translate_expr(base, ctx)?;
            let i = translate_expr(index, ctx)?;
            format!("(noct-array {b} {i})")
        }
        Expr::Field { base, name } => {
            let b = translate_expr(base, ctx)?;
            format!("(noct-dot {b} {name:?})")
        }
        Expr::Call { callee, args } => {
            if let Expr::Field { base, name } = callee.as_ref() {
                if args.len() == 1 && (name == "keyAt" || name == "valAt") {
                    let b = translate_expr(base, ctx)?;
                    let i = translate_expr(&args[0], ctx)?;
                    let helper = if name == "keyAt" { "noct-dict-key-at" } else { "noct-dict-val-at" };
                    return Ok(format!("({helper} {b} {i})"));
                }
            }
            let arg_forms = translate_args(args, ctx)?;
            match callee.as_ref() {
                Expr::Ident(name) if !ctx.locals.contains(name) => {
                    format!("(noct-call-named {name:?} (list {arg_forms}))")
                }
                other => {
                    let c = translate_expr(other, ctx)?;
                    format!("(noct-call {c} (list {arg_forms}))")
                }
            }
        }
        Expr::MethodCall { recv, name, args } => {
            if args.len() == 1 && (name == "keyAt" || name == "valAt") {
                let r = translate_expr(recv, ctx)?;
                let i = translate_expr(&args[0], ctx)?;
                let helper = if name == "keyAt" { "noct-dict-key-at" } else { "noct-dict-val-at" };
                return Ok(format!("({helper} {r} {i})"));
            }
            let r = translate_expr(recv, ctx)?;
            let arg_forms = translate_args(args, ctx)?;
            format!("(noct-method-call {r} {name:?} (list {arg_forms}))")
        }
        Expr::Lambda { .. } => return Err(CodegenError::UnhoistedLambda { function: ctx.function.to_string() }),
        Expr::New { class, fields } => {
            let mut parts = Vec::with_capacity(fields.len());
            for (name, value) in fields {
                let vf = translate_expr(value, ctx)?;
                parts.push(format!("(cons {name:?} {vf})"));
            }
            format!("(noct-new {class:?} (list {}))", parts.join(" "))
        }
    })
}

fn translate_args(args: &[Expr], ctx: &mut Ctx) -> Result<String, CodegenError> {
    let mut parts = Vec::with_capacity(args.len());
    for a in args {
        parts.push(translate_expr(a, ctx)?);
    }
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use noct_compiler::lexer::Lexer;
    use noct_compiler::parser::Parser;

    fn build_hir(src: &str) -> HirModule {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = Parser::new(tokens).parse_program().unwrap();
        noct_compiler::hir::build("t.noct", &program).unwrap()
    }

    #[test]
    fn translates_defun_with_return_catch_tag() {
        let hir = build_hir("func f(a){ return a + 1; }");
        let lisp = translate_module(&hir).unwrap();
        assert!(lisp.contains("(defun noct--f (v-a)"));
        assert!(lisp.contains("catch 'noct-return"));
        assert!(lisp.contains("noct-add"));
    }

    #[test]
    fn if_becomes_cond_and_while_gets_break_continue_tags() {
        let hir = build_hir("func f(){ while (1) { if (1) { break; } continue; } }");
        let lisp = translate_module(&hir).unwrap();
        assert!(lisp.contains("(cond"));
        assert!(lisp.contains("noct-break"));
        assert!(lisp.contains("noct-continue"));
    }

    #[test]
    fn hoisted_lambda_compiles_as_its_own_defun() {
        let hir = build_hir("func f(){ var g = (x) => { return x; }; }");
        let lisp = translate_module(&hir).unwrap();
        assert!(lisp.contains("noct--lambda0"));
    }

    #[test]
    fn dict_index_accessors_use_dedicated_helpers() {
        let hir = build_hir("func f(d){ return d.keyAt(0); }");
        let lisp = translate_module(&hir).unwrap();
        assert!(lisp.contains("noct-dict-key-at"));
    }
}
