//! AST→HIR (spec §4.3): resolves each function's local-symbol set and
//! reshapes its statement list into structured blocks broken at
//! control-flow boundaries. `return expr;` is rewritten here into an
//! assignment to the pseudo-local `$return` followed by a terminator, so
//! every later consumer (LIR lowering, the Lisp back end) sees the same
//! early-exit shape instead of re-deriving it.

use indexmap::IndexSet;
use thiserror::Error;

use crate::ast::{self, AssignOp, Expr, IncDecOp, LValue, Program, StmtKind};

/// The pseudo-local a `return` assigns into before the structured exit.
pub const RETURN_SLOT: &str = "$return";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HirError {
    #[error("duplicate parameter '{name}' in function '{function}' at line {line}")]
    DuplicateParam { function: String, name: String, line: u32 },
    #[error("'break' outside a loop at line {line}")]
    BreakOutsideLoop { line: u32 },
    #[error("'continue' outside a loop at line {line}")]
    ContinueOutsideLoop { line: u32 },
}

impl HirError {
    pub fn line(&self) -> u32 {
        match self {
            HirError::DuplicateParam { line, .. } => *line,
            HirError::BreakOutsideLoop { line } => *line,
            HirError::ContinueOutsideLoop { line } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirModule {
    pub source_name: String,
    pub functions: Vec<HirFunction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirFunction {
    pub name: String,
    pub params: Vec<String>,
    /// Every name this function treats as local: parameters, `var`-declared
    /// names, names plainly assigned (`x = …`, not `x += …`), and the
    /// reserved `$return` slot. Anything else is a global reference.
    pub locals: IndexSet<String>,
    pub body: Vec<HirBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirBlock {
    Basic(Vec<HirStmt>),
    If {
        branches: Vec<(Expr, Vec<HirBlock>)>,
        else_branch: Option<Vec<HirBlock>>,
    },
    While {
        cond: Expr,
        body: Vec<HirBlock>,
    },
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<HirBlock>,
    },
    ForEach {
        key: Option<String>,
        value: String,
        iter: Expr,
        body: Vec<HirBlock>,
    },
    /// Closing sentinel for a structured block (spec §4.3's "end" block).
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirStmt {
    VarDecl { name: String, init: Option<Expr>, line: u32 },
    Expr(Expr, u32),
    Assign { target: LValue, op: AssignOp, value: Expr, line: u32 },
    IncDec { op: IncDecOp, target: LValue, line: u32 },
    /// The terminator half of a rewritten `return`; the value, if any, was
    /// already assigned to [`RETURN_SLOT`] by a preceding `Assign`.
    Return { line: u32 },
    Break { line: u32 },
    Continue { line: u32 },
}

/// Generated name for the Nth lambda literal hoisted out of its enclosing
/// expression into a top-level function (spec §4.3: lambdas compile like
/// any other function once pulled out of expression position).
fn lambda_name(n: u32) -> String {
    format!("$lambda{n}")
}

pub fn build(source_name: &str, program: &Program) -> Result<HirModule, HirError> {
    let mut functions = Vec::with_capacity(program.functions.len());
    let mut lambda_counter = 0u32;
    for func in &program.functions {
        build_function(func, &mut functions, &mut lambda_counter)?;
    }
    Ok(HirModule { source_name: source_name.to_string(), functions })
}

/// Builds `func` into HIR and appends it (plus every lambda literal hoisted
/// out of its body) to `out`.
fn build_function(
    func: &ast::Function,
    out: &mut Vec<HirFunction>,
    lambda_counter: &mut u32,
) -> Result<(), HirError> {
    let line = func.body.first().map(|s| s.line).unwrap_or(1);
    let mut params_seen = IndexSet::new();
    for p in &func.params {
        if !params_seen.insert(p.clone()) {
            return Err(HirError::DuplicateParam { function: func.name.clone(), name: p.clone(), line });
        }
    }

    let mut locals: IndexSet<String> = func.params.iter().cloned().collect();
    locals.insert(RETURN_SLOT.to_string());
    collect_locals(&func.body, &mut locals);

    let body = lower_stmts(&func.body, 0, out, lambda_counter)?;

    out.push(HirFunction { name: func.name.clone(), params: func.params.clone(), locals, body });
    Ok(())
}

/// Recursively replaces every `Expr::Lambda` reachable from `expr` with an
/// `Expr::Ident` referencing a freshly hoisted top-level function, pushed
/// onto `out`. Non-lambda expressions are rebuilt with their subexpressions
/// passed through the same treatment, since a lambda can appear nested
/// inside a call argument, binary operand, array element, and so on.
fn hoist_lambdas(expr: &Expr, out: &mut Vec<HirFunction>, lambda_counter: &mut u32) -> Result<Expr, HirError> {
    let boxed = |e: &Expr, out: &mut Vec<HirFunction>, lambda_counter: &mut u32| -> Result<Box<Expr>, HirError> {
        Ok(Box::new(hoist_lambdas(e, out, lambda_counter)?))
    };
    Ok(match expr {
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Ident(_) => expr.clone(),
        Expr::Array(items) => {
            let mut hoisted = Vec::with_capacity(items.len());
            for item in items {
                hoisted.push(hoist_lambdas(item, out, lambda_counter)?);
            }
            Expr::Array(hoisted)
        }
        Expr::Dict(fields) => {
            let mut hoisted = Vec::with_capacity(fields.len());
            for (k, v) in fields {
                hoisted.push((hoist_lambdas(k, out, lambda_counter)?, hoist_lambdas(v, out, lambda_counter)?));
            }
            Expr::Dict(hoisted)
        }
        Expr::Unary { op, expr } => Expr::Unary { op: *op, expr: boxed(expr, out, lambda_counter)? },
        Expr::Binary { op, lhs, rhs } => {
            Expr::Binary { op: *op, lhs: boxed(lhs, out, lambda_counter)?, rhs: boxed(rhs, out, lambda_counter)? }
        }
        Expr::Logical { op, lhs, rhs } => {
            Expr::Logical { op: *op, lhs: boxed(lhs, out, lambda_counter)?, rhs: boxed(rhs, out, lambda_counter)? }
        }
        Expr::Index { base, index } => {
            Expr::Index { base: boxed(base, out, lambda_counter)?, index: boxed(index, out, lambda_counter)? }
        }
        Expr::Field { base, name } => Expr::Field { base: boxed(base, out, lambda_counter)?, name: name.clone() },
        Expr::Call { callee, args } => {
            let callee = boxed(callee, out, lambda_counter)?;
            let mut hoisted = Vec::with_capacity(args.len());
            for a in args {
                hoisted.push(hoist_lambdas(a, out, lambda_counter)?);
            }
            Expr::Call { callee, args: hoisted }
        }
        Expr::MethodCall { recv, name, args } => {
            let recv = boxed(recv, out, lambda_counter)?;
            let mut hoisted = Vec::with_capacity(args.len());
            for a in args {
                hoisted.push(hoist_lambdas(a, out, lambda_counter)?);
            }
            Expr::MethodCall { recv, name: name.clone(), args: hoisted }
        }
        Expr::New { class, fields } => {
            let mut hoisted = Vec::with_capacity(fields.len());
            for (name, value) in fields {
                hoisted.push((name.clone(), hoist_lambdas(value, out, lambda_counter)?));
            }
            Expr::New { class: class.clone(), fields: hoisted }
        }
        Expr::Lambda { params, body } => {
            let name = lambda_name(*lambda_counter);
            *lambda_counter += 1;
            let synthetic = ast::Function { name: name.clone(), params: params.clone(), body: body.clone() };
            build_function(&synthetic, out, lambda_counter)?;
            Expr::Ident(name)
        }
    })
}

/// Collects every name a `var` declares or a plain `=` assigns, recursing
/// into nested control-flow bodies (spec §4.3: "parameters + every
/// identifier appearing on the LHS of a `var` declaration or a plain
/// assignment in that function").
fn collect_locals(stmts: &[ast::Stmt], locals: &mut IndexSet<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::VarDecl { name, .. } => {
                locals.insert(name.clone());
            }
            StmtKind::Assign { target: LValue::Ident(name), op: AssignOp::Assign, .. } => {
                locals.insert(name.clone());
            }
            StmtKind::If { branches, else_branch } => {
                for (_, body) in branches {
                    collect_locals(body, locals);
                }
                if let Some(body) = else_branch {
                    collect_locals(body, locals);
                }
            }
            StmtKind::While { body, .. } => collect_locals(body, locals),
            StmtKind::ForRange { var, body, .. } => {
                locals.insert(var.clone());
                collect_locals(body, locals);
            }
            StmtKind::ForEach { key, value, body, .. } => {
                if let Some(k) = key {
                    locals.insert(k.clone());
                }
                locals.insert(value.clone());
                collect_locals(body, locals);
            }
            StmtKind::Block(body) => collect_locals(body, locals),
            _ => {}
        }
    }
}

/// `loop_depth` tracks whether `break`/`continue` are currently valid. Every
/// expression passes through `hoist_lambdas` before it's embedded in the
/// returned blocks, so no `Expr::Lambda` ever reaches LIR lowering.
fn lower_stmts(
    stmts: &[ast::Stmt],
    loop_depth: u32,
    out: &mut Vec<HirFunction>,
    lambda_counter: &mut u32,
) -> Result<Vec<HirBlock>, HirError> {
    let mut blocks = Vec::new();
    let mut basic = Vec::new();
    for stmt in stmts {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::VarDecl { name, init } => {
                let init = match init {
                    Some(e) => Some(hoist_lambdas(e, out, lambda_counter)?),
                    None => None,
                };
                basic.push(HirStmt::VarDecl { name: name.clone(), init, line });
            }
            StmtKind::Expr(e) => basic.push(HirStmt::Expr(hoist_lambdas(e, out, lambda_counter)?, line)),
            StmtKind::Assign { target, op, value } => {
                let value = hoist_lambdas(value, out, lambda_counter)?;
                basic.push(HirStmt::Assign { target: target.clone(), op: *op, value, line });
            }
            StmtKind::IncDec { op, target } => {
                basic.push(HirStmt::IncDec { op: *op, target: target.clone(), line });
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    let value = hoist_lambdas(value, out, lambda_counter)?;
                    basic.push(HirStmt::Assign {
                        target: LValue::Ident(RETURN_SLOT.to_string()),
                        op: AssignOp::Assign,
                        value,
                        line,
                    });
                }
                basic.push(HirStmt::Return { line });
            }
            StmtKind::Break => {
                if loop_depth == 0 {
                    return Err(HirError::BreakOutsideLoop { line });
                }
                basic.push(HirStmt::Break { line });
            }
            StmtKind::Continue => {
                if loop_depth == 0 {
                    return Err(HirError::ContinueOutsideLoop { line });
                }
                basic.push(HirStmt::Continue { line });
            }
            StmtKind::Block(body) => {
                flush_basic(&mut basic, &mut blocks);
                blocks.extend(lower_stmts(body, loop_depth, out, lambda_counter)?);
            }
            StmtKind::If { branches, else_branch } => {
                flush_basic(&mut basic, &mut blocks);
                let mut hir_branches = Vec::with_capacity(branches.len());
                for (cond, body) in branches {
                    let cond = hoist_lambdas(cond, out, lambda_counter)?;
                    hir_branches.push((cond, lower_stmts(body, loop_depth, out, lambda_counter)?));
                }
                let hir_else = match else_branch {
                    Some(body) => Some(lower_stmts(body, loop_depth, out, lambda_counter)?),
                    None => None,
                };
                blocks.push(HirBlock::If { branches: hir_branches, else_branch: hir_else });
                blocks.push(HirBlock::End);
            }
            StmtKind::While { cond, body } => {
                flush_basic(&mut basic, &mut blocks);
                let cond = hoist_lambdas(cond, out, lambda_counter)?;
                blocks.push(HirBlock::While { cond, body: lower_stmts(body, loop_depth + 1, out, lambda_counter)? });
                blocks.push(HirBlock::End);
            }
            StmtKind::ForRange { var, start, end, body } => {
                flush_basic(&mut basic, &mut blocks);
                let start = hoist_lambdas(start, out, lambda_counter)?;
                let end = hoist_lambdas(end, out, lambda_counter)?;
                blocks.push(HirBlock::ForRange {
                    var: var.clone(),
                    start,
                    end,
                    body: lower_stmts(body, loop_depth + 1, out, lambda_counter)?,
                });
                blocks.push(HirBlock::End);
            }
            StmtKind::ForEach { key, value, iter, body } => {
                flush_basic(&mut basic, &mut blocks);
                let iter = hoist_lambdas(iter, out, lambda_counter)?;
                blocks.push(HirBlock::ForEach {
                    key: key.clone(),
                    value: value.clone(),
                    iter,
                    body: lower_stmts(body, loop_depth + 1, out, lambda_counter)?,
                });
                blocks.push(HirBlock::End);
            }
        }
    }
    flush_basic(&mut basic, &mut blocks);
    Ok(blocks)
}

fn flush_basic(basic: &mut Vec<HirStmt>, blocks: &mut Vec<HirBlock>) {
    if !basic.is_empty() {
        blocks.push(HirBlock::Basic(std::mem::take(basic)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn build_src(src: &str) -> HirModule {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let program = Parser::new(tokens).parse_program().unwrap();
        build("test.noct", &program).unwrap()
    }

    #[test]
    fn collects_params_and_var_decls_as_locals() {
        let hir = build_src("func f(a){ var b = 1; g = 2; }");
        let f = &hir.functions[0];
        assert!(f.locals.contains("a"));
        assert!(f.locals.contains("b"));
        assert!(f.locals.contains("g"));
        assert!(f.locals.contains(RETURN_SLOT));
    }

    #[test]
    fn compound_assign_alone_does_not_create_a_local() {
        let hir = build_src("func f(){ g += 1; }");
        let f = &hir.functions[0];
        assert!(!f.locals.contains("g"));
    }

    #[test]
    fn return_rewrites_to_assign_plus_terminator() {
        let hir = build_src("func f(){ return 1; }");
        let blocks = &hir.functions[0].body;
        match &blocks[0] {
            HirBlock::Basic(stmts) => {
                assert_eq!(stmts.len(), 2);
                assert!(matches!(stmts[0], HirStmt::Assign { .. }));
                assert!(matches!(stmts[1], HirStmt::Return { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let tokens = Lexer::new("func f(){ break; }").tokenize().unwrap();
        let program = Parser::new(tokens).parse_program().unwrap();
        let err = build("test.noct", &program).unwrap_err();
        assert!(matches!(err, HirError::BreakOutsideLoop { .. }));
    }

    #[test]
    fn while_body_allows_break() {
        let hir = build_src("func f(){ while (1){ break; } }");
        assert!(!hir.functions[0].body.is_empty());
    }

    #[test]
    fn duplicate_param_is_rejected() {
        let tokens = Lexer::new("func f(a, a){}").tokenize().unwrap();
        let program = Parser::new(tokens).parse_program().unwrap();
        let err = build("test.noct", &program).unwrap_err();
        assert!(matches!(err, HirError::DuplicateParam { .. }));
    }
}
