//! Recursive-descent parser (spec §4.2). Produces a function-list AST.
//!
//! NoctLang's operator set is fixed by the grammar (no user-defined
//! operators), so precedence is climbed through one function per tier
//! rather than through a binding-power table.

use thiserror::Error;

use crate::ast::*;
use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token {found} at line {line}; expected {expected}")]
    Unexpected { found: String, expected: String, line: u32 },
    #[error("unexpected end of input")]
    UnexpectedEof { line: u32 },
}

impl ParseError {
    pub fn line(&self) -> u32 {
        match self {
            ParseError::Unexpected { line, .. } => *line,
            ParseError::UnexpectedEof { line } => *line,
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut functions = Vec::new();
        while !self.at_eof() {
            functions.push(self.parse_function()?);
        }
        Ok(Program { functions })
    }

    // --- token stream helpers -------------------------------------------------

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn at_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 || !matches!(tok.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        if self.at_eof() {
            ParseError::UnexpectedEof { line: self.span().line }
        } else {
            ParseError::Unexpected {
                found: self.kind().to_string(),
                expected: expected.to_string(),
                line: self.span().line,
            }
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Consume the "block-opening" `)`/`{` pair, whether the lexer fused it
    /// into a single `){` token or left it as two tokens separated by
    /// whitespace.
    fn expect_block_open(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::RParenLBrace) {
            return Ok(());
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        Ok(())
    }

    /// Same fusion handling for a lambda's `)=>{`.
    fn expect_fat_arrow_open(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::FatArrowLBrace) {
            return Ok(());
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::FatArrow)?;
        self.expect(TokenKind::LBrace)?;
        Ok(())
    }

    // --- top level --------------------------------------------------------

    fn parse_function(&mut self) -> Result<Function, ParseError> {
        self.expect(TokenKind::Func)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_param_list()?;
        self.expect_block_open()?;
        let body = self.parse_stmts_until_rbrace()?;
        self.expect(TokenKind::RBrace)?;
        Ok(Function { name, params, body })
    }

    fn parse_param_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if matches!(self.kind(), TokenKind::RParen | TokenKind::RParenLBrace) {
            return Ok(params);
        }
        loop {
            params.push(self.expect_ident()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_stmts_until_rbrace(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    /// Either a `{ ... }` block or a single statement, per spec §4.2's
    /// "both block and single-statement forms are accepted".
    fn parse_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.eat(&TokenKind::LBrace) {
            let stmts = self.parse_stmts_until_rbrace()?;
            self.expect(TokenKind::RBrace)?;
            Ok(stmts)
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    /// Body introduced by a fused `){`/`)=>{` token or a bare `{`.
    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let stmts = self.parse_stmts_until_rbrace()?;
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    // --- statements ---------------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.span().line;
        let kind = match self.kind().clone() {
            TokenKind::Var => {
                self.advance();
                let name = self.expect_ident()?;
                let init = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.eat(&TokenKind::Semicolon);
                StmtKind::VarDecl { name, init }
            }
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                let body = self.parse_cond_body()?;
                let mut branches = vec![(cond, body)];
                let mut else_branch = None;
                loop {
                    if self.eat(&TokenKind::ElseIf) {
                        self.expect(TokenKind::LParen)?;
                        let cond = self.parse_expr()?;
                        let body = self.parse_cond_body()?;
                        branches.push((cond, body));
                    } else if self.eat(&TokenKind::Else) {
                        else_branch = Some(self.parse_body()?);
                        break;
                    } else {
                        break;
                    }
                }
                StmtKind::If { branches, else_branch }
            }
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                let body = self.parse_cond_body()?;
                StmtKind::While { cond, body }
            }
            TokenKind::For => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let first = self.expect_ident()?;
                let (key, value) = if self.eat(&TokenKind::Comma) {
                    let second = self.expect_ident()?;
                    (Some(first), second)
                } else {
                    (None, first)
                };
                self.expect(TokenKind::In)?;
                let start = self.parse_expr()?;
                if key.is_none() && self.eat(&TokenKind::DotDot) {
                    let end = self.parse_expr()?;
                    let body = self.parse_cond_body()?;
                    StmtKind::ForRange { var: value, start, end, body }
                } else {
                    let body = self.parse_cond_body()?;
                    StmtKind::ForEach { key, value, iter: start, body }
                }
            }
            TokenKind::Return => {
                self.advance();
                let value = if matches!(self.kind(), TokenKind::Semicolon | TokenKind::RBrace) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.eat(&TokenKind::Semicolon);
                StmtKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                self.eat(&TokenKind::Semicolon);
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.eat(&TokenKind::Semicolon);
                StmtKind::Continue
            }
            TokenKind::LBrace => {
                self.advance();
                let stmts = self.parse_block_body()?;
                StmtKind::Block(stmts)
            }
            _ => return self.parse_assign_or_expr_stmt(),
        };
        Ok(Stmt::new(line, kind))
    }

    /// Closes an `if`/`while`/`for` condition and reads its body, whether
    /// the lexer fused the closing `)` with the opening `{` or left them
    /// separate (in which case a single bare statement is also accepted,
    /// per spec §4.2's single-statement control-flow forms).
    fn parse_cond_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.eat(&TokenKind::RParenLBrace) {
            self.parse_block_body()
        } else {
            self.expect(TokenKind::RParen)?;
            self.parse_body()
        }
    }

    fn parse_assign_or_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.span().line;
        let expr = self.parse_expr()?;
        let kind = if let Some(op) = self.assign_op() {
            self.advance();
            let target = expr_to_lvalue(expr, self)?;
            let value = self.parse_expr()?;
            StmtKind::Assign { target, op, value }
        } else if self.eat(&TokenKind::PlusPlus) {
            StmtKind::IncDec { op: IncDecOp::Inc, target: expr_to_lvalue(expr, self)? }
        } else if self.eat(&TokenKind::MinusMinus) {
            StmtKind::IncDec { op: IncDecOp::Dec, target: expr_to_lvalue(expr, self)? }
        } else {
            StmtKind::Expr(expr)
        };
        self.eat(&TokenKind::Semicolon);
        Ok(Stmt::new(line, kind))
    }

    fn assign_op(&self) -> Option<AssignOp> {
        Some(match self.kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::AddAssign,
            TokenKind::MinusEq => AssignOp::SubAssign,
            TokenKind::StarEq => AssignOp::MulAssign,
            TokenKind::SlashEq => AssignOp::DivAssign,
            TokenKind::PercentEq => AssignOp::ModAssign,
            TokenKind::AmpEq => AssignOp::AndAssign,
            TokenKind::PipeEq => AssignOp::OrAssign,
            TokenKind::ShlEq => AssignOp::ShlAssign,
            TokenKind::ShrEq => AssignOp::ShrAssign,
            _ => return None,
        })
    }

    // --- expressions (precedence high→low, per spec §4.2) -------------------
    //
    // postfix `. [] () ->`  >  unary `- !`  >  `* / %`  >  `+ -`  >  `<< >>`
    // >  `< <= > >=`  >  `== !=`  >  `&`  >  `^`  >  `|`  >  `and`  >  `or`/`xor`

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        loop {
            let op = match self.kind() {
                TokenKind::Or => LogicalOp::Or,
                TokenKind::Xor => LogicalOp::Xor,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Logical { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitor()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_bitor()?;
            lhs = Expr::Logical { op: LogicalOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat(&TokenKind::Pipe) {
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary { op: BinOp::BitOr, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_bitand()?;
        while self.eat(&TokenKind::Caret) {
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary { op: BinOp::BitXor, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::Amp) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary { op: BinOp::BitAnd, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::Neq => BinOp::Neq,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Lte => BinOp::Lte,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Gte => BinOp::Gte,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.kind() {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary()?;
            Ok(Expr::Unary { op, expr: Box::new(expr) })
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            expr = match self.kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    Expr::Field { base: Box::new(expr), name }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    Expr::Index { base: Box::new(expr), index: Box::new(index) }
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_arg_list()?;
                    self.expect(TokenKind::RParen)?;
                    Expr::Call { callee: Box::new(expr), args }
                }
                TokenKind::Arrow => {
                    self.advance();
                    let name = self.expect_ident()?;
                    self.expect(TokenKind::LParen)?;
                    let args = self.parse_arg_list()?;
                    self.expect(TokenKind::RParen)?;
                    Expr::MethodCall { recv: Box::new(expr), name, args }
                }
                _ => break,
            };
        }
        Ok(expr)
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.kind().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::New => {
                self.advance();
                let class = self.expect_ident()?;
                self.expect(TokenKind::LBrace)?;
                let fields = self.parse_field_list()?;
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::New { class, fields })
            }
            TokenKind::Class => {
                self.advance();
                self.expect(TokenKind::LBrace)?;
                let fields = self.parse_field_list()?;
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::Dict(
                    fields.into_iter().map(|(k, v)| (Expr::Str(k), v)).collect(),
                ))
            }
            TokenKind::Lambda => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let params = self.parse_param_list()?;
                self.expect_fat_arrow_open()?;
                let body = self.parse_block_body()?;
                Ok(Expr::Lambda { params, body })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Array(items))
            }
            TokenKind::LParen => {
                if let Some(lambda) = self.try_parse_lambda()? {
                    return Ok(lambda);
                }
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `(a, b) => { ... }` and `() => { ... }` look like a parenthesized
    /// expression until the closing `)`, so speculatively parse a param
    /// list and back out if it isn't followed by `=>`.
    fn try_parse_lambda(&mut self) -> Result<Option<Expr>, ParseError> {
        let save = self.pos;
        self.advance(); // '('
        let params = match self.parse_param_list() {
            Ok(p) if matches!(self.kind(), TokenKind::RParen | TokenKind::FatArrowLBrace) => p,
            _ => {
                self.pos = save;
                return Ok(None);
            }
        };
        if matches!(self.kind(), TokenKind::FatArrowLBrace) {
            self.advance();
        } else if self.eat(&TokenKind::RParen) && self.eat(&TokenKind::FatArrow) {
            self.expect(TokenKind::LBrace)?;
        } else {
            self.pos = save;
            return Ok(None);
        }
        let body = self.parse_block_body()?;
        Ok(Some(Expr::Lambda { params, body }))
    }

    fn parse_field_list(&mut self) -> Result<Vec<(String, Expr)>, ParseError> {
        let mut fields = Vec::new();
        if self.check(&TokenKind::RBrace) {
            return Ok(fields);
        }
        loop {
            let key = match self.kind().clone() {
                TokenKind::Ident(name) => {
                    self.advance();
                    name
                }
                TokenKind::Str(s) => {
                    self.advance();
                    s
                }
                _ => return Err(self.unexpected("field name")),
            };
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expr()?;
            fields.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(fields)
    }
}

fn expr_to_lvalue(expr: Expr, parser: &Parser) -> Result<LValue, ParseError> {
    match expr {
        Expr::Ident(name) => Ok(LValue::Ident(name)),
        Expr::Index { base, index } => Ok(LValue::Index { base, index }),
        Expr::Field { base, name } => Ok(LValue::Field { base, name }),
        _ => Err(ParseError::Unexpected {
            found: "expression".to_string(),
            expected: "assignable target".to_string(),
            line: parser.span().line,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Program {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    #[test]
    fn parses_empty_function() {
        let prog = parse("func main(){}");
        assert_eq!(prog.functions.len(), 1);
        assert_eq!(prog.functions[0].name, "main");
        assert!(prog.functions[0].body.is_empty());
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let prog = parse("func f(){ return 1 + 2 * 3; }");
        match &prog.functions[0].body[0].kind {
            StmtKind::Return(Some(Expr::Binary { op: BinOp::Add, rhs, .. })) => {
                assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_if_with_brace_and_single_stmt_forms() {
        let prog = parse("func f(x){ if (x > 0){ return 1; } else return 0; }");
        match &prog.functions[0].body[0].kind {
            StmtKind::If { branches, else_branch } => {
                assert_eq!(branches.len(), 1);
                assert!(else_branch.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_compound_assignment_as_statement() {
        let prog = parse("func f(x){ x += 1; }");
        match &prog.functions[0].body[0].kind {
            StmtKind::Assign { op: AssignOp::AddAssign, .. } => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_ranged_for() {
        let prog = parse("func f(){ for (i in 0..10){ } }");
        match &prog.functions[0].body[0].kind {
            StmtKind::ForRange { var, .. } => assert_eq!(var, "i"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_foreach_kv() {
        let prog = parse("func f(d){ for (k, v in d){ } }");
        match &prog.functions[0].body[0].kind {
            StmtKind::ForEach { key: Some(k), value, .. } => {
                assert_eq!(k, "k");
                assert_eq!(value, "v");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_lambda_expression() {
        let prog = parse("func f(){ var g = (a, b) => { return a + b; }; }");
        match &prog.functions[0].body[0].kind {
            StmtKind::VarDecl { init: Some(Expr::Lambda { params, .. }), .. } => {
                assert_eq!(params, &vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_method_call_and_new() {
        let prog = parse("func f(){ var o = new Point{ x: 1, y: 2 }; o->move(1, 2); }");
        match &prog.functions[0].body[0].kind {
            StmtKind::VarDecl { init: Some(Expr::New { class, fields }), .. } => {
                assert_eq!(class, "Point");
                assert_eq!(fields.len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
        match &prog.functions[0].body[1].kind {
            StmtKind::Expr(Expr::MethodCall { name, args, .. }) => {
                assert_eq!(name, "move");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_class_literal_as_dict() {
        let prog = parse("func f(){ var d = class { a: 1 }; }");
        match &prog.functions[0].body[0].kind {
            StmtKind::VarDecl { init: Some(Expr::Dict(fields)), .. } => {
                assert_eq!(fields.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn syntax_error_reports_line() {
        let tokens = Lexer::new("func f(){\n var x = ; \n}").tokenize().unwrap();
        let err = Parser::new(tokens).parse_program().unwrap_err();
        assert_eq!(err.line(), 2);
    }
}
