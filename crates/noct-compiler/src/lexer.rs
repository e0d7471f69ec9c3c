//! Lexer (spec §4.1): turns UTF-8 source text into a token stream, tracking
//! line/column for later diagnostics.

use thiserror::Error;

use crate::token::{keyword, Span, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unexpected character '{ch}' at line {line}")]
    UnexpectedChar { ch: char, line: u32 },
    #[error("unterminated string at line {line}")]
    UnterminatedString { line: u32 },
    #[error("invalid number at line {line}")]
    InvalidNumber { line: u32 },
}

impl LexError {
    pub fn line(&self) -> u32 {
        match self {
            LexError::UnexpectedChar { line, .. } => *line,
            LexError::UnterminatedString { line } => *line,
            LexError::InvalidNumber { line } => *line,
        }
    }
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let span = self.span_here();
            let Some(ch) = self.current() else {
                tokens.push(Token::new(TokenKind::Eof, span));
                break;
            };
            let tok = if ch.is_ascii_digit() {
                self.lex_number(span)?
            } else if ch == '"' {
                self.lex_string(span)?
            } else if is_ident_start(ch) {
                self.lex_ident(span)
            } else {
                self.lex_punct(span)?
            };
            tokens.push(tok);
        }
        Ok(tokens)
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }
    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }
    fn peek2(&self) -> Option<char> {
        self.source.get(self.pos + 2).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn span_here(&self) -> Span {
        Span::new(self.line, self.col)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek() == Some('/') => {
                    while self.current().is_some() && self.current() != Some('\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek() == Some('*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.current() {
                            None => break,
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn lex_number(&mut self, span: Span) -> Result<Token, LexError> {
        let start = self.pos;
        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let hex_start = self.pos;
            while self.current().map(|c| c.is_ascii_hexdigit()).unwrap_or(false) {
                self.advance();
            }
            if self.pos == hex_start {
                return Err(LexError::InvalidNumber { line: span.line });
            }
            let text: String = self.source[hex_start..self.pos].iter().collect();
            let value = i32::from_str_radix(&text, 16)
                .map_err(|_| LexError::InvalidNumber { line: span.line })?;
            return Ok(Token::new(TokenKind::Int(value), span));
        }

        while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }
        let mut is_float = false;
        if self.current() == Some('.') && self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            is_float = true;
            self.advance();
            while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }
        if matches!(self.current(), Some('e') | Some('E')) {
            let save = self.pos;
            self.advance();
            if matches!(self.current(), Some('+') | Some('-')) {
                self.advance();
            }
            if self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                is_float = true;
                while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    self.advance();
                }
            } else {
                self.pos = save;
            }
        }
        let text: String = self.source[start..self.pos].iter().collect();
        if is_float {
            let value: f32 = text.parse().map_err(|_| LexError::InvalidNumber { line: span.line })?;
            Ok(Token::new(TokenKind::Float(value), span))
        } else {
            let value: i32 = text.parse().map_err(|_| LexError::InvalidNumber { line: span.line })?;
            Ok(Token::new(TokenKind::Int(value), span))
        }
    }

    fn lex_string(&mut self, span: Span) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.current() {
                None | Some('\n') => return Err(LexError::UnterminatedString { line: span.line }),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('r') => s.push('\r'),
                        Some('"') => s.push('"'),
                        Some('\\') => s.push('\\'),
                        Some(other) => s.push(other),
                        None => return Err(LexError::UnterminatedString { line: span.line }),
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token::new(TokenKind::Str(s), span))
    }

    fn lex_ident(&mut self, span: Span) -> Token {
        let start = self.pos;
        while self.current().map(is_ident_continue).unwrap_or(false) {
            self.advance();
        }
        let text: String = self.source[start..self.pos].iter().collect();
        let kind = keyword(&text).unwrap_or(TokenKind::Ident(text));
        Token::new(kind, span)
    }

    fn lex_punct(&mut self, span: Span) -> Result<Token, LexError> {
        let ch = self.advance().unwrap();
        use TokenKind::*;
        let kind = match ch {
            '(' => LParen,
            ')' => {
                // The grammar treats `){` and `)=>{` as single "block-opening"
                // tokens (spec §4.1): `if (c){` / `(params)=>{`.
                if self.current() == Some('=') && self.peek() == Some('>') && self.peek2() == Some('{') {
                    self.advance();
                    self.advance();
                    self.advance();
                    FatArrowLBrace
                } else if self.current() == Some('{') {
                    self.advance();
                    RParenLBrace
                } else {
                    RParen
                }
            }
            '[' => LBracket,
            ']' => RBracket,
            '{' => LBrace,
            '}' => RBrace,
            ',' => Comma,
            ';' => Semicolon,
            ':' => Colon,
            '.' => {
                if self.current() == Some('.') {
                    self.advance();
                    DotDot
                } else {
                    Dot
                }
            }
            '+' => {
                if self.current() == Some('+') {
                    self.advance();
                    PlusPlus
                } else if self.current() == Some('=') {
                    self.advance();
                    PlusEq
                } else {
                    Plus
                }
            }
            '-' => {
                if self.current() == Some('-') {
                    self.advance();
                    MinusMinus
                } else if self.current() == Some('=') {
                    self.advance();
                    MinusEq
                } else if self.current() == Some('>') {
                    self.advance();
                    Arrow
                } else {
                    Minus
                }
            }
            '*' => {
                if self.current() == Some('=') {
                    self.advance();
                    StarEq
                } else {
                    Star
                }
            }
            '/' => {
                if self.current() == Some('=') {
                    self.advance();
                    SlashEq
                } else {
                    Slash
                }
            }
            '%' => {
                if self.current() == Some('=') {
                    self.advance();
                    PercentEq
                } else {
                    Percent
                }
            }
            '<' => {
                if self.current() == Some('<') {
                    self.advance();
                    if self.current() == Some('=') {
                        self.advance();
                        ShlEq
                    } else {
                        Shl
                    }
                } else if self.current() == Some('=') {
                    self.advance();
                    Lte
                } else {
                    Lt
                }
            }
            '>' => {
                if self.current() == Some('>') {
                    self.advance();
                    if self.current() == Some('=') {
                        self.advance();
                        ShrEq
                    } else {
                        Shr
                    }
                } else if self.current() == Some('=') {
                    self.advance();
                    Gte
                } else {
                    Gt
                }
            }
            '&' => {
                if self.current() == Some('=') {
                    self.advance();
                    AmpEq
                } else {
                    Amp
                }
            }
            '|' => {
                if self.current() == Some('=') {
                    self.advance();
                    PipeEq
                } else {
                    Pipe
                }
            }
            '^' => Caret,
            '!' => {
                if self.current() == Some('=') {
                    self.advance();
                    Neq
                } else {
                    Bang
                }
            }
            '=' => {
                if self.current() == Some('=') {
                    self.advance();
                    EqEq
                } else if self.current() == Some('>') {
                    self.advance();
                    FatArrow
                } else {
                    Assign
                }
            }
            other => return Err(LexError::UnexpectedChar { ch: other, line: span.line }),
        };
        Ok(Token::new(kind, span))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}
fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_arithmetic() {
        assert_eq!(
            kinds("1 + 2 * 3"),
            vec![
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::Star,
                TokenKind::Int(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_hex_literal() {
        assert_eq!(kinds("0xFF"), vec![TokenKind::Int(255), TokenKind::Eof]);
    }

    #[test]
    fn lexes_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::Str("a\nb".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn block_opening_punctuators() {
        assert_eq!(
            kinds("if (x){"),
            vec![
                TokenKind::If,
                TokenKind::LParen,
                TokenKind::Ident("x".into()),
                TokenKind::RParenLBrace,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("(x)=>{"),
            vec![
                TokenKind::LParen,
                TokenKind::Ident("x".into()),
                TokenKind::FatArrowLBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("1 // comment\n/* block */ 2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn tracks_line_numbers() {
        let tokens = Lexer::new("1\n2").tokenize().unwrap();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
    }
}
