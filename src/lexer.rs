//! Hand-written lexer for the protocol DSL.
//!
//! Produces [`Token`]s with 1-based line/column positions. The parser needs
//! one token of lookahead, provided by [`Lexer::peek_token`]. Comments:
//! `/* ... */` and `//` are skipped, `//*` yields an [`TokenKind::SComment`]
//! token whose value keeps everything after the `//` prefix (leading `*`
//! included), so documentation comments survive into the generated output.

use crate::ast::Prim;
use crate::{CompileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Integer literal; the raw lexeme (decimal or `0x...`) is in `text`.
    IntConst,
    /// String literal; the unescaped value is in `text`.
    StringConst,
    Ident,
    /// `//*` documentation comment.
    SComment,

    /// Primitive type keyword.
    Prim(Prim),

    Defmsg,
    Defid,
    Defmid,
    Bind,
    Type,
    Struct,
    Extern,
    Mspace,
    Const,
    New,
    Nil,

    Limit,
    By,
    Max,
    Equal,
    Xor,
    Exist,
    If,
    Follow,
    Above,
    This,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Semi,
    Dot,

    Assign,
    DecAssign,
    Arrow,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    BitAnd,
    BitOr,
    Plus,
    Minus,
    Star,
    Slash,
    Not,

    Eof,
}

impl TokenKind {
    /// Short name used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::IntConst => "integer".to_string(),
            TokenKind::StringConst => "string".to_string(),
            TokenKind::Ident => "identifier".to_string(),
            TokenKind::SComment => "comment".to_string(),
            TokenKind::Prim(p) => p.name().to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("{:?}", other).to_lowercase(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "int" => TokenKind::Prim(Prim::Int),
        "string" => TokenKind::Prim(Prim::Str),
        "any" => TokenKind::Prim(Prim::Any),
        "char" => TokenKind::Prim(Prim::Char),
        "u1" => TokenKind::Prim(Prim::U1),
        "u2" => TokenKind::Prim(Prim::U2),
        "u3" => TokenKind::Prim(Prim::U3),
        "u4" => TokenKind::Prim(Prim::U4),
        "u5" => TokenKind::Prim(Prim::U5),
        "u6" => TokenKind::Prim(Prim::U6),
        "u7" => TokenKind::Prim(Prim::U7),
        "u8" => TokenKind::Prim(Prim::U8),
        "u16" => TokenKind::Prim(Prim::U16),
        "u32" => TokenKind::Prim(Prim::U32),
        "u64" => TokenKind::Prim(Prim::U64),
        "v32" => TokenKind::Prim(Prim::V32),
        "v64" => TokenKind::Prim(Prim::V64),
        "defmsg" => TokenKind::Defmsg,
        "defid" => TokenKind::Defid,
        "defmid" => TokenKind::Defmid,
        "bind" => TokenKind::Bind,
        "type" => TokenKind::Type,
        "struct" => TokenKind::Struct,
        "extern" => TokenKind::Extern,
        "mspace" => TokenKind::Mspace,
        "const" => TokenKind::Const,
        "new" => TokenKind::New,
        "nil" => TokenKind::Nil,
        "limit" => TokenKind::Limit,
        "by" => TokenKind::By,
        "max" => TokenKind::Max,
        "equal" => TokenKind::Equal,
        "xor" => TokenKind::Xor,
        "exist" => TokenKind::Exist,
        "if" => TokenKind::If,
        "follow" => TokenKind::Follow,
        "above" => TokenKind::Above,
        "this" => TokenKind::This,
        _ => return None,
    };
    Some(kind)
}

pub struct Lexer {
    text: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    peeked: Option<Token>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            text: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            peeked: None,
        }
    }

    fn cur(&self) -> char {
        self.peek_char(0)
    }

    fn peek_char(&self, ahead: usize) -> char {
        self.text.get(self.pos + ahead).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if self.pos < self.text.len() {
            if self.text[self.pos] == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn advance_by(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    fn skip_spaces(&mut self) {
        while self.cur().is_whitespace() {
            self.advance();
        }
    }

    fn token(&self, kind: TokenKind, text: impl Into<String>) -> Token {
        Token { kind, text: text.into(), line: self.line, column: self.column }
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Token> {
        if let Some(tok) = &self.peeked {
            return Ok(tok.clone());
        }
        let tok = self.scan_token()?;
        self.peeked = Some(tok.clone());
        Ok(tok)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        self.scan_token()
    }

    fn scan_token(&mut self) -> Result<Token> {
        loop {
            self.skip_spaces();
            if self.cur() == '\0' {
                return Ok(self.token(TokenKind::Eof, "EOF"));
            }

            let line = self.line;
            let column = self.column;

            if self.cur().is_ascii_digit() {
                let text = self.scan_integer();
                return Ok(Token { kind: TokenKind::IntConst, text, line, column });
            }
            if self.cur().is_alphabetic() {
                return Ok(self.scan_ident());
            }
            if self.cur() == '"' {
                let text = self.scan_string()?;
                return Ok(Token { kind: TokenKind::StringConst, text, line, column });
            }

            let (kind, text, len) = match (self.cur(), self.peek_char(1)) {
                ('/', '*') => {
                    self.skip_block_comment();
                    continue;
                }
                ('/', '/') => {
                    let body = self.scan_line_comment();
                    if body.starts_with('*') {
                        return Ok(Token { kind: TokenKind::SComment, text: body, line, column });
                    }
                    continue;
                }
                ('-', '>') => (TokenKind::Arrow, "->", 2),
                (':', '=') => (TokenKind::DecAssign, ":=", 2),
                ('=', '=') => (TokenKind::EqEq, "==", 2),
                ('!', '=') => (TokenKind::NotEq, "!=", 2),
                ('<', '=') => (TokenKind::Le, "<=", 2),
                ('<', '<') => (TokenKind::Shl, "<<", 2),
                ('>', '=') => (TokenKind::Ge, ">=", 2),
                ('>', '>') => (TokenKind::Shr, ">>", 2),
                ('&', '&') => (TokenKind::AndAnd, "&&", 2),
                ('|', '|') => (TokenKind::OrOr, "||", 2),
                ('+', _) => (TokenKind::Plus, "+", 1),
                ('-', _) => (TokenKind::Minus, "-", 1),
                ('*', _) => (TokenKind::Star, "*", 1),
                ('/', _) => (TokenKind::Slash, "/", 1),
                (':', _) => (TokenKind::Colon, ":", 1),
                ('=', _) => (TokenKind::Assign, "=", 1),
                ('!', _) => (TokenKind::Not, "!", 1),
                ('&', _) => (TokenKind::BitAnd, "&", 1),
                ('|', _) => (TokenKind::BitOr, "|", 1),
                ('<', _) => (TokenKind::Lt, "<", 1),
                ('>', _) => (TokenKind::Gt, ">", 1),
                ('(', _) => (TokenKind::LParen, "(", 1),
                (')', _) => (TokenKind::RParen, ")", 1),
                ('{', _) => (TokenKind::LBrace, "{", 1),
                ('}', _) => (TokenKind::RBrace, "}", 1),
                ('[', _) => (TokenKind::LBracket, "[", 1),
                (']', _) => (TokenKind::RBracket, "]", 1),
                (',', _) => (TokenKind::Comma, ",", 1),
                (';', _) => (TokenKind::Semi, ";", 1),
                ('.', _) => (TokenKind::Dot, ".", 1),
                (ch, _) => {
                    return Err(CompileError::Lex {
                        msg: format!("unknown char {:?} ({:#x})", ch, ch as u32),
                        line,
                        column,
                    });
                }
            };
            self.advance_by(len);
            return Ok(Token { kind, text: text.to_string(), line, column });
        }
    }

    fn scan_integer(&mut self) -> String {
        let mut digits = String::new();
        let hex = self.cur() == '0' && matches!(self.peek_char(1), 'x' | 'X');
        if hex {
            digits.push_str("0x");
            self.advance_by(2);
        }
        loop {
            let ch = self.cur();
            let keep = if hex { ch.is_ascii_hexdigit() } else { ch.is_ascii_digit() };
            if !keep {
                break;
            }
            digits.push(ch);
            self.advance();
        }
        digits
    }

    fn scan_ident(&mut self) -> Token {
        let line = self.line;
        let column = self.column;
        let mut word = String::new();
        while self.cur().is_alphanumeric() || self.cur() == '_' {
            word.push(self.cur());
            self.advance();
        }
        let kind = keyword_kind(&word).unwrap_or(TokenKind::Ident);
        Token { kind, text: word, line, column }
    }

    fn escaped_char(escaped: char) -> char {
        match escaped {
            't' => '\t',
            'b' => '\u{0008}',
            'n' => '\n',
            'r' => '\r',
            'f' => '\u{000c}',
            other => other,
        }
    }

    fn scan_string(&mut self) -> Result<String> {
        let line = self.line;
        let column = self.column;
        self.advance();
        let mut value = String::new();
        loop {
            match self.cur() {
                '\0' => {
                    return Err(CompileError::Lex {
                        msg: "unterminated string literal".to_string(),
                        line,
                        column,
                    });
                }
                '"' => {
                    self.advance();
                    return Ok(value);
                }
                '\\' => {
                    self.advance();
                    value.push(Self::escaped_char(self.cur()));
                    self.advance();
                }
                ch => {
                    value.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance_by(2);
        while self.cur() != '\0' {
            if self.cur() == '*' && self.peek_char(1) == '/' {
                self.advance_by(2);
                return;
            }
            self.advance();
        }
    }

    /// Consume a `//` comment to end of line, returning the text after the
    /// `//` prefix.
    fn scan_line_comment(&mut self) -> String {
        self.advance_by(2);
        let mut body = String::new();
        while self.cur() != '\0' && self.cur() != '\n' {
            body.push(self.cur());
            self.advance();
        }
        body
    }
}

/// Parse an integer lexeme as produced by the lexer (`123` or `0x7f`).
/// `None` when the value does not fit an unsigned 64-bit integer.
pub fn int_const_val(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u64>().ok()
    }
}
