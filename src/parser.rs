//! Recursive-descent parser: token stream to [`Program`].
//!
//! One token of lookahead. Top-level statements end with `;` or a line
//! boundary. Type references to not-yet-declared names intern a placeholder
//! in the type table; a later `defmsg`/`type` declaration fills the slot, and
//! a post-parse check rejects any placeholder that never resolved.

use std::collections::HashMap;

use crate::ast::*;
use crate::lexer::{int_const_val, Lexer, Token, TokenKind};
use crate::{CompileError, Result};

/// Parse protocol source into a [`Program`].
pub fn parse(source: &str) -> Result<Program> {
    Parser::new(source)?.program()
}

struct Parser {
    lex: Lexer,
    cur: Token,
    prev_line: usize,
    types: TypeTable,
    /// Line of the first reference to each forward-declared name.
    forward_refs: HashMap<String, usize>,
}

impl Parser {
    fn new(source: &str) -> Result<Self> {
        let mut lex = Lexer::new(source);
        let cur = lex.next_token()?;
        Ok(Parser {
            lex,
            cur,
            prev_line: 0,
            types: TypeTable::new(),
            forward_refs: HashMap::new(),
        })
    }

    fn error<T>(&self, msg: impl Into<String>, line: usize) -> Result<T> {
        Err(CompileError::Parse { msg: msg.into(), line })
    }

    fn advance(&mut self) -> Result<Token> {
        let next = self.lex.next_token()?;
        let prev = std::mem::replace(&mut self.cur, next);
        self.prev_line = prev.line;
        Ok(prev)
    }

    fn eat(&mut self, kind: TokenKind) -> Result<Token> {
        if self.cur.kind == kind {
            self.advance()
        } else {
            self.error(
                format!(
                    "expect {}, find: '{}'",
                    kind.describe(),
                    self.cur.text
                ),
                self.cur.line,
            )
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.cur.kind == kind
    }

    /// A statement ends with `;` or by starting the next statement on a new
    /// line.
    fn eat_separator(&mut self) -> Result<()> {
        if self.at(TokenKind::Semi) {
            self.eat(TokenKind::Semi)?;
        } else if !self.at(TokenKind::Eof) && self.prev_line == self.cur.line {
            return self.error(
                format!("missing separator before '{}'", self.cur.text),
                self.cur.line,
            );
        }
        Ok(())
    }

    fn program(mut self) -> Result<Program> {
        let mut mspace = String::new();
        let mut decls = Vec::new();

        while !self.at(TokenKind::Eof) {
            match self.cur.kind {
                TokenKind::Mspace => {
                    let tok = self.eat(TokenKind::Mspace)?;
                    let name = self.eat(TokenKind::Ident)?;
                    if !mspace.is_empty() {
                        return self.error(
                            format!("mspace already declared as '{}'", mspace),
                            tok.line,
                        );
                    }
                    mspace = name.text;
                    self.eat_separator()?;
                }
                TokenKind::Const => {
                    decls.push(Decl::Const(self.const_decl()?));
                    self.eat_separator()?;
                }
                TokenKind::SComment => {
                    let tok = self.advance()?;
                    decls.push(Decl::Comment(SrcComment { text: tok.text, line: tok.line }));
                }
                TokenKind::Type => {
                    decls.push(Decl::TypeAlias(self.type_def()?));
                }
                TokenKind::Defid => {
                    decls.push(Decl::IdGroup(self.id_group_decl(false)?));
                    self.eat_separator()?;
                }
                TokenKind::Defmid => {
                    decls.push(Decl::IdGroup(self.id_group_decl(true)?));
                    self.eat_separator()?;
                }
                TokenKind::Bind => {
                    decls.push(Decl::Bind(self.bind_decl()?));
                    self.eat_separator()?;
                }
                TokenKind::Extern => {
                    decls.push(Decl::Extern(self.extern_decl()?));
                    self.eat_separator()?;
                }
                _ => {
                    decls.push(Decl::Message(self.msg_decl()?));
                    self.eat_separator()?;
                }
            }
        }

        self.check_resolved()?;
        Ok(Program { mspace, decls, types: self.types })
    }

    /// All placeholder slots must have been filled by now.
    fn check_resolved(&self) -> Result<()> {
        for name in self.types.unresolved_names() {
            let line = self.forward_refs.get(&name).copied().unwrap_or(0);
            return self.error(format!("unresolved type reference: {}", name), line);
        }
        Ok(())
    }

    fn const_decl(&mut self) -> Result<ConstDef> {
        self.eat(TokenKind::Const)?;
        let name = self.eat(TokenKind::Ident)?;
        let value = self.expr()?;
        Ok(ConstDef { name: name.text, value, line: name.line })
    }

    fn type_def(&mut self) -> Result<TypeAliasDef> {
        self.eat(TokenKind::Type)?;
        let name = self.eat(TokenKind::Ident)?;
        let target = self.type_spec()?;
        let id = self
            .types
            .define_alias(&name.text, target)
            .or_else(|msg| self.error(msg, name.line))?;
        Ok(TypeAliasDef { name: name.text, ty: id, line: name.line })
    }

    fn extern_decl(&mut self) -> Result<ExternDef> {
        self.eat(TokenKind::Extern)?;
        let name = self.eat(TokenKind::Ident)?;
        let ty = self.type_spec()?;
        Ok(ExternDef { name: name.text, ty, line: name.line })
    }

    fn bind_decl(&mut self) -> Result<BindDef> {
        self.eat(TokenKind::Bind)?;
        let id_name = self.eat(TokenKind::Ident)?;
        let msg_name = if self.at(TokenKind::Nil) {
            self.eat(TokenKind::Nil)?;
            None
        } else {
            Some(self.eat(TokenKind::Ident)?.text)
        };
        Ok(BindDef { id_name: id_name.text, msg_name, line: id_name.line })
    }

    fn id_group_decl(&mut self, is_msg_id: bool) -> Result<IdGroupDef> {
        if is_msg_id {
            self.eat(TokenKind::Defmid)?;
        } else {
            self.eat(TokenKind::Defid)?;
        }
        let name = self.eat(TokenKind::Ident)?;
        let mut group = IdGroupDef {
            name: name.text,
            is_msg_id,
            items: Vec::new(),
            notes: Vec::new(),
            line: name.line,
        };
        self.eat(TokenKind::LBrace)?;

        self.collect_notes(&mut group.notes)?;
        if self.at(TokenKind::Ident) {
            group.items.push(self.id_item()?);
            loop {
                if self.at(TokenKind::Comma) {
                    self.eat(TokenKind::Comma)?;
                    self.collect_notes(&mut group.notes)?;
                    if self.at(TokenKind::RBrace) {
                        break;
                    }
                    group.items.push(self.id_item()?);
                } else if self.at(TokenKind::SComment) {
                    self.collect_notes(&mut group.notes)?;
                } else {
                    break;
                }
            }
        }
        self.collect_notes(&mut group.notes)?;
        self.eat(TokenKind::RBrace)?;
        Ok(group)
    }

    fn collect_notes(&mut self, notes: &mut Vec<SrcComment>) -> Result<()> {
        while self.at(TokenKind::SComment) {
            let tok = self.advance()?;
            notes.push(SrcComment { text: tok.text, line: tok.line });
        }
        Ok(())
    }

    fn id_item(&mut self) -> Result<IdItem> {
        let name = self.eat(TokenKind::Ident)?;
        let mut explicit_base = None;
        if self.at(TokenKind::Assign) {
            self.eat(TokenKind::Assign)?;
            let val = self.eat(TokenKind::IntConst)?;
            explicit_base = Some(self.int_value(&val)?);
        }
        Ok(IdItem {
            name: name.text,
            explicit_base,
            value: 0,
            bound_msg: None,
            line: name.line,
        })
    }

    fn msg_decl(&mut self) -> Result<TypeId> {
        self.eat(TokenKind::Defmsg)?;
        let name = self.eat(TokenKind::Ident)?;
        let mut def = StructDef {
            name: name.text,
            fields: Vec::new(),
            notes: Vec::new(),
            line: name.line,
        };
        self.eat(TokenKind::LBrace)?;

        let mut field_lines: HashMap<String, usize> = HashMap::new();
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::SComment) {
                let tok = self.advance()?;
                def.notes.push(SrcComment { text: tok.text, line: tok.line });
                continue;
            }
            let field = self.field_decl()?;
            if let Some(prev) = field_lines.insert(field.name.clone(), field.line) {
                return self.error(
                    format!(
                        "duplicate field name: {}, line: {}, prev line: {}",
                        field.name, field.line, prev
                    ),
                    field.line,
                );
            }
            def.fields.push(field);
            if self.at(TokenKind::Semi) {
                self.eat(TokenKind::Semi)?;
            }
        }
        self.eat(TokenKind::RBrace)?;

        self.types
            .define_struct(def)
            .or_else(|msg| self.error(msg, name.line))
    }

    fn field_decl(&mut self) -> Result<FieldDecl> {
        let name = self.eat(TokenKind::Ident)?;
        let ty = self.type_spec()?;
        let mut field = FieldDecl {
            name: name.text,
            ty,
            limit: None,
            max: None,
            min: None,
            equ: None,
            xor: None,
            exist_if: None,
            exist_follow_above: false,
            comment: None,
            line: name.line,
        };

        if self.at(TokenKind::Arrow) {
            self.eat(TokenKind::Arrow)?;
            let mut has = false;
            loop {
                match self.cur.kind {
                    TokenKind::Limit => {
                        self.eat(TokenKind::Limit)?;
                        self.eat(TokenKind::By)?;
                        field.limit = Some(self.name_ref()?);
                    }
                    TokenKind::Max => {
                        self.eat(TokenKind::Max)?;
                        field.max = Some(self.name_ref()?);
                    }
                    TokenKind::Equal => {
                        self.eat(TokenKind::Equal)?;
                        field.equ = Some(self.name_ref()?);
                    }
                    TokenKind::Xor => {
                        self.eat(TokenKind::Xor)?;
                        field.xor = Some(self.name_ref()?);
                    }
                    TokenKind::Exist => {
                        self.eat(TokenKind::Exist)?;
                        if self.at(TokenKind::Follow) {
                            self.eat(TokenKind::Follow)?;
                            self.eat(TokenKind::Above)?;
                            field.exist_follow_above = true;
                        } else {
                            self.eat(TokenKind::If)?;
                            field.exist_if = Some(self.expr()?);
                        }
                    }
                    _ => break,
                }
                has = true;
            }
            if !has {
                return self.error(
                    format!("expect field modifier after '->', find: '{}'", self.cur.text),
                    self.cur.line,
                );
            }
        }

        // Only a comment on the same line documents this field; a comment on
        // its own line belongs to the enclosing message.
        if self.at(TokenKind::SComment) && self.cur.line == self.prev_line {
            let tok = self.advance()?;
            field.comment = Some(SrcComment { text: tok.text, line: tok.line });
        }

        Ok(field)
    }

    fn name_ref(&mut self) -> Result<NameRef> {
        let tok = self.eat(TokenKind::Ident)?;
        Ok(NameRef { this: false, name: tok.text, line: tok.line })
    }

    fn type_spec(&mut self) -> Result<TypeId> {
        match self.cur.kind {
            TokenKind::Prim(p) => {
                self.advance()?;
                Ok(self.types.prim(p))
            }
            TokenKind::LBracket => {
                self.eat(TokenKind::LBracket)?;
                self.eat(TokenKind::RBracket)?;
                let elem = self.type_spec()?;
                Ok(self.types.array_of(elem))
            }
            TokenKind::Ident => {
                let tok = self.advance()?;
                if let Some(id) = self.types.lookup(&tok.text) {
                    return Ok(id);
                }
                self.forward_refs.entry(tok.text.clone()).or_insert(tok.line);
                Ok(self.types.intern_unresolved(&tok.text))
            }
            _ => self.error(
                format!("error type spec: '{}'", self.cur.text),
                self.cur.line,
            ),
        }
    }

    fn int_value(&self, tok: &Token) -> Result<u64> {
        match int_const_val(&tok.text) {
            Some(v) => Ok(v),
            None => Err(CompileError::Parse {
                msg: format!("integer literal out of range: {}", tok.text),
                line: tok.line,
            }),
        }
    }

    // Expression ladder: || > && > | > & > == != > < <= > >= > << >> > + - > * /
    fn expr(&mut self) -> Result<Expr> {
        let mut node = self.expr_and()?;
        while self.at(TokenKind::OrOr) {
            let tok = self.advance()?;
            let rhs = self.expr_and()?;
            node = binary(BinOp::Or, node, rhs, tok.line);
        }
        Ok(node)
    }

    fn expr_and(&mut self) -> Result<Expr> {
        let mut node = self.expr_bit_or()?;
        while self.at(TokenKind::AndAnd) {
            let tok = self.advance()?;
            let rhs = self.expr_bit_or()?;
            node = binary(BinOp::And, node, rhs, tok.line);
        }
        Ok(node)
    }

    fn expr_bit_or(&mut self) -> Result<Expr> {
        let mut node = self.expr_bit_and()?;
        while self.at(TokenKind::BitOr) {
            let tok = self.advance()?;
            let rhs = self.expr_bit_and()?;
            node = binary(BinOp::BitOr, node, rhs, tok.line);
        }
        Ok(node)
    }

    fn expr_bit_and(&mut self) -> Result<Expr> {
        let mut node = self.expr_equ()?;
        while self.at(TokenKind::BitAnd) {
            let tok = self.advance()?;
            let rhs = self.expr_equ()?;
            node = binary(BinOp::BitAnd, node, rhs, tok.line);
        }
        Ok(node)
    }

    fn expr_equ(&mut self) -> Result<Expr> {
        let mut node = self.expr_comp()?;
        while self.at(TokenKind::EqEq) || self.at(TokenKind::NotEq) {
            let tok = self.advance()?;
            let op = if tok.kind == TokenKind::EqEq { BinOp::Eq } else { BinOp::Ne };
            let rhs = self.expr_comp()?;
            node = binary(op, node, rhs, tok.line);
        }
        Ok(node)
    }

    fn expr_comp(&mut self) -> Result<Expr> {
        let mut node = self.expr_shift()?;
        loop {
            let op = match self.cur.kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            let tok = self.advance()?;
            let rhs = self.expr_shift()?;
            node = binary(op, node, rhs, tok.line);
        }
        Ok(node)
    }

    fn expr_shift(&mut self) -> Result<Expr> {
        let mut node = self.expr_add()?;
        while self.at(TokenKind::Shl) || self.at(TokenKind::Shr) {
            let tok = self.advance()?;
            let op = if tok.kind == TokenKind::Shl { BinOp::Shl } else { BinOp::Shr };
            let rhs = self.expr_add()?;
            node = binary(op, node, rhs, tok.line);
        }
        Ok(node)
    }

    fn expr_add(&mut self) -> Result<Expr> {
        let mut node = self.expr_mul()?;
        while self.at(TokenKind::Plus) || self.at(TokenKind::Minus) {
            let tok = self.advance()?;
            let op = if tok.kind == TokenKind::Plus { BinOp::Add } else { BinOp::Sub };
            let rhs = self.expr_mul()?;
            node = binary(op, node, rhs, tok.line);
        }
        Ok(node)
    }

    fn expr_mul(&mut self) -> Result<Expr> {
        let mut node = self.factor()?;
        while self.at(TokenKind::Star) || self.at(TokenKind::Slash) {
            let tok = self.advance()?;
            let op = if tok.kind == TokenKind::Star { BinOp::Mul } else { BinOp::Div };
            let rhs = self.factor()?;
            node = binary(op, node, rhs, tok.line);
        }
        Ok(node)
    }

    fn factor(&mut self) -> Result<Expr> {
        match self.cur.kind {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Not => {
                let tok = self.advance()?;
                let op = match tok.kind {
                    TokenKind::Plus => UnOp::Plus,
                    TokenKind::Minus => UnOp::Neg,
                    _ => UnOp::Not,
                };
                let expr = self.factor()?;
                Ok(Expr::Unary { op, expr: Box::new(expr), line: tok.line })
            }
            TokenKind::IntConst => {
                let tok = self.advance()?;
                let value = self.int_value(&tok)?;
                Ok(Expr::Int { value, line: tok.line })
            }
            TokenKind::StringConst => {
                let tok = self.advance()?;
                Ok(Expr::Str { value: tok.text, line: tok.line })
            }
            TokenKind::Ident | TokenKind::This => self.var_ref(),
            TokenKind::LParen => {
                self.eat(TokenKind::LParen)?;
                let expr = self.expr()?;
                self.eat(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => self.error(
                format!("parse factor failed, cur token: '{}'", self.cur.text),
                self.cur.line,
            ),
        }
    }

    fn var_ref(&mut self) -> Result<Expr> {
        let this = if self.at(TokenKind::This) {
            self.eat(TokenKind::This)?;
            self.eat(TokenKind::Dot)?;
            true
        } else {
            false
        };
        let base = self.eat(TokenKind::Ident)?;
        let mut node = Expr::Name(NameRef { this, name: base.text, line: base.line });

        loop {
            match self.cur.kind {
                TokenKind::LBracket => {
                    let tok = self.eat(TokenKind::LBracket)?;
                    let index = self.expr()?;
                    self.eat(TokenKind::RBracket)?;
                    node = Expr::Index {
                        host: Box::new(node),
                        index: Box::new(index),
                        line: tok.line,
                    };
                }
                TokenKind::Dot => {
                    let tok = self.eat(TokenKind::Dot)?;
                    let name = self.eat(TokenKind::Ident)?;
                    node = Expr::Dot { host: Box::new(node), name: name.text, line: tok.line };
                }
                _ => break,
            }
        }
        Ok(node)
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr, line: usize) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line }
}
