// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Recursive descent parser for template markup.
//!
//! The parser walks the token stream produced by [`super::lexer`]. Block
//! tags are dispatched by name: the built-in statements are handled here,
//! any other name is offered to the registered [`Extension`]s. The
//! stream-level methods (`current`, `next_token`, `expect`,
//! `parse_expression`, `parse_statements`, ...) are public so extensions
//! can consume their own syntax.
//!
//! Statement parsers leave the parser on the `%}` closing their final
//! tag; the caller consumes it.

use std::mem::discriminant;
use std::sync::Arc;

use super::ast::*;
use super::extension::Extension;
use super::lexer::{tokenize, LexerOptions, Token, TokenKind};
use super::value::Value;
use crate::error::{EaError, Result, SourceContext};

const RESERVED: &[&str] = &["true", "false", "none", "True", "False", "None"];

/// Template parser state.
pub struct Parser<'a> {
    name: &'a str,
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    extensions: &'a [Arc<dyn Extension>],
}

impl<'a> Parser<'a> {
    /// Tokenizes `source` and prepares a parser.
    pub fn new(
        name: &'a str,
        source: &'a str,
        options: LexerOptions,
        extensions: &'a [Arc<dyn Extension>],
    ) -> Result<Self> {
        let tokens = tokenize(source, options).map_err(|e| EaError::Syntax {
            template: name.to_string(),
            message: e.message,
            line: e.line,
            source_context: Some(SourceContext::from_source(source, e.line)),
        })?;
        Ok(Self {
            name,
            source,
            tokens,
            pos: 0,
            extensions,
        })
    }

    /// Parses the whole template.
    pub fn parse(mut self) -> Result<Vec<Node>> {
        self.subparse(&[])
    }

    /// The current token.
    pub fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// The token after the current one.
    pub fn look(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    /// Consumes and returns the current token. Never moves past `Eof`.
    pub fn next_token(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    /// Whether the current token is of the given kind (payload ignored).
    pub fn check(&self, kind: &TokenKind) -> bool {
        discriminant(&self.current().kind) == discriminant(kind)
    }

    /// Whether the current token is the name `name`.
    pub fn check_name(&self, name: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Name(n) if n == name)
    }

    /// Consumes the current token if it is of the given kind.
    pub fn skip_if(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.next_token();
            true
        } else {
            false
        }
    }

    /// Consumes the current token if it is the name `name`.
    pub fn skip_name(&mut self, name: &str) -> bool {
        if self.check_name(name) {
            self.next_token();
            true
        } else {
            false
        }
    }

    /// Consumes a token of the given kind or fails.
    pub fn expect(&mut self, kind: &TokenKind) -> Result<Token> {
        if self.check(kind) {
            Ok(self.next_token())
        } else {
            Err(self.fail(format!(
                "expected {}, got {}",
                kind.describe(),
                self.current().kind.describe()
            )))
        }
    }

    /// Consumes any name token and returns it.
    pub fn expect_name(&mut self) -> Result<String> {
        match &self.current().kind {
            TokenKind::Name(n) => {
                let n = n.clone();
                self.next_token();
                Ok(n)
            }
            other => Err(self.fail(format!("expected name, got {}", other.describe()))),
        }
    }

    /// Consumes the keyword `keyword` or fails.
    pub fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.skip_name(keyword) {
            Ok(())
        } else {
            Err(self.fail(format!(
                "expected '{}', got {}",
                keyword,
                self.current().kind.describe()
            )))
        }
    }

    /// Builds a syntax error at the current line.
    pub fn fail(&self, message: impl Into<String>) -> EaError {
        let line = self.current().line;
        EaError::Syntax {
            template: self.name.to_string(),
            message: message.into(),
            line,
            source_context: Some(SourceContext::from_source(self.source, line)),
        }
    }

    /// Parses the body of a block tag.
    ///
    /// Expects the current token to be the `%}` of the opening tag and
    /// parses until one of `end_tags` opens a block. With `drop_needle`
    /// the end tag name is consumed too.
    pub fn parse_statements(&mut self, end_tags: &[&str], drop_needle: bool) -> Result<Vec<Node>> {
        self.skip_if(&TokenKind::Colon);
        self.expect(&TokenKind::BlockEnd)?;
        let body = self.subparse(end_tags)?;
        if drop_needle {
            self.next_token();
        }
        Ok(body)
    }

    /// Parses an assignment target (a plain variable name).
    pub fn parse_assign_target(&mut self) -> Result<String> {
        let name = self.expect_name()?;
        if RESERVED.contains(&name.as_str()) {
            return Err(self.fail(format!("can't assign to '{}'", name)));
        }
        Ok(name)
    }

    fn subparse(&mut self, end_tags: &[&str]) -> Result<Vec<Node>> {
        let mut body = Vec::new();
        loop {
            match self.current().kind.clone() {
                TokenKind::Eof => {
                    if end_tags.is_empty() {
                        return Ok(body);
                    }
                    let expected = end_tags
                        .iter()
                        .map(|t| format!("'{}'", t))
                        .collect::<Vec<_>>()
                        .join(" or ");
                    return Err(self.fail(format!(
                        "unexpected end of template, expected {}",
                        expected
                    )));
                }
                TokenKind::Data(text) => {
                    self.next_token();
                    body.push(Node::Text(text));
                }
                TokenKind::VariableBegin => {
                    self.next_token();
                    let expr = self.parse_expression()?;
                    self.expect(&TokenKind::VariableEnd)?;
                    body.push(Node::Output(expr));
                }
                TokenKind::BlockBegin => {
                    self.next_token();
                    if let TokenKind::Name(n) = &self.current().kind {
                        if end_tags.contains(&n.as_str()) {
                            return Ok(body);
                        }
                    }
                    let node = self.parse_statement()?;
                    self.expect(&TokenKind::BlockEnd)?;
                    body.push(node);
                }
                other => {
                    return Err(self.fail(format!("unexpected {}", other.describe())));
                }
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Node> {
        let tag = match &self.current().kind {
            TokenKind::Name(n) => n.clone(),
            other => return Err(self.fail(format!("tag name expected, got {}", other.describe()))),
        };

        match tag.as_str() {
            "if" => self.parse_if(),
            "for" => self.parse_for(),
            "set" => self.parse_set(),
            "with" => self.parse_with(),
            "block" => self.parse_block(),
            "extends" => {
                self.next_token();
                Ok(Node::Extends(self.parse_expression()?))
            }
            "include" => self.parse_include(),
            _ => {
                let extensions = self.extensions;
                match extensions.iter().find(|e| e.tags().contains(&tag.as_str())) {
                    Some(extension) => extension.parse(self),
                    None => Err(self.fail(format!("encountered unknown tag '{}'", tag))),
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<Node> {
        self.next_token();
        let test = self.parse_expression()?;
        let body = self.parse_statements(&["elif", "else", "endif"], false)?;
        let mut node = IfNode {
            test,
            body,
            elif: Vec::new(),
            else_: Vec::new(),
        };

        loop {
            match self.next_token().kind {
                TokenKind::Name(n) if n == "elif" => {
                    let test = self.parse_expression()?;
                    let body = self.parse_statements(&["elif", "else", "endif"], false)?;
                    node.elif.push((test, body));
                }
                TokenKind::Name(n) if n == "else" => {
                    node.else_ = self.parse_statements(&["endif"], true)?;
                    break;
                }
                _ => break,
            }
        }
        Ok(Node::If(node))
    }

    fn parse_for(&mut self) -> Result<Node> {
        self.next_token();
        let mut targets = vec![self.parse_assign_target()?];
        while self.skip_if(&TokenKind::Comma) {
            targets.push(self.parse_assign_target()?);
        }
        self.expect_keyword("in")?;
        let iter = self.parse_or()?;
        let body = self.parse_statements(&["endfor", "else"], false)?;
        let else_ = match self.next_token().kind {
            TokenKind::Name(n) if n == "else" => self.parse_statements(&["endfor"], true)?,
            _ => Vec::new(),
        };
        Ok(Node::For(ForNode {
            targets,
            iter,
            body,
            else_,
        }))
    }

    fn parse_set(&mut self) -> Result<Node> {
        self.next_token();
        let target = self.parse_assign_target()?;
        self.expect(&TokenKind::Assign)?;
        let value = self.parse_expression()?;
        Ok(Node::Set(SetNode { target, value }))
    }

    fn parse_with(&mut self) -> Result<Node> {
        self.next_token();
        let mut targets = Vec::new();
        let mut values = Vec::new();
        while !self.check(&TokenKind::BlockEnd) {
            if !targets.is_empty() {
                self.expect(&TokenKind::Comma)?;
            }
            targets.push(self.parse_assign_target()?);
            self.expect(&TokenKind::Assign)?;
            values.push(self.parse_expression()?);
        }
        let body = self.parse_statements(&["endwith"], true)?;
        Ok(Node::With(WithNode {
            targets,
            values,
            body,
        }))
    }

    fn parse_block(&mut self) -> Result<Node> {
        self.next_token();
        let name = self.expect_name()?;
        let body = self.parse_statements(&["endblock"], true)?;
        if let TokenKind::Name(end_name) = &self.current().kind {
            if *end_name != name {
                return Err(self.fail(format!(
                    "mismatched endblock: expected '{}', got '{}'",
                    name, end_name
                )));
            }
            self.next_token();
        }
        Ok(Node::Block(BlockNode { name, body }))
    }

    fn parse_include(&mut self) -> Result<Node> {
        self.next_token();
        let template = self.parse_expression()?;
        let ignore_missing = if self.skip_name("ignore") {
            self.expect_keyword("missing")?;
            true
        } else {
            false
        };
        Ok(Node::Include(IncludeNode {
            template,
            ignore_missing,
        }))
    }

    /// Parses a full expression, including `a if b else c`.
    pub fn parse_expression(&mut self) -> Result<Expr> {
        let expr1 = self.parse_or()?;
        if self.skip_name("if") {
            let test = self.parse_or()?;
            let expr2 = if self.skip_name("else") {
                Some(Box::new(self.parse_expression()?))
            } else {
                None
            };
            return Ok(Expr::Cond {
                test: Box::new(test),
                expr1: Box::new(expr1),
                expr2,
            });
        }
        Ok(expr1)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.skip_name("or") {
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.skip_name("and") {
            let right = self.parse_not()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.skip_name("not") {
            let node = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                node: Box::new(node),
            });
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        let mut left = self.parse_math1()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::Name(n) if n == "in" => BinOp::In,
                TokenKind::Name(n)
                    if n == "not" && matches!(&self.look().kind, TokenKind::Name(m) if m == "in") =>
                {
                    self.next_token();
                    BinOp::NotIn
                }
                _ => break,
            };
            self.next_token();
            let right = self.parse_math1()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_math1(&mut self) -> Result<Expr> {
        let mut left = self.parse_concat()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Add => BinOp::Add,
                TokenKind::Sub => BinOp::Sub,
                _ => break,
            };
            self.next_token();
            let right = self.parse_concat()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_concat(&mut self) -> Result<Expr> {
        let mut left = self.parse_math2()?;
        while self.skip_if(&TokenKind::Tilde) {
            let right = self.parse_math2()?;
            left = binary(BinOp::Concat, left, right);
        }
        Ok(left)
    }

    fn parse_math2(&mut self) -> Result<Expr> {
        let mut left = self.parse_pow()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Mul => BinOp::Mul,
                TokenKind::Div => BinOp::Div,
                TokenKind::FloorDiv => BinOp::FloorDiv,
                TokenKind::Mod => BinOp::Mod,
                _ => break,
            };
            self.next_token();
            let right = self.parse_pow()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_pow(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.skip_if(&TokenKind::Pow) {
            let right = self.parse_unary()?;
            left = binary(BinOp::Pow, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.current().kind {
            TokenKind::Sub => Some(UnaryOp::Neg),
            TokenKind::Add => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            self.next_token();
            let node = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                node: Box::new(node),
            });
        }
        let primary = self.parse_primary()?;
        let node = self.parse_postfix(primary)?;
        self.parse_filter_expr(node)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.next_token();
        match token.kind {
            TokenKind::Name(n) => Ok(match n.as_str() {
                "true" | "True" => Expr::Const(Value::Bool(true)),
                "false" | "False" => Expr::Const(Value::Bool(false)),
                "none" | "None" => Expr::Const(Value::None),
                _ => Expr::Name(n),
            }),
            TokenKind::Str(s) => {
                let mut value = s;
                while let TokenKind::Str(next) = &self.current().kind {
                    value.push_str(next);
                    self.next_token();
                }
                Ok(Expr::Const(Value::String(value)))
            }
            TokenKind::Int(i) => Ok(Expr::Const(Value::Int(i))),
            TokenKind::Float(f) => Ok(Expr::Const(Value::Float(f))),
            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    if !items.is_empty() {
                        self.expect(&TokenKind::Comma)?;
                        if self.check(&TokenKind::RBracket) {
                            break;
                        }
                    }
                    items.push(self.parse_expression()?);
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => {
                let mut entries = Vec::new();
                while !self.check(&TokenKind::RBrace) {
                    if !entries.is_empty() {
                        self.expect(&TokenKind::Comma)?;
                        if self.check(&TokenKind::RBrace) {
                            break;
                        }
                    }
                    let key = self.parse_expression()?;
                    self.expect(&TokenKind::Colon)?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                }
                self.expect(&TokenKind::RBrace)?;
                Ok(Expr::Dict(entries))
            }
            other => {
                self.pos -= usize::from(other != TokenKind::Eof);
                Err(self.fail(format!("unexpected {}", other.describe())))
            }
        }
    }

    fn parse_postfix(&mut self, mut node: Expr) -> Result<Expr> {
        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.next_token();
                    let token = self.next_token();
                    node = match token.kind {
                        TokenKind::Name(attr) => Expr::Getattr {
                            node: Box::new(node),
                            attr,
                        },
                        TokenKind::Int(i) => Expr::Getitem {
                            node: Box::new(node),
                            arg: Box::new(Expr::Const(Value::Int(i))),
                        },
                        other => {
                            return Err(self.fail(format!(
                                "expected attribute name, got {}",
                                other.describe()
                            )))
                        }
                    };
                }
                TokenKind::LBracket => {
                    self.next_token();
                    let arg = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    node = Expr::Getitem {
                        node: Box::new(node),
                        arg: Box::new(arg),
                    };
                }
                TokenKind::LParen => {
                    self.next_token();
                    let (args, kwargs) = self.parse_call_args()?;
                    node = Expr::Call {
                        func: Box::new(node),
                        args,
                        kwargs,
                    };
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_filter_expr(&mut self, mut node: Expr) -> Result<Expr> {
        loop {
            if self.skip_if(&TokenKind::Pipe) {
                let name = self.expect_name()?;
                let (args, kwargs) = if self.skip_if(&TokenKind::LParen) {
                    self.parse_call_args()?
                } else {
                    (Vec::new(), Vec::new())
                };
                node = Expr::Filter {
                    node: Box::new(node),
                    name,
                    args,
                    kwargs,
                };
            } else if self.skip_name("is") {
                let negated = self.skip_name("not");
                let name = self.expect_name()?;
                let args = if self.skip_if(&TokenKind::LParen) {
                    self.parse_call_args()?.0
                } else {
                    Vec::new()
                };
                node = Expr::Test {
                    node: Box::new(node),
                    name,
                    args,
                    negated,
                };
            } else {
                return Ok(node);
            }
        }
    }

    /// Parses call arguments after `(` up to and including `)`.
    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if !args.is_empty() || !kwargs.is_empty() {
                self.expect(&TokenKind::Comma)?;
                if self.check(&TokenKind::RParen) {
                    break;
                }
            }
            let is_kwarg = matches!(self.current().kind, TokenKind::Name(_))
                && self.look().kind == TokenKind::Assign;
            if is_kwarg {
                let key = self.expect_name()?;
                self.next_token();
                kwargs.push((key, self.parse_expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.fail("positional argument follows keyword argument"));
                }
                args.push(self.parse_expression()?);
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok((args, kwargs))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
