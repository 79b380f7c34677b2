// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree types for templates.
//!
//! The parser produces a list of [`Node`]s per template. Extensions do not
//! add node types; they translate their tags into the nodes below.

use super::value::Value;

/// A statement-level template node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Raw text copied to the output.
    Text(String),
    /// `{{ expr }}`
    Output(Expr),
    /// `{% if %}...{% elif %}...{% else %}...{% endif %}`
    If(IfNode),
    /// `{% for x in items %}...{% else %}...{% endfor %}`
    For(ForNode),
    /// `{% set name = expr %}`
    Set(SetNode),
    /// `{% with a = expr %}...{% endwith %}`: scoped assignments.
    With(WithNode),
    /// `{% block name %}...{% endblock %}`
    Block(BlockNode),
    /// `{% extends "base.html" %}`
    Extends(Expr),
    /// `{% include "partial.html" %}`
    Include(IncludeNode),
}

/// Conditional node.
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    /// Condition.
    pub test: Expr,
    /// Rendered when `test` is truthy.
    pub body: Vec<Node>,
    /// `elif` branches, tried in order.
    pub elif: Vec<(Expr, Vec<Node>)>,
    /// Rendered when nothing matched.
    pub else_: Vec<Node>,
}

/// Loop node.
#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    /// Loop variable names; more than one unpacks list items.
    pub targets: Vec<String>,
    /// Iterated expression.
    pub iter: Expr,
    /// Loop body.
    pub body: Vec<Node>,
    /// Rendered when the iterable is empty.
    pub else_: Vec<Node>,
}

/// Assignment node.
#[derive(Debug, Clone, PartialEq)]
pub struct SetNode {
    /// Variable name.
    pub target: String,
    /// Assigned expression.
    pub value: Expr,
}

/// Scoped assignment node.
///
/// `values` are evaluated in the outer scope, then bound to `targets` in
/// a new scope that only lives for `body`.
#[derive(Debug, Clone, PartialEq)]
pub struct WithNode {
    /// Bound names.
    pub targets: Vec<String>,
    /// Bound expressions, one per target.
    pub values: Vec<Expr>,
    /// Scoped body.
    pub body: Vec<Node>,
}

/// Overridable block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    /// Block name.
    pub name: String,
    /// Default content.
    pub body: Vec<Node>,
}

/// Include node.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeNode {
    /// Template name expression.
    pub template: Expr,
    /// Render nothing instead of failing when the template is missing.
    pub ignore_missing: bool,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
    /// `~`
    Concat,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `and`
    And,
    /// `or`
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `not`
    Not,
    /// `-`
    Neg,
    /// `+`
    Pos,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal constant.
    Const(Value),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `{"a": b}`
    Dict(Vec<(Expr, Expr)>),
    /// Variable reference.
    Name(String),
    /// `node.attr`
    Getattr {
        /// Object expression.
        node: Box<Expr>,
        /// Attribute name.
        attr: String,
    },
    /// `node[arg]`
    Getitem {
        /// Object expression.
        node: Box<Expr>,
        /// Subscript.
        arg: Box<Expr>,
    },
    /// `node | name(args)`
    Filter {
        /// Filtered expression.
        node: Box<Expr>,
        /// Filter name.
        name: String,
        /// Positional arguments.
        args: Vec<Expr>,
        /// Keyword arguments.
        kwargs: Vec<(String, Expr)>,
    },
    /// `node is [not] name(args)`
    Test {
        /// Tested expression.
        node: Box<Expr>,
        /// Test name.
        name: String,
        /// Extra arguments.
        args: Vec<Expr>,
        /// `is not`
        negated: bool,
    },
    /// `func(args)`
    Call {
        /// Callee.
        func: Box<Expr>,
        /// Positional arguments.
        args: Vec<Expr>,
        /// Keyword arguments.
        kwargs: Vec<(String, Expr)>,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        node: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `expr1 if test else expr2`
    Cond {
        /// Condition.
        test: Box<Expr>,
        /// Value when truthy.
        expr1: Box<Expr>,
        /// Value when falsy; undefined when omitted.
        expr2: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Builds `left and right`.
    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op: BinOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
