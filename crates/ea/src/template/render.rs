// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Tree-walking renderer.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use super::ast::*;
use super::builtins::html_escape;
use super::environment::{Environment, Template};
use super::value::{Args, Value};
use crate::error::{EaError, Result};

const MAX_DEPTH: usize = 32;

/// Variable scopes visible while rendering.
///
/// Lookups walk from the innermost scope outwards. The outermost scope
/// holds the environment globals.
#[derive(Debug, Clone, Default)]
pub struct Context {
    scopes: Vec<HashMap<String, Value>>,
}

impl Context {
    /// Creates a context with a single scope.
    pub fn new(vars: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            scopes: vec![vars.into_iter().collect()],
        }
    }

    /// Looks a variable up, innermost scope first.
    pub fn get(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            .unwrap_or(Value::Undefined)
    }

    /// Assigns in the innermost scope.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if self.scopes.is_empty() {
            self.scopes.push(HashMap::new());
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// Opens a scope.
    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Opens a scope pre-filled with `vars`.
    pub fn push_with(&mut self, vars: impl IntoIterator<Item = (String, Value)>) {
        self.scopes.push(vars.into_iter().collect());
    }

    /// Closes the innermost scope.
    pub fn pop(&mut self) {
        self.scopes.pop();
    }
}

/// Renders `template`, resolving `extends` chains, into a string.
pub(crate) fn render_template(
    env: &Environment,
    template: &Template,
    ctx: &mut Context,
    depth: usize,
) -> Result<String> {
    if depth > MAX_DEPTH {
        return Err(EaError::render(
            &template.name,
            "maximum template nesting depth exceeded",
        ));
    }

    let mut renderer = Renderer {
        env,
        name: template.name.clone(),
        autoescape: env.autoescape_for(&template.name),
        blocks: HashMap::new(),
        depth,
    };

    let mut blocks = HashMap::new();
    collect_blocks(&template.nodes, &mut blocks);
    let mut root = None;
    let mut parent_expr = find_extends(&template.nodes).cloned();
    let mut chain = 0;
    while let Some(expr) = parent_expr {
        chain += 1;
        if chain > MAX_DEPTH {
            return Err(renderer.error("extends chain too deep"));
        }
        let parent_name = renderer.eval(&expr, ctx)?.to_string();
        let parent = env.get_template(&parent_name)?;
        collect_blocks(&parent.nodes, &mut blocks);
        parent_expr = find_extends(&parent.nodes).cloned();
        root = Some(parent);
    }
    renderer.blocks = blocks;

    let mut out = String::new();
    match &root {
        Some(parent) => renderer.render_nodes(&parent.nodes, ctx, &mut out)?,
        None => renderer.render_nodes(&template.nodes, ctx, &mut out)?,
    }
    Ok(out)
}

/// Records every block, keeping the first (most derived) definition.
fn collect_blocks(nodes: &[Node], blocks: &mut HashMap<String, Rc<Vec<Node>>>) {
    for node in nodes {
        match node {
            Node::Block(block) => {
                blocks
                    .entry(block.name.clone())
                    .or_insert_with(|| Rc::new(block.body.clone()));
                collect_blocks(&block.body, blocks);
            }
            Node::If(node) => {
                collect_blocks(&node.body, blocks);
                for (_, body) in &node.elif {
                    collect_blocks(body, blocks);
                }
                collect_blocks(&node.else_, blocks);
            }
            Node::For(node) => {
                collect_blocks(&node.body, blocks);
                collect_blocks(&node.else_, blocks);
            }
            Node::With(node) => collect_blocks(&node.body, blocks),
            _ => {}
        }
    }
}

fn find_extends(nodes: &[Node]) -> Option<&Expr> {
    nodes.iter().find_map(|n| match n {
        Node::Extends(expr) => Some(expr),
        _ => None,
    })
}

struct Renderer<'env> {
    env: &'env Environment,
    name: String,
    autoescape: bool,
    blocks: HashMap<String, Rc<Vec<Node>>>,
    depth: usize,
}

impl Renderer<'_> {
    fn error(&self, message: impl Into<String>) -> EaError {
        EaError::render(&self.name, message)
    }

    fn render_nodes(&self, nodes: &[Node], ctx: &mut Context, out: &mut String) -> Result<()> {
        for node in nodes {
            self.render_node(node, ctx, out)?;
        }
        Ok(())
    }

    fn render_node(&self, node: &Node, ctx: &mut Context, out: &mut String) -> Result<()> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => {
                let value = self.eval(expr, ctx)?;
                self.write_value(&value, out);
            }
            Node::If(node) => {
                if self.eval(&node.test, ctx)?.is_truthy() {
                    return self.render_nodes(&node.body, ctx, out);
                }
                for (test, body) in &node.elif {
                    if self.eval(test, ctx)?.is_truthy() {
                        return self.render_nodes(body, ctx, out);
                    }
                }
                self.render_nodes(&node.else_, ctx, out)?;
            }
            Node::For(node) => self.render_for(node, ctx, out)?,
            Node::Set(node) => {
                let value = self.eval(&node.value, ctx)?;
                ctx.set(node.target.clone(), value);
            }
            Node::With(node) => {
                let values = node
                    .values
                    .iter()
                    .map(|v| self.eval(v, ctx))
                    .collect::<Result<Vec<_>>>()?;
                ctx.push_with(node.targets.iter().cloned().zip(values));
                let result = self.render_nodes(&node.body, ctx, out);
                ctx.pop();
                result?;
            }
            Node::Block(block) => match self.blocks.get(&block.name).cloned() {
                Some(body) => self.render_nodes(&body, ctx, out)?,
                None => self.render_nodes(&block.body, ctx, out)?,
            },
            Node::Extends(_) => {}
            Node::Include(node) => {
                let name = self.eval(&node.template, ctx)?.to_string();
                let template = match self.env.get_template(&name) {
                    Ok(t) => t,
                    Err(EaError::TemplateNotFound(_)) if node.ignore_missing => return Ok(()),
                    Err(e) => return Err(e),
                };
                ctx.push();
                let result = render_template(self.env, &template, ctx, self.depth + 1);
                ctx.pop();
                out.push_str(&result?);
            }
        }
        Ok(())
    }

    fn render_for(&self, node: &ForNode, ctx: &mut Context, out: &mut String) -> Result<()> {
        let iterable = self.eval(&node.iter, ctx)?;
        let items = iterable
            .iter_items()
            .ok_or_else(|| self.error(format!("'{}' object is not iterable", iterable.type_name())))?;

        if items.is_empty() {
            return self.render_nodes(&node.else_, ctx, out);
        }

        let length = items.len();
        ctx.push();
        let mut result = Ok(());
        for (index0, item) in items.into_iter().enumerate() {
            ctx.set("loop", loop_value(index0, length));
            if let Err(e) = self.bind_targets(&node.targets, item, ctx) {
                result = Err(e);
                break;
            }
            if let Err(e) = self.render_nodes(&node.body, ctx, out) {
                result = Err(e);
                break;
            }
        }
        ctx.pop();
        result
    }

    fn bind_targets(&self, targets: &[String], item: Value, ctx: &mut Context) -> Result<()> {
        if let [target] = targets {
            ctx.set(target.clone(), item);
            return Ok(());
        }
        let parts = match item {
            Value::List(parts) => parts,
            other => {
                return Err(self.error(format!(
                    "cannot unpack {} into {} names",
                    other.type_name(),
                    targets.len()
                )))
            }
        };
        if parts.len() != targets.len() {
            return Err(self.error(format!(
                "expected {} values to unpack, got {}",
                targets.len(),
                parts.len()
            )));
        }
        for (target, part) in targets.iter().zip(parts) {
            ctx.set(target.clone(), part);
        }
        Ok(())
    }

    fn write_value(&self, value: &Value, out: &mut String) {
        match value {
            Value::Safe(s) => out.push_str(s),
            other if self.autoescape => out.push_str(&html_escape(&other.to_string())),
            other => out.push_str(&other.to_string()),
        }
    }

    fn eval(&self, expr: &Expr, ctx: &Context) -> Result<Value> {
        match expr {
            Expr::Const(v) => Ok(v.clone()),
            Expr::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|i| self.eval(i, ctx))
                    .collect::<Result<_>>()?,
            )),
            Expr::Dict(entries) => {
                let mut map = BTreeMap::new();
                for (k, v) in entries {
                    map.insert(self.eval(k, ctx)?.to_string(), self.eval(v, ctx)?);
                }
                Ok(Value::Dict(map))
            }
            Expr::Name(name) => Ok(ctx.get(name)),
            Expr::Getattr { node, attr } => Ok(self.eval(node, ctx)?.get_attr(attr)),
            Expr::Getitem { node, arg } => {
                let obj = self.eval(node, ctx)?;
                let key = self.eval(arg, ctx)?;
                Ok(obj.get_item(&key))
            }
            Expr::Filter {
                node,
                name,
                args,
                kwargs,
            } => {
                let value = self.eval(node, ctx)?;
                let args = self.eval_args(args, kwargs, ctx)?;
                let filter = self
                    .env
                    .filter(name)
                    .ok_or_else(|| self.error(format!("no filter named '{}'", name)))?;
                filter(&value, &args).map_err(|e| self.error(format!("filter '{}': {}", name, e)))
            }
            Expr::Test {
                node,
                name,
                args,
                negated,
            } => {
                let value = self.eval(node, ctx)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a, ctx))
                    .collect::<Result<Vec<_>>>()?;
                let test = self
                    .env
                    .test(name)
                    .ok_or_else(|| self.error(format!("no test named '{}'", name)))?;
                Ok(Value::Bool(test(&value, &args) != *negated))
            }
            Expr::Call { func, args, kwargs } => {
                let args = self.eval_args(args, kwargs, ctx)?;
                self.call(func, args, ctx)
            }
            Expr::Unary { op, node } => {
                let value = self.eval(node, ctx)?;
                match (op, value) {
                    (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
                    (UnaryOp::Neg, Value::Int(i)) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| self.error("integer overflow")),
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Pos, v) if v.is_number() => Ok(v),
                    (_, v) => Err(self.error(format!("bad operand type for unary operator: {}", v.type_name()))),
                }
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, ctx),
            Expr::Cond { test, expr1, expr2 } => {
                if self.eval(test, ctx)?.is_truthy() {
                    self.eval(expr1, ctx)
                } else {
                    match expr2 {
                        Some(e) => self.eval(e, ctx),
                        None => Ok(Value::Undefined),
                    }
                }
            }
        }
    }

    fn eval_args(&self, args: &[Expr], kwargs: &[(String, Expr)], ctx: &Context) -> Result<Args> {
        let mut evaluated = Args::new(
            args.iter()
                .map(|a| self.eval(a, ctx))
                .collect::<Result<Vec<_>>>()?,
        );
        for (key, expr) in kwargs {
            evaluated.kwargs.insert(key.clone(), self.eval(expr, ctx)?);
        }
        Ok(evaluated)
    }

    fn call(&self, func: &Expr, args: Args, ctx: &Context) -> Result<Value> {
        match func {
            Expr::Name(name) => {
                let shadowed = ctx.get(name);
                if !shadowed.is_undefined() {
                    return Err(self.error(format!("'{}' object is not callable", shadowed.type_name())));
                }
                let function = self
                    .env
                    .function(name)
                    .ok_or_else(|| self.error(format!("'{}' is undefined", name)))?;
                function(ctx, &args).map_err(|e| self.error(format!("{}(): {}", name, e)))
            }
            Expr::Getattr { node, attr } => {
                let obj = self.eval(node, ctx)?;
                self.call_method(&obj, attr, &args)
            }
            other => {
                let value = self.eval(other, ctx)?;
                Err(self.error(format!("'{}' object is not callable", value.type_name())))
            }
        }
    }

    fn call_method(&self, obj: &Value, method: &str, args: &Args) -> Result<Value> {
        let arg_str = |i: usize| args.positional.get(i).map(|v| v.to_string()).unwrap_or_default();
        let result = match (obj, method) {
            (Value::Dict(d), "items") => Value::List(
                d.iter()
                    .map(|(k, v)| Value::List(vec![Value::String(k.clone()), v.clone()]))
                    .collect(),
            ),
            (Value::Dict(d), "keys") => Value::List(d.keys().cloned().map(Value::String).collect()),
            (Value::Dict(d), "values") => Value::List(d.values().cloned().collect()),
            (Value::Dict(d), "get") => d
                .get(&arg_str(0))
                .cloned()
                .or_else(|| args.positional.get(1).cloned())
                .unwrap_or(Value::None),
            (Value::String(s) | Value::Safe(s), "startswith") => Value::Bool(s.starts_with(&arg_str(0))),
            (Value::String(s) | Value::Safe(s), "endswith") => Value::Bool(s.ends_with(&arg_str(0))),
            (Value::String(s) | Value::Safe(s), "lower") => Value::String(s.to_lowercase()),
            (Value::String(s) | Value::Safe(s), "upper") => Value::String(s.to_uppercase()),
            (Value::String(s) | Value::Safe(s), "strip") => Value::String(s.trim().to_string()),
            (Value::String(s) | Value::Safe(s), "split") => {
                let parts: Vec<Value> = match args.positional.first() {
                    Some(sep) => s.split(sep.to_string().as_str()).map(Value::from).collect(),
                    None => s.split_whitespace().map(Value::from).collect(),
                };
                Value::List(parts)
            }
            (obj, method) => {
                return Err(self.error(format!(
                    "'{}' object has no method '{}'",
                    obj.type_name(),
                    method
                )))
            }
        };
        Ok(result)
    }

    fn eval_binary(&self, op: BinOp, left: &Expr, right: &Expr, ctx: &Context) -> Result<Value> {
        let lhs = self.eval(left, ctx)?;
        match op {
            BinOp::And => return if lhs.is_truthy() { self.eval(right, ctx) } else { Ok(lhs) },
            BinOp::Or => return if lhs.is_truthy() { Ok(lhs) } else { self.eval(right, ctx) },
            _ => {}
        }
        let rhs = self.eval(right, ctx)?;

        let unsupported = || {
            self.error(format!(
                "unsupported operand types: '{}' and '{}'",
                lhs.type_name(),
                rhs.type_name()
            ))
        };

        match op {
            BinOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
            BinOp::Ne => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = match (&lhs, &rhs) {
                    (a, b) if a.is_number() && b.is_number() => {
                        a.as_f64().partial_cmp(&b.as_f64())
                    }
                    (a, b) => match (a.as_str(), b.as_str()) {
                        (Some(a), Some(b)) => Some(a.cmp(b)),
                        _ => None,
                    },
                };
                let ordering = ordering.ok_or_else(unsupported)?;
                Ok(Value::Bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinOp::In | BinOp::NotIn => {
                let found = match &rhs {
                    Value::List(items) => items.iter().any(|i| i.loose_eq(&lhs)),
                    Value::Dict(map) => map.contains_key(&lhs.to_string()),
                    Value::String(s) | Value::Safe(s) => s.contains(&lhs.to_string()),
                    Value::Undefined | Value::None => false,
                    _ => return Err(unsupported()),
                };
                Ok(Value::Bool(found == (op == BinOp::In)))
            }
            BinOp::Concat => Ok(Value::String(format!("{}{}", lhs, rhs))),
            BinOp::Add => match (&lhs, &rhs) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_add(*b)
                    .map(Value::Int)
                    .ok_or_else(|| self.error("integer overflow")),
                (a, b) if a.is_number() && b.is_number() => Ok(float_op(a, b, |x, y| x + y)),
                (Value::List(a), Value::List(b)) => {
                    Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
                }
                (a, b) => match (a.as_str(), b.as_str()) {
                    (Some(x), Some(y)) => Ok(Value::String(format!("{}{}", x, y))),
                    _ => Err(unsupported()),
                },
            },
            BinOp::Sub => match (&lhs, &rhs) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_sub(*b)
                    .map(Value::Int)
                    .ok_or_else(|| self.error("integer overflow")),
                (a, b) if a.is_number() && b.is_number() => Ok(float_op(a, b, |x, y| x - y)),
                _ => Err(unsupported()),
            },
            BinOp::Mul => match (&lhs, &rhs) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_mul(*b)
                    .map(Value::Int)
                    .ok_or_else(|| self.error("integer overflow")),
                (a, b) if a.is_number() && b.is_number() => Ok(float_op(a, b, |x, y| x * y)),
                (Value::String(s), Value::Int(n)) | (Value::Int(n), Value::String(s)) => {
                    let count = usize::try_from(*n).unwrap_or(0);
                    match s.len().checked_mul(count) {
                        Some(len) if len <= MAX_REPEAT_LEN => Ok(Value::String(s.repeat(count))),
                        _ => Err(self.error("repeated string too long")),
                    }
                }
                _ => Err(unsupported()),
            },
            BinOp::Div => {
                if !(lhs.is_number() && rhs.is_number()) {
                    return Err(unsupported());
                }
                let divisor = rhs.as_f64().unwrap_or(0.0);
                if divisor == 0.0 {
                    return Err(self.error("division by zero"));
                }
                Ok(Value::Float(lhs.as_f64().unwrap_or(0.0) / divisor))
            }
            BinOp::FloorDiv | BinOp::Mod => match (&lhs, &rhs) {
                (Value::Int(_), Value::Int(0)) => Err(self.error("integer division or modulo by zero")),
                (Value::Int(a), Value::Int(b)) => {
                    let result = if op == BinOp::FloorDiv {
                        floor_div(*a, *b)
                    } else {
                        floor_mod(*a, *b)
                    };
                    result.map(Value::Int).ok_or_else(|| self.error("integer overflow"))
                }
                (a, b) if a.is_number() && b.is_number() => {
                    let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                    if y == 0.0 {
                        return Err(self.error("float division by zero"));
                    }
                    Ok(Value::Float(if op == BinOp::FloorDiv {
                        (x / y).floor()
                    } else {
                        x - y * (x / y).floor()
                    }))
                }
                _ => Err(unsupported()),
            },
            BinOp::Pow => match (&lhs, &rhs) {
                (Value::Int(a), Value::Int(b)) if *b >= 0 => u32::try_from(*b)
                    .ok()
                    .and_then(|b| a.checked_pow(b))
                    .map(Value::Int)
                    .ok_or_else(|| self.error("integer overflow")),
                (a, b) if a.is_number() && b.is_number() => Ok(float_op(a, b, f64::powf)),
                _ => Err(unsupported()),
            },
            BinOp::And | BinOp::Or => unreachable!("short-circuit operators handled above"),
        }
    }
}

/// Longest string `str * int` may produce.
const MAX_REPEAT_LEN: usize = 1 << 24;

/// Integer division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder with the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Option<i64> {
    if b == -1 {
        return Some(0);
    }
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn float_op(a: &Value, b: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    Value::Float(f(a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0)))
}

fn loop_value(index0: usize, length: usize) -> Value {
    let mut map = BTreeMap::new();
    map.insert("index".to_string(), Value::Int(index0 as i64 + 1));
    map.insert("index0".to_string(), Value::Int(index0 as i64));
    map.insert("revindex".to_string(), Value::Int((length - index0) as i64));
    map.insert("revindex0".to_string(), Value::Int((length - index0 - 1) as i64));
    map.insert("first".to_string(), Value::Bool(index0 == 0));
    map.insert("last".to_string(), Value::Bool(index0 + 1 == length));
    map.insert("length".to_string(), Value::Int(length as i64));
    Value::Dict(map)
}

#[cfg(test)]
mod tests {
    use crate::template::{Environment, MemoryLoader};
    use serde_json::json;

    fn env(templates: &[(&str, &str)]) -> Environment {
        let loader = MemoryLoader::new();
        for (name, source) in templates {
            loader.add(*name, *source);
        }
        Environment::new(loader)
    }

    #[test]
    fn autoescape_depends_on_extension() {
        let env = env(&[("a.html", "{{ v }}"), ("a.txt", "{{ v }}")]);
        let ctx = json!({"v": "<b>"});
        assert_eq!(env.render("a.html", &ctx).unwrap(), "&lt;b&gt;");
        assert_eq!(env.render("a.txt", &ctx).unwrap(), "<b>");
    }

    #[test]
    fn safe_values_are_not_escaped() {
        let env = env(&[("a.html", "{{ v | safe }}")]);
        assert_eq!(env.render("a.html", &json!({"v": "<b>"})).unwrap(), "<b>");
    }

    #[test]
    fn loop_variables() {
        let env = env(&[(
            "l.txt",
            "{% for x in items %}{{ loop.index }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}",
        )]);
        let out = env.render("l.txt", &json!({"items": ["a", "b", "c"]})).unwrap();
        assert_eq!(out, "1a,2b,3c");
    }

    #[test]
    fn for_else_and_unpacking() {
        let env = env(&[(
            "l.txt",
            "{% for k, v in d.items() %}{{ k }}={{ v }};{% endfor %}{% for x in [] %}x{% else %}empty{% endfor %}",
        )]);
        let out = env.render("l.txt", &json!({"d": {"a": 1, "b": 2}})).unwrap();
        assert_eq!(out, "a=1;b=2;empty");
    }

    #[test]
    fn loop_scope_does_not_leak() {
        let env = env(&[("s.txt", "{% for x in [1] %}{% set y = x %}{% endfor %}[{{ y }}][{{ x }}]")]);
        assert_eq!(env.render("s.txt", &json!({})).unwrap(), "[][]");
    }

    #[test]
    fn multi_level_inheritance() {
        let env = env(&[
            ("base.html", "<title>{% block title %}Base{% endblock %}</title>{% block body %}{% endblock %}"),
            ("layout.html", "{% extends 'base.html' %}{% block body %}<main>{% block content %}{% endblock %}</main>{% endblock %}"),
            ("page.html", "{% extends 'layout.html' %}{% block title %}Page{% endblock %}{% block content %}hi {{ name }}{% endblock %}"),
        ]);
        let out = env.render("page.html", &json!({"name": "bob"})).unwrap();
        assert_eq!(out, "<title>Page</title><main>hi bob</main>");
    }

    #[test]
    fn include_shares_context() {
        let env = env(&[
            ("page.html", "[{% include 'nav.html' %}]{% include 'nope.html' ignore missing %}"),
            ("nav.html", "nav for {{ user }}"),
        ]);
        assert_eq!(env.render("page.html", &json!({"user": "ann"})).unwrap(), "[nav for ann]");
    }

    #[test]
    fn missing_include_fails_without_ignore() {
        let env = env(&[("page.html", "{% include 'nope.html' %}")]);
        assert!(env.render("page.html", &json!({})).is_err());
    }

    #[test]
    fn arithmetic_and_comparisons() {
        let env = env(&[("m.txt", "{{ 7 // 2 }} {{ -7 % 3 }} {{ 2 ** 10 }} {{ 1 / 4 }} {{ 'a' ~ 1 }} {{ 3 > 2 and 'x' in 'xyz' }}")]);
        assert_eq!(env.render("m.txt", &json!({})).unwrap(), "3 2 1024 0.25 a1 True");
    }

    #[test]
    fn integer_division_stays_exact() {
        let env = env(&[(
            "d.txt",
            "{{ 9223372036854775806 % 9223372036854775807 }} {{ -7 // 2 }} {{ 7 // -2 }} {{ -7 % 3 }} {{ 7 % -3 }} {{ 9007199254740993 // 1 }}",
        )]);
        assert_eq!(
            env.render("d.txt", &json!({})).unwrap(),
            "9223372036854775806 -4 -4 2 -2 9007199254740993"
        );
    }

    #[test]
    fn integer_overflow_is_a_render_error() {
        let env = env(&[("n.txt", "{{ -n }}"), ("q.txt", "{{ n // -1 }}"), ("z.txt", "{{ 1 % 0 }}")]);
        let min = json!({"n": i64::MIN});
        assert!(env.render("n.txt", &min).unwrap_err().to_string().contains("integer overflow"));
        assert!(env.render("q.txt", &min).is_err());
        assert!(env.render("z.txt", &json!({})).is_err());
        assert_eq!(env.render("n.txt", &json!({"n": 5})).unwrap(), "-5");
    }

    #[test]
    fn string_repetition_is_bounded() {
        let env = env(&[("r.txt", "{{ 'ab' * n }}")]);
        assert_eq!(env.render("r.txt", &json!({"n": 3})).unwrap(), "ababab");
        assert_eq!(env.render("r.txt", &json!({"n": -1})).unwrap(), "");
        let err = env.render("r.txt", &json!({"n": i64::MAX})).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn conditional_expression() {
        let env = env(&[("c.txt", "{{ 'yes' if flag else 'no' }}|{{ 'only' if flag }}")]);
        assert_eq!(env.render("c.txt", &json!({"flag": false})).unwrap(), "no|");
    }

    #[test]
    fn unknown_filter_is_a_render_error() {
        let env = env(&[("f.txt", "{{ 1 | nope }}")]);
        let err = env.render("f.txt", &json!({})).unwrap_err();
        assert!(err.to_string().contains("no filter named 'nope'"));
    }

    #[test]
    fn with_scopes_values() {
        let env = env(&[("w.txt", "{% with a = 1, b = a %}{{ a }}{% endwith %}[{{ a }}]")]);
        assert_eq!(env.render("w.txt", &json!({"a": 5})).unwrap(), "1[5]");
    }
}
