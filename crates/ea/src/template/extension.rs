// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Parser extensions adding custom block tags.

use super::ast::{Expr, IfNode, Node, WithNode};
use super::lexer::TokenKind;
use super::parser::Parser;
use crate::error::Result;

/// A custom block tag.
///
/// When the parser meets `{% tag ... %}` for one of [`Extension::tags`],
/// it calls [`Extension::parse`] with the current token on the tag name.
/// The extension consumes its syntax, including any body and end tag,
/// and must leave the parser on the `%}` that closes its last tag.
pub trait Extension: Send + Sync {
    /// Tag names handled by this extension.
    fn tags(&self) -> &'static [&'static str];

    /// Parses one occurrence of the tag into built-in nodes.
    fn parse(&self, parser: &mut Parser<'_>) -> Result<Node>;
}

/// The `required` tag.
///
/// ```text
/// {% required user=current_user, items=cart.items %}
///   ...
/// {% endrequired %}
/// ```
///
/// The body renders only when every value is truthy, with each value bound
/// to its name for the duration of the body. Otherwise nothing is emitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequiredVariablesExtension;

impl Extension for RequiredVariablesExtension {
    fn tags(&self) -> &'static [&'static str] {
        &["required"]
    }

    fn parse(&self, parser: &mut Parser<'_>) -> Result<Node> {
        parser.next_token();

        let mut targets = Vec::new();
        let mut values = Vec::new();
        while !parser.check(&TokenKind::BlockEnd) {
            if !targets.is_empty() {
                parser.expect(&TokenKind::Comma)?;
            }
            targets.push(parser.parse_assign_target()?);
            parser.expect(&TokenKind::Assign)?;
            values.push(parser.parse_expression()?);
        }

        let test = values
            .iter()
            .cloned()
            .reduce(Expr::and)
            .ok_or_else(|| parser.fail("'required' needs at least one name=value pair"))?;

        let body = parser.parse_statements(&["endrequired"], true)?;

        Ok(Node::If(IfNode {
            test,
            body: vec![Node::With(WithNode {
                targets,
                values,
                body,
            })],
            elif: Vec::new(),
            else_: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ast::BinOp;
    use crate::template::lexer::LexerOptions;
    use std::sync::Arc;

    fn parse(source: &str) -> Result<Vec<Node>> {
        let extensions: Vec<Arc<dyn Extension>> = vec![Arc::new(RequiredVariablesExtension)];
        Parser::new("t.html", source, LexerOptions::default(), &extensions)?.parse()
    }

    #[test]
    fn single_value_is_the_test() {
        let nodes = parse("{% required user=u %}{{ user }}{% endrequired %}").unwrap();
        let Node::If(node) = &nodes[0] else {
            panic!("expected if, got {:?}", nodes[0]);
        };
        assert_eq!(node.test, Expr::Name("u".to_string()));
        let Node::With(with) = &node.body[0] else {
            panic!("expected with");
        };
        assert_eq!(with.targets, vec!["user"]);
        assert!(node.else_.is_empty());
    }

    #[test]
    fn values_are_chained_with_and() {
        let nodes = parse("{% required a=x, b=y, c=z %}{% endrequired %}").unwrap();
        let Node::If(node) = &nodes[0] else {
            panic!("expected if");
        };
        // ((x and y) and z)
        let Expr::Binary { op: BinOp::And, left, right } = &node.test else {
            panic!("expected and");
        };
        assert_eq!(right.as_ref(), &Expr::Name("z".to_string()));
        assert!(matches!(left.as_ref(), Expr::Binary { op: BinOp::And, .. }));
    }

    #[test]
    fn empty_required_is_an_error() {
        assert!(parse("{% required %}{% endrequired %}").is_err());
    }

    #[test]
    fn missing_end_tag_is_an_error() {
        let err = parse("{% required a=x %}body").unwrap_err();
        assert!(err.to_string().contains("endrequired"));
    }
}
