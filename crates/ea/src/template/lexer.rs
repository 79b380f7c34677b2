// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Tokenizer for Jinja-style template markup.
//!
//! Splits a template into raw data and the code inside `{{ }}` and
//! `{% %}`. Comments (`{# #}`) are dropped here. Whitespace control is
//! applied while lexing:
//!
//! - `{%-`, `{{-`, `{#-` strip all whitespace before the tag
//! - `-%}`, `-}}`, `-#}` strip all whitespace after the tag
//! - `trim_blocks` removes the first newline after a block tag or comment
//! - `lstrip_blocks` removes spaces and tabs between the start of a line
//!   and a block tag or comment (`{%+` opts out)
//!
//! Keywords are emitted as plain [`TokenKind::Name`] tokens so that
//! extensions can claim new tag names.

/// A lexical token with the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token payload.
    pub kind: TokenKind,
    /// 1-indexed source line.
    pub line: usize,
}

/// Token types.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Raw template text.
    Data(String),
    /// `{{`
    VariableBegin,
    /// `}}`
    VariableEnd,
    /// `{%`
    BlockBegin,
    /// `%}`
    BlockEnd,
    /// Identifier or keyword.
    Name(String),
    /// String literal.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `|`
    Pipe,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
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
    Tilde,
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
    /// `=`
    Assign,
    /// End of input.
    Eof,
}

impl TokenKind {
    /// Short human readable description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Data(_) => "template data".to_string(),
            TokenKind::VariableBegin => "'{{'".to_string(),
            TokenKind::VariableEnd => "'}}'".to_string(),
            TokenKind::BlockBegin => "'{%'".to_string(),
            TokenKind::BlockEnd => "'%}'".to_string(),
            TokenKind::Name(n) => format!("'{}'", n),
            TokenKind::Str(s) => format!("string \"{}\"", s),
            TokenKind::Int(i) => format!("integer {}", i),
            TokenKind::Float(f) => format!("float {}", f),
            TokenKind::Eof => "end of template".to_string(),
            other => format!("{:?}", other).to_lowercase(),
        }
    }
}

/// Options that change how whitespace around tags is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexerOptions {
    /// Remove the first newline after a block tag.
    pub trim_blocks: bool,
    /// Strip leading line whitespace before a block tag.
    pub lstrip_blocks: bool,
}

/// A tokenization failure.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    /// Description of the problem.
    pub message: String,
    /// Line where it occurred.
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Variable,
    Block,
    Comment,
}

fn find_delimiter(rest: &str) -> Option<(usize, Delimiter)> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' {
            match bytes[i + 1] {
                b'{' => return Some((i, Delimiter::Variable)),
                b'%' => return Some((i, Delimiter::Block)),
                b'#' => return Some((i, Delimiter::Comment)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn strip_one_newline(text: &str) -> &str {
    text.strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text)
}

/// Tokenizes `source`.
///
/// The returned stream always ends with a single [`TokenKind::Eof`].
pub fn tokenize(source: &str, options: LexerOptions) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        source,
        pos: 0,
        line: 1,
        tokens: Vec::new(),
    };
    lexer.run(options)?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self, options: LexerOptions) -> Result<(), LexError> {
        let mut strip_next = false;
        let mut trim_newline = false;

        loop {
            let rest = &self.source[self.pos..];
            let found = find_delimiter(rest);
            let text_end = found.map(|(off, _)| self.pos + off).unwrap_or(self.source.len());
            let raw = &self.source[self.pos..text_end];

            let mut text = raw;
            if strip_next {
                text = text.trim_start();
            } else if trim_newline {
                text = strip_one_newline(text);
            }

            if let Some((_, delim)) = found {
                let modifier = self.source[text_end + 2..].chars().next();
                if modifier == Some('-') {
                    text = text.trim_end();
                } else if options.lstrip_blocks
                    && delim != Delimiter::Variable
                    && modifier != Some('+')
                {
                    let trimmed = text.trim_end_matches([' ', '\t']);
                    let ws_start = text_end - (text.len() - trimmed.len());
                    let at_line_start = self.source[..ws_start]
                        .chars()
                        .last()
                        .map_or(true, |c| c == '\n');
                    if at_line_start {
                        text = trimmed;
                    }
                }
            }

            if !text.is_empty() {
                self.tokens.push(Token {
                    kind: TokenKind::Data(text.to_string()),
                    line: self.line,
                });
            }
            self.line += raw.matches('\n').count();
            self.pos = text_end;

            let Some((_, delim)) = found else {
                break;
            };

            let tag_line = self.line;
            self.pos += 2;
            if matches!(self.peek(), Some('-') | Some('+')) {
                self.pos += 1;
            }

            match delim {
                Delimiter::Comment => {
                    let body = &self.source[self.pos..];
                    let Some(end) = body.find("#}") else {
                        return Err(LexError {
                            message: "unclosed comment".to_string(),
                            line: tag_line,
                        });
                    };
                    strip_next = body[..end].ends_with('-');
                    trim_newline = options.trim_blocks;
                    self.line += body[..end].matches('\n').count();
                    self.pos += end + 2;
                }
                Delimiter::Variable => {
                    self.push(TokenKind::VariableBegin, tag_line);
                    strip_next = self.lex_code("}}", TokenKind::VariableEnd, tag_line)?;
                    trim_newline = false;
                }
                Delimiter::Block => {
                    self.push(TokenKind::BlockBegin, tag_line);
                    strip_next = self.lex_code("%}", TokenKind::BlockEnd, tag_line)?;
                    trim_newline = options.trim_blocks;
                }
            }
        }

        self.push(TokenKind::Eof, self.line);
        Ok(())
    }

    fn push(&mut self, kind: TokenKind, line: usize) {
        self.tokens.push(Token { kind, line });
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    /// Lexes code until `close`, returning whether the closer carried `-`.
    fn lex_code(&mut self, close: &str, end: TokenKind, open_line: usize) -> Result<bool, LexError> {
        loop {
            while let Some(c) = self.peek() {
                if !c.is_whitespace() {
                    break;
                }
                if c == '\n' {
                    self.line += 1;
                }
                self.pos += c.len_utf8();
            }

            let rest = self.rest();
            if rest.is_empty() {
                return Err(LexError {
                    message: format!("unexpected end of template, expected '{}'", close),
                    line: open_line,
                });
            }
            if rest.starts_with('-') && rest[1..].starts_with(close) {
                self.pos += 1 + close.len();
                self.push(end, self.line);
                return Ok(true);
            }
            if rest.starts_with(close) {
                self.pos += close.len();
                self.push(end, self.line);
                return Ok(false);
            }

            let token = self.lex_operand()?;
            self.push(token, self.line);
        }
    }

    fn lex_operand(&mut self) -> Result<TokenKind, LexError> {
        let rest = self.rest();
        let two = rest.get(..2);
        let double = match two {
            Some("//") => Some(TokenKind::FloorDiv),
            Some("**") => Some(TokenKind::Pow),
            Some("==") => Some(TokenKind::Eq),
            Some("!=") => Some(TokenKind::Ne),
            Some("<=") => Some(TokenKind::Le),
            Some(">=") => Some(TokenKind::Ge),
            _ => None,
        };
        if let Some(kind) = double {
            self.pos += 2;
            return Ok(kind);
        }

        let c = match self.peek() {
            Some(c) => c,
            None => {
                return Err(LexError {
                    message: "unexpected end of template".to_string(),
                    line: self.line,
                })
            }
        };

        let single = match c {
            '.' => Some(TokenKind::Dot),
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            '|' => Some(TokenKind::Pipe),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '+' => Some(TokenKind::Add),
            '-' => Some(TokenKind::Sub),
            '*' => Some(TokenKind::Mul),
            '/' => Some(TokenKind::Div),
            '%' => Some(TokenKind::Mod),
            '~' => Some(TokenKind::Tilde),
            '<' => Some(TokenKind::Lt),
            '>' => Some(TokenKind::Gt),
            '=' => Some(TokenKind::Assign),
            _ => None,
        };
        if let Some(kind) = single {
            self.pos += 1;
            return Ok(kind);
        }

        match c {
            '"' | '\'' => self.lex_string(c),
            '0'..='9' => self.lex_number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.lex_name()),
            other => Err(LexError {
                message: format!("unexpected character '{}'", other),
                line: self.line,
            }),
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<TokenKind, LexError> {
        let start_line = self.line;
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(LexError {
                    message: "unclosed string".to_string(),
                    line: start_line,
                });
            };
            self.pos += c.len_utf8();
            match c {
                c if c == quote => break,
                '\\' => {
                    let Some(next) = self.peek() else {
                        continue;
                    };
                    self.pos += next.len_utf8();
                    match next {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '\\' => value.push('\\'),
                        c if c == quote => value.push(c),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                '\n' => {
                    self.line += 1;
                    value.push('\n');
                }
                other => value.push(other),
            }
        }
        Ok(TokenKind::Str(value))
    }

    fn lex_number(&mut self) -> Result<TokenKind, LexError> {
        let rest = self.rest();
        let int_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '_'))
            .unwrap_or(rest.len());
        let after = &rest[int_len..];
        let frac_len = if after.starts_with('.')
            && after[1..].starts_with(|c: char| c.is_ascii_digit())
        {
            1 + after[1..]
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len() - 1)
        } else {
            0
        };

        let text: String = rest[..int_len + frac_len].chars().filter(|c| *c != '_').collect();
        self.pos += int_len + frac_len;
        let kind = if frac_len > 0 {
            text.parse().ok().filter(|f: &f64| f.is_finite()).map(TokenKind::Float)
        } else {
            text.parse().ok().map(TokenKind::Int)
        };
        kind.ok_or_else(|| LexError {
            message: format!("number literal out of range: {}", text),
            line: self.line,
        })
    }

    fn lex_name(&mut self) -> TokenKind {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        TokenKind::Name(rest[..len].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str, options: LexerOptions) -> Vec<TokenKind> {
        tokenize(source, options)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn data(s: &str) -> TokenKind {
        TokenKind::Data(s.to_string())
    }

    fn name(s: &str) -> TokenKind {
        TokenKind::Name(s.to_string())
    }

    #[test]
    fn out_of_range_integers_are_errors() {
        let err = tokenize("{{ 99999999999999999999 }}", LexerOptions::default()).unwrap_err();
        assert!(err.message.contains("out of range"));
        assert_eq!(
            kinds("{{ 9223372036854775807 }}", LexerOptions::default())[1],
            TokenKind::Int(i64::MAX)
        );
    }

    #[test]
    fn text_and_variable() {
        assert_eq!(
            kinds("Hello, {{ user.name }}!", LexerOptions::default()),
            vec![
                data("Hello, "),
                TokenKind::VariableBegin,
                name("user"),
                TokenKind::Dot,
                name("name"),
                TokenKind::VariableEnd,
                data("!"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn block_tag_with_assignments() {
        assert_eq!(
            kinds("{% required a=x, b=1.5 %}", LexerOptions::default()),
            vec![
                TokenKind::BlockBegin,
                name("required"),
                name("a"),
                TokenKind::Assign,
                name("x"),
                TokenKind::Comma,
                name("b"),
                TokenKind::Assign,
                TokenKind::Float(1.5),
                TokenKind::BlockEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(
            kinds("a{# note {{ x }} #}b", LexerOptions::default()),
            vec![data("a"), data("b"), TokenKind::Eof]
        );
    }

    #[test]
    fn dash_modifiers_strip_whitespace() {
        assert_eq!(
            kinds("a  \n {%- if x -%}\n  b", LexerOptions::default()),
            vec![
                data("a"),
                TokenKind::BlockBegin,
                name("if"),
                name("x"),
                TokenKind::BlockEnd,
                data("b"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn trim_and_lstrip_blocks() {
        let options = LexerOptions {
            trim_blocks: true,
            lstrip_blocks: true,
        };
        let tokens = kinds("<ul>\n    {% if x %}\n  <li>\n    {% endif %}\n</ul>", options);
        assert_eq!(tokens[0], data("<ul>\n"));
        assert_eq!(tokens[5], data("  <li>\n"));
        assert_eq!(tokens[9], data("</ul>"));
    }

    #[test]
    fn lstrip_keeps_inline_whitespace() {
        let options = LexerOptions {
            trim_blocks: false,
            lstrip_blocks: true,
        };
        let tokens = kinds("a {% if x %}", options);
        assert_eq!(tokens[0], data("a "));
    }

    #[test]
    fn plus_modifier_disables_lstrip() {
        let options = LexerOptions {
            trim_blocks: false,
            lstrip_blocks: true,
        };
        let tokens = kinds("  {%+ if x %}", options);
        assert_eq!(tokens[0], data("  "));
    }

    #[test]
    fn lines_are_tracked() {
        let tokens = tokenize("a\nb\n{{ x }}", LexerOptions::default()).unwrap();
        let begin = tokens
            .iter()
            .find(|t| t.kind == TokenKind::VariableBegin)
            .unwrap();
        assert_eq!(begin.line, 3);
    }

    #[test]
    fn string_escapes_and_operators() {
        assert_eq!(
            kinds(r#"{{ "a\"b" ~ 'c' // 2 != 3 }}"#, LexerOptions::default()),
            vec![
                TokenKind::VariableBegin,
                TokenKind::Str("a\"b".to_string()),
                TokenKind::Tilde,
                TokenKind::Str("c".to_string()),
                TokenKind::FloorDiv,
                TokenKind::Int(2),
                TokenKind::Ne,
                TokenKind::Int(3),
                TokenKind::VariableEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unclosed_tag_is_an_error() {
        let err = tokenize("x\n{{ name", LexerOptions::default()).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("}}"));
    }
}
