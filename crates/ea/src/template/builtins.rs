// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Built-in filters and tests available in every environment.

use super::environment::Environment;
use super::value::{Args, CallResult, Value};

/// Escapes `&`, `<`, `>`, `"` and `'` for HTML output.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Keeps the safe marker of `original` on a transformed string.
fn same_kind(original: &Value, s: String) -> Value {
    if original.is_safe() {
        Value::Safe(s)
    } else {
        Value::String(s)
    }
}

pub(crate) fn register(env: &mut Environment) {
    let escape = |v: &Value, _: &Args| -> CallResult {
        Ok(match v {
            Value::Safe(_) => v.clone(),
            other => Value::Safe(html_escape(&other.to_string())),
        })
    };
    env.add_filter("escape", escape);
    env.add_filter("e", escape);
    env.add_filter("safe", |v, _| Ok(Value::Safe(v.to_string())));

    let default = |v: &Value, args: &Args| -> CallResult {
        let boolean = args.get(1, "boolean").is_some_and(Value::is_truthy);
        if v.is_undefined() || (boolean && !v.is_truthy()) {
            Ok(args.get(0, "default_value").cloned().unwrap_or_else(|| Value::from("")))
        } else {
            Ok(v.clone())
        }
    };
    env.add_filter("default", default);
    env.add_filter("d", default);

    env.add_filter("upper", |v, _| Ok(same_kind(v, v.to_string().to_uppercase())));
    env.add_filter("lower", |v, _| Ok(same_kind(v, v.to_string().to_lowercase())));
    env.add_filter("title", |v, _| Ok(same_kind(v, title_case(&v.to_string()))));
    env.add_filter("capitalize", |v, _| {
        let s = v.to_string();
        let mut chars = s.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        };
        Ok(same_kind(v, capitalized))
    });
    env.add_filter("trim", |v, _| Ok(same_kind(v, v.to_string().trim().to_string())));

    let length = |v: &Value, _: &Args| -> CallResult { Ok(Value::Int(v.len().unwrap_or(0) as i64)) };
    env.add_filter("length", length);
    env.add_filter("count", length);

    env.add_filter("join", |v, args| {
        let sep = args.str_or(0, "d", "");
        let items = v
            .iter_items()
            .ok_or_else(|| format!("cannot join {}", v.type_name()))?;
        let joined = items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(&sep);
        Ok(Value::String(joined))
    });
    env.add_filter("first", |v, _| {
        Ok(v.iter_items()
            .and_then(|items| items.into_iter().next())
            .unwrap_or_default())
    });
    env.add_filter("last", |v, _| {
        Ok(v.iter_items()
            .and_then(|items| items.into_iter().last())
            .unwrap_or_default())
    });

    env.add_filter("int", |v, args| {
        let default = args.int_or(0, "default", 0);
        Ok(Value::Int(v.as_i64().unwrap_or(default)))
    });
    env.add_filter("float", |v, args| {
        let default = args.get(0, "default").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(Value::Float(v.as_f64().unwrap_or(default)))
    });
    env.add_filter("string", |v, _| Ok(Value::String(v.to_string())));

    env.add_filter("replace", |v, args| {
        let old = args.str_or(0, "old", "");
        let new = args.str_or(1, "new", "");
        let s = v.to_string();
        let replaced = match args.get(2, "count").and_then(Value::as_i64) {
            Some(n) if n >= 0 => s.replacen(&old, &new, n as usize),
            _ => s.replace(&old, &new),
        };
        Ok(same_kind(v, replaced))
    });

    env.add_filter("round", |v, args| {
        let precision = args.int_or(0, "precision", 0).clamp(0, 15) as i32;
        let method = args.str_or(1, "method", "common");
        let number = v
            .as_f64()
            .ok_or_else(|| format!("cannot round {}", v.type_name()))?;
        let factor = 10f64.powi(precision);
        let scaled = number * factor;
        let rounded = match method.as_str() {
            "common" => scaled.round(),
            "ceil" => scaled.ceil(),
            "floor" => scaled.floor(),
            other => return Err(format!("method must be common, ceil or floor, got '{}'", other)),
        };
        Ok(Value::Float(rounded / factor))
    });

    env.add_test("defined", |v, _| !v.is_undefined());
    env.add_test("undefined", |v, _| v.is_undefined());
    env.add_test("none", |v, _| matches!(v, Value::None));
    env.add_test("string", |v, _| v.as_str().is_some());
    env.add_test("number", |v, _| v.is_number());
    env.add_test("even", |v, _| matches!(v, Value::Int(i) if i % 2 == 0));
    env.add_test("odd", |v, _| matches!(v, Value::Int(i) if i % 2 != 0));
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            out.push(c);
            word_start = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::loader::MemoryLoader;
    use serde_json::json;

    fn render(source: &str, ctx: serde_json::Value) -> String {
        Environment::new(MemoryLoader::new())
            .render_str(source, &ctx)
            .unwrap()
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(html_escape("<a href=\"x\">&'"), "&lt;a href=&#34;x&#34;&gt;&amp;&#39;");
    }

    #[test]
    fn string_filters() {
        assert_eq!(render("{{ 'hello world' | title }}", json!({})), "Hello World");
        assert_eq!(render("{{ 'hELLO' | capitalize }}", json!({})), "Hello");
        assert_eq!(render("{{ '  x ' | trim | upper }}", json!({})), "X");
        assert_eq!(render("{{ 'aaa' | replace('a', 'b', 2) }}", json!({})), "bba");
    }

    #[test]
    fn default_filter() {
        assert_eq!(render("{{ missing | default('fallback') }}", json!({})), "fallback");
        assert_eq!(render("{{ '' | d('x', true) }}", json!({})), "x");
        assert_eq!(render("{{ '' | d('x') }}", json!({})), "");
    }

    #[test]
    fn sequence_filters() {
        let ctx = json!({"items": [3, 1, 2]});
        assert_eq!(render("{{ items | join(', ') }}", ctx.clone()), "3, 1, 2");
        assert_eq!(render("{{ items | first }}-{{ items | last }}", ctx.clone()), "3-2");
        assert_eq!(render("{{ items | length }}", ctx), "3");
    }

    #[test]
    fn numeric_filters() {
        assert_eq!(render("{{ '42' | int + 1 }}", json!({})), "43");
        assert_eq!(render("{{ 'x' | int(7) }}", json!({})), "7");
        assert_eq!(render("{{ 2.567 | round(2) }}", json!({})), "2.57");
        assert_eq!(render("{{ 2.1 | round(0, 'ceil') }}", json!({})), "3.0");
    }

    #[test]
    fn tests_are_available() {
        let out = render(
            "{{ x is defined }} {{ y is undefined }} {{ n is none }} {{ 4 is even }} {{ 3 is odd }}",
            json!({"x": 1, "n": null}),
        );
        assert_eq!(out, "True True True True True");
    }
}
