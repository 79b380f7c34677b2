// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Formatting filters and request-aware context functions.
//!
//! Each helper is a plain function plus a template adapter. The
//! adapters are looked up by name with [`filter`] and
//! [`context_function`], which is how the `[jinja]` tables in `ea.toml`
//! refer to them:
//!
//! ```toml
//! [jinja.filters]
//! money = "format_currency"
//! ```

use std::fmt::Write;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone};
use lazy_static::lazy_static;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;

use crate::template::{html_escape, Args, CallResult, Context, Value};

/// Template adapter for a filter helper.
pub type FilterHelper = fn(&Value, &Args) -> CallResult;
/// Template adapter for a context function helper.
pub type ContextHelper = fn(&Context, &Args) -> CallResult;

/// Names accepted by [`filter`].
pub const FILTER_NAMES: &[&str] = &[
    "leading_zero",
    "human_number",
    "add_br",
    "format_datetime",
    "format_currency",
    "add_p",
    "format_date",
    "gen_slug",
    "copyright_year",
    "remove_linebreaks",
    "add_http",
    "add_https",
];

/// Names accepted by [`context_function`].
pub const CONTEXT_NAMES: &[&str] = &["relative_years", "highlight_link", "next_year", "random_string"];

lazy_static! {
    static ref SLUG_SEPARATORS: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\r?\n\s*\r?\n").unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"\r\n|\r|\n").unwrap();
    static ref URL_SCHEME: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").unwrap();
}

/// Pads `value` with zeros to `width` characters, keeping a leading sign.
pub fn leading_zero(value: &str, width: usize) -> String {
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", value),
    };
    let pad = width.saturating_sub(sign.len() + digits.chars().count());
    format!("{}{}{}", sign, "0".repeat(pad), digits)
}

fn group_thousands(integer: u64) -> String {
    let digits = integer.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a number with `,` thousands separators.
///
/// Integers keep no decimals; other values keep their fractional part.
pub fn human_number(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    if abs.fract() == 0.0 {
        return format!("{}{}", sign, group_thousands(abs as u64));
    }
    let text = abs.to_string();
    let fraction = text.split_once('.').map(|(_, f)| f).unwrap_or("");
    format!("{}{}.{}", sign, group_thousands(abs.trunc() as u64), fraction)
}

/// Formats an amount as currency with two decimals: `$1,234.50`.
pub fn format_currency(value: f64, symbol: &str) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!(
        "{}{}{}.{:02}",
        sign,
        symbol,
        group_thousands(cents / 100),
        cents % 100
    )
}

/// Escapes `text` and turns line breaks into `<br>`.
pub fn add_br(text: &str) -> String {
    LINE_BREAK.replace_all(&html_escape(text), "<br>").into_owned()
}

/// Escapes `text` and wraps blank-line separated paragraphs in `<p>`.
pub fn add_p(text: &str) -> String {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", html_escape(p)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercase, dash-separated ASCII slug.
pub fn gen_slug(text: &str) -> String {
    SLUG_SEPARATORS
        .replace_all(&text.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// `"<start> - <current year>"`, or just the current year when `start`
/// is not earlier.
pub fn copyright_year(start: i32) -> String {
    let current = Local::now().year();
    if start < current {
        format!("{} - {}", start, current)
    } else {
        current.to_string()
    }
}

/// Removes all line breaks.
pub fn remove_linebreaks(text: &str) -> String {
    LINE_BREAK.replace_all(text, "").into_owned()
}

fn add_scheme(url: &str, scheme: &str) -> String {
    let url = url.trim();
    if url.is_empty() || URL_SCHEME.is_match(url) {
        return url.to_string();
    }
    format!("{}://{}", scheme, url.trim_start_matches('/'))
}

/// Prefixes `http://` unless the URL already has a scheme.
pub fn add_http(url: &str) -> String {
    add_scheme(url, "http")
}

/// Prefixes `https://` unless the URL already has a scheme.
pub fn add_https(url: &str) -> String {
    add_scheme(url, "https")
}

/// Whole years elapsed since `since`.
pub fn relative_years(since: NaiveDate) -> i32 {
    let today = Local::now().date_naive();
    let mut years = today.year() - since.year();
    if (today.month(), today.day()) < (since.month(), since.day()) {
        years -= 1;
    }
    years
}

/// Returns `class` when `current` is inside `path`.
///
/// `/` only matches itself; other paths match as prefixes.
pub fn highlight_link<'a>(current: &str, path: &str, class: &'a str) -> &'a str {
    let active = if path == "/" {
        current == "/"
    } else {
        current.starts_with(path)
    };
    if active {
        class
    } else {
        ""
    }
}

/// The year after the current one.
pub fn next_year() -> i32 {
    Local::now().year() + 1
}

/// Random alphanumeric string of `len` characters.
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Interprets a template value as a point in time.
///
/// Accepts unix timestamps, RFC 3339 strings, `YYYY-MM-DD HH:MM[:SS]`,
/// `YYYY-MM-DDTHH:MM[:SS]` and plain dates.
fn to_datetime(value: &Value) -> Result<NaiveDateTime, String> {
    if let Value::Int(ts) = value {
        return DateTime::from_timestamp(*ts, 0)
            .map(|dt| Local.from_utc_datetime(&dt.naive_utc()).naive_local())
            .ok_or_else(|| format!("timestamp out of range: {}", ts));
    }
    let text = value
        .as_str()
        .ok_or_else(|| format!("cannot format {} as a date", value.type_name()))?
        .trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_local());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format!("unrecognized date '{}'", text))
}

fn format_with(value: &Value, args: &Args, default: &str) -> CallResult {
    if matches!(value, Value::Undefined | Value::None) {
        return Ok(Value::from(""));
    }
    let format = args.str_or(0, "format", default);
    let mut out = String::new();
    write!(out, "{}", to_datetime(value)?.format(&format))
        .map_err(|_| format!("invalid date format '{}'", format))?;
    Ok(Value::String(out))
}

fn number(value: &Value) -> Result<f64, String> {
    value
        .as_f64()
        .ok_or_else(|| format!("expected a number, got {}", value.type_name()))
}

/// Looks a filter helper up by name.
pub fn filter(name: &str) -> Option<FilterHelper> {
    let helper: FilterHelper = match name {
        "leading_zero" => |v, args| {
            let width = args.int_or(0, "width", 2).max(0) as usize;
            Ok(Value::String(leading_zero(&v.to_string(), width)))
        },
        "human_number" => |v, _| Ok(Value::String(human_number(number(v)?))),
        "add_br" => |v, _| {
            Ok(match v {
                Value::Safe(s) => Value::safe(LINE_BREAK.replace_all(s, "<br>")),
                other => Value::safe(add_br(&other.to_string())),
            })
        },
        "format_datetime" => |v, args| format_with(v, args, "%Y-%m-%d %H:%M"),
        "format_currency" => |v, args| {
            let symbol = args.str_or(0, "symbol", "$");
            Ok(Value::String(format_currency(number(v)?, &symbol)))
        },
        "add_p" => |v, _| Ok(Value::safe(add_p(&v.to_string()))),
        "format_date" => |v, args| format_with(v, args, "%Y-%m-%d"),
        "gen_slug" => |v, _| Ok(Value::String(gen_slug(&v.to_string()))),
        "copyright_year" => |v, _| {
            let start = v.as_i64().unwrap_or_else(|| Local::now().year() as i64);
            Ok(Value::String(copyright_year(start as i32)))
        },
        "remove_linebreaks" => |v, _| Ok(Value::String(remove_linebreaks(&v.to_string()))),
        "add_http" => |v, _| Ok(Value::String(add_http(&v.to_string()))),
        "add_https" => |v, _| Ok(Value::String(add_https(&v.to_string()))),
        _ => return None,
    };
    Some(helper)
}

/// Looks a context function helper up by name.
pub fn context_function(name: &str) -> Option<ContextHelper> {
    let helper: ContextHelper = match name {
        "relative_years" => |_, args| {
            let since = args.get(0, "since").ok_or("missing argument 'since'")?;
            let years = match since {
                Value::Int(year) => Local::now().year() - *year as i32,
                other => relative_years(to_datetime(other)?.date()),
            };
            Ok(Value::Int(years as i64))
        },
        "highlight_link" => |ctx, args| {
            let path = args.str_or(0, "path", "/");
            let class = args.str_or(1, "class", "active");
            let current = ctx.get("request").get_attr("path").to_string();
            Ok(Value::String(highlight_link(&current, &path, &class).to_string()))
        },
        "next_year" => |_, _| Ok(Value::Int(next_year() as i64)),
        "random_string" => |_, args| {
            let len = args.int_or(0, "length", 8).max(0) as usize;
            Ok(Value::String(random_string(len)))
        },
        _ => return None,
    };
    Some(helper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn pads_with_zeros() {
        assert_eq!(leading_zero("5", 2), "05");
        assert_eq!(leading_zero("123", 2), "123");
        assert_eq!(leading_zero("-5", 3), "-05");
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(human_number(1234567.0), "1,234,567");
        assert_eq!(human_number(999.0), "999");
        assert_eq!(human_number(-1234.5), "-1,234.5");
    }

    #[test]
    fn formats_currency() {
        assert_eq!(format_currency(1234.5, "$"), "$1,234.50");
        assert_eq!(format_currency(0.0, "€"), "€0.00");
        assert_eq!(format_currency(-12.5, "$"), "-$12.50");
    }

    #[test]
    fn line_break_helpers() {
        assert_eq!(add_br("a\nb<c>"), "a<br>b&lt;c&gt;");
        assert_eq!(add_p("one\nline\n\n  two  \n\n\n"), "<p>one\nline</p>\n<p>two</p>");
        assert_eq!(remove_linebreaks("a\r\nb\nc"), "abc");
    }

    #[test]
    fn slugs() {
        assert_eq!(gen_slug("Hello, World!  Again"), "hello-world-again");
        assert_eq!(gen_slug("--x--"), "x");
    }

    #[test]
    fn copyright_range() {
        let current = Local::now().year();
        assert_eq!(copyright_year(2015), format!("2015 - {}", current));
        assert_eq!(copyright_year(current), current.to_string());
    }

    #[test]
    fn url_schemes() {
        assert_eq!(add_http("example.com"), "http://example.com");
        assert_eq!(add_https("//example.com/x"), "https://example.com/x");
        assert_eq!(add_http("https://example.com"), "https://example.com");
        assert_eq!(add_https(""), "");
    }

    #[test]
    fn highlights_links() {
        assert_eq!(highlight_link("/", "/", "active"), "active");
        assert_eq!(highlight_link("/about", "/", "active"), "");
        assert_eq!(highlight_link("/blog/post", "/blog", "on"), "on");
        assert_eq!(highlight_link("/about", "/blog", "on"), "");
    }

    #[test]
    fn random_strings_have_requested_length() {
        let s = random_string(12);
        assert_eq!(s.len(), 12);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn relative_years_counts_whole_years() {
        let today = Local::now().date_naive();
        let new_year = NaiveDate::from_ymd_opt(today.year() - 10, 1, 1).unwrap();
        assert_eq!(relative_years(new_year), 10);
        assert_eq!(relative_years(today), 0);
    }

    #[test]
    fn date_filters_parse_common_formats() {
        let format_date = filter("format_date").unwrap();
        let format_datetime = filter("format_datetime").unwrap();
        assert_eq!(
            format_date(&Value::from("2024-03-05T10:20:00Z"), &Args::default()).unwrap(),
            Value::from("2024-03-05")
        );
        assert_eq!(
            format_datetime(&Value::from("2024-03-05 10:20"), &Args::default()).unwrap(),
            Value::from("2024-03-05 10:20")
        );
        let args = Args::new(vec![Value::from("%d/%m/%Y")]);
        assert_eq!(
            format_date(&Value::from("2024-03-05"), &args).unwrap(),
            Value::from("05/03/2024")
        );
        assert!(format_date(&Value::from("yesterday"), &Args::default()).is_err());
    }

    #[test]
    fn highlight_link_reads_request_path() {
        let highlight = context_function("highlight_link").unwrap();
        let mut request = BTreeMap::new();
        request.insert("path".to_string(), Value::from("/contact"));
        let ctx = Context::new([("request".to_string(), Value::Dict(request))]);

        let args = Args::new(vec![Value::from("/contact")]);
        assert_eq!(highlight(&ctx, &args).unwrap(), Value::from("active"));
        let args = Args::new(vec![Value::from("/")]);
        assert_eq!(highlight(&ctx, &args).unwrap(), Value::from(""));
    }

    #[test]
    fn every_listed_name_resolves() {
        assert!(FILTER_NAMES.iter().all(|n| filter(n).is_some()));
        assert!(CONTEXT_NAMES.iter().all(|n| context_function(n).is_some()));
        assert!(filter("nope").is_none());
    }
}
