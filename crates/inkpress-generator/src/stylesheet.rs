//! Stylesheet post-processing.
//!
//! Runs on every `.css` asset before fingerprinting: `@import` inlining,
//! `var()` resolution against `:root`, vendor prefixes for a fixed
//! property table, then minification.

use std::{
    collections::{HashMap, HashSet},
    ops::Range,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::debug;

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"'()\s;]+)["']?\s*\)?\s*;"#)
        .expect("import pattern is valid")
});

static CUSTOM_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(--[A-Za-z0-9_-]+)\s*:\s*([^;]+)").expect("property pattern is valid")
});

static CUSTOM_PROPERTY_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(--[A-Za-z0-9_-]+)\s*:\s*[^;]+;?").expect("declaration pattern is valid")
});

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("comment pattern is valid"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([{};,])\s*").expect("punctuation pattern is valid"));

/// Stands in for a string literal while the surrounding CSS is minified.
static STRING_SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{E000}(\\d+)\u{E001}").expect("slot pattern is valid"));

/// Properties that get vendor-prefixed copies.
const PREFIXED: &[(&str, &[&str])] = &[
    ("appearance", &["-webkit-", "-moz-"]),
    ("backdrop-filter", &["-webkit-"]),
    ("hyphens", &["-webkit-"]),
    ("mask-image", &["-webkit-"]),
    ("text-size-adjust", &["-webkit-", "-moz-"]),
    ("user-select", &["-webkit-", "-moz-"]),
];

static PREFIX_DECL: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<_> = PREFIXED.iter().map(|(p, _)| regex::escape(p)).collect();
    Regex::new(&format!(
        r"(^|[;{{\s])({})\s*:\s*([^;}}]+)",
        names.join("|")
    ))
    .expect("prefix pattern is valid")
});

/// How many `var()` hops are followed before giving up.
const MAX_VAR_DEPTH: usize = 16;

/// Stylesheet processing errors.
#[derive(Debug, Error)]
pub enum StylesheetError {
    /// An imported file could not be read.
    #[error("cannot import {path}: {source}")]
    Import {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Imports form a cycle.
    #[error("import cycle: {}", format_chain(.0))]
    ImportCycle(Vec<PathBuf>),

    /// `var()` without fallback names an undeclared property.
    #[error("unresolved custom property {name} in {path}")]
    UnresolvedVariable { name: String, path: PathBuf },

    /// `var()` is not closed, or references loop.
    #[error("malformed var() in {path}: {message}")]
    MalformedVariable { path: PathBuf, message: String },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for stylesheet operations.
pub type Result<T> = std::result::Result<T, StylesheetError>;

/// Run the full stylesheet pipeline over `source`, read from `path`.
pub fn process(path: &Path, source: &str) -> Result<String> {
    let mut chain = vec![path.to_path_buf()];
    let inlined = inline_imports(path, source, &mut chain)?;
    let resolved = resolve_variables(path, &inlined)?;
    let prefixed = add_vendor_prefixes(&resolved);
    let minified = minify(&prefixed);

    debug!(
        path = %path.display(),
        before = source.len(),
        after = minified.len(),
        "processed stylesheet"
    );
    Ok(minified)
}

fn inline_imports(path: &Path, source: &str, chain: &mut Vec<PathBuf>) -> Result<String> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut out = String::with_capacity(source.len());
    let mut last = 0;

    for caps in IMPORT.captures_iter(source) {
        let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&source[last..whole.start()]);
        last = whole.end();

        let target = target.as_str();
        if target.contains("://") || target.starts_with("//") {
            out.push_str(whole.as_str());
            continue;
        }

        let imported = dir.join(target);
        if chain.iter().any(|p| same_file(p, &imported)) {
            let mut cycle = chain.clone();
            cycle.push(imported);
            return Err(StylesheetError::ImportCycle(cycle));
        }

        let content = std::fs::read_to_string(&imported).map_err(|e| StylesheetError::Import {
            path: imported.clone(),
            source: e,
        })?;

        chain.push(imported.clone());
        let nested = inline_imports(&imported, &content, chain)?;
        chain.pop();
        out.push_str(&nested);
    }

    out.push_str(&source[last..]);
    Ok(out)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// A `:root { ... }` rule.
#[derive(Debug)]
struct RootRule {
    /// Selector through closing brace.
    span: Range<usize>,
    /// Between the braces.
    body: Range<usize>,
    /// Inside an at-rule such as `@media`.
    nested: bool,
}

/// Find every `:root` rule, skipping comments and string literals.
fn root_rules(css: &str) -> Vec<RootRule> {
    let bytes = css.as_bytes();
    let mut rules = Vec::new();
    // One entry per open brace: the span and body start when it opened `:root`.
    let mut open: Vec<Option<(usize, usize)>> = Vec::new();
    let mut prelude = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = comment_end(css, i);
                if css[prelude..i].trim().is_empty() {
                    prelude = end;
                }
                i = end;
                continue;
            }
            quote @ (b'"' | b'\'') => {
                i = string_end(bytes, i, quote);
                continue;
            }
            b'{' => {
                let selector = &css[prelude..i];
                let start = prelude + (selector.len() - selector.trim_start().len());
                open.push((selector.trim() == ":root").then_some((start, i + 1)));
                prelude = i + 1;
            }
            b'}' => {
                if let Some(Some((start, body))) = open.pop() {
                    rules.push(RootRule {
                        span: start..i + 1,
                        body: body..i,
                        nested: !open.is_empty(),
                    });
                }
                prelude = i + 1;
            }
            b';' => prelude = i + 1,
            _ => {}
        }
        i += 1;
    }

    rules
}

/// Offset just past the `*/` closing the comment opened at `start`.
fn comment_end(css: &str, start: usize) -> usize {
    css[start + 2..]
        .find("*/")
        .map_or(css.len(), |end| start + 2 + end + 2)
}

/// Offset just past the quote closing the string opened at `start`.
fn string_end(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Inline properties declared once at the top level. Properties that an
/// at-rule redeclares (a dark theme under `@media`, say) stay as `var()`
/// together with all of their declarations.
fn resolve_variables(path: &Path, css: &str) -> Result<String> {
    let mut declared = HashMap::new();
    let mut scoped = HashSet::new();
    for rule in root_rules(css) {
        for decl in CUSTOM_PROPERTY.captures_iter(&css[rule.body]) {
            if rule.nested {
                scoped.insert(decl[1].to_string());
            } else {
                declared.insert(decl[1].to_string(), decl[2].trim().to_string());
            }
        }
    }

    let substituted = substitute(path, css, &declared, &scoped, 0)?;
    Ok(strip_inlined(&substituted, &scoped))
}

/// Drop inlined declarations from top-level `:root` rules, and the rule
/// itself once it is empty.
fn strip_inlined(css: &str, scoped: &HashSet<String>) -> String {
    let mut out = String::with_capacity(css.len());
    let mut last = 0;

    for rule in root_rules(css).into_iter().filter(|r| !r.nested) {
        out.push_str(&css[last..rule.span.start]);
        last = rule.span.end;

        let body = CUSTOM_PROPERTY_DECL.replace_all(&css[rule.body], |caps: &Captures<'_>| {
            if scoped.contains(&caps[1]) {
                caps[0].to_string()
            } else {
                String::new()
            }
        });
        if !body.trim().trim_matches(';').trim().is_empty() {
            out.push_str(&format!(":root{{{body}}}"));
        }
    }

    out.push_str(&css[last..]);
    out
}

fn substitute(
    path: &Path,
    css: &str,
    declared: &HashMap<String, String>,
    scoped: &HashSet<String>,
    depth: usize,
) -> Result<String> {
    if depth > MAX_VAR_DEPTH {
        return Err(StylesheetError::MalformedVariable {
            path: path.to_path_buf(),
            message: "custom properties reference each other in a loop".to_string(),
        });
    }

    let mut out = String::with_capacity(css.len());
    let mut rest = css;

    while let Some(start) = rest.find("var(") {
        out.push_str(&rest[..start]);
        let args_start = start + "var(".len();
        let close = matching_paren(&rest[args_start..]).ok_or_else(|| {
            StylesheetError::MalformedVariable {
                path: path.to_path_buf(),
                message: "unclosed var(".to_string(),
            }
        })?;
        let args = &rest[args_start..args_start + close];
        rest = &rest[args_start + close + 1..];

        let (name, fallback) = match args.split_once(',') {
            Some((name, fallback)) => (name.trim(), Some(fallback.trim())),
            None => (args.trim(), None),
        };

        if scoped.contains(name) {
            out.push_str("var(");
            out.push_str(name);
            if let Some(fallback) = fallback {
                out.push_str(", ");
                out.push_str(&substitute(path, fallback, declared, scoped, depth + 1)?);
            }
            out.push(')');
            continue;
        }

        let value = match (declared.get(name), fallback) {
            (Some(value), _) => value.as_str(),
            (None, Some(fallback)) => fallback,
            (None, None) => {
                return Err(StylesheetError::UnresolvedVariable {
                    name: name.to_string(),
                    path: path.to_path_buf(),
                });
            }
        };

        out.push_str(&substitute(path, value, declared, scoped, depth + 1)?);
    }

    out.push_str(rest);
    Ok(out)
}

/// Offset of the `)` closing an already opened paren.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn add_vendor_prefixes(css: &str) -> String {
    PREFIX_DECL
        .replace_all(css, |caps: &Captures<'_>| {
            let property = &caps[2];
            let value = caps[3].trim();
            let prefixes = PREFIXED
                .iter()
                .find(|(p, _)| *p == property)
                .map(|(_, prefixes)| *prefixes)
                .unwrap_or_default();

            let mut decl = caps[1].to_string();
            for prefix in prefixes {
                decl.push_str(&format!("{prefix}{property}:{value};"));
            }
            decl.push_str(&format!("{property}:{value}"));
            decl
        })
        .into_owned()
}

/// Swap string literals for placeholders so minification cannot touch them.
fn protect_strings(css: &str) -> (String, Vec<&str>) {
    let bytes = css.as_bytes();
    let mut out = String::with_capacity(css.len());
    let mut strings = Vec::new();
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = comment_end(css, i),
            quote @ (b'"' | b'\'') => {
                let end = string_end(bytes, i, quote);
                out.push_str(&css[last..i]);
                out.push_str(&format!("\u{E000}{}\u{E001}", strings.len()));
                strings.push(&css[i..end]);
                last = end;
                i = end;
            }
            _ => i += 1,
        }
    }

    out.push_str(&css[last..]);
    (out, strings)
}

fn minify(css: &str) -> String {
    let (css, strings) = protect_strings(css);
    let css = COMMENT.replace_all(&css, "");
    let css = WHITESPACE.replace_all(&css, " ");
    let css = PUNCTUATION.replace_all(&css, "$1");
    let css = css.replace(";}", "}").replace(": ", ":");

    STRING_SLOT
        .replace_all(css.trim(), |caps: &Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| strings.get(n))
                .map_or_else(String::new, |s| s.to_string())
        })
        .into_owned()
}
