//! HTML template engine for layouts and partials.
//!
//! A small interpolation language rather than a full engine like Tera or
//! Handlebars:
//!
//! - `{{ name }}` required variable, `{{ name? }}` optional variable
//! - `{{> header }}` partial inclusion
//! - `{{ asset "/css/site.HASH.css" }}` public URL of a static asset
//! - `{{#each posts }}...{{/each}}` iteration over a list
//! - `{{#if hero_url }}...{{else}}...{{/if}}` conditional
//!
//! Templates are compiled once when registered. An engine is built per
//! assembly and only read while rendering.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use thiserror::Error;

/// How deep partials may include other partials.
pub const MAX_PARTIAL_DEPTH: usize = 16;

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Missing required variable.
    #[error("missing required variable '{variable}' in template '{template}'")]
    MissingVariable { template: String, variable: String },

    /// Layout not registered.
    #[error("template not found: {0}")]
    NotFound(String),

    /// Partial not registered.
    #[error("partial not found: {0}")]
    MissingPartial(String),

    /// Helper used before it was installed.
    #[error("helper '{0}' is not available")]
    MissingHelper(String),

    /// Asset helper called with a key that is not in the manifest.
    #[error("could not find static file for key '{0}'")]
    UnknownAsset(String),

    /// `#each` over something that is not a list.
    #[error("'{0}' is not a list")]
    NotAList(String),

    /// Partials include each other too deeply.
    #[error("partial nesting deeper than {MAX_PARTIAL_DEPTH} at '{0}'")]
    PartialDepth(String),

    /// Invalid template syntax.
    #[error("invalid template syntax in '{template}': {message}")]
    InvalidSyntax { template: String, message: String },
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// A value visible to templates.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Plain text, HTML-escaped on output.
    Text(String),
    /// Trusted markup, emitted as-is.
    Html(String),
    /// Flag for `#if`.
    Bool(bool),
    /// Items for `#each`.
    List(Vec<TemplateContext>),
}

impl Value {
    fn is_truthy(&self) -> bool {
        match self {
            Self::Text(s) | Self::Html(s) => !s.is_empty(),
            Self::Bool(b) => *b,
            Self::List(items) => !items.is_empty(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<TemplateContext>> for Value {
    fn from(items: Vec<TemplateContext>) -> Self {
        Self::List(items)
    }
}

/// Template context with variables for interpolation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    variables: BTreeMap<String, Value>,
}

impl TemplateContext {
    /// Create a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable into the context.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Insert trusted markup.
    pub fn insert_html(&mut self, key: impl Into<String>, html: impl Into<String>) {
        self.variables.insert(key.into(), Value::Html(html.into()));
    }

    /// Create context with initial variables.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Get a variable value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Check if a variable exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }
}

/// Resolves asset keys to public URLs for the `asset` helper.
pub trait AssetResolver: Send + Sync {
    /// Public URL for `key`, if the key is known.
    fn resolve(&self, key: &str) -> Option<String>;
}

impl AssetResolver for HashMap<String, String> {
    fn resolve(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var { name: String, optional: bool },
    Partial(String),
    Asset(String),
    Each { name: String, body: Vec<Node> },
    If { name: String, then: Vec<Node>, otherwise: Vec<Node> },
}

/// Block being parsed, waiting for its closing tag.
enum Open {
    Each(String),
    If { name: String, then: Option<Vec<Node>> },
}

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Compile a template from source.
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let nodes = parse(&name, source)?;
        Ok(Self { name, nodes })
    }

    /// Get the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn syntax_error(template: &str, message: impl Into<String>) -> TemplateError {
    TemplateError::InvalidSyntax {
        template: template.to_string(),
        message: message.into(),
    }
}

fn parse(template: &str, source: &str) -> Result<Vec<Node>> {
    let mut stack: Vec<(Open, Vec<Node>)> = Vec::new();
    let mut current: Vec<Node> = Vec::new();
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            current.push(Node::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| syntax_error(template, "unclosed {{ delimiter"))?;
        let tag = after[..end].trim();
        rest = &after[end + 2..];

        if let Some(name) = tag.strip_prefix('>') {
            current.push(Node::Partial(identifier(template, name.trim())?));
        } else if let Some(name) = tag.strip_prefix("#each") {
            let name = identifier(template, name.trim())?;
            stack.push((Open::Each(name), std::mem::take(&mut current)));
        } else if let Some(name) = tag.strip_prefix("#if") {
            let name = identifier(template, name.trim())?;
            stack.push((Open::If { name, then: None }, std::mem::take(&mut current)));
        } else if tag == "else" {
            match stack.last_mut() {
                Some((Open::If { then, .. }, _)) if then.is_none() => {
                    *then = Some(std::mem::take(&mut current));
                }
                _ => return Err(syntax_error(template, "{{else}} outside of {{#if}}")),
            }
        } else if let Some(closing) = tag.strip_prefix('/') {
            let (open, parent) = stack
                .pop()
                .ok_or_else(|| syntax_error(template, format!("unexpected {{{{/{closing}}}}}")))?;
            let body = std::mem::replace(&mut current, parent);
            let node = match (open, closing.trim()) {
                (Open::Each(name), "each") => Node::Each { name, body },
                (Open::If { name, then }, "if") => match then {
                    Some(then) => Node::If {
                        name,
                        then,
                        otherwise: body,
                    },
                    None => Node::If {
                        name,
                        then: body,
                        otherwise: Vec::new(),
                    },
                },
                (_, other) => {
                    return Err(syntax_error(template, format!("mismatched {{{{/{other}}}}}")));
                }
            };
            current.push(node);
        } else if let Some(arg) = tag.strip_prefix("asset ") {
            let key = arg
                .trim()
                .strip_prefix('"')
                .and_then(|a| a.strip_suffix('"'))
                .filter(|k| !k.is_empty())
                .ok_or_else(|| syntax_error(template, "asset expects a quoted key"))?;
            current.push(Node::Asset(key.to_string()));
        } else {
            let (name, optional) = match tag.strip_suffix('?') {
                Some(stripped) => (stripped.trim(), true),
                None => (tag, false),
            };
            current.push(Node::Var {
                name: identifier(template, name)?,
                optional,
            });
        }
    }

    if !rest.is_empty() {
        current.push(Node::Text(rest.to_string()));
    }

    if let Some((open, _)) = stack.pop() {
        let block = match open {
            Open::Each(_) => "each",
            Open::If { .. } => "if",
        };
        return Err(syntax_error(template, format!("unclosed {{{{#{block}}}}}")));
    }

    Ok(current)
}

fn identifier(template: &str, name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(name.to_string())
    } else {
        Err(syntax_error(template, format!("invalid name '{name}'")))
    }
}

/// Layouts, partials and helpers used by one assembly.
#[derive(Clone, Default)]
pub struct TemplateEngine {
    layouts: HashMap<String, Template>,
    partials: HashMap<String, Template>,
    assets: Option<Arc<dyn AssetResolver>>,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("layouts", &self.layouts.keys().collect::<Vec<_>>())
            .field("partials", &self.partials.keys().collect::<Vec<_>>())
            .field("assets", &self.assets.is_some())
            .finish()
    }
}

impl TemplateEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a layout.
    pub fn register_layout(&mut self, name: impl Into<String>, source: &str) -> Result<()> {
        let template = Template::compile(name, source)?;
        self.layouts.insert(template.name.clone(), template);
        Ok(())
    }

    /// Compile and register a partial.
    pub fn register_partial(&mut self, name: impl Into<String>, source: &str) -> Result<()> {
        let template = Template::compile(name, source)?;
        self.partials.insert(template.name.clone(), template);
        Ok(())
    }

    /// Install the resolver behind the `asset` helper.
    pub fn set_asset_resolver(&mut self, resolver: Arc<dyn AssetResolver>) {
        self.assets = Some(resolver);
    }

    /// Number of registered layouts and partials.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        (self.layouts.len(), self.partials.len())
    }

    /// Render a named layout with the given context.
    pub fn render(&self, name: &str, context: &TemplateContext) -> Result<String> {
        let template = self
            .layouts
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;

        let mut out = String::new();
        let mut scopes = vec![context];
        self.render_nodes(template, &template.nodes, &mut scopes, 0, &mut out)?;
        Ok(out)
    }

    fn render_nodes<'c>(
        &self,
        template: &Template,
        nodes: &[Node],
        scopes: &mut Vec<&'c TemplateContext>,
        depth: usize,
        out: &mut String,
    ) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Var { name, optional } => match lookup(scopes, name) {
                    Some(Value::Text(s)) => out.push_str(&escape_html(s)),
                    Some(Value::Html(s)) => out.push_str(s),
                    Some(Value::Bool(b)) => out.push_str(if *b { "true" } else { "false" }),
                    Some(Value::List(_)) => {
                        return Err(syntax_error(
                            &template.name,
                            format!("'{name}' is a list and cannot be printed"),
                        ));
                    }
                    None if *optional => {}
                    None => {
                        return Err(TemplateError::MissingVariable {
                            template: template.name.clone(),
                            variable: name.clone(),
                        });
                    }
                },
                Node::Partial(name) => {
                    if depth >= MAX_PARTIAL_DEPTH {
                        return Err(TemplateError::PartialDepth(name.clone()));
                    }
                    let partial = self
                        .partials
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingPartial(name.clone()))?;
                    self.render_nodes(partial, &partial.nodes, scopes, depth + 1, out)?;
                }
                Node::Asset(key) => {
                    let resolver = self
                        .assets
                        .as_ref()
                        .ok_or_else(|| TemplateError::MissingHelper("asset".to_string()))?;
                    let url = resolver
                        .resolve(key)
                        .ok_or_else(|| TemplateError::UnknownAsset(key.clone()))?;
                    out.push_str(&url);
                }
                Node::Each { name, body } => {
                    let items = match lookup(scopes, name) {
                        Some(Value::List(items)) => items,
                        Some(_) => return Err(TemplateError::NotAList(name.clone())),
                        None => continue,
                    };
                    for item in items {
                        scopes.push(item);
                        let result = self.render_nodes(template, body, scopes, depth, out);
                        scopes.pop();
                        result?;
                    }
                }
                Node::If {
                    name,
                    then,
                    otherwise,
                } => {
                    let branch = if lookup(scopes, name).is_some_and(Value::is_truthy) {
                        then
                    } else {
                        otherwise
                    };
                    self.render_nodes(template, branch, scopes, depth, out)?;
                }
            }
        }
        Ok(())
    }
}

fn lookup<'c>(scopes: &[&'c TemplateContext], name: &str) -> Option<&'c Value> {
    scopes.iter().rev().find_map(|scope| scope.get(name))
}

/// Escape text for HTML output.
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(name: &str, source: &str) -> TemplateEngine {
        let mut engine = TemplateEngine::new();
        engine.register_layout(name, source).unwrap();
        engine
    }

    #[test]
    fn test_simple_interpolation() {
        let engine = engine_with("t", "Hello, {{ name }}!");
        let ctx = TemplateContext::new().with_var("name", "World");
        assert_eq!(engine.render("t", &ctx).unwrap(), "Hello, World!");
    }

    #[test]
    fn test_optional_variable() {
        let engine = engine_with("t", "Hello{{ suffix? }}!");
        let ctx = TemplateContext::new();
        assert_eq!(engine.render("t", &ctx).unwrap(), "Hello!");
    }

    #[test]
    fn test_missing_required_variable() {
        let engine = engine_with("t", "Hello, {{ name }}!");
        let result = engine.render("t", &TemplateContext::new());
        assert!(matches!(
            result,
            Err(TemplateError::MissingVariable { ref variable, .. }) if variable == "name"
        ));
    }

    #[test]
    fn test_text_is_escaped_html_is_not() {
        let engine = engine_with("t", "{{ title }}|{{ content }}");
        let mut ctx = TemplateContext::new().with_var("title", "Fish & <Chips>");
        ctx.insert_html("content", "<p>ok</p>");
        assert_eq!(
            engine.render("t", &ctx).unwrap(),
            "Fish &amp; &lt;Chips&gt;|<p>ok</p>"
        );
    }

    #[test]
    fn test_unclosed_delimiter() {
        let result = Template::compile("t", "Hello {{ name");
        assert!(matches!(result, Err(TemplateError::InvalidSyntax { .. })));
    }

    #[test]
    fn test_unbalanced_blocks() {
        assert!(Template::compile("t", "{{#each posts}}x").is_err());
        assert!(Template::compile("t", "{{#if a}}x{{/each}}").is_err());
        assert!(Template::compile("t", "x{{/if}}").is_err());
        assert!(Template::compile("t", "{{else}}").is_err());
        assert!(Template::compile("t", "{{ bad name }}").is_err());
    }

    #[test]
    fn test_partials() {
        let mut engine = engine_with("page", "<body>{{> header }}{{ body }}</body>");
        engine.register_partial("header", "<h1>{{ site_title }}</h1>").unwrap();

        let ctx = TemplateContext::new()
            .with_var("site_title", "Blog")
            .with_var("body", "hi");
        assert_eq!(
            engine.render("page", &ctx).unwrap(),
            "<body><h1>Blog</h1>hi</body>"
        );
    }

    #[test]
    fn test_missing_partial() {
        let engine = engine_with("page", "{{> footer }}");
        let result = engine.render("page", &TemplateContext::new());
        assert!(matches!(result, Err(TemplateError::MissingPartial(ref p)) if p == "footer"));
    }

    #[test]
    fn test_recursive_partial_is_bounded() {
        let mut engine = engine_with("page", "{{> loop }}");
        engine.register_partial("loop", "x{{> loop }}").unwrap();
        let result = engine.render("page", &TemplateContext::new());
        assert!(matches!(result, Err(TemplateError::PartialDepth(_))));
    }

    #[test]
    fn test_each_with_outer_scope() {
        let engine = engine_with(
            "list",
            "{{#each posts}}<a href=\"{{ base }}{{ url }}\">{{ title }}</a>{{/each}}",
        );
        let posts = vec![
            TemplateContext::new().with_var("url", "/a").with_var("title", "A"),
            TemplateContext::new().with_var("url", "/b").with_var("title", "B"),
        ];
        let ctx = TemplateContext::new()
            .with_var("base", "https://x")
            .with_var("posts", posts);

        assert_eq!(
            engine.render("list", &ctx).unwrap(),
            "<a href=\"https://x/a\">A</a><a href=\"https://x/b\">B</a>"
        );
    }

    #[test]
    fn test_each_over_non_list() {
        let engine = engine_with("t", "{{#each title}}x{{/each}}");
        let ctx = TemplateContext::new().with_var("title", "nope");
        assert!(matches!(
            engine.render("t", &ctx),
            Err(TemplateError::NotAList(_))
        ));
    }

    #[test]
    fn test_if_else() {
        let engine = engine_with("t", "{{#if hero}}[{{ hero }}]{{else}}none{{/if}}");

        let with = TemplateContext::new().with_var("hero", "img");
        assert_eq!(engine.render("t", &with).unwrap(), "[img]");

        let empty = TemplateContext::new().with_var("hero", "");
        assert_eq!(engine.render("t", &empty).unwrap(), "none");

        let flag = TemplateContext::new().with_var("hero", false);
        assert_eq!(engine.render("t", &flag).unwrap(), "none");

        assert_eq!(engine.render("t", &TemplateContext::new()).unwrap(), "none");
    }

    #[test]
    fn test_asset_helper() {
        let mut engine = engine_with("t", "<link href=\"{{ asset \"/css/site.HASH.css\" }}\">");

        let result = engine.render("t", &TemplateContext::new());
        assert!(matches!(result, Err(TemplateError::MissingHelper(_))));

        let mut urls = HashMap::new();
        urls.insert(
            "/css/site.HASH.css".to_string(),
            "/css/site.0123456789.css".to_string(),
        );
        engine.set_asset_resolver(Arc::new(urls));

        assert_eq!(
            engine.render("t", &TemplateContext::new()).unwrap(),
            "<link href=\"/css/site.0123456789.css\">"
        );
    }

    #[test]
    fn test_asset_helper_unknown_key() {
        let mut engine = engine_with("t", "{{ asset \"/missing.js\" }}");
        engine.set_asset_resolver(Arc::new(HashMap::<String, String>::new()));
        let result = engine.render("t", &TemplateContext::new());
        assert!(matches!(result, Err(TemplateError::UnknownAsset(ref k)) if k == "/missing.js"));
    }

    #[test]
    fn test_template_not_found() {
        let engine = TemplateEngine::new();
        let result = engine.render("nonexistent", &TemplateContext::new());
        assert!(matches!(result, Err(TemplateError::NotFound(_))));
    }
}
