//! Template compiler
//!
//! Wraps handlebars to compile per-field template text. Each compiled
//! template knows the variables it references and the encoding strategy of
//! the document field it renders into.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use handlebars::{
    BlockContext, Context, Handlebars, Helper, HelperDef, HelperResult, JsonTruthy, Output,
    RenderContext, Renderable,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BarberError, Result};

const FIELD_TEMPLATE: &str = "field";

/// How rendered values are encoded into a document field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEncoding {
    /// Interpolated values are HTML-escaped
    #[default]
    Html,
    /// Interpolated values are substituted verbatim
    Plaintext,
    /// The rendered value must parse as a URL and is re-serialized canonically
    Url,
}

impl fmt::Display for FieldEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldEncoding::Html => write!(f, "html"),
            FieldEncoding::Plaintext => write!(f, "plaintext"),
            FieldEncoding::Url => write!(f, "url"),
        }
    }
}

struct Compiled {
    text: String,
    encoding: FieldEncoding,
    variables: BTreeSet<String>,
    registry: Handlebars<'static>,
}

/// A compiled field template, cheap to clone and safe to share across threads
#[derive(Clone)]
pub struct CompiledTemplate {
    inner: Arc<Compiled>,
}

impl CompiledTemplate {
    /// Compile raw template text for the named document field
    pub fn compile(field: &str, text: &str, encoding: FieldEncoding) -> Result<Self> {
        let compile_error = |message: String| BarberError::Compile {
            field: field.to_string(),
            text: text.to_string(),
            message,
        };

        let mut registry = Handlebars::new();
        match encoding {
            FieldEncoding::Html => registry.register_escape_fn(handlebars::html_escape),
            FieldEncoding::Plaintext | FieldEncoding::Url => {
                registry.register_escape_fn(handlebars::no_escape)
            }
        }
        registry.register_helper("blockHelperMissing", Box::new(SectionHelper));
        registry
            .register_template_string(FIELD_TEMPLATE, text)
            .map_err(|e| compile_error(e.to_string()))?;

        let variables = variable_references(text);

        // Constant URL templates can be checked now rather than on every render
        if encoding == FieldEncoding::Url && variables.is_empty() {
            normalize_url(text).map_err(|e| compile_error(e.to_string()))?;
        }

        tracing::trace!(field, %encoding, variables = variables.len(), "compiled field template");

        Ok(Self {
            inner: Arc::new(Compiled {
                text: text.to_string(),
                encoding,
                variables,
                registry,
            }),
        })
    }

    /// Dotted variable paths referenced by the template
    pub fn variable_references(&self) -> &BTreeSet<String> {
        &self.inner.variables
    }

    /// First dot-segment of every referenced variable
    pub fn root_keys(&self) -> BTreeSet<&str> {
        self.inner
            .variables
            .iter()
            .map(|v| v.split('.').next().unwrap_or(v))
            .collect()
    }

    pub fn text(&self) -> &str {
        &self.inner.text
    }

    pub fn encoding(&self) -> FieldEncoding {
        self.inner.encoding
    }

    /// Execute against a data record
    pub fn execute<T: Serialize>(&self, data: &T) -> Result<String> {
        let rendered = self
            .inner
            .registry
            .render(FIELD_TEMPLATE, data)
            .map_err(|e| BarberError::Render(e.to_string()))?;

        match self.inner.encoding {
            FieldEncoding::Url => normalize_url(&rendered),
            FieldEncoding::Html | FieldEncoding::Plaintext => Ok(rendered),
        }
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("text", &self.inner.text)
            .field("encoding", &self.inner.encoding)
            .field("variables", &self.inner.variables)
            .finish()
    }
}

/// Execute a matrix cell; an absent template renders as null
pub fn execute_cell<T: Serialize>(
    cell: Option<&CompiledTemplate>,
    data: &T,
) -> Result<Option<String>> {
    cell.map(|template| template.execute(data)).transpose()
}

fn normalize_url(value: &str) -> Result<String> {
    let trimmed = value.trim();
    Url::parse(trimmed)
        .map(|url| url.to_string())
        .map_err(|e| BarberError::InvalidUrl {
            value: trimmed.to_string(),
            reason: e.to_string(),
        })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)\{\{\{?~?(.*?)~?\}?\}\}").expect("tag pattern is a valid regex")
    })
}

/// Collect the data paths referenced by mustache tags in `text`.
///
/// Paths inside `{{#with x}}`, `{{#each x}}` and `{{#x}}` sections are
/// resolved against `x`, so `{{#with account}}{{id}}{{/with}}` yields
/// `account` and `account.id`. Block params, `@` data variables, literals
/// and helper names are not data paths.
pub fn variable_references(text: &str) -> BTreeSet<String> {
    let mut scanner = Scanner::default();
    for captures in tag_pattern().captures_iter(text) {
        scanner.visit(captures.get(1).map_or("", |m| m.as_str()).trim());
    }
    scanner.variables
}

/// What a path inside a block is relative to
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Root,
    Path(String),
    /// Not part of the data record (literals, `@index`, helper output)
    Opaque,
}

impl Scope {
    fn join(&self, rest: &str) -> Scope {
        match self {
            _ if rest.is_empty() => self.clone(),
            Scope::Root => Scope::Path(rest.to_string()),
            Scope::Path(base) => Scope::Path(format!("{}.{}", base, rest)),
            Scope::Opaque => Scope::Opaque,
        }
    }
}

#[derive(Debug)]
struct Frame {
    context: Scope,
    /// Only `with`, `each` and sections push a context that `../` walks out of
    changes_context: bool,
    /// Block params declared with `as |name|`
    aliases: BTreeMap<String, Scope>,
}

#[derive(Debug, Default)]
struct Scanner {
    frames: Vec<Frame>,
    /// Inside `{{{{raw}}}}…{{{{/raw}}}}`
    raw: bool,
    variables: BTreeSet<String>,
}

impl Scanner {
    fn visit(&mut self, inner: &str) {
        // Raw block delimiters keep one brace after the pattern strips three
        if let Some(rest) = inner.strip_prefix('{') {
            self.raw = !rest.starts_with('/');
            return;
        }
        // Comments, partials, decorators
        if self.raw || inner.is_empty() || inner.starts_with(['!', '>', '*']) {
            return;
        }
        if inner.starts_with('/') {
            self.frames.pop();
        } else if inner.starts_with("#>") || inner.starts_with("#*") {
            self.push_inherited(BTreeMap::new());
        } else if let Some(body) = inner.strip_prefix('#') {
            self.open_block(&tokenize(body), false);
        } else if let Some(body) = inner.strip_prefix('^') {
            let tokens = tokenize(body);
            if tokens.is_empty() {
                self.enter_else(&[]);
            } else {
                self.open_block(&tokens, true);
            }
        } else {
            let tokens = tokenize(inner.strip_prefix('&').unwrap_or(inner));
            match tokens.split_first() {
                Some((&"else", chained)) => self.enter_else(chained),
                Some((head, [])) if !is_helper(head) => self.record(head),
                Some((_, args)) => self.record_args(args),
                None => {}
            }
        }
    }

    fn open_block(&mut self, tokens: &[&str], inverse: bool) {
        let (tokens, params) = split_block_params(tokens);
        let Some((&head, args)) = tokens.split_first() else {
            self.push_inherited(BTreeMap::new());
            return;
        };
        // Arguments resolve in the enclosing scope
        self.record_args(args);

        let opaque_params = || -> BTreeMap<String, Scope> {
            params.iter().map(|p| (p.to_string(), Scope::Opaque)).collect()
        };
        if inverse {
            if args.is_empty() && !is_helper(head) {
                self.record(head);
            }
            self.push_inherited(opaque_params());
        } else if matches!(head, "with" | "each") {
            let context = match args.first() {
                Some(&"(") | None => Scope::Opaque,
                Some(arg) => self.resolve(hash_value(arg)),
            };
            let mut aliases = BTreeMap::new();
            for (i, param) in params.iter().enumerate() {
                // `each` binds the element first and its index or key second
                let scope = if i == 0 { context.clone() } else { Scope::Opaque };
                aliases.insert(param.to_string(), scope);
            }
            self.frames.push(Frame {
                context,
                changes_context: true,
                aliases,
            });
        } else if args.is_empty() && !is_helper(head) {
            self.record(head);
            let context = self.resolve(head);
            self.frames.push(Frame {
                context,
                changes_context: true,
                aliases: opaque_params(),
            });
        } else {
            self.push_inherited(opaque_params());
        }
    }

    /// `{{else}}` renders in the scope outside the block; `{{else if x}}`
    /// chains a new block in its place
    fn enter_else(&mut self, chained: &[&str]) {
        self.frames.pop();
        if chained.is_empty() {
            self.push_inherited(BTreeMap::new());
        } else {
            self.open_block(chained, false);
        }
    }

    fn push_inherited(&mut self, aliases: BTreeMap<String, Scope>) {
        let context = self.context_above(0);
        self.frames.push(Frame {
            context,
            changes_context: false,
            aliases,
        });
    }

    /// Context `levels` context-changing blocks out from the innermost one
    fn context_above(&self, levels: usize) -> Scope {
        let mut frames = self.frames.iter().rev();
        let mut remaining = levels;
        while remaining > 0 {
            match frames.next() {
                Some(frame) if frame.changes_context => remaining -= 1,
                Some(_) => {}
                None => return Scope::Opaque,
            }
        }
        frames.next().map_or(Scope::Root, |frame| frame.context.clone())
    }

    fn record_args(&mut self, args: &[&str]) {
        let mut helper_name_next = false;
        for &token in args {
            match token {
                "(" => helper_name_next = true,
                ")" | "|" => {}
                _ if helper_name_next => helper_name_next = false,
                _ => self.record(hash_value(token)),
            }
        }
    }

    fn record(&mut self, token: &str) {
        if let Scope::Path(path) = self.resolve(token) {
            self.variables.insert(path);
        }
    }

    fn resolve(&self, token: &str) -> Scope {
        if token.is_empty() || is_literal(token) {
            return Scope::Opaque;
        }
        if let Some(data) = token.strip_prefix('@') {
            return match data.strip_prefix("root") {
                Some(path) if path.starts_with(['.', '/']) => Scope::Root.join(&normalize(&path[1..])),
                _ => Scope::Opaque,
            };
        }

        let mut rest = token;
        let mut levels = 0;
        while let Some(stripped) = rest.strip_prefix("../") {
            levels += 1;
            rest = stripped;
        }
        if rest == ".." {
            levels += 1;
            rest = "";
        }
        let unprefixed = ["./", "this.", "this/"]
            .iter()
            .find_map(|prefix| rest.strip_prefix(prefix));
        // Block params only shadow unqualified paths
        let explicit = levels > 0 || unprefixed.is_some() || matches!(rest, "." | "this");
        let rest = match unprefixed {
            Some(stripped) => stripped,
            None if matches!(rest, "." | "this") => "",
            None => rest,
        };
        let path = normalize(rest);

        if !explicit {
            let (first, tail) = path.split_once('.').unwrap_or((path.as_str(), ""));
            let alias = self.frames.iter().rev().find_map(|frame| frame.aliases.get(first));
            if let Some(scope) = alias {
                return scope.join(tail);
            }
        }

        match self.context_above(levels) {
            Scope::Root if path.is_empty() => Scope::Opaque,
            context => context.join(&path),
        }
    }
}

/// The handlebars built-ins registered in every field registry (default
/// features). Field registries are private to [`CompiledTemplate::compile`],
/// so no custom helper can be registered: a bare `{{name}}` outside this list
/// is always read as a variable, and any tag with arguments is read as a
/// helper call whatever its name.
const BUILTIN_HELPERS: &[&str] = &[
    "if", "unless", "each", "with", "lookup", "raw", "log", "eq", "ne", "gt", "gte", "lt", "lte",
    "and", "or", "not", "len",
];

fn is_helper(name: &str) -> bool {
    BUILTIN_HELPERS.contains(&name)
}

fn is_literal(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some('"' | '\'') => true,
        Some(c) if c.is_ascii_digit() => true,
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => matches!(token, "true" | "false" | "null" | "undefined"),
    }
}

/// `key=value` hash arguments read `value`
fn hash_value(token: &str) -> &str {
    match token.split_once('=') {
        Some((key, value))
            if !key.is_empty() && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') =>
        {
            value
        }
        _ => token,
    }
}

/// `a/b` and `[a].b` both become `a.b`
fn normalize(path: &str) -> String {
    path.replace('/', ".").replace(['[', ']'], "")
}

/// Split `["each", "items", "as", "|", "item", "|"]` into the expression and
/// its block params
fn split_block_params<'a>(tokens: &'a [&'a str]) -> (&'a [&'a str], Vec<&'a str>) {
    let start = tokens
        .windows(2)
        .position(|pair| pair[0] == "as" && pair[1] == "|");
    match start {
        Some(i) => {
            let params = tokens[i + 2..].iter().take_while(|t| **t != "|").copied().collect();
            (&tokens[..i], params)
        }
        None => (tokens, Vec::new()),
    }
}

/// Whitespace-separated tokens; quoted strings and `[…]` segments stay
/// whole, and `(`, `)` and `|` are tokens of their own
fn tokenize(body: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut quote: Option<char> = None;
    let mut in_brackets = false;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if in_brackets {
            in_brackets = c != ']';
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                start.get_or_insert(i);
            }
            '[' => {
                in_brackets = true;
                start.get_or_insert(i);
            }
            '(' | ')' | '|' => {
                if let Some(s) = start.take() {
                    tokens.push(&body[s..i]);
                }
                tokens.push(&body[i..i + 1]);
            }
            c if c.is_whitespace() => {
                if let Some(s) = start.take() {
                    tokens.push(&body[s..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if let Some(s) = start {
        tokens.push(&body[s..]);
    }
    tokens
}

/// Mustache sections: `{{#account}}…{{/account}}` renders its body with
/// `account` as the context when the value is truthy, and the `{{else}}`
/// branch otherwise. Registered as `blockHelperMissing`.
#[derive(Clone, Copy)]
struct SectionHelper;

impl HelperDef for SectionHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = rc.evaluate(ctx, h.name())?;
        if !value.as_json().is_truthy(false) {
            return match h.inverse() {
                Some(inverse) => inverse.render(r, ctx, rc, out),
                None => Ok(()),
            };
        }

        let mut block = BlockContext::new();
        match value.context_path() {
            Some(path) => block.base_path_mut().clone_from(path),
            None => block.set_base_value(value.as_json().clone()),
        }
        rc.push_block(block);
        if let Some(template) = h.template() {
            template.render(r, ctx, rc, out)?;
        }
        rc.pop_block();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn refs(text: &str) -> Vec<String> {
        variable_references(text).into_iter().collect()
    }

    #[test]
    fn test_simple_references() {
        assert_eq!(refs("{{sender}} sent you {{amount}}"), vec!["amount", "sender"]);
        assert_eq!(
            refs("{{ account.id }} / {{{unescaped}}} / {{&amp}}"),
            vec!["account.id", "amp", "unescaped"]
        );
    }

    #[test]
    fn test_sections_and_helpers() {
        assert_eq!(
            refs("{{#if vip}}Dear {{name}}{{else}}Hi{{/if}}{{! note }}{{> footer}}"),
            vec!["name", "vip"]
        );
        assert_eq!(refs("{{lookup table key}}"), vec!["key", "table"]);
        assert!(refs("plain text").is_empty());
    }

    #[test]
    fn test_block_context_paths() {
        assert_eq!(
            refs("{{sender}} {{#account}}{{id}}{{/account}}"),
            vec!["account", "account.id", "sender"]
        );
        assert_eq!(refs("{{#with account}}{{id}}{{/with}}"), vec!["account", "account.id"]);
        assert_eq!(
            refs("{{#with account}}{{id}} {{../sender}} {{@root.memo}}{{/with}}{{amount}}"),
            vec!["account", "account.id", "amount", "memo", "sender"]
        );
        assert_eq!(
            refs("{{#each items}}{{label}} {{this.price}} {{@index}}{{/each}}"),
            vec!["items", "items.label", "items.price"]
        );
        // `if` keeps the enclosing context
        assert_eq!(
            refs("{{#with account}}{{#if open}}{{id}}{{/if}}{{/with}}"),
            vec!["account", "account.id", "account.open"]
        );
    }

    #[test]
    fn test_block_params_are_not_data_paths() {
        assert_eq!(
            refs("{{#each items as |item idx|}}{{idx}}: {{item.label}}{{/each}}"),
            vec!["items", "items.label"]
        );
        assert_eq!(
            refs("{{#with account as |acct|}}{{acct.id}}{{/with}}{{acct}}"),
            vec!["account", "account.id", "acct"]
        );
    }

    #[test]
    fn test_else_branches_use_the_outer_context() {
        assert_eq!(
            refs("{{#with account}}{{id}}{{else}}{{sender}}{{/with}}"),
            vec!["account", "account.id", "sender"]
        );
        assert_eq!(
            refs("{{#if vip}}a{{else if (gt amount 10)}}{{name}}{{else}}c{{/if}}"),
            vec!["amount", "name", "vip"]
        );
        assert_eq!(refs("{{^account}}{{sender}}{{/account}}"), vec!["account", "sender"]);
    }

    #[test]
    fn test_subexpression_helpers_and_literals() {
        assert_eq!(refs(r#"{{#if (eq sender "Sandy")}}hi{{/if}}"#), vec!["sender"]);
        assert_eq!(refs(r#"{{#if (and (gt amount 10) vip)}}x{{/if}}"#), vec!["amount", "vip"]);
        assert_eq!(refs(r#"{{format amount currency="USD" fallback=memo}}"#), vec!["amount", "memo"]);
        assert_eq!(refs(r#"{{log "a b" -1 true}}"#), Vec::<String>::new());
        assert!(refs("{{{{raw}}}}{{ignored}}{{{{/raw}}}}").is_empty());
    }

    #[test]
    fn test_sections_render_in_their_context() {
        let template = CompiledTemplate::compile(
            "body",
            "{{sender}} {{#account}}#{{id}}{{else}}none{{/account}}",
            FieldEncoding::Plaintext,
        )
        .unwrap();
        let out = template
            .execute(&json!({"sender": "Sandy", "account": {"id": 7}}))
            .unwrap();
        assert_eq!(out, "Sandy #7");
        let out = template.execute(&json!({"sender": "Sandy"})).unwrap();
        assert_eq!(out, "Sandy none");
    }

    #[test]
    fn test_end_to_end_execution() {
        let template = CompiledTemplate::compile(
            "sms_body",
            "{{sender}} sent you {{amount}}",
            FieldEncoding::Html,
        )
        .unwrap();
        let out = template.execute(&json!({"sender": "Sandy", "amount": "$50"})).unwrap();
        assert_eq!(out, "Sandy sent you $50");
    }

    #[test]
    fn test_html_escapes_plaintext_does_not() {
        let data = json!({"name": "<b>Tom & Jerry</b>"});
        let html = CompiledTemplate::compile("body", "{{name}}", FieldEncoding::Html).unwrap();
        let plain = CompiledTemplate::compile("body", "{{name}}", FieldEncoding::Plaintext).unwrap();
        let escaped = html.execute(&data).unwrap();
        assert!(escaped.contains("&lt;b&gt;"));
        assert!(escaped.contains("&amp;"));
        assert_eq!(plain.execute(&data).unwrap(), "<b>Tom & Jerry</b>");
    }

    #[test]
    fn test_url_encoding_normalizes_and_rejects() {
        let template = CompiledTemplate::compile("link", "{{base}}/pay?id={{id}}", FieldEncoding::Url).unwrap();
        let out = template.execute(&json!({"base": "HTTPS://Example.COM", "id": "42"})).unwrap();
        assert_eq!(out, "https://example.com/pay?id=42");

        let err = template.execute(&json!({"base": "not a url", "id": "1"})).unwrap_err();
        assert!(matches!(err, BarberError::InvalidUrl { .. }));

        assert!(CompiledTemplate::compile("link", "nope", FieldEncoding::Url).is_err());
    }

    #[test]
    fn test_null_cell_is_distinct_from_empty() {
        let empty = CompiledTemplate::compile("subject", "", FieldEncoding::Html).unwrap();
        let data = json!({});
        assert_eq!(execute_cell(Some(&empty), &data).unwrap(), Some(String::new()));
        assert_eq!(execute_cell(None, &data).unwrap(), None);
    }

    #[test]
    fn test_syntax_error_is_a_compile_error() {
        let err = CompiledTemplate::compile("body", "{{#if x}}a{{/each}}", FieldEncoding::Html).unwrap_err();
        match err {
            BarberError::Compile { field, text, .. } => {
                assert_eq!(field, "body");
                assert_eq!(text, "{{#if x}}a{{/each}}");
            }
            other => panic!("Expected Compile, got {:?}", other),
        }
    }
}
