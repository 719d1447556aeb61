//! Template rendering.
//!
//! Stage 2 of the build. Every file under the templates directory is loaded
//! into one [`Tera`] instance, named by its path relative to that directory
//! (`layout.html`, `partials/socials.html`). Templates compose in two levels:
//!
//! ```text
//! entry.html / index.html    inner template, produces the page body
//!        │
//!        ▼  Content
//! layout.html                outer template, shared chrome
//! ```
//!
//! ## Template Contexts
//!
//! | Template | Variables |
//! |----------|-----------|
//! | entry    | `entry`, `site`, `Title`, `Description`, `Content` |
//! | index    | `site`, `entries`, `groups`, `Title`, `Description` |
//! | layout   | `Title`, `Description`, `Content`, `site` |
//!
//! `site` is `{title, description, socials}`. Templates named `*.html`,
//! `*.htm` or `*.xml` are auto-escaped; `Content` is already HTML, so
//! templates write `{{ Content | safe }}`. Content is trusted input. The
//! layout and entry templates are rejected at load time if they print
//! `Content` without `safe`.
//!
//! ## Entry Bodies
//!
//! Markdown sources go through pulldown-cmark (raw HTML passes through).
//! HTML sources are templates themselves: they are registered as
//! `fragments/<slug>.html` before rendering starts and executed with
//! `entry` and `site` in scope.
//!
//! ## Helpers
//!
//! Filters and functions come from a [`Helpers`] registry handed to
//! [`Renderer::new`]. [`Helpers::stock`] provides:
//!
//! - `join_tags(sep=", ")`: join a list of strings
//! - `format_date(format="%-d %B %Y")`: reformat a `YYYY-MM-DD` date
//! - `year`: the year of a `YYYY-MM-DD` date

use crate::config::TemplatesConfig;
use crate::types::{Entry, SiteConfig, Social};
use chrono::{Datelike, NaiveDate};
use pulldown_cmark::{Parser, html as md_html};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::{Context, Tera, Value};
use thiserror::Error;

/// Directory prefix under which HTML entry bodies are registered.
const FRAGMENT_PREFIX: &str = "fragments";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("templates directory not found: {}", .0.display())]
    MissingRoot(PathBuf),
    #[error("failed to parse templates in {}:\n{message}", .root.display())]
    Parse { root: PathBuf, message: String },
    #[error("template '{name}' not found in {}", .root.display())]
    NotFound { name: String, root: PathBuf },
    #[error("invalid HTML fragment for '{name}':\n{message}")]
    Fragment { name: String, message: String },
    #[error("failed to render '{template}':\n{message}")]
    Render { template: String, message: String },
    #[error("template '{template}' prints `{{{{ {expr} }}}}` without `| safe`; Content is already HTML")]
    EscapedContent { template: String, expr: String },
}

pub type FilterFn =
    Arc<dyn Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync>;
pub type FunctionFn = Arc<dyn Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync>;

/// Named filters and functions made available to every template.
#[derive(Clone, Default)]
pub struct Helpers {
    filters: BTreeMap<String, FilterFn>,
    functions: BTreeMap<String, FunctionFn>,
}

impl Helpers {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock filters: `join_tags`, `format_date`, `year`.
    pub fn stock() -> Self {
        Self::new()
            .with_filter("join_tags", join_tags)
            .with_filter("format_date", format_date)
            .with_filter("year", year)
    }

    /// Register a filter, replacing any previous one of the same name.
    pub fn with_filter<F>(mut self, name: &str, filter: F) -> Self
    where
        F: Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync + 'static,
    {
        self.filters.insert(name.to_string(), Arc::new(filter));
        self
    }

    /// Register a function, replacing any previous one of the same name.
    pub fn with_function<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
        self
    }

    fn register(&self, tera: &mut Tera) {
        for (name, filter) in &self.filters {
            let filter = Arc::clone(filter);
            tera.register_filter(name, move |value: &Value, args: &HashMap<String, Value>| {
                filter(value, args)
            });
        }
        for (name, function) in &self.functions {
            let function = Arc::clone(function);
            tera.register_function(name, move |args: &HashMap<String, Value>| function(args));
        }
    }
}

impl fmt::Debug for Helpers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Helpers")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Names of the three templates a build needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateNames {
    pub layout: String,
    pub index: String,
    pub entry: String,
}

impl From<&TemplatesConfig> for TemplateNames {
    fn from(config: &TemplatesConfig) -> Self {
        Self {
            layout: config.layout.clone(),
            index: config.index.clone(),
            entry: config.entry.clone(),
        }
    }
}

/// Site-wide values exposed to templates as `site`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SiteView<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub socials: &'a [Social],
}

impl<'a> From<&'a SiteConfig> for SiteView<'a> {
    fn from(site: &'a SiteConfig) -> Self {
        Self {
            title: &site.title,
            description: &site.description,
            socials: &site.socials,
        }
    }
}

/// One entry together with the site it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub entry: &'a Entry,
    pub site: SiteView<'a>,
}

impl<'a> RenderContext<'a> {
    pub fn new(entry: &'a Entry, site: &'a SiteConfig) -> Self {
        Self {
            entry,
            site: SiteView::from(site),
        }
    }

    /// Page title: the entry's.
    pub fn title(&self) -> &'a str {
        &self.entry.title
    }

    /// Page description: the entry's, else the site's.
    pub fn description(&self) -> &'a str {
        self.entry
            .description
            .as_deref()
            .unwrap_or(self.site.description)
    }
}

/// Loaded templates plus the names of the three the build composes.
#[derive(Debug)]
pub struct Renderer {
    tera: Tera,
    names: TemplateNames,
    root: PathBuf,
}

impl Renderer {
    /// Load every template under `templates_root` and register `helpers`.
    ///
    /// Fails if the directory is missing, any template does not parse, or one
    /// of the three named templates does not exist.
    pub fn new(
        templates_root: &Path,
        names: TemplateNames,
        helpers: &Helpers,
    ) -> Result<Self, TemplateError> {
        if !templates_root.is_dir() {
            return Err(TemplateError::MissingRoot(templates_root.to_path_buf()));
        }
        let glob = templates_root.join("**").join("*");
        let mut tera =
            Tera::new(&glob.to_string_lossy()).map_err(|e| TemplateError::Parse {
                root: templates_root.to_path_buf(),
                message: error_chain(&e),
            })?;
        helpers.register(&mut tera);

        let renderer = Self {
            tera,
            names,
            root: templates_root.to_path_buf(),
        };
        for name in [
            &renderer.names.layout,
            &renderer.names.index,
            &renderer.names.entry,
        ] {
            renderer.require(name)?;
        }
        for name in [&renderer.names.layout, &renderer.names.entry] {
            renderer.require_raw_content(name)?;
        }
        log::debug!(
            "loaded {} templates from {}",
            renderer.tera.get_template_names().count(),
            templates_root.display()
        );
        Ok(renderer)
    }

    pub fn names(&self) -> &TemplateNames {
        &self.names
    }

    fn require(&self, name: &str) -> Result<(), TemplateError> {
        if self.tera.get_template_names().any(|n| n == name) {
            Ok(())
        } else {
            Err(TemplateError::NotFound {
                name: name.to_string(),
                root: self.root.clone(),
            })
        }
    }

    fn require_raw_content(&self, name: &str) -> Result<(), TemplateError> {
        let path = self.root.join(name);
        let source = fs::read_to_string(&path).map_err(|e| TemplateError::Parse {
            root: self.root.clone(),
            message: format!("{}: {e}", path.display()),
        })?;
        match escaped_content(&source) {
            Some(expr) => Err(TemplateError::EscapedContent {
                template: name.to_string(),
                expr: expr.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Register an HTML entry body as the template `fragments/<slug>.html`.
    pub fn add_fragment(&mut self, slug: &str, source: &str) -> Result<(), TemplateError> {
        let name = fragment_name(slug);
        self.tera
            .add_raw_template(&name, source)
            .map_err(|e| TemplateError::Fragment {
                name,
                message: error_chain(&e),
            })
    }

    /// Render one template against a context.
    pub fn render(&self, template: &str, context: &Context) -> Result<String, TemplateError> {
        self.tera
            .render(template, context)
            .map_err(|e| TemplateError::Render {
                template: template.to_string(),
                message: error_chain(&e),
            })
    }

    /// Execute a registered HTML fragment with `entry` and `site` in scope.
    pub fn render_fragment(&self, ctx: &RenderContext) -> Result<String, TemplateError> {
        let mut context = Context::new();
        context.insert("entry", ctx.entry);
        context.insert("site", &ctx.site);
        self.render(&fragment_name(&ctx.entry.slug), &context)
    }

    /// Entry template, then layout.
    pub fn render_entry_page(
        &self,
        ctx: &RenderContext,
        content: &str,
    ) -> Result<String, TemplateError> {
        let mut context = Context::new();
        context.insert("entry", ctx.entry);
        context.insert("site", &ctx.site);
        context.insert("Title", ctx.title());
        context.insert("Description", ctx.description());
        context.insert("Content", content);
        let body = self.render(&self.names.entry, &context)?;

        self.render_layout(ctx.title(), ctx.description(), &body, &ctx.site)
    }

    /// Index template, then layout.
    pub fn render_index_page(&self, site: &SiteConfig) -> Result<String, TemplateError> {
        let view = SiteView::from(site);
        let mut context = Context::new();
        context.insert("site", &view);
        context.insert("entries", &site.entries);
        context.insert("groups", &site.groups);
        context.insert("Title", &site.title);
        context.insert("Description", &site.description);
        let body = self.render(&self.names.index, &context)?;

        self.render_layout(&site.title, &site.description, &body, &view)
    }

    fn render_layout(
        &self,
        title: &str,
        description: &str,
        content: &str,
        site: &SiteView,
    ) -> Result<String, TemplateError> {
        let mut context = Context::new();
        context.insert("Title", title);
        context.insert("Description", description);
        context.insert("Content", content);
        context.insert("site", site);
        self.render(&self.names.layout, &context)
    }
}

/// First `{{ ... }}` expression that prints `Content` without a `safe` filter.
fn escaped_content(source: &str) -> Option<&str> {
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after.find("}}")?;
        let expr = after[..end].trim_matches(|c: char| c == '-' || c.is_whitespace());
        let mut parts = expr.split('|');
        let value = parts.next().unwrap_or_default();
        let names_content = value
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .any(|token| token == "Content");
        if names_content && !parts.any(|filter| filter.trim() == "safe") {
            return Some(expr);
        }
        rest = &after[end + 2..];
    }
    None
}

pub fn fragment_name(slug: &str) -> String {
    format!("{FRAGMENT_PREFIX}/{slug}.html")
}

/// Convert markdown to an HTML fragment.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new(markdown);
    let mut html = String::new();
    md_html::push_html(&mut html, parser);
    html
}

/// Flatten an error and its sources into one message, one cause per line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(err) = source {
        chain.push(err.to_string());
        source = err.source();
    }
    chain.join("\n  caused by: ")
}

// ============================================================================
// Stock helpers
// ============================================================================

fn join_tags(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let sep = args.get("sep").and_then(Value::as_str).unwrap_or(", ");
    let tags = value
        .as_array()
        .ok_or_else(|| tera::Error::msg("join_tags expects a list"))?;
    let parts = tags
        .iter()
        .map(|tag| match tag {
            Value::String(s) => Ok(s.clone()),
            other => Err(tera::Error::msg(format!(
                "join_tags expects strings, got {other}"
            ))),
        })
        .collect::<tera::Result<Vec<_>>>()?;
    Ok(Value::String(parts.join(sep)))
}

fn format_date(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let format = args
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("%-d %B %Y");
    let date = date_value(value, "format_date")?;
    let mut out = String::new();
    write!(out, "{}", date.format(format))
        .map_err(|_| tera::Error::msg(format!("format_date: invalid format '{format}'")))?;
    Ok(Value::String(out))
}

fn year(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::from(date_value(value, "year")?.year()))
}

fn date_value(value: &Value, filter: &str) -> tera::Result<NaiveDate> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("{filter} expects a YYYY-MM-DD string")))?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| tera::Error::msg(format!("{filter}: '{text}' is not a date: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{entry, setup_fixtures, site};
    use std::fs;
    use tempfile::TempDir;

    fn names() -> TemplateNames {
        TemplateNames::from(&TemplatesConfig::default())
    }

    /// A templates dir with a minimal layout/index/entry set.
    fn templates(layout: &str, index: &str, entry: &str) -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("layout.html"), layout).unwrap();
        fs::write(tmp.path().join("index.html"), index).unwrap();
        fs::write(tmp.path().join("entry.html"), entry).unwrap();
        tmp
    }

    fn renderer(dir: &TempDir) -> Renderer {
        Renderer::new(dir.path(), names(), &Helpers::stock()).unwrap()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = Renderer::new(&tmp.path().join("nope"), names(), &Helpers::new());
        assert!(matches!(result, Err(TemplateError::MissingRoot(_))));
    }

    #[test]
    fn missing_named_template_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("layout.html"), "{{ Content | safe }}").unwrap();
        fs::write(tmp.path().join("index.html"), "").unwrap();

        match Renderer::new(tmp.path(), names(), &Helpers::new()) {
            Err(TemplateError::NotFound { name, .. }) => assert_eq!(name, "entry.html"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn parse_error_is_reported_at_construction() {
        let dir = templates("{{ Content | safe }}", "{% for x in %}", "");
        let result = Renderer::new(dir.path(), names(), &Helpers::new());
        assert!(matches!(result, Err(TemplateError::Parse { .. })));
    }

    #[test]
    fn layout_printing_escaped_content_is_rejected() {
        let dir = templates("<main>{{ Content }}</main>", "", "{{ Content | safe }}");
        match Renderer::new(dir.path(), names(), &Helpers::new()) {
            Err(TemplateError::EscapedContent { template, expr }) => {
                assert_eq!(template, "layout.html");
                assert_eq!(expr, "Content");
            }
            other => panic!("expected EscapedContent, got {other:?}"),
        }
    }

    #[test]
    fn entry_printing_escaped_content_is_rejected() {
        let dir = templates("{{ Content | safe }}", "", "{{- Content | trim -}}");
        assert!(matches!(
            Renderer::new(dir.path(), names(), &Helpers::new()),
            Err(TemplateError::EscapedContent { template, .. }) if template == "entry.html"
        ));
    }

    #[test]
    fn escaped_content_scan() {
        assert_eq!(escaped_content("{{ Content }}"), Some("Content"));
        assert_eq!(escaped_content("{{Content|upper}}"), Some("Content|upper"));
        assert_eq!(escaped_content("{{ Content | safe }}"), None);
        assert_eq!(escaped_content("{{- Content | trim | safe -}}"), None);
        assert_eq!(escaped_content("{{ ContentType }} {{ Title }}"), None);
        assert_eq!(escaped_content("no tags at all"), None);
    }

    #[test]
    fn fixtures_templates_load() {
        let tmp = setup_fixtures();
        let r = Renderer::new(&tmp.path().join("templates"), names(), &Helpers::stock()).unwrap();
        assert_eq!(r.names().layout, "layout.html");
    }

    // =========================================================================
    // Composition
    // =========================================================================

    #[test]
    fn layout_inserts_content_unescaped_and_title_escaped() {
        let dir = templates(
            "<title>{{ Title }}</title><main>{{ Content | safe }}</main>",
            "",
            "<article>{{ Content | safe }}</article>",
        );
        let r = renderer(&dir);

        let mut e = entry("a", "2021-01-01");
        e.title = "Tom & Jerry".to_string();
        let s = site("S", "D", vec![]);
        let ctx = RenderContext::new(&e, &s);

        let html = r.render_entry_page(&ctx, "<p>Body</p>").unwrap();
        assert!(html.contains("<title>Tom &amp; Jerry</title>"));
        assert!(html.contains("<main><article><p>Body</p></article></main>"));
    }

    #[test]
    fn entry_description_falls_back_to_site() {
        let dir = templates(
            "<meta content=\"{{ Description }}\">",
            "",
            "{{ Content | safe }}",
        );
        let r = renderer(&dir);
        let s = site("S", "Site description", vec![]);

        let plain = entry("a", "2021-01-01");
        let html = r
            .render_entry_page(&RenderContext::new(&plain, &s), "")
            .unwrap();
        assert!(html.contains("Site description"));

        let mut described = entry("b", "2021-01-01");
        described.description = Some("Own description".to_string());
        let html = r
            .render_entry_page(&RenderContext::new(&described, &s), "")
            .unwrap();
        assert!(html.contains("Own description"));
    }

    #[test]
    fn entry_template_sees_entry_fields() {
        let dir = templates(
            "{{ Content | safe }}",
            "",
            "{{ entry.slug }}|{{ entry.date }}|{{ site.title }}",
        );
        let r = renderer(&dir);
        let e = entry("my-talk", "2023-05-01");
        let s = site("Talks", "", vec![]);

        let html = r.render_entry_page(&RenderContext::new(&e, &s), "").unwrap();
        assert_eq!(html, "my-talk|2023-05-01|Talks");
    }

    #[test]
    fn index_template_iterates_groups() {
        let dir = templates(
            "<h1>{{ Title }}</h1>{{ Content | safe }}",
            "{% for g in groups %}[{{ g.year }}:{% for e in g.entries %}{{ e.slug }}{% endfor %}]{% endfor %}",
            "",
        );
        let r = renderer(&dir);
        let mut s = site("S", "D", vec![entry("a", "2022-01-01"), entry("b", "2023-01-01")]);
        s.groups = crate::group::group_by_year(&s.entries, Default::default());

        let html = r.render_index_page(&s).unwrap();
        assert_eq!(html, "<h1>S</h1>[2023:b][2022:a]");
    }

    #[test]
    fn missing_variable_is_render_error() {
        let dir = templates("{{ Content | safe }}", "{{ nonexistent }}", "");
        let r = renderer(&dir);

        match r.render_index_page(&site("S", "D", vec![])) {
            Err(TemplateError::Render { template, message }) => {
                assert_eq!(template, "index.html");
                assert!(message.contains("nonexistent"), "message: {message}");
            }
            other => panic!("expected Render error, got {other:?}"),
        }
    }

    #[test]
    fn partials_resolve_by_relative_name() {
        let dir = templates("{{ Content | safe }}", "{% include \"partials/hello.html\" %}", "");
        fs::create_dir_all(dir.path().join("partials")).unwrap();
        fs::write(dir.path().join("partials/hello.html"), "hi {{ site.title }}").unwrap();
        let r = renderer(&dir);

        let html = r.render_index_page(&site("S", "", vec![])).unwrap();
        assert_eq!(html, "hi S");
    }

    // =========================================================================
    // Fragments
    // =========================================================================

    #[test]
    fn fragment_renders_with_entry_in_scope() {
        let dir = templates("{{ Content | safe }}", "", "");
        let mut r = renderer(&dir);
        r.add_fragment("workshop", "<p>{{ entry.title }} @ {{ site.title }}</p>")
            .unwrap();

        let mut e = entry("workshop", "2022-10-10");
        e.title = "Workshop".to_string();
        let s = site("S", "", vec![]);

        let html = r.render_fragment(&RenderContext::new(&e, &s)).unwrap();
        assert_eq!(html, "<p>Workshop @ S</p>");
    }

    #[test]
    fn invalid_fragment_is_rejected() {
        let dir = templates("{{ Content | safe }}", "", "");
        let mut r = renderer(&dir);
        let result = r.add_fragment("broken", "{% if %}");
        assert!(matches!(result, Err(TemplateError::Fragment { .. })));
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn stock_filters() {
        let dir = templates(
            "{{ Content | safe }}",
            "",
            "{{ entry.tags | join_tags }}/{{ entry.tags | join_tags(sep=\"+\") }}/{{ entry.date | format_date }}/{{ entry.date | format_date(format=\"%Y\") }}/{{ entry.date | year }}",
        );
        let r = renderer(&dir);
        let mut e = entry("a", "2023-05-01");
        e.tags = vec!["talk".to_string(), "keynote".to_string()];
        let s = site("S", "", vec![]);

        let html = r.render_entry_page(&RenderContext::new(&e, &s), "").unwrap();
        assert_eq!(html, "talk, keynote/talk+keynote/1 May 2023/2023/2023");
    }

    #[test]
    fn custom_helpers_are_registered() {
        let dir = templates("{{ Content | safe }}", "{{ shout(word=\"hi\") }}{{ site.title | twice }}", "");
        let helpers = Helpers::new()
            .with_function("shout", |args| {
                let word = args.get("word").and_then(Value::as_str).unwrap_or_default();
                Ok(Value::String(word.to_uppercase()))
            })
            .with_filter("twice", |value, _| {
                let s = value.as_str().unwrap_or_default();
                Ok(Value::String(format!("{s}{s}")))
            });
        let r = Renderer::new(dir.path(), names(), &helpers).unwrap();

        let html = r.render_index_page(&site("ab", "", vec![])).unwrap();
        assert_eq!(html, "HIabab");
    }

    #[test]
    fn format_date_rejects_non_dates() {
        let err = format_date(&Value::from("yesterday"), &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn markdown_keeps_raw_html() {
        let html = markdown_to_html("# Hi\n\n<div class=\"x\">raw</div>\n");
        assert!(html.contains("<h1>Hi</h1>"));
        assert!(html.contains("<div class=\"x\">raw</div>"));
    }
}
