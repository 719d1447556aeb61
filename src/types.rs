//! Shared types passed between pipeline stages.
//!
//! The loader produces a [`SiteConfig`], the grouper derives its
//! [`YearGroup`]s, and the renderer serializes both into template contexts.
//! Field names here are the names templates see.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;

/// How an entry's source file becomes an HTML fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Markdown converted with pulldown-cmark; raw HTML passes through.
    Markdown,
    /// HTML fragment executed as a template against the entry.
    Html,
}

impl ContentKind {
    /// Classify a source file by extension. `None` for anything else.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }
}

/// One content item: a talk, an event, a post.
///
/// The slug is derived once by the loader and is the identity of the entry's
/// output file (`e/{slug}.html`). `rendered` is filled exactly once, by the
/// render task that owns the entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub title: String,
    pub date: NaiveDate,
    pub slug: String,
    /// Tags from the manifest `type` field or the page `kind`.
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: ContentKind,
    #[serde(skip)]
    pub source_path: PathBuf,
    #[serde(skip)]
    pub rendered: OnceLock<String>,
}

impl Entry {
    /// Calendar year used as the grouping key.
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// The rendered HTML fragment, once the entry's render task has run.
    pub fn rendered_content(&self) -> Option<&str> {
        self.rendered.get().map(String::as_str)
    }
}

/// Entries sharing a calendar year, in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearGroup {
    pub year: i32,
    pub entries: Vec<Entry>,
}

/// A link shown in the site chrome (`{href, label}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Social {
    pub href: String,
    pub label: String,
}

/// Everything one build run knows about the site.
///
/// Built once by [`crate::load::load`]; only `groups` is filled in afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    pub socials: Vec<Social>,
    pub entries: Vec<Entry>,
    pub groups: Vec<YearGroup>,
}
