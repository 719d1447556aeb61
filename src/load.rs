//! Content loading: manifests and content directories.
//!
//! Stage 1 of the build. Produces the [`SiteConfig`] every later stage reads.
//!
//! ## Manifest mode
//!
//! A JSON or YAML manifest lists the site metadata and its entries:
//!
//! ```json
//! {
//!   "title": "Talks",
//!   "description": "Conference talks and workshops",
//!   "socials": [{"href": "https://github.com/someone", "label": "GitHub"}],
//!   "events": [
//!     {"title": "My Talk", "type": ["talk"], "venue": "RustConf", "filepath": "2023-05-01-my-talk.md"}
//!   ]
//! }
//! ```
//!
//! `filepath` is relative to the manifest. Date and slug come from its
//! basename (see [`crate::naming`]) unless the entry sets `date`/`slug`.
//!
//! ## Directory mode
//!
//! Without a manifest the directory is walked for content:
//!
//! ```text
//! data/
//! ├── site.yaml                       # {title, description, socials} (optional)
//! ├── 2023-05-01-my-talk.md           # Markdown entry
//! ├── 2023-05-01-my-talk.yaml         # Sidecar metadata (optional)
//! └── 2022-10-10-workshop.page/       # Page directory
//!     ├── workshop.yaml               # {title, slug, date, kind}
//!     └── workshop.html               # HTML fragment (or workshop.md)
//! ```
//!
//! ## Validation
//!
//! Loading is all-or-nothing. Any malformed document, unparseable date,
//! missing content file or duplicate slug fails the whole load.

use crate::naming::{self, NameError};
use crate::types::{ContentKind, Entry, SiteConfig, Social};
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("content source not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unsupported manifest format: {} (expected .json, .yaml or .yml)", .0.display())]
    UnsupportedManifest(PathBuf),
    #[error("unsupported content file: {} (expected .md or .html)", .0.display())]
    UnsupportedContent(PathBuf),
    #[error("{}: {source}", .path.display())]
    BadName {
        path: PathBuf,
        #[source]
        source: NameError,
    },
    #[error("content file not found: {}", .0.display())]
    MissingContent(PathBuf),
    #[error("duplicate slug '{slug}' in {} and {}", .first.display(), .second.display())]
    DuplicateSlug {
        slug: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Manifest file names tried, in order, when the source is a directory.
const MANIFEST_NAMES: &[&str] = &["index.json", "index.yaml", "index.yml"];

/// Site metadata file names looked up in directory mode.
const SITE_META_NAMES: &[&str] = &["site.yaml", "site.yml", "site.json"];

const PAGE_DIR_SUFFIX: &str = ".page";

#[derive(Debug, Deserialize)]
struct Manifest {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    socials: Vec<Social>,
    #[serde(default, alias = "entries")]
    events: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    title: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default, rename = "type")]
    tags: Option<Tags>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(alias = "path")]
    filepath: PathBuf,
}

/// `type: talk` and `type: [talk, keynote]` are both accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Tags {
    One(String),
    Many(Vec<String>),
}

impl Tags {
    fn into_vec(self) -> Vec<String> {
        match self {
            Tags::One(tag) => vec![tag],
            Tags::Many(tags) => tags,
        }
    }
}

/// Site-wide metadata for directory mode (`site.yaml`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SiteMeta {
    title: String,
    description: String,
    socials: Vec<Social>,
}

/// Per-entry metadata: a `.page` directory's YAML or a markdown sidecar.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageMeta {
    title: Option<String>,
    slug: Option<String>,
    date: Option<String>,
    kind: Option<String>,
    venue: Option<String>,
    description: Option<String>,
}

/// Load a site from a manifest file or a content directory.
pub fn load(source: &Path) -> Result<SiteConfig, LoadError> {
    if source.is_file() {
        return load_manifest(source);
    }
    if !source.is_dir() {
        return Err(LoadError::SourceNotFound(source.to_path_buf()));
    }
    match MANIFEST_NAMES
        .iter()
        .map(|name| source.join(name))
        .find(|path| path.is_file())
    {
        Some(manifest) => load_manifest(&manifest),
        None => scan_directory(source),
    }
}

fn load_manifest(path: &Path) -> Result<SiteConfig, LoadError> {
    let manifest: Manifest = read_document(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    let entries = manifest
        .events
        .into_iter()
        .map(|item| manifest_entry(item, base))
        .collect::<Result<Vec<_>, _>>()?;
    check_unique_slugs(&entries)?;

    Ok(SiteConfig {
        title: manifest.title,
        description: manifest.description,
        socials: manifest.socials,
        entries,
        groups: Vec::new(),
    })
}

fn manifest_entry(item: ManifestEntry, base: &Path) -> Result<Entry, LoadError> {
    let source_path = base.join(&item.filepath);
    if !source_path.is_file() {
        return Err(LoadError::MissingContent(source_path));
    }
    let kind = content_kind(&source_path)?;
    let basename = file_name(&source_path);
    let (date, slug) = resolve_identity(
        &basename,
        item.date.as_deref(),
        item.slug.as_deref(),
        &source_path,
    )?;

    Ok(Entry {
        title: item.title,
        date,
        slug,
        tags: item.tags.map(Tags::into_vec).unwrap_or_default(),
        venue: item.venue,
        description: item.description,
        kind,
        source_path,
        rendered: OnceLock::new(),
    })
}

/// Decide an entry's date and slug.
///
/// Explicit values win over the filename. The filename must follow the
/// dated-name grammar unless both values are given explicitly.
fn resolve_identity(
    basename: &str,
    date: Option<&str>,
    slug: Option<&str>,
    path: &Path,
) -> Result<(NaiveDate, String), LoadError> {
    let bad_name = |source| LoadError::BadName {
        path: path.to_path_buf(),
        source,
    };
    let explicit_date = date.map(naming::parse_date).transpose().map_err(bad_name)?;
    if let Some(slug) = slug {
        naming::validate_slug(slug).map_err(bad_name)?;
    }

    match (explicit_date, slug) {
        (Some(date), Some(slug)) => Ok((date, slug.to_string())),
        (date, slug) => {
            let parsed = naming::parse_dated_name(basename).map_err(bad_name)?;
            Ok((
                date.unwrap_or(parsed.date),
                slug.map(str::to_string).unwrap_or(parsed.slug),
            ))
        }
    }
}

fn scan_directory(root: &Path) -> Result<SiteConfig, LoadError> {
    let meta = match SITE_META_NAMES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
    {
        Some(path) => read_document::<SiteMeta>(&path)?,
        None => SiteMeta::default(),
    };

    let mut entries = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    while let Some(item) = walker.next() {
        let item = item?;
        let path = item.path();
        let name = item.file_name().to_string_lossy();

        if item.file_type().is_dir() {
            if name.ends_with(PAGE_DIR_SUFFIX) {
                walker.skip_current_dir();
                entries.push(page_directory_entry(path)?);
            }
        } else if is_markdown(path) {
            entries.push(markdown_entry(path)?);
        }
    }
    check_unique_slugs(&entries)?;

    Ok(SiteConfig {
        title: meta.title,
        description: meta.description,
        socials: meta.socials,
        entries,
        groups: Vec::new(),
    })
}

/// A `YYYY-MM-DD-name.page/` directory with `name.yaml` and `name.html` (or `name.md`).
fn page_directory_entry(dir: &Path) -> Result<Entry, LoadError> {
    let dir_name = file_name(dir);
    let parsed = naming::parse_dated_name(&dir_name).map_err(|source| LoadError::BadName {
        path: dir.to_path_buf(),
        source,
    })?;

    let meta_path = dir.join(format!("{}.yaml", parsed.slug));
    if !meta_path.is_file() {
        return Err(LoadError::MissingContent(meta_path));
    }
    let meta: PageMeta = read_document(&meta_path)?;

    let source_path = ["html", "md"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", parsed.slug, ext)))
        .find(|p| p.is_file())
        .ok_or_else(|| LoadError::MissingContent(dir.join(format!("{}.html", parsed.slug))))?;
    let kind = content_kind(&source_path)?;

    entry_from_meta(meta, &dir_name, dir, kind, source_path, None)
}

/// A `YYYY-MM-DD-slug.md` file with an optional `YYYY-MM-DD-slug.yaml` sidecar.
fn markdown_entry(path: &Path) -> Result<Entry, LoadError> {
    let meta = match ["yaml", "yml"]
        .iter()
        .map(|ext| path.with_extension(ext))
        .find(|p| p.is_file())
    {
        Some(sidecar) => read_document::<PageMeta>(&sidecar)?,
        None => PageMeta::default(),
    };
    let heading = if meta.title.is_none() {
        first_heading(&read_to_string(path)?)
    } else {
        None
    };

    entry_from_meta(
        meta,
        &file_name(path),
        path,
        ContentKind::Markdown,
        path.to_path_buf(),
        heading,
    )
}

fn entry_from_meta(
    meta: PageMeta,
    basename: &str,
    origin: &Path,
    kind: ContentKind,
    source_path: PathBuf,
    heading: Option<String>,
) -> Result<Entry, LoadError> {
    let (date, slug) = resolve_identity(basename, meta.date.as_deref(), meta.slug.as_deref(), origin)?;
    let title = meta
        .title
        .or(heading)
        .unwrap_or_else(|| naming::display_title(&slug));

    Ok(Entry {
        title,
        date,
        slug,
        tags: meta.kind.into_iter().collect(),
        venue: meta.venue,
        description: meta.description,
        kind,
        source_path,
        rendered: OnceLock::new(),
    })
}

fn check_unique_slugs(entries: &[Entry]) -> Result<(), LoadError> {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for entry in entries {
        if let Some(first) = seen.insert(entry.slug.as_str(), entry.source_path.as_path()) {
            return Err(LoadError::DuplicateSlug {
                slug: entry.slug.clone(),
                first: first.to_path_buf(),
                second: entry.source_path.clone(),
            });
        }
    }
    Ok(())
}

/// Deserialize a JSON or YAML document, chosen by extension.
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "json" => {
            let content = read_to_string(path)?;
            serde_json::from_str(&content).map_err(|source| LoadError::Json {
                path: path.to_path_buf(),
                source,
            })
        }
        "yaml" | "yml" => {
            let content = read_to_string(path)?;
            serde_yaml::from_str(&content).map_err(|source| LoadError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        }
        _ => Err(LoadError::UnsupportedManifest(path.to_path_buf())),
    }
}

fn read_to_string(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn content_kind(path: &Path) -> Result<ContentKind, LoadError> {
    path.extension()
        .and_then(|e| ContentKind::from_extension(&e.to_string_lossy()))
        .ok_or_else(|| LoadError::UnsupportedContent(path.to_path_buf()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| ContentKind::from_extension(&e.to_string_lossy()))
        == Some(ContentKind::Markdown)
}

/// Title from the first `# heading` line of a markdown document.
fn first_heading(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches("# ").trim().to_string())
        .filter(|title| !title.is_empty())
}
