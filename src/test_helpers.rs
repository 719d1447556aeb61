//! Shared test utilities for the almanac test suite.
//!
//! Provides fixture setup, entry builders, and lookup helpers that work with
//! load-phase data structures (`SiteConfig`, `Entry`).
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let site = load(&tmp.path().join("data")).unwrap();
//!
//! let talk = find_entry(&site, "my-talk");
//! assert_eq!(talk.title, "My Talk");
//! ```

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

use crate::types::{ContentKind, Entry, SiteConfig};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// The copy holds `data/`, `templates/` and `static/`. Tests get an isolated
/// copy they can mutate without affecting other tests or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

// =========================================================================
// Builders
// =========================================================================

/// A markdown entry titled after its slug, dated `YYYY-MM-DD`.
pub fn entry(slug: &str, date: &str) -> Entry {
    Entry {
        title: slug.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        slug: slug.to_string(),
        tags: Vec::new(),
        venue: None,
        description: None,
        kind: ContentKind::Markdown,
        source_path: PathBuf::from(format!("{date}-{slug}.md")),
        rendered: OnceLock::new(),
    }
}

/// A site with the given entries and no groups.
pub fn site(title: &str, description: &str, entries: Vec<Entry>) -> SiteConfig {
    SiteConfig {
        title: title.to_string(),
        description: description.to_string(),
        socials: Vec::new(),
        entries,
        groups: Vec::new(),
    }
}

// =========================================================================
// Lookups (panic with a clear message on miss)
// =========================================================================

/// Find an entry by slug. Panics if not found.
pub fn find_entry<'a>(site: &'a SiteConfig, slug: &str) -> &'a Entry {
    site.entries
        .iter()
        .find(|e| e.slug == slug)
        .unwrap_or_else(|| {
            let slugs = entry_slugs(site);
            panic!("entry '{slug}' not found. Available: {slugs:?}")
        })
}

/// All entry slugs in load order.
pub fn entry_slugs(site: &SiteConfig) -> Vec<&str> {
    site.entries.iter().map(|e| e.slug.as_str()).collect()
}

/// Group years in display order.
pub fn group_years(site: &SiteConfig) -> Vec<i32> {
    site.groups.iter().map(|g| g.year).collect()
}
