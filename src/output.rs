//! CLI output formatting for the build and check commands.
//!
//! # Information-First Display
//!
//! Entries are shown by their semantic identity (positional index, title,
//! date) with source paths as indented `Source:` context lines, so the check
//! output reads as a content inventory.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Conference Talks
//!     Conference talks and workshops
//!
//! 2023
//! 001 My Talk (1 May 2023)
//!     Source: data/2023-05-01-my-talk.md
//!     Tags: talk
//!
//! 3 entries in 2 years
//! ```
//!
//! ## Build
//!
//! ```text
//! ==> Loading content
//! Loaded 3 entries (2 years) from data
//! ==> Rendering entries
//!     ✓ build/index.html
//!     ✓ build/e/my-talk.html
//! ==> Copying static files
//!     2 files, 0 symlinks, 1 dirs
//! Site built in 12.31ms
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! do no I/O.

use crate::pipeline::{BuildEvent, Stage};
use crate::types::{Entry, SiteConfig};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_desc(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Entry header: index, title, human date.
///
/// ```text
/// 001 My Talk (1 May 2023)
/// ```
fn entry_header(index: usize, entry: &Entry) -> String {
    format!(
        "{} {} ({})",
        format_index(index),
        entry.title,
        entry.date.format("%-d %B %Y")
    )
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Check output
// ============================================================================

/// Format the loaded site as a year-grouped inventory.
pub fn format_check_output(site: &SiteConfig) -> Vec<String> {
    let mut lines = Vec::new();

    let title = if site.title.is_empty() {
        "(untitled site)"
    } else {
        site.title.as_str()
    };
    lines.push(title.to_string());
    if !site.description.is_empty() {
        lines.push(format!("{}{}", indent(1), truncate_desc(&site.description, 60)));
    }
    for social in &site.socials {
        lines.push(format!("{}{} → {}", indent(1), social.label, social.href));
    }

    let mut position = 0;
    for group in &site.groups {
        lines.push(String::new());
        lines.push(group.year.to_string());
        for entry in &group.entries {
            position += 1;
            lines.push(entry_header(position, entry));
            lines.push(format!(
                "{}Source: {}",
                indent(1),
                entry.source_path.display()
            ));
            if !entry.tags.is_empty() {
                lines.push(format!("{}Tags: {}", indent(1), entry.tags.join(", ")));
            }
            if let Some(venue) = &entry.venue {
                lines.push(format!("{}Venue: {venue}", indent(1)));
            }
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "{} in {}",
        plural(site.entries.len(), "entry", "entries"),
        plural(site.groups.len(), "year", "years")
    ));
    lines
}

pub fn print_check_output(site: &SiteConfig) {
    for line in format_check_output(site) {
        println!("{}", line);
    }
}

// ============================================================================
// Build output
// ============================================================================

/// Format a single build progress event as display lines.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::StageStarted(Stage::Init | Stage::RenderIndex | Stage::Done) => Vec::new(),
        BuildEvent::StageStarted(stage) => vec![format!("==> {stage}")],
        BuildEvent::Loaded {
            source,
            entries,
            years,
        } => vec![format!(
            "Loaded {} ({}) from {}",
            plural(*entries, "entry", "entries"),
            plural(*years, "year", "years"),
            source.display()
        )],
        BuildEvent::EntryWritten { path, .. } | BuildEvent::IndexWritten { path } => {
            vec![format!("{}✓ {}", indent(1), path.display())]
        }
        BuildEvent::StaticCopied { report, .. } => {
            let mut lines = vec![format!(
                "{}{} files, {} symlinks, {} dirs",
                indent(1),
                report.files,
                report.symlinks,
                report.dirs
            )];
            for warning in &report.warnings {
                lines.push(format!("{}warning: {warning}", indent(1)));
            }
            lines
        }
        BuildEvent::Finished { elapsed, .. } => vec![format!("Site built in {elapsed:.2?}")],
    }
}

pub fn print_build_event(event: &BuildEvent) {
    for line in format_build_event(event) {
        println!("{}", line);
    }
}
