//! # Almanac
//!
//! A minimal static site generator for dated content: talks, events, notes.
//! Entries come from a JSON/YAML manifest or a content directory, each one is
//! rendered through an entry template wrapped in a shared layout, and the
//! index lists them grouped by year.
//!
//! # Architecture: One Pipeline, Three Stages
//!
//! ```text
//! 1. Load     data/        →  SiteConfig         (manifest or directory scan, year groups)
//! 2. Render   SiteConfig   →  build/**/*.html    (tera templates, minified, in parallel)
//! 3. Copy     static/      →  build/             (verbatim mirror, symlinks kept)
//! ```
//!
//! Everything that can fail on bad input (names, dates, template syntax) fails in
//! stage 1, before the output directory is touched.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`load`] | Stage 1: reads a manifest or scans a content directory into a [`types::SiteConfig`] |
//! | [`naming`] | `YYYY-MM-DD-slug` filename grammar shared by every entry source |
//! | [`group`] | Year buckets for the index page |
//! | [`render`] | Stage 2: tera renderer, two-level composition, helper registry |
//! | [`minify`] | HTML minification of every written page |
//! | [`write`] | Atomic page writes and the static tree copy |
//! | [`pipeline`] | Stage orchestration, render fan-out, abort handling, progress events |
//! | [`config`] | `almanac.toml` loading, validation, and merging over stock defaults |
//! | [`types`] | Shared types passed between stages (`Entry`, `YearGroup`, `SiteConfig`) |
//! | [`output`] | CLI output formatting for build progress and content checks |
//!
//! # Design Decisions
//!
//! ## Templates On Disk
//!
//! Pages are rendered with [Tera](https://keats.github.io/tera/) from a
//! templates directory so a site can change its markup without rebuilding the
//! binary. Every file under the directory is loaded, which makes partials
//! (`{% include "partials/socials.html" %}`) work without registration.
//!
//! ## Fail Fast
//!
//! A malformed date, an unknown template variable, or a missing content file
//! stops the build with an error. Nothing is skipped with a warning; the only
//! non-fatal problems are static-file metadata (mode, ownership) that the
//! platform cannot reproduce.
//!
//! ## Fan-Out Per Entry
//!
//! Entry pages are independent: their output path is a pure function of the
//! slug and slugs are unique. They render on a dedicated rayon pool sized to
//! the site, joined before the static copy starts.

pub mod config;
pub mod group;
pub mod load;
pub mod minify;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod render;
pub mod types;
pub mod write;

#[cfg(test)]
pub(crate) mod test_helpers;
