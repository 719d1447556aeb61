//! Output minification.
//!
//! Every page is minified exactly once, after layout composition and before
//! it is written. HTML goes through `minify_html` with embedded `<style>` and
//! `<script>` minified and closing, `<html>` and `<head>` tags kept.

use crate::config::MinifyConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MinifyError {
    #[error("cannot minify {kind:?} output: {source}")]
    Malformed {
        kind: ContentType,
        #[source]
        source: std::str::Utf8Error,
    },
}

/// Kind of document being minified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// HTML with embedded CSS and JS.
    Html,
}

/// Shared, immutable minifier. Safe to use from every render worker.
pub struct Minifier {
    cfg: minify_html::Cfg,
    enabled: bool,
}

impl Minifier {
    pub fn new(enabled: bool) -> Self {
        let mut cfg = minify_html::Cfg::new();
        cfg.keep_closing_tags = true;
        cfg.keep_html_and_head_opening_tags = true;
        cfg.keep_comments = false;
        cfg.minify_css = true;
        cfg.minify_js = true;
        cfg.remove_bangs = true;
        cfg.remove_processing_instructions = true;
        Self { cfg, enabled }
    }

    pub fn from_config(config: &MinifyConfig) -> Self {
        Self::new(config.enabled)
    }

    /// Minify one document. Disabled minifiers return the input unchanged.
    pub fn minify(&self, kind: ContentType, input: &[u8]) -> Result<Vec<u8>, MinifyError> {
        std::str::from_utf8(input).map_err(|source| MinifyError::Malformed { kind, source })?;
        if !self.enabled {
            return Ok(input.to_vec());
        }
        match kind {
            ContentType::Html => Ok(minify_html::minify(input, &self.cfg)),
        }
    }
}

impl std::fmt::Debug for Minifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Minifier")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
