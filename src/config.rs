//! Build configuration module.
//!
//! Handles loading and validating `almanac.toml`. Every section and key has a
//! default, so the file is deserialized directly and then validated. CLI flags
//! are applied last, by `main`, and the result is validated again when the
//! build starts.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! clean = true                # Remove the output directory before building
//!
//! [paths]
//! data = "data"               # Manifest file or content directory
//! static_dir = "static"       # Copied verbatim into the output
//! output = "build"
//! templates = "templates"
//! entries_dir = "e"           # Entry pages land in <output>/<entries_dir>/<slug>.html
//!
//! [templates]
//! layout = "layout.html"      # Names relative to the templates directory
//! index = "index.html"
//! entry = "entry.html"
//!
//! [index]
//! order = "source"            # source | newest-first | oldest-first
//!
//! [minify]
//! enabled = true
//!
//! [processing]
//! max_workers = 8             # Omit for auto (entries, up to 4x CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::group::EntryOrder;
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "almanac.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Build configuration loaded from `almanac.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Remove the output directory before writing.
    pub clean: bool,
    pub paths: PathsConfig,
    pub templates: TemplatesConfig,
    pub index: IndexConfig,
    pub minify: MinifyConfig,
    pub processing: ProcessingConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            clean: true,
            paths: PathsConfig::default(),
            templates: TemplatesConfig::default(),
            index: IndexConfig::default(),
            minify: MinifyConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let paths = [
            ("paths.data", &self.paths.data),
            ("paths.static_dir", &self.paths.static_dir),
            ("paths.output", &self.paths.output),
            ("paths.templates", &self.paths.templates),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        self.paths.check_output_root()?;

        let mut components = Path::new(&self.paths.entries_dir).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal {
            return Err(ConfigError::Validation(format!(
                "paths.entries_dir must be a single directory name, got '{}'",
                self.paths.entries_dir
            )));
        }

        let names = [
            ("templates.layout", &self.templates.layout),
            ("templates.index", &self.templates.index),
            ("templates.entry", &self.templates.entry),
        ];
        for (key, name) in names {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }

        if self.processing.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Manifest file, or a directory holding `index.json`/`index.yaml` or content.
    pub data: PathBuf,
    /// Static asset tree mirrored into the output root.
    pub static_dir: PathBuf,
    pub output: PathBuf,
    pub templates: PathBuf,
    /// Subdirectory of the output root holding entry pages.
    pub entries_dir: String,
}

impl PathsConfig {
    /// The output root is removed by a clean build, so it must not be, or
    /// contain, any of the input roots.
    fn check_output_root(&self) -> Result<(), ConfigError> {
        let output = resolve_path(&self.output);
        let inputs = [
            ("paths.data", &self.data),
            ("paths.static_dir", &self.static_dir),
            ("paths.templates", &self.templates),
        ];
        for (key, path) in inputs {
            if resolve_path(path).starts_with(&output) {
                return Err(ConfigError::Validation(format!(
                    "paths.output '{}' contains {key} '{}'",
                    self.output.display(),
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Absolute, `.`/`..`-free form of `path`, with the longest existing prefix
/// canonicalized so symlinked parents compare equal.
fn resolve_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normal = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            other => normal.push(other),
        }
    }

    let mut missing = Vec::new();
    let mut existing = normal.as_path();
    loop {
        if let Ok(mut resolved) = existing.canonicalize() {
            resolved.extend(missing.iter().rev());
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return normal,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from("data"),
            static_dir: PathBuf::from("static"),
            output: PathBuf::from("build"),
            templates: PathBuf::from("templates"),
            entries_dir: "e".to_string(),
        }
    }
}

/// Template names, relative to the templates directory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatesConfig {
    pub layout: String,
    pub index: String,
    pub entry: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            layout: "layout.html".to_string(),
            index: "index.html".to_string(),
            entry: "entry.html".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Ordering of entries inside each year group.
    pub order: EntryOrder,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinifyConfig {
    pub enabled: bool,
}

impl Default for MinifyConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Parallel rendering settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of render workers.
    /// When absent, one worker per entry up to four per CPU core.
    pub max_workers: Option<usize>,
}

/// Resolve the render pool size for a build of `entries` entries.
///
/// - `None` → `min(entries, cores * 4)`
/// - `Some(n)` → the above, capped at `n`
///
/// Never less than one, so an empty site still gets a pool for the index.
pub fn effective_threads(config: &ProcessingConfig, entries: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let auto = entries.min(cores * 4).max(1);
    config.max_workers.map(|n| auto.min(n)).unwrap_or(auto)
}

/// Load the build configuration from `path`.
///
/// Missing sections and keys take their defaults. A missing file yields the
/// stock defaults unless `required` is set, in which case it is
/// [`ConfigError::NotFound`].
pub fn load_config(path: &Path, required: bool) -> Result<BuildConfig, ConfigError> {
    let config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<BuildConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if required {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            log::debug!("no config at {}, using defaults", path.display());
            BuildConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    config.validate()?;
    Ok(config)
}

/// A fully-commented `almanac.toml` with every option at its default.
pub fn stock_config_toml() -> &'static str {
    r##"# Almanac Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Command-line flags (--data, --static, --output, --templates, --no-minify,
# --no-clean, --jobs) override the values in this file.
# Unknown keys will cause an error.

# Remove the output directory before each build.
clean = true

# ---------------------------------------------------------------------------
# Paths (relative to the working directory)
# ---------------------------------------------------------------------------
[paths]
# Manifest file (.json/.yaml/.yml), or a directory holding index.json /
# index.yaml, or a content directory to scan.
data = "data"

# Static assets copied verbatim into the output (symlinks preserved).
static_dir = "static"

# Build output.
output = "build"

# Templates directory. Every file under it is loaded.
templates = "templates"

# Entry pages are written to <output>/<entries_dir>/<slug>.html.
entries_dir = "e"

# ---------------------------------------------------------------------------
# Templates (names relative to the templates directory)
# ---------------------------------------------------------------------------
[templates]
# Outer template wrapping every page. Must output {{ Content | safe }}.
layout = "layout.html"

# Inner template for the index page.
index = "index.html"

# Inner template for each entry page.
entry = "entry.html"

# ---------------------------------------------------------------------------
# Index
# ---------------------------------------------------------------------------
[index]
# Order of entries within each year: "source", "newest-first", "oldest-first".
order = "source"

# ---------------------------------------------------------------------------
# Minification
# ---------------------------------------------------------------------------
[minify]
enabled = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel render workers.
# Omit or comment out to auto-detect (one per entry, up to 4x CPU cores).
# max_workers = 8
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_paths() {
        let config = BuildConfig::default();
        assert_eq!(config.paths.data, PathBuf::from("data"));
        assert_eq!(config.paths.static_dir, PathBuf::from("static"));
        assert_eq!(config.paths.output, PathBuf::from("build"));
        assert_eq!(config.paths.entries_dir, "e");
        assert!(config.clean);
        assert!(config.minify.enabled);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[templates]
layout = "base.html"
"#;
        let config: BuildConfig = toml::from_str(toml).unwrap();
        // Overridden value
        assert_eq!(config.templates.layout, "base.html");
        // Default values preserved
        assert_eq!(config.templates.entry, "entry.html");
        assert_eq!(config.index.order, EntryOrder::Source);
    }

    #[test]
    fn parse_entry_order() {
        let toml = r#"
[index]
order = "newest-first"
"#;
        let config: BuildConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.index.order, EntryOrder::NewestFirst);
    }

    #[test]
    fn unknown_keys_rejected() {
        let result: Result<BuildConfig, _> = toml::from_str("[minify]\nenabeld = false\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // validate tests
    // =========================================================================

    #[test]
    fn validate_rejects_nested_entries_dir() {
        let mut config = BuildConfig::default();
        config.paths.entries_dir = "a/b".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.paths.entries_dir = "..".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.paths.entries_dir = "talks".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_template_name() {
        let mut config = BuildConfig::default();
        config.templates.index = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_output_containing_inputs() {
        let mut config = BuildConfig::default();
        config.paths.output = PathBuf::from(".");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.paths.output = PathBuf::from("templates/../templates");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        config.paths.output = PathBuf::from("static");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_output_parent_of_existing_inputs() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("site/data")).unwrap();

        let mut config = BuildConfig::default();
        config.paths.data = tmp.path().join("site/data");
        config.paths.output = tmp.path().join("site");
        match config.validate() {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains("paths.data"), "{msg}"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_sibling_output() {
        let mut config = BuildConfig::default();
        config.paths.output = PathBuf::from("data-build");
        assert!(config.validate().is_ok());

        config.paths.output = PathBuf::from("data/../build");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = BuildConfig::default();
        config.processing.max_workers = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // effective_threads tests
    // =========================================================================

    #[test]
    fn effective_threads_bounded_by_entries() {
        let config = ProcessingConfig::default();
        assert_eq!(effective_threads(&config, 1), 1);
        assert_eq!(effective_threads(&config, 0), 1);
    }

    #[test]
    fn effective_threads_capped_by_max_workers() {
        let config = ProcessingConfig {
            max_workers: Some(2),
        };
        assert_eq!(effective_threads(&config, 1000), 2);
    }

    #[test]
    fn effective_threads_never_exceeds_four_per_core() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig::default();
        assert_eq!(effective_threads(&config, 100_000), cores * 4);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(DEFAULT_CONFIG_FILE), false).unwrap();
        assert_eq!(config, BuildConfig::default());
    }

    #[test]
    fn load_config_required_file_missing() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(&tmp.path().join("custom.toml"), true);
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"
clean = false

[paths]
output = "public"

[processing]
max_workers = 3
"#,
        )
        .unwrap();

        let config = load_config(&path, true).unwrap();
        assert!(!config.clean);
        assert_eq!(config.paths.output, PathBuf::from("public"));
        assert_eq!(config.processing.max_workers, Some(3));
        // Unspecified values should be defaults
        assert_eq!(config.paths.data, PathBuf::from("data"));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "this is not valid toml [[[").unwrap();

        assert!(matches!(
            load_config(&path, false),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[processing]\nmax_workers = 0\n").unwrap();

        assert!(matches!(
            load_config(&path, true),
            Err(ConfigError::Validation(_))
        ));
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: BuildConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, BuildConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in ["[paths]", "[templates]", "[index]", "[minify]", "[processing]"] {
            assert!(content.contains(section), "missing {section}");
        }
    }
}
