//! Build orchestration.
//!
//! Sequences the stages of one build and owns the [`SiteConfig`] for its
//! duration:
//!
//! ```text
//! Init → LoadConfig → { RenderEntries ∥ RenderIndex } → CopyStatic → Done
//! ```
//!
//! 1. **LoadConfig**: load content, group entries by year, parse templates and
//!    HTML fragments. Nothing has been written yet, so any failure here leaves
//!    the previous output untouched.
//! 2. **Render**: the output root is cleaned (if configured), then entry pages
//!    fan out over a dedicated rayon pool while the index renders alongside.
//!    Each entry task renders its body, composes entry template and layout,
//!    minifies, and writes `e/<slug>.html`.
//! 3. **CopyStatic**: the static tree is mirrored into the output root.
//!
//! Any error is fatal and returned; there is no partial success. An
//! [`AbortFlag`] is checked between stages and before each entry task.
//! Progress is reported as [`BuildEvent`]s on an optional channel.

use crate::config::{BuildConfig, ConfigError, effective_threads};
use crate::group::group_by_year;
use crate::load::{self, LoadError};
use crate::minify::{ContentType, MinifyError, Minifier};
use crate::render::{
    Helpers, RenderContext, Renderer, TemplateError, TemplateNames, markdown_to_html,
};
use crate::types::{ContentKind, Entry, SiteConfig};
use crate::write::{BuildWriter, CopyReport, WriteError};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Minify(#[from] MinifyError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("failed to start render workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("build aborted")]
    Aborted,
}

/// Build stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    LoadConfig,
    RenderEntries,
    RenderIndex,
    CopyStatic,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Init => "Starting",
            Stage::LoadConfig => "Loading content",
            Stage::RenderEntries => "Rendering entries",
            Stage::RenderIndex => "Rendering index",
            Stage::CopyStatic => "Copying static files",
            Stage::Done => "Done",
        };
        f.write_str(label)
    }
}

/// Progress reported while a build runs.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    StageStarted(Stage),
    Loaded {
        source: PathBuf,
        entries: usize,
        years: usize,
    },
    EntryWritten {
        title: String,
        path: PathBuf,
    },
    IndexWritten {
        path: PathBuf,
    },
    StaticCopied {
        source: PathBuf,
        report: CopyReport,
    },
    Finished {
        entries: usize,
        elapsed: Duration,
    },
}

/// Shared cancellation flag, set from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Entry pages, in load order.
    pub entries: Vec<PathBuf>,
    pub index: PathBuf,
    pub copy: CopyReport,
    pub workers: usize,
    pub elapsed: Duration,
}

pub struct Pipeline {
    config: BuildConfig,
    helpers: Helpers,
    abort: AbortFlag,
    events: Option<Sender<BuildEvent>>,
}

impl Pipeline {
    pub fn new(config: BuildConfig, helpers: Helpers) -> Self {
        Self {
            config,
            helpers,
            abort: AbortFlag::new(),
            events: None,
        }
    }

    pub fn with_abort(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_events(mut self, events: Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run a full build.
    pub fn run(&self) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        self.enter(Stage::Init)?;
        self.config.validate()?;

        self.enter(Stage::LoadConfig)?;
        let site = self.load_site()?;
        let renderer = self.renderer(&site)?;
        let minifier = Minifier::from_config(&self.config.minify);
        let paths = &self.config.paths;
        let writer = BuildWriter::new(&paths.output, &paths.entries_dir);

        if self.config.clean {
            writer.clean()?;
        }

        self.enter(Stage::RenderEntries)?;
        let workers = effective_threads(&self.config.processing, site.entries.len());
        log::debug!(
            "rendering {} entries on {workers} workers",
            site.entries.len()
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("almanac-render-{i}"))
            .build()?;

        let (entries, index) = pool.install(|| {
            rayon::join(
                || {
                    site.entries.par_iter().try_for_each(|entry| {
                        self.check_abort()?;
                        self.render_entry(entry, &site, &renderer, &minifier, &writer)
                    })
                },
                || {
                    self.emit(BuildEvent::StageStarted(Stage::RenderIndex));
                    self.render_index(&site, &renderer, &minifier, &writer)
                },
            )
        });
        entries?;
        let index = index?;

        self.enter(Stage::CopyStatic)?;
        let copy = writer.copy_static_tree(&paths.static_dir, writer.root())?;
        self.emit(BuildEvent::StaticCopied {
            source: paths.static_dir.clone(),
            report: copy.clone(),
        });

        let elapsed = started.elapsed();
        self.emit(BuildEvent::StageStarted(Stage::Done));
        self.emit(BuildEvent::Finished {
            entries: site.entries.len(),
            elapsed,
        });

        Ok(BuildReport {
            entries: site
                .entries
                .iter()
                .map(|e| writer.entry_path(&e.slug))
                .collect(),
            index,
            copy,
            workers,
            elapsed,
        })
    }

    /// Load content and parse templates without writing anything.
    pub fn check(&self) -> Result<SiteConfig, BuildError> {
        self.config.validate()?;
        self.enter(Stage::LoadConfig)?;
        let site = self.load_site()?;
        self.renderer(&site)?;
        Ok(site)
    }

    fn load_site(&self) -> Result<SiteConfig, BuildError> {
        let source = &self.config.paths.data;
        let mut site = load::load(source)?;
        site.groups = group_by_year(&site.entries, self.config.index.order);
        log::debug!(
            "loaded {} entries in {} years from {}",
            site.entries.len(),
            site.groups.len(),
            source.display()
        );
        self.emit(BuildEvent::Loaded {
            source: source.clone(),
            entries: site.entries.len(),
            years: site.groups.len(),
        });
        Ok(site)
    }

    /// Parse templates and register every HTML entry body as a fragment.
    fn renderer(&self, site: &SiteConfig) -> Result<Renderer, BuildError> {
        let mut renderer = Renderer::new(
            &self.config.paths.templates,
            TemplateNames::from(&self.config.templates),
            &self.helpers,
        )?;
        for entry in site.entries.iter().filter(|e| e.kind == ContentKind::Html) {
            let source = read_source(entry)?;
            renderer.add_fragment(&entry.slug, &source)?;
        }
        Ok(renderer)
    }

    fn render_entry(
        &self,
        entry: &Entry,
        site: &SiteConfig,
        renderer: &Renderer,
        minifier: &Minifier,
        writer: &BuildWriter,
    ) -> Result<(), BuildError> {
        let ctx = RenderContext::new(entry, site);
        let body = match entry.kind {
            ContentKind::Markdown => markdown_to_html(&read_source(entry)?),
            ContentKind::Html => renderer.render_fragment(&ctx)?,
        };
        let content = entry.rendered.get_or_init(|| body);

        let page = renderer.render_entry_page(&ctx, content)?;
        let bytes = minifier.minify(ContentType::Html, page.as_bytes())?;
        let path = writer.write_entry(&entry.slug, &bytes)?;

        self.emit(BuildEvent::EntryWritten {
            title: entry.title.clone(),
            path,
        });
        Ok(())
    }

    fn render_index(
        &self,
        site: &SiteConfig,
        renderer: &Renderer,
        minifier: &Minifier,
        writer: &BuildWriter,
    ) -> Result<PathBuf, BuildError> {
        self.check_abort()?;
        let page = renderer.render_index_page(site)?;
        let bytes = minifier.minify(ContentType::Html, page.as_bytes())?;
        let path = writer.write_index(&bytes)?;
        self.emit(BuildEvent::IndexWritten { path: path.clone() });
        Ok(path)
    }

    fn enter(&self, stage: Stage) -> Result<(), BuildError> {
        self.check_abort()?;
        log::debug!("stage: {stage:?}");
        self.emit(BuildEvent::StageStarted(stage));
        Ok(())
    }

    fn check_abort(&self) -> Result<(), BuildError> {
        if self.abort.is_aborted() {
            Err(BuildError::Aborted)
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }
}

fn read_source(entry: &Entry) -> Result<String, LoadError> {
    fs::read_to_string(&entry.source_path).map_err(|source| LoadError::Io {
        path: entry.source_path.clone(),
        source,
    })
}
