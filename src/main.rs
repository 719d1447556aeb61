use almanac::config::{self, BuildConfig, ConfigError, DEFAULT_CONFIG_FILE};
use almanac::output;
use almanac::pipeline::{AbortFlag, BuildError, Pipeline};
use almanac::render::Helpers;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;

/// Flags that only affect `build`.
#[derive(clap::Args, Clone, Default)]
struct BuildArgs {
    /// Write pages without minifying them
    #[arg(long)]
    no_minify: bool,

    /// Keep existing files in the output directory
    #[arg(long)]
    no_clean: bool,

    /// Maximum number of render workers
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,
}

fn version_string() -> &'static str {
    let on_tag = env!("ALMANAC_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("ALMANAC_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "almanac")]
#[command(about = "Static site generator for dated talks, events and notes")]
#[command(long_about = "\
Static site generator for dated talks, events and notes

Entries are listed in a manifest or found by scanning a content directory.
Every entry name starts with its date: 2023-05-01-my-talk.md becomes the
page e/my-talk.html dated 1 May 2023.

Content structure:

  data/
  ├── index.json                   # Manifest: {title, description, socials, events}
  ├── 2023-05-01-my-talk.md        # Markdown entry
  └── 2022-10-10-workshop.page/    # Page directory (scan mode)
      ├── workshop.yaml            # {title, slug, date, kind}
      └── workshop.html            # HTML fragment, itself a template

  templates/
  ├── layout.html                  # Shared chrome, outputs {{ Content | safe }}
  ├── index.html                   # Year-grouped listing
  └── entry.html                   # One entry

  static/                          # Copied verbatim into the output

Run 'almanac gen-config' to generate a documented almanac.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Manifest file or content directory [default: data]
    #[arg(long, global = true, value_name = "PATH")]
    data: Option<PathBuf>,

    /// Static asset directory [default: static]
    #[arg(long = "static", global = true, value_name = "DIR")]
    static_dir: Option<PathBuf>,

    /// Output directory [default: build]
    #[arg(long, global = true, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Templates directory [default: templates]
    #[arg(long, global = true, value_name = "DIR")]
    templates: Option<PathBuf>,

    /// Config file [default: almanac.toml, if present]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site (the default)
    Build(BuildArgs),
    /// Validate content and templates without writing anything
    Check,
    /// Print a stock almanac.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", error_chain(&err));
            ExitCode::FAILURE
        }
    }
}

fn run(mut cli: Cli) -> Result<(), BuildError> {
    let command = cli
        .command
        .take()
        .unwrap_or_else(|| Command::Build(BuildArgs::default()));

    match command {
        Command::Build(args) => {
            let mut config = resolve_config(&cli)?;
            apply_build_args(&mut config, &args);

            let abort = AbortFlag::new();
            let handler_flag = abort.clone();
            if let Err(e) = ctrlc::set_handler(move || handler_flag.abort()) {
                log::warn!("could not install Ctrl-C handler: {e}");
            }

            let (tx, rx) = mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_build_event(&event);
                }
            });
            let result = Pipeline::new(config, Helpers::stock())
                .with_abort(abort)
                .with_events(tx)
                .run();
            if printer.join().is_err() {
                log::warn!("progress printer panicked");
            }
            result?;
        }
        Command::Check => {
            let config = resolve_config(&cli)?;
            println!("==> Checking {}", config.paths.data.display());
            let site = Pipeline::new(config, Helpers::stock()).check()?;
            output::print_check_output(&site);
            println!("==> Content is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Config file values with the global path flags applied on top.
fn resolve_config(cli: &Cli) -> Result<BuildConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path, true)?,
        None => config::load_config(Path::new(DEFAULT_CONFIG_FILE), false)?,
    };

    let paths = &mut config.paths;
    if let Some(data) = &cli.data {
        paths.data = data.clone();
    }
    if let Some(static_dir) = &cli.static_dir {
        paths.static_dir = static_dir.clone();
    }
    if let Some(output) = &cli.output {
        paths.output = output.clone();
    }
    if let Some(templates) = &cli.templates {
        paths.templates = templates.clone();
    }
    Ok(config)
}

fn apply_build_args(config: &mut BuildConfig, args: &BuildArgs) {
    if args.no_minify {
        config.minify.enabled = false;
    }
    if args.no_clean {
        config.clean = false;
    }
    if let Some(jobs) = args.jobs {
        config.processing.max_workers = Some(jobs);
    }
}

/// The error message followed by every cause not already part of it.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(&format!("\n  caused by: {text}"));
        }
        source = cause.source();
    }
    message
}
