//! `purl-notices`: reconcile license and copyright evidence for packages and
//! generate grouped legal notices.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and initialise logging.
//! 2. Load config ([`config::load_config`]) and apply CLI overrides.
//! 3. Pick the input mode ([`input::detect_mode`]).
//! 4. Reconcile packages ([`batch`], [`reconcile`]) or load them from the cache ([`cache`]).
//! 5. Save the cache, group by license and render notices ([`notice`]).
//! 6. Print the run summary ([`report`]).

mod acquire;
mod batch;
mod cache;
mod cli;
mod config;
mod input;
mod license;
mod models;
mod notice;
mod provider;
mod purl;
mod reconcile;
mod registry;
mod report;
mod scan;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use acquire::HttpFetcher;
use batch::{BatchCoordinator, CancelToken, ErrorLog, Progress};
use cache::CacheStore;
use cli::{Cli, OutputFormat};
use config::{load_config, Config};
use input::{detect_mode, read_kissbom, Mode};
use license::texts::{BundledTexts, LicenseDir, ReferenceTexts};
use models::Package;
use notice::text::{render_json, render_text, RenderOptions};
use provider::registry::RegistryResolver;
use reconcile::{Pipeline, Reconciler};
use scan::{detect_purls, ScanOptions};

/// Packages produced by one run plus its diagnostic log.
struct RunOutcome {
    packages: Vec<Package>,
    errors: Vec<String>,
    cancelled: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    if let Some(path) = &cli.validate_cache {
        std::process::exit(validate_cache(path));
    }

    let cwd = std::env::current_dir()?;
    let mut config = load_config(&cwd, cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    let cache_file = if cli.no_cache || !config.cache.enabled {
        None
    } else {
        Some(cli.cache.clone().unwrap_or_else(|| config.cache.location.clone()))
    };

    let mode = match cli.mode {
        Mode::Auto => detect_mode(cli.input.as_deref(), cache_file.as_deref())?,
        explicit => explicit,
    };
    tracing::info!("running in {} mode", mode);

    let outcome = match mode {
        Mode::Cache => {
            let path = match (&cli.input, &cache_file) {
                (Some(input), _) => PathBuf::from(input),
                (None, Some(cache)) => cache.clone(),
                (None, None) => bail!("cache mode needs an input file or a cache location"),
            };
            let store = CacheStore::new(&path);
            if !store.exists() {
                bail!("cache file not found: {}", path.display());
            }
            let packages = store
                .load()
                .with_context(|| format!("cannot use cache {}", path.display()))?;
            tracing::info!("loaded {} packages from {}", packages.len(), path.display());
            RunOutcome {
                packages,
                errors: Vec::new(),
                cancelled: false,
            }
        }
        _ => {
            let input = cli
                .input
                .as_deref()
                .with_context(|| format!("{} mode needs an input", mode))?;
            let outcome = reconcile_input(mode, input, &config, cli.quiet).await?;

            // Partial results from a cancelled run are saved too.
            if let Some(path) = &cache_file {
                CacheStore::new(path).save(&outcome.packages)?;
                if !cli.quiet {
                    eprintln!("  {} cache saved to {}", "→".cyan(), path.display());
                }
            }
            outcome
        }
    };

    let notices = render_notices(&outcome.packages, &config, &cli)?;
    match &cli.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &notices)
                .with_context(|| format!("failed to write notices to {}", path.display()))?;
            tracing::info!("legal notices written to {}", path.display());
        }
        None => println!("{}", notices),
    }

    report::terminal::render(&outcome.packages, &outcome.errors, cli.verbose > 0, cli.quiet);

    if outcome.cancelled {
        eprintln!("{} run interrupted; notices cover completed packages only", "warning:".yellow().bold());
        std::process::exit(130);
    }

    Ok(())
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("purl_notices={}", level)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(parallel) = cli.parallel {
        config.general.parallel = usize::from(parallel);
    }
    if let Some(dir) = &cli.licenses_dir {
        config.licenses.dir = Some(dir.clone());
    }
    config.scanning.exclude.extend(cli.exclude.iter().cloned());
}

/// `--validate-cache`: exit status 0 when the file is usable, 1 otherwise.
fn validate_cache(path: &Path) -> i32 {
    match CacheStore::new(path).validate() {
        Ok(count) => {
            println!("{} {} is valid ({} packages)", "✓".green(), path.display(), count);
            0
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            1
        }
    }
}

fn build_reconciler(config: &Config) -> Result<Reconciler> {
    let timeout = Duration::from_secs(config.general.timeout_secs);
    let download_timeout = Duration::from_secs(config.general.download_timeout_secs);

    let pipeline = Pipeline {
        resolver: Arc::new(RegistryResolver::new(timeout)?),
        fetcher: Arc::new(HttpFetcher::new(download_timeout, config.general.work_dir.clone())?),
        inspectors: provider::build_inspectors(&config.providers.inspectors, config.scanning.max_depth)?,
    };
    Ok(Reconciler::new(pipeline, timeout, download_timeout))
}

async fn reconcile_input(mode: Mode, input: &str, config: &Config, quiet: bool) -> Result<RunOutcome> {
    let reconciler = Arc::new(build_reconciler(config)?);

    let ids = match mode {
        Mode::Single => vec![input.trim().to_string()],
        Mode::Kissbom => read_kissbom(Path::new(input))?,
        Mode::Scan => {
            let dir = Path::new(input);
            if !dir.is_dir() {
                bail!("invalid directory: {}", input);
            }
            let options = ScanOptions {
                max_depth: config.scanning.max_depth,
                exclude: config.scanning.exclude.clone(),
            };
            let ids = detect_purls(dir, &options)?;
            if ids.is_empty() {
                // Nothing pinned anywhere: treat the directory itself as the package.
                tracing::info!("no packages detected; scanning {} as one package", dir.display());
                let log = ErrorLog::new();
                let package = reconciler.reconcile_path(dir, &log).await;
                return Ok(RunOutcome {
                    packages: vec![package],
                    errors: log.entries(),
                    cancelled: false,
                });
            }
            if !quiet {
                eprintln!("  {} {} packages detected in {}", "→".cyan(), ids.len(), dir.display());
            }
            ids
        }
        Mode::Auto | Mode::Cache => bail!("{} mode does not reconcile packages", mode),
    };

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{} interrupted, finishing running packages", "warning:".yellow().bold());
            on_signal.cancel();
        }
    });

    let progress = if quiet || ids.len() < 2 {
        Progress::hidden()
    } else {
        Progress::with_bar(ids.len() as u64)?
    };

    let coordinator = BatchCoordinator::new(reconciler, config.general.parallel);
    let outcome = coordinator.run(ids, &progress, &cancel).await;
    progress.finish();
    tracing::debug!("{} packages completed", progress.completed());

    if outcome.cancelled && !outcome.skipped.is_empty() {
        tracing::warn!("{} packages were not processed", outcome.skipped.len());
    }
    Ok(RunOutcome {
        packages: outcome.packages,
        errors: outcome.errors,
        cancelled: outcome.cancelled,
    })
}

fn render_notices(packages: &[Package], config: &Config, cli: &Cli) -> Result<String> {
    let options = RenderOptions {
        include_copyright: !cli.no_copyright,
        include_license_text: !cli.no_license_text,
    };
    let groups = notice::group_by_license(packages);

    let texts = if options.include_license_text {
        let reference: Box<dyn ReferenceTexts> = match &config.licenses.dir {
            Some(dir) => Box::new(LicenseDir::new(dir)),
            None => Box::new(BundledTexts),
        };
        notice::license_texts(&groups, reference.as_ref())
    } else {
        BTreeMap::new()
    };

    Ok(match cli.format {
        OutputFormat::Text => render_text(&groups, &texts, options),
        OutputFormat::Json => render_json(&groups, &texts, options)?,
    })
}
