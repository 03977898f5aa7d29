//! Content-refresh agent for a static page.
//!
//! Rewrites the editable region of `docs/index.html` (by default), refreshes
//! its `last-updated` marker and records the run under `agent-reasoning/`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use refresher::core::splice::MissingAnchorsError;
use refresher::core::types::Mode;
use refresher::exit_codes;
use refresher::io::backend::OpenAiBackend;
use refresher::io::config::{CONFIG_FILE_NAME, load_config};
use refresher::logging;
use refresher::refresh::{MissingDocumentError, RefreshOptions, RefreshOutcome, RefreshPaths, run_refresh};

#[derive(Parser, Debug)]
#[command(
    name = "refresher",
    version,
    about = "Refresh the editable section of a static page"
)]
struct Cli {
    /// How the new fragment is produced.
    #[arg(long, value_enum, default_value_t = CliMode::Llm)]
    mode: CliMode,
    /// Model identifier for the text backend (overrides the config).
    #[arg(long, env = "MODEL")]
    model: Option<String>,
    /// Write the audit log only; leave state and document untouched.
    #[arg(long)]
    dry_run: bool,
    /// Site root that configured paths resolve against.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Config file (defaults to `<root>/refresher.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CliMode {
    /// Fixed counter card, no backend call.
    #[value(alias = "deterministic")]
    Counter,
    /// Fragment from the text backend, validated.
    #[value(alias = "generated")]
    Llm,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Counter => Mode::Counter,
            CliMode::Llm => Mode::Llm,
        }
    }
}

fn main() {
    logging::init();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("{err:#}");
        std::process::exit(exit_code_for(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(CONFIG_FILE_NAME));
    let cfg = load_config(&config_path)?;
    let paths = RefreshPaths::resolve(&cli.root, &cfg);

    let api_key = std::env::var(&cfg.backend.api_key_env).ok();
    let backend = OpenAiBackend::new(
        cfg.backend.base_url.clone(),
        api_key,
        cfg.backend.api_key_env.clone(),
    );
    let options = RefreshOptions {
        mode: cli.mode.into(),
        dry_run: cli.dry_run,
        model_override: cli.model,
        now: Utc::now(),
    };

    let outcome = run_refresh(&cfg, &paths, &backend, &options).context("refresh failed")?;
    report(&outcome);
    Ok(())
}

fn report(outcome: &RefreshOutcome) {
    if let Some(err) = &outcome.log_error {
        eprintln!("warning: run log not written: {err}");
    }
    if outcome.strategy.is_fallback() {
        eprintln!("note: used fallback fragment ({})", outcome.strategy);
    }
    if outcome.dry_run {
        println!("Dry run complete. No files were modified.");
        if let Some(path) = &outcome.log_path {
            println!("Reasoning log would be saved to {}", path.display());
        }
        return;
    }
    println!(
        "Updated counter to {} and wrote {}",
        outcome.next.counter,
        outcome.document_path.display()
    );
    if let Some(path) = &outcome.log_path {
        println!("Reasoning log: {}", path.display());
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<MissingDocumentError>().is_some() {
        return exit_codes::MISSING_DOCUMENT;
    }
    if err.downcast_ref::<MissingAnchorsError>().is_some() {
        return exit_codes::MISSING_ANCHORS;
    }
    exit_codes::INVALID
}
