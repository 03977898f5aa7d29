//! Orchestration for a single `refresher` run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::agents::webmaster::{WebmasterAgent, WebmasterConfig};
use crate::core::splice::{extract_editable_inner, splice_editable_region, update_timestamp};
use crate::core::types::{Mode, Strategy};
use crate::core::validator::FragmentValidator;
use crate::io::backend::TextBackend;
use crate::io::config::RefresherConfig;
use crate::io::prompt::{default_system_prompt, load_system_prompt};
use crate::io::run_log::{RunRecord, write_run_log};
use crate::io::state_store::{RunState, load_run_state, write_run_state};
use crate::io::write_atomic;

const HUMAN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Absolute locations of every file a run touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPaths {
    pub document_path: PathBuf,
    pub state_path: PathBuf,
    pub log_dir: PathBuf,
    pub prompt_path: PathBuf,
}

impl RefreshPaths {
    /// Resolve configured paths against the site root.
    pub fn resolve(root: &Path, cfg: &RefresherConfig) -> Self {
        Self {
            document_path: root.join(&cfg.document_path),
            state_path: root.join(&cfg.state_path),
            log_dir: root.join(&cfg.log_dir),
            prompt_path: root.join(&cfg.prompt_path),
        }
    }
}

/// Per-invocation switches.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub mode: Mode,
    pub dry_run: bool,
    /// Replaces `backend.model` from the config when set.
    pub model_override: Option<String>,
    /// Wall-clock time of the run, used for the timestamp and log name.
    pub now: DateTime<Utc>,
}

/// Result of a completed run (committed or dry).
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub mode: Mode,
    pub dry_run: bool,
    pub strategy: Strategy,
    pub previous: RunState,
    /// State committed by this run, or the state a dry run would have committed.
    pub next: RunState,
    pub document_path: PathBuf,
    pub log_path: Option<PathBuf>,
    /// Set when the audit log could not be written. The run still completes.
    pub log_error: Option<String>,
    pub fragment_bytes: usize,
    pub diagnostics: Vec<String>,
}

/// The page to refresh does not exist. Nothing was read or written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("document not found: {}", path.display())]
pub struct MissingDocumentError {
    pub path: PathBuf,
}

/// Run one refresh: generate, splice, log, then commit unless dry.
///
/// Fails only on setup problems (missing document, missing anchors, unreadable
/// files, failed commit writes). Generation failures are absorbed by the
/// fallback fragment and reported through [`RefreshOutcome::strategy`].
#[instrument(skip_all, fields(mode = %options.mode, dry_run = options.dry_run))]
pub fn run_refresh<B: TextBackend>(
    cfg: &RefresherConfig,
    paths: &RefreshPaths,
    backend: &B,
    options: &RefreshOptions,
) -> Result<RefreshOutcome> {
    if !paths.document_path.is_file() {
        return Err(MissingDocumentError {
            path: paths.document_path.clone(),
        }
        .into());
    }

    let previous = load_run_state(&paths.state_path);
    let document = fs::read_to_string(&paths.document_path)
        .with_context(|| format!("read {}", paths.document_path.display()))?;
    let current_inner = extract_editable_inner(&document)
        .with_context(|| format!("locate editable region in {}", paths.document_path.display()))?;

    // The audit log records the project prompt in every mode.
    let system_prompt = load_system_prompt(&paths.prompt_path).unwrap_or_else(|err| {
        warn!(error = %format!("{err:#}"), "project prompt unreadable, using default");
        default_system_prompt()
    });
    let model = options
        .model_override
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| cfg.backend.model.clone());

    let agent = WebmasterAgent::new(
        WebmasterConfig {
            model: model.clone(),
            max_tokens: cfg.backend.max_tokens,
            temperature: cfg.backend.temperature,
            timeout: cfg.backend.timeout(),
            max_fragment_bytes: cfg.content.max_fragment_bytes,
            prompt_budget_bytes: cfg.content.prompt_budget_bytes,
        },
        system_prompt.clone(),
        FragmentValidator::with_extra_terms(cfg.content.extra_denied_terms.iter()),
    );
    let generation = agent.produce(backend, &previous, &current_inner, options.mode);

    let timestamp_human = options.now.format(HUMAN_TIMESTAMP_FORMAT).to_string();
    let timestamp_utc = options.now.format(FILE_TIMESTAMP_FORMAT).to_string();

    let spliced = splice_editable_region(&document, &generation.fragment.html)
        .with_context(|| format!("splice {}", paths.document_path.display()))?;
    let updated = update_timestamp(&spliced, &format!("Last updated: {timestamp_human}"));
    let next = previous.advance(generation.next_counter);

    let record = RunRecord {
        timestamp_human,
        timestamp_utc,
        mode: options.mode,
        model,
        strategy: generation.strategy.to_string(),
        validation: generation.validation.to_string(),
        dry_run: options.dry_run,
        counter: next.counter,
        iteration: next.iteration,
        fragment: generation.fragment.html.clone(),
        claimed_counter: generation.claimed_counter,
        usage: generation.usage,
        diagnostics: generation.diagnostics.clone(),
        system_prompt,
        user_prompt: generation.prompt.as_ref().map(|p| p.user.clone()),
    };
    let (log_path, log_error) = match write_run_log(&paths.log_dir, &record) {
        Ok(path) => (Some(path), None),
        Err(err) => {
            let message = format!("{err:#}");
            warn!(error = %message, "failed to write run log");
            (None, Some(message))
        }
    };

    let outcome = RefreshOutcome {
        mode: options.mode,
        dry_run: options.dry_run,
        strategy: generation.strategy,
        previous,
        next,
        document_path: paths.document_path.clone(),
        log_path,
        log_error,
        fragment_bytes: generation.fragment.html.len(),
        diagnostics: generation.diagnostics,
    };

    if options.dry_run {
        info!(counter = next.counter, "dry run, nothing committed");
        return Ok(outcome);
    }

    write_run_state(&paths.state_path, &next)?;
    write_atomic(&paths.document_path, &updated)?;
    info!(
        counter = next.counter,
        iteration = next.iteration,
        strategy = %outcome.strategy,
        "refresh committed"
    );
    Ok(outcome)
}
