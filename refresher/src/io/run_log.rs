//! Audit logs under `agent-reasoning/`, one markdown file per run.
//!
//! Entries are product artifacts: always attempted, never rewritten, and
//! independent of `RUST_LOG`.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::types::{Mode, Usage};

/// Same-second runs get `-2`, `-3`, ... suffixes up to this many attempts.
const MAX_NAME_ATTEMPTS: u32 = 99;

/// Everything the audit entry records about one run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Human-readable run time (e.g. `2026-10-14 09:30:00 UTC`).
    pub timestamp_human: String,
    /// File-safe UTC stamp used in the entry name (e.g. `2026-10-14T09-30-00Z`).
    pub timestamp_utc: String,
    pub mode: Mode,
    pub model: String,
    pub strategy: String,
    pub validation: String,
    pub dry_run: bool,
    pub counter: u64,
    pub iteration: u64,
    pub fragment: String,
    pub claimed_counter: Option<u64>,
    pub usage: Option<Usage>,
    /// Backend or validation failures absorbed by the fallback path.
    pub diagnostics: Vec<String>,
    /// Project prompt snapshot, recorded in every mode.
    pub system_prompt: String,
    pub user_prompt: Option<String>,
}

/// Write a new entry and return its path.
pub fn write_run_log(dir: &Path, record: &RunRecord) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
    let body = render_record(record);

    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let name = if attempt == 1 {
            format!("run-{}.md", record.timestamp_utc)
        } else {
            format!("run-{}-{attempt}.md", record.timestamp_utc)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(body.as_bytes())
                    .with_context(|| format!("write {}", path.display()))?;
                debug!(path = %path.display(), "run log written");
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err).with_context(|| format!("create {}", path.display())),
        }
    }

    Err(anyhow!(
        "unable to allocate run log name for {} in {} (too many entries)",
        record.timestamp_utc,
        dir.display()
    ))
}

fn render_record(record: &RunRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Refresh run {}", record.timestamp_human);
    out.push('\n');

    out.push_str("## Task\n\n");
    let _ = writeln!(
        out,
        "Refresh the editable section of the page in `{}` mode.",
        record.mode
    );
    out.push('\n');

    out.push_str("## Prompt\n\n### System\n\n");
    out.push_str(record.system_prompt.trim());
    out.push_str("\n\n### User\n\n");
    match &record.user_prompt {
        Some(user) => out.push_str(user.trim()),
        None => out.push_str("_No backend request (counter mode)._"),
    }
    out.push_str("\n\n");

    out.push_str("## Output\n\n");
    let _ = writeln!(out, "Counter set to {}.", record.counter);
    if !record.diagnostics.is_empty() {
        out.push('\n');
        for diagnostic in &record.diagnostics {
            let _ = writeln!(out, "- {diagnostic}");
        }
    }
    out.push_str("\n```html\n");
    out.push_str(record.fragment.trim());
    out.push_str("\n```\n\n");

    out.push_str("## Meta\n\n");
    let _ = writeln!(out, "- dry_run: {}", record.dry_run);
    let _ = writeln!(out, "- mode: {}", record.mode);
    let _ = writeln!(out, "- model: {}", record.model);
    let _ = writeln!(out, "- strategy: {}", record.strategy);
    let _ = writeln!(out, "- validation: {}", record.validation);
    let _ = writeln!(out, "- counter: {}", record.counter);
    let _ = writeln!(out, "- iteration: {}", record.iteration);
    let _ = writeln!(out, "- fragment_bytes: {}", record.fragment.len());
    if let Some(claimed) = record.claimed_counter {
        let _ = writeln!(out, "- claimed_counter: {claimed}");
    }
    if let Some(usage) = record.usage {
        let _ = writeln!(out, "- prompt_tokens: {}", usage.prompt_tokens);
        let _ = writeln!(out, "- completion_tokens: {}", usage.completion_tokens);
        let _ = writeln!(out, "- total_tokens: {}", usage.total_tokens);
    }
    let _ = writeln!(out, "- timestamp_human: {}", record.timestamp_human);
    let _ = writeln!(out, "- timestamp_utc: {}", record.timestamp_utc);
    out
}
