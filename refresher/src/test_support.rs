//! Test-only helpers: a scripted text backend and a scratch site layout.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::core::types::Usage;
use crate::io::backend::{BackendError, Completion, CompletionRequest, TextBackend};
use crate::io::config::RefresherConfig;
use crate::io::state_store::RunState;
use crate::refresh::RefreshPaths;

/// Page used by [`SiteFixture::new`]. The editable region holds a card with
/// an empty timestamp span.
pub const SAMPLE_PAGE: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>Self-refreshing page</title>
  </head>
  <body>
    <main>
      <!-- BEGIN_EDITABLE -->
      <section id="content">
        <div class="card">
          <p class="counter">Counter: 0</p>
          <p class="meta"><span id="last-updated"></span></p>
        </div>
      </section>
      <!-- END_EDITABLE -->
    </main>
  </body>
</html>
"#;

/// Fixed run time used by tests: 2026-10-14 09:30:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 9, 30, 0)
        .single()
        .expect("valid fixed timestamp")
}

/// Text backend that replays queued replies and records every request.
///
/// Once the queue is empty every call fails with a network error.
pub struct ScriptedBackend {
    replies: RefCell<VecDeque<Result<Completion, BackendError>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<Completion, BackendError>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// One successful reply with token usage attached.
    pub fn text(text: &str) -> Self {
        Self::new(vec![Ok(Completion {
            text: text.to_string(),
            usage: Some(Usage {
                prompt_tokens: 120,
                completion_tokens: 40,
                total_tokens: 160,
            }),
        })])
    }

    /// Every call times out.
    pub fn failing() -> Self {
        Self::new(vec![Err(BackendError::Timeout(Duration::from_secs(30)))])
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }
}

impl TextBackend for ScriptedBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        self.requests.borrow_mut().push(request.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Network("no scripted reply left".to_string())))
    }
}

/// Temporary site root laid out with the default config paths.
pub struct SiteFixture {
    dir: TempDir,
    config: RefresherConfig,
}

impl SiteFixture {
    /// Create a site containing [`SAMPLE_PAGE`] and no state or log directory.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let fixture = Self {
            dir,
            config: RefresherConfig::default(),
        };
        fixture.write_document(SAMPLE_PAGE)?;
        Ok(fixture)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> RefresherConfig {
        self.config.clone()
    }

    pub fn paths(&self) -> RefreshPaths {
        RefreshPaths::resolve(self.path(), &self.config)
    }

    pub fn write_document(&self, contents: &str) -> Result<()> {
        write_file(&self.paths().document_path, contents.as_bytes())
    }

    pub fn read_document(&self) -> Result<String> {
        let path = self.paths().document_path;
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub fn write_state(&self, state: &RunState) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(state).context("serialize state")?;
        buf.push('\n');
        write_file(&self.paths().state_path, buf.as_bytes())
    }

    pub fn read_state(&self) -> Result<RunState> {
        let path = self.paths().state_path;
        let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }

    /// Paths of every audit log written so far, sorted by name.
    pub fn log_entries(&self) -> Result<Vec<PathBuf>> {
        let dir = self.paths().log_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&dir)
            .with_context(|| format!("read {}", dir.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("list {}", dir.display()))?;
        entries.sort();
        Ok(entries)
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
