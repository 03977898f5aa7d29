//! Refresher configuration stored in `refresher.toml` at the site root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "refresher.toml";

/// Refresher configuration (TOML).
///
/// Missing fields default to the conventional site layout:
/// `docs/index.html`, `agents/state.json`, `agents/prompts/webmaster.md`
/// and `agent-reasoning/`. Relative paths resolve against the site root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefresherConfig {
    /// Page containing the editable region.
    pub document_path: PathBuf,
    /// JSON run state owned by the state store.
    pub state_path: PathBuf,
    /// Directory receiving one audit log per run.
    pub log_dir: PathBuf,
    /// System prompt for the text backend. Optional on disk.
    pub prompt_path: PathBuf,

    pub backend: BackendConfig,
    pub content: ContentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Model identifier sent with every request (overridable from the CLI).
    pub model: String,
    /// Chat-completions endpoint.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Upper bound on a single backend call, in seconds.
    pub timeout_secs: u64,
    /// Generation-length cap passed to the backend.
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            max_tokens: 600,
            temperature: 0.2,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContentConfig {
    /// Generated replies larger than this are refused before validation.
    pub max_fragment_bytes: usize,
    /// Appended to the built-in forbidden-term list.
    pub extra_denied_terms: Vec<String>,
    /// User instruction budget; the current-fragment section is dropped first.
    pub prompt_budget_bytes: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_fragment_bytes: 8_000,
            extra_denied_terms: Vec::new(),
            prompt_budget_bytes: 40_000,
        }
    }
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            document_path: PathBuf::from("docs/index.html"),
            state_path: PathBuf::from("agents/state.json"),
            log_dir: PathBuf::from("agent-reasoning"),
            prompt_path: PathBuf::from("agents/prompts/webmaster.md"),
            backend: BackendConfig::default(),
            content: ContentConfig::default(),
        }
    }
}

impl RefresherConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("document_path", &self.document_path),
            ("state_path", &self.state_path),
            ("log_dir", &self.log_dir),
            ("prompt_path", &self.prompt_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        if self.backend.model.trim().is_empty() {
            return Err(anyhow!("backend.model must not be empty"));
        }
        if self.backend.base_url.trim().is_empty() {
            return Err(anyhow!("backend.base_url must not be empty"));
        }
        if self.backend.timeout_secs == 0 {
            return Err(anyhow!("backend.timeout_secs must be > 0"));
        }
        if self.backend.max_tokens == 0 {
            return Err(anyhow!("backend.max_tokens must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.backend.temperature) {
            return Err(anyhow!("backend.temperature must be within 0.0..=2.0"));
        }
        if self.content.max_fragment_bytes == 0 {
            return Err(anyhow!("content.max_fragment_bytes must be > 0"));
        }
        if self.content.prompt_budget_bytes == 0 {
            return Err(anyhow!("content.prompt_budget_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RefresherConfig::default()`.
pub fn load_config(path: &Path) -> Result<RefresherConfig> {
    if !path.exists() {
        let cfg = RefresherConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RefresherConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RefresherConfig::default());
    }

    #[test]
    fn serialized_config_loads_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        let mut cfg = RefresherConfig::default();
        cfg.backend.model = "gpt-4.1-mini".to_string();
        cfg.content.extra_denied_terms = vec!["lottery".to_string()];
        fs::write(&path, toml::to_string_pretty(&cfg).expect("serialize")).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "document_path = \"site/index.html\"\n[backend]\ntimeout_secs = 5\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.document_path, PathBuf::from("site/index.html"));
        assert_eq!(cfg.backend.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.backend.model, "gpt-4o-mini");
        assert_eq!(cfg.state_path, PathBuf::from("agents/state.json"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[backend]\ntimeout_secs = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("timeout_secs must be > 0"));
    }
}
