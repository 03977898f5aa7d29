//! Prompt construction for the text backend.
//!
//! The system instruction is the project prompt loaded from disk (with a
//! built-in default). The user instruction is rendered from a minijinja
//! template whose sections can be dropped or truncated to fit a byte budget.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

const SYSTEM_DEFAULT: &str = include_str!("../prompts/system.md");
const USER_TEMPLATE: &str = include_str!("../prompts/user.md");

/// All inputs needed to render the user instruction.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    /// Inner content currently spliced into the editable region.
    pub current_fragment: String,
    /// Iteration number this run will commit (1-indexed).
    pub iteration: u64,
    /// Counter value before this run.
    pub counter: u64,
    /// Size cap communicated to the backend.
    pub max_fragment_bytes: usize,
}

/// A system/user instruction pair ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    pub system: String,
    pub user: String,
}

/// Built-in system instruction used when no project prompt exists.
pub fn default_system_prompt() -> String {
    SYSTEM_DEFAULT.trim().to_string()
}

/// Load the project prompt, falling back to the built-in default when the
/// file is missing or blank.
pub fn load_system_prompt(path: &Path) -> Result<String> {
    if !path.exists() {
        debug!(path = %path.display(), "no project prompt, using default");
        return Ok(default_system_prompt());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read prompt {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(default_system_prompt());
    }
    Ok(contents.trim().to_string())
}

/// Builds the user instruction within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build(&self, system: &str, input: &PromptInputs) -> Result<PromptPack> {
        let mut env = Environment::new();
        env.add_template("user", USER_TEMPLATE)
            .context("load user prompt template")?;
        let rendered = env
            .get_template("user")?
            .render(context! {
                iteration => input.iteration,
                counter => input.counter,
                max_fragment_bytes => input.max_fragment_bytes,
                current_fragment => (!input.current_fragment.trim().is_empty())
                    .then(|| input.current_fragment.trim()),
            })
            .context("render user prompt")?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);

        Ok(PromptPack {
            system: system.to_string(),
            user: render_sections(&sections),
        })
    }
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.start(),
                whole.end(),
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str() == "required",
            ))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, body_start, key, required)) in markers.iter().enumerate() {
        let body_end = markers
            .get(i + 1)
            .map_or(rendered.len(), |(next_start, ..)| *next_start);
        let content = rendered[*body_start..body_end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Drop droppable sections, then truncate the last one, until under budget.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    while total_len(sections) > budget {
        let Some(idx) = sections.iter().rposition(|s| !s.required) else {
            break;
        };
        debug!(
            section = %sections[idx].key,
            bytes_dropped = sections[idx].content.len(),
            "dropped section for budget"
        );
        sections.remove(idx);
    }

    if total_len(sections) > budget {
        let other_len: usize = sections
            .iter()
            .take(sections.len().saturating_sub(1))
            .map(|s| s.content.len())
            .sum();
        let allowed = budget.saturating_sub(other_len);
        if let Some(last) = sections.last_mut() {
            if last.content.len() > allowed {
                let before_len = last.content.len();
                let cut = floor_char_boundary(&last.content, allowed.saturating_sub(12));
                last.content.truncate(cut);
                last.content.push_str("\n[truncated]");
                debug!(
                    section = %last.key,
                    before_len,
                    after_len = last.content.len(),
                    "truncated section for budget"
                );
            }
        }
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
