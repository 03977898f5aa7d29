//! Fixed fragment templates and pure post-processing of backend replies.

use std::sync::LazyLock;

use regex::Regex;

/// Substituted whenever generation or validation fails. Must always pass
/// [`crate::core::validator::validate_fragment`].
pub const FALLBACK_FRAGMENT: &str = r#"<div class="card">
          <h2>Back soon</h2>
          <p>Fresh content is on its way. This page refreshes itself automatically.</p>
          <p class="meta"><span id="last-updated"></span></p>
        </div>"#;

static FIRST_INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Build the fixed-shape fragment used in counter mode.
pub fn counter_fragment(next_counter: u64) -> String {
    format!(
        r#"<div class="card">
          <p class="counter">Counter: {next_counter}</p>
          <p class="meta"><span id="last-updated"></span></p>
        </div>"#
    )
}

/// Strip one surrounding code fence when the whole reply is wrapped in it.
///
/// The opening fence may carry an info string (e.g. ```` ```html ````).
/// Replies that merely contain a fence somewhere are returned trimmed but
/// otherwise untouched; the validator rejects them.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string line.
    let body = match body.find('\n') {
        Some(idx) => &body[idx + 1..],
        None => return trimmed,
    };
    body.trim()
}

/// First non-negative integer in the visible text of a fragment, if any.
///
/// Tags are ignored so `<h2>` does not count. A leading minus sign makes the
/// first match negative, which yields `None` rather than skipping ahead.
pub fn claimed_counter(fragment: &str) -> Option<u64> {
    let visible = TAG_RE.replace_all(fragment, " ");
    let found = FIRST_INTEGER_RE.find(&visible)?;
    let literal = found.as_str();
    if literal.starts_with('-') {
        return None;
    }
    literal.parse().ok()
}
