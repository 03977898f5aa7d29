//! Safety and structure contract for externally generated fragments.
//!
//! Checks run in a fixed order and the first failure wins:
//! code fence, full-document tags, timestamp marker count, forbidden tags,
//! scripting attributes and URLs, forbidden terms. Matching is pattern based;
//! this is not an HTML parser.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::core::splice::TIMESTAMP_ID;

const CODE_FENCE: &str = "```";

/// Tags a fragment may never carry when published without review.
pub const FORBIDDEN_TAGS: [&str; 12] = [
    "script", "iframe", "frame", "frameset", "object", "embed", "applet", "link", "meta", "base",
    "style", "form",
];

/// Best-effort content net (substring match on lowercased text).
pub const FORBIDDEN_TERMS: [&str; 6] = [
    "casino",
    "viagra",
    "porn",
    "nsfw",
    "onlyfans",
    "crypto giveaway",
];

/// URL schemes that execute code, matched after entity decoding and with
/// whitespace removed.
const SCRIPT_SCHEMES: [&str; 2] = ["javascript:", "vbscript:"];

static FULL_DOCUMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*(!doctype|html|head|body)\b").unwrap());

static FORBIDDEN_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"<\s*/?\s*({})\b", FORBIDDEN_TAGS.join("|"));
    Regex::new(&pattern).unwrap()
});

static TIMESTAMP_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r#"(?i)<[a-z][a-z0-9]*(?:\s[^>]*)?\sid\s*=\s*["']{}["']"#,
        regex::escape(TIMESTAMP_ID)
    );
    Regex::new(&pattern).unwrap()
});

/// An `on*=` attribute inside any tag. The separator may be `/` as in `<svg/onload=...>`.
static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<[a-z][^>]*[\s/](on[a-z]+)\s*=").unwrap());

static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&#(?:x([0-9a-f]+)|([0-9]+));?").unwrap());

static NAMED_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&(colon|tab|newline);").unwrap());

/// Why a fragment was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentRejection {
    #[error("fragment contains a markdown code fence")]
    CodeFence,
    #[error("fragment contains full-document tag <{tag}>")]
    FullDocument { tag: String },
    #[error("fragment must contain exactly one #last-updated element, found {found}")]
    TimestampMarkerCount { found: usize },
    #[error("fragment contains forbidden tag <{tag}>")]
    ForbiddenTag { tag: String },
    #[error("fragment contains scripting construct {detail}")]
    Scripting { detail: String },
    #[error("fragment contains forbidden term '{term}'")]
    ForbiddenTerm { term: String },
}

impl FragmentRejection {
    /// Short stable label used in strategy strings.
    pub fn reason(&self) -> &'static str {
        match self {
            FragmentRejection::CodeFence => "code_fence",
            FragmentRejection::FullDocument { .. } => "full_document",
            FragmentRejection::TimestampMarkerCount { .. } => "marker_count",
            FragmentRejection::ForbiddenTag { .. } => "forbidden_tag",
            FragmentRejection::Scripting { .. } => "scripting",
            FragmentRejection::ForbiddenTerm { .. } => "forbidden_term",
        }
    }
}

/// Validator carrying the term denylist (built-in terms plus configured extras).
#[derive(Debug, Clone)]
pub struct FragmentValidator {
    denied_terms: Vec<String>,
}

impl Default for FragmentValidator {
    fn default() -> Self {
        Self {
            denied_terms: FORBIDDEN_TERMS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl FragmentValidator {
    /// Extend the built-in denylist. Blank entries are ignored.
    pub fn with_extra_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut validator = Self::default();
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !validator.denied_terms.contains(&term) {
                validator.denied_terms.push(term);
            }
        }
        validator
    }

    /// Return the fragment unchanged if it satisfies every check.
    pub fn check<'a>(&self, fragment: &'a str) -> Result<&'a str, FragmentRejection> {
        if fragment.contains(CODE_FENCE) {
            return Err(FragmentRejection::CodeFence);
        }

        let lowered = fragment.to_lowercase();
        if let Some(caps) = FULL_DOCUMENT_RE.captures(&lowered) {
            return Err(FragmentRejection::FullDocument {
                tag: caps[1].to_string(),
            });
        }

        let found = count_timestamp_markers(fragment);
        if found != 1 {
            return Err(FragmentRejection::TimestampMarkerCount { found });
        }

        if let Some(caps) = FORBIDDEN_TAG_RE.captures(&lowered) {
            return Err(FragmentRejection::ForbiddenTag {
                tag: caps[1].to_string(),
            });
        }

        if let Some(caps) = EVENT_HANDLER_RE.captures(&lowered) {
            return Err(FragmentRejection::Scripting {
                detail: format!("{}= handler", &caps[1]),
            });
        }
        let decoded = decode_for_scheme_scan(&lowered);
        if let Some(scheme) = SCRIPT_SCHEMES.iter().find(|s| decoded.contains(*s)) {
            return Err(FragmentRejection::Scripting {
                detail: format!("{scheme} URL"),
            });
        }

        if let Some(term) = self.denied_terms.iter().find(|t| lowered.contains(t.as_str())) {
            return Err(FragmentRejection::ForbiddenTerm { term: term.clone() });
        }

        Ok(fragment)
    }
}

/// Validate against the built-in denylists only.
pub fn validate_fragment(fragment: &str) -> Result<&str, FragmentRejection> {
    FragmentValidator::default().check(fragment)
}

/// Decode character references and drop whitespace and control characters,
/// which browsers ignore inside URL schemes.
fn decode_for_scheme_scan(text: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse().ok(),
            (None, None) => None,
        };
        code.and_then(char::from_u32)
            .map_or_else(String::new, |c| c.to_string())
    });
    let named = NAMED_ENTITY_RE.replace_all(&numeric, |caps: &regex::Captures<'_>| {
        if caps[1].eq_ignore_ascii_case("colon") {
            ":".to_string()
        } else {
            String::new()
        }
    });
    named
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Count opening elements carrying the timestamp id (case-insensitive).
pub fn count_timestamp_markers(text: &str) -> usize {
    TIMESTAMP_OPEN_RE.find_iter(text).count()
}
