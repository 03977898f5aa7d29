//! Anchor-based splicing of the editable region and the timestamp marker.
//!
//! Anchors are textual, not parsed nodes. Callers only see the three
//! functions below, so a DOM-backed implementation can replace the patterns
//! without touching the orchestrator.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

pub const BEGIN_MARKER: &str = "<!-- BEGIN_EDITABLE -->";
pub const END_MARKER: &str = "<!-- END_EDITABLE -->";
/// `id` attribute value of the element holding the "last updated" text.
pub const TIMESTAMP_ID: &str = "last-updated";

const WRAPPER_OPEN: &str = "\n      <section id=\"content\">\n        ";
const WRAPPER_CLOSE: &str = "\n      </section>\n      ";

static TIMESTAMP_ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r#"(?i)(<([a-z][a-z0-9]*)(?:\s[^>]*)?\sid\s*=\s*["']{}["'][^>]*>)[^<]*(</[a-z][a-z0-9]*\s*>)"#,
        regex::escape(TIMESTAMP_ID)
    );
    Regex::new(&pattern).unwrap()
});

static WRAPPER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^<section\b[^>]*>(.*)</section>$").unwrap());

/// The editable region could not be located. Configuration error; fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("editable section marker {marker} not found in document")]
pub struct MissingAnchorsError {
    pub marker: &'static str,
}

/// Byte range of the text strictly between the two markers.
fn region_inner_range(document: &str) -> Result<(usize, usize), MissingAnchorsError> {
    let begin = document.find(BEGIN_MARKER).ok_or(MissingAnchorsError {
        marker: BEGIN_MARKER,
    })?;
    let inner_start = begin + BEGIN_MARKER.len();
    let end = document[inner_start..]
        .find(END_MARKER)
        .ok_or(MissingAnchorsError { marker: END_MARKER })?;
    Ok((inner_start, inner_start + end))
}

/// Replace the editable region with `inner` wrapped in the content section.
///
/// Only the first marker pair is touched. Marker literals are preserved so the
/// next run can locate the region again.
pub fn splice_editable_region(document: &str, inner: &str) -> Result<String, MissingAnchorsError> {
    let (start, end) = region_inner_range(document)?;
    let mut out = String::with_capacity(document.len() + inner.len() + WRAPPER_OPEN.len());
    out.push_str(&document[..start]);
    out.push_str(WRAPPER_OPEN);
    out.push_str(inner);
    out.push_str(WRAPPER_CLOSE);
    out.push_str(&document[end..]);
    Ok(out)
}

/// Replace the inner text of the first timestamp element.
///
/// Returns the document unchanged when no such element exists.
pub fn update_timestamp(document: &str, text: &str) -> String {
    TIMESTAMP_ELEMENT_RE
        .replacen(document, 1, |caps: &Captures<'_>| {
            format!("{}{}{}", &caps[1], text, &caps[3])
        })
        .into_owned()
}

/// Current inner content of the editable region, without the wrapper section.
pub fn extract_editable_inner(document: &str) -> Result<String, MissingAnchorsError> {
    let (start, end) = region_inner_range(document)?;
    let inner = document[start..end].trim();
    let unwrapped = match WRAPPER_RE.captures(inner) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => inner,
    };
    Ok(unwrapped.trim().to_string())
}
