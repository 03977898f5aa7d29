//! Stable exit codes for the `refresher` CLI.

/// Run completed, including runs that settled on the fallback fragment.
pub const OK: i32 = 0;
/// Invalid config or any other error.
pub const INVALID: i32 = 1;
/// The configured document does not exist.
pub const MISSING_DOCUMENT: i32 = 2;
/// The document lacks the editable-region markers.
pub const MISSING_ANCHORS: i32 = 3;
