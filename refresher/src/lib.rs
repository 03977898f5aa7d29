//! Content-refresh agent for a static page.
//!
//! Each run rewrites the editable region of one HTML document, either with a
//! deterministic counter card or with a fragment from a generative text
//! backend, and leaves an audit log behind. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure logic (fragment templates, validation, splicing).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (state file, config, prompts,
//!   audit logs, the HTTP backend). Behind traits where tests need fakes.
//!
//! [`agents`] turns run state into a known-valid fragment and [`refresh`]
//! sequences one run end to end for the CLI.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod refresh;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
