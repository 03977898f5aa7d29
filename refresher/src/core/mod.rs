//! Deterministic, pure logic shared by the refresh pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! strings and return deterministic outputs suitable for tests.

pub mod fragment;
pub mod splice;
pub mod types;
pub mod validator;
