//! Cross-crate end-to-end tests live under `tests/`; see
//! `tests/support/mod.rs` for the mock DevTools harness.
