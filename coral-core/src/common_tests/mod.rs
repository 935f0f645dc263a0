//! Shared concurrent test scenarios.
//!
//! These are plain public functions so the integration tests in
//! `tests/` can drive them with different parameters (thread counts,
//! key workloads) via rstest cases.
