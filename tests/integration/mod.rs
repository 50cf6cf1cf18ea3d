//! Integration test suite for nizima-fetch.
//!
//! These tests exercise the execution engine end to end with synthetic
//! pipeline tasks plus the real decrypt/extract/persist tasks over
//! temporary directories. No network access is required.
//!
//! # Test Categories
//!
//! - `graph_execution`: dependency ordering and failure containment
//! - `atomic_commit`: publish/rollback guarantees around a real task graph
//! - `resume`: incremental re-runs skipping already-done work
//! - `pipeline_e2e`: decrypt → extract → marker chain over a staged archive

mod fixtures;

mod graph_execution;
mod pipeline_e2e;
mod resume;
