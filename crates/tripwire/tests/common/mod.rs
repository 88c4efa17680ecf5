//! Shared test utilities for tripwire integration tests.
//!
//! - `TestHarness` wires both pipeline services over a temp directory
//! - Fake suggestion service and agent channel

pub mod harness;

pub use harness::{FixedSuggester, HangingSuggester, ScriptedChannel, TestHarness};
