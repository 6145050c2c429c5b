//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod capabilities;
pub mod loop_detector;
pub mod path;
pub mod speaker_policy;
pub mod termination;
pub mod text;
pub mod turn;
pub mod types;
pub mod viewport;
