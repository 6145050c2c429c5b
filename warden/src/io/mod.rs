//! I/O adapters for the orchestrator and its participants.

pub mod completion;
pub mod config;
pub mod console;
pub mod document;
pub mod human_input;
pub mod path_guard;
pub mod process;
pub mod prompt;
pub mod sandbox;
