//! Ledger-driven team orchestrator with a confined file surface.
//!
//! A team of participants works toward one task. Each turn a decision
//! backend fills in a progress ledger; the orchestrator uses it to detect
//! stalls, insert human approval turns ahead of sensitive actions, and pick
//! who acts next. File access by the file surfer can be confined to a root
//! directory. The crate is split the usual way:
//!
//! - **[`core`]**: Pure, deterministic logic (turn transitions, speaker
//!   policy, path arithmetic, termination matching). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, completion backend, human
//!   input, documents, path guard, processes).
//! - **[`participants`]**: Team members the orchestrator dispatches to.
//!
//! Orchestration modules ([`ledger`], [`orchestrator`], [`session`]) compose
//! core logic with I/O.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod participants;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
