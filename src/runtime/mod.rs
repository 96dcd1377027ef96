//! Runtime Module - graph execution
//!
//! - `executor`: runs jobs in topological order, skipping up-to-date ones
//! - `runner`: how a single command is run (`sh -c` by default)
//!
//! This module is the "how". For static structure, see the `ast` and `dag`
//! modules.

mod executor;
mod runner;

pub use executor::{ExecutionSummary, Executor};
pub use runner::{ActionRunner, ShellRunner};
