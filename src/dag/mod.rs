//! Job resolution and graph construction

mod builder;
mod graph;
mod job;
mod resolve;

pub use builder::DagBuilder;
pub use graph::{Graph, JobId, SourceNode, TopologicalOrder};
pub use job::{Job, JobKey, ParamValue};
pub use resolve::resolve;
