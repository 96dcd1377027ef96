//! Rules: declaration, registry and input functions

mod action;
mod builder;
pub mod builtin;
mod function;
mod registry;
mod rule;

pub use action::ActionTemplate;
pub use builder::RuleBuilder;
pub use function::{FunctionOutput, FunctionRef, FunctionTable, InputFunction};
pub use registry::RuleRegistry;
pub use rule::{RulePattern, Source};

#[cfg(test)]
pub(crate) use action::sample_job;
