//! Wildcard templates, bindings and matching

mod binding;
mod matcher;
pub(crate) mod template;

pub use binding::WildcardBinding;
pub use matcher::{match_template, TemplateMatcher, DEFAULT_CONSTRAINT};
pub use template::{escape, Segment, Template};
