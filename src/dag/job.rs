//! Concrete jobs: a rule instantiated with one wildcard binding

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::pattern::WildcardBinding;

/// A resolved parameter: one value or an ordered list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    List(Vec<String>),
}

impl ParamValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s),
            Self::List(_) => None,
        }
    }
}

/// Lists render space-joined, the way actions consume them
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join(" ")),
        }
    }
}

/// Identity of a job: a rule plus a binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub rule: Arc<str>,
    pub wildcards: WildcardBinding,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.rule, self.wildcards)
    }
}

/// A rule instantiated for one binding, with every path concrete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub rule: Arc<str>,
    pub wildcards: WildcardBinding,
    /// Output name → path, in declaration order
    pub outputs: IndexMap<String, String>,
    /// Input name → paths, in declaration order; paths keep the order the
    /// source produced them in
    pub inputs: IndexMap<String, Vec<String>>,
    pub params: IndexMap<String, ParamValue>,
    /// Rendered action, when the rule has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Job {
    pub fn key(&self) -> JobKey {
        JobKey {
            rule: Arc::clone(&self.rule),
            wildcards: self.wildcards.clone(),
        }
    }

    pub fn output_paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.outputs.values().map(String::as_str)
    }

    /// Every input path, entries flattened in order
    pub fn input_paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.inputs.values().flatten().map(String::as_str)
    }

    /// `rule[sample=s1]`, or just the rule name for wildcard-free jobs
    pub fn label(&self) -> String {
        if self.wildcards.is_empty() {
            self.rule.to_string()
        } else {
            format!("{}[{}]", self.rule, self.wildcards)
        }
    }
}
