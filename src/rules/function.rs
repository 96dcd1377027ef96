//! Input functions
//!
//! An input function computes one path or an ordered list of paths from the
//! wildcard binding of a job. Returned strings are the resolved values as
//! they are; nothing substitutes into them afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::pattern::WildcardBinding;

/// Result shape of an input function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionOutput {
    Path(String),
    Paths(Vec<String>),
}

impl FunctionOutput {
    pub fn into_paths(self) -> Vec<String> {
        match self {
            Self::Path(p) => vec![p],
            Self::Paths(ps) => ps,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Path(p) => p.is_empty(),
            Self::Paths(ps) => ps.is_empty(),
        }
    }
}

impl From<String> for FunctionOutput {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for FunctionOutput {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<Vec<String>> for FunctionOutput {
    fn from(paths: Vec<String>) -> Self {
        Self::Paths(paths)
    }
}

impl From<Vec<&str>> for FunctionOutput {
    fn from(paths: Vec<&str>) -> Self {
        Self::Paths(paths.into_iter().map(String::from).collect())
    }
}

/// Config values reach input functions untyped; only strings and arrays of
/// strings are paths.
impl TryFrom<&Value> for FunctionOutput {
    type Error = String;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self::Path(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(format!(
                        "list element {} is a {}, expected a string",
                        other,
                        json_type(other)
                    )),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Paths),
            other => Err(format!(
                "returned a {} ({}), expected a path or a list of paths",
                json_type(other),
                other
            )),
        }
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// A lazily evaluated input
pub trait InputFunction: Send + Sync {
    fn call(&self, wildcards: &WildcardBinding) -> anyhow::Result<FunctionOutput>;
}

impl<F> InputFunction for F
where
    F: Fn(&WildcardBinding) -> anyhow::Result<FunctionOutput> + Send + Sync,
{
    fn call(&self, wildcards: &WildcardBinding) -> anyhow::Result<FunctionOutput> {
        self(wildcards)
    }
}

/// An input function attached to a rule entry
#[derive(Clone)]
pub struct FunctionRef {
    name: Arc<str>,
    func: Arc<dyn InputFunction>,
    allow_empty: bool,
}

impl FunctionRef {
    /// Wrap a closure
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&WildcardBinding) -> anyhow::Result<FunctionOutput> + Send + Sync + 'static,
    {
        Self::from_arc(name, Arc::new(func))
    }

    /// Wrap any [`InputFunction`] implementor
    pub fn from_function(name: impl Into<Arc<str>>, func: impl InputFunction + 'static) -> Self {
        Self::from_arc(name, Arc::new(func))
    }

    pub fn from_arc(name: impl Into<Arc<str>>, func: Arc<dyn InputFunction>) -> Self {
        Self {
            name: name.into(),
            func,
            allow_empty: false,
        }
    }

    /// Accept an empty result instead of failing resolution
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allows_empty(&self) -> bool {
        self.allow_empty
    }

    pub fn call(&self, wildcards: &WildcardBinding) -> anyhow::Result<FunctionOutput> {
        self.func.call(wildcards)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRef")
            .field("name", &self.name)
            .field("allow_empty", &self.allow_empty)
            .finish()
    }
}

/// Named Rust functions that rule files reference with `function: NAME`
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, Arc<dyn InputFunction>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&WildcardBinding) -> anyhow::Result<FunctionOutput> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(func));
    }

    pub fn register_function(&mut self, name: impl Into<String>, func: impl InputFunction + 'static) {
        self.functions.insert(name.into(), Arc::new(func));
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&WildcardBinding) -> anyhow::Result<FunctionOutput> + Send + Sync + 'static,
    {
        self.register(name, func);
        self
    }

    pub fn get(&self, name: &str) -> Option<FunctionRef> {
        self.functions
            .get(name)
            .map(|f| FunctionRef::from_arc(name, Arc::clone(f)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionTable").field("functions", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_closure_is_input_function() {
        let f = FunctionRef::new("pair", |w: &WildcardBinding| {
            let s = w.get("sample").unwrap_or("none");
            Ok(FunctionOutput::from(vec![
                format!("in/{}_a.txt", s),
                format!("in/{}_b.txt", s),
            ]))
        });
        let b: WildcardBinding = [("sample", "s1")].into_iter().collect();
        let out = f.call(&b).unwrap().into_paths();
        assert_eq!(out, vec!["in/s1_a.txt", "in/s1_b.txt"]);
        assert!(!f.allows_empty());
    }

    #[test]
    fn test_try_from_json_value() {
        assert_eq!(
            FunctionOutput::try_from(&json!("a.txt")).unwrap(),
            FunctionOutput::Path("a.txt".into())
        );
        assert_eq!(
            FunctionOutput::try_from(&json!(["a", "b"])).unwrap().into_paths(),
            vec!["a", "b"]
        );
        let err = FunctionOutput::try_from(&json!(42)).unwrap_err();
        assert!(err.contains("number"));
        assert!(FunctionOutput::try_from(&json!(["a", 1])).is_err());
    }

    #[test]
    fn test_function_table_lookup() {
        let table = FunctionTable::new().with("one", |_: &WildcardBinding| {
            Ok(FunctionOutput::from("x.txt"))
        });
        assert!(table.contains("one"));
        assert_eq!(table.get("one").unwrap().name(), "one");
        assert!(table.get("two").is_none());
    }
}
