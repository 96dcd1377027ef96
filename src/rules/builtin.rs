//! Built-in input functions available to rule files
//!
//! - `lookup`: read paths from the config by a wildcard value
//! - `expand`: cartesian product of a template over value lists
//! - `glob`: scan the filesystem for files matching a pattern
//!
//! All three return finished paths. Templates they format are filled from
//! their own values first, then from the job's wildcards.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use indexmap::IndexMap;
use serde_json::Value;

use super::function::{FunctionOutput, InputFunction};
use crate::config::get_path;
use crate::pattern::{Template, WildcardBinding};
use crate::source::glob_wildcards;

// ═══════════════════════════════════════════
// LOOKUP
// ═══════════════════════════════════════════

/// `config[table][wildcards[key]]`, optionally formatted through a template
/// with a `{value}` placeholder
#[derive(Debug, Clone)]
pub struct Lookup {
    config: Arc<Value>,
    table: String,
    key: String,
    template: Option<Template>,
}

impl Lookup {
    pub fn new(config: Arc<Value>, table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            config,
            table: table.into(),
            key: key.into(),
            template: None,
        }
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }
}

impl InputFunction for Lookup {
    fn call(&self, wildcards: &WildcardBinding) -> anyhow::Result<FunctionOutput> {
        let table = get_path(&self.config, &self.table)
            .ok_or_else(|| anyhow!("config has no entry '{}'", self.table))?;
        let key = wildcards
            .get(&self.key)
            .ok_or_else(|| anyhow!("wildcard '{}' is not bound", self.key))?;
        let entry = table
            .get(key)
            .ok_or_else(|| anyhow!("config '{}' has no key '{}'", self.table, key))?;

        let output = FunctionOutput::try_from(entry).map_err(anyhow::Error::msg)?;

        let Some(template) = &self.template else {
            return Ok(output);
        };
        let format = |value: &str| {
            template
                .substitute_with(|name| match name {
                    "value" => Some(value),
                    _ => wildcards.get(name),
                })
                .map_err(|name| anyhow!("wildcard '{}' in '{}' is not bound", name, template))
        };
        Ok(match output {
            FunctionOutput::Path(p) => FunctionOutput::Path(format(&p)?),
            FunctionOutput::Paths(ps) => FunctionOutput::Paths(
                ps.iter().map(|p| format(p)).collect::<anyhow::Result<_>>()?,
            ),
        })
    }
}

// ═══════════════════════════════════════════
// EXPAND
// ═══════════════════════════════════════════

/// Fill `template` with every combination of the value lists.
///
/// Combinations vary the last variable fastest. Values can also come from a
/// filesystem scan, evaluated per call with job wildcards substituted into
/// the scan pattern first.
#[derive(Debug, Clone)]
pub struct Expand {
    template: Template,
    values: IndexMap<String, Vec<String>>,
    scan: Option<(Template, PathBuf)>,
}

impl Expand {
    pub fn new(template: Template) -> Self {
        Self {
            template,
            values: IndexMap::new(),
            scan: None,
        }
    }

    pub fn values<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Take values for the pattern's wildcards from matching files
    pub fn scan(mut self, pattern: Template, root: impl Into<PathBuf>) -> Self {
        self.scan = Some((pattern, root.into()));
        self
    }
}

impl InputFunction for Expand {
    fn call(&self, wildcards: &WildcardBinding) -> anyhow::Result<FunctionOutput> {
        let mut values = self.values.clone();

        if let Some((pattern, root)) = &self.scan {
            let pattern = Template::parse(&pattern.substitute_partial(|n| wildcards.get(n)))?;
            let found = glob_wildcards(&pattern, root)
                .with_context(|| format!("scanning '{}'", pattern))?;
            for name in pattern.wildcard_names() {
                if !values.contains_key(name) {
                    values.insert(name.to_string(), found.unique_values(name));
                }
            }
        }

        Ok(FunctionOutput::Paths(product(&self.template, &values, wildcards)?))
    }
}

fn product(
    template: &Template,
    values: &IndexMap<String, Vec<String>>,
    wildcards: &WildcardBinding,
) -> anyhow::Result<Vec<String>> {
    let mut combos: Vec<Vec<&str>> = vec![Vec::new()];
    for list in values.values() {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                list.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push(v.as_str());
                    next
                })
            })
            .collect();
    }

    let names: Vec<&str> = values.keys().map(String::as_str).collect();
    combos
        .into_iter()
        .map(|combo| {
            template
                .substitute_with(|name| {
                    names
                        .iter()
                        .position(|n| *n == name)
                        .map(|i| combo[i])
                        .or_else(|| wildcards.get(name))
                })
                .map_err(|name| anyhow!("wildcard '{}' in '{}' has no values", name, template))
        })
        .collect()
}

// ═══════════════════════════════════════════
// GLOB
// ═══════════════════════════════════════════

/// Every file matching `pattern` (job wildcards substituted first), sorted
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: Template,
    root: PathBuf,
}

impl Glob {
    pub fn new(pattern: Template, root: impl Into<PathBuf>) -> Self {
        Self {
            pattern,
            root: root.into(),
        }
    }
}

impl InputFunction for Glob {
    fn call(&self, wildcards: &WildcardBinding) -> anyhow::Result<FunctionOutput> {
        let pattern = Template::parse(&self.pattern.substitute_partial(|n| wildcards.get(n)))?;
        let found = glob_wildcards(&pattern, &self.root)?;
        Ok(FunctionOutput::Paths(found.paths().map(String::from).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn binding(pairs: &[(&str, &str)]) -> WildcardBinding {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_lookup_single_and_list() {
        let config = Arc::new(json!({
            "samples": {"s1": "reads/s1.fq", "s2": ["reads/s2_a.fq", "reads/s2_b.fq"]}
        }));
        let lookup = Lookup::new(config, "samples", "sample");

        let one = lookup.call(&binding(&[("sample", "s1")])).unwrap();
        assert_eq!(one, FunctionOutput::Path("reads/s1.fq".into()));

        let many = lookup.call(&binding(&[("sample", "s2")])).unwrap();
        assert_eq!(many.into_paths(), vec!["reads/s2_a.fq", "reads/s2_b.fq"]);
    }

    #[test]
    fn test_lookup_missing_key_errors() {
        let lookup = Lookup::new(Arc::new(json!({"samples": {}})), "samples", "sample");
        let err = lookup.call(&binding(&[("sample", "zz")])).unwrap_err();
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_lookup_rejects_number() {
        let lookup = Lookup::new(Arc::new(json!({"n": {"a": 3}})), "n", "k");
        let err = lookup.call(&binding(&[("k", "a")])).unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_lookup_with_template_fills_job_wildcards() {
        let lookup = Lookup::new(Arc::new(json!({"units": {"s1": ["L1", "L2"]}})), "units", "sample")
            .with_template(Template::parse("raw/{sample}_{value}.fq").unwrap());
        let out = lookup.call(&binding(&[("sample", "s1")])).unwrap();
        assert_eq!(
            out.into_paths(),
            vec!["raw/s1_L1.fq", "raw/s1_L2.fq"]
        );
    }

    #[test]
    fn test_expand_product_order() {
        let expand = Expand::new(Template::parse("out/{s}_{r}.txt").unwrap())
            .values("s", ["a", "b"])
            .values("r", ["1", "2"]);
        let out = expand.call(&WildcardBinding::new()).unwrap().into_paths();
        assert_eq!(
            out,
            vec!["out/a_1.txt", "out/a_2.txt", "out/b_1.txt", "out/b_2.txt"]
        );
    }

    #[test]
    fn test_expand_empty_values_gives_empty_result() {
        let expand = Expand::new(Template::parse("out/{s}.txt").unwrap())
            .values("s", Vec::<String>::new());
        assert!(expand.call(&WildcardBinding::new()).unwrap().is_empty());
    }

    #[test]
    fn test_expand_scan_uses_job_wildcards() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("raw/s1")).unwrap();
        fs::write(dir.path().join("raw/s1/L2.fq"), "").unwrap();
        fs::write(dir.path().join("raw/s1/L1.fq"), "").unwrap();

        let expand = Expand::new(Template::parse("trimmed/{sample}/{lane}.fq").unwrap())
            .scan(Template::parse("raw/{sample}/{lane}.fq").unwrap(), dir.path());
        let out = expand
            .call(&binding(&[("sample", "s1")]))
            .unwrap()
            .into_paths();
        assert_eq!(out, vec!["trimmed/s1/L1.fq", "trimmed/s1/L2.fq"]);
    }

    #[test]
    fn test_glob_lists_sorted_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("parts/s1")).unwrap();
        fs::write(dir.path().join("parts/s1/b.txt"), "").unwrap();
        fs::write(dir.path().join("parts/s1/a.txt"), "").unwrap();

        let glob = Glob::new(Template::parse("parts/{sample}/{part}.txt").unwrap(), dir.path());
        let out = glob.call(&binding(&[("sample", "s1")])).unwrap().into_paths();
        assert_eq!(out, vec!["parts/s1/a.txt", "parts/s1/b.txt"]);
    }
}
