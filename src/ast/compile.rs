//! Rule file → rule registry

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use super::rulefile::{
    FunctionDef, InputDef, OutputDef, RuleDef, Rulefile, SourceDef, ValuesDef,
    RESERVED_INPUT_NAMES,
};
use crate::config::get_path;
use crate::error::{Result, RuleGraphError};
use crate::pattern::Template;
use crate::rules::builtin::{Expand, Glob, Lookup};
use crate::rules::{FunctionRef, FunctionTable, RuleBuilder, RulePattern, RuleRegistry};

/// Shared state while compiling one rule file
struct Context<'a> {
    functions: &'a FunctionTable,
    workdir: &'a Path,
    config: Arc<Value>,
}

/// Compiled form of one entry, ready for the builder
enum Entry {
    Template(String),
    List(Vec<String>),
    Function(FunctionRef),
}

impl Rulefile {
    /// Register every rule.
    ///
    /// `functions` resolves `function: NAME` entries; `workdir` roots `glob`
    /// scans. Built-ins see the config as it is now, so apply overrides first.
    pub fn to_registry(&self, functions: &FunctionTable, workdir: &Path) -> Result<RuleRegistry> {
        let config = if self.config.is_null() {
            Value::Object(Default::default())
        } else {
            self.config.clone()
        };
        let ctx = Context {
            functions,
            workdir,
            config: Arc::new(config),
        };

        let mut registry = RuleRegistry::new();
        for def in &self.rules {
            let rule = compile_rule(def, &self.wildcard_constraints, &ctx)?;
            registry.register(rule)?;
        }
        registry.set_rule_order(self.rule_order.iter().cloned())?;

        debug!(rules = registry.len(), "rule file compiled");
        Ok(registry)
    }
}

fn compile_rule(
    def: &RuleDef,
    global_constraints: &IndexMap<String, String>,
    ctx: &Context<'_>,
) -> Result<RulePattern> {
    let mut builder = RuleBuilder::new(&def.name);

    match &def.output {
        OutputDef::One(t) => builder = builder.output(t),
        OutputDef::List(ts) => {
            for t in ts {
                builder = builder.output(t);
            }
        }
        OutputDef::Named(named) => {
            for (name, t) in named {
                builder = builder.named_output(name, t);
            }
        }
    }

    match &def.input {
        None => {}
        Some(InputDef::One(t)) => builder = builder.input(t),
        Some(InputDef::List(ts)) => {
            for t in ts {
                builder = builder.input(t);
            }
        }
        Some(InputDef::Named(entries)) => {
            for (name, source) in entries {
                if RESERVED_INPUT_NAMES.contains(&name.as_str()) {
                    return Err(RuleGraphError::InvalidRule {
                        rule: def.name.clone(),
                        reason: format!(
                            "input entry '{}' looks like an input function; nest it under a name (input: {{ reads: {{ {}: ... }} }})",
                            name, name
                        ),
                    });
                }
                builder = match compile_entry(&def.name, name, source, ctx)? {
                    Entry::Template(t) => builder.named_input(name, t),
                    Entry::List(ts) => builder.input_list(name, ts),
                    Entry::Function(f) => builder.input_fn(name, f),
                };
            }
        }
    }

    for (name, source) in &def.params {
        builder = match compile_entry(&def.name, name, source, ctx)? {
            Entry::Template(t) => builder.param(name, t),
            Entry::List(ts) => builder.param_list(name, ts),
            Entry::Function(f) => builder.param_fn(name, f),
        };
    }

    if let Some(shell) = &def.shell {
        builder = builder.shell(shell);
    }
    for (wildcard, regex) in &def.wildcard_constraints {
        builder = builder.constraint(wildcard, regex);
    }
    for (wildcard, regex) in global_constraints {
        builder = builder.default_constraint(wildcard, regex);
    }

    builder.build()
}

fn compile_entry(rule: &str, entry: &str, source: &SourceDef, ctx: &Context<'_>) -> Result<Entry> {
    Ok(match source {
        SourceDef::Template(t) => Entry::Template(t.clone()),
        SourceDef::Bool(b) => Entry::Template(b.to_string()),
        SourceDef::Number(n) => Entry::Template(n.to_string()),
        SourceDef::List(ts) => Entry::List(ts.clone()),
        SourceDef::Function(def) => Entry::Function(compile_function(rule, entry, def, ctx)?),
    })
}

fn compile_function(
    rule: &str,
    entry: &str,
    def: &FunctionDef,
    ctx: &Context<'_>,
) -> Result<FunctionRef> {
    let func = match (&def.function, &def.lookup, &def.expand, &def.glob) {
        (Some(name), None, None, None) => {
            ctx.functions
                .get(name)
                .ok_or_else(|| RuleGraphError::UnknownFunction {
                    name: name.clone(),
                    rule: rule.to_string(),
                })?
        }
        (None, Some(lookup), None, None) => {
            let mut func = Lookup::new(Arc::clone(&ctx.config), &lookup.table, &lookup.key);
            if let Some(template) = &lookup.template {
                func = func.with_template(Template::parse(template)?);
            }
            FunctionRef::from_function(format!("lookup({})", lookup.table), func)
        }
        (None, None, Some(expand), None) => {
            let mut func = Expand::new(Template::parse(&expand.template)?);
            for (name, values) in &expand.values {
                let values = match values {
                    ValuesDef::List(items) => items.clone(),
                    ValuesDef::Config { config } => config_values(&ctx.config, config)?,
                };
                func = func.values(name, values);
            }
            if let Some(pattern) = &expand.glob {
                func = func.scan(Template::parse(pattern)?, ctx.workdir);
            }
            FunctionRef::from_function(format!("expand({})", expand.template), func)
        }
        (None, None, None, Some(pattern)) => FunctionRef::from_function(
            format!("glob({})", pattern),
            Glob::new(Template::parse(pattern)?, ctx.workdir),
        ),
        _ => {
            return Err(RuleGraphError::InvalidRule {
                rule: rule.to_string(),
                reason: format!(
                    "entry '{}' must set exactly one of function, lookup, expand or glob",
                    entry
                ),
            })
        }
    };

    Ok(func.allow_empty(def.allow_empty))
}

/// Expand values taken from the config: a list of strings, the keys of a
/// mapping, or a single string
fn config_values(config: &Value, path: &str) -> Result<Vec<String>> {
    let value = get_path(config, path).ok_or_else(|| RuleGraphError::Config {
        reason: format!("expand values refer to missing config entry '{}'", path),
    })?;

    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Object(map) => Ok(map.keys().cloned().collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(RuleGraphError::Config {
                    reason: format!("config '{}' contains non-scalar value {}", path, other),
                }),
            })
            .collect(),
        other => Err(RuleGraphError::Config {
            reason: format!("config '{}' must be a list or mapping, got {}", path, other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::resolve;
    use crate::pattern::WildcardBinding;
    use crate::rules::FunctionOutput;

    fn compile(yaml: &str) -> Result<RuleRegistry> {
        compile_with(yaml, &FunctionTable::new())
    }

    fn compile_with(yaml: &str, functions: &FunctionTable) -> Result<RuleRegistry> {
        Rulefile::from_yaml(yaml)?.to_registry(functions, Path::new("."))
    }

    fn binding(pairs: &[(&str, &str)]) -> WildcardBinding {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_lookup_from_config() {
        let registry = compile(
            r#"
schema: rulegraph/rules@0.1
config:
  samples:
    s1: [in/s1_a.txt, in/s1_b.txt]
rules:
  - name: combine
    output: out/{sample}.txt
    input:
      parts:
        lookup: { table: samples, key: sample }
    shell: cat {input.parts} > {output}
"#,
        )
        .unwrap();

        let rule = registry.get("combine").unwrap();
        let job = resolve(rule, &binding(&[("sample", "s1")])).unwrap();
        assert_eq!(job.inputs["parts"], vec!["in/s1_a.txt", "in/s1_b.txt"]);
        assert_eq!(
            job.command.as_deref(),
            Some("cat in/s1_a.txt in/s1_b.txt > out/s1.txt")
        );
    }

    #[test]
    fn test_named_function_from_table() {
        let functions = FunctionTable::new().with("pair", |w: &WildcardBinding| {
            let s = w.get("sample").unwrap_or_default();
            Ok(FunctionOutput::from(vec![
                format!("in/{}_a.txt", s),
                format!("in/{}_b.txt", s),
            ]))
        });
        let registry = compile_with(
            r#"
schema: rulegraph/rules@0.1
rules:
  - name: combine
    output: out/{sample}.txt
    input:
      parts:
        function: pair
"#,
            &functions,
        )
        .unwrap();
        let job = resolve(registry.get("combine").unwrap(), &binding(&[("sample", "s1")])).unwrap();
        assert_eq!(job.inputs["parts"], vec!["in/s1_a.txt", "in/s1_b.txt"]);
    }

    #[test]
    fn test_unknown_function() {
        let err = compile(
            r#"
schema: rulegraph/rules@0.1
rules:
  - name: combine
    output: out/{sample}.txt
    input:
      parts:
        function: nope
"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "RG-015");
    }

    #[test]
    fn test_unnamed_function_entry_rejected() {
        let err = compile(
            r#"
schema: rulegraph/rules@0.1
rules:
  - name: combine
    output: out/{sample}.txt
    input:
      function: pair
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("looks like an input function"));
    }

    #[test]
    fn test_two_function_kinds_rejected() {
        let err = compile(
            r#"
schema: rulegraph/rules@0.1
rules:
  - name: r
    output: out/{s}.txt
    input:
      x:
        function: f
        glob: in/{s}/{n}.txt
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_expand_with_config_values() {
        let registry = compile(
            r#"
schema: rulegraph/rules@0.1
config:
  samples: { a: x.fq, b: y.fq }
rules:
  - name: report
    output: report.txt
    input:
      counts:
        expand:
          template: counts/{sample}.txt
          values:
            sample: { config: samples }
"#,
        )
        .unwrap();
        let job = resolve(registry.get("report").unwrap(), &WildcardBinding::new()).unwrap();
        assert_eq!(job.inputs["counts"], vec!["counts/a.txt", "counts/b.txt"]);
    }

    #[test]
    fn test_expand_missing_config_values() {
        let err = compile(
            r#"
schema: rulegraph/rules@0.1
rules:
  - name: report
    output: report.txt
    input:
      counts:
        expand:
          template: counts/{sample}.txt
          values:
            sample: { config: samples }
"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "RG-002");
    }

    #[test]
    fn test_global_constraints_and_rule_order() {
        let registry = compile(
            r#"
schema: rulegraph/rules@0.1
wildcard_constraints:
  sample: "[a-z0-9]+"
rule_order: [specific, generic]
rules:
  - name: generic
    output: out/{name}
  - name: specific
    output: out/{sample}.txt
"#,
        )
        .unwrap();

        let (rule, b) = registry.find_producer("out/s1.txt").unwrap().unwrap();
        assert_eq!(rule.name(), "specific");
        assert_eq!(b.get("sample"), Some("s1"));

        let (rule, _) = registry.find_producer("out/S_1.txt").unwrap().unwrap();
        assert_eq!(rule.name(), "generic");
    }

    #[test]
    fn test_scalar_params() {
        let registry = compile(
            r#"
schema: rulegraph/rules@0.1
rules:
  - name: r
    output: out/{s}.txt
    params:
      threads: 4
      verbose: false
    shell: "tool -t {params.threads} -v {params.verbose} > {output}"
"#,
        )
        .unwrap();
        let job = resolve(registry.get("r").unwrap(), &binding(&[("s", "a")])).unwrap();
        assert_eq!(job.command.as_deref(), Some("tool -t 4 -v false > out/a.txt"));
    }

    #[test]
    fn test_duplicate_output_across_rules() {
        let err = compile(
            r#"
schema: rulegraph/rules@0.1
rules:
  - name: a
    output: out/{s}.txt
  - name: b
    output: out/{s}.txt
"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "RG-010");
    }
}
