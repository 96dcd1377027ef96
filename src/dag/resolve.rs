//! Job resolution: (rule, binding) → concrete job
//!
//! Static templates are substituted directly. Input functions run here and
//! nowhere else, once per job; what they return is used verbatim.

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::job::{Job, ParamValue};
use crate::error::{Result, RuleGraphError};
use crate::pattern::{Template, WildcardBinding};
use crate::rules::{FunctionOutput, RulePattern, Source};

/// Instantiate `rule` for `binding`.
///
/// The binding must cover every output wildcard. Input entries keep
/// declaration order and each entry keeps the order its source produced.
pub fn resolve(rule: &RulePattern, binding: &WildcardBinding) -> Result<Job> {
    let mut outputs = IndexMap::with_capacity(rule.outputs().len());
    for (name, template) in rule.outputs() {
        outputs.insert(name.clone(), substitute(rule, template, binding)?);
    }

    let mut inputs = IndexMap::with_capacity(rule.inputs().len());
    for (name, source) in rule.inputs() {
        let paths = match resolve_source(rule, name, source, binding)? {
            ParamValue::Single(path) => vec![path],
            ParamValue::List(paths) => paths,
        };
        inputs.insert(name.clone(), paths);
    }

    let mut params = IndexMap::with_capacity(rule.params().len());
    for (name, source) in rule.params() {
        params.insert(name.clone(), resolve_source(rule, name, source, binding)?);
    }

    let mut job = Job {
        rule: rule.name_arc(),
        wildcards: binding.clone(),
        outputs,
        inputs,
        params,
        command: None,
    };
    job.command = rule.action().map(|action| action.render(&job));

    debug!(job = %job.label(), inputs = job.input_paths().count(), "resolved job");
    Ok(job)
}

fn resolve_source(
    rule: &RulePattern,
    entry: &str,
    source: &Source,
    binding: &WildcardBinding,
) -> Result<ParamValue> {
    match source {
        Source::Template(template) => Ok(ParamValue::Single(substitute(rule, template, binding)?)),
        Source::List(templates) => templates
            .iter()
            .map(|t| substitute(rule, t, binding))
            .collect::<Result<Vec<_>>>()
            .map(ParamValue::List),
        Source::Function(func) => {
            let fail = |reason: String| RuleGraphError::InputFunction {
                rule: rule.name().to_string(),
                entry: entry.to_string(),
                wildcards: binding.to_string(),
                reason,
            };

            trace!(rule = rule.name(), entry, function = func.name(), "calling input function");
            let output = func.call(binding).map_err(|e| fail(format!("{:#}", e)))?;

            if output.is_empty() && !func.allows_empty() {
                return Err(fail(format!(
                    "'{}' returned an empty result (set allow_empty to accept it)",
                    func.name()
                )));
            }

            Ok(match output {
                FunctionOutput::Path(path) => ParamValue::Single(path),
                FunctionOutput::Paths(paths) => ParamValue::List(paths),
            })
        }
    }
}

fn substitute(rule: &RulePattern, template: &Template, binding: &WildcardBinding) -> Result<String> {
    template
        .substitute(binding)
        .map_err(|wildcard| RuleGraphError::UnboundWildcard {
            rule: rule.name().to_string(),
            wildcard,
            template: template.to_string(),
        })
}
