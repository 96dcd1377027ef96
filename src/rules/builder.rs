//! Fluent construction of rules
//!
//! All validation happens in [`RuleBuilder::build`], so builder methods stay
//! infallible and chain freely.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::action::ActionTemplate;
use super::function::FunctionRef;
use super::rule::{RulePattern, Source};
use crate::error::{Result, RuleGraphError};
use crate::pattern::{Template, TemplateMatcher};

/// Rule names: identifier-like, dashes allowed
static RULE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").unwrap());

/// Source declaration awaiting parsing
enum PendingSource {
    Template(String),
    List(Vec<String>),
    Function(FunctionRef),
}

// ============================================================================
// RULE BUILDER
// ============================================================================

/// Builder for [`RulePattern`]
///
/// Unnamed outputs and inputs are keyed by their position ("0", "1", ...).
pub struct RuleBuilder {
    name: String,
    outputs: Vec<(Option<String>, String)>,
    inputs: Vec<(Option<String>, PendingSource)>,
    params: Vec<(String, PendingSource)>,
    shell: Option<String>,
    constraints: IndexMap<String, String>,
}

impl RuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outputs: Vec::new(),
            inputs: Vec::new(),
            params: Vec::new(),
            shell: None,
            constraints: IndexMap::new(),
        }
    }

    /// Add a positional output template
    pub fn output(mut self, template: impl Into<String>) -> Self {
        self.outputs.push((None, template.into()));
        self
    }

    pub fn named_output(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.outputs.push((Some(name.into()), template.into()));
        self
    }

    /// Add a positional input template
    pub fn input(mut self, template: impl Into<String>) -> Self {
        self.inputs
            .push((None, PendingSource::Template(template.into())));
        self
    }

    pub fn named_input(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.inputs
            .push((Some(name.into()), PendingSource::Template(template.into())));
        self
    }

    pub fn input_list<I, S>(mut self, name: impl Into<String>, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = templates.into_iter().map(Into::into).collect();
        self.inputs
            .push((Some(name.into()), PendingSource::List(list)));
        self
    }

    /// Input computed per job by an input function
    pub fn input_fn(mut self, name: impl Into<String>, func: FunctionRef) -> Self {
        self.inputs
            .push((Some(name.into()), PendingSource::Function(func)));
        self
    }

    pub fn param(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.params
            .push((name.into(), PendingSource::Template(template.into())));
        self
    }

    pub fn param_list<I, S>(mut self, name: impl Into<String>, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = templates.into_iter().map(Into::into).collect();
        self.params.push((name.into(), PendingSource::List(list)));
        self
    }

    pub fn param_fn(mut self, name: impl Into<String>, func: FunctionRef) -> Self {
        self.params
            .push((name.into(), PendingSource::Function(func)));
        self
    }

    /// Shell command template
    pub fn shell(mut self, command: impl Into<String>) -> Self {
        self.shell = Some(command.into());
        self
    }

    /// Rule-level constraint (overrides a global one)
    pub fn constraint(mut self, wildcard: impl Into<String>, regex: impl Into<String>) -> Self {
        self.constraints.insert(wildcard.into(), regex.into());
        self
    }

    /// Global constraint: applies only when the rule sets none for `wildcard`
    pub fn default_constraint(
        mut self,
        wildcard: impl Into<String>,
        regex: impl Into<String>,
    ) -> Self {
        self.constraints
            .entry(wildcard.into())
            .or_insert_with(|| regex.into());
        self
    }

    /// Validate and build the rule
    pub fn build(self) -> Result<RulePattern> {
        let name = self.name;
        let invalid = |reason: String| RuleGraphError::InvalidRule {
            rule: name.clone(),
            reason,
        };

        if !RULE_NAME.is_match(&name) {
            return Err(invalid(
                "rule names must start with a letter or '_' and contain only letters, digits, '_' or '-'".into(),
            ));
        }
        if self.outputs.is_empty() {
            return Err(invalid("declares no outputs".into()));
        }

        // Outputs
        let mut outputs: IndexMap<String, Template> = IndexMap::new();
        for (i, (entry, raw)) in self.outputs.into_iter().enumerate() {
            let entry = entry.unwrap_or_else(|| i.to_string());
            let template = Template::parse(&raw)?;
            if outputs.values().any(|t| t == &template) {
                return Err(invalid(format!("output '{}' is declared twice", raw)));
            }
            if outputs.insert(entry.clone(), template).is_some() {
                return Err(invalid(format!("output name '{}' is used twice", entry)));
            }
        }

        let mut wildcard_sets = outputs
            .values()
            .map(|t| t.wildcard_names().into_iter().collect::<BTreeSet<_>>());
        let bound = wildcard_sets.next().unwrap_or_default();
        if let Some(other) = wildcard_sets.find(|set| *set != bound) {
            return Err(invalid(format!(
                "output templates use different wildcards ({:?} vs {:?})",
                bound, other
            )));
        }

        // Inputs and params
        let inputs = parse_sources(
            &name,
            self.inputs
                .into_iter()
                .enumerate()
                .map(|(i, (entry, source))| (entry.unwrap_or_else(|| i.to_string()), source)),
            &bound,
        )?;
        let params = parse_sources(&name, self.params.into_iter(), &bound)?;

        // Action
        let action = match self.shell {
            Some(raw) => {
                let action = ActionTemplate::parse(&name, &raw)?;
                let input_names: Vec<&str> = inputs.keys().map(String::as_str).collect();
                let output_names: Vec<&str> = outputs.keys().map(String::as_str).collect();
                let param_names: Vec<&str> = params.keys().map(String::as_str).collect();
                let wildcard_names: Vec<&str> = bound.iter().copied().collect();
                action.check_names(
                    &name,
                    &input_names,
                    &output_names,
                    &param_names,
                    &wildcard_names,
                )?;
                Some(action)
            }
            None => None,
        };

        let matchers = outputs
            .values()
            .map(|t| TemplateMatcher::compile(t, &self.constraints))
            .collect::<Result<Vec<_>>>()?;

        Ok(RulePattern {
            name: Arc::from(name.as_str()),
            outputs,
            inputs,
            params,
            action,
            constraints: self.constraints,
            matchers,
        })
    }
}

fn parse_sources(
    rule: &str,
    entries: impl Iterator<Item = (String, PendingSource)>,
    bound: &BTreeSet<&str>,
) -> Result<IndexMap<String, Source>> {
    let mut sources = IndexMap::new();

    for (entry, pending) in entries {
        let source = match pending {
            PendingSource::Template(raw) => Source::Template(Template::parse(&raw)?),
            PendingSource::List(raws) => Source::List(
                raws.iter()
                    .map(|raw| Template::parse(raw))
                    .collect::<Result<Vec<_>>>()?,
            ),
            PendingSource::Function(func) => Source::Function(func),
        };

        for template in source.templates() {
            if let Some(unbound) = template
                .wildcard_names()
                .into_iter()
                .find(|w| !bound.contains(w))
            {
                return Err(RuleGraphError::UnboundWildcard {
                    rule: rule.to_string(),
                    wildcard: unbound.to_string(),
                    template: template.to_string(),
                });
            }
        }

        if sources.insert(entry.clone(), source).is_some() {
            return Err(RuleGraphError::InvalidRule {
                rule: rule.to_string(),
                reason: format!("entry '{}' is declared twice", entry),
            });
        }
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::WildcardBinding;

    #[test]
    fn test_build_minimal_rule() {
        let rule = RuleBuilder::new("combine")
            .output("out/{sample}.txt")
            .input("in/{sample}.txt")
            .shell("cat {input} > {output}")
            .build()
            .unwrap();
        assert_eq!(rule.name(), "combine");
        assert_eq!(rule.outputs().keys().collect::<Vec<_>>(), vec!["0"]);
        assert_eq!(rule.inputs().keys().collect::<Vec<_>>(), vec!["0"]);
        assert!(rule.action().is_some());
    }

    #[test]
    fn test_unbound_input_wildcard_rejected() {
        let err = RuleBuilder::new("combine")
            .output("out/{sample}.txt")
            .named_input("reads", "in/{sample}_{lane}.txt")
            .build()
            .unwrap_err();
        match err {
            RuleGraphError::UnboundWildcard {
                rule,
                wildcard,
                template,
            } => {
                assert_eq!(rule, "combine");
                assert_eq!(wildcard, "lane");
                assert_eq!(template, "in/{sample}_{lane}.txt");
            }
            other => panic!("Expected UnboundWildcard, got {:?}", other),
        }
    }

    #[test]
    fn test_unbound_param_wildcard_rejected() {
        let err = RuleBuilder::new("p")
            .output("out/{a}.txt")
            .param("tag", "{b}")
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleGraphError::UnboundWildcard { .. }));
    }

    #[test]
    fn test_outputs_must_share_wildcards() {
        let err = RuleBuilder::new("split")
            .output("out/{a}.txt")
            .output("out/{b}.log")
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "RG-012");
    }

    #[test]
    fn test_no_outputs_rejected() {
        let err = RuleBuilder::new("empty").input("a.txt").build().unwrap_err();
        assert!(err.to_string().contains("no outputs"));
    }

    #[test]
    fn test_bad_rule_name_rejected() {
        assert!(RuleBuilder::new("has space").output("x").build().is_err());
        assert!(RuleBuilder::new("trim-reads").output("x").build().is_ok());
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let err = RuleBuilder::new("r")
            .output("o.txt")
            .named_input("a", "x.txt")
            .named_input("a", "y.txt")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_action_names_checked() {
        let err = RuleBuilder::new("r")
            .output("out/{s}.txt")
            .named_input("reads", "in/{s}.txt")
            .shell("cat {input.raeds} > {output}")
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "RG-032");

        assert!(RuleBuilder::new("r")
            .output("out/{s}.txt")
            .shell("echo {wildcards.s} {wildcards.t}")
            .build()
            .is_err());
    }

    #[test]
    fn test_function_inputs_skip_static_check() {
        let f = FunctionRef::new("any", |_: &WildcardBinding| Ok("in/{other}.txt".into()));
        assert!(RuleBuilder::new("r")
            .output("out/{s}.txt")
            .input_fn("reads", f)
            .build()
            .is_ok());
    }

    #[test]
    fn test_default_constraint_does_not_override() {
        let rule = RuleBuilder::new("r")
            .output("out/{s}.txt")
            .constraint("s", "[0-9]+")
            .default_constraint("s", "[a-z]+")
            .build()
            .unwrap();
        assert_eq!(rule.constraints()["s"], "[0-9]+");
        assert!(rule.match_output("out/12.txt").is_some());
        assert!(rule.match_output("out/ab.txt").is_none());
    }
}
