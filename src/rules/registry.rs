//! Rule registry
//!
//! Populated once at load time, then shared read-only (behind `Arc`) by the
//! resolver and the DAG builder.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::rule::RulePattern;
use crate::error::{Result, RuleGraphError};
use crate::pattern::WildcardBinding;

#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<RulePattern>>,
    by_name: HashMap<String, usize>,
    /// Literal output template → owning rule index
    output_owner: HashMap<String, usize>,
    /// Tie-break priority, earlier wins
    rule_order: Vec<String>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    ///
    /// Fails when the name is taken or an output template is already owned
    /// by another rule. Nothing is inserted on failure.
    pub fn register(&mut self, rule: RulePattern) -> Result<Arc<RulePattern>> {
        if self.by_name.contains_key(rule.name()) {
            return Err(RuleGraphError::DuplicateRule {
                rule: rule.name().to_string(),
            });
        }

        for template in rule.outputs().values() {
            if let Some(&owner) = self.output_owner.get(template.as_str()) {
                return Err(RuleGraphError::DuplicateOutput {
                    template: template.to_string(),
                    first_rule: self.rules[owner].name().to_string(),
                    second_rule: rule.name().to_string(),
                });
            }
        }

        let index = self.rules.len();
        for template in rule.outputs().values() {
            self.output_owner.insert(template.to_string(), index);
        }
        self.by_name.insert(rule.name().to_string(), index);

        debug!(rule = rule.name(), outputs = rule.outputs().len(), "registered rule");

        let rule = Arc::new(rule);
        self.rules.push(Arc::clone(&rule));
        Ok(rule)
    }

    /// Set the tie-break order. Every listed name must be registered.
    pub fn set_rule_order<I, S>(&mut self, order: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = order.into_iter().map(Into::into).collect();
        if let Some(unknown) = order.iter().find(|n| !self.by_name.contains_key(n.as_str())) {
            return Err(RuleGraphError::InvalidRule {
                rule: unknown.clone(),
                reason: "listed in rule_order but never declared".into(),
            });
        }
        self.rule_order = order;
        Ok(())
    }

    pub fn rule_order(&self) -> &[String] {
        &self.rule_order
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RulePattern>> {
        self.by_name.get(name).map(|&i| &self.rules[i])
    }

    /// Rules in registration order
    pub fn rules(&self) -> &[Arc<RulePattern>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules whose output shape is compatible with `path`, in registration
    /// order. No values are bound.
    pub fn lookup_by_output(&self, path: &str) -> Vec<Arc<RulePattern>> {
        self.rules
            .iter()
            .filter(|r| r.could_produce(path))
            .cloned()
            .collect()
    }

    /// The single rule producing `path`, with its binding.
    ///
    /// `Ok(None)` when no rule matches. Several matches are settled by
    /// `rule_order`; if that cannot pick one the path is ambiguous.
    pub fn find_producer(&self, path: &str) -> Result<Option<(Arc<RulePattern>, WildcardBinding)>> {
        let mut matched: Vec<(Arc<RulePattern>, WildcardBinding)> = self
            .lookup_by_output(path)
            .into_iter()
            .filter_map(|rule| rule.match_output(path).map(|b| (rule, b)))
            .collect();

        match matched.len() {
            0 => Ok(None),
            1 => Ok(matched.pop()),
            _ => {
                let names: Vec<&str> = matched.iter().map(|(r, _)| r.name()).collect();
                match self.preferred(&names) {
                    Some(winner) => {
                        debug!(path, rule = names[winner], "rule_order settled ambiguity");
                        Ok(Some(matched.swap_remove(winner)))
                    }
                    None => Err(RuleGraphError::AmbiguousRule {
                        path: path.to_string(),
                        rules: names.into_iter().map(String::from).collect(),
                    }),
                }
            }
        }
    }

    /// Index of the strictly highest-priority candidate, if any
    fn preferred(&self, candidates: &[&str]) -> Option<usize> {
        let rank = |name: &str| self.rule_order.iter().position(|n| n == name);

        let mut ranked: Vec<(usize, usize)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, name)| rank(name).map(|r| (r, i)))
            .collect();
        ranked.sort_unstable();

        // Unranked candidates never beat a ranked one
        ranked.first().map(|&(_, i)| i)
    }
}
