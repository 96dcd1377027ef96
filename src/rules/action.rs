//! Action templates: the `shell:` command of a rule
//!
//! Placeholders:
//! - `{input}` / `{output}` / `{params}`: every value, space-joined
//! - `{input.NAME}` / `{output.NAME}` / `{params.NAME}`: one entry
//! - `{wildcards.NAME}`: a bound wildcard
//! - `{rule}`: the rule name
//!
//! `{{` and `}}` produce literal braces.

use crate::dag::{Job, ParamValue};
use crate::error::{Result, RuleGraphError};
use crate::pattern::template::{tokenize, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Input(Option<String>),
    Output(Option<String>),
    Params(Option<String>),
    Wildcard(String),
    Rule,
}

/// A parsed action command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTemplate {
    raw: String,
    parts: Vec<Part>,
}

impl ActionTemplate {
    pub fn parse(rule: &str, raw: &str) -> Result<Self> {
        let tokens = tokenize(raw).map_err(|e| action_error(rule, e.to_string()))?;
        let mut parts = Vec::with_capacity(tokens.len());

        for token in tokens {
            let part = match token {
                Token::Literal(text) => Part::Literal(text),
                Token::Placeholder { content, .. } => parse_placeholder(rule, content.trim())?,
            };
            parts.push(part);
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Ensure every named placeholder refers to a declared entry
    pub(crate) fn check_names(
        &self,
        rule: &str,
        inputs: &[&str],
        outputs: &[&str],
        params: &[&str],
        wildcards: &[&str],
    ) -> Result<()> {
        for part in &self.parts {
            let (kind, name, known) = match part {
                Part::Input(Some(n)) => ("input", n, inputs),
                Part::Output(Some(n)) => ("output", n, outputs),
                Part::Params(Some(n)) => ("params", n, params),
                Part::Wildcard(n) => ("wildcards", n, wildcards),
                _ => continue,
            };
            if !known.contains(&name.as_str()) {
                return Err(action_error(
                    rule,
                    format!("'{{{}.{}}}' does not name a declared {} entry", kind, name, kind),
                ));
            }
        }
        Ok(())
    }

    /// Render against a resolved job.
    ///
    /// Names were checked when the rule was built, so lookups cannot miss.
    pub fn render(&self, job: &Job) -> String {
        let mut out = String::with_capacity(self.raw.len() * 2);
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Input(None) => out.push_str(&join(job.inputs.values().flatten())),
                Part::Input(Some(name)) => {
                    out.push_str(&join(job.inputs.get(name).into_iter().flatten()))
                }
                Part::Output(None) => out.push_str(&join(job.outputs.values())),
                Part::Output(Some(name)) => {
                    out.push_str(job.outputs.get(name).map(String::as_str).unwrap_or_default())
                }
                Part::Params(None) => out.push_str(&join_params(job.params.values())),
                Part::Params(Some(name)) => {
                    out.push_str(&join_params(job.params.get(name).into_iter()))
                }
                Part::Wildcard(name) => {
                    out.push_str(job.wildcards.get(name).unwrap_or_default())
                }
                Part::Rule => out.push_str(&job.rule),
            }
        }
        out
    }
}

fn parse_placeholder(rule: &str, content: &str) -> Result<Part> {
    let (kind, name) = match content.split_once('.') {
        Some((kind, name)) if !name.is_empty() => (kind, Some(name.to_string())),
        Some(_) => return Err(action_error(rule, format!("empty name in '{{{}}}'", content))),
        None => (content, None),
    };

    match (kind, name) {
        ("input", name) => Ok(Part::Input(name)),
        ("output", name) => Ok(Part::Output(name)),
        ("params", name) => Ok(Part::Params(name)),
        ("wildcards", Some(name)) => Ok(Part::Wildcard(name)),
        ("rule", None) => Ok(Part::Rule),
        _ => Err(action_error(
            rule,
            format!("unknown placeholder '{{{}}}'", content),
        )),
    }
}

fn action_error(rule: &str, reason: String) -> RuleGraphError {
    RuleGraphError::ActionTemplate {
        rule: rule.to_string(),
        reason,
    }
}

fn join<'a>(values: impl Iterator<Item = &'a String>) -> String {
    values.map(String::as_str).collect::<Vec<_>>().join(" ")
}

fn join_params<'a>(values: impl Iterator<Item = &'a ParamValue>) -> String {
    values
        .map(ParamValue::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

// Helper for building a job by hand in tests
#[cfg(test)]
pub(crate) fn sample_job() -> Job {
    use indexmap::IndexMap;
    use std::sync::Arc;

    let mut outputs = IndexMap::new();
    outputs.insert("0".to_string(), "out/s1.txt".to_string());
    let mut inputs = IndexMap::new();
    inputs.insert(
        "reads".to_string(),
        vec!["in/s1_a.txt".to_string(), "in/s1_b.txt".to_string()],
    );
    inputs.insert("ref".to_string(), vec!["ref.fa".to_string()]);
    let mut params = IndexMap::new();
    params.insert("threads".to_string(), ParamValue::Single("4".into()));

    Job {
        rule: Arc::from("combine"),
        wildcards: [("sample", "s1")].into_iter().collect(),
        outputs,
        inputs,
        params,
        command: None,
    }
}
