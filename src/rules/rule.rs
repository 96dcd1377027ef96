//! Rule patterns and their input sources

use std::sync::Arc;

use indexmap::IndexMap;

use super::action::ActionTemplate;
use super::builder::RuleBuilder;
use super::function::FunctionRef;
use crate::pattern::{Template, TemplateMatcher, WildcardBinding};

/// Where an input or param entry gets its value
#[derive(Debug, Clone)]
pub enum Source {
    /// One path template, substituted with the job binding
    Template(Template),
    /// A literal list of templates, substituted element-wise
    List(Vec<Template>),
    /// Computed per job once wildcards are bound
    Function(FunctionRef),
}

impl Source {
    /// Static templates of this source (empty for functions)
    pub fn templates(&self) -> &[Template] {
        match self {
            Self::Template(t) => std::slice::from_ref(t),
            Self::List(ts) => ts,
            Self::Function(_) => &[],
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Template(_) => "template",
            Self::List(_) => "list",
            Self::Function(_) => "function",
        }
    }
}

/// A declared rule.
///
/// Built through [`RuleBuilder`], which enforces that every wildcard used by
/// an input or param template is bound by the outputs.
#[derive(Debug)]
pub struct RulePattern {
    pub(super) name: Arc<str>,
    pub(super) outputs: IndexMap<String, Template>,
    pub(super) inputs: IndexMap<String, Source>,
    pub(super) params: IndexMap<String, Source>,
    pub(super) action: Option<ActionTemplate>,
    pub(super) constraints: IndexMap<String, String>,
    pub(super) matchers: Vec<TemplateMatcher>,
}

impl RulePattern {
    pub fn builder(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the name (jobs keep one per job)
    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn outputs(&self) -> &IndexMap<String, Template> {
        &self.outputs
    }

    pub fn inputs(&self) -> &IndexMap<String, Source> {
        &self.inputs
    }

    pub fn params(&self) -> &IndexMap<String, Source> {
        &self.params
    }

    pub fn action(&self) -> Option<&ActionTemplate> {
        self.action.as_ref()
    }

    /// Effective constraints (global merged under rule-level)
    pub fn constraints(&self) -> &IndexMap<String, String> {
        &self.constraints
    }

    /// Wildcards bound by the outputs, in first-occurrence order
    pub fn wildcard_names(&self) -> Vec<&str> {
        self.outputs
            .values()
            .next()
            .map(Template::wildcard_names)
            .unwrap_or_default()
    }

    /// Shape-only check used by the registry
    pub fn could_produce(&self, path: &str) -> bool {
        self.outputs.values().any(|t| t.could_match(path))
    }

    /// Bind wildcards from `path`.
    ///
    /// Every output template that matches must agree on the binding; a
    /// disagreement is no match.
    pub fn match_output(&self, path: &str) -> Option<WildcardBinding> {
        let mut binding: Option<WildcardBinding> = None;
        for matcher in &self.matchers {
            if !matcher.template().could_match(path) {
                continue;
            }
            if let Some(found) = matcher.matches(path) {
                binding = Some(match binding {
                    None => found,
                    Some(prev) => prev.merged(&found)?,
                });
            }
        }
        binding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_output_single() {
        let rule = RulePattern::builder("combine")
            .output("out/{sample}.txt")
            .input("in/{sample}.txt")
            .build()
            .unwrap();
        let b = rule.match_output("out/s1.txt").unwrap();
        assert_eq!(b.get("sample"), Some("s1"));
        assert!(rule.match_output("in/s1.txt").is_none());
        assert_eq!(rule.wildcard_names(), vec!["sample"]);
    }

    #[test]
    fn test_match_output_any_declared_output() {
        let rule = RulePattern::builder("align")
            .named_output("bam", "mapped/{sample}.bam")
            .named_output("log", "logs/{sample}.log")
            .build()
            .unwrap();
        assert_eq!(
            rule.match_output("logs/a.log").unwrap().get("sample"),
            Some("a")
        );
        assert!(rule.could_produce("mapped/a.bam"));
    }

    #[test]
    fn test_match_output_outputs_disagree() {
        let rule = RulePattern::builder("split")
            .output("{a}.txt")
            .output("x{a}")
            .build()
            .unwrap();
        assert!(rule.could_produce("x1.txt"));
        assert!(rule.match_output("x1.txt").is_none());
        assert_eq!(rule.match_output("y.txt").unwrap().get("a"), Some("y"));
        assert_eq!(rule.match_output("xyz").unwrap().get("a"), Some("yz"));
    }

    #[test]
    fn test_source_templates() {
        let t = Template::parse("a/{x}").unwrap();
        let source = Source::Template(t.clone());
        assert_eq!(source.templates(), std::slice::from_ref(&t));
        assert_eq!(source.kind(), "template");

        let f = Source::Function(FunctionRef::new("f", |_: &WildcardBinding| {
            Ok("x".into())
        }));
        assert!(f.templates().is_empty());
        assert!(f.is_function());
    }
}
