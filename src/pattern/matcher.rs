//! Template → regex compilation and path matching

use indexmap::IndexMap;
use regex::Regex;

use super::template::{Segment, Template};
use super::WildcardBinding;
use crate::error::{Result, RuleGraphError};

/// Pattern used for wildcards without any constraint
pub const DEFAULT_CONSTRAINT: &str = ".+";

/// A template compiled to an anchored regex.
///
/// Each wildcard occurrence gets its own capture group (`w0`, `w1`, ...).
/// The regex crate has no backreferences, so a template that repeats a
/// wildcard is matched by backtracking over split points instead, with every
/// occurrence after the first required to equal the first.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    template: Template,
    regex: Regex,
    /// Wildcard name per capture group, in group order
    groups: Vec<String>,
    /// Set when a wildcard occurs more than once
    repeated: Option<Vec<Part>>,
}

/// One template segment with its constraint compiled to a full-match regex
#[derive(Debug, Clone)]
enum Part {
    Literal(String),
    Wildcard { name: String, check: Regex },
}

impl TemplateMatcher {
    /// Compile `template`.
    ///
    /// Constraint precedence: inline `{name,regex}` first, then `constraints`
    /// (rule-level merged over global), then [`DEFAULT_CONSTRAINT`].
    pub fn compile(template: &Template, constraints: &IndexMap<String, String>) -> Result<Self> {
        let mut pattern = String::from("^");
        let mut groups: Vec<String> = Vec::new();
        let mut parts = Vec::new();
        let mut has_repeats = false;

        for segment in template.segments() {
            match segment {
                Segment::Literal(text) => {
                    pattern.push_str(&regex::escape(text));
                    parts.push((None, text.as_str()));
                }
                Segment::Wildcard { name, constraint } => {
                    let constraint = constraint
                        .as_deref()
                        .or_else(|| constraints.get(name).map(String::as_str))
                        .unwrap_or(DEFAULT_CONSTRAINT);
                    pattern.push_str(&format!("(?P<w{}>{})", groups.len(), constraint));
                    has_repeats |= groups.contains(name);
                    groups.push(name.clone());
                    parts.push((Some(name.as_str()), constraint));
                }
            }
        }
        pattern.push('$');

        let invalid = |wildcard: String, e: regex::Error| RuleGraphError::InvalidConstraint {
            wildcard,
            reason: format!("template '{}': {}", template, e),
        };
        let regex =
            Regex::new(&pattern).map_err(|e| invalid(groups.last().cloned().unwrap_or_default(), e))?;

        let repeated = if has_repeats {
            let compiled = parts
                .into_iter()
                .map(|(name, text)| match name {
                    None => Ok(Part::Literal(text.to_string())),
                    Some(name) => Regex::new(&format!("^(?:{})$", text))
                        .map(|check| Part::Wildcard {
                            name: name.to_string(),
                            check,
                        })
                        .map_err(|e| invalid(name.to_string(), e)),
                })
                .collect::<Result<Vec<_>>>()?;
            Some(compiled)
        } else {
            None
        };

        Ok(Self {
            template: template.clone(),
            regex,
            groups,
            repeated,
        })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Match a concrete path, returning the binding on success.
    ///
    /// Matching is greedy: `{a}_{b}.txt` against `x_y_z.txt` binds
    /// `a=x_y, b=z`.
    pub fn matches(&self, path: &str) -> Option<WildcardBinding> {
        if let Some(parts) = &self.repeated {
            let mut values = IndexMap::new();
            return match_parts(parts, path, &mut values)
                .then(|| values.into_iter().collect());
        }

        let captures = self.regex.captures(path)?;
        let mut values = Vec::with_capacity(self.groups.len());
        for (i, name) in self.groups.iter().enumerate() {
            values.push((name.as_str(), captures.name(&format!("w{}", i))?.as_str()));
        }
        Some(values.into_iter().collect())
    }
}

/// Backtracking match for templates with repeated wildcards.
///
/// First occurrences try the longest value first, which gives the same
/// split as the greedy regex would. Later occurrences must repeat it.
fn match_parts<'p>(parts: &[Part], rest: &'p str, values: &mut IndexMap<String, &'p str>) -> bool {
    let Some((part, tail)) = parts.split_first() else {
        return rest.is_empty();
    };

    match part {
        Part::Literal(text) => rest
            .strip_prefix(text.as_str())
            .is_some_and(|rest| match_parts(tail, rest, values)),
        Part::Wildcard { name, check } => {
            if let Some(bound) = values.get(name).copied() {
                return rest
                    .strip_prefix(bound)
                    .is_some_and(|rest| match_parts(tail, rest, values));
            }

            let ends = rest
                .char_indices()
                .map(|(i, _)| i)
                .skip(1)
                .chain(std::iter::once(rest.len()));
            let mut ends: Vec<usize> = ends.collect();
            ends.reverse();
            if !rest.is_empty() && check.is_match("") {
                ends.push(0);
            }

            for end in ends {
                let value = &rest[..end];
                if !check.is_match(value) {
                    continue;
                }
                values.insert(name.clone(), value);
                if match_parts(tail, &rest[end..], values) {
                    return true;
                }
                values.shift_remove(name);
            }
            false
        }
    }
}

/// Match `path` against a single template with no extra constraints
pub fn match_template(template: &Template, path: &str) -> Option<WildcardBinding> {
    if !template.could_match(path) {
        return None;
    }
    TemplateMatcher::compile(template, &IndexMap::new())
        .ok()?
        .matches(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> Template {
        Template::parse(raw).unwrap()
    }

    #[test]
    fn test_match_single_wildcard() {
        let b = match_template(&t("out/{sample}.txt"), "out/s1.txt").unwrap();
        assert_eq!(b.get("sample"), Some("s1"));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_literal_dots_are_escaped() {
        assert!(match_template(&t("out/{sample}.txt"), "out/s1xtxt").is_none());
    }

    #[test]
    fn test_greedy_split() {
        let b = match_template(&t("{a}_{b}.txt"), "x_y_z.txt").unwrap();
        assert_eq!(b.get("a"), Some("x_y"));
        assert_eq!(b.get("b"), Some("z"));
    }

    #[test]
    fn test_repeated_wildcard_must_agree() {
        let tpl = t("{cond}/{sample}_{cond}.fq");
        let b = match_template(&tpl, "ctl/s1_ctl.fq").unwrap();
        assert_eq!(b.get("cond"), Some("ctl"));
        assert_eq!(b.len(), 2);
        assert!(match_template(&tpl, "ctl/s1_trt.fq").is_none());
    }

    #[test]
    fn test_repeated_wildcard_needs_shorter_split() {
        let tpl = t("{cond}/{sample}_{cond}.fq");
        let b = match_template(&tpl, "a_b/x_a_b.fq").unwrap();
        assert_eq!(b.get("cond"), Some("a_b"));
        assert_eq!(b.get("sample"), Some("x"));
        assert_eq!(tpl.substitute(&b).unwrap(), "a_b/x_a_b.fq");
    }

    #[test]
    fn test_repeated_wildcard_respects_constraints() {
        let tpl = t(r"{id,\d+}/{name}_{id}.txt");
        let b = match_template(&tpl, "12/run_7_12.txt").unwrap();
        assert_eq!(b.get("id"), Some("12"));
        assert_eq!(b.get("name"), Some("run_7"));
        assert!(match_template(&tpl, "ab/run_ab.txt").is_none());
    }

    #[test]
    fn test_inline_constraint_wins_over_rule_constraint() {
        let tpl = t(r"ids/{id,\d+}.txt");
        let mut constraints = IndexMap::new();
        constraints.insert("id".to_string(), "[a-z]+".to_string());
        let m = TemplateMatcher::compile(&tpl, &constraints).unwrap();
        assert!(m.matches("ids/42.txt").is_some());
        assert!(m.matches("ids/abc.txt").is_none());
    }

    #[test]
    fn test_rule_constraint_applies() {
        let tpl = t("plots/{sample}.{ext}");
        let mut constraints = IndexMap::new();
        constraints.insert("ext".to_string(), "png|svg".to_string());
        let m = TemplateMatcher::compile(&tpl, &constraints).unwrap();

        let b = m.matches("plots/a.b.svg").unwrap();
        assert_eq!(b.get("sample"), Some("a.b"));
        assert!(m.matches("plots/a.pdf").is_none());
    }

    #[test]
    fn test_bad_rule_constraint_is_reported() {
        let mut constraints = IndexMap::new();
        constraints.insert("s".to_string(), "(".to_string());
        let err = TemplateMatcher::compile(&t("{s}.txt"), &constraints).unwrap_err();
        assert!(matches!(err, RuleGraphError::InvalidConstraint { .. }));
    }

    #[test]
    fn test_literal_template_matches_exactly() {
        let tpl = t("results/all.txt");
        assert_eq!(match_template(&tpl, "results/all.txt"), Some(WildcardBinding::new()));
        assert!(match_template(&tpl, "results/all.txt2").is_none());
    }
}
