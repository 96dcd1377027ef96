//! Path templates
//!
//! A template is literal text interleaved with wildcard placeholders:
//! - `{name}` binds a wildcard
//! - `{name,regex}` binds a wildcard with an inline constraint
//! - `{{` and `}}` are literal braces
//!
//! The same tokenizer backs action templates (see `rules::action`), which
//! interpret placeholder contents differently.

use std::fmt;
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;
use regex::Regex;

use super::WildcardBinding;
use crate::error::{Result, RuleGraphError};

/// Valid wildcard names: identifier-like
static WILDCARD_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Raw token produced by the brace tokenizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Literal text with escapes already collapsed
    Literal(String),
    /// Text between `{` and the matching `}`
    Placeholder { content: String, position: usize },
}

/// Split `raw` into literals and placeholders.
///
/// Braces nest inside a placeholder so that `{id,\d{3}}` keeps its
/// quantifier.
pub(crate) fn tokenize(raw: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '{' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().map(|(_, c)| *c) == Some('}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                let mut depth = 1usize;
                let mut content = String::new();
                loop {
                    match chars.next() {
                        Some((_, '{')) => {
                            depth += 1;
                            content.push('{');
                        }
                        Some((_, '}')) => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            content.push('}');
                        }
                        Some((_, c)) => content.push(c),
                        None => return Err(parse_error(raw, i, "unclosed '{'")),
                    }
                }
                tokens.push(Token::Placeholder {
                    content,
                    position: i,
                });
            }
            '}' => {
                return Err(parse_error(
                    raw,
                    i,
                    "unmatched '}' (write '}}' for a literal brace)",
                ))
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }

    Ok(tokens)
}

pub(crate) fn parse_error(template: &str, position: usize, details: &str) -> RuleGraphError {
    RuleGraphError::TemplateParse {
        template: template.to_string(),
        position,
        details: details.to_string(),
    }
}

/// Escape literal text so it survives template parsing unchanged
pub fn escape(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// One piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Wildcard {
        name: String,
        constraint: Option<String>,
    },
}

/// A parsed path template such as `trimmed/{sample}.fq`
#[derive(Debug, Clone)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template, validating wildcard names and inline constraints
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();

        for token in tokenize(raw)? {
            match token {
                Token::Literal(text) => segments.push(Segment::Literal(text)),
                Token::Placeholder { content, position } => {
                    let (name, constraint) = match content.split_once(',') {
                        Some((name, constraint)) => (name.trim(), Some(constraint.to_string())),
                        None => (content.trim(), None),
                    };

                    if !WILDCARD_NAME.is_match(name) {
                        return Err(parse_error(
                            raw,
                            position,
                            &format!("invalid wildcard name '{}'", name),
                        ));
                    }

                    if let Some(ref constraint) = constraint {
                        validate_constraint(name, constraint)?;
                    }

                    segments.push(Segment::Wildcard {
                        name: name.to_string(),
                        constraint,
                    });
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// A template that matches exactly `path` (braces escaped)
    pub fn literal(path: &str) -> Self {
        let segments = if path.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Literal(path.to_string())]
        };
        Self {
            raw: escape(path),
            segments,
        }
    }

    /// Original template text
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Wildcard names in first-occurrence order, without repeats
    pub fn wildcard_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Wildcard { name, .. } = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn has_wildcards(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Wildcard { .. }))
    }

    /// Substitute every wildcard from `binding`.
    ///
    /// Returns the name of the first wildcard the binding lacks.
    pub fn substitute(&self, binding: &WildcardBinding) -> std::result::Result<String, String> {
        self.substitute_with(|name| binding.get(name))
    }

    /// Like [`substitute`](Self::substitute) with values from `lookup`
    pub fn substitute_with<'a, F>(&self, lookup: F) -> std::result::Result<String, String>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut out = String::with_capacity(self.raw.len() * 2);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Wildcard { name, .. } => match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => return Err(name.clone()),
                },
            }
        }
        Ok(out)
    }

    /// Substitute the wildcards `lookup` knows and keep the others.
    ///
    /// The result is template text again: literals are escaped and unknown
    /// placeholders are re-emitted with their constraints.
    pub fn substitute_partial<'a, F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut out = String::with_capacity(self.raw.len() * 2);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(&escape(text)),
                Segment::Wildcard { name, constraint } => match lookup(name) {
                    Some(value) => out.push_str(&escape(value)),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        if let Some(c) = constraint {
                            out.push(',');
                            out.push_str(c);
                        }
                        out.push('}');
                    }
                },
            }
        }
        out
    }

    /// Structural compatibility check used by the registry.
    ///
    /// Literal anchors must appear in order and every wildcard needs at
    /// least one character between them. Constraints and repeated-wildcard
    /// equality are left to the matcher.
    pub fn could_match(&self, path: &str) -> bool {
        let last = self.segments.len().saturating_sub(1);
        let mut pos = 0usize;
        let mut pending = 0usize;

        for (i, segment) in self.segments.iter().enumerate() {
            let lit = match segment {
                Segment::Wildcard { .. } => {
                    pending += 1;
                    continue;
                }
                Segment::Literal(lit) => lit,
            };

            let Some(min_start) = advance_chars(path, pos, pending) else {
                return false;
            };

            if pending == 0 {
                if !path[pos..].starts_with(lit.as_str()) {
                    return false;
                }
                pos += lit.len();
            } else if i == last {
                if path.len() < min_start + lit.len() || !path.ends_with(lit.as_str()) {
                    return false;
                }
                pos = path.len();
            } else {
                match path[min_start..].find(lit.as_str()) {
                    Some(offset) => pos = min_start + offset + lit.len(),
                    None => return false,
                }
            }
            pending = 0;
        }

        match advance_chars(path, pos, pending) {
            Some(end) if pending > 0 => end <= path.len(),
            Some(_) => pos == path.len(),
            None => false,
        }
    }
}

/// Byte offset `n` characters after `pos`, if the path is long enough
fn advance_chars(path: &str, pos: usize, n: usize) -> Option<usize> {
    if n == 0 {
        return Some(pos);
    }
    path[pos..]
        .char_indices()
        .nth(n - 1)
        .map(|(offset, ch)| pos + offset + ch.len_utf8())
}

fn validate_constraint(name: &str, constraint: &str) -> Result<()> {
    Regex::new(&format!("^(?:{})$", constraint))
        .map(|_| ())
        .map_err(|e| RuleGraphError::InvalidConstraint {
            wildcard: name.to_string(),
            reason: e.to_string(),
        })
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Template {}

impl Hash for Template {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
