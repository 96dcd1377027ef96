// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Error types with error codes and fix suggestions
//!
//! Error code ranges:
//! - RG-000-009: Rule file errors
//! - RG-010-019: Rule declaration errors
//! - RG-020-029: Matching errors
//! - RG-030-039: Resolution errors
//! - RG-040-049: DAG errors
//! - RG-050-059: Execution errors
//! - RG-090-099: IO / serialization errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuleGraphError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Every error is fatal to the build and carries the path/rule/wildcard
/// context that caused it.
#[derive(Error, Debug)]
pub enum RuleGraphError {
    // ═══════════════════════════════════════════
    // RULE FILE ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[RG-001] Invalid schema version: expected '{expected}', got '{actual}'")]
    InvalidSchema { expected: String, actual: String },

    #[error("[RG-002] Config error: {reason}")]
    Config { reason: String },

    #[error("[RG-003] No targets requested and the rule file declares no default targets")]
    NoTargets,

    // ═══════════════════════════════════════════
    // RULE DECLARATION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[RG-010] Output template '{template}' is declared by both '{first_rule}' and '{second_rule}'")]
    DuplicateOutput {
        template: String,
        first_rule: String,
        second_rule: String,
    },

    #[error("[RG-011] Rule '{rule}' is declared more than once")]
    DuplicateRule { rule: String },

    #[error("[RG-012] Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("[RG-013] Template parse error in '{template}' at position {position}: {details}")]
    TemplateParse {
        template: String,
        position: usize,
        details: String,
    },

    #[error("[RG-014] Invalid constraint for wildcard '{wildcard}': {reason}")]
    InvalidConstraint { wildcard: String, reason: String },

    #[error("[RG-015] Unknown input function '{name}' referenced by rule '{rule}'")]
    UnknownFunction { name: String, rule: String },

    // ═══════════════════════════════════════════
    // MATCHING ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[RG-020] Path '{path}' can be produced by several rules: {}", .rules.join(", "))]
    AmbiguousRule { path: String, rules: Vec<String> },

    #[error("[RG-021] No rule produces '{path}' and it does not exist as a source")]
    NoRule { path: String },

    // ═══════════════════════════════════════════
    // RESOLUTION ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[RG-030] Rule '{rule}': wildcard '{wildcard}' in '{template}' is not bound by any output")]
    UnboundWildcard {
        rule: String,
        wildcard: String,
        template: String,
    },

    #[error("[RG-031] Input function for '{rule}.{entry}' failed with wildcards [{wildcards}]: {reason}")]
    InputFunction {
        rule: String,
        entry: String,
        wildcards: String,
        reason: String,
    },

    #[error("[RG-032] Action of rule '{rule}' cannot be rendered: {reason}")]
    ActionTemplate { rule: String, reason: String },

    // ═══════════════════════════════════════════
    // DAG ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[RG-040] Cyclic dependency: {cycle}")]
    CyclicDependency { cycle: String },

    // ═══════════════════════════════════════════
    // EXECUTION ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[RG-050] Missing source '{path}' required by rule '{rule}'")]
    MissingSource { path: String, rule: String },

    #[error("[RG-051] Job '{rule}' [{wildcards}] failed: {reason}")]
    JobFailed {
        rule: String,
        wildcards: String,
        reason: String,
    },

    #[error("[RG-052] Job '{rule}' finished but did not create output '{path}'")]
    MissingOutput { rule: String, path: String },

    // ═══════════════════════════════════════════
    // IO / SERIALIZATION ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[RG-093] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[RG-094] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("[RG-095] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

impl RuleGraphError {
    /// Get the error code (e.g., "RG-021")
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSchema { .. } => "RG-001",
            Self::Config { .. } => "RG-002",
            Self::NoTargets => "RG-003",
            Self::DuplicateOutput { .. } => "RG-010",
            Self::DuplicateRule { .. } => "RG-011",
            Self::InvalidRule { .. } => "RG-012",
            Self::TemplateParse { .. } => "RG-013",
            Self::InvalidConstraint { .. } => "RG-014",
            Self::UnknownFunction { .. } => "RG-015",
            Self::AmbiguousRule { .. } => "RG-020",
            Self::NoRule { .. } => "RG-021",
            Self::UnboundWildcard { .. } => "RG-030",
            Self::InputFunction { .. } => "RG-031",
            Self::ActionTemplate { .. } => "RG-032",
            Self::CyclicDependency { .. } => "RG-040",
            Self::MissingSource { .. } => "RG-050",
            Self::JobFailed { .. } => "RG-051",
            Self::MissingOutput { .. } => "RG-052",
            Self::Io(_) => "RG-093",
            Self::Json(_) => "RG-094",
            Self::YamlParse(_) => "RG-095",
        }
    }

    /// True for errors raised while constructing the graph, before any
    /// action runs.
    pub fn is_build_error(&self) -> bool {
        !matches!(
            self,
            Self::MissingSource { .. }
                | Self::JobFailed { .. }
                | Self::MissingOutput { .. }
                | Self::Io(_)
        )
    }
}

impl FixSuggestion for RuleGraphError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            RuleGraphError::InvalidSchema { .. } => {
                Some("Use 'schema: rulegraph/rules@0.1' at the top of the rule file")
            }
            RuleGraphError::Config { .. } => {
                Some("Use --config key.path=value and check the config file is a YAML mapping")
            }
            RuleGraphError::NoTargets => {
                Some("Pass target paths on the command line or add a 'targets:' list")
            }
            RuleGraphError::DuplicateOutput { .. } => {
                Some("Give each rule a distinct output template or merge the rules")
            }
            RuleGraphError::DuplicateRule { .. } => Some("Rename one of the rules"),
            RuleGraphError::InvalidRule { .. } => {
                Some("Every output template of a rule must use the same wildcards")
            }
            RuleGraphError::TemplateParse { .. } => {
                Some("Use {name} for wildcards and {{ / }} for literal braces")
            }
            RuleGraphError::InvalidConstraint { .. } => {
                Some("Wildcard constraints must be valid regular expressions")
            }
            RuleGraphError::UnknownFunction { .. } => {
                Some("Register the function in the FunctionTable before loading the rule file")
            }
            RuleGraphError::AmbiguousRule { .. } => {
                Some("Add a rule_order entry or constrain the wildcards of one rule")
            }
            RuleGraphError::NoRule { .. } => {
                Some("Check the target spelling or add a rule whose output matches it")
            }
            RuleGraphError::UnboundWildcard { .. } => {
                Some("Inputs and params may only use wildcards that appear in the outputs")
            }
            RuleGraphError::InputFunction { .. } => {
                Some("Input functions must return a path or a non-empty list of paths")
            }
            RuleGraphError::ActionTemplate { .. } => Some(
                "Use {input}, {output}, {params.x}, {wildcards.x} or escape braces as {{ }}",
            ),
            RuleGraphError::CyclicDependency { .. } => {
                Some("Break the cycle: a rule cannot (transitively) consume its own output")
            }
            RuleGraphError::MissingSource { .. } => {
                Some("Create the source file or add a rule that produces it")
            }
            RuleGraphError::JobFailed { .. } => Some("Check the shell command of the rule"),
            RuleGraphError::MissingOutput { .. } => {
                Some("Make the rule's action write every declared output")
            }
            RuleGraphError::Io(_) => Some("Check file path and permissions"),
            RuleGraphError::Json(_) => None,
            RuleGraphError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}
