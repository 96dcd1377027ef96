//! Rule file types parsed from YAML
//!
//! ```yaml
//! schema: rulegraph/rules@0.1
//! config:
//!   samples:
//!     s1: [in/s1_a.txt, in/s1_b.txt]
//! targets: [out/s1.txt]
//! rules:
//!   - name: combine
//!     output: out/{sample}.txt
//!     input:
//!       parts:
//!         lookup: { table: samples, key: sample }
//!     shell: cat {input.parts} > {output}
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, RuleGraphError};

/// Expected schema version for rule files
pub const SCHEMA_V01: &str = "rulegraph/rules@0.1";

/// Input names that look like function declarations placed one level too high
pub(crate) const RESERVED_INPUT_NAMES: &[&str] =
    &["function", "lookup", "expand", "glob", "allow_empty"];

/// A whole rule file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rulefile {
    pub schema: String,
    /// Free-form configuration, readable by `lookup` and `expand`
    #[serde(default)]
    pub config: Value,
    /// Default targets when none are requested
    #[serde(default)]
    pub targets: Vec<String>,
    /// Tie-break priority between rules matching the same path
    #[serde(default)]
    pub rule_order: Vec<String>,
    /// Constraints applied to every rule that does not set its own
    #[serde(default)]
    pub wildcard_constraints: IndexMap<String, String>,
    pub rules: Vec<RuleDef>,
}

impl Rulefile {
    /// Parse YAML and check the schema version
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rulefile: Self = serde_yaml::from_str(yaml)?;
        rulefile.validate_schema()?;
        Ok(rulefile)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn validate_schema(&self) -> Result<()> {
        if self.schema != SCHEMA_V01 {
            return Err(RuleGraphError::InvalidSchema {
                expected: SCHEMA_V01.to_string(),
                actual: self.schema.clone(),
            });
        }
        Ok(())
    }

    /// The `config:` section, with a missing one read as an empty mapping
    pub fn config_mut(&mut self) -> &mut Value {
        if self.config.is_null() {
            self.config = Value::Object(Default::default());
        }
        &mut self.config
    }
}

/// One `rules:` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    pub name: String,
    pub output: OutputDef,
    #[serde(default)]
    pub input: Option<InputDef>,
    #[serde(default)]
    pub params: IndexMap<String, SourceDef>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub wildcard_constraints: IndexMap<String, String>,
}

/// `output:` as one template, a list, or a name → template mapping
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OutputDef {
    One(String),
    List(Vec<String>),
    Named(IndexMap<String, String>),
}

/// `input:` as one template, a list, or named entries
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InputDef {
    One(String),
    List(Vec<String>),
    Named(IndexMap<String, SourceDef>),
}

/// Value of a named input or param entry
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceDef {
    Template(String),
    Bool(bool),
    Number(serde_yaml::Number),
    List(Vec<String>),
    Function(FunctionDef),
}

/// An input function declaration. Exactly one of `function`, `lookup`,
/// `expand` or `glob` is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionDef {
    /// Name registered in the function table
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub lookup: Option<LookupDef>,
    #[serde(default)]
    pub expand: Option<ExpandDef>,
    /// Pattern scanned on disk, e.g. `parts/{sample}/{part}.txt`
    #[serde(default)]
    pub glob: Option<String>,
    #[serde(default)]
    pub allow_empty: bool,
}

impl FunctionDef {
    /// Which kind of function this declares, if exactly one is set
    pub fn kind(&self) -> Option<&'static str> {
        let set = [
            (self.function.is_some(), "function"),
            (self.lookup.is_some(), "lookup"),
            (self.expand.is_some(), "expand"),
            (self.glob.is_some(), "glob"),
        ];
        let mut kinds = set.iter().filter(|(on, _)| *on).map(|(_, k)| *k);
        match (kinds.next(), kinds.next()) {
            (Some(kind), None) => Some(kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupDef {
    /// Dotted config path of the table
    pub table: String,
    /// Wildcard whose value selects the entry
    pub key: String,
    /// Optional template with a `{value}` placeholder
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpandDef {
    pub template: String,
    #[serde(default)]
    pub values: IndexMap<String, ValuesDef>,
    /// Pattern whose matches supply values for the remaining variables
    #[serde(default)]
    pub glob: Option<String>,
}

/// Values of one expand variable: inline, or from the config
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ValuesDef {
    List(Vec<String>),
    Config { config: String },
}
