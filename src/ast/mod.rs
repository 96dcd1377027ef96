//! AST Module - rule files parsed from YAML
//!
//! - `rulefile`: Rulefile, RuleDef and the entry/function declarations
//! - `compile`: Rulefile → RuleRegistry
//!
//! These types are the "what": static structure parsed from YAML.
//! Jobs and graphs live in the `dag` module.

mod compile;
mod rulefile;

pub use rulefile::{
    ExpandDef, FunctionDef, InputDef, LookupDef, OutputDef, RuleDef, Rulefile, SourceDef,
    ValuesDef, SCHEMA_V01,
};
