//! Rulegraph - rule-based build graphs with wildcard matching (v0.1)
//!
//! ## Module Architecture (DDD-Inspired)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  ast/       YAML → Rust types (Rulefile, RuleDef)            │
//! │  pattern/   Templates, matchers, wildcard bindings           │
//! │  rules/     RulePattern, RuleRegistry, input functions       │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  dag/       Job resolution and graph building (DagBuilder)   │
//! │  runtime/   Graph execution (Executor, ActionRunner)         │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  source/    Filesystem probing, glob_wildcards               │
//! │  event_log  Build and execution events                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | YAML parsing → `Rulefile`, compilation into a registry |
//! | [`pattern`] | `{name}` / `{name,regex}` templates and path matching |
//! | [`rules`] | Rule declarations, producer lookup, built-in input functions |
//! | [`dag`] | `resolve` (rule + wildcards → job) and `DagBuilder` |
//! | [`runtime`] | Up-to-date checks and `sh -c` execution |
//! | [`source`] | `SourceCheck` and directory scans |
//! | [`event_log`] | Event sourcing for audit trail |
//! | [`config`] | Config layering and dotted overrides |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - YAML → Rust types
// ═══════════════════════════════════════════════════════════════
pub mod ast;
pub mod pattern;
pub mod rules;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Graph construction and execution
// ═══════════════════════════════════════════════════════════════
pub mod dag;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Filesystem, events
// ═══════════════════════════════════════════════════════════════
pub mod event_log;
pub mod source;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{FixSuggestion, Result, RuleGraphError};

// Rule file
pub use ast::Rulefile;

// Patterns and rules
pub use pattern::{Template, WildcardBinding};
pub use rules::{FunctionOutput, FunctionTable, InputFunction, RulePattern, RuleRegistry};

// Graph
pub use dag::{resolve, DagBuilder, Graph, Job, JobId};

// Execution
pub use runtime::{ActionRunner, ExecutionSummary, Executor};

// Infrastructure
pub use event_log::{Event, EventKind, EventLog};
pub use source::{glob_wildcards, LocalFs, SourceCheck};
