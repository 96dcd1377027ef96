//! Source files: existence probing and directory scanning

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::pattern::{Segment, Template, TemplateMatcher, WildcardBinding};

/// Answers whether a path exists outside the graph
pub trait SourceCheck: Send + Sync {
    fn exists(&self, path: &str) -> bool;
}

impl<F> SourceCheck for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn exists(&self, path: &str) -> bool {
        self(path)
    }
}

/// Filesystem existence check rooted at a working directory
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative paths resolve against the root; absolute ones are kept
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl SourceCheck for LocalFs {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }
}

/// Files found by [`glob_wildcards`], sorted by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobMatches {
    entries: Vec<(String, WildcardBinding)>,
}

impl GlobMatches {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WildcardBinding)> {
        self.entries.iter().map(|(p, b)| (p.as_str(), b))
    }

    /// Values of one wildcard, one per file (repeats kept)
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|(_, b)| b.get(name))
            .collect()
    }

    /// Distinct values of one wildcard in first-seen order
    pub fn unique_values(&self, name: &str) -> Vec<String> {
        let mut seen: IndexMap<&str, ()> = IndexMap::new();
        for value in self.values(name) {
            seen.insert(value, ());
        }
        seen.into_keys().map(String::from).collect()
    }
}

/// Scan the filesystem for files matching `pattern` and bind its wildcards.
///
/// The walk starts at the literal directory prefix of the pattern, relative
/// to `root`. Results are sorted by path so scans are reproducible.
pub fn glob_wildcards(pattern: &Template, root: &Path) -> Result<GlobMatches> {
    let matcher = TemplateMatcher::compile(pattern, &IndexMap::new())?;
    let absolute = pattern.as_str().starts_with('/');

    let prefix = match pattern.segments().first() {
        Some(Segment::Literal(text)) if pattern.has_wildcards() => {
            text.rfind('/').map(|i| &text[..=i]).unwrap_or("")
        }
        Some(Segment::Literal(text)) => text.as_str(),
        _ => "",
    };
    let base = root.join(prefix);

    if !base.exists() {
        debug!(pattern = %pattern, base = %base.display(), "glob base does not exist");
        return Ok(GlobMatches::default());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(&base).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry during glob");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = match entry.path().strip_prefix(root) {
            Ok(rel) if !absolute => rel,
            _ => entry.path(),
        };
        let path = path.to_string_lossy().replace('\\', "/");

        if let Some(binding) = matcher.matches(&path) {
            entries.push((path, binding));
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    debug!(pattern = %pattern, matches = entries.len(), "glob complete");

    Ok(GlobMatches { entries })
}
