//! Wildcard bindings: immutable name → value maps shared across jobs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Values bound to wildcard names for one job.
///
/// Cheap to clone and usable as a hash key. Ordered by name so two bindings
/// with the same pairs are always equal and display the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WildcardBinding(Arc<BTreeMap<String, String>>);

impl WildcardBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy with one more (or one replaced) value
    pub fn with(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = (*self.0).clone();
        map.insert(name.into(), value.into());
        Self(Arc::new(map))
    }

    /// Union of two bindings, or `None` when they disagree on a shared name
    pub fn merged(&self, other: &WildcardBinding) -> Option<Self> {
        let mut map = (*self.0).clone();
        for (name, value) in other.iter() {
            match map.get(name) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    map.insert(name.to_string(), value.to_string());
                }
            }
        }
        Some(Self(Arc::new(map)))
    }
}

impl<K, V> FromIterator<(K, V)> for WildcardBinding
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(Arc::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }
}

/// Renders as `sample=etoh60, rep=1` (sorted by name)
impl fmt::Display for WildcardBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_display_sorted_by_name() {
        let b: WildcardBinding = [("sample", "etoh60"), ("rep", "1")].into_iter().collect();
        assert_eq!(b.to_string(), "rep=1, sample=etoh60");
        assert_eq!(WildcardBinding::new().to_string(), "");
    }

    #[test]
    fn test_equal_bindings_hash_equal() {
        let a: WildcardBinding = [("x", "1"), ("y", "2")].into_iter().collect();
        let b: WildcardBinding = [("y", "2"), ("x", "1")].into_iter().collect();
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_with_does_not_mutate_original() {
        let a: WildcardBinding = [("x", "1")].into_iter().collect();
        let b = a.with("y", "2");
        assert_eq!(a.len(), 1);
        assert_eq!(b.get("y"), Some("2"));
    }

    #[test]
    fn test_merged_detects_conflicts() {
        let a: WildcardBinding = [("x", "1")].into_iter().collect();
        let agree: WildcardBinding = [("x", "1"), ("y", "2")].into_iter().collect();
        let clash: WildcardBinding = [("x", "9")].into_iter().collect();

        let merged = a.merged(&agree).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(a.merged(&clash).is_none());
    }

    #[test]
    fn test_serializes_as_map() {
        let b: WildcardBinding = [("sample", "s1")].into_iter().collect();
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, r#"{"sample":"s1"}"#);
    }
}
