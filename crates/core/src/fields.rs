//! Scalar form fields collected during ingestion.

use serde::Serialize;

/// Ordered map of form field name to raw string value.
///
/// Values are never coerced here; typed parsing happens afterwards in
/// [`crate::report`]. Keys keep their first-arrival position and a repeated
/// name overwrites the earlier value (last write wins).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FieldBag {
    entries: Vec<(String, String)>,
}

impl FieldBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins_keeps_position() {
        let mut bag = FieldBag::new();
        assert_eq!(bag.insert("a", "1"), None);
        assert_eq!(bag.insert("b", "2"), None);
        assert_eq!(bag.insert("a", "3"), Some("1".to_string()));

        let entries: Vec<_> = bag.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_get_missing() {
        let bag: FieldBag = [("x", "y")].into_iter().collect();
        assert_eq!(bag.get("x"), Some("y"));
        assert!(!bag.contains("z"));
    }
}
