//! Public route classification.

/// Path prefixes that bypass authentication.
///
/// Membership is a literal byte-prefix test: no globbing, no regex, no
/// normalisation beyond the caller stripping the query string. A prefix
/// such as `/uploads/` therefore covers every path beneath it.
#[derive(Clone, Debug, Default)]
pub struct PublicRoutes {
    prefixes: Vec<String>,
}

impl PublicRoutes {
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `path` is exempt from authentication.
    pub fn is_public(&self, path: &str) -> bool {
        self.matching_prefix(path).is_some()
    }

    /// The first configured prefix that `path` starts with.
    pub fn matching_prefix(&self, path: &str) -> Option<&str> {
        let path = strip_query(path);
        self.prefixes
            .iter()
            .find(|prefix| path.as_bytes().starts_with(prefix.as_bytes()))
            .map(String::as_str)
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

fn strip_query(path: &str) -> &str {
    match path.find(['?', '#']) {
        Some(idx) => &path[..idx],
        None => path,
    }
}
