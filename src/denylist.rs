//! URL-prefix denylist.

use crate::types::ExecutionContext;

/// Ordered set of URL prefixes excluded from injection and distribution.
///
/// Matching is evaluated against the URL a context has right now; callers pass the
/// latest snapshot for every targeting decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Denylist {
    prefixes: Vec<String>,
}

impl Denylist {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// First prefix matching `url`, if any.
    pub fn matching_prefix(&self, url: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|prefix| url.starts_with(prefix.as_str()))
            .map(String::as_str)
    }

    pub fn is_denied(&self, url: &str) -> bool {
        self.matching_prefix(url).is_some()
    }

    pub fn allows(&self, context: &ExecutionContext) -> bool {
        !self.is_denied(&context.url)
    }
}
