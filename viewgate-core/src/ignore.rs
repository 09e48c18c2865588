//! Handlers excluded from synthesis and enforcement.

use std::collections::HashSet;

use crate::handler::HandlerIdentity;

/// Exact-match set of ignored qualified handler names.
///
/// An ignored handler never gets a permission record and is never denied.
/// There is no globbing and no prefix matching.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    names: HashSet<String>,
}

impl IgnoreFilter {
    /// Build a filter from qualified handler names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.into().trim().to_string())
                .collect(),
        }
    }

    /// Whether `identity` is ignored.
    pub fn is_ignored(&self, identity: &HandlerIdentity) -> bool {
        self.names.contains(identity.qualified_name())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
