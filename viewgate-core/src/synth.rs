//! Permission name synthesis.
//!
//! Every handler maps to exactly one permission key, `prefix + qualified
//! name`. Because qualified names are unique inside a loaded application,
//! two distinct handlers never share a key.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::handler::HandlerIdentity;
use crate::translate::{NoTranslation, Translator};

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "access_view_";

/// Stable identifier of a per-handler permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionKey(String);

impl PermissionKey {
    /// Wrap an already-synthesized key (e.g. one read back from a store).
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermissionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Key and display label synthesized for one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedPermission {
    pub key: PermissionKey,
    pub label: String,
}

/// Maps handler identities to permission keys and labels.
///
/// # Example
///
/// ```rust
/// use viewgate_core::{HandlerIdentity, Synthesizer};
///
/// let synth = Synthesizer::new("access_view_");
/// let invoice = HandlerIdentity::new("billing.views", "Invoice");
///
/// let perm = synth.synthesize(&invoice, None);
/// assert_eq!(perm.key.as_str(), "access_view_billing.views.Invoice");
/// assert_eq!(perm.label, "billing.views.Invoice");
/// ```
#[derive(Clone)]
pub struct Synthesizer {
    prefix: String,
    translator: Arc<dyn Translator>,
}

impl Synthesizer {
    /// Create a synthesizer with the given prefix and no translations.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            translator: Arc::new(NoTranslation),
        }
    }

    /// Use `translator` for label-override tokens.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Permission key for a handler.
    pub fn key(&self, identity: &HandlerIdentity) -> PermissionKey {
        PermissionKey(format!("{}{}", self.prefix, identity.qualified_name()))
    }

    /// Display label for a handler.
    ///
    /// The override token is translated on every call; a missing translation
    /// falls back to the qualified name.
    pub fn label(&self, identity: &HandlerIdentity, label_token: Option<&str>) -> String {
        label_token
            .and_then(|token| self.translator.translate(token))
            .unwrap_or_else(|| identity.qualified_name().to_string())
    }

    /// Key and label for a handler.
    pub fn synthesize(
        &self,
        identity: &HandlerIdentity,
        label_token: Option<&str>,
    ) -> SynthesizedPermission {
        SynthesizedPermission {
            key: self.key(identity),
            label: self.label(identity, label_token),
        }
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
