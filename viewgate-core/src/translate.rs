//! Label translation.
//!
//! Handlers may declare a label-override token. At synthesis time the token
//! is looked up through a [`Translator`]; when the lookup comes back empty
//! the qualified handler name is used as the label instead.

use serde::Deserialize;
use std::collections::HashMap;

/// Looks up the display text for a label-override token.
pub trait Translator: Send + Sync {
    /// Translate `token`, or `None` when no translation exists.
    fn translate(&self, token: &str) -> Option<String>;
}

/// Translator that never has a translation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranslation;

impl Translator for NoTranslation {
    fn translate(&self, _token: &str) -> Option<String> {
        None
    }
}

/// Per-locale message tables with one active locale.
///
/// # Example
///
/// ```rust
/// use viewgate_core::{MessageCatalog, Translator};
///
/// let messages = MessageCatalog::new("fa")
///     .with_message("fa", "billing.invoice", "فاکتور")
///     .with_message("en", "billing.invoice", "Invoice");
///
/// assert_eq!(messages.translate("billing.invoice").as_deref(), Some("فاکتور"));
/// assert!(messages.translate("missing").is_none());
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageCatalog {
    #[serde(skip)]
    locale: String,
    #[serde(flatten)]
    messages: HashMap<String, HashMap<String, String>>,
}

impl MessageCatalog {
    /// Create an empty catalog with `locale` active.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            messages: HashMap::new(),
        }
    }

    /// Parse `{"<locale>": {"<token>": "<text>"}}` and activate `locale`.
    pub fn from_json(json: &str, locale: impl Into<String>) -> Result<Self, serde_json::Error> {
        let mut catalog: MessageCatalog = serde_json::from_str(json)?;
        catalog.locale = locale.into();
        Ok(catalog)
    }

    /// Add a message for a locale.
    pub fn with_message(
        mut self,
        locale: impl Into<String>,
        token: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.messages
            .entry(locale.into())
            .or_default()
            .insert(token.into(), text.into());
        self
    }

    /// Switch the active locale.
    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = locale.into();
    }

    /// The active locale.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Returns true if any message exists for `locale`.
    pub fn has_locale(&self, locale: &str) -> bool {
        self.messages.get(locale).is_some_and(|table| !table.is_empty())
    }
}

impl Translator for MessageCatalog {
    fn translate(&self, token: &str) -> Option<String> {
        self.messages
            .get(&self.locale)
            .and_then(|table| table.get(token))
            .cloned()
    }
}
