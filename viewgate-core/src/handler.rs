//! Handler identity types.
//!
//! A handler is a unit of dispatch logic (a function or a class-based view)
//! that the host application can route a request to. Its identity is the
//! fully-qualified module path plus the handler name, and nothing else.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Identifier of an installed application (e.g. `billing`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    /// Create an application identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplicationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ApplicationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Whether a handler is a plain function or a class-based view.
///
/// Purely informational; the kind never takes part in identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[default]
    Function,
    Class,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Function => write!(f, "function"),
            HandlerKind::Class => write!(f, "class"),
        }
    }
}

/// Identity of a dispatchable handler.
///
/// Two identities are equal when their qualified names are equal.
///
/// # Example
///
/// ```rust
/// use viewgate_core::HandlerIdentity;
///
/// let invoice = HandlerIdentity::new("billing.views", "Invoice");
/// assert_eq!(invoice.qualified_name(), "billing.views.Invoice");
///
/// let parsed = HandlerIdentity::parse("billing.views.Invoice").unwrap();
/// assert_eq!(parsed, invoice);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "IdentityParts", into = "IdentityParts")]
pub struct HandlerIdentity {
    module: String,
    name: String,
    qualified: String,
}

#[derive(Serialize, Deserialize)]
struct IdentityParts {
    module: String,
    name: String,
}

impl From<IdentityParts> for HandlerIdentity {
    fn from(parts: IdentityParts) -> Self {
        Self::new(parts.module, parts.name)
    }
}

impl From<HandlerIdentity> for IdentityParts {
    fn from(identity: HandlerIdentity) -> Self {
        Self {
            module: identity.module,
            name: identity.name,
        }
    }
}

impl HandlerIdentity {
    /// Create an identity from its module path and name.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        let module = module.into();
        let name = name.into();
        let qualified = if module.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", module, name)
        };
        Self {
            module,
            name,
            qualified,
        }
    }

    /// Split a qualified name at its last dot.
    ///
    /// Returns `None` for empty input or a trailing dot.
    pub fn parse(qualified: &str) -> Option<Self> {
        let qualified = qualified.trim();
        match qualified.rsplit_once('.') {
            Some((_, "")) => None,
            Some((module, name)) => Some(Self::new(module, name)),
            None if qualified.is_empty() => None,
            None => Some(Self::new("", qualified)),
        }
    }

    /// Dotted module path the handler is declared in.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Function or class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `module.name`.
    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }
}

impl PartialEq for HandlerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.qualified == other.qualified
    }
}

impl Eq for HandlerIdentity {}

impl Hash for HandlerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.qualified.hash(state);
    }
}

impl std::fmt::Display for HandlerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.qualified)
    }
}

/// The authenticated caller of a request.
///
/// Established by an external authentication step; viewgate only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Create a principal from its identifier (user name, subject, ...).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The principal identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
