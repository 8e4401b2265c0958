//! Object keys.
//!
//! A key is the `namespace/name` string identity of an object, or the bare
//! `name` for cluster-scoped objects. The same string flows through the work
//! queue and the suppression cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Parsed `namespace/name` identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    namespace: Option<String>,
    name: String,
}

impl ObjectKey {
    /// Create a namespaced key. An empty namespace yields a cluster-scoped key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
            name: name.into(),
        }
    }

    /// Parse a key string.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` when the string has more than one `/`, or
    /// when either part is empty.
    pub fn parse(key: &str) -> Result<Self> {
        let mut parts = key.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) if !name.is_empty() => Ok(Self {
                namespace: None,
                name: name.to_string(),
            }),
            (Some(namespace), Some(name), None) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(Error::invalid_key(key, "unexpected key format")),
        }
    }

    /// The namespace, empty for cluster-scoped objects.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}
