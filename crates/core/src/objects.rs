//! The slice of the Kubernetes object model pvwatch reads.
//!
//! Only the fields the controller looks at are modelled; everything else in
//! the API payloads is ignored during deserialization.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, ObjectKey, Result};

/// Object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            resource_version: None,
        }
    }

    /// Key for this object.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingName` when the object has no name.
    pub fn key(&self, kind: &str) -> Result<ObjectKey> {
        if self.name.is_empty() {
            return Err(Error::missing_name(kind));
        }
        Ok(ObjectKey::new(self.namespace.clone(), self.name.clone()))
    }
}

/// Reference from an event to the object it concerns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

/// `events.k8s.io/v1` Event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regarding: Option<ObjectReference>,
}

impl Event {
    /// Key of the object this event is about.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingName` when the event has no regarding reference
    /// or the reference has no name.
    pub fn regarding_key(&self) -> Result<ObjectKey> {
        match &self.regarding {
            Some(reference) if !reference.name.is_empty() => Ok(ObjectKey::new(
                reference.namespace.clone(),
                reference.name.clone(),
            )),
            _ => Err(Error::missing_name("Event.regarding")),
        }
    }
}

/// Pod lifecycle phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl PodPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: PodPhase,
}

/// `v1` Pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    /// Build a pod in the given phase. Mostly useful for tests and fixtures.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: PodSpec::default(),
            status: PodStatus { phase },
        }
    }

    #[must_use]
    pub fn on_node(mut self, node: impl Into<String>) -> Self {
        self.spec.node_name = Some(node.into());
        self
    }

    #[must_use]
    pub fn phase(&self) -> PodPhase {
        self.status.phase
    }

    /// Node the pod is scheduled on, empty when unscheduled.
    #[must_use]
    pub fn node_name(&self) -> &str {
        self.spec.node_name.as_deref().unwrap_or_default()
    }
}

/// List response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectList<T> {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}
