use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// --- Object identity ---

/// Namespaced identity of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Converts whole seconds into a `TimeDelta`, saturating at the largest
/// representable delta.
pub fn duration_from_secs(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

// --- Object metadata ---

fn default_namespace() -> String {
    "default".to_string()
}

/// Metadata common to every stored object.
///
/// `generation` and `resource_version` are owned by the registry: the
/// generation is bumped when the spec changes, the resource version on every
/// write. Values supplied by a manifest are ignored on create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            generation: 0,
            resource_version: 0,
            annotations: BTreeMap::new(),
            deletion_timestamp: None,
            created_at: None,
        }
    }
}

/// A kind the registry knows how to store, index, patch and validate.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Storage kind, used as the key segment under `/registry/`.
    const KIND: &'static str;

    type Spec: PartialEq;
    type Status: Clone;

    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
    fn spec(&self) -> &Self::Spec;
    fn status(&self) -> &Self::Status;
    fn set_status(&mut self, status: Self::Status);

    /// Validation run by the registry on every create, update and patch.
    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Validation run on updates and patches with the currently stored object.
    fn validate_update(&self, _old: &Self) -> anyhow::Result<()> {
        self.validate()
    }

    fn key(&self) -> ObjectKey {
        let meta = self.metadata();
        ObjectKey::new(meta.namespace.clone(), meta.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_saturates() {
        assert_eq!(duration_from_secs(5), TimeDelta::seconds(5));
        assert_eq!(duration_from_secs(0), TimeDelta::zero());
        assert_eq!(duration_from_secs(u64::MAX), TimeDelta::MAX);
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("default", "web-x").to_string(), "default/web-x");
    }
}
