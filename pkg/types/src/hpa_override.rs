use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, Resource, duration_from_secs};
use crate::validate::{validate_duration_seconds, validate_name};
use pkg_constants::state::KIND_HPA_OVERRIDE;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HPAOverrideStatus {
    /// Last observed eligibility. Advisory; recomputed on every reconciliation.
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HPAOverrideSpec {
    pub hpa_target_name: String,
    pub min_replicas: u32,
    /// Start of the eligibility window
    pub time: DateTime<Utc>,
    /// Length of the eligibility window
    pub duration_seconds: u64,
}

/// Time-bounded floor raise for one target autoscaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HPAOverride {
    pub metadata: ObjectMeta,
    pub spec: HPAOverrideSpec,
    #[serde(default)]
    pub status: HPAOverrideStatus,
}

impl HPAOverride {
    pub fn duration(&self) -> TimeDelta {
        duration_from_secs(self.spec.duration_seconds)
    }
}

impl Resource for HPAOverride {
    const KIND: &'static str = KIND_HPA_OVERRIDE;
    type Spec = HPAOverrideSpec;
    type Status = HPAOverrideStatus;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
    fn spec(&self) -> &HPAOverrideSpec {
        &self.spec
    }
    fn status(&self) -> &HPAOverrideStatus {
        &self.status
    }
    fn set_status(&mut self, status: HPAOverrideStatus) {
        self.status = status;
    }

    fn validate(&self) -> anyhow::Result<()> {
        validate_name(&self.metadata.name)?;
        validate_name(&self.spec.hpa_target_name)?;
        validate_duration_seconds("spec.durationSeconds", self.spec.duration_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        let yaml = r#"
metadata:
  name: black-friday
  namespace: shop
spec:
  hpaTargetName: web
  minReplicas: 21
  time: "2026-11-27T00:00:00Z"
  durationSeconds: 86400
"#;
        let o: HPAOverride = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(o.metadata.namespace, "shop");
        assert_eq!(o.spec.min_replicas, 21);
        assert_eq!(o.duration(), TimeDelta::days(1));
        assert!(!o.status.active);
        assert!(o.validate().is_ok());
    }
}
