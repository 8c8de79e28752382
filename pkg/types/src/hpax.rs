use anyhow::bail;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::condition::Conditions;
use crate::meta::{ObjectMeta, Resource, duration_from_secs};
use crate::validate::{validate_duration_seconds, validate_name};
use pkg_constants::state::KIND_HPAX;

// --- Fallback ---

/// Floor applied once the target's `ScalingActive` condition has been
/// `False` for at least `duration_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fallback {
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    #[serde(default)]
    pub duration_seconds: u64,
}

impl Fallback {
    pub fn duration(&self) -> TimeDelta {
        duration_from_secs(self.duration_seconds)
    }
}

fn default_min_replicas() -> u32 {
    1
}

// --- HPAX status ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscalerXStatus {
    #[serde(default)]
    pub observed_generation: Option<u64>,
    #[serde(default)]
    pub hpa_observed_generation: Option<u64>,
    #[serde(default)]
    pub conditions: Conditions,
}

// --- HPAX spec ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscalerXSpec {
    /// Name of the HorizontalPodAutoscaler (same namespace) whose floor is managed
    pub hpa_target_name: String,
    /// Baseline floor, always enforced
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    #[serde(default)]
    pub fallback: Option<Fallback>,
}

// --- HPAX ---

/// Binds one target autoscaler to a baseline floor and an optional fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizontalPodAutoscalerX {
    pub metadata: ObjectMeta,
    pub spec: HorizontalPodAutoscalerXSpec,
    #[serde(default)]
    pub status: HorizontalPodAutoscalerXStatus,
}

impl HorizontalPodAutoscalerX {
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

impl Resource for HorizontalPodAutoscalerX {
    const KIND: &'static str = KIND_HPAX;
    type Spec = HorizontalPodAutoscalerXSpec;
    type Status = HorizontalPodAutoscalerXStatus;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
    fn spec(&self) -> &HorizontalPodAutoscalerXSpec {
        &self.spec
    }
    fn status(&self) -> &HorizontalPodAutoscalerXStatus {
        &self.status
    }
    fn set_status(&mut self, status: HorizontalPodAutoscalerXStatus) {
        self.status = status;
    }

    fn validate(&self) -> anyhow::Result<()> {
        validate_name(&self.metadata.name)?;
        validate_name(&self.spec.hpa_target_name)?;
        if let Some(fallback) = &self.spec.fallback {
            validate_duration_seconds("spec.fallback.durationSeconds", fallback.duration_seconds)?;
        }
        Ok(())
    }

    fn validate_update(&self, old: &Self) -> anyhow::Result<()> {
        if self.spec.hpa_target_name != old.spec.hpa_target_name {
            bail!(
                "spec.hpaTargetName is immutable (was '{}', got '{}')",
                old.spec.hpa_target_name,
                self.spec.hpa_target_name
            );
        }
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_constants::controller::MAX_DURATION_SECONDS;

    fn make_hpax(target: &str) -> HorizontalPodAutoscalerX {
        HorizontalPodAutoscalerX {
            metadata: ObjectMeta::new("default", "web-x"),
            spec: HorizontalPodAutoscalerXSpec {
                hpa_target_name: target.to_string(),
                min_replicas: 1,
                fallback: None,
            },
            status: HorizontalPodAutoscalerXStatus::default(),
        }
    }

    #[test]
    fn test_validate() {
        assert!(make_hpax("web").validate().is_ok());
        assert!(make_hpax("").validate().is_err());
        assert!(make_hpax("Web_HPA").validate().is_err());

        let mut hpax = make_hpax("web");
        hpax.spec.fallback = Some(Fallback {
            min_replicas: 10,
            duration_seconds: MAX_DURATION_SECONDS + 1,
        });
        assert!(hpax.validate().is_err());
    }

    #[test]
    fn test_target_name_is_immutable() {
        let old = make_hpax("web");
        let same = make_hpax("web");
        let retargeted = make_hpax("api");
        assert!(same.validate_update(&old).is_ok());
        assert!(retargeted.validate_update(&old).is_err());
    }

    #[test]
    fn test_defaults_from_yaml() {
        let yaml = r#"
metadata:
  name: web-x
spec:
  hpaTargetName: web
  fallback:
    durationSeconds: 5
"#;
        let hpax: HorizontalPodAutoscalerX = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(hpax.metadata.namespace, "default");
        assert_eq!(hpax.spec.min_replicas, 1);
        let fallback = hpax.spec.fallback.unwrap();
        assert_eq!(fallback.min_replicas, 1);
        assert_eq!(fallback.duration_seconds, 5);
        assert!(hpax.status.conditions.is_empty());
    }
}
