use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::ConditionStatus;
use crate::meta::{ObjectMeta, Resource};
use pkg_constants::state::KIND_HPA;

// --- HPA conditions ---

/// Condition types reported by the autoscaler's own controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HPAConditionType {
    AbleToScale,
    ScalingActive,
    ScalingLimited,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HPACondition {
    #[serde(rename = "type")]
    pub condition_type: HPAConditionType,
    pub status: ConditionStatus,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

// --- HPA status ---

/// Written by the external autoscaler controller; read-only here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HPAStatus {
    #[serde(default)]
    pub observed_generation: Option<u64>,
    #[serde(default)]
    pub current_replicas: u32,
    #[serde(default)]
    pub desired_replicas: u32,
    #[serde(default)]
    pub conditions: Vec<HPACondition>,
}

// --- HPA spec ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HPASpec {
    /// Workload scaled by this autoscaler
    pub scale_target_ref: String,
    /// Floor managed by the hpax controller
    #[serde(default)]
    pub min_replicas: Option<u32>,
    pub max_replicas: u32,
}

// --- HPA ---

/// The target autoscaler. Owned by another controller; only
/// `spec.minReplicas` is ever patched by hpax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizontalPodAutoscaler {
    pub metadata: ObjectMeta,
    pub spec: HPASpec,
    #[serde(default)]
    pub status: HPAStatus,
}

impl HorizontalPodAutoscaler {
    pub fn condition(&self, condition_type: HPAConditionType) -> Option<&HPACondition> {
        self.status
            .conditions
            .iter()
            .rev()
            .find(|c| c.condition_type == condition_type)
    }

    pub fn scaling_active(&self) -> Option<&HPACondition> {
        self.condition(HPAConditionType::ScalingActive)
    }
}

impl Resource for HorizontalPodAutoscaler {
    const KIND: &'static str = KIND_HPA;
    type Spec = HPASpec;
    type Status = HPAStatus;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
    fn spec(&self) -> &HPASpec {
        &self.spec
    }
    fn status(&self) -> &HPAStatus {
        &self.status
    }
    fn set_status(&mut self, status: HPAStatus) {
        self.status = status;
    }

    fn validate(&self) -> anyhow::Result<()> {
        crate::validate::validate_name(&self.metadata.name)?;
        if self.spec.max_replicas == 0 {
            bail!("spec.maxReplicas must be at least 1");
        }
        if let Some(min) = self.spec.min_replicas
            && min > self.spec.max_replicas
        {
            bail!(
                "spec.minReplicas ({}) must be less than or equal to spec.maxReplicas ({})",
                min,
                self.spec.max_replicas
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_hpa(min: Option<u32>, max: u32) -> HorizontalPodAutoscaler {
        HorizontalPodAutoscaler {
            metadata: ObjectMeta::new("default", "web"),
            spec: HPASpec {
                scale_target_ref: "web".to_string(),
                min_replicas: min,
                max_replicas: max,
            },
            status: HPAStatus::default(),
        }
    }

    #[test]
    fn test_min_above_max_rejected() {
        assert!(make_hpa(Some(1), 10).validate().is_ok());
        assert!(make_hpa(None, 10).validate().is_ok());
        assert!(make_hpa(Some(10), 10).validate().is_ok());
        assert!(make_hpa(Some(11), 10).validate().is_err());
        assert!(make_hpa(None, 0).validate().is_err());
    }

    #[test]
    fn test_scaling_active_lookup() {
        let mut hpa = make_hpa(Some(1), 10);
        assert!(hpa.scaling_active().is_none());

        hpa.status.conditions = vec![
            HPACondition {
                condition_type: HPAConditionType::AbleToScale,
                status: ConditionStatus::True,
                last_transition_time: None,
                reason: String::new(),
                message: String::new(),
            },
            HPACondition {
                condition_type: HPAConditionType::ScalingActive,
                status: ConditionStatus::False,
                last_transition_time: None,
                reason: "FailedGetResourceMetric".to_string(),
                message: String::new(),
            },
        ];
        let cond = hpa.scaling_active().unwrap();
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.reason, "FailedGetResourceMetric");
    }
}
