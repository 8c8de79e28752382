use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::hpa::HorizontalPodAutoscaler;
use crate::hpa_override::HPAOverride;
use crate::hpax::HorizontalPodAutoscalerX;

/// A single YAML document, discriminated by its `kind` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Manifest {
    HorizontalPodAutoscalerX(HorizontalPodAutoscalerX),
    HPAOverride(HPAOverride),
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
}

impl Manifest {
    pub fn describe(&self) -> String {
        match self {
            Manifest::HorizontalPodAutoscalerX(o) => {
                format!("HorizontalPodAutoscalerX {}/{}", o.metadata.namespace, o.metadata.name)
            }
            Manifest::HPAOverride(o) => {
                format!("HPAOverride {}/{}", o.metadata.namespace, o.metadata.name)
            }
            Manifest::HorizontalPodAutoscaler(o) => {
                format!("HorizontalPodAutoscaler {}/{}", o.metadata.namespace, o.metadata.name)
            }
        }
    }
}

/// Parse a multi-document YAML stream. Empty documents are skipped.
pub fn parse_manifests(content: &str) -> anyhow::Result<Vec<Manifest>> {
    let mut manifests = Vec::new();
    for (i, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("document {}: invalid YAML", i))?;
        if value.is_null() {
            continue;
        }
        let manifest: Manifest = serde_yaml::from_value(value)
            .with_context(|| format!("document {}: unsupported or malformed manifest", i))?;
        manifests.push(manifest);
    }
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_document() {
        let yaml = r#"
apiVersion: autoscaling/v2
kind: HorizontalPodAutoscaler
metadata:
  name: web
spec:
  scaleTargetRef: web
  minReplicas: 1
  maxReplicas: 50
---
kind: HorizontalPodAutoscalerX
metadata:
  name: web-x
spec:
  hpaTargetName: web
  minReplicas: 2
---
"#;
        let manifests = parse_manifests(yaml).unwrap();
        assert_eq!(manifests.len(), 2);
        assert!(matches!(manifests[0], Manifest::HorizontalPodAutoscaler(_)));
        match &manifests[1] {
            Manifest::HorizontalPodAutoscalerX(h) => assert_eq!(h.spec.min_replicas, 2),
            other => panic!("unexpected manifest {}", other.describe()),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let yaml = "kind: Deployment\nmetadata:\n  name: web\n";
        assert!(parse_manifests(yaml).is_err());
    }
}
