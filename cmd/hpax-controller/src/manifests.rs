use anyhow::Context;
use pkg_state::Registry;
use pkg_types::manifest::{Manifest, parse_manifests};
use pkg_types::meta::Resource;
use tracing::info;

/// Apply every manifest in `path` to the registry. Returns how many were applied.
///
/// Objects are created or updated unconditionally. Autoscalers also carry a
/// status written by their own controller, so it is applied as well.
pub async fn apply_file(registry: &Registry, path: &str) -> anyhow::Result<usize> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let manifests = parse_manifests(&content).with_context(|| format!("Failed to parse {}", path))?;
    let count = manifests.len();
    for manifest in manifests {
        let describe = manifest.describe();
        match manifest {
            Manifest::HorizontalPodAutoscalerX(hpax) => {
                registry.apply(hpax).await.with_context(|| describe.clone())?;
            }
            Manifest::HPAOverride(o) => {
                registry.apply(o).await.with_context(|| describe.clone())?;
            }
            Manifest::HorizontalPodAutoscaler(hpa) => {
                let status = hpa.status().clone();
                let mut stored = registry.apply(hpa).await.with_context(|| describe.clone())?;
                if stored.status != status {
                    stored.set_status(status);
                    registry
                        .update_status(&stored)
                        .await
                        .with_context(|| describe.clone())?;
                }
            }
        }
        info!("Applied {}", describe);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::condition::ConditionStatus;
    use pkg_types::hpa::HorizontalPodAutoscaler;
    use pkg_types::hpax::HorizontalPodAutoscalerX;

    const MANIFEST: &str = r#"
kind: HorizontalPodAutoscaler
metadata:
  name: web
spec:
  scaleTargetRef: web
  maxReplicas: 20
status:
  conditions:
    - type: ScalingActive
      status: "False"
      lastTransitionTime: "2024-01-01T00:00:00Z"
---
kind: HorizontalPodAutoscalerX
metadata:
  name: web-x
spec:
  hpaTargetName: web
  minReplicas: 2
  fallback:
    minReplicas: 10
    durationSeconds: 300
"#;

    #[tokio::test]
    async fn test_apply_file_creates_then_updates() {
        let path = std::env::temp_dir().join(format!("hpax-manifest-{}.yaml", std::process::id()));
        std::fs::write(&path, MANIFEST).unwrap();
        let path = path.to_string_lossy().to_string();

        let registry = Registry::in_memory().await.unwrap();
        assert_eq!(apply_file(&registry, &path).await.unwrap(), 2);
        // Re-applying the same file is a no-op update.
        assert_eq!(apply_file(&registry, &path).await.unwrap(), 2);
        std::fs::remove_file(&path).unwrap();

        let hpa: HorizontalPodAutoscaler = registry.get("default", "web").await.unwrap();
        assert_eq!(hpa.metadata.generation, 1);
        assert_eq!(
            hpa.scaling_active().map(|c| c.status),
            Some(ConditionStatus::False)
        );
        let hpax: HorizontalPodAutoscalerX = registry.get("default", "web-x").await.unwrap();
        assert_eq!(hpax.spec.min_replicas, 2);
        assert_eq!(hpax.metadata.generation, 1);
    }

    #[tokio::test]
    async fn test_apply_missing_file_fails() {
        let registry = Registry::in_memory().await.unwrap();
        assert!(apply_file(&registry, "/nonexistent/manifest.yaml").await.is_err());
    }
}
