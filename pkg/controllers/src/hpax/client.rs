use async_trait::async_trait;
use pkg_constants::controller::HPA_TARGET_NAME_INDEX;
use pkg_state::{Registry, StoreResult};
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::hpa_override::HPAOverride;
use pkg_types::hpax::HorizontalPodAutoscalerX;
use pkg_types::meta::{ObjectKey, Resource};

use super::decision::min_replicas_patch;

/// Everything the reconciler reads from and writes to the object store.
///
/// Implemented by [`Registry`]; tests substitute fakes to inject failures.
#[async_trait]
pub trait HpaxClient: Send + Sync {
    async fn get_hpax(&self, key: &ObjectKey) -> StoreResult<HorizontalPodAutoscalerX>;

    async fn get_hpa(&self, namespace: &str, name: &str) -> StoreResult<HorizontalPodAutoscaler>;

    /// Overrides in `namespace` whose `spec.hpaTargetName` is `target`.
    async fn list_overrides(&self, namespace: &str, target: &str)
    -> StoreResult<Vec<HPAOverride>>;

    /// Set `spec.minReplicas` on the hpa, conditional on the resource
    /// version it was read at.
    async fn patch_hpa_min_replicas(
        &self,
        hpa: &HorizontalPodAutoscaler,
        min_replicas: u32,
    ) -> StoreResult<HorizontalPodAutoscaler>;

    async fn update_hpax_status(
        &self,
        hpax: &HorizontalPodAutoscalerX,
    ) -> StoreResult<HorizontalPodAutoscalerX>;

    async fn update_override_status(&self, o: &HPAOverride) -> StoreResult<HPAOverride>;
}

#[async_trait]
impl HpaxClient for Registry {
    async fn get_hpax(&self, key: &ObjectKey) -> StoreResult<HorizontalPodAutoscalerX> {
        self.get(&key.namespace, &key.name).await
    }

    async fn get_hpa(&self, namespace: &str, name: &str) -> StoreResult<HorizontalPodAutoscaler> {
        self.get(namespace, name).await
    }

    async fn list_overrides(
        &self,
        namespace: &str,
        target: &str,
    ) -> StoreResult<Vec<HPAOverride>> {
        self.list_by_index(namespace, HPA_TARGET_NAME_INDEX, target)
            .await
    }

    async fn patch_hpa_min_replicas(
        &self,
        hpa: &HorizontalPodAutoscaler,
        min_replicas: u32,
    ) -> StoreResult<HorizontalPodAutoscaler> {
        let key = hpa.key();
        self.patch(
            &key.namespace,
            &key.name,
            &min_replicas_patch(min_replicas),
            Some(hpa.metadata.resource_version),
        )
        .await
    }

    async fn update_hpax_status(
        &self,
        hpax: &HorizontalPodAutoscalerX,
    ) -> StoreResult<HorizontalPodAutoscalerX> {
        self.update_status(hpax).await
    }

    async fn update_override_status(&self, o: &HPAOverride) -> StoreResult<HPAOverride> {
        self.update_status(o).await
    }
}
