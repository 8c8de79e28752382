use chrono::{DateTime, Utc};
use pkg_types::condition::{ConditionStatus, ConditionType, ConditionUpdate};
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::hpa_override::HPAOverride;
use pkg_types::hpax::HorizontalPodAutoscalerX;
use pkg_types::meta::ObjectKey;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::client::HpaxClient;
use super::overrides::OverrideOutcome;
use super::{decision, fallback, overrides, reason};

/// What the work queue should do with a key after reconciling it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequeueDirective {
    /// Nothing is pending; wait for the next event or resync.
    Done,
    /// Reconcile again after the delay.
    After(Duration),
    /// Reconcile again right away (lost an optimistic-concurrency race).
    Immediately,
    /// Transient failure; retry with per-key exponential backoff.
    Backoff(String),
}

/// Computes and enforces the floor for one HorizontalPodAutoscalerX.
pub struct HpaxReconciler<C> {
    client: C,
    not_found_requeue: Duration,
}

impl<C: HpaxClient> HpaxReconciler<C> {
    pub fn new(client: C, not_found_requeue: Duration) -> Self {
        Self {
            client,
            not_found_requeue,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one reconciliation of `key` as of `now`.
    ///
    /// Order: fetch target, evaluate fallback and overrides, patch the target
    /// floor, persist status. Status is computed on a working copy and
    /// written at most once, only when it differs from what was read.
    pub async fn reconcile(&self, key: &ObjectKey, now: DateTime<Utc>) -> RequeueDirective {
        let original = match self.client.get_hpax(key).await {
            Ok(hpax) => hpax,
            Err(e) if e.is_not_found() => {
                debug!("hpax {} is gone, nothing to do", key);
                return RequeueDirective::Done;
            }
            Err(e) => {
                warn!("Failed to get hpax {}: {}", key, e);
                return RequeueDirective::Backoff(e.to_string());
            }
        };
        if original.is_deleting() {
            debug!("hpax {} is being deleted, skipping", key);
            return RequeueDirective::Done;
        }

        let mut hpax = original.clone();
        let generation = Some(hpax.metadata.generation);
        hpax.status.observed_generation = generation;
        let target = hpax.spec.hpa_target_name.clone();

        let hpa = match self.client.get_hpa(&key.namespace, &target).await {
            Ok(hpa) => hpa,
            Err(e) if e.is_not_found() => {
                info!("hpax {}: target hpa {} not found", key, target);
                let hpa_generation = hpax.status.hpa_observed_generation;
                hpax.status.conditions.set(
                    ConditionUpdate::new(
                        ConditionType::Ready,
                        ConditionStatus::False,
                        reason::TARGET_NOT_FOUND,
                        format!("target hpa {} not found", target),
                    )
                    .observed(generation, hpa_generation),
                    now,
                );
                return self
                    .finish(
                        &original,
                        hpax,
                        RequeueDirective::After(self.not_found_requeue),
                    )
                    .await;
            }
            Err(e) => {
                warn!("hpax {}: failed to get target hpa {}: {}", key, target, e);
                return RequeueDirective::Backoff(e.to_string());
            }
        };

        // The target's own observed generation; keep the last one seen while
        // its controller has not reported any.
        let hpa_generation = hpa
            .status
            .observed_generation
            .or(hpax.status.hpa_observed_generation);
        hpax.status.hpa_observed_generation = hpa_generation;
        let observed = |update: ConditionUpdate| update.observed(generation, hpa_generation);

        let scaling_active = hpa.scaling_active();
        let mirror = match scaling_active {
            Some(c) => ConditionUpdate::new(
                ConditionType::ScalingActive,
                c.status,
                c.reason.clone(),
                c.message.clone(),
            ),
            None => ConditionUpdate::new(
                ConditionType::ScalingActive,
                ConditionStatus::Unknown,
                reason::SCALING_ACTIVE_MISSING,
                "target hpa reports no ScalingActive condition",
            ),
        };
        hpax.status.conditions.set(observed(mirror), now);

        let baseline = hpax.spec.min_replicas;
        let fallback = fallback::evaluate(&hpax.spec, scaling_active, now);
        hpax.status.conditions.set(
            observed(ConditionUpdate::new(
                ConditionType::FallbackActive,
                fallback.status,
                fallback.reason,
                fallback.message.clone(),
            )),
            now,
        );

        let (listed, overrides) = match self.client.list_overrides(&key.namespace, &target).await {
            Ok(list) => {
                let outcome = overrides::aggregate(baseline, &list, now);
                (list, outcome)
            }
            Err(e) => {
                warn!("hpax {}: failed listing overrides: {}", key, e);
                (Vec::new(), overrides::list_failed(baseline, &e))
            }
        };
        hpax.status.conditions.set(
            observed(ConditionUpdate::new(
                ConditionType::OverrideActive,
                overrides.status,
                overrides.reason,
                overrides.message.clone(),
            )),
            now,
        );

        let decision = decision::decide(
            baseline,
            fallback.min_replicas,
            overrides.min_replicas,
            hpa.spec.min_replicas,
        );
        if decision.patch_needed {
            match self
                .client
                .patch_hpa_min_replicas(&hpa, decision.min_replicas)
                .await
            {
                Ok(_) => {
                    info!(
                        "hpax {}: set minReplicas of hpa {} {:?} -> {}",
                        key, target, hpa.spec.min_replicas, decision.min_replicas
                    );
                }
                Err(e) if e.is_conflict() => {
                    debug!("hpax {}: hpa {} changed while patching, retrying", key, target);
                    return RequeueDirective::Immediately;
                }
                Err(e) if e.is_not_found() => {
                    info!("hpax {}: target hpa {} disappeared before patch", key, target);
                    hpax.status.conditions.set(
                        observed(ConditionUpdate::new(
                            ConditionType::Ready,
                            ConditionStatus::False,
                            reason::TARGET_NOT_FOUND,
                            format!("target hpa {} not found", target),
                        )),
                        now,
                    );
                    return self
                        .finish(
                            &original,
                            hpax,
                            RequeueDirective::After(self.not_found_requeue),
                        )
                        .await;
                }
                Err(e) => {
                    warn!("hpax {}: failed to patch hpa {}: {}", key, target, e);
                    hpax.status.conditions.set(
                        observed(ConditionUpdate::new(
                            ConditionType::Ready,
                            ConditionStatus::False,
                            reason::PATCH_FAILED,
                            format!(
                                "failed to set minReplicas of hpa {} to {}: {}",
                                target, decision.min_replicas, e
                            ),
                        )),
                        now,
                    );
                    return self
                        .finish(&original, hpax, RequeueDirective::Backoff(e.to_string()))
                        .await;
                }
            }
        }

        hpax.status.conditions.set(
            observed(ConditionUpdate::new(
                ConditionType::Ready,
                ConditionStatus::True,
                reason::FLOOR_APPLIED,
                format!("minReplicas is {}", decision.min_replicas),
            )),
            now,
        );

        // Only once the floor is in place: an aborted pass records nothing.
        self.sync_override_status(&listed, &overrides).await;

        let directive = match next_wake(fallback.engages_at, &overrides) {
            Some(at) => RequeueDirective::After((at - now).to_std().unwrap_or(Duration::ZERO)),
            None => RequeueDirective::Done,
        };
        self.finish(&original, hpax, directive).await
    }

    /// Record each override's eligibility. Failures only cost the advisory
    /// flag, so they are logged and otherwise ignored.
    async fn sync_override_status(&self, list: &[HPAOverride], outcome: &OverrideOutcome) {
        for o in list {
            let active = outcome.active.contains(&o.metadata.name);
            if o.status.active == active {
                continue;
            }
            let mut next = o.clone();
            next.status.active = active;
            if let Err(e) = self.client.update_override_status(&next).await {
                debug!(
                    "Failed to update status of override {}/{}: {}",
                    o.metadata.namespace, o.metadata.name, e
                );
            }
        }
    }

    /// Persist `hpax.status` if it differs from `original`, then hand back
    /// `directive` unless the write itself calls for something else.
    async fn finish(
        &self,
        original: &HorizontalPodAutoscalerX,
        hpax: HorizontalPodAutoscalerX,
        directive: RequeueDirective,
    ) -> RequeueDirective {
        if hpax.status == original.status {
            return directive;
        }
        match self.client.update_hpax_status(&hpax).await {
            Ok(_) => directive,
            Err(e) if e.is_conflict() => RequeueDirective::Immediately,
            Err(e) if e.is_not_found() => RequeueDirective::Done,
            Err(e) => {
                warn!(
                    "Failed to update status of hpax {}/{}: {}",
                    hpax.metadata.namespace, hpax.metadata.name, e
                );
                RequeueDirective::Backoff(e.to_string())
            }
        }
    }
}

fn next_wake(
    engages_at: Option<DateTime<Utc>>,
    overrides: &OverrideOutcome,
) -> Option<DateTime<Utc>> {
    engages_at.into_iter().chain(overrides.next_boundary).min()
}
