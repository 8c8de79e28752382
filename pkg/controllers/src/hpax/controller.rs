use anyhow::Context;
use chrono::Utc;
use pkg_constants::controller::{
    BACKOFF_BASE_MILLIS, CONTROLLER_NAME, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_NOT_FOUND_REQUEUE_SECS,
    DEFAULT_RECONCILE_TIMEOUT_SECS, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WORKERS,
    HPA_TARGET_NAME_INDEX,
};
use pkg_constants::state::{KIND_HPA, KIND_HPA_OVERRIDE, KIND_HPAX};
use pkg_state::Registry;
use pkg_state::watch::WatchEvent;
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::hpa_override::HPAOverride;
use pkg_types::hpax::HorizontalPodAutoscalerX;
use pkg_types::meta::{ObjectKey, Resource};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::predicate::{hpa_changed, hpax_changed, is_relevant, override_changed};
use super::reconciler::{HpaxReconciler, RequeueDirective};
use crate::queue::WorkQueue;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub workers: usize,
    pub resync_interval: Duration,
    pub not_found_requeue: Duration,
    pub reconcile_timeout: Duration,
    pub max_backoff: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            not_found_requeue: Duration::from_secs(DEFAULT_NOT_FOUND_REQUEUE_SECS),
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
        }
    }
}

/// HorizontalPodAutoscalerX controller.
///
/// Feeds a work queue from registry watch events (filtered for relevance and
/// mapped to affected hpaxes through the target-name index) and from a
/// periodic resync, and drains it with a pool of reconcile workers.
pub struct HpaxController {
    registry: Registry,
    reconciler: HpaxReconciler<Registry>,
    queue: WorkQueue<ObjectKey>,
    settings: ControllerSettings,
}

impl HpaxController {
    /// Register the `spec.hpaTargetName` index on hpaxes and overrides.
    /// Must run once before the controller starts.
    pub async fn setup(registry: &Registry) -> anyhow::Result<()> {
        registry
            .register_index::<HorizontalPodAutoscalerX>(HPA_TARGET_NAME_INDEX, |h| {
                vec![h.spec.hpa_target_name.clone()]
            })
            .await
            .context("Failed to register hpax target index")?;
        registry
            .register_index::<HPAOverride>(HPA_TARGET_NAME_INDEX, |o| {
                vec![o.spec.hpa_target_name.clone()]
            })
            .await
            .context("Failed to register override target index")?;
        Ok(())
    }

    pub fn new(registry: Registry, settings: ControllerSettings) -> Self {
        Self {
            reconciler: HpaxReconciler::new(registry.clone(), settings.not_found_requeue),
            queue: WorkQueue::new(Duration::from_millis(BACKOFF_BASE_MILLIS), settings.max_backoff),
            registry,
            settings,
        }
    }

    pub fn queue(&self) -> &WorkQueue<ObjectKey> {
        &self.queue
    }

    /// hpaxes that must be reconciled because of `event`.
    pub async fn requests_for_event(&self, event: &WatchEvent) -> Vec<ObjectKey> {
        match event.kind.as_str() {
            KIND_HPAX => {
                let (old, new) = event.decode::<HorizontalPodAutoscalerX>();
                if !is_relevant(old.as_ref(), new.as_ref(), hpax_changed) {
                    return Vec::new();
                }
                new.or(old).map(|h| h.key()).into_iter().collect()
            }
            KIND_HPA => {
                let (old, new) = event.decode::<HorizontalPodAutoscaler>();
                if !is_relevant(old.as_ref(), new.as_ref(), hpa_changed) {
                    return Vec::new();
                }
                match new.or(old) {
                    Some(hpa) => {
                        let key = hpa.key();
                        self.hpaxes_targeting([(key.namespace, key.name)]).await
                    }
                    None => Vec::new(),
                }
            }
            KIND_HPA_OVERRIDE => {
                let (old, new) = event.decode::<HPAOverride>();
                if !is_relevant(old.as_ref(), new.as_ref(), override_changed) {
                    return Vec::new();
                }
                // A retargeted override affects both its old and new target.
                let targets = old.iter().chain(new.iter()).map(|o| {
                    (
                        o.metadata.namespace.clone(),
                        o.spec.hpa_target_name.clone(),
                    )
                });
                self.hpaxes_targeting(targets).await
            }
            _ => Vec::new(),
        }
    }

    async fn hpaxes_targeting(
        &self,
        targets: impl IntoIterator<Item = (String, String)>,
    ) -> Vec<ObjectKey> {
        let targets: BTreeSet<(String, String)> = targets.into_iter().collect();
        let mut keys = BTreeSet::new();
        for (namespace, target) in targets {
            match self
                .registry
                .list_by_index::<HorizontalPodAutoscalerX>(&namespace, HPA_TARGET_NAME_INDEX, &target)
                .await
            {
                Ok(hpaxes) => keys.extend(hpaxes.iter().map(|h| h.key())),
                // The next resync picks these up.
                Err(e) => warn!(
                    "Failed to look up hpaxes targeting {}/{}: {}",
                    namespace, target, e
                ),
            }
        }
        keys.into_iter().collect()
    }

    /// Queue every hpax. Returns how many were queued.
    pub async fn enqueue_all(&self) -> anyhow::Result<usize> {
        let hpaxes = self
            .registry
            .list_all::<HorizontalPodAutoscalerX>()
            .await
            .context("Failed to list hpaxes")?;
        let count = hpaxes.len();
        for hpax in hpaxes {
            self.queue.add(hpax.key()).await;
        }
        Ok(count)
    }

    /// Reconcile every hpax once, in sequence, without starting workers.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let hpaxes = self
            .registry
            .list_all::<HorizontalPodAutoscalerX>()
            .await
            .context("Failed to list hpaxes")?;
        let count = hpaxes.len();
        for hpax in hpaxes {
            let key = hpax.key();
            let directive = self.reconcile_with_timeout(&key).await;
            info!("Reconciled hpax {}: {:?}", key, directive);
        }
        Ok(count)
    }

    async fn reconcile_with_timeout(&self, key: &ObjectKey) -> RequeueDirective {
        bounded(
            self.settings.reconcile_timeout,
            self.reconciler.reconcile(key, Utc::now()),
        )
        .await
    }

    async fn process(&self, key: ObjectKey) {
        match self.reconcile_with_timeout(&key).await {
            RequeueDirective::Done => {
                self.queue.forget(&key).await;
            }
            RequeueDirective::After(delay) => {
                self.queue.forget(&key).await;
                debug!("Requeue hpax {} in {:?}", key, delay);
                self.queue.add_after(key.clone(), delay).await;
            }
            RequeueDirective::Immediately => {
                self.queue.forget(&key).await;
                self.queue.add(key.clone()).await;
            }
            RequeueDirective::Backoff(reason) => {
                let delay = self.queue.add_rate_limited(key.clone()).await;
                warn!("hpax {} failed ({}), retrying in {:?}", key, reason, delay);
            }
        }
        self.queue.done(&key).await;
    }

    pub fn start(self) -> ControllerHandle {
        let controller = Arc::new(self);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(controller.settings.workers + 1);

        info!(
            "HpaxController started (workers={}, resync={}s)",
            controller.settings.workers,
            controller.settings.resync_interval.as_secs()
        );

        let watcher = controller.clone();
        tasks.push(tokio::spawn(async move {
            let mut events = watcher.registry.event_log.subscribe();
            let mut resync = tokio::time::interval(watcher.settings.resync_interval);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = resync.tick() => {
                        match watcher.enqueue_all().await {
                            Ok(count) => debug!("{} resync queued {} hpaxes", CONTROLLER_NAME, count),
                            Err(e) => warn!("{} resync failed: {:#}", CONTROLLER_NAME, e),
                        }
                    }
                    event = events.recv() => match event {
                        Ok(event) => {
                            for key in watcher.requests_for_event(&event).await {
                                watcher.queue.add(key).await;
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!("{} missed {} watch events, resyncing", CONTROLLER_NAME, missed);
                            if let Err(e) = watcher.enqueue_all().await {
                                warn!("{} resync failed: {:#}", CONTROLLER_NAME, e);
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("{} watch loop stopped", CONTROLLER_NAME);
        }));

        for worker in 0..controller.settings.workers.max(1) {
            let controller = controller.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(key) = controller.queue.get().await {
                    controller.process(key).await;
                }
                debug!("{} worker {} stopped", CONTROLLER_NAME, worker);
            }));
        }

        ControllerHandle {
            queue: controller.queue.clone(),
            stop: stop_tx,
            tasks,
        }
    }
}

/// Running controller; dropping it leaves the tasks running.
pub struct ControllerHandle {
    queue: WorkQueue<ObjectKey>,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Stop the watch loop and workers and wait for in-flight
    /// reconciliations to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        self.queue.shutdown().await;
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("{} task failed: {}", CONTROLLER_NAME, e);
            }
        }
        info!("HpaxController stopped");
    }
}

/// Run one reconciliation, turning an overrun into a retryable failure.
async fn bounded(
    limit: Duration,
    reconcile: impl Future<Output = RequeueDirective>,
) -> RequeueDirective {
    match tokio::time::timeout(limit, reconcile).await {
        Ok(directive) => directive,
        Err(_) => RequeueDirective::Backoff(format!("reconcile timed out after {:?}", limit)),
    }
}
