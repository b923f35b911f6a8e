//! Kubernetes resource watchers.
//!
//! Both controllers run on `kube_runtime::Controller`, which keeps a
//! reflector cache per resource, coalesces triggers per object and never
//! reconciles the same object twice at once. This module supplies the
//! reconcile entry points, the error policy and the trigger mapping.

use crate::error::{ControllerError, ErrorKind};
use crate::reconciler::Reconciler;
use crds::{Instance, Pool};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Retry bookkeeping key of an object, e.g. `Pool/workers`
fn retry_key<K: Resource<DynamicType = ()>>(obj: &K) -> String {
    format!("{}/{}", K::kind(&()), obj.name_any())
}

/// Pool controller entry point
pub async fn reconcile_pool(pool: Arc<Pool>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    debug!("Reconciling Pool {}", pool.name_any());
    let action = ctx.reconcile_pool(&pool.name_any()).await?;
    ctx.reset_failures(&retry_key(pool.as_ref()));
    Ok(action)
}

/// Instance controller entry point
pub async fn reconcile_instance(
    instance: Arc<Instance>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ControllerError> {
    let action = ctx.reconcile_instance(&instance.name_any()).await?;
    ctx.reset_failures(&retry_key(instance.as_ref()));
    Ok(action)
}

/// Turns a failed pass into the next action for the object
///
/// Vanished objects and passes that can never succeed wait for the next
/// change. Everything else is retried with per-object exponential backoff.
pub fn error_policy<K>(obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let key = retry_key(obj.as_ref());
    match error.kind() {
        ErrorKind::NotFound => {
            info!("{} no longer exists: {}", key, error);
            ctx.reset_failures(&key);
            Action::await_change()
        }
        ErrorKind::Malformed => {
            error!("Giving up on {} until it changes: {}", key, error);
            ctx.reset_failures(&key);
            Action::await_change()
        }
        ErrorKind::AmbiguousProvider => {
            let (delay, attempt) = ctx.record_failure(&key);
            error!("{} needs attention, retry {} in {:?}: {}", key, attempt, delay, error);
            Action::requeue(delay)
        }
        ErrorKind::TransientExternal | ErrorKind::StartupFatal => {
            let (delay, attempt) = ctx.record_failure(&key);
            warn!("Reconciling {} failed, retry {} in {:?}: {}", key, attempt, delay, error);
            Action::requeue(delay)
        }
    }
}

/// Maps an Instance event to its owning Pool
pub fn owning_pool_ref(instance: Instance) -> Option<ObjectRef<Pool>> {
    instance.pool_name().map(ObjectRef::new)
}

/// Resolves once `shutdown` reads true, or its sender is gone
pub async fn stop_requested(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use crate::test_utils::{TestHarness, create_test_instance, create_test_pool};
    use digitalocean_client::ProviderError;
    use std::time::Duration;

    #[test]
    fn test_instance_events_map_to_owning_pool() {
        let instance = create_test_instance("workers-a", "workers");
        assert_eq!(owning_pool_ref(instance.clone()), Some(ObjectRef::new("workers")));

        let mut orphan = instance;
        orphan.metadata.labels = None;
        assert_eq!(owning_pool_ref(orphan), None);
    }

    #[tokio::test]
    async fn test_error_policy_backs_off_per_object() {
        let h = TestHarness::new();
        let ctx = Arc::new(h.reconciler);
        let pool = Arc::new(create_test_pool("workers", 1));
        let other = Arc::new(create_test_pool("other", 1));
        let error = ControllerError::Provider(ProviderError::Api {
            status: 503,
            message: "unavailable".to_string(),
        });

        let first = error_policy(pool.clone(), &error, ctx.clone());
        let second = error_policy(pool.clone(), &error, ctx.clone());
        assert_eq!(first, Action::requeue(Duration::from_millis(5)));
        assert_eq!(second, Action::requeue(Duration::from_millis(10)));

        // Tracked independently
        assert_eq!(
            error_policy(other, &error, ctx.clone()),
            Action::requeue(Duration::from_millis(5))
        );

        ctx.reset_failures("Pool/workers");
        assert_eq!(
            error_policy(pool, &error, ctx),
            Action::requeue(Duration::from_millis(5))
        );
    }

    #[tokio::test]
    async fn test_error_policy_waits_for_change_on_terminal_errors() {
        let h = TestHarness::new();
        let ctx = Arc::new(h.reconciler);
        let instance = Arc::new(create_test_instance("workers-a", "workers"));

        let not_found = ControllerError::Store(StoreError::NotFound {
            kind: "Instance",
            name: "workers-a".to_string(),
        });
        assert_eq!(
            error_policy(instance.clone(), &not_found, ctx.clone()),
            Action::await_change()
        );

        let invalid = ControllerError::InvalidTransition {
            name: "workers-a".to_string(),
            from: crate::reconciler::state::InstanceState::NodeReady,
            to: crate::reconciler::state::InstanceState::AwaitingWorkerJoin,
        };
        assert_eq!(error_policy(instance, &invalid, ctx), Action::await_change());
    }

    #[tokio::test]
    async fn test_clean_pass_resets_backoff() {
        let h = TestHarness::new();
        let pool = h.store.insert_pool(create_test_pool("workers", 0));
        let ctx = Arc::new(h.reconciler);
        ctx.record_failure("Pool/workers");
        ctx.record_failure("Pool/workers");

        let action = reconcile_pool(Arc::new(pool), ctx.clone()).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(ctx.record_failure("Pool/workers").0, Duration::from_millis(5));
    }
}
