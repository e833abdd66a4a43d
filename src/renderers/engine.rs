// plan-pdf-service/src/renderers/engine.rs

use crate::error::{Result, ServiceError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Process-wide, lazily launched engine instance.
///
/// The first caller launches it; concurrent callers wait on the same slot
/// instead of starting their own. A failed launch leaves the slot empty so
/// the next request can try again, and an instance that stops being healthy
/// is dropped and replaced on the next request.
pub struct SharedEngine<E> {
    slot: Mutex<Option<Arc<E>>>,
    launches: AtomicUsize,
    closed: AtomicBool,
}

impl<E> SharedEngine<E> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            launches: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn get_or_launch<H, F, Fut>(&self, healthy: H, launch: F) -> Result<Arc<E>>
    where
        H: Fn(&E) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<E>>,
    {
        let mut slot = self.slot.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(ServiceError::Render("renderer is shutting down".to_string()));
        }

        if let Some(engine) = slot.as_ref() {
            if healthy(engine) {
                return Ok(engine.clone());
            }
            warn!("Shared engine is no longer usable, relaunching");
            *slot = None;
        }

        self.launches.fetch_add(1, Ordering::SeqCst);
        let engine = Arc::new(launch().await?);
        *slot = Some(engine.clone());
        Ok(engine)
    }

    /// Number of launch attempts made so far.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.slot.lock().await.is_some()
    }

    /// Marks the engine closed. Returns the instance only to the first caller,
    /// and only if one is live, so it gets closed exactly once.
    pub async fn close_once(&self) -> Option<Arc<E>> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.slot.lock().await.take()
    }
}

impl<E> Default for SharedEngine<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn always(_: &u32) -> bool {
        true
    }

    struct Instance {
        id: u32,
        alive: AtomicBool,
    }

    fn live(id: u32) -> Instance {
        Instance {
            id,
            alive: AtomicBool::new(true),
        }
    }

    fn is_alive(instance: &Instance) -> bool {
        instance.alive.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn concurrent_first_calls_launch_once() {
        let engine: Arc<SharedEngine<u32>> = Arc::new(SharedEngine::new());

        let launch = |engine: Arc<SharedEngine<u32>>| async move {
            let value = engine
                .get_or_launch(always, || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(7)
                })
                .await
                .unwrap();
            *value
        };

        let (a, b) = tokio::join!(
            tokio::spawn(launch(engine.clone())),
            tokio::spawn(launch(engine.clone()))
        );

        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(engine.launch_count(), 1);
    }

    #[tokio::test]
    async fn failed_launch_can_be_retried() {
        let engine: SharedEngine<u32> = SharedEngine::new();

        let err = engine
            .get_or_launch(always, || async {
                Err(ServiceError::Render("no chrome".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "render_failed");
        assert!(!engine.is_running().await);

        let value = engine.get_or_launch(always, || async { Ok(3) }).await.unwrap();
        assert_eq!(*value, 3);
        assert_eq!(engine.launch_count(), 2);
    }

    #[tokio::test]
    async fn dead_instance_is_replaced_on_next_call() {
        let engine: SharedEngine<Instance> = SharedEngine::new();

        let first = engine.get_or_launch(is_alive, || async { Ok(live(1)) }).await.unwrap();
        let again = engine.get_or_launch(is_alive, || async { Ok(live(2)) }).await.unwrap();
        assert_eq!(again.id, 1);
        assert_eq!(engine.launch_count(), 1);

        first.alive.store(false, Ordering::SeqCst);

        let replaced = engine.get_or_launch(is_alive, || async { Ok(live(3)) }).await.unwrap();
        assert_eq!(replaced.id, 3);
        assert_eq!(engine.launch_count(), 2);

        let current = engine.get_or_launch(is_alive, || async { Ok(live(4)) }).await.unwrap();
        assert_eq!(current.id, 3);
    }

    #[tokio::test]
    async fn close_once_hands_out_instance_a_single_time() {
        let engine: SharedEngine<u32> = SharedEngine::new();
        engine.get_or_launch(always, || async { Ok(1) }).await.unwrap();

        assert_eq!(engine.close_once().await.as_deref(), Some(&1));
        assert!(engine.close_once().await.is_none());
        assert!(!engine.is_running().await);

        let err = engine.get_or_launch(always, || async { Ok(2) }).await.unwrap_err();
        assert_eq!(err.error_type(), "render_failed");
    }

    #[tokio::test]
    async fn close_before_launch_yields_nothing() {
        let engine: SharedEngine<u32> = SharedEngine::new();
        assert!(engine.close_once().await.is_none());
        assert_eq!(engine.launch_count(), 0);
    }
}
