//! Folder event observers.
//!
//! Observers are kept in registration order. Each dispatch takes a snapshot
//! of the list before invoking anyone, so disposing a registration mid-dispatch
//! only affects later events.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use kestrel_types::{DispatchOrder, FolderEvent};

use crate::folder::FolderContext;

pub type ObserverFut<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Receives folder lifecycle events from a workspace.
///
/// Errors are logged by the dispatcher and never stop the remaining
/// observers from running.
pub trait FolderObserver: Send + Sync {
    /// `folder` is `None` for `Focus`/`Unfocus` when no folder is focused.
    fn on_folder_event<'a>(
        &'a self,
        folder: Option<&'a Arc<FolderContext>>,
        event: FolderEvent,
    ) -> ObserverFut<'a>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ObserverList = Mutex<Vec<(ObserverId, Arc<dyn FolderObserver>)>>;

#[derive(Default)]
pub struct ObserverRegistry {
    observers: Arc<ObserverList>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn register(&self, observer: Arc<dyn FolderObserver>) -> ObserverRegistration {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.observers).push((id, observer));
        ObserverRegistration {
            observers: Arc::downgrade(&self.observers),
            id,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.observers).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) {
        lock(&self.observers).clear();
    }

    /// Invoke every registered observer in `order`, awaiting each in turn.
    pub async fn dispatch(
        &self,
        folder: Option<&Arc<FolderContext>>,
        event: FolderEvent,
        order: DispatchOrder,
    ) {
        let mut snapshot: Vec<_> = lock(&self.observers)
            .iter()
            .map(|(id, observer)| (*id, Arc::clone(observer)))
            .collect();
        if order == DispatchOrder::Reverse {
            snapshot.reverse();
        }

        let uri = folder.map(|f| f.uri().as_str());
        tracing::debug!(%event, folder = uri, observers = snapshot.len(), "Dispatching folder event");
        for (id, observer) in snapshot {
            if let Err(e) = observer.on_folder_event(folder, event).await {
                tracing::warn!(%event, folder = uri, observer = id.0, "Folder observer failed: {e:#}");
            }
        }
    }
}

fn lock(list: &ObserverList) -> std::sync::MutexGuard<'_, Vec<(ObserverId, Arc<dyn FolderObserver>)>> {
    list.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Disposal handle returned by [`ObserverRegistry::register`].
///
/// Dropping the handle keeps the observer registered; call
/// [`ObserverRegistration::dispose`] to remove it.
#[derive(Debug)]
pub struct ObserverRegistration {
    observers: Weak<ObserverList>,
    id: ObserverId,
}

impl ObserverRegistration {
    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn dispose(self) {
        if let Some(observers) = self.observers.upgrade() {
            lock(&observers).retain(|(id, _)| *id != self.id);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::recording::{Log, recorder};
    use super::*;

    struct Failing;

    impl FolderObserver for Failing {
        fn on_folder_event<'a>(
            &'a self,
            _folder: Option<&'a Arc<FolderContext>>,
            _event: FolderEvent,
        ) -> ObserverFut<'a> {
            Box::pin(async { Err(anyhow::anyhow!("boom")) })
        }
    }

    #[tokio::test]
    async fn forward_and_reverse_order() {
        let log = Log::default();
        let registry = ObserverRegistry::default();
        let _a = registry.register(recorder("A", &log));
        let _b = registry.register(recorder("B", &log));
        let _c = registry.register(recorder("C", &log));

        registry
            .dispatch(None, FolderEvent::Add, DispatchOrder::Registration)
            .await;
        registry
            .dispatch(None, FolderEvent::Remove, DispatchOrder::Reverse)
            .await;

        assert_eq!(
            *log.lock().unwrap(),
            ["A:add:-", "B:add:-", "C:add:-", "C:remove:-", "B:remove:-", "A:remove:-"]
        );
    }

    #[tokio::test]
    async fn disposed_observer_is_skipped() {
        let log = Log::default();
        let registry = ObserverRegistry::default();
        let a = registry.register(recorder("A", &log));
        let _b = registry.register(recorder("B", &log));
        a.dispose();
        assert_eq!(registry.len(), 1);

        registry
            .dispatch(None, FolderEvent::Focus, DispatchOrder::Registration)
            .await;
        assert_eq!(*log.lock().unwrap(), ["B:focus:-"]);
    }

    #[tokio::test]
    async fn failing_observer_does_not_stop_dispatch() {
        let log = Log::default();
        let registry = ObserverRegistry::default();
        let _f = registry.register(Arc::new(Failing));
        let _a = registry.register(recorder("A", &log));

        registry
            .dispatch(None, FolderEvent::Add, DispatchOrder::Registration)
            .await;
        assert_eq!(*log.lock().unwrap(), ["A:add:-"]);
    }

    #[test]
    fn dispose_after_registry_dropped_is_harmless() {
        let registry = ObserverRegistry::default();
        let reg = registry.register(Arc::new(Failing));
        drop(registry);
        reg.dispose();
    }
}
