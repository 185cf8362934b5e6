//! Observers notified by a supervisor on every poll tick.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{info, trace, warn};

use super::snapshot::SupervisorSnapshot;
use crate::manifest::ManifestObserver;
use crate::{Error, Result};

/// Plain function observer.
pub type ObserverFn = dyn Fn(&SupervisorSnapshot) -> Result<()> + Send + Sync;

/// The kinds of observer a supervisor can notify.
#[derive(Clone)]
pub enum Observer {
    /// Keeps a camera's master manifest in sync with its live outputs.
    Manifest(Arc<ManifestObserver>),
    /// Named callback, invoked synchronously on the poll loop.
    Callback(String, Arc<ObserverFn>),
}

impl Observer {
    pub fn callback<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&SupervisorSnapshot) -> Result<()> + Send + Sync + 'static,
    {
        Observer::Callback(name.into(), Arc::new(f))
    }

    pub fn name(&self) -> &str {
        match self {
            Observer::Manifest(_) => "manifest",
            Observer::Callback(name, _) => name,
        }
    }

    async fn notify(&self, snapshot: &SupervisorSnapshot) -> Result<()> {
        match self {
            Observer::Manifest(manifest) => manifest.on_tick(snapshot).await,
            Observer::Callback(_, f) => f(snapshot),
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observer").field(&self.name()).finish()
    }
}

/// Token returned by [`ObserverSet::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Insertion-ordered observer list with its own lock.
///
/// Attach and detach may run from any task while a notification is in flight;
/// a notification works on a copy of the list taken when it starts.
#[derive(Clone, Default)]
pub struct ObserverSet {
    inner: Arc<ObserverSetInner>,
}

#[derive(Default)]
struct ObserverSetInner {
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_id: AtomicU64,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        info!(observer = observer.name(), "Observer attached");
        self.inner.observers.lock().push((id, observer));
        id
    }

    /// Returns whether `id` was attached.
    pub fn detach(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.observers.lock();
        let Some(idx) = observers.iter().position(|(oid, _)| *oid == id) else {
            return false;
        };
        let (_, observer) = observers.remove(idx);
        info!(observer = observer.name(), "Observer detached");
        true
    }

    pub fn len(&self) -> usize {
        self.inner.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every observer in insertion order.
    ///
    /// An observer that fails or panics is logged and skipped; the rest are
    /// still notified. Returns the number of failed observers.
    pub async fn notify_all(&self, snapshot: &SupervisorSnapshot) -> usize {
        let observers: Vec<Observer> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|(_, o)| o.clone())
            .collect();

        let mut failures = 0;
        for observer in &observers {
            trace!(
                camera_id = %snapshot.camera_id,
                observer = observer.name(),
                "Notifying observer"
            );
            let result = AssertUnwindSafe(observer.notify(snapshot))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(Error::observer(observer.name(), panic_message(&*panic)))
                });

            if let Err(e) = result {
                failures += 1;
                warn!(
                    camera_id = %snapshot.camera_id,
                    observer = observer.name(),
                    error = %e,
                    "Observer failed"
                );
            }
        }
        failures
    }
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observers = self.inner.observers.lock();
        f.debug_list()
            .entries(observers.iter().map(|(_, o)| o.name()))
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
