//! Observation hooks for locator resolutions.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::ObtainError;

/// What an observer is told about a resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionEvent {
    /// Name of the key being resolved
    pub key: &'static str,
    /// Type name the key is bound to
    pub value_type: &'static str,
}

/// Observer of locator resolutions.
///
/// Calls are made synchronously on the resolving thread, so keep
/// implementations light.
///
/// # Examples
///
/// ```
/// use ferrous_locator::{ResolutionEvent, ResolutionObserver, ObtainError, ServiceKey, ServiceLocator};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Counting(AtomicUsize);
///
/// impl ResolutionObserver for Counting {
///     fn resolving(&self, _event: &ResolutionEvent) {}
///     fn resolved(&self, _event: &ResolutionEvent, _took: Duration) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
///     fn failed(&self, _event: &ResolutionEvent, _error: &ObtainError) {}
/// }
///
/// const PORT: ServiceKey<u16> = ServiceKey::new("port");
///
/// let counting = Arc::new(Counting::default());
/// let locator = ServiceLocator::new();
/// locator.add_observer(counting.clone());
/// locator.add_instance(PORT, 8080).unwrap();
///
/// locator.get_service(PORT).unwrap();
/// assert_eq!(counting.0.load(Ordering::SeqCst), 1);
/// ```
pub trait ResolutionObserver: Send + Sync {
    /// Called before the provider is asked for a value.
    fn resolving(&self, event: &ResolutionEvent);

    /// Called after a value was obtained.
    fn resolved(&self, event: &ResolutionEvent, duration: Duration);

    /// Called when resolution failed, with the full error.
    fn failed(&self, event: &ResolutionEvent, error: &ObtainError);
}

#[derive(Default)]
pub(crate) struct Observers {
    observers: RwLock<Vec<Arc<dyn ResolutionObserver>>>,
}

impl Observers {
    pub(crate) fn add(&self, observer: Arc<dyn ResolutionObserver>) {
        self.observers.write().push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.read().is_empty()
    }

    // Snapshot so observers may resolve through the locator themselves
    fn snapshot(&self) -> Vec<Arc<dyn ResolutionObserver>> {
        self.observers.read().clone()
    }

    pub(crate) fn resolving(&self, event: &ResolutionEvent) {
        for observer in self.snapshot() {
            observer.resolving(event);
        }
    }

    pub(crate) fn resolved(&self, event: &ResolutionEvent, duration: Duration) {
        for observer in self.snapshot() {
            observer.resolved(event, duration);
        }
    }

    pub(crate) fn failed(&self, event: &ResolutionEvent, error: &ObtainError) {
        for observer in self.snapshot() {
            observer.failed(event, error);
        }
    }
}

/// Observer that reports every resolution through `tracing`.
pub struct LoggingObserver {
    target: &'static str,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            target: "ferrous_locator",
        }
    }

    /// Tags every event with `label` so several locators can be told apart.
    pub fn with_label(label: &'static str) -> Self {
        Self { target: label }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionObserver for LoggingObserver {
    fn resolving(&self, event: &ResolutionEvent) {
        tracing::trace!(locator = self.target, key = event.key, value = event.value_type, "resolving");
    }

    fn resolved(&self, event: &ResolutionEvent, duration: Duration) {
        tracing::debug!(
            locator = self.target,
            key = event.key,
            value = event.value_type,
            ?duration,
            "resolved"
        );
    }

    fn failed(&self, event: &ResolutionEvent, error: &ObtainError) {
        tracing::warn!(
            locator = self.target,
            key = event.key,
            value = event.value_type,
            path = %error.path().join(" -> "),
            "resolution failed: {}",
            error.kind()
        );
    }
}
