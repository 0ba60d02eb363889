//! Late binding between objects constructed out of order.
//!
//! A [`DeferredResolver`] is a type-indexed store: producers register
//! entities, consumers look them up by type or ask to be told when one
//! arrives. It runs independently of providers and the locator, for object
//! graphs whose halves are built by different code paths (a presenter built
//! ahead of the view that will claim it, for instance).
//!
//! Entries live in a generational arena. A [`Registration`] is only a slot
//! key and sequence number into it, so handles never keep entities alive,
//! and retiring an entry twice or after its slot was reused is harmless.

mod arena;

use std::any::{Any, TypeId};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::config::LocatorConfig;
use arena::{Arena, Entry, EntryHandle};

type Delivery = Box<dyn FnOnce() + Send>;

/// Observer waiting for an entity of one type.
struct Waiting {
    type_id: TypeId,
    /// False once nobody can receive the delivery any more
    alive: Option<Box<dyn Fn() -> bool + Send>>,
    /// Clones the entity out of the arena and returns the call to make once
    /// the lock is released
    prepare: Box<dyn FnOnce(&(dyn Any + Send + Sync)) -> Delivery + Send>,
}

impl Waiting {
    fn is_alive(&self) -> bool {
        self.alive.as_ref().map_or(true, |alive| alive())
    }
}

#[derive(Default)]
struct State {
    arena: Arena,
    waiting: Vec<Waiting>,
}

impl State {
    /// Removes and returns live observers of `type_id`, oldest first, up to `limit`.
    fn take_waiting(&mut self, type_id: TypeId, limit: usize) -> Vec<Waiting> {
        self.waiting.retain(Waiting::is_alive);
        let mut taken = Vec::new();
        let mut index = 0;
        while index < self.waiting.len() && taken.len() < limit {
            if self.waiting[index].type_id == type_id {
                taken.push(self.waiting.remove(index));
            } else {
                index += 1;
            }
        }
        taken
    }

    /// Clones the newest matching entity, retiring it if it was registered
    /// for first consumption.
    fn claim<T>(&mut self, now: Instant) -> (Option<Arc<T>>, Option<Entry>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let Some(handle) = self.arena.newest(TypeId::of::<T>(), now) else {
            return (None, None);
        };
        let Some(entry) = self.arena.get(handle) else {
            return (None, None);
        };
        let value = entry.value.downcast_ref::<Arc<T>>().cloned();
        let retired = if entry.first_consumption {
            self.arena.remove(handle)
        } else {
            None
        };
        (value, retired)
    }
}

struct ResolverInner {
    state: Mutex<State>,
    default_timeout: Option<Duration>,
}

impl ResolverInner {
    fn retire(&self, handle: EntryHandle) -> bool {
        let retired = self.state.lock().arena.remove(handle);
        match retired {
            Some(entry) => {
                tracing::debug!(entity = entry.type_name, "deferred entry retired");
                // Entity dropped here, outside the lock
                drop(entry);
                true
            }
            None => false,
        }
    }

    fn retire_expired(&self) -> usize {
        let expired = self.state.lock().arena.take_expired(Instant::now());
        for entry in &expired {
            tracing::debug!(entity = entry.type_name, "unclaimed deferred entry timed out");
        }
        expired.len()
    }
}

/// Process-wide or local late-binding store.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::DeferredResolver;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct Presenter { title: &'static str }
///
/// let resolver = DeferredResolver::new();
///
/// // The consumer asks before the presenter exists
/// let attached = Arc::new(AtomicBool::new(false));
/// let flag = attached.clone();
/// resolver.observe(move |presenter: Arc<Presenter>| {
///     assert_eq!(presenter.title, "notes");
///     flag.store(true, Ordering::SeqCst);
/// });
///
/// let registration = resolver.register(Arc::new(Presenter { title: "notes" }));
/// assert!(attached.load(Ordering::SeqCst));
///
/// // Still resolvable until the registration is dropped
/// assert!(resolver.resolve::<Presenter>().is_some());
/// drop(registration);
/// assert!(resolver.resolve::<Presenter>().is_none());
/// ```
#[derive(Clone)]
pub struct DeferredResolver {
    inner: Arc<ResolverInner>,
}

static GLOBAL: Lazy<DeferredResolver> = Lazy::new(DeferredResolver::new);

impl DeferredResolver {
    pub fn new() -> Self {
        Self::with_default_timeout(None)
    }

    /// Uses `config.first_consumption_timeout` for
    /// [`register_for_first_consumption_default`](Self::register_for_first_consumption_default).
    pub fn with_config(config: &LocatorConfig) -> Self {
        Self::with_default_timeout(config.first_consumption_timeout)
    }

    fn with_default_timeout(default_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                state: Mutex::new(State::default()),
                default_timeout,
            }),
        }
    }

    /// The process-wide resolver.
    pub fn global() -> &'static DeferredResolver {
        &GLOBAL
    }

    /// Registers `entity` and hands it to every observer waiting for its type.
    ///
    /// The entity stays resolvable until the returned [`Registration`] is
    /// dropped or retired. A later registration of the same type shadows
    /// this one for lookups.
    pub fn register<T>(&self, entity: Arc<T>) -> Registration
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let value: Box<dyn Any + Send + Sync> = Box::new(entity);
        let now = Instant::now();
        let (handle, deliveries, expired) = {
            let mut state = self.inner.state.lock();
            let expired = state.arena.take_expired(now);
            let deliveries: Vec<Delivery> = state
                .take_waiting(TypeId::of::<T>(), usize::MAX)
                .into_iter()
                .map(|waiting| (waiting.prepare)(value.as_ref()))
                .collect();
            let seq = state.arena.next_seq();
            let handle = state.arena.insert(Entry {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                value,
                seq,
                first_consumption: false,
                deadline: None,
            });
            (handle, deliveries, expired)
        };
        drop(expired);

        tracing::debug!(
            entity = std::any::type_name::<T>(),
            observers = deliveries.len(),
            "deferred entity registered"
        );
        for deliver in deliveries {
            deliver();
        }

        Registration {
            resolver: Some(Arc::downgrade(&self.inner)),
            handle,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Registers `entity` for a single consumer.
    ///
    /// If an observer is already waiting for the type, the oldest one
    /// receives the entity right away and nothing is stored; the call
    /// returns `true`. Otherwise the entity waits until one lookup or
    /// observer takes it, or until `auto_remove_after` elapses, whichever
    /// comes first.
    ///
    /// With `auto_remove_after == None` an unclaimed entity is kept for as
    /// long as the resolver lives. Callers that cannot guarantee a consumer
    /// should pass a deadline.
    pub fn register_for_first_consumption<T>(&self, entity: Arc<T>, auto_remove_after: Option<Duration>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let value: Box<dyn Any + Send + Sync> = Box::new(entity);
        let now = Instant::now();
        let (delivery, expired) = {
            let mut state = self.inner.state.lock();
            let expired = state.arena.take_expired(now);
            let delivery = state
                .take_waiting(TypeId::of::<T>(), 1)
                .pop()
                .map(|waiting| (waiting.prepare)(value.as_ref()));
            if delivery.is_none() {
                let seq = state.arena.next_seq();
                state.arena.insert(Entry {
                    type_id: TypeId::of::<T>(),
                    type_name: std::any::type_name::<T>(),
                    value,
                    seq,
                    first_consumption: true,
                    deadline: auto_remove_after.map(|after| now + after),
                });
            }
            (delivery, expired)
        };
        drop(expired);

        match delivery {
            Some(deliver) => {
                tracing::debug!(entity = std::any::type_name::<T>(), "delivered to waiting observer");
                deliver();
                true
            }
            None => {
                if let Some(after) = auto_remove_after {
                    self.schedule_sweep(after);
                }
                false
            }
        }
    }

    /// Same as [`register_for_first_consumption`](Self::register_for_first_consumption)
    /// with the configured default deadline.
    pub fn register_for_first_consumption_default<T>(&self, entity: Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register_for_first_consumption(entity, self.inner.default_timeout)
    }

    #[cfg(feature = "async")]
    fn schedule_sweep(&self, after: Duration) {
        // Without a runtime, expiry is still applied lazily on every access
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let resolver = Arc::downgrade(&self.inner);
            runtime.spawn(async move {
                tokio::time::sleep(after).await;
                if let Some(resolver) = resolver.upgrade() {
                    resolver.retire_expired();
                }
            });
        }
    }

    #[cfg(not(feature = "async"))]
    fn schedule_sweep(&self, _after: Duration) {}

    /// Newest live entity of type `T`.
    ///
    /// An entity registered for first consumption is retired by this call.
    pub fn resolve<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let (value, retired, expired) = {
            let mut state = self.inner.state.lock();
            let expired = state.arena.take_expired(Instant::now());
            let (value, retired) = state.claim::<T>(Instant::now());
            (value, retired, expired)
        };
        if retired.is_some() {
            tracing::debug!(entity = std::any::type_name::<T>(), "first-consumption entry claimed");
        }
        drop(retired);
        drop(expired);
        value
    }

    /// Calls `handler` once with an entity of type `T`.
    ///
    /// If one is registered now, `handler` runs immediately (claiming it if
    /// it was registered for first consumption). Otherwise it runs on the
    /// thread that registers the next one.
    pub fn observe<T, F>(&self, handler: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce(Arc<T>) + Send + 'static,
    {
        self.observe_while(handler, None);
    }

    fn observe_while<T, F>(&self, handler: F, alive: Option<Box<dyn Fn() -> bool + Send>>)
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce(Arc<T>) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let (present, retired) = state.claim::<T>(Instant::now());
        let Some(value) = present else {
            state.waiting.push(Waiting {
                type_id: TypeId::of::<T>(),
                alive,
                prepare: Box::new(|stored: &(dyn Any + Send + Sync)| -> Delivery {
                    match stored.downcast_ref::<Arc<T>>().cloned() {
                        Some(value) => Box::new(move || handler(value)),
                        None => Box::new(|| {}),
                    }
                }),
            });
            return;
        };
        drop(state);
        drop(retired);
        handler(value);
    }

    /// Waits for an entity of type `T`, resolving immediately if one is present.
    ///
    /// Resolves to `None` only if the resolver is dropped first.
    #[cfg(feature = "async")]
    pub async fn wait_for<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let (sender, receiver) = tokio::sync::oneshot::channel::<Arc<T>>();
        let sender = Arc::new(Mutex::new(Some(sender)));
        let watch = sender.clone();
        self.observe_while(
            move |value: Arc<T>| {
                if let Some(sender) = sender.lock().take() {
                    let _ = sender.send(value);
                }
            },
            Some(Box::new(move || {
                watch.lock().as_ref().is_some_and(|sender| !sender.is_closed())
            })),
        );
        receiver.await.ok()
    }

    /// Like [`wait_for`](Self::wait_for), giving up after `timeout`.
    ///
    /// A first-consumption entity arriving after the timeout is left for
    /// the next consumer.
    #[cfg(feature = "async")]
    pub async fn wait_for_timeout<T>(&self, timeout: Duration) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        tokio::time::timeout(timeout, self.wait_for::<T>())
            .await
            .ok()
            .flatten()
    }

    /// Whether a live entity of type `T` is registered. Does not claim it.
    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        self.inner
            .state
            .lock()
            .arena
            .newest(TypeId::of::<T>(), Instant::now())
            .is_some()
    }

    /// Number of stored entries, including ones past their deadline that
    /// were not swept yet.
    pub fn len(&self) -> usize {
        self.inner.state.lock().arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of observers still waiting for a delivery.
    pub fn pending_observers(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.waiting.retain(Waiting::is_alive);
        state.waiting.len()
    }

    /// Drops every first-consumption entry whose deadline has passed.
    pub fn retire_expired(&self) -> usize {
        self.inner.retire_expired()
    }
}

impl Default for DeferredResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeferredResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredResolver")
            .field("entries", &self.len())
            .field("default_timeout", &self.inner.default_timeout)
            .finish()
    }
}

/// Keeps a registered entity resolvable; dropping it retires the entry.
#[must_use = "dropping a Registration immediately retires the entity"]
pub struct Registration {
    resolver: Option<Weak<ResolverInner>>,
    handle: EntryHandle,
    type_name: &'static str,
}

impl Registration {
    /// Retires the entry now. Returns whether it was still registered.
    pub fn retire(mut self) -> bool {
        self.retire_now()
    }

    /// Keeps the entity registered for the resolver's whole lifetime.
    pub fn detach(mut self) {
        self.resolver = None;
    }

    /// Whether the entry is still registered.
    pub fn is_live(&self) -> bool {
        self.resolver
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|resolver| resolver.state.lock().arena.get(self.handle).is_some())
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn retire_now(&mut self) -> bool {
        match self.resolver.take().and_then(|resolver| resolver.upgrade()) {
            Some(resolver) => resolver.retire(self.handle),
            None => false,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.retire_now();
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("entity", &self.type_name)
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Presenter: Send + Sync {
        fn title(&self) -> &str;
    }

    struct Notes;

    impl Presenter for Notes {
        fn title(&self) -> &str {
            "notes"
        }
    }

    #[test]
    fn trait_objects_are_keyed_by_their_dyn_type() {
        let resolver = DeferredResolver::new();
        let _registration = resolver.register::<dyn Presenter>(Arc::new(Notes));

        assert_eq!(resolver.resolve::<dyn Presenter>().unwrap().title(), "notes");
        assert!(resolver.resolve::<Notes>().is_none());
    }

    #[test]
    fn detached_registration_outlives_its_handle() {
        let resolver = DeferredResolver::new();
        resolver.register(Arc::new(5u8)).detach();
        assert_eq!(*resolver.resolve::<u8>().unwrap(), 5);
    }

    #[test]
    fn handlers_may_register_without_deadlock() {
        let resolver = DeferredResolver::new();
        let inner = resolver.clone();
        resolver.observe(move |n: Arc<u32>| {
            inner.register(Arc::new(*n as u64)).detach();
        });
        resolver.register(Arc::new(9u32)).detach();
        assert_eq!(*resolver.resolve::<u64>().unwrap(), 9);
    }
}
