//! Providers: caching front-ends over factories.
//!
//! A [`ParamsProvider`] pairs a [`Factory`](crate::Factory) with a
//! [`Mode`] and an optional [`Safety`] discipline. [`Provider`] is the
//! parameterless form. Both hand out values as `Arc<V>` so cached values are
//! shared by every caller.

use std::any::Any;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{fatal, BoxError, ObtainError, ObtainResult};
use crate::factory::{BoundFactory, SharedFactory};
use crate::internal::ProviderId;
use crate::mode::Mode;
use crate::safety::{Safety, SafetyHandler};

pub mod keyed;
mod slot;

pub use keyed::KeyedProvider;
use slot::Slot;

/// Anything that can hand out values of `V` for parameters `P`.
///
/// This is the seam the [`ServiceLocator`](crate::ServiceLocator) stores
/// providers behind, so plain, session-governed and keyed providers can be
/// registered alike.
pub trait Resolve<P, V: ?Sized>: Send + Sync {
    /// Resolves a value for `params`.
    fn resolve_with(&self, params: &P) -> ObtainResult<Arc<V>>;

    /// Caching mode, when the implementation has a single one.
    fn mode(&self) -> Option<Mode> {
        None
    }
}

/// Parameterless provider.
pub type Provider<V> = ParamsProvider<(), V>;

/// Provider whose factory takes parameters of type `P`.
///
/// Caching is per provider, not per parameter value: a `Lazy` provider built
/// with parameters `a` returns that same value when later asked with `b`.
/// Use [`bind`](Self::bind) or a [`KeyedProvider`] to cache per parameter.
///
/// Cloning a provider is cheap and shares its cache.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::{Mode, ParamsProvider};
///
/// struct Greeting(String);
///
/// let greet = ParamsProvider::new(Mode::Many, |name: &String| {
///     Ok(Greeting(format!("hello {}", name)))
/// });
///
/// let ada = greet.resolve_with(&"ada".to_string()).unwrap();
/// assert_eq!(ada.0, "hello ada");
///
/// // Partial application yields an independent parameterless provider
/// let grace = greet.bind("grace".to_string());
/// assert_eq!(grace.resolve().unwrap().0, "hello grace");
/// ```
pub struct ParamsProvider<P, V> {
    inner: Arc<ProviderCore<P, V>>,
}

/// Where a provider's values come from.
pub(crate) enum Source<P, V> {
    Factory(SharedFactory<P, V>),
    Session(Arc<dyn SessionSource<P, V>>),
    Instance(Arc<V>),
}

impl<P, V> Clone for Source<P, V> {
    fn clone(&self) -> Self {
        match self {
            Source::Factory(f) => Source::Factory(f.clone()),
            Source::Session(s) => Source::Session(s.clone()),
            Source::Instance(v) => Source::Instance(v.clone()),
        }
    }
}

/// Factory whose output depends on the current session of a mediator.
pub(crate) trait SessionSource<P, V>: Send + Sync {
    /// Epoch of the session that is current right now.
    fn epoch(&self) -> u64;

    /// Builds against one consistent session snapshot and reports the epoch
    /// of that snapshot.
    fn build(&self, params: &P) -> (u64, Result<V, BoxError>);

    /// Puts a provider cache under this session's invalidation.
    fn track(&self, target: Weak<dyn Invalidate>);
}

/// Cache that can be told a session ended.
pub(crate) trait Invalidate: Send + Sync {
    /// Drops anything cached before `epoch`. Returns whether something was dropped.
    fn invalidate_before(&self, epoch: u64) -> bool;
}

/// Session source with its parameters already applied.
struct BoundSession<P, V> {
    inner: Arc<dyn SessionSource<P, V>>,
    params: P,
}

impl<P, V> SessionSource<(), V> for BoundSession<P, V>
where
    P: Send + Sync,
{
    fn epoch(&self) -> u64 {
        self.inner.epoch()
    }

    fn build(&self, _: &()) -> (u64, Result<V, BoxError>) {
        self.inner.build(&self.params)
    }

    fn track(&self, target: Weak<dyn Invalidate>) {
        self.inner.track(target);
    }
}

pub(crate) struct ProviderCore<P, V> {
    id: ProviderId,
    mode: Mode,
    source: Source<P, V>,
    safety: SafetyHandler,
    slot: Mutex<Slot<V>>,
}

impl<P, V> ProviderCore<P, V>
where
    P: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn spawn(mode: Mode, safety: Safety, source: Source<P, V>) -> Arc<Self> {
        let core = Arc::new(Self {
            id: ProviderId::next(),
            mode,
            source,
            safety: SafetyHandler::new(safety),
            slot: Mutex::new(Slot::empty()),
        });
        if let Source::Session(session) = &core.source {
            if mode.caches() {
                let weak: Weak<ProviderCore<P, V>> = Arc::downgrade(&core);
                session.track(weak);
            }
        }
        core
    }

    fn epoch(&self) -> u64 {
        match &self.source {
            Source::Session(session) => session.epoch(),
            Source::Factory(_) | Source::Instance(_) => 0,
        }
    }

    fn resolve(&self, params: &P) -> ObtainResult<Arc<V>> {
        let service = std::any::type_name::<V>();
        if let Source::Instance(value) = &self.source {
            return Ok(value.clone());
        }

        let _guard = self
            .safety
            .enter(self.id)
            .map_err(|kind| ObtainError::named(service, kind))?;

        let epoch = self.epoch();
        if let Some(hit) = self.slot.lock().get(epoch) {
            tracing::trace!(service, mode = ?self.mode, "provider cache hit");
            return Ok(hit);
        }

        tracing::trace!(service, mode = ?self.mode, epoch, "constructing");
        let (built_epoch, result) = match &self.source {
            Source::Factory(factory) => (0, factory.make(params)),
            Source::Session(session) => session.build(params),
            Source::Instance(value) => return Ok(value.clone()),
        };
        let value = Arc::new(result.map_err(ObtainError::from_factory::<V>)?);

        // Built for a session that ended meanwhile: hand it out, keep it out of the cache
        if built_epoch < self.epoch() {
            tracing::debug!(service, built_epoch, "session changed during construction");
            return Ok(value);
        }
        Ok(self.slot.lock().store(self.mode, built_epoch, value))
    }

    fn is_cached(&self) -> bool {
        match &self.source {
            Source::Instance(_) => true,
            _ => self.slot.lock().is_live(self.epoch()),
        }
    }
}

impl<P, V> Invalidate for ProviderCore<P, V>
where
    P: Send + Sync,
    V: Send + Sync,
{
    fn invalidate_before(&self, epoch: u64) -> bool {
        self.slot.lock().invalidate_before(epoch)
    }
}

impl<P, V> ParamsProvider<P, V>
where
    P: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a provider without any serialization of concurrent calls.
    ///
    /// With [`Mode::AtOnce`] and `P = ()` the factory runs right away; if
    /// that first attempt fails it is logged and retried on the first
    /// request.
    pub fn new<F>(mode: Mode, factory: F) -> Self
    where
        F: Fn(&P) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self::new_with_safety(mode, Safety::Unsafe, factory)
    }

    /// Creates a provider whose resolutions follow the given [`Safety`] discipline.
    pub fn new_with_safety<F>(mode: Mode, safety: Safety, factory: F) -> Self
    where
        F: Fn(&P) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self::from_factory(mode, safety, Arc::new(factory))
    }

    /// Creates a provider over a factory that may be shared with other providers.
    pub fn from_factory(mode: Mode, safety: Safety, factory: SharedFactory<P, V>) -> Self {
        Self::from_source(mode, safety, Source::Factory(factory))
    }

    pub(crate) fn from_source(mode: Mode, safety: Safety, source: Source<P, V>) -> Self {
        let provider = Self {
            inner: ProviderCore::spawn(mode, safety, source),
        };
        if mode == Mode::AtOnce {
            provider.build_eagerly();
        }
        provider
    }

    fn build_eagerly(&self) {
        let unit: &dyn Any = &();
        if let Some(params) = unit.downcast_ref::<P>() {
            if let Err(error) = self.inner.resolve(params) {
                tracing::warn!(
                    service = std::any::type_name::<V>(),
                    %error,
                    "eager construction failed, retrying on first request"
                );
            }
        }
    }

    /// Resolves a value for `params` according to the provider's mode.
    pub fn resolve_with(&self, params: &P) -> ObtainResult<Arc<V>> {
        self.inner.resolve(params)
    }

    /// Resolves for `params`, aborting with the full diagnostic on failure.
    #[track_caller]
    pub fn resolve_with_or_fatal(&self, params: &P) -> Arc<V> {
        match self.resolve_with(params) {
            Ok(value) => value,
            Err(error) => fatal(&error),
        }
    }

    /// Binds `params`, producing a new parameterless provider.
    ///
    /// The new provider shares this provider's factory, mode and safety
    /// discipline (with its own lock) but keeps a cache of its own.
    pub fn bind(&self, params: P) -> Provider<V> {
        ParamsProvider::from_source(self.inner.mode, self.inner.safety.safety(), self.bound_source(params))
    }

    /// Like [`bind`](Self::bind) but never constructs, even for [`Mode::AtOnce`].
    pub(crate) fn bind_deferred(&self, params: P) -> Provider<V> {
        ParamsProvider {
            inner: ProviderCore::spawn(self.inner.mode, self.inner.safety.safety(), self.bound_source(params)),
        }
    }

    fn bound_source(&self, params: P) -> Source<(), V> {
        match &self.inner.source {
            Source::Factory(factory) => {
                Source::Factory(Arc::new(BoundFactory::new(factory.clone(), params)))
            }
            Source::Session(session) => Source::Session(Arc::new(BoundSession {
                inner: session.clone(),
                params,
            })),
            Source::Instance(value) => Source::Instance(value.clone()),
        }
    }

    /// Puts `target` under the invalidation of this provider's session, if it has one.
    pub(crate) fn track_session(&self, target: Weak<dyn Invalidate>) -> bool {
        match &self.inner.source {
            Source::Session(session) => {
                session.track(target);
                true
            }
            Source::Factory(_) | Source::Instance(_) => false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn safety(&self) -> Safety {
        self.inner.safety.safety()
    }

    /// Whether a value for the current session is stored and alive.
    pub fn is_cached(&self) -> bool {
        self.inner.is_cached()
    }

    /// Forgets the cached value; the next request builds a new one.
    ///
    /// Values already handed out are unaffected. Instance providers keep
    /// their instance.
    pub fn reset(&self) {
        self.inner.slot.lock().clear();
    }
}

impl<V> Provider<V>
where
    V: Send + Sync + 'static,
{
    /// Resolves the value according to the provider's mode.
    pub fn resolve(&self) -> ObtainResult<Arc<V>> {
        self.resolve_with(&())
    }

    /// Resolves the value, aborting with the full diagnostic on failure.
    ///
    /// The failure goes through the normal resolution path first, so the
    /// logged and panicked message carries the type, path and cause.
    #[track_caller]
    pub fn resolve_or_fatal(&self) -> Arc<V> {
        self.resolve_with_or_fatal(&())
    }

    /// Provider that always returns `value`.
    pub fn from_instance(value: V) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Provider that always returns the given shared value.
    pub fn from_arc(value: Arc<V>) -> Self {
        Self::from_source(Mode::AtOnce, Safety::Unsafe, Source::Instance(value))
    }
}

impl<P, V> Clone for ParamsProvider<P, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P, V> std::fmt::Debug for ParamsProvider<P, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamsProvider")
            .field("value", &std::any::type_name::<V>())
            .field("params", &std::any::type_name::<P>())
            .field("mode", &self.inner.mode)
            .field("safety", &self.inner.safety)
            .finish()
    }
}

impl<P, V> Resolve<P, V> for ParamsProvider<P, V>
where
    P: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn resolve_with(&self, params: &P) -> ObtainResult<Arc<V>> {
        ParamsProvider::resolve_with(self, params)
    }

    fn mode(&self) -> Option<Mode> {
        Some(self.inner.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting<P: Send + Sync + 'static>(
        mode: Mode,
    ) -> (ParamsProvider<P, usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let provider = ParamsProvider::new(mode, move |_: &P| {
            Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
        });
        (provider, calls)
    }

    #[test]
    fn at_once_builds_on_creation() {
        let (_provider, calls) = counting::<()>(Mode::AtOnce);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parameterised_at_once_waits_for_first_request() {
        let (provider, calls) = counting::<u8>(Mode::AtOnce);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*provider.resolve_with(&1).unwrap(), 1);
        assert_eq!(*provider.resolve_with(&2).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_forces_rebuild() {
        let (provider, calls) = counting::<()>(Mode::Lazy);
        provider.resolve().unwrap();
        assert!(provider.is_cached());
        provider.reset();
        assert!(!provider.is_cached());
        provider.resolve().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bound_provider_has_own_cache() {
        let (provider, calls) = counting::<u8>(Mode::Lazy);
        let bound = provider.bind(9);
        provider.resolve_with(&1).unwrap();
        bound.resolve().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(bound.mode(), Mode::Lazy);
    }

    #[test]
    fn instance_provider_survives_reset() {
        let provider = Provider::from_instance(3u32);
        provider.reset();
        assert!(provider.is_cached());
        assert_eq!(*provider.resolve().unwrap(), 3);
    }
}
