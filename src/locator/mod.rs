//! Typed, sealable service locator.
//!
//! A [`ServiceLocator`] maps [`ServiceKey`]s to providers or prebuilt
//! instances. Registration happens during setup; after
//! [`set_read_only`](ServiceLocator::set_read_only) the locator only
//! resolves.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::config::LocatorConfig;
use crate::descriptors::ServiceDescriptor;
use crate::error::{fatal, BoxError, LocatorError, ObtainError, ObtainErrorKind, ObtainResult};
use crate::key::{ServiceKey, Signature};
use crate::mode::Mode;
use crate::observer::{LoggingObserver, Observers, ResolutionEvent, ResolutionObserver};
use crate::provider::{ParamsProvider, Resolve};

pub mod shared;

/// Type-erased registration. `provider` always holds an
/// `Arc<dyn Resolve<P, V>>` matching `signature`.
struct Entry {
    signature: Signature,
    provider: Box<dyn Any + Send + Sync>,
    mode: Option<Mode>,
    is_instance: bool,
}

/// Prebuilt value handed out as is.
struct Shared<V: ?Sized>(Arc<V>);

impl<V> Resolve<(), V> for Shared<V>
where
    V: ?Sized + Send + Sync,
{
    fn resolve_with(&self, _: &()) -> ObtainResult<Arc<V>> {
        Ok(self.0.clone())
    }

    fn mode(&self) -> Option<Mode> {
        Some(Mode::AtOnce)
    }
}

/// Keyed collection of providers and instances.
///
/// # Examples
///
/// ```
/// use ferrous_locator::{Mode, ServiceKey, ServiceLocator, LocatorError};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Client { url: String }
///
/// const CONFIG: ServiceKey<Config> = ServiceKey::new("config");
/// const CLIENT: ServiceKey<Client> = ServiceKey::new("client");
///
/// let locator = Arc::new(ServiceLocator::new());
/// locator.add_instance(CONFIG, Config { url: "https://notes.local".into() }).unwrap();
///
/// let deps = locator.clone();
/// locator.add_factory(CLIENT, Mode::Lazy, move |_: &()| {
///     let config = deps.get_service(CONFIG)?;
///     Ok(Client { url: config.url.clone() })
/// }).unwrap();
///
/// locator.set_read_only();
/// assert_eq!(locator.get_service(CLIENT).unwrap().url, "https://notes.local");
///
/// let late = locator.add_instance(ServiceKey::<u8>::new("late"), 1);
/// assert_eq!(late, Err(LocatorError::ReadOnly("late")));
/// ```
pub struct ServiceLocator {
    entries: RwLock<HashMap<&'static str, Entry>>,
    read_only: AtomicBool,
    observers: Observers,
    config: LocatorConfig,
}

impl ServiceLocator {
    pub fn new() -> Self {
        Self::with_config(LocatorConfig::default())
    }

    /// Creates a locator using `config` for the providers it builds itself.
    pub fn with_config(config: LocatorConfig) -> Self {
        let locator = Self {
            entries: RwLock::new(HashMap::new()),
            read_only: AtomicBool::new(false),
            observers: Observers::default(),
            config,
        };
        if locator.config.observe_resolutions {
            locator.add_observer(Arc::new(LoggingObserver::new()));
        }
        locator
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Registers a provider under `key`, replacing any earlier registration.
    pub fn add_service<V, P, R>(&self, key: ServiceKey<V, P>, provider: R) -> Result<(), LocatorError>
    where
        V: ?Sized + Send + Sync + 'static,
        P: Send + Sync + 'static,
        R: Resolve<P, V> + 'static,
    {
        let mode = provider.mode();
        self.insert(key, Arc::new(provider), mode, false)
    }

    /// Registers an already-built value under `key`.
    pub fn add_instance<V>(&self, key: ServiceKey<V>, value: V) -> Result<(), LocatorError>
    where
        V: Send + Sync + 'static,
    {
        self.add_shared(key, Arc::new(value))
    }

    /// Registers an already-shared value under `key`. `V` may be a trait object.
    pub fn add_shared<V>(&self, key: ServiceKey<V>, value: Arc<V>) -> Result<(), LocatorError>
    where
        V: ?Sized + Send + Sync + 'static,
    {
        self.insert(key, Arc::new(Shared(value)), Some(Mode::AtOnce), true)
    }

    /// Registers a factory under `key` with the locator's default safety.
    pub fn add_factory<V, P, F>(&self, key: ServiceKey<V, P>, mode: Mode, factory: F) -> Result<(), LocatorError>
    where
        V: Send + Sync + 'static,
        P: Send + Sync + 'static,
        F: Fn(&P) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        // Rejected before the provider exists so an AtOnce factory never runs for nothing
        if self.is_read_only() {
            return Err(self.rejected(key.name()));
        }
        let provider = ParamsProvider::new_with_safety(mode, self.config.default_safety, factory);
        self.add_service(key, provider)
    }

    fn insert<V, P>(
        &self,
        key: ServiceKey<V, P>,
        provider: Arc<dyn Resolve<P, V>>,
        mode: Option<Mode>,
        is_instance: bool,
    ) -> Result<(), LocatorError>
    where
        V: ?Sized + Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        let mut entries = self.entries.write();
        if self.read_only.load(Ordering::Acquire) {
            return Err(self.rejected(key.name()));
        }
        let entry = Entry {
            signature: key.signature(),
            provider: Box::new(provider),
            mode,
            is_instance,
        };
        if entries.insert(key.name(), entry).is_some() {
            tracing::debug!(key = key.name(), value = key.value_type_name(), "service replaced");
        } else {
            tracing::debug!(key = key.name(), value = key.value_type_name(), "service registered");
        }
        Ok(())
    }

    fn rejected(&self, name: &'static str) -> LocatorError {
        tracing::warn!(key = name, "registration rejected, locator is read-only");
        LocatorError::ReadOnly(name)
    }

    /// Seals the locator. Later registrations fail with [`LocatorError::ReadOnly`].
    pub fn set_read_only(&self) {
        let entries = self.entries.write();
        if !self.read_only.swap(true, Ordering::AcqRel) {
            tracing::debug!(services = entries.len(), "locator sealed");
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    /// Resolves the parameterless service bound to `key`.
    pub fn get_service<V>(&self, key: ServiceKey<V>) -> ObtainResult<Arc<V>>
    where
        V: ?Sized + Send + Sync + 'static,
    {
        self.get_service_with(key, &())
    }

    /// Resolves the service bound to `key` for `params`.
    ///
    /// Fails with [`LocatorError::ServiceNotFound`] when nothing is
    /// registered under the key, and with [`LocatorError::InvalidProvider`]
    /// when the registration has different value or parameter types.
    pub fn get_service_with<V, P>(&self, key: ServiceKey<V, P>, params: &P) -> ObtainResult<Arc<V>>
    where
        V: ?Sized + Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        if !self.observers.has_observers() {
            return self.lookup(key)?.resolve_with(params);
        }

        let event = ResolutionEvent {
            key: key.name(),
            value_type: key.value_type_name(),
        };
        let start = Instant::now();
        self.observers.resolving(&event);
        let result = self.lookup(key).and_then(|provider| provider.resolve_with(params));
        match &result {
            Ok(_) => self.observers.resolved(&event, start.elapsed()),
            Err(error) => self.observers.failed(&event, error),
        }
        result
    }

    /// Resolves `key`, aborting with the full diagnostic on failure.
    #[track_caller]
    pub fn get_service_or_fatal<V>(&self, key: ServiceKey<V>) -> Arc<V>
    where
        V: ?Sized + Send + Sync + 'static,
    {
        self.get_service_with_or_fatal(key, &())
    }

    /// Resolves `key` for `params`, aborting with the full diagnostic on failure.
    #[track_caller]
    pub fn get_service_with_or_fatal<V, P>(&self, key: ServiceKey<V, P>, params: &P) -> Arc<V>
    where
        V: ?Sized + Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        match self.get_service_with(key, params) {
            Ok(value) => value,
            Err(error) => fatal(&error),
        }
    }

    fn lookup<V, P>(&self, key: ServiceKey<V, P>) -> ObtainResult<Arc<dyn Resolve<P, V>>>
    where
        V: ?Sized + Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        let failure = |error: LocatorError| {
            ObtainError::named(key.value_type_name(), ObtainErrorKind::Locator(error))
        };

        let entries = self.entries.read();
        let entry = entries
            .get(key.name())
            .ok_or_else(|| failure(LocatorError::ServiceNotFound(key.name())))?;

        let invalid = || {
            failure(LocatorError::InvalidProvider {
                key: key.name(),
                expected: key.value_type_name(),
                registered: entry.signature.value_name,
            })
        };
        if entry.signature != key.signature() {
            return Err(invalid());
        }
        let provider = entry
            .provider
            .downcast_ref::<Arc<dyn Resolve<P, V>>>()
            .cloned()
            .ok_or_else(invalid);
        provider
    }

    /// Whether anything is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Describes every registration, sorted by key name.
    pub fn descriptors(&self) -> Vec<ServiceDescriptor> {
        let mut descriptors: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(&name, entry)| ServiceDescriptor {
                name,
                value_type: entry.signature.value_name,
                params_type: entry.signature.params_name,
                mode: entry.mode,
                is_instance: entry.is_instance,
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(b.name));
        descriptors
    }

    /// Attaches an observer notified of every resolution through this locator.
    pub fn add_observer(&self, observer: Arc<dyn ResolutionObserver>) {
        self.observers.add(observer);
    }
}

impl Default for ServiceLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("services", &self.len())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}
