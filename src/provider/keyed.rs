//! Per-key caching on top of a parameterised provider.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{Invalidate, ParamsProvider, Provider, Resolve};
use crate::error::{BoxError, ObtainResult};
use crate::mode::Mode;
use crate::safety::Safety;

/// Provider that keeps one cached value per distinct key.
///
/// Each key gets its own provider bound to that key, so the mode applies per
/// key: a `Lazy` keyed provider builds once per key. When the underlying
/// provider is session-governed (see
/// [`SessionMediator::keyed_provider`](crate::SessionMediator::keyed_provider)),
/// every key is forgotten when the session token changes.
///
/// Construction never happens under the key map's lock, so a factory may
/// resolve other keys of the same provider.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::{KeyedProvider, Mode};
/// use std::sync::Arc;
///
/// struct FolderManager { folder: u64 }
///
/// let managers = KeyedProvider::new(Mode::Lazy, |folder: &u64| {
///     Ok(FolderManager { folder: *folder })
/// });
///
/// let a = managers.resolve_with(&1).unwrap();
/// let again = managers.resolve_with(&1).unwrap();
/// let b = managers.resolve_with(&2).unwrap();
///
/// assert!(Arc::ptr_eq(&a, &again));
/// assert_eq!(b.folder, 2);
/// ```
pub struct KeyedProvider<K, V> {
    template: ParamsProvider<K, V>,
    bound: Arc<KeyMap<K, V>>,
}

struct KeyMap<K, V> {
    providers: Mutex<HashMap<K, Provider<V>>>,
}

impl<K, V> KeyMap<K, V> {
    fn take(&self) -> HashMap<K, Provider<V>> {
        std::mem::take(&mut *self.providers.lock())
    }
}

impl<K, V> Invalidate for KeyMap<K, V>
where
    K: Send + Sync,
    V: Send + Sync,
{
    fn invalidate_before(&self, _epoch: u64) -> bool {
        let dropped = self.take();
        !dropped.is_empty()
    }
}

impl<K, V> KeyedProvider<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new<F>(mode: Mode, factory: F) -> Self
    where
        F: Fn(&K) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self::from_provider(ParamsProvider::new(mode, factory))
    }

    pub fn new_with_safety<F>(mode: Mode, safety: Safety, factory: F) -> Self
    where
        F: Fn(&K) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self::from_provider(ParamsProvider::new_with_safety(mode, safety, factory))
    }

    /// Caches per key using the factory, mode and safety of `template`.
    pub fn from_provider(template: ParamsProvider<K, V>) -> Self {
        let bound = Arc::new(KeyMap {
            providers: Mutex::new(HashMap::new()),
        });
        let weak: Weak<KeyMap<K, V>> = Arc::downgrade(&bound);
        template.track_session(weak);
        Self { template, bound }
    }

    /// Resolves the value for `key`, building it according to the mode.
    pub fn resolve_with(&self, key: &K) -> ObtainResult<Arc<V>> {
        let provider = self
            .bound
            .providers
            .lock()
            .entry(key.clone())
            .or_insert_with(|| self.template.bind_deferred(key.clone()))
            .clone();
        provider.resolve_with(&())
    }

    /// Forgets the value cached for `key`.
    pub fn remove(&self, key: &K) -> bool {
        self.bound.providers.lock().remove(key).is_some()
    }

    /// Forgets every cached value.
    pub fn invalidate_all(&self) {
        let dropped = self.bound.take();
        tracing::debug!(
            service = std::any::type_name::<V>(),
            keys = dropped.len(),
            "keyed provider invalidated"
        );
    }

    /// Number of keys with a provider currently held.
    pub fn len(&self) -> usize {
        self.bound.providers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> Mode {
        self.template.mode()
    }
}

impl<K, V> Clone for KeyedProvider<K, V> {
    fn clone(&self) -> Self {
        Self {
            template: self.template.clone(),
            bound: self.bound.clone(),
        }
    }
}

impl<K, V> Resolve<K, V> for KeyedProvider<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn resolve_with(&self, key: &K) -> ObtainResult<Arc<V>> {
        KeyedProvider::resolve_with(self, key)
    }

    fn mode(&self) -> Option<Mode> {
        Some(self.template.mode())
    }
}
