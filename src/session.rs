//! Session-scoped providers.
//!
//! A [`SessionMediator`] owns the current session token. Every provider it
//! creates builds against the token that is current when construction
//! starts, and forgets its cached value as soon as the token is replaced.

use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::BoxError;
use crate::mode::Mode;
use crate::provider::{Invalidate, KeyedProvider, ParamsProvider, Provider, SessionSource, Source};
use crate::safety::Safety;

/// Token together with the epoch it was installed in.
struct Session<T> {
    token: T,
    epoch: u64,
}

struct MediatorInner<T> {
    current: RwLock<Arc<Session<T>>>,
    governed: Mutex<Vec<Weak<dyn Invalidate>>>,
}

impl<T> MediatorInner<T> {
    fn snapshot(&self) -> Arc<Session<T>> {
        self.current.read().clone()
    }
}

/// Authority over a group of session-scoped providers.
///
/// Replacing the token (login, logout, account switch) invalidates every
/// governed provider at once. Values already handed to callers are not
/// affected; the next resolution builds anew for the new token.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::{Mode, SessionMediator};
/// use std::sync::Arc;
///
/// struct Inbox { owner: String }
///
/// let session = SessionMediator::new("guest".to_string());
/// let inbox = session.provider(Mode::Lazy, |user: &String, _: &()| {
///     Ok(Inbox { owner: user.clone() })
/// });
///
/// let guest = inbox.resolve().unwrap();
/// assert_eq!(guest.owner, "guest");
///
/// session.replace_token("ada".to_string());
/// let ada = inbox.resolve().unwrap();
/// assert_eq!(ada.owner, "ada");
/// assert!(Arc::ptr_eq(&ada, &inbox.resolve().unwrap()));
/// ```
pub struct SessionMediator<T> {
    inner: Arc<MediatorInner<T>>,
}

impl<T> SessionMediator<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(token: T) -> Self {
        Self {
            inner: Arc::new(MediatorInner {
                current: RwLock::new(Arc::new(Session { token, epoch: 1 })),
                governed: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn current_token(&self) -> T {
        self.inner.snapshot().token.clone()
    }

    /// Number of token changes since creation, starting at 1.
    pub fn epoch(&self) -> u64 {
        self.inner.snapshot().epoch
    }

    /// Installs `token` as the current session.
    ///
    /// Replacing the token with an equal one changes nothing and returns
    /// `false`. Resolutions already in flight finish against the token they
    /// started with; what they build is not cached.
    pub fn replace_token(&self, token: T) -> bool {
        let epoch = {
            let mut current = self.inner.current.write();
            if current.token == token {
                return false;
            }
            let epoch = current.epoch + 1;
            *current = Arc::new(Session { token, epoch });
            epoch
        };

        let governed: Vec<_> = {
            let mut governed = self.inner.governed.lock();
            governed.retain(|target| target.strong_count() > 0);
            governed.iter().filter_map(Weak::upgrade).collect()
        };
        let invalidated = governed
            .iter()
            .filter(|target| target.invalidate_before(epoch))
            .count();
        tracing::debug!(
            epoch,
            governed = governed.len(),
            invalidated,
            "session token replaced"
        );
        true
    }

    /// Number of live providers under this mediator's invalidation.
    pub fn governed_count(&self) -> usize {
        self.inner
            .governed
            .lock()
            .iter()
            .filter(|target| target.strong_count() > 0)
            .count()
    }

    /// Creates a session-governed provider.
    ///
    /// The factory receives the session token its value belongs to.
    pub fn provider<V, F>(&self, mode: Mode, factory: F) -> Provider<V>
    where
        V: Send + Sync + 'static,
        F: Fn(&T, &()) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.params_provider(mode, Safety::Unsafe, factory)
    }

    /// Creates a session-governed provider taking parameters.
    pub fn params_provider<P, V, F>(&self, mode: Mode, safety: Safety, factory: F) -> ParamsProvider<P, V>
    where
        P: Send + Sync + 'static,
        V: Send + Sync + 'static,
        F: Fn(&T, &P) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        let source: Arc<dyn SessionSource<P, V>> = Arc::new(Governed {
            mediator: self.inner.clone(),
            factory,
        });
        ParamsProvider::from_source(mode, safety, Source::Session(source))
    }

    /// Creates a session-governed provider caching one value per key.
    ///
    /// Replacing the token forgets every key, not only the cached values, so
    /// keys seen in an earlier session are not retained.
    pub fn keyed_provider<K, V, F>(&self, mode: Mode, safety: Safety, factory: F) -> KeyedProvider<K, V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
        F: Fn(&T, &K) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        KeyedProvider::from_provider(self.params_provider(mode, safety, factory))
    }
}

impl<T> Clone for SessionMediator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SessionMediator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.snapshot();
        f.debug_struct("SessionMediator")
            .field("token", &session.token)
            .field("epoch", &session.epoch)
            .finish()
    }
}

struct Governed<T, F> {
    mediator: Arc<MediatorInner<T>>,
    factory: F,
}

impl<T, P, V, F> SessionSource<P, V> for Governed<T, F>
where
    T: Send + Sync,
    F: Fn(&T, &P) -> Result<V, BoxError> + Send + Sync,
{
    fn epoch(&self) -> u64 {
        self.mediator.current.read().epoch
    }

    fn build(&self, params: &P) -> (u64, Result<V, BoxError>) {
        let session = self.mediator.snapshot();
        (session.epoch, (self.factory)(&session.token, params))
    }

    fn track(&self, target: Weak<dyn Invalidate>) {
        let mut governed = self.mediator.governed.lock();
        governed.retain(|target| target.strong_count() > 0);
        governed.push(target);
    }
}
