//! Concurrency disciplines wrapped around provider resolution.
//!
//! A safety discipline only changes how concurrent and reentrant calls
//! interleave. It never changes what a provider caches.

use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};

use crate::error::ObtainErrorKind;
use crate::internal::reentrancy::is_in_flight;
use crate::internal::{InFlightGuard, ProviderId};

/// How calls into a provider are serialized.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::{Mode, Provider, Safety, ObtainErrorKind};
/// use std::sync::{Arc, OnceLock};
///
/// #[derive(Debug)]
/// struct Node;
///
/// // A factory that calls back into its own provider
/// let slot: Arc<OnceLock<Provider<Node>>> = Arc::new(OnceLock::new());
/// let inner = slot.clone();
/// let provider = Provider::new_with_safety(Mode::Lazy, Safety::Exclusive, move |_: &()| {
///     inner.get().unwrap().resolve()?;
///     Ok(Node)
/// });
/// let _ = slot.set(provider.clone());
///
/// let err = provider.resolve().unwrap_err();
/// assert!(matches!(err.kind(), ObtainErrorKind::Reentrant));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum Safety {
    /// One lock around the whole resolution, factory included
    ///
    /// A factory that re-enters the provider it is building for fails fast
    /// with [`ObtainErrorKind::Reentrant`] instead of deadlocking.
    Exclusive,
    /// Serializes unrelated threads but lets the resolving thread re-enter
    ///
    /// Reentry is capped; past the cap resolution fails with
    /// [`ObtainErrorKind::DepthExceeded`].
    Recursive,
    /// No serialization
    ///
    /// Concurrent first requests may each run the factory; all of them still
    /// end up returning the single value that was stored first.
    #[default]
    Unsafe,
}

impl std::str::FromStr for Safety {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclusive" => Ok(Safety::Exclusive),
            "recursive" => Ok(Safety::Recursive),
            "unsafe" | "none" => Ok(Safety::Unsafe),
            other => Err(format!("unknown safety discipline: {}", other)),
        }
    }
}

/// Lock state backing a [`Safety`] discipline.
pub(crate) enum SafetyHandler {
    Exclusive(Mutex<()>),
    Recursive(ReentrantMutex<()>),
    Unsafe,
}

/// Held for the duration of one resolution.
pub(crate) struct SafetyGuard<'a> {
    _marker: InFlightGuard,
    _held: Held<'a>,
}

#[allow(dead_code)]
enum Held<'a> {
    Exclusive(MutexGuard<'a, ()>),
    Recursive(ReentrantMutexGuard<'a, ()>),
    Nothing,
}

impl SafetyHandler {
    pub(crate) fn new(safety: Safety) -> Self {
        match safety {
            Safety::Exclusive => SafetyHandler::Exclusive(Mutex::new(())),
            Safety::Recursive => SafetyHandler::Recursive(ReentrantMutex::new(())),
            Safety::Unsafe => SafetyHandler::Unsafe,
        }
    }

    pub(crate) fn safety(&self) -> Safety {
        match self {
            SafetyHandler::Exclusive(_) => Safety::Exclusive,
            SafetyHandler::Recursive(_) => Safety::Recursive,
            SafetyHandler::Unsafe => Safety::Unsafe,
        }
    }

    /// Enters a resolution of provider `id` on the current thread.
    pub(crate) fn enter(&self, id: ProviderId) -> Result<SafetyGuard<'_>, ObtainErrorKind> {
        let held = match self {
            SafetyHandler::Exclusive(lock) => {
                // Checked before locking: the lock is held further up this thread
                if is_in_flight(id) {
                    return Err(ObtainErrorKind::Reentrant);
                }
                Held::Exclusive(lock.lock())
            }
            SafetyHandler::Recursive(lock) => Held::Recursive(lock.lock()),
            SafetyHandler::Unsafe => Held::Nothing,
        };
        let marker = InFlightGuard::enter(id)?;
        Ok(SafetyGuard {
            _marker: marker,
            _held: held,
        })
    }
}

impl std::fmt::Debug for SafetyHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SafetyHandler({:?})", self.safety())
    }
}
