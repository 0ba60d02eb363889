//! Provider caching modes.

/// Caching policy of a provider, fixed when the provider is created.
///
/// # Mode Characteristics
///
/// - **AtOnce**: built when the provider is created, shared forever
/// - **Lazy**: built on first request, shared forever
/// - **Many**: built on every request, never cached
/// - **Weak**: shared while someone outside the provider still holds it
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::{Mode, Provider};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// struct Counter { value: u32 }
///
/// let calls = Arc::new(AtomicU32::new(0));
/// let counter_calls = calls.clone();
/// let many = Provider::new(Mode::Many, move |_: &()| {
///     Ok(Counter { value: counter_calls.fetch_add(1, Ordering::SeqCst) + 1 })
/// });
///
/// assert_eq!(many.resolve().unwrap().value, 1);
/// assert_eq!(many.resolve().unwrap().value, 2);
///
/// let lazy = Provider::new(Mode::Lazy, |_: &()| Ok(Counter { value: 7 }));
/// let a = lazy.resolve().unwrap();
/// let b = lazy.resolve().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "snake_case"))]
pub enum Mode {
    /// Constructed exactly once per provider, eagerly when possible
    ///
    /// Parameterless providers build their value as soon as they are
    /// created. Parameterised providers have nothing to build from yet and
    /// fall back to building on the first request. Later requests return the
    /// stored value regardless of the parameters they carry.
    AtOnce,
    /// Constructed on every request, never cached
    Many,
    /// Constructed on first request, cached forever
    Lazy,
    /// Cached through a weak handle
    ///
    /// The stored value is returned while at least one caller still owns
    /// it. Once every external owner has dropped it, the next request
    /// builds a fresh one.
    Weak,
}

impl Mode {
    /// True for modes that keep a strong reference to the built value.
    pub fn caches_strongly(self) -> bool {
        matches!(self, Mode::AtOnce | Mode::Lazy)
    }

    /// True for modes that store anything at all.
    pub fn caches(self) -> bool {
        !matches!(self, Mode::Many)
    }
}
