//! Construction logic behind providers.

use std::sync::Arc;

use crate::error::BoxError;

/// Builds values of `V` from parameters of `P`.
///
/// Factories are stateless with respect to caching; providers decide when to
/// call them. Parameterless factories use `P = ()`. Any
/// `Fn(&P) -> Result<V, BoxError>` closure is a factory.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::{BoxError, Factory, FactoryError};
///
/// struct Folder { id: u64 }
///
/// let factory = |id: &u64| -> Result<Folder, BoxError> {
///     if *id == 0 {
///         return Err(FactoryError::WrongParams("Folder").into());
///     }
///     Ok(Folder { id: *id })
/// };
///
/// assert_eq!(factory.make(&3).unwrap().id, 3);
/// assert!(factory.make(&0).is_err());
/// ```
pub trait Factory<P, V>: Send + Sync + 'static
where
    P: ?Sized,
{
    /// Produces a new value or fails.
    fn make(&self, params: &P) -> Result<V, BoxError>;
}

impl<P, V, F> Factory<P, V> for F
where
    P: ?Sized,
    F: Fn(&P) -> Result<V, BoxError> + Send + Sync + 'static,
{
    fn make(&self, params: &P) -> Result<V, BoxError> {
        (self)(params)
    }
}

/// Shared handle to a type-erased factory.
pub type SharedFactory<P, V> = Arc<dyn Factory<P, V>>;

/// Factory with its parameters already applied.
pub(crate) struct BoundFactory<P, V> {
    inner: SharedFactory<P, V>,
    params: P,
}

impl<P, V> BoundFactory<P, V> {
    pub(crate) fn new(inner: SharedFactory<P, V>, params: P) -> Self {
        Self { inner, params }
    }
}

impl<P, V> Factory<(), V> for BoundFactory<P, V>
where
    P: Send + Sync + 'static,
    V: 'static,
{
    fn make(&self, _: &()) -> Result<V, BoxError> {
        self.inner.make(&self.params)
    }
}
