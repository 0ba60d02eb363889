//! Error types for providers, the locator and resolution failures.

use std::fmt;

/// Boxed error returned by factories.
///
/// Factories may fail with any error type. When the boxed error is itself an
/// [`ObtainError`] (a nested resolution failed and was propagated with `?`),
/// the enclosing provider extends its resolution path instead of wrapping it
/// a second time.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for provider and locator resolution.
pub type ObtainResult<T> = Result<T, ObtainError>;

/// Configuration-time mismatches reported by factories.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::FactoryError;
///
/// let err = FactoryError::WrongParams("app::FolderManager");
/// assert_eq!(err.to_string(), "wrong parameters for app::FolderManager");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    /// The parameters passed to the factory are not the ones it can build from
    #[error("wrong parameters for {0}")]
    WrongParams(&'static str),
    /// The factory was asked to build for a session it does not belong to
    #[error("wrong session for {0}")]
    WrongSession(&'static str),
    /// The factory itself is misconfigured
    #[error("invalid factory for {0}")]
    InvalidFactory(&'static str),
}

/// Locator-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    /// No provider registered under the key
    #[error("service not found: {0}")]
    ServiceNotFound(&'static str),
    /// A provider is registered under the key but for a different value or params type
    #[error("invalid provider for {key}: expected {expected}, registered {registered}")]
    InvalidProvider {
        key: &'static str,
        expected: &'static str,
        registered: &'static str,
    },
    /// The process-wide locator was used before one was installed
    #[error("shared locator requires setup before use")]
    SharedRequireSetup,
    /// Registration attempted after the locator was sealed
    #[error("locator is read-only, cannot register {0}")]
    ReadOnly(&'static str),
}

/// What went wrong underneath an [`ObtainError`].
#[derive(Debug, thiserror::Error)]
pub enum ObtainErrorKind {
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error(transparent)]
    Locator(#[from] LocatorError),
    /// The factory re-entered its own provider while holding an exclusive lock
    #[error("reentrant resolution under an exclusive lock")]
    Reentrant,
    /// Recursive resolution went deeper than the allowed limit
    #[error("max resolution depth {0} exceeded")]
    DepthExceeded(usize),
    /// Arbitrary factory failure
    #[error("{0}")]
    Failed(BoxError),
}

/// Runtime resolution failure annotated with the path of types traversed.
///
/// The path is ordered from the outermost request to the innermost failure,
/// so `path().last()` is always the type whose construction failed.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::{ObtainError, LocatorError};
///
/// let err = ObtainError::new::<u32>(LocatorError::ServiceNotFound("port").into())
///     .within::<String>();
///
/// assert_eq!(err.service(), "u32");
/// assert_eq!(err.path(), &["alloc::string::String", "u32"]);
/// ```
#[derive(Debug)]
pub struct ObtainError {
    service: &'static str,
    path: Vec<&'static str>,
    kind: ObtainErrorKind,
}

impl ObtainError {
    /// Creates an error for a failure while obtaining `V`.
    pub fn new<V: ?Sized + 'static>(kind: ObtainErrorKind) -> Self {
        Self::named(std::any::type_name::<V>(), kind)
    }

    pub(crate) fn named(service: &'static str, kind: ObtainErrorKind) -> Self {
        Self {
            service,
            path: vec![service],
            kind,
        }
    }

    /// Converts a factory failure for `V` into an `ObtainError`.
    ///
    /// Nested `ObtainError`s keep their innermost service and get `V`
    /// prepended to their path; anything else starts a fresh path at `V`.
    pub fn from_factory<V: ?Sized + 'static>(error: BoxError) -> Self {
        match error.downcast::<ObtainError>() {
            Ok(nested) => (*nested).within::<V>(),
            Err(other) => match other.downcast::<FactoryError>() {
                Ok(factory) => Self::new::<V>(ObtainErrorKind::Factory(*factory)),
                Err(other) => Self::new::<V>(ObtainErrorKind::Failed(other)),
            },
        }
    }

    /// Records that this failure happened while resolving `Outer`.
    pub fn within<Outer: ?Sized + 'static>(self) -> Self {
        self.within_named(std::any::type_name::<Outer>())
    }

    pub(crate) fn within_named(mut self, outer: &'static str) -> Self {
        self.path.insert(0, outer);
        self
    }

    /// The innermost type whose resolution failed.
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Types traversed, outermost first.
    pub fn path(&self) -> &[&'static str] {
        &self.path
    }

    pub fn kind(&self) -> &ObtainErrorKind {
        &self.kind
    }

    /// True when no provider was registered for the requested key.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ObtainErrorKind::Locator(LocatorError::ServiceNotFound(_)))
    }
}

impl fmt::Display for ObtainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to obtain {} ({}): {}",
            self.service,
            self.path.join(" -> "),
            self.kind
        )
    }
}

impl std::error::Error for ObtainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ObtainErrorKind::Factory(e) => Some(e),
            ObtainErrorKind::Locator(e) => Some(e),
            ObtainErrorKind::Failed(e) => Some(e.as_ref()),
            ObtainErrorKind::Reentrant | ObtainErrorKind::DepthExceeded(_) => None,
        }
    }
}

/// Logs the full diagnostic for `error` and aborts the current thread.
///
/// Only the explicit `*_or_fatal` entry points call this.
#[cold]
#[track_caller]
pub(crate) fn fatal(error: &ObtainError) -> ! {
    tracing::error!(
        service = error.service(),
        path = %error.path().join(" -> "),
        "fatal resolution failure: {}",
        error.kind()
    );
    panic!("{}", error)
}
