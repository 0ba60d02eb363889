//! Typed service keys.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

/// Identifier that binds a locator lookup to one value type and one
/// parameters type.
///
/// The name is what the locator stores entries under. `V` and `P` are the
/// compile-time witness: [`ServiceLocator::get_service`](crate::ServiceLocator::get_service)
/// can only ever return `Arc<V>`, and a registration made under the same
/// name with different types is reported as an invalid provider.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::ServiceKey;
///
/// struct Database;
/// struct FolderManager;
///
/// const DATABASE: ServiceKey<Database> = ServiceKey::new("database");
/// const FOLDERS: ServiceKey<FolderManager, u64> = ServiceKey::new("folders");
///
/// assert_eq!(DATABASE.name(), "database");
/// assert!(FOLDERS.value_type_name().ends_with("FolderManager"));
/// assert_eq!(FOLDERS.params_type_name(), "u64");
/// ```
pub struct ServiceKey<V: ?Sized, P = ()> {
    name: &'static str,
    _marker: PhantomData<fn(&P) -> Box<V>>,
}

impl<V: ?Sized + 'static, P: 'static> ServiceKey<V, P> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value_type_name(&self) -> &'static str {
        std::any::type_name::<V>()
    }

    pub fn params_type_name(&self) -> &'static str {
        std::any::type_name::<P>()
    }

    pub(crate) fn signature(&self) -> Signature {
        Signature::of::<V, P>()
    }
}

impl<V: ?Sized, P> Clone for ServiceKey<V, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: ?Sized, P> Copy for ServiceKey<V, P> {}

impl<V: ?Sized, P> fmt::Debug for ServiceKey<V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceKey")
            .field("name", &self.name)
            .field("value", &std::any::type_name::<V>())
            .field("params", &std::any::type_name::<P>())
            .finish()
    }
}

/// Runtime record of the types a key was registered with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Signature {
    value: TypeId,
    params: TypeId,
    pub(crate) value_name: &'static str,
    pub(crate) params_name: &'static str,
}

impl Signature {
    pub(crate) fn of<V: ?Sized + 'static, P: 'static>() -> Self {
        Self {
            value: TypeId::of::<V>(),
            params: TypeId::of::<P>(),
            value_name: std::any::type_name::<V>(),
            params_name: std::any::type_name::<P>(),
        }
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.params == other.params
    }
}

impl Eq for Signature {}
