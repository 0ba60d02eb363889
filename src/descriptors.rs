//! Service descriptors for introspection and diagnostics.

use crate::mode::Mode;

/// Description of one locator registration.
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::{Mode, ServiceKey, ServiceLocator};
///
/// struct Database;
///
/// const DATABASE: ServiceKey<Database> = ServiceKey::new("database");
/// const RETRIES: ServiceKey<u32> = ServiceKey::new("retries");
///
/// let locator = ServiceLocator::new();
/// locator.add_factory(DATABASE, Mode::Lazy, |_: &()| Ok(Database)).unwrap();
/// locator.add_instance(RETRIES, 3).unwrap();
///
/// let descriptors = locator.descriptors();
/// let database = descriptors.iter().find(|d| d.name == "database").unwrap();
/// assert_eq!(database.mode, Some(Mode::Lazy));
/// assert!(database.value_type.ends_with("Database"));
///
/// let retries = descriptors.iter().find(|d| d.name == "retries").unwrap();
/// assert!(retries.is_instance);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Key name the service is registered under
    pub name: &'static str,
    /// Value type the key is bound to
    pub value_type: &'static str,
    /// Parameters type the key is bound to (`()` for parameterless keys)
    pub params_type: &'static str,
    /// Caching mode, when the registered provider reports one
    pub mode: Option<Mode>,
    /// Whether the registration is a prebuilt instance
    pub is_instance: bool,
}

impl ServiceDescriptor {
    /// Whether resolving this service needs parameters.
    pub fn takes_params(&self) -> bool {
        self.params_type != "()"
    }
}
