//! Optional process-wide locator root.
//!
//! Nothing in the crate depends on this; it exists for applications that
//! want one globally reachable locator installed at startup.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::ServiceLocator;
use crate::error::LocatorError;

static SHARED: Lazy<RwLock<Option<Arc<ServiceLocator>>>> = Lazy::new(|| RwLock::new(None));

/// Installs `locator` as the process-wide locator, returning the previous one.
pub fn install(locator: Arc<ServiceLocator>) -> Option<Arc<ServiceLocator>> {
    tracing::debug!(services = locator.len(), "shared locator installed");
    SHARED.write().replace(locator)
}

/// The installed locator, or [`LocatorError::SharedRequireSetup`].
pub fn current() -> Result<Arc<ServiceLocator>, LocatorError> {
    SHARED.read().clone().ok_or(LocatorError::SharedRequireSetup)
}

/// Uninstalls the process-wide locator.
pub fn reset() -> Option<Arc<ServiceLocator>> {
    SHARED.write().take()
}
