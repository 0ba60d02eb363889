//! # ferrous-locator
//!
//! Lazily constructed service providers, a sealable typed service locator
//! and a late-binding resolver for objects built out of order.
//!
//! ## Features
//!
//! - **Caching modes**: `AtOnce`, `Lazy`, `Many` and `Weak` providers
//! - **Safety wrappers**: exclusive or recursive serialization of resolutions,
//!   with reentrancy reported instead of deadlocking
//! - **Session scoping**: providers that forget their values when the session
//!   token changes
//! - **Typed locator**: `ServiceKey<V, P>` lookups that can be sealed after setup
//! - **Resolution paths**: every failure names the chain of services that led to it
//! - **Deferred resolution**: register-or-observe late binding with
//!   first-consumption entries and deadlines
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_locator::{Mode, ServiceKey, ServiceLocator};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct Folders {
//!     db: Arc<Database>,
//! }
//!
//! const DATABASE: ServiceKey<Database> = ServiceKey::new("database");
//! const FOLDERS: ServiceKey<Folders> = ServiceKey::new("folders");
//!
//! let locator = Arc::new(ServiceLocator::new());
//! locator
//!     .add_factory(DATABASE, Mode::Lazy, |_: &()| {
//!         Ok(Database { url: "sqlite://notes.db".to_string() })
//!     })
//!     .unwrap();
//!
//! let deps = locator.clone();
//! locator
//!     .add_factory(FOLDERS, Mode::Many, move |_: &()| {
//!         Ok(Folders { db: deps.get_service(DATABASE)? })
//!     })
//!     .unwrap();
//! locator.set_read_only();
//!
//! let folders = locator.get_service(FOLDERS).unwrap();
//! assert_eq!(folders.db.url, "sqlite://notes.db");
//! ```
//!
//! ## Provider Modes
//!
//! - **AtOnce**: built when the provider is created (or on first request if
//!   it takes parameters) and shared forever
//! - **Lazy**: built on first request and shared forever
//! - **Many**: built on every request
//! - **Weak**: shared while a caller still holds it, rebuilt afterwards
//!
//! ## Failure Paths
//!
//! ```rust
//! use ferrous_locator::{Mode, ServiceKey, ServiceLocator};
//! use std::sync::Arc;
//!
//! struct Settings;
//! #[derive(Debug)]
//! struct SyncEngine;
//!
//! const SETTINGS: ServiceKey<Settings> = ServiceKey::new("settings");
//! const SYNC: ServiceKey<SyncEngine> = ServiceKey::new("sync");
//!
//! let locator = Arc::new(ServiceLocator::new());
//! let deps = locator.clone();
//! locator
//!     .add_factory(SYNC, Mode::Lazy, move |_: &()| {
//!         deps.get_service(SETTINGS)?;
//!         Ok(SyncEngine)
//!     })
//!     .unwrap();
//!
//! let err = locator.get_service(SYNC).unwrap_err();
//! assert!(err.is_not_found());
//! assert_eq!(err.path().len(), 2);
//! assert!(err.path()[0].ends_with("SyncEngine"));
//! assert!(err.path()[1].ends_with("Settings"));
//! ```

pub mod config;
pub mod deferred;
pub mod descriptors;
pub mod error;
pub mod factory;
pub mod key;
pub mod locator;
pub mod mode;
pub mod observer;
pub mod provider;
pub mod safety;
pub mod session;

// Internal modules
mod internal;

pub use config::{ConfigError, LocatorConfig};
pub use deferred::{DeferredResolver, Registration};
pub use descriptors::ServiceDescriptor;
pub use error::{BoxError, FactoryError, LocatorError, ObtainError, ObtainErrorKind, ObtainResult};
pub use factory::{Factory, SharedFactory};
pub use key::ServiceKey;
pub use locator::{shared, ServiceLocator};
pub use mode::Mode;
pub use observer::{LoggingObserver, ResolutionEvent, ResolutionObserver};
pub use provider::{KeyedProvider, ParamsProvider, Provider, Resolve};
pub use safety::Safety;
pub use session::SessionMediator;
