//! Unit tests for error types and their messages

use ferrous_locator::{BoxError, FactoryError, LocatorError, ObtainError, ObtainErrorKind};
use std::error::Error;

#[test]
fn test_factory_error_display() {
    assert_eq!(
        FactoryError::WrongParams("Folder").to_string(),
        "wrong parameters for Folder"
    );
    assert_eq!(
        FactoryError::WrongSession("Inbox").to_string(),
        "wrong session for Inbox"
    );
    assert_eq!(
        FactoryError::InvalidFactory("Sync").to_string(),
        "invalid factory for Sync"
    );
}

#[test]
fn test_locator_error_display() {
    assert_eq!(
        LocatorError::ServiceNotFound("database").to_string(),
        "service not found: database"
    );
    assert_eq!(
        LocatorError::InvalidProvider {
            key: "port",
            expected: "u16",
            registered: "u32",
        }
        .to_string(),
        "invalid provider for port: expected u16, registered u32"
    );
    assert_eq!(
        LocatorError::SharedRequireSetup.to_string(),
        "shared locator requires setup before use"
    );
    assert_eq!(
        LocatorError::ReadOnly("late").to_string(),
        "locator is read-only, cannot register late"
    );
}

#[test]
fn test_obtain_error_display_includes_path() {
    let err = ObtainError::new::<u32>(LocatorError::ServiceNotFound("port").into())
        .within::<String>()
        .within::<Vec<u8>>();
    assert_eq!(
        err.to_string(),
        "failed to obtain u32 (alloc::vec::Vec<u8> -> alloc::string::String -> u32): service not found: port"
    );
}

#[test]
fn test_kind_display() {
    assert_eq!(
        ObtainErrorKind::Reentrant.to_string(),
        "reentrant resolution under an exclusive lock"
    );
    assert_eq!(
        ObtainErrorKind::DepthExceeded(64).to_string(),
        "max resolution depth 64 exceeded"
    );
    let failed = ObtainErrorKind::Failed("disk full".into());
    assert_eq!(failed.to_string(), "disk full");
}

#[test]
fn test_from_factory_classifies_errors() {
    let nested: BoxError = Box::new(ObtainError::new::<u8>(ObtainErrorKind::Reentrant));
    let err = ObtainError::from_factory::<u16>(nested);
    assert_eq!(err.service(), "u8");
    assert_eq!(err.path(), &["u16", "u8"]);
    assert!(matches!(err.kind(), ObtainErrorKind::Reentrant));

    let factory: BoxError = Box::new(FactoryError::WrongSession("u16"));
    let err = ObtainError::from_factory::<u16>(factory);
    assert!(matches!(
        err.kind(),
        ObtainErrorKind::Factory(FactoryError::WrongSession("u16"))
    ));
    assert_eq!(err.path(), &["u16"]);

    let other: BoxError = "disk full".into();
    let err = ObtainError::from_factory::<u16>(other);
    assert!(matches!(err.kind(), ObtainErrorKind::Failed(_)));
}

#[test]
fn test_error_source_chain() {
    let err = ObtainError::new::<u32>(LocatorError::ServiceNotFound("port").into());
    let source = err.source().unwrap();
    assert_eq!(source.to_string(), "service not found: port");

    let err = ObtainError::new::<u32>(ObtainErrorKind::Reentrant);
    assert!(err.source().is_none());
}

#[test]
fn test_is_not_found() {
    assert!(ObtainError::new::<u8>(LocatorError::ServiceNotFound("x").into()).is_not_found());
    assert!(!ObtainError::new::<u8>(LocatorError::SharedRequireSetup.into()).is_not_found());
}

#[test]
fn test_errors_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ObtainError>();
    assert_send_sync::<LocatorError>();
    assert_send_sync::<FactoryError>();
}
