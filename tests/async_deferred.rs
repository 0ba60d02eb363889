//! Awaitable deferred resolution tests

#![cfg(feature = "async")]

use ferrous_locator::DeferredResolver;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Session {
    user: &'static str,
}

#[tokio::test]
async fn test_wait_for_resolves_when_registered() {
    let resolver = DeferredResolver::new();
    let producer = resolver.clone();

    let waiter = tokio::spawn({
        let resolver = resolver.clone();
        async move { resolver.wait_for::<Session>().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let _registration = producer.register(Arc::new(Session { user: "ada" }));

    let session = waiter.await.unwrap().unwrap();
    assert_eq!(session.user, "ada");
}

#[tokio::test]
async fn test_wait_for_returns_present_entity_immediately() {
    let resolver = DeferredResolver::new();
    let _registration = resolver.register(Arc::new(Session { user: "grace" }));
    let session = resolver.wait_for::<Session>().await.unwrap();
    assert_eq!(session.user, "grace");
}

#[tokio::test]
async fn test_timed_out_waiter_does_not_steal_first_consumption_entity() {
    let resolver = DeferredResolver::new();
    assert!(resolver
        .wait_for_timeout::<Session>(Duration::from_millis(10))
        .await
        .is_none());

    assert!(!resolver.register_for_first_consumption(Arc::new(Session { user: "ada" }), None));
    assert_eq!(resolver.pending_observers(), 0);
    assert_eq!(resolver.resolve::<Session>().unwrap().user, "ada");
}

#[tokio::test]
async fn test_deadline_sweep_runs_without_access() {
    let resolver = DeferredResolver::new();
    resolver.register_for_first_consumption(Arc::new(Session { user: "stale" }), Some(Duration::from_millis(20)));
    assert_eq!(resolver.len(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    // len() does not sweep, so the spawned task must have
    assert_eq!(resolver.len(), 0);
}
