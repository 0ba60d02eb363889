//! Safety wrapper tests
//!
//! Covers reentrant factories under each discipline and concurrent first
//! requests racing to build the same value.

use ferrous_locator::{
    BoxError, KeyedProvider, Mode, ObtainErrorKind, ParamsProvider, Provider, Safety,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Barrier, OnceLock};
use std::thread;
use std::time::Duration;

// ===== Reentrancy =====

#[derive(Debug)]
struct Node;

fn self_referencing(safety: Safety) -> Provider<Node> {
    let slot: Arc<OnceLock<Provider<Node>>> = Arc::new(OnceLock::new());
    let inner = slot.clone();
    let provider = Provider::new_with_safety(Mode::Lazy, safety, move |_: &()| {
        if let Some(provider) = inner.get() {
            provider.resolve()?;
        }
        Ok(Node)
    });
    let _ = slot.set(provider.clone());
    provider
}

#[test]
fn test_exclusive_reports_reentry() {
    let provider = self_referencing(Safety::Exclusive);
    let err = provider.resolve().unwrap_err();

    assert!(matches!(err.kind(), ObtainErrorKind::Reentrant));
    // Outer resolution plus the reentrant one
    assert_eq!(err.path().len(), 2);
    assert!(err.path().iter().all(|name| name.ends_with("Node")));
    assert!(!provider.is_cached());
}

#[test]
fn test_recursive_reentry_is_capped() {
    let provider = self_referencing(Safety::Recursive);
    let err = provider.resolve().unwrap_err();
    assert!(matches!(err.kind(), ObtainErrorKind::DepthExceeded(64)));
}

#[test]
fn test_recursive_allows_bounded_self_calls() {
    let slot: Arc<OnceLock<ParamsProvider<u64, u64>>> = Arc::new(OnceLock::new());
    let inner = slot.clone();
    let factorial = ParamsProvider::new_with_safety(
        Mode::Many,
        Safety::Recursive,
        move |n: &u64| -> Result<u64, BoxError> {
            if *n <= 1 {
                return Ok(1);
            }
            let provider = inner.get().ok_or("factorial not installed")?;
            Ok(*n * *provider.resolve_with(&(n - 1))?)
        },
    );
    let _ = slot.set(factorial.clone());

    assert_eq!(*factorial.resolve_with(&10).unwrap(), 3_628_800);
}

#[test]
fn test_exclusive_allows_nested_distinct_providers() {
    let inner = Provider::new_with_safety(Mode::Lazy, Safety::Exclusive, |_: &()| Ok(2u32));
    let dependency = inner.clone();
    let outer = Provider::new_with_safety(Mode::Lazy, Safety::Exclusive, move |_: &()| {
        Ok(*dependency.resolve()? * 21)
    });
    assert_eq!(*outer.resolve().unwrap(), 42);
}

fn keyed_chain(mode: Mode) -> Option<(u32, usize)> {
    let slot: Arc<OnceLock<KeyedProvider<u32, u32>>> = Arc::new(OnceLock::new());
    let inner = slot.clone();
    let chain = KeyedProvider::new_with_safety(mode, Safety::Recursive, move |n: &u32| {
        if *n == 0 {
            return Ok(0);
        }
        let chain = inner.get().ok_or("chain not installed")?;
        Ok(*chain.resolve_with(&(n - 1))? + 1)
    });
    let _ = slot.set(chain.clone());

    // Resolve on a worker so a lock-up fails the test instead of hanging it
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let value = chain.resolve_with(&3).map(|v| *v);
        let _ = tx.send(value.map(|v| (v, chain.len())));
    });
    rx.recv_timeout(Duration::from_secs(5)).ok()?.ok()
}

#[test]
fn test_keyed_chain_resolves_other_keys_from_a_factory() {
    for mode in [Mode::Lazy, Mode::AtOnce] {
        assert_eq!(keyed_chain(mode), Some((3, 4)), "{:?} keyed chain", mode);
    }
}

// ===== Concurrency =====

fn race(safety: Safety, threads: usize) -> (Vec<Arc<u32>>, u32) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let provider = Provider::new_with_safety(Mode::Lazy, safety, move |_: &()| {
        let value = counter.fetch_add(1, Ordering::SeqCst) + 1;
        thread::sleep(Duration::from_millis(20));
        Ok(value)
    });

    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let provider = provider.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                provider.resolve().unwrap()
            })
        })
        .collect();
    let values = handles.into_iter().map(|h| h.join().unwrap()).collect();
    (values, calls.load(Ordering::SeqCst))
}

#[test]
fn test_exclusive_builds_exactly_once_under_contention() {
    let (values, calls) = race(Safety::Exclusive, 8);
    assert_eq!(calls, 1);
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
}

#[test]
fn test_recursive_builds_exactly_once_under_contention() {
    let (values, calls) = race(Safety::Recursive, 8);
    assert_eq!(calls, 1);
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
}

#[test]
fn test_unsafe_still_converges_on_one_value() {
    let (values, calls) = race(Safety::Unsafe, 8);
    assert!(calls >= 1);
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
}

#[test]
fn test_safety_parses_from_config_strings() {
    assert_eq!("exclusive".parse::<Safety>().unwrap(), Safety::Exclusive);
    assert_eq!(" Recursive ".parse::<Safety>().unwrap(), Safety::Recursive);
    assert_eq!("none".parse::<Safety>().unwrap(), Safety::Unsafe);
    assert!("spin".parse::<Safety>().is_err());
    assert_eq!(Safety::default(), Safety::Unsafe);
}
