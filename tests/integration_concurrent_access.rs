//! Concurrent access integration tests
//!
//! These tests drive a sealed locator, session-governed providers and the
//! deferred resolver from many threads at once.

use crossbeam_utils::thread as scoped;
use ferrous_locator::{
    DeferredResolver, KeyedProvider, Mode, Safety, ServiceKey, ServiceLocator, SessionMediator,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// ===== Test Services =====

#[derive(Debug)]
struct Registry {
    id: u32,
}

#[derive(Debug)]
struct Worker {
    registry: Arc<Registry>,
}

const REGISTRY: ServiceKey<Registry> = ServiceKey::new("registry");
const WORKER: ServiceKey<Worker> = ServiceKey::new("worker");

fn sealed_locator(builds: Arc<AtomicU32>) -> Arc<ServiceLocator> {
    let locator = Arc::new(ServiceLocator::new());
    locator
        .add_factory(REGISTRY, Mode::Lazy, move |_: &()| {
            thread::sleep(Duration::from_millis(5));
            Ok(Registry {
                id: builds.fetch_add(1, Ordering::SeqCst) + 1,
            })
        })
        .unwrap();
    let deps = Arc::downgrade(&locator);
    locator
        .add_factory(WORKER, Mode::Many, move |_: &()| {
            let locator = deps.upgrade().ok_or("locator dropped")?;
            Ok(Worker {
                registry: locator.get_service(REGISTRY)?,
            })
        })
        .unwrap();
    locator.set_read_only();
    locator
}

// ===== Locator =====

#[test]
fn test_lazy_service_built_once_across_threads() {
    let builds = Arc::new(AtomicU32::new(0));
    let locator = sealed_locator(builds.clone());

    let barrier = Barrier::new(16);
    let ids: Vec<u32> = scoped::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                s.spawn(|_| {
                    barrier.wait();
                    (0..20)
                        .map(|_| locator.get_service(WORKER).unwrap().registry.id)
                        .max()
                        .unwrap_or_default()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(ids.iter().all(|&id| id == 1));
}

#[test]
fn test_registration_races_with_sealing() {
    for _ in 0..50 {
        let locator = Arc::new(ServiceLocator::new());
        let barrier = Arc::new(Barrier::new(2));

        let registrar = {
            let locator = locator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..100u32)
                    .filter(|n| locator.add_instance(ServiceKey::<u32>::new(name(*n)), *n).is_ok())
                    .count()
            })
        };
        barrier.wait();
        locator.set_read_only();

        let accepted = registrar.join().unwrap();
        // Everything accepted before the seal is visible, nothing after it
        assert_eq!(locator.len(), accepted);
    }
}

fn name(n: u32) -> &'static str {
    Box::leak(format!("key-{}", n).into_boxed_str())
}

// ===== Sessions =====

#[test]
fn test_keyed_session_provider_under_contention() {
    let session = SessionMediator::new(1u64);
    let builds = Arc::new(AtomicU32::new(0));
    let counter = builds.clone();
    let folders: KeyedProvider<u64, u64> =
        session.keyed_provider(Mode::Lazy, Safety::Exclusive, move |token: &u64, id: &u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(token * 1000 + id)
        });

    scoped::scope(|s| {
        for _ in 0..8 {
            s.spawn(|_| {
                for id in 0..10u64 {
                    assert_eq!(*folders.resolve_with(&id).unwrap(), 1000 + id);
                }
            });
        }
    })
    .unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 10);

    session.replace_token(2);
    assert_eq!(*folders.resolve_with(&3).unwrap(), 2003);
}

// ===== Deferred =====

#[test]
fn test_producers_and_observers_meet_exactly_once() {
    let resolver = DeferredResolver::new();
    let delivered = Arc::new(AtomicU32::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let resolver = resolver.clone();
        let delivered = delivered.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..50 {
                let delivered = delivered.clone();
                resolver.observe(move |_: Arc<Registry>| {
                    delivered.fetch_add(1, Ordering::SeqCst);
                });
            }
        }));
    }
    for _ in 0..4 {
        let resolver = resolver.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            for id in 0..50 {
                resolver.register_for_first_consumption(Arc::new(Registry { id }), None);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every entity went to exactly one observer or is still waiting for one
    let delivered = delivered.load(Ordering::SeqCst) as usize;
    assert_eq!(delivered + resolver.len(), 200);
    assert_eq!(delivered + resolver.pending_observers(), 200);
}
