//! Reentrancy tracking for provider resolution.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ObtainErrorKind;

/// Deepest a single provider may re-enter itself on one thread.
pub(crate) const MAX_REENTRY: usize = 64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// Providers currently resolving on this thread, innermost last
thread_local! {
    static IN_FLIGHT: RefCell<Vec<ProviderId>> = const { RefCell::new(Vec::new()) };
}

/// Process-unique identity of a provider's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ProviderId(u64);

impl ProviderId {
    pub(crate) fn next() -> Self {
        ProviderId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Whether `id` is resolving further up this thread's call chain.
pub(crate) fn is_in_flight(id: ProviderId) -> bool {
    IN_FLIGHT.with(|stack| stack.borrow().contains(&id))
}

/// Marks `id` as resolving on this thread until the guard drops.
pub(crate) struct InFlightGuard {
    id: ProviderId,
}

impl InFlightGuard {
    pub(crate) fn enter(id: ProviderId) -> Result<Self, ObtainErrorKind> {
        IN_FLIGHT.with(|stack| {
            let mut stack = stack.borrow_mut();
            let depth = stack.iter().filter(|&&n| n == id).count();
            if depth >= MAX_REENTRY {
                return Err(ObtainErrorKind::DepthExceeded(depth));
            }
            stack.push(id);
            Ok(Self { id })
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        IN_FLIGHT.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|&n| n == self.id) {
                stack.remove(pos);
            }
        });
    }
}
