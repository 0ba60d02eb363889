//! Internal implementation details.

pub(crate) mod reentrancy;

pub(crate) use reentrancy::{InFlightGuard, ProviderId};
