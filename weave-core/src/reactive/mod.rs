//! Reactive Primitives
//!
//! This module implements the reactive engine: signals, derived signals and
//! reactions, grouped into [`Reactive`] instances.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for state. When a signal is read while a
//! reaction runs, the reaction becomes one of its dependents. When the
//! signal's value changes, its dependents are marked pending.
//!
//! ## Derived Signals
//!
//! A derived signal is written by an internal reaction that evaluates a
//! getter. The scheduler always runs that reaction before the reactions
//! that read the derived signal.
//!
//! ## Reactions
//!
//! A Reaction is a side-effecting closure that re-runs when anything it read
//! during its last run changes.
//!
//! # Implementation Notes
//!
//! Dependencies are detected with a thread-local tracking context. Pending
//! reactions run in batches: at the end of an explicit batch, on `flush`, or
//! from a deferred task when a Tokio runtime is available.
//!
//! Instances never share a graph. Pairing connects two instances so one can
//! depend on the other's signals while each keeps its own scheduler.

mod batch;
mod context;
mod derived;
mod pairing;
mod reaction;
mod runtime;
mod signal;
mod subscriber;

pub use context::{ReactiveContext, Recorded};
pub use reaction::Reaction;
pub use runtime::Reactive;
pub use signal::{MeasureOfChange, Signal, SignalValue};
pub use subscriber::{Dependency, InstanceId, ReactionId, SignalId, Subscriber};

/// Measure of change of the reaction currently running.
///
/// Outside of a reaction this is [`MeasureOfChange::Full`].
pub fn current_measure_of_change() -> MeasureOfChange {
    ReactiveContext::current_measure().unwrap_or_default()
}
