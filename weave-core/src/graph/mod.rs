//! Dependency Graph
//!
//! This module implements the per-instance graph that tracks relationships
//! between signals and reactions.
//!
//! # Overview
//!
//! Nodes live in index arenas:
//!
//! - Signal nodes know which reactions read them and which local reactions
//!   write them
//! - Reaction nodes know what they read during their last run and what they
//!   have written
//!
//! Read edges may cross into a paired instance; the signal side of such an
//! edge is stored by the instance that owns the signal. Write edges are
//! always local and drive producer-before-consumer ordering.

mod node;
mod scheduler;

pub use node::{ReactionNode, SignalNode};
pub use scheduler::{PendingSet, RunDiff, UpdateScheduler};
