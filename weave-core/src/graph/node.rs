//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph of
//! one reactive instance.

use indexmap::IndexSet;

use crate::reactive::{Dependency, MeasureOfChange, ReactionId, SignalId, Subscriber};

/// A signal in the graph.
#[derive(Debug)]
pub struct SignalNode {
    id: SignalId,

    /// Tag handed to dependents when this signal changes.
    measure: MeasureOfChange,

    /// Reactions that read this signal during their last run. They may live
    /// in this instance or in a paired one.
    dependents: IndexSet<Subscriber>,

    /// Local reactions that have written this signal.
    writers: IndexSet<ReactionId>,
}

impl SignalNode {
    pub fn new(id: SignalId, measure: MeasureOfChange) -> Self {
        Self {
            id,
            measure,
            dependents: IndexSet::new(),
            writers: IndexSet::new(),
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn measure(&self) -> MeasureOfChange {
        self.measure
    }

    pub fn dependents(&self) -> &IndexSet<Subscriber> {
        &self.dependents
    }

    pub fn writers(&self) -> &IndexSet<ReactionId> {
        &self.writers
    }

    pub fn add_dependent(&mut self, subscriber: Subscriber) -> bool {
        self.dependents.insert(subscriber)
    }

    pub fn remove_dependent(&mut self, subscriber: Subscriber) -> bool {
        self.dependents.shift_remove(&subscriber)
    }

    pub fn add_writer(&mut self, reaction: ReactionId) {
        self.writers.insert(reaction);
    }
}

/// A reaction in the graph.
#[derive(Debug)]
pub struct ReactionNode {
    id: ReactionId,

    /// Signals read during the last run, local or paired.
    dependencies: IndexSet<Dependency>,

    /// Local signals this reaction has ever written.
    writes: IndexSet<SignalId>,

    run_count: u64,
}

impl ReactionNode {
    pub fn new(id: ReactionId) -> Self {
        Self {
            id,
            dependencies: IndexSet::new(),
            writes: IndexSet::new(),
            run_count: 0,
        }
    }

    pub fn id(&self) -> ReactionId {
        self.id
    }

    pub fn dependencies(&self) -> &IndexSet<Dependency> {
        &self.dependencies
    }

    pub fn writes(&self) -> &IndexSet<SignalId> {
        &self.writes
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    /// Swap in the dependency set of a fresh run, returning the old one.
    pub(crate) fn replace_dependencies(
        &mut self,
        dependencies: IndexSet<Dependency>,
    ) -> IndexSet<Dependency> {
        self.run_count += 1;
        std::mem::replace(&mut self.dependencies, dependencies)
    }

    pub(crate) fn add_write(&mut self, signal: SignalId) -> bool {
        self.writes.insert(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::InstanceId;

    #[test]
    fn dependents_are_deduplicated() {
        let instance = InstanceId::new();
        let mut node = SignalNode::new(SignalId(0), MeasureOfChange::Full);
        let sub = Subscriber {
            instance,
            reaction: ReactionId(0),
        };

        assert!(node.add_dependent(sub));
        assert!(!node.add_dependent(sub));
        assert_eq!(node.dependents().len(), 1);

        assert!(node.remove_dependent(sub));
        assert!(node.dependents().is_empty());
    }

    #[test]
    fn replacing_dependencies_counts_runs() {
        let instance = InstanceId::new();
        let mut node = ReactionNode::new(ReactionId(3));
        let dep = Dependency {
            instance,
            signal: SignalId(1),
        };

        let old = node.replace_dependencies([dep].into_iter().collect());
        assert!(old.is_empty());
        assert_eq!(node.run_count(), 1);
        assert!(node.dependencies().contains(&dep));
    }
}
