//! Update Scheduler
//!
//! The scheduler owns the graph of one reactive instance and decides which
//! pending reaction runs next.
//!
//! # Algorithm
//!
//! Dependencies are recorded, then diffed:
//!
//! 1. A reaction runs and records every signal it reads
//! 2. The recorded set replaces the previous one
//! 3. Signals that dropped out lose the reaction as a dependent, new ones gain it
//!
//! Ordering within a flush:
//!
//! 1. Walk the pending reactions in creation order
//! 2. Skip any reaction with a pending producer upstream of it (a reaction
//!    that writes, directly or transitively, a signal it reads)
//! 3. Run the first one left
//! 4. If every pending reaction has a pending producer (a cycle), run the
//!    lowest index
//!
//! This keeps a derived value ahead of its consumers even when the consumer
//! was created first.

use std::collections::{HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};

use super::node::{ReactionNode, SignalNode};
use crate::reactive::{Dependency, InstanceId, MeasureOfChange, ReactionId, SignalId, Subscriber};

/// Reactions waiting to run, with the merged measure that triggered them.
#[derive(Debug, Default)]
pub struct PendingSet {
    entries: IndexMap<ReactionId, MeasureOfChange>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `reaction` pending, merging with any measure already recorded.
    pub fn mark(&mut self, reaction: ReactionId, measure: MeasureOfChange) {
        self.entries
            .entry(reaction)
            .and_modify(|m| *m = m.merge(measure))
            .or_insert(measure);
    }

    pub fn take(&mut self, reaction: ReactionId) -> Option<MeasureOfChange> {
        self.entries.shift_remove(&reaction)
    }

    pub fn contains(&self, reaction: ReactionId) -> bool {
        self.entries.contains_key(&reaction)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ReactionId> + '_ {
        self.entries.keys().copied()
    }

    /// Mark everything in `other` pending here.
    pub fn absorb(&mut self, other: PendingSet) {
        for (reaction, measure) in other.entries {
            self.mark(reaction, measure);
        }
    }
}

/// Edges on other instances that a run added or dropped.
#[derive(Debug, Default, PartialEq)]
pub struct RunDiff {
    pub subscribe: Vec<Dependency>,
    pub unsubscribe: Vec<Dependency>,
}

impl RunDiff {
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }
}

/// The update scheduler manages the dependency graph of one instance.
#[derive(Debug)]
pub struct UpdateScheduler {
    instance: InstanceId,
    signals: Vec<SignalNode>,
    reactions: Vec<ReactionNode>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new(instance: InstanceId) -> Self {
        Self {
            instance,
            signals: Vec::new(),
            reactions: Vec::new(),
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Append a signal at the next index.
    pub fn add_signal(&mut self, measure: MeasureOfChange) -> SignalId {
        let id = SignalId(self.signals.len());
        self.signals.push(SignalNode::new(id, measure));
        id
    }

    /// Append a reaction at the next index.
    pub fn add_reaction(&mut self) -> ReactionId {
        let id = ReactionId(self.reactions.len());
        self.reactions.push(ReactionNode::new(id));
        id
    }

    pub fn signal(&self, id: SignalId) -> Option<&SignalNode> {
        self.signals.get(id.0)
    }

    pub fn reaction(&self, id: ReactionId) -> Option<&ReactionNode> {
        self.reactions.get(id.0)
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn reaction_count(&self) -> usize {
        self.reactions.len()
    }

    /// Add a dependency edge: `subscriber` reads `signal`.
    pub fn subscribe(&mut self, signal: SignalId, subscriber: Subscriber) {
        if let Some(node) = self.signals.get_mut(signal.0) {
            node.add_dependent(subscriber);
        }
    }

    /// Remove a dependency edge.
    pub fn unsubscribe(&mut self, signal: SignalId, subscriber: Subscriber) {
        if let Some(node) = self.signals.get_mut(signal.0) {
            node.remove_dependent(subscriber);
        }
    }

    /// The measure and current dependents of `signal`.
    pub fn dependents(&self, signal: SignalId) -> Option<(MeasureOfChange, Vec<Subscriber>)> {
        self.signals
            .get(signal.0)
            .map(|node| (node.measure(), node.dependents().iter().copied().collect()))
    }

    /// Record a producer edge: `reaction` writes `signal`.
    pub fn add_writer(&mut self, signal: SignalId, reaction: ReactionId) {
        let (Some(signal_node), Some(reaction_node)) =
            (self.signals.get_mut(signal.0), self.reactions.get_mut(reaction.0))
        else {
            return;
        };
        signal_node.add_writer(reaction);
        reaction_node.add_write(signal);
    }

    /// Store the outcome of a run of `reaction`.
    ///
    /// Local edges are updated in place. Edges to signals of other instances
    /// are returned so the caller can apply them on their owners.
    pub fn record_run(
        &mut self,
        reaction: ReactionId,
        dependencies: IndexSet<Dependency>,
        writes: &[SignalId],
    ) -> RunDiff {
        let mut diff = RunDiff::default();
        let Some(node) = self.reactions.get_mut(reaction.0) else {
            return diff;
        };
        let previous = node.replace_dependencies(dependencies.clone());
        let subscriber = Subscriber {
            instance: self.instance,
            reaction,
        };

        for dep in previous.difference(&dependencies) {
            if dep.instance == self.instance {
                self.unsubscribe(dep.signal, subscriber);
            } else {
                diff.unsubscribe.push(*dep);
            }
        }
        for dep in dependencies.difference(&previous) {
            if dep.instance == self.instance {
                self.subscribe(dep.signal, subscriber);
            } else {
                diff.subscribe.push(*dep);
            }
        }
        for signal in writes {
            self.add_writer(*signal, reaction);
        }

        diff
    }

    /// Pick the next pending reaction to run.
    pub fn next_ready(&self, pending: &PendingSet) -> Option<ReactionId> {
        let mut candidates: Vec<ReactionId> = pending.ids().collect();
        candidates.sort_unstable();
        candidates
            .iter()
            .copied()
            .find(|r| !self.has_pending_upstream(*r, pending))
            .or_else(|| candidates.first().copied())
    }

    /// Whether a pending reaction other than `reaction` feeds, directly or
    /// transitively, a signal that `reaction` reads.
    fn has_pending_upstream(&self, reaction: ReactionId, pending: &PendingSet) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([reaction]);
        visited.insert(reaction);

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.reaction(current) else {
                continue;
            };
            let local_reads = node
                .dependencies()
                .iter()
                .filter(|dep| dep.instance == self.instance);
            for dep in local_reads {
                let Some(signal) = self.signal(dep.signal) else {
                    continue;
                };
                for writer in signal.writers() {
                    if *writer == reaction || !visited.insert(*writer) {
                        continue;
                    }
                    if pending.contains(*writer) {
                        return true;
                    }
                    queue.push_back(*writer);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(instance: InstanceId, signal: SignalId) -> Dependency {
        Dependency { instance, signal }
    }

    #[test]
    fn record_run_diffs_local_edges() {
        let instance = InstanceId::new();
        let mut scheduler = UpdateScheduler::new(instance);
        let a = scheduler.add_signal(MeasureOfChange::Full);
        let b = scheduler.add_signal(MeasureOfChange::Full);
        let r = scheduler.add_reaction();
        let sub = Subscriber { instance, reaction: r };

        scheduler.record_run(r, [dep(instance, a)].into_iter().collect(), &[]);
        assert!(scheduler.signal(a).unwrap().dependents().contains(&sub));

        scheduler.record_run(r, [dep(instance, b)].into_iter().collect(), &[]);
        assert!(scheduler.signal(a).unwrap().dependents().is_empty());
        assert!(scheduler.signal(b).unwrap().dependents().contains(&sub));
        assert_eq!(scheduler.reaction(r).unwrap().run_count(), 2);
    }

    #[test]
    fn remote_edges_are_returned() {
        let instance = InstanceId::new();
        let remote = InstanceId::new();
        let mut scheduler = UpdateScheduler::new(instance);
        let r = scheduler.add_reaction();

        let diff = scheduler.record_run(r, [dep(remote, SignalId(4))].into_iter().collect(), &[]);
        assert_eq!(diff.subscribe, vec![dep(remote, SignalId(4))]);

        let diff = scheduler.record_run(r, IndexSet::new(), &[]);
        assert_eq!(diff.unsubscribe, vec![dep(remote, SignalId(4))]);
    }

    #[test]
    fn pending_marks_merge_to_full() {
        let mut pending = PendingSet::new();
        pending.mark(ReactionId(0), MeasureOfChange::Partial);
        pending.mark(ReactionId(0), MeasureOfChange::Full);
        pending.mark(ReactionId(0), MeasureOfChange::Partial);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.take(ReactionId(0)), Some(MeasureOfChange::Full));
    }

    #[test]
    fn producer_runs_before_lower_index_consumer() {
        let instance = InstanceId::new();
        let mut scheduler = UpdateScheduler::new(instance);
        let source = scheduler.add_signal(MeasureOfChange::Full);
        let derived = scheduler.add_signal(MeasureOfChange::Full);
        let consumer = scheduler.add_reaction();
        let producer = scheduler.add_reaction();

        scheduler.record_run(consumer, [dep(instance, derived)].into_iter().collect(), &[]);
        scheduler.record_run(producer, [dep(instance, source)].into_iter().collect(), &[derived]);

        let mut pending = PendingSet::new();
        pending.mark(consumer, MeasureOfChange::Full);
        pending.mark(producer, MeasureOfChange::Full);
        assert_eq!(scheduler.next_ready(&pending), Some(producer));

        pending.take(producer);
        assert_eq!(scheduler.next_ready(&pending), Some(consumer));
    }

    #[test]
    fn cycles_fall_back_to_lowest_index() {
        let instance = InstanceId::new();
        let mut scheduler = UpdateScheduler::new(instance);
        let x = scheduler.add_signal(MeasureOfChange::Full);
        let y = scheduler.add_signal(MeasureOfChange::Full);
        let r0 = scheduler.add_reaction();
        let r1 = scheduler.add_reaction();

        scheduler.record_run(r0, [dep(instance, x)].into_iter().collect(), &[y]);
        scheduler.record_run(r1, [dep(instance, y)].into_iter().collect(), &[x]);

        let mut pending = PendingSet::new();
        pending.mark(r1, MeasureOfChange::Full);
        pending.mark(r0, MeasureOfChange::Full);
        assert_eq!(scheduler.next_ready(&pending), Some(r0));
    }
}
