//! Pairing
//!
//! Two instances keep private graphs. Pairing lets reactions of one
//! instance (the reader) depend on signals of another (the source) without
//! merging the graphs.
//!
//! # How It Works
//!
//! 1. `reader.enable_pairing(&source)` links both instances with weak edges
//! 2. Reads of the source's signals inside reader reactions are recorded and
//!    stored as dependents on the source side
//! 3. A source write records the reader's dependents on the source side;
//!    the reader's own pending set is untouched
//! 4. When the source has drained its own work it hands the recorded marks
//!    to each touched reader and flushes it, before the source's flush
//!    returns
//!
//! Reader reactions therefore never observe a source whose derived signals
//! are still pending.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use super::runtime::{Reactive, ReactiveInner};
use super::signal::MeasureOfChange;
use super::subscriber::{InstanceId, ReactionId};
use crate::graph::PendingSet;

#[derive(Clone)]
pub(crate) struct PeerLink {
    id: InstanceId,
    inner: Weak<ReactiveInner>,
}

/// Pairing edges of one instance.
#[derive(Default)]
pub(crate) struct Pairing {
    /// Instances this one reads from.
    sources: Vec<PeerLink>,
    /// Instances that read from this one.
    readers: Vec<PeerLink>,
    /// Reader reactions invalidated by writes here since the last cascade.
    touched: IndexMap<InstanceId, PendingSet>,
}

impl Pairing {
    fn add(links: &mut Vec<PeerLink>, id: InstanceId, inner: Weak<ReactiveInner>) -> bool {
        if links.iter().any(|link| link.id == id) {
            return false;
        }
        links.push(PeerLink { id, inner });
        true
    }

    pub(crate) fn add_source(&mut self, id: InstanceId, inner: Weak<ReactiveInner>) -> bool {
        Self::add(&mut self.sources, id, inner)
    }

    pub(crate) fn add_reader(&mut self, id: InstanceId, inner: Weak<ReactiveInner>) -> bool {
        Self::add(&mut self.readers, id, inner)
    }

    pub(crate) fn source(&self, id: InstanceId) -> Option<Arc<ReactiveInner>> {
        find(&self.sources, id)
    }

    pub(crate) fn reader(&self, id: InstanceId) -> Option<Arc<ReactiveInner>> {
        find(&self.readers, id)
    }

    pub(crate) fn is_source(&self, id: InstanceId) -> bool {
        self.sources.iter().any(|link| link.id == id)
    }

    pub(crate) fn source_ids(&self) -> Vec<InstanceId> {
        self.sources.iter().map(|link| link.id).collect()
    }

    pub(crate) fn touch(&mut self, reader: InstanceId, reaction: ReactionId, measure: MeasureOfChange) {
        self.touched.entry(reader).or_default().mark(reaction, measure);
    }

    pub(crate) fn take_touched(&mut self) -> IndexMap<InstanceId, PendingSet> {
        std::mem::take(&mut self.touched)
    }

    pub(crate) fn has_touched(&self) -> bool {
        !self.touched.is_empty()
    }

    pub(crate) fn live_sources(&self) -> Vec<Arc<ReactiveInner>> {
        self.sources.iter().filter_map(|link| link.inner.upgrade()).collect()
    }

    /// Live peers in either direction.
    pub(crate) fn peers(&self) -> Vec<Arc<ReactiveInner>> {
        self.sources
            .iter()
            .chain(self.readers.iter())
            .filter_map(|link| link.inner.upgrade())
            .collect()
    }
}

fn find(links: &[PeerLink], id: InstanceId) -> Option<Arc<ReactiveInner>> {
    links
        .iter()
        .find(|link| link.id == id)
        .and_then(|link| link.inner.upgrade())
}

impl Reactive {
    /// Let reactions of this instance depend on signals of `source`.
    ///
    /// Without pairing, reading another instance's signal inside a reaction
    /// is a plain snapshot.
    pub fn enable_pairing(&self, source: &Reactive) {
        if self.inner.id == source.inner.id {
            tracing::warn!(instance = %self.inner.id, "ignoring pairing of an instance with itself");
            return;
        }
        let added = self
            .inner
            .state
            .lock()
            .pairing
            .add_source(source.inner.id, Arc::downgrade(&source.inner));
        source
            .inner
            .state
            .lock()
            .pairing
            .add_reader(self.inner.id, Arc::downgrade(&self.inner));
        if added {
            tracing::debug!(reader = %self.inner.id, source = %source.inner.id, "pairing enabled");
        }
    }

    /// Whether this instance reads from `source`.
    pub fn is_paired_with(&self, source: &Reactive) -> bool {
        self.inner.state.lock().pairing.is_source(source.inner.id)
    }
}

impl ReactiveInner {
    pub(crate) fn pairing_source(&self, id: InstanceId) -> Option<Arc<ReactiveInner>> {
        self.state.lock().pairing.source(id)
    }

    pub(crate) fn pairing_reader(&self, id: InstanceId) -> Option<Arc<ReactiveInner>> {
        self.state.lock().pairing.reader(id)
    }

    /// Hand recorded marks to every touched reader and flush it.
    ///
    /// Returns false when there was nothing to cascade into.
    pub(crate) fn cascade_touched(&self) -> bool {
        let touched = self.state.lock().pairing.take_touched();
        if touched.is_empty() {
            return false;
        }
        for (id, marks) in touched {
            if let Some(reader) = self.pairing_reader(id) {
                tracing::debug!(source = %self.id, reader = %id, reactions = marks.len(), "cascading into paired reader");
                reader.state.lock().pending.absorb(marks);
                reader.run_pending();
            }
        }
        true
    }

    /// Flush every live source this instance reads from.
    pub(crate) fn settle_sources(&self) {
        let sources = self.state.lock().pairing.live_sources();
        for source in sources {
            source.run_pending();
        }
    }
}
