//! # Event Queues
//!
//! Contracts never push events anywhere themselves. Each one owns an
//! append-only [`EventLog`] and the host drains it after a successful call,
//! forwarding the events to whoever is listening (the node persists them
//! and streams them over WebSocket). A call that fails emits nothing; the
//! ledger's rollback journal truncates the log back to where it was.

/// An append-only queue of events emitted by one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog<E> {
    events: Vec<E>,
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E> EventLog<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: E) {
        self.events.push(event);
    }

    /// Events emitted since the last drain, oldest first.
    pub fn events(&self) -> &[E] {
        &self.events
    }

    /// Take every pending event, leaving the log empty.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop events past `len`. Only rollback uses this.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}
