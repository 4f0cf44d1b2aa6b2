//! Subscriber seams
//!
//! Consumers receive every decoded inbound envelope through a
//! [`MessageListener`] registered under a unique key. A single
//! [`CacheUpdateHook`] observes successful entity-update notifications
//! before any listener does.

use crate::envelope::{EntityUpdate, Envelope};

/// Receives decoded inbound envelopes
///
/// Called on the session driver task; keep it short. Closures of the
/// form `Fn(&Envelope)` implement this trait.
pub trait MessageListener: Send + Sync + 'static {
    fn on_message(&self, envelope: &Envelope);
}

impl<F> MessageListener for F
where
    F: Fn(&Envelope) + Send + Sync + 'static,
{
    fn on_message(&self, envelope: &Envelope) {
        self(envelope)
    }
}

/// Cache side effect for the reserved entity-update category
///
/// Runs once per qualifying message, independent of which listeners
/// are registered.
pub trait CacheUpdateHook: Send + Sync + 'static {
    fn entity_updated(&self, update: &EntityUpdate);
}

/// A hook that ignores every update
pub struct NoCache;

impl CacheUpdateHook for NoCache {
    fn entity_updated(&self, _update: &EntityUpdate) {}
}
