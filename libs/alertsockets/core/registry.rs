//! Listener registry and inbound dispatch
//!
//! # Architecture
//!
//! ```text
//! Transport ─> decode ─┬─> failure report (error flag / status >= 400)
//!                      ├─> cache hook (entity updates, once per message)
//!                      └─> every attached listener (independent, any order)
//! ```
//!
//! Registrations outlive connections. Each registration is attached to
//! the live transport while the session is OPEN and detached whenever it
//! leaves OPEN; the whole set is re-attached on the next OPEN.

use crate::envelope::Envelope;
use crate::traits::{CacheUpdateHook, MessageListener};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

type SharedListener = Arc<dyn MessageListener>;

/// Keyed subscriber map
#[derive(Default)]
pub struct ListenerRegistry {
    entries: HashMap<String, SharedListener>,
    attached: HashMap<String, SharedListener>,
    live: bool,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `key`, replacing any previous entry
    ///
    /// The previous entry is detached first. The new one is attached
    /// right away if the session is OPEN.
    pub fn add(&mut self, key: impl Into<String>, listener: SharedListener) {
        let key = key.into();

        if self.attached.remove(&key).is_some() {
            debug!("Detached previous listener '{}'", key);
        }
        if self.live {
            self.attached.insert(key.clone(), Arc::clone(&listener));
        }
        self.entries.insert(key, listener);
    }

    /// Remove the listener under `key`; unknown keys are ignored
    pub fn remove(&mut self, key: &str) -> bool {
        self.attached.remove(key);
        self.entries.remove(key).is_some()
    }

    /// Attach every registration to the newly opened transport
    pub fn attach_all(&mut self) {
        self.live = true;
        self.attached = self.entries.clone();
        debug!("Attached {} listeners", self.attached.len());
    }

    /// Drop every attachment held for the transport being released
    pub fn detach_all(&mut self) {
        self.live = false;
        self.attached.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_attached(&self, key: &str) -> bool {
        self.attached.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    /// Copy of the attached listeners, so callbacks run without the lock
    pub fn attached_snapshot(&self) -> Vec<(String, SharedListener)> {
        self.attached
            .iter()
            .map(|(key, listener)| (key.clone(), Arc::clone(listener)))
            .collect()
    }
}

/// Log inbound envelopes that report a failure
pub fn report_failure(envelope: &Envelope) {
    if envelope.is_failure() {
        warn!(
            "Server reported failure on '{}' (status {}): {}",
            envelope.kind, envelope.status, envelope.message
        );
    }
}

/// Run the cache side effect for a qualifying entity update
pub fn apply_cache_update(envelope: &Envelope, update_type: &str, hook: &dyn CacheUpdateHook) -> bool {
    match envelope.entity_update(update_type) {
        Some(update) => {
            debug!("Entity {} updated to version {}", update.entity_id, update.version);
            hook.entity_updated(&update);
            true
        }
        None => false,
    }
}

/// Deliver `envelope` to every listener
///
/// A panicking listener is logged and skipped; the others still run.
/// Returns the number of listeners that completed.
pub fn dispatch(listeners: &[(String, SharedListener)], envelope: &Envelope) -> usize {
    let mut delivered = 0;

    for (key, listener) in listeners {
        match catch_unwind(AssertUnwindSafe(|| listener.on_message(envelope))) {
            Ok(()) => delivered += 1,
            Err(_) => error!("Listener '{}' panicked while handling '{}'", key, envelope.kind),
        }
    }

    delivered
}

/// Full inbound path for one raw text frame
///
/// Decode failures are logged and swallowed. Returns the number of
/// listeners that received the message.
pub fn route_inbound(
    text: &str,
    update_type: &str,
    hook: &dyn CacheUpdateHook,
    listeners: &[(String, SharedListener)],
) -> usize {
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Dropping undecodable inbound message: {}", e);
            return 0;
        }
    };

    report_failure(&envelope);
    apply_cache_update(&envelope, update_type, hook);
    dispatch(listeners, &envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EntityUpdate;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const UPDATE: &str = r#"{"error":false,"message":"","type":"ENTITY_UPDATE","status":200,"version":"3","entity":{"id":"alert-9"}}"#;

    #[derive(Default)]
    struct RecordingHook {
        updates: Mutex<Vec<EntityUpdate>>,
    }

    impl CacheUpdateHook for RecordingHook {
        fn entity_updated(&self, update: &EntityUpdate) {
            self.updates.lock().push(update.clone());
        }
    }

    fn counting_listener() -> (SharedListener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let listener: SharedListener = Arc::new(move |_: &Envelope| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    #[test]
    fn test_entries_attach_only_while_live() {
        let mut registry = ListenerRegistry::new();
        let (early, _) = counting_listener();
        registry.add("early", early);
        assert!(registry.contains("early"));
        assert!(!registry.is_attached("early"));

        registry.attach_all();
        assert!(registry.is_attached("early"));

        let (late, _) = counting_listener();
        registry.add("late", late);
        assert!(registry.is_attached("late"));
        assert_eq!(registry.attached_count(), 2);

        registry.detach_all();
        assert_eq!(registry.attached_count(), 0);
        assert_eq!(registry.len(), 2);

        registry.attach_all();
        assert_eq!(registry.attached_count(), 2);
    }

    #[test]
    fn test_same_key_replaces_previous_entry() {
        let mut registry = ListenerRegistry::new();
        registry.attach_all();

        let (first, first_count) = counting_listener();
        let (second, second_count) = counting_listener();
        registry.add("feed", first);
        registry.add("feed", second);
        assert_eq!(registry.len(), 1);

        let envelope = Envelope::decode(UPDATE).unwrap();
        dispatch(&registry.attached_snapshot(), &envelope);
        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_unknown_key_is_noop() {
        let mut registry = ListenerRegistry::new();
        assert!(!registry.remove("missing"));

        let (listener, _) = counting_listener();
        registry.add("known", listener);
        registry.attach_all();
        assert!(registry.remove("known"));
        assert!(!registry.is_attached("known"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_entity_update_hits_cache_once_and_every_listener_once() {
        let mut registry = ListenerRegistry::new();
        let (a, a_count) = counting_listener();
        let (b, b_count) = counting_listener();
        registry.add("a", a);
        registry.add("b", b);
        registry.attach_all();

        let hook = RecordingHook::default();
        let delivered = route_inbound(UPDATE, "ENTITY_UPDATE", &hook, &registry.attached_snapshot());

        assert_eq!(delivered, 2);
        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);

        let updates = hook.updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].entity_id, "alert-9");
        assert_eq!(updates[0].version, "3");
    }

    #[test]
    fn test_cache_hook_runs_without_listeners() {
        let hook = RecordingHook::default();
        assert_eq!(route_inbound(UPDATE, "ENTITY_UPDATE", &hook, &[]), 0);
        assert_eq!(hook.updates.lock().len(), 1);
    }

    #[test]
    fn test_failed_update_skips_cache_but_reaches_listeners() {
        let (listener, count) = counting_listener();
        let hook = RecordingHook::default();
        let failed = r#"{"error":true,"message":"stale","type":"ENTITY_UPDATE","status":409,"version":"3","entity":{"id":"alert-9"}}"#;

        let delivered = route_inbound(failed, "ENTITY_UPDATE", &hook, &[("x".to_string(), listener)]);
        assert_eq!(delivered, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(hook.updates.lock().is_empty());
    }

    #[test]
    fn test_undecodable_message_is_swallowed() {
        let (listener, count) = counting_listener();
        let hook = RecordingHook::default();

        let delivered = route_inbound("{not json", "ENTITY_UPDATE", &hook, &[("x".to_string(), listener)]);
        assert_eq!(delivered, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let (good, good_count) = counting_listener();
        let bad: SharedListener = Arc::new(|_: &Envelope| panic!("listener bug"));
        let listeners = vec![("bad".to_string(), bad), ("good".to_string(), good)];

        let envelope = Envelope::decode(UPDATE).unwrap();
        assert_eq!(dispatch(&listeners, &envelope), 1);
        assert_eq!(good_count.load(Ordering::SeqCst), 1);
    }
}
