//! Exact/prefix-glob publish-subscribe bus for session lifecycle events
//! ("join", "close", "transfer", ...) that aren't packets.
//!
//! Grounded on the original proxy's `emit()`, which matched subscriber
//! patterns against the event name with `re.fullmatch`. Full regex has no
//! idiomatic Rust equivalent worth pulling a crate in for here, and nothing
//! in this proxy's event names needs more than "exact" or "this prefix, then
//! anything" — so a pattern is either matched verbatim or, if it ends in
//! `*`, matched as a prefix.

use std::any::Any;
use std::sync::{Arc, Mutex};

/// An emitted event's payload, downcast by subscribers that know what shape
/// to expect for the name they subscribed to.
pub type Payload = Arc<dyn Any + Send + Sync>;

pub type Handler = Box<dyn Fn(&str, &Payload) + Send + Sync>;

struct Subscription {
    pattern: String,
    handler: Handler,
}

fn matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

/// A process-wide (or per-session) bus. Cheap to share: subscribing and
/// emitting both just take a lock over a `Vec`, which is fine at the rate
/// lifecycle events fire compared to packets.
#[derive(Default)]
pub struct EventBus {
    subs: Mutex<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// `pattern` matches event names verbatim unless it ends in `*`, in
    /// which case it matches any name sharing that prefix.
    pub fn subscribe(&self, pattern: impl Into<String>, handler: Handler) {
        self.subs.lock().unwrap().push(Subscription {
            pattern: pattern.into(),
            handler,
        });
    }

    pub fn emit(&self, name: &str, payload: Payload) {
        let subs = self.subs.lock().unwrap();
        for sub in subs.iter().filter(|s| matches(&s.pattern, name)) {
            (sub.handler)(name, &payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn exact_pattern_only_matches_exact_name() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.subscribe("join", Box::new(move |_, _| { hits2.fetch_add(1, Ordering::SeqCst); }));

        bus.emit("join", Arc::new(()));
        bus.emit("joining", Arc::new(()));
        bus.emit("close", Arc::new(()));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prefix_glob_matches_any_suffix() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.subscribe("chat.*", Box::new(move |_, _| { hits2.fetch_add(1, Ordering::SeqCst); }));

        bus.emit("chat.incoming", Arc::new(()));
        bus.emit("chat.outgoing", Arc::new(()));
        bus.emit("close", Arc::new(()));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn payload_round_trips_through_downcast() {
        let bus = EventBus::new();
        let captured = Arc::new(Mutex::new(None));
        let captured2 = captured.clone();
        bus.subscribe(
            "count",
            Box::new(move |_, payload| {
                if let Some(v) = payload.downcast_ref::<u32>() {
                    *captured2.lock().unwrap() = Some(*v);
                }
            }),
        );
        bus.emit("count", Arc::new(42u32));
        assert_eq!(*captured.lock().unwrap(), Some(42));
    }
}
