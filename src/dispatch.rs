//! Packet listener registry.
//!
//! Grounded on `PacketListener`/`listen_client`/`listen_server` from the
//! original proxy's event module: a listener is keyed by which side sent the
//! packet, its protocol state and wire id, and whether it runs "blocking"
//! (inline, able to replace or swallow the packet before it's forwarded) or
//! "non-blocking" (an observer whose return value is discarded). Python
//! builds this table by scanning decorated methods at class-definition time;
//! Rust has no equivalent of that reflection, so listeners are registered
//! explicitly with boxed closures instead.

use crate::errors::TetsuResult;
use crate::event::{EventDirection, EventState};
use crate::versions::v47::Event;

/// Whether a listener can mutate/suppress the packet it sees (`Blocking`) or
/// only observe it before it's forwarded unchanged (`NonBlocking`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocking {
    Blocking,
    NonBlocking,
}

pub type Handler = Box<dyn Fn(Event) -> TetsuResult<Option<Event>> + Send + Sync>;

struct ListenerEntry {
    direction: EventDirection,
    state: EventState,
    packet_id: i32,
    blocking: Blocking,
    handler: Handler,
}

/// Maps `(direction, state, packet id)` to the listeners registered for it.
#[derive(Default)]
pub struct Dispatcher {
    entries: Vec<ListenerEntry>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        direction: EventDirection,
        state: EventState,
        packet_id: i32,
        blocking: Blocking,
        handler: Handler,
    ) {
        self.entries.push(ListenerEntry {
            direction,
            state,
            packet_id,
            blocking,
            handler,
        });
    }

    /// Runs every listener registered for this `(direction, state, id)`, in
    /// registration order. A blocking listener returning `Ok(None)` swallows
    /// the packet: forwarding stops and later listeners for the same id
    /// don't run. Non-blocking listeners always see the event that's about
    /// to be forwarded; their return value has no effect on it.
    ///
    /// Returns `Ok(None)` when the packet was swallowed, `Ok(Some(event))`
    /// (possibly a different event than was passed in) otherwise.
    pub fn dispatch(
        &self,
        direction: EventDirection,
        state: EventState,
        packet_id: i32,
        mut event: Event,
    ) -> TetsuResult<Option<Event>> {
        for entry in self
            .entries
            .iter()
            .filter(|e| e.direction == direction && e.state == state && e.packet_id == packet_id)
        {
            match entry.blocking {
                Blocking::Blocking => match (entry.handler)(event)? {
                    Some(next) => event = next,
                    None => return Ok(None),
                },
                Blocking::NonBlocking => {
                    (entry.handler)(event.clone())?;
                }
            }
        }
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::Packet;
    use crate::versions::v47::StatusRequest;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn non_blocking_listener_cannot_suppress() {
        let mut d = Dispatcher::new();
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        d.register(
            EventDirection::ServerBound,
            EventState::Status,
            StatusRequest::ID,
            Blocking::NonBlocking,
            Box::new(move |_e| {
                seen2.store(true, Ordering::SeqCst);
                Ok(None)
            }),
        );
        let result = d
            .dispatch(
                EventDirection::ServerBound,
                EventState::Status,
                StatusRequest::ID,
                Event::StatusRequest(StatusRequest {}),
            )
            .unwrap();
        assert!(seen.load(Ordering::SeqCst));
        assert!(result.is_some());
    }

    #[test]
    fn blocking_listener_can_suppress() {
        let mut d = Dispatcher::new();
        d.register(
            EventDirection::ServerBound,
            EventState::Status,
            StatusRequest::ID,
            Blocking::Blocking,
            Box::new(|_| Ok(None)),
        );
        let result = d
            .dispatch(
                EventDirection::ServerBound,
                EventState::Status,
                StatusRequest::ID,
                Event::StatusRequest(StatusRequest {}),
            )
            .unwrap();
        assert!(result.is_none());
    }
}
