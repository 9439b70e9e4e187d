//! The two-thread pump that ties an owner's client connection to its
//! upstream server connection once login has handed off split streams:
//! decode, dispatch, mirror game state, feed the broadcast pipeline to any
//! connected spectator peers, forward.
//!
//! Grounded on `original_source/core/proxy.py`'s `Proxy.handle_client`/
//! `handle_server`/`transfer_to`/`close`. The original runs both directions
//! as tasks on one event loop; this crate's duplex already splits a
//! connection into independent read/write halves (`stream.rs`), so each
//! direction gets its own blocking OS thread instead of a task.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, warn};

use crate::broadcast::transformer::{BroadcastEvent, BroadcastTarget, PlayerTransformer};
use crate::broadcast::PeerHandle;
use crate::dispatch::Dispatcher;
use crate::errors::TetsuResult;
use crate::event::{EventDirection, EventState};
use crate::eventbus::{EventBus, Payload};
use crate::gamestate::GameState;
use crate::serialization::Readable;
use crate::stream::{ReadHalf, WriteHalf};
use crate::versions::common::VarInt;
use crate::versions::v47::{decode, encode_framed, Event};

/// State shared by both pump threads and by anything managing the peer
/// list from outside (spectator accept loop, join ritual).
pub struct Shared {
    pub gamestate: Mutex<GameState>,
    pub transformer: Mutex<PlayerTransformer>,
    pub peers: Mutex<Vec<PeerHandle>>,
    pub bus: Arc<EventBus>,
    pub dispatcher: Arc<Dispatcher>,
    pub owner_entity_id: Mutex<i32>,
    should_stop: AtomicBool,
    next: Mutex<Option<Box<Session>>>,
}

impl Shared {
    pub fn new(bus: Arc<EventBus>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            gamestate: Mutex::new(GameState::new()),
            transformer: Mutex::new(PlayerTransformer::new()),
            peers: Mutex::new(Vec::new()),
            bus,
            dispatcher,
            owner_entity_id: Mutex::new(0),
            should_stop: AtomicBool::new(false),
            next: Mutex::new(None),
        }
    }

    /// Schedules `new_session` to run once the current pump threads exit,
    /// and unwinds this session the way `transfer_to` does: emit `"close"`
    /// with reason `"transfer"`, then stop the read loops. The client
    /// socket itself is untouched — `new_session` is expected to have been
    /// built against the same client halves.
    pub fn transfer_to(&self, new_session: Session) {
        self.bus
            .emit("close", Arc::new("transfer".to_string()) as Payload);
        *self.next.lock().unwrap() = Some(Box::new(new_session));
        self.should_stop.store(true, Ordering::SeqCst);
    }

    pub fn close(&self, reason: &str) {
        self.bus
            .emit("close", Arc::new(reason.to_string()) as Payload);
        self.should_stop.store(true, Ordering::SeqCst);
    }

    fn stopped(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    /// Whether this session has been closed or queued for transfer — the
    /// signal external loops (the broadcast peer listener/handlers) poll to
    /// know when to stop.
    pub fn is_closed(&self) -> bool {
        self.stopped()
    }

    /// Sends each transformed event to the peers its target allows,
    /// dropping individual peers that error out (a dead spectator socket
    /// is the peer's problem, not the owner session's).
    fn broadcast(&self, events: &[BroadcastEvent]) {
        if events.is_empty() {
            return;
        }
        let mut peers = self.peers.lock().unwrap();
        peers.retain_mut(|peer| {
            for be in events {
                let reaches = match be.target {
                    BroadcastTarget::All => true,
                    BroadcastTarget::SpawnedAvatar => peer.avatar_spawned,
                };
                if !reaches {
                    continue;
                }
                if let Err(e) = peer.send(&be.event) {
                    warn!("dropping spectator peer {}: {}", peer.id, e);
                    return false;
                }
            }
            true
        });
    }
}

/// One live owner session: a client-facing duplex and a server-facing
/// duplex, already past login and split for the two pump threads.
pub struct Session {
    shared: Arc<Shared>,
    client_read: ReadHalf,
    client_write: WriteHalf,
    server_read: ReadHalf,
    server_write: WriteHalf,
}

impl Session {
    pub fn new(
        shared: Arc<Shared>,
        client_read: ReadHalf,
        client_write: WriteHalf,
        server_read: ReadHalf,
        server_write: WriteHalf,
    ) -> Self {
        Self {
            shared,
            client_read,
            client_write,
            server_read,
            server_write,
        }
    }

    pub fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    /// Runs both pump threads to completion, then returns the session
    /// `transfer_to` queued (if any) for the caller to run next with the
    /// same client connection. Mirrors `proxy.py`'s `run()`, which returns
    /// `self._next_proxy` once its own loops finish.
    pub fn run(self) -> TetsuResult<Option<Session>> {
        let Session {
            shared,
            client_read,
            client_write,
            server_read,
            server_write,
        } = self;

        let serverbound_shared = shared.clone();
        let clientbound_shared = shared.clone();

        let serverbound = thread::spawn(move || {
            pump(
                &serverbound_shared,
                client_read,
                server_write,
                EventDirection::ServerBound,
            )
        });
        let clientbound = thread::spawn(move || {
            pump(
                &clientbound_shared,
                server_read,
                client_write,
                EventDirection::ClientBound,
            )
        });

        if let Err(e) = serverbound.join().unwrap_or(Ok(())) {
            warn!("serverbound pump ended: {}", e);
        }
        if let Err(e) = clientbound.join().unwrap_or(Ok(())) {
            warn!("clientbound pump ended: {}", e);
        }

        Ok(shared.next.lock().unwrap().take().map(|b| *b))
    }
}

/// One direction's read-decode-dispatch-forward loop. `should_stop` is
/// re-checked after every packet so a `transfer_to`/`close` from the other
/// direction's thread (or from a dispatcher handler) unwinds promptly
/// instead of blocking forever on the next read.
fn pump(
    shared: &Arc<Shared>,
    mut read: ReadHalf,
    mut write: WriteHalf,
    direction: EventDirection,
) -> TetsuResult<()> {
    loop {
        if shared.stopped() {
            return Ok(());
        }

        let raw = match read.read_packet() {
            Ok(p) => p,
            Err(_) => {
                shared.close("disconnect");
                return Ok(());
            }
        };

        let mut cursor = io::Cursor::new(&raw);
        let id: i32 = VarInt::read_from(&mut cursor)?.into();
        let event = decode(direction, EventState::Play, id, &mut cursor)?;

        let broadcast_events = apply_to_state(shared, direction, &event)?;
        shared.broadcast(&broadcast_events);

        match shared.dispatcher.dispatch(direction, EventState::Play, id, event)? {
            Some(out) => {
                let frame = encode_framed(&out)?;
                write.write_packet(&frame)?;
            }
            None => debug!("{:?} packet {} swallowed by a listener", direction, id),
        }

        if shared.stopped() {
            return Ok(());
        }
    }
}

/// Mirrors the packet into `GameState` and runs it through the broadcast
/// transformer, holding each lock only as long as that single call needs.
fn apply_to_state(
    shared: &Arc<Shared>,
    direction: EventDirection,
    event: &Event,
) -> TetsuResult<Vec<BroadcastEvent>> {
    match direction {
        EventDirection::ServerBound => {
            shared.gamestate.lock().unwrap().apply_serverbound(event);
            shared.transformer.lock().unwrap().handle_serverbound(event)
        }
        EventDirection::ClientBound => {
            {
                let mut gs = shared.gamestate.lock().unwrap();
                gs.apply_clientbound(event, &shared.bus)?;
            }
            let owner_entity_id = *shared.owner_entity_id.lock().unwrap();
            let (events, spawn_requested) = shared
                .transformer
                .lock()
                .unwrap()
                .forward_clientbound(event, owner_entity_id)?;
            if let Event::JoinGame(p) = event {
                *shared.owner_entity_id.lock().unwrap() = p.entity_id;
                let gs = shared.gamestate.lock().unwrap();
                shared.transformer.lock().unwrap().init_from_gamestate(&gs);
            }
            if spawn_requested {
                shared.bus.emit("owner_position_synced", Arc::new(()) as Payload);
            }
            Ok(events)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Stream;
    use std::net::{TcpListener, TcpStream};

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let a = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (b, _) = listener.accept().unwrap();
        (a.join().unwrap(), b)
    }

    fn session(shared: Arc<Shared>) -> Session {
        let (ca, cb) = pair();
        let (sa, sb) = pair();
        let (client_read, client_write) = Stream::new(ca).split().unwrap();
        let (_sb_read, _sb_write) = Stream::new(cb).split().unwrap();
        let (server_read, server_write) = Stream::new(sa).split().unwrap();
        let (_sa_read, _sa_write) = Stream::new(sb).split().unwrap();
        Session::new(shared, client_read, client_write, server_read, server_write)
    }

    #[test]
    fn broadcast_respects_spawned_only_target() {
        let shared = Shared::new(Arc::new(EventBus::new()), Arc::new(Dispatcher::new()));
        // no peers connected: broadcasting must not panic even when events
        // target `SpawnedAvatar`.
        shared.broadcast(&[BroadcastEvent {
            target: BroadcastTarget::SpawnedAvatar,
            event: Event::Raw {
                id: 0x14,
                payload: vec![0],
            },
        }]);
    }

    #[test]
    fn transfer_to_queues_next_session_and_stops() {
        let shared = Arc::new(Shared::new(Arc::new(EventBus::new()), Arc::new(Dispatcher::new())));
        let next = session(shared.clone());
        assert!(!shared.stopped());
        shared.transfer_to(next);
        assert!(shared.stopped());
        assert!(shared.next.lock().unwrap().is_some());
    }
}
