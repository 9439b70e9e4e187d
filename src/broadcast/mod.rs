//! Spectator broadcast pipeline: lets peers connected over a side channel
//! watch an owner's session as if they were nearby players, without
//! impersonating the owner upstream.
//!
//! Grounded on `original_source/broadcasting/transform.py` and
//! `original_source/broadcasting/plugins/login.py`.

pub mod peer;
pub mod transformer;

use crate::errors::TetsuResult;
use crate::stream::WriteHalf;
use crate::versions::v47::{encode_framed, Event};

/// A connected spectator peer, as seen from the owner's side. The owner's
/// avatar is given to every peer under the same entity id the owner itself
/// was assigned by `JoinGame` — spectator connections have no real backing
/// server, so there's no id collision to avoid — but each peer tracks its
/// own "has this client actually seen the avatar spawned yet" bit, since
/// peers can join mid-session at different times.
pub struct PeerHandle {
    pub id: u64,
    pub avatar_spawned: bool,
    write: WriteHalf,
}

impl PeerHandle {
    pub fn new(id: u64, write: WriteHalf) -> Self {
        Self {
            id,
            avatar_spawned: false,
            write,
        }
    }

    pub fn send(&mut self, event: &Event) -> TetsuResult<()> {
        let frame = encode_framed(event)?;
        self.write.write_packet(&frame)
    }
}
