//! Types shared by wire packets across protocol states.

use serde::{Deserialize, Serialize};
use serde_repr::*;
use uuid::Uuid;

/// Supported protocol version. Only 1.8.9's 47 is implemented; the field
/// still carries a real enum rather than a bare constant so the server
/// status JSON (which embeds it) keeps the shape a client expects.
#[non_exhaustive]
#[derive(Serialize_repr, Deserialize_repr, Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u16)]
pub enum ProtocolVersion {
    V47 = 47,
}

/// Protocol state a session is in.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum EventState {
    Handshake,
    Status,
    Login,
    Play,
}

/// Which side sent a packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum EventDirection {
    /// Server sent.
    ClientBound,
    /// Client sent.
    ServerBound,
}

/// Gamemode of a level or player.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Gamemode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// Dimension of a world.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Dimension {
    Nether,
    Overworld,
    End,
}

/// Difficulty of a level.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Difficulty {
    Peaceful,
    Easy,
    Normal,
    Hard,
}

/// General server description for the status response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(untagged)]
pub enum ServerDescription {
    Short(String),
    Long(ServerDescriptionLong),
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ServerDescriptionLong {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ServerPlayers {
    pub max: u32,
    pub online: u16,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ServerVersion {
    pub name: String,
    pub protocol: ProtocolVersion,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ServerInformation {
    pub description: ServerDescription,
    pub players: ServerPlayers,
    pub version: ServerVersion,
}

/// Decoded block-position coordinates (as opposed to the packed wire form,
/// `versions::v47::PackedPosition`).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Position {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

// ---- Chat ---------------

/// A Minecraft chat component.
///
/// The wire format is recursive JSON with exactly one content key
/// (`text`/`translate`/`score`/`selector`/`keybind`) plus optional
/// formatting and an `extra` child array. Rather than modelling every
/// variant as a Rust enum (which earlier drafts of this crate's teacher did
/// for only the `text` case, and lost everything else), this wraps the
/// parsed `serde_json::Value` directly so disconnect reasons and other rich
/// components round-trip losslessly.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat(pub serde_json::Value);

impl Chat {
    /// Wrap a plain string as `{"text": s}`, the canonical form for a bare
    /// message.
    pub fn text(s: impl Into<String>) -> Self {
        Self(serde_json::json!({ "text": s.into() }))
    }

    /// Best-effort flattened display text, concatenating `text` and
    /// `extra[].text` the way a client renders a component tree. Used for
    /// logging and chat-channel notifications, not for the wire.
    pub fn flatten(&self) -> String {
        fn walk(v: &serde_json::Value, out: &mut String) {
            if let Some(t) = v.get("text").and_then(|t| t.as_str()) {
                out.push_str(t);
            }
            if let Some(extra) = v.get("extra").and_then(|e| e.as_array()) {
                for child in extra {
                    walk(child, out);
                }
            }
        }
        let mut out = String::new();
        walk(&self.0, &mut out);
        out
    }
}

impl From<String> for Chat {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<&str> for Chat {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

// ---- Player Infos -------

#[derive(Debug, PartialEq, Clone)]
pub struct PlayerProperty {
    pub name: String,
    pub value: String,
    pub signature: Option<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct PlayerInfoAdd {
    pub name: String,
    pub properties: Vec<PlayerProperty>,
    pub gamemode: i32,
    pub ping: i32,
    pub display: Option<Chat>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum PlayerInfoAction {
    Add(PlayerInfoAdd),
    GamemodeUpdate { gamemode: i32 },
    LatencyUpdate { ping: i32 },
    DisplayNameUpdate { display: Option<Chat> },
    Remove,
}

#[derive(Debug, PartialEq, Clone)]
pub struct PlayerListInfo {
    pub uuid: Uuid,
    pub action: PlayerInfoAction,
}

// ---- Slot ------

#[derive(Debug, PartialEq, Clone)]
pub struct Slot {
    pub item_id: Option<i32>,
    pub item_count: i8,
    pub damage: Option<i16>,
    pub nbt: Option<nbt::Blob>,
}

impl Slot {
    pub const EMPTY: Slot = Slot {
        item_id: None,
        item_count: 0,
        damage: None,
        nbt: None,
    };
}
