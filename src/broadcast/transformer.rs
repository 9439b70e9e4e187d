//! Re-frames the owner's serverbound packets into clientbound entity
//! packets a spectator's client can render as a nearby player, and filters
//! the owner's clientbound stream down to what a spectator is allowed to
//! see.
//!
//! Grounded on `original_source/broadcasting/transform.py`'s
//! `PlayerTransformer`; the packet-id branching below mirrors its
//! `handle_serverbound_packet`/`forward_clientbound_packet` one case at a
//! time.

use crate::errors::TetsuResult;
use crate::event::Slot;
use crate::gamestate::GameState;
use crate::serialization::Writable;
use crate::versions::common::{Angle, VarInt};
use crate::versions::v47::{
    AttachEntity, Event, EntityEffect, EntityEquipment, EntityHeadLook,
    EntityLookAndRelativeMove, EntityMetadataEntries, EntityMetadataPacket, EntityRelativeMove,
    EntityVelocity, MetadataValue, RemoveEntityEffect, Respawn,
};

/// Encodes a bare VarInt, used to hand-build the handful of raw frames the
/// decoder leaves undecoded (0x0B Animation, 0x14 Entity).
fn varint_bytes(v: i32) -> TetsuResult<Vec<u8>> {
    let mut buf = Vec::new();
    VarInt(v).write_to(&mut buf)?;
    Ok(buf)
}

const EQUIPMENT_SLOT_HELD: i16 = 0;
const SNEAKING: u8 = 0x02;
const SPRINTING: u8 = 0x08;

/// Which peers a re-framed packet should reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastTarget {
    /// Every connected peer, spawned or not (world-state packets peers
    /// need regardless of whether the avatar itself exists for them yet).
    All,
    /// Only peers whose client has already had the avatar spawned.
    SpawnedAvatar,
}

pub struct BroadcastEvent {
    pub target: BroadcastTarget,
    pub event: Event,
}

fn to_all(event: Event) -> BroadcastEvent {
    BroadcastEvent {
        target: BroadcastTarget::All,
        event,
    }
}

fn to_spawned(event: Event) -> BroadcastEvent {
    BroadcastEvent {
        target: BroadcastTarget::SpawnedAvatar,
        event,
    }
}

fn raw(id: i32, payload: Vec<u8>) -> Event {
    Event::Raw { id, payload }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Pos {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Rot {
    yaw: f32,
    pitch: f32,
}

/// Clientbound packet ids spectators are allowed to see verbatim once none
/// of the dedicated re-framing cases above claims them — world state
/// (chunks, block changes, sounds, scoreboard, teams...) rather than
/// anything tied to the owner's own connection. Player-specific ids
/// (health, held item, inventory, abilities, tab-complete, titles) are
/// deliberately left out.
const ALLOWED_PASSTHROUGH: &[i32] = &[
    0x01, 0x02, 0x03, 0x04, 0x05, 0x07, 0x08, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11,
    0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x20, 0x21,
    0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2C, 0x33, 0x34, 0x35, 0x37, 0x38,
    0x3B, 0x3C, 0x3D, 0x3E, 0x3F, 0x40, 0x41, 0x42, 0x43, 0x44, 0x47, 0x48, 0x49,
];

fn is_allowed_passthrough(id: i32) -> bool {
    ALLOWED_PASSTHROUGH.contains(&id)
}

/// Tracks the owner's position/rotation/equipment as seen through their
/// serverbound traffic, and turns that traffic (plus a filtered slice of
/// the owner's clientbound traffic) into packets spectators can consume.
pub struct PlayerTransformer {
    avatar_eid: i32,
    position: Pos,
    rotation: Rot,
    on_ground: bool,
    metadata_flags: u8,
    held_slot: i16,
    equipment: std::collections::HashMap<i16, Slot>,
    any_spawned: bool,
}

impl PlayerTransformer {
    pub fn new() -> Self {
        Self {
            avatar_eid: 0,
            position: Pos::default(),
            rotation: Rot::default(),
            on_ground: false,
            metadata_flags: 0,
            held_slot: 0,
            equipment: std::collections::HashMap::new(),
            any_spawned: false,
        }
    }

    pub fn avatar_entity_id(&self) -> i32 {
        self.avatar_eid
    }

    pub fn held_slot(&self) -> i16 {
        self.held_slot
    }

    pub fn metadata_flags(&self) -> u8 {
        self.metadata_flags
    }

    /// Snapshots equipment slots 0 (held) through 4 (helmet) for a full
    /// replay to a newly-joined peer; unset slots come back empty.
    pub fn equipment_slots(&self) -> Vec<(i16, Slot)> {
        (0..=4)
            .map(|slot| (slot, self.equipment.get(&slot).cloned().unwrap_or(Slot::EMPTY)))
            .collect()
    }

    /// Seeds position/rotation from the live mirror — used right after a
    /// peer joins mid-session, so its first spawn packet isn't stale.
    pub fn init_from_gamestate(&mut self, gamestate: &GameState) {
        self.avatar_eid = gamestate.me.entity_id;
        self.position = Pos {
            x: gamestate.me.pos.x,
            y: gamestate.me.pos.y,
            z: gamestate.me.pos.z,
        };
        self.rotation = Rot {
            yaw: gamestate.me.rot.yaw,
            pitch: gamestate.me.rot.pitch,
        };
    }

    /// Clears spawn-tracking state (e.g. on a dimension change, every
    /// peer's client just threw its world away).
    pub fn reset(&mut self) {
        self.any_spawned = false;
    }

    pub fn mark_spawned(&mut self) {
        self.any_spawned = true;
    }

    pub fn is_spawned(&self) -> bool {
        self.any_spawned
    }

    // ---------------------------------------------------------------
    // Serverbound: player actions -> entity packets for spectators
    // ---------------------------------------------------------------

    pub fn handle_serverbound(&mut self, event: &Event) -> TetsuResult<Vec<BroadcastEvent>> {
        let mut out = Vec::new();
        match event {
            Event::Player(p) => {
                self.on_ground = p.on_ground;
                // id 0x14 ("Entity"): a no-op keepalive the client uses to
                // confirm an entity still exists; not worth a dedicated
                // packet type of its own.
                out.push(to_spawned(raw(0x14, varint_bytes(self.avatar_eid)?)));
            }
            Event::PlayerPosition(p) => {
                self.update_position(Some(p.x), Some(p.y), Some(p.z), None, None, p.on_ground, &mut out);
            }
            Event::PlayerLook(p) => {
                self.update_look(p.yaw, p.pitch, p.on_ground, &mut out);
            }
            Event::PlayerPositionAndLookServerbound(p) => {
                self.update_position(
                    Some(p.x),
                    Some(p.y),
                    Some(p.z),
                    Some(p.yaw),
                    Some(p.pitch),
                    p.on_ground,
                    &mut out,
                );
            }
            Event::HeldItemChangeServerbound(p) => {
                self.held_slot = p.slot;
                let item = self
                    .equipment
                    .get(&EQUIPMENT_SLOT_HELD)
                    .cloned()
                    .unwrap_or(Slot::EMPTY);
                self.equipment.insert(EQUIPMENT_SLOT_HELD, item.clone());
                out.push(to_spawned(Event::EntityEquipment(EntityEquipment {
                    entity_id: self.avatar_eid,
                    slot: EQUIPMENT_SLOT_HELD,
                    item,
                })));
            }
            Event::Animation(_) => {
                // arm swing; clientbound Animation (0x0B) has no decoded
                // struct of its own, so build the raw frame by hand.
                let mut payload = varint_bytes(self.avatar_eid)?;
                payload.push(0); // animation 0 = swing arm
                out.push(to_spawned(raw(0x0B, payload)));
            }
            Event::EntityAction(p) => {
                let changed = match p.action_id.0 {
                    0 => {
                        self.metadata_flags |= SNEAKING;
                        true
                    }
                    1 => {
                        self.metadata_flags &= !SNEAKING;
                        true
                    }
                    3 => {
                        self.metadata_flags |= SPRINTING;
                        true
                    }
                    4 => {
                        self.metadata_flags &= !SPRINTING;
                        true
                    }
                    _ => false,
                };
                if changed {
                    out.push(to_spawned(Event::EntityMetadata(EntityMetadataPacket {
                        entity_id: self.avatar_eid.into(),
                        metadata: EntityMetadataEntries(vec![(
                            0,
                            MetadataValue::Byte(self.metadata_flags as i8),
                        )]),
                    })));
                }
            }
            _ => {}
        }
        Ok(out)
    }

    fn update_position(
        &mut self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        yaw: Option<f32>,
        pitch: Option<f32>,
        on_ground: bool,
        out: &mut Vec<BroadcastEvent>,
    ) {
        let old = self.position;
        let new_pos = Pos {
            x: x.unwrap_or(old.x),
            y: y.unwrap_or(old.y),
            z: z.unwrap_or(old.z),
        };

        let dx = (new_pos.x - old.x) * 32.0;
        let dy = (new_pos.y - old.y) * 32.0;
        let dz = (new_pos.z - old.z) * 32.0;

        let use_relative =
            dx.abs() < 128.0 && dy.abs() < 128.0 && dz.abs() < 128.0 && self.any_spawned;

        self.position = new_pos;
        self.on_ground = on_ground;
        if let (Some(yaw), Some(pitch)) = (yaw, pitch) {
            self.rotation = Rot { yaw, pitch };
        }

        if use_relative {
            if let (Some(yaw), Some(pitch)) = (yaw, pitch) {
                out.push(to_spawned(Event::EntityLookAndRelativeMove(
                    EntityLookAndRelativeMove {
                        entity_id: self.avatar_eid.into(),
                        delta_x: dx as i8,
                        delta_y: dy as i8,
                        delta_z: dz as i8,
                        yaw: Angle::from_degrees(yaw),
                        pitch: Angle::from_degrees(pitch),
                        on_ground,
                    },
                )));
                out.push(to_spawned(Event::EntityHeadLook(EntityHeadLook {
                    entity_id: self.avatar_eid.into(),
                    head_yaw: Angle::from_degrees(yaw),
                })));
            } else {
                out.push(to_spawned(Event::EntityRelativeMove(EntityRelativeMove {
                    entity_id: self.avatar_eid.into(),
                    delta_x: dx as i8,
                    delta_y: dy as i8,
                    delta_z: dz as i8,
                    on_ground,
                })));
            }
        } else {
            out.push(to_spawned(Event::EntityTeleport(
                crate::versions::v47::EntityTeleport {
                    entity_id: self.avatar_eid.into(),
                    x: (new_pos.x * 32.0) as i32,
                    y: (new_pos.y * 32.0) as i32,
                    z: (new_pos.z * 32.0) as i32,
                    yaw: Angle::from_degrees(self.rotation.yaw),
                    pitch: Angle::from_degrees(self.rotation.pitch),
                    on_ground,
                },
            )));
            if yaw.is_some() {
                out.push(to_spawned(Event::EntityHeadLook(EntityHeadLook {
                    entity_id: self.avatar_eid.into(),
                    head_yaw: Angle::from_degrees(self.rotation.yaw),
                })));
            }
        }
    }

    fn update_look(&mut self, yaw: f32, pitch: f32, on_ground: bool, out: &mut Vec<BroadcastEvent>) {
        self.rotation = Rot { yaw, pitch };
        self.on_ground = on_ground;
        out.push(to_spawned(Event::EntityLook(crate::versions::v47::EntityLook {
            entity_id: self.avatar_eid.into(),
            yaw: Angle::from_degrees(yaw),
            pitch: Angle::from_degrees(pitch),
            on_ground,
        })));
        out.push(to_spawned(Event::EntityHeadLook(EntityHeadLook {
            entity_id: self.avatar_eid.into(),
            head_yaw: Angle::from_degrees(yaw),
        })));
    }

    // ---------------------------------------------------------------
    // Clientbound: the owner's own stream, filtered for spectators
    // ---------------------------------------------------------------

    /// Returns the packets to broadcast plus whether this packet should
    /// trigger the peer-join spawn step (true only right after the
    /// authoritative position-and-look update).
    pub fn forward_clientbound(
        &mut self,
        event: &Event,
        owner_entity_id: i32,
    ) -> TetsuResult<(Vec<BroadcastEvent>, bool)> {
        let mut out = Vec::new();
        let mut spawn_requested = false;

        match event {
            Event::JoinGame(p) => {
                self.avatar_eid = p.entity_id;
                self.any_spawned = false;
                // clients get their own Join Game from the real server
                // they connect to; this is never forwarded.
            }
            Event::Respawn(p) => {
                self.any_spawned = false;
                out.push(to_all(Event::Respawn(Respawn {
                    dimension: p.dimension,
                    difficulty: p.difficulty,
                    gamemode: 3, // spectator, so peers can fly through walls
                    level_type: p.level_type.clone(),
                })));
            }
            Event::PlayerPositionAndLookClientbound(p) => {
                let mut x = p.x;
                let mut y = p.y;
                let mut z = p.z;
                let mut yaw = p.yaw;
                let mut pitch = p.pitch;
                if p.flags & 0x01 != 0 {
                    x += self.position.x;
                }
                if p.flags & 0x02 != 0 {
                    y += self.position.y;
                }
                if p.flags & 0x04 != 0 {
                    z += self.position.z;
                }
                if p.flags & 0x08 != 0 {
                    yaw += self.rotation.yaw;
                }
                if p.flags & 0x10 != 0 {
                    pitch += self.rotation.pitch;
                }
                self.position = Pos { x, y, z };
                self.rotation = Rot { yaw, pitch };

                out.push(to_all(event.clone()));
                spawn_requested = true;

                out.push(to_spawned(Event::EntityTeleport(
                    crate::versions::v47::EntityTeleport {
                        entity_id: self.avatar_eid.into(),
                        x: (x * 32.0) as i32,
                        y: (y * 32.0) as i32,
                        z: (z * 32.0) as i32,
                        yaw: Angle::from_degrees(yaw),
                        pitch: Angle::from_degrees(pitch),
                        on_ground: self.on_ground,
                    },
                )));
            }
            Event::EntityEquipment(p) => {
                if p.entity_id == self.avatar_eid || p.entity_id == owner_entity_id {
                    self.equipment.insert(p.slot, p.item.clone());
                    out.push(to_all(Event::EntityEquipment(EntityEquipment {
                        entity_id: self.avatar_eid,
                        slot: p.slot,
                        item: p.item.clone(),
                    })));
                }
            }
            Event::EntityVelocity(p) => {
                if p.entity_id == owner_entity_id {
                    out.push(to_all(Event::EntityVelocity(EntityVelocity {
                        entity_id: self.avatar_eid,
                        velocity_x: p.velocity_x,
                        velocity_y: p.velocity_y,
                        velocity_z: p.velocity_z,
                    })));
                }
            }
            Event::AttachEntity(p) => {
                if p.entity_id == owner_entity_id {
                    out.push(to_all(Event::AttachEntity(AttachEntity {
                        entity_id: self.avatar_eid,
                        vehicle_id: p.vehicle_id,
                        leash: p.leash,
                    })));
                }
            }
            Event::EntityMetadata(p) => {
                let id: i32 = p.entity_id.into();
                if id == owner_entity_id {
                    out.push(to_all(Event::EntityMetadata(EntityMetadataPacket {
                        entity_id: self.avatar_eid.into(),
                        metadata: p.metadata.clone(),
                    })));
                }
            }
            Event::EntityEffect(p) => {
                let id: i32 = p.entity_id.into();
                if id == owner_entity_id {
                    out.push(to_all(Event::EntityEffect(EntityEffect {
                        entity_id: self.avatar_eid.into(),
                        effect_id: p.effect_id,
                        amplifier: p.amplifier,
                        duration: p.duration,
                        hide_particles: p.hide_particles,
                    })));
                }
            }
            Event::RemoveEntityEffect(p) => {
                let id: i32 = p.entity_id.into();
                if id == owner_entity_id {
                    out.push(to_all(Event::RemoveEntityEffect(RemoveEntityEffect {
                        entity_id: self.avatar_eid.into(),
                        effect_id: p.effect_id,
                    })));
                }
            }
            Event::SetSlot(p) => {
                if p.window_id == 0 {
                    let hotbar_slot = p.slot as i32 - 36;
                    if (0..=8).contains(&hotbar_slot) && hotbar_slot as i16 == self.held_slot {
                        self.equipment.insert(EQUIPMENT_SLOT_HELD, p.slot_data.clone());
                        out.push(to_all(Event::EntityEquipment(EntityEquipment {
                            entity_id: self.avatar_eid,
                            slot: EQUIPMENT_SLOT_HELD,
                            item: p.slot_data.clone(),
                        })));
                    }
                }
                // never forwarded as-is: spectators have no inventory
            }
            Event::PlayerListItem(_) => {
                out.push(to_all(event.clone()));
            }
            Event::DestroyEntities(p) => {
                let filtered: Vec<i32> = p
                    .entity_ids
                    .iter()
                    .copied()
                    .filter(|&id| id != owner_entity_id)
                    .collect();
                if !filtered.is_empty() {
                    out.push(to_all(Event::DestroyEntities(
                        crate::versions::v47::DestroyEntities { entity_ids: filtered },
                    )));
                }
            }
            // clientbound Animation (0x0B) has no decoded struct of its
            // own, so it always arrives as Raw; parsed and re-framed by
            // hand rather than forwarded untouched.
            Event::Raw { id, payload } if *id == 0x0B => {
                if let Some((entity_id, animation)) = decode_varint_then_u8(payload) {
                    if entity_id == owner_entity_id {
                        let mut out_payload = varint_bytes(self.avatar_eid)?;
                        out_payload.push(animation);
                        out.push(to_all(raw(0x0B, out_payload)));
                    }
                }
            }
            // Everything else: forwarded verbatim if it's a world-state
            // packet spectators are allowed to see, dropped otherwise.
            // Covers both decoded variants we don't re-frame (SpawnPlayer,
            // Teams, chunk-adjacent Raw ids, ...) and undecoded Raw ids.
            _ => {
                if is_allowed_passthrough(crate::versions::v47::wire_id(event)) {
                    out.push(to_all(event.clone()));
                }
            }
        }

        Ok((out, spawn_requested))
    }
}

impl Default for PlayerTransformer {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a VarInt followed by one raw byte from a captured payload, used
/// only for the handful of packets the decoder leaves as [`Event::Raw`].
fn decode_varint_then_u8(payload: &[u8]) -> Option<(i32, u8)> {
    use crate::serialization::Readable;
    use crate::versions::common::VarInt;
    let mut cursor = std::io::Cursor::new(payload);
    let id = VarInt::read_from(&mut cursor).ok()?.0;
    let mut rest = Vec::new();
    std::io::Read::read_to_end(&mut cursor, &mut rest).ok()?;
    rest.first().map(|&b| (id, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versions::v47::{Player, PlayerPosition};

    #[test]
    fn small_move_before_any_spawn_uses_teleport() {
        let mut t = PlayerTransformer::new();
        t.avatar_eid = 42;
        let out = t
            .handle_serverbound(&Event::PlayerPosition(PlayerPosition {
                x: 1.0,
                y: 0.0,
                z: 0.0,
                on_ground: true,
            }))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].event, Event::EntityTeleport(_)));
    }

    #[test]
    fn small_move_after_spawn_uses_relative_move() {
        let mut t = PlayerTransformer::new();
        t.avatar_eid = 42;
        t.mark_spawned();
        let out = t
            .handle_serverbound(&Event::PlayerPosition(PlayerPosition {
                x: 1.0,
                y: 0.0,
                z: 0.0,
                on_ground: true,
            }))
            .unwrap();
        assert!(matches!(out[0].event, Event::EntityRelativeMove(_)));
    }

    #[test]
    fn large_move_always_teleports_even_when_spawned() {
        let mut t = PlayerTransformer::new();
        t.avatar_eid = 42;
        t.mark_spawned();
        let out = t
            .handle_serverbound(&Event::PlayerPosition(PlayerPosition {
                x: 100.0,
                y: 0.0,
                z: 0.0,
                on_ground: true,
            }))
            .unwrap();
        assert!(matches!(out[0].event, Event::EntityTeleport(_)));
    }

    #[test]
    fn destroy_entities_drops_owner_id_only() {
        let mut t = PlayerTransformer::new();
        let (out, _) = t
            .forward_clientbound(
                &Event::DestroyEntities(crate::versions::v47::DestroyEntities {
                    entity_ids: vec![1, 2, 3],
                }),
                2,
            )
            .unwrap();
        match &out[0].event {
            Event::DestroyEntities(p) => assert_eq!(p.entity_ids, vec![1, 3]),
            _ => panic!("expected DestroyEntities"),
        }
    }

    #[test]
    fn destroy_entities_suppressed_when_only_owner_listed() {
        let mut t = PlayerTransformer::new();
        let (out, _) = t
            .forward_clientbound(
                &Event::DestroyEntities(crate::versions::v47::DestroyEntities {
                    entity_ids: vec![7],
                }),
                7,
            )
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn join_game_is_never_forwarded() {
        let mut t = PlayerTransformer::new();
        let (out, spawn) = t
            .forward_clientbound(
                &Event::JoinGame(crate::versions::v47::JoinGame {
                    entity_id: 9,
                    gamemode: 0,
                    dimension: 0,
                    difficulty: 0,
                    max_players: 1,
                    level_type: "default".into(),
                    reduced_debug_info: false,
                }),
                9,
            )
            .unwrap();
        assert!(out.is_empty());
        assert!(!spawn);
        assert_eq!(t.avatar_entity_id(), 9);
    }

    #[test]
    fn player_on_ground_only_targets_spawned_peers() {
        let mut t = PlayerTransformer::new();
        let out = t
            .handle_serverbound(&Event::Player(Player { on_ground: true }))
            .unwrap();
        assert_eq!(out[0].target, BroadcastTarget::SpawnedAvatar);
    }
}
