//! Game-state mirror: applies a fixed subset of clientbound Play packets to
//! a local model of entities, the player list, teams and the owner's own
//! state, without ever becoming a general-purpose world model.
//!
//! Grounded on `original_source/gamestate/enums.py` for the Dimension/
//! Gamemode/Difficulty/equipment-slot/ability-flag vocabulary, and on the
//! wiki.vg packet tables already encoded in `versions::v47` for the mutation
//! rules themselves.

use std::collections::HashMap;

use crate::errors::TetsuResult;
use crate::event::{Dimension, PlayerInfoAction, PlayerListInfo, Slot};
use crate::eventbus::{EventBus, Payload};
use crate::versions::v47::{
    Event, MetadataValue, ScoreboardObjectiveAction, TeamAction, UpdateScoreAction,
};

/// Wire conversions for `event::Dimension`, grounded on
/// `original_source/gamestate/enums.py::Dimension` (NETHER=-1, OVERWORLD=0,
/// END=1).
impl Dimension {
    pub fn from_wire(v: i32) -> Self {
        match v {
            -1 => Self::Nether,
            1 => Self::End,
            _ => Self::Overworld,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Self::Nether => -1,
            Self::Overworld => 0,
            Self::End => 1,
        }
    }

    /// A dimension different from `self`, used by the spectator-join
    /// respawn ritual (§4.G step 1) to force a client-side world reset.
    pub fn other(self) -> Self {
        match self {
            Self::Overworld => Self::End,
            _ => Self::Overworld,
        }
    }
}

/// `PlayerAbilityFlags` bitset.
pub mod ability_flags {
    pub const INVULNERABLE: u8 = 0x01;
    pub const FLYING: u8 = 0x02;
    pub const ALLOW_FLYING: u8 = 0x04;
    pub const CREATIVE_MODE: u8 = 0x08;
}

/// `EntityFlags` bitset (the metadata-index-0 byte).
pub mod entity_flags {
    pub const ON_FIRE: u8 = 0x01;
    pub const CROUCHED: u8 = 0x02;
    pub const SPRINTING: u8 = 0x08;
    pub const EATING_DRINKING_BLOCKING: u8 = 0x10;
    pub const INVISIBLE: u8 = 0x20;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rotation {
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Equipment {
    pub held: Option<Slot>,
    pub boots: Option<Slot>,
    pub leggings: Option<Slot>,
    pub chestplate: Option<Slot>,
    pub helmet: Option<Slot>,
}

impl Equipment {
    fn slot_mut(&mut self, index: i16) -> Option<&mut Option<Slot>> {
        match index {
            0 => Some(&mut self.held),
            1 => Some(&mut self.boots),
            2 => Some(&mut self.leggings),
            3 => Some(&mut self.chestplate),
            4 => Some(&mut self.helmet),
            _ => None,
        }
    }
}

/// `original_source/gamestate/enums.py::Entity` — this crate's curated
/// subset of its fields (whatever `4.F` actually mutates).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub id: i32,
    pub entity_type: Option<i32>,
    pub uuid: Option<[u8; 16]>,
    pub pos: Vec3,
    pub rot: Rotation,
    pub velocity: (i16, i16, i16),
    pub on_ground: bool,
    pub metadata: HashMap<u8, MetadataValue>,
    pub equipment: Equipment,
    pub effects: std::collections::HashSet<i8>,
    pub vehicle: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Team {
    pub name: String,
    pub display_name: String,
    pub prefix: String,
    pub suffix: String,
    pub friendly_fire: i8,
    pub nametag_visibility: String,
    pub color: i8,
    pub members: std::collections::HashSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Objective {
    pub display_slot: Option<i8>,
    pub title: String,
    pub kind: String,
}

#[derive(Debug, Clone, Default)]
pub struct Scoreboard {
    /// objective name -> its display slot/title/render type
    pub objectives: HashMap<String, Objective>,
    /// (objective, entry) -> score
    pub scores: HashMap<(String, String), i32>,
}

/// `4.F`'s "self state": the owner's own player entity, distinct from the
/// generic `Entity` table since it tracks fields no other entity has
/// (inventory, held slot, abilities).
#[derive(Debug, Clone, Default)]
pub struct SelfState {
    pub entity_id: i32,
    pub uuid: Option<String>,
    pub username: Option<String>,
    pub pos: Vec3,
    pub rot: Rotation,
    pub dimension: Option<Dimension>,
    pub difficulty: u8,
    pub gamemode: u8,
    pub level_type: String,
    pub held_slot: u8,
    pub inventory: Vec<Slot>,
    pub flying_speed: f32,
    pub fov_modifier: f32,
    pub ability_flags: u8,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
            player_list: HashMap::new(),
            teams: HashMap::new(),
            scoreboard: Scoreboard::default(),
            me: SelfState {
                inventory: vec![Slot::EMPTY; 45],
                ..SelfState::default()
            },
        }
    }
}

/// The full mirror a session keeps of what the owner's client currently
/// believes about the world.
pub struct GameState {
    pub entities: HashMap<i32, Entity>,
    pub player_list: HashMap<[u8; 16], PlayerListInfo>,
    pub teams: HashMap<String, Team>,
    pub scoreboard: Scoreboard,
    pub me: SelfState,
}

fn apply_position_flags(current: Vec3, rot: Rotation, flags: i8, x: f64, y: f64, z: f64, yaw: f32, pitch: f32) -> (Vec3, Rotation) {
    let pos = Vec3 {
        x: if flags & 0x01 != 0 { current.x + x } else { x },
        y: if flags & 0x02 != 0 { current.y + y } else { y },
        z: if flags & 0x04 != 0 { current.z + z } else { z },
    };
    let new_rot = Rotation {
        yaw: if flags & 0x08 != 0 { rot.yaw + yaw } else { yaw },
        pitch: if flags & 0x10 != 0 { rot.pitch + pitch } else { pitch },
        head_yaw: rot.head_yaw,
    };
    (pos, new_rot)
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    fn entity_mut(&mut self, id: i32) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Applies one clientbound Play packet to the mirror, per `4.F`, then
    /// emits `cb_gamestate_update` on `bus` so downstream consumers (the
    /// broadcast transformer) can react without re-decoding the packet.
    pub fn apply_clientbound(&mut self, event: &Event, bus: &EventBus) -> TetsuResult<()> {
        match event {
            Event::JoinGame(p) => {
                self.me.entity_id = p.entity_id;
                self.me.gamemode = p.gamemode;
                self.me.dimension = Some(Dimension::from_wire(p.dimension as i32));
                self.me.difficulty = p.difficulty;
                self.me.level_type = p.level_type.clone();
                self.entities.clear();
                self.player_list.clear();
                self.teams.clear();
                self.scoreboard = Scoreboard::default();
            }
            Event::Respawn(p) => {
                self.me.dimension = Some(Dimension::from_wire(p.dimension));
                self.me.difficulty = p.difficulty;
                self.me.gamemode = p.gamemode;
                self.me.level_type = p.level_type.clone();
                self.entities.clear();
            }
            Event::PlayerPositionAndLookClientbound(p) => {
                let (pos, rot) = apply_position_flags(
                    self.me.pos,
                    self.me.rot,
                    p.flags,
                    p.x,
                    p.y,
                    p.z,
                    p.yaw,
                    p.pitch,
                );
                self.me.pos = pos;
                self.me.rot = rot;
            }
            Event::SpawnPlayer(p) => {
                let mut metadata = HashMap::new();
                for (idx, v) in &p.metadata.0 {
                    metadata.insert(*idx, v.clone());
                }
                let id: i32 = p.entity_id.into();
                self.entities.insert(
                    id,
                    Entity {
                        id,
                        entity_type: None,
                        uuid: Some(*p.player_uuid.as_bytes()),
                        pos: Vec3 {
                            x: p.x as f64 / 32.0,
                            y: p.y as f64 / 32.0,
                            z: p.z as f64 / 32.0,
                        },
                        rot: Rotation {
                            yaw: p.yaw.to_degrees(),
                            pitch: p.pitch.to_degrees(),
                            head_yaw: 0.0,
                        },
                        velocity: (0, 0, 0),
                        on_ground: true,
                        metadata,
                        equipment: Equipment::default(),
                        effects: std::collections::HashSet::new(),
                        vehicle: None,
                    },
                );
            }
            Event::DestroyEntities(p) => {
                for id in &p.entity_ids {
                    // an unknown id is a no-op, not a fatal error
                    self.entities.remove(id);
                }
            }
            Event::EntityRelativeMove(p) => {
                let id: i32 = p.entity_id.into();
                if let Some(e) = self.entity_mut(id) {
                    e.pos.x += p.delta_x as f64 / 32.0;
                    e.pos.y += p.delta_y as f64 / 32.0;
                    e.pos.z += p.delta_z as f64 / 32.0;
                    e.on_ground = p.on_ground;
                }
            }
            Event::EntityLookAndRelativeMove(p) => {
                let id: i32 = p.entity_id.into();
                if let Some(e) = self.entity_mut(id) {
                    e.pos.x += p.delta_x as f64 / 32.0;
                    e.pos.y += p.delta_y as f64 / 32.0;
                    e.pos.z += p.delta_z as f64 / 32.0;
                    e.rot.yaw = p.yaw.to_degrees();
                    e.rot.pitch = p.pitch.to_degrees();
                    e.on_ground = p.on_ground;
                }
            }
            Event::EntityTeleport(p) => {
                let id: i32 = p.entity_id.into();
                if let Some(e) = self.entity_mut(id) {
                    e.pos.x = p.x as f64 / 32.0;
                    e.pos.y = p.y as f64 / 32.0;
                    e.pos.z = p.z as f64 / 32.0;
                    e.rot.yaw = p.yaw.to_degrees();
                    e.rot.pitch = p.pitch.to_degrees();
                    e.on_ground = p.on_ground;
                }
            }
            Event::EntityHeadLook(p) => {
                let id: i32 = p.entity_id.into();
                if let Some(e) = self.entity_mut(id) {
                    e.rot.head_yaw = p.head_yaw.to_degrees();
                }
            }
            Event::EntityMetadata(p) => {
                let id: i32 = p.entity_id.into();
                if let Some(e) = self.entity_mut(id) {
                    for (idx, v) in &p.metadata.0 {
                        e.metadata.insert(*idx, v.clone());
                    }
                }
                // an unknown entity silently drops the update
            }
            Event::EntityVelocity(p) => {
                if let Some(e) = self.entity_mut(p.entity_id) {
                    e.velocity = (p.velocity_x, p.velocity_y, p.velocity_z);
                }
            }
            Event::AttachEntity(p) => {
                if let Some(e) = self.entity_mut(p.entity_id) {
                    e.vehicle = if p.vehicle_id == -1 { None } else { Some(p.vehicle_id) };
                }
            }
            Event::EntityEffect(p) => {
                let id: i32 = p.entity_id.into();
                if let Some(e) = self.entity_mut(id) {
                    e.effects.insert(p.effect_id);
                }
            }
            Event::RemoveEntityEffect(p) => {
                let id: i32 = p.entity_id.into();
                if let Some(e) = self.entity_mut(id) {
                    e.effects.remove(&p.effect_id);
                }
            }
            Event::EntityEquipment(p) => {
                let id = p.entity_id;
                if let Some(e) = self.entity_mut(id) {
                    if let Some(dest) = e.equipment.slot_mut(p.slot) {
                        *dest = Some(p.item.clone());
                    }
                }
            }
            Event::PlayerListItem(p) => {
                for entry in &p.entries {
                    let key = *entry.uuid.as_bytes();
                    match &entry.action {
                        PlayerInfoAction::Remove => {
                            self.player_list.remove(&key);
                        }
                        _ => {
                            self.player_list
                                .entry(key)
                                .and_modify(|existing| apply_player_list_action(existing, &entry.action))
                                .or_insert_with(|| entry.clone());
                        }
                    }
                }
            }
            Event::Teams(p) => match &p.action {
                TeamAction::Create {
                    display_name,
                    prefix,
                    suffix,
                    friendly_fire,
                    nametag_visibility,
                    color,
                    players,
                } => {
                    self.teams.insert(
                        p.name.clone(),
                        Team {
                            name: p.name.clone(),
                            display_name: display_name.clone(),
                            prefix: prefix.clone(),
                            suffix: suffix.clone(),
                            friendly_fire: *friendly_fire,
                            nametag_visibility: nametag_visibility.clone(),
                            color: *color,
                            members: players.iter().cloned().collect(),
                        },
                    );
                }
                TeamAction::Remove => {
                    self.teams.remove(&p.name);
                }
                TeamAction::UpdateInfo {
                    display_name,
                    prefix,
                    suffix,
                    friendly_fire,
                    nametag_visibility,
                    color,
                } => {
                    if let Some(t) = self.teams.get_mut(&p.name) {
                        t.display_name = display_name.clone();
                        t.prefix = prefix.clone();
                        t.suffix = suffix.clone();
                        t.friendly_fire = *friendly_fire;
                        t.nametag_visibility = nametag_visibility.clone();
                        t.color = *color;
                    }
                }
                TeamAction::AddPlayers { players } => {
                    if let Some(t) = self.teams.get_mut(&p.name) {
                        t.members.extend(players.iter().cloned());
                    }
                }
                TeamAction::RemovePlayers { players } => {
                    if let Some(t) = self.teams.get_mut(&p.name) {
                        for player in players {
                            t.members.remove(player);
                        }
                    }
                }
            },
            Event::SetSlot(p) => {
                if p.window_id == 0 && p.slot >= 0 {
                    let idx = p.slot as usize;
                    if idx < self.me.inventory.len() {
                        self.me.inventory[idx] = p.slot_data.clone();
                    }
                }
            }
            Event::PlayerAbility(p) => {
                self.me.ability_flags = p.flags as u8;
                self.me.flying_speed = p.flying_speed;
                self.me.fov_modifier = p.walking_speed;
            }
            Event::ScoreboardObjective(p) => match &p.action {
                ScoreboardObjectiveAction::Create { value, kind } => {
                    let display_slot = self
                        .scoreboard
                        .objectives
                        .get(&p.name)
                        .and_then(|o| o.display_slot);
                    self.scoreboard.objectives.insert(
                        p.name.clone(),
                        Objective {
                            display_slot,
                            title: value.clone(),
                            kind: kind.clone(),
                        },
                    );
                }
                ScoreboardObjectiveAction::Update { value, kind } => {
                    if let Some(o) = self.scoreboard.objectives.get_mut(&p.name) {
                        o.title = value.clone();
                        o.kind = kind.clone();
                    }
                }
                ScoreboardObjectiveAction::Remove => {
                    self.scoreboard.objectives.remove(&p.name);
                    self.scoreboard.scores.retain(|(obj, _), _| obj != &p.name);
                }
            },
            Event::UpdateScore(p) => match &p.action {
                UpdateScoreAction::CreateOrUpdate { objective_name, value } => {
                    self.scoreboard
                        .scores
                        .insert((objective_name.clone(), p.entry_name.clone()), *value);
                }
                UpdateScoreAction::Remove { objective_name } => {
                    self.scoreboard
                        .scores
                        .remove(&(objective_name.clone(), p.entry_name.clone()));
                }
            },
            Event::DisplayScoreboard(p) => {
                for o in self.scoreboard.objectives.values_mut() {
                    if o.display_slot == Some(p.position) {
                        o.display_slot = None;
                    }
                }
                if let Some(o) = self.scoreboard.objectives.get_mut(&p.score_name) {
                    o.display_slot = Some(p.position);
                }
            }
            _ => {}
        }

        bus.emit("cb_gamestate_update", std::sync::Arc::new(()) as Payload);
        Ok(())
    }

    /// Mirrors the serverbound held-item-change so `me.held_slot` tracks
    /// what the client last selected, independent of any inventory ack.
    pub fn apply_serverbound(&mut self, event: &Event) {
        if let Event::HeldItemChangeServerbound(p) = event {
            self.me.held_slot = p.slot.max(0) as u8;
        }
    }
}

fn apply_player_list_action(existing: &mut PlayerListInfo, action: &PlayerInfoAction) {
    match action {
        PlayerInfoAction::GamemodeUpdate { gamemode } => {
            if let PlayerInfoAction::Add(add) = &mut existing.action {
                add.gamemode = *gamemode;
            }
        }
        PlayerInfoAction::LatencyUpdate { ping } => {
            if let PlayerInfoAction::Add(add) = &mut existing.action {
                add.ping = *ping;
            }
        }
        PlayerInfoAction::DisplayNameUpdate { display } => {
            if let PlayerInfoAction::Add(add) = &mut existing.action {
                add.display = display.clone();
            }
        }
        PlayerInfoAction::Add(_) | PlayerInfoAction::Remove => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versions::v47::{DestroyEntities, JoinGame, Respawn};

    fn bus() -> EventBus {
        EventBus::new()
    }

    #[test]
    fn join_game_resets_entities_and_player_list() {
        let mut gs = GameState::new();
        gs.entities.insert(5, Entity::default());
        gs.apply_clientbound(
            &Event::JoinGame(JoinGame {
                entity_id: 99,
                gamemode: 0,
                dimension: 0,
                difficulty: 1,
                max_players: 20,
                level_type: "default".into(),
                reduced_debug_info: false,
            }),
            &bus(),
        )
        .unwrap();
        assert!(gs.entities.is_empty());
        assert_eq!(gs.me.entity_id, 99);
    }

    #[test]
    fn destroy_entities_ignores_unknown_id() {
        let mut gs = GameState::new();
        gs.entities.insert(1, Entity {
            id: 1,
            ..Entity::default()
        });
        gs.apply_clientbound(
            &Event::DestroyEntities(DestroyEntities {
                entity_ids: vec![1, 404],
            }),
            &bus(),
        )
        .unwrap();
        assert!(gs.entities.is_empty());
    }

    #[test]
    fn respawn_keeps_player_list_but_clears_entities() {
        let mut gs = GameState::new();
        gs.entities.insert(1, Entity::default());
        gs.player_list.insert([0; 16], PlayerListInfo {
            uuid: crate::versions::common::Uuid::from_u128(0),
            action: PlayerInfoAction::Remove,
        });
        gs.apply_clientbound(
            &Event::Respawn(Respawn {
                dimension: 1,
                difficulty: 2,
                gamemode: 0,
                level_type: "default".into(),
            }),
            &bus(),
        )
        .unwrap();
        assert!(gs.entities.is_empty());
        assert_eq!(gs.player_list.len(), 1);
        assert_eq!(gs.me.dimension, Some(Dimension::End));
    }

    #[test]
    fn scoreboard_objective_update_score_and_display_round_trip() {
        use crate::versions::v47::{DisplayScoreboard, ScoreboardObjective, UpdateScore};

        let mut gs = GameState::new();
        gs.apply_clientbound(
            &Event::ScoreboardObjective(ScoreboardObjective {
                name: "kills".into(),
                action: ScoreboardObjectiveAction::Create {
                    value: "Kills".into(),
                    kind: "integer".into(),
                },
            }),
            &bus(),
        )
        .unwrap();
        gs.apply_clientbound(
            &Event::UpdateScore(UpdateScore {
                entry_name: "Notch".into(),
                action: UpdateScoreAction::CreateOrUpdate {
                    objective_name: "kills".into(),
                    value: 7,
                },
            }),
            &bus(),
        )
        .unwrap();
        gs.apply_clientbound(
            &Event::DisplayScoreboard(DisplayScoreboard {
                position: 1,
                score_name: "kills".into(),
            }),
            &bus(),
        )
        .unwrap();

        assert_eq!(
            gs.scoreboard.scores.get(&("kills".to_owned(), "Notch".to_owned())),
            Some(&7)
        );
        assert_eq!(
            gs.scoreboard.objectives.get("kills").unwrap().display_slot,
            Some(1)
        );

        gs.apply_clientbound(
            &Event::ScoreboardObjective(ScoreboardObjective {
                name: "kills".into(),
                action: ScoreboardObjectiveAction::Remove,
            }),
            &bus(),
        )
        .unwrap();
        assert!(gs.scoreboard.objectives.is_empty());
        assert!(gs.scoreboard.scores.is_empty());
    }

    #[test]
    fn position_flags_mix_relative_and_absolute_axes() {
        let current = Vec3 { x: 10.0, y: 5.0, z: -3.0 };
        let rot = Rotation { yaw: 90.0, pitch: 0.0, head_yaw: 0.0 };
        // flags: X relative (0x01), Y absolute, Z relative (0x04), yaw absolute, pitch relative (0x10)
        let (pos, new_rot) = apply_position_flags(current, rot, 0x01 | 0x04 | 0x10, 1.0, 64.0, 2.0, 180.0, 5.0);
        assert_eq!(pos, Vec3 { x: 11.0, y: 64.0, z: -1.0 });
        assert_eq!(new_rot.yaw, 180.0);
        assert_eq!(new_rot.pitch, 5.0);
    }
}
