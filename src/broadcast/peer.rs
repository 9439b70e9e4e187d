//! The spectator-join respawn ritual: the packet sequence a peer's client
//! needs, in order, to go from a bare login to watching the owner's live
//! session, without a real backing server of its own.
//!
//! Grounded on `original_source/broadcasting/plugins/login.py`'s
//! `BroadcastPeerLoginPlugin.packet_login_start` and
//! `original_source/plugins/broadcaster.py`'s `_spawn_player_for_client`.
//! The periodic armor-stand cosmetic refresh loop is dropped (see
//! DESIGN.md) — it re-sends spawn packets for a decorative entity type
//! purely to paper over client-side skin-load timing, orthogonal to
//! spectating the owner.

use crate::broadcast::transformer::PlayerTransformer;
use crate::errors::TetsuResult;
use crate::event::{
    Chat, Dimension, Gamemode, PlayerInfoAction, PlayerInfoAdd, PlayerListInfo,
};
use crate::gamestate::{ability_flags, GameState};
use crate::versions::common::{Angle, Uuid};
use crate::versions::v47::{
    DisplayScoreboard, EntityEquipment, EntityHeadLook, EntityMetadataEntries,
    EntityMetadataPacket, Event, JoinGame, MetadataValue, PlayerAbility, PlayerListItem,
    PlayerPositionAndLookClientbound, Respawn, ScoreboardObjective, ScoreboardObjectiveAction,
    SpawnPlayer, TeamAction, Teams, UpdateScore, UpdateScoreAction,
};

/// `original_source/broadcasting/plugins/login.py`'s compression threshold,
/// hardcoded to 256; kept as a named constant since `proxy.rs` needs the
/// same number both to build the Set Compression signal and to flip its
/// own stream's compression state once the peer has acknowledged it.
pub const SPECTATOR_COMPRESSION_THRESHOLD: i32 = 256;

/// Max players advertised on the spectator-facing status response.
pub const SPECTATOR_MAX_PLAYERS: i32 = 10;

/// Synthetic entity id every peer's own client is told it occupies. Fixed
/// rather than derived from the owner's avatar id (`PlayerTransformer::
/// avatar_entity_id`) — a 1.8.9 client rejects a `SpawnPlayer` whose id
/// equals its own, so the two must never collide.
pub const PEER_ENTITY_ID: i32 = 12_345;

/// Vanilla defaults used when the owner's own abilities packet hasn't
/// arrived yet (fresh session, no 0x39 observed from upstream).
const DEFAULT_FLYING_SPEED: f32 = 0.05;
const DEFAULT_FOV_MODIFIER: f32 = 1.0;

/// Steps 1-4 of the join ritual, sent uncompressed: bounce the peer's
/// client through a different dimension so it discards any prior world
/// state, hand it a `JoinGame` for a fake dimension, respawn it back into
/// the owner's real one, sync position, then configure flight abilities.
pub fn pre_compression_sequence(gamestate: &GameState, peer_entity_id: i32) -> Vec<Event> {
    let dimension = gamestate.me.dimension.unwrap_or(Dimension::Overworld);
    let fake = dimension.other();

    let flying_speed = if gamestate.me.flying_speed != 0.0 {
        gamestate.me.flying_speed
    } else {
        DEFAULT_FLYING_SPEED
    };
    let fov_modifier = if gamestate.me.fov_modifier != 0.0 {
        gamestate.me.fov_modifier
    } else {
        DEFAULT_FOV_MODIFIER
    };

    vec![
        Event::Respawn(Respawn {
            dimension: fake.to_wire(),
            difficulty: gamestate.me.difficulty,
            gamemode: Gamemode::Adventure as u8,
            level_type: gamestate.me.level_type.clone(),
        }),
        Event::JoinGame(JoinGame {
            entity_id: peer_entity_id,
            gamemode: Gamemode::Adventure as u8,
            dimension: fake.to_wire() as i8,
            difficulty: gamestate.me.difficulty,
            max_players: SPECTATOR_MAX_PLAYERS as u8,
            level_type: gamestate.me.level_type.clone(),
            reduced_debug_info: false,
        }),
        Event::Respawn(Respawn {
            dimension: dimension.to_wire(),
            difficulty: gamestate.me.difficulty,
            gamemode: Gamemode::Adventure as u8,
            level_type: gamestate.me.level_type.clone(),
        }),
        Event::PlayerPositionAndLookClientbound(PlayerPositionAndLookClientbound {
            x: gamestate.me.pos.x,
            y: gamestate.me.pos.y,
            z: gamestate.me.pos.z,
            yaw: gamestate.me.rot.yaw,
            pitch: gamestate.me.rot.pitch,
            flags: 0,
        }),
        Event::PlayerAbility(PlayerAbility {
            flags: (ability_flags::INVULNERABLE | ability_flags::ALLOW_FLYING) as i8,
            flying_speed,
            walking_speed: fov_modifier,
        }),
    ]
}

/// Looks the owner's player-list properties (skin textures) up from the
/// mirror, for the `PlayerListItem` sent right before the avatar spawn —
/// without it a 1.8.9 client renders the owner's avatar with the default
/// Steve/Alex skin instead of their real one.
fn owner_properties(gamestate: &GameState, owner_uuid: Uuid) -> Vec<crate::event::PlayerProperty> {
    gamestate
        .player_list
        .get(owner_uuid.as_bytes())
        .and_then(|info| match &info.action {
            PlayerInfoAction::Add(add) => Some(add.properties.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Steps 5-7, sent once the peer's side of the connection has switched to
/// compressed framing (the caller gates this on the peer's Set Compression
/// acknowledgement): replay the tab list, teams, scoreboard and every
/// tracked entity so the peer's client has the same world the owner does,
/// then spawn the owner's avatar.
pub fn post_compression_sequence(
    gamestate: &GameState,
    transformer: &mut PlayerTransformer,
    owner_uuid: Uuid,
    peer_uuid: Uuid,
    peer_username: &str,
) -> TetsuResult<Vec<Event>> {
    let mut out = Vec::new();

    for info in gamestate.player_list.values() {
        out.push(Event::PlayerListItem(PlayerListItem {
            entries: vec![info.clone()],
        }));
    }

    for team in gamestate.teams.values() {
        out.push(Event::Teams(Teams {
            name: team.name.clone(),
            action: TeamAction::Create {
                display_name: team.display_name.clone(),
                prefix: team.prefix.clone(),
                suffix: team.suffix.clone(),
                friendly_fire: team.friendly_fire,
                nametag_visibility: team.nametag_visibility.clone(),
                color: team.color,
                players: team.members.iter().cloned().collect(),
            },
        }));
    }

    for (name, objective) in &gamestate.scoreboard.objectives {
        out.push(Event::ScoreboardObjective(ScoreboardObjective {
            name: name.clone(),
            action: ScoreboardObjectiveAction::Create {
                value: objective.title.clone(),
                kind: objective.kind.clone(),
            },
        }));
        if let Some(position) = objective.display_slot {
            out.push(Event::DisplayScoreboard(DisplayScoreboard {
                position,
                score_name: name.clone(),
            }));
        }
    }
    for ((objective_name, entry_name), value) in &gamestate.scoreboard.scores {
        out.push(Event::UpdateScore(UpdateScore {
            entry_name: entry_name.clone(),
            action: UpdateScoreAction::CreateOrUpdate {
                objective_name: objective_name.clone(),
                value: *value,
            },
        }));
    }

    // Every entity the mirror tracks was itself registered from a
    // `SpawnPlayer` (§4.F's 0x0C handler is the only insert site), so
    // replaying them as `SpawnPlayer` is faithful rather than a guess at a
    // type-specific spawn packet the mirror never kept the fields for.
    for entity in gamestate.entities.values() {
        let uuid = match entity.uuid {
            Some(bytes) => Uuid::from_bytes(bytes),
            None => continue,
        };
        out.push(Event::SpawnPlayer(SpawnPlayer {
            entity_id: entity.id.into(),
            player_uuid: uuid,
            x: (entity.pos.x * 32.0) as i32,
            y: (entity.pos.y * 32.0) as i32,
            z: (entity.pos.z * 32.0) as i32,
            yaw: Angle::from_degrees(entity.rot.yaw),
            pitch: Angle::from_degrees(entity.rot.pitch),
            current_item: 0,
            metadata: EntityMetadataEntries(entity.metadata.iter().map(|(k, v)| (*k, v.clone())).collect()),
        }));
    }

    out.push(Event::PlayerListItem(PlayerListItem {
        entries: vec![PlayerListInfo {
            uuid: peer_uuid,
            action: PlayerInfoAction::Add(PlayerInfoAdd {
                name: peer_username.to_owned(),
                properties: Vec::new(),
                gamemode: Gamemode::Adventure as i32,
                ping: 0,
                display: Some(Chat::text(format!("[BROADCAST] {}", peer_username))),
            }),
        }],
    }));

    let avatar_eid = transformer.avatar_entity_id();
    let metadata_flags = transformer.metadata_flags();

    out.push(Event::PlayerListItem(PlayerListItem {
        entries: vec![PlayerListInfo {
            uuid: owner_uuid,
            action: PlayerInfoAction::Add(PlayerInfoAdd {
                name: gamestate.me.username.clone().unwrap_or_default(),
                properties: owner_properties(gamestate, owner_uuid),
                gamemode: gamestate.me.gamemode as i32,
                ping: 0,
                display: None,
            }),
        }],
    }));

    out.push(Event::SpawnPlayer(SpawnPlayer {
        entity_id: avatar_eid.into(),
        player_uuid: owner_uuid,
        x: (gamestate.me.pos.x * 32.0) as i32,
        y: (gamestate.me.pos.y * 32.0) as i32,
        z: (gamestate.me.pos.z * 32.0) as i32,
        yaw: Angle::from_degrees(gamestate.me.rot.yaw),
        pitch: Angle::from_degrees(gamestate.me.rot.pitch),
        current_item: 0,
        metadata: EntityMetadataEntries(vec![(0, MetadataValue::Byte(metadata_flags as i8))]),
    }));

    out.push(Event::EntityMetadata(EntityMetadataPacket {
        entity_id: avatar_eid.into(),
        metadata: EntityMetadataEntries(vec![(0, MetadataValue::Byte(metadata_flags as i8))]),
    }));

    out.push(Event::EntityHeadLook(EntityHeadLook {
        entity_id: avatar_eid.into(),
        head_yaw: Angle::from_degrees(gamestate.me.rot.yaw),
    }));

    for (slot, item) in transformer.equipment_slots() {
        out.push(Event::EntityEquipment(EntityEquipment {
            entity_id: avatar_eid,
            slot,
            item,
        }));
    }

    transformer.mark_spawned();

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Dimension;

    #[test]
    fn pre_compression_sequence_bounces_to_a_different_dimension_then_back() {
        let mut gs = GameState::new();
        gs.me.dimension = Some(Dimension::Overworld);
        gs.me.level_type = "default".into();
        let seq = pre_compression_sequence(&gs, PEER_ENTITY_ID);
        assert_eq!(seq.len(), 5);
        match (&seq[0], &seq[2]) {
            (Event::Respawn(fake), Event::Respawn(real)) => {
                assert_ne!(fake.dimension, real.dimension);
                assert_eq!(real.dimension, Dimension::Overworld.to_wire());
            }
            _ => panic!("expected Respawn, Respawn"),
        }
        match &seq[1] {
            Event::JoinGame(j) => assert_eq!(j.entity_id, PEER_ENTITY_ID),
            _ => panic!("expected JoinGame"),
        }
        assert!(matches!(seq[4], Event::PlayerAbility(_)));
    }

    #[test]
    fn peer_entity_id_never_collides_with_owner_avatar_id() {
        let mut gs = GameState::new();
        gs.me.dimension = Some(Dimension::Overworld);
        let mut transformer = PlayerTransformer::new();
        transformer.init_from_gamestate(&gs);
        // a real server could assign the owner any entity id, including
        // one a careless implementation might also pick for the peer.
        assert_ne!(PEER_ENTITY_ID, transformer.avatar_entity_id());
    }

    #[test]
    fn post_compression_sequence_marks_transformer_spawned_and_spawns_avatar() {
        let gs = GameState::new();
        let mut transformer = PlayerTransformer::new();
        assert!(!transformer.is_spawned());
        let owner = Uuid::from_u128(1);
        let peer = Uuid::from_u128(2);
        let seq =
            post_compression_sequence(&gs, &mut transformer, owner, peer, "watcher").unwrap();
        assert!(seq.iter().any(|e| matches!(e, Event::SpawnPlayer(_))));
        assert!(seq.iter().any(|e| matches!(e, Event::EntityMetadata(_))));
        assert!(seq.iter().any(|e| matches!(e, Event::EntityHeadLook(_))));
        assert_eq!(
            seq.iter().filter(|e| matches!(e, Event::EntityEquipment(_))).count(),
            5
        );
        assert!(transformer.is_spawned());
    }

    #[test]
    fn post_compression_sequence_replays_tracked_entities() {
        use crate::gamestate::Entity;

        let mut gs = GameState::new();
        gs.entities.insert(
            99,
            Entity {
                id: 99,
                uuid: Some(*Uuid::from_u128(42).as_bytes()),
                ..Entity::default()
            },
        );
        let mut transformer = PlayerTransformer::new();
        let seq = post_compression_sequence(
            &gs,
            &mut transformer,
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            "watcher",
        )
        .unwrap();
        let spawned_other = seq.iter().any(|e| matches!(e, Event::SpawnPlayer(p) if i32::from(p.entity_id) == 99));
        assert!(spawned_other);
    }
}
