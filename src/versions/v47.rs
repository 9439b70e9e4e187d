//! Wire definitions for protocol 47 (Minecraft 1.8.9).
//!
//! Only the packets the core proxy actually inspects are modelled as typed
//! structs; everything else crosses the wire as [`Event::Raw`] so a packet
//! this crate has no handler for is still framed, (de)compressed and
//! (de)crypted correctly without ever failing to decode.

use std::io::{self, prelude::*};

use crate::errors::*;
use crate::event::*;
use crate::serialization::*;
use crate::versions::common::*;

// ---------------------------------------------------------------------
// Position: packed wire form of `event::Position`.
//
// 64 bits: X occupies the top 26, Y the middle 12, Z the bottom 26. The
// teacher's version sign-extended Z with an arithmetic shift but used a
// threshold-subtraction for X and Y, which misreads any coordinate at or
// past the sign boundary. All three axes use the same arithmetic-shift
// technique here.
// ---------------------------------------------------------------------

impl Readable for Position {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        let packed = UnsignedLong::read_from(buf)? as i64;
        let x = packed >> 38;
        let y = (packed << 26) >> 52;
        let z = (packed << 38) >> 38;
        Ok(Self { x, y, z })
    }
}

impl Writable for Position {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        let packed = ((self.x & 0x3FF_FFFF) << 38) as u64
            | ((self.y & 0xFFF) << 26) as u64
            | (self.z & 0x3FF_FFFF) as u64;
        (packed as UnsignedLong).write_to(buf)
    }
}

// ---------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------

impl Readable for Slot {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        let item_id = Short::read_from(buf)?;
        if item_id == -1 {
            return Ok(Slot::EMPTY);
        }
        let item_count = Byte::read_from(buf)?;
        let damage = Short::read_from(buf)?;
        let tag = Byte::read_from(buf)? as u8;
        let nbt = if tag == 0x00 {
            None
        } else {
            let mut chained = io::Cursor::new(vec![tag]).chain(buf);
            Some(NbtBlob::from_reader(&mut chained)?)
        };
        Ok(Self {
            item_id: Some(item_id as i32),
            item_count,
            damage: Some(damage),
            nbt,
        })
    }
}

impl Writable for Slot {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        match self.item_id {
            None => (-1i16).write_to(buf),
            Some(item_id) => {
                (item_id as i16).write_to(buf)?;
                self.item_count.write_to(buf)?;
                self.damage.unwrap_or(0).write_to(buf)?;
                match &self.nbt {
                    None => 0u8.write_to(buf),
                    Some(nbt) => nbt.write_to(buf),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// Entity metadata
//
// A run of `(type:3 bits | index:5 bits)` header bytes followed by a
// type-shaped value, terminated by the sentinel byte 0x7F (type 3, index
// 31, never used for a real entry). Decoding each value by its declared
// type instead of scanning for 0x7F byte-by-byte is what keeps a stray
// data byte from being mistaken for the terminator.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Float(f32),
    String(String),
    Slot(Slot),
    Position(i32, i32, i32),
    Rotation(f32, f32, f32),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityMetadataEntries(pub Vec<(u8, MetadataValue)>);

impl Readable for EntityMetadataEntries {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        let mut entries = Vec::new();
        loop {
            let header = buf.read_u8()?;
            if header == 0x7F {
                break;
            }
            let kind = (header & 0xE0) >> 5;
            let index = header & 0x1F;
            let value = match kind {
                0 => MetadataValue::Byte(Byte::read_from(buf)?),
                1 => MetadataValue::Short(Short::read_from(buf)?),
                2 => MetadataValue::Int(Int::read_from(buf)?),
                3 => MetadataValue::Float(Float::read_from(buf)?),
                4 => MetadataValue::String(String::read_from(buf)?),
                5 => MetadataValue::Slot(Slot::read_from(buf)?),
                6 => MetadataValue::Position(
                    Int::read_from(buf)?,
                    Int::read_from(buf)?,
                    Int::read_from(buf)?,
                ),
                7 => MetadataValue::Rotation(
                    Float::read_from(buf)?,
                    Float::read_from(buf)?,
                    Float::read_from(buf)?,
                ),
                other => {
                    return Err(Error::WireMalformed(format!(
                        "unknown entity metadata type {}",
                        other
                    )))
                }
            };
            entries.push((index, value));
        }
        Ok(Self(entries))
    }
}

impl Writable for EntityMetadataEntries {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        for (index, value) in &self.0 {
            let kind: u8 = match value {
                MetadataValue::Byte(_) => 0,
                MetadataValue::Short(_) => 1,
                MetadataValue::Int(_) => 2,
                MetadataValue::Float(_) => 3,
                MetadataValue::String(_) => 4,
                MetadataValue::Slot(_) => 5,
                MetadataValue::Position(..) => 6,
                MetadataValue::Rotation(..) => 7,
            };
            buf.write_u8((kind << 5) | (index & 0x1F))?;
            match value {
                MetadataValue::Byte(v) => v.write_to(buf)?,
                MetadataValue::Short(v) => v.write_to(buf)?,
                MetadataValue::Int(v) => v.write_to(buf)?,
                MetadataValue::Float(v) => v.write_to(buf)?,
                MetadataValue::String(v) => v.write_to(buf)?,
                MetadataValue::Slot(v) => v.write_to(buf)?,
                MetadataValue::Position(x, y, z) => {
                    x.write_to(buf)?;
                    y.write_to(buf)?;
                    z.write_to(buf)?;
                }
                MetadataValue::Rotation(x, y, z) => {
                    x.write_to(buf)?;
                    y.write_to(buf)?;
                    z.write_to(buf)?;
                }
            }
        }
        buf.write_u8(0x7F)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Statistics (0x37 CB)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticEntry {
    pub name: String,
    pub value: VarInt,
}

impl Readable for StatisticEntry {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        Ok(Self {
            name: String::read_from(buf)?,
            value: VarInt::read_from(buf)?,
        })
    }
}

impl Writable for StatisticEntry {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        self.name.write_to(buf)?;
        self.value.write_to(buf)
    }
}

// ---------------------------------------------------------------------
// Flat packets
// ---------------------------------------------------------------------

packet! {
    (0x00) ServerBound Handshake Handshake {
        protocol_version: VarInt,
        server_address: String,
        server_port: UnsignedShort,
        next_state: VarInt,
    }

    (0x00) ServerBound Status StatusRequest {}

    (0x00) ClientBound Status StatusResponse {
        response: String,
    }

    (0x01) ServerBound Status StatusPing {
        payload: Long,
    }

    (0x01) ClientBound Status StatusPong {
        payload: Long,
    }

    (0x00) ServerBound Login LoginStart {
        name: String,
    }

    (0x00) ClientBound Login Disconnect {
        reason: Chat,
    }

    (0x01) ClientBound Login EncryptionRequest {
        server_id: String,
        public_key: ByteArrayVarInt,
        verify_token: ByteArrayVarInt,
    }

    (0x01) ServerBound Login EncryptionResponse {
        shared_secret: ByteArrayVarInt,
        verify_token: ByteArrayVarInt,
    }

    (0x02) ClientBound Login LoginSuccess {
        uuid: String,
        name: String,
    }

    (0x03) ClientBound Login SetCompression {
        threshold: VarInt,
    }

    (0x01) ClientBound Play JoinGame {
        entity_id: Int,
        gamemode: UnsignedByte,
        dimension: Byte,
        difficulty: UnsignedByte,
        max_players: UnsignedByte,
        level_type: String,
        reduced_debug_info: Bool,
    }

    (0x04) ClientBound Play EntityEquipment {
        entity_id: Int,
        slot: Short,
        item: Slot,
    }

    (0x05) ClientBound Play SpawnPosition {
        location: Position,
    }

    (0x07) ClientBound Play Respawn {
        dimension: Int,
        difficulty: UnsignedByte,
        gamemode: UnsignedByte,
        level_type: String,
    }

    (0x08) ClientBound Play PlayerPositionAndLookClientbound {
        x: Double,
        y: Double,
        z: Double,
        yaw: Float,
        pitch: Float,
        flags: Byte,
    }

    (0x09) ClientBound Play HeldItemChangeClientbound {
        slot: Byte,
    }

    (0x0C) ClientBound Play SpawnPlayer {
        entity_id: VarInt,
        player_uuid: Uuid,
        x: Int,
        y: Int,
        z: Int,
        yaw: Angle,
        pitch: Angle,
        current_item: Short,
        metadata: EntityMetadataEntries,
    }

    (0x12) ClientBound Play EntityVelocity {
        entity_id: Int,
        velocity_x: Short,
        velocity_y: Short,
        velocity_z: Short,
    }

    (0x15) ClientBound Play EntityRelativeMove {
        entity_id: VarInt,
        delta_x: Byte,
        delta_y: Byte,
        delta_z: Byte,
        on_ground: Bool,
    }

    (0x16) ClientBound Play EntityLook {
        entity_id: VarInt,
        yaw: Angle,
        pitch: Angle,
        on_ground: Bool,
    }

    (0x17) ClientBound Play EntityLookAndRelativeMove {
        entity_id: VarInt,
        delta_x: Byte,
        delta_y: Byte,
        delta_z: Byte,
        yaw: Angle,
        pitch: Angle,
        on_ground: Bool,
    }

    (0x18) ClientBound Play EntityTeleport {
        entity_id: VarInt,
        x: Int,
        y: Int,
        z: Int,
        yaw: Angle,
        pitch: Angle,
        on_ground: Bool,
    }

    (0x19) ClientBound Play EntityHeadLook {
        entity_id: VarInt,
        head_yaw: Angle,
    }

    (0x1B) ClientBound Play AttachEntity {
        entity_id: Int,
        vehicle_id: Int,
        leash: Bool,
    }

    (0x1D) ClientBound Play EntityEffect {
        entity_id: VarInt,
        effect_id: Byte,
        amplifier: Byte,
        duration: VarInt,
        hide_particles: Bool,
    }

    (0x1E) ClientBound Play RemoveEntityEffect {
        entity_id: VarInt,
        effect_id: Byte,
    }

    (0x2F) ClientBound Play SetSlot {
        window_id: Byte,
        slot: Short,
        slot_data: Slot,
    }

    (0x37) ClientBound Play Statistics {
        entries: GenericArray<VarInt, StatisticEntry>,
    }

    (0x39) ClientBound Play PlayerAbility {
        flags: Byte,
        flying_speed: Float,
        walking_speed: Float,
    }

    (0x3F) ClientBound Play PluginMessage {
        channel: String,
        data: Vec<u8>,
    }

    (0x40) ClientBound Play PlayDisconnect {
        reason: Chat,
    }

    (0x41) ClientBound Play ServerDifficultyUpdate {
        difficulty: UnsignedByte,
    }

    (0x46) ClientBound Play PlaySetCompression {
        threshold: VarInt,
    }

    (0x03) ServerBound Play Player {
        on_ground: Bool,
    }

    (0x04) ServerBound Play PlayerPosition {
        x: Double,
        y: Double,
        z: Double,
        on_ground: Bool,
    }

    (0x05) ServerBound Play PlayerLook {
        yaw: Float,
        pitch: Float,
        on_ground: Bool,
    }

    (0x06) ServerBound Play PlayerPositionAndLookServerbound {
        x: Double,
        y: Double,
        z: Double,
        yaw: Float,
        pitch: Float,
        on_ground: Bool,
    }

    (0x09) ServerBound Play HeldItemChangeServerbound {
        slot: Short,
    }

    (0x0A) ServerBound Play Animation {}

    (0x0B) ServerBound Play EntityAction {
        entity_id: VarInt,
        action_id: VarInt,
        jump_boost: VarInt,
    }
}

// ---------------------------------------------------------------------
// DestroyEntities (0x13 CB): a bare VarInt-prefixed array of entity ids.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DestroyEntities {
    pub entity_ids: Vec<i32>,
}

impl Packet for DestroyEntities {
    const ID: i32 = 0x13;
    const DIRECTION: EventDirection = EventDirection::ClientBound;
    const STATE: EventState = EventState::Play;
}

impl Readable for DestroyEntities {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        let raw: GenericArray<VarInt, VarInt> = GenericArray::read_from(buf)?;
        let ids: Vec<i32> = Vec::from(raw).into_iter().map(|v| v.0).collect();
        Ok(Self { entity_ids: ids })
    }
}

impl Writable for DestroyEntities {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        let raw: GenericArray<VarInt, VarInt> = self
            .entity_ids
            .iter()
            .map(|&id| VarInt(id))
            .collect::<Vec<_>>()
            .into();
        raw.write_to(buf)
    }
}

// ---------------------------------------------------------------------
// EntityMetadata (0x1C CB): entity id + the shared metadata-entries codec.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadataPacket {
    pub entity_id: VarInt,
    pub metadata: EntityMetadataEntries,
}

impl Packet for EntityMetadataPacket {
    const ID: i32 = 0x1C;
    const DIRECTION: EventDirection = EventDirection::ClientBound;
    const STATE: EventState = EventState::Play;
}

impl Readable for EntityMetadataPacket {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        Ok(Self {
            entity_id: VarInt::read_from(buf)?,
            metadata: EntityMetadataEntries::read_from(buf)?,
        })
    }
}

impl Writable for EntityMetadataPacket {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        self.entity_id.write_to(buf)?;
        self.metadata.write_to(buf)
    }
}

// ---------------------------------------------------------------------
// PlayerListItem (0x38 CB)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerListItem {
    pub entries: Vec<PlayerListInfo>,
}

impl Packet for PlayerListItem {
    const ID: i32 = 0x38;
    const DIRECTION: EventDirection = EventDirection::ClientBound;
    const STATE: EventState = EventState::Play;
}

impl Readable for PlayerListItem {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        let action = VarInt::read_from(buf)?.0;
        let count = VarInt::read_from(buf)?.0.max(0) as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let uuid = Uuid::read_from(buf)?;
            let action_data = match action {
                0 => {
                    let name = String::read_from(buf)?;
                    let nprops = VarInt::read_from(buf)?.0.max(0) as usize;
                    let mut properties = Vec::with_capacity(nprops);
                    for _ in 0..nprops {
                        let pname = String::read_from(buf)?;
                        let value = String::read_from(buf)?;
                        let signature = GenericOption::<String>::read_from(buf)?.0;
                        properties.push(PlayerProperty {
                            name: pname,
                            value,
                            signature,
                        });
                    }
                    let gamemode = VarInt::read_from(buf)?.0;
                    let ping = VarInt::read_from(buf)?.0;
                    let display = GenericOption::<Chat>::read_from(buf)?.0;
                    PlayerInfoAction::Add(PlayerInfoAdd {
                        name,
                        properties,
                        gamemode,
                        ping,
                        display,
                    })
                }
                1 => PlayerInfoAction::GamemodeUpdate {
                    gamemode: VarInt::read_from(buf)?.0,
                },
                2 => PlayerInfoAction::LatencyUpdate {
                    ping: VarInt::read_from(buf)?.0,
                },
                3 => PlayerInfoAction::DisplayNameUpdate {
                    display: GenericOption::<Chat>::read_from(buf)?.0,
                },
                4 => PlayerInfoAction::Remove,
                other => {
                    return Err(Error::WireMalformed(format!(
                        "unknown player list item action {}",
                        other
                    )))
                }
            };
            entries.push(PlayerListInfo {
                uuid,
                action: action_data,
            });
        }
        Ok(Self { entries })
    }
}

impl Writable for PlayerListItem {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        let action: i32 = match self.entries.first().map(|e| &e.action) {
            Some(PlayerInfoAction::Add(_)) | None => 0,
            Some(PlayerInfoAction::GamemodeUpdate { .. }) => 1,
            Some(PlayerInfoAction::LatencyUpdate { .. }) => 2,
            Some(PlayerInfoAction::DisplayNameUpdate { .. }) => 3,
            Some(PlayerInfoAction::Remove) => 4,
        };
        VarInt(action).write_to(buf)?;
        VarInt(self.entries.len() as i32).write_to(buf)?;
        for entry in &self.entries {
            entry.uuid.write_to(buf)?;
            match &entry.action {
                PlayerInfoAction::Add(add) => {
                    add.name.write_to(buf)?;
                    VarInt(add.properties.len() as i32).write_to(buf)?;
                    for p in &add.properties {
                        p.name.write_to(buf)?;
                        p.value.write_to(buf)?;
                        GenericOption(p.signature.clone()).write_to(buf)?;
                    }
                    VarInt(add.gamemode).write_to(buf)?;
                    VarInt(add.ping).write_to(buf)?;
                    GenericOption(add.display.clone()).write_to(buf)?;
                }
                PlayerInfoAction::GamemodeUpdate { gamemode } => {
                    VarInt(*gamemode).write_to(buf)?
                }
                PlayerInfoAction::LatencyUpdate { ping } => VarInt(*ping).write_to(buf)?,
                PlayerInfoAction::DisplayNameUpdate { display } => {
                    GenericOption(display.clone()).write_to(buf)?
                }
                PlayerInfoAction::Remove => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Teams (0x3E CB)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TeamAction {
    Create {
        display_name: String,
        prefix: String,
        suffix: String,
        friendly_fire: i8,
        nametag_visibility: String,
        color: i8,
        players: Vec<String>,
    },
    Remove,
    UpdateInfo {
        display_name: String,
        prefix: String,
        suffix: String,
        friendly_fire: i8,
        nametag_visibility: String,
        color: i8,
    },
    AddPlayers {
        players: Vec<String>,
    },
    RemovePlayers {
        players: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Teams {
    pub name: String,
    pub action: TeamAction,
}

impl Packet for Teams {
    const ID: i32 = 0x3E;
    const DIRECTION: EventDirection = EventDirection::ClientBound;
    const STATE: EventState = EventState::Play;
}

fn read_team_players<T: io::Read>(buf: &mut T) -> TetsuResult<Vec<String>> {
    let count = VarInt::read_from(buf)?.0.max(0) as usize;
    let mut players = Vec::with_capacity(count);
    for _ in 0..count {
        players.push(String::read_from(buf)?);
    }
    Ok(players)
}

fn write_team_players<T: io::Write>(buf: &mut T, players: &[String]) -> TetsuResult<()> {
    VarInt(players.len() as i32).write_to(buf)?;
    for p in players {
        p.write_to(buf)?;
    }
    Ok(())
}

impl Readable for Teams {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        let name = String::read_from(buf)?;
        let mode = Byte::read_from(buf)?;
        let action = match mode {
            0 => {
                let display_name = String::read_from(buf)?;
                let prefix = String::read_from(buf)?;
                let suffix = String::read_from(buf)?;
                let friendly_fire = Byte::read_from(buf)?;
                let nametag_visibility = String::read_from(buf)?;
                let color = Byte::read_from(buf)?;
                let players = read_team_players(buf)?;
                TeamAction::Create {
                    display_name,
                    prefix,
                    suffix,
                    friendly_fire,
                    nametag_visibility,
                    color,
                    players,
                }
            }
            1 => TeamAction::Remove,
            2 => {
                let display_name = String::read_from(buf)?;
                let prefix = String::read_from(buf)?;
                let suffix = String::read_from(buf)?;
                let friendly_fire = Byte::read_from(buf)?;
                let nametag_visibility = String::read_from(buf)?;
                let color = Byte::read_from(buf)?;
                TeamAction::UpdateInfo {
                    display_name,
                    prefix,
                    suffix,
                    friendly_fire,
                    nametag_visibility,
                    color,
                }
            }
            3 => TeamAction::AddPlayers {
                players: read_team_players(buf)?,
            },
            4 => TeamAction::RemovePlayers {
                players: read_team_players(buf)?,
            },
            other => {
                return Err(Error::WireMalformed(format!(
                    "unknown team action mode {}",
                    other
                )))
            }
        };
        Ok(Self { name, action })
    }
}

impl Writable for Teams {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        self.name.write_to(buf)?;
        match &self.action {
            TeamAction::Create {
                display_name,
                prefix,
                suffix,
                friendly_fire,
                nametag_visibility,
                color,
                players,
            } => {
                0i8.write_to(buf)?;
                display_name.write_to(buf)?;
                prefix.write_to(buf)?;
                suffix.write_to(buf)?;
                friendly_fire.write_to(buf)?;
                nametag_visibility.write_to(buf)?;
                color.write_to(buf)?;
                write_team_players(buf, players)
            }
            TeamAction::Remove => 1i8.write_to(buf),
            TeamAction::UpdateInfo {
                display_name,
                prefix,
                suffix,
                friendly_fire,
                nametag_visibility,
                color,
            } => {
                2i8.write_to(buf)?;
                display_name.write_to(buf)?;
                prefix.write_to(buf)?;
                suffix.write_to(buf)?;
                friendly_fire.write_to(buf)?;
                nametag_visibility.write_to(buf)?;
                color.write_to(buf)
            }
            TeamAction::AddPlayers { players } => {
                3i8.write_to(buf)?;
                write_team_players(buf, players)
            }
            TeamAction::RemovePlayers { players } => {
                4i8.write_to(buf)?;
                write_team_players(buf, players)
            }
        }
    }
}

// ---------------------------------------------------------------------
// Scoreboard (0x3B/0x3C/0x3D CB)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreboardObjectiveAction {
    Create { value: String, kind: String },
    Remove,
    Update { value: String, kind: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreboardObjective {
    pub name: String,
    pub action: ScoreboardObjectiveAction,
}

impl Packet for ScoreboardObjective {
    const ID: i32 = 0x3B;
    const DIRECTION: EventDirection = EventDirection::ClientBound;
    const STATE: EventState = EventState::Play;
}

impl Readable for ScoreboardObjective {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        let name = String::read_from(buf)?;
        let mode = Byte::read_from(buf)?;
        let action = match mode {
            0 => ScoreboardObjectiveAction::Create {
                value: String::read_from(buf)?,
                kind: String::read_from(buf)?,
            },
            1 => ScoreboardObjectiveAction::Remove,
            2 => ScoreboardObjectiveAction::Update {
                value: String::read_from(buf)?,
                kind: String::read_from(buf)?,
            },
            other => {
                return Err(Error::WireMalformed(format!(
                    "unknown scoreboard objective mode {}",
                    other
                )))
            }
        };
        Ok(Self { name, action })
    }
}

impl Writable for ScoreboardObjective {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        self.name.write_to(buf)?;
        match &self.action {
            ScoreboardObjectiveAction::Create { value, kind } => {
                0i8.write_to(buf)?;
                value.write_to(buf)?;
                kind.write_to(buf)
            }
            ScoreboardObjectiveAction::Remove => 1i8.write_to(buf),
            ScoreboardObjectiveAction::Update { value, kind } => {
                2i8.write_to(buf)?;
                value.write_to(buf)?;
                kind.write_to(buf)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateScoreAction {
    CreateOrUpdate { objective_name: String, value: i32 },
    Remove { objective_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateScore {
    pub entry_name: String,
    pub action: UpdateScoreAction,
}

impl Packet for UpdateScore {
    const ID: i32 = 0x3C;
    const DIRECTION: EventDirection = EventDirection::ClientBound;
    const STATE: EventState = EventState::Play;
}

impl Readable for UpdateScore {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        let entry_name = String::read_from(buf)?;
        let action_id = Byte::read_from(buf)?;
        let objective_name = String::read_from(buf)?;
        let action = match action_id {
            1 => UpdateScoreAction::Remove { objective_name },
            _ => UpdateScoreAction::CreateOrUpdate {
                objective_name,
                value: VarInt::read_from(buf)?.into(),
            },
        };
        Ok(Self { entry_name, action })
    }
}

impl Writable for UpdateScore {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        self.entry_name.write_to(buf)?;
        match &self.action {
            UpdateScoreAction::CreateOrUpdate { objective_name, value } => {
                0i8.write_to(buf)?;
                objective_name.write_to(buf)?;
                VarInt(*value).write_to(buf)
            }
            UpdateScoreAction::Remove { objective_name } => {
                1i8.write_to(buf)?;
                objective_name.write_to(buf)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayScoreboard {
    pub position: Byte,
    pub score_name: String,
}

impl Packet for DisplayScoreboard {
    const ID: i32 = 0x3D;
    const DIRECTION: EventDirection = EventDirection::ClientBound;
    const STATE: EventState = EventState::Play;
}

impl Readable for DisplayScoreboard {
    fn read_from<T: io::Read>(buf: &mut T) -> TetsuResult<Self> {
        Ok(Self {
            position: Byte::read_from(buf)?,
            score_name: String::read_from(buf)?,
        })
    }
}

impl Writable for DisplayScoreboard {
    fn write_to<T: io::Write>(&self, buf: &mut T) -> TetsuResult<()> {
        self.position.write_to(buf)?;
        self.score_name.write_to(buf)
    }
}

// ---------------------------------------------------------------------
// Event: the curated packet set plus a passthrough for everything else.
// ---------------------------------------------------------------------

/// A decoded packet, or the raw bytes of one this crate has no typed
/// definition for. Decoding never fails on an unrecognised id; that's the
/// whole point of a proxy that forwards ~90% of traffic unexamined.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Handshake(Handshake),
    StatusRequest(StatusRequest),
    StatusResponse(StatusResponse),
    StatusPing(StatusPing),
    StatusPong(StatusPong),
    LoginStart(LoginStart),
    Disconnect(Disconnect),
    EncryptionRequest(EncryptionRequest),
    EncryptionResponse(EncryptionResponse),
    LoginSuccess(LoginSuccess),
    SetCompression(SetCompression),
    JoinGame(JoinGame),
    EntityEquipment(EntityEquipment),
    SpawnPosition(SpawnPosition),
    Respawn(Respawn),
    PlayerPositionAndLookClientbound(PlayerPositionAndLookClientbound),
    HeldItemChangeClientbound(HeldItemChangeClientbound),
    SpawnPlayer(SpawnPlayer),
    EntityVelocity(EntityVelocity),
    DestroyEntities(DestroyEntities),
    EntityRelativeMove(EntityRelativeMove),
    EntityLook(EntityLook),
    EntityLookAndRelativeMove(EntityLookAndRelativeMove),
    EntityTeleport(EntityTeleport),
    EntityHeadLook(EntityHeadLook),
    AttachEntity(AttachEntity),
    EntityMetadata(EntityMetadataPacket),
    EntityEffect(EntityEffect),
    RemoveEntityEffect(RemoveEntityEffect),
    SetSlot(SetSlot),
    Statistics(Statistics),
    PlayerListItem(PlayerListItem),
    PlayerAbility(PlayerAbility),
    Teams(Teams),
    ScoreboardObjective(ScoreboardObjective),
    UpdateScore(UpdateScore),
    DisplayScoreboard(DisplayScoreboard),
    PluginMessage(PluginMessage),
    PlayDisconnect(PlayDisconnect),
    ServerDifficultyUpdate(ServerDifficultyUpdate),
    PlaySetCompression(PlaySetCompression),
    Player(Player),
    PlayerPosition(PlayerPosition),
    PlayerLook(PlayerLook),
    PlayerPositionAndLookServerbound(PlayerPositionAndLookServerbound),
    HeldItemChangeServerbound(HeldItemChangeServerbound),
    Animation(Animation),
    EntityAction(EntityAction),
    Raw { id: i32, payload: Vec<u8> },
}

macro_rules! try_decode {
    ($id:expr, $buf:expr, $variant:ident, $ty:ty) => {
        if $id == <$ty as Packet>::ID {
            return Ok(Event::$variant(<$ty>::read_from($buf)?));
        }
    };
}

/// Decode a packet given its direction, protocol state and id. Unknown ids
/// fall back to [`Event::Raw`] with the remaining bytes captured verbatim.
pub fn decode<T: io::Read>(
    direction: EventDirection,
    state: EventState,
    id: i32,
    buf: &mut T,
) -> TetsuResult<Event> {
    use EventDirection::{ClientBound, ServerBound};
    use EventState::{Handshake as HandshakeState, Login, Play, Status};

    if direction == ServerBound && state == HandshakeState {
        try_decode!(id, buf, Handshake, self::Handshake);
    }
    if direction == ServerBound && state == Status {
        try_decode!(id, buf, StatusRequest, StatusRequest);
        try_decode!(id, buf, StatusPing, StatusPing);
    }
    if direction == ClientBound && state == Status {
        try_decode!(id, buf, StatusResponse, StatusResponse);
        try_decode!(id, buf, StatusPong, StatusPong);
    }
    if direction == ServerBound && state == Login {
        try_decode!(id, buf, LoginStart, LoginStart);
        try_decode!(id, buf, EncryptionResponse, EncryptionResponse);
    }
    if direction == ClientBound && state == Login {
        try_decode!(id, buf, Disconnect, Disconnect);
        try_decode!(id, buf, EncryptionRequest, EncryptionRequest);
        try_decode!(id, buf, LoginSuccess, LoginSuccess);
        try_decode!(id, buf, SetCompression, SetCompression);
    }
    if direction == ClientBound && state == Play {
        try_decode!(id, buf, JoinGame, JoinGame);
        try_decode!(id, buf, EntityEquipment, EntityEquipment);
        try_decode!(id, buf, SpawnPosition, SpawnPosition);
        try_decode!(id, buf, Respawn, Respawn);
        try_decode!(
            id,
            buf,
            PlayerPositionAndLookClientbound,
            PlayerPositionAndLookClientbound
        );
        try_decode!(
            id,
            buf,
            HeldItemChangeClientbound,
            HeldItemChangeClientbound
        );
        try_decode!(id, buf, SpawnPlayer, SpawnPlayer);
        try_decode!(id, buf, EntityVelocity, EntityVelocity);
        try_decode!(id, buf, DestroyEntities, DestroyEntities);
        try_decode!(id, buf, EntityRelativeMove, EntityRelativeMove);
        try_decode!(id, buf, EntityLook, EntityLook);
        try_decode!(
            id,
            buf,
            EntityLookAndRelativeMove,
            EntityLookAndRelativeMove
        );
        try_decode!(id, buf, EntityTeleport, EntityTeleport);
        try_decode!(id, buf, EntityHeadLook, EntityHeadLook);
        try_decode!(id, buf, AttachEntity, AttachEntity);
        try_decode!(id, buf, EntityMetadata, EntityMetadataPacket);
        try_decode!(id, buf, EntityEffect, EntityEffect);
        try_decode!(id, buf, RemoveEntityEffect, RemoveEntityEffect);
        try_decode!(id, buf, SetSlot, SetSlot);
        try_decode!(id, buf, Statistics, Statistics);
        try_decode!(id, buf, PlayerListItem, PlayerListItem);
        try_decode!(id, buf, PlayerAbility, PlayerAbility);
        try_decode!(id, buf, Teams, Teams);
        try_decode!(id, buf, ScoreboardObjective, ScoreboardObjective);
        try_decode!(id, buf, UpdateScore, UpdateScore);
        try_decode!(id, buf, DisplayScoreboard, DisplayScoreboard);
        try_decode!(id, buf, PluginMessage, PluginMessage);
        try_decode!(id, buf, PlayDisconnect, PlayDisconnect);
        try_decode!(id, buf, ServerDifficultyUpdate, ServerDifficultyUpdate);
        try_decode!(id, buf, PlaySetCompression, PlaySetCompression);
    }
    if direction == ServerBound && state == Play {
        try_decode!(id, buf, Player, Player);
        try_decode!(id, buf, PlayerPosition, PlayerPosition);
        try_decode!(id, buf, PlayerLook, PlayerLook);
        try_decode!(
            id,
            buf,
            PlayerPositionAndLookServerbound,
            PlayerPositionAndLookServerbound
        );
        try_decode!(
            id,
            buf,
            HeldItemChangeServerbound,
            HeldItemChangeServerbound
        );
        try_decode!(id, buf, Animation, Animation);
        try_decode!(id, buf, EntityAction, EntityAction);
    }

    let mut payload = Vec::new();
    buf.read_to_end(&mut payload)?;
    Ok(Event::Raw { id, payload })
}

/// Encode a decoded event back to its wire form. `Raw` events write their
/// captured payload back out untouched.
pub fn encode<T: io::Write>(event: &Event, buf: &mut T) -> TetsuResult<()> {
    match event {
        Event::Handshake(p) => p.write_to(buf),
        Event::StatusRequest(p) => p.write_to(buf),
        Event::StatusResponse(p) => p.write_to(buf),
        Event::StatusPing(p) => p.write_to(buf),
        Event::StatusPong(p) => p.write_to(buf),
        Event::LoginStart(p) => p.write_to(buf),
        Event::Disconnect(p) => p.write_to(buf),
        Event::EncryptionRequest(p) => p.write_to(buf),
        Event::EncryptionResponse(p) => p.write_to(buf),
        Event::LoginSuccess(p) => p.write_to(buf),
        Event::SetCompression(p) => p.write_to(buf),
        Event::JoinGame(p) => p.write_to(buf),
        Event::EntityEquipment(p) => p.write_to(buf),
        Event::SpawnPosition(p) => p.write_to(buf),
        Event::Respawn(p) => p.write_to(buf),
        Event::PlayerPositionAndLookClientbound(p) => p.write_to(buf),
        Event::HeldItemChangeClientbound(p) => p.write_to(buf),
        Event::SpawnPlayer(p) => p.write_to(buf),
        Event::EntityVelocity(p) => p.write_to(buf),
        Event::DestroyEntities(p) => p.write_to(buf),
        Event::EntityRelativeMove(p) => p.write_to(buf),
        Event::EntityLook(p) => p.write_to(buf),
        Event::EntityLookAndRelativeMove(p) => p.write_to(buf),
        Event::EntityTeleport(p) => p.write_to(buf),
        Event::EntityHeadLook(p) => p.write_to(buf),
        Event::AttachEntity(p) => p.write_to(buf),
        Event::EntityMetadata(p) => p.write_to(buf),
        Event::EntityEffect(p) => p.write_to(buf),
        Event::RemoveEntityEffect(p) => p.write_to(buf),
        Event::SetSlot(p) => p.write_to(buf),
        Event::Statistics(p) => p.write_to(buf),
        Event::PlayerListItem(p) => p.write_to(buf),
        Event::PlayerAbility(p) => p.write_to(buf),
        Event::Teams(p) => p.write_to(buf),
        Event::ScoreboardObjective(p) => p.write_to(buf),
        Event::UpdateScore(p) => p.write_to(buf),
        Event::DisplayScoreboard(p) => p.write_to(buf),
        Event::PluginMessage(p) => p.write_to(buf),
        Event::PlayDisconnect(p) => p.write_to(buf),
        Event::ServerDifficultyUpdate(p) => p.write_to(buf),
        Event::PlaySetCompression(p) => p.write_to(buf),
        Event::Player(p) => p.write_to(buf),
        Event::PlayerPosition(p) => p.write_to(buf),
        Event::PlayerLook(p) => p.write_to(buf),
        Event::PlayerPositionAndLookServerbound(p) => p.write_to(buf),
        Event::HeldItemChangeServerbound(p) => p.write_to(buf),
        Event::Animation(p) => p.write_to(buf),
        Event::EntityAction(p) => p.write_to(buf),
        Event::Raw { payload, .. } => Ok(buf.write_all(payload)?),
    }
}

/// The packet id an event will be framed with on the wire.
pub fn wire_id(event: &Event) -> i32 {
    match event {
        Event::Handshake(_) => Handshake::ID,
        Event::StatusRequest(_) => StatusRequest::ID,
        Event::StatusResponse(_) => StatusResponse::ID,
        Event::StatusPing(_) => StatusPing::ID,
        Event::StatusPong(_) => StatusPong::ID,
        Event::LoginStart(_) => LoginStart::ID,
        Event::Disconnect(_) => Disconnect::ID,
        Event::EncryptionRequest(_) => EncryptionRequest::ID,
        Event::EncryptionResponse(_) => EncryptionResponse::ID,
        Event::LoginSuccess(_) => LoginSuccess::ID,
        Event::SetCompression(_) => SetCompression::ID,
        Event::JoinGame(_) => JoinGame::ID,
        Event::EntityEquipment(_) => EntityEquipment::ID,
        Event::SpawnPosition(_) => SpawnPosition::ID,
        Event::Respawn(_) => Respawn::ID,
        Event::PlayerPositionAndLookClientbound(_) => PlayerPositionAndLookClientbound::ID,
        Event::HeldItemChangeClientbound(_) => HeldItemChangeClientbound::ID,
        Event::SpawnPlayer(_) => SpawnPlayer::ID,
        Event::EntityVelocity(_) => EntityVelocity::ID,
        Event::DestroyEntities(_) => DestroyEntities::ID,
        Event::EntityRelativeMove(_) => EntityRelativeMove::ID,
        Event::EntityLook(_) => EntityLook::ID,
        Event::EntityLookAndRelativeMove(_) => EntityLookAndRelativeMove::ID,
        Event::EntityTeleport(_) => EntityTeleport::ID,
        Event::EntityHeadLook(_) => EntityHeadLook::ID,
        Event::AttachEntity(_) => AttachEntity::ID,
        Event::EntityMetadata(_) => EntityMetadataPacket::ID,
        Event::EntityEffect(_) => EntityEffect::ID,
        Event::RemoveEntityEffect(_) => RemoveEntityEffect::ID,
        Event::SetSlot(_) => SetSlot::ID,
        Event::Statistics(_) => Statistics::ID,
        Event::PlayerListItem(_) => PlayerListItem::ID,
        Event::PlayerAbility(_) => PlayerAbility::ID,
        Event::Teams(_) => Teams::ID,
        Event::ScoreboardObjective(_) => ScoreboardObjective::ID,
        Event::UpdateScore(_) => UpdateScore::ID,
        Event::DisplayScoreboard(_) => DisplayScoreboard::ID,
        Event::PluginMessage(_) => PluginMessage::ID,
        Event::PlayDisconnect(_) => PlayDisconnect::ID,
        Event::ServerDifficultyUpdate(_) => ServerDifficultyUpdate::ID,
        Event::PlaySetCompression(_) => PlaySetCompression::ID,
        Event::Player(_) => Player::ID,
        Event::PlayerPosition(_) => PlayerPosition::ID,
        Event::PlayerLook(_) => PlayerLook::ID,
        Event::PlayerPositionAndLookServerbound(_) => PlayerPositionAndLookServerbound::ID,
        Event::HeldItemChangeServerbound(_) => HeldItemChangeServerbound::ID,
        Event::Animation(_) => Animation::ID,
        Event::EntityAction(_) => EntityAction::ID,
        Event::Raw { id, .. } => *id,
    }
}

/// Encodes an event into the `VarInt(id) + body` form a [`Stream`](crate::stream::Stream)
/// expects for its `write_packet`/`send_packet` body.
pub fn encode_framed(event: &Event) -> TetsuResult<Vec<u8>> {
    let mut buf = Vec::new();
    VarInt(wire_id(event)).write_to(&mut buf)?;
    encode(event, &mut buf)?;
    Ok(buf)
}
