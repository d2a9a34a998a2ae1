//! Binary wire protocol for client-server communication.
//!
//! Every message is a u16 little-endian tag followed by its fields in
//! declared order with fixed widths: f32 for vector components, u16 for
//! client ids, u32 for ticks, u8 for health and list counts. The write
//! order below IS the read order; both peers must match it byte-for-byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::game::input::{PlayerInputData, KEY_COUNT};
use crate::game::physics::Vec3;
use crate::game::player::PlayerStateData;

/// Message tags
pub mod tags {
    // Client -> server
    pub const JOIN_ROOM: u16 = 1;
    pub const PLAYER_INPUT: u16 = 2;
    pub const LEAVE_ROOM: u16 = 3;
    pub const PING: u16 = 4;

    // Server -> client
    pub const WELCOME: u16 = 10;
    pub const JOIN_ROOM_ACCEPTED: u16 = 11;
    pub const GAME_START: u16 = 12;
    pub const GAME_UPDATE: u16 = 13;
    pub const BULLET_SHOT: u16 = 14;
    pub const PONG: u16 = 15;
}

/// Delivery mode requested for an outbound message.
///
/// The WebSocket transport is reliable either way; the mode decides how a
/// backed-up client is handled: reliable sends are reported when they fail,
/// unreliable sends are simply dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Reliable,
    Unreliable,
}

/// Protocol decode errors. A failed decode rejects that message only.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message truncated")]
    Truncated,

    #[error("unknown message tag: {0}")]
    UnknownTag(u16),

    #[error("invalid utf-8 in string field")]
    InvalidString,

    #[error("string field exceeds 255 bytes")]
    StringTooLong,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Request to join a room's gameplay
    JoinRoom { room: String },
    /// One input sample
    Input(PlayerInputData),
    /// Leave the current room
    LeaveRoom,
    /// Ping for latency measurement
    Ping { t: u64 },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Sent once after the connection is established
    Welcome { client_id: u16, server_time: u64 },
    /// Room accepted the join request
    JoinRoomAccepted,
    /// One-time game state for a newly joined player
    GameStart(GameStartData),
    /// Per-tick state delta, sent to every player every tick
    GameUpdate(GameUpdateData),
    /// A resolved shot, sent to everyone but the shooter
    BulletShot(BulletShotMessage),
    /// Pong response echoing the client timestamp
    Pong { t: u64 },
}

/// Spawn info for one player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSpawnData {
    pub id: u16,
    pub name: String,
    pub position: Vec3,
}

/// A player left the room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDespawnData {
    pub id: u16,
}

/// A player's health changed this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerHealthUpdateData {
    pub id: u16,
    pub health: u8,
}

/// Sent once to a newly joined player
#[derive(Debug, Clone, PartialEq)]
pub struct GameStartData {
    pub spawns: Vec<PlayerSpawnData>,
    pub tick: u32,
}

/// Per-tick snapshot for one recipient
#[derive(Debug, Clone, PartialEq)]
pub struct GameUpdateData {
    /// The recipient's own last-acknowledged input tick
    pub ack_tick: u32,
    pub states: Vec<PlayerStateData>,
    pub spawns: Vec<PlayerSpawnData>,
    pub despawns: Vec<PlayerDespawnData>,
    pub healths: Vec<PlayerHealthUpdateData>,
}

/// Broadcast for every resolved shot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletShotMessage {
    pub origin: Vec3,
    pub direction: Vec3,
    pub shooter: u16,
}

// ============================================================================
// Checked reads (bytes::Buf panics on underflow)
// ============================================================================

fn get_u8(buf: &mut Bytes) -> Result<u8, ProtocolError> {
    if buf.remaining() < 1 {
        return Err(ProtocolError::Truncated);
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut Bytes) -> Result<u16, ProtocolError> {
    if buf.remaining() < 2 {
        return Err(ProtocolError::Truncated);
    }
    Ok(buf.get_u16_le())
}

fn get_u32(buf: &mut Bytes) -> Result<u32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated);
    }
    Ok(buf.get_u32_le())
}

fn get_u64(buf: &mut Bytes) -> Result<u64, ProtocolError> {
    if buf.remaining() < 8 {
        return Err(ProtocolError::Truncated);
    }
    Ok(buf.get_u64_le())
}

fn get_f32(buf: &mut Bytes) -> Result<f32, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated);
    }
    Ok(buf.get_f32_le())
}

fn get_vec3(buf: &mut Bytes) -> Result<Vec3, ProtocolError> {
    Ok(Vec3::new(get_f32(buf)?, get_f32(buf)?, get_f32(buf)?))
}

fn get_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    let len = get_u8(buf)? as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::Truncated);
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidString)
}

fn put_vec3(buf: &mut BytesMut, v: Vec3) {
    buf.put_f32_le(v.x);
    buf.put_f32_le(v.y);
    buf.put_f32_le(v.z);
}

/// Lists are count-prefixed with a u8. Anything past 255 entries cannot be
/// represented; the count and the encoded entries truncate together so the
/// stream stays parseable.
const MAX_LIST_LEN: usize = u8::MAX as usize;

fn put_count(buf: &mut BytesMut, len: usize) -> usize {
    let len = len.min(MAX_LIST_LEN);
    buf.put_u8(len as u8);
    len
}

fn put_string(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    if s.len() > u8::MAX as usize {
        return Err(ProtocolError::StringTooLong);
    }
    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
    Ok(())
}

// ============================================================================
// Field codecs
// ============================================================================

impl PlayerInputData {
    /// Layout: movement (2 x f32), keys (u8 bitmask), look (3 x f32), time (u32)
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_f32_le(self.movement[0]);
        buf.put_f32_le(self.movement[1]);
        let mut mask = 0u8;
        for (i, &key) in self.keys.iter().enumerate() {
            if key {
                mask |= 1 << i;
            }
        }
        buf.put_u8(mask);
        put_vec3(buf, self.look_direction);
        buf.put_u32_le(self.time);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let movement = [get_f32(buf)?, get_f32(buf)?];
        let mask = get_u8(buf)?;
        let mut keys = [false; KEY_COUNT];
        for (i, key) in keys.iter_mut().enumerate() {
            *key = mask & (1 << i) != 0;
        }
        let look_direction = get_vec3(buf)?;
        let time = get_u32(buf)?;
        Ok(Self {
            movement,
            keys,
            look_direction,
            time,
        })
    }
}

impl PlayerStateData {
    /// Layout: id (u16), tick (u32), position (3 x f32), look (3 x f32), gravity (f32)
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.id);
        buf.put_u32_le(self.tick);
        put_vec3(buf, self.position);
        put_vec3(buf, self.look_direction);
        buf.put_f32_le(self.gravity);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: get_u16(buf)?,
            tick: get_u32(buf)?,
            position: get_vec3(buf)?,
            look_direction: get_vec3(buf)?,
            gravity: get_f32(buf)?,
        })
    }
}

impl PlayerSpawnData {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u16_le(self.id);
        put_string(buf, &self.name)?;
        put_vec3(buf, self.position);
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: get_u16(buf)?,
            name: get_string(buf)?,
            position: get_vec3(buf)?,
        })
    }
}

impl PlayerDespawnData {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self { id: get_u16(buf)? })
    }
}

impl PlayerHealthUpdateData {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.id);
        buf.put_u8(self.health);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: get_u16(buf)?,
            health: get_u8(buf)?,
        })
    }
}

// ============================================================================
// Top-level messages
// ============================================================================

impl ClientMessage {
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        match self {
            ClientMessage::JoinRoom { room } => {
                buf.put_u16_le(tags::JOIN_ROOM);
                put_string(&mut buf, room)?;
            }
            ClientMessage::Input(input) => {
                buf.put_u16_le(tags::PLAYER_INPUT);
                input.encode(&mut buf);
            }
            ClientMessage::LeaveRoom => {
                buf.put_u16_le(tags::LEAVE_ROOM);
            }
            ClientMessage::Ping { t } => {
                buf.put_u16_le(tags::PING);
                buf.put_u64_le(*t);
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        let buf = &mut payload;
        let tag = get_u16(buf)?;
        match tag {
            tags::JOIN_ROOM => Ok(ClientMessage::JoinRoom {
                room: get_string(buf)?,
            }),
            tags::PLAYER_INPUT => Ok(ClientMessage::Input(PlayerInputData::decode(buf)?)),
            tags::LEAVE_ROOM => Ok(ClientMessage::LeaveRoom),
            tags::PING => Ok(ClientMessage::Ping { t: get_u64(buf)? }),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        match self {
            ServerMessage::Welcome {
                client_id,
                server_time,
            } => {
                buf.put_u16_le(tags::WELCOME);
                buf.put_u16_le(*client_id);
                buf.put_u64_le(*server_time);
            }
            ServerMessage::JoinRoomAccepted => {
                buf.put_u16_le(tags::JOIN_ROOM_ACCEPTED);
            }
            ServerMessage::GameStart(start) => {
                buf.put_u16_le(tags::GAME_START);
                let n = put_count(&mut buf, start.spawns.len());
                for spawn in &start.spawns[..n] {
                    spawn.encode(&mut buf)?;
                }
                buf.put_u32_le(start.tick);
            }
            ServerMessage::GameUpdate(update) => {
                buf.put_u16_le(tags::GAME_UPDATE);
                buf.put_u32_le(update.ack_tick);
                let n = put_count(&mut buf, update.states.len());
                for state in &update.states[..n] {
                    state.encode(&mut buf);
                }
                let n = put_count(&mut buf, update.spawns.len());
                for spawn in &update.spawns[..n] {
                    spawn.encode(&mut buf)?;
                }
                let n = put_count(&mut buf, update.despawns.len());
                for despawn in &update.despawns[..n] {
                    despawn.encode(&mut buf);
                }
                let n = put_count(&mut buf, update.healths.len());
                for health in &update.healths[..n] {
                    health.encode(&mut buf);
                }
            }
            ServerMessage::BulletShot(shot) => {
                buf.put_u16_le(tags::BULLET_SHOT);
                put_vec3(&mut buf, shot.origin);
                put_vec3(&mut buf, shot.direction);
                buf.put_u16_le(shot.shooter);
            }
            ServerMessage::Pong { t } => {
                buf.put_u16_le(tags::PONG);
                buf.put_u64_le(*t);
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        let buf = &mut payload;
        let tag = get_u16(buf)?;
        match tag {
            tags::WELCOME => Ok(ServerMessage::Welcome {
                client_id: get_u16(buf)?,
                server_time: get_u64(buf)?,
            }),
            tags::JOIN_ROOM_ACCEPTED => Ok(ServerMessage::JoinRoomAccepted),
            tags::GAME_START => {
                let count = get_u8(buf)? as usize;
                let mut spawns = Vec::with_capacity(count);
                for _ in 0..count {
                    spawns.push(PlayerSpawnData::decode(buf)?);
                }
                let tick = get_u32(buf)?;
                Ok(ServerMessage::GameStart(GameStartData { spawns, tick }))
            }
            tags::GAME_UPDATE => {
                let ack_tick = get_u32(buf)?;
                let count = get_u8(buf)? as usize;
                let mut states = Vec::with_capacity(count);
                for _ in 0..count {
                    states.push(PlayerStateData::decode(buf)?);
                }
                let count = get_u8(buf)? as usize;
                let mut spawns = Vec::with_capacity(count);
                for _ in 0..count {
                    spawns.push(PlayerSpawnData::decode(buf)?);
                }
                let count = get_u8(buf)? as usize;
                let mut despawns = Vec::with_capacity(count);
                for _ in 0..count {
                    despawns.push(PlayerDespawnData::decode(buf)?);
                }
                let count = get_u8(buf)? as usize;
                let mut healths = Vec::with_capacity(count);
                for _ in 0..count {
                    healths.push(PlayerHealthUpdateData::decode(buf)?);
                }
                Ok(ServerMessage::GameUpdate(GameUpdateData {
                    ack_tick,
                    states,
                    spawns,
                    despawns,
                    healths,
                }))
            }
            tags::BULLET_SHOT => Ok(ServerMessage::BulletShot(BulletShotMessage {
                origin: get_vec3(buf)?,
                direction: get_vec3(buf)?,
                shooter: get_u16(buf)?,
            })),
            tags::PONG => Ok(ServerMessage::Pong { t: get_u64(buf)? }),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_update_layout_is_fixed() {
        let msg = ServerMessage::GameUpdate(GameUpdateData {
            ack_tick: 7,
            states: vec![],
            spawns: vec![],
            despawns: vec![],
            healths: vec![PlayerHealthUpdateData { id: 513, health: 95 }],
        });

        let bytes = msg.encode().unwrap();
        // tag, ack_tick, three empty counts, one health entry (u16 id + u8 health)
        let expected: &[u8] = &[
            13, 0, // GAME_UPDATE tag, u16 LE
            7, 0, 0, 0, // ack_tick u32 LE
            0, // states count
            0, // spawns count
            0, // despawns count
            1, // healths count
            1, 2, // id 513 u16 LE
            95, // health u8
        ];
        assert_eq!(&bytes[..], expected);
    }

    #[test]
    fn bullet_shot_layout_is_fixed() {
        let msg = ServerMessage::BulletShot(BulletShotMessage {
            origin: Vec3::new(1.0, 2.0, 3.0),
            direction: Vec3::new(0.0, 0.0, 1.0),
            shooter: 4,
        });

        let bytes = msg.encode().unwrap();
        assert_eq!(bytes.len(), 2 + 12 + 12 + 2);
        assert_eq!(&bytes[..2], &[14, 0]);
        assert_eq!(&bytes[2..6], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[26..28], &[4, 0]);
    }

    #[test]
    fn input_round_trip_preserves_fields() {
        let mut input = PlayerInputData::default();
        input.movement = [0.5, -1.0];
        input.keys[crate::game::input::KEY_FIRE] = true;
        input.look_direction = Vec3::new(-10.0, 45.0, 0.0);
        input.time = 1234;

        let encoded = ClientMessage::Input(input).encode().unwrap();
        match ClientMessage::decode(encoded).unwrap() {
            ClientMessage::Input(decoded) => assert_eq!(decoded, input),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let encoded = ClientMessage::Input(PlayerInputData::default())
            .encode()
            .unwrap();
        let truncated = encoded.slice(..encoded.len() - 3);
        assert!(matches!(
            ClientMessage::decode(truncated),
            Err(ProtocolError::Truncated)
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let raw = Bytes::from_static(&[0xff, 0xff, 1, 2, 3]);
        assert!(matches!(
            ClientMessage::decode(raw),
            Err(ProtocolError::UnknownTag(0xffff))
        ));
    }

    #[test]
    fn oversized_list_truncates_count_and_entries_together() {
        let healths = (0..300u16)
            .map(|id| PlayerHealthUpdateData { id, health: 1 })
            .collect();
        let msg = ServerMessage::GameUpdate(GameUpdateData {
            ack_tick: 0,
            states: vec![],
            spawns: vec![],
            despawns: vec![],
            healths,
        });

        // Decoding proves the count prefix matches the encoded entries
        match ServerMessage::decode(msg.encode().unwrap()).unwrap() {
            ServerMessage::GameUpdate(update) => {
                assert_eq!(update.healths.len(), MAX_LIST_LEN);
                assert_eq!(update.healths[254].id, 254);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn game_start_round_trip() {
        let msg = ServerMessage::GameStart(GameStartData {
            spawns: vec![PlayerSpawnData {
                id: 1,
                name: "alice".to_string(),
                position: Vec3::new(0.0, 1.0, 0.0),
            }],
            tick: 99,
        });
        let decoded = ServerMessage::decode(msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }
}
