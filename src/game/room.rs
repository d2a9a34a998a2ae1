//! Room state and the authoritative tick loop.
//!
//! One tokio task per room owns every player in it. Each tick: drain the
//! command channel, run the pre phase (input drain + shot resolution) and
//! the tick phase (movement + history) for every player in join order,
//! send one update per player, then clear the tick-scoped event lists.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::game::combat::resolve_shot;
use crate::game::physics::Vec3;
use crate::game::player::{PlayerStateData, ServerPlayer};
use crate::game::snapshot::SnapshotBuilder;
use crate::game::{GameError, OutboundMessage, RoomCommand};
use crate::util::time::TICK_DURATION_MICROS;
use crate::ws::protocol::{
    BulletShotMessage, GameStartData, PlayerDespawnData, PlayerHealthUpdateData, SendMode,
    ServerMessage,
};

/// Radius of the disc new players spawn on
const SPAWN_RADIUS: f32 = 10.0;

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    pub name: String,
    pub command_tx: mpsc::Sender<RoomCommand>,
    pub max_slots: usize,
    player_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn has_slot(&self) -> bool {
        self.player_count() < self.max_slots
    }
}

/// Registry of all open rooms, keyed by name
pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Open a room and spawn its tick-loop task. The task removes the
    /// room from the registry when it finishes.
    pub fn open(self: &Arc<Self>, name: &str, max_slots: usize) -> RoomHandle {
        let (command_tx, command_rx) = mpsc::channel(256);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = RoomHandle {
            id: Uuid::new_v4(),
            name: name.to_string(),
            command_tx,
            max_slots,
            player_count: player_count.clone(),
        };

        let room = Room::new(
            handle.id,
            name.to_string(),
            max_slots,
            rand::random::<u64>(),
            command_rx,
            player_count,
        );
        self.rooms.insert(name.to_string(), handle.clone());

        let registry = self.clone();
        let room_name = name.to_string();
        tokio::spawn(async move {
            room.run().await;
            registry.rooms.remove(&room_name);
            info!(room = %room_name, "Room removed from registry");
        });

        handle
    }

    pub fn get(&self, name: &str) -> Option<RoomHandle> {
        self.rooms.get(name).map(|r| r.value().clone())
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    pub fn handles(&self) -> Vec<RoomHandle> {
        self.rooms.iter().map(|r| r.value().clone()).collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// An open room (owned by the room task)
pub struct Room {
    pub id: Uuid,
    pub name: String,
    max_slots: usize,

    /// Authoritative tick counter; wraps at integer overflow
    tick: u32,

    /// Players and their state array are index-aligned at all times;
    /// join/leave mutate both together.
    players: Vec<ServerPlayer>,
    player_states: Vec<PlayerStateData>,

    snapshot: SnapshotBuilder,
    rng: ChaCha8Rng,

    command_rx: mpsc::Receiver<RoomCommand>,
    player_count: Arc<AtomicUsize>,
    closing: bool,
}

impl Room {
    pub fn new(
        id: Uuid,
        name: String,
        max_slots: usize,
        seed: u64,
        command_rx: mpsc::Receiver<RoomCommand>,
        player_count: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            id,
            name,
            max_slots,
            tick: 0,
            players: Vec::new(),
            player_states: Vec::new(),
            snapshot: SnapshotBuilder::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            command_rx,
            player_count,
            closing: false,
        }
    }

    /// Run the authoritative tick loop until the room closes
    pub async fn run(mut self) {
        info!(room = %self.name, room_id = %self.id, "Room opened");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            self.process_commands();
            self.run_tick();

            if self.closing {
                break;
            }
        }

        info!(room = %self.name, room_id = %self.id, "Room closed");
    }

    /// Drain the command channel. Joins and leaves apply immediately,
    /// between ticks; inputs land in the target player's buffer for the
    /// next tick's drain.
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(RoomCommand::Join {
                    client_id,
                    display_name,
                    sender,
                }) => {
                    if let Err(e) = self.handle_join(client_id, display_name, sender) {
                        warn!(room = %self.name, client_id, error = %e, "Join rejected");
                    }
                }
                Ok(RoomCommand::Input { client_id, input }) => {
                    match self.players.iter_mut().find(|p| p.id == client_id) {
                        Some(player) => player.buffer_input(input),
                        // Inputs can race ahead of the join command; drop them
                        None => debug!(room = %self.name, client_id, "Input for unknown player"),
                    }
                }
                Ok(RoomCommand::Leave { client_id }) => {
                    if let Err(e) = self.handle_leave(client_id) {
                        error!(room = %self.name, client_id, error = %e, "Leave failed");
                    }
                }
                Ok(RoomCommand::Close) => self.close(),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.close();
                    break;
                }
            }
        }
    }

    /// One simulation tick
    fn run_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);

        // Pre phase: drain input buffers; at most one shot per player per
        // tick, using the earliest fire sample's reported frame.
        let mut shots: Vec<(usize, u32)> = Vec::new();
        for (index, player) in self.players.iter_mut().enumerate() {
            if let Some(frame) = player.pre_tick() {
                shots.push((index, frame));
            }
        }
        for (shooter_index, frame) in shots {
            self.perform_shoot_ray_cast(frame, shooter_index);
        }

        // Tick phase: advance every player in join order
        for (index, player) in self.players.iter_mut().enumerate() {
            self.player_states[index] = player.tick();
        }

        // One update per recipient, then drop the tick-scoped events
        for player in &self.players {
            let update = self.snapshot.build_for(player.input_tick, &self.player_states);
            Self::send_to(player, OutboundMessage::reliable(update));
        }
        self.snapshot.clear();
    }

    /// Resolve one lag-compensated shot and broadcast it to everyone but
    /// the shooter.
    fn perform_shoot_ray_cast(&mut self, frame: u32, shooter_index: usize) {
        let outcome = resolve_shot(&mut self.players, self.tick, frame, shooter_index);

        if let Some(hit) = outcome.hit {
            self.snapshot.push_health(PlayerHealthUpdateData {
                id: hit.target_id,
                health: hit.new_health,
            });
        }

        let shooter_id = self.players[shooter_index].id;
        debug!(
            room = %self.name,
            shooter = shooter_id,
            frame,
            hit = ?outcome.hit,
            "Shot resolved"
        );

        let shot = ServerMessage::BulletShot(BulletShotMessage {
            origin: outcome.origin,
            direction: outcome.direction,
            shooter: shooter_id,
        });
        for player in &self.players {
            if player.id != shooter_id {
                Self::send_to(player, OutboundMessage::unreliable(shot.clone()));
            }
        }
    }

    fn handle_join(
        &mut self,
        client_id: u16,
        display_name: String,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<(), GameError> {
        if self.players.len() >= self.max_slots {
            return Err(GameError::RoomFull);
        }
        if self.players.iter().any(|p| p.id == client_id) {
            warn!(room = %self.name, client_id, "Client already in room");
            return Ok(());
        }

        let position = self.spawn_position();
        let player = ServerPlayer::new(client_id, display_name, position, self.tick, sender);
        let spawn = player.spawn_data();

        Self::send_to(
            &player,
            OutboundMessage::reliable(ServerMessage::JoinRoomAccepted),
        );

        // Both aligned arrays change together
        self.players.push(player);
        self.player_states.push(PlayerStateData {
            id: client_id,
            tick: self.tick,
            position,
            ..Default::default()
        });
        self.player_count.store(self.players.len(), Ordering::Relaxed);

        // One-time game start for the new player, spawn data for everyone
        // currently in the room (the new player included)
        let start = GameStartData {
            spawns: self.players.iter().map(|p| p.spawn_data()).collect(),
            tick: self.tick,
        };
        let new_player = self
            .players
            .last()
            .expect("player was just pushed");
        Self::send_to(
            new_player,
            OutboundMessage::reliable(ServerMessage::GameStart(start)),
        );

        // The rest of the room learns about it in this tick's update
        self.snapshot.push_spawn(spawn);

        info!(
            room = %self.name,
            client_id,
            player_count = self.players.len(),
            "Player joined room"
        );
        Ok(())
    }

    fn handle_leave(&mut self, client_id: u16) -> Result<(), GameError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == client_id)
            .ok_or(GameError::PlayerNotFound(client_id))?;

        self.players.remove(index);
        self.player_states.remove(index);
        self.player_count.store(self.players.len(), Ordering::Relaxed);

        self.snapshot.push_despawn(PlayerDespawnData { id: client_id });

        info!(
            room = %self.name,
            client_id,
            player_count = self.players.len(),
            "Player left room"
        );
        Ok(())
    }

    /// Process every member through the leave path, then stop the loop
    fn close(&mut self) {
        let ids: Vec<u16> = self.players.iter().map(|p| p.id).collect();
        for client_id in ids {
            if let Err(e) = self.handle_leave(client_id) {
                error!(room = %self.name, client_id, error = %e, "Leave during close failed");
            }
        }
        self.closing = true;
    }

    fn spawn_position(&mut self) -> Vec3 {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.rng.gen_range(0.0..SPAWN_RADIUS);
        Vec3::new(angle.cos() * distance, 0.0, angle.sin() * distance)
    }

    /// Deliver one message. Reliable failures are reported per recipient
    /// and never abort the broadcast; unreliable sends drop silently.
    fn send_to(player: &ServerPlayer, msg: OutboundMessage) {
        let mode = msg.mode;
        if let Err(e) = player.sender.try_send(msg) {
            match mode {
                SendMode::Reliable => {
                    warn!(client_id = player.id, error = %e, "Dropped reliable message")
                }
                SendMode::Unreliable => {}
            }
        }
    }
}
