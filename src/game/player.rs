//! Authoritative per-player simulation state

use std::collections::VecDeque;

use tokio::sync::mpsc;

use crate::game::input::{coalesce, InputBuffer, PlayerInputData, KEY_FIRE, KEY_JUMP, KEY_SPRINT};
use crate::game::physics::{step_movement, Collider, Vec3};
use crate::game::OutboundMessage;
use crate::ws::protocol::PlayerSpawnData;

/// History entries retained per player for lag compensation
pub const HISTORY_LEN: usize = 10;

/// Starting and respawn health
pub const MAX_HEALTH: u8 = 100;

/// Offset applied to the current position when respawning
pub const RESPAWN_OFFSET: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// One authoritative state snapshot. Value type: copied into history and
/// into outgoing updates, never aliased.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerStateData {
    /// Owning client id
    pub id: u16,
    /// Input-derived tick counter
    pub tick: u32,
    pub position: Vec3,
    /// Look angles (pitch = x, yaw = y, degrees)
    pub look_direction: Vec3,
    /// Accumulated vertical velocity from gravity/jumping
    pub gravity: f32,
}

/// One connected, in-game client
pub struct ServerPlayer {
    pub id: u16,
    pub display_name: String,

    input_buffer: InputBuffer,
    /// Samples drained in the pre phase, consumed by the tick phase
    pending: Vec<PlayerInputData>,

    pub state: PlayerStateData,
    /// Last N states, front oldest. Invariant: len <= HISTORY_LEN.
    pub history: VecDeque<PlayerStateData>,
    pub health: u8,
    /// Last-acknowledged input tick, echoed back in every update
    pub input_tick: u32,

    /// Physics body for hit tests; rewound and restored by lag compensation
    pub collider: Collider,

    /// Outbound channel to this client's connection
    pub sender: mpsc::Sender<OutboundMessage>,
}

impl ServerPlayer {
    pub fn new(
        id: u16,
        display_name: String,
        position: Vec3,
        room_tick: u32,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        let state = PlayerStateData {
            id,
            tick: room_tick,
            position,
            look_direction: Vec3::ZERO,
            gravity: 0.0,
        };

        Self {
            id,
            display_name,
            input_buffer: InputBuffer::new(),
            pending: Vec::new(),
            state,
            history: VecDeque::with_capacity(HISTORY_LEN),
            health: MAX_HEALTH,
            input_tick: room_tick,
            collider: Collider::new(position),
            sender,
        }
    }

    /// Called from the room's command dispatch when input arrives
    pub fn buffer_input(&mut self, input: PlayerInputData) {
        self.input_buffer.add(input);
    }

    /// Pre phase: drain the input buffer. If any buffered sample has the
    /// fire key down, return the earliest such sample's reported tick so
    /// the room can resolve exactly one shot for this player this tick.
    pub fn pre_tick(&mut self) -> Option<u32> {
        self.pending = self.input_buffer.drain();
        self.pending
            .iter()
            .find(|sample| sample.keys[KEY_FIRE])
            .map(|sample| sample.time)
    }

    /// Tick phase: coalesce the drained samples, advance movement, append
    /// to history. With no samples the state carries forward unchanged but
    /// history is still appended.
    pub fn tick(&mut self) -> PlayerStateData {
        let pending = std::mem::take(&mut self.pending);

        if let Some(merged) = coalesce(&pending) {
            // Each buffered sample counts as one tick of input progress
            self.input_tick = self.input_tick.wrapping_add(merged.sample_count);

            let (position, gravity) = step_movement(
                self.state.position,
                self.state.gravity,
                merged.movement,
                merged.look_direction.y,
                merged.keys[KEY_SPRINT],
                merged.keys[KEY_JUMP],
            );

            self.state.position = position;
            self.state.gravity = gravity;
            self.state.look_direction = merged.look_direction;
            self.state.tick = self.input_tick;
        }

        self.history.push_back(self.state);
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }

        self.collider.position = self.state.position;
        self.state
    }

    /// Apply damage. Reaching zero respawns the player: health back to
    /// full, teleport by the respawn offset, gravity reset. Returns the
    /// resulting health; the caller queues the health-update event.
    pub fn take_damage(&mut self, amount: u8) -> u8 {
        self.health = self.health.saturating_sub(amount);
        if self.health == 0 {
            self.health = MAX_HEALTH;
            self.state.position = self.state.position + RESPAWN_OFFSET;
            self.state.gravity = 0.0;
            self.collider.position = self.state.position;
        }
        self.health
    }

    pub fn spawn_data(&self) -> PlayerSpawnData {
        PlayerSpawnData {
            id: self.id,
            name: self.display_name.clone(),
            position: self.state.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::KEY_COUNT;

    fn test_player(id: u16) -> ServerPlayer {
        let (tx, _rx) = mpsc::channel(8);
        ServerPlayer::new(id, format!("player-{id}"), Vec3::ZERO, 0, tx)
    }

    fn input_at(time: u32) -> PlayerInputData {
        PlayerInputData {
            movement: [0.0, 0.0],
            keys: [false; KEY_COUNT],
            look_direction: Vec3::ZERO,
            time,
        }
    }

    #[test]
    fn history_never_exceeds_cap() {
        let mut player = test_player(1);
        for t in 0..50 {
            player.buffer_input(input_at(t));
            player.pre_tick();
            player.tick();
            assert!(player.history.len() <= HISTORY_LEN);
        }
        assert_eq!(player.history.len(), HISTORY_LEN);
    }

    #[test]
    fn idle_tick_carries_state_and_appends_history() {
        let mut player = test_player(1);
        let before = player.state;

        assert!(player.pre_tick().is_none());
        let after = player.tick();

        assert_eq!(after, before);
        assert_eq!(player.history.len(), 1);
        assert_eq!(player.history[0], before);
    }

    #[test]
    fn fire_reports_earliest_fire_sample_tick() {
        let mut player = test_player(1);

        player.buffer_input(input_at(10));
        let mut firing = input_at(11);
        firing.keys[KEY_FIRE] = true;
        player.buffer_input(firing);
        let mut also_firing = input_at(12);
        also_firing.keys[KEY_FIRE] = true;
        player.buffer_input(also_firing);

        assert_eq!(player.pre_tick(), Some(11));
    }

    #[test]
    fn input_tick_advances_per_buffered_sample() {
        let mut player = test_player(1);
        for t in 0..3 {
            player.buffer_input(input_at(t));
        }
        player.pre_tick();
        player.tick();
        assert_eq!(player.input_tick, 3);
    }

    #[test]
    fn lethal_damage_respawns_with_offset() {
        let mut player = test_player(1);
        let pre_death = player.state.position;

        assert_eq!(player.take_damage(30), 70);

        // 14 more hits of 5 bring 70 to 0
        for _ in 0..13 {
            player.take_damage(5);
        }
        let health = player.take_damage(5);

        assert_eq!(health, MAX_HEALTH);
        assert_eq!(player.state.position, pre_death + RESPAWN_OFFSET);
        assert_eq!(player.state.gravity, 0.0);
    }

    #[test]
    fn overkill_damage_still_respawns_at_full() {
        let mut player = test_player(1);
        assert_eq!(player.take_damage(200), MAX_HEALTH);
    }
}
