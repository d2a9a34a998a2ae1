//! Per-tick snapshot assembly.
//!
//! Accumulates the tick-scoped event lists (spawns, despawns, health
//! updates) and builds one update message per recipient. The event lists
//! must be cleared after each broadcast; the state array is not ours to
//! clear, it always reflects current truth.

use crate::game::player::PlayerStateData;
use crate::ws::protocol::{
    GameUpdateData, PlayerDespawnData, PlayerHealthUpdateData, PlayerSpawnData, ServerMessage,
};

/// Builds the per-tick update messages
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    spawns: Vec<PlayerSpawnData>,
    despawns: Vec<PlayerDespawnData>,
    healths: Vec<PlayerHealthUpdateData>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_spawn(&mut self, spawn: PlayerSpawnData) {
        self.spawns.push(spawn);
    }

    pub fn push_despawn(&mut self, despawn: PlayerDespawnData) {
        self.despawns.push(despawn);
    }

    pub fn push_health(&mut self, health: PlayerHealthUpdateData) {
        self.healths.push(health);
    }

    /// Build the update for one recipient: their own acknowledged input
    /// tick plus the shared state array and this tick's event lists.
    pub fn build_for(&self, ack_tick: u32, states: &[PlayerStateData]) -> ServerMessage {
        ServerMessage::GameUpdate(GameUpdateData {
            ack_tick,
            states: states.to_vec(),
            spawns: self.spawns.clone(),
            despawns: self.despawns.clone(),
            healths: self.healths.clone(),
        })
    }

    /// Drop the tick-scoped event lists. Called once per tick, after every
    /// recipient's update has been built.
    pub fn clear(&mut self) {
        self.spawns.clear();
        self.despawns.clear();
        self.healths.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty() && self.despawns.is_empty() && self.healths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::Vec3;

    #[test]
    fn events_are_tick_scoped() {
        let mut builder = SnapshotBuilder::new();
        builder.push_spawn(PlayerSpawnData {
            id: 1,
            name: "a".to_string(),
            position: Vec3::ZERO,
        });
        builder.push_health(PlayerHealthUpdateData { id: 1, health: 95 });

        let states = [PlayerStateData {
            id: 1,
            ..Default::default()
        }];
        let msg = builder.build_for(4, &states);
        match msg {
            ServerMessage::GameUpdate(update) => {
                assert_eq!(update.ack_tick, 4);
                assert_eq!(update.states.len(), 1);
                assert_eq!(update.spawns.len(), 1);
                assert_eq!(update.healths.len(), 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        builder.clear();
        assert!(builder.is_empty());

        // Next tick's update carries no stale events
        match builder.build_for(5, &states) {
            ServerMessage::GameUpdate(update) => {
                assert!(update.spawns.is_empty());
                assert!(update.despawns.is_empty());
                assert!(update.healths.is_empty());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
