//! Lag-compensated hitscan resolution.
//!
//! A shot is resolved against the world as the shooter saw it: every
//! player with enough retained history is snapped back to the historical
//! entry matching the shooter's claimed frame, one ray is cast, damage is
//! applied, and every body is restored to its own real-time state before
//! returning. Restoration is unconditional, hit or miss.

use crate::game::physics::{look_to_direction, ray_sphere_intersect, Vec3};
use crate::game::player::ServerPlayer;

/// Damage applied per hit
pub const HIT_DAMAGE: u8 = 5;
/// Ray origin offset along the aim direction (muzzle distance)
pub const MUZZLE_OFFSET: f32 = 3.0;
/// Maximum hitscan range
pub const MAX_RANGE: f32 = 200.0;

/// A resolved hit on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitInfo {
    pub target_id: u16,
    pub new_health: u8,
}

/// Result of resolving one shot
#[derive(Debug, Clone, Copy)]
pub struct ShotOutcome {
    pub origin: Vec3,
    pub direction: Vec3,
    pub hit: Option<HitInfo>,
}

/// Resolve one shot fired by `players[shooter_index]`, who claims to have
/// observed the world at tick `frame`.
///
/// A frame older than the retained history (or claiming the future, which
/// wraps to a huge rewind) degrades to current-time hit testing; that is a
/// defined fallback, not an error.
pub fn resolve_shot(
    players: &mut [ServerPlayer],
    current_tick: u32,
    frame: u32,
    shooter_index: usize,
) -> ShotOutcome {
    let rewind = current_tick.wrapping_sub(1).wrapping_sub(frame) as usize;

    // Ray origin and direction from the shooter's claimed point in time,
    // falling back to the present when history does not reach that far.
    let shooter = &players[shooter_index];
    let aim_state = shooter
        .history
        .get(rewind)
        .copied()
        .unwrap_or(shooter.state);
    let direction = look_to_direction(aim_state.look_direction);
    let origin = aim_state.position + direction * MUZZLE_OFFSET;

    // Rewind: disable collision response and snap every body with enough
    // history to where it was at the claimed frame.
    for player in players.iter_mut() {
        if let Some(past) = player.history.get(rewind) {
            player.collider.enabled = false;
            player.collider.position = past.position;
        }
    }

    // Single raycast against the rewound world, nearest target wins.
    let shooter_id = players[shooter_index].id;
    let mut nearest: Option<(usize, f32)> = None;
    for (index, player) in players.iter().enumerate() {
        if player.id == shooter_id {
            continue;
        }
        if let Some(t) = ray_sphere_intersect(
            origin,
            direction,
            player.collider.position,
            player.collider.radius,
            MAX_RANGE,
        ) {
            if nearest.map_or(true, |(_, best)| t < best) {
                nearest = Some((index, t));
            }
        }
    }

    let hit = nearest.map(|(index, _)| {
        let new_health = players[index].take_damage(HIT_DAMAGE);
        HitInfo {
            target_id: players[index].id,
            new_health,
        }
    });

    // Restore every body from its own real-time state, unconditionally.
    // Using each player's current state (not a value captured up front)
    // keeps concurrent shots within one tick independent.
    for player in players.iter_mut() {
        player.collider.position = player.state.position;
        player.collider.enabled = true;
    }

    ShotOutcome {
        origin,
        direction,
        hit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::{PlayerStateData, ServerPlayer, MAX_HEALTH};
    use tokio::sync::mpsc;

    fn player_at(id: u16, position: Vec3) -> ServerPlayer {
        let (tx, _rx) = mpsc::channel(8);
        ServerPlayer::new(id, format!("p{id}"), position, 0, tx)
    }

    fn state_at(id: u16, tick: u32, position: Vec3) -> PlayerStateData {
        PlayerStateData {
            id,
            tick,
            position,
            look_direction: Vec3::ZERO,
            gravity: 0.0,
        }
    }

    /// Shooter at origin looking down +Z. Target's live position is off to
    /// the side, but its historical position sits in the ray path.
    #[test]
    fn rewound_target_is_hit_at_historical_position() {
        let mut shooter = player_at(1, Vec3::ZERO);
        let mut target = player_at(2, Vec3::new(50.0, 0.0, 0.0));

        let current_tick = 10u32;
        let frame = current_tick - 3; // rewind = 2
        let in_path = Vec3::new(0.0, 0.0, 20.0);
        let live = target.state.position;

        for i in 0..4u32 {
            shooter.history.push_back(state_at(1, i, Vec3::ZERO));
            // Index 2 is the entry the resolver will snap to
            let pos = if i == 2 { in_path } else { live };
            target.history.push_back(state_at(2, i, pos));
        }

        let mut players = vec![shooter, target];
        let outcome = resolve_shot(&mut players, current_tick, frame, 0);

        let hit = outcome.hit.expect("target should be hit");
        assert_eq!(hit.target_id, 2);
        assert_eq!(hit.new_health, MAX_HEALTH - HIT_DAMAGE);

        // Live position untouched, collider restored and re-enabled
        assert_eq!(players[1].state.position, live);
        assert_eq!(players[1].collider.position, live);
        assert!(players[1].collider.enabled);
        assert_eq!(players[1].health, MAX_HEALTH - HIT_DAMAGE);
    }

    #[test]
    fn miss_still_restores_all_positions() {
        let mut shooter = player_at(1, Vec3::ZERO);
        let mut target = player_at(2, Vec3::new(50.0, 0.0, 0.0));

        for i in 0..5u32 {
            shooter.history.push_back(state_at(1, i, Vec3::ZERO));
            target.history.push_back(state_at(2, i, Vec3::new(-40.0, 0.0, -40.0)));
        }

        let mut players = vec![shooter, target];
        let outcome = resolve_shot(&mut players, 10, 7, 0);

        assert!(outcome.hit.is_none());
        for player in &players {
            assert_eq!(player.collider.position, player.state.position);
            assert!(player.collider.enabled);
        }
    }

    #[test]
    fn rewind_beyond_history_falls_back_to_current_state() {
        let shooter = player_at(1, Vec3::ZERO);
        let target = player_at(2, Vec3::new(0.0, 0.0, 30.0));
        // No history at all: rewind is impossible for either player

        let mut players = vec![shooter, target];
        let outcome = resolve_shot(&mut players, 100, 3, 0);

        // Current-time test: target's live position is in the ray path
        let hit = outcome.hit.expect("current-time fallback should hit");
        assert_eq!(hit.target_id, 2);
    }

    #[test]
    fn future_frame_does_not_panic() {
        let shooter = player_at(1, Vec3::ZERO);
        let target = player_at(2, Vec3::new(0.0, 0.0, 30.0));

        let mut players = vec![shooter, target];
        // frame > current_tick wraps to an enormous rewind, which simply
        // degrades to the current-time path
        let outcome = resolve_shot(&mut players, 5, 9, 0);
        assert!(outcome.hit.is_some());
    }

    #[test]
    fn ray_origin_is_offset_along_direction() {
        let mut shooter = player_at(1, Vec3::ZERO);
        shooter.state.look_direction = Vec3::ZERO; // looking down +Z

        let mut players = vec![shooter];
        let outcome = resolve_shot(&mut players, 1, 0, 0);

        assert!((outcome.origin.z - MUZZLE_OFFSET).abs() < 1e-4);
        assert!((outcome.direction.z - 1.0).abs() < 1e-4);
    }
}
