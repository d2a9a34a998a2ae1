//! Player movement integration and hitscan geometry

use crate::util::time::tick_delta;

/// Base walk speed in units per second
pub const MOVE_SPEED: f32 = 4.0;
/// Sprint speed in units per second
pub const SPRINT_SPEED: f32 = 7.0;
/// Upward velocity applied on jump
pub const JUMP_VELOCITY: f32 = 5.0;
/// Downward acceleration in units per second squared
pub const GRAVITY: f32 = 15.0;
/// Floor height players rest on
pub const GROUND_Y: f32 = 0.0;
/// Rate at which position converges toward the movement target
pub const SYNC_SPEED: f32 = 10.0;
/// Radius of the player hit sphere
pub const PLAYER_HIT_RADIUS: f32 = 1.0;

/// 3D vector, the position/direction type for the whole simulation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len < 1e-6 {
            Vec3::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    /// Linear interpolation from self toward `target` by factor `t` in [0, 1]
    pub fn lerp(self, target: Vec3, t: f32) -> Vec3 {
        let t = t.clamp(0.0, 1.0);
        self + (target - self) * t
    }

}

impl std::ops::Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Convert look angles (pitch = x, yaw = y, in degrees) to a unit aim vector
pub fn look_to_direction(look: Vec3) -> Vec3 {
    let pitch = look.x.to_radians();
    let yaw = look.y.to_radians();
    Vec3::new(
        yaw.sin() * pitch.cos(),
        -pitch.sin(),
        yaw.cos() * pitch.cos(),
    )
    .normalized()
}

/// Horizontal forward vector from a yaw angle in degrees
pub fn yaw_forward(yaw_degrees: f32) -> Vec3 {
    let yaw = yaw_degrees.to_radians();
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

/// Horizontal right vector from a yaw angle in degrees
pub fn yaw_right(yaw_degrees: f32) -> Vec3 {
    let yaw = yaw_degrees.to_radians();
    Vec3::new(yaw.cos(), 0.0, -yaw.sin())
}

/// One tick of movement for a player.
///
/// Composes the forward/right axes from the look yaw, interpolates the
/// position smoothly toward the movement target instead of snapping, and
/// integrates the gravity accumulator. Returns (new_position, new_gravity).
pub fn step_movement(
    position: Vec3,
    gravity: f32,
    movement: [f32; 2],
    look_yaw: f32,
    sprint: bool,
    jump: bool,
) -> (Vec3, f32) {
    let dt = tick_delta();

    let speed = if sprint { SPRINT_SPEED } else { MOVE_SPEED };
    let forward = yaw_forward(look_yaw);
    let right = yaw_right(look_yaw);

    let target = position + (forward * movement[1] + right * movement[0]) * speed;
    let mut new_pos = position.lerp(target, SYNC_SPEED * dt);

    let grounded = position.y <= GROUND_Y + 1e-4;
    let mut new_gravity = if jump && grounded {
        JUMP_VELOCITY
    } else {
        gravity - GRAVITY * dt
    };

    new_pos.y += new_gravity * dt;
    if new_pos.y <= GROUND_Y {
        new_pos.y = GROUND_Y;
        new_gravity = 0.0;
    }

    (new_pos, new_gravity)
}

/// A player's physics body: the thing hit tests run against.
///
/// Kept separate from the authoritative state so lag compensation can snap
/// it into the past and restore it without touching simulation state.
#[derive(Debug, Clone, Copy)]
pub struct Collider {
    pub position: Vec3,
    pub radius: f32,
    /// Collision response flag, disabled while a body is rewound
    pub enabled: bool,
}

impl Collider {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            radius: PLAYER_HIT_RADIUS,
            enabled: true,
        }
    }
}

/// Ray-vs-sphere intersection.
///
/// Returns the distance along the ray to the nearest intersection, if the
/// sphere is hit within `max_range`. `direction` must be normalized.
pub fn ray_sphere_intersect(
    origin: Vec3,
    direction: Vec3,
    center: Vec3,
    radius: f32,
    max_range: f32,
) -> Option<f32> {
    let to_center = center - origin;
    let proj = to_center.dot(direction);
    if proj < 0.0 {
        return None;
    }

    let closest_sq = to_center.dot(to_center) - proj * proj;
    let radius_sq = radius * radius;
    if closest_sq > radius_sq {
        return None;
    }

    let half_chord = (radius_sq - closest_sq).sqrt();
    let t = proj - half_chord;
    let t = if t < 0.0 { proj + half_chord } else { t };
    (t <= max_range).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_hits_sphere_ahead() {
        let t = ray_sphere_intersect(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 10.0),
            1.0,
            200.0,
        );
        assert!((t.unwrap() - 9.0).abs() < 1e-4);
    }

    #[test]
    fn ray_misses_sphere_behind() {
        let t = ray_sphere_intersect(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, -10.0),
            1.0,
            200.0,
        );
        assert!(t.is_none());
    }

    #[test]
    fn ray_respects_max_range() {
        let t = ray_sphere_intersect(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 300.0),
            1.0,
            200.0,
        );
        assert!(t.is_none());
    }

    #[test]
    fn movement_converges_toward_target() {
        // Looking down +Z, pushing forward: position should move along +Z
        let (pos, _) = step_movement(Vec3::ZERO, 0.0, [0.0, 1.0], 0.0, false, false);
        assert!(pos.z > 0.0);
        assert!(pos.x.abs() < 1e-4);
    }

    #[test]
    fn sprint_moves_further_than_walk() {
        let (walk, _) = step_movement(Vec3::ZERO, 0.0, [0.0, 1.0], 0.0, false, false);
        let (sprint, _) = step_movement(Vec3::ZERO, 0.0, [0.0, 1.0], 0.0, true, false);
        assert!(sprint.z > walk.z);
    }

    #[test]
    fn idle_player_stays_on_ground() {
        let (pos, gravity) = step_movement(Vec3::ZERO, 0.0, [0.0, 0.0], 0.0, false, false);
        assert_eq!(pos.y, GROUND_Y);
        assert_eq!(gravity, 0.0);
    }

    #[test]
    fn jump_leaves_ground_and_gravity_pulls_back() {
        let (pos, gravity) = step_movement(Vec3::ZERO, 0.0, [0.0, 0.0], 0.0, false, true);
        assert!(pos.y > GROUND_Y);
        assert!(gravity > 0.0);

        // Keep falling with no further input: eventually back on the ground
        let (mut pos, mut gravity) = (pos, gravity);
        for _ in 0..120 {
            let (p, g) = step_movement(pos, gravity, [0.0, 0.0], 0.0, false, false);
            pos = p;
            gravity = g;
        }
        assert_eq!(pos.y, GROUND_Y);
    }

    #[test]
    fn look_direction_straight_ahead() {
        let dir = look_to_direction(Vec3::new(0.0, 0.0, 0.0));
        assert!((dir.z - 1.0).abs() < 1e-4);
    }
}
