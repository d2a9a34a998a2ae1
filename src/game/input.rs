//! Per-player input buffering and coalescing

use crate::game::physics::Vec3;

/// Number of key slots in an input sample
pub const KEY_COUNT: usize = 8;

/// Key indices within [`PlayerInputData::keys`]
pub const KEY_JUMP: usize = 0;
pub const KEY_SPRINT: usize = 1;
pub const KEY_FIRE: usize = 2;

/// Maximum samples a buffer holds before the oldest are dropped.
/// Bounds memory under a stalled server or a flooding client.
pub const INPUT_BUFFER_CAPACITY: usize = 64;

/// One input sample as captured on the client. Immutable once enqueued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerInputData {
    /// Movement axes: [strafe, forward], each in [-1, 1]
    pub movement: [f32; 2],
    /// Discrete key states, see the KEY_* indices
    pub keys: [bool; KEY_COUNT],
    /// Look angles at capture time (pitch = x, yaw = y, degrees)
    pub look_direction: Vec3,
    /// Client-local tick at which this sample was captured
    pub time: u32,
}

impl Default for PlayerInputData {
    fn default() -> Self {
        Self {
            movement: [0.0, 0.0],
            keys: [false; KEY_COUNT],
            look_direction: Vec3::ZERO,
            time: 0,
        }
    }
}

/// Queue of input samples accumulated between simulation ticks.
///
/// The network side appends, the tick loop drains exactly once per tick.
/// Zero samples (stalled client) and many samples (client sending faster
/// than the server ticks) are both normal.
#[derive(Debug, Default)]
pub struct InputBuffer {
    samples: Vec<PlayerInputData>,
    dropped: u64,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. Never blocks; once the capacity is reached the
    /// oldest sample is dropped to make room.
    pub fn add(&mut self, input: PlayerInputData) {
        if self.samples.len() >= INPUT_BUFFER_CAPACITY {
            self.samples.remove(0);
            self.dropped += 1;
        }
        self.samples.push(input);
    }

    /// Remove and return every sample accumulated since the last drain,
    /// in arrival order.
    pub fn drain(&mut self) -> Vec<PlayerInputData> {
        std::mem::take(&mut self.samples)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total samples discarded by the capacity policy
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// The effective input for one tick, merged from a batch of samples
#[derive(Debug, Clone, Copy)]
pub struct CoalescedInput {
    pub movement: [f32; 2],
    pub keys: [bool; KEY_COUNT],
    pub look_direction: Vec3,
    /// How many samples were merged
    pub sample_count: u32,
}

/// Merge a tick's worth of samples into one effective input.
///
/// Key flags are OR-ed across the whole batch so no discrete press is
/// lost; look direction and movement axes come from the newest sample so
/// the latest directional intent wins. Returns None for an empty batch.
pub fn coalesce(samples: &[PlayerInputData]) -> Option<CoalescedInput> {
    let last = samples.last()?;

    let mut keys = [false; KEY_COUNT];
    for sample in samples {
        for (merged, &key) in keys.iter_mut().zip(sample.keys.iter()) {
            *merged |= key;
        }
    }

    Some(CoalescedInput {
        movement: last.movement,
        keys,
        look_direction: last.look_direction,
        sample_count: samples.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: u32) -> PlayerInputData {
        PlayerInputData {
            time,
            ..Default::default()
        }
    }

    #[test]
    fn drain_returns_samples_in_arrival_order() {
        let mut buffer = InputBuffer::new();
        for t in 0..5 {
            buffer.add(sample(t));
        }

        let drained = buffer.drain();
        assert_eq!(drained.len(), 5);
        assert!(drained.windows(2).all(|w| w[0].time < w[1].time));
        assert!(buffer.is_empty());
    }

    #[test]
    fn drain_of_empty_buffer_is_empty() {
        let mut buffer = InputBuffer::new();
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn capacity_drops_oldest_first() {
        let mut buffer = InputBuffer::new();
        for t in 0..(INPUT_BUFFER_CAPACITY as u32 + 10) {
            buffer.add(sample(t));
        }

        let drained = buffer.drain();
        assert_eq!(drained.len(), INPUT_BUFFER_CAPACITY);
        assert_eq!(drained[0].time, 10); // 10 oldest dropped
        assert_eq!(buffer.dropped(), 10);
    }

    #[test]
    fn coalesce_ors_keys_and_keeps_last_axes() {
        let mut a = sample(1);
        a.keys[KEY_JUMP] = true;
        a.movement = [1.0, 0.0];
        a.look_direction = Vec3::new(10.0, 20.0, 0.0);

        let mut b = sample(2);
        b.keys[KEY_FIRE] = true;
        b.movement = [0.0, -1.0];
        b.look_direction = Vec3::new(-5.0, 90.0, 0.0);

        let merged = coalesce(&[a, b]).unwrap();
        assert!(merged.keys[KEY_JUMP]);
        assert!(merged.keys[KEY_FIRE]);
        assert!(!merged.keys[KEY_SPRINT]);
        assert_eq!(merged.movement, [0.0, -1.0]);
        assert_eq!(merged.look_direction, Vec3::new(-5.0, 90.0, 0.0));
        assert_eq!(merged.sample_count, 2);
    }

    #[test]
    fn coalesce_empty_batch_is_none() {
        assert!(coalesce(&[]).is_none());
    }
}
