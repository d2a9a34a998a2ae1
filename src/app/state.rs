use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::game::RoomRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRegistry>,
    next_client_id: Arc<AtomicU16>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            rooms: Arc::new(RoomRegistry::new()),
            next_client_id: Arc::new(AtomicU16::new(1)),
        }
    }

    /// Hand out the next connection id. Ids are per-process and wrap at
    /// u16::MAX, long after any realistic connection count.
    pub fn allocate_client_id(&self) -> u16 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }
}
