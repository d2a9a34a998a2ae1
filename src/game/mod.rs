//! Game simulation modules

pub mod combat;
pub mod input;
pub mod physics;
pub mod player;
pub mod room;
pub mod snapshot;

pub use room::{Room, RoomHandle, RoomRegistry};

use tokio::sync::mpsc;

use crate::game::input::PlayerInputData;
use crate::ws::protocol::{SendMode, ServerMessage};

/// A message queued for delivery to one client
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub mode: SendMode,
    pub message: ServerMessage,
}

impl OutboundMessage {
    pub fn reliable(message: ServerMessage) -> Self {
        Self {
            mode: SendMode::Reliable,
            message,
        }
    }

    pub fn unreliable(message: ServerMessage) -> Self {
        Self {
            mode: SendMode::Unreliable,
            message,
        }
    }
}

/// Commands handed from the network side into a room's tick loop.
///
/// The room task is the sole owner of room state; connection handlers only
/// ever send these over the room's command channel.
#[derive(Debug)]
pub enum RoomCommand {
    /// A client joins the room's gameplay
    Join {
        client_id: u16,
        display_name: String,
        sender: mpsc::Sender<OutboundMessage>,
    },
    /// One input sample from a client
    Input {
        client_id: u16,
        input: PlayerInputData,
    },
    /// A client leaves (or disconnected)
    Leave { client_id: u16 },
    /// Close the room: every member is processed through the leave path
    Close,
}

/// Game logic errors
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Leave for a client with no live player entity: an invariant
    /// violation, surfaced rather than swallowed
    #[error("client {0} has no player entity in this room")]
    PlayerNotFound(u16),

    #[error("room is at capacity")]
    RoomFull,
}
