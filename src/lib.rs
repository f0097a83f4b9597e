//! Slotkeeper - room client and slot registration keeper.
//!
//! Connects to one multiworld room server as a tracker, keeps a live index of
//! the room's slots, and records which users are registered for which slots.
//!
//! # Architecture
//!
//! - **Codec** ([`protocol`]) - JSON-array frames to typed events and back
//! - **Client** ([`client`]) - handshake state machine, read loop, handler dispatch
//! - **Directory** ([`directory`]) and **Catalog** ([`catalog`]) - event subscribers
//! - **Store** ([`store`]) - write-through per-room registration file
//! - **Commands** ([`commands`]) - text command surface over all of the above
//!
//! Room addresses come from the room web page ([`web`]); the client itself
//! only ever sees a `wss://` address.

pub mod catalog;
pub mod client;
pub mod commands;
pub mod directory;
pub mod protocol;
pub mod store;
pub mod web;
pub mod ws;

pub mod config;
pub mod logging;

// Re-export commonly used types
pub use catalog::GameCatalog;
pub use client::{ClientError, ClientSettings, ConnectionState, ProtocolClient};
pub use config::Config;
pub use directory::{DirectoryError, SlotDirectory};
pub use logging::LogContext;
pub use protocol::{EventKind, ServerEvent, SlotInfo};
pub use store::{RegistrationStore, StoreError};
pub use web::{RoomAddress, RoomLocator};
