//! Client → server commands.

use serde::Serialize;

/// Protocol version advertised in the `Connect` command.
pub const PROTOCOL_VERSION: NetworkVersion = NetworkVersion {
    major: 0,
    minor: 6,
    build: 5,
    class: "Version",
};

/// Client identifier sent as the `uuid` field of `Connect`.
pub const CLIENT_UUID: &str = "slotkeeper";

/// Tags advertised by a text-only tracker connection.
pub const TRACKER_TAGS: [&str; 3] = ["TextOnly", "Tracker", "DeathLink"];

/// Outgoing command, tagged on the wire by its `cmd` field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd")]
pub enum ClientCommand {
    /// Join the room as a slot. Answered by `Connected` or `ConnectionRefused`.
    Connect(ConnectRequest),
    /// Ask for the item/location catalogs of the listed games.
    GetDataPackage {
        /// Game names, as announced by `RoomInfo`.
        games: Vec<String>,
    },
}

impl ClientCommand {
    /// Wire tag of this command, for logging.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Connect(_) => "Connect",
            Self::GetDataPackage { .. } => "GetDataPackage",
        }
    }
}

/// `{major, minor, build}` version triple with its wire class marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Build component.
    pub build: u32,
    /// Always `"Version"`.
    pub class: &'static str,
}

/// Payload of the `Connect` command.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectRequest {
    /// Room password; `null` for open rooms.
    pub password: Option<String>,
    /// Game the slot plays.
    pub game: String,
    /// Slot name to connect as.
    pub name: String,
    /// Client identifier.
    pub uuid: String,
    /// Protocol version.
    pub version: NetworkVersion,
    /// Bitmask of item events the client wants to receive.
    pub items_handling: u8,
    /// Capability tags.
    pub tags: Vec<String>,
    /// Whether the server should include slot data in `Connected`.
    pub slot_data: bool,
}

impl ConnectRequest {
    /// Build the request a passive tracker sends: no password, no item
    /// handling and no slot data.
    #[must_use]
    pub fn tracker(game: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            password: None,
            game: game.into(),
            name: name.into(),
            uuid: CLIENT_UUID.to_string(),
            version: PROTOCOL_VERSION,
            items_handling: 0b000,
            tags: TRACKER_TAGS.iter().map(ToString::to_string).collect(),
            slot_data: false,
        }
    }
}
