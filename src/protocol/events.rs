//! Server → client events and the roster/catalog types they carry.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Numeric slot identifier assigned by the server.
pub type SlotId = i64;

/// Kind of a server event; the same tag the wire uses in its `cmd` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Room announcement, the first message of every connection.
    RoomInfo,
    /// Connection accepted.
    Connected,
    /// Connection rejected.
    ConnectionRefused,
    /// Room state changed (possibly including the roster).
    RoomUpdate,
    /// Item/location catalogs delivered.
    DataPackage,
}

impl EventKind {
    /// Every kind the decoder understands.
    pub const ALL: [Self; 5] = [
        Self::RoomInfo,
        Self::Connected,
        Self::ConnectionRefused,
        Self::RoomUpdate,
        Self::DataPackage,
    ];

    /// Look up a kind by its wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Wire tag for this kind.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::RoomInfo => "RoomInfo",
            Self::Connected => "Connected",
            Self::ConnectionRefused => "ConnectionRefused",
            Self::RoomUpdate => "RoomUpdate",
            Self::DataPackage => "DataPackage",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A decoded server message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd")]
pub enum ServerEvent {
    /// See [`RoomInfo`].
    RoomInfo(RoomInfo),
    /// See [`Connected`].
    Connected(Connected),
    /// See [`ConnectionRefused`].
    ConnectionRefused(ConnectionRefused),
    /// See [`RoomUpdate`].
    RoomUpdate(RoomUpdate),
    /// See [`DataPackage`].
    DataPackage(DataPackage),
}

impl ServerEvent {
    /// The kind used to route this event to handlers.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RoomInfo(_) => EventKind::RoomInfo,
            Self::Connected(_) => EventKind::Connected,
            Self::ConnectionRefused(_) => EventKind::ConnectionRefused,
            Self::RoomUpdate(_) => EventKind::RoomUpdate,
            Self::DataPackage(_) => EventKind::DataPackage,
        }
    }

    /// Roster carried by this event, if any.
    ///
    /// `Connected` always carries one; `RoomUpdate` only when the player list
    /// changed.
    #[must_use]
    pub fn roster(&self) -> Option<Vec<SlotInfo>> {
        match self {
            Self::Connected(connected) => Some(connected.roster()),
            Self::RoomUpdate(update) => update.roster(),
            _ => None,
        }
    }
}

/// Room announcement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomInfo {
    /// Games present in the room; parameterizes the catalog request.
    #[serde(default)]
    pub games: Vec<String>,
}

/// One roster entry as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkPlayer {
    /// Slot id.
    pub slot: SlotId,
    /// Server-assigned slot name.
    pub name: String,
    /// Current display alias.
    pub alias: String,
}

/// Static per-slot details, keyed by slot id on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkSlot {
    /// Game played in the slot.
    #[serde(default)]
    pub game: String,
}

/// Connection acceptance.
#[derive(Debug, Clone, Deserialize)]
pub struct Connected {
    /// Slot id assigned to this connection.
    pub slot: SlotId,
    /// Every slot in the room, in server order.
    pub players: Vec<NetworkPlayer>,
    /// Per-slot details; keys are stringified slot ids.
    #[serde(default)]
    pub slot_info: HashMap<String, NetworkSlot>,
}

impl Connected {
    /// Combine `players` and `slot_info` into the roster.
    #[must_use]
    pub fn roster(&self) -> Vec<SlotInfo> {
        build_roster(&self.players, &self.slot_info)
    }
}

/// Connection rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionRefused {
    /// Human-readable reasons, verbatim from the server.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Room state change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomUpdate {
    /// New roster, present only when the player list changed.
    #[serde(default)]
    pub players: Option<Vec<NetworkPlayer>>,
    /// Per-slot details, rarely present on updates.
    #[serde(default)]
    pub slot_info: HashMap<String, NetworkSlot>,
}

impl RoomUpdate {
    /// Roster carried by this update, if any.
    #[must_use]
    pub fn roster(&self) -> Option<Vec<SlotInfo>> {
        self.players
            .as_ref()
            .map(|players| build_roster(players, &self.slot_info))
    }
}

fn build_roster(players: &[NetworkPlayer], slot_info: &HashMap<String, NetworkSlot>) -> Vec<SlotInfo> {
    players
        .iter()
        .map(|player| SlotInfo {
            id: player.slot,
            name: player.name.clone(),
            alias: player.alias.clone(),
            game: slot_info
                .get(&player.slot.to_string())
                .map(|info| info.game.clone())
                .unwrap_or_default(),
        })
        .collect()
}

/// Catalog delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPackage {
    /// Catalog body.
    pub data: DataPackageBody,
}

/// Body of a [`DataPackage`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataPackageBody {
    /// Catalog per game name.
    #[serde(default)]
    pub games: HashMap<String, GameData>,
}

/// Name → id tables of one game.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameData {
    /// Item names to ids.
    #[serde(default)]
    pub item_name_to_id: HashMap<String, i64>,
    /// Location names to ids.
    #[serde(default)]
    pub location_name_to_id: HashMap<String, i64>,
}

impl DataPackage {
    /// Flatten the item tables into entries, grouped by game.
    #[must_use]
    pub fn items(&self) -> HashMap<String, Vec<ItemInfo>> {
        self.data
            .games
            .iter()
            .map(|(game, data)| (game.clone(), entries(game, &data.item_name_to_id)))
            .collect()
    }

    /// Flatten the location tables into entries, grouped by game.
    #[must_use]
    pub fn locations(&self) -> HashMap<String, Vec<LocationInfo>> {
        self.data
            .games
            .iter()
            .map(|(game, data)| (game.clone(), entries(game, &data.location_name_to_id)))
            .collect()
    }
}

fn entries(game: &str, table: &HashMap<String, i64>) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = table
        .iter()
        .map(|(name, id)| CatalogEntry {
            id: *id,
            name: name.clone(),
            game: game.to_string(),
        })
        .collect();
    entries.sort_by_key(|entry| entry.id);
    entries
}

/// One game-world slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotInfo {
    /// Immutable primary key.
    pub id: SlotId,
    /// Server-assigned unique name.
    pub name: String,
    /// User-facing display label.
    pub alias: String,
    /// Game played in the slot (empty when the server did not say).
    pub game: String,
}

impl fmt::Display for SlotInfo {
    /// `alias (name)` when the alias differs from the name, else `name`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alias == self.name {
            f.write_str(&self.name)
        } else {
            write!(f, "{} ({})", self.alias, self.name)
        }
    }
}

/// One catalog entry: an item or a location of a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogEntry {
    /// Numeric id, unique within the game.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Owning game.
    pub game: String,
}

/// Item catalog entry.
pub type ItemInfo = CatalogEntry;

/// Location catalog entry.
pub type LocationInfo = CatalogEntry;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_tags_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(EventKind::from_tag("PrintJSON"), None);
    }

    #[test]
    fn test_slot_display_form() {
        let mut slot = SlotInfo {
            id: 3,
            name: "Hero".to_string(),
            alias: "Hero".to_string(),
            game: "A Link to the Past".to_string(),
        };
        assert_eq!(slot.to_string(), "Hero");

        slot.alias = "Zed".to_string();
        assert_eq!(slot.to_string(), "Zed (Hero)");
    }

    #[test]
    fn test_connected_roster_joins_slot_info() {
        let connected: Connected = serde_json::from_value(serde_json::json!({
            "slot": 2,
            "players": [
                {"team": 0, "slot": 1, "name": "Hero", "alias": "Zed", "class": "NetworkPlayer"},
                {"team": 0, "slot": 2, "name": "Tracker", "alias": "Tracker"}
            ],
            "slot_info": {"1": {"name": "Hero", "game": "Ocarina of Time", "type": 1}}
        }))
        .unwrap();

        let roster = connected.roster();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].game, "Ocarina of Time");
        assert_eq!(roster[1].game, "");
        assert_eq!(roster[1].id, 2);
    }

    #[test]
    fn test_data_package_entries_sorted_by_id() {
        let package: DataPackage = serde_json::from_value(serde_json::json!({
            "data": {"games": {"Clique": {
                "item_name_to_id": {"Button Activation": 69696968, "Feeling of Satisfaction": 69696969},
                "location_name_to_id": {"The Big Red Button": 69696969}
            }}}
        }))
        .unwrap();

        let items = package.items();
        let clique = &items["Clique"];
        assert_eq!(clique[0].name, "Button Activation");
        assert_eq!(clique[1].id, 69_696_969);
        assert_eq!(package.locations()["Clique"][0].game, "Clique");
    }
}
