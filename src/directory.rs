//! Slot directory: resolves user-supplied slot names to roster entries.
//!
//! Kept current by subscribing to `Connected` and `RoomUpdate` events. Every
//! roster-carrying event rebuilds the whole index and swaps it in under one
//! write lock, so readers see either the old roster or the new one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::client::ProtocolClient;
use crate::logging::LogContext;
use crate::protocol::{EventKind, ServerEvent, SlotId, SlotInfo};

/// Directory lookup failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// No slot matches the input.
    UnknownSlot(String),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSlot(input) => write!(f, "Unknown slot: {input}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Lookup key: a slot id or a name/alias string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRef {
    /// Numeric slot id.
    Id(SlotId),
    /// Name, alias or display form, matched case-insensitively. A numeric
    /// string that matches no name falls back to an id lookup.
    Name(String),
}

impl From<SlotId> for SlotRef {
    fn from(id: SlotId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for SlotRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for SlotRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Default)]
struct Index {
    roster: Vec<SlotInfo>,
    by_id: HashMap<SlotId, usize>,
    by_name: HashMap<String, usize>,
    own_slot: Option<SlotId>,
}

impl Index {
    fn build(roster: Vec<SlotInfo>, own_slot: Option<SlotId>) -> Self {
        let mut by_id = HashMap::with_capacity(roster.len());
        let mut by_name = HashMap::with_capacity(roster.len() * 2);

        // Names are unique and indexed first so no alias or display form can
        // shadow one. Aliases may collide transiently; the first claimant wins.
        for (position, slot) in roster.iter().enumerate() {
            by_id.insert(slot.id, position);
            by_name.insert(slot.name.to_lowercase(), position);
        }
        for (position, slot) in roster.iter().enumerate() {
            by_name.entry(slot.alias.to_lowercase()).or_insert(position);
            if slot.alias != slot.name {
                by_name
                    .entry(slot.to_string().to_lowercase())
                    .or_insert(position);
            }
        }

        Self {
            roster,
            by_id,
            by_name,
            own_slot,
        }
    }

    fn resolve(&self, slot: &SlotRef) -> Option<&SlotInfo> {
        let position = match slot {
            SlotRef::Id(id) => self.by_id.get(id),
            SlotRef::Name(input) => {
                let key = input.trim().to_lowercase();
                self.by_name.get(&key).or_else(|| {
                    key.parse::<SlotId>()
                        .ok()
                        .and_then(|id| self.by_id.get(&id))
                })
            }
        }?;
        self.roster.get(*position)
    }
}

/// Live index of the room's slots.
#[derive(Debug)]
pub struct SlotDirectory {
    index: RwLock<Index>,
    log: LogContext,
}

impl SlotDirectory {
    /// Empty directory.
    pub fn new(log: LogContext) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            log,
        }
    }

    /// Subscribe this directory to roster-carrying events of `client`.
    pub fn attach(self: &Arc<Self>, client: &ProtocolClient) {
        for kind in [EventKind::Connected, EventKind::RoomUpdate] {
            let directory = Arc::clone(self);
            client.add_handler(kind, move |event| {
                let directory = Arc::clone(&directory);
                async move {
                    directory.apply(&event);
                    Ok(())
                }
            });
        }
    }

    /// Rebuild from `event` if it carries a roster; other events are ignored.
    pub fn apply(&self, event: &ServerEvent) {
        let Some(roster) = event.roster() else {
            log::trace!(target: self.log.target(), "{} carries no roster; directory unchanged", event.kind());
            return;
        };

        let own_slot = match event {
            ServerEvent::Connected(connected) => Some(connected.slot),
            _ => self.own_slot(),
        };
        self.replace(roster, own_slot);
    }

    /// Swap in a new roster wholesale.
    pub fn replace(&self, roster: Vec<SlotInfo>, own_slot: Option<SlotId>) {
        let count = roster.len();
        let index = Index::build(roster, own_slot);
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
        log::info!(target: self.log.target(), "Slot directory rebuilt with {} slots", count);
    }

    /// Find the slot matching `slot`.
    pub fn resolve(&self, slot: impl Into<SlotRef>) -> Result<SlotInfo, DirectoryError> {
        let slot = slot.into();
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resolve(&slot)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownSlot(slot.to_string()))
    }

    /// Every slot, in roster order.
    pub fn all_slots(&self) -> Vec<SlotInfo> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .roster
            .clone()
    }

    /// Slot this client connected as, once `Connected` has been seen.
    pub fn own_slot(&self) -> Option<SlotId> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .own_slot
    }

    /// Number of known slots.
    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .roster
            .len()
    }

    /// Whether no roster has been received yet (or the roster is empty).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Connected, NetworkPlayer, RoomUpdate};

    fn player(slot: SlotId, name: &str, alias: &str) -> NetworkPlayer {
        NetworkPlayer {
            slot,
            name: name.to_string(),
            alias: alias.to_string(),
        }
    }

    fn connected(players: Vec<NetworkPlayer>) -> ServerEvent {
        ServerEvent::Connected(Connected {
            slot: 99,
            players,
            slot_info: HashMap::new(),
        })
    }

    fn directory() -> SlotDirectory {
        SlotDirectory::new(LogContext::new("test"))
    }

    #[test]
    fn test_resolution_is_case_insensitive() {
        let directory = directory();
        directory.apply(&connected(vec![player(3, "Hero", "Zed")]));

        for input in ["hero", "HERO", "zed", "Zed (Hero)", "3"] {
            assert_eq!(directory.resolve(input).unwrap().id, 3, "input {input}");
        }
        assert_eq!(directory.resolve(3).unwrap().name, "Hero");
        assert_eq!(directory.own_slot(), Some(99));
    }

    #[test]
    fn test_unknown_input_fails() {
        let directory = directory();
        directory.apply(&connected(vec![player(1, "Hero", "Hero")]));

        assert_eq!(
            directory.resolve("villain"),
            Err(DirectoryError::UnknownSlot("villain".to_string()))
        );
        assert!(directory.resolve(2).is_err());
    }

    #[test]
    fn test_roster_update_replaces_previous_contents() {
        let directory = directory();
        directory.apply(&connected(vec![
            player(1, "Hero", "Hero"),
            player(2, "Sidekick", "Pal"),
        ]));

        directory.apply(&ServerEvent::RoomUpdate(RoomUpdate {
            players: Some(vec![player(2, "Sidekick", "Buddy")]),
            slot_info: HashMap::new(),
        }));

        assert!(matches!(
            directory.resolve("hero"),
            Err(DirectoryError::UnknownSlot(_))
        ));
        assert!(directory.resolve("pal").is_err());
        assert_eq!(directory.resolve("buddy").unwrap().id, 2);
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.own_slot(), Some(99));
    }

    #[test]
    fn test_update_without_roster_keeps_directory() {
        let directory = directory();
        directory.apply(&connected(vec![player(1, "Hero", "Hero")]));

        directory.apply(&ServerEvent::RoomUpdate(RoomUpdate::default()));

        assert_eq!(directory.resolve("hero").unwrap().id, 1);
    }

    #[test]
    fn test_names_take_precedence_over_numeric_ids() {
        let directory = directory();
        directory.apply(&connected(vec![
            player(1, "7", "7"),
            player(7, "Seven", "Seven"),
        ]));

        assert_eq!(directory.resolve("7").unwrap().id, 1);
        assert_eq!(directory.resolve(7).unwrap().id, 7);
    }

    #[test]
    fn test_exact_name_beats_alias_and_display_form() {
        let directory = directory();
        directory.apply(&connected(vec![
            player(1, "Zed (Hero)", "Zed (Hero)"),
            player(2, "Hero", "Zed"),
            player(3, "Pal", "Hero"),
        ]));

        assert_eq!(directory.resolve("Zed (Hero)").unwrap().id, 1);
        assert_eq!(directory.resolve("hero").unwrap().id, 2);
        assert_eq!(directory.resolve("zed").unwrap().id, 2);
    }

    #[test]
    fn test_all_slots_in_roster_order() {
        let directory = directory();
        assert!(directory.is_empty());
        directory.apply(&connected(vec![
            player(5, "B", "B"),
            player(2, "A", "A"),
        ]));

        let ids: Vec<SlotId> = directory.all_slots().iter().map(|slot| slot.id).collect();
        assert_eq!(ids, vec![5, 2]);
    }
}
