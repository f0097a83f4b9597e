//! Per-game item and location tables from the data package.
//!
//! Identity lookup only: id to name and name to id. Each `DataPackage` event
//! replaces the tables of every game it mentions; games it does not mention
//! keep their previous tables.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::client::ProtocolClient;
use crate::logging::LogContext;
use crate::protocol::{CatalogEntry, DataPackage, EventKind, ItemInfo, LocationInfo, ServerEvent};

/// Catalog lookup failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No tables were received for the game.
    UnknownGame(String),
    /// The game has no entry matching the key.
    UnknownEntry {
        /// Game searched.
        game: String,
        /// Key as given.
        key: String,
    },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownGame(game) => write!(f, "No catalog for game '{game}'"),
            Self::UnknownEntry { game, key } => write!(f, "'{key}' is not known in '{game}'"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Lookup key for a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRef {
    /// Numeric id.
    Id(i64),
    /// Name, matched case-insensitively.
    Name(String),
}

impl From<i64> for EntryRef {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for EntryRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    by_id: HashMap<i64, CatalogEntry>,
    by_name: HashMap<String, i64>,
}

impl Table {
    fn build(entries: Vec<CatalogEntry>) -> Self {
        let by_name = entries
            .iter()
            .map(|entry| (entry.name.to_lowercase(), entry.id))
            .collect();
        let by_id = entries.into_iter().map(|entry| (entry.id, entry)).collect();
        Self { by_id, by_name }
    }

    fn get(&self, key: &EntryRef) -> Option<&CatalogEntry> {
        match key {
            EntryRef::Id(id) => self.by_id.get(id),
            EntryRef::Name(name) => self
                .by_name
                .get(&name.trim().to_lowercase())
                .and_then(|id| self.by_id.get(id)),
        }
    }
}

#[derive(Debug, Default)]
struct GameTables {
    items: Table,
    locations: Table,
}

/// Item and location tables for every game seen in a data package.
#[derive(Debug)]
pub struct GameCatalog {
    games: RwLock<HashMap<String, GameTables>>,
    log: LogContext,
}

impl GameCatalog {
    /// Empty catalog.
    pub fn new(log: LogContext) -> Self {
        Self {
            games: RwLock::new(HashMap::new()),
            log,
        }
    }

    /// Subscribe to `DataPackage` events of `client`.
    pub fn attach(self: &Arc<Self>, client: &ProtocolClient) {
        let catalog = Arc::clone(self);
        client.add_handler(EventKind::DataPackage, move |event| {
            let catalog = Arc::clone(&catalog);
            async move {
                if let ServerEvent::DataPackage(package) = event.as_ref() {
                    catalog.load(package);
                }
                Ok(())
            }
        });
    }

    /// Replace the tables of every game in `package`.
    pub fn load(&self, package: &DataPackage) {
        let mut items = package.items();
        let mut locations = package.locations();
        let names: Vec<String> = package.data.games.keys().cloned().collect();

        let mut games = self.games.write().unwrap_or_else(PoisonError::into_inner);
        for game in names {
            let tables = GameTables {
                items: Table::build(items.remove(&game).unwrap_or_default()),
                locations: Table::build(locations.remove(&game).unwrap_or_default()),
            };
            log::debug!(
                target: self.log.target(),
                "Catalog for '{}': {} items, {} locations",
                game,
                tables.items.by_id.len(),
                tables.locations.by_id.len()
            );
            games.insert(game, tables);
        }
    }

    /// Look up an item of `game`.
    pub fn item(&self, game: &str, key: impl Into<EntryRef>) -> Result<ItemInfo, CatalogError> {
        self.lookup(game, &key.into(), |tables| &tables.items)
    }

    /// Look up a location of `game`.
    pub fn location(
        &self,
        game: &str,
        key: impl Into<EntryRef>,
    ) -> Result<LocationInfo, CatalogError> {
        self.lookup(game, &key.into(), |tables| &tables.locations)
    }

    /// Games with tables, sorted by name.
    pub fn games(&self) -> Vec<String> {
        let mut games: Vec<String> = self
            .games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        games.sort();
        games
    }

    fn lookup(
        &self,
        game: &str,
        key: &EntryRef,
        table: impl Fn(&GameTables) -> &Table,
    ) -> Result<CatalogEntry, CatalogError> {
        let games = self.games.read().unwrap_or_else(PoisonError::into_inner);
        let tables = games
            .get(game)
            .ok_or_else(|| CatalogError::UnknownGame(game.to_string()))?;
        table(tables)
            .get(key)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownEntry {
                game: game.to_string(),
                key: key.to_string(),
            })
    }
}
