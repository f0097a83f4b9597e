//! Durable per-user slot registrations.
//!
//! One JSON document per room:
//!
//! ```text
//! <data_dir>/<room_id>_state.json
//! { "user_slots": { "<user-id>": [<slot-id>, ...], ... } }
//! ```
//!
//! Every mutation is written through before the call returns. A mutation is
//! applied to a copy of the state, the copy is persisted, and only then does
//! it replace the in-memory state, so memory never runs ahead of disk.
//!
//! A document that cannot be read or parsed is renamed to
//! `<room_id>_state.invalid_<YYYYmmdd_HHMMSS>.json` and the store starts
//! empty. User data is never deleted to recover.

// Rust guideline compliant 2026-02

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logging::LogContext;
use crate::protocol::SlotId;

/// Opaque chat-platform user identifier.
pub type UserId = u64;

/// The persisted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationState {
    /// Slots each user is registered for. Sets are never empty.
    #[serde(default)]
    pub user_slots: BTreeMap<UserId, BTreeSet<SlotId>>,
}

impl RegistrationState {
    /// Drop users whose slot set is empty.
    fn prune(&mut self) {
        self.user_slots.retain(|_, slots| !slots.is_empty());
    }
}

/// Errors from [`RegistrationStore`] operations.
#[derive(Debug)]
pub enum StoreError {
    /// The user is already registered for the slot.
    AlreadyRegistered {
        /// User.
        user: UserId,
        /// Slot.
        slot: SlotId,
    },
    /// The user is not registered for the slot.
    NotRegistered {
        /// User.
        user: UserId,
        /// Slot.
        slot: SlotId,
    },
    /// Reading, writing or renaming the state file failed.
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The state could not be serialized.
    Encode(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered { user, slot } => {
                write!(f, "User {user} is already registered for slot {slot}")
            }
            Self::NotRegistered { user, slot } => {
                write!(f, "User {user} is not registered for slot {slot}")
            }
            Self::Io { path, source } => write!(f, "State file {}: {source}", path.display()),
            Self::Encode(e) => write!(f, "Failed to encode state: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write-through registration store for one room.
#[derive(Debug)]
pub struct RegistrationStore {
    path: PathBuf,
    state: RegistrationState,
    log: LogContext,
}

impl RegistrationStore {
    /// State file for `room_id` inside `data_dir`.
    #[must_use]
    pub fn state_path(data_dir: &Path, room_id: &str) -> PathBuf {
        data_dir.join(format!("{room_id}_state.json"))
    }

    /// Open the store for `room_id`, creating `data_dir` if needed.
    pub fn open(data_dir: &Path, room_id: &str, log: LogContext) -> Result<Self, StoreError> {
        Self::open_at(Self::state_path(data_dir, room_id), log)
    }

    /// Open the store backed by `path`.
    ///
    /// A missing file yields an empty store; a corrupt one is quarantined
    /// and also yields an empty store. The loaded state is written back
    /// immediately so the file always exists after opening.
    pub fn open_at(path: PathBuf, log: LogContext) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let state = load(&path, &log)?;
        let store = Self { path, state, log };
        store.save()?;
        Ok(store)
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the backing file with the current state.
    pub fn save(&self) -> Result<(), StoreError> {
        write_state(&self.path, &self.state)
    }

    /// Apply `change` to a copy of the state, persist the copy, then commit.
    fn mutate<T>(
        &mut self,
        change: impl FnOnce(&mut RegistrationState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut next = self.state.clone();
        let out = change(&mut next)?;
        write_state(&self.path, &next)?;
        self.state = next;
        Ok(out)
    }

    /// Register `user` for `slot`.
    pub fn add_user_slot(&mut self, user: UserId, slot: SlotId) -> Result<(), StoreError> {
        self.mutate(|state| {
            if !state.user_slots.entry(user).or_default().insert(slot) {
                return Err(StoreError::AlreadyRegistered { user, slot });
            }
            Ok(())
        })?;
        log::info!(target: self.log.target(), "Registered user {} for slot {}", user, slot);
        Ok(())
    }

    /// Unregister `user` from `slot`, dropping the user once no slots remain.
    pub fn remove_user_slot(&mut self, user: UserId, slot: SlotId) -> Result<(), StoreError> {
        self.mutate(|state| {
            let removed = state
                .user_slots
                .get_mut(&user)
                .is_some_and(|slots| slots.remove(&slot));
            if !removed {
                return Err(StoreError::NotRegistered { user, slot });
            }
            state.prune();
            Ok(())
        })?;
        log::info!(target: self.log.target(), "Unregistered user {} from slot {}", user, slot);
        Ok(())
    }

    /// Unregister `user` from every slot. Clearing an unknown user is a no-op.
    pub fn clear_user_slots(&mut self, user: UserId) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.user_slots.remove(&user);
            Ok(())
        })?;
        log::info!(target: self.log.target(), "Cleared all registrations of user {}", user);
        Ok(())
    }

    /// Slots `user` is registered for (a copy).
    pub fn user_slots(&self, user: UserId) -> BTreeSet<SlotId> {
        self.state.user_slots.get(&user).cloned().unwrap_or_default()
    }

    /// Users registered for `slot`, in ascending order.
    pub fn slot_users(&self, slot: SlotId) -> Vec<UserId> {
        self.state
            .user_slots
            .iter()
            .filter(|(_, slots)| slots.contains(&slot))
            .map(|(user, _)| *user)
            .collect()
    }
}

fn load(path: &Path, log: &LogContext) -> Result<RegistrationState, StoreError> {
    if !path.exists() {
        log::info!(target: log.target(), "State file '{}' does not exist; starting fresh", path.display());
        return Ok(RegistrationState::default());
    }

    log::info!(target: log.target(), "Loading state file '{}'", path.display());
    let parsed = match fs::read(path) {
        Ok(bytes) => serde_json::from_slice::<RegistrationState>(&bytes).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match parsed {
        Ok(mut state) => {
            state.prune();
            Ok(state)
        }
        Err(reason) => {
            log::error!(target: log.target(), "Failed to load state file '{}': {}", path.display(), reason);
            let backup = quarantine(path)?;
            log::info!(
                target: log.target(),
                "Backed up invalid state file to '{}'; starting fresh",
                backup.display()
            );
            Ok(RegistrationState::default())
        }
    }
}

/// Rename a corrupt state file out of the way, never clobbering an earlier
/// quarantined copy.
fn quarantine(path: &Path) -> Result<PathBuf, StoreError> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut backup = quarantine_path(path, &timestamp);
    let mut attempt = 1;
    while backup.exists() {
        backup = quarantine_path(path, &format!("{timestamp}_{attempt}"));
        attempt += 1;
    }

    fs::rename(path, &backup).map_err(io_error(path))?;
    Ok(backup)
}

fn quarantine_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}.invalid_{suffix}.json"))
}

/// Write through a sibling temp file so a crash never leaves a torn document.
fn write_state(path: &Path, state: &RegistrationState) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(state).map_err(StoreError::Encode)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RegistrationStore {
        RegistrationStore::open(dir.path(), "room", LogContext::new("test")).unwrap()
    }

    fn on_disk(store: &RegistrationStore) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap()
    }

    #[test]
    fn test_open_without_file_creates_empty_document() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert!(store.user_slots(1).is_empty());
        assert_eq!(store.path(), dir.path().join("room_state.json"));
        assert_eq!(on_disk(&store), serde_json::json!({"user_slots": {}}));
    }

    #[test]
    fn test_add_then_remove_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);

        store.add_user_slot(42, 3).unwrap();
        store.add_user_slot(42, 5).unwrap();
        assert!(store.user_slots(42).contains(&3));
        assert_eq!(on_disk(&store), serde_json::json!({"user_slots": {"42": [3, 5]}}));

        store.remove_user_slot(42, 3).unwrap();
        assert!(!store.user_slots(42).contains(&3));
        assert!(store.user_slots(42).contains(&5));
    }

    #[test]
    fn test_removing_last_slot_prunes_user_on_disk() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);

        store.add_user_slot(7, 1).unwrap();
        store.remove_user_slot(7, 1).unwrap();

        assert!(store.user_slots(7).is_empty());
        assert_eq!(on_disk(&store), serde_json::json!({"user_slots": {}}));
    }

    #[test]
    fn test_duplicate_add_fails_and_leaves_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);

        store.add_user_slot(9, 2).unwrap();
        let before = on_disk(&store);

        let err = store.add_user_slot(9, 2).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyRegistered { user: 9, slot: 2 }));
        assert_eq!(store.user_slots(9), BTreeSet::from([2]));
        assert_eq!(on_disk(&store), before);
    }

    #[test]
    fn test_remove_unregistered_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);

        store.add_user_slot(1, 1).unwrap();
        assert!(matches!(
            store.remove_user_slot(1, 2),
            Err(StoreError::NotRegistered { user: 1, slot: 2 })
        ));
        assert!(matches!(
            store.remove_user_slot(2, 1),
            Err(StoreError::NotRegistered { .. })
        ));
        assert_eq!(store.user_slots(1), BTreeSet::from([1]));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);

        store.add_user_slot(5, 1).unwrap();
        store.add_user_slot(5, 2).unwrap();
        store.clear_user_slots(5).unwrap();
        store.clear_user_slots(5).unwrap();

        assert!(store.user_slots(5).is_empty());
        assert_eq!(on_disk(&store), serde_json::json!({"user_slots": {}}));
    }

    #[test]
    fn test_user_slots_returns_a_copy() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);

        store.add_user_slot(1, 1).unwrap();
        let mut copy = store.user_slots(1);
        copy.insert(99);

        assert_eq!(store.user_slots(1), BTreeSet::from([1]));
    }

    #[test]
    fn test_registrations_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = open(&dir);
            store.add_user_slot(100, 4).unwrap();
            store.add_user_slot(200, 4).unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.user_slots(100), BTreeSet::from([4]));
        assert_eq!(store.slot_users(4), vec![100, 200]);
    }

    #[test]
    fn test_garbage_file_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("room_state.json");
        fs::write(&path, [0xff, 0xfe, b'{', b'n', b'o']).unwrap();

        let store = open(&dir);
        assert!(store.user_slots(1).is_empty());

        let quarantined: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("room_state.invalid_"))
            .collect();
        assert_eq!(quarantined.len(), 1);
        assert!(quarantined[0].ends_with(".json"));

        let backup = dir.path().join(&quarantined[0]);
        assert_eq!(fs::read(backup).unwrap(), vec![0xff, 0xfe, b'{', b'n', b'o']);
        assert_eq!(on_disk(&store), serde_json::json!({"user_slots": {}}));
    }

    #[test]
    fn test_wrong_shape_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("room_state.json");
        fs::write(&path, r#"{"user_slots": {"not-a-number": [1]}}"#).unwrap();

        let store = open(&dir);
        assert!(store.user_slots(1).is_empty());
        assert!(fs::read_dir(dir.path())
            .unwrap()
            .any(|entry| entry.unwrap().file_name().to_string_lossy().contains(".invalid_")));
    }

    #[test]
    fn test_unreadable_state_path_is_quarantined() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("room_state.json")).unwrap();

        let mut store = open(&dir);
        assert!(store.user_slots(1).is_empty());
        assert!(store.path().is_file());

        let quarantined: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.to_string_lossy().contains("room_state.invalid_"))
            .collect();
        assert_eq!(quarantined.len(), 1);
        assert!(quarantined[0].is_dir());

        store.add_user_slot(1, 2).unwrap();
        assert_eq!(on_disk(&store), serde_json::json!({"user_slots": {"1": [2]}}));
    }

    #[test]
    fn test_empty_sets_are_pruned_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("room_state.json");
        fs::write(&path, r#"{"user_slots": {"1": [], "2": [8]}}"#).unwrap();

        let store = open(&dir);
        assert_eq!(on_disk(&store), serde_json::json!({"user_slots": {"2": [8]}}));
    }

    #[test]
    fn test_quarantine_path_strips_json_extension() {
        assert_eq!(
            quarantine_path(Path::new("/data/room_state.json"), "20260101_120000"),
            PathBuf::from("/data/room_state.invalid_20260101_120000.json")
        );
    }
}
