//! Text command surface.
//!
//! Parses one line of user input into a [`Command`] and runs it against the
//! shared [`CommandContext`]. Commands are organized into submodules by
//! domain:
//!
//! - [`slot`] - slot registrations (add, remove, list, clear)
//! - [`room`] - room information and refresh
//!
//! User mistakes (unknown slots, duplicate registrations, bad syntax) come
//! back as a failure [`Reply`], never as an error.
//!
//! # Usage
//!
//! ```ignore
//! let reply = commands::execute(&ctx, user_id, "slot add Hero").await;
//! println!("{reply}");
//! ```

pub mod room;
pub mod slot;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{Context, Result};

use crate::client::ProtocolClient;
use crate::directory::SlotDirectory;
use crate::logging::LogContext;
use crate::store::{RegistrationStore, UserId};
use crate::web::{RoomAddress, RoomLocator};

/// Optional prefix accepted in front of every command.
pub const COMMAND_PREFIX: char = '!';

/// Tone of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Plain information.
    Info,
    /// The requested change was made.
    Success,
    /// The request could not be carried out.
    Failure,
}

/// Text returned to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Tone.
    pub kind: ReplyKind,
    /// Message body.
    pub text: String,
}

impl Reply {
    /// Informational reply.
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Info,
            text: text.into(),
        }
    }

    /// Success reply.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Success,
            text: text.into(),
        }
    }

    /// Failure reply.
    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Failure,
            text: text.into(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `slot add <slot>`
    SlotAdd(String),
    /// `slot remove <slot>`
    SlotRemove(String),
    /// `slot list`
    SlotList,
    /// `slot clear`
    SlotClear,
    /// `info`
    Info,
    /// `refresh`
    Refresh,
    /// `help`
    Help,
}

/// Why a line could not be parsed; the message is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

/// Drop one layer of surrounding quotes.
fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '\'' || c == '"')
}

impl Command {
    /// Parse `line`. The slot argument is the rest of the line, so names with
    /// spaces need no quoting.
    pub fn parse(line: &str) -> Result<Self, UsageError> {
        let line = line.trim();
        let line = line.strip_prefix(COMMAND_PREFIX).unwrap_or(line);
        let (name, rest) = split_word(line);

        let command = match name.to_lowercase().as_str() {
            "slot" => {
                let (sub, argument) = split_word(rest);
                match sub.to_lowercase().as_str() {
                    "add" => Self::SlotAdd(slot_argument(argument)?),
                    "remove" => Self::SlotRemove(slot_argument(argument)?),
                    "list" => no_arguments(Self::SlotList, argument)?,
                    "clear" => no_arguments(Self::SlotClear, argument)?,
                    "" => {
                        return Err(UsageError(
                            "Must specify a sub-command for `slot`".to_string(),
                        ))
                    }
                    other => {
                        return Err(UsageError(format!("Unknown sub-command `slot {other}`")))
                    }
                }
            }
            "info" => no_arguments(Self::Info, rest)?,
            "refresh" => no_arguments(Self::Refresh, rest)?,
            "help" => Self::Help,
            "" => return Err(UsageError("Empty command".to_string())),
            other => {
                return Err(UsageError(format!(
                    "Unknown command `{other}`. Type `help` for a list of commands"
                )))
            }
        };
        Ok(command)
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn slot_argument(argument: &str) -> Result<String, UsageError> {
    let slot = strip_quotes(argument);
    if slot.is_empty() {
        return Err(UsageError("Missing required argument <slot>".to_string()));
    }
    Ok(slot.to_string())
}

fn no_arguments(command: Command, rest: &str) -> Result<Command, UsageError> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(UsageError(format!("Unexpected arguments: {rest}")))
    }
}

/// Everything commands operate on.
#[derive(Debug)]
pub struct CommandContext {
    store: Mutex<RegistrationStore>,
    directory: Arc<SlotDirectory>,
    client: Arc<ProtocolClient>,
    locator: RoomLocator,
    room_id: String,
    room: RwLock<Option<RoomAddress>>,
    log: LogContext,
}

impl CommandContext {
    /// Bundle the components of one room.
    pub fn new(
        store: RegistrationStore,
        directory: Arc<SlotDirectory>,
        client: Arc<ProtocolClient>,
        locator: RoomLocator,
        room_id: impl Into<String>,
        log: LogContext,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            directory,
            client,
            locator,
            room_id: room_id.into(),
            room: RwLock::new(None),
            log,
        }
    }

    /// Rediscover the room's addresses and (re)connect the client.
    pub async fn refresh(&self) -> Result<RoomAddress> {
        let address = self
            .locator
            .locate(&self.room_id)
            .await
            .with_context(|| format!("Failed to locate room {}", self.room_id))?;

        self.client
            .connect(&address.server_url)
            .await
            .with_context(|| format!("Failed to connect to {}", address.server_url))?;

        *self.room.write().unwrap_or_else(PoisonError::into_inner) = Some(address.clone());
        Ok(address)
    }

    /// Last successfully refreshed room addresses.
    pub fn room(&self) -> Option<RoomAddress> {
        self.room
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Slot directory.
    pub fn directory(&self) -> &SlotDirectory {
        &self.directory
    }

    /// Run `f` with exclusive access to the store.
    fn with_store<T>(&self, f: impl FnOnce(&mut RegistrationStore) -> T) -> T {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }
}

/// Help text listing every command.
const HELP: &str = "Available commands:
  !help                        Show this message
  !info                        Get information about the room
  !refresh                     Refresh the room and reconnect
  !slot add <slot>             Registers you for the given slot
  !slot remove <slot>          Unregisters you from the given slot
  !slot list                   Lists all slots for which you are registered
  !slot clear                  Unregisters you from all slots";

/// Parse and run one command line for `user`.
pub async fn execute(ctx: &CommandContext, user: UserId, line: &str) -> Reply {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => return Reply::failure(e.to_string()),
    };
    log::debug!(target: ctx.log.target(), "User {} ran {:?}", user, command);

    match command {
        Command::SlotAdd(slot) => slot::add(ctx, user, &slot),
        Command::SlotRemove(slot) => slot::remove(ctx, user, &slot),
        Command::SlotList => slot::list(ctx, user),
        Command::SlotClear => slot::clear(ctx, user),
        Command::Info => room::info(ctx),
        Command::Refresh => room::refresh(ctx).await,
        Command::Help => Reply::info(HELP),
    }
}
