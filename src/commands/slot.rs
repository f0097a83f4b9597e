//! Slot registration commands.

use crate::store::{StoreError, UserId};

use super::{CommandContext, Reply};

/// Register `user` for the slot named by `input`.
pub fn add(ctx: &CommandContext, user: UserId, input: &str) -> Reply {
    let slot = match ctx.directory().resolve(input) {
        Ok(slot) => slot,
        Err(e) => return Reply::failure(e.to_string()),
    };

    match ctx.with_store(|store| store.add_user_slot(user, slot.id)) {
        Ok(()) => Reply::success(format!("You have been registered for slot `{slot}`")),
        Err(StoreError::AlreadyRegistered { .. }) => {
            Reply::failure(format!("You are already registered for slot `{slot}`"))
        }
        Err(e) => storage_failure(ctx, &e),
    }
}

/// Unregister `user` from the slot named by `input`.
pub fn remove(ctx: &CommandContext, user: UserId, input: &str) -> Reply {
    let slot = match ctx.directory().resolve(input) {
        Ok(slot) => slot,
        Err(e) => return Reply::failure(e.to_string()),
    };

    match ctx.with_store(|store| store.remove_user_slot(user, slot.id)) {
        Ok(()) => Reply::success(format!("You have been unregistered from slot `{slot}`")),
        Err(StoreError::NotRegistered { .. }) => {
            Reply::failure(format!("You are not registered for slot `{slot}`"))
        }
        Err(e) => storage_failure(ctx, &e),
    }
}

/// List the slots `user` is registered for, sorted by display name.
///
/// Registrations whose slot left the roster are shown as `#<id> (unknown)`.
pub fn list(ctx: &CommandContext, user: UserId) -> Reply {
    let ids = ctx.with_store(|store| store.user_slots(user));
    if ids.is_empty() {
        return Reply::info("You are not registered for any slots");
    }

    let mut names: Vec<String> = ids
        .into_iter()
        .map(|id| match ctx.directory().resolve(id) {
            Ok(slot) => slot.to_string(),
            Err(_) => format!("#{id} (unknown)"),
        })
        .collect();
    names.sort();

    let listing = names
        .iter()
        .map(|name| format!("`{name}`"))
        .collect::<Vec<_>>()
        .join(", ");
    Reply::info(format!("You are registered for the following slots: {listing}"))
}

/// Unregister `user` from every slot.
pub fn clear(ctx: &CommandContext, user: UserId) -> Reply {
    match ctx.with_store(|store| store.clear_user_slots(user)) {
        Ok(()) => Reply::success("You have been unregistered from all slots"),
        Err(e) => storage_failure(ctx, &e),
    }
}

fn storage_failure(ctx: &CommandContext, e: &StoreError) -> Reply {
    log::error!(target: ctx.log.target(), "Failed to update registrations: {}", e);
    Reply::failure("Failed to save your registration; please try again later")
}
