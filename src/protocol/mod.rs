//! Message codec for the room server wire protocol.
//!
//! Wire format: every WebSocket text frame is a JSON array of message
//! objects, each tagged by a string `cmd` field. Outgoing commands are always
//! sent as one-element arrays.
//!
//! Decoding is isolated per element:
//!
//! - missing `cmd`: logged at `warn`, element skipped
//! - unknown `cmd`: skipped silently (newer server message kinds)
//! - known `cmd` with a malformed payload: logged at `error`, element dropped
//!
//! Siblings of a bad element are still decoded. Only a frame that is not a
//! JSON array at all fails as a whole ([`DecodeError`]).

// Rust guideline compliant 2026-02

pub mod commands;
pub mod events;

pub use commands::{ClientCommand, ConnectRequest, NetworkVersion, PROTOCOL_VERSION};
pub use events::{
    CatalogEntry, Connected, ConnectionRefused, DataPackage, EventKind, ItemInfo, LocationInfo,
    NetworkPlayer, RoomInfo, RoomUpdate, ServerEvent, SlotId, SlotInfo,
};

use std::fmt;

/// Codec log target. Decoding is stateless and shared by every connection.
const LOG_TARGET: &str = "slotkeeper::protocol";

/// Frame-level decode failure: the frame is not a JSON array.
#[derive(Debug)]
pub struct DecodeError(serde_json::Error);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame is not a JSON message array: {}", self.0)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Serialize one command as a one-element JSON array.
///
/// # Errors
///
/// Returns an error only if serialization itself fails, which the command
/// types never trigger.
pub fn encode(command: &ClientCommand) -> serde_json::Result<String> {
    serde_json::to_string(&[command])
}

/// Parse a frame into its events, in wire order.
///
/// The returned iterator decodes lazily, one element per step.
pub fn decode(raw: &str) -> Result<Decoded, DecodeError> {
    let elements: Vec<serde_json::Value> = serde_json::from_str(raw).map_err(DecodeError)?;
    Ok(Decoded {
        elements: elements.into_iter(),
    })
}

/// Lazy, finite sequence of events from one frame. See [`decode`].
#[derive(Debug)]
pub struct Decoded {
    elements: std::vec::IntoIter<serde_json::Value>,
}

impl Iterator for Decoded {
    type Item = ServerEvent;

    fn next(&mut self) -> Option<ServerEvent> {
        self.elements.by_ref().find_map(decode_element)
    }
}

fn decode_element(element: serde_json::Value) -> Option<ServerEvent> {
    let Some(tag) = element.get("cmd").and_then(serde_json::Value::as_str) else {
        log::warn!(target: LOG_TARGET, "Received server message without 'cmd' field: {}", element);
        return None;
    };

    let Some(kind) = EventKind::from_tag(tag) else {
        log::trace!(target: LOG_TARGET, "Ignoring server message of unhandled kind '{}'", tag);
        return None;
    };

    match serde_json::from_value::<ServerEvent>(element) {
        Ok(event) => Some(event),
        Err(e) => {
            log::error!(target: LOG_TARGET, "Dropping malformed '{}' message: {}", kind, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(raw: &str) -> Vec<EventKind> {
        decode(raw).unwrap().map(|event| event.kind()).collect()
    }

    #[test]
    fn test_encode_wraps_command_in_array() {
        let encoded = encode(&ClientCommand::GetDataPackage {
            games: vec!["Clique".to_string()],
        })
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([{"cmd": "GetDataPackage", "games": ["Clique"]}])
        );
    }

    #[test]
    fn test_encode_connect_request_fields() {
        let encoded = encode(&ClientCommand::Connect(ConnectRequest::tracker(
            "Archipelago",
            "Watcher",
        )))
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        let connect = &parsed[0];
        assert_eq!(connect["cmd"], "Connect");
        assert!(connect["password"].is_null());
        assert_eq!(connect["game"], "Archipelago");
        assert_eq!(connect["name"], "Watcher");
        assert_eq!(connect["uuid"], "slotkeeper");
        assert_eq!(
            connect["version"],
            serde_json::json!({"major": 0, "minor": 6, "build": 5, "class": "Version"})
        );
        assert_eq!(connect["items_handling"], 0);
        assert_eq!(
            connect["tags"],
            serde_json::json!(["TextOnly", "Tracker", "DeathLink"])
        );
        assert_eq!(connect["slot_data"], false);
    }

    #[test]
    fn test_decode_preserves_wire_order() {
        let raw = r#"[
            {"cmd": "RoomUpdate", "hint_points": 3},
            {"cmd": "RoomInfo", "games": ["Clique"]},
            {"cmd": "ConnectionRefused", "errors": ["InvalidSlot"]},
            {"cmd": "RoomUpdate"}
        ]"#;

        assert_eq!(
            kinds(raw),
            vec![
                EventKind::RoomUpdate,
                EventKind::RoomInfo,
                EventKind::ConnectionRefused,
                EventKind::RoomUpdate,
            ]
        );
    }

    #[test]
    fn test_decode_skips_missing_and_unknown_discriminators() {
        let raw = r#"[
            {"games": []},
            {"cmd": "PrintJSON", "data": []},
            {"cmd": "RoomInfo"}
        ]"#;

        assert_eq!(kinds(raw), vec![EventKind::RoomInfo]);
    }

    #[test]
    fn test_decode_isolates_malformed_element() {
        // Connected without its required `players` field.
        let raw = r#"[
            {"cmd": "RoomInfo"},
            {"cmd": "Connected", "slot": 1},
            {"cmd": "RoomUpdate", "players": [{"slot": 1, "name": "Hero", "alias": "Hero"}]}
        ]"#;

        let events: Vec<ServerEvent> = decode(raw).unwrap().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), EventKind::RoomInfo);
        assert_eq!(events[1].roster().unwrap()[0].name, "Hero");
    }

    #[test]
    fn test_decode_rejects_non_array_frame() {
        assert!(decode(r#"{"cmd": "RoomInfo"}"#).is_err());
        assert!(decode("not json").is_err());
    }

    #[test]
    fn test_decode_empty_frame_yields_nothing() {
        assert_eq!(decode("[]").unwrap().count(), 0);
    }

    #[test]
    fn test_connection_refused_errors_default_to_empty() {
        let events: Vec<ServerEvent> = decode(r#"[{"cmd": "ConnectionRefused"}]"#)
            .unwrap()
            .collect();
        match &events[0] {
            ServerEvent::ConnectionRefused(refused) => assert!(refused.errors.is_empty()),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
