//! Room information and refresh commands.

use super::{CommandContext, Reply};

/// Describe the room: port, pages and the slots that can be registered.
pub fn info(ctx: &CommandContext) -> Reply {
    let Some(room) = ctx.room() else {
        return Reply::failure("Room information is not available yet; try `refresh`");
    };

    let port = room
        .server_url
        .rsplit_once(':')
        .map_or("unknown", |(_, port)| port);
    let slots = ctx
        .directory()
        .all_slots()
        .iter()
        .map(|slot| format!("`{slot}`"))
        .collect::<Vec<_>>()
        .join(", ");

    Reply::info(format!(
        "Room Information:\n\
         - Port: {port}\n\
         - Room URL: <{}>\n\
         - Tracker URL: <{}>\n\
         - Available Slots: {slots}",
        room.room_url, room.tracker_url
    ))
}

/// Rediscover the room and reconnect.
pub async fn refresh(ctx: &CommandContext) -> Reply {
    match ctx.refresh().await {
        Ok(room) => Reply::success(format!("Refreshed room data from <{}>", room.room_url)),
        Err(e) => {
            log::warn!(target: ctx.log.target(), "Room refresh failed: {:#}", e);
            Reply::failure(format!("Failed to refresh the room: {e:#}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::super::{execute, ReplyKind};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_info_before_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, "https://archipelago.gg");

        let reply = execute(&ctx, 1, "info").await;
        assert_eq!(reply.kind, ReplyKind::Failure);
        assert!(ctx.room().is_none());
    }

    #[tokio::test]
    async fn test_refresh_failure_is_a_reply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room/room"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir, &server.uri());

        let reply = execute(&ctx, 1, "refresh").await;
        assert_eq!(reply.kind, ReplyKind::Failure);
        assert!(reply.text.contains("Failed to locate room room"));
        assert!(ctx.room().is_none());
    }
}
