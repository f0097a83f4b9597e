//! Room discovery from the room web page.
//!
//! The room page links the multiworld tracker and states the port the room's
//! server listens on. Both are scraped with regular expressions and turned
//! into the addresses the rest of the crate needs.

use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;

use crate::logging::LogContext;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const TRACKER_PATTERN: &str = r#"This room has a <a href="/tracker/(.*)">Multiworld Tracker</a>"#;
const PORT_PATTERN: &str = r"running on archipelago.gg with port (\d*)";

/// Addresses of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAddress {
    /// Room page that was scraped.
    pub room_url: String,
    /// Multiworld tracker page.
    pub tracker_url: String,
    /// WebSocket address of the room server, `wss://<host>:<port>`
    /// (`ws://` when the web base URL is plain `http`).
    pub server_url: String,
}

/// Scrapes room pages under one web base URL.
#[derive(Debug, Clone)]
pub struct RoomLocator {
    http: reqwest::Client,
    base_url: String,
    host: String,
    socket_scheme: &'static str,
    tracker_re: Regex,
    port_re: Regex,
    log: LogContext,
}

impl RoomLocator {
    /// Locator for rooms hosted under `base_url` (e.g. `https://archipelago.gg`).
    pub fn new(base_url: &str, log: LogContext) -> Result<Self> {
        let parsed = reqwest::Url::parse(base_url)
            .with_context(|| format!("Invalid web base URL: {base_url}"))?;
        let host = parsed
            .host_str()
            .with_context(|| format!("Web base URL has no host: {base_url}"))?
            .to_string();
        let socket_scheme = if parsed.scheme() == "http" { "ws" } else { "wss" };

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            host,
            socket_scheme,
            tracker_re: Regex::new(TRACKER_PATTERN).context("Invalid tracker pattern")?,
            port_re: Regex::new(PORT_PATTERN).context("Invalid port pattern")?,
            log,
        })
    }

    /// URL of the page describing `room_id`.
    #[must_use]
    pub fn room_url(&self, room_id: &str) -> String {
        format!("{}/room/{}", self.base_url, room_id)
    }

    /// Fetch the room page and extract its addresses.
    pub async fn locate(&self, room_id: &str) -> Result<RoomAddress> {
        let room_url = self.room_url(room_id);
        log::info!(target: self.log.target(), "Fetching room page {}", room_url);

        let response = self
            .http
            .get(&room_url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {room_url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Room page {room_url} returned HTTP {status}");
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body of {room_url}"))?;

        self.parse(room_url, &body)
    }

    /// Extract addresses from an already fetched room page.
    pub fn parse(&self, room_url: String, body: &str) -> Result<RoomAddress> {
        let tracker_id = self
            .tracker_re
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|id| !id.is_empty())
            .context("Room page does not link a multiworld tracker")?;

        let port = self
            .port_re
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|port| !port.is_empty())
            .context("Room page does not state a server port")?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("Invalid server port '{port}'"))?;

        let address = RoomAddress {
            room_url,
            tracker_url: format!("{}/tracker/{}", self.base_url, tracker_id),
            server_url: format!("{}://{}:{}", self.socket_scheme, self.host, port),
        };
        log::debug!(target: self.log.target(), "Room page resolved to {:?}", address);
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROOM_PAGE: &str = concat!(
        "<html><body>\n",
        "<p>This room has a <a href=\"/tracker/TrAcKeR\">Multiworld Tracker</a> enabled.</p>\n",
        "<p>The server for this room is currently running on archipelago.gg with port 38281.</p>\n",
        "</body></html>\n",
    );

    #[test]
    fn test_parse_extracts_addresses() {
        let locator = RoomLocator::new("https://archipelago.gg/", LogContext::new("test")).unwrap();
        let address = locator
            .parse(locator.room_url("abc"), ROOM_PAGE)
            .unwrap();

        assert_eq!(address.room_url, "https://archipelago.gg/room/abc");
        assert_eq!(address.tracker_url, "https://archipelago.gg/tracker/TrAcKeR");
        assert_eq!(address.server_url, "wss://archipelago.gg:38281");
    }

    #[test]
    fn test_parse_requires_port() {
        let locator = RoomLocator::new("https://archipelago.gg", LogContext::new("test")).unwrap();
        let body = "This room has a <a href=\"/tracker/x\">Multiworld Tracker</a>";
        assert!(locator.parse("room".to_string(), body).is_err());
    }

    #[test]
    fn test_parse_requires_tracker() {
        let locator = RoomLocator::new("https://archipelago.gg", LogContext::new("test")).unwrap();
        let body = "running on archipelago.gg with port 1234";
        assert!(locator.parse("room".to_string(), body).is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(RoomLocator::new("not a url", LogContext::new("test")).is_err());
    }

    #[tokio::test]
    async fn test_locate_fetches_room_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ROOM_PAGE))
            .mount(&server)
            .await;

        let locator = RoomLocator::new(&server.uri(), LogContext::new("test")).unwrap();
        let address = locator.locate("abc").await.unwrap();

        assert_eq!(address.room_url, format!("{}/room/abc", server.uri()));
        assert_eq!(address.server_url, "ws://127.0.0.1:38281");
        assert_eq!(address.tracker_url, format!("{}/tracker/TrAcKeR", server.uri()));
    }

    #[tokio::test]
    async fn test_locate_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let locator = RoomLocator::new(&server.uri(), LogContext::new("test")).unwrap();
        let err = locator.locate("missing").await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
