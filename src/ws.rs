//! Room server socket transport.
//!
//! The protocol client talks to the room only through this module. Frames on
//! the wire are JSON text, so the reader hands back text and close
//! notifications and nothing else.
//!
//! Control frames are answered by `tokio-tungstenite` itself: a ping queues
//! its pong, and the pong goes out at the start of the next read. A reader
//! that keeps polling therefore keeps the room's keep-alive satisfied.

use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type RoomStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Something the room sent that the client has to act on.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    /// One protocol frame. Binary frames are read as lossy UTF-8.
    Text(String),
    /// The room started the close handshake.
    Closed {
        /// Close code, 1005 when the frame carried none.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Sending half of a room connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: SplitSink<RoomStream, Message>,
}

impl WsWriter {
    /// Send one protocol frame.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(Message::Text(text.to_string()))
            .await
            .context("Failed to send frame to room")
    }

    /// Start the close handshake. The room's reply ends the [`WsReader`].
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("Failed to close room socket")
    }
}

/// Receiving half of a room connection.
#[derive(Debug)]
pub struct WsReader {
    stream: SplitStream<RoomStream>,
}

impl WsReader {
    /// Next frame the client cares about, or `None` once the socket is done.
    pub async fn recv(&mut self) -> Option<Result<Incoming>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("Room socket read failed"))),
            };
            match message {
                Message::Text(text) => return Some(Ok(Incoming::Text(text))),
                Message::Binary(data) => {
                    return Some(Ok(Incoming::Text(String::from_utf8_lossy(&data).into_owned())));
                }
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|frame| (frame.code.into(), frame.reason.into_owned()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(Incoming::Closed { code, reason }));
                }
                // Pongs to incoming pings are queued by tungstenite.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}

/// Open a socket to `url` (`ws://` or `wss://`) and split it.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let request = url
        .into_client_request()
        .with_context(|| format!("Invalid room socket URL: {url}"))?;

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("Failed to open room socket at {url}"))?;

    let (sink, stream) = stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}
