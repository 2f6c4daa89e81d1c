use std::time::Duration;

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use mines_common::protocol::{ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsReader = SplitStream<WsStream>;
type WsWriter = SplitSink<WsStream, Message>;

/// WebSocket link to a round server, JSON frames in both directions
pub struct RoundSocket {
    sender: mpsc::UnboundedSender<ClientMessage>,
    reader: WsReader,
}

impl RoundSocket {
    /// Connect to a round server, giving up after `dial_timeout`
    pub async fn connect(url: &str, dial_timeout: Duration) -> Result<Self> {
        debug!("Dialing round server at {}", url);

        let (ws_stream, _) = timeout(dial_timeout, connect_async(url))
            .await
            .map_err(|_| Error::DialTimeout)??;
        info!("Round server link open: {}", url);

        let (writer, reader) = ws_stream.split();
        let (sender, outgoing) = mpsc::unbounded_channel::<ClientMessage>();
        tokio::spawn(write_frames(writer, outgoing));

        Ok(Self { sender, reader })
    }

    /// Cloneable handle that queues intents for the writer task
    pub fn get_sender(&self) -> mpsc::UnboundedSender<ClientMessage> {
        self.sender.clone()
    }

    pub fn send_message(&self, message: ClientMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Receive the next server message.
    ///
    /// Returns `None` once the connection is closed. Frames that do not
    /// decode are logged and skipped.
    pub async fn receive_message(&mut self) -> Result<Option<ServerMessage>> {
        while let Some(frame) = self.reader.next().await {
            match frame? {
                Message::Text(text) => {
                    debug!("<- {}", text);
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => return Ok(Some(message)),
                        Err(e) => warn!("Skipping undecodable frame: {}", e),
                    }
                }
                Message::Close(_) => {
                    info!("Round server closed the link");
                    return Ok(None);
                }
                // Control and binary frames carry nothing for us
                _ => {}
            }
        }
        Ok(None)
    }
}

/// Encode queued intents as text frames until every sender is gone or the
/// sink fails, then close the socket.
async fn write_frames(mut writer: WsWriter, mut outgoing: mpsc::UnboundedReceiver<ClientMessage>) {
    while let Some(message) = outgoing.recv().await {
        let frame = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!("Dropping unencodable {:?}: {}", message, e);
                continue;
            }
        };
        debug!("-> {}", frame);
        if let Err(e) = writer.send(Message::Text(frame.into())).await {
            warn!("Write to round server failed: {}", e);
            break;
        }
    }
    if let Err(e) = writer.close().await {
        debug!("Closing socket: {}", e);
    }
}
