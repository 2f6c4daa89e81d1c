use std::time::Duration;

use mines_common::{models::Player, protocol::ServerMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{Error, Result, RoundSocket};

/// Inbound traffic from whichever link is current
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A (re)connection attempt started
    Connecting,
    Connected { endpoint: String },
    Message(ServerMessage),
    /// An established link dropped
    Disconnected,
    /// Every candidate endpoint failed; `simulated` players stand in
    Offline { simulated: Vec<Player> },
}

/// Map a configured endpoint to its WebSocket URL.
///
/// `http`/`https` become `ws`/`wss`; a bare host gets the `/ws` path.
pub fn websocket_url(endpoint: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::InvalidScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::InvalidScheme(scheme.to_string()))?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/ws");
    }
    Ok(url)
}

/// Ordered candidate endpoints, each tried once with a bounded timeout.
///
/// There is no reconnect policy: once a link drops it stays down until
/// [`establish`](Self::establish) is called again.
#[derive(Clone, Debug)]
pub struct ConnectionManager {
    endpoints: Vec<String>,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(endpoints: Vec<String>, connect_timeout: Duration) -> Self {
        Self {
            endpoints,
            connect_timeout,
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Put `endpoint` first, replacing the previous primary candidate
    pub fn replace_primary(&mut self, endpoint: String) {
        info!("Updated server URL: {}", endpoint);
        match self.endpoints.first_mut() {
            Some(primary) => *primary = endpoint,
            None => self.endpoints.push(endpoint),
        }
    }

    /// Try every candidate in order; `None` when all of them fail
    pub async fn establish(&self) -> Option<(String, RoundSocket)> {
        for endpoint in &self.endpoints {
            match self.attempt(endpoint).await {
                Ok(socket) => {
                    info!("Connected to {}", endpoint);
                    return Some((endpoint.clone(), socket));
                }
                Err(e) => warn!("Could not connect to {}: {}", endpoint, e),
            }
        }
        warn!(
            "All {} candidate endpoint(s) failed",
            self.endpoints.len()
        );
        None
    }

    #[instrument(level = "debug", skip(self))]
    async fn attempt(&self, endpoint: &str) -> Result<RoundSocket> {
        let url = websocket_url(endpoint)?;
        debug!("Dialing {}", url);
        RoundSocket::connect(url.as_str(), self.connect_timeout).await
    }
}

/// Forward every decoded frame into `inbound`, then report the drop
pub(crate) fn spawn_reader(
    mut socket: RoundSocket,
    inbound: mpsc::UnboundedSender<LinkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match socket.receive_message().await {
                Ok(Some(message)) => {
                    if inbound.send(LinkEvent::Message(message)).is_err() {
                        debug!("Inbound channel closed, stopping reader");
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Error receiving WebSocket message: {}", e);
                    break;
                }
            }
        }
        let _ = inbound.send(LinkEvent::Disconnected);
    })
}
