use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mines_common::{models::Cell, protocol::ClientMessage};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::{
    ClientConfig, ConnectionManager, Error, IntentError, Result,
    clock::local_now_ms,
    connection::{LinkEvent, spawn_reader},
    offline::OfflineSimulator,
    profile::StatsExport,
    session::{RoundPhase, Session},
    storage::Storage,
    view::{GameEvent, LinkStatus, Notice, SessionView},
};

type EventSender = Arc<RwLock<Option<mpsc::UnboundedSender<GameEvent>>>>;

/// Whatever currently feeds the inbound channel: a socket or the simulator
struct LinkHandle {
    sender: Option<mpsc::UnboundedSender<ClientMessage>>,
    tasks: Vec<JoinHandle<()>>,
}

impl LinkHandle {
    /// Abort the feeding tasks and wait for them to finish
    async fn shutdown(self) {
        for task in self.tasks {
            task.abort();
            let _ = task.await;
        }
    }
}

/// High-level mines client: owns the session and the current link.
///
/// All inbound traffic goes through one channel and is applied to the
/// [`Session`] by a single dispatcher task, in arrival order.
pub struct MinesGame {
    config: ClientConfig,
    session: Arc<RwLock<Session>>,
    manager: RwLock<ConnectionManager>,
    link: RwLock<Option<LinkHandle>>,
    inbound: mpsc::UnboundedSender<LinkEvent>,
    phase: watch::Receiver<RoundPhase>,
    event_sender: EventSender,
    dispatcher: JoinHandle<()>,
}

impl MinesGame {
    /// Load the local session and start the dispatcher.
    ///
    /// Must be called from within a Tokio runtime. Nothing is dialed until
    /// [`connect`](Self::connect).
    pub fn new(config: ClientConfig, storage: Box<dyn Storage>) -> Self {
        let session = Session::load(storage, local_now_ms());
        let (phase_tx, phase) = watch::channel(session.phase());
        let session = Arc::new(RwLock::new(session));
        let event_sender: EventSender = Arc::new(RwLock::new(None));

        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let (reveal_tx, reveal_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            session: session.clone(),
            event_sender: event_sender.clone(),
            phase: phase_tx,
            reveal_tx,
            reveal_delay: config.reveal_delay,
            idle_reveal_delay: config.idle_reveal_delay,
        };
        let dispatcher = tokio::spawn(dispatcher.run(inbound_rx, reveal_rx));

        let manager = ConnectionManager::new(config.endpoints.clone(), config.connect_timeout);

        Self {
            config,
            session,
            manager: RwLock::new(manager),
            link: RwLock::new(None),
            inbound,
            phase,
            event_sender,
            dispatcher,
        }
    }

    /// Subscribe to game events. Returns a receiver for game events.
    pub async fn subscribe_to_events(&self) -> mpsc::UnboundedReceiver<GameEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut event_sender = self.event_sender.write().await;
        *event_sender = Some(sender);
        receiver
    }

    /// Try the candidate endpoints in order, falling back to offline play.
    ///
    /// Any previous link is torn down first. Connection failure is not an
    /// error here; it ends in [`LinkStatus::Offline`].
    ///
    /// The link slot stays locked for the whole attempt, so overlapping
    /// calls run one after another and each replaces the previous link.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.write().await;
        if let Some(existing) = link.take() {
            existing.shutdown().await;
        }
        self.forward(LinkEvent::Connecting)?;

        let manager = self.manager.read().await.clone();
        let handle = match manager.establish().await {
            Some((endpoint, socket)) => {
                let join = self.session.read().await.join_message();
                socket.send_message(join)?;
                let sender = socket.get_sender();

                self.forward(LinkEvent::Connected { endpoint })?;
                let reader = spawn_reader(socket, self.inbound.clone());
                LinkHandle {
                    sender: Some(sender),
                    tasks: vec![reader],
                }
            }
            None => {
                info!("Starting in offline mode");
                let simulator = OfflineSimulator::new(
                    self.config.offline_bet_interval,
                    self.config.offline_bet_chance,
                );
                self.forward(LinkEvent::Offline {
                    simulated: simulator.bots().to_vec(),
                })?;
                let task = simulator.spawn(
                    self.phase.clone(),
                    self.session.clone(),
                    self.inbound.clone(),
                );
                LinkHandle {
                    sender: None,
                    tasks: vec![task],
                }
            }
        };

        *link = Some(handle);
        Ok(())
    }

    fn forward(&self, event: LinkEvent) -> Result<()> {
        self.inbound.send(event).map_err(|_| Error::ConnectionClosed)
    }

    /// Replace the primary endpoint and reconnect
    pub async fn update_server_url(&self, url: &str) -> Result<()> {
        self.manager.write().await.replace_primary(url.to_string());
        self.connect().await
    }

    /// Select the cell to bet on; only possible between rounds
    pub async fn select_cell(&self, number: u8) -> std::result::Result<(), IntentError> {
        let result = match Cell::new(number) {
            Ok(cell) => self.session.write().await.select_cell(cell),
            Err(e) => Err(e.into()),
        };
        self.report(result).await
    }

    /// Validate a bet locally and send it to the server.
    ///
    /// The stake is deducted when the server echoes the bet back.
    pub async fn place_bet(&self, amount: f64) -> std::result::Result<(), IntentError> {
        let prepared = self.session.read().await.prepare_bet(amount);
        let result = match prepared {
            Ok(message) => {
                let link = self.link.read().await;
                let sent = match link.as_ref().and_then(|link| link.sender.as_ref()) {
                    Some(sender) => sender.send(message).is_ok(),
                    None => false,
                };
                if sent {
                    debug!("Sent bet of {}", amount);
                    Ok(())
                } else {
                    Err(IntentError::NotConnected)
                }
            }
            Err(e) => Err(e),
        };
        self.report(result).await
    }

    async fn report(
        &self,
        result: std::result::Result<(), IntentError>,
    ) -> std::result::Result<(), IntentError> {
        if let Err(ref e) = result {
            debug!("Intent rejected: {}", e);
            emit(&self.event_sender, vec![GameEvent::Notice(Notice::error(e.to_string()))]).await;
        }
        result
    }

    pub async fn reset_stats(&self) {
        let events = self.session.write().await.reset_stats();
        emit(&self.event_sender, events).await;
    }

    /// Reset balance and stats, keeping the identity
    pub async fn reset_game(&self) {
        let events = self.session.write().await.reset_game();
        emit(&self.event_sender, events).await;
    }

    pub async fn export_stats(&self) -> Result<StatsExport> {
        let export = self.session.read().await.export_stats(Utc::now())?;
        emit(
            &self.event_sender,
            vec![GameEvent::Notice(Notice::success("Stats exported"))],
        )
        .await;
        Ok(export)
    }

    /// Snapshot of the session for rendering
    pub async fn view(&self) -> SessionView {
        self.session.read().await.view()
    }

    pub fn phase(&self) -> RoundPhase {
        *self.phase.borrow()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.link().is_online()
    }

    /// Close the link and stop delivering events
    pub async fn disconnect(&self) -> Result<()> {
        let link = self.link.write().await.take();
        if let Some(link) = link {
            link.shutdown().await;
            let _ = self.inbound.send(LinkEvent::Disconnected);
        }
        *self.event_sender.write().await = None;

        info!("Disconnected from server");
        Ok(())
    }
}

impl Drop for MinesGame {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            for task in link.tasks {
                task.abort();
            }
        }
        self.dispatcher.abort();
    }
}

async fn emit(event_sender: &EventSender, events: Vec<GameEvent>) {
    if events.is_empty() {
        return;
    }
    if let Some(ref sender) = *event_sender.read().await {
        for event in events {
            let _ = sender.send(event);
        }
    }
}

/// Single consumer of inbound traffic and reveal timers
struct Dispatcher {
    session: Arc<RwLock<Session>>,
    event_sender: EventSender,
    phase: watch::Sender<RoundPhase>,
    reveal_tx: mpsc::UnboundedSender<u64>,
    reveal_delay: Duration,
    idle_reveal_delay: Duration,
}

impl Dispatcher {
    async fn run(
        self,
        mut inbound: mpsc::UnboundedReceiver<LinkEvent>,
        mut reveals: mpsc::UnboundedReceiver<u64>,
    ) {
        loop {
            let events = tokio::select! {
                Some(event) = inbound.recv() => self.on_link_event(event).await,
                Some(epoch) = reveals.recv() => self.on_reveal_elapsed(epoch).await,
                else => break,
            };
            emit(&self.event_sender, events).await;
        }
        debug!("Dispatcher stopped");
    }

    async fn on_link_event(&self, event: LinkEvent) -> Vec<GameEvent> {
        let mut session = self.session.write().await;
        let events = match event {
            LinkEvent::Connecting => vec![session.set_link(LinkStatus::Connecting)],
            LinkEvent::Connected { endpoint } => vec![
                session.set_link(LinkStatus::Online { endpoint }),
                GameEvent::Notice(Notice::success("Connected to server")),
            ],
            LinkEvent::Message(message) => session.apply(message, local_now_ms()),
            LinkEvent::Disconnected => {
                warn!("Lost connection to server");
                vec![
                    session.set_link(LinkStatus::Disconnected),
                    GameEvent::Notice(Notice::error("Disconnected from server")),
                ]
            }
            LinkEvent::Offline { simulated } => vec![
                session.set_link(LinkStatus::Offline),
                session.add_players(simulated),
                GameEvent::Notice(Notice::error("No connection, playing offline")),
            ],
        };
        self.phase.send_replace(session.phase());
        drop(session);

        for event in &events {
            if let GameEvent::RoundResolved {
                settlement, epoch, ..
            } = event
            {
                let delay = if settlement.is_some() {
                    self.reveal_delay
                } else {
                    self.idle_reveal_delay
                };
                self.schedule_reveal(*epoch, delay);
            }
        }
        events
    }

    fn schedule_reveal(&self, epoch: u64, delay: Duration) {
        debug!("Reveal {} ends in {}ms", epoch, delay.as_millis());
        let reveal_tx = self.reveal_tx.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = reveal_tx.send(epoch);
        });
    }

    async fn on_reveal_elapsed(&self, epoch: u64) -> Vec<GameEvent> {
        let mut session = self.session.write().await;
        let event = session.finish_reveal(epoch);
        self.phase.send_replace(session.phase());
        event.into_iter().collect()
    }
}
