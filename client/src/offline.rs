use std::sync::Arc;
use std::time::Duration;

use mines_common::{
    models::{Cell, Player, PlayerBet},
    protocol::ServerMessage,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info};

use crate::{
    connection::LinkEvent,
    session::{RoundPhase, Session},
};

const MAX_BOT_BET: u32 = 5;

/// Stand-in table used when no server is reachable.
///
/// The bots join the roster. On each tick any non-local roster player may
/// bet, but only while a round is active; nothing here starts or resolves
/// rounds.
#[derive(Clone, Debug)]
pub struct OfflineSimulator {
    bots: Vec<Player>,
    interval: Duration,
    bet_chance: f64,
}

impl OfflineSimulator {
    pub fn new(interval: Duration, bet_chance: f64) -> Self {
        Self {
            bots: default_bots(),
            interval,
            bet_chance: bet_chance.clamp(0.0, 1.0),
        }
    }

    pub fn bots(&self) -> &[Player] {
        &self.bots
    }

    /// One simulation tick: maybe a bet from one of `candidates`
    pub fn roll_bet<R: Rng>(
        &self,
        rng: &mut R,
        phase: RoundPhase,
        candidates: &[Player],
    ) -> Option<PlayerBet> {
        if phase != RoundPhase::Active || candidates.is_empty() {
            return None;
        }
        if !rng.random_bool(self.bet_chance) {
            return None;
        }

        let player = &candidates[rng.random_range(0..candidates.len())];
        let cell = Cell::new(rng.random_range(Cell::MIN..=Cell::MAX)).ok()?;
        Some(PlayerBet {
            player_id: player.id.clone(),
            bet: f64::from(rng.random_range(1..=MAX_BOT_BET)),
            cell,
            player_name: Some(player.name.clone()),
        })
    }

    /// Tick forever, feeding synthetic bets into `inbound` like server events
    pub(crate) fn spawn(
        self,
        phase: watch::Receiver<RoundPhase>,
        session: Arc<RwLock<Session>>,
        inbound: mpsc::UnboundedSender<LinkEvent>,
    ) -> JoinHandle<()> {
        info!(
            "Starting offline simulation with {} players, tick {}ms",
            self.bots.len(),
            self.interval.as_millis()
        );

        tokio::spawn(async move {
            let mut rng = StdRng::from_os_rng();
            let mut ticker = time::interval(self.interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let current = *phase.borrow();
                if current != RoundPhase::Active {
                    continue;
                }
                let candidates = session.read().await.opponents();
                if let Some(bet) = self.roll_bet(&mut rng, current, &candidates) {
                    debug!("Simulated bet from {}", bet.player_id);
                    if inbound
                        .send(LinkEvent::Message(ServerMessage::PlayerBet(bet)))
                        .is_err()
                    {
                        break;
                    }
                }
            }
        })
    }
}

fn default_bots() -> Vec<Player> {
    [("bot_1", "Bot_Ivan", 50.0), ("bot_2", "Bot_Maria", 30.0), ("bot_3", "Bot_Alexei", 25.0)]
        .into_iter()
        .map(|(id, name, balance)| Player {
            id: id.to_string(),
            name: name.to_string(),
            balance,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn no_bets_outside_active_round() {
        let simulator = OfflineSimulator::new(Duration::from_millis(10), 1.0);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let bots = simulator.bots();
            assert!(simulator.roll_bet(&mut rng, RoundPhase::Idle, bots).is_none());
            assert!(simulator.roll_bet(&mut rng, RoundPhase::Resolving, bots).is_none());
        }
    }

    #[test]
    fn active_round_bets_stay_in_range() {
        let simulator = OfflineSimulator::new(Duration::from_millis(10), 1.0);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let bet = simulator
                .roll_bet(&mut rng, RoundPhase::Active, simulator.bots())
                .expect("certain bet chance");
            assert!((1.0..=5.0).contains(&bet.bet));
            assert!(simulator.bots().iter().any(|bot| bot.id == bet.player_id));
        }
    }

    #[test]
    fn zero_chance_never_bets() {
        let simulator = OfflineSimulator::new(Duration::from_millis(10), 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(
            simulator
                .roll_bet(&mut rng, RoundPhase::Active, simulator.bots())
                .is_none()
        );
    }

    #[test]
    fn any_listed_player_can_bet() {
        let simulator = OfflineSimulator::new(Duration::from_millis(10), 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        let leftover = vec![Player {
            id: "p9".into(),
            name: "Olga".into(),
            balance: 12.0,
        }];

        let bet = simulator
            .roll_bet(&mut rng, RoundPhase::Active, &leftover)
            .expect("certain bet chance");
        assert_eq!(bet.player_id, "p9");
        assert_eq!(bet.player_name.as_deref(), Some("Olga"));
        assert!(simulator.roll_bet(&mut rng, RoundPhase::Active, &[]).is_none());
    }

    #[tokio::test]
    async fn spawned_simulator_emits_bets_while_active() {
        let simulator = OfflineSimulator::new(Duration::from_millis(10), 1.0);
        let mut session = Session::load(Box::new(MemoryStorage::new()), 0);
        session.add_players(simulator.bots().to_vec());
        let session = Arc::new(RwLock::new(session));
        let (phase_tx, phase_rx) = watch::channel(RoundPhase::Active);
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

        let handle = simulator.spawn(phase_rx, session, inbound_tx);
        let event = time::timeout(Duration::from_secs(2), inbound_rx.recv())
            .await
            .expect("simulated bet in time")
            .expect("channel open");
        assert!(matches!(
            event,
            LinkEvent::Message(ServerMessage::PlayerBet(_))
        ));

        handle.abort();
        drop(phase_tx);
    }
}
