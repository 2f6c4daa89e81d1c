use mines_client::{
    Cell, ClientConfig, FileStorage, GameEvent, LinkStatus, MinesGame, NoticeKind, SessionView,
    TimerUrgency,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = ClientConfig::from_env();
    let storage = FileStorage::new(&config.data_dir)?;
    let data_dir = config.data_dir.clone();
    let game = MinesGame::new(config, Box::new(storage));

    let mut event_receiver = game.subscribe_to_events().await;
    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_receiver.recv().await {
            match event {
                GameEvent::RosterChanged { online } => println!("👥 {} players online", online),
                GameEvent::RoundStarted { round_number } => {
                    println!("🎲 Round {} started, place your bets!", round_number)
                }
                GameEvent::BetPlaced { bet, own } => {
                    let who = bet.player_name.unwrap_or(bet.player_id);
                    let marker = if own { " (you)" } else { "" };
                    println!("💰 {}{} bet {} on cell {}", who, marker, bet.bet, bet.cell);
                }
                GameEvent::RoundResolved {
                    mine_cell,
                    settlement,
                    ..
                } => {
                    println!("💣 Mine was under cell {}", mine_cell);
                    match settlement {
                        Some(s) if s.won => println!("🎉 You won {:.2}!", s.payout()),
                        Some(s) => println!("😵 You lost {:.2}", s.stake),
                        None => {}
                    }
                }
                GameEvent::RevealFinished => println!("⏳ Waiting for the next round"),
                GameEvent::LinkChanged(status) => match status {
                    LinkStatus::Connecting => println!("🔌 Connecting..."),
                    LinkStatus::Online { endpoint } => println!("🟢 Online at {}", endpoint),
                    LinkStatus::Offline => println!("🟡 Offline mode"),
                    LinkStatus::Disconnected => println!("🔴 Disconnected"),
                },
                GameEvent::Notice(notice) => match notice.kind {
                    NoticeKind::Error => println!("⚠️  {}", notice.message),
                    _ => println!("ℹ️  {}", notice.message),
                },
                GameEvent::RoundStateChanged | GameEvent::ProfileChanged => {}
            }
        }
    });

    game.connect().await?;
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let argument = parts.next();

        match (command, argument) {
            ("select", Some(n)) => match n.parse::<u8>() {
                Ok(n) => {
                    let _ = game.select_cell(n).await;
                }
                Err(_) => println!("Cell must be a number from 1 to 9"),
            },
            ("bet", Some(amount)) => match amount.parse::<f64>() {
                Ok(amount) => {
                    if game.place_bet(amount).await.is_ok() {
                        println!("Bet sent");
                    }
                }
                Err(_) => println!("Amount must be a number"),
            },
            ("board", None) => display_board(&game.view().await),
            ("stats", None) => display_stats(&game.view().await),
            ("reset-stats", None) => game.reset_stats().await,
            ("reset-game", None) => game.reset_game().await,
            ("export", None) => {
                let export = game.export_stats().await?;
                let path = data_dir.join(&export.file_name);
                std::fs::write(&path, export.contents)?;
                println!("Saved {}", path.display());
            }
            ("server", Some(url)) => game.update_server_url(url).await?,
            ("quit", None) | ("exit", None) => break,
            ("", None) => {}
            _ => print_help(),
        }
    }

    game.disconnect().await?;
    event_handler.abort();
    Ok(())
}

fn print_help() {
    println!("Commands: select <1-9> | bet <amount> | board | stats | reset-stats | reset-game");
    println!("          export | server <url> | quit");
}

fn display_board(view: &SessionView) {
    let now = chrono::Utc::now().timestamp_millis();
    match (view.seconds_left(now), view.urgency(now)) {
        (Some(secs), Some(TimerUrgency::Critical)) => {
            println!("Round {}: {}s left!!", view.round.round_number, secs)
        }
        (Some(secs), _) => println!("Round {}: {}s left", view.round.round_number, secs),
        _ => println!("Round {} ({:?})", view.round.round_number, view.phase),
    }

    for row in Cell::all().collect::<Vec<_>>().chunks(3) {
        let line: Vec<String> = row
            .iter()
            .map(|cell| {
                let stakes = view.bets.iter().filter(|b| b.cell == *cell).count();
                let marker = if view.selected_cell == Some(*cell) { '*' } else { ' ' };
                format!("[{}{}:{:>2}]", marker, cell, stakes)
            })
            .collect();
        println!("{}", line.join(" "));
    }
    if let Some(bet) = view.own_bet() {
        println!("Your bet: {} on cell {}", bet.bet, bet.cell);
    }
}

fn display_stats(view: &SessionView) {
    let stats = &view.stats;
    println!("{} ({})", view.player_name, view.player_id);
    println!("Balance: {:.2}", view.balance);
    println!(
        "Games: {}  Wins: {}  Losses: {}  Win rate: {:.1}%  Wagered: {:.2}",
        stats.games_played,
        stats.wins,
        stats.losses,
        stats.win_rate(),
        stats.total_wagered
    );
}
