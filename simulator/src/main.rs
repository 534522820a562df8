use anyhow::Context;
use clap::Parser;
use commonware_codec::Encode;
use commonware_utils::hex;
use memento_simulator::{
    config::{Config, ValidatedConfig},
    script::{self, Outcome, Replayer},
    watcher::GameWatcher,
    Simulator,
};
use memento_types::{Currency, Event, GameChange};
use std::path::PathBuf;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info};

/// Trades summarized per pool on exit.
const RECENT_TRADES: usize = 20;

#[derive(Parser, Debug)]
#[command(author, version, about = "Local backend for memento.", long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// YAML script of intents to replay
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Follow every game the script creates and log its updates
    #[arg(long, default_value_t = false)]
    watch: bool,
}

fn init_logging(config: &ValidatedConfig) {
    let builder = tracing_subscriber::fmt().with_max_level(config.log_level);
    if config.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn print_accounts(simulator: &Simulator, config: &ValidatedConfig) {
    for account in &config.accounts {
        let public = hex(&account.public_key.encode());
        let mmc = simulator.balance(&account.public_key, Currency::Mmc).await;
        let usd = simulator.balance(&account.public_key, Currency::Usd).await;
        info!(name = %account.name, %public, mmc, usd, "account");
    }
}

fn spawn_watcher(
    simulator: &Simulator,
    config: &ValidatedConfig,
    game: u64,
    stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let watcher = GameWatcher::new(game);
    let run = watcher.run(simulator.clone(), config.poll_interval, stop, move |snapshot| {
        info!(
            game,
            version = snapshot.version,
            status = snapshot.game.status().as_str(),
            "game update"
        );
    });
    tokio::spawn(async move {
        run.await;
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Load config
    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read config {}", args.config.display()))?;
    let config = Config::from_yaml(&raw)
        .context("failed to parse config")?
        .validate()
        .context("invalid config")?;

    // Create logger
    init_logging(&config);

    // Restore or initialize the store
    let entropy = rand::random::<u64>();
    let simulator = match &config.snapshot_path {
        Some(path) if path.exists() => Simulator::load(config.policy.clone(), entropy, path)
            .with_context(|| format!("failed to restore {}", path.display()))?,
        _ => {
            let simulator = Simulator::new(config.policy.clone(), entropy);
            simulator
                .genesis(&config.accounts, &config.pools)
                .await
                .context("genesis failed")?;
            simulator
        }
    };
    print_accounts(&simulator, &config).await;

    // Replay script
    if let Some(path) = &args.script {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        let steps = script::parse(&raw).context("failed to parse script")?;
        let (stop, stopped) = watch::channel(false);
        let mut watchers = Vec::new();
        let mut replayer = Replayer::new(simulator.clone(), &config);
        for (index, step) in steps.iter().enumerate() {
            let outcome = match replayer.step(index, step).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(%err, "replay aborted");
                    return Err(err).context("replay failed");
                }
            };
            if !args.watch {
                continue;
            }
            let Outcome::Applied(events) = outcome else {
                continue;
            };
            for event in &events {
                if let Event::GameUpdated {
                    game,
                    change: GameChange::Created,
                } = event
                {
                    watchers.push(spawn_watcher(
                        &simulator,
                        &config,
                        game.id(),
                        stopped.clone(),
                    ));
                }
            }
        }
        let report = replayer.report();
        info!(
            steps = steps.len(),
            applied = report.applied,
            rejected = report.rejected,
            "replay complete"
        );

        // Stop watchers; each polls once more on the way out
        let _ = stop.send(true);
        for watcher in watchers {
            watcher.await.context("watcher panicked")?;
        }
    }

    // Summarize
    print_accounts(&simulator, &config).await;
    for pool in &config.pools {
        let Some(current) = simulator.pool(pool.token).await else {
            continue;
        };
        let trades = simulator.recent_trades(pool.token, RECENT_TRADES).await;
        info!(
            token = pool.token,
            mmc_reserve = current.mmc_reserve,
            token_reserve = current.token_reserve,
            recent_trades = trades.len(),
            last_price = trades.first().map(|trade| trade.price()),
            "pool"
        );
    }
    for game in simulator.waiting_games().await {
        info!(
            game = game.id(),
            kind = ?game.kind(),
            host = %hex(&game.table().host.encode()),
            "waiting"
        );
    }

    // Persist
    if let Some(path) = &config.snapshot_path {
        simulator
            .save(path)
            .await
            .with_context(|| format!("failed to save {}", path.display()))?;
    }
    Ok(())
}
