use crate::{GameSnapshot, Simulator};
use std::time::Duration;
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    time::{interval, MissedTickBehavior},
};
use tracing::debug;

/// Follows one game through both interval polling and pushed updates.
///
/// Either source may deliver the same state twice or deliver it late, so
/// everything funnels through [GameWatcher::reconcile], which only moves
/// forward.
pub struct GameWatcher {
    game: u64,
    latest: Option<GameSnapshot>,
}

impl GameWatcher {
    pub fn new(game: u64) -> Self {
        Self { game, latest: None }
    }

    pub fn game(&self) -> u64 {
        self.game
    }

    pub fn latest(&self) -> Option<&GameSnapshot> {
        self.latest.as_ref()
    }

    /// Adopts `snapshot` if it belongs to this game and is strictly newer
    /// than anything seen so far. Returns whether it was adopted.
    pub fn reconcile(&mut self, snapshot: GameSnapshot) -> bool {
        if snapshot.game.id() != self.game {
            return false;
        }
        if let Some(latest) = &self.latest {
            if snapshot.version <= latest.version {
                return false;
            }
        }
        self.latest = Some(snapshot);
        true
    }

    /// Watches until `stop` flips (or its sender is dropped), calling
    /// `on_change` for every adopted snapshot. A final poll on the way out
    /// picks up anything still queued. Returns the last snapshot.
    pub async fn run<F>(
        mut self,
        simulator: Simulator,
        period: Duration,
        mut stop: watch::Receiver<bool>,
        mut on_change: F,
    ) -> Option<GameSnapshot>
    where
        F: FnMut(&GameSnapshot),
    {
        let mut subscription = simulator.subscribe(self.game);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let snapshot = tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => simulator.game_snapshot(self.game).await,
                update = subscription.receiver.recv() => match update {
                    Ok(snapshot) => Some(snapshot),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(game = self.game, skipped, "watcher lagged, polling");
                        simulator.game_snapshot(self.game).await
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            if let Some(snapshot) = snapshot {
                self.adopt(snapshot, &mut on_change);
            }
        }

        if let Some(snapshot) = simulator.game_snapshot(self.game).await {
            self.adopt(snapshot, &mut on_change);
        }
        simulator.unsubscribe(subscription);
        self.latest
    }

    fn adopt<F: FnMut(&GameSnapshot)>(&mut self, snapshot: GameSnapshot, on_change: &mut F) {
        if self.reconcile(snapshot) {
            if let Some(latest) = &self.latest {
                on_change(latest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Account;
    use memento_execution::{mocks::create_account_keypair, Policy};
    use memento_types::{GameKind, GameStatus, Instruction, Intent, Table};
    use tokio::sync::mpsc;

    fn snapshot(id: u64, version: u64) -> GameSnapshot {
        let (_, host) = create_account_keypair(1);
        let (game, _) = memento_execution::games::create(
            GameKind::Rps,
            Table::new(id, host, 0),
            None,
        )
        .unwrap();
        GameSnapshot { game, version }
    }

    #[test]
    fn test_reconcile_moves_forward_only() {
        let mut watcher = GameWatcher::new(1);
        assert!(watcher.reconcile(snapshot(1, 3)));
        // Duplicate delivery.
        assert!(!watcher.reconcile(snapshot(1, 3)));
        // Late poll.
        assert!(!watcher.reconcile(snapshot(1, 2)));
        // Some other game.
        assert!(!watcher.reconcile(snapshot(2, 9)));
        assert!(watcher.reconcile(snapshot(1, 4)));
        assert_eq!(watcher.latest().map(|s| s.version), Some(4));
    }

    #[tokio::test]
    async fn test_run_sees_polled_and_pushed_state() {
        let simulator = Simulator::new(Policy::default(), 0);
        let accounts: Vec<Account> = [("host", 1), ("guest", 2)]
            .into_iter()
            .map(|(name, seed)| {
                let (_, public_key) = create_account_keypair(seed);
                Account {
                    name: name.to_string(),
                    public_key,
                    usd: 0.0,
                    mmc: 0.0,
                }
            })
            .collect();
        simulator.genesis(&accounts, &[]).await.unwrap();
        let host = accounts[0].public_key.clone();
        let guest = accounts[1].public_key.clone();
        simulator
            .submit(Intent::new(
                host,
                Instruction::CreateGame {
                    kind: GameKind::Rps,
                    bet: None,
                    private: false,
                },
            ))
            .await
            .unwrap();

        let (seen, mut updates) = mpsc::unbounded_channel();
        let (stop, stopped) = watch::channel(false);
        // A long period so only the immediate first tick polls.
        let handle = tokio::spawn(GameWatcher::new(1).run(
            simulator.clone(),
            Duration::from_secs(3_600),
            stopped,
            move |snapshot: &GameSnapshot| {
                let _ = seen.send(snapshot.clone());
            },
        ));

        let polled = updates.recv().await.unwrap();
        assert_eq!(polled.game.status(), GameStatus::Waiting);

        simulator
            .submit(Intent::new(guest, Instruction::JoinGame { game: 1 }))
            .await
            .unwrap();
        let pushed = updates.recv().await.unwrap();
        assert_eq!(pushed.game.status(), GameStatus::Active);
        assert!(pushed.version > polled.version);

        stop.send(true).unwrap();
        let last = handle.await.unwrap();
        assert_eq!(last, Some(pushed));
        assert_eq!(simulator.subscribers(1), 0);
    }

    #[tokio::test]
    async fn test_stop_picks_up_final_state() {
        let simulator = Simulator::new(Policy::default(), 0);
        let accounts: Vec<Account> = [("host", 3), ("guest", 4)]
            .into_iter()
            .map(|(name, seed)| {
                let (_, public_key) = create_account_keypair(seed);
                Account {
                    name: name.to_string(),
                    public_key,
                    usd: 0.0,
                    mmc: 0.0,
                }
            })
            .collect();
        simulator.genesis(&accounts, &[]).await.unwrap();
        let host = accounts[0].public_key.clone();
        let guest = accounts[1].public_key.clone();
        simulator
            .submit(Intent::new(
                host,
                Instruction::CreateGame {
                    kind: GameKind::Ttt,
                    bet: None,
                    private: false,
                },
            ))
            .await
            .unwrap();

        // Stopped before it ever runs, so neither tick nor push is seen.
        let (stop, stopped) = watch::channel(false);
        let run = GameWatcher::new(1).run(
            simulator.clone(),
            Duration::from_secs(3_600),
            stopped,
            |_: &GameSnapshot| {},
        );
        simulator
            .submit(Intent::new(guest, Instruction::JoinGame { game: 1 }))
            .await
            .unwrap();
        stop.send(true).unwrap();

        let last = run.await.unwrap();
        assert_eq!(last.game.status(), GameStatus::Active);
        assert_eq!(Some(last), simulator.game_snapshot(1).await);
    }
}
