use commonware_cryptography::ed25519::PublicKey;
use memento_execution::{
    state::{self, Memory},
    Error, Layer, Policy, Store,
};
use memento_types::{Currency, Event, Game, Intent, Key, Pool, Trade};
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

pub mod config;
pub mod persistence;
pub mod script;
pub mod watcher;

use config::Account;
use persistence::PersistenceError;

/// Updates buffered per game before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// A stored game together with the version of its record.
#[derive(Clone, Debug, PartialEq)]
pub struct GameSnapshot {
    pub game: Game,
    pub version: u64,
}

/// Push feed for one game. Hand it back to [Simulator::unsubscribe] when done.
pub struct Subscription {
    pub game: u64,
    pub receiver: broadcast::Receiver<GameSnapshot>,
}

struct Topic {
    sender: broadcast::Sender<GameSnapshot>,
    subscribers: usize,
}

/// Authoritative in-process store plus a per-game notification hub.
#[derive(Clone)]
pub struct Simulator {
    policy: Policy,
    state: Arc<RwLock<Memory>>,
    topics: Arc<Mutex<HashMap<u64, Topic>>>,
    entropy: Arc<AtomicU64>,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

impl Simulator {
    pub fn new(policy: Policy, entropy: u64) -> Self {
        Self::with_state(policy, entropy, Memory::default())
    }

    pub fn with_state(policy: Policy, entropy: u64, memory: Memory) -> Self {
        Self {
            policy,
            state: Arc::new(RwLock::new(memory)),
            topics: Arc::new(Mutex::new(HashMap::new())),
            entropy: Arc::new(AtomicU64::new(entropy)),
        }
    }

    /// Restores a simulator from a snapshot written by [Simulator::save].
    pub fn load(policy: Policy, entropy: u64, path: &Path) -> Result<Self, PersistenceError> {
        let memory = persistence::load(path)?;
        info!(path = %path.display(), keys = memory.len(), "restored snapshot");
        Ok(Self::with_state(policy, entropy, memory))
    }

    pub async fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let state = self.state.read().await;
        persistence::save(path, &state)?;
        info!(path = %path.display(), keys = state.len(), "saved snapshot");
        Ok(())
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<u64, Topic>> {
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Funds accounts and seeds pools in a single commit.
    pub async fn genesis(&self, accounts: &[Account], pools: &[Pool]) -> Result<(), Error> {
        let mut state = self.state.write().await;
        let changeset = {
            let mut layer = Layer::new(&*state, self.policy.clone(), 0, now());
            for account in accounts {
                layer
                    .grant(&account.public_key, Currency::Usd, account.usd)
                    .await?;
                layer
                    .grant(&account.public_key, Currency::Mmc, account.mmc)
                    .await?;
            }
            for pool in pools {
                layer.seed_pool(*pool)?;
            }
            layer.commit()
        };
        state.commit(changeset).await?;
        info!(accounts = accounts.len(), pools = pools.len(), "genesis applied");
        Ok(())
    }

    /// Executes one intent against the current store and commits it if no
    /// key it read has changed in the meantime.
    pub async fn submit(&self, intent: Intent) -> Result<Vec<Event>, Error> {
        let entropy = self.entropy.fetch_add(1, Ordering::Relaxed);
        let (events, changeset) = {
            let snapshot = self.state.read().await;
            let mut layer = Layer::new(&*snapshot, self.policy.clone(), entropy, now());
            let events = layer.apply(&intent).await?;
            (events, layer.commit())
        };
        if changeset.is_empty() {
            return Ok(events);
        }

        let games = changeset.games();
        self.state.write().await.commit(changeset).await?;
        debug!(instruction = ?intent.instruction, events = events.len(), "intent committed");
        self.notify(&games).await;
        Ok(events)
    }

    /// Like [Simulator::submit], re-executing on a fresh snapshot whenever
    /// the commit loses a race. Gives up after `attempts` tries.
    pub async fn submit_with_retry(
        &self,
        intent: Intent,
        attempts: usize,
    ) -> Result<Vec<Event>, Error> {
        let mut attempt = 1;
        loop {
            match self.submit(intent.clone()).await {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(attempt, %err, "commit raced, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn notify(&self, games: &[u64]) {
        for id in games {
            let Some(snapshot) = self.game_snapshot(*id).await else {
                continue;
            };
            let topics = self.topics();
            if let Some(topic) = topics.get(id) {
                // Send only fails when every receiver is gone.
                if topic.sender.send(snapshot).is_err() {
                    debug!(game = id, "no live subscribers");
                }
            }
        }
    }

    pub fn subscribe(&self, game: u64) -> Subscription {
        let mut topics = self.topics();
        let topic = topics.entry(game).or_insert_with(|| Topic {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            subscribers: 0,
        });
        topic.subscribers += 1;
        Subscription {
            game,
            receiver: topic.sender.subscribe(),
        }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut topics = self.topics();
        let Some(topic) = topics.get_mut(&subscription.game) else {
            return;
        };
        topic.subscribers = topic.subscribers.saturating_sub(1);
        if topic.subscribers == 0 {
            topics.remove(&subscription.game);
        }
    }

    pub fn subscribers(&self, game: u64) -> usize {
        self.topics()
            .get(&game)
            .map_or(0, |topic| topic.subscribers)
    }

    pub async fn game_snapshot(&self, id: u64) -> Option<GameSnapshot> {
        let state = self.state.read().await;
        let game = state::game(&*state, id).await?;
        let version = state.version(&Key::Game(id)).await;
        Some(GameSnapshot { game, version })
    }

    pub async fn waiting_games(&self) -> Vec<Game> {
        let state = self.state.read().await;
        state::waiting_games(&*state).await
    }

    pub async fn open_game(&self, user: &PublicKey) -> Option<Game> {
        let state = self.state.read().await;
        state::open_game(&*state, user).await
    }

    pub async fn balance(&self, user: &PublicKey, currency: Currency) -> f64 {
        let state = self.state.read().await;
        state::balance(&*state, user, currency).await
    }

    pub async fn pool(&self, token: u64) -> Option<Pool> {
        let state = self.state.read().await;
        state::pool(&*state, token).await
    }

    pub async fn recent_trades(&self, token: u64, limit: usize) -> Vec<Trade> {
        let state = self.state.read().await;
        state::recent_trades(&*state, token, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memento_execution::mocks::create_account_keypair;
    use memento_types::{GameChange, GameKind, GameStatus, Instruction};

    fn account(name: &str, seed: u64, mmc: f64) -> Account {
        let (_, public_key) = create_account_keypair(seed);
        Account {
            name: name.to_string(),
            public_key,
            usd: 0.0,
            mmc,
        }
    }

    async fn setup() -> (Simulator, PublicKey, PublicKey) {
        let simulator = Simulator::new(Policy::default(), 7);
        let host = account("host", 1, 100.0);
        let guest = account("guest", 2, 100.0);
        let keys = (host.public_key.clone(), guest.public_key.clone());
        simulator
            .genesis(&[host, guest], &[Pool::new(1, 1_000.0, 1_000.0)])
            .await
            .unwrap();
        (simulator, keys.0, keys.1)
    }

    async fn create(simulator: &Simulator, host: &PublicKey) -> u64 {
        let events = simulator
            .submit(Intent::new(
                host.clone(),
                Instruction::CreateGame {
                    kind: GameKind::Rps,
                    bet: Some(10.0),
                    private: false,
                },
            ))
            .await
            .unwrap();
        events[0].game().map(Game::id).unwrap()
    }

    #[tokio::test]
    async fn test_genesis() {
        let (simulator, host, _) = setup().await;
        assert_eq!(simulator.balance(&host, Currency::Mmc).await, 100.0);
        assert_eq!(
            simulator.pool(1).await,
            Some(Pool::new(1, 1_000.0, 1_000.0))
        );
    }

    #[tokio::test]
    async fn test_subscribers_receive_updates() {
        let (simulator, host, guest) = setup().await;
        let id = create(&simulator, &host).await;
        assert_eq!(simulator.waiting_games().await.len(), 1);

        let mut subscription = simulator.subscribe(id);
        let before = simulator.game_snapshot(id).await.unwrap();
        simulator
            .submit(Intent::new(guest.clone(), Instruction::JoinGame { game: id }))
            .await
            .unwrap();

        let update = subscription.receiver.recv().await.unwrap();
        assert!(update.version > before.version);
        assert_eq!(update.game.status(), GameStatus::Active);
        assert_eq!(simulator.open_game(&guest).await.map(|g| g.id()), Some(id));
        assert!(simulator.waiting_games().await.is_empty());

        simulator.unsubscribe(subscription);
        assert_eq!(simulator.subscribers(id), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_other_subscribers() {
        let (simulator, host, guest) = setup().await;
        let id = create(&simulator, &host).await;
        simulator
            .submit(Intent::new(guest.clone(), Instruction::JoinGame { game: id }))
            .await
            .unwrap();
        let first = simulator.subscribe(id);
        let mut second = simulator.subscribe(id);
        assert_eq!(simulator.subscribers(id), 2);

        simulator.unsubscribe(first);
        assert_eq!(simulator.subscribers(id), 1);
        simulator
            .submit(Intent::new(
                host.clone(),
                Instruction::ProposeBet {
                    game: id,
                    amount: 20.0,
                },
            ))
            .await
            .unwrap();
        let update = second.receiver.recv().await.unwrap();
        assert_eq!(
            update.game.table().bet.proposal.as_ref().map(|p| p.amount),
            Some(20.0)
        );
    }

    #[tokio::test]
    async fn test_rejected_intent_changes_nothing() {
        let (simulator, host, guest) = setup().await;
        let id = create(&simulator, &host).await;
        let before = simulator.game_snapshot(id).await.unwrap();
        let result = simulator
            .submit(Intent::new(guest.clone(), Instruction::AcceptBet { game: id }))
            .await;
        assert_eq!(result, Err(Error::NotParticipant));
        assert_eq!(simulator.game_snapshot(id).await, Some(before));
    }

    #[tokio::test]
    async fn test_concurrent_joins_single_winner() {
        let (simulator, host, guest) = setup().await;
        let (_, rival) = create_account_keypair(3);
        let id = create(&simulator, &host).await;

        let (a, b) = tokio::join!(
            simulator.submit_with_retry(
                Intent::new(guest.clone(), Instruction::JoinGame { game: id }),
                3
            ),
            simulator.submit_with_retry(
                Intent::new(rival.clone(), Instruction::JoinGame { game: id }),
                3
            ),
        );
        // The loser either lost the race outright or found the seat taken.
        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

        let game = simulator.game_snapshot(id).await.unwrap().game;
        let seated = game.table().guest.clone().unwrap();
        assert!(seated == guest || seated == rival);
        let events = match (&a, &b) {
            (Ok(events), _) | (_, Ok(events)) => events,
            _ => unreachable!(),
        };
        assert!(matches!(
            &events[0],
            Event::GameUpdated {
                change: GameChange::Joined,
                ..
            }
        ));
    }
}
