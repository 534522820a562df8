use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use commonware_cryptography::ed25519::PublicKey;
use memento_types::{Currency, Game, Key, Pool, Trade, Value};
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
};

pub trait State {
    fn get(&self, key: &Key) -> impl Future<Output = Option<Value>>;
    fn insert(&mut self, key: Key, value: Value) -> impl Future<Output = ()>;
    fn delete(&mut self, key: &Key) -> impl Future<Output = ()>;

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> impl Future<Output = ()> {
        async {
            for (key, status) in changes {
                match status {
                    Status::Update(value) => self.insert(key, value).await,
                    Status::Delete => self.delete(&key).await,
                }
            }
        }
    }
}

/// A [State] that versions every key and only accepts changesets built on
/// current versions.
pub trait Store: State {
    /// Version of `key`. Keys never written are at version 0.
    fn version(&self, key: &Key) -> impl Future<Output = u64>;

    fn commit(&mut self, changeset: Changeset) -> impl Future<Output = Result<(), PreconditionFailed>> {
        async move {
            for (key, expected) in &changeset.reads {
                let found = self.version(key).await;
                if found != *expected {
                    return Err(PreconditionFailed {
                        key: key.clone(),
                        expected: *expected,
                        found,
                    });
                }
            }
            self.apply(changeset.writes).await;
            Ok(())
        }
    }
}

/// A read observed at an older version than the store now holds.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("precondition failed on {key:?}: expected version {expected}, found {found}")]
pub struct PreconditionFailed {
    pub key: Key,
    pub expected: u64,
    pub found: u64,
}

/// Writes produced by a [crate::Layer] plus the versions they were computed against.
#[derive(Clone, Debug, Default)]
pub struct Changeset {
    pub reads: BTreeMap<Key, u64>,
    pub writes: Vec<(Key, Status)>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Ids of every game written by this changeset.
    pub fn games(&self) -> Vec<u64> {
        self.writes
            .iter()
            .filter_map(|(key, _)| match key {
                Key::Game(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
pub struct Memory {
    state: HashMap<Key, Value>,
    versions: HashMap<Key, u64>,
}

impl Memory {
    fn bump(&mut self, key: &Key) {
        *self.versions.entry(key.clone()).or_default() += 1;
    }

    /// Every live key with its value and current version.
    pub fn entries(&self) -> impl Iterator<Item = (&Key, &Value, u64)> {
        self.state.iter().map(|(key, value)| {
            let version = self.versions.get(key).copied().unwrap_or_default();
            (key, value, version)
        })
    }

    /// Rebuilds a store from the output of [Memory::entries].
    pub fn restore(entries: impl IntoIterator<Item = (Key, Value, u64)>) -> Self {
        let mut memory = Self::default();
        for (key, value, version) in entries {
            memory.versions.insert(key.clone(), version);
            memory.state.insert(key, value);
        }
        memory
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

impl State for Memory {
    async fn get(&self, key: &Key) -> Option<Value> {
        self.state.get(key).cloned()
    }

    async fn insert(&mut self, key: Key, value: Value) {
        self.bump(&key);
        self.state.insert(key, value);
    }

    async fn delete(&mut self, key: &Key) {
        self.bump(key);
        self.state.remove(key);
    }
}

impl Store for Memory {
    async fn version(&self, key: &Key) -> u64 {
        self.versions.get(key).copied().unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum Status {
    Update(Value),
    Delete,
}

impl Write for Status {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Status::Update(value) => {
                0u8.write(writer);
                value.write(writer);
            }
            Status::Delete => 1u8.write(writer),
        }
    }
}

impl Read for Status {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Status::Update(Value::read(reader)?)),
            1 => Ok(Status::Delete),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Status {
    fn encode_size(&self) -> usize {
        1 + match self {
            Status::Update(value) => value.encode_size(),
            Status::Delete => 0,
        }
    }
}

/// Balance of `currency` held by `user`. Missing balances are zero.
pub async fn balance<S: State>(state: &S, user: &PublicKey, currency: Currency) -> f64 {
    match state.get(&Key::Balance(user.clone(), currency)).await {
        Some(Value::Amount(amount)) => amount,
        _ => 0.0,
    }
}

pub async fn pool<S: State>(state: &S, token: u64) -> Option<Pool> {
    match state.get(&Key::Pool(token)).await {
        Some(Value::Pool(pool)) => Some(pool),
        _ => None,
    }
}

pub(crate) async fn trade_history<S: State>(state: &S, token: u64) -> Vec<Trade> {
    match state.get(&Key::Trades(token)).await {
        Some(Value::Trades(trades)) => trades,
        _ => Vec::new(),
    }
}

/// Up to `limit` of the latest trades against `token`'s pool, newest first.
pub async fn recent_trades<S: State>(state: &S, token: u64, limit: usize) -> Vec<Trade> {
    trade_history(state, token)
        .await
        .into_iter()
        .rev()
        .take(limit)
        .collect()
}

pub async fn game<S: State>(state: &S, id: u64) -> Option<Game> {
    match state.get(&Key::Game(id)).await {
        Some(Value::Game(game)) => Some(game),
        _ => None,
    }
}

pub(crate) async fn game_index<S: State>(state: &S) -> Vec<u64> {
    match state.get(&Key::WaitingGames).await {
        Some(Value::GameIndex(ids)) => ids,
        _ => Vec::new(),
    }
}

/// Public games still waiting for a guest, newest first.
pub async fn waiting_games<S: State>(state: &S) -> Vec<Game> {
    let mut games = Vec::new();
    for id in game_index(state).await.into_iter().rev() {
        if let Some(game) = game(state, id).await {
            if game.status() == memento_types::GameStatus::Waiting {
                games.push(game);
            }
        }
    }
    games
}

/// The waiting or active game `user` is seated at, if any.
pub async fn open_game<S: State>(state: &S, user: &PublicKey) -> Option<Game> {
    let id = match state.get(&Key::OpenGame(user.clone())).await {
        Some(Value::GameId(id)) => id,
        _ => return None,
    };
    game(state, id)
        .await
        .filter(|game| game.status().is_open())
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_runtime::deterministic::Runner;
    use commonware_runtime::Runner as _;

    #[test]
    fn test_versions_bump_on_write() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let mut memory = Memory::default();
            assert_eq!(memory.version(&Key::NextGameId).await, 0);

            memory.insert(Key::NextGameId, Value::Counter(1)).await;
            memory.insert(Key::NextGameId, Value::Counter(2)).await;
            assert_eq!(memory.version(&Key::NextGameId).await, 2);

            memory.delete(&Key::NextGameId).await;
            assert_eq!(memory.version(&Key::NextGameId).await, 3);
            assert!(memory.get(&Key::NextGameId).await.is_none());
        });
    }

    #[test]
    fn test_commit_rejects_stale_reads() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let mut memory = Memory::default();
            memory.insert(Key::NextTokenId, Value::Counter(1)).await;

            let mut stale = Changeset::default();
            stale.reads.insert(Key::NextTokenId, 0);
            stale
                .writes
                .push((Key::NextTokenId, Status::Update(Value::Counter(5))));

            let err = memory.commit(stale).await.unwrap_err();
            assert_eq!(err.key, Key::NextTokenId);
            assert_eq!(err.expected, 0);
            assert_eq!(err.found, 1);
            assert_eq!(
                memory.get(&Key::NextTokenId).await,
                Some(Value::Counter(1))
            );

            let mut fresh = Changeset::default();
            fresh.reads.insert(Key::NextTokenId, 1);
            fresh
                .writes
                .push((Key::NextTokenId, Status::Update(Value::Counter(5))));
            memory.commit(fresh).await.unwrap();
            assert_eq!(
                memory.get(&Key::NextTokenId).await,
                Some(Value::Counter(5))
            );
        });
    }
}
