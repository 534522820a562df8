use commonware_cryptography::ed25519::PublicKey;
use memento_types::{Currency, Event, Instruction, Intent, Key, Pool, Value};
use std::{collections::BTreeMap, sync::Mutex};
use tracing::{debug, error};

use crate::{
    state::{balance, Changeset, State, Status, Store},
    Error, Policy,
};

mod handlers;

/// Applies intents over a snapshot of `S`, buffering writes and remembering
/// the version of every key read so the result can be committed conditionally.
pub struct Layer<'a, S: Store> {
    state: &'a S,
    pending: BTreeMap<Key, Status>,
    reads: Mutex<BTreeMap<Key, u64>>,

    policy: Policy,
    entropy: u64,
    now: u64,
}

impl<'a, S: Store> Layer<'a, S> {
    pub fn new(state: &'a S, policy: Policy, entropy: u64, now: u64) -> Self {
        Self {
            state,
            pending: BTreeMap::new(),
            reads: Mutex::new(BTreeMap::new()),

            policy,
            entropy,
            now,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    fn insert(&mut self, key: Key, value: Value) {
        self.pending.insert(key, Status::Update(value));
    }

    fn remove(&mut self, key: Key) {
        self.pending.insert(key, Status::Delete);
    }

    fn reads(&self) -> std::sync::MutexGuard<'_, BTreeMap<Key, u64>> {
        // Nothing panics while holding the guard.
        self.reads.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds `delta` to a balance. A result below zero is rejected.
    pub async fn adjust_balance(
        &mut self,
        user: &PublicKey,
        currency: Currency,
        delta: f64,
    ) -> Result<f64, Error> {
        if !delta.is_finite() {
            return Err(Error::InvalidAmount);
        }
        let available = balance(self, user, currency).await;
        let updated = available + delta;
        if updated < 0.0 {
            return Err(Error::InsufficientFunds {
                needed: -delta,
                available,
            });
        }
        self.insert(
            Key::Balance(user.clone(), currency),
            Value::Amount(updated),
        );
        Ok(updated)
    }

    /// Credits `amount` out of thin air. Used to seed accounts.
    pub async fn grant(&mut self, user: &PublicKey, currency: Currency, amount: f64) -> Result<f64, Error> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(Error::InvalidAmount);
        }
        self.adjust_balance(user, currency, amount).await
    }

    /// Installs a pool. Pools are operator-seeded, never user-created.
    pub fn seed_pool(&mut self, pool: Pool) -> Result<(), Error> {
        let reserves = [pool.mmc_reserve, pool.token_reserve];
        if reserves.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(Error::InvalidAmount);
        }
        self.insert(Key::Pool(pool.token), Value::Pool(pool));
        Ok(())
    }

    /// Allocates the next id from `counter`. Ids start at 1.
    async fn next_id(&mut self, counter: Key) -> u64 {
        let id = match self.get(&counter).await {
            Some(Value::Counter(next)) => next,
            _ => 1,
        };
        self.insert(counter, Value::Counter(id + 1));
        id
    }

    async fn dispatch(&mut self, intent: &Intent) -> Result<Vec<Event>, Error> {
        let user = &intent.user;
        match &intent.instruction {
            Instruction::Buy {
                token,
                mmc_in,
                min_tokens_out,
            } => self.handle_buy(user, *token, *mmc_in, *min_tokens_out).await,
            Instruction::Sell {
                token,
                tokens_in,
                min_mmc_out,
            } => self.handle_sell(user, *token, *tokens_in, *min_mmc_out).await,
            Instruction::IssueToken {
                ticker,
                name,
                total_supply,
                base_price,
            } => {
                self.handle_issue_token(user, ticker, name, *total_supply, *base_price)
                    .await
            }
            Instruction::ConvertUsd { amount } => self.handle_convert_usd(user, *amount).await,
            Instruction::ExchangeEquity => self.handle_exchange_equity(user).await,
            Instruction::CreateGame { kind, bet, private } => {
                self.handle_create_game(user, *kind, *bet, *private).await
            }
            Instruction::JoinGame { game } => self.handle_join_game(user, *game).await,
            Instruction::JoinByCode { code } => self.handle_join_by_code(user, code).await,
            Instruction::ProposeBet { game, amount } => {
                self.handle_propose_bet(user, *game, *amount).await
            }
            Instruction::AcceptBet { game } => self.handle_accept_bet(user, *game).await,
            Instruction::SubmitMove { game, play } => {
                self.handle_submit_move(user, *game, *play).await
            }
            Instruction::Restart { game } => self.handle_restart(user, *game).await,
            Instruction::Forfeit { game } => self.handle_forfeit(user, *game).await,
        }
    }

    /// Applies one intent. On failure the overlay is restored to where it was
    /// before the intent, so nothing it wrote survives.
    pub async fn apply(&mut self, intent: &Intent) -> Result<Vec<Event>, Error> {
        let pending = self.pending.clone();
        let reads = self.reads().clone();
        let result = self.dispatch(intent).await;
        if let Err(err) = &result {
            self.pending = pending;
            *self.reads() = reads;
            if err.is_fatal() {
                error!(user = ?intent.user, instruction = ?intent.instruction, ?err, "intent aborted on corrupted state");
            } else {
                debug!(instruction = ?intent.instruction, %err, "intent rejected");
            }
        }
        result
    }

    pub async fn execute(&mut self, intents: Vec<Intent>) -> Vec<Result<Vec<Event>, Error>> {
        let mut outputs = Vec::with_capacity(intents.len());
        for intent in intents {
            outputs.push(self.apply(&intent).await);
        }
        outputs
    }

    pub fn commit(self) -> Changeset {
        let reads = self
            .reads
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Changeset {
            reads,
            writes: self.pending.into_iter().collect(),
        }
    }
}

impl<'a, S: Store> State for Layer<'a, S> {
    async fn get(&self, key: &Key) -> Option<Value> {
        match self.pending.get(key) {
            Some(Status::Update(value)) => Some(value.clone()),
            Some(Status::Delete) => None,
            None => {
                let value = self.state.get(key).await;
                let version = self.state.version(key).await;
                self.reads().entry(key.clone()).or_insert(version);
                value
            }
        }
    }

    async fn insert(&mut self, key: Key, value: Value) {
        self.pending.insert(key, Status::Update(value));
    }

    async fn delete(&mut self, key: &Key) {
        self.pending.insert(key.clone(), Status::Delete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks::create_account_keypair, state::Memory};
    use commonware_runtime::deterministic::Runner;
    use commonware_runtime::Runner as _;

    #[test]
    fn test_adjust_balance_rejects_overdraft() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let state = Memory::default();
            let (_, user) = create_account_keypair(1);
            let mut layer = Layer::new(&state, Policy::default(), 0, 0);

            assert_eq!(layer.grant(&user, Currency::Mmc, 10.0).await, Ok(10.0));
            assert_eq!(
                layer.adjust_balance(&user, Currency::Mmc, -11.0).await,
                Err(Error::InsufficientFunds {
                    needed: 11.0,
                    available: 10.0
                })
            );
            assert_eq!(layer.adjust_balance(&user, Currency::Mmc, -10.0).await, Ok(0.0));
            assert_eq!(
                layer.adjust_balance(&user, Currency::Mmc, f64::NAN).await,
                Err(Error::InvalidAmount)
            );
        });
    }

    #[test]
    fn test_reads_are_recorded() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let mut state = Memory::default();
            state.insert(Key::NextGameId, Value::Counter(4)).await;
            state.insert(Key::NextGameId, Value::Counter(5)).await;

            let mut layer = Layer::new(&state, Policy::default(), 0, 0);
            assert_eq!(layer.next_id(Key::NextGameId).await, 5);
            assert_eq!(layer.next_id(Key::NextGameId).await, 6);
            // Never-written keys are read at version 0.
            assert!(layer.get(&Key::WaitingGames).await.is_none());

            let changeset = layer.commit();
            assert_eq!(changeset.reads.get(&Key::NextGameId), Some(&2));
            assert_eq!(changeset.reads.get(&Key::WaitingGames), Some(&0));
            assert_eq!(
                changeset.writes,
                vec![(Key::NextGameId, Status::Update(Value::Counter(7)))]
            );
        });
    }

    #[test]
    fn test_failed_intent_leaves_no_trace() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let state = Memory::default();
            let (_, user) = create_account_keypair(1);
            let mut layer = Layer::new(&state, Policy::default(), 0, 0);
            layer.grant(&user, Currency::Usd, 5.0).await.unwrap();

            // Debits USD and then fails to credit a bogus rate.
            layer.policy.usd_to_mmc_rate = f64::INFINITY;
            let result = layer
                .apply(&Intent::new(
                    user.clone(),
                    Instruction::ConvertUsd { amount: 5.0 },
                ))
                .await;
            assert_eq!(result, Err(Error::InvalidAmount));
            assert_eq!(balance(&layer, &user, Currency::Usd).await, 5.0);
            assert_eq!(balance(&layer, &user, Currency::Mmc).await, 0.0);
        });
    }
}
