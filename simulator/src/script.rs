//! Scripted intent replay for local development.
//!
//! A script is a YAML list of steps. Each step names the acting account and
//! an action; games created by a step can be labelled and referred to by
//! that label in later steps.

use crate::{config::ValidatedConfig, Simulator};
use commonware_cryptography::ed25519::PublicKey;
use memento_execution::Error;
use memento_types::{Event, GameKind, Instruction, Intent, Play, RpsMove};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Attempts per step before a lost commit race is reported.
pub const COMMIT_ATTEMPTS: usize = 5;

#[derive(Clone, Debug, Deserialize)]
pub struct Step {
    pub account: String,
    #[serde(flatten)]
    pub action: Action,
    /// Label for the game this step creates.
    #[serde(default)]
    pub label: Option<String>,
    /// The step is expected to be rejected.
    #[serde(default)]
    pub expect_error: bool,
}

/// A game named either by id or by a label set earlier in the script.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum GameRef {
    Id(u64),
    Label(String),
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KindConfig {
    Rps,
    Ttt,
}

impl From<KindConfig> for GameKind {
    fn from(value: KindConfig) -> Self {
        match value {
            KindConfig::Rps => Self::Rps,
            KindConfig::Ttt => Self::Ttt,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceConfig {
    Rock,
    Paper,
    Scissors,
}

impl From<ChoiceConfig> for RpsMove {
    fn from(value: ChoiceConfig) -> Self {
        match value {
            ChoiceConfig::Rock => Self::Rock,
            ChoiceConfig::Paper => Self::Paper,
            ChoiceConfig::Scissors => Self::Scissors,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Buy {
        token: u64,
        mmc_in: f64,
        #[serde(default)]
        min_tokens_out: f64,
    },
    Sell {
        token: u64,
        tokens_in: f64,
        #[serde(default)]
        min_mmc_out: f64,
    },
    IssueToken {
        ticker: String,
        name: String,
        total_supply: u64,
        base_price: f64,
    },
    ConvertUsd {
        amount: f64,
    },
    ExchangeEquity,
    CreateGame {
        kind: KindConfig,
        #[serde(default)]
        bet: Option<f64>,
        #[serde(default)]
        private: bool,
    },
    JoinGame {
        game: GameRef,
    },
    /// Joins with `code`, or with the code of `game` when no code is given.
    JoinByCode {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        game: Option<GameRef>,
    },
    ProposeBet {
        game: GameRef,
        amount: f64,
    },
    AcceptBet {
        game: GameRef,
    },
    Rps {
        game: GameRef,
        choice: ChoiceConfig,
    },
    Ttt {
        game: GameRef,
        cell: u8,
    },
    Restart {
        game: GameRef,
    },
    Forfeit {
        game: GameRef,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("step {step}: unknown account {name}")]
    UnknownAccount { step: usize, name: String },
    #[error("step {step}: unknown game {game:?}")]
    UnknownGame { step: usize, game: GameRef },
    #[error("step {step}: game has no join code")]
    MissingCode { step: usize },
    #[error("step {step}: expected an error but the intent succeeded")]
    UnexpectedSuccess { step: usize },
    #[error("step {step}: store is corrupted")]
    Fatal {
        step: usize,
        #[source]
        source: Error,
    },
}

/// Result of one replayed step.
#[derive(Debug)]
pub enum Outcome {
    Applied(Vec<Event>),
    Rejected(Error),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub applied: usize,
    pub rejected: usize,
}

pub fn parse(raw: &str) -> Result<Vec<Step>, serde_yaml::Error> {
    serde_yaml::from_str(raw)
}

/// Drives [Simulator::submit_with_retry] from script steps.
pub struct Replayer {
    simulator: Simulator,
    accounts: HashMap<String, PublicKey>,
    labels: HashMap<String, u64>,
    report: Report,
}

impl Replayer {
    pub fn new(simulator: Simulator, config: &ValidatedConfig) -> Self {
        let accounts = config
            .accounts
            .iter()
            .map(|account| (account.name.clone(), account.public_key.clone()))
            .collect();
        Self {
            simulator,
            accounts,
            labels: HashMap::new(),
            report: Report::default(),
        }
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    fn resolve(&self, step: usize, game: &GameRef) -> Result<u64, ScriptError> {
        match game {
            GameRef::Id(id) => Ok(*id),
            GameRef::Label(label) => {
                self.labels
                    .get(label)
                    .copied()
                    .ok_or_else(|| ScriptError::UnknownGame {
                        step,
                        game: game.clone(),
                    })
            }
        }
    }

    async fn instruction(&self, index: usize, action: &Action) -> Result<Instruction, ScriptError> {
        Ok(match action {
            Action::Buy {
                token,
                mmc_in,
                min_tokens_out,
            } => Instruction::Buy {
                token: *token,
                mmc_in: *mmc_in,
                min_tokens_out: *min_tokens_out,
            },
            Action::Sell {
                token,
                tokens_in,
                min_mmc_out,
            } => Instruction::Sell {
                token: *token,
                tokens_in: *tokens_in,
                min_mmc_out: *min_mmc_out,
            },
            Action::IssueToken {
                ticker,
                name,
                total_supply,
                base_price,
            } => Instruction::IssueToken {
                ticker: ticker.clone(),
                name: name.clone(),
                total_supply: *total_supply,
                base_price: *base_price,
            },
            Action::ConvertUsd { amount } => Instruction::ConvertUsd { amount: *amount },
            Action::ExchangeEquity => Instruction::ExchangeEquity,
            Action::CreateGame { kind, bet, private } => Instruction::CreateGame {
                kind: (*kind).into(),
                bet: *bet,
                private: *private,
            },
            Action::JoinGame { game } => Instruction::JoinGame {
                game: self.resolve(index, game)?,
            },
            Action::JoinByCode { code, game } => {
                let code = match (code, game) {
                    (Some(code), _) => code.clone(),
                    (None, Some(game)) => {
                        let id = self.resolve(index, game)?;
                        self.simulator
                            .game_snapshot(id)
                            .await
                            .and_then(|snapshot| snapshot.game.table().code.clone())
                            .ok_or(ScriptError::MissingCode { step: index })?
                    }
                    (None, None) => return Err(ScriptError::MissingCode { step: index }),
                };
                Instruction::JoinByCode { code }
            }
            Action::ProposeBet { game, amount } => Instruction::ProposeBet {
                game: self.resolve(index, game)?,
                amount: *amount,
            },
            Action::AcceptBet { game } => Instruction::AcceptBet {
                game: self.resolve(index, game)?,
            },
            Action::Rps { game, choice } => Instruction::SubmitMove {
                game: self.resolve(index, game)?,
                play: Play::Rps((*choice).into()),
            },
            Action::Ttt { game, cell } => Instruction::SubmitMove {
                game: self.resolve(index, game)?,
                play: Play::Ttt(*cell),
            },
            Action::Restart { game } => Instruction::Restart {
                game: self.resolve(index, game)?,
            },
            Action::Forfeit { game } => Instruction::Forfeit {
                game: self.resolve(index, game)?,
            },
        })
    }

    /// Replays one step. Rejected intents are reported, not returned as
    /// errors, unless the rejection means the store is corrupted.
    pub async fn step(&mut self, index: usize, step: &Step) -> Result<Outcome, ScriptError> {
        let user = self
            .accounts
            .get(&step.account)
            .cloned()
            .ok_or_else(|| ScriptError::UnknownAccount {
                step: index,
                name: step.account.clone(),
            })?;
        let instruction = self.instruction(index, &step.action).await?;
        let intent = Intent::new(user, instruction);

        match self
            .simulator
            .submit_with_retry(intent, COMMIT_ATTEMPTS)
            .await
        {
            Ok(events) => {
                if step.expect_error {
                    return Err(ScriptError::UnexpectedSuccess { step: index });
                }
                if let (Some(label), Some(game)) =
                    (&step.label, events.first().and_then(Event::game))
                {
                    self.labels.insert(label.clone(), game.id());
                }
                for event in &events {
                    info!(step = index, account = %step.account, ?event, "applied");
                }
                self.report.applied += 1;
                Ok(Outcome::Applied(events))
            }
            Err(err) if err.is_fatal() => Err(ScriptError::Fatal {
                step: index,
                source: err,
            }),
            Err(err) => {
                if step.expect_error {
                    info!(step = index, account = %step.account, %err, "rejected as expected");
                } else {
                    warn!(step = index, account = %step.account, %err, "rejected");
                }
                self.report.rejected += 1;
                Ok(Outcome::Rejected(err))
            }
        }
    }

    pub async fn run(&mut self, steps: &[Step]) -> Result<&Report, ScriptError> {
        for (index, step) in steps.iter().enumerate() {
            self.step(index, step).await?;
        }
        Ok(&self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use memento_types::{Currency, GameStatus};

    const CONFIG: &str = r#"
accounts:
  - name: alice
    seed: 1
    usd: 5
    mmc: 100
  - name: bob
    seed: 2
    mmc: 100
pools:
  - token: 1
    mmc_reserve: 1000
    token_reserve: 1000
"#;

    async fn replayer() -> (Replayer, ValidatedConfig) {
        let config = Config::from_yaml(CONFIG).unwrap().validate().unwrap();
        let simulator = Simulator::new(config.policy.clone(), 0);
        simulator
            .genesis(&config.accounts, &config.pools)
            .await
            .unwrap();
        (Replayer::new(simulator, &config), config)
    }

    #[tokio::test]
    async fn test_rps_duel() {
        let steps = parse(
            r#"
- account: alice
  action: create_game
  kind: rps
  bet: 10
  label: duel
- account: bob
  action: join_game
  game: duel
- account: bob
  action: propose_bet
  game: duel
  amount: 25
- account: alice
  action: accept_bet
  game: duel
- account: alice
  action: rps
  game: duel
  choice: rock
- account: alice
  action: rps
  game: duel
  choice: paper
  expect_error: true
- account: bob
  action: rps
  game: duel
  choice: scissors
"#,
        )
        .unwrap();
        let (mut replayer, config) = replayer().await;
        let report = replayer.run(&steps).await.unwrap();
        assert_eq!(
            *report,
            Report {
                applied: 6,
                rejected: 1
            }
        );

        let alice = &config.account("alice").unwrap().public_key;
        let bob = &config.account("bob").unwrap().public_key;
        let simulator = &replayer.simulator;
        assert_eq!(simulator.balance(alice, Currency::Mmc).await, 125.0);
        assert_eq!(simulator.balance(bob, Currency::Mmc).await, 75.0);
        let game = simulator.game_snapshot(1).await.unwrap().game;
        assert_eq!(game.status(), GameStatus::Finished);
        assert_eq!(game.table().winner.as_ref(), Some(alice));
    }

    #[tokio::test]
    async fn test_private_join_by_label() {
        let steps = parse(
            r#"
- account: alice
  action: create_game
  kind: ttt
  private: true
  label: secret
- account: bob
  action: join_by_code
  game: secret
- account: alice
  action: convert_usd
  amount: 5
- account: bob
  action: buy
  token: 1
  mmc_in: 50
"#,
        )
        .unwrap();
        let (mut replayer, config) = replayer().await;
        replayer.run(&steps).await.unwrap();
        let bob = &config.account("bob").unwrap().public_key;
        let alice = &config.account("alice").unwrap().public_key;
        let simulator = &replayer.simulator;
        assert_eq!(
            simulator.open_game(bob).await.map(|game| game.status()),
            Some(GameStatus::Active)
        );
        assert_eq!(simulator.balance(alice, Currency::Mmc).await, 600.0);
        assert_eq!(simulator.balance(bob, Currency::Mmc).await, 50.0);
        assert!(simulator.balance(bob, Currency::Token(1)).await > 0.0);
        let trades = simulator.recent_trades(1, 20).await;
        assert_eq!(trades.len(), 1);
        assert_eq!(&trades[0].trader, bob);
        assert_eq!(trades[0].mmc, 50.0);
    }

    #[tokio::test]
    async fn test_script_errors() {
        let (mut replayer, _) = replayer().await;
        let steps = parse(
            r#"
- account: carol
  action: exchange_equity
- account: alice
  action: join_game
  game: nowhere
- account: alice
  action: convert_usd
  amount: 1
  expect_error: true
"#,
        )
        .unwrap();
        assert!(matches!(
            replayer.step(0, &steps[0]).await,
            Err(ScriptError::UnknownAccount { .. })
        ));
        assert!(matches!(
            replayer.step(1, &steps[1]).await,
            Err(ScriptError::UnknownGame { .. })
        ));
        assert!(matches!(
            replayer.step(2, &steps[2]).await,
            Err(ScriptError::UnexpectedSuccess { step: 2 })
        ));
        assert!(parse("- account: alice\n  action: teleport\n").is_err());
    }
}
