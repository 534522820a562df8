use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    PrivateKeyExt, Signer,
};
use memento_execution::{ForfeitPolicy, Policy, RpsTiePolicy};
use memento_types::{Pool, EQUITY_EXCHANGE_BPS, EQUITY_EXCHANGE_MMC, USD_TO_MMC_RATE};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;

/// Configuration for the [crate::Simulator], read from YAML.
#[derive(Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub rps_tie_policy: TiePolicyConfig,
    #[serde(default)]
    pub forfeit_policy: ForfeitPolicyConfig,
    #[serde(default = "default_usd_to_mmc_rate")]
    pub usd_to_mmc_rate: f64,
    #[serde(default = "default_equity_exchange_bps")]
    pub equity_exchange_bps: u16,
    #[serde(default = "default_equity_exchange_mmc")]
    pub equity_exchange_mmc: f64,
    #[serde(default)]
    pub game_ttl_ms: Option<u64>,

    #[serde(default)]
    pub snapshot_path: Option<String>,

    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicyConfig {
    #[default]
    Replay,
    Draw,
}

impl From<TiePolicyConfig> for RpsTiePolicy {
    fn from(value: TiePolicyConfig) -> Self {
        match value {
            TiePolicyConfig::Replay => Self::Replay,
            TiePolicyConfig::Draw => Self::Draw,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForfeitPolicyConfig {
    #[default]
    Cancel,
    AwardOpponent,
}

impl From<ForfeitPolicyConfig> for ForfeitPolicy {
    fn from(value: ForfeitPolicyConfig) -> Self {
        match value {
            ForfeitPolicyConfig::Cancel => Self::Cancel,
            ForfeitPolicyConfig::AwardOpponent => Self::AwardOpponent,
        }
    }
}

/// A development account. Its key is derived from `seed`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccountConfig {
    pub name: String,
    pub seed: u64,
    #[serde(default)]
    pub usd: f64,
    #[serde(default)]
    pub mmc: f64,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct PoolConfig {
    pub token: u64,
    pub mmc_reserve: f64,
    pub token_reserve: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("{field} must be finite and non-negative (got {value})")]
    InvalidAmount { field: &'static str, value: f64 },
    #[error("equity_exchange_bps must be at most 10000 (got {value})")]
    InvalidBps { value: u16 },
    #[error("duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },
}

pub struct Account {
    pub name: String,
    pub public_key: PublicKey,
    pub usd: f64,
    pub mmc: f64,
}

pub struct ValidatedConfig {
    pub log_level: Level,
    pub json_logs: bool,
    pub poll_interval: Duration,
    pub policy: Policy,
    pub snapshot_path: Option<PathBuf>,
    pub accounts: Vec<Account>,
    pub pools: Vec<Pool>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_usd_to_mmc_rate() -> f64 {
    USD_TO_MMC_RATE
}

fn default_equity_exchange_bps() -> u16 {
    EQUITY_EXCHANGE_BPS
}

fn default_equity_exchange_mmc() -> f64 {
    EQUITY_EXCHANGE_MMC
}

fn check_amount(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidAmount { field, value });
    }
    Ok(value)
}

/// Public key of the development keypair derived from `seed`.
pub fn account_key(seed: u64) -> PublicKey {
    let mut rng = StdRng::seed_from_u64(seed);
    PrivateKey::from_rng(&mut rng).public_key()
}

impl Config {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "poll_interval_ms",
                value: self.poll_interval_ms,
            });
        }
        if self.game_ttl_ms == Some(0) {
            return Err(ConfigError::InvalidNonZero {
                field: "game_ttl_ms",
                value: 0,
            });
        }
        let usd_to_mmc_rate = check_amount("usd_to_mmc_rate", self.usd_to_mmc_rate)?;
        let equity_exchange_mmc = check_amount("equity_exchange_mmc", self.equity_exchange_mmc)?;
        if self.equity_exchange_bps > 10_000 {
            return Err(ConfigError::InvalidBps {
                value: self.equity_exchange_bps,
            });
        }

        let mut names = HashSet::new();
        let mut seeds = HashSet::new();
        let mut accounts = Vec::with_capacity(self.accounts.len());
        for account in self.accounts {
            if !names.insert(account.name.clone()) {
                return Err(ConfigError::Duplicate {
                    field: "account name",
                    value: account.name,
                });
            }
            if !seeds.insert(account.seed) {
                return Err(ConfigError::Duplicate {
                    field: "account seed",
                    value: account.seed.to_string(),
                });
            }
            accounts.push(Account {
                public_key: account_key(account.seed),
                usd: check_amount("accounts.usd", account.usd)?,
                mmc: check_amount("accounts.mmc", account.mmc)?,
                name: account.name,
            });
        }

        let mut tokens = HashSet::new();
        let mut pools = Vec::with_capacity(self.pools.len());
        for pool in self.pools {
            if !tokens.insert(pool.token) {
                return Err(ConfigError::Duplicate {
                    field: "pool token",
                    value: pool.token.to_string(),
                });
            }
            pools.push(Pool::new(
                pool.token,
                check_amount("pools.mmc_reserve", pool.mmc_reserve)?,
                check_amount("pools.token_reserve", pool.token_reserve)?,
            ));
        }

        Ok(ValidatedConfig {
            log_level,
            json_logs: self.json_logs,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            policy: Policy {
                rps_tie: self.rps_tie_policy.into(),
                forfeit: self.forfeit_policy.into(),
                usd_to_mmc_rate,
                equity_exchange_bps: self.equity_exchange_bps,
                equity_exchange_mmc,
                game_ttl: self.game_ttl_ms,
            },
            snapshot_path: self.snapshot_path.map(PathBuf::from),
            accounts,
            pools,
        })
    }
}

impl ValidatedConfig {
    pub fn account(&self, name: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| account.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
log_level: debug
poll_interval_ms: 250
rps_tie_policy: draw
forfeit_policy: award_opponent
game_ttl_ms: 600000
snapshot_path: /tmp/memento.snapshot
accounts:
  - name: alice
    seed: 1
    usd: 10
    mmc: 500
  - name: bob
    seed: 2
    mmc: 500
pools:
  - token: 1
    mmc_reserve: 1000
    token_reserve: 1000
"#;

    #[test]
    fn test_sample_config() {
        let config = Config::from_yaml(SAMPLE).unwrap().validate().unwrap();
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(!config.json_logs);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.policy.rps_tie, RpsTiePolicy::Draw);
        assert_eq!(config.policy.forfeit, ForfeitPolicy::AwardOpponent);
        assert_eq!(config.policy.usd_to_mmc_rate, USD_TO_MMC_RATE);
        assert_eq!(config.policy.game_ttl, Some(600_000));
        assert_eq!(
            config.snapshot_path,
            Some(PathBuf::from("/tmp/memento.snapshot"))
        );
        assert_eq!(config.accounts.len(), 2);
        let bob = config.account("bob").unwrap();
        assert_eq!(bob.usd, 0.0);
        assert_eq!(bob.public_key, account_key(2));
        assert_eq!(config.pools, vec![Pool::new(1, 1_000.0, 1_000.0)]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("{}").unwrap().validate().unwrap();
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.policy, Policy::default());
        assert!(config.accounts.is_empty());
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            "log_level: loud",
            "poll_interval_ms: 0",
            "equity_exchange_bps: 20000",
            "usd_to_mmc_rate: -1",
            "accounts: [{name: a, seed: 1}, {name: a, seed: 2}]",
            "accounts: [{name: a, seed: 1}, {name: b, seed: 1}]",
            "pools: [{token: 1, mmc_reserve: 1, token_reserve: -1}]",
        ];
        for raw in cases {
            let config = Config::from_yaml(raw).unwrap();
            assert!(config.validate().is_err(), "accepted {raw}");
        }
        assert!(Config::from_yaml("rps_tie_policy: coin_flip").is_err());
    }
}
