use memento_types::{EQUITY_EXCHANGE_BPS, EQUITY_EXCHANGE_MMC, USD_TO_MMC_RATE};

/// What a tied rock-paper-scissors round does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RpsTiePolicy {
    /// Clear both moves and play again with the stakes still escrowed.
    #[default]
    Replay,
    /// Finish without a winner and refund both stakes.
    Draw,
}

/// What leaving an active game does to the escrow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForfeitPolicy {
    /// Refund both stakes.
    #[default]
    Cancel,
    /// Pay the whole escrow to the player who stayed.
    AwardOpponent,
}

/// Tunables applied by a [crate::Layer].
#[derive(Clone, Debug, PartialEq)]
pub struct Policy {
    pub rps_tie: RpsTiePolicy,
    pub forfeit: ForfeitPolicy,
    pub usd_to_mmc_rate: f64,
    pub equity_exchange_bps: u16,
    pub equity_exchange_mmc: f64,
    /// Stamped into `expires_at` on creation. Never enforced.
    pub game_ttl: Option<u64>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            rps_tie: RpsTiePolicy::default(),
            forfeit: ForfeitPolicy::default(),
            usd_to_mmc_rate: USD_TO_MMC_RATE,
            equity_exchange_bps: EQUITY_EXCHANGE_BPS,
            equity_exchange_mmc: EQUITY_EXCHANGE_MMC,
            game_ttl: None,
        }
    }
}
