//! Constant-product pricing for MMC/token pools.
//!
//! Reserves follow `mmc * token = k`. No fee is charged, so `k` is conserved
//! by every trade up to floating point rounding.

use memento_types::Pool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AmmError {
    #[error("amount must be positive and finite")]
    InvalidAmount,
    #[error("pool has an empty reserve")]
    PoolInactive,
    #[error("pool corrupted: {0}")]
    Corrupted(&'static str),
}

fn check_input(amount: f64) -> Result<(), AmmError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AmmError::InvalidAmount);
    }
    Ok(())
}

fn check_pool(pool: &Pool) -> Result<(), AmmError> {
    let reserves = [pool.mmc_reserve, pool.token_reserve];
    if reserves.iter().any(|r| !r.is_finite() || *r < 0.0) {
        return Err(AmmError::Corrupted("reserve negative or non-finite"));
    }
    if reserves.iter().any(|r| *r == 0.0) {
        return Err(AmmError::PoolInactive);
    }
    Ok(())
}

/// Moves `amount_in` into `reserve_in` and returns `(new_in, new_out, out)`.
fn swap(reserve_in: f64, reserve_out: f64, amount_in: f64) -> Result<(f64, f64, f64), AmmError> {
    let k = reserve_in * reserve_out;
    let new_in = reserve_in + amount_in;
    let new_out = k / new_in;
    let out = reserve_out - new_out;

    // Reserves passed `check_pool`, so a degenerate result means the input
    // is out of range for this pool.
    if !new_in.is_finite() || !new_out.is_finite() || !out.is_finite() {
        return Err(AmmError::InvalidAmount);
    }
    if new_out <= 0.0 || out >= reserve_out || out <= 0.0 {
        return Err(AmmError::InvalidAmount);
    }
    Ok((new_in, new_out, out))
}

/// Tokens received for `mmc_in`.
pub fn quote_buy(pool: &Pool, mmc_in: f64) -> Result<f64, AmmError> {
    apply_buy(pool, mmc_in).map(|(_, out)| out)
}

/// MMC received for `tokens_in`.
pub fn quote_sell(pool: &Pool, tokens_in: f64) -> Result<f64, AmmError> {
    apply_sell(pool, tokens_in).map(|(_, out)| out)
}

pub fn apply_buy(pool: &Pool, mmc_in: f64) -> Result<(Pool, f64), AmmError> {
    check_input(mmc_in)?;
    check_pool(pool)?;
    let (mmc_reserve, token_reserve, tokens_out) =
        swap(pool.mmc_reserve, pool.token_reserve, mmc_in)?;
    Ok((Pool::new(pool.token, mmc_reserve, token_reserve), tokens_out))
}

pub fn apply_sell(pool: &Pool, tokens_in: f64) -> Result<(Pool, f64), AmmError> {
    check_input(tokens_in)?;
    check_pool(pool)?;
    let (token_reserve, mmc_reserve, mmc_out) =
        swap(pool.token_reserve, pool.mmc_reserve, tokens_in)?;
    Ok((Pool::new(pool.token, mmc_reserve, token_reserve), mmc_out))
}

/// Spot price in MMC per token, or `None` for an inactive pool.
pub fn price(pool: &Pool) -> Option<f64> {
    check_pool(pool).ok()?;
    Some(pool.mmc_reserve / pool.token_reserve)
}
