use crate::amm::AmmError;
use memento_types::{SellOrder, LADDER_TIERS};

pub const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Share of supply listed on the ladder. The rest stays with the issuer.
const LISTED_SHARE: f64 = 0.8;

/// Share of the listed supply offered at tier 0.
const TIER_SHARE: f64 = 0.15;

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Seeds the issuer's sell ladder: prices climb by the golden ratio per tier
/// while depth shrinks by the same factor.
pub fn golden_ladder(base_price: f64, total_supply: u64) -> Result<Vec<SellOrder>, AmmError> {
    if !base_price.is_finite() || base_price <= 0.0 || total_supply == 0 {
        return Err(AmmError::InvalidAmount);
    }

    let available = (total_supply as f64 * LISTED_SHARE).floor();
    let mut remaining = available as u64;
    let mut orders = Vec::with_capacity(LADDER_TIERS);
    for tier in 0..LADDER_TIERS {
        if remaining == 0 {
            break;
        }
        let scale = GOLDEN_RATIO.powi(tier as i32);
        let amount = (available / scale * TIER_SHARE).floor() as u64;
        let actual = amount.min(remaining);
        if actual == 0 {
            continue;
        }
        orders.push(SellOrder {
            tier: tier as u8,
            price: round4(base_price * scale),
            amount: actual,
        });
        remaining -= actual;
    }
    Ok(orders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ladder_million() {
        let orders = golden_ladder(0.01, 1_000_000).unwrap();
        assert_eq!(orders.len(), LADDER_TIERS);
        assert_eq!(orders[0].amount, 120_000);
        assert_eq!(orders[0].price, 0.01);
        assert_eq!(orders[1].price, 0.0162);
        assert_eq!(orders[1].amount, 74_164);
    }

    #[test]
    fn test_ladder_rejects_bad_input() {
        assert_eq!(golden_ladder(0.0, 100), Err(AmmError::InvalidAmount));
        assert_eq!(golden_ladder(-1.0, 100), Err(AmmError::InvalidAmount));
        assert_eq!(golden_ladder(f64::NAN, 100), Err(AmmError::InvalidAmount));
        assert_eq!(golden_ladder(1.0, 0), Err(AmmError::InvalidAmount));
    }

    #[test]
    fn test_tiny_supply() {
        // floor(0.8) leaves nothing to list.
        assert!(golden_ladder(1.0, 1).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_ladder_shape(base in 1e-3f64..1e3, supply in 10u64..1_000_000_000) {
            let orders = golden_ladder(base, supply).unwrap();
            let available = (supply as f64 * 0.8).floor() as u64;
            let total: u64 = orders.iter().map(|o| o.amount).sum();
            prop_assert!(total <= available);

            if let Some(first) = orders.first() {
                prop_assert_eq!(first.tier, 0);
                prop_assert_eq!(first.amount, (available as f64 * 0.15).floor() as u64);
            }
            for pair in orders.windows(2) {
                prop_assert!(pair[1].price > pair[0].price);
                prop_assert!(pair[1].amount <= pair[0].amount);
            }
        }
    }
}
