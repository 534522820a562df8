use super::super::*;
use memento_types::Profile;
use tracing::info;

impl<'a, S: Store> Layer<'a, S> {
    // === Wallet Handlers ===

    pub(in crate::layer) async fn handle_convert_usd(
        &mut self,
        public: &PublicKey,
        amount: f64,
    ) -> Result<Vec<Event>, Error> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::InvalidAmount);
        }
        let mmc = amount * self.policy.usd_to_mmc_rate;
        self.adjust_balance(public, Currency::Usd, -amount).await?;
        self.adjust_balance(public, Currency::Mmc, mmc).await?;

        Ok(vec![Event::UsdConverted {
            user: public.clone(),
            usd: amount,
            mmc,
        }])
    }

    /// One-time swap of a slice of the caller's own token supply for MMC.
    pub(in crate::layer) async fn handle_exchange_equity(
        &mut self,
        public: &PublicKey,
    ) -> Result<Vec<Event>, Error> {
        let mut profile = match self.get(&Key::Profile(public.clone())).await {
            Some(Value::Profile(profile)) => profile,
            _ => Profile::default(),
        };
        if profile.has_exchanged_equity {
            return Err(Error::AlreadyExchanged);
        }

        let issued = Key::IssuedToken(public.clone());
        let token = match self.get(&issued).await {
            Some(Value::TokenId(id)) => id,
            _ => return Err(Error::NotFound(issued)),
        };
        let supply = match self.get(&Key::Token(token)).await {
            Some(Value::Token(token)) => token.total_supply,
            _ => {
                return Err(Error::Corrupted(format!(
                    "issued token {token} has no record"
                )))
            }
        };

        let tokens = supply as f64 * self.policy.equity_exchange_bps as f64 / 10_000.0;
        let mmc = self.policy.equity_exchange_mmc;
        self.adjust_balance(public, Currency::Token(token), -tokens)
            .await?;
        let treasury = match self.get(&Key::Treasury(token)).await {
            Some(Value::Amount(amount)) => amount,
            _ => 0.0,
        };
        self.insert(Key::Treasury(token), Value::Amount(treasury + tokens));
        self.adjust_balance(public, Currency::Mmc, mmc).await?;

        profile.has_exchanged_equity = true;
        self.insert(Key::Profile(public.clone()), Value::Profile(profile));
        info!(token, tokens, mmc, "equity exchanged");

        Ok(vec![Event::EquityExchanged {
            user: public.clone(),
            token,
            tokens,
            mmc,
        }])
    }
}
