use super::super::*;
use super::{normalize_name, normalize_ticker};
use crate::{
    amm,
    ladder::golden_ladder,
    state::{pool, trade_history},
};
use memento_types::{Token, Trade, TradeSide, MAX_TRADE_HISTORY};
use tracing::info;

impl<'a, S: Store> Layer<'a, S> {
    // === Market Handlers ===

    async fn load_pool(&self, token: u64) -> Result<Pool, Error> {
        pool(self, token).await.ok_or(Error::NotFound(Key::Pool(token)))
    }

    async fn record_trade(
        &mut self,
        token: u64,
        trader: &PublicKey,
        side: TradeSide,
        tokens: f64,
        mmc: f64,
    ) {
        let mut trades = trade_history(self, token).await;
        trades.push(Trade {
            trader: trader.clone(),
            side,
            tokens,
            mmc,
            executed_at: self.now,
        });
        if trades.len() > MAX_TRADE_HISTORY {
            let excess = trades.len() - MAX_TRADE_HISTORY;
            trades.drain(..excess);
        }
        self.insert(Key::Trades(token), Value::Trades(trades));
    }

    pub(in crate::layer) async fn handle_buy(
        &mut self,
        public: &PublicKey,
        token: u64,
        mmc_in: f64,
        min_tokens_out: f64,
    ) -> Result<Vec<Event>, Error> {
        let current = self.load_pool(token).await?;
        let (next, tokens_out) = amm::apply_buy(&current, mmc_in)?;
        if tokens_out < min_tokens_out {
            return Err(Error::SlippageExceeded {
                min_out: min_tokens_out,
                out: tokens_out,
            });
        }

        self.adjust_balance(public, Currency::Mmc, -mmc_in).await?;
        self.adjust_balance(public, Currency::Token(token), tokens_out)
            .await?;
        self.insert(Key::Pool(token), Value::Pool(next));
        self.record_trade(token, public, TradeSide::Buy, tokens_out, mmc_in)
            .await;

        Ok(vec![Event::TokensBought {
            buyer: public.clone(),
            mmc_in,
            tokens_out,
            pool: next,
        }])
    }

    pub(in crate::layer) async fn handle_sell(
        &mut self,
        public: &PublicKey,
        token: u64,
        tokens_in: f64,
        min_mmc_out: f64,
    ) -> Result<Vec<Event>, Error> {
        let current = self.load_pool(token).await?;
        let (next, mmc_out) = amm::apply_sell(&current, tokens_in)?;
        if mmc_out < min_mmc_out {
            return Err(Error::SlippageExceeded {
                min_out: min_mmc_out,
                out: mmc_out,
            });
        }

        self.adjust_balance(public, Currency::Token(token), -tokens_in)
            .await?;
        self.adjust_balance(public, Currency::Mmc, mmc_out).await?;
        self.insert(Key::Pool(token), Value::Pool(next));
        self.record_trade(token, public, TradeSide::Sell, tokens_in, mmc_out)
            .await;

        Ok(vec![Event::TokensSold {
            seller: public.clone(),
            tokens_in,
            mmc_out,
            pool: next,
        }])
    }

    pub(in crate::layer) async fn handle_issue_token(
        &mut self,
        public: &PublicKey,
        ticker: &str,
        name: &str,
        total_supply: u64,
        base_price: f64,
    ) -> Result<Vec<Event>, Error> {
        let ticker = normalize_ticker(ticker)?;
        let name = normalize_name(name)?;
        if self
            .get(&Key::IssuedToken(public.clone()))
            .await
            .is_some()
        {
            return Err(Error::AlreadyIssued);
        }
        let orders = golden_ladder(base_price, total_supply)?;

        let id = self.next_id(Key::NextTokenId).await;
        let token = Token {
            id,
            issuer: public.clone(),
            ticker,
            name,
            total_supply,
            base_price,
        };
        self.insert(Key::Token(id), Value::Token(token.clone()));
        self.insert(Key::IssuedToken(public.clone()), Value::TokenId(id));
        self.insert(Key::OrderBook(id), Value::OrderBook(orders.clone()));
        self.adjust_balance(public, Currency::Token(id), total_supply as f64)
            .await?;
        info!(token = id, ticker = %token.ticker, total_supply, "token issued");

        Ok(vec![Event::TokenIssued { token, orders }])
    }
}
