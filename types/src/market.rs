use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::ed25519::PublicKey;

use crate::{
    read_f64, read_string, string_encode_size, write_f64, write_string, F64_SIZE,
    MAX_NAME_LENGTH, MAX_TICKER_LENGTH,
};

/// Balances a user can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Currency {
    Usd,
    /// Platform credit used for AMM trades and game stakes.
    Mmc,
    /// An issued personal token.
    Token(u64),
}

impl Write for Currency {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Usd => 0u8.write(writer),
            Self::Mmc => 1u8.write(writer),
            Self::Token(id) => {
                2u8.write(writer);
                id.write(writer);
            }
        }
    }
}

impl Read for Currency {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Usd),
            1 => Ok(Self::Mmc),
            2 => Ok(Self::Token(u64::read(reader)?)),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for Currency {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Token(_) => u64::SIZE,
                _ => 0,
            }
    }
}

/// Constant-product pool pairing MMC with one issued token.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pool {
    pub token: u64,
    pub mmc_reserve: f64,
    pub token_reserve: f64,
}

impl Pool {
    pub fn new(token: u64, mmc_reserve: f64, token_reserve: f64) -> Self {
        Self {
            token,
            mmc_reserve,
            token_reserve,
        }
    }

    /// The constant product `mmc_reserve * token_reserve`.
    pub fn k(&self) -> f64 {
        self.mmc_reserve * self.token_reserve
    }
}

impl Write for Pool {
    fn write(&self, writer: &mut impl BufMut) {
        self.token.write(writer);
        write_f64(self.mmc_reserve, writer);
        write_f64(self.token_reserve, writer);
    }
}

impl Read for Pool {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            token: u64::read(reader)?,
            mmc_reserve: read_f64(reader)?,
            token_reserve: read_f64(reader)?,
        })
    }
}

impl FixedSize for Pool {
    const SIZE: usize = u64::SIZE + 2 * F64_SIZE;
}

/// A personal token minted by its issuer.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub id: u64,
    pub issuer: PublicKey,
    pub ticker: String,
    pub name: String,
    pub total_supply: u64,
    pub base_price: f64,
}

impl Token {
    pub fn market_cap(&self) -> f64 {
        self.total_supply as f64 * self.base_price
    }
}

impl Write for Token {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        self.issuer.write(writer);
        write_string(&self.ticker, writer);
        write_string(&self.name, writer);
        self.total_supply.write(writer);
        write_f64(self.base_price, writer);
    }
}

impl Read for Token {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            id: u64::read(reader)?,
            issuer: PublicKey::read(reader)?,
            ticker: read_string(reader, MAX_TICKER_LENGTH)?,
            name: read_string(reader, MAX_NAME_LENGTH)?,
            total_supply: u64::read(reader)?,
            base_price: read_f64(reader)?,
        })
    }
}

impl EncodeSize for Token {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + self.issuer.encode_size()
            + string_encode_size(&self.ticker)
            + string_encode_size(&self.name)
            + self.total_supply.encode_size()
            + F64_SIZE
    }
}

/// One rung of the issuer's seeded sell ladder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SellOrder {
    pub tier: u8,
    pub price: f64,
    pub amount: u64,
}

impl Write for SellOrder {
    fn write(&self, writer: &mut impl BufMut) {
        self.tier.write(writer);
        write_f64(self.price, writer);
        self.amount.write(writer);
    }
}

impl Read for SellOrder {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            tier: u8::read(reader)?,
            price: read_f64(reader)?,
            amount: u64::read(reader)?,
        })
    }
}

impl FixedSize for SellOrder {
    const SIZE: usize = u8::SIZE + F64_SIZE + u64::SIZE;
}

/// Per-user flags that outlive any single balance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    pub has_exchanged_equity: bool,
}

impl Write for Profile {
    fn write(&self, writer: &mut impl BufMut) {
        self.has_exchanged_equity.write(writer);
    }
}

impl Read for Profile {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            has_exchanged_equity: bool::read(reader)?,
        })
    }
}

impl FixedSize for Profile {
    const SIZE: usize = bool::SIZE;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl Write for TradeSide {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Buy => 0u8.write(writer),
            Self::Sell => 1u8.write(writer),
        }
    }
}

impl Read for TradeSide {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Buy),
            1 => Ok(Self::Sell),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for TradeSide {
    const SIZE: usize = u8::SIZE;
}

/// One executed AMM swap, as kept in a token's trade history.
#[derive(Clone, Debug, PartialEq)]
pub struct Trade {
    pub trader: PublicKey,
    pub side: TradeSide,
    pub tokens: f64,
    pub mmc: f64,
    /// Milliseconds since the Unix epoch.
    pub executed_at: u64,
}

impl Trade {
    /// Average MMC paid or received per token.
    pub fn price(&self) -> f64 {
        self.mmc / self.tokens
    }
}

impl Write for Trade {
    fn write(&self, writer: &mut impl BufMut) {
        self.trader.write(writer);
        self.side.write(writer);
        write_f64(self.tokens, writer);
        write_f64(self.mmc, writer);
        self.executed_at.write(writer);
    }
}

impl Read for Trade {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            trader: PublicKey::read(reader)?,
            side: TradeSide::read(reader)?,
            tokens: read_f64(reader)?,
            mmc: read_f64(reader)?,
            executed_at: u64::read(reader)?,
        })
    }
}

impl FixedSize for Trade {
    const SIZE: usize = PublicKey::SIZE + TradeSide::SIZE + 2 * F64_SIZE + u64::SIZE;
}
