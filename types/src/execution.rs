use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, RangeCfg, Read, ReadExt, ReadRangeExt, Write};
use commonware_cryptography::ed25519::PublicKey;

use crate::{
    read_f64, read_string, string_encode_size, write_f64, write_string, Currency, Game,
    GameKind, Pool, Profile, RpsMove, SellOrder, Token, Trade, F64_SIZE, JOIN_CODE_LENGTH,
    LADDER_TIERS, MAX_INDEX_LENGTH, MAX_TRADE_HISTORY,
};

#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub enum Key {
    // Wallet keys (tags 0-1)
    Balance(PublicKey, Currency),
    Profile(PublicKey),

    // Market keys (tags 10-15)
    Pool(u64),
    Token(u64),
    IssuedToken(PublicKey),
    OrderBook(u64),
    Treasury(u64),
    Trades(u64),

    // Game keys (tags 20-23)
    Game(u64),
    GameCode(String),
    OpenGame(PublicKey),
    WaitingGames,

    // Counters (tags 30-31)
    NextGameId,
    NextTokenId,
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Balance(pk, currency) => {
                0u8.write(writer);
                pk.write(writer);
                currency.write(writer);
            }
            Self::Profile(pk) => {
                1u8.write(writer);
                pk.write(writer);
            }

            Self::Pool(token) => {
                10u8.write(writer);
                token.write(writer);
            }
            Self::Token(token) => {
                11u8.write(writer);
                token.write(writer);
            }
            Self::IssuedToken(pk) => {
                12u8.write(writer);
                pk.write(writer);
            }
            Self::OrderBook(token) => {
                13u8.write(writer);
                token.write(writer);
            }
            Self::Treasury(token) => {
                14u8.write(writer);
                token.write(writer);
            }
            Self::Trades(token) => {
                15u8.write(writer);
                token.write(writer);
            }

            Self::Game(id) => {
                20u8.write(writer);
                id.write(writer);
            }
            Self::GameCode(code) => {
                21u8.write(writer);
                write_string(code, writer);
            }
            Self::OpenGame(pk) => {
                22u8.write(writer);
                pk.write(writer);
            }
            Self::WaitingGames => 23u8.write(writer),

            Self::NextGameId => 30u8.write(writer),
            Self::NextTokenId => 31u8.write(writer),
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = match u8::read(reader)? {
            0 => Self::Balance(PublicKey::read(reader)?, Currency::read(reader)?),
            1 => Self::Profile(PublicKey::read(reader)?),

            10 => Self::Pool(u64::read(reader)?),
            11 => Self::Token(u64::read(reader)?),
            12 => Self::IssuedToken(PublicKey::read(reader)?),
            13 => Self::OrderBook(u64::read(reader)?),
            14 => Self::Treasury(u64::read(reader)?),
            15 => Self::Trades(u64::read(reader)?),

            20 => Self::Game(u64::read(reader)?),
            21 => Self::GameCode(read_string(reader, JOIN_CODE_LENGTH)?),
            22 => Self::OpenGame(PublicKey::read(reader)?),
            23 => Self::WaitingGames,

            30 => Self::NextGameId,
            31 => Self::NextTokenId,

            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Balance(pk, currency) => pk.encode_size() + currency.encode_size(),
                Self::Profile(_) | Self::IssuedToken(_) | Self::OpenGame(_) => PublicKey::SIZE,
                Self::Pool(_)
                | Self::Token(_)
                | Self::OrderBook(_)
                | Self::Treasury(_)
                | Self::Trades(_)
                | Self::Game(_) => u64::SIZE,
                Self::GameCode(code) => string_encode_size(code),
                Self::WaitingGames | Self::NextGameId | Self::NextTokenId => 0,
            }
    }
}

#[derive(Clone, PartialEq, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Value {
    /// A balance or treasury holding (tag 0)
    Amount(f64),
    Profile(Profile),

    // Market values (tags 10-14)
    Pool(Pool),
    Token(Token),
    TokenId(u64),
    OrderBook(Vec<SellOrder>),
    /// Oldest first
    Trades(Vec<Trade>),

    // Game values (tags 20-22)
    Game(Game),
    GameId(u64),
    GameIndex(Vec<u64>),

    /// Next id to hand out (tag 30)
    Counter(u64),
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Amount(amount) => {
                0u8.write(writer);
                write_f64(*amount, writer);
            }
            Self::Profile(profile) => {
                1u8.write(writer);
                profile.write(writer);
            }

            Self::Pool(pool) => {
                10u8.write(writer);
                pool.write(writer);
            }
            Self::Token(token) => {
                11u8.write(writer);
                token.write(writer);
            }
            Self::TokenId(id) => {
                12u8.write(writer);
                id.write(writer);
            }
            Self::OrderBook(orders) => {
                13u8.write(writer);
                orders.write(writer);
            }
            Self::Trades(trades) => {
                14u8.write(writer);
                trades.write(writer);
            }

            Self::Game(game) => {
                20u8.write(writer);
                game.write(writer);
            }
            Self::GameId(id) => {
                21u8.write(writer);
                id.write(writer);
            }
            Self::GameIndex(ids) => {
                22u8.write(writer);
                ids.write(writer);
            }

            Self::Counter(next) => {
                30u8.write(writer);
                next.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = match u8::read(reader)? {
            0 => Self::Amount(read_f64(reader)?),
            1 => Self::Profile(Profile::read(reader)?),

            10 => Self::Pool(Pool::read(reader)?),
            11 => Self::Token(Token::read(reader)?),
            12 => Self::TokenId(u64::read(reader)?),
            13 => Self::OrderBook(Vec::<SellOrder>::read_range(reader, 0..=LADDER_TIERS)?),
            14 => Self::Trades(Vec::<Trade>::read_range(reader, 0..=MAX_TRADE_HISTORY)?),

            20 => Self::Game(Game::read(reader)?),
            21 => Self::GameId(u64::read(reader)?),
            22 => Self::GameIndex(Vec::<u64>::read_cfg(
                reader,
                &(RangeCfg::from(0..=MAX_INDEX_LENGTH), ()),
            )?),

            30 => Self::Counter(u64::read(reader)?),

            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Amount(_) => F64_SIZE,
                Self::Profile(profile) => profile.encode_size(),
                Self::Pool(pool) => pool.encode_size(),
                Self::Token(token) => token.encode_size(),
                Self::TokenId(id) => id.encode_size(),
                Self::OrderBook(orders) => orders.encode_size(),
                Self::Trades(trades) => trades.encode_size(),
                Self::Game(game) => game.encode_size(),
                Self::GameId(id) => id.encode_size(),
                Self::GameIndex(ids) => ids.encode_size(),
                Self::Counter(next) => next.encode_size(),
            }
    }
}

/// A game move. TTT moves name a cell `0..=8`, row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Play {
    Rps(RpsMove),
    Ttt(u8),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    // Market
    Buy {
        token: u64,
        mmc_in: f64,
        min_tokens_out: f64,
    },
    Sell {
        token: u64,
        tokens_in: f64,
        min_mmc_out: f64,
    },
    IssueToken {
        ticker: String,
        name: String,
        total_supply: u64,
        base_price: f64,
    },

    // Wallet
    ConvertUsd {
        amount: f64,
    },
    ExchangeEquity,

    // Game room
    CreateGame {
        kind: GameKind,
        bet: Option<f64>,
        private: bool,
    },
    JoinGame {
        game: u64,
    },
    JoinByCode {
        code: String,
    },
    ProposeBet {
        game: u64,
        amount: f64,
    },
    AcceptBet {
        game: u64,
    },
    SubmitMove {
        game: u64,
        play: Play,
    },
    Restart {
        game: u64,
    },
    Forfeit {
        game: u64,
    },
}

impl Instruction {
    /// The game this instruction targets, if known before execution.
    pub fn game(&self) -> Option<u64> {
        match self {
            Self::JoinGame { game }
            | Self::ProposeBet { game, .. }
            | Self::AcceptBet { game }
            | Self::SubmitMove { game, .. }
            | Self::Restart { game }
            | Self::Forfeit { game } => Some(*game),
            _ => None,
        }
    }
}

/// An instruction issued on behalf of `user`.
#[derive(Clone, Debug, PartialEq)]
pub struct Intent {
    pub user: PublicKey,
    pub instruction: Instruction,
}

impl Intent {
    pub fn new(user: PublicKey, instruction: Instruction) -> Self {
        Self { user, instruction }
    }
}

/// What happened to a game as the result of one intent.
#[derive(Clone, Debug, PartialEq)]
pub enum GameChange {
    Created,
    Joined,
    BetProposed { amount: f64 },
    BetAccepted { amount: f64 },
    MoveSubmitted,
    RoundTied,
    Finished {
        winner: Option<PublicKey>,
        payout: f64,
    },
    Restarted,
    Cancelled {
        awarded: Option<PublicKey>,
    },
}

#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum Event {
    TokensBought {
        buyer: PublicKey,
        mmc_in: f64,
        tokens_out: f64,
        pool: Pool,
    },
    TokensSold {
        seller: PublicKey,
        tokens_in: f64,
        mmc_out: f64,
        pool: Pool,
    },
    TokenIssued {
        token: Token,
        orders: Vec<SellOrder>,
    },
    UsdConverted {
        user: PublicKey,
        usd: f64,
        mmc: f64,
    },
    EquityExchanged {
        user: PublicKey,
        token: u64,
        tokens: f64,
        mmc: f64,
    },
    GameUpdated {
        game: Game,
        change: GameChange,
    },
}

impl Event {
    pub fn game(&self) -> Option<&Game> {
        match self {
            Self::GameUpdated { game, .. } => Some(game),
            _ => None,
        }
    }
}
