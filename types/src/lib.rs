mod codec;
pub use codec::*;
mod constants;
pub use constants::*;
pub mod execution;
pub use execution::{Event, GameChange, Instruction, Intent, Key, Play, Value};
pub mod game;
pub use game::{
    BetTerms, Board, Escrow, Game, GameKind, GameStatus, ParseError, Proposal, RpsGame, RpsMove,
    Seat, Symbol, Table, TttGame,
};
pub mod market;
pub use market::{Currency, Pool, Profile, SellOrder, Token, Trade, TradeSide};
