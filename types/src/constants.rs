/// Maximum ticker length for issued tokens
pub const MAX_TICKER_LENGTH: usize = 8;

/// Maximum display name length for issued tokens
pub const MAX_NAME_LENGTH: usize = 32;

/// Length of a private game join code
pub const JOIN_CODE_LENGTH: usize = 6;

/// Alphabet used for join codes (no 0/O or 1/I lookalikes)
pub const JOIN_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of tiers in the golden-ratio sell ladder
pub const LADDER_TIERS: usize = 8;

/// Upper bound on the length of a decoded game index
pub const MAX_INDEX_LENGTH: usize = 1 << 20;

/// Trades kept in each token's history; older ones are dropped
pub const MAX_TRADE_HISTORY: usize = 100;

/// Cells on a tic-tac-toe board
pub const BOARD_CELLS: usize = 9;

/// Default USD to MMC conversion rate (1 USD = 100 MMC)
pub const USD_TO_MMC_RATE: f64 = 100.0;

/// Default share of supply handed over in the equity exchange (basis points)
pub const EQUITY_EXCHANGE_BPS: u16 = 100;

/// Default MMC granted for the equity exchange
pub const EQUITY_EXCHANGE_MMC: f64 = 1_000_000.0;
