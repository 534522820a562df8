use super::*;
use memento_types::{JOIN_CODE_LENGTH, MAX_NAME_LENGTH, MAX_TICKER_LENGTH};

/// Upper-cases a ticker and checks it is 1 to 8 ASCII alphanumerics.
fn normalize_ticker(ticker: &str) -> Result<String, Error> {
    let ticker = ticker.trim();
    if ticker.is_empty()
        || ticker.len() > MAX_TICKER_LENGTH
        || !ticker.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(Error::InvalidInput("ticker must be 1-8 alphanumerics"));
    }
    Ok(ticker.to_ascii_uppercase())
}

fn normalize_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(Error::InvalidInput("name must be 1-32 bytes"));
    }
    Ok(name.to_string())
}

/// Join codes are case-insensitive.
fn normalize_code(code: &str) -> Result<String, Error> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != JOIN_CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(Error::InvalidInput("join code must be 6 alphanumerics"));
    }
    Ok(code)
}

mod games;
mod market;
mod wallet;
