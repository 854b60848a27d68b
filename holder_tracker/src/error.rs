use thiserror::Error;

/// Failure talking to Helius or the pump.fun API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page {page} failed: {source}")]
    Upstream {
        page: u32,
        #[source]
        source: UpstreamError,
    },
    #[error("no empty page after {max_pages} pages")]
    PageLimit { max_pages: u32 },
    #[error("balance of {owner} overflows: {amount} at {decimals} decimals")]
    Overflow {
        owner: String,
        amount: u64,
        decimals: u32,
    },
}

/// Why a diff cycle was discarded. Committed state is untouched in every case.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("candidate has {candidate} holders against {committed} committed, likely a partial fetch")]
    Integrity { committed: usize, candidate: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("token mint address not provided, pass it as an argument or set TOKEN_MINT_ADDRESS")]
    MissingMint,
    #[error("HELIUS_URL must be set")]
    MissingEndpoint,
    #[error("{field} is not a valid address: {value}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{decimals} decimals exceeds the supported maximum of {max}")]
    UnsupportedDecimals { decimals: u32, max: u32 },
    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: u64 },
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to fetch pump.fun coin data: {0}")]
    PumpData(#[source] UpstreamError),
    #[error("pump.fun response has no bonding curve address")]
    MissingBondingCurve,
}
