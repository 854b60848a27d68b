use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use clap::{ArgAction, Parser};
use solana_sdk::pubkey::Pubkey;

use crate::differ::PaginationGuard;
use crate::error::ConfigError;
use crate::fetcher::DEFAULT_PAGE_LIMIT;

/// Largest scale a `Decimal` balance can carry.
pub const MAX_DECIMALS: u32 = 28;

pub const DEFAULT_PUMP_API_URL: &str = "https://frontend-api.pump.fun";

/// Command line, with every setting also readable from the environment
/// (and therefore from `.env`).
#[derive(Debug, Parser)]
#[command(
    name = "holder_tracker",
    version,
    about = "Streams token holder changes to WebSocket subscribers"
)]
pub struct Args {
    /// Mint address of the tracked token
    #[arg(env = "TOKEN_MINT_ADDRESS")]
    pub mint: Option<String>,

    /// Helius RPC endpoint, including the api key
    #[arg(long, env = "HELIUS_URL", hide_env_values = true)]
    pub helius_url: Option<String>,

    #[arg(long, env = "LISTEN_ADDRESS", default_value = "127.0.0.1")]
    pub listen_address: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Decimals used when they cannot be resolved from the mint
    #[arg(long, env = "TOKEN_DECIMALS", default_value_t = 6)]
    pub decimals: u32,

    /// Look decimals up with getAsset before falling back to --decimals
    #[arg(long, env = "RESOLVE_DECIMALS", default_value_t = true, action = ArgAction::Set)]
    pub resolve_decimals: bool,

    #[arg(long, env = "BONDING_CURVE_ADDRESS")]
    pub bonding_curve_address: Option<String>,

    #[arg(long, env = "LIQUIDITY_POOL_ADDRESS")]
    pub liquidity_pool_address: Option<String>,

    /// Resolve the bonding curve from pump.fun; startup fails if it cannot
    #[arg(long, env = "PUMP_FUN")]
    pub pump_fun: bool,

    #[arg(long, env = "PUMP_API_URL", default_value = DEFAULT_PUMP_API_URL)]
    pub pump_api_url: String,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 5)]
    pub poll_interval_secs: u64,

    #[arg(long, env = "PAGE_LIMIT", default_value_t = DEFAULT_PAGE_LIMIT)]
    pub page_limit: u32,

    #[arg(long, env = "MAX_PAGES", default_value_t = 1000)]
    pub max_pages: u32,

    /// Committed holder count above which shrinking snapshots are checked
    #[arg(long, env = "GUARD_MIN_HOLDERS", default_value_t = 1000)]
    pub guard_min_holders: usize,

    /// Share of committed holders a candidate must keep, in percent
    #[arg(long, env = "GUARD_RETENTION_PERCENT", default_value_t = 95)]
    pub guard_retention_percent: u8,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mint: String,
    pub helius_url: String,
    pub listen: SocketAddr,
    pub default_decimals: u32,
    pub resolve_decimals: bool,
    pub bonding_curve_address: Option<String>,
    pub liquidity_pool_address: Option<String>,
    pub pump_fun: bool,
    pub pump_api_url: String,
    pub poll_interval: Duration,
    pub page_limit: u32,
    pub max_pages: u32,
    pub guard: PaginationGuard,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::try_from(Args::parse())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_address(field: &'static str, value: String) -> Result<String, ConfigError> {
    Pubkey::from_str(&value).map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.clone(),
    })?;
    Ok(value)
}

fn optional_address(field: &'static str, value: Option<String>) -> Result<Option<String>, ConfigError> {
    non_empty(value)
        .map(|v| validate_address(field, v))
        .transpose()
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let mint = non_empty(args.mint).ok_or(ConfigError::MissingMint)?;
        let mint = validate_address("TOKEN_MINT_ADDRESS", mint)?;
        let helius_url = non_empty(args.helius_url).ok_or(ConfigError::MissingEndpoint)?;

        if args.decimals > MAX_DECIMALS {
            return Err(ConfigError::UnsupportedDecimals {
                decimals: args.decimals,
                max: MAX_DECIMALS,
            });
        }
        if args.poll_interval_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "POLL_INTERVAL_SECS",
                value: 0,
            });
        }
        if args.page_limit == 0 {
            return Err(ConfigError::OutOfRange {
                field: "PAGE_LIMIT",
                value: 0,
            });
        }
        if args.max_pages == 0 {
            return Err(ConfigError::OutOfRange {
                field: "MAX_PAGES",
                value: 0,
            });
        }
        if args.guard_retention_percent > 100 {
            return Err(ConfigError::OutOfRange {
                field: "GUARD_RETENTION_PERCENT",
                value: u64::from(args.guard_retention_percent),
            });
        }

        Ok(Self {
            mint,
            helius_url,
            listen: SocketAddr::new(args.listen_address, args.port),
            default_decimals: args.decimals,
            resolve_decimals: args.resolve_decimals,
            bonding_curve_address: optional_address("BONDING_CURVE_ADDRESS", args.bonding_curve_address)?,
            liquidity_pool_address: optional_address("LIQUIDITY_POOL_ADDRESS", args.liquidity_pool_address)?,
            pump_fun: args.pump_fun,
            pump_api_url: args.pump_api_url,
            poll_interval: Duration::from_secs(args.poll_interval_secs),
            page_limit: args.page_limit,
            max_pages: args.max_pages,
            guard: PaginationGuard {
                min_holders: args.guard_min_holders,
                retention_percent: args.guard_retention_percent,
            },
        })
    }
}
