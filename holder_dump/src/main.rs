use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use abi::Holder;
use anyhow::{bail, Result};
use clap::Parser;
use holder_tracker::aggregator::collect_snapshot;
use holder_tracker::config::MAX_DECIMALS;
use holder_tracker::fetcher::{AccountPages, DEFAULT_PAGE_LIMIT};
use holder_tracker::snapshot::sorted_holders;
use holder_tracker::upstream::{HeliusClient, MetadataSource};
use log::info;
use rust_decimal::Decimal;

#[derive(Debug, Parser)]
#[command(
    name = "holder_dump",
    version,
    about = "Writes every holder of a token, largest first, to a text file"
)]
struct Args {
    #[arg(short, long, env = "TOKEN_MINT_ADDRESS")]
    mint: String,

    #[arg(long, env = "HELIUS_URL", hide_env_values = true)]
    helius_url: String,

    /// Skip the getAsset lookup and use these decimals
    #[arg(short, long)]
    decimals: Option<u32>,

    #[arg(long, default_value_t = 1000)]
    max_pages: u32,

    /// Only write the largest N holders
    #[arg(short, long)]
    top: Option<usize>,

    #[arg(short, long, default_value = "holders.txt")]
    output: PathBuf,
}

fn total(holders: &[Holder]) -> Decimal {
    holders.iter().map(|h| h.balance).sum()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let helius = HeliusClient::new(args.helius_url.clone())?;
    let decimals = match args.decimals {
        Some(decimals) => decimals,
        None => helius.token_decimals(&args.mint).await?,
    };
    if decimals > MAX_DECIMALS {
        bail!("{} decimals exceeds the supported maximum of {}", decimals, MAX_DECIMALS);
    }
    info!("Fetching holders of {} with {} decimals", args.mint, decimals);

    let mut pages = AccountPages::new(&helius, &args.mint, DEFAULT_PAGE_LIMIT, args.max_pages);
    let snapshot = collect_snapshot(&mut pages, decimals).await?;

    let mut holders = sorted_holders(&snapshot);
    let supply = total(&holders);
    if let Some(top) = args.top {
        holders.truncate(top);
    }

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&args.output)?;
    writeln!(file, "# {} holders of {}, total {}", snapshot.len(), args.mint, supply)?;
    for holder in &holders {
        writeln!(file, "{}, {}", holder.address, holder.balance)?;
    }

    println!(
        "Wrote {} of {} holders ({} pages) to {}",
        holders.len(),
        snapshot.len(),
        pages.pages_read(),
        args.output.display()
    );

    Ok(())
}
