//! Tracks the holders of one token and streams per-cycle changes to
//! WebSocket subscribers.
//!
//! Each cycle pulls every token account of the mint from Helius, folds the
//! balances per owner, tags the bonding curve and liquidity pool holders,
//! and diffs the result against the last committed snapshot.

pub mod aggregator;
pub mod broadcast;
pub mod config;
pub mod differ;
pub mod error;
pub mod fetcher;
pub mod metadata;
pub mod server;
pub mod snapshot;
pub mod tagger;
pub mod upstream;
pub mod worker;
