//! Clients for the Helius RPC endpoint and the pump.fun frontend API.
//!
//! The tracker only sees these through the [`TokenAccountSource`],
//! [`MetadataSource`] and [`CoinSource`] traits so cycles can be driven
//! against scripted upstreams in tests.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::UpstreamError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One token account as returned by `getTokenAccounts`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenAccount {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub mint: String,
    pub owner: String,
    pub amount: u64,
    #[serde(default)]
    pub delegated_amount: Option<u64>,
    #[serde(default)]
    pub frozen: bool,
}

impl TokenAccount {
    pub fn new(owner: impl Into<String>, amount: u64) -> Self {
        Self {
            address: String::new(),
            mint: String::new(),
            owner: owner.into(),
            amount,
            delegated_amount: None,
            frozen: false,
        }
    }
}

/// Raw coin record from pump.fun. Only the fields the tracker uses are kept.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PumpCoin {
    pub mint: String,
    #[serde(default)]
    pub bonding_curve: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenAccountSource: Send + Sync {
    /// Returns `Ok(None)` when the upstream has no result for this page.
    async fn token_accounts(
        &self,
        mint: &str,
        page: u32,
        limit: u32,
    ) -> Result<Option<Vec<TokenAccount>>, UpstreamError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn token_decimals(&self, mint: &str) -> Result<u32, UpstreamError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoinSource: Send + Sync {
    async fn coin(&self, mint: &str) -> Result<PumpCoin, UpstreamError>;
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct TokenAccountsResult {
    #[serde(default)]
    token_accounts: Vec<TokenAccount>,
}

#[derive(Deserialize)]
struct AssetResult {
    token_info: Option<AssetTokenInfo>,
}

#[derive(Deserialize)]
struct AssetTokenInfo {
    decimals: Option<u32>,
}

#[derive(Clone)]
pub struct HeliusClient {
    client: Client,
    url: String,
}

impl HeliusClient {
    pub fn new(url: impl Into<String>) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        id: &str,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, UpstreamError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: RpcResponse<T> = response.json().await?;
        if let Some(error) = response.error {
            return Err(UpstreamError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }
}

#[async_trait]
impl TokenAccountSource for HeliusClient {
    async fn token_accounts(
        &self,
        mint: &str,
        page: u32,
        limit: u32,
    ) -> Result<Option<Vec<TokenAccount>>, UpstreamError> {
        let params = json!({
            "page": page,
            "limit": limit,
            "displayOptions": {},
            "mint": mint,
        });
        let result: Option<TokenAccountsResult> =
            self.call("helius-fetch", "getTokenAccounts", params).await?;
        Ok(result.map(|r| r.token_accounts))
    }
}

#[async_trait]
impl MetadataSource for HeliusClient {
    async fn token_decimals(&self, mint: &str) -> Result<u32, UpstreamError> {
        let result: Option<AssetResult> = self
            .call("helius-asset", "getAsset", json!({ "id": mint }))
            .await?;
        result
            .and_then(|asset| asset.token_info)
            .and_then(|info| info.decimals)
            .ok_or_else(|| UpstreamError::Decode("getAsset returned no token_info.decimals".into()))
    }
}

#[derive(Clone)]
pub struct PumpFunClient {
    client: Client,
    base_url: String,
}

impl PumpFunClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CoinSource for PumpFunClient {
    async fn coin(&self, mint: &str) -> Result<PumpCoin, UpstreamError> {
        let url = format!("{}/coins/{}", self.base_url, mint);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let coin: PumpCoin = response.json().await?;
        debug!("pump.fun coin {}: {:?}", mint, coin);
        Ok(coin)
    }
}
