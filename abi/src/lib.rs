use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregated balance of one owner, in human units.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Holder {
    pub address: String,
    pub balance: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bonding_curve: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_raydium: Option<bool>,
}

impl Holder {
    pub fn new(address: impl Into<String>, balance: Decimal) -> Self {
        Self {
            address: address.into(),
            balance,
            is_bonding_curve: None,
            is_raydium: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RemovedHolder {
    pub address: String,
}

/// Changes between two consecutive committed snapshots.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct DiffResult {
    pub added: Vec<Holder>,
    pub updated: Vec<Holder>,
    pub removed: Vec<RemovedHolder>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    pub mint: String,
    pub decimals: u32,
    pub bonding_curve_address: Option<String>,
    pub liquidity_pool_address: Option<String>,
}

/// Coin details resolved from the pump.fun frontend API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PumpData {
    pub bonding_curve_address: String,
    pub creator: String,
    pub mint: String,
    pub twitter: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitialData {
    pub holders: Vec<Holder>,
    pub token_config: TokenConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pump_data: Option<PumpData>,
}

/// Frames pushed to subscribers.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    InitialData(InitialData),
    Update(DiffResult),
}
