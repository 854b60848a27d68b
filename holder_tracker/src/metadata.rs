use abi::PumpData;
use log::{info, warn};

use crate::config::MAX_DECIMALS;
use crate::error::StartupError;
use crate::upstream::{CoinSource, MetadataSource};

/// Resolves the mint's decimals through `getAsset`.
///
/// Lookup failures and values above [`MAX_DECIMALS`] fall back to `default`.
pub async fn resolve_decimals(source: &dyn MetadataSource, mint: &str, default: u32) -> u32 {
    match source.token_decimals(mint).await {
        Ok(decimals) if decimals <= MAX_DECIMALS => {
            info!("Resolved {} decimals for {}", decimals, mint);
            decimals
        }
        Ok(decimals) => {
            warn!(
                "Resolved {} decimals for {}, more than the supported {}. Using default of {}",
                decimals, mint, MAX_DECIMALS, default
            );
            default
        }
        Err(e) => {
            warn!(
                "Failed to resolve decimals for {}: {}. Using default of {}",
                mint, e, default
            );
            default
        }
    }
}

/// Fetches the pump.fun coin record. Required when running in pump.fun mode.
pub async fn resolve_pump_data(source: &dyn CoinSource, mint: &str) -> Result<PumpData, StartupError> {
    let coin = source.coin(mint).await.map_err(StartupError::PumpData)?;
    let bonding_curve_address = coin.bonding_curve.ok_or(StartupError::MissingBondingCurve)?;
    let creator = coin.creator.unwrap_or_default();

    info!("Fetched bonding curve address: {}", bonding_curve_address);
    info!("Fetched dev address: {}", creator);
    info!("Fetched twitter and CA: {} {:?}", coin.mint, coin.twitter);

    Ok(PumpData {
        bonding_curve_address,
        creator,
        mint: coin.mint,
        twitter: coin.twitter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::upstream::{MockCoinSource, MockMetadataSource, PumpCoin};

    #[tokio::test]
    async fn uses_resolved_decimals() {
        let mut source = MockMetadataSource::new();
        source
            .expect_token_decimals()
            .withf(|mint| mint == "mint")
            .returning(|_| Ok(9));
        assert_eq!(resolve_decimals(&source, "mint", 6).await, 9);
    }

    #[tokio::test]
    async fn falls_back_on_failure() {
        let mut source = MockMetadataSource::new();
        source
            .expect_token_decimals()
            .returning(|_| Err(UpstreamError::Decode("no token_info".into())));
        assert_eq!(resolve_decimals(&source, "mint", 6).await, 6);
    }

    #[tokio::test]
    async fn unrepresentable_decimals_fall_back() {
        let mut source = MockMetadataSource::new();
        source.expect_token_decimals().returning(|_| Ok(40));
        assert_eq!(resolve_decimals(&source, "mint", 6).await, 6);
    }

    #[tokio::test]
    async fn pump_data_from_coin() {
        let mut source = MockCoinSource::new();
        source.expect_coin().returning(|mint| {
            Ok(PumpCoin {
                mint: mint.to_string(),
                bonding_curve: Some("curve".into()),
                creator: Some("dev".into()),
                twitter: None,
            })
        });
        let data = resolve_pump_data(&source, "mint").await.unwrap();
        assert_eq!(data.bonding_curve_address, "curve");
        assert_eq!(data.creator, "dev");
        assert_eq!(data.mint, "mint");
    }

    #[tokio::test]
    async fn pump_data_requires_bonding_curve() {
        let mut source = MockCoinSource::new();
        source.expect_coin().returning(|mint| {
            Ok(PumpCoin {
                mint: mint.to_string(),
                bonding_curve: None,
                creator: None,
                twitter: None,
            })
        });
        assert!(matches!(
            resolve_pump_data(&source, "mint").await,
            Err(StartupError::MissingBondingCurve)
        ));
    }

    #[tokio::test]
    async fn pump_api_failure_is_fatal() {
        let mut source = MockCoinSource::new();
        source.expect_coin().returning(|_| {
            Err(UpstreamError::Status {
                status: 404,
                body: "not found".into(),
            })
        });
        assert!(matches!(
            resolve_pump_data(&source, "mint").await,
            Err(StartupError::PumpData(_))
        ));
    }
}
