use log::{info, warn};

use crate::snapshot::Snapshot;

/// Tags found in one candidate snapshot, not yet latched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TagOutcome {
    pub bonding_curve: bool,
    pub liquidity_pool: bool,
}

/// Marks the bonding curve and liquidity pool holders.
///
/// Each address is looked up until it is first seen in a committed cycle and
/// never again. After that the same address keeps its tag whenever it is
/// present; no other address is tagged.
#[derive(Debug, Clone)]
pub struct SpecialAddressTagger {
    bonding_curve: Option<String>,
    liquidity_pool: Option<String>,
    bonding_curve_found: bool,
    raydium_found: bool,
}

impl SpecialAddressTagger {
    pub fn new(bonding_curve: Option<String>, liquidity_pool: Option<String>) -> Self {
        Self {
            bonding_curve,
            liquidity_pool,
            bonding_curve_found: false,
            raydium_found: false,
        }
    }

    pub fn bonding_curve_found(&self) -> bool {
        self.bonding_curve_found
    }

    pub fn raydium_found(&self) -> bool {
        self.raydium_found
    }

    /// Tags `candidate` in place. Latches are left alone; call [`Self::latch`]
    /// once the cycle commits.
    ///
    /// A latched address keeps its tag whenever it shows up again. The latch
    /// only stops the first-sighting log and the absence warning.
    pub fn tag(&self, candidate: &mut Snapshot) -> TagOutcome {
        let mut outcome = TagOutcome::default();

        if let Some(address) = &self.bonding_curve {
            if let Some(holder) = candidate.get_mut(address) {
                // tagged on every snapshot, latched or not
                holder.is_bonding_curve = Some(true);
                if !self.bonding_curve_found {
                    info!("bonding curve {} found among holders", address);
                    outcome.bonding_curve = true;
                }
            } else if !self.bonding_curve_found {
                warn!("bonding curve address {} not found among holders", address);
            }
        }

        if let Some(address) = &self.liquidity_pool {
            if let Some(holder) = candidate.get_mut(address) {
                holder.is_raydium = Some(true);
                if !self.raydium_found {
                    info!("liquidity pool {} found among holders", address);
                    outcome.liquidity_pool = true;
                }
            } else if !self.raydium_found {
                warn!("liquidity pool address {} not found among holders", address);
            }
        }

        outcome
    }

    pub fn latch(&mut self, outcome: TagOutcome) {
        self.bonding_curve_found |= outcome.bonding_curve;
        self.raydium_found |= outcome.liquidity_pool;
    }
}
