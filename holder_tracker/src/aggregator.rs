use abi::Holder;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::FetchError;
use crate::fetcher::AccountPages;
use crate::snapshot::Snapshot;
use crate::upstream::TokenAccount;

/// Converts a raw base-unit amount into human units at `decimals` places.
pub fn to_ui_amount(amount: u64, decimals: u32) -> Option<Decimal> {
    Decimal::try_from_i128_with_scale(i128::from(amount), decimals)
        .ok()
        .map(|value| value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero))
}

/// Folds token accounts into one holder per owner.
pub struct BalanceAggregator {
    decimals: u32,
    snapshot: Snapshot,
    accounts: usize,
}

impl BalanceAggregator {
    pub fn new(decimals: u32) -> Self {
        Self {
            decimals,
            snapshot: Snapshot::new(),
            accounts: 0,
        }
    }

    pub fn add(&mut self, account: &TokenAccount) -> Result<(), FetchError> {
        let overflow = || FetchError::Overflow {
            owner: account.owner.clone(),
            amount: account.amount,
            decimals: self.decimals,
        };
        let balance = to_ui_amount(account.amount, self.decimals).ok_or_else(overflow)?;

        match self.snapshot.get_mut(&account.owner) {
            Some(holder) => {
                holder.balance = holder
                    .balance
                    .checked_add(balance)
                    .ok_or_else(overflow)?;
            }
            None => {
                self.snapshot
                    .insert(account.owner.clone(), Holder::new(account.owner.clone(), balance));
            }
        }
        self.accounts += 1;
        Ok(())
    }

    pub fn add_page(&mut self, accounts: &[TokenAccount]) -> Result<(), FetchError> {
        accounts.iter().try_for_each(|account| self.add(account))
    }

    /// Token accounts folded so far; may exceed the holder count.
    pub fn accounts(&self) -> usize {
        self.accounts
    }

    pub fn finish(self) -> Snapshot {
        self.snapshot
    }
}

/// Drains every page and returns the candidate snapshot.
pub async fn collect_snapshot(
    pages: &mut AccountPages<'_>,
    decimals: u32,
) -> Result<Snapshot, FetchError> {
    let mut aggregator = BalanceAggregator::new(decimals);
    while let Some(accounts) = pages.next_page().await? {
        aggregator.add_page(&accounts)?;
    }
    Ok(aggregator.finish())
}
