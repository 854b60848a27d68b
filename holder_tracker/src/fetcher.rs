use log::debug;

use crate::error::FetchError;
use crate::upstream::{TokenAccount, TokenAccountSource};

pub const DEFAULT_PAGE_LIMIT: u32 = 1000;

/// Walks `getTokenAccounts` pages for one mint, starting at page 1.
///
/// The walk ends at the first page with no result or no accounts. Reaching
/// `max_pages` without such a page is an error, as is any upstream failure;
/// nothing is retried.
pub struct AccountPages<'a> {
    source: &'a dyn TokenAccountSource,
    mint: &'a str,
    limit: u32,
    max_pages: u32,
    next_page: u32,
    done: bool,
}

impl<'a> AccountPages<'a> {
    pub fn new(source: &'a dyn TokenAccountSource, mint: &'a str, limit: u32, max_pages: u32) -> Self {
        Self {
            source,
            mint,
            limit,
            max_pages,
            next_page: 1,
            done: false,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<TokenAccount>>, FetchError> {
        if self.done {
            return Ok(None);
        }

        let page = self.next_page;
        if page > self.max_pages {
            self.done = true;
            return Err(FetchError::PageLimit {
                max_pages: self.max_pages,
            });
        }

        let accounts = self
            .source
            .token_accounts(self.mint, page, self.limit)
            .await
            .map_err(|source| {
                self.done = true;
                FetchError::Upstream { page, source }
            })?;

        match accounts {
            Some(accounts) if !accounts.is_empty() => {
                debug!("page {} returned {} token accounts", page, accounts.len());
                self.next_page += 1;
                Ok(Some(accounts))
            }
            _ => {
                debug!("no more results after page {}", page - 1);
                self.done = true;
                Ok(None)
            }
        }
    }

    /// Number of non-empty pages returned so far.
    pub fn pages_read(&self) -> u32 {
        self.next_page - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::upstream::MockTokenAccountSource;
    use mockall::Sequence;

    #[tokio::test]
    async fn stops_on_empty_page() {
        let mut source = MockTokenAccountSource::new();
        let mut seq = Sequence::new();
        source
            .expect_token_accounts()
            .withf(|mint, page, limit| mint == "mint" && *page == 1 && *limit == 1000)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(Some(vec![TokenAccount::new("A", 1)])));
        source
            .expect_token_accounts()
            .withf(|mint, page, limit| mint == "mint" && *page == 2 && *limit == 1000)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(Some(vec![])));

        let mut pages = AccountPages::new(&source, "mint", 1000, 10);
        assert_eq!(pages.next_page().await.unwrap().unwrap().len(), 1);
        assert!(pages.next_page().await.unwrap().is_none());
        assert!(pages.next_page().await.unwrap().is_none());
        assert_eq!(pages.pages_read(), 1);
    }

    #[tokio::test]
    async fn missing_result_ends_walk() {
        let mut source = MockTokenAccountSource::new();
        source
            .expect_token_accounts()
            .times(1)
            .returning(|_, _, _| Ok(None));

        let mut pages = AccountPages::new(&source, "mint", 1000, 10);
        assert!(pages.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upstream_error_carries_page() {
        let mut source = MockTokenAccountSource::new();
        source
            .expect_token_accounts()
            .withf(|_, page, _| *page == 1)
            .returning(|_, _, _| Ok(Some(vec![TokenAccount::new("A", 1)])));
        source
            .expect_token_accounts()
            .withf(|_, page, _| *page == 2)
            .returning(|_, _, _| {
                Err(UpstreamError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                })
            });

        let mut pages = AccountPages::new(&source, "mint", 1000, 10);
        pages.next_page().await.unwrap();
        let err = pages.next_page().await.unwrap_err();
        assert!(matches!(err, FetchError::Upstream { page: 2, .. }));
    }

    #[tokio::test]
    async fn page_ceiling_is_an_error() {
        let mut source = MockTokenAccountSource::new();
        source
            .expect_token_accounts()
            .times(2)
            .returning(|_, _, _| Ok(Some(vec![TokenAccount::new("A", 1)])));

        let mut pages = AccountPages::new(&source, "mint", 1000, 2);
        pages.next_page().await.unwrap();
        pages.next_page().await.unwrap();
        let err = pages.next_page().await.unwrap_err();
        assert!(matches!(err, FetchError::PageLimit { max_pages: 2 }));
    }
}
