//! Sequential, rate-limited pagination.

use crate::error::{SyncError, SyncResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One page returned by a paginated remote query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Records on this page.
    pub items: Vec<T>,
    /// Whether the remote holds further pages.
    pub has_more: bool,
}

/// Why a fetch stopped.
#[derive(Debug)]
pub enum FetchStop {
    /// The remote reported no further pages.
    Exhausted,
    /// `max_pages` pages were fetched and the remote still had more.
    PageLimit,
    /// The cancellation token fired.
    Cancelled,
    /// A page request failed; no retry is attempted within the fetch.
    Failed(SyncError),
}

/// Result of [`RateLimitedFetcher::fetch_all`].
#[derive(Debug)]
pub struct FetchOutcome<T> {
    /// Records collected before the fetch stopped.
    pub records: Vec<T>,
    /// Number of pages successfully fetched.
    pub pages_fetched: u32,
    /// True unless the remote was read to the end.
    pub truncated: bool,
    /// Stop reason.
    pub stop: FetchStop,
}

/// Progress emitted once per fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    /// Pages fetched so far.
    pub pages_fetched: u32,
    /// The page limit.
    pub max_pages: u32,
    /// Records collected so far.
    pub records: usize,
    /// `pages_fetched / max_pages`, never above 100.
    pub percent: u8,
}

/// Issues paginated requests one at a time with a fixed delay between them.
///
/// # Invariants
///
/// - Pages are requested sequentially, starting at page 1
/// - At most `max_pages` requests are issued
/// - The cancellation token is observed before every request, while a
///   request is in flight and during the inter-page delay
#[derive(Debug, Clone, Copy)]
pub struct RateLimitedFetcher {
    max_pages: u32,
    inter_page_delay: Duration,
}

impl RateLimitedFetcher {
    /// Creates a fetcher. A zero `max_pages` is treated as one.
    pub fn new(max_pages: u32, inter_page_delay: Duration) -> Self {
        Self {
            max_pages: max_pages.max(1),
            inter_page_delay,
        }
    }

    /// The page limit.
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Fetches pages until the remote runs out, the limit is hit, the token
    /// fires or a request fails.
    pub async fn fetch_all<T, F, Fut, P>(
        &self,
        mut fetch_page: F,
        cancel: &CancellationToken,
        mut on_page: P,
    ) -> FetchOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SyncResult<Page<T>>>,
        P: FnMut(FetchProgress),
    {
        let mut records = Vec::new();
        let mut pages_fetched = 0u32;

        let stop = loop {
            if cancel.is_cancelled() {
                break FetchStop::Cancelled;
            }

            let page_number = pages_fetched + 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break FetchStop::Cancelled,
                result = fetch_page(page_number) => result,
            };

            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    warn!(page = page_number, error = %e, "page fetch failed, returning partial result");
                    break FetchStop::Failed(e);
                }
            };

            pages_fetched += 1;
            records.extend(page.items);
            on_page(FetchProgress {
                pages_fetched,
                max_pages: self.max_pages,
                records: records.len(),
                percent: percent_of(pages_fetched, self.max_pages),
            });
            debug!(page = page_number, records = records.len(), "page fetched");

            if !page.has_more {
                break FetchStop::Exhausted;
            }
            if pages_fetched >= self.max_pages {
                break FetchStop::PageLimit;
            }

            if !self.inter_page_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break FetchStop::Cancelled,
                    _ = tokio::time::sleep(self.inter_page_delay) => {}
                }
            }
        };

        FetchOutcome {
            truncated: !matches!(stop, FetchStop::Exhausted),
            records,
            pages_fetched,
            stop,
        }
    }
}

fn percent_of(done: u32, total: u32) -> u8 {
    let pct = u64::from(done) * 100 / u64::from(total.max(1));
    pct.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn page(items: Vec<u32>, has_more: bool) -> SyncResult<Page<u32>> {
        Ok(Page { items, has_more })
    }

    #[tokio::test]
    async fn stops_when_remote_runs_out() {
        let fetcher = RateLimitedFetcher::new(10, Duration::ZERO);
        let cancel = CancellationToken::new();
        let outcome = fetcher
            .fetch_all(|n| async move { page(vec![n], n < 3) }, &cancel, |_| {})
            .await;

        assert_eq!(outcome.records, vec![1, 2, 3]);
        assert_eq!(outcome.pages_fetched, 3);
        assert!(!outcome.truncated);
        assert!(matches!(outcome.stop, FetchStop::Exhausted));
    }

    #[tokio::test]
    async fn failure_returns_partial_and_truncated() {
        let fetcher = RateLimitedFetcher::new(10, Duration::ZERO);
        let cancel = CancellationToken::new();
        let outcome = fetcher
            .fetch_all(
                |n| async move {
                    if n == 3 {
                        Err(SyncError::transport_retryable("reset"))
                    } else {
                        page(vec![n], true)
                    }
                },
                &cancel,
                |_| {},
            )
            .await;

        assert_eq!(outcome.records, vec![1, 2]);
        assert!(outcome.truncated);
        assert!(matches!(outcome.stop, FetchStop::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_pages_but_not_after_last() {
        let fetcher = RateLimitedFetcher::new(5, Duration::from_millis(200));
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        fetcher
            .fetch_all(|n| async move { page(vec![], n < 3) }, &cancel, |_| {})
            .await;

        // three pages, two gaps
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_stops_fetch() {
        let fetcher = RateLimitedFetcher::new(5, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let requests = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            trigger.cancel();
        });

        let counter = Arc::clone(&requests);
        let outcome = fetcher
            .fetch_all(
                move |n| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { page(vec![n], true) }
                },
                &cancel,
                |_| {},
            )
            .await;

        assert!(matches!(outcome.stop, FetchStop::Cancelled));
        assert_eq!(requests.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.records, vec![1, 2]);
    }

    #[tokio::test]
    async fn progress_is_capped_at_limit() {
        let fetcher = RateLimitedFetcher::new(4, Duration::ZERO);
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let outcome = fetcher
            .fetch_all(|n| async move { page(vec![n], true) }, &cancel, |p| {
                seen.push(p.percent)
            })
            .await;

        assert_eq!(seen, vec![25, 50, 75, 100]);
        assert!(matches!(outcome.stop, FetchStop::PageLimit));
    }

    #[test]
    fn percent_never_exceeds_hundred() {
        assert_eq!(percent_of(7, 5), 100);
        assert_eq!(percent_of(1, 0), 100);
        assert_eq!(percent_of(1, 3), 33);
    }
}
