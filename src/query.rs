//! Paginated fetch of one location stream.
//!
//! The client walks cursors until it has `target` records or upstream runs dry. Rate-limit
//! signals suspend the stream and resume it at the same cursor; transient failures are retried
//! with exponential backoff; authentication failures end the run at once.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::RankError;
use crate::model::CandidateRecord;
use crate::options::{Metric, QueryConfig, UNFILTERED_TAG};
use crate::upstream::{search_text, SearchQuery, Upstream, UpstreamError};

/// Source of wall-clock time and sleeping, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Write-once flag shared by all streams of a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Granularity of sleeps, so cancellation is noticed while suspended.
const WAIT_SLICE: Duration = Duration::from_millis(250);

/// Slack added past a reported reset time; upstream clocks drift.
const RESET_SLACK: Duration = Duration::from_secs(1);

/// Parameters of a single location stream.
#[derive(Debug, Clone)]
pub struct StreamSpec {
    /// `None` for the unfiltered stream.
    pub location: Option<String>,
    pub excluded_locations: Vec<String>,
    pub target: usize,
    pub metric: Metric,
}

impl StreamSpec {
    pub fn tag(&self) -> &str {
        self.location.as_deref().unwrap_or(UNFILTERED_TAG)
    }
}

pub struct QueryClient {
    upstream: Arc<dyn Upstream>,
    clock: Arc<dyn Clock>,
    config: QueryConfig,
    cancel: CancelToken,
}

impl QueryClient {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
        config: QueryConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            upstream,
            clock,
            config,
            cancel,
        }
    }

    /// Fetch up to `spec.target` sightings for one location.
    pub fn fetch(&self, spec: &StreamSpec) -> Result<Vec<CandidateRecord>, RankError> {
        let tag = spec.tag().to_string();
        let text = search_text(spec.location.as_deref(), &spec.excluded_locations);
        let page_size = self.config.page_size.max(1);

        let mut records: Vec<CandidateRecord> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut attempt: u32 = 0;
        let mut rate_limited_for = Duration::ZERO;
        let mut pages = 0usize;

        info!(location = %tag, target = spec.target, "query stream started");

        while records.len() < spec.target {
            self.check_cancelled(&tag)?;

            let query = SearchQuery {
                text: text.clone(),
                first: page_size.min(spec.target - records.len()),
                after: cursor.clone(),
            };

            let page = match self.upstream.search(&query) {
                Ok(page) => page,
                Err(UpstreamError::Unauthorized(message)) => {
                    return Err(RankError::Authentication { message });
                }
                Err(UpstreamError::RateLimited {
                    reset_at,
                    retry_after,
                }) => {
                    let wait = self.rate_limit_wait(reset_at, retry_after);
                    rate_limited_for += wait;
                    if rate_limited_for > self.config.max_rate_limit_wait {
                        return Err(RankError::UpstreamUnavailable {
                            location: tag,
                            waited: rate_limited_for,
                        });
                    }
                    warn!(location = %tag, wait_secs = wait.as_secs(), "rate limited; suspending");
                    self.wait(wait, &tag)?;
                    continue;
                }
                Err(UpstreamError::Transient(reason)) => {
                    attempt += 1;
                    if attempt > self.config.retry.max_retries {
                        return Err(RankError::LocationQueryFailed {
                            location: tag,
                            attempts: attempt,
                            reason,
                        });
                    }
                    let delay = self.config.retry.backoff_for(attempt);
                    warn!(
                        location = %tag,
                        attempt,
                        max_retries = self.config.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "transient failure; retrying"
                    );
                    self.wait(delay, &tag)?;
                    continue;
                }
                Err(UpstreamError::Rejected(reason)) => {
                    return Err(RankError::LocationQueryFailed {
                        location: tag,
                        attempts: attempt + 1,
                        reason,
                    });
                }
            };

            attempt = 0;
            pages += 1;
            let fetched = page.users.len();
            let room = spec.target - records.len();
            records.extend(
                page.users
                    .into_iter()
                    .take(room)
                    .map(|p| CandidateRecord::from_profile(p, spec.metric, &tag)),
            );
            debug!(location = %tag, page = pages, fetched, total = records.len(), "page fetched");

            let Some(next) = page.next_cursor else {
                break;
            };
            if fetched == 0 {
                break;
            }
            cursor = Some(next);

            if let Some(limit) = page.rate_limit {
                if limit.remaining == 0 && records.len() < spec.target {
                    let wait = self.until(limit.reset_at);
                    rate_limited_for += wait;
                    if rate_limited_for > self.config.max_rate_limit_wait {
                        return Err(RankError::UpstreamUnavailable {
                            location: tag,
                            waited: rate_limited_for,
                        });
                    }
                    info!(location = %tag, wait_secs = wait.as_secs(), "quota exhausted; waiting for reset");
                    self.wait(wait, &tag)?;
                }
            }
        }

        info!(location = %tag, pages, records = records.len(), "query stream finished");
        Ok(records)
    }

    fn rate_limit_wait(
        &self,
        reset_at: Option<DateTime<Utc>>,
        retry_after: Option<Duration>,
    ) -> Duration {
        // Every signal advances the ceiling, even a zero retry-after.
        let wait = match (retry_after, reset_at) {
            (Some(d), _) => d,
            (None, Some(t)) => self.until(t),
            (None, None) => self.config.default_rate_limit_wait,
        };
        wait.max(RESET_SLACK)
    }

    fn until(&self, t: DateTime<Utc>) -> Duration {
        (t - self.clock.now()).to_std().unwrap_or(Duration::ZERO) + RESET_SLACK
    }

    fn wait(&self, total: Duration, tag: &str) -> Result<(), RankError> {
        let mut left = total;
        while !left.is_zero() {
            self.check_cancelled(tag)?;
            let step = left.min(WAIT_SLICE);
            self.clock.sleep(step);
            left -= step;
        }
        self.check_cancelled(tag)
    }

    fn check_cancelled(&self, tag: &str) -> Result<(), RankError> {
        if self.cancel.is_cancelled() {
            debug!(location = %tag, "query stream cancelled");
            return Err(RankError::Cancelled {
                location: tag.to_string(),
            });
        }
        Ok(())
    }
}
