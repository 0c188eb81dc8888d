//! Run parameters: what to rank ([`RunOptions`]) and how to talk to upstream ([`QueryConfig`]).

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Tag recorded on sightings produced by the unfiltered stream.
pub const UNFILTERED_TAG: &str = "*";

/// Activity signal users are ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    /// Public plus private contributions over the last year.
    #[default]
    Contributions,
    /// Public contributions over the last year.
    PublicContributions,
    Followers,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Metric::Contributions => "contributions",
            Metric::PublicContributions => "public-contributions",
            Metric::Followers => "followers",
        };
        f.write_str(s)
    }
}

/// Title and definition checksum of the preset a run was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetIdentity {
    pub name: String,
    pub title: String,
    pub checksum: String,
}

/// Everything that determines *what* a run ranks. Built once, then only borrowed.
#[derive(Clone)]
pub struct RunOptions {
    pub token: String,
    pub locations: Vec<String>,
    pub excluded_locations: Vec<String>,
    pub excluded_users: Vec<String>,
    /// How many users the final list may hold.
    pub amount: usize,
    /// How many candidates each location stream may fetch.
    pub consider_num: usize,
    pub metric: Metric,
    pub preset: Option<PresetIdentity>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("token", &"<redacted>")
            .field("locations", &self.locations)
            .field("excluded_locations", &self.excluded_locations)
            .field("excluded_users", &self.excluded_users)
            .field("amount", &self.amount)
            .field("consider_num", &self.consider_num)
            .field("metric", &self.metric)
            .field("preset", &self.preset)
            .finish()
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            token: String::new(),
            locations: Vec::new(),
            excluded_locations: Vec::new(),
            excluded_users: Vec::new(),
            amount: 256,
            consider_num: 1000,
            metric: Metric::default(),
            preset: None,
        }
    }
}

impl RunOptions {
    /// Locations to query, trimmed and deduplicated case-insensitively, in request order.
    pub fn query_locations(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.locations
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .filter(|l| seen.insert(l.to_lowercase()))
            .map(str::to_string)
            .collect()
    }

    pub fn exclusions(&self) -> ExclusionSet {
        ExclusionSet::new(&self.excluded_users)
    }
}

/// Logins that must never appear in a result. GitHub logins are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    logins: HashSet<String>,
}

impl ExclusionSet {
    pub fn new<S: AsRef<str>>(logins: &[S]) -> Self {
        Self {
            logins: logins
                .iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, login: &str) -> bool {
        self.logins.contains(&login.to_lowercase())
    }
}

/// Retry policy for transient upstream failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1).min(32) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor)
            .min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// How a run talks to upstream.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub api_url: String,
    /// Ceiling on simultaneously running location streams.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Total rate-limit suspension one stream may accumulate before giving up.
    pub max_rate_limit_wait: Duration,
    /// Wait used when a rate-limit signal carries no reset time.
    pub default_rate_limit_wait: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Upstream page size ceiling.
    pub page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GRAPHQL_URL.to_string(),
            concurrency: 2,
            retry: RetryPolicy::default(),
            max_rate_limit_wait: Duration::from_secs(3600),
            default_rate_limit_wait: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            page_size: 100,
        }
    }
}
