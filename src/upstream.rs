//! The user-directory search capability and its GitHub GraphQL implementation.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::model::UserProfile;
use crate::options::QueryConfig;

/// One page request: search text, page size and continuation cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub first: usize,
    pub after: Option<String>,
}

/// Quota state reported alongside a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    pub users: Vec<UserProfile>,
    /// `None` once upstream is exhausted.
    pub next_cursor: Option<String>,
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("rate limited")]
    RateLimited {
        reset_at: Option<DateTime<Utc>>,
        retry_after: Option<Duration>,
    },
    #[error("transient failure: {0}")]
    Transient(String),
    /// Upstream refused the query itself; retrying cannot help.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// A paginated user search. Implementations must be usable from several streams at once.
pub trait Upstream: Send + Sync {
    fn search(&self, query: &SearchQuery) -> Result<SearchPage, UpstreamError>;
}

/// Search text for one location stream.
///
/// Contribution counts are not searchable, so every stream is ordered by followers and the
/// activity metric is applied after fetching.
pub fn search_text(location: Option<&str>, excluded_locations: &[String]) -> String {
    let mut parts = vec!["type:user".to_string()];
    if let Some(loc) = location {
        parts.push(format!("location:{}", quote_term(loc)));
    }
    for loc in excluded_locations {
        let loc = loc.trim();
        if !loc.is_empty() {
            parts.push(format!("-location:{}", quote_term(loc)));
        }
    }
    parts.push("sort:followers-desc".to_string());
    parts.join(" ")
}

fn quote_term(s: &str) -> String {
    let s = s.trim().replace('"', "");
    if s.contains(char::is_whitespace) {
        format!("\"{s}\"")
    } else {
        s
    }
}

const SEARCH_QUERY: &str = r#"
query($q: String!, $first: Int!, $after: String) {
  rateLimit { remaining resetAt }
  search(query: $q, type: USER, first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes {
      ... on User {
        login
        name
        company
        avatarUrl
        followers { totalCount }
        contributionsCollection {
          contributionCalendar { totalContributions }
          restrictedContributionsCount
        }
      }
    }
  }
}
"#;

#[derive(Debug)]
pub struct GithubClient {
    url: String,
    token: String,
    agent: ureq::Agent,
}

impl GithubClient {
    pub fn new(token: &str, config: &QueryConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.request_timeout)
            .timeout_write(config.request_timeout)
            .timeout(config.request_timeout)
            .build();
        Self {
            url: config.api_url.clone(),
            token: token.to_string(),
            agent,
        }
    }
}

impl Upstream for GithubClient {
    fn search(&self, query: &SearchQuery) -> Result<SearchPage, UpstreamError> {
        let body = serde_json::json!({
            "query": SEARCH_QUERY,
            "variables": {
                "q": query.text,
                "first": query.first,
                "after": query.after,
            },
        });
        let resp = match self
            .agent
            .post(&self.url)
            .set("Accept", "application/json")
            .set("Authorization", &format!("bearer {}", self.token))
            .set("User-Agent", "ghrank")
            .send_json(body)
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let headers = RateLimitHeaders {
                    retry_after: resp.header("retry-after").map(str::to_string),
                    remaining: resp.header("x-ratelimit-remaining").map(str::to_string),
                    reset: resp.header("x-ratelimit-reset").map(str::to_string),
                };
                let body = resp.into_string().unwrap_or_default();
                return Err(classify_status(code, &headers, &body));
            }
            Err(e) => return Err(UpstreamError::Transient(format!("{}: {}", self.url, e))),
        };

        let parsed: GraphqlResponse = resp.into_json().map_err(|e| {
            UpstreamError::Transient(format!("failed to parse JSON from {}: {}", self.url, e))
        })?;
        page_from_response(parsed)
    }
}

/// Rate-limit related headers of a failed response.
#[derive(Debug, Clone, Default)]
pub struct RateLimitHeaders {
    pub retry_after: Option<String>,
    pub remaining: Option<String>,
    pub reset: Option<String>,
}

/// Map a non-2xx response onto the error taxonomy.
pub fn classify_status(code: u16, headers: &RateLimitHeaders, body: &str) -> UpstreamError {
    let retry_after = headers
        .retry_after
        .as_deref()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let reset_at = headers
        .reset
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    let exhausted = headers.remaining.as_deref().map(str::trim) == Some("0");

    match code {
        401 => UpstreamError::Unauthorized(snippet(body)),
        429 => UpstreamError::RateLimited {
            reset_at,
            retry_after,
        },
        403 if retry_after.is_some()
            || exhausted
            || body.to_ascii_lowercase().contains("rate limit") =>
        {
            UpstreamError::RateLimited {
                reset_at,
                retry_after,
            }
        }
        500..=599 => UpstreamError::Transient(format!("HTTP {}: {}", code, snippet(body))),
        _ => UpstreamError::Rejected(format!("HTTP {}: {}", code, snippet(body))),
    }
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    let body = body.trim();
    if body.chars().count() <= MAX {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX - 1).collect();
    out.push('…');
    out
}

#[derive(Debug, Deserialize)]
pub struct GraphqlResponse {
    data: Option<GraphqlData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlData {
    rate_limit: Option<RateLimitNode>,
    search: Option<SearchConnection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitNode {
    remaining: u64,
    reset_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchConnection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<Option<UserNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

// Non-user search hits come back as empty objects, so every field is optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserNode {
    login: Option<String>,
    name: Option<String>,
    company: Option<String>,
    avatar_url: Option<String>,
    followers: Option<TotalCount>,
    contributions_collection: Option<ContributionsCollection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalCount {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContributionsCollection {
    contribution_calendar: ContributionCalendar,
    restricted_contributions_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContributionCalendar {
    total_contributions: u64,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: String,
}

/// Turn a decoded GraphQL body into a page, surfacing in-band errors.
pub fn page_from_response(resp: GraphqlResponse) -> Result<SearchPage, UpstreamError> {
    let rate_limit = resp
        .data
        .as_ref()
        .and_then(|d| d.rate_limit.as_ref())
        .map(|r| RateLimit {
            remaining: r.remaining,
            reset_at: r.reset_at,
        });

    if resp
        .errors
        .iter()
        .any(|e| e.kind.as_deref() == Some("RATE_LIMITED"))
    {
        return Err(UpstreamError::RateLimited {
            reset_at: rate_limit.map(|r| r.reset_at),
            retry_after: None,
        });
    }

    let Some(search) = resp.data.and_then(|d| d.search) else {
        let messages: Vec<&str> = resp.errors.iter().map(|e| e.message.as_str()).collect();
        if messages.is_empty() {
            return Err(UpstreamError::Transient(
                "response carried neither data nor errors".to_string(),
            ));
        }
        return Err(UpstreamError::Rejected(messages.join("; ")));
    };

    // Errors beside data mean some fields were nulled.
    if !resp.errors.is_empty() {
        let messages: Vec<&str> = resp.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(UpstreamError::Transient(format!(
            "partial GraphQL response: {}",
            messages.join("; ")
        )));
    }

    let mut users = Vec::new();
    for node in search.nodes.into_iter().flatten() {
        let Some(login) = node.login else {
            continue;
        };
        let (Some(followers), Some(collection)) = (node.followers, node.contributions_collection)
        else {
            return Err(UpstreamError::Transient(format!(
                "user {login} is missing activity fields"
            )));
        };
        users.push(UserProfile {
            login,
            name: node.name.filter(|s| !s.is_empty()),
            company: node.company.filter(|s| !s.is_empty()),
            avatar_url: node.avatar_url,
            followers: followers.total_count,
            contributions: collection.contribution_calendar.total_contributions,
            private_contributions: collection.restricted_contributions_count,
        });
    }

    let next_cursor = if search.page_info.has_next_page {
        search.page_info.end_cursor
    } else {
        None
    };

    Ok(SearchPage {
        users,
        next_cursor,
        rate_limit,
    })
}
