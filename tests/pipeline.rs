use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ghrank::options::{QueryConfig, RetryPolicy, RunOptions};
use ghrank::query::Clock;
use ghrank::upstream::{search_text, SearchPage, SearchQuery, Upstream, UpstreamError};
use ghrank::{rank_sightings, rank_users, CandidateRecord, RankError, Report, UserProfile};

struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    fn at(secs: i64) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.timestamp_opt(secs, 0).unwrap()),
        })
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, d: Duration) {
        *self.now.lock().unwrap() += chrono::Duration::from_std(d).unwrap();
    }
}

type Response = Result<SearchPage, UpstreamError>;

/// Per-location scripted responses. A location whose script runs dry keeps returning its
/// `fallback`, if any.
#[derive(Default)]
struct ScriptedUpstream {
    scripts: Mutex<HashMap<String, VecDeque<Response>>>,
    fallback: HashMap<String, Response>,
    calls: Mutex<Vec<SearchQuery>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedUpstream {
    fn with(mut self, location: Option<&str>, responses: Vec<Response>) -> Self {
        self.scripts
            .get_mut()
            .unwrap()
            .insert(search_text(location, &[]), responses.into());
        self
    }

    fn with_text(mut self, text: String, responses: Vec<Response>) -> Self {
        self.scripts.get_mut().unwrap().insert(text, responses.into());
        self
    }

    fn texts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|q| q.text.clone()).collect()
    }

    fn forever(mut self, location: Option<&str>, response: Response) -> Self {
        self.fallback.insert(search_text(location, &[]), response);
        self
    }

    fn calls_for(&self, location: Option<&str>) -> Vec<Option<String>> {
        let text = search_text(location, &[]);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.text == text)
            .map(|q| q.after.clone())
            .collect()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Upstream for ScriptedUpstream {
    fn search(&self, query: &SearchQuery) -> Response {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(query.clone());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&query.text)
            .and_then(|q| q.pop_front());
        let out = scripted
            .or_else(|| self.fallback.get(&query.text).cloned())
            .unwrap_or_else(|| Err(UpstreamError::Rejected(format!("no script for {}", query.text))));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

fn profile(login: &str, contributions: u64) -> UserProfile {
    UserProfile {
        login: login.to_string(),
        name: None,
        company: None,
        avatar_url: None,
        followers: 10,
        contributions,
        private_contributions: 0,
    }
}

fn page(users: &[(&str, u64)], next: Option<&str>) -> Response {
    Ok(SearchPage {
        users: users.iter().map(|(l, c)| profile(l, *c)).collect(),
        next_cursor: next.map(str::to_string),
        rate_limit: None,
    })
}

fn config() -> QueryConfig {
    QueryConfig {
        concurrency: 2,
        retry: RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            backoff_multiplier: 2.0,
        },
        page_size: 2,
        ..Default::default()
    }
}

fn options(locations: &[&str], excluded: &[&str], amount: usize) -> RunOptions {
    RunOptions {
        token: "test-token".into(),
        locations: locations.iter().map(|s| s.to_string()).collect(),
        excluded_users: excluded.iter().map(|s| s.to_string()).collect(),
        amount,
        consider_num: 100,
        ..Default::default()
    }
}

async fn run(upstream: ScriptedUpstream, opts: &RunOptions) -> (Arc<ScriptedUpstream>, Result<Report, RankError>) {
    let upstream = Arc::new(upstream);
    let result = rank_users(upstream.clone(), FakeClock::at(1_000), opts, &config()).await;
    (upstream, result)
}

fn ranked(report: &Report) -> Vec<(&str, u64)> {
    report
        .users
        .iter()
        .map(|u| (u.identity.as_str(), u.score))
        .collect()
}

fn abc() -> Vec<(&'static str, u64)> {
    vec![("alice", 50), ("bob", 80), ("carol", 80)]
}

#[tokio::test]
async fn unfiltered_run_breaks_ties_by_login() {
    let upstream = ScriptedUpstream::default().with(None, vec![page(&abc(), None)]);
    let (upstream, result) = run(upstream, &options(&[], &[], 2)).await;
    let report = result.unwrap();
    assert_eq!(ranked(&report), vec![("bob", 80), ("carol", 80)]);
    assert_eq!(upstream.total_calls(), 1);
    assert_eq!(report.stats.distinct_users, 3);
    assert_eq!(report.title, "Worldwide");
}

#[tokio::test]
async fn excluded_login_never_appears() {
    let upstream = ScriptedUpstream::default().with(None, vec![page(&abc(), None)]);
    let (_, result) = run(upstream, &options(&[], &["bob"], 2)).await;
    assert_eq!(ranked(&result.unwrap()), vec![("carol", 80), ("alice", 50)]);
}

#[tokio::test]
async fn user_seen_in_two_locations_is_counted_once() {
    let upstream = ScriptedUpstream::default()
        .with(Some("Helsinki"), vec![page(&[("alice", 50), ("bob", 80)], None)])
        .with(Some("Finland"), vec![page(&[("alice", 50), ("dave", 10)], None)]);
    let (_, result) = run(upstream, &options(&["Helsinki", "Finland"], &[], 10)).await;
    let report = result.unwrap();
    assert_eq!(
        ranked(&report),
        vec![("bob", 80), ("alice", 50), ("dave", 10)]
    );
    let alice = &report.users[1];
    assert_eq!(
        alice.locations.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["Finland", "Helsinki"]
    );
    assert_eq!(report.stats.sightings, 4);
}

#[tokio::test]
async fn excluded_login_is_dropped_from_every_location() {
    let upstream = ScriptedUpstream::default()
        .with(Some("Oulu"), vec![page(&[("bob", 80), ("alice", 50)], None)])
        .with(Some("Turku"), vec![page(&[("bob", 80)], None)]);
    let (_, result) = run(upstream, &options(&["Oulu", "Turku"], &["bob", "ghost"], 10)).await;
    let report = result.unwrap();
    assert_eq!(ranked(&report), vec![("alice", 50)]);
    assert_eq!(report.stats.excluded_sightings, 2);
}

#[tokio::test]
async fn excluded_locations_reach_every_stream() {
    let excluded = vec!["Espoo".to_string(), "New York".to_string()];
    let upstream = ScriptedUpstream::default()
        .with_text(
            search_text(Some("Oulu"), &excluded),
            vec![page(&[("alice", 50)], None)],
        )
        .with_text(
            search_text(Some("Turku"), &excluded),
            vec![page(&[("bob", 40)], None)],
        );
    let mut opts = options(&["Oulu", "Turku"], &[], 10);
    opts.excluded_locations = excluded;
    let (upstream, result) = run(upstream, &opts).await;
    let report = result.unwrap();
    assert_eq!(ranked(&report), vec![("alice", 50), ("bob", 40)]);

    let texts = upstream.texts();
    assert_eq!(texts.len(), 2);
    for text in &texts {
        assert!(text.contains("-location:Espoo"), "{text}");
        assert!(text.contains("-location:\"New York\""), "{text}");
    }
}

#[tokio::test]
async fn rate_limit_mid_pagination_resumes_without_gaps() {
    let reset = Utc.timestamp_opt(1_030, 0).unwrap();
    let upstream = ScriptedUpstream::default()
        .with(
            Some("Oulu"),
            vec![
                page(&[("a", 9), ("b", 8)], Some("p2")),
                Err(UpstreamError::RateLimited {
                    reset_at: Some(reset),
                    retry_after: None,
                }),
                page(&[("c", 7), ("d", 6)], Some("p3")),
                page(&[("e", 5)], None),
            ],
        )
        .with(Some("Turku"), vec![page(&[("f", 4)], None)]);
    let (upstream, result) = run(upstream, &options(&["Oulu", "Turku"], &[], 10)).await;
    let report = result.unwrap();

    assert_eq!(
        ranked(&report),
        vec![("a", 9), ("b", 8), ("c", 7), ("d", 6), ("e", 5), ("f", 4)]
    );
    assert_eq!(report.stats.sightings, 6);
    assert_eq!(
        upstream.calls_for(Some("Oulu")),
        vec![
            None,
            Some("p2".to_string()),
            Some("p2".to_string()),
            Some("p3".to_string())
        ]
    );
    // The report is stamped after the suspension elapsed on the virtual clock.
    assert!(report.generated_at >= reset);
}

#[tokio::test]
async fn persistent_network_failure_fails_the_whole_run() {
    let upstream = ScriptedUpstream::default()
        .with(Some("Oulu"), vec![page(&[("a", 9)], None)])
        .forever(
            Some("Tampere"),
            Err(UpstreamError::Transient("connection reset by peer".into())),
        );
    let (upstream, result) = run(upstream, &options(&["Oulu", "Tampere"], &[], 10)).await;
    match result {
        Err(RankError::LocationQueryFailed {
            location, attempts, ..
        }) => {
            assert_eq!(location, "Tampere");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected LocationQueryFailed, got {other:?}"),
    }
    assert_eq!(upstream.calls_for(Some("Tampere")).len(), 3);
}

#[tokio::test]
async fn bad_token_aborts_the_run() {
    let upstream = ScriptedUpstream::default()
        .forever(None, Err(UpstreamError::Unauthorized("Bad credentials".into())));
    let (upstream, result) = run(upstream, &options(&[], &[], 10)).await;
    assert!(matches!(result, Err(RankError::Authentication { .. })));
    assert_eq!(upstream.total_calls(), 1);
}

#[tokio::test]
async fn consider_num_caps_each_stream() {
    let upstream = ScriptedUpstream::default()
        .with(Some("Oulu"), vec![page(&[("a", 1), ("b", 2)], Some("x")), page(&[("c", 3), ("d", 4)], None)])
        .with(Some("Turku"), vec![page(&[("e", 5), ("f", 6)], Some("y")), page(&[("g", 7), ("h", 8)], None)]);
    let mut opts = options(&["Oulu", "Turku"], &[], 100);
    opts.consider_num = 3;
    let (upstream, result) = run(upstream, &opts).await;
    let report = result.unwrap();
    assert_eq!(report.stats.sightings, 6);
    assert_eq!(report.users.len(), 6);
    assert_eq!(upstream.calls_for(Some("Oulu")).len(), 2);
}

#[tokio::test]
async fn empty_upstream_is_an_empty_result() {
    let upstream = ScriptedUpstream::default().with(Some("Nowhere"), vec![page(&[], None)]);
    let (_, result) = run(upstream, &options(&["Nowhere"], &[], 10)).await;
    let report = result.unwrap();
    assert!(report.users.is_empty());
    assert_eq!(report.stats.returned, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_is_bounded() {
    let locations = ["l1", "l2", "l3", "l4", "l5", "l6"];
    let mut upstream = ScriptedUpstream {
        delay: Duration::from_millis(30),
        ..Default::default()
    };
    for (i, loc) in locations.iter().enumerate() {
        upstream = upstream.with(Some(*loc), vec![page(&[(*loc, i as u64)], None)]);
    }
    let (upstream, result) = run(upstream, &options(&locations, &[], 10)).await;
    let report = result.unwrap();
    assert_eq!(report.users.len(), 6);
    let max = upstream.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "max in flight = {max}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_cancels_sibling_streams() {
    let upstream = ScriptedUpstream {
        delay: Duration::from_millis(5),
        ..Default::default()
    }
    .with(Some("Broken"), vec![Err(UpstreamError::Rejected("invalid query".into()))])
    .forever(Some("Endless"), page(&[("x", 1)], Some("more")));
    let upstream = Arc::new(upstream);
    let mut opts = options(&["Endless", "Broken"], &[], 10);
    opts.consider_num = 1_000_000;

    let result = rank_users(upstream.clone(), FakeClock::at(0), &opts, &config()).await;
    match result {
        Err(RankError::LocationQueryFailed { location, .. }) => assert_eq!(location, "Broken"),
        other => panic!("expected LocationQueryFailed, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = upstream.calls_for(Some("Endless")).len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(upstream.calls_for(Some("Endless")).len(), settled);
}

#[test]
fn ranking_stage_is_idempotent() {
    let sightings: Vec<CandidateRecord> = [
        ("zed", 3, "a"),
        ("amy", 9, "a"),
        ("bo", 9, "b"),
        ("amy", 9, "b"),
        ("cy", 1, "b"),
        ("dee", 3, "a"),
    ]
    .iter()
    .map(|(l, s, loc)| CandidateRecord::from_profile(profile(l, *s), Default::default(), loc))
    .collect();
    let opts = options(&[], &["cy"], 3);

    let (_, first) = rank_sightings(sightings.clone(), &opts);
    let (_, second) = rank_sightings(sightings, &opts);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    let ids: Vec<&str> = first.iter().map(|u| u.identity.as_str()).collect();
    assert_eq!(ids, vec!["amy", "bo", "dee"]);
}
