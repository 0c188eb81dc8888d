//! End-to-end ranking run: fan-out → aggregate → rank → assemble.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::aggregate::{aggregate, Aggregate};
use crate::error::RankError;
use crate::fanout::{collect_sightings, plan_streams};
use crate::model::{AggregatedUser, CandidateRecord};
use crate::options::{QueryConfig, RunOptions};
use crate::query::{Clock, SystemClock};
use crate::rank::rank;
use crate::report::{assemble, Report};
use crate::upstream::{GithubClient, Upstream};

/// Aggregate and rank a fixed set of sightings. Pure; repeated calls give identical output.
pub fn rank_sightings(
    sightings: Vec<CandidateRecord>,
    opts: &RunOptions,
) -> (Aggregate, Vec<AggregatedUser>) {
    let agg = aggregate(sightings, &opts.exclusions());
    let ranked = rank(agg.users.values().cloned(), opts.amount);
    (agg, ranked)
}

/// Run the whole pipeline against any upstream.
pub async fn rank_users(
    upstream: Arc<dyn Upstream>,
    clock: Arc<dyn Clock>,
    opts: &RunOptions,
    config: &QueryConfig,
) -> Result<Report, RankError> {
    let started_at = Instant::now();
    let streams = plan_streams(opts);
    info!(streams = streams.len(), consider = opts.consider_num, metric = %opts.metric, "ranking run started");

    let sightings = collect_sightings(upstream, clock.clone(), config, streams).await?;
    let (agg, ranked) = rank_sightings(sightings, opts);

    info!(
        sightings = agg.sightings,
        distinct = agg.users.len(),
        excluded = agg.excluded_sightings,
        returned = ranked.len(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "ranking run finished"
    );
    Ok(assemble(opts, &agg, ranked, clock.now()))
}

/// Rank against the GitHub API on a private runtime.
pub fn run(opts: &RunOptions, config: &QueryConfig) -> Result<Report, RankError> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| RankError::Runtime(format!("failed to build tokio runtime: {e}")))?;
    let upstream: Arc<dyn Upstream> = Arc::new(GithubClient::new(&opts.token, config));
    let result = rt.block_on(rank_users(upstream, Arc::new(SystemClock), opts, config));
    // Cancelled blocking streams notice the token within one request; don't wait on them longer.
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}
