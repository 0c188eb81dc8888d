use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::RankError;
use crate::model::CandidateRecord;
use crate::options::{QueryConfig, RunOptions};
use crate::query::{CancelToken, Clock, QueryClient, StreamSpec};
use crate::upstream::Upstream;

/// One stream per requested location, or a single unfiltered stream when none are given.
pub fn plan_streams(opts: &RunOptions) -> Vec<StreamSpec> {
    let locations = opts.query_locations();
    let make = |location: Option<String>| StreamSpec {
        location,
        excluded_locations: opts.excluded_locations.clone(),
        target: opts.consider_num,
        metric: opts.metric,
    };
    if locations.is_empty() {
        vec![make(None)]
    } else {
        locations.into_iter().map(|l| make(Some(l))).collect()
    }
}

/// Run every stream with at most `config.concurrency` in flight and return all sightings.
///
/// Sightings come back in stream order regardless of completion order. The first terminal
/// failure cancels the remaining streams and is returned; nothing partial escapes.
pub async fn collect_sightings(
    upstream: Arc<dyn Upstream>,
    clock: Arc<dyn Clock>,
    config: &QueryConfig,
    streams: Vec<StreamSpec>,
) -> Result<Vec<CandidateRecord>, RankError> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let cancel = CancelToken::new();
    let client = Arc::new(QueryClient::new(
        upstream,
        clock,
        config.clone(),
        cancel.clone(),
    ));

    let n = streams.len();
    let mut tasks: JoinSet<(usize, Result<Vec<CandidateRecord>, RankError>)> = JoinSet::new();
    for (idx, spec) in streams.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let client = client.clone();
        tasks.spawn(async move {
            let tag = spec.tag().to_string();
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (idx, Err(RankError::Cancelled { location: tag })),
            };
            let joined = tokio::task::spawn_blocking(move || client.fetch(&spec)).await;
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(RankError::Runtime(format!("query task for {tag} failed: {e}"))),
            };
            (idx, result)
        });
    }

    let mut per_stream: Vec<Option<Vec<CandidateRecord>>> = (0..n).map(|_| None).collect();
    let mut failure: Option<RankError> = None;

    while let Some(joined) = tasks.join_next().await {
        let err = match joined {
            Ok((idx, Ok(records))) => {
                per_stream[idx] = Some(records);
                continue;
            }
            Ok((_, Err(e))) if e.is_cancelled() => continue,
            Ok((_, Err(e))) => e,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => RankError::Runtime(format!("query task failed: {e}")),
        };
        if failure.is_none() {
            error!(location = err.location().unwrap_or("-"), error = %err, "query stream failed; cancelling run");
            cancel.cancel();
            semaphore.close();
            tasks.abort_all();
            failure = Some(err);
        } else {
            debug!(error = %err, "additional failure after cancellation");
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }

    let mut sightings = Vec::new();
    for (idx, records) in per_stream.into_iter().enumerate() {
        match records {
            Some(records) => sightings.extend(records),
            None => {
                return Err(RankError::Runtime(format!(
                    "query stream {idx} finished without a result"
                )))
            }
        }
    }
    Ok(sightings)
}
