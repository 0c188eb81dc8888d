use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::aggregate::Aggregate;
use crate::model::AggregatedUser;
use crate::options::{Metric, PresetIdentity, RunOptions};

/// Parameters a run was made with, minus the token.
#[derive(Debug, Clone, Serialize)]
pub struct RunParameters {
    pub locations: Vec<String>,
    pub excluded_locations: Vec<String>,
    pub excluded_users: Vec<String>,
    pub amount: usize,
    pub consider_num: usize,
    pub metric: Metric,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunStats {
    pub sightings: usize,
    pub excluded_sightings: usize,
    pub distinct_users: usize,
    pub returned: usize,
}

/// Ranked users together with everything needed to describe how they were obtained.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    pub preset: Option<PresetIdentity>,
    #[serde(serialize_with = "rfc3339")]
    pub generated_at: DateTime<Utc>,
    pub parameters: RunParameters,
    pub stats: RunStats,
    pub users: Vec<AggregatedUser>,
}

fn rfc3339<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl Report {
    pub fn generated_at_display(&self) -> String {
        self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Package a ranked slice with the options that produced it. Values are not touched.
pub fn assemble(
    opts: &RunOptions,
    aggregate: &Aggregate,
    ranked: Vec<AggregatedUser>,
    generated_at: DateTime<Utc>,
) -> Report {
    let title = match &opts.preset {
        Some(p) => p.title.clone(),
        None => {
            let locations = opts.query_locations();
            if locations.is_empty() {
                "Worldwide".to_string()
            } else {
                locations.join(", ")
            }
        }
    };

    Report {
        title,
        preset: opts.preset.clone(),
        generated_at,
        parameters: RunParameters {
            locations: opts.locations.clone(),
            excluded_locations: opts.excluded_locations.clone(),
            excluded_users: opts.excluded_users.clone(),
            amount: opts.amount,
            consider_num: opts.consider_num,
            metric: opts.metric,
        },
        stats: RunStats {
            sightings: aggregate.sightings,
            excluded_sightings: aggregate.excluded_sightings,
            distinct_users: aggregate.users.len(),
            returned: ranked.len(),
        },
        users: ranked,
    }
}
