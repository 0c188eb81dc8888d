use std::collections::{BTreeSet, HashMap};

use crate::model::{AggregatedUser, CandidateRecord};
use crate::options::ExclusionSet;

/// Distinct users plus the counters the report echoes.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    /// Keyed by lowercased login.
    pub users: HashMap<String, AggregatedUser>,
    pub sightings: usize,
    pub excluded_sightings: usize,
}

/// Fold sightings into one user per login.
///
/// Excluded logins are dropped before folding. The first sighting fixes score and profile;
/// later sightings only add their location tag.
pub fn aggregate<I>(sightings: I, excluded: &ExclusionSet) -> Aggregate
where
    I: IntoIterator<Item = CandidateRecord>,
{
    let mut out = Aggregate::default();
    for record in sightings {
        out.sightings += 1;
        if excluded.contains(&record.identity) {
            out.excluded_sightings += 1;
            continue;
        }
        out.users
            .entry(record.identity.to_lowercase())
            .and_modify(|u| {
                u.locations.insert(record.location.clone());
            })
            .or_insert_with(|| AggregatedUser {
                identity: record.identity.clone(),
                score: record.score,
                locations: BTreeSet::from([record.location.clone()]),
                profile: record.profile.clone(),
            });
    }
    out
}
