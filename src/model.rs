use serde::Serialize;
use std::collections::BTreeSet;

use crate::options::Metric;

/// Profile fields upstream reports for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub login: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub avatar_url: Option<String>,
    pub followers: u64,
    /// Public contributions over the last year.
    pub contributions: u64,
    /// Contributions to private repositories over the last year.
    pub private_contributions: u64,
}

impl UserProfile {
    pub fn score(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Contributions => self.contributions + self.private_contributions,
            Metric::PublicContributions => self.contributions,
            Metric::Followers => self.followers,
        }
    }
}

/// One sighting of a user by one location stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub identity: String,
    pub score: u64,
    /// Location filter that produced this sighting.
    pub location: String,
    pub profile: UserProfile,
}

impl CandidateRecord {
    pub fn from_profile(profile: UserProfile, metric: Metric, location: &str) -> Self {
        Self {
            identity: profile.login.clone(),
            score: profile.score(metric),
            location: location.to_string(),
            profile,
        }
    }
}

/// A distinct user after folding all of its sightings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedUser {
    /// Same as `profile.login`, which is what gets serialized.
    #[serde(skip_serializing)]
    pub identity: String,
    pub score: u64,
    pub locations: BTreeSet<String>,
    #[serde(flatten)]
    pub profile: UserProfile,
}
