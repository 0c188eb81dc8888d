//! `ghrank`: the most active GitHub users, by location.
//!
//! One search stream runs per location; sightings are merged per login, excluded logins are
//! dropped, and the survivors are ranked by an activity metric:
//!
//! ```text
//! streams (bounded fan-out) → aggregate (dedupe + exclude) → rank (score ↓, login ↑) → report
//! ```

pub mod aggregate;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod model;
pub mod options;
pub mod output;
pub mod pipeline;
pub mod presets;
pub mod query;
pub mod rank;
pub mod report;
pub mod upstream;

pub use error::RankError;
pub use model::{AggregatedUser, CandidateRecord, UserProfile};
pub use options::{Metric, QueryConfig, RetryPolicy, RunOptions};
pub use output::{write_report, OutputFormat};
pub use pipeline::{rank_sightings, rank_users, run};
pub use report::Report;
