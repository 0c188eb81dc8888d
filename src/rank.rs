use std::cmp::Ordering;

use crate::model::AggregatedUser;

/// Score descending, then identity ascending.
pub fn compare_ranked(a: &AggregatedUser, b: &AggregatedUser) -> Ordering {
    b.score
        .cmp(&a.score)
        // Stable tie-break for determinism.
        .then_with(|| a.identity.cmp(&b.identity))
}

/// Order users by score and keep the first `amount`.
pub fn rank<I>(users: I, amount: usize) -> Vec<AggregatedUser>
where
    I: IntoIterator<Item = AggregatedUser>,
{
    let mut rows: Vec<AggregatedUser> = users.into_iter().collect();
    rows.sort_by(compare_ranked);
    rows.truncate(amount);
    rows
}
