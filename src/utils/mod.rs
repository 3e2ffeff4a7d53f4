use crate::models::{PostId, UserId};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub mod validation;

/// Fingerprint of everything a factorization depends on. Equal fingerprints
/// mean the ranking would come out identical.
pub fn working_set_fingerprint(
    user_id: UserId,
    k: usize,
    candidates: &[PostId],
    cells: &[((UserId, PostId), f64)],
) -> u64 {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    k.hash(&mut hasher);
    candidates.hash(&mut hasher);
    for ((user, post), strength) in cells {
        user.hash(&mut hasher);
        post.hash(&mut hasher);
        strength.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// Stable descending sort on score; equal scores keep their input order.
pub fn sort_by_score_desc<T>(scored: &mut [(T, f64)]) {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
}
