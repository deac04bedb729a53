//! Popularity scoring on a 0-100 scale, combining a Store-side followers
//! count (when present) with a Meta-side review-count-weighted rating.
//!
//! Decision (recorded in DESIGN.md "Open Question decisions"): when both
//! signals are available the followers-based score takes priority; the
//! weighted review formula is only a fallback.

/// Step function mapping a raw follower count to a 0-100 popularity score.
/// Mirrors the coarse buckets used for the rating-alias mapper: a handful
/// of thresholds rather than a continuous curve, since follower counts
/// span many orders of magnitude.
pub fn followers_to_popularity(followers: u64) -> f64 {
    match followers {
        0..=99 => 5.0,
        100..=999 => 20.0,
        1_000..=9_999 => 40.0,
        10_000..=99_999 => 60.0,
        100_000..=999_999 => 80.0,
        _ => 100.0,
    }
}

/// Weighted rating formula: a 0-5 average rating scaled to 0-100 and damped
/// by review-count confidence (more reviews pull the score toward the raw
/// average faster; few reviews pull it toward the midpoint).
pub fn weighted_review_popularity(average_rating_0_5: f64, review_count: u64) -> f64 {
    let confidence = (review_count as f64 / (review_count as f64 + 50.0)).clamp(0.0, 1.0);
    let scaled = (average_rating_0_5 / 5.0 * 100.0).clamp(0.0, 100.0);
    confidence * scaled + (1.0 - confidence) * 50.0
}

/// Combine the two signals per the priority decision above.
pub fn popularity(
    followers: Option<u64>,
    average_rating_0_5: Option<f64>,
    review_count: Option<u64>,
) -> Option<f64> {
    if let Some(f) = followers {
        return Some(followers_to_popularity(f));
    }
    match (average_rating_0_5, review_count) {
        (Some(r), Some(c)) => Some(weighted_review_popularity(r, c)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn followers_prioritized_over_review_weighting() {
        let score = popularity(Some(5_000), Some(4.8), Some(2));
        assert_eq!(score, Some(40.0));
    }

    #[test]
    fn falls_back_to_weighted_reviews_without_followers() {
        let low_confidence = weighted_review_popularity(4.8, 2);
        let high_confidence = weighted_review_popularity(4.8, 5000);
        assert!(low_confidence < high_confidence);
        assert!(high_confidence > 90.0);
    }

    #[test]
    fn no_signal_returns_none() {
        assert_eq!(popularity(None, None, None), None);
    }
}
