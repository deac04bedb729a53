//! Scoring primitives used by the matching engine. Name scoring extends the
//! teacher's `strsim::jaro_winkler` platform-fuzzing idiom
//! (`normalization::platform::PlatformKey::similarity`) to full titles.

use crate::normalization::name::tokenize;
use chrono::NaiveDate;
use std::collections::HashSet;
use strsim::jaro_winkler;

/// 0.5 * token Jaccard + 0.3 * Jaro-Winkler(lowercase) + 0.2 *
/// Jaro-Winkler(no separators), with an exact-match short-circuit.
pub fn name_score(a: &str, b: &str) -> f64 {
    let lower_a = a.to_lowercase();
    let lower_b = b.to_lowercase();
    if lower_a == lower_b {
        return 1.0;
    }

    let tokens_a: HashSet<String> = tokenize(a).into_iter().collect();
    let tokens_b: HashSet<String> = tokenize(b).into_iter().collect();
    let jaccard = token_jaccard(&tokens_a, &tokens_b);

    let compact_a: String = lower_a.chars().filter(|c| c.is_alphanumeric()).collect();
    let compact_b: String = lower_b.chars().filter(|c| c.is_alphanumeric()).collect();
    if compact_a == compact_b && !compact_a.is_empty() {
        return 1.0;
    }

    0.5 * jaccard + 0.3 * jaro_winkler(&lower_a, &lower_b) + 0.2 * jaro_winkler(&compact_a, &compact_b)
}

fn token_jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// 11-bucket step function over the absolute day difference between two
/// release dates (spec §4.4): exact match scores 1.0, decaying in fixed
/// steps out to 5 years apart.
pub fn date_score(a: Option<NaiveDate>, b: Option<NaiveDate>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let days = (a - b).num_days().unsigned_abs();
            match days {
                0 => 1.0,
                1 => 0.95,
                2..=3 => 0.9,
                4..=7 => 0.8,
                8..=14 => 0.7,
                15..=30 => 0.6,
                31..=90 => 0.5,
                91..=180 => 0.4,
                181..=365 => 0.3,
                366..=730 => 0.2,
                731..=1825 => 0.1,
                _ => 0.0,
            }
        }
        // Neither source gave a date: treat as neutral rather than penalizing.
        (None, None) => 0.5,
        _ => 0.2,
    }
}

/// Jaccard overlap over lowercase company/genre name sets.
pub fn set_overlap(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<String> = a.iter().map(|s| s.to_lowercase()).collect();
    let set_b: HashSet<String> = b.iter().map(|s| s.to_lowercase()).collect();
    token_jaccard(&set_a, &set_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_names_score_one() {
        assert_eq!(name_score("Elden Ring", "Elden Ring"), 1.0);
    }

    #[test]
    fn sequel_titles_are_not_conflated() {
        let score = name_score("Subnautica", "Subnautica: Below Zero");
        assert!(score < 0.85, "expected sequel disambiguation, got {score}");
    }

    #[test]
    fn exact_dates_score_one_and_far_dates_score_zero() {
        let d1 = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert_eq!(date_score(Some(d1), Some(d1)), 1.0);
        assert_eq!(date_score(Some(d1), Some(d2)), 0.0);
    }

    #[test]
    fn date_score_buckets_match_spec_steps() {
        let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let case = |offset_days: i64| date_score(Some(base), Some(base + chrono::Duration::days(offset_days)));
        assert_eq!(case(1), 0.95);
        assert_eq!(case(3), 0.9);
        assert_eq!(case(7), 0.8);
        assert_eq!(case(14), 0.7);
        assert_eq!(case(30), 0.6);
        assert_eq!(case(90), 0.5);
        assert_eq!(case(180), 0.4);
        assert_eq!(case(365), 0.3);
        assert_eq!(case(730), 0.2);
        assert_eq!(case(1825), 0.1);
    }
}
