//! Cross-source entity resolution: given a normalized candidate and a set
//! of existing `games` rows it might correspond to, decide whether to
//! auto-merge, queue for manual review, or reject.
//!
//! Grounded in idiom (not code) on the concurrent multi-field resolution
//! shape of `bourdenas-espy_backend::resolver::igdb::resolve_game_digest`
//! (gather independent signals, merge, log rather than panic on
//! ambiguity) adapted to this pipeline's DB-lookup-based matching instead
//! of a remote IGDB resolver.

pub mod similarity;

use crate::contracts::{Game, MatchingDecision, MatchingVerdict, ProcessedGame};
use chrono::Utc;
use uuid::Uuid;

pub const WEIGHT_NAME: f64 = 0.45;
pub const WEIGHT_DATE: f64 = 0.35;
pub const WEIGHT_COMPANY: f64 = 0.20;
// Genre overlap is computed and reported for future tuning but does not
// currently contribute to the score (Open Question decision, DESIGN.md).
pub const WEIGHT_GENRE: f64 = 0.0;
/// Added when both records agree on a PC SKU within a year of each other.
pub const PC_ALIGNMENT_BONUS: f64 = 0.05;

pub const AUTO_SCORE_THRESHOLD: f64 = 0.5;
pub const PENDING_SCORE_THRESHOLD: f64 = 0.3;
/// `nameScore >= 0.35 && signalCount >= 1` also auto-matches even below
/// `AUTO_SCORE_THRESHOLD`'s signal-count-2 path (spec §4.4).
pub const AUTO_NAME_SCORE_FLOOR: f64 = 0.35;

/// Outcome of comparing one candidate's slug/originalSlug against an
/// existing game's, per spec §4.4's "slug matching" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlugSignal {
    /// Slugs are literally equal: treat as a strong cross-source link.
    Exact,
    /// Slugs differ only by a collision-suffix ("-2", "-3", ...) and
    /// neither title carries a distinguishing sequel-number token: same
    /// entry, re-ingested under a slug that collided at creation time.
    CollisionMatch,
    /// Slugs differ by a collision-suffix but (at least) one title does
    /// carry a sequel-number token: genuinely different entries.
    SequelConflict,
    /// No suffix relationship between the two slugs.
    Unrelated,
}

/// One slug is the other plus a `-<digits>` suffix.
fn is_collision_suffix_of(shorter: &str, longer: &str) -> bool {
    longer.len() > shorter.len()
        && longer.starts_with(shorter)
        && longer.as_bytes()[shorter.len()] == b'-'
        && longer[shorter.len() + 1..].chars().all(|c| c.is_ascii_digit())
        && !longer[shorter.len() + 1..].is_empty()
}

fn slug_signal(
    candidate_slug: &str,
    candidate_name: &str,
    game_slug: &str,
    game_original_slug: &str,
    game_name: &str,
) -> SlugSignal {
    for existing in [game_slug, game_original_slug] {
        if existing == candidate_slug {
            return SlugSignal::Exact;
        }
        let suffixed = is_collision_suffix_of(existing, candidate_slug)
            || is_collision_suffix_of(candidate_slug, existing);
        if suffixed {
            let sequel_token = crate::normalization::name::has_sequel_number_token(candidate_name)
                || crate::normalization::name::has_sequel_number_token(game_name);
            return if sequel_token {
                SlugSignal::SequelConflict
            } else {
                SlugSignal::CollisionMatch
            };
        }
    }
    SlugSignal::Unrelated
}

/// A candidate score broken down by signal, before a verdict is assigned.
pub struct ScoredCandidate<'a> {
    pub game: &'a Game,
    pub name_score: f64,
    pub date_score: f64,
    pub platform_overlap: f64,
    pub company_overlap: f64,
    pub genre_overlap: f64,
    pub total_score: f64,
    pub strong_signals: u8,
    /// `true` once a slug-suffix relationship indicates these are
    /// different entries (a real sequel, not a collision-suffixed slug);
    /// `decide` forces `Reject` regardless of the numeric score.
    pub sequel_conflict: bool,
}

fn external_id_matches(candidate: &ProcessedGame, game: &Game) -> bool {
    match candidate.source {
        crate::contracts::Source::Store => {
            game.store_id.as_deref() == Some(candidate.external_id.0.as_str())
        }
        crate::contracts::Source::Meta => {
            game.meta_id.as_deref() == Some(candidate.external_id.0.as_str())
        }
    }
}

/// Score one existing `games` row against a normalized candidate.
pub fn score<'a>(
    candidate: &ProcessedGame,
    game: &'a Game,
    game_platforms: &[String],
    game_companies: &[String],
    game_genres: &[String],
) -> ScoredCandidate<'a> {
    let slug_signal = slug_signal(
        &candidate.slug_candidate,
        &candidate.name,
        &game.slug,
        &game.original_slug,
        &game.name,
    );

    let mut name_score = similarity::name_score(&candidate.name, &game.name);
    if matches!(slug_signal, SlugSignal::Exact | SlugSignal::CollisionMatch) {
        name_score = name_score.max(0.95);
    }

    let date_score = similarity::date_score(candidate.release_date, game.release_date);
    let platform_overlap = similarity::set_overlap(&candidate.platforms, game_platforms);
    let company_slugs: Vec<String> = candidate
        .companies
        .iter()
        .map(|c| c.slug_candidate.clone())
        .collect();
    let company_overlap = similarity::set_overlap(&company_slugs, game_companies);
    let genre_overlap = similarity::set_overlap(&candidate.genres, game_genres);

    let pc_bonus = if candidate.platforms.iter().any(|p| p == "pc")
        && game_platforms.iter().any(|p| p == "pc")
        && date_score >= 0.6
    {
        PC_ALIGNMENT_BONUS
    } else {
        0.0
    };

    let total_score = (WEIGHT_NAME * name_score
        + WEIGHT_DATE * date_score
        + WEIGHT_COMPANY * company_overlap
        + WEIGHT_GENRE * genre_overlap
        + pc_bonus)
        .min(1.0);

    let mut strong_signals = 0u8;
    if external_id_matches(candidate, game) {
        strong_signals += 1;
    }
    if matches!(slug_signal, SlugSignal::Exact | SlugSignal::CollisionMatch) {
        strong_signals += 1;
    }
    if name_score >= 0.999 {
        strong_signals += 1;
    }
    let release_within_365d = match (candidate.release_date, game.release_date) {
        (Some(a), Some(b)) => (a - b).num_days().unsigned_abs() <= 365,
        _ => false,
    };
    if release_within_365d {
        strong_signals += 1;
    }
    if company_overlap > 0.0 {
        strong_signals += 1;
    }

    ScoredCandidate {
        game,
        name_score,
        date_score,
        platform_overlap,
        company_overlap,
        genre_overlap,
        total_score,
        strong_signals,
        sequel_conflict: slug_signal == SlugSignal::SequelConflict,
    }
}

/// Pick the best-scoring candidate (if any) and decide its verdict. Two or
/// more strong signals (an exact id match plus a slug match, for example)
/// force an auto-match even if the weighted score alone would only reach
/// the pending band — this is what lets "Elden Ring" cross-source auto-
/// match on store_id + slug agreement despite minor date drift.
pub fn decide(
    run_id: Uuid,
    candidate: &ProcessedGame,
    scored: Vec<ScoredCandidate<'_>>,
) -> MatchingDecision {
    let best = scored
        .into_iter()
        .max_by(|a, b| a.total_score.partial_cmp(&b.total_score).unwrap());

    let Some(best) = best else {
        return MatchingDecision {
            run_id,
            candidate_game_id: None,
            source: candidate.source,
            external_id: candidate.external_id.clone(),
            name_score: 0.0,
            date_score: 0.0,
            platform_overlap: 0.0,
            company_overlap: 0.0,
            genre_overlap: 0.0,
            total_score: 0.0,
            strong_signals: 0,
            verdict: MatchingVerdict::Reject,
            reasons: vec!["no existing candidate rows to compare against".to_string()],
            decided_at: Utc::now(),
        };
    };

    let mut reasons = Vec::new();
    let verdict = if best.sequel_conflict {
        reasons.push(
            "reject: slug/name indicates a distinct sequel entry, not the same game".to_string(),
        );
        MatchingVerdict::Reject
    } else if best.total_score >= AUTO_SCORE_THRESHOLD
        && (best.strong_signals >= 2
            || (best.name_score >= AUTO_NAME_SCORE_FLOOR && best.strong_signals >= 1))
    {
        reasons.push(format!(
            "auto: score {:.3} strong_signals {}",
            best.total_score, best.strong_signals
        ));
        MatchingVerdict::Auto
    } else if best.total_score >= PENDING_SCORE_THRESHOLD && best.strong_signals >= 1 {
        reasons.push(format!("pending: score {:.3} below auto threshold", best.total_score));
        MatchingVerdict::Pending
    } else {
        reasons.push(format!("reject: score {:.3} below pending threshold", best.total_score));
        MatchingVerdict::Reject
    };

    MatchingDecision {
        run_id,
        candidate_game_id: Some(best.game.id),
        source: candidate.source,
        external_id: candidate.external_id.clone(),
        name_score: best.name_score,
        date_score: best.date_score,
        platform_overlap: best.platform_overlap,
        company_overlap: best.company_overlap,
        genre_overlap: best.genre_overlap,
        total_score: best.total_score,
        strong_signals: best.strong_signals,
        verdict,
        reasons,
        decided_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ExternalId, GameType, ProcessedDetail, ProcessedRelease, Source};
    use chrono::Utc;

    fn sample_game(id: i64, name: &str, store_id: Option<&str>) -> Game {
        Game {
            id,
            slug: crate::normalization::name::slug_candidate(name),
            original_slug: crate::normalization::name::slug_candidate(name),
            name: name.to_string(),
            original_name: None,
            game_type: "game".to_string(),
            is_dlc: false,
            store_id: store_id.map(str::to_string),
            meta_id: None,
            parent_store_id: None,
            parent_meta_id: None,
            popularity: None,
            followers_cache: None,
            release_date: None,
            release_date_raw: None,
            release_status: "unknown".to_string(),
            coming_soon: false,
            steam_last_refresh_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_candidate(name: &str, external_id: &str) -> ProcessedGame {
        let slug = crate::normalization::name::slug_candidate(name);
        ProcessedGame {
            source: Source::Store,
            external_id: ExternalId(external_id.to_string()),
            name: name.to_string(),
            original_name: None,
            slug_candidate: slug.clone(),
            original_slug_candidate: slug,
            game_type: GameType::Game,
            platforms: vec!["pc".to_string()],
            release_date: None,
            release_date_raw: None,
            release_status: crate::contracts::ReleaseStatus::Unknown,
            coming_soon: false,
            companies: vec![],
            popularity: None,
            followers: None,
            genres: vec![],
            parent_store_id: None,
            parent_meta_id: None,
            detail: Some(ProcessedDetail::default()),
            release: ProcessedRelease {
                platform: "pc".to_string(),
                store: crate::contracts::StoreVendor::Steam,
                store_app_id: Some(external_id.to_string()),
                release_date: None,
                release_status: crate::contracts::ReleaseStatus::Unknown,
                price_cents: None,
                is_free: false,
                followers: None,
                data_source: Source::Store,
            },
        }
    }

    #[test]
    fn matching_store_id_and_slug_forces_auto() {
        let candidate = sample_candidate("Elden Ring", "1245620");
        let game = sample_game(1, "Elden Ring", Some("1245620"));
        let scored = score(&candidate, &game, &["pc".to_string()], &[], &[]);
        let decision = decide(Uuid::new_v4(), &candidate, vec![scored]);
        assert_eq!(decision.verdict, MatchingVerdict::Auto);
    }

    #[test]
    fn sequel_with_no_strong_signal_does_not_auto_match() {
        let candidate = sample_candidate("Subnautica: Below Zero", "99999");
        let game = sample_game(2, "Subnautica", Some("12345"));
        let scored = score(&candidate, &game, &["pc".to_string()], &[], &[]);
        let decision = decide(Uuid::new_v4(), &candidate, vec![scored]);
        assert_ne!(decision.verdict, MatchingVerdict::Auto);
    }

    #[test]
    fn slug_sequel_disambiguation_rejects_match() {
        // existing "subnautica" (storeId set), new meta candidate "Subnautica 2"
        let mut candidate = sample_candidate("Subnautica 2", "10419");
        candidate.source = Source::Meta;
        let game = sample_game(1, "Subnautica", Some("264710"));
        let scored = score(&candidate, &game, &["pc".to_string()], &[], &[]);
        assert!(scored.sequel_conflict);
        let decision = decide(Uuid::new_v4(), &candidate, vec![scored]);
        assert_eq!(decision.verdict, MatchingVerdict::Reject);
    }

    #[test]
    fn slug_collision_suffix_without_sequel_token_auto_matches() {
        // existing "stellar-blade" (storeId set), new meta candidate also "Stellar Blade"
        // whose slug collided at creation time and got suffixed "-2".
        let mut candidate = sample_candidate("Stellar Blade", "889922");
        candidate.source = Source::Meta;
        candidate.slug_candidate = "stellar-blade-2".to_string();
        let game = sample_game(1, "Stellar Blade", Some("3489700"));
        let scored = score(&candidate, &game, &["pc".to_string()], &[], &[]);
        assert!(!scored.sequel_conflict);
        let decision = decide(Uuid::new_v4(), &candidate, vec![scored]);
        assert_eq!(decision.verdict, MatchingVerdict::Auto);
    }
}
