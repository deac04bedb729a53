//! Normalizer: turns a `RawRecord` from either upstream into a canonical
//! `ProcessedGame`. Field names below mirror the shapes `source::store`
//! and `source::meta` hand back (Steam-appdetails-shaped for Store,
//! RAWG-game-detail-shaped for Meta).

pub mod name;
pub mod platform;
pub mod popularity;
pub mod rating;

use crate::contracts::{
    CompanyRole, ExternalId, GameType, NormalizedCompany, ProcessedDetail, ProcessedGame,
    ProcessedRelease, RawRecord, ReleaseStatus, Source, StoreVendor,
};
use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

/// Fold a raw platform label to the spec's four-way family vocabulary,
/// defaulting unrecognized/console-generation labels to `pc` only when the
/// raw list was empty; callers otherwise drop unsupported platforms.
fn platform_family_str(raw: &str) -> Option<&'static str> {
    match platform::PlatformKey::new(raw).family() {
        platform::PlatformFamily::Pc => Some("pc"),
        platform::PlatformFamily::PlayStation => Some("playstation"),
        platform::PlatformFamily::Xbox => Some("xbox"),
        platform::PlatformFamily::Nintendo => Some("nintendo"),
        platform::PlatformFamily::Other => None,
    }
}

fn fold_platforms(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in raw {
        if let Some(family) = platform_family_str(p) {
            if !out.iter().any(|f| f == family) {
                out.push(family.to_string());
            }
        }
    }
    out
}

#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("missing required field: {0}")]
    MissingName(&'static str),
    #[error("unparseable release date: {0}")]
    BadDate(String),
    #[error("record is an excluded product type: {0}")]
    ExcludedProduct(String),
}

#[derive(Debug, Deserialize, Default)]
struct StorePayload {
    name: Option<String>,
    #[serde(default)]
    is_dlc: bool,
    #[serde(default)]
    release_date: Option<StoreReleaseDate>,
    #[serde(default)]
    platforms: Vec<String>,
    #[serde(default)]
    developers: Vec<String>,
    #[serde(default)]
    publishers: Vec<String>,
    #[serde(default)]
    genres: Vec<StoreGenre>,
    metacritic: Option<StoreMetacritic>,
    recommendations: Option<StoreRecommendations>,
    short_description: Option<String>,
    header_image: Option<String>,
    website: Option<String>,
    #[serde(default)]
    screenshots: Vec<StoreScreenshot>,
    #[serde(default)]
    movies: Vec<StoreMovie>,
    #[serde(default)]
    supported_languages: Option<String>,
    price_overview: Option<StorePriceOverview>,
    #[serde(default)]
    is_free: bool,
    fullgame: Option<StoreFullGame>,
}

#[derive(Debug, Deserialize)]
struct StoreReleaseDate {
    date: Option<String>,
    #[serde(default)]
    coming_soon: bool,
}

/// Present on DLC app-details responses; `appid` is the base game's Store id.
#[derive(Debug, Deserialize)]
struct StoreFullGame {
    appid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoreGenre {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoreMetacritic {
    score: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StoreRecommendations {
    total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StoreScreenshot {
    path_full: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoreMovie {
    mp4: Option<StoreMovieQuality>,
}

#[derive(Debug, Deserialize)]
struct StoreMovieQuality {
    max: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StorePriceOverview {
    #[serde(rename = "final")]
    final_cents: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct MetaPayload {
    name: Option<String>,
    name_original: Option<String>,
    released: Option<String>,
    #[serde(default)]
    tba: bool,
    #[serde(default)]
    platforms: Vec<MetaPlatformEntry>,
    #[serde(default)]
    developers: Vec<MetaIdName>,
    #[serde(default)]
    publishers: Vec<MetaIdName>,
    #[serde(default)]
    genres: Vec<MetaIdName>,
    #[serde(default)]
    tags: Vec<MetaIdName>,
    metacritic: Option<i64>,
    rating: Option<f64>,
    ratings_count: Option<u64>,
    added: Option<u64>,
    background_image: Option<String>,
    description_raw: Option<String>,
    website: Option<String>,
    #[serde(default)]
    short_screenshots: Vec<MetaScreenshot>,
    clip: Option<MetaClip>,
}

#[derive(Debug, Deserialize)]
struct MetaPlatformEntry {
    platform: MetaIdName,
}

#[derive(Debug, Deserialize)]
struct MetaIdName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MetaScreenshot {
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetaClip {
    clip: Option<String>,
}

pub fn normalize(raw: &RawRecord) -> Result<ProcessedGame, NormalizationError> {
    match raw.source {
        Source::Store => normalize_store(raw),
        Source::Meta => normalize_meta(raw),
    }
}

fn normalize_store(raw: &RawRecord) -> Result<ProcessedGame, NormalizationError> {
    let payload: StorePayload =
        serde_json::from_value(raw.payload.clone()).unwrap_or_default();
    let name = payload
        .name
        .clone()
        .ok_or(NormalizationError::MissingName("name"))?;
    if name::is_excluded_product(&name) {
        return Err(NormalizationError::ExcludedProduct(name));
    }

    let release_date = payload
        .release_date
        .as_ref()
        .and_then(|d| d.date.as_deref())
        .and_then(parse_flexible_date);
    let release_date_raw = payload.release_date.as_ref().and_then(|d| d.date.clone());
    let coming_soon = payload.release_date.as_ref().is_some_and(|d| d.coming_soon);
    let today = chrono::Utc::now().date_naive();
    let release_status = ReleaseStatus::from_date(release_date, today);

    let companies = build_companies(&payload.developers, &payload.publishers);
    let metacritic_score = payload.metacritic.as_ref().and_then(|m| m.score);
    // Store has no native user-rating field; reuse the RAWG metacritic alias
    // (same 0-100 -> 0-5 scaling RatingMapper applies to Meta) as a weak
    // popularity proxy instead of hand-rolling the division here.
    let rating_proxy = metacritic_score.and_then(|score| {
        rating::RatingMapper::with_defaults()
            .map("rawg", &serde_json::json!({"metacritic": score}))
            .map(|r| r as f64)
    });
    let popularity = popularity::popularity(
        None,
        payload
            .recommendations
            .as_ref()
            .and_then(|r| r.total)
            .and(rating_proxy),
        payload
            .recommendations
            .as_ref()
            .and_then(|r| r.total)
            .map(|t| t.max(0) as u64),
    );

    let platforms = fold_platforms(&payload.platforms);
    let platform_label = platforms.first().cloned().unwrap_or_else(|| "pc".to_string());
    let is_dlc = payload.is_dlc || payload.fullgame.is_some();
    let parent_store_id = payload.fullgame.as_ref().and_then(|f| f.appid.clone());
    let slug_candidate = name::slug_candidate(&name);
    let genres: Vec<String> = payload
        .genres
        .iter()
        .filter_map(|g| g.description.clone())
        .collect();
    let followers = payload
        .recommendations
        .as_ref()
        .and_then(|r| r.total)
        .map(|t| t.max(0));

    Ok(ProcessedGame {
        source: Source::Store,
        external_id: raw.external_id.clone(),
        original_name: None,
        slug_candidate: slug_candidate.clone(),
        original_slug_candidate: slug_candidate,
        name,
        game_type: if is_dlc { GameType::Dlc } else { GameType::Game },
        platforms: if platforms.is_empty() {
            vec!["pc".to_string()]
        } else {
            platforms
        },
        release_date,
        release_date_raw,
        release_status,
        coming_soon,
        companies,
        popularity,
        followers,
        genres: genres.clone(),
        parent_store_id,
        parent_meta_id: None,
        detail: Some(ProcessedDetail {
            synopsis: payload.short_description,
            cover_url: payload.header_image.clone(),
            header_image: payload.header_image,
            website: payload.website,
            video_url: payload.movies.first().and_then(|m| m.mp4.as_ref()).and_then(|q| q.max.clone()),
            screenshots: payload
                .screenshots
                .into_iter()
                .filter_map(|s| s.path_full)
                .collect(),
            genres,
            tags: Vec::new(),
            support_languages: parse_store_languages(payload.supported_languages.as_deref()),
            metacritic: metacritic_score.map(|s| s as i32),
            opencritic: None,
            reviews_summary: None,
        }),
        release: ProcessedRelease {
            platform: platform_label.clone(),
            store: StoreVendor::for_platform(Source::Store, &platform_label),
            store_app_id: Some(raw.external_id.0.clone()),
            release_date,
            release_status,
            price_cents: payload.price_overview.and_then(|p| p.final_cents),
            is_free: payload.is_free,
            followers,
            data_source: Source::Store,
        },
    })
}

fn normalize_meta(raw: &RawRecord) -> Result<ProcessedGame, NormalizationError> {
    let payload: MetaPayload = serde_json::from_value(raw.payload.clone()).unwrap_or_default();
    let name = payload
        .name
        .clone()
        .ok_or(NormalizationError::MissingName("name"))?;
    if name::is_excluded_product(&name) {
        return Err(NormalizationError::ExcludedProduct(name));
    }

    let release_date = payload.released.as_deref().and_then(parse_flexible_date);
    let today = chrono::Utc::now().date_naive();
    let release_status = if payload.tba {
        ReleaseStatus::Unknown
    } else {
        ReleaseStatus::from_date(release_date, today)
    };

    let developers: Vec<String> = payload.developers.iter().map(|d| d.name.clone()).collect();
    let publishers: Vec<String> = payload.publishers.iter().map(|p| p.name.clone()).collect();
    let companies = build_companies(&developers, &publishers);

    let popularity = popularity::popularity(
        payload.added,
        payload.rating,
        payload.ratings_count,
    );

    let raw_platforms: Vec<String> = payload
        .platforms
        .iter()
        .map(|p| p.platform.name.clone())
        .collect();
    let platforms = fold_platforms(&raw_platforms);
    let platform_label = platforms.first().cloned().unwrap_or_else(|| "pc".to_string());
    let original_name = payload
        .name_original
        .clone()
        .filter(|n| !n.is_empty() && n != &name);
    let original_slug_candidate = original_name
        .as_deref()
        .map(name::slug_candidate)
        .unwrap_or_else(|| name::slug_candidate(&name));
    let genres: Vec<String> = payload.genres.iter().map(|g| g.name.clone()).collect();
    let followers = payload.added.map(|a| a as i64);

    Ok(ProcessedGame {
        source: Source::Meta,
        external_id: raw.external_id.clone(),
        slug_candidate: name::slug_candidate(&name),
        original_slug_candidate,
        original_name,
        name,
        // Meta has no DLC signal of its own; default to Game. Persistence's
        // PATCH semantics never downgrade a DLC classification set by Store.
        game_type: GameType::Game,
        platforms: if platforms.is_empty() {
            vec!["pc".to_string()]
        } else {
            platforms
        },
        release_date,
        release_date_raw: payload.released.clone(),
        release_status,
        coming_soon: payload.tba,
        companies,
        popularity,
        followers,
        genres: genres.clone(),
        parent_store_id: None,
        parent_meta_id: None,
        detail: Some(ProcessedDetail {
            synopsis: payload.description_raw,
            cover_url: payload.background_image.clone(),
            header_image: payload.background_image,
            website: payload.website,
            video_url: payload.clip.and_then(|c| c.clip),
            screenshots: payload
                .short_screenshots
                .into_iter()
                .filter_map(|s| s.image)
                .collect(),
            genres,
            tags: payload.tags.iter().map(|t| t.name.clone()).collect(),
            support_languages: Vec::new(),
            metacritic: payload.metacritic.map(|m| m as i32),
            opencritic: None,
            reviews_summary: None,
        }),
        release: ProcessedRelease {
            platform: platform_label.clone(),
            store: StoreVendor::for_platform(Source::Meta, &platform_label),
            store_app_id: Some(raw.external_id.0.clone()),
            release_date,
            release_status,
            price_cents: None,
            is_free: false,
            followers,
            data_source: Source::Meta,
        },
    })
}

/// Store's `supported_languages` is a comma-separated HTML fragment
/// (`"English<strong>*</strong>, French, Italian"`); strip tags/footnote
/// markers and split on commas.
fn parse_store_languages(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let without_tags: String = {
        let mut out = String::new();
        let mut in_tag = false;
        for c in raw.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => out.push(c),
                _ => {}
            }
        }
        out
    };
    without_tags
        .split(',')
        .map(|s| s.trim().trim_end_matches('*').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn build_companies(developers: &[String], publishers: &[String]) -> Vec<NormalizedCompany> {
    let mut out = Vec::new();
    for d in developers {
        out.push(NormalizedCompany {
            name: d.clone(),
            slug_candidate: name::slug_candidate(d),
            role: CompanyRole::Developer,
        });
    }
    for p in publishers {
        out.push(NormalizedCompany {
            name: p.clone(),
            slug_candidate: name::slug_candidate(p),
            role: CompanyRole::Publisher,
        });
    }
    out
}

fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    for fmt in ["%Y-%m-%d", "%b %d, %Y", "%d %b, %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn raw(source: Source, payload: serde_json::Value) -> RawRecord {
        RawRecord {
            source,
            external_id: ExternalId("123".into()),
            fetched_at: Utc::now(),
            payload,
        }
    }

    #[test]
    fn store_dlc_flag_sets_game_type() {
        let record = raw(
            Source::Store,
            json!({"name": "Cool DLC", "is_dlc": true, "platforms": ["pc"]}),
        );
        let processed = normalize(&record).unwrap();
        assert_eq!(processed.game_type, GameType::Dlc);
    }

    #[test]
    fn excluded_product_is_rejected() {
        let record = raw(Source::Store, json!({"name": "Game Original Soundtrack"}));
        assert!(matches!(
            normalize(&record),
            Err(NormalizationError::ExcludedProduct(_))
        ));
    }

    #[test]
    fn missing_name_errors() {
        let record = raw(Source::Meta, json!({}));
        assert!(matches!(
            normalize(&record),
            Err(NormalizationError::MissingName(_))
        ));
    }

    #[test]
    fn meta_record_defaults_to_game_type() {
        let record = raw(Source::Meta, json!({"name": "Some Game"}));
        let processed = normalize(&record).unwrap();
        assert_eq!(processed.game_type, GameType::Game);
    }

    #[test]
    fn store_price_and_free_flag_carry_into_release() {
        let record = raw(
            Source::Store,
            json!({
                "name": "Priced Game",
                "platforms": ["pc"],
                "is_free": false,
                "price_overview": {"final": 1999},
            }),
        );
        let processed = normalize(&record).unwrap();
        assert_eq!(processed.release.price_cents, Some(1999));
        assert!(!processed.release.is_free);
    }

    #[test]
    fn store_supported_languages_strip_html_and_footnotes() {
        let languages = parse_store_languages(Some("English<strong>*</strong>, French, Italian"));
        assert_eq!(languages, vec!["English", "French", "Italian"]);
    }

    #[test]
    fn meta_tags_and_screenshots_populate_detail() {
        let record = raw(
            Source::Meta,
            json!({
                "name": "Tagged Game",
                "tags": [{"name": "Indie"}],
                "short_screenshots": [{"image": "https://example.com/a.png"}],
            }),
        );
        let processed = normalize(&record).unwrap();
        let detail = processed.detail.unwrap();
        assert_eq!(detail.tags, vec!["Indie".to_string()]);
        assert_eq!(detail.screenshots, vec!["https://example.com/a.png".to_string()]);
    }
}
