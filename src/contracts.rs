//! Shared data-transfer types passed between pipeline stages.
//!
//! These are plain structs: no I/O, no business rules beyond simple
//! constructors. Upstream clients, the normalizer, the matcher, and the
//! persistence layer all exchange data through the types in this module.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which upstream a record (or a decision about a record) originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Store,
    Meta,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Store => "store",
            Source::Meta => "meta",
        }
    }
}

/// Concrete storefront a `GameRelease` row was observed on. Distinct from
/// `Source` (which upstream API we scraped): `Source::Meta` reports
/// releases across every vendor's storefront, while `Source::Store` only
/// ever reports Steam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreVendor {
    Steam,
    Psn,
    XboxStore,
    NintendoEshop,
    Other,
}

impl StoreVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreVendor::Steam => "steam",
            StoreVendor::Psn => "psn",
            StoreVendor::XboxStore => "xbox-store",
            StoreVendor::NintendoEshop => "nintendo-eshop",
            StoreVendor::Other => "other",
        }
    }

    /// Store's own catalog is exclusively Steam; Meta's per-platform
    /// release info picks the vendor that matches the platform family.
    pub fn for_platform(source: Source, platform_family: &str) -> Self {
        if matches!(source, Source::Store) {
            return StoreVendor::Steam;
        }
        match platform_family {
            "playstation" => StoreVendor::Psn,
            "xbox" => StoreVendor::XboxStore,
            "nintendo" => StoreVendor::NintendoEshop,
            _ => StoreVendor::Other,
        }
    }
}

/// Opaque upstream identifier, always treated as an opaque string internally
/// even when the upstream uses numeric ids (Store app ids are numeric but we
/// never do arithmetic on them).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalId(pub String);

impl From<&str> for ExternalId {
    fn from(value: &str) -> Self {
        ExternalId(value.to_string())
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unmapped payload straight off the wire, tagged with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: Source,
    pub external_id: ExternalId,
    pub fetched_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    Game,
    Dlc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Released,
    Upcoming,
    Unknown,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Released => "released",
            ReleaseStatus::Upcoming => "upcoming",
            ReleaseStatus::Unknown => "unknown",
        }
    }

    /// Derive from a release date relative to "now" — released if the date
    /// has passed, upcoming if it is in the future, unknown if absent.
    pub fn from_date(release_date: Option<NaiveDate>, today: NaiveDate) -> Self {
        match release_date {
            Some(d) if d <= today => ReleaseStatus::Released,
            Some(_) => ReleaseStatus::Upcoming,
            None => ReleaseStatus::Unknown,
        }
    }
}

/// Output of the Normalizer: one canonical candidate record ready for
/// matching and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedGame {
    pub source: Source,
    pub external_id: ExternalId,
    pub name: String,
    /// Untranslated/original-language title, when the upstream exposes one
    /// distinct from the (possibly localized) `name`.
    pub original_name: Option<String>,
    pub slug_candidate: String,
    pub original_slug_candidate: String,
    pub game_type: GameType,
    /// Platform families (`pc`, `playstation`, `xbox`, `nintendo`) this
    /// record confirms a release on.
    pub platforms: Vec<String>,
    pub release_date: Option<NaiveDate>,
    pub release_date_raw: Option<String>,
    pub release_status: ReleaseStatus,
    pub coming_soon: bool,
    pub companies: Vec<NormalizedCompany>,
    pub popularity: Option<f64>,
    pub followers: Option<i64>,
    pub genres: Vec<String>,
    pub parent_store_id: Option<String>,
    pub parent_meta_id: Option<String>,
    pub detail: Option<ProcessedDetail>,
    pub release: ProcessedRelease,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedDetail {
    pub synopsis: Option<String>,
    pub cover_url: Option<String>,
    pub header_image: Option<String>,
    pub website: Option<String>,
    pub video_url: Option<String>,
    pub screenshots: Vec<String>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub support_languages: Vec<String>,
    pub metacritic: Option<i32>,
    pub opencritic: Option<i32>,
    pub reviews_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRelease {
    /// Platform family (`pc`, `playstation`, `xbox`, `nintendo`).
    pub platform: String,
    pub store: StoreVendor,
    pub store_app_id: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub release_status: ReleaseStatus,
    pub price_cents: Option<i32>,
    pub is_free: bool,
    pub followers: Option<i64>,
    /// Which upstream populated this release row (`store` or `meta`).
    pub data_source: Source,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedCompany {
    pub name: String,
    pub slug_candidate: String,
    pub role: CompanyRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyRole {
    Developer,
    Publisher,
}

/// Persisted `games` row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Game {
    pub id: i64,
    pub slug: String,
    pub original_slug: String,
    pub name: String,
    pub original_name: Option<String>,
    pub game_type: String,
    pub is_dlc: bool,
    pub store_id: Option<String>,
    pub meta_id: Option<String>,
    pub parent_store_id: Option<String>,
    pub parent_meta_id: Option<String>,
    pub popularity: Option<f64>,
    pub followers_cache: Option<i64>,
    pub release_date: Option<NaiveDate>,
    pub release_date_raw: Option<String>,
    pub release_status: String,
    pub coming_soon: bool,
    pub steam_last_refresh_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameDetail {
    pub game_id: i64,
    pub synopsis: Option<String>,
    pub cover_url: Option<String>,
    pub header_image: Option<String>,
    pub website: Option<String>,
    pub video_url: Option<String>,
    pub screenshots: serde_json::Value,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub support_languages: Vec<String>,
    pub metacritic: Option<i32>,
    pub opencritic: Option<i32>,
    pub reviews_summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameRelease {
    pub id: i64,
    pub game_id: i64,
    pub platform: String,
    pub store: String,
    pub store_app_id: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub release_status: String,
    pub price_cents: Option<i32>,
    pub is_free: bool,
    pub followers: Option<i64>,
    pub data_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CompanyRoleKind {
    Developer,
    Publisher,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameCompanyRole {
    pub game_id: i64,
    pub company_id: i64,
    pub role: CompanyRoleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Preparing,
    Fetching,
    Persisting,
    Finalizing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub command: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items_seen: i64,
    pub items_saved: i64,
    pub items_failed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineItemOutcome {
    Saved,
    Pending,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineItem {
    pub run_id: Uuid,
    pub source: Source,
    pub external_id: ExternalId,
    pub outcome: PipelineItemOutcome,
    pub game_id: Option<i64>,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingVerdict {
    Auto,
    Pending,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingDecision {
    pub run_id: Uuid,
    pub candidate_game_id: Option<i64>,
    pub source: Source,
    pub external_id: ExternalId,
    pub name_score: f64,
    pub date_score: f64,
    pub platform_overlap: f64,
    pub company_overlap: f64,
    pub genre_overlap: f64,
    pub total_score: f64,
    pub strong_signals: u8,
    pub verdict: MatchingVerdict,
    pub reasons: Vec<String>,
    pub decided_at: DateTime<Utc>,
}
