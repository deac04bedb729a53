//! `games` row find/create/patch helpers, running inside the caller's
//! transaction so a find-or-create never races a concurrent worker.

use crate::contracts::{Game, GameType, ProcessedGame, Source};
use sqlx::{Postgres, Transaction};

pub async fn find_for_candidate(
    tx: &mut Transaction<'_, Postgres>,
    candidate: &ProcessedGame,
) -> Result<Option<Game>, sqlx::Error> {
    let row = match candidate.source {
        Source::Store => {
            sqlx::query_as::<_, Game>(
                "SELECT * FROM games WHERE store_id = $1 FOR UPDATE",
            )
            .bind(&candidate.external_id.0)
            .fetch_optional(&mut **tx)
            .await?
        }
        Source::Meta => {
            sqlx::query_as::<_, Game>(
                "SELECT * FROM games WHERE meta_id = $1 FOR UPDATE",
            )
            .bind(&candidate.external_id.0)
            .fetch_optional(&mut **tx)
            .await?
        }
    };
    if row.is_some() {
        return Ok(row);
    }

    sqlx::query_as::<_, Game>(
        "SELECT * FROM games WHERE lower(slug) = lower($1) OR lower(original_slug) = lower($1) FOR UPDATE",
    )
    .bind(&candidate.slug_candidate)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    slug: &str,
    original_slug: &str,
    candidate: &ProcessedGame,
) -> Result<Game, sqlx::Error> {
    let game_type = match candidate.game_type {
        GameType::Game => "game",
        GameType::Dlc => "dlc",
    };
    let (store_id, meta_id) = match candidate.source {
        Source::Store => (Some(candidate.external_id.0.as_str()), None),
        Source::Meta => (None, Some(candidate.external_id.0.as_str())),
    };

    sqlx::query_as::<_, Game>(
        "INSERT INTO games (
            slug, original_slug, name, original_name, game_type, is_dlc,
            store_id, meta_id, parent_store_id, parent_meta_id,
            popularity, followers_cache, release_date, release_date_raw,
            release_status, coming_soon, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, now(), now())
         RETURNING *",
    )
    .bind(slug)
    .bind(original_slug)
    .bind(&candidate.name)
    .bind(&candidate.original_name)
    .bind(game_type)
    .bind(matches!(candidate.game_type, GameType::Dlc))
    .bind(store_id)
    .bind(meta_id)
    .bind(&candidate.parent_store_id)
    .bind(&candidate.parent_meta_id)
    .bind(candidate.popularity)
    .bind(candidate.followers)
    .bind(candidate.release_date)
    .bind(&candidate.release_date_raw)
    .bind(candidate.release_status.as_str())
    .bind(candidate.coming_soon)
    .fetch_one(&mut **tx)
    .await
}

/// PATCH semantics (spec §4.6): mutable fields (name, popularity, release
/// metadata, `coming_soon`, `followers_cache`) always overwrite;
/// identifier fields (`store_id`/`meta_id`/parent external ids) only fill
/// when currently null; `is_dlc` only ever moves false -> true, never the
/// reverse (Open Question decision recorded in DESIGN.md: no
/// reclassify-down path).
pub async fn patch(
    tx: &mut Transaction<'_, Postgres>,
    existing: &Game,
    candidate: &ProcessedGame,
) -> Result<Game, sqlx::Error> {
    let (store_id, meta_id) = match candidate.source {
        Source::Store => (
            existing.store_id.clone().or(Some(candidate.external_id.0.clone())),
            existing.meta_id.clone(),
        ),
        Source::Meta => (
            existing.store_id.clone(),
            existing.meta_id.clone().or(Some(candidate.external_id.0.clone())),
        ),
    };
    let parent_store_id = existing.parent_store_id.clone().or_else(|| candidate.parent_store_id.clone());
    let parent_meta_id = existing.parent_meta_id.clone().or_else(|| candidate.parent_meta_id.clone());
    let is_dlc = existing.is_dlc || matches!(candidate.game_type, GameType::Dlc);
    let game_type = if is_dlc { "dlc" } else { "game" };
    let popularity = candidate.popularity.or(existing.popularity);
    let followers_cache = candidate.followers.or(existing.followers_cache);
    let release_date = candidate.release_date.or(existing.release_date);
    let release_date_raw = candidate
        .release_date_raw
        .clone()
        .or_else(|| existing.release_date_raw.clone());
    let original_name = candidate
        .original_name
        .clone()
        .or_else(|| existing.original_name.clone());

    sqlx::query_as::<_, Game>(
        "UPDATE games
         SET name = $1, original_name = $2, game_type = $3, is_dlc = $4,
             store_id = $5, meta_id = $6, parent_store_id = $7, parent_meta_id = $8,
             popularity = $9, followers_cache = $10, release_date = $11,
             release_date_raw = $12, release_status = $13, coming_soon = $14,
             updated_at = now()
         WHERE id = $15
         RETURNING *",
    )
    .bind(&candidate.name)
    .bind(original_name)
    .bind(game_type)
    .bind(is_dlc)
    .bind(store_id)
    .bind(meta_id)
    .bind(parent_store_id)
    .bind(parent_meta_id)
    .bind(popularity)
    .bind(followers_cache)
    .bind(release_date)
    .bind(release_date_raw)
    .bind(candidate.release_status.as_str())
    .bind(candidate.coming_soon)
    .bind(existing.id)
    .fetch_one(&mut **tx)
    .await
}
