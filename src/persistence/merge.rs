//! Operator-invoked merge of two `games` rows the matching engine never
//! got to see side by side — e.g. a Store-only and a Meta-only row that an
//! operator has manually confirmed are the same title after a `pending`
//! review. Not scheduled anywhere in this crate; a caller (the CLI or a
//! future admin endpoint) decides when to invoke it.
//!
//! Grounded on the teacher's `ensure_*` find-or-create transaction shape in
//! `ingest_providers.rs`: one transaction, `FOR UPDATE` on both rows, and
//! the same 23505-tolerant re-linking idiom used by `companies.rs`.

use crate::contracts::Game;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("game {0} does not exist")]
    NotFound(i64),
    #[error("cannot merge a game into itself")]
    SameGame,
    #[error("{0} and {1} both already carry a storeId/metaId for the same source; refusing to merge")]
    IdentifierConflict(i64, i64),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Folds `loser_id` into `keeper_id`: identifiers, parent links and
/// mutable fields the keeper lacks are copied over (same fill-only-if-null
/// semantics as `games::patch`), `game_details`/`game_releases`/
/// `game_company_roles` rows are re-pointed at the keeper (conflicts
/// discarded rather than erroring, since the keeper's own row wins), and
/// the loser row is deleted. Runs in one transaction; either the whole
/// merge lands or nothing does.
pub async fn merge_duplicate_games(
    pool: &PgPool,
    keeper_id: i64,
    loser_id: i64,
) -> Result<Game, MergeError> {
    if keeper_id == loser_id {
        return Err(MergeError::SameGame);
    }

    let mut tx = pool.begin().await?;

    let keeper: Option<Game> = sqlx::query_as("SELECT * FROM games WHERE id = $1 FOR UPDATE")
        .bind(keeper_id)
        .fetch_optional(&mut *tx)
        .await?;
    let loser: Option<Game> = sqlx::query_as("SELECT * FROM games WHERE id = $1 FOR UPDATE")
        .bind(loser_id)
        .fetch_optional(&mut *tx)
        .await?;

    let keeper = keeper.ok_or(MergeError::NotFound(keeper_id))?;
    let loser = loser.ok_or(MergeError::NotFound(loser_id))?;

    if keeper.store_id.is_some() && loser.store_id.is_some() && keeper.store_id != loser.store_id {
        return Err(MergeError::IdentifierConflict(keeper_id, loser_id));
    }
    if keeper.meta_id.is_some() && loser.meta_id.is_some() && keeper.meta_id != loser.meta_id {
        return Err(MergeError::IdentifierConflict(keeper_id, loser_id));
    }

    let store_id = keeper.store_id.clone().or_else(|| loser.store_id.clone());
    let meta_id = keeper.meta_id.clone().or_else(|| loser.meta_id.clone());
    let parent_store_id = keeper.parent_store_id.clone().or_else(|| loser.parent_store_id.clone());
    let parent_meta_id = keeper.parent_meta_id.clone().or_else(|| loser.parent_meta_id.clone());
    let original_name = keeper.original_name.clone().or_else(|| loser.original_name.clone());
    let is_dlc = keeper.is_dlc || loser.is_dlc;
    let game_type = if is_dlc { "dlc" } else { "game" };
    let popularity = keeper.popularity.or(loser.popularity);
    let followers_cache = keeper.followers_cache.or(loser.followers_cache);
    let release_date = keeper.release_date.or(loser.release_date);
    let release_date_raw = keeper.release_date_raw.clone().or_else(|| loser.release_date_raw.clone());

    let merged: Game = sqlx::query_as(
        "UPDATE games
         SET store_id = $1, meta_id = $2, parent_store_id = $3, parent_meta_id = $4,
             original_name = $5, game_type = $6, is_dlc = $7, popularity = $8,
             followers_cache = $9, release_date = $10, release_date_raw = $11,
             updated_at = now()
         WHERE id = $12
         RETURNING *",
    )
    .bind(store_id)
    .bind(meta_id)
    .bind(parent_store_id)
    .bind(parent_meta_id)
    .bind(original_name)
    .bind(game_type)
    .bind(is_dlc)
    .bind(popularity)
    .bind(followers_cache)
    .bind(release_date)
    .bind(release_date_raw)
    .bind(keeper_id)
    .fetch_one(&mut *tx)
    .await?;

    // Re-point child rows; ON CONFLICT DO NOTHING because the keeper may
    // already own an equivalent row (same platform/store pair, or already
    // has its own detail record) in which case the loser's copy is simply
    // dropped rather than overwriting a live row.
    sqlx::query(
        "UPDATE game_releases SET game_id = $1 WHERE game_id = $2
         ON CONFLICT (game_id, platform, store, (COALESCE(store_app_id, ''))) DO NOTHING",
    )
    .bind(keeper_id)
    .bind(loser_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM game_releases WHERE game_id = $1")
        .bind(loser_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM game_details WHERE game_id = $1 AND EXISTS (SELECT 1 FROM game_details WHERE game_id = $2)")
        .bind(loser_id)
        .bind(keeper_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE game_details SET game_id = $1 WHERE game_id = $2")
        .bind(keeper_id)
        .bind(loser_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE game_company_roles SET game_id = $1 WHERE game_id = $2
         ON CONFLICT (game_id, company_id, role) DO NOTHING",
    )
    .bind(keeper_id)
    .bind(loser_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM game_company_roles WHERE game_id = $1")
        .bind(loser_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM games WHERE id = $1")
        .bind(loser_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(merged)
}
