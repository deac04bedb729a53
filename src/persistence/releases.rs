//! `game_releases` upsert. Unique on `(game_id, platform, store,
//! coalesce(store_app_id, ''))`; releases are update-or-insert only, this
//! pipeline never deletes a previously observed release.

use crate::contracts::ProcessedGame;
use sqlx::{PgPool, Postgres, Row, Transaction};

pub async fn upsert(
    tx: &mut Transaction<'_, Postgres>,
    game_id: i64,
    candidate: &ProcessedGame,
) -> Result<(), sqlx::Error> {
    let release = &candidate.release;
    sqlx::query(
        "INSERT INTO game_releases (
            game_id, platform, store, store_app_id, release_date,
            release_status, price_cents, is_free, followers, data_source
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (game_id, platform, store, (COALESCE(store_app_id, '')))
         DO UPDATE SET
            release_date = COALESCE(EXCLUDED.release_date, game_releases.release_date),
            release_status = EXCLUDED.release_status,
            price_cents = COALESCE(EXCLUDED.price_cents, game_releases.price_cents),
            is_free = EXCLUDED.is_free OR game_releases.is_free,
            followers = COALESCE(EXCLUDED.followers, game_releases.followers),
            data_source = EXCLUDED.data_source",
    )
    .bind(game_id)
    .bind(&release.platform)
    .bind(release.store.as_str())
    // (platform is already one of the family keys the CHECK constraint
    // expects: pc/playstation/xbox/nintendo)
    .bind(&release.store_app_id)
    .bind(release.release_date)
    .bind(release.release_status.as_str())
    .bind(release.price_cents)
    .bind(release.is_free)
    .bind(release.followers)
    .bind(release.data_source.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Platform families already recorded for a game, used by the matching
/// engine's PC-alignment bonus. Mirrors
/// `persistence::companies::slugs_for_game`.
pub async fn platforms_for_game(pool: &PgPool, game_id: i64) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query("SELECT DISTINCT platform FROM game_releases WHERE game_id = $1")
        .bind(game_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.get("platform")).collect())
}
