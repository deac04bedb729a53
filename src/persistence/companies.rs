//! Company find-or-create plus `game_company_roles` linking. Grounded on
//! the teacher's slug-lookup-then-insert-with-23505-retry idiom in
//! `ingest_providers.rs` (e.g. `ensure_video_game_title_for_source_item`'s
//! constraint-specific retry).

use crate::contracts::{CompanyRoleKind, NormalizedCompany};
use crate::persistence::failure::is_unique_violation;
use crate::slug_policy::{resolve_unique_slug, SlugExists};
use sqlx::{PgPool, Postgres, Row, Transaction};

struct TxSlugCheck<'t, 'c> {
    tx: std::cell::RefCell<&'t mut Transaction<'c, Postgres>>,
}

#[async_trait::async_trait]
impl<'t, 'c> SlugExists for TxSlugCheck<'t, 'c> {
    async fn slug_taken(&self, candidate: &str) -> anyhow::Result<bool> {
        let mut tx = self.tx.borrow_mut();
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM companies WHERE slug = $1)")
                .bind(candidate)
                .fetch_one(&mut **tx)
                .await?;
        Ok(exists)
    }
}

/// Find a company by slug or case-insensitive name; create it (resolving
/// slug collisions) if absent. Retries once on a 23505 race against a
/// concurrent worker creating the same company.
pub async fn ensure_company(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    slug_candidate: &str,
) -> Result<i64, sqlx::Error> {
    if let Some(id) = find_company(tx, name, slug_candidate).await? {
        return Ok(id);
    }

    let slug = {
        let checker = TxSlugCheck {
            tx: std::cell::RefCell::new(&mut *tx),
        };
        resolve_unique_slug(slug_candidate, &checker)
            .await
            .unwrap_or_else(|_| slug_candidate.to_string())
    };

    match sqlx::query("INSERT INTO companies (slug, name) VALUES ($1, $2) RETURNING id")
        .bind(&slug)
        .bind(name)
        .fetch_one(&mut **tx)
        .await
    {
        Ok(row) => Ok(row.get::<i64, _>("id")),
        Err(e) if is_unique_violation(&e) => {
            find_company(tx, name, slug_candidate)
                .await?
                .ok_or(e)
        }
        Err(e) => Err(e),
    }
}

async fn find_company(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    slug_candidate: &str,
) -> Result<Option<i64>, sqlx::Error> {
    if let Some(row) = sqlx::query("SELECT id FROM companies WHERE slug = $1")
        .bind(slug_candidate)
        .fetch_optional(&mut **tx)
        .await?
    {
        return Ok(Some(row.get("id")));
    }
    sqlx::query("SELECT id FROM companies WHERE lower(name) = lower($1) LIMIT 1")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
        .map(|row| row.map(|r| r.get("id")))
}

pub async fn link_role(
    tx: &mut Transaction<'_, Postgres>,
    game_id: i64,
    company_id: i64,
    role: CompanyRoleKind,
) -> Result<(), sqlx::Error> {
    let role_str = match role {
        CompanyRoleKind::Developer => "developer",
        CompanyRoleKind::Publisher => "publisher",
    };
    sqlx::query(
        "INSERT INTO game_company_roles (game_id, company_id, role)
         VALUES ($1, $2, $3)
         ON CONFLICT (game_id, company_id, role) DO NOTHING",
    )
    .bind(game_id)
    .bind(company_id)
    .bind(role_str)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Company slugs already linked to a game, used by the matching engine's
/// company-overlap signal.
pub async fn slugs_for_game(pool: &PgPool, game_id: i64) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT c.slug FROM companies c
         JOIN game_company_roles r ON r.company_id = c.id
         WHERE r.game_id = $1",
    )
    .bind(game_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(slug,)| slug).collect())
}

pub async fn ensure_companies_for_candidate(
    tx: &mut Transaction<'_, Postgres>,
    game_id: i64,
    companies: &[NormalizedCompany],
) -> Result<(), sqlx::Error> {
    for company in companies {
        let company_id = ensure_company(tx, &company.name, &company.slug_candidate).await?;
        let role = match company.role {
            crate::contracts::CompanyRole::Developer => CompanyRoleKind::Developer,
            crate::contracts::CompanyRole::Publisher => CompanyRoleKind::Publisher,
        };
        link_role(tx, game_id, company_id, role).await?;
    }
    Ok(())
}
