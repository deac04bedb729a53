//! Persistent set of Store external ids known to be excluded products
//! (soundtracks, SDKs, ...), so `CandidateSelector::NewStoreIds` doesn't
//! keep re-fetching and re-rejecting the same ids forever.
//!
//! Table name (`steam_exclusion_bitmap`) is kept from the original
//! PS-Store-specific naming even though this pipeline is source-agnostic;
//! renaming it is a pure cosmetic migration with no behavioral upside, so
//! it's left as-is (noted in DESIGN.md).

use sqlx::PgPool;
use std::collections::HashSet;

pub struct ExclusionBitmap {
    ids: HashSet<String>,
}

impl ExclusionBitmap {
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT external_id FROM steam_exclusion_bitmap")
                .fetch_all(pool)
                .await?;
        Ok(Self {
            ids: rows.into_iter().map(|(id,)| id).collect(),
        })
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.ids.contains(external_id)
    }

    pub async fn mark_excluded(&mut self, pool: &PgPool, external_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO steam_exclusion_bitmap (external_id, excluded_at) VALUES ($1, now())
             ON CONFLICT (external_id) DO NOTHING",
        )
        .bind(external_id)
        .execute(pool)
        .await?;
        self.ids.insert(external_id.to_string());
        Ok(())
    }

    pub fn subtract(&self, ids: Vec<String>) -> Vec<String> {
        ids.into_iter().filter(|id| !self.contains(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_filters_known_exclusions() {
        let bitmap = ExclusionBitmap {
            ids: ["1", "2"].into_iter().map(String::from).collect(),
        };
        let remaining = bitmap.subtract(vec!["1".into(), "3".into()]);
        assert_eq!(remaining, vec!["3".to_string()]);
    }
}
