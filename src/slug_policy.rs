//! Slug collision resolution: turn a normalized slug candidate into a
//! unique `games.slug` value.
//!
//! Generalizes the collision-suffix idea in
//! `database_ops::ingest_providers::normalize_source_slug_value` (base
//! value plus a disambiguating suffix, length-clamped so the suffix always
//! fits) but swaps the teacher's SHA1-checksum suffix for the plain
//! `-2`, `-3`, ... numeric suffix this pipeline's slugs use, capped at a
//! bounded number of attempts with a timestamp fallback.

const MAX_SLUG_LEN: usize = 120;
const MAX_NUMERIC_ATTEMPTS: u32 = 9_999;

#[async_trait::async_trait]
pub trait SlugExists {
    async fn slug_taken(&self, candidate: &str) -> anyhow::Result<bool>;
}

/// Resolve `base` into a slug unique per `exists`, trying `base`, then
/// `base-2`, `base-3`, ... When the suffix can no longer fit within
/// `MAX_SLUG_LEN`, the base is truncated first to make room.
pub async fn resolve_unique_slug(
    base: &str,
    exists: &impl SlugExists,
) -> anyhow::Result<String> {
    let base = clamp_chars(base, MAX_SLUG_LEN);
    if !exists.slug_taken(&base).await? {
        return Ok(base);
    }

    for n in 2..=MAX_NUMERIC_ATTEMPTS {
        let suffix = format!("-{n}");
        let candidate = format!("{}{}", clamp_chars(&base, MAX_SLUG_LEN - suffix.len()), suffix);
        if !exists.slug_taken(&candidate).await? {
            return Ok(candidate);
        }
    }

    // Exhausted the numeric namespace for this base; fall back to an
    // epoch-millisecond suffix, which is effectively guaranteed unique.
    let epoch_ms = chrono::Utc::now().timestamp_millis();
    let suffix = format!("-{epoch_ms}");
    Ok(format!(
        "{}{}",
        clamp_chars(&base, MAX_SLUG_LEN.saturating_sub(suffix.len())),
        suffix
    ))
}

fn clamp_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        input.to_string()
    } else {
        input.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeRegistry(Mutex<HashSet<String>>);

    #[async_trait::async_trait]
    impl SlugExists for FakeRegistry {
        async fn slug_taken(&self, candidate: &str) -> anyhow::Result<bool> {
            Ok(self.0.lock().unwrap().contains(candidate))
        }
    }

    #[tokio::test]
    async fn returns_base_when_free() {
        let registry = FakeRegistry(Mutex::new(HashSet::new()));
        let slug = resolve_unique_slug("stellar-blade", &registry).await.unwrap();
        assert_eq!(slug, "stellar-blade");
    }

    #[tokio::test]
    async fn appends_numeric_suffix_on_collision() {
        let mut taken = HashSet::new();
        taken.insert("stellar-blade".to_string());
        taken.insert("stellar-blade-2".to_string());
        let registry = FakeRegistry(Mutex::new(taken));
        let slug = resolve_unique_slug("stellar-blade", &registry).await.unwrap();
        assert_eq!(slug, "stellar-blade-3");
    }
}
