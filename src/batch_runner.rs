//! Fetch -> normalize -> match -> save loop with a bounded worker pool.
//!
//! Generalizes the `Semaphore` + `FuturesUnordered` concurrent-fetch idiom
//! from the teacher's `psstore_seed_pipeline` (one inline loop per PS
//! Store category/page) into a reusable runner parameterized over the
//! command surface in `command.rs`. Targets are walked in `chunks(...,
//! fetchSize)` batches, each fetched concurrently and then saved in
//! `chunks(..., saveSize)` sub-batches through
//! `PersistenceOrchestrator::save_many` (spec §4.8), so a slow/failing
//! save batch never blocks the next fetch batch from starting.
//! Cancellation follows `main.rs`'s `Arc<Notify>`/`broadcast` shutdown
//! wiring, generalized to `tokio_util::sync::CancellationToken`.

use crate::candidate_selector::{CandidateSelector, Candidates};
use crate::command::{Command, CommandFailure, CommandOutcome, RunMode, MAX_INLINE_FAILURES};
use crate::contracts::{ExternalId, PipelineItemOutcome, ProcessedGame, RunState, Source};
use crate::matching;
use crate::normalization;
use crate::persistence::{PersistenceOrchestrator, SaveDecision, SaveOutcome};
use crate::report_writer::ReportWriter;
use crate::run_registry::RunRegistry;
use crate::source::SourceClient;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub struct BatchRunner {
    pool: PgPool,
    store_client: Arc<dyn SourceClient>,
    meta_client: Arc<dyn SourceClient>,
    persistence: Arc<PersistenceOrchestrator>,
    run_registry: Arc<RunRegistry>,
    report_dir: String,
    worker_count: usize,
    fetch_batch_size: usize,
    save_batch_size: usize,
}

/// Running counters shared across a run's fetch/save batches.
struct RunTally {
    seen: AtomicI64,
    created: AtomicI64,
    updated: AtomicI64,
    failed: AtomicI64,
    failures: Mutex<Vec<CommandFailure>>,
}

impl RunTally {
    fn new() -> Self {
        Self {
            seen: AtomicI64::new(0),
            created: AtomicI64::new(0),
            updated: AtomicI64::new(0),
            failed: AtomicI64::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }

    async fn push_failure(&self, source: Source, external_id: &str, reason: String) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        let mut failures = self.failures.lock().await;
        if failures.len() < MAX_INLINE_FAILURES {
            failures.push(CommandFailure {
                source,
                external_id: external_id.to_string(),
                reason,
            });
        }
    }
}

impl BatchRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        store_client: Arc<dyn SourceClient>,
        meta_client: Arc<dyn SourceClient>,
        persistence: Arc<PersistenceOrchestrator>,
        run_registry: Arc<RunRegistry>,
        report_dir: impl Into<String>,
        worker_count: usize,
        fetch_batch_size: usize,
        save_batch_size: usize,
    ) -> Self {
        Self {
            pool,
            store_client,
            meta_client,
            persistence,
            run_registry,
            report_dir: report_dir.into(),
            worker_count: worker_count.max(1),
            fetch_batch_size: fetch_batch_size.max(1),
            save_batch_size: save_batch_size.max(1),
        }
    }

    fn client_for(&self, source: Source) -> Arc<dyn SourceClient> {
        match source {
            Source::Store => self.store_client.clone(),
            Source::Meta => self.meta_client.clone(),
        }
    }

    async fn resolve_targets(&self, command: &Command) -> anyhow::Result<Vec<(Source, ExternalId)>> {
        match command {
            Command::Single { id_kind, external_id, sources } => {
                tracing::debug!(?id_kind, %external_id, "single target resolved");
                Ok(sources.iter().map(|s| (*s, external_id.clone())).collect())
            }
            Command::RefreshWindow { limit } => {
                let selector = CandidateSelector::new(&self.pool);
                let ids = selector.select(Candidates::RefreshWindow { limit: *limit }).await?;
                Ok(ids.into_iter().map(|id| (Source::Store, id)).collect())
            }
            Command::IngestNew { mode, limit } => {
                let selector = CandidateSelector::new(&self.pool);
                let mut upstream_ids = self.store_client.list_ids().await?;
                let mut targets: Vec<(Source, ExternalId)> = selector
                    .select(Candidates::NewStoreIds { known: upstream_ids.clone() })
                    .await?
                    .into_iter()
                    .map(|id| (Source::Store, id))
                    .collect();
                if matches!(mode, RunMode::Full) {
                    // Full mode also pulls brand-new Meta ids; Meta has no
                    // catalog-membership table of its own to diff against,
                    // so every upstream id not already linked is a target.
                    upstream_ids.clear();
                    let meta_ids = self.meta_client.list_ids().await?;
                    targets.extend(meta_ids.into_iter().map(|id| (Source::Meta, id)));
                }
                if let Some(limit) = limit {
                    targets.truncate(*limit as usize);
                }
                Ok(targets)
            }
            Command::FullRefresh { mode, page_size } => {
                let selector = CandidateSelector::new(&self.pool);
                let mut targets: Vec<(Source, ExternalId)> = selector
                    .select(Candidates::FullRefresh { page_size: *page_size })
                    .await?
                    .into_iter()
                    .map(|id| (Source::Store, id))
                    .collect();
                if matches!(mode, RunMode::Full) {
                    // Full mode folds in ids the catalog has never seen too,
                    // so a full sweep also discovers new upstream entries.
                    let upstream_ids = self.store_client.list_ids().await?;
                    let new_ids = selector
                        .select(Candidates::NewStoreIds { known: upstream_ids })
                        .await?;
                    targets.extend(new_ids.into_iter().map(|id| (Source::Store, id)));
                }
                Ok(targets)
            }
            Command::BackfillDetails { limit, .. } => {
                let selector = CandidateSelector::new(&self.pool);
                let ids = selector
                    .select(Candidates::BackfillMissingDetails { limit: *limit })
                    .await?;
                Ok(ids.into_iter().map(|id| (Source::Store, id)).collect())
            }
        }
    }

    pub async fn run(
        &self,
        command: Command,
        cancel: CancellationToken,
        dry_run: bool,
    ) -> anyhow::Result<CommandOutcome> {
        let run_id = self.run_registry.begin_run(command.label()).await;
        let report = Arc::new(ReportWriter::open(&self.report_dir, run_id).await?);
        info!(run_id = %run_id, command = command.label(), dry_run, "pipeline run started");

        self.run_registry.transition(run_id, RunState::Fetching).await;
        let targets = self.resolve_targets(&command).await?;

        let worker_count = command.concurrency_override().unwrap_or(self.worker_count).max(1);
        let semaphore = Arc::new(Semaphore::new(worker_count));
        let tally = Arc::new(RunTally::new());

        self.run_registry.transition(run_id, RunState::Persisting).await;

        'batches: for fetch_chunk in targets.chunks(self.fetch_batch_size) {
            if cancel.is_cancelled() {
                break;
            }
            let fetched = self
                .fetch_many(fetch_chunk, &semaphore, &tally, &report)
                .await;
            let normalized = normalize_many(fetched);

            for save_chunk in normalized.chunks(self.save_batch_size) {
                if cancel.is_cancelled() {
                    break 'batches;
                }
                self.save_many_chunk(run_id, save_chunk, dry_run, &report, &tally).await?;
                info!(
                    run_id = %run_id,
                    batch_size = save_chunk.len(),
                    "save batch complete"
                );
            }
        }

        self.run_registry.transition(run_id, RunState::Finalizing).await;
        let report_path = report.finalize().await.ok();

        let final_state = if cancel.is_cancelled() {
            RunState::Failed
        } else {
            RunState::Completed
        };
        let seen_v = tally.seen.load(Ordering::Relaxed);
        let created_v = tally.created.load(Ordering::Relaxed);
        let updated_v = tally.updated.load(Ordering::Relaxed);
        let failed_v = tally.failed.load(Ordering::Relaxed);
        let saved_v = created_v + updated_v;
        self.run_registry
            .finalize_run(run_id, final_state, seen_v, saved_v, failed_v)
            .await;

        info!(run_id = %run_id, seen = seen_v, saved = saved_v, failed = failed_v, "pipeline run finished");

        Ok(CommandOutcome {
            run_id,
            final_state,
            items_seen: seen_v,
            items_saved: saved_v,
            items_created: created_v,
            items_updated: updated_v,
            items_failed: failed_v,
            failures: tally.failures.lock().await.clone(),
            report_path,
            finished_at: Utc::now(),
        })
    }

    /// FetchMany: bounded concurrent `fetch_one` across one fetch-sized
    /// chunk of targets.
    async fn fetch_many(
        &self,
        chunk: &[(Source, ExternalId)],
        semaphore: &Arc<Semaphore>,
        tally: &Arc<RunTally>,
        report: &Arc<ReportWriter>,
    ) -> Vec<(Source, ExternalId, crate::contracts::RawRecord)> {
        let mut in_flight = FuturesUnordered::new();
        for (source, external_id) in chunk.iter().cloned() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => continue,
            };
            let client = self.client_for(source);
            tally.seen.fetch_add(1, Ordering::Relaxed);
            in_flight.push(tokio::spawn(async move {
                let _permit = permit;
                let result = client.fetch_one(&external_id).await;
                (source, external_id, result)
            }));
        }

        let mut fetched = Vec::with_capacity(chunk.len());
        while let Some(joined) = in_flight.next().await {
            match joined {
                Ok((source, external_id, Ok(Some(raw)))) => fetched.push((source, external_id, raw)),
                Ok((_source, _external_id, Ok(None))) => {}
                Ok((source, external_id, Err(err))) => {
                    warn!(%err, %external_id, "failed to fetch candidate");
                    report
                        .record_failure_detail(source.as_str(), &external_id.0, &err.to_string())
                        .await;
                    tally.push_failure(source, &external_id.0, err.to_string()).await;
                }
                Err(join_err) => warn!(%join_err, "fetch task panicked"),
            }
        }
        fetched
    }

    /// SaveMany: resolve each normalized candidate's save decision (direct
    /// match / matching engine / new insert) and hand the whole chunk to
    /// `PersistenceOrchestrator::save_many` in one call.
    async fn save_many_chunk(
        &self,
        run_id: Uuid,
        chunk: &[(Source, ExternalId, ProcessedGame)],
        dry_run: bool,
        report: &Arc<ReportWriter>,
        tally: &Arc<RunTally>,
    ) -> anyhow::Result<()> {
        let mut prepared = Vec::with_capacity(chunk.len());
        for (source, external_id, candidate) in chunk {
            let (decision, outcome_kind, audit) =
                self.resolve_decision(run_id, *source, candidate).await?;
            if let Some(decision_detail) = &audit {
                report.record_decision(decision_detail).await.ok();
            }
            prepared.push((*source, external_id.clone(), candidate.clone(), decision, outcome_kind));
        }

        if dry_run {
            for (_, _, _, decision, _) in &prepared {
                match decision {
                    SaveDecision::Create => tally.created.fetch_add(1, Ordering::Relaxed),
                    SaveDecision::Link(_) => tally.updated.fetch_add(1, Ordering::Relaxed),
                    SaveDecision::Defer => continue,
                };
            }
            return Ok(());
        }

        let items: Vec<(ProcessedGame, SaveDecision)> = prepared
            .iter()
            .map(|(_, _, candidate, decision, _)| (candidate.clone(), *decision))
            .collect();
        let results = self.persistence.save_many(items).await;

        for ((source, external_id, _candidate, _decision, outcome_kind), result) in
            prepared.into_iter().zip(results)
        {
            self.on_save_result(run_id, source, &external_id, outcome_kind, result, report, tally)
                .await?;
        }
        Ok(())
    }

    /// Deterministic lookup first (same-source id match or slug/original-
    /// slug equality — spec §4.6 step 1's "find existing" proper, never
    /// invoking the matching engine), falling back to the matching engine
    /// only when candidate rows exist but none already carries this id.
    async fn resolve_decision(
        &self,
        run_id: Uuid,
        source: Source,
        candidate: &ProcessedGame,
    ) -> anyhow::Result<(SaveDecision, PipelineItemOutcome, Option<crate::contracts::MatchingDecision>)> {
        let existing_games: Vec<crate::contracts::Game> = sqlx::query_as(
            "SELECT * FROM games WHERE lower(slug) = lower($1) OR lower(original_slug) = lower($1)
             OR store_id = $2 OR meta_id = $2",
        )
        .bind(&candidate.slug_candidate)
        .bind(&candidate.external_id.0)
        .fetch_all(&self.pool)
        .await?;

        let direct_match = existing_games.iter().find(|g| match source {
            Source::Store => g.store_id.as_deref() == Some(candidate.external_id.0.as_str()),
            Source::Meta => g.meta_id.as_deref() == Some(candidate.external_id.0.as_str()),
        });

        if let Some(direct) = direct_match {
            return Ok((SaveDecision::Link(direct.id), PipelineItemOutcome::Saved, None));
        }
        if existing_games.is_empty() {
            // Nothing in the catalog resembles this record at all: a plain
            // first-time insert, not a matching-engine decision (spec §4.6
            // step 1 only calls into the matching engine "when exactly one
            // side of identifiers is present").
            return Ok((SaveDecision::Create, PipelineItemOutcome::Saved, None));
        }

        let mut scored = Vec::with_capacity(existing_games.len());
        for g in &existing_games {
            let company_slugs = crate::persistence::companies::slugs_for_game(&self.pool, g.id)
                .await
                .unwrap_or_default();
            let game_platforms = crate::persistence::releases::platforms_for_game(&self.pool, g.id)
                .await
                .unwrap_or_default();
            scored.push(matching::score(candidate, g, &game_platforms, &company_slugs, &[]));
        }
        let decision = matching::decide(run_id, candidate, scored);
        let outcome = match decision.verdict {
            crate::contracts::MatchingVerdict::Auto => PipelineItemOutcome::Saved,
            crate::contracts::MatchingVerdict::Pending => PipelineItemOutcome::Pending,
            // Rejected means "not the same entity as any candidate row",
            // not "discard" — it still becomes its own new game (spec §8
            // scenario 1: "Subnautica 2" inserts as a distinct row).
            crate::contracts::MatchingVerdict::Reject => PipelineItemOutcome::Saved,
        };
        let save_decision = match decision.verdict {
            crate::contracts::MatchingVerdict::Auto => {
                SaveDecision::Link(decision.candidate_game_id.expect("auto verdict always carries a matched id"))
            }
            crate::contracts::MatchingVerdict::Pending => SaveDecision::Defer,
            crate::contracts::MatchingVerdict::Reject => SaveDecision::Create,
        };
        Ok((save_decision, outcome, Some(decision)))
    }

    /// onSaveResult hook: records the per-item pipeline_items row and
    /// updates the shared run tally.
    #[allow(clippy::too_many_arguments)]
    async fn on_save_result(
        &self,
        run_id: Uuid,
        source: Source,
        external_id: &ExternalId,
        outcome_kind: PipelineItemOutcome,
        save_result: Result<SaveOutcome, crate::persistence::failure::SaveFailureReason>,
        report: &Arc<ReportWriter>,
        tally: &Arc<RunTally>,
    ) -> anyhow::Result<()> {
        let (outcome_kind, game_id, detail) = match save_result {
            Ok(SaveOutcome::Created(id)) => {
                tally.created.fetch_add(1, Ordering::Relaxed);
                (outcome_kind, Some(id), None)
            }
            Ok(SaveOutcome::Updated(id)) => {
                tally.updated.fetch_add(1, Ordering::Relaxed);
                (outcome_kind, Some(id), None)
            }
            Ok(SaveOutcome::Deferred) => (PipelineItemOutcome::Pending, None, None),
            Err(reason) => {
                report
                    .record_failure_detail(source.as_str(), &external_id.0, &reason.to_string())
                    .await;
                tally.push_failure(source, &external_id.0, reason.to_string()).await;
                (PipelineItemOutcome::Failed, None, Some(reason.to_string()))
            }
        };

        let mut tx = self.pool.begin().await?;
        RunRegistry::record_item_in_tx(
            &mut tx,
            run_id,
            source,
            external_id,
            outcome_kind,
            game_id,
            detail.as_deref(),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn normalize_many(
    fetched: Vec<(Source, ExternalId, crate::contracts::RawRecord)>,
) -> Vec<(Source, ExternalId, ProcessedGame)> {
    let mut out = Vec::with_capacity(fetched.len());
    for (source, external_id, raw) in fetched {
        match normalization::normalize(&raw) {
            Ok(candidate) => out.push((source, external_id, candidate)),
            Err(err) => info!(%external_id, %err, "normalization rejected record"),
        }
    }
    out
}
