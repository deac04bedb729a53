//! Per-kind append-only audit logs plus an overwritten run summary.
//!
//! Generalizes the teacher's "write a timestamped JSON snapshot under
//! exports/" pattern (`lib.rs`'s `psstore_metrics_*.json` /
//! `psstore_price_ladders_*.json`) from one-file-per-run to four
//! append-as-you-go JSONL files, guarded by a `tokio::sync::Mutex` the way
//! the teacher guards its shared ingest caches. Files live directly under
//! the configured base directory (not nested per run) so a long-lived
//! `matching.auto.jsonl` accumulates across every run (spec §4.10/§6).

use crate::contracts::MatchingDecision;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default, Serialize)]
pub struct ReportSummary {
    pub run_id: String,
    pub processed: u64,
    pub matched: u64,
    pub pending: u64,
    pub rejected: u64,
    pub failed: u64,
    pub avg_score: f64,
    pub max_score: f64,
    pub min_score: f64,
    pub score_histogram: HashMap<String, u64>,
    pub top_reasons: Vec<(String, u64)>,
}

struct SummaryAccum {
    summary: ReportSummary,
    reason_counts: HashMap<String, u64>,
    score_sum: f64,
    score_count: u64,
}

impl SummaryAccum {
    fn new(run_id: Uuid) -> Self {
        Self {
            summary: ReportSummary {
                run_id: run_id.to_string(),
                max_score: f64::MIN,
                min_score: f64::MAX,
                ..Default::default()
            },
            reason_counts: HashMap::new(),
            score_sum: 0.0,
            score_count: 0,
        }
    }
}

pub struct ReportWriter {
    dir: PathBuf,
    run_id: Uuid,
    auto_file: Mutex<Option<fs::File>>,
    pending_file: Mutex<Option<fs::File>>,
    rejected_file: Mutex<Option<fs::File>>,
    errors_file: Mutex<Option<fs::File>>,
    summary: Mutex<SummaryAccum>,
}

async fn append_line(
    dir: &PathBuf,
    slot: &Mutex<Option<fs::File>>,
    filename: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    let mut guard = slot.lock().await;
    if guard.is_none() {
        let path = dir.join(filename);
        *guard = Some(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?,
        );
    }
    let file = guard.as_mut().expect("initialized above");
    let mut line = payload.to_vec();
    line.push(b'\n');
    file.write_all(&line).await?;
    Ok(())
}

impl ReportWriter {
    pub async fn open(base_dir: impl Into<PathBuf>, run_id: Uuid) -> anyhow::Result<Self> {
        let dir = base_dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            run_id,
            auto_file: Mutex::new(None),
            pending_file: Mutex::new(None),
            rejected_file: Mutex::new(None),
            errors_file: Mutex::new(None),
            summary: Mutex::new(SummaryAccum::new(run_id)),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub async fn record_decision(&self, decision: &MatchingDecision) -> anyhow::Result<()> {
        let line = serde_json::to_vec(decision)?;
        match decision.verdict {
            crate::contracts::MatchingVerdict::Auto => {
                append_line(&self.dir, &self.auto_file, "matching.auto.jsonl", &line).await?;
            }
            crate::contracts::MatchingVerdict::Pending => {
                append_line(&self.dir, &self.pending_file, "matching.pending.jsonl", &line)
                    .await?;
            }
            crate::contracts::MatchingVerdict::Reject => {
                append_line(&self.dir, &self.rejected_file, "matching.rejected.jsonl", &line)
                    .await?;
            }
        }

        let mut summary = self.summary.lock().await;
        summary.summary.processed += 1;
        match decision.verdict {
            crate::contracts::MatchingVerdict::Auto => summary.summary.matched += 1,
            crate::contracts::MatchingVerdict::Pending => summary.summary.pending += 1,
            crate::contracts::MatchingVerdict::Reject => summary.summary.rejected += 1,
        }
        summary.score_sum += decision.total_score;
        summary.score_count += 1;
        summary.summary.max_score = summary.summary.max_score.max(decision.total_score);
        summary.summary.min_score = summary.summary.min_score.min(decision.total_score);
        let bucket = (decision.total_score / 0.05).floor() as i64 * 5;
        *summary
            .summary
            .score_histogram
            .entry(format!("{bucket}"))
            .or_insert(0) += 1;
        for reason in &decision.reasons {
            *summary.reason_counts.entry(reason.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    /// Appends a one-line record of a persistence-layer failure to
    /// `matching.errors.jsonl` and counts it in the summary.
    pub async fn record_failure_detail(&self, source: &str, external_id: &str, reason: &str) {
        #[derive(Serialize)]
        struct ErrorLine<'a> {
            run_id: String,
            source: &'a str,
            external_id: &'a str,
            reason: &'a str,
        }
        if let Ok(line) = serde_json::to_vec(&ErrorLine {
            run_id: self.run_id.to_string(),
            source,
            external_id,
            reason,
        }) {
            let _ = append_line(&self.dir, &self.errors_file, "matching.errors.jsonl", &line).await;
        }
        self.record_failure().await;
    }

    pub async fn record_failure(&self) {
        let mut summary = self.summary.lock().await;
        summary.summary.failed += 1;
    }

    pub async fn finalize(&self) -> anyhow::Result<PathBuf> {
        let mut summary = self.summary.lock().await;
        let mut reasons: Vec<(String, u64)> = summary.reason_counts.drain().collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1));
        reasons.truncate(10);
        summary.summary.top_reasons = reasons;
        summary.summary.avg_score = if summary.score_count > 0 {
            summary.score_sum / summary.score_count as f64
        } else {
            0.0
        };
        if summary.score_count == 0 {
            summary.summary.max_score = 0.0;
            summary.summary.min_score = 0.0;
        }

        let path = self.dir.join("summary.json");
        fs::write(&path, serde_json::to_vec_pretty(&summary.summary)?).await?;
        Ok(path)
    }
}
