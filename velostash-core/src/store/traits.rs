use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::export::{ExportOptions, ExportOutcome};
use crate::retention::{PruneReport, RetentionPolicy};
use crate::types::{AnalysisResultRecord, FileParameterRecord, ParameterSet, ResultKey};

use super::versioned::{OpenReport, StoreState};

/// Per-recording analysis settings, keyed by content fingerprint.
#[async_trait::async_trait]
pub trait ParameterStore: Send + Sync {
    // ── Lifecycle ──────────────────────────────────────────────────

    /// Open the collection, migrating it if needed. Idempotent.
    async fn open(&self) -> crate::error::Result<OpenReport>;

    /// Tear the collection down; later operations fail until reopened.
    fn close(&self);

    fn state(&self) -> StoreState;

    // ── Records ────────────────────────────────────────────────────

    /// Upsert the parameters for `fingerprint`, stamping `lastUsedAt` with now.
    async fn save(
        &self,
        fingerprint: &str,
        parameters: &ParameterSet,
        source_name_hint: &str,
    ) -> crate::error::Result<()>;

    /// Upsert a full record as-is, keeping its `lastUsedAt` (imports, fixtures).
    async fn put_record(&self, record: &FileParameterRecord) -> crate::error::Result<()>;

    /// Stored parameters for `fingerprint`; `None` when unknown.
    async fn load(&self, fingerprint: &str) -> crate::error::Result<Option<ParameterSet>>;

    /// Full record for `fingerprint`.
    async fn get(&self, fingerprint: &str) -> crate::error::Result<Option<FileParameterRecord>>;

    /// All records, most recently used first.
    async fn list_all(&self) -> crate::error::Result<Vec<FileParameterRecord>>;

    /// Delete one record. Returns whether it existed.
    async fn delete(&self, fingerprint: &str) -> crate::error::Result<bool>;

    async fn count(&self) -> crate::error::Result<u64>;

    /// Delete every record. Returns how many were removed.
    async fn clear(&self) -> crate::error::Result<u64>;

    // ── Retention ──────────────────────────────────────────────────

    /// Apply `policy` relative to the current time.
    async fn prune(&self, policy: &RetentionPolicy) -> crate::error::Result<PruneReport> {
        self.prune_at(policy, Utc::now()).await
    }

    /// Apply `policy` relative to `now`.
    ///
    /// Deletes are best-effort: a failed delete is counted and the pass goes on.
    async fn prune_at(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> crate::error::Result<PruneReport> {
        let records = self.list_all().await?;
        let examined = records.len();
        let expired = policy.select_expired(&records, now);

        let mut report = PruneReport {
            examined,
            ..PruneReport::default()
        };
        for fingerprint in expired {
            match self.delete(&fingerprint).await {
                Ok(_) => report.deleted += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(fingerprint = %fingerprint, error = %e, "Failed to prune parameter record");
                }
            }
        }
        report.kept = examined - report.deleted;
        if report.deleted > 0 || report.failed > 0 {
            info!(
                deleted = report.deleted,
                failed = report.failed,
                kept = report.kept,
                "Pruned parameter records"
            );
        }
        Ok(report)
    }
}

/// Fitted analysis results, keyed by (source name, lap key, notes).
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    // ── Lifecycle ──────────────────────────────────────────────────

    /// Open the collection, migrating it if needed. Idempotent.
    async fn open(&self) -> crate::error::Result<OpenReport>;

    /// Tear the collection down; later operations fail until reopened.
    fn close(&self);

    fn state(&self) -> StoreState;

    // ── Records ────────────────────────────────────────────────────

    /// Upsert under the record's composite key, stamping `savedAt` with now.
    ///
    /// An existing result with the same key is replaced without warning;
    /// re-running an analysis on the same laps and notes is expected to
    /// overwrite. Returns the record as stored.
    async fn save_result(
        &self,
        record: &AnalysisResultRecord,
    ) -> crate::error::Result<AnalysisResultRecord>;

    async fn get(&self, key: &ResultKey) -> crate::error::Result<Option<AnalysisResultRecord>>;

    async fn list_all(&self) -> crate::error::Result<Vec<AnalysisResultRecord>>;

    /// Results for one source file, newest `savedAt` first.
    async fn list_for_source(
        &self,
        source_name: &str,
    ) -> crate::error::Result<Vec<AnalysisResultRecord>>;

    /// Delete one result. Returns whether it existed.
    async fn delete(&self, key: &ResultKey) -> crate::error::Result<bool>;

    async fn count(&self) -> crate::error::Result<u64>;

    /// Delete every result. Returns how many were removed.
    async fn clear(&self) -> crate::error::Result<u64>;

    // ── Export ─────────────────────────────────────────────────────

    /// Render every result as CSV with the default options.
    async fn export_all(&self) -> crate::error::Result<ExportOutcome> {
        self.export_with(&ExportOptions::default()).await
    }

    /// Render every result as CSV; [`ExportOutcome::Empty`] when there is none.
    async fn export_with(&self, options: &ExportOptions) -> crate::error::Result<ExportOutcome> {
        let records = self.list_all().await?;
        Ok(crate::export::export_records(records, options)?)
    }
}
