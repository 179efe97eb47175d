//! Retention policy for the parameter collection.
//!
//! Parameters are kept for the most recently used recordings only: at most
//! `max_files` records, none older than `max_age_days` since last use.

use chrono::{DateTime, Duration, Utc};

use crate::config::RetentionSection;
use crate::types::FileParameterRecord;

/// Bounds on the parameter collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_files: usize,
    pub max_age_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_files: 50,
            max_age_days: 30,
        }
    }
}

impl From<&RetentionSection> for RetentionPolicy {
    fn from(section: &RetentionSection) -> Self {
        Self {
            max_files: section.max_files,
            max_age_days: section.max_age_days,
        }
    }
}

impl RetentionPolicy {
    /// Fingerprints that fall outside the policy at `now`.
    ///
    /// Records are ranked by `lastUsedAt`, newest first (ties broken by
    /// fingerprint). A record is expired when its rank is at or past
    /// `max_files`, or when it was last used before the age cutoff.
    pub fn select_expired(&self, records: &[FileParameterRecord], now: DateTime<Utc>) -> Vec<String> {
        let cutoff = (now - Duration::days(i64::from(self.max_age_days))).timestamp_millis();

        let mut ranked: Vec<&FileParameterRecord> = records.iter().collect();
        ranked.sort_by(|a, b| {
            b.last_used_at
                .cmp(&a.last_used_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });

        ranked
            .into_iter()
            .enumerate()
            .filter(|(rank, record)| *rank >= self.max_files || record.last_used_at < cutoff)
            .map(|(_, record)| record.fingerprint.clone())
            .collect()
    }
}

/// Outcome of one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Records present when the pass started.
    pub examined: usize,
    pub deleted: usize,
    /// Expired records whose delete failed; they stay until the next pass.
    pub failed: usize,
    pub kept: usize,
}
