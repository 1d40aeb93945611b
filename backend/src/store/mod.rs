//! Report storage.
//!
//! Analyses are stored behind the [`ReportRepository`] trait so the HTTP
//! layer and CLI work the same against [`InMemoryReportRepository`] (tests)
//! and [`FileReportRepository`] (one JSON file per report on disk).
//! Identifiers are random UUIDs assigned when a report is created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use uuid::Uuid;

use crate::api::logs::log_warning;
use crate::error::{RepositoryError, RepositoryResult};
use crate::pipeline::Analysis;

/// Share of analyzed spend shown as the savings opportunity on the dashboard.
pub const SAVINGS_ESTIMATE_RATE: f64 = 0.15;

/// A stored analysis with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: Uuid,
    /// Uploaded file name
    pub source_name: String,
    pub company_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub analysis: Analysis,
}

impl StoredReport {
    /// Wrap an analysis under a fresh identifier.
    pub fn new(source_name: impl Into<String>, company_name: Option<String>, analysis: Analysis) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_name: source_name.into(),
            company_name: company_name.filter(|c| !c.trim().is_empty()),
            created_at: Utc::now(),
            analysis,
        }
    }

    pub fn spend_score(&self) -> u8 {
        self.analysis.score.final_score
    }
}

/// Storage for analysis reports.
pub trait ReportRepository: Send + Sync {
    fn get(&self, id: Uuid) -> RepositoryResult<Option<StoredReport>>;

    /// Insert or replace a report.
    fn put(&self, report: StoredReport) -> RepositoryResult<()>;

    /// Remove a report. Returns whether it existed.
    fn delete(&self, id: Uuid) -> RepositoryResult<bool>;

    /// All reports, newest first.
    fn list(&self) -> RepositoryResult<Vec<StoredReport>>;
}

fn newest_first(mut reports: Vec<StoredReport>) -> Vec<StoredReport> {
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    reports
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryReportRepository {
    reports: RwLock<HashMap<Uuid, StoredReport>>,
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportRepository for InMemoryReportRepository {
    fn get(&self, id: Uuid) -> RepositoryResult<Option<StoredReport>> {
        let reports = self.reports.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(reports.get(&id).cloned())
    }

    fn put(&self, report: StoredReport) -> RepositoryResult<()> {
        let mut reports = self.reports.write().map_err(|_| RepositoryError::Poisoned)?;
        reports.insert(report.id, report);
        Ok(())
    }

    fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let mut reports = self.reports.write().map_err(|_| RepositoryError::Poisoned)?;
        Ok(reports.remove(&id).is_some())
    }

    fn list(&self) -> RepositoryResult<Vec<StoredReport>> {
        let reports = self.reports.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(newest_first(reports.values().cloned().collect()))
    }
}

// =============================================================================
// File-backed
// =============================================================================

/// Reports stored as `<id>.json` files in one directory.
///
/// The directory is read once at open; afterwards the in-memory index and
/// the files are updated together.
#[derive(Debug)]
pub struct FileReportRepository {
    dir: PathBuf,
    reports: RwLock<HashMap<Uuid, StoredReport>>,
}

impl FileReportRepository {
    /// Open (and create if needed) a report directory.
    pub fn open(dir: impl AsRef<Path>) -> RepositoryResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut reports = HashMap::new();
        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let loaded = fs::read_to_string(&path)
                .map_err(RepositoryError::from)
                .and_then(|content| Ok(serde_json::from_str::<StoredReport>(&content)?));
            match loaded {
                Ok(report) => {
                    reports.insert(report.id, report);
                }
                Err(e) => log_warning(format!("Ignoring unreadable report {}: {}", path.display(), e)),
            }
        }

        Ok(Self { dir, reports: RwLock::new(reports) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl ReportRepository for FileReportRepository {
    fn get(&self, id: Uuid) -> RepositoryResult<Option<StoredReport>> {
        let reports = self.reports.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(reports.get(&id).cloned())
    }

    fn put(&self, report: StoredReport) -> RepositoryResult<()> {
        let mut reports = self.reports.write().map_err(|_| RepositoryError::Poisoned)?;
        let content = serde_json::to_string_pretty(&report)?;
        fs::write(self.path_for(report.id), content)?;
        reports.insert(report.id, report);
        Ok(())
    }

    fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        let mut reports = self.reports.write().map_err(|_| RepositoryError::Poisoned)?;
        if reports.remove(&id).is_none() {
            return Ok(false);
        }
        let path = self.path_for(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(true)
    }

    fn list(&self) -> RepositoryResult<Vec<StoredReport>> {
        let reports = self.reports.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(newest_first(reports.values().cloned().collect()))
    }
}

// =============================================================================
// Aggregates
// =============================================================================

/// Most recently created report.
pub fn latest(reports: &[StoredReport]) -> Option<&StoredReport> {
    reports.iter().max_by_key(|r| r.created_at)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_reports: usize,
    /// Mean final score, rounded down
    pub avg_spend_score: u8,
    pub total_amount_analyzed: f64,
    pub potential_savings: f64,
}

impl DashboardStats {
    pub fn from_reports(reports: &[StoredReport]) -> Self {
        let total_reports = reports.len();
        let score_sum: usize = reports.iter().map(|r| r.spend_score() as usize).sum();
        let total_amount_analyzed: f64 = reports
            .iter()
            .map(|r| r.analysis.score.transaction_summary.total_amount)
            .sum();

        Self {
            total_reports,
            avg_spend_score: (score_sum / total_reports.max(1)) as u8,
            total_amount_analyzed,
            potential_savings: (total_amount_analyzed * SAVINGS_ESTIMATE_RATE * 100.0).round() / 100.0,
        }
    }
}
