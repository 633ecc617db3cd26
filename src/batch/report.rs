//! JSON report of a batch run.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::propagator::BatchSummary;
use crate::session::Calibration;

/// File name of the report inside the output directory.
pub const REPORT_FILE_NAME: &str = "batch_report.json";

/// Final state of one image in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Saved,
    Skipped,
    Failed,
}

/// One line of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportItem {
    pub source: String,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a run written next to the masks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub reference: String,
    pub calibration: Calibration,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<ReportItem>,
}

impl BatchReport {
    /// Build a report for a finished run.
    pub fn new(
        started_at: DateTime<Local>,
        reference: impl Into<String>,
        calibration: &Calibration,
        summary: &BatchSummary,
    ) -> Self {
        let items = summary
            .outcomes
            .iter()
            .map(|outcome| {
                let source = outcome.source.display().to_string();
                match &outcome.result {
                    Ok(output) => ReportItem {
                        source,
                        status: ReportStatus::Saved,
                        output: Some(output.display().to_string()),
                        step: None,
                        error: None,
                    },
                    Err(e) => ReportItem {
                        source,
                        status: if e.is_skip() {
                            ReportStatus::Skipped
                        } else {
                            ReportStatus::Failed
                        },
                        output: None,
                        step: Some(e.step().to_string()),
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Local::now(),
            reference: reference.into(),
            calibration: calibration.clone(),
            processed: summary.processed,
            skipped: summary.skipped,
            failed: summary.failed,
            items,
        }
    }

    /// Write the report as pretty JSON into `dir`.
    pub fn write(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE_NAME);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&path, content)?;
        Ok(path)
    }
}
