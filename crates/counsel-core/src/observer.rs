use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::types::{PipelineEvent, Report, ReportPlan, ReportValidation};
use crate::validator::QualityValidator;

const HISTORY_CAPACITY: usize = 100;
const RECENT_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityRecord {
    pub case_name: String,
    pub overall: f64,
    pub passed: bool,
    pub degraded_sections: usize,
    pub issues: usize,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub checks: usize,
    pub average_score: f64,
    pub pass_rate: f64,
    pub recent: Vec<QualityRecord>,
}

/// Re-validates delivered reports off the request path and keeps a short
/// history for the metrics endpoint. Works on its own copy of the report.
#[derive(Clone)]
pub struct QualityObserver {
    validator: QualityValidator,
    plan: Arc<ReportPlan>,
    history: Arc<Mutex<VecDeque<QualityRecord>>>,
    event_tx: Option<broadcast::Sender<PipelineEvent>>,
}

impl QualityObserver {
    pub fn new(validator: QualityValidator, plan: Arc<ReportPlan>) -> Self {
        Self { validator, plan, history: Arc::new(Mutex::new(VecDeque::new())), event_tx: None }
    }

    /// Failed checks are also published as [`PipelineEvent::Alert`].
    pub fn with_alerts(mut self, tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn check(&self, report: &Report) -> ReportValidation {
        let validation = self.validator.validate_report(report, &self.plan);
        let record = QualityRecord {
            case_name: report.case_name.clone(),
            overall: validation.overall,
            passed: validation.passed,
            degraded_sections: report.metadata.degraded_sections,
            issues: validation.issues.len(),
            checked_at: Utc::now(),
        };

        if validation.passed {
            info!(case = %record.case_name, score = record.overall, "background quality check passed");
        } else {
            warn!(
                case = %record.case_name,
                score = record.overall,
                degraded = record.degraded_sections,
                issues = record.issues,
                "background quality check failed"
            );
            if let Some(tx) = &self.event_tx {
                let _ = tx.send(PipelineEvent::Alert {
                    case_name: record.case_name.clone(),
                    message: format!("quality check failed: score {:.2}", record.overall),
                });
            }
        }

        if let Ok(mut history) = self.history.lock() {
            history.push_back(record);
            if history.len() > HISTORY_CAPACITY {
                history.pop_front();
            }
        }
        validation
    }

    /// Runs [`check`](Self::check) on a detached task.
    pub fn spawn_check(&self, report: Report) -> JoinHandle<ReportValidation> {
        let observer = self.clone();
        tokio::spawn(async move { observer.check(&report) })
    }

    pub fn metrics(&self) -> QualityMetrics {
        let Ok(history) = self.history.lock() else {
            return QualityMetrics { checks: 0, average_score: 0.0, pass_rate: 0.0, recent: Vec::new() };
        };
        let checks = history.len();
        let (average_score, pass_rate) = if checks == 0 {
            (0.0, 0.0)
        } else {
            (
                history.iter().map(|r| r.overall).sum::<f64>() / checks as f64,
                history.iter().filter(|r| r.passed).count() as f64 / checks as f64,
            )
        };
        let recent = history.iter().rev().take(RECENT_WINDOW).cloned().collect();
        QualityMetrics { checks, average_score, pass_rate, recent }
    }
}
