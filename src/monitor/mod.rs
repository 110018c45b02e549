//! Anomaly monitoring
//!
//! Compares current-window rates against a rolling baseline and raises
//! alerts on deviation. Also scans price history for significant moves the
//! pipeline never predicted, recording them as missed opportunities.

#[cfg(test)]
mod tests;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::detector::Signal;
use crate::error::{PipelineError, Result};
use crate::evaluator::Evaluation;
use crate::predictions::Prediction;
use crate::sandbox::PricePoint;
use crate::storage::{Database, Doc, DocFilter, Table};
use crate::types::{new_id, AlertSeverity, AlertStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub organization_slug: String,
    /// Metric the alert fired on, e.g. `signal_detection_rate`.
    pub metric: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub message: String,
    pub baseline_rate: f64,
    pub current_rate: f64,
    pub deviation_pct: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Doc for Alert {
    const TABLE: Table = Table::Alerts;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn doc_key(&self) -> Option<&str> {
        Some(&self.metric)
    }
    fn status(&self) -> Option<&str> {
        Some(self.status.as_str())
    }
}

/// Post-mortem state of a missed opportunity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Analyzed,
    Dismissed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Analyzed => "analyzed",
            AnalysisStatus::Dismissed => "dismissed",
        }
    }
}

/// A significant price move no active prediction covered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissedOpportunity {
    pub id: String,
    pub organization_slug: String,
    pub target_id: String,
    /// Percent move over the scan window.
    pub move_pct: f64,
    /// Move size relative to the significance threshold; 1.0 sits exactly
    /// on the threshold.
    pub significance_score: f64,
    #[serde(default)]
    pub analysis_status: AnalysisStatus,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    /// Dedup key: one record per target per scan day.
    pub scan_key: String,
}

impl Doc for MissedOpportunity {
    const TABLE: Table = Table::MissedOpportunities;

    fn id(&self) -> &str {
        &self.id
    }
    fn org(&self) -> &str {
        &self.organization_slug
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.detected_at
    }
    fn target_id(&self) -> Option<&str> {
        Some(&self.target_id)
    }
    fn doc_key(&self) -> Option<&str> {
        Some(&self.scan_key)
    }
}

#[derive(Debug, Default, Serialize)]
pub struct MonitorReport {
    pub alerts_created: u32,
    pub missed_opportunities: u32,
}

pub struct AnomalyMonitor {
    db: Database,
    config: MonitorConfig,
}

impl AnomalyMonitor {
    pub fn new(db: Database, config: MonitorConfig) -> Self {
        Self { db, config }
    }

    /// One monitoring pass: rate checks plus the missed-opportunity scan.
    pub async fn run(&self, org: &str) -> Result<MonitorReport> {
        let mut report = MonitorReport::default();
        report.alerts_created += self.check_signal_rate(org).await?;
        report.alerts_created += self.check_accuracy(org).await?;
        report.missed_opportunities = self.scan_missed(org).await?;
        Ok(report)
    }

    /// Signals per hour, current window vs rolling baseline.
    async fn check_signal_rate(&self, org: &str) -> Result<u32> {
        let now = Utc::now();
        let current_start = now - Duration::hours(self.config.current_window_hours);
        let baseline_start = now - Duration::hours(self.config.baseline_window_hours);

        let current = self
            .db
            .count::<Signal>(org, &DocFilter::default().test(false).after(current_start))
            .await? as f64;
        let baseline_total = self
            .db
            .count::<Signal>(
                org,
                &DocFilter::default()
                    .test(false)
                    .after(baseline_start)
                    .before(current_start),
            )
            .await? as f64;

        let baseline_hours =
            (self.config.baseline_window_hours - self.config.current_window_hours).max(1) as f64;
        let baseline_rate = baseline_total / baseline_hours;
        let current_rate = current / self.config.current_window_hours.max(1) as f64;

        self.raise_if_deviant(org, "signal_detection_rate", baseline_rate, current_rate)
            .await
    }

    /// Direction accuracy, current window vs rolling baseline.
    async fn check_accuracy(&self, org: &str) -> Result<u32> {
        let now = Utc::now();
        let current_start = now - Duration::hours(self.config.current_window_hours);
        let baseline_start = now - Duration::hours(self.config.baseline_window_hours);

        let current: Vec<Evaluation> = self
            .db
            .list(org, &DocFilter::default().test(false).after(current_start))
            .await?;
        let baseline: Vec<Evaluation> = self
            .db
            .list(
                org,
                &DocFilter::default()
                    .test(false)
                    .after(baseline_start)
                    .before(current_start),
            )
            .await?;
        // Not enough history to call anything anomalous.
        if current.is_empty() || baseline.is_empty() {
            return Ok(0);
        }

        let rate = |evals: &[Evaluation]| {
            evals.iter().filter(|e| e.direction_correct).count() as f64 / evals.len() as f64
        };
        self.raise_if_deviant(org, "evaluation_accuracy", rate(&baseline), rate(&current))
            .await
    }

    async fn raise_if_deviant(
        &self,
        org: &str,
        metric: &str,
        baseline_rate: f64,
        current_rate: f64,
    ) -> Result<u32> {
        if baseline_rate <= f64::EPSILON {
            return Ok(0);
        }
        let deviation_pct = ((current_rate - baseline_rate) / baseline_rate).abs() * 100.0;
        let severity = if deviation_pct >= self.config.critical_deviation_pct {
            AlertSeverity::Critical
        } else if deviation_pct >= self.config.warning_deviation_pct {
            AlertSeverity::Warning
        } else {
            return Ok(0);
        };

        // One open alert per metric; a still-open alert absorbs the new
        // observation instead of stacking a duplicate.
        let open: Vec<Alert> = self
            .db
            .list(
                org,
                &DocFilter::default()
                    .key(metric)
                    .status(AlertStatus::Active.as_str())
                    .limit(1),
            )
            .await?;
        if let Some(mut alert) = open.into_iter().next() {
            alert.current_rate = current_rate;
            alert.deviation_pct = deviation_pct;
            alert.severity = severity;
            self.db.put(&alert).await?;
            return Ok(0);
        }

        let alert = Alert {
            id: new_id(),
            organization_slug: org.to_string(),
            metric: metric.to_string(),
            severity,
            status: AlertStatus::Active,
            message: format!(
                "{} deviates {:.0}% from baseline ({:.3} vs {:.3})",
                metric, deviation_pct, current_rate, baseline_rate
            ),
            baseline_rate,
            current_rate,
            deviation_pct,
            created_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
        };
        self.db.put(&alert).await?;
        tracing::warn!(metric, deviation = deviation_pct, "anomaly alert raised");
        Ok(1)
    }

    /// Significant production price moves with no prediction open over the
    /// move. One record per target per day.
    async fn scan_missed(&self, org: &str) -> Result<u32> {
        let now = Utc::now();
        let window_start = now - Duration::hours(self.config.current_window_hours);
        let prices: Vec<PricePoint> = self
            .db
            .list(org, &DocFilter::default().test(false).after(window_start))
            .await?;

        let mut by_target: std::collections::HashMap<&str, Vec<&PricePoint>> =
            std::collections::HashMap::new();
        for p in &prices {
            by_target.entry(p.target_id.as_str()).or_default().push(p);
        }

        let mut recorded = 0;
        for (target_id, mut points) in by_target {
            points.sort_by_key(|p| p.recorded_at);
            let (Some(first), Some(last)) = (points.first(), points.last()) else {
                continue;
            };
            let (Some(open), Some(close)) = (first.price.to_f64(), last.price.to_f64()) else {
                continue;
            };
            if open.abs() < f64::EPSILON {
                continue;
            }
            let move_pct = (close - open) / open * 100.0;
            if move_pct.abs() < self.config.significant_move_pct {
                continue;
            }

            let covered: Vec<Prediction> = self
                .db
                .list(org, &DocFilter::default().target(target_id).test(false))
                .await?;
            let had_coverage = covered
                .iter()
                .any(|p| p.predicted_at <= last.recorded_at && p.expires_at >= first.recorded_at);
            if had_coverage {
                continue;
            }

            let scan_key = format!("{}:{}", target_id, now.format("%Y-%m-%d"));
            let existing: Vec<MissedOpportunity> = self
                .db
                .list(org, &DocFilter::default().key(&scan_key).limit(1))
                .await?;
            if !existing.is_empty() {
                continue;
            }

            let missed = MissedOpportunity {
                id: new_id(),
                organization_slug: org.to_string(),
                target_id: target_id.to_string(),
                move_pct,
                significance_score: move_pct.abs()
                    / self.config.significant_move_pct.max(f64::EPSILON),
                analysis_status: AnalysisStatus::Pending,
                window_start: first.recorded_at,
                window_end: last.recorded_at,
                detected_at: now,
                scan_key,
            };
            self.db.put(&missed).await?;
            recorded += 1;
        }
        Ok(recorded)
    }

    pub async fn list_alerts(&self, org: &str, status: Option<AlertStatus>) -> Result<Vec<Alert>> {
        let mut filter = DocFilter::default();
        if let Some(status) = status {
            filter = filter.status(status.as_str());
        }
        self.db.list(org, &filter).await
    }

    pub async fn acknowledge(&self, org: &str, alert_id: &str) -> Result<Alert> {
        self.transition(org, alert_id, AlertStatus::Acknowledged)
            .await
    }

    pub async fn resolve(&self, org: &str, alert_id: &str) -> Result<Alert> {
        self.transition(org, alert_id, AlertStatus::Resolved).await
    }

    async fn transition(&self, org: &str, alert_id: &str, to: AlertStatus) -> Result<Alert> {
        if alert_id.is_empty() {
            return Err(PipelineError::missing_id("alert"));
        }
        let mut alert: Alert = self
            .db
            .get(org, alert_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("alert", alert_id))?;
        match to {
            AlertStatus::Acknowledged => alert.acknowledged_at = Some(Utc::now()),
            AlertStatus::Resolved => alert.resolved_at = Some(Utc::now()),
            AlertStatus::Active => {}
        }
        alert.status = to;
        self.db.put(&alert).await?;
        Ok(alert)
    }

    pub async fn missed_opportunities(&self, org: &str) -> Result<Vec<MissedOpportunity>> {
        self.db.list(org, &DocFilter::default()).await
    }
}
