//! Read-side analytics (§4.6): total volume, success rate, channel/status
//! breakdowns, hourly sent/failed series, and the log endpoints backing
//! `/api/analytics*`.

use std::sync::Arc;

use nh_common::{Channel, NotificationLog, NotificationStatus};
use nh_store::{NotificationLogRepository, NotificationRepository, Result as StoreResult, StatsLast24h};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_24h: i64,
    pub success_rate: f64,
    pub by_status: Vec<(NotificationStatus, i64)>,
    pub by_channel: Vec<(Channel, i64)>,
    pub hourly_counts: Vec<(chrono::DateTime<chrono::Utc>, i64)>,
    pub hourly_sent_failed: Vec<(chrono::DateTime<chrono::Utc>, i64, i64)>,
}

pub struct Analytics {
    store: Arc<dyn NotificationRepository>,
    logs: Arc<dyn NotificationLogRepository>,
}

impl Analytics {
    pub fn new(store: Arc<dyn NotificationRepository>, logs: Arc<dyn NotificationLogRepository>) -> Self {
        Self { store, logs }
    }

    pub async fn summary(&self) -> StoreResult<AnalyticsSummary> {
        let stats = self.store.stats_last_24h().await?;
        Ok(summarize(stats))
    }

    pub async fn recent_logs(&self, limit: u32) -> StoreResult<Vec<NotificationLog>> {
        self.logs.recent(limit).await
    }

    pub async fn error_logs(&self, limit: u32) -> StoreResult<Vec<NotificationLog>> {
        self.logs.errors_only(limit).await
    }
}

fn summarize(stats: StatsLast24h) -> AnalyticsSummary {
    let total_24h: i64 = stats.by_status.iter().map(|(_, count)| count).sum();
    let sent: i64 = stats
        .by_status
        .iter()
        .find(|(status, _)| *status == NotificationStatus::Sent)
        .map(|(_, count)| *count)
        .unwrap_or(0);

    let success_rate = if total_24h > 0 { (sent as f64 / total_24h as f64) * 100.0 } else { 0.0 };

    AnalyticsSummary {
        total_24h,
        success_rate,
        by_status: stats.by_status,
        by_channel: stats.by_channel,
        hourly_counts: stats.hourly_counts,
        hourly_sent_failed: stats.hourly_sent_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_zero_with_no_volume() {
        let summary = summarize(StatsLast24h::default());
        assert_eq!(summary.total_24h, 0);
        assert_eq!(summary.success_rate, 0.0);
    }

    #[test]
    fn success_rate_reflects_sent_over_total() {
        let stats = StatsLast24h {
            by_status: vec![(NotificationStatus::Sent, 3), (NotificationStatus::Failed, 1)],
            by_channel: vec![],
            hourly_counts: vec![],
            hourly_sent_failed: vec![],
        };
        let summary = summarize(stats);
        assert_eq!(summary.total_24h, 4);
        assert_eq!(summary.success_rate, 75.0);
    }
}
