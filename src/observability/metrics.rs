/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

use crate::pipeline::AllocationStats;
use crate::pipeline::watchlist::TrackerReport;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub runs_total: Counter,
    pub runs_failed: Counter,
    pub picks_total: Counter,
    pub placeholders_total: Counter,
    pub fallback_total: Counter,
    pub watch_enrolled_total: Counter,
    pub watch_fermented_total: Counter,
    pub deliveries_total: Counter,
    pub delivery_failures_total: Counter,
    pub unsubscribed_total: Counter,
    pub store_conflicts_total: Counter,

    // ヒストグラム
    pub run_duration: Histogram,

    // ゲージ
    pub subscribers: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名のメトリクスが既にレジストリに登録されている場合はエラーを返す。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            runs_total: register_counter_with_registry!(
                "digest_runs_total",
                "Total number of digest runs started",
                registry
            )?,
            runs_failed: register_counter_with_registry!(
                "digest_runs_failed_total",
                "Total number of digest runs that aborted",
                registry
            )?,
            picks_total: register_counter_with_registry!(
                "digest_picks_total",
                "Total number of real items selected into digests",
                registry
            )?,
            placeholders_total: register_counter_with_registry!(
                "digest_placeholders_total",
                "Total number of placeholder entries for starved topics",
                registry
            )?,
            fallback_total: register_counter_with_registry!(
                "digest_fallback_total",
                "Total number of picks supplied by a fallback policy",
                registry
            )?,
            watch_enrolled_total: register_counter_with_registry!(
                "digest_watch_enrolled_total",
                "Total number of picks enrolled into the watchlist",
                registry
            )?,
            watch_fermented_total: register_counter_with_registry!(
                "digest_watch_fermented_total",
                "Total number of watched picks later confirmed by trend terms",
                registry
            )?,
            deliveries_total: register_counter_with_registry!(
                "digest_deliveries_total",
                "Total number of successful pushes",
                registry
            )?,
            delivery_failures_total: register_counter_with_registry!(
                "digest_delivery_failures_total",
                "Total number of failed pushes",
                registry
            )?,
            unsubscribed_total: register_counter_with_registry!(
                "digest_unsubscribed_total",
                "Total number of subscribers dropped after repeated failures",
                registry
            )?,
            store_conflicts_total: register_counter_with_registry!(
                "digest_store_conflicts_total",
                "Total number of writes that gave up on version conflicts",
                registry
            )?,
            run_duration: register_histogram_with_registry!(
                "digest_run_duration_seconds",
                "Wall time of one daily digest run",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
                registry
            )?,
            subscribers: register_gauge_with_registry!(
                "digest_subscribers",
                "Number of subscribers after the last bookkeeping pass",
                registry
            )?,
        })
    }

    /// 配分結果をカウンターに反映する。
    pub fn record_allocation(&self, stats: &AllocationStats) {
        self.picks_total
            .inc_by(as_f64(stats.floor_picks + stats.fallback_picks + stats.fill_picks));
        self.placeholders_total.inc_by(as_f64(stats.placeholders));
        self.fallback_total.inc_by(as_f64(stats.fallback_picks));
    }

    /// ウォッチリストの更新結果をカウンターに反映する。
    pub fn record_tracker(&self, report: &TrackerReport) {
        self.watch_enrolled_total.inc_by(as_f64(report.enrolled));
        self.watch_fermented_total.inc_by(as_f64(report.fermented));
    }

    /// 配信結果と購読者の増減を反映する。
    pub fn record_delivery(&self, delivered: usize, failed: usize) {
        self.deliveries_total.inc_by(as_f64(delivered));
        self.delivery_failures_total.inc_by(as_f64(failed));
    }

    pub fn set_subscribers(&self, count: usize) {
        self.subscribers.set(as_f64(count));
    }

    pub fn record_bookkeeping(&self, remaining: usize, removed: usize) {
        self.set_subscribers(remaining);
        self.unsubscribed_total.inc_by(as_f64(removed));
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(count: usize) -> f64 {
    count as f64
}
