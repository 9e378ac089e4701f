use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

const MAX_LATENCY_RECORDS: usize = 1000;

/// ローカルメトリクス収集器
#[derive(Default)]
pub struct Metrics {
    counters: Mutex<MetricsCounters>,
    latencies: Mutex<Vec<LatencyRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    jobs_started: u64,
    jobs_completed: u64,
    jobs_failed: u64,
    inline_deliveries: u64,
    poll_ticks: u64,
    transient_poll_errors: u64,
    stale_responses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub phase: String,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// メトリクスサマリー（UIに返す用）
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub inline_deliveries: u64,
    pub poll_ticks: u64,
    pub transient_poll_errors: u64,
    pub stale_responses: u64,
    pub avg_latency_ms: AvgLatency,
    pub recent_latencies: Vec<LatencyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvgLatency {
    pub submit: Option<f64>,
    pub upload: Option<f64>,
    pub total: Option<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> MutexGuard<'_, MetricsCounters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn inc_jobs_started(&self) {
        self.counters().jobs_started += 1;
    }

    pub fn inc_jobs_completed(&self) {
        self.counters().jobs_completed += 1;
    }

    pub fn inc_jobs_failed(&self) {
        self.counters().jobs_failed += 1;
    }

    pub fn inc_inline_deliveries(&self) {
        self.counters().inline_deliveries += 1;
    }

    pub fn inc_poll_ticks(&self) {
        self.counters().poll_ticks += 1;
    }

    pub fn inc_transient_poll_errors(&self) {
        self.counters().transient_poll_errors += 1;
    }

    pub fn inc_stale_responses(&self) {
        self.counters().stale_responses += 1;
    }

    pub fn record_latency(&self, phase: &str, duration_ms: u64) {
        let record = LatencyRecord {
            phase: phase.to_string(),
            duration_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());
        latencies.push(record);
        // 最新1000件のみ保持
        if latencies.len() > MAX_LATENCY_RECORDS {
            let excess = latencies.len() - MAX_LATENCY_RECORDS;
            latencies.drain(0..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = self.counters();
        let latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());

        let avg = |phase: &str| -> Option<f64> {
            let vals: Vec<f64> = latencies
                .iter()
                .filter(|r| r.phase == phase)
                .map(|r| r.duration_ms as f64)
                .collect();
            if vals.is_empty() {
                None
            } else {
                Some(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        };

        let recent: Vec<LatencyRecord> = latencies.iter().rev().take(20).cloned().collect();

        MetricsSummary {
            jobs_started: c.jobs_started,
            jobs_completed: c.jobs_completed,
            jobs_failed: c.jobs_failed,
            inline_deliveries: c.inline_deliveries,
            poll_ticks: c.poll_ticks,
            transient_poll_errors: c.transient_poll_errors,
            stale_responses: c.stale_responses,
            avg_latency_ms: AvgLatency {
                submit: avg("submit"),
                upload: avg("upload"),
                total: avg("total"),
            },
            recent_latencies: recent,
        }
    }
}
