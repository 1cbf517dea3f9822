//! Rolling per-model call statistics.
//!
//! Every completed or failed backend call is reported here via
//! [`MetricsStore::record`]. Rows are keyed by (model id, task type),
//! created lazily on first observation, and never deleted within the
//! process lifetime. Latency and cost are smoothed with an EWMA so the
//! router can weigh recent behavior over stale history.
//!
//! Locking discipline: the row map sits behind an async `RwLock`; each row
//! sits behind its own mutex. Updates for different keys proceed in
//! parallel, updates for the same key serialize on the row lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::TaskType;
use crate::hlog_trace;

/// EWMA smoothing factor: weight given to the newest observation.
pub const EWMA_ALPHA: f64 = 0.2;

/// How a reported backend call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Error,
    /// A fallback candidate was used and succeeded.
    FallbackSuccess,
    /// A fallback candidate was used and also failed.
    FallbackError,
}

impl CallOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, CallOutcome::Error | CallOutcome::FallbackError)
    }
}

/// One reported backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCall {
    pub model_id: String,
    pub task_type: TaskType,
    pub latency_ms: f64,
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
    #[serde(default)]
    pub cost: Option<f64>,
    pub outcome: CallOutcome,
}

impl ModelCall {
    pub fn new(model_id: &str, task_type: TaskType, latency_ms: f64, outcome: CallOutcome) -> Self {
        Self {
            model_id: model_id.to_string(),
            task_type,
            latency_ms,
            input_tokens: None,
            output_tokens: None,
            cost: None,
            outcome,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_tokens(mut self, input: u32, output: u32) -> Self {
        self.input_tokens = Some(input);
        self.output_tokens = Some(output);
        self
    }
}

/// Smoothed statistics for one (model, task type) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingStats {
    pub calls: u64,
    pub errors: u64,
    /// EWMA-smoothed latency, seeded with the first observation.
    pub ewma_latency_ms: f64,
    /// EWMA-smoothed cost; absent until a call reports one.
    pub ewma_cost: Option<f64>,
    pub last_call: DateTime<Utc>,
    pub last_error: Option<DateTime<Utc>>,
}

impl RollingStats {
    fn first(call: &ModelCall, now: DateTime<Utc>) -> Self {
        let is_error = call.outcome.is_error();
        Self {
            calls: 1,
            errors: if is_error { 1 } else { 0 },
            ewma_latency_ms: call.latency_ms,
            ewma_cost: call.cost,
            last_call: now,
            last_error: if is_error { Some(now) } else { None },
        }
    }

    fn update(&mut self, call: &ModelCall, now: DateTime<Utc>) {
        self.calls += 1;
        if call.outcome.is_error() {
            self.errors += 1;
            self.last_error = Some(now);
        }
        self.last_call = now;
        self.ewma_latency_ms = EWMA_ALPHA * call.latency_ms + (1.0 - EWMA_ALPHA) * self.ewma_latency_ms;
        if let Some(cost) = call.cost {
            self.ewma_cost = Some(match self.ewma_cost {
                Some(prev) => EWMA_ALPHA * cost + (1.0 - EWMA_ALPHA) * prev,
                None => cost,
            });
        }
    }

    /// Fraction of reported calls that ended in error.
    pub fn error_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.errors as f64 / self.calls as f64
        }
    }
}

/// One row of a stats snapshot, for dashboards and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRow {
    pub model_id: String,
    pub task_type: TaskType,
    #[serde(flatten)]
    pub stats: RollingStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StatsKey {
    model_id: String,
    task_type: TaskType,
}

/// Concurrent store of [`RollingStats`] rows.
#[derive(Debug, Default)]
pub struct MetricsStore {
    rows: RwLock<HashMap<StatsKey, Arc<Mutex<RollingStats>>>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one backend call, creating the row on first observation.
    pub async fn record(&self, call: &ModelCall) {
        let now = Utc::now();
        let key = StatsKey {
            model_id: call.model_id.clone(),
            task_type: call.task_type,
        };
        hlog_trace!(
            "MetricsStore::record model={} task={} outcome={:?} latency={}ms",
            call.model_id,
            call.task_type,
            call.outcome,
            call.latency_ms
        );

        // Fast path: the row already exists, update it under its own lock
        // so other keys stay uncontended.
        {
            let rows = self.rows.read().await;
            if let Some(row) = rows.get(&key) {
                let mut stats = row.lock().unwrap_or_else(|e| e.into_inner());
                stats.update(call, now);
                return;
            }
        }

        // Slow path: create the row. Another writer may have raced us here,
        // so re-check under the write lock.
        let mut rows = self.rows.write().await;
        match rows.get(&key) {
            Some(row) => {
                let mut stats = row.lock().unwrap_or_else(|e| e.into_inner());
                stats.update(call, now);
            }
            None => {
                rows.insert(key, Arc::new(Mutex::new(RollingStats::first(call, now))));
            }
        }
    }

    /// Current stats for one (model, task type) pair, if any call has been
    /// recorded for it.
    pub async fn get(&self, model_id: &str, task_type: TaskType) -> Option<RollingStats> {
        let key = StatsKey {
            model_id: model_id.to_string(),
            task_type,
        };
        let rows = self.rows.read().await;
        rows.get(&key)
            .map(|row| row.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    /// All rows, most-recent-call first.
    pub async fn snapshot(&self) -> Vec<StatsRow> {
        let rows = self.rows.read().await;
        let mut out: Vec<StatsRow> = rows
            .iter()
            .map(|(key, row)| StatsRow {
                model_id: key.model_id.clone(),
                task_type: key.task_type,
                stats: row.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            })
            .collect();
        out.sort_by(|a, b| b.stats.last_call.cmp(&a.stats.last_call));
        out
    }

    /// Number of distinct (model, task type) rows observed so far.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}
