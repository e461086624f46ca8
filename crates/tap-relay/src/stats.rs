//! Usage-statistics record, bounded prediction history, and the single
//! owning handle that all mutation funnels through.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StatsStore;

/// Maximum retained prediction history entries.
pub const HISTORY_CAP: usize = 100;

/// One entry in the bounded prediction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<f64>>,
    pub prediction: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// The persisted statistics record.
///
/// Field-level serde defaults give shallow-merge semantics on load: fields
/// present in the snapshot win, missing fields keep their startup defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default = "default_training_samples")]
    pub training_samples: u64,
    #[serde(default = "default_features_count")]
    pub features_count: u64,
    #[serde(default = "today_string")]
    pub last_updated: String,

    #[serde(default)]
    pub total_predictions: u64,
    #[serde(default)]
    pub confirmed_predictions: u64,
    #[serde(default)]
    pub rejected_predictions: u64,
    #[serde(default)]
    pub total_confidence: f64,
    #[serde(default)]
    pub prediction_history: VecDeque<PredictionRecord>,
    #[serde(default = "Utc::now")]
    pub start_time: DateTime<Utc>,

    #[serde(default)]
    pub api_calls_today: u64,
    #[serde(default = "today_string")]
    pub last_reset: String,
}

/// Snapshot returned by the stats endpoints: raw counters plus derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub model_type: String,
    pub training_samples: u64,
    pub features_count: u64,
    pub last_updated: String,

    pub total_predictions: u64,
    pub confirmed_predictions: u64,
    pub rejected_predictions: u64,
    pub avg_confidence: f64,

    pub api_calls_today: u64,
    pub recent_predictions_24h: usize,
    pub uptime_hours: f64,

    pub confirmation_rate: f64,
    pub last_prediction: Option<DateTime<Utc>>,
}

fn default_model_type() -> String {
    "Random Forest Classifier".to_string()
}

fn default_training_samples() -> u64 {
    9564
}

fn default_features_count() -> u64 {
    4
}

/// Today's calendar date in the process-local time zone. Daily counters
/// compare this by exact string equality, never by elapsed duration.
pub(crate) fn today_string() -> String {
    Local::now().date_naive().to_string()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}

impl Default for ModelStats {
    fn default() -> Self {
        Self {
            model_type: default_model_type(),
            training_samples: default_training_samples(),
            features_count: default_features_count(),
            last_updated: today_string(),
            total_predictions: 0,
            confirmed_predictions: 0,
            rejected_predictions: 0,
            total_confidence: 0.0,
            prediction_history: VecDeque::new(),
            start_time: Utc::now(),
            api_calls_today: 0,
            last_reset: today_string(),
        }
    }
}

impl ModelStats {
    /// Count one API call, rolling the daily counter over first if the local
    /// calendar date has changed since `last_reset`.
    pub fn count_api_call(&mut self) {
        self.roll_day_over(&today_string());
        self.api_calls_today += 1;
    }

    /// Reconcile the daily counter against today without counting a call.
    /// Applied to freshly loaded snapshots.
    pub fn reconcile_day(&mut self) {
        self.roll_day_over(&today_string());
    }

    fn roll_day_over(&mut self, today: &str) {
        if self.last_reset != today {
            self.api_calls_today = 0;
            self.last_reset = today.to_string();
        }
    }

    /// Append to the bounded history, evicting the oldest entry at capacity.
    pub fn push_history(&mut self, record: PredictionRecord) {
        self.prediction_history.push_back(record);
        while self.prediction_history.len() > HISTORY_CAP {
            self.prediction_history.pop_front();
        }
    }

    /// Zero all runtime counters and history. Descriptive metadata is kept;
    /// `start_time` and `last_reset` restart from now.
    pub fn reset_runtime(&mut self) {
        self.total_predictions = 0;
        self.confirmed_predictions = 0;
        self.rejected_predictions = 0;
        self.total_confidence = 0.0;
        self.prediction_history.clear();
        self.api_calls_today = 0;
        self.start_time = Utc::now();
        self.last_reset = today_string();
    }

    /// Derive the augmented report served by the stats endpoints.
    pub fn report(&self, now: DateTime<Utc>) -> StatsReport {
        let avg_confidence = if self.total_predictions > 0 {
            self.total_confidence / self.total_predictions as f64
        } else {
            0.0
        };
        let confirmation_rate = if self.total_predictions > 0 {
            self.confirmed_predictions as f64 / self.total_predictions as f64
        } else {
            0.0
        };
        let cutoff = now - Duration::hours(24);
        let recent_predictions_24h = self
            .prediction_history
            .iter()
            .filter(|p| p.timestamp > cutoff)
            .count();
        let uptime_hours = (now - self.start_time).num_milliseconds() as f64 / 3_600_000.0;

        StatsReport {
            model_type: self.model_type.clone(),
            training_samples: self.training_samples,
            features_count: self.features_count,
            last_updated: self.last_updated.clone(),
            total_predictions: self.total_predictions,
            confirmed_predictions: self.confirmed_predictions,
            rejected_predictions: self.rejected_predictions,
            avg_confidence: round4(avg_confidence),
            api_calls_today: self.api_calls_today,
            recent_predictions_24h,
            uptime_hours: round2(uptime_hours),
            confirmation_rate: round2(confirmation_rate),
            last_prediction: self.prediction_history.back().map(|p| p.timestamp),
        }
    }
}

/// Single owner of the mutable statistics record. Cheap to clone (Arc).
///
/// Every logical read-modify-write runs to completion under one lock, so
/// counter updates and history pushes are strictly atomic with respect to
/// each other.
#[derive(Clone)]
pub struct StatsHandle {
    record: Arc<Mutex<ModelStats>>,
    store: StatsStore,
}

impl StatsHandle {
    /// Fresh handle with a default record. [`StatsHandle::load`] hydrates
    /// from disk instead.
    pub fn new(store: StatsStore) -> Self {
        Self {
            record: Arc::new(Mutex::new(ModelStats::default())),
            store,
        }
    }

    /// Hydrate from the snapshot file, falling back to defaults on any
    /// read or parse failure.
    pub async fn load(store: StatsStore) -> Self {
        let record = store.load().await;
        Self {
            record: Arc::new(Mutex::new(record)),
            store,
        }
    }

    /// Clone of the current record.
    pub fn snapshot(&self) -> ModelStats {
        self.lock().clone()
    }

    /// Derived report as of now.
    pub fn report(&self) -> StatsReport {
        self.lock().report(Utc::now())
    }

    /// Apply a mutation under the lock and return the updated record.
    pub fn apply<F>(&self, mutate: F) -> ModelStats
    where
        F: FnOnce(&mut ModelStats),
    {
        let mut record = self.lock();
        mutate(&mut record);
        record.clone()
    }

    /// Persist the current record without blocking the caller. Failures are
    /// logged inside the store and never surface here.
    pub fn flush_background(&self) {
        let snapshot = self.snapshot();
        let store = self.store.clone();
        tokio::spawn(async move {
            store.save(&snapshot).await;
        });
    }

    /// Awaited save, for the final flush on shutdown.
    pub async fn flush(&self) {
        let snapshot = self.snapshot();
        self.store.save(&snapshot).await;
    }

    fn lock(&self) -> MutexGuard<'_, ModelStats> {
        // A poisoned lock only means a panicked request; the counters are
        // still usable.
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
