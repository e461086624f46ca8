//! Durable JSON snapshots of the statistics record.
//!
//! The snapshot is rewritten wholesale on every save. Read and write
//! failures are never fatal: a missing or malformed file falls back to the
//! default record, a failed write is logged and dropped.

use std::path::PathBuf;

use crate::stats::ModelStats;

/// File-backed snapshot store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read and parse the snapshot, then reconcile the daily counter against
    /// today's date before handing the record out.
    pub async fn load(&self) -> ModelStats {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::info!(path = %self.path.display(), "No statistics snapshot, starting fresh");
                return ModelStats::default();
            }
        };

        match serde_json::from_slice::<ModelStats>(&bytes) {
            Ok(mut record) => {
                record.reconcile_day();
                tracing::info!(path = %self.path.display(), "Loaded statistics snapshot");
                record
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Malformed statistics snapshot, starting fresh"
                );
                ModelStats::default()
            }
        }
    }

    /// Overwrite the snapshot wholesale. Failures are logged, never raised.
    pub async fn save(&self, record: &ModelStats) {
        if let Err(e) = self.try_save(record).await {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to save statistics snapshot"
            );
        }
    }

    async fn try_save(&self, record: &ModelStats) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(record)?;
        // Write-then-rename keeps a crash from truncating the snapshot.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::PredictionRecord;
    use chrono::Utc;

    #[tokio::test]
    async fn test_round_trip_preserves_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::new(dir.path().join("stats.json"));

        let mut record = ModelStats::default();
        record.total_predictions = 42;
        record.confirmed_predictions = 30;
        record.rejected_predictions = 12;
        record.total_confidence = 25.5;
        record.api_calls_today = 9;
        record.push_history(PredictionRecord {
            timestamp: Utc::now(),
            features: Some(vec![300.0, 1.0, 1.0, 300.0]),
            prediction: "CONFIRMED".to_string(),
            confidence: 1.0,
            reasoning: Some("Favorable orbital period".to_string()),
        });

        store.save(&record).await;
        let loaded = store.load().await;

        // Same calendar day, so the daily reconcile is a no-op and the
        // loaded record equals the saved one.
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::new(dir.path().join("absent.json"));

        let loaded = store.load().await;
        assert_eq!(loaded.total_predictions, 0);
        assert_eq!(loaded.model_type, "Random Forest Classifier");
        assert!(loaded.prediction_history.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let loaded = StatsStore::new(&path).load().await;
        assert_eq!(loaded.total_predictions, 0);
        assert_eq!(loaded.api_calls_today, 0);
    }

    #[tokio::test]
    async fn test_partial_snapshot_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        tokio::fs::write(&path, br#"{"total_predictions": 5, "api_calls_today": 2}"#)
            .await
            .unwrap();

        let loaded = StatsStore::new(&path).load().await;
        assert_eq!(loaded.total_predictions, 5);
        assert_eq!(loaded.api_calls_today, 2);
        // Absent fields keep their defaults.
        assert_eq!(loaded.training_samples, 9564);
        assert_eq!(loaded.features_count, 4);
    }

    #[tokio::test]
    async fn test_stale_snapshot_resets_daily_counter_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        tokio::fs::write(
            &path,
            br#"{"api_calls_today": 17, "last_reset": "2019-06-01", "total_predictions": 3}"#,
        )
        .await
        .unwrap();

        let loaded = StatsStore::new(&path).load().await;
        assert_eq!(loaded.api_calls_today, 0);
        assert_eq!(loaded.last_reset, crate::stats::today_string());
        // Only the daily counter resets; everything else survives.
        assert_eq!(loaded.total_predictions, 3);
    }

    #[tokio::test]
    async fn test_save_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::new(dir.path().join("no-such-dir").join("stats.json"));
        // Must not panic or return an error.
        store.save(&ModelStats::default()).await;
    }
}
