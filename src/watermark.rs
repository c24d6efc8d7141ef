use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ExportResult;
use crate::settings::write_json_atomically;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatermarkState {
    last_processed_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct WatermarkStore {
    state_path: PathBuf,
}

impl WatermarkStore {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn load(&self) -> Option<NaiveDateTime> {
        let raw_json = match std::fs::read_to_string(&self.state_path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => return None,
            Err(error) => {
                tracing::warn!(
                    state_path = %self.state_path.display(),
                    "Failed to read processing state, processing all clips: {error}"
                );
                return None;
            }
        };

        match serde_json::from_str::<WatermarkState>(&raw_json) {
            Ok(state) => Some(state.last_processed_at),
            Err(error) => {
                tracing::warn!(
                    state_path = %self.state_path.display(),
                    "Failed to parse processing state, processing all clips: {error}"
                );
                None
            }
        }
    }

    pub fn save(&self, last_processed_at: NaiveDateTime) -> ExportResult<()> {
        write_json_atomically(&self.state_path, &WatermarkState { last_processed_at })?;
        tracing::info!(
            state_path = %self.state_path.display(),
            last_processed_at = %last_processed_at,
            "Updated processing state"
        );
        Ok(())
    }

    pub fn reset(&self) -> ExportResult<bool> {
        match std::fs::remove_file(&self.state_path) {
            Ok(()) => {
                tracing::info!(state_path = %self.state_path.display(), "Processing state reset");
                Ok(true)
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

pub fn should_advance_watermark(exported_clusters: usize, cancelled: bool) -> bool {
    exported_clusters > 0 && !cancelled
}

#[cfg(test)]
mod tests {
    use super::{should_advance_watermark, WatermarkStore};
    use chrono::NaiveDate;

    #[test]
    fn missing_state_means_no_watermark() {
        let temp_directory = tempfile::tempdir().expect("Expected a temporary directory");
        let store = WatermarkStore::new(temp_directory.path().join("processing_state.json"));

        assert_eq!(store.load(), None);
        assert!(!store.reset().expect("Expected reset of a missing file to succeed"));
    }

    #[test]
    fn saves_loads_and_resets_watermark() {
        let temp_directory = tempfile::tempdir().expect("Expected a temporary directory");
        let store = WatermarkStore::new(temp_directory.path().join("processing_state.json"));
        let timestamp = NaiveDate::from_ymd_opt(2025, 4, 14)
            .and_then(|date| date.and_hms_milli_opt(21, 3, 7, 250))
            .expect("Expected a valid timestamp");

        store.save(timestamp).expect("Expected watermark save to succeed");
        assert_eq!(store.load(), Some(timestamp));

        let raw_json = std::fs::read_to_string(store.state_path())
            .expect("Expected the state file to exist");
        assert!(raw_json.contains("lastProcessedAt"));

        assert!(store.reset().expect("Expected reset to succeed"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn malformed_state_is_ignored() {
        let temp_directory = tempfile::tempdir().expect("Expected a temporary directory");
        let state_path = temp_directory.path().join("processing_state.json");
        std::fs::write(&state_path, "{ not json").expect("Expected state file write to succeed");

        assert_eq!(WatermarkStore::new(state_path).load(), None);
    }

    #[test]
    fn advances_only_after_a_successful_uncancelled_run() {
        assert!(should_advance_watermark(1, false));
        assert!(!should_advance_watermark(0, false));
        assert!(!should_advance_watermark(3, true));
    }
}
