use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::coverage::CoverageOptions;
use crate::engine::model::{
    seconds_to_delta, DEFAULT_GAP_THRESHOLD_SECONDS, DEFAULT_GAP_TOLERANCE_SECONDS,
    DEFAULT_KILL_POSITION_SECONDS, DEFAULT_LEAD_SECONDS, DEFAULT_MIN_KILLS,
    DEFAULT_MIN_OVERLAP_SECONDS, DEFAULT_MIN_TRIMMED_SEGMENT_SECONDS,
    DEFAULT_REDUNDANT_OVERLAP_RATIO, DEFAULT_TAIL_SECONDS,
};
use crate::error::{ExportError, ExportResult};

pub const DEFAULT_STATE_FILE_NAME: &str = "processing_state.json";
pub const DEFAULT_TEMP_DIRECTORY_NAME: &str = "temp";
/// Upper bound for every seconds setting: one day.
pub const MAX_SECONDS_SETTING: f64 = 86_400.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSettings {
    pub lead_seconds: f64,
    pub tail_seconds: f64,
    pub gap_threshold_seconds: f64,
    pub min_kills: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_lead_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_tail_seconds: Option<f64>,
    pub min_overlap_seconds: f64,
    pub gap_tolerance_seconds: f64,
    pub redundant_overlap_ratio: f64,
    pub min_trimmed_segment_seconds: f64,
    pub kill_position_seconds: f64,
    pub drop_duplicate_frames: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            lead_seconds: DEFAULT_LEAD_SECONDS,
            tail_seconds: DEFAULT_TAIL_SECONDS,
            gap_threshold_seconds: DEFAULT_GAP_THRESHOLD_SECONDS,
            min_kills: DEFAULT_MIN_KILLS,
            export_lead_seconds: None,
            export_tail_seconds: None,
            min_overlap_seconds: DEFAULT_MIN_OVERLAP_SECONDS,
            gap_tolerance_seconds: DEFAULT_GAP_TOLERANCE_SECONDS,
            redundant_overlap_ratio: DEFAULT_REDUNDANT_OVERLAP_RATIO,
            min_trimmed_segment_seconds: DEFAULT_MIN_TRIMMED_SEGMENT_SECONDS,
            kill_position_seconds: DEFAULT_KILL_POSITION_SECONDS,
            drop_duplicate_frames: true,
        }
    }
}

fn ensure_seconds(name: &str, value: f64) -> ExportResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ExportError::InvalidSettings(format!(
            "{name} must be a finite, non-negative number of seconds (got {value})"
        )));
    }
    if value > MAX_SECONDS_SETTING {
        return Err(ExportError::InvalidSettings(format!(
            "{name} must be at most {MAX_SECONDS_SETTING} seconds (got {value})"
        )));
    }
    Ok(())
}

impl ExportSettings {
    pub fn validate(&self) -> ExportResult<()> {
        ensure_seconds("leadSeconds", self.lead_seconds)?;
        ensure_seconds("tailSeconds", self.tail_seconds)?;
        ensure_seconds("gapThresholdSeconds", self.gap_threshold_seconds)?;
        ensure_seconds("minOverlapSeconds", self.min_overlap_seconds)?;
        ensure_seconds("gapToleranceSeconds", self.gap_tolerance_seconds)?;
        ensure_seconds("minTrimmedSegmentSeconds", self.min_trimmed_segment_seconds)?;
        ensure_seconds("killPositionSeconds", self.kill_position_seconds)?;
        if let Some(value) = self.export_lead_seconds {
            ensure_seconds("exportLeadSeconds", value)?;
        }
        if let Some(value) = self.export_tail_seconds {
            ensure_seconds("exportTailSeconds", value)?;
        }

        if self.min_kills == 0 {
            return Err(ExportError::InvalidSettings(
                "minKills must be at least 1".to_string(),
            ));
        }

        let ratio = self.redundant_overlap_ratio;
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            return Err(ExportError::InvalidSettings(format!(
                "redundantOverlapRatio must be in (0, 1] (got {ratio})"
            )));
        }

        Ok(())
    }

    pub fn lead(&self) -> Duration {
        seconds_to_delta(self.lead_seconds)
    }

    pub fn tail(&self) -> Duration {
        seconds_to_delta(self.tail_seconds)
    }

    pub fn gap_threshold(&self) -> Duration {
        seconds_to_delta(self.gap_threshold_seconds)
    }

    pub fn export_lead(&self) -> Option<Duration> {
        self.export_lead_seconds.map(seconds_to_delta)
    }

    pub fn export_tail(&self) -> Option<Duration> {
        self.export_tail_seconds.map(seconds_to_delta)
    }

    pub fn coverage_options(&self) -> CoverageOptions {
        CoverageOptions {
            min_overlap: seconds_to_delta(self.min_overlap_seconds),
            gap_tolerance: seconds_to_delta(self.gap_tolerance_seconds),
            min_trimmed_segment: seconds_to_delta(self.min_trimmed_segment_seconds),
        }
    }
}

pub fn default_state_file(output_directory: &Path) -> PathBuf {
    output_directory.join(DEFAULT_STATE_FILE_NAME)
}

pub fn default_temp_directory(output_directory: &Path) -> PathBuf {
    output_directory.join(DEFAULT_TEMP_DIRECTORY_NAME)
}

pub fn load_settings_file(path: &Path) -> ExportResult<ExportSettings> {
    let raw_json = std::fs::read_to_string(path)?;
    let settings = serde_json::from_str::<ExportSettings>(&raw_json)?;
    settings.validate()?;

    tracing::info!(settings_path = %path.display(), "Loaded export settings");
    Ok(settings)
}

pub fn save_settings_file(path: &Path, settings: &ExportSettings) -> ExportResult<()> {
    settings.validate()?;
    write_json_atomically(path, settings)?;

    tracing::info!(settings_path = %path.display(), "Saved export settings");
    Ok(())
}

fn temporary_path(target_path: &Path) -> PathBuf {
    let Some(file_name) = target_path.file_name().and_then(|value| value.to_str()) else {
        return target_path.with_extension("json.tmp");
    };

    target_path.with_file_name(format!("{file_name}.tmp"))
}

pub(crate) fn write_json_atomically<T: Serialize>(target_path: &Path, value: &T) -> ExportResult<()> {
    if let Some(parent_directory) = target_path.parent() {
        if !parent_directory.as_os_str().is_empty() {
            std::fs::create_dir_all(parent_directory)?;
        }
    }

    let temp_path = temporary_path(target_path);
    let serialized = serde_json::to_string_pretty(value)?;
    std::fs::write(&temp_path, serialized)?;

    if target_path.exists() {
        std::fs::remove_file(target_path)?;
    }

    if let Err(error) = std::fs::rename(&temp_path, target_path) {
        if let Err(cleanup_error) = std::fs::remove_file(&temp_path) {
            tracing::warn!(
                temp_path = %temp_path.display(),
                "Failed to remove temporary file after rename failure: {cleanup_error}"
            );
        }
        return Err(error.into());
    }

    Ok(())
}
