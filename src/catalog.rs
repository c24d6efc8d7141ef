use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::Serialize;

use crate::engine::model::seconds_to_delta;
use crate::error::{ExportError, ExportResult};
use crate::export::ffmpeg::new_tool_command;

const RECORDING_EXTENSION: &str = "mp4";
const MAX_FRACTION_DIGITS: usize = 6;
/// DVR clips are short; anything past a day is a broken probe result.
const MAX_CLIP_DURATION_SECONDS: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipDescriptor {
    path: PathBuf,
    start: NaiveDateTime,
    end: NaiveDateTime,
    event_time: NaiveDateTime,
}

impl ClipDescriptor {
    pub fn new(
        path: impl Into<PathBuf>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        event_time: NaiveDateTime,
    ) -> ExportResult<Self> {
        let path = path.into();
        if end <= start {
            return Err(ExportError::invalid_clip(path, "end is not after start"));
        }
        if event_time < start || event_time > end {
            return Err(ExportError::invalid_clip(
                path,
                "event time lies outside the clip",
            ));
        }

        Ok(Self {
            path,
            start,
            end,
            event_time,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn event_time(&self) -> NaiveDateTime {
        self.event_time
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

pub trait DurationProbe {
    fn duration_seconds(&self, path: &Path) -> ExportResult<f64>;
}

pub struct FfprobeDurationProbe {
    ffprobe_binary_path: PathBuf,
}

impl FfprobeDurationProbe {
    pub fn new(ffprobe_binary_path: PathBuf) -> Self {
        Self {
            ffprobe_binary_path,
        }
    }
}

impl DurationProbe for FfprobeDurationProbe {
    fn duration_seconds(&self, path: &Path) -> ExportResult<f64> {
        let output = new_tool_command(&self.ffprobe_binary_path)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            return Err(ExportError::FfprobeFailed {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse::<f64>()
            .map_err(|error| ExportError::FfprobeFailed {
                path: path.to_path_buf(),
                message: format!("Unreadable duration '{}': {error}", stdout.trim()),
            })
    }
}

#[derive(Debug, Default)]
pub struct CatalogScan {
    pub clips: Vec<ClipDescriptor>,
    pub skipped_by_watermark: usize,
    pub rejected: usize,
    pub latest_start: Option<NaiveDateTime>,
}

fn recording_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^War Thunder (\d{4})\.(\d{2})\.(\d{2}) - (\d{2})\.(\d{2})\.(\d{2})(?:\.(\d+))?\.DVR\.mp4$",
            )
            .ok()
        })
        .as_ref()
}

pub fn parse_recording_start(file_name: &str) -> Option<NaiveDateTime> {
    let captures = recording_name_pattern()?.captures(file_name)?;
    let field = |index: usize| -> Option<u32> { captures.get(index)?.as_str().parse().ok() };

    let date = NaiveDate::from_ymd_opt(field(1)? as i32, field(2)?, field(3)?)?;
    let time = NaiveTime::from_hms_opt(field(4)?, field(5)?, field(6)?)?;
    let mut start = NaiveDateTime::new(date, time);

    if let Some(fraction) = captures.get(7) {
        // Digits are a decimal fraction of a second, so "02" is 20 ms and "105" is 105 ms.
        let digits: String = fraction.as_str().chars().take(MAX_FRACTION_DIGITS).collect();
        let padded = format!("{digits:0<width$}", width = MAX_FRACTION_DIGITS);
        if let Ok(micros) = padded.parse::<i64>() {
            start += chrono::Duration::microseconds(micros);
        }
    }

    Some(start)
}

pub fn list_recording_files(input_directory: &Path) -> ExportResult<Vec<PathBuf>> {
    if !input_directory.is_dir() {
        return Err(ExportError::InputDirectoryMissing(
            input_directory.to_path_buf(),
        ));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(input_directory)? {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|extension| extension == RECORDING_EXTENSION)
        {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

pub fn scan_recordings(
    input_directory: &Path,
    probe: &dyn DurationProbe,
    watermark: Option<NaiveDateTime>,
    kill_position_seconds: f64,
) -> ExportResult<CatalogScan> {
    let files = list_recording_files(input_directory)?;
    let mut scan = CatalogScan::default();

    for path in files {
        let file_name = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_default();

        let Some(start) = parse_recording_start(&file_name) else {
            tracing::debug!(file_name = %file_name, "Skipping file without a recording timestamp");
            continue;
        };

        if watermark.is_some_and(|last_processed| start <= last_processed) {
            scan.skipped_by_watermark += 1;
            continue;
        }

        let duration_seconds = match probe.duration_seconds(&path) {
            Ok(duration)
                if duration.is_finite() && duration > 0.0 && duration <= MAX_CLIP_DURATION_SECONDS =>
            {
                duration
            }
            Ok(duration) => {
                tracing::warn!(file_name = %file_name, duration, "Skipping clip with no usable duration");
                scan.rejected += 1;
                continue;
            }
            Err(error) => {
                tracing::warn!(file_name = %file_name, "Skipping clip: {error}");
                scan.rejected += 1;
                continue;
            }
        };

        let Some(end) = start.checked_add_signed(seconds_to_delta(duration_seconds)) else {
            tracing::warn!(file_name = %file_name, duration_seconds, "Skipping clip that ends out of range");
            scan.rejected += 1;
            continue;
        };
        let event_offset = kill_position_seconds.min(duration_seconds / 2.0);
        let event_time = start + seconds_to_delta(event_offset);

        match ClipDescriptor::new(path, start, end, event_time) {
            Ok(clip) => {
                if scan.latest_start.map_or(true, |latest| start > latest) {
                    scan.latest_start = Some(start);
                }
                scan.clips.push(clip);
            }
            Err(error) => {
                tracing::warn!("{error}");
                scan.rejected += 1;
            }
        }
    }

    tracing::info!(
        found = scan.clips.len(),
        skipped_by_watermark = scan.skipped_by_watermark,
        rejected = scan.rejected,
        "Scanned recording directory"
    );

    Ok(scan)
}
