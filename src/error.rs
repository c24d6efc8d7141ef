use std::path::PathBuf;

use thiserror::Error;

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid clip '{path}': {reason}")]
    InvalidClip { path: PathBuf, reason: String },

    #[error("Input directory not found: {0}")]
    InputDirectoryMissing(PathBuf),

    #[error("{tool} binary was not found. Set {env_var} or place it next to the executable or on PATH")]
    ToolNotFound {
        tool: &'static str,
        env_var: &'static str,
    },

    #[error("FFprobe failed for '{path}': {message}")]
    FfprobeFailed { path: PathBuf, message: String },

    #[error("FFmpeg failed (code {code:?}): {stderr}")]
    FfmpegFailed { code: Option<i32>, stderr: String },

    #[error("Background worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("Processing was cancelled")]
    Cancelled,
}

impl ExportError {
    pub fn invalid_clip(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidClip {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn ffmpeg_failed(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::FfmpegFailed {
            code,
            stderr: stderr.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExportError;

    #[test]
    fn invalid_clip_message_names_path_and_reason() {
        let error = ExportError::invalid_clip("clips/a.mp4", "end is not after start");
        assert_eq!(
            error.to_string(),
            "Invalid clip 'clips/a.mp4': end is not after start"
        );
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn fails() -> Result<(), ExportError> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }

        assert!(matches!(fails(), Err(ExportError::Io(_))));
    }
}
