#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::strategy::{ExtractionStrategy, HardwareEncoder};
use super::ExtractionPiece;
use crate::error::{ExportError, ExportResult};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub const FFMPEG_ENV_VAR: &str = "STREAKCUT_FFMPEG";
pub const FFPROBE_ENV_VAR: &str = "STREAKCUT_FFPROBE";

const MPDECIMATE_FILTER: &str = "mpdecimate=hi=64:lo=32:frac=0.33,setpts=N/FRAME_RATE/TB";
const HARDWARE_PRESET: &str = "p7";
const AUDIO_BITRATE: &str = "192k";
const STDERR_TAIL_LINES: usize = 12;

fn executable_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{tool}.exe")
    } else {
        tool.to_string()
    }
}

fn resolve_tool_binary_path(tool: &'static str, env_var: &'static str) -> ExportResult<PathBuf> {
    let binary_name = executable_name(tool);
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(configured) = std::env::var_os(env_var) {
        candidates.push(PathBuf::from(configured));
    }

    if let Ok(current_executable) = std::env::current_exe() {
        if let Some(executable_directory) = current_executable.parent() {
            candidates.push(executable_directory.join("bin").join(&binary_name));
            candidates.push(executable_directory.join(&binary_name));
        }
    }

    if let Some(search_path) = std::env::var_os("PATH") {
        candidates.extend(
            std::env::split_paths(&search_path).map(|directory| directory.join(&binary_name)),
        );
    }

    if let Some(found_path) = candidates.into_iter().find(|path| path.is_file()) {
        tracing::debug!(tool, binary_path = %found_path.display(), "Resolved tool binary");
        return Ok(found_path);
    }

    Err(ExportError::ToolNotFound { tool, env_var })
}

pub fn resolve_ffmpeg_binary_path() -> ExportResult<PathBuf> {
    resolve_tool_binary_path("ffmpeg", FFMPEG_ENV_VAR)
}

pub fn resolve_ffprobe_binary_path() -> ExportResult<PathBuf> {
    resolve_tool_binary_path("ffprobe", FFPROBE_ENV_VAR)
}

pub(crate) fn new_tool_command(binary_path: &Path) -> Command {
    let mut command = Command::new(binary_path);
    #[cfg(target_os = "windows")]
    command.creation_flags(CREATE_NO_WINDOW);
    command.stdin(Stdio::null());
    command
}

pub(crate) fn parse_hardware_encoder(encoders_output: &str) -> Option<HardwareEncoder> {
    let encoders_output = encoders_output.to_lowercase();

    if encoders_output.contains(" h264_nvenc") {
        return Some(HardwareEncoder::H264Nvenc);
    }

    if encoders_output.contains(" hevc_nvenc") {
        return Some(HardwareEncoder::HevcNvenc);
    }

    None
}

pub fn detect_hardware_encoder(ffmpeg_binary_path: &Path) -> Option<HardwareEncoder> {
    let output = new_tool_command(ffmpeg_binary_path)
        .arg("-hide_banner")
        .arg("-encoders")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();

    let encoders_output = match output {
        Ok(result) => String::from_utf8(result.stdout).unwrap_or_default(),
        Err(error) => {
            tracing::warn!("Failed to list FFmpeg encoders: {error}");
            String::new()
        }
    };

    let encoder = parse_hardware_encoder(&encoders_output);
    match encoder {
        Some(encoder) => tracing::info!(encoder = encoder.codec_name(), "Using hardware encoder"),
        None => tracing::info!("No NVENC encoder available, using libx264"),
    }
    encoder
}

pub(crate) fn format_seconds(seconds: f64) -> String {
    format!("{seconds:.3}")
}

pub(crate) fn render_filter_script(pieces: &[ExtractionPiece], drop_duplicate_frames: bool) -> String {
    let mut filter_parts = Vec::with_capacity(pieces.len() * 2 + 1);
    let mut concat_inputs = String::new();

    for (index, piece) in pieces.iter().enumerate() {
        let start = format_seconds(piece.relative_offset_seconds);
        let duration = format_seconds(piece.duration_seconds);

        let mut video_chain =
            format!("[{index}:v]trim=start={start}:duration={duration},setpts=PTS-STARTPTS");
        if drop_duplicate_frames {
            video_chain.push(',');
            video_chain.push_str(MPDECIMATE_FILTER);
        }
        video_chain.push_str(&format!("[v{index}]"));
        filter_parts.push(video_chain);

        filter_parts.push(format!(
            "[{index}:a]atrim=start={start}:duration={duration},asetpts=PTS-STARTPTS[a{index}]"
        ));

        concat_inputs.push_str(&format!("[v{index}][a{index}]"));
    }

    filter_parts.push(format!(
        "{concat_inputs}concat=n={}:v=1:a=1[outv][outa]",
        pieces.len()
    ));

    filter_parts.join(";\n")
}

pub(crate) fn encoder_args(strategy: ExtractionStrategy) -> Vec<&'static str> {
    match strategy {
        ExtractionStrategy::HardwareFilterGraph(encoder) => vec![
            "-c:v",
            encoder.codec_name(),
            "-preset",
            HARDWARE_PRESET,
            "-rc",
            "vbr",
            "-cq",
            "20",
            "-b:v",
            "8M",
            "-maxrate",
            "10M",
            "-bufsize",
            "20M",
        ],
        ExtractionStrategy::SoftwareFilterGraph => {
            vec!["-c:v", "libx264", "-preset", "fast", "-crf", "18"]
        }
        ExtractionStrategy::SimpleSoftwareFilterGraph | ExtractionStrategy::PerPieceConcat => {
            vec!["-c:v", "libx264", "-preset", "ultrafast", "-crf", "23"]
        }
    }
}

pub(crate) fn build_filter_graph_command(
    ffmpeg_binary_path: &Path,
    pieces: &[ExtractionPiece],
    filter_script_path: &Path,
    strategy: ExtractionStrategy,
    drop_duplicate_frames: bool,
    output_path: &Path,
) -> Command {
    let mut command = new_tool_command(ffmpeg_binary_path);
    command
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("warning")
        .arg("-y");

    for piece in pieces {
        command.arg("-i").arg(&piece.clip_path);
    }

    command
        .arg("-filter_complex_script")
        .arg(filter_script_path)
        .arg("-map")
        .arg("[outv]")
        .arg("-map")
        .arg("[outa]")
        .args(encoder_args(strategy))
        .arg("-c:a")
        .arg("aac")
        .arg("-b:a")
        .arg(AUDIO_BITRATE);

    if drop_duplicate_frames {
        command.arg("-vsync").arg("vfr");
    }

    command.arg("-movflags").arg("+faststart").arg(output_path);
    command
}

pub(crate) fn build_piece_cut_command(
    ffmpeg_binary_path: &Path,
    piece: &ExtractionPiece,
    output_path: &Path,
) -> Command {
    let mut command = new_tool_command(ffmpeg_binary_path);
    command
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("warning")
        .arg("-y")
        .arg("-ss")
        .arg(format_seconds(piece.relative_offset_seconds))
        .arg("-i")
        .arg(&piece.clip_path)
        .arg("-t")
        .arg(format_seconds(piece.duration_seconds))
        .args(encoder_args(ExtractionStrategy::PerPieceConcat))
        .arg("-c:a")
        .arg("aac")
        .arg("-b:a")
        .arg(AUDIO_BITRATE)
        .arg(output_path);
    command
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[skip..].join("\n")
}

pub(crate) fn run_ffmpeg(mut command: Command) -> ExportResult<()> {
    let output = command
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        return Err(ExportError::ffmpeg_failed(
            output.status.code(),
            stderr_tail(&output.stderr),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        build_filter_graph_command, encoder_args, parse_hardware_encoder, render_filter_script,
        stderr_tail,
    };
    use crate::export::strategy::{ExtractionStrategy, HardwareEncoder};
    use crate::export::ExtractionPiece;
    use std::path::{Path, PathBuf};

    fn pieces() -> Vec<ExtractionPiece> {
        vec![
            ExtractionPiece {
                clip_path: PathBuf::from("first.mp4"),
                relative_offset_seconds: 5.0,
                duration_seconds: 13.0,
            },
            ExtractionPiece {
                clip_path: PathBuf::from("second.mp4"),
                relative_offset_seconds: 3.0,
                duration_seconds: 17.25,
            },
        ]
    }

    #[test]
    fn detects_nvenc_encoders_in_listing() {
        let listing = " V....D h264_nvenc           NVIDIA NVENC H.264 encoder\n V....D libx264";
        assert_eq!(parse_hardware_encoder(listing), Some(HardwareEncoder::H264Nvenc));

        let hevc_only = " V....D hevc_nvenc           NVIDIA NVENC hevc encoder";
        assert_eq!(parse_hardware_encoder(hevc_only), Some(HardwareEncoder::HevcNvenc));

        assert_eq!(parse_hardware_encoder(" V....D libx264"), None);
    }

    #[test]
    fn renders_trim_and_concat_graph() {
        let script = render_filter_script(&pieces(), false);

        assert_eq!(
            script,
            "[0:v]trim=start=5.000:duration=13.000,setpts=PTS-STARTPTS[v0];\n\
             [0:a]atrim=start=5.000:duration=13.000,asetpts=PTS-STARTPTS[a0];\n\
             [1:v]trim=start=3.000:duration=17.250,setpts=PTS-STARTPTS[v1];\n\
             [1:a]atrim=start=3.000:duration=17.250,asetpts=PTS-STARTPTS[a1];\n\
             [v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"
        );
    }

    #[test]
    fn frame_dedup_adds_mpdecimate_to_video_chains() {
        let script = render_filter_script(&pieces(), true);
        assert_eq!(script.matches("mpdecimate=hi=64:lo=32:frac=0.33").count(), 2);
        assert!(!script.contains("atrim=start=5.000:duration=13.000,mpdecimate"));
    }

    #[test]
    fn software_strategies_use_expected_quality() {
        assert_eq!(
            encoder_args(ExtractionStrategy::SoftwareFilterGraph),
            vec!["-c:v", "libx264", "-preset", "fast", "-crf", "18"]
        );
        assert!(encoder_args(ExtractionStrategy::SimpleSoftwareFilterGraph).contains(&"ultrafast"));
        assert!(encoder_args(ExtractionStrategy::HardwareFilterGraph(HardwareEncoder::HevcNvenc))
            .contains(&"hevc_nvenc"));
    }

    #[test]
    fn filter_graph_command_lists_every_input() {
        let command = build_filter_graph_command(
            Path::new("ffmpeg"),
            &pieces(),
            Path::new("filter.txt"),
            ExtractionStrategy::SoftwareFilterGraph,
            true,
            Path::new("out.mp4"),
        );
        let args: Vec<String> = command
            .get_args()
            .map(|value| value.to_string_lossy().to_string())
            .collect();

        assert_eq!(args.iter().filter(|value| *value == "-i").count(), 2);
        assert!(args.contains(&"-filter_complex_script".to_string()));
        assert!(args.contains(&"vfr".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn keeps_only_the_end_of_long_stderr() {
        let stderr: String = (0..30).map(|line| format!("line {line}\n")).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 18"));
        assert!(tail.ends_with("line 29"));
    }
}
