use std::fs;
use std::path::{Path, PathBuf};

use super::ffmpeg::{build_piece_cut_command, new_tool_command, run_ffmpeg};
use super::ExtractionPiece;
use crate::error::{ExportError, ExportResult};

pub(crate) fn create_export_workspace(temp_root: &Path, output_path: &Path) -> ExportResult<PathBuf> {
    let stem = output_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("killstreak");
    let unique_suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    let workspace = temp_root.join(format!(".{stem}_pieces_{unique_suffix}"));
    fs::create_dir_all(&workspace)?;
    Ok(workspace)
}

pub(crate) fn filter_script_path(workspace: &Path) -> PathBuf {
    workspace.join("filter_complex.txt")
}

pub(crate) fn build_piece_output_path(workspace: &Path, index: usize) -> PathBuf {
    workspace.join(format!("piece_{index:04}.mp4"))
}

fn concat_file_path(workspace: &Path) -> PathBuf {
    workspace.join("pieces.txt")
}

fn format_concat_entry(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let escaped = normalized.replace('\'', "'\\''");
    format!("file '{escaped}'\n")
}

fn write_concat_file(workspace: &Path, piece_paths: &[PathBuf]) -> ExportResult<PathBuf> {
    let concat_path = concat_file_path(workspace);
    let contents: String = piece_paths
        .iter()
        .map(|piece_path| format_concat_entry(piece_path))
        .collect();

    fs::write(&concat_path, contents)?;
    Ok(concat_path)
}

fn move_piece_to_final_output(piece_path: &Path, output_path: &Path) -> ExportResult<()> {
    if output_path.exists() {
        fs::remove_file(output_path)?;
    }

    match fs::rename(piece_path, output_path) {
        Ok(()) => Ok(()),
        Err(rename_error) => {
            tracing::debug!(
                piece_path = %piece_path.display(),
                "Rename into output failed, copying instead: {rename_error}"
            );
            fs::copy(piece_path, output_path)?;
            fs::remove_file(piece_path)?;
            Ok(())
        }
    }
}

fn collect_non_empty_pieces(piece_paths: &[PathBuf]) -> Vec<PathBuf> {
    piece_paths
        .iter()
        .filter(|piece_path| {
            piece_path
                .metadata()
                .is_ok_and(|metadata| metadata.is_file() && metadata.len() > 0)
        })
        .cloned()
        .collect()
}

fn concat_pieces(
    ffmpeg_binary_path: &Path,
    workspace: &Path,
    piece_paths: &[PathBuf],
    output_path: &Path,
) -> ExportResult<()> {
    if piece_paths.is_empty() {
        return Err(ExportError::ffmpeg_failed(None, "No pieces were produced"));
    }

    if piece_paths.len() == 1 {
        return move_piece_to_final_output(&piece_paths[0], output_path);
    }

    let concat_path = write_concat_file(workspace, piece_paths)?;

    let mut command = new_tool_command(ffmpeg_binary_path);
    command
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("warning")
        .arg("-y")
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(&concat_path)
        .arg("-c")
        .arg("copy")
        .arg("-movflags")
        .arg("+faststart")
        .arg(output_path);

    run_ffmpeg(command)
}

pub(crate) fn extract_per_piece(
    ffmpeg_binary_path: &Path,
    workspace: &Path,
    pieces: &[ExtractionPiece],
    output_path: &Path,
) -> ExportResult<()> {
    let mut piece_paths = Vec::with_capacity(pieces.len());
    for (index, piece) in pieces.iter().enumerate() {
        let piece_path = build_piece_output_path(workspace, index);
        let command = build_piece_cut_command(ffmpeg_binary_path, piece, &piece_path);
        if let Err(error) = run_ffmpeg(command) {
            tracing::warn!(
                clip_path = %piece.clip_path.display(),
                piece_index = index,
                "Failed to cut piece: {error}"
            );
            return Err(error);
        }
        piece_paths.push(piece_path);
    }

    // A streak missing footage is a failed export, not a shorter one.
    let produced = collect_non_empty_pieces(&piece_paths);
    if produced.len() < pieces.len() {
        return Err(ExportError::ffmpeg_failed(
            None,
            format!(
                "Only {} of {} pieces were produced",
                produced.len(),
                pieces.len()
            ),
        ));
    }

    concat_pieces(ffmpeg_binary_path, workspace, &produced, output_path)
}

pub(crate) fn cleanup_export_workspace(workspace: &Path) {
    if let Err(error) = fs::remove_dir_all(workspace) {
        tracing::warn!(
            workspace = %workspace.display(),
            "Failed to remove export workspace: {error}"
        );
    }
}
