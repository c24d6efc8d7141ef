pub mod ffmpeg;
pub mod segments;
pub mod strategy;

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use crate::engine::{BatchPlan, ClusterPlan};
use crate::error::ExportResult;
use segments::{cleanup_export_workspace, create_export_workspace, extract_per_piece, filter_script_path};
use strategy::{strategy_ladder, ExtractionPreference, ExtractionStrategy, HardwareEncoder};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionPiece {
    pub clip_path: PathBuf,
    pub relative_offset_seconds: f64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub output_path: PathBuf,
    pub pieces: Vec<ExtractionPiece>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub succeeded: bool,
    pub preference: ExtractionPreference,
}

pub trait SegmentExtractor {
    fn extract(
        &self,
        request: &ExtractionRequest,
        preference: ExtractionPreference,
    ) -> ExtractionOutcome;
}

pub fn output_file_name(kill_count: usize, first_kill: NaiveDateTime, group_index: usize) -> String {
    format!(
        "killstreak{kill_count}_{}_group{group_index}.mp4",
        first_kill.format("%Y%m%d_%H%M%S")
    )
}

pub fn build_extraction_request(
    cluster_plan: &ClusterPlan<'_>,
    output_directory: &Path,
) -> Option<ExtractionRequest> {
    let first_kill = cluster_plan.cluster.first_event()?;
    if cluster_plan.segments.is_empty() {
        return None;
    }

    let pieces = cluster_plan
        .segments
        .iter()
        .map(|segment| ExtractionPiece {
            clip_path: segment.clip.path().to_path_buf(),
            relative_offset_seconds: segment.relative_offset_seconds(),
            duration_seconds: segment.duration_seconds(),
        })
        .collect();

    Some(ExtractionRequest {
        output_path: output_directory.join(output_file_name(
            cluster_plan.kill_count(),
            first_kill,
            cluster_plan.group_index,
        )),
        pieces,
    })
}

pub struct FfmpegExtractor {
    ffmpeg_binary_path: PathBuf,
    temp_directory: PathBuf,
    drop_duplicate_frames: bool,
    hardware_encoder: Option<HardwareEncoder>,
}

impl FfmpegExtractor {
    pub fn new(ffmpeg_binary_path: PathBuf, temp_directory: PathBuf, drop_duplicate_frames: bool) -> Self {
        let hardware_encoder = ffmpeg::detect_hardware_encoder(&ffmpeg_binary_path);
        Self {
            ffmpeg_binary_path,
            temp_directory,
            drop_duplicate_frames,
            hardware_encoder,
        }
    }

    fn run_strategy(
        &self,
        strategy: ExtractionStrategy,
        request: &ExtractionRequest,
        workspace: &Path,
    ) -> ExportResult<()> {
        if strategy == ExtractionStrategy::PerPieceConcat {
            return extract_per_piece(
                &self.ffmpeg_binary_path,
                workspace,
                &request.pieces,
                &request.output_path,
            );
        }

        let drop_duplicate_frames = self.drop_duplicate_frames && strategy.allows_frame_dedup();
        let script_path = filter_script_path(workspace);
        std::fs::write(
            &script_path,
            ffmpeg::render_filter_script(&request.pieces, drop_duplicate_frames),
        )?;

        let command = ffmpeg::build_filter_graph_command(
            &self.ffmpeg_binary_path,
            &request.pieces,
            &script_path,
            strategy,
            drop_duplicate_frames,
            &request.output_path,
        );
        ffmpeg::run_ffmpeg(command)
    }
}

impl SegmentExtractor for FfmpegExtractor {
    fn extract(
        &self,
        request: &ExtractionRequest,
        preference: ExtractionPreference,
    ) -> ExtractionOutcome {
        if let Some(parent_directory) = request.output_path.parent() {
            if let Err(error) = std::fs::create_dir_all(parent_directory) {
                tracing::error!(
                    output_directory = %parent_directory.display(),
                    "Failed to create output directory: {error}"
                );
                return ExtractionOutcome {
                    succeeded: false,
                    preference,
                };
            }
        }

        for strategy in strategy_ladder(self.hardware_encoder, preference) {
            let workspace = match create_export_workspace(&self.temp_directory, &request.output_path) {
                Ok(workspace) => workspace,
                Err(error) => {
                    tracing::error!(
                        temp_directory = %self.temp_directory.display(),
                        "Failed to create export workspace: {error}"
                    );
                    return ExtractionOutcome {
                        succeeded: false,
                        preference,
                    };
                }
            };

            let result = self.run_strategy(strategy, request, &workspace);
            cleanup_export_workspace(&workspace);

            match result {
                Ok(()) => {
                    tracing::info!(
                        output_path = %request.output_path.display(),
                        strategy = %strategy.label(),
                        pieces = request.pieces.len(),
                        "Exported clip"
                    );
                    return ExtractionOutcome {
                        succeeded: true,
                        preference: preference.remember(strategy),
                    };
                }
                Err(error) => {
                    tracing::warn!(
                        output_path = %request.output_path.display(),
                        strategy = %strategy.label(),
                        "Extraction strategy failed, trying next: {error}"
                    );
                }
            }
        }

        tracing::error!(
            output_path = %request.output_path.display(),
            "All extraction strategies failed"
        );
        ExtractionOutcome {
            succeeded: false,
            preference,
        }
    }
}

pub struct DryRunExtractor;

impl SegmentExtractor for DryRunExtractor {
    fn extract(
        &self,
        request: &ExtractionRequest,
        preference: ExtractionPreference,
    ) -> ExtractionOutcome {
        for piece in &request.pieces {
            tracing::info!(
                output_path = %request.output_path.display(),
                clip_path = %piece.clip_path.display(),
                offset_seconds = piece.relative_offset_seconds,
                duration_seconds = piece.duration_seconds,
                "Dry run: would extract piece"
            );
        }
        ExtractionOutcome {
            succeeded: true,
            preference,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    pub exported: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub output_paths: Vec<PathBuf>,
}

pub fn run_export_batch<F>(
    plan: &BatchPlan<'_>,
    extractor: &dyn SegmentExtractor,
    output_directory: &Path,
    mut preference: ExtractionPreference,
    is_running: F,
) -> (ExportSummary, ExtractionPreference)
where
    F: Fn() -> bool,
{
    let mut summary = ExportSummary {
        cancelled: plan.cancelled,
        ..ExportSummary::default()
    };

    for cluster_plan in &plan.clusters {
        if !is_running() {
            tracing::warn!(
                exported = summary.exported,
                remaining = plan.clusters.len() - summary.exported - summary.failed - summary.skipped,
                "Export cancelled"
            );
            summary.cancelled = true;
            break;
        }

        let Some(request) = build_extraction_request(cluster_plan, output_directory) else {
            tracing::warn!(
                group_index = cluster_plan.group_index,
                "Skipping cluster without coverage"
            );
            summary.skipped += 1;
            continue;
        };

        if !cluster_plan.fully_covered {
            tracing::warn!(
                group_index = cluster_plan.group_index,
                gaps = cluster_plan.gaps.len(),
                "Exporting partially covered cluster"
            );
        }

        let outcome = extractor.extract(&request, preference);
        preference = outcome.preference;
        if outcome.succeeded {
            summary.exported += 1;
            summary.output_paths.push(request.output_path);
        } else {
            summary.failed += 1;
        }
    }

    tracing::info!(
        exported = summary.exported,
        failed = summary.failed,
        skipped = summary.skipped,
        cancelled = summary.cancelled,
        "Export batch finished"
    );

    (summary, preference)
}
