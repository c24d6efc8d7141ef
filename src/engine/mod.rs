pub mod coverage;
pub mod dedup;
pub mod intervals;
pub mod model;

use chrono::Duration;
use serde::Serialize;

use crate::catalog::ClipDescriptor;
use crate::settings::ExportSettings;
use coverage::{coverage_gaps, is_fully_covered, select_window_coverage, CoverageOptions};
use dedup::deduplicate_segments;
use intervals::{
    build_target_intervals, derive_export_windows, filter_clusters_by_kills,
    merge_target_intervals,
};
use model::{
    seconds_to_delta, CoverageResult, CoverageSegment, EventCluster, Interval,
    DEFAULT_MIN_TRIMMED_SEGMENT_SECONDS,
};

pub fn identify_clusters(
    clips: &[ClipDescriptor],
    lead: Duration,
    tail: Duration,
    gap_threshold: Duration,
    min_kills: usize,
) -> Vec<EventCluster<'_>> {
    let targets = build_target_intervals(clips, lead, tail);
    let clusters = merge_target_intervals(targets, gap_threshold);
    let merged_count = clusters.len();
    let kept = filter_clusters_by_kills(clusters, min_kills);

    tracing::debug!(
        clips = clips.len(),
        merged_clusters = merged_count,
        kept_clusters = kept.len(),
        min_kills,
        "Identified kill clusters"
    );

    kept
}

pub fn select_coverage<'a>(
    cluster: &EventCluster<'_>,
    clips: &'a [ClipDescriptor],
    min_overlap: Duration,
    gap_tolerance: Duration,
) -> CoverageResult<'a> {
    let options = CoverageOptions {
        min_overlap,
        gap_tolerance,
        min_trimmed_segment: seconds_to_delta(DEFAULT_MIN_TRIMMED_SEGMENT_SECONDS),
    };
    select_window_coverage(cluster.interval, clips, &options)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPlan<'a> {
    pub group_index: usize,
    pub cluster: EventCluster<'a>,
    pub windows: Vec<Interval>,
    pub segments: Vec<CoverageSegment<'a>>,
    pub fully_covered: bool,
    pub gaps: Vec<Interval>,
    pub window_narrower_than_cluster: bool,
}

impl ClusterPlan<'_> {
    pub fn kill_count(&self) -> usize {
        self.cluster.kill_count()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPlan<'a> {
    pub total_clusters: usize,
    pub clusters: Vec<ClusterPlan<'a>>,
    pub cancelled: bool,
}

fn plan_cluster<'a>(
    group_index: usize,
    cluster: EventCluster<'a>,
    clips: &'a [ClipDescriptor],
    settings: &ExportSettings,
) -> ClusterPlan<'a> {
    let options = settings.coverage_options();
    let export_windows =
        derive_export_windows(&cluster, settings.export_lead(), settings.export_tail());

    if export_windows.narrower_than_cluster {
        tracing::warn!(
            group_index,
            cluster_start = %cluster.interval.start,
            cluster_end = %cluster.interval.end,
            windows = export_windows.windows.len(),
            "Export windows are narrower than the detected cluster"
        );
    }

    let mut segments: Vec<CoverageSegment<'a>> = Vec::new();
    for window in &export_windows.windows {
        let result = select_window_coverage(*window, clips, &options);
        segments.extend(result.segments);
    }

    let segments = deduplicate_segments(segments, settings.redundant_overlap_ratio);

    let mut gaps = Vec::new();
    let mut fully_covered = !segments.is_empty();
    for window in &export_windows.windows {
        let window_gaps = coverage_gaps(*window, &segments);
        fully_covered &= is_fully_covered(*window, &window_gaps, options.gap_tolerance);
        gaps.extend(window_gaps);
    }

    tracing::info!(
        group_index,
        kills = cluster.kill_count(),
        segments = segments.len(),
        fully_covered,
        "Planned cluster"
    );

    ClusterPlan {
        group_index,
        cluster,
        windows: export_windows.windows,
        segments,
        fully_covered,
        gaps,
        window_narrower_than_cluster: export_windows.narrower_than_cluster,
    }
}

pub fn plan_batch<'a, F>(
    clips: &'a [ClipDescriptor],
    settings: &ExportSettings,
    is_running: F,
) -> BatchPlan<'a>
where
    F: Fn() -> bool,
{
    let clusters = identify_clusters(
        clips,
        settings.lead(),
        settings.tail(),
        settings.gap_threshold(),
        settings.min_kills,
    );
    let total_clusters = clusters.len();

    tracing::info!(
        clips = clips.len(),
        clusters = total_clusters,
        "Found qualifying kill clusters"
    );

    let mut planned = Vec::with_capacity(total_clusters);
    for (position, cluster) in clusters.into_iter().enumerate() {
        if !is_running() {
            tracing::warn!(
                planned = planned.len(),
                total_clusters,
                "Planning cancelled"
            );
            return BatchPlan {
                total_clusters,
                clusters: planned,
                cancelled: true,
            };
        }

        planned.push(plan_cluster(position + 1, cluster, clips, settings));
    }

    BatchPlan {
        total_clusters,
        clusters: planned,
        cancelled: false,
    }
}
