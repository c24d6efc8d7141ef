use chrono::Duration;

use super::model::{delta_to_seconds, CoverageSegment};

pub fn trim_against_accepted<'a>(
    mut segment: CoverageSegment<'a>,
    accepted: &[CoverageSegment<'a>],
    min_segment: Duration,
) -> Option<CoverageSegment<'a>> {
    for existing in accepted {
        let Some(overlap) = segment.span().overlap_with(&existing.span()) else {
            continue;
        };

        if overlap.duration() <= min_segment {
            continue;
        }

        if segment.overlap_start < existing.overlap_end {
            segment.overlap_start = existing.overlap_end;
        }

        if segment.overlap_end <= segment.overlap_start || segment.duration() < min_segment {
            return None;
        }
    }

    Some(segment)
}

fn is_redundant_pair(left: &CoverageSegment<'_>, right: &CoverageSegment<'_>, ratio: f64) -> bool {
    let Some(overlap) = left.span().overlap_with(&right.span()) else {
        return false;
    };

    let shorter = left.duration().min(right.duration());
    delta_to_seconds(overlap.duration()) > ratio * delta_to_seconds(shorter)
}

pub fn deduplicate_segments<'a>(
    mut segments: Vec<CoverageSegment<'a>>,
    ratio: f64,
) -> Vec<CoverageSegment<'a>> {
    segments.sort_by_key(|segment| segment.overlap_start);

    let mut kept: Vec<CoverageSegment<'a>> = Vec::with_capacity(segments.len());
    for segment in segments {
        let conflicting: Vec<usize> = kept
            .iter()
            .enumerate()
            .filter(|(_, existing)| is_redundant_pair(&segment, existing, ratio))
            .map(|(index, _)| index)
            .collect();

        if conflicting.is_empty() {
            kept.push(segment);
            continue;
        }

        if conflicting
            .iter()
            .any(|index| kept[*index].duration() >= segment.duration())
        {
            tracing::debug!(
                clip = %segment.clip.file_name(),
                overlap_start = %segment.overlap_start,
                "Dropping redundant segment"
            );
            continue;
        }

        for index in conflicting.into_iter().rev() {
            let replaced = kept.remove(index);
            tracing::debug!(
                clip = %replaced.clip.file_name(),
                replacement = %segment.clip.file_name(),
                "Replacing redundant segment with a longer one"
            );
        }
        kept.push(segment);
    }

    kept.sort_by_key(|segment| segment.overlap_start);
    kept
}
