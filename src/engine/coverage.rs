use chrono::{Duration, NaiveDateTime};

use super::dedup::trim_against_accepted;
use super::model::{shift_later, CoverageResult, CoverageSegment, Interval};
use crate::catalog::ClipDescriptor;

#[derive(Debug, Clone, Copy)]
pub struct CoverageOptions {
    pub min_overlap: Duration,
    pub gap_tolerance: Duration,
    pub min_trimmed_segment: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    clip: &'a ClipDescriptor,
    span: Interval,
}

fn clip_span(clip: &ClipDescriptor) -> Interval {
    Interval {
        start: clip.start(),
        end: clip.end(),
    }
}

fn find_containing_clip<'a>(window: Interval, clips: &'a [ClipDescriptor]) -> Option<&'a ClipDescriptor> {
    clips.iter().find(|clip| clip_span(clip).contains(&window))
}

fn collect_candidates<'a>(
    window: Interval,
    clips: &'a [ClipDescriptor],
    min_overlap: Duration,
) -> Vec<Candidate<'a>> {
    let mut candidates: Vec<Candidate<'a>> = clips
        .iter()
        .filter_map(|clip| {
            let span = clip_span(clip).overlap_with(&window)?;
            (span.duration() >= min_overlap).then_some(Candidate { clip, span })
        })
        .collect();

    candidates.sort_by(|left, right| right.span.duration().cmp(&left.span.duration()));
    candidates
}

fn new_coverage(candidate: &Candidate<'_>, covered_up_to: NaiveDateTime, window: Interval) -> Duration {
    candidate.span.end.min(window.end) - candidate.span.start.max(covered_up_to)
}

fn pick_best_extension(
    candidates: &[Candidate<'_>],
    covered_up_to: NaiveDateTime,
    window: Interval,
    gap_tolerance: Duration,
) -> Option<usize> {
    let reach = shift_later(covered_up_to, gap_tolerance);
    let mut best: Option<(usize, Duration)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        if candidate.span.start > reach {
            continue;
        }

        let gained = new_coverage(candidate, covered_up_to, window);
        if gained <= Duration::zero() {
            continue;
        }

        best = match best {
            None => Some((index, gained)),
            Some((best_index, best_gained)) => {
                let earlier_start = candidate.span.start < candidates[best_index].span.start;
                if gained > best_gained || (gained == best_gained && earlier_start) {
                    Some((index, gained))
                } else {
                    Some((best_index, best_gained))
                }
            }
        };
    }

    best.map(|(index, _)| index)
}

fn pick_earliest_start(candidates: &[Candidate<'_>]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, candidate)| candidate.span.start)
        .map(|(index, _)| index)
}

pub fn coverage_gaps(window: Interval, segments: &[CoverageSegment<'_>]) -> Vec<Interval> {
    let mut spans: Vec<Interval> = segments
        .iter()
        .filter_map(|segment| segment.span().overlap_with(&window))
        .collect();
    spans.sort_by_key(|span| span.start);

    let mut gaps = Vec::new();
    let mut cursor = window.start;
    for span in spans {
        if span.start > cursor {
            gaps.push(Interval {
                start: cursor,
                end: span.start,
            });
        }
        cursor = cursor.max(span.end);
    }

    if cursor < window.end {
        gaps.push(Interval {
            start: cursor,
            end: window.end,
        });
    }

    gaps
}

pub fn is_fully_covered(window: Interval, gaps: &[Interval], gap_tolerance: Duration) -> bool {
    gaps.iter()
        .all(|gap| gap.end < window.end && gap.duration() <= gap_tolerance)
}

pub fn select_window_coverage<'a>(
    window: Interval,
    clips: &'a [ClipDescriptor],
    options: &CoverageOptions,
) -> CoverageResult<'a> {
    if window.duration() <= Duration::zero() {
        return CoverageResult::empty();
    }

    if let Some(clip) = find_containing_clip(window, clips) {
        tracing::debug!(
            clip = %clip.file_name(),
            "Window is fully contained in a single clip"
        );
        return CoverageResult {
            segments: vec![CoverageSegment {
                clip,
                overlap_start: window.start,
                overlap_end: window.end,
            }],
            fully_covered: true,
            gaps: Vec::new(),
        };
    }

    let mut candidates = collect_candidates(window, clips, options.min_overlap);
    if candidates.is_empty() {
        tracing::warn!(
            window_start = %window.start,
            window_end = %window.end,
            "No clip overlaps the window"
        );
        return CoverageResult::empty();
    }

    let mut covered_up_to = window.start;
    let mut accepted: Vec<CoverageSegment<'a>> = Vec::new();

    while covered_up_to < window.end && !candidates.is_empty() {
        let picked_index = pick_best_extension(
            &candidates,
            covered_up_to,
            window,
            options.gap_tolerance,
        )
        .or_else(|| pick_earliest_start(&candidates));
        let Some(picked_index) = picked_index else {
            break;
        };

        let candidate = candidates.remove(picked_index);
        let proposed = CoverageSegment {
            clip: candidate.clip,
            overlap_start: candidate.span.start,
            overlap_end: candidate.span.end,
        };

        let Some(segment) =
            trim_against_accepted(proposed, &accepted, options.min_trimmed_segment)
        else {
            tracing::debug!(
                clip = %candidate.clip.file_name(),
                "Dropping candidate that is too short after trimming"
            );
            continue;
        };

        if segment.overlap_end <= covered_up_to {
            tracing::debug!(
                clip = %candidate.clip.file_name(),
                "Dropping candidate that does not advance coverage"
            );
            continue;
        }

        if segment.overlap_start > shift_later(covered_up_to, options.gap_tolerance) {
            tracing::warn!(
                gap_start = %covered_up_to,
                gap_end = %segment.overlap_start,
                clip = %candidate.clip.file_name(),
                "Coverage continues after a gap"
            );
        }

        tracing::debug!(
            clip = %segment.clip.file_name(),
            overlap_start = %segment.overlap_start,
            overlap_end = %segment.overlap_end,
            "Selected coverage segment"
        );

        covered_up_to = segment.overlap_end;
        accepted.push(segment);
    }

    accepted.sort_by_key(|segment| segment.overlap_start);

    let gaps = coverage_gaps(window, &accepted);
    let fully_covered = !accepted.is_empty() && is_fully_covered(window, &gaps, options.gap_tolerance);
    if !fully_covered {
        tracing::warn!(
            window_start = %window.start,
            window_end = %window.end,
            covered_up_to = %covered_up_to,
            segments = accepted.len(),
            "Window is only partially covered"
        );
    }

    CoverageResult {
        segments: accepted,
        fully_covered,
        gaps,
    }
}

#[cfg(test)]
mod tests {
    use super::{coverage_gaps, select_window_coverage, CoverageOptions};
    use crate::catalog::ClipDescriptor;
    use crate::engine::model::{seconds_to_delta, CoverageSegment, Interval};
    use chrono::{NaiveDate, NaiveDateTime};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 14)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("Expected a valid base timestamp")
    }

    fn t(seconds: f64) -> NaiveDateTime {
        base() + seconds_to_delta(seconds)
    }

    fn clip(name: &str, start: f64, end: f64) -> ClipDescriptor {
        ClipDescriptor::new(name, t(start), t(end), t((start + end) / 2.0))
            .expect("Expected a valid clip")
    }

    fn options(gap_tolerance: f64) -> CoverageOptions {
        CoverageOptions {
            min_overlap: seconds_to_delta(0.5),
            gap_tolerance: seconds_to_delta(gap_tolerance),
            min_trimmed_segment: seconds_to_delta(0.5),
        }
    }

    fn spans(segments: &[CoverageSegment<'_>]) -> Vec<(String, NaiveDateTime, NaiveDateTime)> {
        segments
            .iter()
            .map(|segment| {
                (
                    segment.clip.file_name(),
                    segment.overlap_start,
                    segment.overlap_end,
                )
            })
            .collect()
    }

    #[test]
    fn single_containing_clip_is_preferred() {
        let clips = vec![
            clip("partial.mp4", -30.0, 0.0),
            clip("whole.mp4", -20.0, 40.0),
        ];
        let window = Interval::new(t(-15.0), t(15.0));

        let result = select_window_coverage(window, &clips, &options(1.0));

        assert!(result.fully_covered);
        assert_eq!(
            spans(&result.segments),
            vec![("whole.mp4".to_string(), t(-15.0), t(15.0))]
        );
    }

    #[test]
    fn greedy_sweep_chains_two_clips_and_trims_overlap() {
        let clips = vec![clip("first.mp4", -20.0, -2.0), clip("second.mp4", -5.0, 20.0)];
        let window = Interval::new(t(-15.0), t(15.0));

        let result = select_window_coverage(window, &clips, &options(1.0));

        assert!(result.fully_covered);
        assert!(result.gaps.is_empty());
        assert_eq!(
            spans(&result.segments),
            vec![
                ("first.mp4".to_string(), t(-15.0), t(-2.0)),
                ("second.mp4".to_string(), t(-2.0), t(15.0)),
            ]
        );
        assert!(result.segments.iter().all(|segment| segment.is_well_formed()));
    }

    #[test]
    fn prefers_largest_new_coverage_over_earlier_small_clip() {
        let clips = vec![
            clip("small.mp4", -12.0, -8.0),
            clip("opening.mp4", -16.0, -5.0),
            clip("long.mp4", -6.0, 12.0),
            clip("closing.mp4", 10.0, 30.0),
        ];
        let window = Interval::new(t(-15.0), t(15.0));

        let result = select_window_coverage(window, &clips, &options(1.0));

        assert!(result.fully_covered);
        let names: Vec<String> = result
            .segments
            .iter()
            .map(|segment| segment.clip.file_name())
            .collect();
        assert_eq!(names, vec!["opening.mp4", "long.mp4", "closing.mp4"]);
    }

    #[test]
    fn equal_new_coverage_prefers_earlier_overlap_start() {
        let clips = vec![
            clip("opening.mp4", -20.0, 0.0),
            clip("later.mp4", 0.5, 9.5),
            clip("earlier.mp4", 0.2, 9.2),
            clip("closing.mp4", 9.0, 30.0),
        ];
        let window = Interval::new(t(-15.0), t(15.0));

        let result = select_window_coverage(window, &clips, &options(1.0));

        assert!(result.fully_covered);
        assert_eq!(result.gaps, vec![Interval::new(t(0.0), t(0.2))]);
        let names: Vec<String> = result
            .segments
            .iter()
            .map(|segment| segment.clip.file_name())
            .collect();
        assert_eq!(names, vec!["opening.mp4", "earlier.mp4", "closing.mp4"]);
    }

    #[test]
    fn tolerated_gap_still_counts_as_covered() {
        let clips = vec![clip("first.mp4", -20.0, 0.0), clip("second.mp4", 0.8, 20.0)];
        let window = Interval::new(t(-15.0), t(15.0));

        let result = select_window_coverage(window, &clips, &options(1.0));

        assert!(result.fully_covered);
        assert_eq!(result.gaps, vec![Interval::new(t(0.0), t(0.8))]);
    }

    #[test]
    fn large_gap_falls_back_to_earliest_clip_and_reports_partial_coverage() {
        let clips = vec![clip("first.mp4", -20.0, -5.0), clip("second.mp4", 3.0, 20.0)];
        let window = Interval::new(t(-15.0), t(15.0));

        let result = select_window_coverage(window, &clips, &options(1.0));

        assert!(!result.fully_covered);
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.gaps, vec![Interval::new(t(-5.0), t(3.0))]);
    }

    #[test]
    fn running_out_of_clips_reports_tail_shortfall() {
        let clips = vec![clip("first.mp4", -20.0, 0.0), clip("second.mp4", -1.0, 10.0)];
        let window = Interval::new(t(-15.0), t(15.0));

        let result = select_window_coverage(window, &clips, &options(1.0));

        assert!(!result.fully_covered);
        assert_eq!(result.gaps, vec![Interval::new(t(10.0), t(15.0))]);
        assert_eq!(
            spans(&result.segments),
            vec![
                ("first.mp4".to_string(), t(-15.0), t(0.0)),
                ("second.mp4".to_string(), t(0.0), t(10.0)),
            ]
        );
    }

    #[test]
    fn no_overlapping_clip_yields_empty_result() {
        let clips = vec![clip("elsewhere.mp4", 100.0, 140.0)];
        let window = Interval::new(t(-15.0), t(15.0));

        let result = select_window_coverage(window, &clips, &options(1.0));

        assert!(result.segments.is_empty());
        assert!(!result.fully_covered);
    }

    #[test]
    fn slivers_below_min_overlap_are_ignored() {
        let clips = vec![clip("sliver.mp4", 14.8, 40.0), clip("main.mp4", -20.0, 10.0)];
        let window = Interval::new(t(-15.0), t(15.0));

        let result = select_window_coverage(window, &clips, &options(1.0));

        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].clip.file_name(), "main.mp4");
        assert!(!result.fully_covered);
    }

    #[test]
    fn gaps_are_computed_against_the_window() {
        let clips = vec![clip("a.mp4", 0.0, 40.0)];
        let segments = vec![
            CoverageSegment {
                clip: &clips[0],
                overlap_start: t(2.0),
                overlap_end: t(5.0),
            },
            CoverageSegment {
                clip: &clips[0],
                overlap_start: t(4.0),
                overlap_end: t(8.0),
            },
        ];

        let gaps = coverage_gaps(Interval::new(t(0.0), t(10.0)), &segments);
        assert_eq!(
            gaps,
            vec![Interval::new(t(0.0), t(2.0)), Interval::new(t(8.0), t(10.0))]
        );
    }
}
