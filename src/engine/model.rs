use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::catalog::ClipDescriptor;

pub const DEFAULT_LEAD_SECONDS: f64 = 10.0;
pub const DEFAULT_TAIL_SECONDS: f64 = 5.0;
pub const DEFAULT_GAP_THRESHOLD_SECONDS: f64 = 30.0;
pub const DEFAULT_MIN_KILLS: usize = 2;
pub const DEFAULT_MIN_OVERLAP_SECONDS: f64 = 0.5;
pub const DEFAULT_GAP_TOLERANCE_SECONDS: f64 = 1.0;
pub const DEFAULT_REDUNDANT_OVERLAP_RATIO: f64 = 0.3;
pub const DEFAULT_MIN_TRIMMED_SEGMENT_SECONDS: f64 = 0.5;
pub const DEFAULT_KILL_POSITION_SECONDS: f64 = 20.0;

pub fn seconds_to_delta(seconds: f64) -> Duration {
    // `as` saturates; i64::MIN milliseconds is outside the TimeDelta range.
    Duration::milliseconds(((seconds * 1000.0).round() as i64).max(-i64::MAX))
}

/// Moves `time` later by `delta`, saturating at the calendar's upper bound.
pub fn shift_later(time: NaiveDateTime, delta: Duration) -> NaiveDateTime {
    time.checked_add_signed(delta).unwrap_or(NaiveDateTime::MAX)
}

/// Moves `time` earlier by `delta`, saturating at the calendar's lower bound.
pub fn shift_earlier(time: NaiveDateTime, delta: Duration) -> NaiveDateTime {
    time.checked_sub_signed(delta).unwrap_or(NaiveDateTime::MIN)
}

pub fn delta_to_seconds(delta: Duration) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start <= end, "interval ends before it starts");
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_seconds(&self) -> f64 {
        delta_to_seconds(self.duration())
    }

    pub fn overlap_with(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Interval { start, end })
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    pub fn extend_to_cover(&mut self, other: &Interval) {
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TargetInterval<'a> {
    pub interval: Interval,
    pub event_time: NaiveDateTime,
    pub clip: &'a ClipDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCluster<'a> {
    pub interval: Interval,
    pub event_times: Vec<NaiveDateTime>,
    #[serde(serialize_with = "serialize_clip_paths")]
    pub source_clips: Vec<&'a ClipDescriptor>,
}

impl<'a> EventCluster<'a> {
    pub fn from_target(target: &TargetInterval<'a>) -> Self {
        Self {
            interval: target.interval,
            event_times: vec![target.event_time],
            source_clips: vec![target.clip],
        }
    }

    pub fn extend(&mut self, target: &TargetInterval<'a>) {
        self.interval.extend_to_cover(&target.interval);

        if let Err(position) = self.event_times.binary_search(&target.event_time) {
            self.event_times.insert(position, target.event_time);
        }

        if !self
            .source_clips
            .iter()
            .any(|clip| std::ptr::eq(*clip, target.clip))
        {
            self.source_clips.push(target.clip);
        }
    }

    pub fn kill_count(&self) -> usize {
        self.event_times.len()
    }

    pub fn first_event(&self) -> Option<NaiveDateTime> {
        self.event_times.first().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSegment<'a> {
    #[serde(serialize_with = "serialize_clip_path")]
    pub clip: &'a ClipDescriptor,
    pub overlap_start: NaiveDateTime,
    pub overlap_end: NaiveDateTime,
}

impl<'a> CoverageSegment<'a> {
    pub fn span(&self) -> Interval {
        Interval {
            start: self.overlap_start,
            end: self.overlap_end,
        }
    }

    pub fn duration(&self) -> Duration {
        self.overlap_end - self.overlap_start
    }

    pub fn duration_seconds(&self) -> f64 {
        delta_to_seconds(self.duration())
    }

    pub fn relative_offset_seconds(&self) -> f64 {
        delta_to_seconds(self.overlap_start - self.clip.start())
    }

    pub fn is_well_formed(&self) -> bool {
        self.overlap_start >= self.clip.start()
            && self.overlap_end <= self.clip.end()
            && self.overlap_end > self.overlap_start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageResult<'a> {
    pub segments: Vec<CoverageSegment<'a>>,
    pub fully_covered: bool,
    pub gaps: Vec<Interval>,
}

impl<'a> CoverageResult<'a> {
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
            fully_covered: false,
            gaps: Vec::new(),
        }
    }
}

fn serialize_clip_path<S>(clip: &&ClipDescriptor, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&clip.path().to_string_lossy())
}

fn serialize_clip_paths<S>(clips: &[&ClipDescriptor], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(clips.iter().map(|clip| clip.path().to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::{seconds_to_delta, shift_earlier, shift_later, EventCluster, Interval, TargetInterval};
    use crate::catalog::ClipDescriptor;
    use chrono::{NaiveDate, NaiveDateTime};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 14)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("Expected a valid base timestamp")
    }

    fn t(seconds: f64) -> NaiveDateTime {
        base() + seconds_to_delta(seconds)
    }

    #[test]
    fn overlap_is_none_for_touching_intervals() {
        let left = Interval::new(t(0.0), t(10.0));
        let right = Interval::new(t(10.0), t(20.0));
        assert!(left.overlap_with(&right).is_none());

        let inner = Interval::new(t(5.0), t(15.0));
        assert_eq!(
            left.overlap_with(&inner),
            Some(Interval::new(t(5.0), t(10.0)))
        );
    }

    #[test]
    fn cluster_extend_keeps_events_sorted_and_unique() {
        let clip = ClipDescriptor::new("a.mp4", t(-30.0), t(90.0), t(0.0))
            .expect("Expected a valid clip");
        let first = TargetInterval {
            interval: Interval::new(t(10.0), t(20.0)),
            event_time: t(15.0),
            clip: &clip,
        };
        let second = TargetInterval {
            interval: Interval::new(t(-5.0), t(8.0)),
            event_time: t(2.0),
            clip: &clip,
        };

        let mut cluster = EventCluster::from_target(&first);
        cluster.extend(&second);
        cluster.extend(&second);

        assert_eq!(cluster.interval, Interval::new(t(-5.0), t(20.0)));
        assert_eq!(cluster.event_times, vec![t(2.0), t(15.0)]);
        assert_eq!(cluster.source_clips.len(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "interval ends before it starts")]
    fn reversed_bounds_are_rejected() {
        let _ = Interval::new(t(10.0), t(0.0));
    }

    #[test]
    fn oversized_shifts_saturate_instead_of_overflowing() {
        let huge = seconds_to_delta(1.0e13);
        assert_eq!(shift_later(t(0.0), huge), NaiveDateTime::MAX);
        assert_eq!(shift_earlier(t(0.0), huge), NaiveDateTime::MIN);
        assert_eq!(shift_later(t(0.0), seconds_to_delta(5.0)), t(5.0));

        assert_eq!(seconds_to_delta(f64::NEG_INFINITY).num_milliseconds(), -i64::MAX);
    }
}
