use chrono::{Duration, NaiveDateTime};

use super::model::{shift_earlier, shift_later, EventCluster, Interval, TargetInterval};
use crate::catalog::ClipDescriptor;

pub fn build_target_interval(event_time: NaiveDateTime, lead: Duration, tail: Duration) -> Interval {
    Interval {
        start: shift_earlier(event_time, lead),
        end: shift_later(event_time, tail),
    }
}

pub fn build_target_intervals<'a>(
    clips: &'a [ClipDescriptor],
    lead: Duration,
    tail: Duration,
) -> Vec<TargetInterval<'a>> {
    clips
        .iter()
        .map(|clip| TargetInterval {
            interval: build_target_interval(clip.event_time(), lead, tail),
            event_time: clip.event_time(),
            clip,
        })
        .collect()
}

pub fn merge_target_intervals<'a>(
    mut targets: Vec<TargetInterval<'a>>,
    gap_threshold: Duration,
) -> Vec<EventCluster<'a>> {
    // Stable sort: equal starts keep catalog order.
    targets.sort_by_key(|target| target.interval.start);

    let mut clusters: Vec<EventCluster<'a>> = Vec::new();
    for target in &targets {
        match clusters.last_mut() {
            Some(current)
                if target.interval.start <= shift_later(current.interval.end, gap_threshold) =>
            {
                current.extend(target);
            }
            _ => clusters.push(EventCluster::from_target(target)),
        }
    }

    clusters
}

pub fn filter_clusters_by_kills(clusters: Vec<EventCluster<'_>>, min_kills: usize) -> Vec<EventCluster<'_>> {
    clusters
        .into_iter()
        .filter(|cluster| cluster.kill_count() >= min_kills)
        .collect()
}

pub fn merge_touching_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_by_key(|interval| interval.start);

    let mut merged: Vec<Interval> = Vec::new();
    for interval in intervals {
        match merged.last_mut() {
            Some(current) if interval.start <= current.end => current.extend_to_cover(&interval),
            _ => merged.push(interval),
        }
    }

    merged
}

pub struct ExportWindows {
    pub windows: Vec<Interval>,
    pub narrower_than_cluster: bool,
}

pub fn derive_export_windows(
    cluster: &EventCluster<'_>,
    export_lead: Option<Duration>,
    export_tail: Option<Duration>,
) -> ExportWindows {
    if export_lead.is_none() && export_tail.is_none() {
        return ExportWindows {
            windows: vec![cluster.interval],
            narrower_than_cluster: false,
        };
    }

    let windows = cluster.export_windows(
        export_lead.unwrap_or_else(Duration::zero),
        export_tail.unwrap_or_else(Duration::zero),
    );

    let narrower_than_cluster = match (windows.first(), windows.last()) {
        (Some(first), Some(last)) => {
            first.start > cluster.interval.start || last.end < cluster.interval.end
        }
        _ => false,
    };

    ExportWindows {
        windows,
        narrower_than_cluster,
    }
}

impl EventCluster<'_> {
    pub fn export_windows(&self, lead: Duration, tail: Duration) -> Vec<Interval> {
        let per_event = self
            .event_times
            .iter()
            .map(|event_time| build_target_interval(*event_time, lead, tail))
            .collect();
        merge_touching_intervals(per_event)
    }
}
