#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareEncoder {
    H264Nvenc,
    HevcNvenc,
}

impl HardwareEncoder {
    pub fn codec_name(self) -> &'static str {
        match self {
            HardwareEncoder::H264Nvenc => "h264_nvenc",
            HardwareEncoder::HevcNvenc => "hevc_nvenc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    HardwareFilterGraph(HardwareEncoder),
    SoftwareFilterGraph,
    SimpleSoftwareFilterGraph,
    PerPieceConcat,
}

impl ExtractionStrategy {
    pub fn label(self) -> String {
        match self {
            ExtractionStrategy::HardwareFilterGraph(encoder) => {
                format!("filter graph ({})", encoder.codec_name())
            }
            ExtractionStrategy::SoftwareFilterGraph => "filter graph (libx264)".to_string(),
            ExtractionStrategy::SimpleSoftwareFilterGraph => {
                "simple filter graph (libx264 ultrafast)".to_string()
            }
            ExtractionStrategy::PerPieceConcat => "per-piece cut + concat".to_string(),
        }
    }

    pub fn allows_frame_dedup(self) -> bool {
        matches!(
            self,
            ExtractionStrategy::HardwareFilterGraph(_) | ExtractionStrategy::SoftwareFilterGraph
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionPreference {
    last_successful: Option<ExtractionStrategy>,
}

impl ExtractionPreference {
    pub fn last_successful(self) -> Option<ExtractionStrategy> {
        self.last_successful
    }

    pub fn remember(self, strategy: ExtractionStrategy) -> Self {
        Self {
            last_successful: Some(strategy),
        }
    }
}

pub fn strategy_ladder(
    hardware_encoder: Option<HardwareEncoder>,
    preference: ExtractionPreference,
) -> Vec<ExtractionStrategy> {
    let mut ladder = Vec::with_capacity(4);
    if let Some(encoder) = hardware_encoder {
        ladder.push(ExtractionStrategy::HardwareFilterGraph(encoder));
    }
    ladder.push(ExtractionStrategy::SoftwareFilterGraph);
    ladder.push(ExtractionStrategy::SimpleSoftwareFilterGraph);
    ladder.push(ExtractionStrategy::PerPieceConcat);

    if let Some(preferred) = preference.last_successful() {
        if let Some(position) = ladder.iter().position(|strategy| *strategy == preferred) {
            let strategy = ladder.remove(position);
            ladder.insert(0, strategy);
        }
    }

    ladder
}

#[cfg(test)]
mod tests {
    use super::{strategy_ladder, ExtractionPreference, ExtractionStrategy, HardwareEncoder};

    #[test]
    fn ladder_starts_with_hardware_when_available() {
        let ladder = strategy_ladder(Some(HardwareEncoder::H264Nvenc), ExtractionPreference::default());
        assert_eq!(
            ladder,
            vec![
                ExtractionStrategy::HardwareFilterGraph(HardwareEncoder::H264Nvenc),
                ExtractionStrategy::SoftwareFilterGraph,
                ExtractionStrategy::SimpleSoftwareFilterGraph,
                ExtractionStrategy::PerPieceConcat,
            ]
        );

        let software_only = strategy_ladder(None, ExtractionPreference::default());
        assert_eq!(software_only.first(), Some(&ExtractionStrategy::SoftwareFilterGraph));
        assert_eq!(software_only.len(), 3);
    }

    #[test]
    fn remembered_strategy_moves_to_the_front() {
        let preference =
            ExtractionPreference::default().remember(ExtractionStrategy::SimpleSoftwareFilterGraph);
        let ladder = strategy_ladder(Some(HardwareEncoder::HevcNvenc), preference);

        assert_eq!(ladder[0], ExtractionStrategy::SimpleSoftwareFilterGraph);
        assert_eq!(
            ladder[1],
            ExtractionStrategy::HardwareFilterGraph(HardwareEncoder::HevcNvenc)
        );
        assert_eq!(ladder.len(), 4);
    }

    #[test]
    fn unavailable_remembered_hardware_is_ignored() {
        let preference = ExtractionPreference::default()
            .remember(ExtractionStrategy::HardwareFilterGraph(HardwareEncoder::H264Nvenc));
        let ladder = strategy_ladder(None, preference);

        assert_eq!(ladder[0], ExtractionStrategy::SoftwareFilterGraph);
    }

    #[test]
    fn only_full_graphs_drop_duplicate_frames() {
        assert!(ExtractionStrategy::SoftwareFilterGraph.allows_frame_dedup());
        assert!(!ExtractionStrategy::SimpleSoftwareFilterGraph.allows_frame_dedup());
        assert!(!ExtractionStrategy::PerPieceConcat.allows_frame_dedup());
    }
}
