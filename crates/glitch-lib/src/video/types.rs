use super::catalog::HwBackend;
use glitch_types::{FramePipelineOptions, OutputLayout};

/// What a single decode step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    FrameReady,
    Retry,
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub hw_backend: Option<HwBackend>,
    pub output_layout: OutputLayout,
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hw_backend: None,
            output_layout: OutputLayout::Bgr24,
            seed: None,
        }
    }
}

impl From<&FramePipelineOptions> for SessionConfig {
    fn from(options: &FramePipelineOptions) -> Self {
        Self {
            hw_backend: HwBackend::from_name(&options.hw_backend),
            output_layout: options.output_layout,
            seed: options.seed.clone().into(),
        }
    }
}
