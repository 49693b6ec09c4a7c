//! Glitchy video decoding on top of FFmpeg.
//!
//! A `GlitchPipeline` pulls one packet at a time from the best video stream,
//! optionally corrupts it, decodes it (on a hardware device when one was
//! negotiated, otherwise in software) and converts the result into a single
//! persistent interleaved output frame.
//!
//! # Thread Safety
//! A pipeline is meant to be driven from a single thread. Run several
//! pipelines to process several sources; they share nothing but the read-only
//! device enumeration.

mod catalog;
mod convert;
mod corrupt;
mod decoder;
mod hardware;
mod pipeline;
mod probe;
mod types;

pub use catalog::{DeviceCatalog, HwBackend};
pub use convert::ColorConverter;
pub use corrupt::{CorruptionSource, PacketCorruptor, MAX_EVENTS, MAX_RUN};
pub use decoder::DecodeSession;
pub use hardware::{negotiate, select_hw_config, Acceleration, HardwareContext, HwConfig};
pub use pipeline::GlitchPipeline;
pub use probe::{probe, ProbedStream};
pub use types::{DecodeOutcome, FrameGeometry, SessionConfig};
