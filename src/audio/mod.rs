pub mod engine;
pub mod output;
pub mod panning;
pub mod sources;
pub mod synth;

/// Fixed output format of the render engine.
pub const SAMPLE_RATE: u32 = 48_000;
pub const BLOCK_SIZE: usize = 1024;
pub const CHANNELS: u16 = 2;

pub use engine::RenderEngine;
pub use output::{AudioSink, CpalSink, SinkFactory};
pub use panning::StereoPan;
pub use sources::SourceStateStore;
pub use synth::WaveformSynth;
