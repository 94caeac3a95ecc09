// Soundfield: listener-centered sonification of nearby wireless emitters
// Expose public modules for use in integration tests

pub mod app;
pub mod audio;
pub mod error;
pub mod types;

// Re-export commonly used types for convenience
pub use app::{FilePlacementStore, MemoryPlacementStore, PlacementStore, Settings, SettingsManager};
pub use audio::{RenderEngine, SourceStateStore, StereoPan, WaveformSynth};
pub use error::Error;
pub use types::{Orientation, Source, SourceCategory, SourceId};
