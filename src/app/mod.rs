pub mod placements;
pub mod settings;

pub use placements::{FilePlacementStore, MemoryPlacementStore, PlacementStore};
pub use settings::{Settings, SettingsManager};
