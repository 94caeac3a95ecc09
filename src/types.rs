use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a discovered wireless emitter.
///
/// Carries no behavior in the rendering core beyond being part of the
/// identity key; reserved for per-category tone banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceCategory {
    BluetoothClassic,
    BluetoothLe,
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceCategory::BluetoothClassic => write!(f, "classic"),
            SourceCategory::BluetoothLe => write!(f, "le"),
        }
    }
}

/// Stable identity of a wireless emitter.
///
/// The same hardware address could in theory appear in more than one
/// category, so the category is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId {
    pub category: SourceCategory,
    pub address: String,
}

impl SourceId {
    pub fn new(category: SourceCategory, address: impl Into<String>) -> Self {
        Self {
            category,
            address: address.into(),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.address)
    }
}

/// One wireless emitter as reported by the discovery collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: SourceId,
    pub display_name: Option<String>,
    /// Received power on a dBm-like scale, larger = stronger.
    pub signal_strength: i32,
}

impl Source {
    pub fn new(id: SourceId, signal_strength: i32) -> Self {
        Self {
            id,
            display_name: None,
            signal_strength,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Listener attitude in degrees. Only the azimuth affects audio.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    /// Heading in [0, 360) degrees from the reference direction.
    pub azimuth: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Orientation {
    pub fn new(azimuth: f32, pitch: f32, roll: f32) -> Self {
        Self {
            azimuth,
            pitch,
            roll,
        }
    }
}
