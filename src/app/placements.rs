//! Durable per-source spatial placements.
//!
//! A source keeps the world azimuth it was assigned the first time it
//! was ever seen, so repeated detections of the same emitter always
//! sound like they come from the same direction.

use crate::error::Error;
use crate::types::SourceId;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Storage collaborator for assigned world azimuths.
///
/// Values are degrees in [0, 360). A read or write failure is never
/// fatal to the caller; the current session falls back to a fresh
/// random placement.
#[cfg_attr(test, mockall::automock)]
pub trait PlacementStore: Send {
    fn load(&self, id: &SourceId) -> Result<Option<f32>, Error>;
    fn store(&mut self, id: &SourceId, azimuth: f32) -> Result<(), Error>;
}

/// In-memory store, used in tests and as a null persistence layer.
#[derive(Debug, Default)]
pub struct MemoryPlacementStore {
    placements: HashMap<String, f32>,
}

impl MemoryPlacementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlacementStore for MemoryPlacementStore {
    fn load(&self, id: &SourceId) -> Result<Option<f32>, Error> {
        Ok(self.placements.get(&id.to_string()).copied())
    }

    fn store(&mut self, id: &SourceId, azimuth: f32) -> Result<(), Error> {
        self.placements.insert(id.to_string(), azimuth);
        Ok(())
    }
}

/// JSON-file-backed store keyed by the source's display form
/// (`category:address`).
pub struct FilePlacementStore {
    path: PathBuf,
    placements: HashMap<String, f32>,
}

impl FilePlacementStore {
    /// Open the store at `path`, loading any previously saved
    /// placements. A missing or unreadable file starts the store
    /// empty rather than failing.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let placements = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Ignoring unreadable placement file {:?}: {}", path, e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Failed to read placement file {:?}: {}", path, e);
                HashMap::new()
            }
        };

        Self { path, placements }
    }

    fn flush(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Persistence(format!("Failed to create placement directory: {}", e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&self.placements)
            .map_err(|e| Error::Persistence(format!("Failed to serialize placements: {}", e)))?;

        fs::write(&self.path, json)
            .map_err(|e| Error::Persistence(format!("Failed to write placement file: {}", e)))?;

        debug!(
            "Saved {} placements to {:?}",
            self.placements.len(),
            self.path
        );
        Ok(())
    }
}

impl PlacementStore for FilePlacementStore {
    fn load(&self, id: &SourceId) -> Result<Option<f32>, Error> {
        Ok(self.placements.get(&id.to_string()).copied())
    }

    fn store(&mut self, id: &SourceId, azimuth: f32) -> Result<(), Error> {
        self.placements.insert(id.to_string(), azimuth);
        self.flush()
    }
}
