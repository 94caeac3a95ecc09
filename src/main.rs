use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use soundfield::app::{FilePlacementStore, MemoryPlacementStore, PlacementStore};
use soundfield::audio::panning;
use soundfield::{
    Orientation, RenderEngine, Settings, SettingsManager, Source, SourceCategory, SourceId,
    SourceStateStore,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// soundfield - listener-centered sonification of nearby emitters
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    /// Print the stereo gain reference table and exit
    #[clap(long)]
    pan_table: bool,
}

/// Simulated emitters for running without a real discovery backend.
const DEMO_DEVICES: [(&str, &str, SourceCategory); 5] = [
    ("00:11:22:33:44:55", "Kitchen speaker", SourceCategory::BluetoothLe),
    ("AA:BB:CC:DD:EE:01", "Headphones", SourceCategory::BluetoothClassic),
    ("AA:BB:CC:DD:EE:02", "Fitness tracker", SourceCategory::BluetoothLe),
    ("DE:AD:BE:EF:00:01", "Thermostat", SourceCategory::BluetoothLe),
    ("CA:FE:CA:FE:00:02", "Car stereo", SourceCategory::BluetoothClassic),
];

fn placements_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("soundfield").join("placements.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    if args.pan_table {
        print!(
            "{}",
            panning::pan_table(&[
                -180, -150, -120, -90, -60, -45, -30, 0, 30, 45, 60, 90, 120, 150, 180
            ])
        );
        return Ok(());
    }

    let settings = match SettingsManager::new() {
        Ok(manager) => manager.settings().clone(),
        Err(e) => {
            warn!("Failed to load settings, using defaults: {}", e);
            Settings::default()
        }
    };

    let placements: Box<dyn PlacementStore> = match placements_path() {
        Some(path) => Box::new(FilePlacementStore::new(path)),
        None => {
            warn!("No data directory available, placements will not persist");
            Box::new(MemoryPlacementStore::new())
        }
    };

    let mut engine = RenderEngine::new(SourceStateStore::new(placements));
    engine.update_settings(settings);
    engine.start()?;
    let engine = Arc::new(Mutex::new(engine));

    let started = Instant::now();

    // Simulated discovery scan: the same emitters drift in and out of
    // range on independent periods.
    let scanner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(2));
            loop {
                interval.tick().await;
                let t = started.elapsed().as_secs_f32();
                let devices: Vec<Source> = DEMO_DEVICES
                    .iter()
                    .enumerate()
                    .map(|(i, (address, name, category))| {
                        let drift = (t / 7.0 + i as f32).sin() * 15.0;
                        let strength = -75 + drift as i32;
                        Source::new(SourceId::new(*category, *address), strength).with_name(*name)
                    })
                    .collect();
                engine.lock().unwrap().update_devices(devices);
            }
        })
    };

    // Simulated listener heading: a slow continuous turn.
    let orientation = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(50));
            loop {
                interval.tick().await;
                let heading = (started.elapsed().as_secs_f32() * 12.0) % 360.0;
                engine
                    .lock()
                    .unwrap()
                    .update_orientation(Orientation::new(heading, 0.0, 0.0));
            }
        })
    };

    // Periodic status printout from the engine's side channel.
    let status = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let snapshot = engine.lock().unwrap().status();
                if !snapshot.is_empty() {
                    println!("{}", snapshot.trim_end());
                }
            }
        })
    };

    info!("Rendering simulated sound field; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    scanner.abort();
    orientation.abort();
    status.abort();
    engine.lock().unwrap().stop();

    Ok(())
}
