//! End-to-end render tests against a capturing sink.

use soundfield::app::MemoryPlacementStore;
use soundfield::audio::{AudioSink, SourceStateStore, BLOCK_SIZE};
use soundfield::{
    Error, Orientation, PlacementStore, RenderEngine, Settings, Source, SourceCategory, SourceId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

struct CollectingSink {
    blocks: Arc<Mutex<Vec<Vec<i16>>>>,
    block_count: Arc<AtomicUsize>,
}

impl AudioSink for CollectingSink {
    fn write_block(&mut self, interleaved: &[i16]) -> Result<(), Error> {
        self.blocks.lock().unwrap().push(interleaved.to_vec());
        self.block_count.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        Ok(())
    }
}

fn capture_engine(
    placements: Box<dyn PlacementStore>,
) -> (RenderEngine, Arc<Mutex<Vec<Vec<i16>>>>, Arc<AtomicUsize>) {
    let blocks = Arc::new(Mutex::new(Vec::new()));
    let block_count = Arc::new(AtomicUsize::new(0));
    let sink_blocks = Arc::clone(&blocks);
    let sink_count = Arc::clone(&block_count);

    let engine = RenderEngine::with_sink_factory(
        SourceStateStore::new(placements),
        Arc::new(move || {
            Ok(Box::new(CollectingSink {
                blocks: Arc::clone(&sink_blocks),
                block_count: Arc::clone(&sink_count),
            }) as Box<dyn AudioSink>)
        }),
    );
    (engine, blocks, block_count)
}

fn wait_for_blocks(count: &AtomicUsize, at_least: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while count.load(Ordering::SeqCst) < at_least {
        assert!(
            Instant::now() < deadline,
            "render loop did not produce enough blocks"
        );
        thread::sleep(Duration::from_millis(2));
    }
}

/// Per-channel RMS of one interleaved stereo block, normalized to
/// [0, 1].
fn channel_rms(block: &[i16]) -> (f32, f32) {
    let mut left = 0.0f64;
    let mut right = 0.0f64;
    for frame in block.chunks_exact(2) {
        let l = frame[0] as f64 / i16::MAX as f64;
        let r = frame[1] as f64 / i16::MAX as f64;
        left += l * l;
        right += r * r;
    }
    let frames = (block.len() / 2) as f64;
    (
        (left / frames).sqrt() as f32,
        (right / frames).sqrt() as f32,
    )
}

fn test_id() -> SourceId {
    SourceId::new(SourceCategory::BluetoothLe, "AA:BB:CC:DD:EE:FF")
}

fn instant_settings() -> Settings {
    Settings {
        master_volume: 1.0,
        volume_curve_exponent: 1.0,
        behind_attenuation: 1.0,
        smoothing_time_constant_ms: 0.0,
        ..Settings::default()
    }
}

#[test_log::test]
fn heading_rotation_moves_a_centered_source_hard_left() {
    // The source sits at world azimuth 0°.
    let mut placements = MemoryPlacementStore::new();
    placements.store(&test_id(), 0.0).unwrap();

    let (mut engine, blocks, count) = capture_engine(Box::new(placements));
    engine.update_settings(instant_settings());
    engine.update_orientation(Orientation::new(0.0, 0.0, 0.0));
    engine.update_devices(vec![Source::new(test_id(), -60)]);

    engine.start().unwrap();
    wait_for_blocks(&count, 4);

    // Facing the source: equal power in both channels.
    {
        let blocks = blocks.lock().unwrap();
        let (left, right) = channel_rms(blocks.last().unwrap());
        assert!(left > 0.1, "expected audible output, got rms {}", left);
        assert!(
            (left - right).abs() < left * 0.02,
            "center should be balanced: L={} R={}",
            left,
            right
        );
    }

    // Turn the listener to 90°: the source is now at relative −90°,
    // hard left.
    engine.update_orientation(Orientation::new(90.0, 0.0, 0.0));
    let seen = count.load(Ordering::SeqCst);
    wait_for_blocks(&count, seen + 4);
    engine.stop();

    let blocks = blocks.lock().unwrap();
    let (left, right) = channel_rms(blocks.last().unwrap());
    assert!(left > 0.1, "expected audible left channel, got {}", left);
    assert!(
        right < left * 0.01,
        "right channel should be silent: L={} R={}",
        left,
        right
    );
}

#[test_log::test]
fn placements_survive_an_engine_stop_start_cycle() {
    let mut placements = MemoryPlacementStore::new();
    placements.store(&test_id(), 42.5).unwrap();

    let (mut engine, _blocks, count) = capture_engine(Box::new(placements));
    engine.update_settings(instant_settings());
    engine.update_devices(vec![Source::new(test_id(), -60)]);

    engine.start().unwrap();
    wait_for_blocks(&count, 2);
    let before = status_azimuth(&engine);

    engine.stop();
    engine.start().unwrap();
    let seen = count.load(Ordering::SeqCst);
    wait_for_blocks(&count, seen + 2);
    let after = status_azimuth(&engine);
    engine.stop();

    assert_eq!(before, 42.5);
    assert_eq!(after, 42.5);
}

#[test_log::test]
fn single_active_source_is_placed_directly_ahead() {
    let mut placements = MemoryPlacementStore::new();
    placements.store(&test_id(), 250.0).unwrap();

    let (mut engine, blocks, count) = capture_engine(Box::new(placements));
    engine.update_settings(Settings {
        max_active_sources: 1,
        ..instant_settings()
    });
    engine.update_orientation(Orientation::new(0.0, 0.0, 0.0));
    engine.update_devices(vec![Source::new(test_id(), -60)]);

    engine.start().unwrap();
    wait_for_blocks(&count, 4);
    engine.stop();

    // Despite the stored placement at 250°, the sole source renders
    // centered.
    let blocks = blocks.lock().unwrap();
    let (left, right) = channel_rms(blocks.last().unwrap());
    assert!(left > 0.1);
    assert!((left - right).abs() < left * 0.02);
}

#[test_log::test]
fn simulated_azimuth_overrides_the_heading_math() {
    let mut placements = MemoryPlacementStore::new();
    placements.store(&test_id(), 0.0).unwrap();

    let (mut engine, blocks, count) = capture_engine(Box::new(placements));
    engine.update_settings(Settings {
        simulated_azimuth: Some(90.0),
        ..instant_settings()
    });
    // Heading that would otherwise put the source dead ahead.
    engine.update_orientation(Orientation::new(0.0, 0.0, 0.0));
    engine.update_devices(vec![Source::new(test_id(), -60)]);

    engine.start().unwrap();
    wait_for_blocks(&count, 4);
    engine.stop();

    // Simulation pins the relative angle at +90°: hard right.
    let blocks = blocks.lock().unwrap();
    let (left, right) = channel_rms(blocks.last().unwrap());
    assert!(right > 0.1);
    assert!(left < right * 0.01);
}

#[test_log::test]
fn blocks_have_the_fixed_interleaved_size() {
    let (mut engine, blocks, count) = capture_engine(Box::new(MemoryPlacementStore::new()));
    engine.start().unwrap();
    wait_for_blocks(&count, 2);
    engine.stop();

    let blocks = blocks.lock().unwrap();
    assert!(blocks.iter().all(|b| b.len() == BLOCK_SIZE * 2));
}

/// Pull the rendered world azimuth for the sole source out of the
/// engine's status side channel.
fn status_azimuth(engine: &RenderEngine) -> f32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = engine.status();
        if let Some(value) = parse_azimuth(&status) {
            return value;
        }
        assert!(Instant::now() < deadline, "no status snapshot produced");
        thread::sleep(Duration::from_millis(5));
    }
}

fn parse_azimuth(status: &str) -> Option<f32> {
    let mut tokens = status.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "az" {
            return tokens.next()?.trim_end_matches('°').parse().ok();
        }
    }
    None
}
