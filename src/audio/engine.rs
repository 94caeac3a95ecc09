//! Real-time render engine.
//!
//! A dedicated thread pulls the latest device/heading/settings
//! snapshots once per block, drives the source store and synthesizer,
//! mixes into two channels and hands interleaved i16 blocks to the
//! platform sink. All cross-thread inputs are atomically swapped
//! snapshots; the producers never block on the render loop and the
//! loop never blocks on them.

use crate::app::settings::Settings;
use crate::audio::output::{AudioSink, CpalSink, SinkFactory};
use crate::audio::panning;
use crate::audio::sources::{smoothing_alpha, SourceStateStore};
use crate::audio::synth::WaveformSynth;
use crate::audio::{BLOCK_SIZE, CHANNELS, SAMPLE_RATE};
use crate::error::Error;
use crate::types::{Orientation, Source, SourceId};
use arc_swap::ArcSwap;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Bounded wait for the render loop to acknowledge a stop request.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Cadence of the human-readable status snapshot.
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// Snapshots shared between the producer threads and the render loop.
/// Every field is replaced whole, never mutated in place, so the loop
/// always observes fully-formed values.
struct Shared {
    devices: ArcSwap<Vec<Source>>,
    orientation: ArcSwap<Orientation>,
    settings: ArcSwap<Settings>,
    status: ArcSwap<String>,
}

/// One spawned render loop and the stop token that belongs to it.
///
/// The token is per session, never reused: once `stop` abandons a
/// stalled loop, a later `start` cannot accidentally clear the old
/// flag and revive it.
struct Worker {
    handle: thread::JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

/// Stereo render engine over the discovered source set.
///
/// State machine is {Stopped, Running}; `start` and `stop` are
/// idempotent. The update methods are safe from any thread and never
/// block on the render loop.
pub struct RenderEngine {
    shared: Arc<Shared>,
    sources: Arc<Mutex<SourceStateStore>>,
    synth: Arc<Mutex<WaveformSynth>>,
    sink_factory: SinkFactory,
    worker: Option<Worker>,
}

impl RenderEngine {
    /// Engine rendering to the default platform output device.
    pub fn new(sources: SourceStateStore) -> Self {
        Self::with_sink_factory(
            sources,
            Arc::new(|| CpalSink::open().map(|sink| Box::new(sink) as Box<dyn AudioSink>)),
        )
    }

    /// Engine with an injected sink, used by tests to capture output.
    pub fn with_sink_factory(sources: SourceStateStore, sink_factory: SinkFactory) -> Self {
        Self {
            shared: Arc::new(Shared {
                devices: ArcSwap::from_pointee(Vec::new()),
                orientation: ArcSwap::from_pointee(Orientation::default()),
                settings: ArcSwap::from_pointee(Settings::default()),
                status: ArcSwap::from_pointee(String::new()),
            }),
            sources: Arc::new(Mutex::new(sources)),
            synth: Arc::new(Mutex::new(WaveformSynth::new(SAMPLE_RATE))),
            sink_factory,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Open the sink and launch the render loop. No-op when already
    /// Running; a sink failure leaves the engine Stopped.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.worker.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);
        let shared = Arc::clone(&self.shared);
        let sources = Arc::clone(&self.sources);
        let synth = Arc::clone(&self.synth);
        let factory = Arc::clone(&self.sink_factory);
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("soundfield-render".to_string())
            .spawn(move || {
                // The cpal stream is not Send, so the sink must be
                // built on the thread that will feed it.
                let sink = match factory() {
                    Ok(sink) => {
                        let _ = ready_tx.send(Ok(()));
                        sink
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                render_loop(&shared, &loop_stop, &sources, &synth, sink);
            })
            .map_err(|e| Error::Audio(format!("Failed to spawn render thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(Worker { handle, stop });
                info!("Render engine started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::Audio(
                    "Render thread exited before opening the output sink".to_string(),
                ))
            }
        }
    }

    /// Signal the loop, wait (bounded) for it to exit, close the sink
    /// and drop all runtime state. No-op when already Stopped.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.stop.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + STOP_TIMEOUT;
        while !worker.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        if worker.handle.is_finished() {
            let _ = worker.handle.join();
        } else {
            warn!(
                "Render loop did not exit within {:?}, abandoning it",
                STOP_TIMEOUT
            );
        }

        // After a clean join nothing else holds these locks; after an
        // abandoned thread we skip the reset rather than block.
        match self.sources.try_lock() {
            Ok(mut sources) => sources.reset(),
            Err(_) => warn!("Skipping source reset, render loop still holds the store"),
        }
        match self.synth.try_lock() {
            Ok(mut synth) => synth.reset(),
            Err(_) => warn!("Skipping synth reset, render loop still holds the synthesizer"),
        }

        info!("Render engine stopped");
    }

    /// Replace the device snapshot. Ignored when `freeze_sources` is
    /// set and a non-empty snapshot already exists, keeping the
    /// source set deliberately stale for repeatable testing.
    pub fn update_devices(&self, devices: Vec<Source>) {
        if self.shared.settings.load().freeze_sources && !self.shared.devices.load().is_empty() {
            return;
        }
        self.shared.devices.store(Arc::new(devices));
    }

    /// Replace the listener orientation snapshot.
    pub fn update_orientation(&self, orientation: Orientation) {
        self.shared.orientation.store(Arc::new(orientation));
    }

    /// Replace the settings snapshot.
    pub fn update_settings(&self, settings: Settings) {
        self.shared.settings.store(Arc::new(settings));
    }

    /// Latest throttled status snapshot; empty until the loop has
    /// produced one.
    pub fn status(&self) -> Arc<String> {
        self.shared.status.load_full()
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_loop(
    shared: &Shared,
    stop: &AtomicBool,
    sources: &Mutex<SourceStateStore>,
    synth: &Mutex<WaveformSynth>,
    mut sink: Box<dyn AudioSink>,
) {
    let block_ms = BLOCK_SIZE as f32 * 1000.0 / SAMPLE_RATE as f32;
    let mut left = vec![0.0f32; BLOCK_SIZE];
    let mut right = vec![0.0f32; BLOCK_SIZE];
    let mut scratch = vec![0.0f32; BLOCK_SIZE];
    let mut interleaved = vec![0i16; BLOCK_SIZE * CHANNELS as usize];
    let mut last_status = Instant::now() - STATUS_INTERVAL;

    debug!("Render loop running, {:.1} ms blocks", block_ms);

    while !stop.load(Ordering::SeqCst) {
        let devices = shared.devices.load_full();
        let orientation = **shared.orientation.load();
        let settings = shared.settings.load_full().clamped();
        let alpha = smoothing_alpha(block_ms, settings.smoothing_time_constant_ms);

        // Strongest sources first, capped at the configured limit.
        let mut active: Vec<&Source> = devices
            .iter()
            .filter(|d| d.signal_strength >= settings.signal_strength_threshold)
            .collect();
        active.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
        active.truncate(settings.max_active_sources);

        // A sole allowed source is placed directly ahead.
        let forced_azimuth = if settings.max_active_sources == 1 {
            Some(0.0)
        } else {
            None
        };

        let status_due = last_status.elapsed() >= STATUS_INTERVAL;
        let mut status_rows: Vec<String> = Vec::new();

        left.fill(0.0);
        right.fill(0.0);

        {
            let mut sources = sources.lock().unwrap();
            let mut synth = synth.lock().unwrap();

            for source in &active {
                let voice = sources.get_or_create(source, settings.fixed_frequency, forced_azimuth);

                let target_volume = panning::signal_strength_to_volume(
                    source.signal_strength,
                    settings.volume_curve_exponent,
                );
                voice.runtime.smooth_volume(target_volume, alpha);

                // With azimuth simulation on, the configured value is
                // the relative angle itself.
                let relative = match settings.simulated_azimuth {
                    Some(simulated) => simulated,
                    None => panning::relative_angle(orientation.azimuth, voice.world_azimuth),
                };
                let pan = panning::stereo_pan(relative, settings.behind_attenuation);
                voice.runtime.smooth_gains(pan, alpha);

                let amplitude = voice.runtime.smoothed_volume * settings.master_volume;
                let frequency = voice.frequency;
                let gain_left = voice.runtime.smoothed_left_gain;
                let gain_right = voice.runtime.smoothed_right_gain;

                if status_due {
                    status_rows.push(format!(
                        "  {}  {:4.0} Hz  az {:6.1}°  rel {:6.1}°  L {:.2}  R {:.2}",
                        source.id, frequency, voice.world_azimuth, relative, gain_left, gain_right
                    ));
                }

                synth.generate(&source.id, frequency, amplitude, &mut scratch);
                for i in 0..BLOCK_SIZE {
                    left[i] += scratch[i] * gain_left;
                    right[i] += scratch[i] * gain_right;
                }
            }

            // Runtime state for dropped sources goes away with them.
            let active_ids: HashSet<SourceId> =
                active.iter().map(|s| s.id.clone()).collect();
            sources.retain_runtime(|id| active_ids.contains(id));
            synth.retain(|id| active_ids.contains(id));
        }

        for i in 0..BLOCK_SIZE {
            interleaved[2 * i] = to_output_sample(left[i]);
            interleaved[2 * i + 1] = to_output_sample(right[i]);
        }

        if status_due {
            let mut status = String::new();
            let _ = writeln!(
                status,
                "heading {:6.1}°  active {}/{}",
                orientation.azimuth,
                active.len(),
                devices.len()
            );
            for row in status_rows {
                let _ = writeln!(status, "{}", row);
            }
            debug!("{}", status.trim_end());
            shared.status.store(Arc::new(status));
            last_status = Instant::now();
        }

        // The sink write paces the loop; one failed block is logged
        // and skipped, never fatal.
        if let Err(e) = sink.write_block(&interleaved) {
            error!("Sink write failed, skipping block: {}", e);
        }
    }

    debug!("Render loop exited");
}

/// Symmetric clamp into the output format's numeric range.
fn to_output_sample(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
