//! Platform audio output.
//!
//! The render loop hands finished blocks to an [`AudioSink`]; the
//! cpal-backed implementation feeds a ring buffer drained by the
//! device callback, and its blocking write is the loop's sole pacing
//! mechanism.

use crate::audio::{BLOCK_SIZE, CHANNELS, SAMPLE_RATE};
use crate::error::Error;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::Arc;
use std::time::Duration;

/// Destination for fixed-size interleaved stereo blocks of i16
/// samples.
///
/// `write_block` blocks until the platform has accepted the data;
/// implementations created inside the render thread need not be Send.
pub trait AudioSink {
    fn write_block(&mut self, interleaved: &[i16]) -> Result<(), Error>;
}

/// Builds a sink on the render thread at engine start.
pub type SinkFactory = Arc<dyn Fn() -> Result<Box<dyn AudioSink>, Error> + Send + Sync>;

/// cpal-backed stereo output at the engine's fixed format.
///
/// Holding the stream keeps the device playing; dropping the sink
/// closes it.
pub struct CpalSink {
    _stream: cpal::Stream,
    producer: HeapProducer<i16>,
    // How long to wait for the device to drain when the ring is full,
    // a quarter block so write_block never oversleeps the deadline.
    backoff: Duration,
}

impl CpalSink {
    pub fn open() -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("No output device available".to_string()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("Default output config not supported: {}", e)))?;

        let config = cpal::StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        // Room for a few blocks so one late callback does not starve
        // the device.
        let ring = HeapRb::<i16>::new(BLOCK_SIZE * CHANNELS as usize * 4);
        let (producer, consumer) = ring.split();

        let err_fn = |err| {
            error!("Output stream error: {}", err);
        };

        let stream = match supported.sample_format() {
            cpal::SampleFormat::I16 => Self::build_stream_i16(&device, &config, consumer, err_fn)?,
            cpal::SampleFormat::U16 => Self::build_stream_u16(&device, &config, consumer, err_fn)?,
            cpal::SampleFormat::F32 => Self::build_stream_f32(&device, &config, consumer, err_fn)?,
            other => {
                return Err(Error::Audio(format!(
                    "Unsupported output sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::Audio(format!("Failed to start output stream: {}", e)))?;

        debug!(
            "Opened output sink: {} Hz, {} channels, {} frame blocks",
            SAMPLE_RATE, CHANNELS, BLOCK_SIZE
        );

        let block_micros = BLOCK_SIZE as u64 * 1_000_000 / SAMPLE_RATE as u64;
        Ok(Self {
            _stream: stream,
            producer,
            backoff: Duration::from_micros(block_micros / 4),
        })
    }

    fn build_stream_i16(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut consumer: HeapConsumer<i16>,
        err_fn: fn(cpal::StreamError),
    ) -> Result<cpal::Stream, Error> {
        device
            .build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        // Underruns play out as silence.
                        *sample = consumer.pop().unwrap_or(0);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::Audio(format!("Failed to build output stream: {}", e)))
    }

    fn build_stream_u16(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut consumer: HeapConsumer<i16>,
        err_fn: fn(cpal::StreamError),
    ) -> Result<cpal::Stream, Error> {
        device
            .build_output_stream(
                config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        let value = consumer.pop().unwrap_or(0);
                        *sample = (value as i32 + 32_768) as u16;
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::Audio(format!("Failed to build output stream: {}", e)))
    }

    fn build_stream_f32(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut consumer: HeapConsumer<i16>,
        err_fn: fn(cpal::StreamError),
    ) -> Result<cpal::Stream, Error> {
        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        let value = consumer.pop().unwrap_or(0);
                        *sample = value as f32 / i16::MAX as f32;
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::Audio(format!("Failed to build output stream: {}", e)))
    }
}

impl AudioSink for CpalSink {
    fn write_block(&mut self, interleaved: &[i16]) -> Result<(), Error> {
        let mut written = 0;
        while written < interleaved.len() {
            written += self.producer.push_slice(&interleaved[written..]);
            if written < interleaved.len() {
                // Ring full; wait for the device callback to drain it.
                std::thread::sleep(self.backoff);
            }
        }
        Ok(())
    }
}
