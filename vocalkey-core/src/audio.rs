//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! It selects an input device, assembles the incoming sample blocks into fixed-length
//! overlapping frames and streams them to the session over a channel.
//!
//! ## Features
//! - Default input device selection
//! - f32 configuration with the fewest channels, downmixed to mono
//! - Sliding frames emitted at a fixed hop cadence
//! - Typed errors, with the stream released on every failure path

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, trace, warn};

use crate::error::{Result, SessionError};

/// One contiguous snapshot of mono samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Capture settings.
///
/// Defaults: 2048-sample frames every 735 samples, roughly 60 frames per
/// second at 44.1 kHz (~46 ms of audio per frame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Preferred sample rate; the closest supported rate is used.
    pub sample_rate: u32,
    /// Samples per analysis frame.
    pub frame_size: usize,
    /// New samples between consecutive frames.
    pub hop_size: usize,
    /// Frames buffered between the audio callback and the session.
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_size: 2048,
            hop_size: 735,
            channel_capacity: 16,
        }
    }
}

/// Turns arbitrary-sized interleaved input blocks into fixed-length frames.
///
/// After the first `frame_size` samples have arrived, a frame holding the most
/// recent `frame_size` samples is produced every `hop_size` samples.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    frame_size: usize,
    hop_size: usize,
    channels: usize,
    sample_rate: u32,
    buffer: VecDeque<f32>,
    since_last_frame: usize,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, hop_size: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            frame_size,
            hop_size: hop_size.max(1),
            channels: channels.max(1),
            sample_rate,
            buffer: VecDeque::with_capacity(frame_size + 1),
            since_last_frame: 0,
        }
    }

    /// Appends an interleaved block and calls `emit` for every completed frame.
    pub fn push<F: FnMut(AudioFrame)>(&mut self, data: &[f32], mut emit: F) {
        for chunk in data.chunks(self.channels) {
            let mono = chunk.iter().sum::<f32>() / chunk.len() as f32;
            self.buffer.push_back(mono);
            self.since_last_frame += 1;

            if self.buffer.len() > self.frame_size {
                self.buffer.pop_front();
            }

            if self.buffer.len() == self.frame_size && self.since_last_frame >= self.hop_size {
                self.since_last_frame = 0;
                emit(AudioFrame::new(self.buffer.iter().copied().collect(), self.sample_rate));
            }
        }
    }
}

/// A running capture source owned by a live session.
pub trait Capture {
    /// Stops delivering frames and releases any exclusively held device.
    fn stop(self: Box<Self>);
}

/// Exclusive handle on a running input stream.
///
/// Dropping the handle stops the stream and releases the device.
pub struct CaptureHandle {
    stream: cpal::Stream,
    sample_rate: u32,
    device_name: String,
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("sample_rate", &self.sample_rate)
            .field("device_name", &self.device_name)
            .finish()
    }
}

impl CaptureHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Pauses the stream and releases the device.
    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            warn!(error = %e, "error pausing input stream");
        }
        drop(self.stream);
        info!(device = %self.device_name, "audio capture stopped");
    }
}

impl Capture for CaptureHandle {
    fn stop(self: Box<Self>) {
        CaptureHandle::stop(*self);
    }
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks an f32 configuration close to the configured sample rate
/// 3. Sets up a callback that assembles frames and sends them to `sender`
///
/// # Arguments
/// * `config` - Frame size, hop size and preferred sample rate
/// * `sender` - Channel sender for streaming frames to the session
///
/// # Returns
/// * `Ok(handle)` - Running stream; frames start arriving immediately
/// * `Err(SessionError::Unsupported)` - No input device or usable format
/// * `Err(SessionError::Capture)` - The device refused or the stream failed
pub fn start_audio_capture(config: &CaptureConfig, sender: Sender<AudioFrame>) -> Result<CaptureHandle> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| SessionError::Unsupported("no input device available".into()))?;

    let device_name = device.name().unwrap_or_else(|_| "unknown device".to_string());
    info!(device = %device_name, "using audio input device");

    let configs = device
        .supported_input_configs()
        .map_err(|e| SessionError::Capture(format!("cannot query input formats: {e}")))?
        .collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, config.sample_rate)
        .ok_or_else(|| SessionError::Unsupported("no suitable f32 input format found".into()))?;

    let sample_rate = cpal::SampleRate(config.sample_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    ));
    let stream_config: cpal::StreamConfig = supported_config.with_sample_rate(sample_rate).into();
    let sample_rate_val = stream_config.sample_rate.0;
    let channels = stream_config.channels as usize;

    info!(sample_rate = sample_rate_val, channels, "selected input format");

    let mut assembler = FrameAssembler::new(config.frame_size, config.hop_size, channels, sample_rate_val);
    let err_fn = |err: cpal::StreamError| warn!(error = %err, "an error occurred on the audio stream");

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                assembler.push(data, |frame| match sender.try_send(frame) {
                    Ok(()) => {}
                    // The session is behind; drop this frame rather than reorder.
                    Err(TrySendError::Full(_)) => trace!("frame dropped, channel full"),
                    Err(TrySendError::Disconnected(_)) => {}
                });
            },
            err_fn,
            None,
        )
        .map_err(|e| SessionError::Capture(format!("cannot build input stream: {e}")))?;

    // On failure `stream` is dropped here, releasing the device.
    stream
        .play()
        .map_err(|e| SessionError::Capture(format!("cannot start input stream: {e}")))?;

    Ok(CaptureHandle {
        stream,
        sample_rate: sample_rate_val,
        device_name,
    })
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only 32-bit float formats are considered. Fewer channels win, then the
/// range closest to the target rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let rate_diff = if (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate) {
                0
            } else {
                let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
                let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
                min_diff.min(max_diff)
            };
            (c.channels(), rate_diff)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_first_frame_once_buffer_is_full() {
        let mut assembler = FrameAssembler::new(8, 4, 1, 100);
        let mut frames = Vec::new();
        assembler.push(&[0.1; 7], |f| frames.push(f));
        assert!(frames.is_empty());
        assembler.push(&[0.1], |f| frames.push(f));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 8);
        assert_eq!(frames[0].sample_rate(), 100);
    }

    #[test]
    fn frames_overlap_by_hop() {
        let mut assembler = FrameAssembler::new(4, 2, 1, 100);
        let data: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let mut frames = Vec::new();
        assembler.push(&data, |f| frames.push(f.samples().to_vec()));
        assert_eq!(
            frames,
            vec![
                vec![0.0, 1.0, 2.0, 3.0],
                vec![2.0, 3.0, 4.0, 5.0],
                vec![4.0, 5.0, 6.0, 7.0],
            ]
        );
    }

    #[test]
    fn blocks_split_across_calls() {
        let mut assembler = FrameAssembler::new(4, 4, 1, 100);
        let mut frames = Vec::new();
        for chunk in [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]] {
            assembler.push(&chunk, |f| frames.push(f.samples().to_vec()));
        }
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
    }

    #[test]
    fn stereo_is_downmixed() {
        let mut assembler = FrameAssembler::new(2, 2, 2, 100);
        let mut frames = Vec::new();
        assembler.push(&[1.0, 0.0, 0.5, 0.5], |f| frames.push(f.samples().to_vec()));
        assert_eq!(frames, vec![vec![0.5, 0.5]]);
    }
}
