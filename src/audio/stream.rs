//! State shared between the capture thread and the frame thread.
//!
//! The capture side appends samples into a fixed-length history per analysis
//! channel; the frame side copies the newest samples out while holding the same
//! lock. Stream format and capture failures travel through a separate state slot
//! guarded by a condition variable so start-up can wait for them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{VisError, VisResult};

/// Sample encoding reported by a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitFormat {
    S16,
    S24,
    S32,
    F32,
}

impl BitFormat {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            16 => Some(BitFormat::S16),
            24 => Some(BitFormat::S24),
            32 => Some(BitFormat::S32),
            _ => None,
        }
    }

    /// Width of one sample in a packed little-endian stream
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BitFormat::S16 => 2,
            BitFormat::S24 => 3,
            BitFormat::S32 | BitFormat::F32 => 4,
        }
    }
}

/// How source channels map onto analysis channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMerge {
    /// Mono analysis of (left + right) / 2
    Average,
    Left,
    Right,
    /// Stereo analysis, each channel on its own
    Independent,
}

impl ChannelMerge {
    pub fn analysis_channels(self) -> usize {
        match self {
            ChannelMerge::Independent => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub bit_format: BitFormat,
    /// Channels delivered by the source, before merging
    pub channels: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureState {
    Starting,
    Streaming(StreamFormat),
    /// A finite source reached the end of its stream
    Finished,
    Failed(String),
}

/// Newest samples per analysis channel, normalized to [-1, 1].
pub struct RawBuffers {
    history: Vec<VecDeque<f32>>,
    capacity: usize,
}

impl RawBuffers {
    fn new(channels: usize, capacity: usize) -> Self {
        Self {
            history: (0..channels)
                .map(|_| std::iter::repeat(0.0).take(capacity).collect())
                .collect(),
            capacity,
        }
    }

    pub fn channels(&self) -> usize {
        self.history.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The newest `len` samples of `channel`, oldest first.
    pub fn latest(&self, channel: usize, len: usize) -> impl Iterator<Item = f32> + '_ {
        let history = &self.history[channel];
        history.iter().skip(history.len().saturating_sub(len)).copied()
    }

    fn push(&mut self, channel: usize, sample: f32) {
        let history = &mut self.history[channel];
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(sample);
    }
}

pub struct SharedAudio {
    buffers: Mutex<RawBuffers>,
    merge: ChannelMerge,
    state: Mutex<CaptureState>,
    state_changed: Condvar,
    terminate: AtomicBool,
}

impl SharedAudio {
    /// `capacity` is the history length per channel (the bass transform size).
    pub fn new(merge: ChannelMerge, capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(RawBuffers::new(merge.analysis_channels(), capacity)),
            merge,
            state: Mutex::new(CaptureState::Starting),
            state_changed: Condvar::new(),
            terminate: AtomicBool::new(false),
        }
    }

    pub fn merge(&self) -> ChannelMerge {
        self.merge
    }

    // Capture side

    pub fn publish_format(&self, format: StreamFormat) {
        let mut state = self.lock_state();
        if matches!(*state, CaptureState::Starting | CaptureState::Streaming(_)) {
            *state = CaptureState::Streaming(format);
            self.state_changed.notify_all();
        }
    }

    /// Append interleaved samples with `source_channels` channels per frame.
    pub fn write_interleaved(&self, samples: &[f32], source_channels: u16) {
        let source_channels = usize::from(source_channels.max(1));
        let mut buffers = self.lock_buffers();
        let stereo = buffers.channels() == 2;

        for frame in samples.chunks_exact(source_channels) {
            let left = frame[0];
            let right = if source_channels > 1 { frame[1] } else { frame[0] };
            if stereo {
                buffers.push(0, left);
                buffers.push(1, right);
            } else {
                let mono = match self.merge {
                    ChannelMerge::Left => left,
                    ChannelMerge::Right => right,
                    ChannelMerge::Average | ChannelMerge::Independent => (left + right) / 2.0,
                };
                buffers.push(0, mono);
            }
        }
    }

    pub fn finish(&self) {
        let mut state = self.lock_state();
        if !matches!(*state, CaptureState::Failed(_)) {
            *state = CaptureState::Finished;
            self.state_changed.notify_all();
        }
    }

    pub fn fail(&self, message: impl Into<String>) {
        *self.lock_state() = CaptureState::Failed(message.into());
        self.state_changed.notify_all();
    }

    pub fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    // Frame side

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    /// Hold this only while copying samples out.
    pub fn lock_buffers(&self) -> MutexGuard<'_, RawBuffers> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CaptureState {
        self.lock_state().clone()
    }

    /// Block until the source reports its format, fails, or `timeout` passes.
    pub fn wait_for_format(&self, timeout: Duration) -> VisResult<StreamFormat> {
        let guard = self.lock_state();
        let (guard, _) = self
            .state_changed
            .wait_timeout_while(guard, timeout, |s| matches!(s, CaptureState::Starting))
            .unwrap_or_else(|e| e.into_inner());

        match &*guard {
            CaptureState::Streaming(format) => Ok(*format),
            CaptureState::Failed(message) => Err(VisError::CaptureFailed(message.clone())),
            CaptureState::Finished => Err(VisError::CaptureFailed(
                "stream ended before reporting a format".into(),
            )),
            CaptureState::Starting => Err(VisError::CaptureTimeout(timeout)),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
