//! Host configuration for a plugin strip.

use serde::{Deserialize, Serialize};

/// Byte size of each deferred-work ring.
pub const DEFAULT_WORKER_RING_SIZE: usize = 4096;

/// Byte size of each UI event ring.
pub const DEFAULT_EVENT_RING_SIZE: usize = 8192;

/// Byte size of each plugin-visible event port buffer.
pub const DEFAULT_ATOM_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    pub sample_rate: f64,
    /// Current (and maximum) block length in frames.
    pub block_size: u32,
    pub min_block_size: u32,
    /// Audio channels of the mixer strip the plugin is inserted into.
    pub channels: usize,
    pub worker_ring_size: usize,
    pub event_ring_size: usize,
    pub atom_buffer_size: usize,
    /// Run deferred work on a dedicated thread (else inline, when the plugin allows it).
    pub threaded_worker: bool,
    /// Spawn the worker thread on load. When off, the owner drives
    /// [`DeferredWork::step`](crate::DeferredWork::step) itself.
    pub spawn_worker_thread: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 1024,
            min_block_size: 1,
            channels: 2,
            worker_ring_size: DEFAULT_WORKER_RING_SIZE,
            event_ring_size: DEFAULT_EVENT_RING_SIZE,
            atom_buffer_size: DEFAULT_ATOM_BUFFER_SIZE,
            threaded_worker: true,
            spawn_worker_thread: true,
        }
    }
}

impl HostConfig {
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, frames: u32) -> Self {
        self.block_size = frames;
        self
    }

    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn worker_ring_size(mut self, bytes: usize) -> Self {
        self.worker_ring_size = bytes;
        self
    }

    pub fn event_ring_size(mut self, bytes: usize) -> Self {
        self.event_ring_size = bytes;
        self
    }

    pub fn atom_buffer_size(mut self, bytes: usize) -> Self {
        self.atom_buffer_size = bytes;
        self
    }

    pub fn threaded_worker(mut self, threaded: bool) -> Self {
        self.threaded_worker = threaded;
        self
    }

    pub fn spawn_worker_thread(mut self, spawn: bool) -> Self {
        self.spawn_worker_thread = spawn;
        self
    }
}
