//! Frame aggregator (§4.I).
//!
//! Owns the Idle/Open/Resolving lifecycle for the newest frame: submit
//! batches accumulate into the open frame, and at the frame delimiter the
//! accumulated batches are handed to a [`FrameResolver`] and a fresh frame
//! opens immediately, without waiting for the previous one to resolve. This
//! is what makes background aggregation worthwhile — the render thread never
//! blocks on the previous frame's query readback (§9 "Background worker with
//! coroutine-like suspension"). Domain-specific resolution (reading query
//! pools, the catalog, the memory tracker, counters) is left to the
//! resolver, which only the facade can implement; this module is the
//! generic state machine, threading, and bounded-buffer plumbing around it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::config::FrameDelimiter;
use crate::errors::ConfigError;
use crate::frame::FrameRecord;
use crate::submit::SubmitBatch;

/// Where the newest frame sits in its lifecycle (§4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame has been opened yet (only observable before the first
    /// `begin_first_frame` call).
    Idle,
    Open,
    /// Only observed when background aggregation is disabled: the delimiter
    /// thread is synchronously resolving the just-closed frame.
    Resolving,
}

/// Everything accumulated for one frame while it is Open.
pub struct PendingFrame {
    pub index: u64,
    pub created_at_host_ns: u64,
    pub submits: Vec<SubmitBatch>,
}

/// Produces a resolved [`FrameRecord`] from one frame's accumulated submit
/// batches (§4.I "Resolving"). Implemented by the facade, which alone holds
/// the query pools, catalog, memory tracker, and counter backend the resolve
/// step reads from.
pub trait FrameResolver: Send + Sync + 'static {
    fn resolve(&self, pending: PendingFrame, delimiter: FrameDelimiter, fps: f64) -> FrameRecord;
}

enum Job {
    Resolve {
        pending: PendingFrame,
        delimiter: FrameDelimiter,
        fps: f64,
    },
    Shutdown,
}

fn push_frame(
    buffer: &Mutex<VecDeque<FrameRecord>>,
    capacity: u32,
    dropped: &AtomicU64,
    frame: FrameRecord,
) {
    let mut buffer = buffer.lock();
    if buffer.len() >= capacity as usize {
        buffer.pop_front();
        dropped.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "frame data buffer at capacity ({capacity}), dropping oldest unread frame"
        );
    }
    buffer.push_back(frame);
}

/// The Idle/Open/Resolving frame lifecycle, a bounded frame buffer with
/// oldest-frame-drop on overflow, and (when `enable_threading` is set) a
/// background worker that resolves off the caller's thread (§4.I, §6
/// `enable_threading`, `data_buffer_size`, `min_data_buffer_size`).
pub struct FrameAggregator {
    state: Mutex<FrameState>,
    current: Mutex<Option<PendingFrame>>,
    next_frame_index: AtomicU64,
    buffer: Arc<Mutex<VecDeque<FrameRecord>>>,
    data_buffer_size: Arc<AtomicU32>,
    min_data_buffer_size: u32,
    dropped_frames: Arc<AtomicU64>,
    resolver: Arc<dyn FrameResolver>,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl FrameAggregator {
    /// Constructs the aggregator and opens frame #0 (§3 "Frames: created at
    /// engine initialization"). `data_buffer_size`/`min_data_buffer_size`
    /// must already be validated by [`crate::config::ProfilerConfig::validate`].
    pub fn new(
        resolver: Arc<dyn FrameResolver>,
        data_buffer_size: u32,
        min_data_buffer_size: u32,
        enable_threading: bool,
        initial_host_ns: u64,
    ) -> Self {
        let buffer = Arc::new(Mutex::new(VecDeque::with_capacity(data_buffer_size as usize)));
        let dropped_frames = Arc::new(AtomicU64::new(0));
        let data_buffer_size = Arc::new(AtomicU32::new(data_buffer_size));

        let (jobs, worker) = if enable_threading {
            let (tx, rx) = mpsc::channel::<Job>();
            let worker_resolver = resolver.clone();
            let worker_buffer = buffer.clone();
            let worker_dropped = dropped_frames.clone();
            let worker_capacity = data_buffer_size.clone();
            let handle = std::thread::spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Resolve { pending, delimiter, fps } => {
                            let frame = worker_resolver.resolve(pending, delimiter, fps);
                            push_frame(
                                &worker_buffer,
                                worker_capacity.load(Ordering::Acquire),
                                &worker_dropped,
                                frame,
                            );
                        }
                        Job::Shutdown => break,
                    }
                }
            });
            (Some(tx), Some(handle))
        } else {
            (None, None)
        };

        Self {
            state: Mutex::new(FrameState::Open),
            current: Mutex::new(Some(PendingFrame {
                index: 0,
                created_at_host_ns: initial_host_ns,
                submits: Vec::new(),
            })),
            next_frame_index: AtomicU64::new(1),
            buffer,
            data_buffer_size,
            min_data_buffer_size,
            dropped_frames,
            resolver,
            jobs,
            worker,
        }
    }

    pub fn state(&self) -> FrameState {
        *self.state.lock()
    }

    /// Appends one submit batch to the currently open frame (§4.I "accumulates
    /// submit batches"). A no-op with a warning if called before the first
    /// frame opens, which should not happen after construction.
    pub fn append_submit(&self, batch: SubmitBatch) {
        let mut current = self.current.lock();
        match current.as_mut() {
            Some(pending) => pending.submits.push(batch),
            None => log::warn!("append_submit called with no frame open"),
        }
    }

    /// Closes the current frame at a delimiter event, opens the next one
    /// immediately, and dispatches resolution of the closed frame (inline if
    /// threading is disabled, otherwise to the background worker) (§4.I).
    pub fn delimiter(&self, delimiter: FrameDelimiter, next_frame_host_ns: u64, fps: f64) {
        let closed = {
            let mut current = self.current.lock();
            let index = self.next_frame_index.fetch_add(1, Ordering::Relaxed);
            current.replace(PendingFrame {
                index,
                created_at_host_ns: next_frame_host_ns,
                submits: Vec::new(),
            })
        };
        let Some(pending) = closed else {
            return;
        };

        match &self.jobs {
            Some(jobs) => {
                let _ = jobs.send(Job::Resolve { pending, delimiter, fps });
            }
            None => {
                *self.state.lock() = FrameState::Resolving;
                let frame = self.resolver.resolve(pending, delimiter, fps);
                push_frame(
                    &self.buffer,
                    self.data_buffer_size.load(Ordering::Acquire),
                    &self.dropped_frames,
                    frame,
                );
                *self.state.lock() = FrameState::Open;
            }
        }
    }

    /// Returns and removes the oldest resolved frame not yet retrieved, or
    /// `None` if the buffer is empty (§6 "consumer `poll_frame()` interface").
    pub fn poll_frame(&self) -> Option<FrameRecord> {
        self.buffer.lock().pop_front()
    }

    /// Non-destructively looks up a resolved frame by index, if still buffered.
    pub fn peek(&self, index: u64) -> Option<FrameRecord> {
        self.buffer
            .lock()
            .iter()
            .find(|frame| frame.index == index)
            .cloned()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn dropped_frame_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Changes the buffer capacity, trimming the oldest entries if it shrinks
    /// below the current occupancy (§4.I "Configuration setters take a mutex").
    pub fn set_data_buffer_size(&self, size: u32) -> Result<(), ConfigError> {
        if size < self.min_data_buffer_size {
            return Err(ConfigError::DataBufferSizeBelowMinimum {
                requested: size,
                minimum: self.min_data_buffer_size,
            });
        }
        self.data_buffer_size.store(size, Ordering::Release);
        let mut buffer = self.buffer.lock();
        while buffer.len() > size as usize {
            buffer.pop_front();
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn data_buffer_size(&self) -> u32 {
        self.data_buffer_size.load(Ordering::Acquire)
    }
}

impl Drop for FrameAggregator {
    fn drop(&mut self) {
        if let Some(jobs) = self.jobs.take() {
            let _ = jobs.send(Job::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
