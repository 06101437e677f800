//! Latest-wins handoff between the frame delivery side and the render thread.
//!
//! A mailbox holds at most one value. Posting over an unconsumed value replaces
//! it, so a slow consumer only ever sees the newest frame and nothing queues up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::{Eye, RawImage};
use crate::pool::BufferPool;

/// A single-slot, latest-wins mailbox.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, handing back whatever unconsumed value it replaced.
    pub fn post(&self, value: T) -> Option<T> {
        self.slot.lock().replace(value)
    }

    /// Remove and return the current value.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Decoded frames waiting for upload, one slot per eye.
#[derive(Debug, Default)]
pub struct StereoMailbox {
    slots: [Mailbox<RawImage>; 2],
    pool: Arc<BufferPool>,
    superseded: AtomicU64,
}

impl StereoMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer pool shared with the decoder.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Publish a decoded image for `eye`. A frame that was never consumed is
    /// dropped (its buffer goes back to the pool) and counted as superseded.
    pub fn post(&self, eye: Eye, image: RawImage) {
        if let Some(stale) = self.slots[eye.index()].post(image) {
            self.superseded.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(%eye, "superseded an unconsumed frame");
            self.pool.give(stale.into_raw());
        }
    }

    /// Take the newest decoded image for `eye`, if one arrived since the last take.
    pub fn take(&self, eye: Eye) -> Option<RawImage> {
        self.slots[eye.index()].take()
    }

    /// Hand a consumed image's buffer back to the decoder side.
    pub fn recycle(&self, image: RawImage) {
        self.pool.give(image.into_raw());
    }

    /// Frames replaced before the render thread consumed them.
    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }
}
