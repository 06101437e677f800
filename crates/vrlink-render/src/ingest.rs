//! Frame delivery: the host-facing half of the pipeline.
//!
//! Host threads hand over compressed bytes and return immediately. A single
//! decode worker turns the newest pending frame per eye into a [`RawImage`]
//! and posts it to the [`StereoMailbox`] the render thread drains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use vrlink_core::{CompressedFrame, Eye, StereoError, StereoMailbox, StereoResult, ViewerConfig};

use crate::decoder::FrameDecoder;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub frames_received: u64,
    pub frames_decoded: u64,
    pub decode_failures: u64,
    /// Frames replaced before anyone consumed them, pending or decoded.
    pub frames_superseded: u64,
}

/// Work queued for the decode worker.
///
/// Any per-eye frame held here is newer than the held side-by-side frame:
/// a side-by-side arrival drops the per-eye frames it replaces. The worker
/// therefore decodes `stereo` before `eyes`.
#[derive(Default)]
struct Pending {
    eyes: [Option<CompressedFrame>; 2],
    stereo: Option<CompressedFrame>,
    /// Eyes owed a placeholder after a malformed delivery.
    placeholder: [bool; 2],
    closed: bool,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.stereo.is_none()
            && self.eyes.iter().all(Option::is_none)
            && !self.placeholder.iter().any(|&owed| owed)
    }

    fn clear(&mut self) {
        self.eyes = [None, None];
        self.stereo = None;
        self.placeholder = [false; 2];
    }
}

struct DecodeStage {
    decoder: FrameDecoder,
    has_good_frame: [bool; 2],
}

struct Shared {
    pending: Mutex<Pending>,
    wake: Condvar,
    stage: Mutex<DecodeStage>,
    mailbox: Arc<StereoMailbox>,
    received: AtomicU64,
    decoded: AtomicU64,
    failures: AtomicU64,
    superseded: AtomicU64,
}

impl Shared {
    fn decode_eye(&self, eye: Eye, frame: &CompressedFrame) -> StereoResult<()> {
        let mut stage = self.stage.lock();
        match stage.decoder.decode(frame.as_bytes()) {
            Ok(image) => {
                stage.has_good_frame[eye.index()] = true;
                self.decoded.fetch_add(1, Ordering::Relaxed);
                self.mailbox.post(eye, image);
                Ok(())
            }
            Err(err) => {
                self.fail(&mut stage, &[eye], &err);
                Err(err)
            }
        }
    }

    fn decode_stereo(&self, frame: &CompressedFrame) -> StereoResult<()> {
        let mut stage = self.stage.lock();
        match stage.decoder.decode_side_by_side(frame.as_bytes()) {
            Ok((left, right)) => {
                stage.has_good_frame = [true, true];
                self.decoded.fetch_add(1, Ordering::Relaxed);
                self.mailbox.post(Eye::Left, left);
                self.mailbox.post(Eye::Right, right);
                Ok(())
            }
            Err(err) => {
                self.fail(&mut stage, &Eye::ALL, &err);
                Err(err)
            }
        }
    }

    /// Count a failed frame. Eyes that never showed a real frame get the
    /// placeholder; the others keep presenting their last good texture.
    fn fail(&self, stage: &mut DecodeStage, eyes: &[Eye], err: &StereoError) {
        self.count_failure(eyes, err);
        self.post_placeholders(stage, eyes);
    }

    fn count_failure(&self, eyes: &[Eye], err: &StereoError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(error = %err, ?eyes, "dropping undecodable frame");
    }

    fn post_placeholders(&self, stage: &mut DecodeStage, eyes: &[Eye]) {
        for &eye in eyes {
            if !stage.has_good_frame[eye.index()] {
                self.mailbox.post(eye, stage.decoder.placeholder());
            }
        }
    }
}

pub struct FrameIngest {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    inline: bool,
}

impl FrameIngest {
    /// Start a decode worker thread.
    pub fn spawn(config: &ViewerConfig, mailbox: Arc<StereoMailbox>) -> StereoResult<Self> {
        let shared = Self::shared(config, mailbox)?;
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("vrlink-decode".into())
            .spawn(move || decode_loop(&worker_shared))?;
        tracing::debug!("decode worker started");
        Ok(Self {
            shared,
            worker: Some(worker),
            inline: false,
        })
    }

    /// Decode on the delivering thread instead of a worker.
    pub fn inline(config: &ViewerConfig, mailbox: Arc<StereoMailbox>) -> StereoResult<Self> {
        Ok(Self {
            shared: Self::shared(config, mailbox)?,
            worker: None,
            inline: true,
        })
    }

    fn shared(config: &ViewerConfig, mailbox: Arc<StereoMailbox>) -> StereoResult<Arc<Shared>> {
        let decoder = FrameDecoder::from_config(config, mailbox.pool().clone())?;
        Ok(Arc::new(Shared {
            pending: Mutex::new(Pending::default()),
            wake: Condvar::new(),
            stage: Mutex::new(DecodeStage {
                decoder,
                has_good_frame: [false; 2],
            }),
            mailbox,
            received: AtomicU64::new(0),
            decoded: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
        }))
    }

    /// Accept one compressed image for `eye`; only the first `declared_len` bytes count.
    ///
    /// With a worker this returns once the frame is queued. Inline ingest
    /// returns the decode result.
    pub fn on_frame_received(&self, eye: Eye, bytes: &[u8], declared_len: usize) -> StereoResult<()> {
        self.shared.received.fetch_add(1, Ordering::Relaxed);
        let frame = match CompressedFrame::new(bytes, declared_len) {
            Ok(frame) => frame,
            Err(err) => {
                self.malformed(&[eye], &err);
                return Err(err);
            }
        };
        if self.inline {
            return self.shared.decode_eye(eye, &frame);
        }
        self.enqueue(|pending| u64::from(pending.eyes[eye.index()].replace(frame).is_some()))
    }

    /// Accept one side-by-side image carrying both eyes.
    pub fn on_stereo_frame_received(&self, bytes: &[u8], declared_len: usize) -> StereoResult<()> {
        self.shared.received.fetch_add(1, Ordering::Relaxed);
        let frame = match CompressedFrame::new(bytes, declared_len) {
            Ok(frame) => frame,
            Err(err) => {
                self.malformed(&Eye::ALL, &err);
                return Err(err);
            }
        };
        if self.inline {
            return self.shared.decode_stereo(&frame);
        }
        self.enqueue(|pending| {
            let replaced = pending
                .eyes
                .iter_mut()
                .chain(std::iter::once(&mut pending.stereo))
                .filter_map(Option::take)
                .count();
            pending.stereo = Some(frame);
            replaced as u64
        })
    }

    /// Swap work into the pending slots; `swap` returns how many queued
    /// frames it displaced.
    fn enqueue(&self, swap: impl FnOnce(&mut Pending) -> u64) -> StereoResult<()> {
        let mut pending = self.shared.pending.lock();
        if pending.closed {
            return Err(StereoError::IllegalState("frame ingest is shut down".into()));
        }
        let displaced = swap(&mut *pending);
        if displaced > 0 {
            self.shared.superseded.fetch_add(displaced, Ordering::Relaxed);
        }
        drop(pending);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// A delivery that never became a frame. With a worker the placeholder
    /// is left to it, so the host thread never waits on an in-flight decode.
    fn malformed(&self, eyes: &[Eye], err: &StereoError) {
        if self.inline {
            self.shared.fail(&mut self.shared.stage.lock(), eyes, err);
            return;
        }
        self.shared.count_failure(eyes, err);
        let queued = self.enqueue(|pending| {
            for &eye in eyes {
                pending.placeholder[eye.index()] = true;
            }
            0
        });
        if queued.is_err() {
            tracing::debug!("placeholder skipped, ingest is shut down");
        }
    }

    /// Change the per-eye decode size. Waits for an in-flight decode to finish.
    pub fn configure(&self, width: u32, height: u32) -> StereoResult<()> {
        let mut stage = self.shared.stage.lock();
        stage.decoder.configure(width, height)?;
        stage.has_good_frame = [false; 2];
        tracing::info!(width, height, "decode target changed");
        Ok(())
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            frames_received: self.shared.received.load(Ordering::Relaxed),
            frames_decoded: self.shared.decoded.load(Ordering::Relaxed),
            decode_failures: self.shared.failures.load(Ordering::Relaxed),
            frames_superseded: self.shared.superseded.load(Ordering::Relaxed)
                + self.shared.mailbox.superseded(),
        }
    }

    /// Stop accepting frames and join the worker. Pending frames are dropped.
    pub fn shutdown(&mut self) {
        {
            let mut pending = self.shared.pending.lock();
            pending.closed = true;
            pending.clear();
        }
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("decode worker panicked");
            } else {
                tracing::debug!("decode worker stopped");
            }
        }
    }
}

impl Drop for FrameIngest {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn decode_loop(shared: &Shared) {
    loop {
        let (eyes, stereo, placeholder) = {
            let mut pending = shared.pending.lock();
            while pending.is_empty() && !pending.closed {
                shared.wake.wait(&mut pending);
            }
            if pending.closed {
                return;
            }
            let placeholder = std::mem::take(&mut pending.placeholder);
            (
                [pending.eyes[0].take(), pending.eyes[1].take()],
                pending.stereo.take(),
                placeholder,
            )
        };

        if placeholder.iter().any(|&owed| owed) {
            let owed: Vec<Eye> = Eye::ALL
                .into_iter()
                .filter(|eye| placeholder[eye.index()])
                .collect();
            shared.post_placeholders(&mut shared.stage.lock(), &owed);
        }
        if let Some(frame) = stereo {
            let _ = shared.decode_stereo(&frame);
        }
        for (eye, frame) in Eye::ALL.into_iter().zip(eyes) {
            if let Some(frame) = frame {
                let _ = shared.decode_eye(eye, &frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::tests::solid_jpeg;
    use std::time::{Duration, Instant};
    use vrlink_core::RawImage;

    fn config() -> ViewerConfig {
        let mut config = ViewerConfig::default();
        config.textures.width = 8;
        config.textures.height = 8;
        config
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for decode worker");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_inline_decode_posts_to_mailbox() {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = FrameIngest::inline(&config(), mailbox.clone()).unwrap();
        let jpeg = solid_jpeg(8, 8, [0, 0, 250]);
        ingest.on_frame_received(Eye::Right, &jpeg, jpeg.len()).unwrap();
        let image = mailbox.take(Eye::Right).unwrap();
        assert_eq!(image.dimensions(), (8, 8));
        assert!(mailbox.take(Eye::Left).is_none());
        assert_eq!(ingest.stats().frames_decoded, 1);
    }

    #[test]
    fn test_declared_length_is_checked() {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = FrameIngest::inline(&config(), mailbox.clone()).unwrap();
        let jpeg = solid_jpeg(8, 8, [0, 0, 250]);
        assert!(ingest.on_frame_received(Eye::Left, &jpeg, 0).is_err());
        assert!(ingest
            .on_frame_received(Eye::Left, &jpeg, jpeg.len() + 1)
            .is_err());
        assert!(ingest
            .on_frame_received(Eye::Left, &jpeg, jpeg.len() / 2)
            .is_err());
        assert_eq!(ingest.stats().decode_failures, 3);
    }

    #[test]
    fn test_failure_before_first_frame_posts_placeholder() {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = FrameIngest::inline(&config(), mailbox.clone()).unwrap();
        assert!(ingest.on_frame_received(Eye::Left, b"garbage", 7).is_err());
        let placeholder = mailbox.take(Eye::Left).unwrap();
        assert_eq!(placeholder.get_pixel(0, 0), Some([128, 128, 128]));
    }

    #[test]
    fn test_failure_after_good_frame_posts_nothing() {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = FrameIngest::inline(&config(), mailbox.clone()).unwrap();
        let jpeg = solid_jpeg(8, 8, [10, 10, 10]);
        ingest.on_frame_received(Eye::Left, &jpeg, jpeg.len()).unwrap();
        mailbox.take(Eye::Left).unwrap();
        assert!(ingest.on_frame_received(Eye::Left, b"garbage", 7).is_err());
        assert!(mailbox.take(Eye::Left).is_none());
    }

    #[test]
    fn test_worker_decodes_latest_frame() {
        let mailbox = Arc::new(StereoMailbox::new());
        let mut ingest = FrameIngest::spawn(&config(), mailbox.clone()).unwrap();
        let jpeg = solid_jpeg(8, 8, [240, 240, 240]);
        for _ in 0..5 {
            ingest.on_frame_received(Eye::Left, &jpeg, jpeg.len()).unwrap();
        }
        wait_for(|| ingest.stats().frames_decoded >= 1);
        ingest.shutdown();
        let stats = ingest.stats();
        assert_eq!(stats.frames_received, 5);
        assert!(stats.frames_decoded <= 5);
        assert!(mailbox.take(Eye::Left).is_some());
        assert!(ingest
            .on_frame_received(Eye::Left, &jpeg, jpeg.len())
            .is_err());
    }

    fn wait_for_image(mailbox: &StereoMailbox, eye: Eye) -> RawImage {
        let mut image = None;
        wait_for(|| {
            image = mailbox.take(eye);
            image.is_some()
        });
        image.unwrap()
    }

    #[test]
    fn test_malformed_delivery_does_not_wait_for_decode() {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = Arc::new(FrameIngest::spawn(&config(), mailbox.clone()).unwrap());
        let jpeg = solid_jpeg(8, 8, [1, 1, 1]);

        // Stands in for a long decode on the worker.
        let busy = ingest.shared.stage.lock();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let host = ingest.clone();
        thread::spawn(move || {
            let result = host.on_frame_received(Eye::Right, &jpeg, 0);
            let _ = done_tx.send(result.is_err());
        });
        let rejected = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("delivery blocked behind the decode stage");
        assert!(rejected);
        assert_eq!(ingest.stats().decode_failures, 1);
        drop(busy);

        let placeholder = wait_for_image(&mailbox, Eye::Right);
        assert_eq!(placeholder.get_pixel(0, 0), Some([128, 128, 128]));
        assert!(mailbox.take(Eye::Left).is_none());
    }

    #[test]
    fn test_side_by_side_supersedes_older_eye_frames() {
        let mailbox = Arc::new(StereoMailbox::new());
        let mut ingest = FrameIngest::spawn(&config(), mailbox.clone()).unwrap();
        let red = solid_jpeg(8, 8, [250, 0, 0]);
        let blue = solid_jpeg(16, 8, [0, 0, 250]);

        let busy = ingest.shared.stage.lock();
        ingest.on_frame_received(Eye::Left, &red, red.len()).unwrap();
        ingest.on_stereo_frame_received(&blue, blue.len()).unwrap();
        drop(busy);

        // Either the red frame was decoded first or it was dropped in the queue.
        wait_for(|| {
            ingest.stats().frames_decoded + ingest.shared.superseded.load(Ordering::Relaxed) >= 2
        });
        ingest.shutdown();

        for eye in Eye::ALL {
            let px = mailbox.take(eye).unwrap().get_pixel(4, 4).unwrap();
            assert!(px[2] > 200 && px[0] < 50, "{eye} eye shows {px:?}");
        }
    }

    #[test]
    fn test_eye_frame_after_side_by_side_wins() {
        let mailbox = Arc::new(StereoMailbox::new());
        let mut ingest = FrameIngest::spawn(&config(), mailbox.clone()).unwrap();
        let blue = solid_jpeg(16, 8, [0, 0, 250]);
        let red = solid_jpeg(8, 8, [250, 0, 0]);

        let busy = ingest.shared.stage.lock();
        ingest.on_stereo_frame_received(&blue, blue.len()).unwrap();
        ingest.on_frame_received(Eye::Left, &red, red.len()).unwrap();
        drop(busy);

        wait_for(|| ingest.stats().frames_decoded >= 2);
        ingest.shutdown();

        let left = mailbox.take(Eye::Left).unwrap().get_pixel(4, 4).unwrap();
        let right = mailbox.take(Eye::Right).unwrap().get_pixel(4, 4).unwrap();
        assert!(left[0] > 200 && left[2] < 50, "left eye shows {left:?}");
        assert!(right[2] > 200 && right[0] < 50, "right eye shows {right:?}");
    }

    #[test]
    fn test_stereo_delivery_fills_both_eyes() {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = FrameIngest::inline(&config(), mailbox.clone()).unwrap();
        let jpeg = solid_jpeg(16, 8, [90, 90, 90]);
        ingest.on_stereo_frame_received(&jpeg, jpeg.len()).unwrap();
        assert_eq!(mailbox.take(Eye::Left).unwrap().dimensions(), (8, 8));
        assert_eq!(mailbox.take(Eye::Right).unwrap().dimensions(), (8, 8));
    }

    #[test]
    fn test_configure_changes_decode_size() {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = FrameIngest::inline(&config(), mailbox.clone()).unwrap();
        ingest.configure(4, 2).unwrap();
        assert!(ingest.configure(0, 2).is_err());
        let jpeg = solid_jpeg(8, 8, [0, 0, 0]);
        ingest.on_frame_received(Eye::Left, &jpeg, jpeg.len()).unwrap();
        assert_eq!(mailbox.take(Eye::Left).unwrap().dimensions(), (4, 2));
    }
}
