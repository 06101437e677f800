//! Host-owned viewer state behind the JNI handle.
//!
//! One [`ViewerBridge`] lives per activity. Lifecycle callbacks arrive on the
//! host's render thread; frame deliveries arrive on whichever thread the
//! network stack uses and only touch the ingest side.

use std::sync::Arc;

use parking_lot::Mutex;

use vrlink_core::{Eye, StereoError, StereoMailbox, StereoResult, ViewerConfig};
use vrlink_render::{DisplaySession, FrameIngest, GraphicsBackend, IngestStats, SessionState};

pub struct ViewerBridge<B: GraphicsBackend + Default> {
    /// Texture size tracks [`ViewerBridge::resize_textures`] so a recreated
    /// surface matches the decoder.
    config: Mutex<ViewerConfig>,
    mailbox: Arc<StereoMailbox>,
    ingest: FrameIngest,
    session: Mutex<Option<DisplaySession<B>>>,
}

impl<B: GraphicsBackend + Default> ViewerBridge<B> {
    /// Bridge with a background decode worker.
    pub fn new(config: ViewerConfig) -> StereoResult<Self> {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = FrameIngest::spawn(&config, mailbox.clone())?;
        Ok(Self::assemble(config, mailbox, ingest))
    }

    /// Bridge that decodes on the delivering thread.
    pub fn new_inline(config: ViewerConfig) -> StereoResult<Self> {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = FrameIngest::inline(&config, mailbox.clone())?;
        Ok(Self::assemble(config, mailbox, ingest))
    }

    fn assemble(config: ViewerConfig, mailbox: Arc<StereoMailbox>, ingest: FrameIngest) -> Self {
        tracing::info!(
            width = config.textures.width,
            height = config.textures.height,
            delivery = ?config.decoder.delivery,
            "viewer bridge created"
        );
        Self {
            config: Mutex::new(config),
            mailbox,
            ingest,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> ViewerConfig {
        self.config.lock().clone()
    }

    /// A new drawing surface. Any previous session is torn down first and a
    /// fresh one is attached on the calling thread.
    pub fn on_surface_created(&self, target: B::Target) -> StereoResult<()> {
        let mut slot = self.session.lock();
        if let Some(mut previous) = slot.take() {
            if matches!(
                previous.state(),
                SessionState::SurfaceReady | SessionState::Rendering
            ) {
                tracing::warn!("surface created while a session is live, replacing it");
                if let Err(err) = previous.detach_surface() {
                    tracing::warn!(error = %err, "previous session detached on drop");
                }
            }
        }

        let config = self.config();
        let mut session = DisplaySession::new(B::default(), &config, self.mailbox.clone());
        let result = session.attach_surface(target);
        *slot = Some(session);
        result
    }

    pub fn on_surface_changed(&self, width: i32, height: i32) -> StereoResult<()> {
        let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                let err = StereoError::Configuration(format!(
                    "negative surface size {width}x{height}"
                ));
                tracing::warn!(error = %err, "surface change ignored");
                return Err(err);
            }
        };
        match self.session.lock().as_mut() {
            Some(session) => session.configure(width, height),
            None => {
                let err = StereoError::Configuration(
                    "surface changed before a surface was created".into(),
                );
                tracing::warn!(error = %err, "surface change ignored");
                Err(err)
            }
        }
    }

    pub fn on_draw_frame(&self) -> StereoResult<()> {
        match self.session.lock().as_mut() {
            Some(session) => session.render_frame(),
            None => Err(StereoError::IllegalState(
                "draw requested without a surface".into(),
            )),
        }
    }

    /// One compressed image for the eye with host code `eye` (0 = left, 1 = right).
    pub fn on_frame_received(&self, eye: i32, bytes: &[u8], size: i32) -> StereoResult<()> {
        let eye = Eye::from_code(eye).inspect_err(|err| {
            tracing::warn!(error = %err, "frame dropped");
        })?;
        self.ingest
            .on_frame_received(eye, bytes, declared_len(size)?)
    }

    /// One side-by-side image carrying both eyes.
    pub fn on_stereo_frame_received(&self, bytes: &[u8], size: i32) -> StereoResult<()> {
        self.ingest
            .on_stereo_frame_received(bytes, declared_len(size)?)
    }

    /// Left and right images delivered together. Both are attempted; the
    /// first error is reported.
    pub fn update_texture(
        &self,
        left: &[u8],
        left_size: i32,
        right: &[u8],
        right_size: i32,
    ) -> StereoResult<()> {
        let left = self.on_frame_received(Eye::Left.index() as i32, left, left_size);
        let right = self.on_frame_received(Eye::Right.index() as i32, right, right_size);
        left.and(right)
    }

    /// Change the eye texture size. The decoder is retargeted first, then
    /// the live session (if any) reallocates its textures. Frames decoded at
    /// the old size may still be rejected once at upload.
    pub fn resize_textures(&self, width: u32, height: u32) -> StereoResult<()> {
        self.ingest.configure(width, height)?;
        {
            let mut config = self.config.lock();
            config.textures.width = width;
            config.textures.height = height;
        }
        match self.session.lock().as_mut() {
            Some(session) if session.state() == SessionState::Rendering => {
                session.resize_textures(width, height)
            }
            _ => Ok(()),
        }
    }

    /// Tear down the current session. The next surface starts a fresh one.
    pub fn on_surface_destroyed(&self) -> StereoResult<()> {
        match self.session.lock().take() {
            Some(mut session) => session.detach_surface(),
            None => Ok(()),
        }
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.session.lock().as_ref().map(DisplaySession::state)
    }

    pub fn ingest_stats(&self) -> IngestStats {
        self.ingest.stats()
    }

    /// Run `f` against the live session, if any.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut DisplaySession<B>) -> R) -> Option<R> {
        self.session.lock().as_mut().map(f)
    }
}

impl<B: GraphicsBackend + Default> Drop for ViewerBridge<B> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.lock().take() {
            if let Err(err) = session.detach_surface() {
                tracing::warn!(error = %err, "session released during shutdown");
            }
        }
        self.ingest.shutdown();
        tracing::info!("viewer bridge destroyed");
    }
}

fn declared_len(size: i32) -> StereoResult<usize> {
    usize::try_from(size).map_err(|_| StereoError::Decode(format!("negative frame size {size}")))
}
