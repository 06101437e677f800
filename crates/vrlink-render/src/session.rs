//! The render-thread side of the viewer: surface lifecycle and the per-frame loop.
//!
//! A [`DisplaySession`] walks `Uninitialized → SurfaceReady → Rendering →
//! TornDown`. The thread that attaches the surface owns the graphics context
//! for the rest of the session; calls from any other thread are rejected.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use vrlink_core::config::DisplayConfig;
use vrlink_core::{
    Eye, RawImage, StereoError, StereoMailbox, StereoResult, ViewerConfig, ViewportGeometry,
};

use crate::backend::{GraphicsBackend, PipelineDescriptor, SurfaceAttributes};
use crate::presenter::{ProjectionProvider, StereoPresenter};
use crate::store::TextureStore;

/// Frames between progress log lines.
const PROGRESS_INTERVAL: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    SurfaceReady,
    Rendering,
    TornDown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_presented: u64,
    pub present_failures: u64,
    pub uploads: u64,
    pub upload_failures: u64,
    pub draw_failures: u64,
}

pub struct DisplaySession<B: GraphicsBackend> {
    backend: B,
    state: SessionState,
    owner: Option<ThreadId>,
    display: DisplayConfig,
    texture_size: (u32, u32),
    placeholder_gray: u8,
    geometry: ViewportGeometry,
    store: Option<TextureStore<B>>,
    presenter: StereoPresenter<B>,
    mailbox: Arc<StereoMailbox>,
    stats: SessionStats,
}

impl<B: GraphicsBackend> DisplaySession<B> {
    pub fn new(backend: B, config: &ViewerConfig, mailbox: Arc<StereoMailbox>) -> Self {
        Self {
            backend,
            state: SessionState::Uninitialized,
            owner: None,
            display: config.display.clone(),
            texture_size: (config.textures.width, config.textures.height),
            placeholder_gray: config.decoder.placeholder_gray,
            geometry: ViewportGeometry::default(),
            store: None,
            presenter: StereoPresenter::new(config.display.vignette),
            mailbox,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn geometry(&self) -> ViewportGeometry {
        self.geometry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn set_projection(&mut self, projection: Box<dyn ProjectionProvider>) {
        self.presenter.set_projection(projection);
    }

    /// Bring up the render context on `target` and create textures and pipeline.
    ///
    /// The calling thread becomes the owner thread.
    pub fn attach_surface(&mut self, target: B::Target) -> StereoResult<()> {
        if self.state != SessionState::Uninitialized {
            let err = StereoError::IllegalState(format!(
                "attach_surface in state {:?}",
                self.state
            ));
            tracing::error!(error = %err, "surface attach rejected");
            return Err(err);
        }

        let attributes = SurfaceAttributes::from_display(&self.display);
        if let Err(err) = self.backend.connect(target, &attributes) {
            match &err {
                StereoError::Context { stage, message } => {
                    tracing::error!(%stage, %message, "render context setup failed")
                }
                other => tracing::error!(error = %other, "render context setup failed"),
            }
            return Err(err);
        }

        self.owner = Some(thread::current().id());
        self.state = SessionState::SurfaceReady;
        if let Some((width, height)) = self.backend.surface_size() {
            self.geometry = ViewportGeometry::new(width, height).unwrap_or_default();
        }
        tracing::info!(
            width = self.geometry.width(),
            height = self.geometry.height(),
            "surface attached"
        );

        if let Err(err) = self.init_components() {
            tracing::error!(error = %err, "stereo pipeline setup failed, not rendering");
            if let Some(mut store) = self.store.take() {
                store.release(&mut self.backend);
            }
            self.presenter.release(&mut self.backend);
            return Err(err);
        }
        self.state = SessionState::Rendering;
        Ok(())
    }

    fn init_components(&mut self) -> StereoResult<()> {
        let (width, height) = self.texture_size;
        let placeholder = RawImage::solid(width, height, [self.placeholder_gray; 3]);
        self.store = Some(TextureStore::create(
            &mut self.backend,
            width,
            height,
            &placeholder,
        )?);
        self.presenter.initialize(
            &mut self.backend,
            &PipelineDescriptor {
                filter: self.display.filter,
            },
        )
    }

    /// Record a new display size and resize the drawing surface to match.
    pub fn configure(&mut self, width: u32, height: u32) -> StereoResult<()> {
        if matches!(
            self.state,
            SessionState::Uninitialized | SessionState::TornDown
        ) {
            let err = StereoError::Configuration(format!(
                "configure({width}, {height}) without a surface ({:?})",
                self.state
            ));
            tracing::warn!(error = %err, "configure ignored");
            return Err(err);
        }
        self.check_owner("configure")?;

        let geometry = ViewportGeometry::new(width, height).inspect_err(|err| {
            tracing::warn!(error = %err, "configure ignored");
        })?;
        self.backend.resize_surface(width, height)?;
        self.geometry = geometry;
        tracing::info!(width, height, "viewport configured");
        Ok(())
    }

    /// Reallocate the eye textures at a new size, showing the placeholder
    /// until frames of that size arrive.
    ///
    /// Images already decoded at the old size are rejected at upload, so the
    /// frame producer has to be retargeted too (`FrameIngest::configure`).
    pub fn resize_textures(&mut self, width: u32, height: u32) -> StereoResult<()> {
        self.check_owner("resize_textures")?;
        let store = self.store.as_mut().ok_or_else(|| {
            StereoError::IllegalState(format!("resize_textures in state {:?}", self.state))
        })?;
        if width == 0 || height == 0 {
            return Err(StereoError::Configuration(format!(
                "texture size must be positive, got {width}x{height}"
            )));
        }
        let placeholder = RawImage::solid(width, height, [self.placeholder_gray; 3]);
        store.resize(&mut self.backend, width, height, &placeholder)?;
        self.texture_size = (width, height);
        tracing::info!(width, height, "eye textures resized");
        Ok(())
    }

    /// Upload whatever arrived since the last frame, draw both eyes and present.
    pub fn render_frame(&mut self) -> StereoResult<()> {
        if self.state != SessionState::Rendering {
            let err = StereoError::IllegalState(format!("render_frame in state {:?}", self.state));
            tracing::warn!(error = %err, "frame skipped");
            return Err(err);
        }
        self.check_owner("render_frame")?;
        if !self.geometry.is_valid() {
            return Err(StereoError::Configuration(
                "render_frame before the viewport has a size".into(),
            ));
        }
        let Some(store) = self.store.as_mut() else {
            return Err(StereoError::IllegalState("no eye textures".into()));
        };

        for eye in Eye::ALL {
            let Some(image) = self.mailbox.take(eye) else {
                continue;
            };
            match store.upload(&mut self.backend, eye, &image) {
                Ok(()) => self.stats.uploads += 1,
                Err(err) => {
                    self.stats.upload_failures += 1;
                    tracing::warn!(%eye, error = %err, "upload failed, keeping previous texture");
                }
            }
            self.mailbox.recycle(image);
        }

        let mut frame = match self.backend.begin_frame(self.display.clear_color) {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.present_failures += 1;
                tracing::warn!(error = %err, "could not acquire a frame");
                return Err(err);
            }
        };

        for eye in Eye::ALL {
            let Some(texture) = store.texture(eye) else {
                continue;
            };
            let rect = self.geometry.eye_rect(eye);
            if let Err(err) =
                self.presenter
                    .draw_eye(&mut self.backend, &mut frame, eye, texture, rect)
            {
                self.stats.draw_failures += 1;
                tracing::warn!(%eye, error = %err, "eye draw failed");
            }
        }

        if let Err(err) = self.backend.present(frame) {
            self.stats.present_failures += 1;
            tracing::warn!(error = %err, "present failed");
            return Err(err);
        }

        self.stats.frames_presented += 1;
        if self.stats.frames_presented % PROGRESS_INTERVAL == 0 {
            tracing::debug!(
                frames = self.stats.frames_presented,
                superseded = self.mailbox.superseded(),
                "rendering"
            );
        }
        Ok(())
    }

    /// Release textures, pipeline, then the context itself.
    pub fn detach_surface(&mut self) -> StereoResult<()> {
        if matches!(
            self.state,
            SessionState::Uninitialized | SessionState::TornDown
        ) {
            return Ok(());
        }
        self.check_owner("detach_surface")?;
        self.teardown();
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(mut store) = self.store.take() {
            store.release(&mut self.backend);
        }
        self.presenter.release(&mut self.backend);
        self.backend.disconnect();
        self.state = SessionState::TornDown;
        self.owner = None;
        tracing::info!(frames = self.stats.frames_presented, "surface detached");
    }

    fn check_owner(&self, operation: &str) -> StereoResult<()> {
        match self.owner {
            Some(owner) if owner != thread::current().id() => {
                let err = StereoError::IllegalState(format!(
                    "{operation} called off the render thread"
                ));
                tracing::error!(error = %err, "thread check failed");
                Err(err)
            }
            _ => Ok(()),
        }
    }
}

impl<B: GraphicsBackend> Drop for DisplaySession<B> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            SessionState::SurfaceReady | SessionState::Rendering
        ) {
            if self.owner != Some(thread::current().id()) {
                tracing::warn!("display session dropped off the render thread");
            }
            self.teardown();
        }
    }
}
