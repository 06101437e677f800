//! Per-eye drawing: one textured full-coverage triangle into each eye's viewport.

use vrlink_core::{Eye, EyeRect, StereoError, StereoResult};

use crate::backend::{EyeUniforms, GraphicsBackend, Mat4, PipelineDescriptor, IDENTITY};

/// Source of the per-eye projection applied in the vertex stage.
///
/// Headset SDKs supply lens-specific matrices; the default leaves the
/// triangle in clip space untouched.
pub trait ProjectionProvider: Send {
    fn projection(&self, eye: Eye) -> Mat4;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProjection;

impl ProjectionProvider for IdentityProjection {
    fn projection(&self, _eye: Eye) -> Mat4 {
        IDENTITY
    }
}

/// Fixed matrices per eye, e.g. read once from a headset SDK.
#[derive(Debug, Clone, Copy)]
pub struct FixedProjection {
    pub left: Mat4,
    pub right: Mat4,
}

impl ProjectionProvider for FixedProjection {
    fn projection(&self, eye: Eye) -> Mat4 {
        match eye {
            Eye::Left => self.left,
            Eye::Right => self.right,
        }
    }
}

pub struct StereoPresenter<B: GraphicsBackend> {
    pipeline: Option<B::Pipeline>,
    projection: Box<dyn ProjectionProvider>,
    vignette: f32,
}

impl<B: GraphicsBackend> StereoPresenter<B> {
    pub fn new(vignette: f32) -> Self {
        Self::with_projection(vignette, Box::new(IdentityProjection))
    }

    pub fn with_projection(vignette: f32, projection: Box<dyn ProjectionProvider>) -> Self {
        Self {
            pipeline: None,
            projection,
            vignette,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn set_projection(&mut self, projection: Box<dyn ProjectionProvider>) {
        self.projection = projection;
    }

    /// Build the shader pipeline and triangle geometry. Later calls do nothing.
    pub fn initialize(&mut self, backend: &mut B, descriptor: &PipelineDescriptor) -> StereoResult<()> {
        if self.pipeline.is_some() {
            tracing::debug!("presenter already initialized");
            return Ok(());
        }
        self.pipeline = Some(backend.create_pipeline(descriptor)?);
        tracing::debug!(filter = ?descriptor.filter, "presenter pipeline ready");
        Ok(())
    }

    /// Point the viewport at `rect` and draw `texture` across it.
    pub fn draw_eye(
        &self,
        backend: &mut B,
        frame: &mut B::Frame,
        eye: Eye,
        texture: &B::Texture,
        rect: EyeRect,
    ) -> StereoResult<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| StereoError::IllegalState("draw_eye before initialize".into()))?;
        if rect.is_empty() {
            return Err(StereoError::Configuration(format!(
                "{eye} viewport is empty ({}x{})",
                rect.width, rect.height
            )));
        }
        backend.set_viewport(frame, rect);
        let uniforms = EyeUniforms {
            projection: self.projection.projection(eye),
            vignette: self.vignette,
        };
        backend.draw_fullscreen(frame, pipeline, texture, &uniforms)
    }

    /// Free the pipeline. Safe to call more than once.
    pub fn release(&mut self, backend: &mut B) {
        if let Some(pipeline) = self.pipeline.take() {
            backend.destroy_pipeline(pipeline);
        }
    }
}
