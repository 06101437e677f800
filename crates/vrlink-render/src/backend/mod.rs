//! The graphics seam between the stereo pipeline and a concrete GPU API.
//!
//! [`TextureStore`](crate::store::TextureStore),
//! [`StereoPresenter`](crate::presenter::StereoPresenter) and
//! [`DisplaySession`](crate::session::DisplaySession) are written against
//! [`GraphicsBackend`] only. Two backends ship:
//!
//! - [`gpu::WgpuBackend`]: the on-device path (Vulkan/GLES through wgpu).
//! - [`software::SoftwareBackend`]: a CPU rasterizer with the same semantics,
//!   used by the CLI for offline snapshots and by the tests for pixel checks.

pub mod gpu;
pub mod software;

use vrlink_core::config::{DisplayConfig, FilterMode};
use vrlink_core::{EyeRect, RawImage, StereoResult};

/// A 4×4 column-major matrix.
pub type Mat4 = [[f32; 4]; 4];

pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// One vertex of the full-coverage triangle.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// A single triangle whose vertices extend past the unit square.
///
/// Clipped to the viewport it covers every pixel with no seam, so one draw of
/// three vertices fills an eye without a second triangle or an index buffer.
/// `uv` runs 0..1 across the visible square with v = 0 at the top row.
pub const FULL_SCREEN_TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    Vertex {
        position: [3.0, -1.0],
        uv: [2.0, 1.0],
    },
    Vertex {
        position: [-1.0, 3.0],
        uv: [0.0, -1.0],
    },
];

/// Attributes requested when the render context is created.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceAttributes {
    pub depth_bits: u8,
    pub msaa_samples: u32,
    pub vsync: bool,
}

impl SurfaceAttributes {
    pub fn from_display(display: &DisplayConfig) -> Self {
        Self {
            depth_bits: display.depth_bits,
            msaa_samples: display.msaa_samples,
            vsync: display.vsync,
        }
    }
}

/// Static description of the textured-triangle pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineDescriptor {
    pub filter: FilterMode,
}

/// Per-draw shader inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeUniforms {
    pub projection: Mat4,
    pub vignette: f32,
}

impl Default for EyeUniforms {
    fn default() -> Self {
        Self {
            projection: IDENTITY,
            vignette: 0.0,
        }
    }
}

/// The operations the stereo pipeline needs from a graphics API.
///
/// All methods run on the thread that called [`connect`](Self::connect);
/// implementations never migrate or re-acquire their context.
pub trait GraphicsBackend {
    /// What the host hands over to draw into (a native window, an offscreen size, ...).
    type Target;
    type Texture;
    type Pipeline;
    /// An in-flight frame between [`begin_frame`](Self::begin_frame) and [`present`](Self::present).
    type Frame;

    /// Bring up display connection, configuration, surface and context, and make
    /// the context current. Failures name the stage that failed.
    fn connect(&mut self, target: Self::Target, attributes: &SurfaceAttributes) -> StereoResult<()>;

    /// Whether display, surface and context are all live.
    fn is_connected(&self) -> bool;

    /// Current drawing-surface size, once known.
    fn surface_size(&self) -> Option<(u32, u32)>;

    /// Match the drawing surface to a new display size.
    fn resize_surface(&mut self, width: u32, height: u32) -> StereoResult<()>;

    /// Allocate an RGB texture of fixed dimensions.
    fn create_texture(&mut self, width: u32, height: u32) -> StereoResult<Self::Texture>;

    /// Replace a texture's contents. The image must match the texture's dimensions.
    fn write_texture(&mut self, texture: &Self::Texture, image: &RawImage) -> StereoResult<()>;

    fn destroy_texture(&mut self, texture: Self::Texture);

    /// Build the shader program and full-coverage geometry.
    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> StereoResult<Self::Pipeline>;

    fn destroy_pipeline(&mut self, pipeline: Self::Pipeline);

    /// Acquire the next surface image and clear color and depth.
    fn begin_frame(&mut self, clear_color: [f32; 4]) -> StereoResult<Self::Frame>;

    /// Set the viewport used by subsequent draws in this frame.
    fn set_viewport(&mut self, frame: &mut Self::Frame, rect: EyeRect);

    /// Draw the full-coverage triangle sampling `texture` into the current viewport.
    fn draw_fullscreen(
        &mut self,
        frame: &mut Self::Frame,
        pipeline: &Self::Pipeline,
        texture: &Self::Texture,
        uniforms: &EyeUniforms,
    ) -> StereoResult<()>;

    /// Submit the frame and swap it to the display.
    fn present(&mut self, frame: Self::Frame) -> StereoResult<()>;

    /// Release context, surface and display connection, in that order.
    fn disconnect(&mut self);
}
