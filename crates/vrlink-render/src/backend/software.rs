//! CPU implementation of [`GraphicsBackend`].
//!
//! Rasterizes the same full-coverage triangle the GPU path draws, with the
//! same uv convention, clamp-to-edge sampling and vignette, into an RGBA
//! framebuffer that can be read back after present.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::Mutex;
use vrlink_core::config::FilterMode;
use vrlink_core::{ContextStage, EyeRect, RawImage, StereoError, StereoResult};

use super::{
    EyeUniforms, GraphicsBackend, Mat4, PipelineDescriptor, SurfaceAttributes,
    FULL_SCREEN_TRIANGLE,
};

/// Barycentric tolerance so pixels exactly on a triangle edge are kept.
const EDGE_EPSILON: f64 = 1e-9;

/// An offscreen drawing target of a fixed initial size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareSurface {
    pub width: u32,
    pub height: u32,
}

/// Failures to inject, for exercising the error paths of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Fail `connect` at this stage.
    pub fail_stage: Option<ContextStage>,
    /// Fail this many upcoming presents.
    pub fail_presents: u32,
    /// Fail this many upcoming texture writes.
    pub fail_uploads: u32,
    /// Fail pipeline creation.
    pub fail_pipeline: bool,
}

/// Resource lifecycle events, recorded in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    TextureCreated(u32),
    TextureDestroyed(u32),
    PipelineCreated(u32),
    PipelineDestroyed(u32),
    ContextReleased,
    SurfaceReleased,
    DisplayReleased,
}

/// Shared record of [`BackendEvent`]s. Clones see the same log, which stays
/// readable after the backend itself is dropped.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<BackendEvent>>>);

impl EventLog {
    fn push(&self, event: BackendEvent) {
        self.0.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<BackendEvent> {
        self.0.lock().clone()
    }
}

#[derive(Debug)]
pub struct SoftwareTexture {
    id: u32,
    width: u32,
    height: u32,
}

impl SoftwareTexture {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug)]
pub struct SoftwarePipeline {
    id: u32,
    filter: FilterMode,
}

#[derive(Debug)]
pub struct SoftwareFrame {
    viewport: EyeRect,
}

struct TextureData {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

#[derive(Default)]
pub struct SoftwareBackend {
    connected: bool,
    back: Option<RgbaImage>,
    presented: Option<RgbaImage>,
    textures: HashMap<u32, TextureData>,
    live_pipelines: usize,
    next_id: u32,
    faults: FaultPlan,
    events: EventLog,
    presents: u64,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// Adjust the injected failures.
    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        &mut self.faults
    }

    /// The last successfully presented frame.
    pub fn presented(&self) -> Option<&RgbaImage> {
        self.presented.as_ref()
    }

    /// Number of successful presents.
    pub fn present_count(&self) -> u64 {
        self.presents
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.live_pipelines
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.events.snapshot()
    }

    /// A handle on the event log that outlives this backend.
    pub fn event_log(&self) -> EventLog {
        self.events.clone()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_stage(&self, stage: ContextStage) -> StereoResult<()> {
        if self.faults.fail_stage == Some(stage) {
            return Err(StereoError::context(stage, "injected failure"));
        }
        Ok(())
    }
}

impl GraphicsBackend for SoftwareBackend {
    type Target = SoftwareSurface;
    type Texture = SoftwareTexture;
    type Pipeline = SoftwarePipeline;
    type Frame = SoftwareFrame;

    fn connect(&mut self, target: SoftwareSurface, attributes: &SurfaceAttributes) -> StereoResult<()> {
        if self.connected {
            return Err(StereoError::IllegalState("software backend already connected".into()));
        }
        self.check_stage(ContextStage::Display)?;
        self.check_stage(ContextStage::ChooseConfig)?;
        if !matches!(attributes.msaa_samples, 1 | 4) || !matches!(attributes.depth_bits, 0 | 16 | 24) {
            return Err(StereoError::context(
                ContextStage::ChooseConfig,
                format!(
                    "no configuration with {} samples and {} depth bits",
                    attributes.msaa_samples, attributes.depth_bits
                ),
            ));
        }
        self.check_stage(ContextStage::CreateSurface)?;
        if target.width == 0 || target.height == 0 {
            return Err(StereoError::context(
                ContextStage::CreateSurface,
                format!("surface size {}x{} is empty", target.width, target.height),
            ));
        }
        self.check_stage(ContextStage::CreateContext)?;
        self.check_stage(ContextStage::MakeCurrent)?;
        self.check_stage(ContextStage::SwapInterval)?;

        self.back = Some(RgbaImage::new(target.width, target.height));
        self.connected = true;
        tracing::debug!(
            width = target.width,
            height = target.height,
            "software surface connected"
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn surface_size(&self) -> Option<(u32, u32)> {
        self.back.as_ref().map(|back| back.dimensions())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> StereoResult<()> {
        if !self.connected {
            return Err(StereoError::IllegalState("resize without a surface".into()));
        }
        self.back = Some(RgbaImage::new(width, height));
        Ok(())
    }

    fn create_texture(&mut self, width: u32, height: u32) -> StereoResult<SoftwareTexture> {
        if !self.connected {
            return Err(StereoError::IllegalState("create_texture without a context".into()));
        }
        let id = self.next_id();
        self.textures.insert(
            id,
            TextureData {
                width,
                height,
                rgb: vec![0; vrlink_core::rgb_len(width, height)],
            },
        );
        self.events.push(BackendEvent::TextureCreated(id));
        Ok(SoftwareTexture { id, width, height })
    }

    fn write_texture(&mut self, texture: &SoftwareTexture, image: &RawImage) -> StereoResult<()> {
        if self.faults.fail_uploads > 0 {
            self.faults.fail_uploads -= 1;
            return Err(StereoError::Upload("injected texture write failure".into()));
        }
        let data = self
            .textures
            .get_mut(&texture.id)
            .ok_or_else(|| StereoError::Upload(format!("texture {} was released", texture.id)))?;
        if image.dimensions() != (data.width, data.height) {
            return Err(StereoError::Upload(format!(
                "image {}x{} does not match texture {}x{}",
                image.width(),
                image.height(),
                data.width,
                data.height
            )));
        }
        data.rgb.copy_from_slice(image.as_bytes());
        Ok(())
    }

    fn destroy_texture(&mut self, texture: SoftwareTexture) {
        if self.textures.remove(&texture.id).is_some() {
            self.events.push(BackendEvent::TextureDestroyed(texture.id));
        }
    }

    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> StereoResult<SoftwarePipeline> {
        if !self.connected {
            return Err(StereoError::IllegalState("create_pipeline without a context".into()));
        }
        if self.faults.fail_pipeline {
            return Err(StereoError::Configuration("injected shader link failure".into()));
        }
        let id = self.next_id();
        self.live_pipelines += 1;
        self.events.push(BackendEvent::PipelineCreated(id));
        Ok(SoftwarePipeline {
            id,
            filter: descriptor.filter,
        })
    }

    fn destroy_pipeline(&mut self, pipeline: SoftwarePipeline) {
        self.live_pipelines = self.live_pipelines.saturating_sub(1);
        self.events.push(BackendEvent::PipelineDestroyed(pipeline.id));
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> StereoResult<SoftwareFrame> {
        if !self.connected {
            return Err(StereoError::IllegalState("begin_frame without a context".into()));
        }
        let back = self
            .back
            .as_mut()
            .ok_or_else(|| StereoError::Present("surface not configured".into()))?;
        let clear = clear_color.map(unorm_to_u8);
        for pixel in back.pixels_mut() {
            pixel.0 = clear;
        }
        let (width, height) = back.dimensions();
        Ok(SoftwareFrame {
            viewport: EyeRect::new(0, 0, width, height),
        })
    }

    fn set_viewport(&mut self, frame: &mut SoftwareFrame, rect: EyeRect) {
        frame.viewport = rect;
    }

    fn draw_fullscreen(
        &mut self,
        frame: &mut SoftwareFrame,
        pipeline: &SoftwarePipeline,
        texture: &SoftwareTexture,
        uniforms: &EyeUniforms,
    ) -> StereoResult<()> {
        let data = self
            .textures
            .get(&texture.id)
            .ok_or_else(|| StereoError::IllegalState(format!("texture {} was released", texture.id)))?;
        let back = self
            .back
            .as_mut()
            .ok_or_else(|| StereoError::IllegalState("draw without a surface".into()))?;

        let viewport = frame.viewport;
        if viewport.is_empty() {
            return Ok(());
        }

        let mut ndc = [[0.0f64; 2]; 3];
        for (out, vertex) in ndc.iter_mut().zip(FULL_SCREEN_TRIANGLE.iter()) {
            let clip = transform(&uniforms.projection, vertex.position);
            if clip[3] <= f32::EPSILON {
                return Err(StereoError::Configuration(
                    "projection puts the eye triangle behind the viewer".into(),
                ));
            }
            *out = [
                (clip[0] / clip[3]) as f64,
                (clip[1] / clip[3]) as f64,
            ];
        }
        let area = edge(ndc[0], ndc[1], ndc[2]);
        if area.abs() < EDGE_EPSILON {
            return Ok(());
        }

        let (surface_w, surface_h) = back.dimensions();
        let x_end = viewport.right().min(surface_w);
        let y_end = viewport.bottom().min(surface_h);
        let uv = FULL_SCREEN_TRIANGLE.map(|v| [v.uv[0] as f64, v.uv[1] as f64]);

        for py in viewport.y..y_end {
            let ny = 1.0 - ((py - viewport.y) as f64 + 0.5) / viewport.height as f64 * 2.0;
            for px in viewport.x..x_end {
                let nx = ((px - viewport.x) as f64 + 0.5) / viewport.width as f64 * 2.0 - 1.0;
                let p = [nx, ny];
                let w0 = edge(ndc[1], ndc[2], p) / area;
                let w1 = edge(ndc[2], ndc[0], p) / area;
                let w2 = 1.0 - w0 - w1;
                if w0 < -EDGE_EPSILON || w1 < -EDGE_EPSILON || w2 < -EDGE_EPSILON {
                    continue;
                }
                let u = w0 * uv[0][0] + w1 * uv[1][0] + w2 * uv[2][0];
                let v = w0 * uv[0][1] + w1 * uv[1][1] + w2 * uv[2][1];

                let mut rgb = match pipeline.filter {
                    FilterMode::Nearest => sample_nearest(data, u, v),
                    FilterMode::Linear => sample_linear(data, u, v),
                };
                if uniforms.vignette > 0.0 {
                    let shade = vignette_shade(u, v, uniforms.vignette as f64);
                    for channel in rgb.iter_mut() {
                        *channel *= shade;
                    }
                }
                back.put_pixel(
                    px,
                    py,
                    image::Rgba([
                        channel_to_u8(rgb[0]),
                        channel_to_u8(rgb[1]),
                        channel_to_u8(rgb[2]),
                        255,
                    ]),
                );
            }
        }
        Ok(())
    }

    fn present(&mut self, _frame: SoftwareFrame) -> StereoResult<()> {
        if self.faults.fail_presents > 0 {
            self.faults.fail_presents -= 1;
            return Err(StereoError::Present("injected swap failure".into()));
        }
        let back = self
            .back
            .as_ref()
            .ok_or_else(|| StereoError::Present("surface not configured".into()))?;
        self.presented = Some(back.clone());
        self.presents += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.events.push(BackendEvent::ContextReleased);
        self.back = None;
        self.events.push(BackendEvent::SurfaceReleased);
        self.events.push(BackendEvent::DisplayReleased);
    }
}

fn transform(m: &Mat4, position: [f32; 2]) -> [f32; 4] {
    let [x, y] = position;
    let mut out = [0.0f32; 4];
    for (row, value) in out.iter_mut().enumerate() {
        *value = m[0][row] * x + m[1][row] * y + m[3][row];
    }
    out
}

fn edge(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

fn texel(data: &TextureData, x: i64, y: i64) -> [f64; 3] {
    let x = x.clamp(0, data.width as i64 - 1) as usize;
    let y = y.clamp(0, data.height as i64 - 1) as usize;
    let offset = (y * data.width as usize + x) * 3;
    [
        data.rgb[offset] as f64,
        data.rgb[offset + 1] as f64,
        data.rgb[offset + 2] as f64,
    ]
}

fn sample_nearest(data: &TextureData, u: f64, v: f64) -> [f64; 3] {
    let x = (u * data.width as f64).floor() as i64;
    let y = (v * data.height as f64).floor() as i64;
    texel(data, x, y)
}

fn sample_linear(data: &TextureData, u: f64, v: f64) -> [f64; 3] {
    let fx = u * data.width as f64 - 0.5;
    let fy = v * data.height as f64 - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let c00 = texel(data, x0, y0);
    let c10 = texel(data, x0 + 1, y0);
    let c01 = texel(data, x0, y0 + 1);
    let c11 = texel(data, x0 + 1, y0 + 1);

    let mut out = [0.0; 3];
    for i in 0..3 {
        let top = c00[i] * (1.0 - tx) + c10[i] * tx;
        let bottom = c01[i] * (1.0 - tx) + c11[i] * tx;
        out[i] = top * (1.0 - ty) + bottom * ty;
    }
    out
}

/// `1 - smoothstep(0.4, 0.9, |uv - 0.5|) * strength`, matching the fragment shader.
fn vignette_shade(u: f64, v: f64, strength: f64) -> f64 {
    let dist = ((u - 0.5).powi(2) + (v - 0.5).powi(2)).sqrt();
    let t = ((dist - 0.4) / (0.9 - 0.4)).clamp(0.0, 1.0);
    let smooth = t * t * (3.0 - 2.0 * t);
    1.0 - smooth * strength
}

fn channel_to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn unorm_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
