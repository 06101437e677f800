use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use wgpu::util::DeviceExt;
use wgpu::{
    Adapter, Device, Extent3d, Instance, Queue, Surface, SurfaceConfiguration, Texture,
    TextureDescriptor, TextureFormat, TextureUsages, TextureView,
};

use vrlink_core::config::FilterMode;
use vrlink_core::{ContextStage, EyeRect, RawImage, StereoError, StereoResult};

use super::{
    EyeUniforms, GraphicsBackend, PipelineDescriptor, SurfaceAttributes, Vertex,
    FULL_SCREEN_TRIANGLE,
};

const EYE_TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

#[derive(Hash, Eq, PartialEq, Clone)]
struct TextureDescKey {
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TextureUsages,
}

/// Free list of released eye textures, keyed by their descriptor.
pub struct TexturePool {
    free_textures: Mutex<HashMap<TextureDescKey, Vec<Texture>>>,
}

impl TexturePool {
    pub fn new() -> Self {
        Self {
            free_textures: Mutex::new(HashMap::new()),
        }
    }

    pub fn acquire(
        &self,
        device: &Device,
        label: Option<&str>,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsages,
    ) -> Texture {
        let key = TextureDescKey {
            width,
            height,
            format,
            usage,
        };
        if let Some(texture) = self.free_textures.lock().get_mut(&key).and_then(Vec::pop) {
            return texture;
        }

        device.create_texture(&TextureDescriptor {
            label,
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }

    pub fn release(&self, texture: Texture) {
        let key = TextureDescKey {
            width: texture.width(),
            height: texture.height(),
            format: texture.format(),
            usage: texture.usage(),
        };
        self.free_textures.lock().entry(key).or_default().push(texture);
    }

    /// Destroy every pooled texture.
    pub fn clear(&self) {
        for (_, textures) in self.free_textures.lock().drain() {
            for texture in textures {
                texture.destroy();
            }
        }
    }
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new()
    }
}

/// A native window plus its size at the time it was handed over.
#[derive(Clone)]
pub struct WgpuTarget {
    pub window: Arc<dyn wgpu::WindowHandle + 'static>,
    pub width: u32,
    pub height: u32,
}

pub struct WgpuTexture {
    texture: Texture,
    view: TextureView,
}

pub struct WgpuPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
}

pub struct WgpuFrame {
    surface_texture: wgpu::SurfaceTexture,
    view: TextureView,
    encoder: wgpu::CommandEncoder,
    viewport: EyeRect,
}

/// Matches the `EyeUniforms` block in `shader.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct UniformBlock {
    projection: [[f32; 4]; 4],
    vignette: f32,
    _pad: [f32; 3],
}

/// Everything that only exists while a surface is attached.
struct GpuContext {
    instance: Instance,
    surface: Surface<'static>,
    #[allow(dead_code)]
    adapter: Adapter,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,
    sample_count: u32,
    depth_format: Option<TextureFormat>,
    depth_view: Option<TextureView>,
    msaa_view: Option<TextureView>,
    texture_pool: TexturePool,
}

impl GpuContext {
    /// (Re)create the depth and multisample attachments at the surface size.
    fn rebuild_attachments(&mut self) {
        let size = Extent3d {
            width: self.config.width,
            height: self.config.height,
            depth_or_array_layers: 1,
        };
        self.depth_view = self.depth_format.map(|format| {
            self.device
                .create_texture(&TextureDescriptor {
                    label: Some("vrlink_depth"),
                    size,
                    mip_level_count: 1,
                    sample_count: self.sample_count,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });
        self.msaa_view = (self.sample_count > 1).then(|| {
            self.device
                .create_texture(&TextureDescriptor {
                    label: Some("vrlink_msaa_color"),
                    size,
                    mip_level_count: 1,
                    sample_count: self.sample_count,
                    dimension: wgpu::TextureDimension::D2,
                    format: self.config.format,
                    usage: TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });
    }

    fn configure_surface(&mut self) -> StereoResult<()> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.surface.configure(&self.device, &self.config);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(StereoError::context(ContextStage::MakeCurrent, err.to_string()));
        }
        self.rebuild_attachments();
        Ok(())
    }

    fn color_attachment<'a>(
        &'a self,
        surface_view: &'a TextureView,
        load: wgpu::LoadOp<wgpu::Color>,
    ) -> wgpu::RenderPassColorAttachment<'a> {
        let ops = wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        };
        match &self.msaa_view {
            Some(msaa) => wgpu::RenderPassColorAttachment {
                view: msaa,
                resolve_target: Some(surface_view),
                ops,
            },
            None => wgpu::RenderPassColorAttachment {
                view: surface_view,
                resolve_target: None,
                ops,
            },
        }
    }

    fn depth_attachment(&self, load: wgpu::LoadOp<f32>) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
        self.depth_view
            .as_ref()
            .map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            })
    }
}

/// wgpu-backed implementation of [`GraphicsBackend`] drawing into a native window.
#[derive(Default)]
pub struct WgpuBackend {
    context: Option<GpuContext>,
    scratch: Vec<u8>,
}

impl WgpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn context(&self) -> StereoResult<&GpuContext> {
        self.context
            .as_ref()
            .ok_or_else(|| StereoError::IllegalState("no render context".into()))
    }
}

fn pick_surface_format(formats: &[TextureFormat]) -> Option<TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|f| matches!(f, TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm))
        .or_else(|| formats.iter().copied().find(|f| !f.is_srgb()))
        .or_else(|| formats.first().copied())
}

fn depth_format(bits: u8) -> Option<TextureFormat> {
    match bits {
        16 => Some(TextureFormat::Depth16Unorm),
        24 => Some(TextureFormat::Depth24Plus),
        _ => None,
    }
}

impl GraphicsBackend for WgpuBackend {
    type Target = WgpuTarget;
    type Texture = WgpuTexture;
    type Pipeline = WgpuPipeline;
    type Frame = WgpuFrame;

    fn connect(&mut self, target: WgpuTarget, attributes: &SurfaceAttributes) -> StereoResult<()> {
        if self.context.is_some() {
            return Err(StereoError::IllegalState("wgpu backend already connected".into()));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN | wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(target.window.clone())
            .map_err(|e| StereoError::context(ContextStage::CreateSurface, e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| StereoError::context(ContextStage::Display, "no adapter can present to this window"))?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = pick_surface_format(&capabilities.formats).ok_or_else(|| {
            StereoError::context(ContextStage::ChooseConfig, "surface reports no formats")
        })?;
        if format.is_srgb() {
            tracing::warn!(?format, "only sRGB surface formats available, colors will be re-encoded");
        }
        let sample_count = attributes.msaa_samples.max(1);
        if sample_count > 1
            && !adapter
                .get_texture_format_features(format)
                .flags
                .sample_count_supported(sample_count)
        {
            return Err(StereoError::context(
                ContextStage::ChooseConfig,
                format!("{sample_count}x multisampling unsupported for {format:?}"),
            ));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("vrlink_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
            },
            None,
        ))
        .map_err(|e| StereoError::context(ContextStage::CreateContext, e.to_string()))?;
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            tracing::error!(error = %err, "uncaptured wgpu error");
        }));

        let present_mode = if attributes.vsync {
            wgpu::PresentMode::Fifo
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        if attributes.vsync && !capabilities.present_modes.contains(&wgpu::PresentMode::Fifo) {
            return Err(StereoError::context(
                ContextStage::SwapInterval,
                "surface cannot pace presentation to the display",
            ));
        }

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: target.width.max(1),
            height: target.height.max(1),
            present_mode,
            desired_maximum_frame_latency: 2,
            alpha_mode: capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };

        let mut context = GpuContext {
            instance,
            surface,
            adapter,
            device,
            queue,
            config,
            sample_count,
            depth_format: depth_format(attributes.depth_bits),
            depth_view: None,
            msaa_view: None,
            texture_pool: TexturePool::new(),
        };
        context.configure_surface()?;

        tracing::info!(
            width = context.config.width,
            height = context.config.height,
            ?format,
            samples = sample_count,
            depth_bits = attributes.depth_bits,
            "wgpu surface connected"
        );
        self.context = Some(context);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    fn surface_size(&self) -> Option<(u32, u32)> {
        self.context
            .as_ref()
            .map(|ctx| (ctx.config.width, ctx.config.height))
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> StereoResult<()> {
        let ctx = self
            .context
            .as_mut()
            .ok_or_else(|| StereoError::IllegalState("resize without a surface".into()))?;
        ctx.config.width = width.max(1);
        ctx.config.height = height.max(1);
        ctx.configure_surface()
    }

    fn create_texture(&mut self, width: u32, height: u32) -> StereoResult<WgpuTexture> {
        let ctx = self.context()?;
        let max = ctx.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(StereoError::Configuration(format!(
                "texture {width}x{height} exceeds device limit {max}"
            )));
        }
        let texture = ctx.texture_pool.acquire(
            &ctx.device,
            Some("vrlink_eye"),
            width,
            height,
            EYE_TEXTURE_FORMAT,
            TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTexture { texture, view })
    }

    fn write_texture(&mut self, texture: &WgpuTexture, image: &RawImage) -> StereoResult<()> {
        let ctx = self
            .context
            .as_ref()
            .ok_or_else(|| StereoError::IllegalState("no render context".into()))?;
        let (width, height) = (texture.texture.width(), texture.texture.height());
        if image.dimensions() != (width, height) {
            return Err(StereoError::Upload(format!(
                "image {}x{} does not match texture {width}x{height}",
                image.width(),
                image.height()
            )));
        }

        self.scratch.clear();
        self.scratch.reserve(width as usize * height as usize * 4);
        for rgb in image.as_bytes().chunks_exact(3) {
            self.scratch.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }

        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.scratch,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        match pollster::block_on(ctx.device.pop_error_scope()) {
            Some(err) => Err(StereoError::Upload(err.to_string())),
            None => Ok(()),
        }
    }

    fn destroy_texture(&mut self, texture: WgpuTexture) {
        match &self.context {
            Some(ctx) => ctx.texture_pool.release(texture.texture),
            None => texture.texture.destroy(),
        }
    }

    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> StereoResult<WgpuPipeline> {
        let ctx = self.context()?;
        let device = &ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::include_wgsl!("../shader.wgsl"));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vrlink_eye_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("vrlink_eye_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("vrlink_eye_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.config.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: ctx.depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: ctx.sample_count,
                ..Default::default()
            },
            multiview: None,
        });

        let filter = match descriptor.filter {
            FilterMode::Linear => wgpu::FilterMode::Linear,
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("vrlink_eye_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            ..Default::default()
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vrlink_full_screen_triangle"),
            contents: bytemuck::cast_slice(&FULL_SCREEN_TRIANGLE),
            usage: wgpu::BufferUsages::VERTEX,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(StereoError::Configuration(format!("eye pipeline failed to build: {err}")));
        }

        Ok(WgpuPipeline {
            pipeline,
            bind_group_layout,
            sampler,
            vertex_buffer,
        })
    }

    fn destroy_pipeline(&mut self, pipeline: WgpuPipeline) {
        pipeline.vertex_buffer.destroy();
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> StereoResult<WgpuFrame> {
        let ctx = self
            .context
            .as_mut()
            .ok_or_else(|| StereoError::IllegalState("begin_frame without a context".into()))?;

        let surface_texture = match ctx.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err @ (wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                tracing::warn!(error = %err, "surface out of date, reconfiguring");
                ctx.configure_surface()?;
                return Err(StereoError::Present(err.to_string()));
            }
            Err(err) => return Err(StereoError::Present(err.to_string())),
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vrlink_frame"),
            });
        let [r, g, b, a] = clear_color.map(f64::from);
        {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("vrlink_clear"),
                color_attachments: &[Some(
                    ctx.color_attachment(&view, wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })),
                )],
                depth_stencil_attachment: ctx.depth_attachment(wgpu::LoadOp::Clear(1.0)),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        Ok(WgpuFrame {
            surface_texture,
            view,
            encoder,
            viewport: EyeRect::new(0, 0, ctx.config.width, ctx.config.height),
        })
    }

    fn set_viewport(&mut self, frame: &mut WgpuFrame, rect: EyeRect) {
        frame.viewport = rect;
    }

    fn draw_fullscreen(
        &mut self,
        frame: &mut WgpuFrame,
        pipeline: &WgpuPipeline,
        texture: &WgpuTexture,
        uniforms: &EyeUniforms,
    ) -> StereoResult<()> {
        let ctx = self.context()?;
        let (surface_w, surface_h) = (ctx.config.width, ctx.config.height);
        let rect = frame.viewport;
        let x_end = rect.right().min(surface_w);
        let y_end = rect.bottom().min(surface_h);
        if rect.is_empty() || rect.x >= x_end || rect.y >= y_end {
            return Ok(());
        }

        let block = UniformBlock {
            projection: uniforms.projection,
            vignette: uniforms.vignette,
            _pad: [0.0; 3],
        };
        let uniform_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vrlink_eye_uniforms"),
            contents: bytemuck::cast_slice(&[block]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vrlink_eye_bind_group"),
            layout: &pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&pipeline.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("vrlink_eye"),
            color_attachments: &[Some(ctx.color_attachment(&frame.view, wgpu::LoadOp::Load))],
            depth_stencil_attachment: ctx.depth_attachment(wgpu::LoadOp::Load),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(
            rect.x as f32,
            rect.y as f32,
            rect.width as f32,
            rect.height as f32,
            0.0,
            1.0,
        );
        pass.set_scissor_rect(rect.x, rect.y, x_end - rect.x, y_end - rect.y);
        pass.set_pipeline(&pipeline.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, pipeline.vertex_buffer.slice(..));
        pass.draw(0..FULL_SCREEN_TRIANGLE.len() as u32, 0..1);
        Ok(())
    }

    fn present(&mut self, frame: WgpuFrame) -> StereoResult<()> {
        let ctx = self.context()?;
        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        ctx.queue.submit(Some(frame.encoder.finish()));
        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(StereoError::Present(err.to_string()));
        }
        frame.surface_texture.present();
        Ok(())
    }

    fn disconnect(&mut self) {
        let Some(ctx) = self.context.take() else {
            return;
        };
        let GpuContext {
            instance,
            surface,
            adapter,
            device,
            queue,
            depth_view,
            msaa_view,
            texture_pool,
            ..
        } = ctx;

        texture_pool.clear();
        drop(depth_view);
        drop(msaa_view);
        drop(queue);
        device.destroy();
        drop(device);
        tracing::debug!("render context released");
        drop(surface);
        tracing::debug!("surface released");
        drop(adapter);
        drop(instance);
        tracing::debug!("display connection released");
        self.scratch = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_linear_rgba_formats() {
        let formats = [
            TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm,
            TextureFormat::Rgba16Float,
        ];
        assert_eq!(pick_surface_format(&formats), Some(TextureFormat::Bgra8Unorm));
        assert_eq!(
            pick_surface_format(&[TextureFormat::Bgra8UnormSrgb, TextureFormat::Rgb10a2Unorm]),
            Some(TextureFormat::Rgb10a2Unorm)
        );
        assert_eq!(pick_surface_format(&[]), None);
    }

    #[test]
    fn test_depth_bits_to_format() {
        assert_eq!(depth_format(0), None);
        assert_eq!(depth_format(16), Some(TextureFormat::Depth16Unorm));
        assert_eq!(depth_format(24), Some(TextureFormat::Depth24Plus));
    }

    #[test]
    fn test_uniform_block_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<UniformBlock>(), 80);
    }

    #[test]
    fn test_disconnect_without_context_is_noop() {
        let mut backend = WgpuBackend::new();
        backend.disconnect();
        assert!(!backend.is_connected());
        assert_eq!(backend.surface_size(), None);
    }
}
