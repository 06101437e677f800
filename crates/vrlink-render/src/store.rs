use vrlink_core::{rgb_len, Eye, RawImage, StereoError, StereoResult};

use crate::backend::GraphicsBackend;

/// The LEFT/RIGHT texture pair the presenter samples from.
///
/// Texture dimensions are fixed at creation; an upload of any other size is
/// rejected before the backend is touched, so the previous contents stay.
pub struct TextureStore<B: GraphicsBackend> {
    textures: [Option<B::Texture>; 2],
    width: u32,
    height: u32,
}

impl<B: GraphicsBackend> TextureStore<B> {
    /// Allocate both eye textures and fill them with `placeholder`.
    pub fn create(
        backend: &mut B,
        width: u32,
        height: u32,
        placeholder: &RawImage,
    ) -> StereoResult<Self> {
        let mut store = Self {
            textures: [None, None],
            width,
            height,
        };
        store.allocate(backend, width, height)?;
        for eye in Eye::ALL {
            if let Err(err) = store.upload(backend, eye, placeholder) {
                store.release(backend);
                return Err(err);
            }
        }
        tracing::debug!(width, height, "eye textures created");
        Ok(store)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_allocated(&self) -> bool {
        self.textures.iter().all(Option::is_some)
    }

    pub fn texture(&self, eye: Eye) -> Option<&B::Texture> {
        self.textures[eye.index()].as_ref()
    }

    /// Replace one eye's contents.
    pub fn upload(&mut self, backend: &mut B, eye: Eye, image: &RawImage) -> StereoResult<()> {
        let texture = self.textures[eye.index()]
            .as_ref()
            .ok_or_else(|| StereoError::Upload(format!("{eye} texture is not allocated")))?;
        if image.dimensions() != (self.width, self.height)
            || image.byte_size() != rgb_len(self.width, self.height)
        {
            return Err(StereoError::Upload(format!(
                "{eye} image is {}x{} ({} bytes), texture is {}x{}",
                image.width(),
                image.height(),
                image.byte_size(),
                self.width,
                self.height
            )));
        }
        backend.write_texture(texture, image)
    }

    /// Reallocate both textures at a new size and fill them with `placeholder`,
    /// which must already have the new size.
    pub fn resize(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
        placeholder: &RawImage,
    ) -> StereoResult<()> {
        if width == 0 || height == 0 {
            return Err(StereoError::Configuration(format!(
                "texture size must be positive, got {width}x{height}"
            )));
        }
        if placeholder.dimensions() != (width, height) {
            return Err(StereoError::Configuration(format!(
                "placeholder is {}x{}, textures will be {width}x{height}",
                placeholder.width(),
                placeholder.height()
            )));
        }
        self.release(backend);
        self.allocate(backend, width, height)?;
        for eye in Eye::ALL {
            if let Err(err) = self.upload(backend, eye, placeholder) {
                self.release(backend);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Free both textures. Safe to call more than once.
    pub fn release(&mut self, backend: &mut B) {
        for slot in self.textures.iter_mut() {
            if let Some(texture) = slot.take() {
                backend.destroy_texture(texture);
            }
        }
    }

    fn allocate(&mut self, backend: &mut B, width: u32, height: u32) -> StereoResult<()> {
        self.width = width;
        self.height = height;
        for eye in Eye::ALL {
            match backend.create_texture(width, height) {
                Ok(texture) => self.textures[eye.index()] = Some(texture),
                Err(err) => {
                    self.release(backend);
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}
