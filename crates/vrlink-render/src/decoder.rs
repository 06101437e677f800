//! Compressed frame decoding.
//! Turns one delivered JPEG (or PNG) into a packed RGB8 [`RawImage`] at the
//! configured texture size.

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegDecoder;
use image::codecs::png::PngDecoder;
use image::imageops::FilterType;
use image::{ColorType, ImageDecoder, ImageFormat, RgbImage};

use vrlink_core::config::DecoderConfig;
use vrlink_core::frame::RGB_BYTES_PER_PIXEL;
use vrlink_core::{rgb_len, BufferPool, RawImage, StereoError, StereoResult, ViewerConfig};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Pixel layout of the codec output held in the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceLayout {
    Gray,
    Rgb,
}

#[derive(Debug, Clone, Copy)]
struct SourceInfo {
    width: u32,
    height: u32,
    layout: SourceLayout,
}

/// Stateful decoder: target size, limits, and reusable codec and rescale buffers.
pub struct FrameDecoder {
    width: u32,
    height: u32,
    scale_mismatched: bool,
    max_dimension: u32,
    placeholder_gray: u8,
    scratch: Vec<u8>,
    /// Packed RGB copy of a mismatched source, fed to the resampler.
    staging: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl FrameDecoder {
    pub fn new(
        config: &DecoderConfig,
        width: u32,
        height: u32,
        pool: Arc<BufferPool>,
    ) -> StereoResult<Self> {
        let mut decoder = Self {
            width: 0,
            height: 0,
            scale_mismatched: config.scale_mismatched,
            max_dimension: config.max_dimension,
            placeholder_gray: config.placeholder_gray,
            scratch: Vec::new(),
            staging: Vec::new(),
            pool,
        };
        decoder.configure(width, height)?;
        Ok(decoder)
    }

    /// Decoder targeting the configured per-eye texture size.
    pub fn from_config(config: &ViewerConfig, pool: Arc<BufferPool>) -> StereoResult<Self> {
        Self::new(
            &config.decoder,
            config.textures.width,
            config.textures.height,
            pool,
        )
    }

    pub fn target_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Change the per-eye output size.
    pub fn configure(&mut self, width: u32, height: u32) -> StereoResult<()> {
        if width == 0 || height == 0 {
            return Err(StereoError::Configuration(format!(
                "decode target must be positive, got {width}x{height}"
            )));
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(StereoError::Configuration(format!(
                "decode target {width}x{height} exceeds max_dimension {}",
                self.max_dimension
            )));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Decode one per-eye image to the target size.
    pub fn decode(&mut self, bytes: &[u8]) -> StereoResult<RawImage> {
        self.decode_to(bytes, self.width, self.height)
    }

    /// Decode one image carrying both eyes side by side and split it.
    ///
    /// The source is brought to `(2 × width, height)` first, so a 2048×1024
    /// frame maps onto two 1024×1024 eyes without scaling.
    pub fn decode_side_by_side(&mut self, bytes: &[u8]) -> StereoResult<(RawImage, RawImage)> {
        let (eye_w, eye_h) = (self.width, self.height);
        let full_w = eye_w.checked_mul(2).ok_or_else(|| {
            StereoError::Configuration(format!("side-by-side width 2x{eye_w} overflows"))
        })?;
        let full = self.decode_to(bytes, full_w, eye_h)?;

        let eye_row = eye_w as usize * RGB_BYTES_PER_PIXEL;
        let mut left = self.pool.take(rgb_len(eye_w, eye_h));
        let mut right = self.pool.take(rgb_len(eye_w, eye_h));
        for (y, row) in full.as_bytes().chunks_exact(eye_row * 2).enumerate() {
            let dst = y * eye_row..(y + 1) * eye_row;
            left[dst.clone()].copy_from_slice(&row[..eye_row]);
            right[dst].copy_from_slice(&row[eye_row..]);
        }
        self.pool.give(full.into_raw());

        Ok((
            RawImage::from_raw(eye_w, eye_h, left)?,
            RawImage::from_raw(eye_w, eye_h, right)?,
        ))
    }

    /// Read the image dimensions from the header without decoding pixels.
    pub fn probe_dimensions(bytes: &[u8]) -> StereoResult<(u32, u32)> {
        let dims = match sniff_format(bytes)? {
            ImageFormat::Jpeg => JpegDecoder::new(Cursor::new(bytes))
                .map(|d| d.dimensions())
                .map_err(decode_error)?,
            _ => PngDecoder::new(Cursor::new(bytes))
                .map(|d| d.dimensions())
                .map_err(decode_error)?,
        };
        Ok(dims)
    }

    /// Neutral grey frame at the target size, shown until a real frame arrives.
    pub fn placeholder(&self) -> RawImage {
        let mut buf = self.pool.take(rgb_len(self.width, self.height));
        buf.fill(self.placeholder_gray);
        match RawImage::from_raw(self.width, self.height, buf) {
            Ok(image) => image,
            Err(_) => RawImage::solid(self.width, self.height, [self.placeholder_gray; 3]),
        }
    }

    fn decode_to(&mut self, bytes: &[u8], target_w: u32, target_h: u32) -> StereoResult<RawImage> {
        let source = match sniff_format(bytes)? {
            ImageFormat::Jpeg => {
                let decoder = JpegDecoder::new(Cursor::new(bytes)).map_err(decode_error)?;
                read_into(decoder, &mut self.scratch, self.max_dimension)?
            }
            _ => {
                let decoder = PngDecoder::new(Cursor::new(bytes)).map_err(decode_error)?;
                read_into(decoder, &mut self.scratch, self.max_dimension)?
            }
        };

        if (source.width, source.height) == (target_w, target_h) {
            let mut out = self.pool.take(rgb_len(target_w, target_h));
            write_rgb(&self.scratch, source.layout, &mut out);
            return RawImage::from_raw(target_w, target_h, out);
        }

        if !self.scale_mismatched {
            return Err(StereoError::Decode(format!(
                "frame is {}x{}, expected {target_w}x{target_h}",
                source.width, source.height
            )));
        }

        tracing::trace!(
            from_w = source.width,
            from_h = source.height,
            to_w = target_w,
            to_h = target_h,
            "rescaling frame"
        );
        let mut staging = std::mem::take(&mut self.staging);
        staging.resize(rgb_len(source.width, source.height), 0);
        write_rgb(&self.scratch, source.layout, &mut staging);
        let src = RgbImage::from_raw(source.width, source.height, staging)
            .ok_or_else(|| StereoError::Decode("codec output shorter than its dimensions".into()))?;
        let scaled = image::imageops::resize(&src, target_w, target_h, FilterType::Triangle);
        self.staging = src.into_raw();

        // The resampler's output becomes the frame buffer and joins the pool
        // once the render thread recycles it.
        let out = scaled.into_raw();
        RawImage::from_raw(target_w, target_h, out)
    }
}

/// Identify the codec and check JPEG framing.
fn sniff_format(bytes: &[u8]) -> StereoResult<ImageFormat> {
    if bytes.is_empty() {
        return Err(StereoError::Decode("empty frame payload".into()));
    }
    if bytes.starts_with(&JPEG_SOI) {
        let end = bytes
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        if end < 4 || bytes[end - 2..end] != JPEG_EOI {
            return Err(StereoError::Decode(
                "truncated JPEG: missing end-of-image marker".into(),
            ));
        }
        return Ok(ImageFormat::Jpeg);
    }
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok(ImageFormat::Png),
        Ok(other) => Err(StereoError::Decode(format!(
            "unsupported image format {other:?}"
        ))),
        Err(_) => Err(StereoError::Decode("unrecognized image format".into())),
    }
}

/// Run a codec into `scratch`, enforcing dimension and color-type limits.
fn read_into<D: ImageDecoder>(
    decoder: D,
    scratch: &mut Vec<u8>,
    max_dimension: u32,
) -> StereoResult<SourceInfo> {
    let (width, height) = decoder.dimensions();
    if width == 0 || height == 0 {
        return Err(StereoError::Decode(format!(
            "image has empty dimensions {width}x{height}"
        )));
    }
    if width > max_dimension || height > max_dimension {
        return Err(StereoError::Decode(format!(
            "image {width}x{height} exceeds max_dimension {max_dimension}"
        )));
    }
    let layout = match decoder.color_type() {
        ColorType::L8 => SourceLayout::Gray,
        ColorType::Rgb8 => SourceLayout::Rgb,
        other => {
            return Err(StereoError::Decode(format!(
                "unsupported color type {other:?}"
            )))
        }
    };

    let total = usize::try_from(decoder.total_bytes())
        .map_err(|_| StereoError::Decode("image too large for this platform".into()))?;
    scratch.resize(total, 0);
    decoder.read_image(&mut scratch[..]).map_err(decode_error)?;

    Ok(SourceInfo {
        width,
        height,
        layout,
    })
}

/// Copy codec output into a packed RGB buffer, expanding grey to RGB.
fn write_rgb(scratch: &[u8], layout: SourceLayout, out: &mut [u8]) {
    match layout {
        SourceLayout::Rgb => out.copy_from_slice(&scratch[..out.len()]),
        SourceLayout::Gray => {
            for (dst, &luma) in out.chunks_exact_mut(RGB_BYTES_PER_PIXEL).zip(scratch) {
                dst.fill(luma);
            }
        }
    }
}

fn decode_error(err: image::ImageError) -> StereoError {
    StereoError::Decode(err.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Rgb};

    pub(crate) fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    pub(crate) fn solid_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb))),
            ImageFormat::Jpeg,
        )
    }

    fn decoder(width: u32, height: u32) -> FrameDecoder {
        FrameDecoder::new(
            &DecoderConfig::default(),
            width,
            height,
            Arc::new(BufferPool::new()),
        )
        .unwrap()
    }

    fn close(a: [u8; 3], b: [u8; 3]) -> bool {
        a.iter().zip(b).all(|(&x, y)| x.abs_diff(y) <= 6)
    }

    #[test]
    fn test_decode_jpeg_matches_target() {
        let mut dec = decoder(16, 8);
        let img = dec.decode(&solid_jpeg(16, 8, [200, 40, 40])).unwrap();
        assert_eq!(img.dimensions(), (16, 8));
        assert_eq!(img.byte_size(), 16 * 8 * 3);
        assert!(close(img.get_pixel(5, 5).unwrap(), [200, 40, 40]));
    }

    #[test]
    fn test_decode_png_is_exact() {
        let mut src = RgbImage::new(4, 4);
        for (x, y, px) in src.enumerate_pixels_mut() {
            *px = Rgb([x as u8 * 60, y as u8 * 60, 9]);
        }
        let bytes = encode(DynamicImage::ImageRgb8(src.clone()), ImageFormat::Png);
        let img = decoder(4, 4).decode(&bytes).unwrap();
        assert_eq!(img.as_bytes(), src.as_raw().as_slice());
    }

    #[test]
    fn test_decode_grayscale_expands_to_rgb() {
        let bytes = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, image::Luma([77]))),
            ImageFormat::Png,
        );
        let img = decoder(4, 4).decode(&bytes).unwrap();
        assert_eq!(img.get_pixel(3, 3), Some([77, 77, 77]));
    }

    #[test]
    fn test_decode_rescales_mismatched_source() {
        let mut dec = decoder(8, 8);
        let img = dec.decode(&solid_jpeg(32, 16, [10, 200, 10])).unwrap();
        assert_eq!(img.dimensions(), (8, 8));
        assert!(close(img.get_pixel(4, 4).unwrap(), [10, 200, 10]));
    }

    #[test]
    fn test_rescale_reuses_staging_buffer() {
        let mut dec = decoder(8, 8);
        let bytes = solid_jpeg(32, 16, [10, 200, 10]);
        dec.decode(&bytes).unwrap();
        let staging = dec.staging.as_ptr();
        let capacity = dec.staging.capacity();
        assert!(capacity >= 32 * 16 * 3);

        dec.decode(&bytes).unwrap();
        dec.decode(&solid_jpeg(16, 16, [1, 2, 3])).unwrap();
        assert_eq!(dec.staging.as_ptr(), staging);
        assert_eq!(dec.staging.capacity(), capacity);
    }

    #[test]
    fn test_decode_rejects_mismatch_without_scaling() {
        let config = DecoderConfig {
            scale_mismatched: false,
            ..DecoderConfig::default()
        };
        let mut dec = FrameDecoder::new(&config, 8, 8, Arc::new(BufferPool::new())).unwrap();
        let err = dec.decode(&solid_jpeg(16, 16, [1, 2, 3])).unwrap_err();
        assert!(matches!(err, StereoError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_empty_and_garbage() {
        let mut dec = decoder(8, 8);
        assert!(matches!(dec.decode(&[]), Err(StereoError::Decode(_))));
        assert!(matches!(
            dec.decode(b"definitely not an image"),
            Err(StereoError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_jpeg() {
        let bytes = solid_jpeg(16, 16, [9, 9, 9]);
        let mut dec = decoder(16, 16);
        let err = dec.decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_decode_accepts_zero_padding_after_eoi() {
        let mut bytes = solid_jpeg(8, 8, [50, 50, 50]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(decoder(8, 8).decode(&bytes).is_ok());
    }

    #[test]
    fn test_decode_rejects_oversized_source() {
        let config = DecoderConfig {
            max_dimension: 8,
            ..DecoderConfig::default()
        };
        let mut dec = FrameDecoder::new(&config, 8, 8, Arc::new(BufferPool::new())).unwrap();
        assert!(dec.decode(&solid_jpeg(16, 8, [0, 0, 0])).is_err());
    }

    #[test]
    fn test_decode_rejects_rgba() {
        let bytes = encode(
            DynamicImage::ImageRgba8(image::RgbaImage::new(4, 4)),
            ImageFormat::Png,
        );
        assert!(decoder(4, 4).decode(&bytes).is_err());
    }

    #[test]
    fn test_side_by_side_split() {
        let mut src = RgbImage::new(8, 4);
        for (x, _, px) in src.enumerate_pixels_mut() {
            *px = if x < 4 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) };
        }
        let bytes = encode(DynamicImage::ImageRgb8(src), ImageFormat::Png);
        let (left, right) = decoder(4, 4).decode_side_by_side(&bytes).unwrap();
        assert_eq!(left.dimensions(), (4, 4));
        assert_eq!(left.get_pixel(3, 3), Some([255, 0, 0]));
        assert_eq!(right.get_pixel(0, 0), Some([0, 0, 255]));
    }

    #[test]
    fn test_probe_dimensions() {
        let bytes = solid_jpeg(24, 12, [0, 0, 0]);
        assert_eq!(FrameDecoder::probe_dimensions(&bytes).unwrap(), (24, 12));
        assert!(FrameDecoder::probe_dimensions(&[]).is_err());
    }

    #[test]
    fn test_placeholder_is_grey_at_target() {
        let dec = decoder(6, 3);
        let img = dec.placeholder();
        assert_eq!(img.dimensions(), (6, 3));
        assert_eq!(img.get_pixel(5, 2), Some([128, 128, 128]));
    }

    #[test]
    fn test_configure_rejects_zero() {
        let mut dec = decoder(4, 4);
        assert!(dec.configure(0, 4).is_err());
        assert_eq!(dec.target_dimensions(), (4, 4));
        dec.configure(8, 2).unwrap();
        assert_eq!(dec.target_dimensions(), (8, 2));
    }
}
