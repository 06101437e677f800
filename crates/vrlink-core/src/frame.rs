use crate::error::{StereoError, StereoResult};

/// Bytes per pixel of a packed RGB8 sample.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// One of the two logical eye slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Both eyes in draw order.
    pub const ALL: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Stable slot index (left = 0, right = 1).
    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    /// Map a host-side eye code (0 = left, 1 = right).
    pub fn from_code(code: i32) -> StereoResult<Self> {
        match code {
            0 => Ok(Eye::Left),
            1 => Ok(Eye::Right),
            other => Err(StereoError::Configuration(format!(
                "unknown eye code {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Eye {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eye::Left => f.write_str("left"),
            Eye::Right => f.write_str("right"),
        }
    }
}

/// Byte length of a packed RGB8 buffer of the given dimensions.
pub fn rgb_len(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize) * RGB_BYTES_PER_PIXEL
}

/// A decoded frame: `width × height` packed RGB8 samples, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RawImage {
    /// Wrap an existing buffer. The buffer length must be exactly `width × height × 3`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> StereoResult<Self> {
        if width == 0 || height == 0 {
            return Err(StereoError::Configuration(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = rgb_len(width, height);
        if data.len() != expected {
            return Err(StereoError::Configuration(format!(
                "RGB buffer for {width}x{height} must be {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create an image filled with one RGB color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixel_count = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixel_count * RGB_BYTES_PER_PIXEL);
        for _ in 0..pixel_count {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw packed RGB bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Total byte size of the pixel data.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// Give the backing buffer back (e.g. to a [`crate::pool::BufferPool`]).
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Get the RGB value at a pixel coordinate. Returns None if out of bounds.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + (x as usize)) * RGB_BYTES_PER_PIXEL;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }

    /// Set the RGB value at a pixel coordinate. No-op if out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = ((y as usize) * (self.width as usize) + (x as usize)) * RGB_BYTES_PER_PIXEL;
        self.data[offset..offset + RGB_BYTES_PER_PIXEL].copy_from_slice(&rgb);
    }
}

/// One delivered compressed still image, exactly as the host handed it over.
#[derive(Debug, Clone)]
pub struct CompressedFrame {
    bytes: Vec<u8>,
}

impl CompressedFrame {
    /// Copy the first `declared_len` bytes of `payload`.
    ///
    /// The host passes the length alongside the buffer; a declared length of
    /// zero or one larger than the buffer is a malformed delivery.
    pub fn new(payload: &[u8], declared_len: usize) -> StereoResult<Self> {
        if declared_len == 0 {
            return Err(StereoError::Decode("empty frame payload".into()));
        }
        if declared_len > payload.len() {
            return Err(StereoError::Decode(format!(
                "declared length {declared_len} exceeds delivered {} bytes",
                payload.len()
            )));
        }
        Ok(Self {
            bytes: payload[..declared_len].to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_image_from_raw_checks_length() {
        assert!(RawImage::from_raw(4, 2, vec![0; 24]).is_ok());
        assert!(RawImage::from_raw(4, 2, vec![0; 23]).is_err());
        assert!(RawImage::from_raw(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_raw_image_solid() {
        let img = RawImage::solid(3, 2, [255, 0, 0]);
        assert_eq!(img.byte_size(), 3 * 2 * 3);
        assert_eq!(img.get_pixel(0, 0), Some([255, 0, 0]));
        assert_eq!(img.get_pixel(2, 1), Some([255, 0, 0]));
        assert_eq!(img.get_pixel(3, 0), None);
    }

    #[test]
    fn test_raw_image_get_set_pixel() {
        let mut img = RawImage::solid(10, 10, [0, 0, 0]);
        img.set_pixel(5, 5, [128, 64, 32]);
        assert_eq!(img.get_pixel(5, 5), Some([128, 64, 32]));
        img.set_pixel(10, 10, [1, 1, 1]);
    }

    #[test]
    fn test_compressed_frame_declared_length() {
        let payload = [1u8, 2, 3, 4, 5];
        let frame = CompressedFrame::new(&payload, 3).unwrap();
        assert_eq!(frame.as_bytes(), &[1, 2, 3]);
        assert!(CompressedFrame::new(&payload, 0).is_err());
        assert!(CompressedFrame::new(&payload, 6).is_err());
    }

    #[test]
    fn test_eye_codes() {
        assert_eq!(Eye::from_code(0).unwrap(), Eye::Left);
        assert_eq!(Eye::from_code(1).unwrap(), Eye::Right);
        assert!(Eye::from_code(2).is_err());
        assert_eq!(Eye::Right.index(), 1);
    }
}
