use image::{Rgba, RgbaImage};

/// A single decoded frame, always RGBA.
///
/// Sources decode to opaque alpha; effects and opacity carve the alpha
/// channel down from there. Keeping one pixel format end to end means the
/// compositor never branches on channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    image: RgbaImage,
}

impl Frame {
    /// Create a frame from an existing RGBA buffer.
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Create an opaque black frame of the given size.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])),
        }
    }

    /// Create a fully transparent frame of the given size.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])),
        }
    }

    /// Build a frame from packed RGB24 bytes (the rawvideo decode format),
    /// synthesizing opaque alpha.
    ///
    /// Returns `None` if the buffer length does not match `width * height * 3`.
    pub fn from_rgb24(data: &[u8], width: u32, height: u32) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }

        let mut image = RgbaImage::new(width, height);
        for (src, dst) in data.chunks_exact(3).zip(image.pixels_mut()) {
            *dst = Rgba([src[0], src[1], src[2], 255]);
        }
        Some(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Pack the frame into RGB24 bytes for the rawvideo encode pipe,
    /// dropping the alpha channel.
    pub fn to_rgb24(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.image.len() / 4 * 3);
        for pixel in self.image.pixels() {
            out.extend_from_slice(&pixel.0[..3]);
        }
        out
    }
}
