use image::{GenericImageView, ImageReader};
use std::io::Cursor;

use crate::types::Size;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("image buffer is empty")]
    Empty,
    #[error("unrecognised image format: {0}")]
    Format(std::io::Error),
    #[error("malformed image stream: {0}")]
    Malformed(#[from] image::ImageError),
}

/// Uncompressed RGB8 pixels in top-down row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// RGB triple at `(x, y)`, `y` counted from the top.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = ((y * self.width + x) * 3) as usize;
        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ]
    }
}

/// Decodes a complete in-memory image. The server may not honour the exact
/// requested size, so whatever dimensions the stream carries are kept.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(DecodeError::Format)?;
    let image = reader.decode()?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    tracing::trace!(width, height, bytes = bytes.len(), "decoded image");
    Ok(DecodedImage {
        width,
        height,
        pixels: rgb.into_raw(),
    })
}
