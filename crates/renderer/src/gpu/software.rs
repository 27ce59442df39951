use std::path::Path;

use image::{Rgb, RgbImage, Rgba, RgbaImage};

use super::{Gpu, GpuError};
use crate::decode::DecodedImage;
use crate::types::{Rect, Size, TextureTransform};

/// CPU copy of an uploaded wallpaper.
#[derive(Debug, Clone)]
pub struct SoftwareTexture {
    image: RgbImage,
}

impl SoftwareTexture {
    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

/// `Gpu` backed by an RGBA framebuffer in memory.
#[derive(Debug)]
pub struct SoftwareGpu {
    framebuffer: RgbaImage,
    scissor: Option<Rect>,
    uploads: usize,
}

impl SoftwareGpu {
    pub fn new(size: Size) -> Self {
        Self {
            framebuffer: RgbaImage::from_pixel(size.width, size.height, Rgba([0, 0, 0, 255])),
            scissor: None,
            uploads: 0,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.framebuffer.width(), self.framebuffer.height())
    }

    pub fn resize(&mut self, size: Size) {
        if size != self.size() {
            self.framebuffer = RgbaImage::from_pixel(size.width, size.height, Rgba([0, 0, 0, 255]));
        }
        self.scissor = None;
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        for pixel in self.framebuffer.pixels_mut() {
            *pixel = Rgba(color);
        }
    }

    pub fn reset_scissor(&mut self) {
        self.scissor = None;
    }

    pub fn framebuffer(&self) -> &RgbaImage {
        &self.framebuffer
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.framebuffer.get_pixel(x, y).0
    }

    /// Number of textures uploaded so far.
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn save_png(&self, path: &Path) -> Result<(), image::ImageError> {
        self.framebuffer.save_with_format(path, image::ImageFormat::Png)
    }
}

impl Gpu for SoftwareGpu {
    type Texture = SoftwareTexture;

    fn upload(&mut self, image: &DecodedImage) -> Result<SoftwareTexture, GpuError> {
        if image.width == 0 || image.height == 0 {
            return Err(GpuError::InvalidImage {
                width: image.width,
                height: image.height,
            });
        }
        let buffer = RgbImage::from_raw(image.width, image.height, image.pixels.clone()).ok_or(
            GpuError::Upload(format!(
                "pixel buffer of {} bytes does not match {}x{}",
                image.pixels.len(),
                image.width,
                image.height
            )),
        )?;
        self.uploads += 1;
        Ok(SoftwareTexture { image: buffer })
    }

    fn scissor(&mut self, rect: Rect) {
        self.scissor = Some(rect);
    }

    fn draw_texture(
        &mut self,
        texture: &SoftwareTexture,
        geometry: Rect,
        alpha: f32,
        transform: TextureTransform,
    ) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 || geometry.is_empty() {
            return;
        }
        let bounds = Rect::from_size(self.size());
        let Some(mut area) = geometry.intersect(&bounds) else {
            return;
        };
        if let Some(scissor) = self.scissor {
            match area.intersect(&scissor) {
                Some(clipped) => area = clipped,
                None => return,
            }
        }

        let tex_w = texture.image.width() as u64;
        let tex_h = texture.image.height() as u64;
        let geo_w = geometry.width as u64;
        let geo_h = geometry.height as u64;

        for py in area.y..area.y + area.height as i32 {
            let rel_y = (py - geometry.y) as u64;
            let down = (rel_y * tex_h / geo_h).min(tex_h - 1) as u32;
            let ty = match transform {
                TextureTransform::InvertY => down,
                TextureTransform::Identity => texture.image.height() - 1 - down,
            };
            for px in area.x..area.x + area.width as i32 {
                let rel_x = (px - geometry.x) as u64;
                let tx = (rel_x * tex_w / geo_w).min(tex_w - 1) as u32;
                let Rgb(src) = *texture.image.get_pixel(tx, ty);
                let dst = self.framebuffer.get_pixel_mut(px as u32, py as u32);
                for channel in 0..3 {
                    let blended =
                        src[channel] as f32 * alpha + dst.0[channel] as f32 * (1.0 - alpha);
                    dst.0[channel] = blended.round().clamp(0.0, 255.0) as u8;
                }
                dst.0[3] = 255;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_band_image(width: u32, height: u32) -> DecodedImage {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for _ in 0..width {
                if y < height / 2 {
                    pixels.extend_from_slice(&[255, 0, 0]);
                } else {
                    pixels.extend_from_slice(&[0, 0, 255]);
                }
            }
        }
        DecodedImage {
            width,
            height,
            pixels,
        }
    }

    #[test]
    fn invert_y_keeps_top_row_on_top() {
        let mut gpu = SoftwareGpu::new(Size::new(8, 8));
        let texture = gpu.upload(&two_band_image(4, 4)).unwrap();
        gpu.draw_texture(&texture, Rect::new(0, 0, 8, 8), 1.0, TextureTransform::InvertY);
        assert_eq!(gpu.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(gpu.pixel(7, 7), [0, 0, 255, 255]);
    }

    #[test]
    fn identity_follows_gl_row_order() {
        let mut gpu = SoftwareGpu::new(Size::new(4, 4));
        let texture = gpu.upload(&two_band_image(4, 4)).unwrap();
        gpu.draw_texture(&texture, Rect::new(0, 0, 4, 4), 1.0, TextureTransform::Identity);
        assert_eq!(gpu.pixel(0, 0), [0, 0, 255, 255]);
        assert_eq!(gpu.pixel(0, 3), [255, 0, 0, 255]);
    }

    #[test]
    fn blends_with_alpha() {
        let mut gpu = SoftwareGpu::new(Size::new(2, 2));
        gpu.clear([0, 0, 0, 255]);
        let white = DecodedImage {
            width: 1,
            height: 1,
            pixels: vec![200, 200, 200],
        };
        let texture = gpu.upload(&white).unwrap();
        gpu.draw_texture(&texture, Rect::new(0, 0, 2, 2), 0.5, TextureTransform::InvertY);
        assert_eq!(gpu.pixel(1, 1), [100, 100, 100, 255]);
    }

    #[test]
    fn scissor_limits_draw_area() {
        let mut gpu = SoftwareGpu::new(Size::new(4, 4));
        let texture = gpu.upload(&two_band_image(2, 2)).unwrap();
        gpu.scissor(Rect::new(0, 0, 2, 2));
        gpu.draw_texture(&texture, Rect::new(0, 0, 4, 4), 1.0, TextureTransform::InvertY);
        assert_eq!(gpu.pixel(1, 1), [255, 0, 0, 255]);
        assert_eq!(gpu.pixel(3, 3), [0, 0, 0, 255]);
        assert_eq!(gpu.uploads(), 1);
    }

    #[test]
    fn rejects_mismatched_pixel_buffer() {
        let mut gpu = SoftwareGpu::new(Size::new(2, 2));
        let broken = DecodedImage {
            width: 4,
            height: 4,
            pixels: vec![0; 3],
        };
        assert!(matches!(gpu.upload(&broken), Err(GpuError::Upload(_))));
    }

    #[test]
    fn saves_framebuffer_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let gpu = SoftwareGpu::new(Size::new(3, 2));
        gpu.save_png(&path).unwrap();
        let reloaded = image::open(&path).unwrap();
        assert_eq!(reloaded.width(), 3);
        assert_eq!(reloaded.height(), 2);
    }
}
