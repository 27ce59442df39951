//! The slice of the compositor's GL context the wallpaper needs.
//!
//! - `Gpu` is the seam: upload a decoded image, scissor, draw a texture
//!   with an alpha factor and sampling transform.
//! - `timeline` tracks the per-output crossfade as a progress scalar shaped
//!   by a user-selectable easing curve.
//! - `software` implements `Gpu` on a CPU framebuffer.

mod software;
mod timeline;

pub use software::{SoftwareGpu, SoftwareTexture};
pub use timeline::Crossfade;

use crate::decode::DecodedImage;
use crate::types::{Rect, TextureTransform};

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("cannot upload a {width}x{height} image")]
    InvalidImage { width: u32, height: u32 },
    #[error("texture upload failed: {0}")]
    Upload(String),
}

pub trait Gpu {
    type Texture;

    fn upload(&mut self, image: &DecodedImage) -> Result<Self::Texture, GpuError>;

    /// Restricts subsequent draws to `rect` (framebuffer-relative).
    fn scissor(&mut self, rect: Rect);

    /// Stretches `texture` over `geometry`, blending with `alpha`.
    fn draw_texture(
        &mut self,
        texture: &Self::Texture,
        geometry: Rect,
        alpha: f32,
        transform: TextureTransform,
    );
}
