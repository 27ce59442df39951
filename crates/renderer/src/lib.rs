//! Renderer crate for picsumwall.
//!
//! The compositor owns the real GPU; this crate only needs a narrow slice of
//! it. The flow for one tile is:
//!
//! ```text
//!   encoded bytes ──▶ decode() ──▶ DecodedImage ──▶ Gpu::upload ──▶ Texture
//!                                                                   │
//!   TextureSlots { previous, current, pending } ◀────────────────────┘
//!          │
//!          └─▶ render_tile(damage) ──▶ Gpu::scissor + Gpu::draw_texture
//! ```
//!
//! `gpu::SoftwareGpu` implements the [`Gpu`] trait on a CPU framebuffer so the
//! headless daemon and the tests can composite without a compositor.

mod compose;
mod decode;
mod gpu;
mod slots;
mod types;

pub use compose::render_tile;
pub use decode::{decode, DecodeError, DecodedImage};
pub use gpu::{Crossfade, Gpu, GpuError, SoftwareGpu, SoftwareTexture};
pub use slots::TextureSlots;
pub use types::{CrossfadeCurve, Rect, Size, TextureTransform};
