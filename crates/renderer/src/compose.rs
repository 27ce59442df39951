use std::time::Instant;

use crate::gpu::{Crossfade, Gpu};
use crate::slots::TextureSlots;
use crate::types::{Rect, TextureTransform};

/// Composites one tile into every damaged region that overlaps it.
///
/// While the fade runs the previous texture is laid down opaque and the
/// current one is blended over it at the fade progress. Once the fade is
/// over only the current texture is drawn. Returns the number of regions
/// that were painted.
pub fn render_tile<G: Gpu>(
    gpu: &mut G,
    slots: &TextureSlots<G::Texture>,
    fade: &Crossfade,
    now: Instant,
    target: Rect,
    damage: &[Rect],
) -> usize {
    let fading = fade.running(now);
    let alpha = fade.progress(now);
    let mut painted = 0;

    for region in damage {
        let Some(clip) = region.intersect(&target) else {
            continue;
        };
        gpu.scissor(clip);
        if fading {
            if let Some(previous) = slots.previous() {
                gpu.draw_texture(previous, target, 1.0, TextureTransform::InvertY);
            }
        }
        if let Some(current) = slots.current() {
            gpu.draw_texture(current, target, alpha, TextureTransform::InvertY);
        }
        painted += 1;
    }

    if painted > 0 {
        tracing::trace!(?target, painted, alpha, fading, "rendered tile");
    }
    painted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodedImage;
    use crate::gpu::SoftwareGpu;
    use crate::types::{CrossfadeCurve, Size};
    use std::time::Duration;

    fn solid(rgb: [u8; 3]) -> DecodedImage {
        DecodedImage {
            width: 2,
            height: 2,
            pixels: rgb.repeat(4),
        }
    }

    fn slots_with(
        gpu: &mut SoftwareGpu,
        colors: &[[u8; 3]],
    ) -> TextureSlots<crate::SoftwareTexture> {
        let mut slots = TextureSlots::new();
        for color in colors {
            slots.set_pending(gpu.upload(&solid(*color)).unwrap());
            slots.promote();
        }
        slots
    }

    #[test]
    fn blends_previous_and_current_mid_fade() {
        let mut gpu = SoftwareGpu::new(Size::new(4, 4));
        let slots = slots_with(&mut gpu, &[[0, 0, 0], [200, 100, 0]]);
        let start = Instant::now();
        let mut fade = Crossfade::new(Duration::from_millis(100), CrossfadeCurve::Linear);
        fade.start(start);

        let target = Rect::new(0, 0, 4, 4);
        let painted = render_tile(
            &mut gpu,
            &slots,
            &fade,
            start + Duration::from_millis(50),
            target,
            &[target],
        );
        assert_eq!(painted, 1);
        assert_eq!(gpu.pixel(2, 2), [100, 50, 0, 255]);
    }

    #[test]
    fn draws_only_current_after_fade() {
        let mut gpu = SoftwareGpu::new(Size::new(4, 4));
        let slots = slots_with(&mut gpu, &[[10, 10, 10], [0, 250, 0]]);
        let start = Instant::now();
        let mut fade = Crossfade::new(Duration::from_millis(10), CrossfadeCurve::Smoothstep);
        fade.start(start);

        let target = Rect::new(0, 0, 4, 4);
        render_tile(&mut gpu, &slots, &fade, start + Duration::from_secs(1), target, &[target]);
        assert_eq!(gpu.pixel(0, 0), [0, 250, 0, 255]);
    }

    #[test]
    fn skips_damage_outside_tile() {
        let mut gpu = SoftwareGpu::new(Size::new(8, 4));
        let slots = slots_with(&mut gpu, &[[255, 255, 255]]);
        let mut fade = Crossfade::new(Duration::ZERO, CrossfadeCurve::Linear);
        let now = Instant::now();
        fade.start(now);

        let left = Rect::new(0, 0, 4, 4);
        let painted = render_tile(&mut gpu, &slots, &fade, now, left, &[Rect::new(4, 0, 4, 4)]);
        assert_eq!(painted, 0);
        assert_eq!(gpu.pixel(1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn damage_clips_the_draw() {
        let mut gpu = SoftwareGpu::new(Size::new(4, 4));
        let slots = slots_with(&mut gpu, &[[255, 255, 255]]);
        let mut fade = Crossfade::new(Duration::ZERO, CrossfadeCurve::Linear);
        let now = Instant::now();
        fade.start(now);

        render_tile(&mut gpu, &slots, &fade, now, Rect::new(0, 0, 4, 4), &[Rect::new(0, 0, 1, 1)]);
        assert_eq!(gpu.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(gpu.pixel(3, 3), [0, 0, 0, 255]);
    }

    #[test]
    fn nothing_visible_before_first_fade() {
        let mut gpu = SoftwareGpu::new(Size::new(2, 2));
        let slots = slots_with(&mut gpu, &[[255, 0, 0]]);
        let fade = Crossfade::new(Duration::from_secs(1), CrossfadeCurve::Linear);
        let target = Rect::new(0, 0, 2, 2);
        render_tile(&mut gpu, &slots, &fade, Instant::now(), target, &[target]);
        assert_eq!(gpu.pixel(0, 0), [0, 0, 0, 255]);
    }
}
