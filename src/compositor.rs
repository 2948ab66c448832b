//! Flattening of a [`LayerStack`] into a single RGBA image.
//!
//! Every visible layer is rendered into its own transparent, canvas-sized
//! buffer (base content first, then its strokes in creation order) and the
//! buffer is blended onto the accumulated result with the layer's opacity and
//! blend mode.  Eraser strokes therefore only ever remove pixels of the layer
//! that owns them.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{BlendMode, Layer, LayerContent, LayerStack, Stroke, StrokeMode, blend_pixel};
use crate::ops::shapes::{rasterize_shape, sdf_line_segment, smoothstep};

/// Composite all visible layers bottom-to-top over `background`.
pub fn render(stack: &LayerStack, background: Rgba<u8>) -> RgbaImage {
    let (w, h) = (stack.width(), stack.height());
    let mut result = RgbaImage::from_pixel(w, h, background);
    for layer in stack.layers_bottom_to_top() {
        if !layer.visible {
            continue;
        }
        let buf = render_layer(layer, w, h);
        composite_onto(&mut result, &buf, layer.blend_mode, layer.opacity);
    }
    result
}

/// One layer on its own, ignoring visibility, opacity and blend mode.
pub fn render_layer(layer: &Layer, width: u32, height: u32) -> RgbaImage {
    let mut buf = render_content(&layer.content, width, height);
    draw_strokes(&mut buf, &layer.strokes);
    buf
}

/// The layer's base content (image pixels or rasterized shape) without strokes.
pub fn render_content(content: &LayerContent, width: u32, height: u32) -> RgbaImage {
    let mut buf = RgbaImage::new(width, height);
    match content {
        LayerContent::Raster => {}
        LayerContent::Image { pixels, origin } => {
            blit(&mut buf, pixels, origin.x.round() as i32, origin.y.round() as i32);
        }
        LayerContent::Shape(shape) => {
            let (shape_buf, x0, y0) = rasterize_shape(shape, width, height);
            blit(&mut buf, &shape_buf, x0, y0);
        }
    }
    buf
}

/// Copy `src` into the transparent `dst` with its top-left corner at (x, y),
/// clipping to `dst`.  Clip bounds are computed in i64 so far-off origins
/// near the i32 limits clip away instead of wrapping.
fn blit(dst: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    let (x, y) = (i64::from(x), i64::from(y));
    let (dw, dh) = (i64::from(dst.width()), i64::from(dst.height()));
    let (sw, sh) = (i64::from(src.width()), i64::from(src.height()));

    let x0 = x.max(0);
    let x1 = (x + sw).min(dw);
    let y0 = y.max(0);
    let y1 = (y + sh).min(dh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let row_bytes = dw as usize * 4;
    let src_row_bytes = sw as usize * 4;
    let src_raw: &[u8] = src.as_raw();
    let span = (x1 - x0) as usize * 4;

    dst.par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(row, row_buf)| {
            let sy = (row as i64 - y) as usize;
            let sx = (x0 - x) as usize;
            let src_start = sy * src_row_bytes + sx * 4;
            let dst_start = x0 as usize * 4;
            row_buf[dst_start..dst_start + span]
                .copy_from_slice(&src_raw[src_start..src_start + span]);
        });
}

/// Blend `src` onto `dst` (same dimensions) pixel by pixel.
pub fn composite_onto(dst: &mut RgbaImage, src: &RgbaImage, mode: BlendMode, opacity: f32) {
    if dst.dimensions() != src.dimensions() || opacity <= 0.0 {
        return;
    }
    let opacity = opacity.min(1.0);
    dst.par_chunks_mut(4)
        .zip(src.par_chunks(4))
        .for_each(|(d, s)| {
            if s[3] == 0 {
                return;
            }
            let out = blend_pixel(
                Rgba([d[0], d[1], d[2], d[3]]),
                Rgba([s[0], s[1], s[2], s[3]]),
                mode,
                opacity,
            );
            d.copy_from_slice(&out.0);
        });
}

pub fn draw_strokes(buf: &mut RgbaImage, strokes: &[Stroke]) {
    for stroke in strokes {
        draw_stroke(buf, stroke);
    }
}

/// Rasterize one stroke as a round-capped polyline.
///
/// Coverage at a pixel is the anti-aliased distance to the nearest segment,
/// so overlapping segments of the same stroke never stack opacity.
pub fn draw_stroke(buf: &mut RgbaImage, stroke: &Stroke) {
    let Some(bounds) = stroke.bounds() else {
        return;
    };
    let (w, h) = (buf.width() as i32, buf.height() as i32);
    let x0 = (bounds.min.x.floor() as i32).max(0);
    let y0 = (bounds.min.y.floor() as i32).max(0);
    let x1 = (bounds.max.x.ceil() as i32).min(w);
    let y1 = (bounds.max.y.ceil() as i32).min(h);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let radius = (stroke.width * 0.5).max(0.5);
    let opacity = stroke.opacity.clamp(0.0, 1.0);
    let row_bytes = w as usize * 4;
    let points = &stroke.points;

    buf.par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(row, row_buf)| {
            let py = row as f32 + 0.5;
            for col in x0..x1 {
                let px = col as f32 + 0.5;
                let d = stroke_distance(points, px, py);
                let cov = smoothstep(0.5, -0.5, d - radius);
                if cov <= 0.001 {
                    continue;
                }
                let idx = col as usize * 4;
                let px_ref = &mut row_buf[idx..idx + 4];
                match stroke.mode {
                    StrokeMode::Paint => {
                        let out = blend_pixel(
                            Rgba([px_ref[0], px_ref[1], px_ref[2], px_ref[3]]),
                            stroke.color,
                            BlendMode::Normal,
                            opacity * cov,
                        );
                        px_ref.copy_from_slice(&out.0);
                    }
                    StrokeMode::Erase => {
                        let a = px_ref[3] as f32 * (1.0 - cov * opacity);
                        px_ref[3] = a.round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        });
}

fn stroke_distance(points: &[egui::Pos2], px: f32, py: f32) -> f32 {
    match points {
        [] => f32::MAX,
        [p] => ((px - p.x).powi(2) + (py - p.y).powi(2)).sqrt(),
        _ => points
            .windows(2)
            .map(|s| sdf_line_segment(px, py, s[0].x, s[0].y, s[1].x, s[1].y))
            .fold(f32::MAX, f32::min),
    }
}
