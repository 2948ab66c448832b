// ============================================================================
// PIXEL FILTERS: grayscale, sepia, invert (destructive, image layers only)
// ============================================================================

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::{LayerContent, LayerId, LayerStack};
use crate::error::{EditError, EditResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Grayscale,
    Sepia,
    Invert,
}

impl FilterKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "grayscale" | "greyscale" | "desaturate" => Some(FilterKind::Grayscale),
            "sepia" => Some(FilterKind::Sepia),
            "invert" => Some(FilterKind::Invert),
            _ => None,
        }
    }

    /// Per-pixel colour transform on 0..255 channel values.  Alpha passes through.
    fn transform(self, r: f32, g: f32, b: f32, a: f32) -> (f32, f32, f32, f32) {
        match self {
            FilterKind::Grayscale => {
                let v = 0.2126 * r + 0.7152 * g + 0.0722 * b;
                (v, v, v, a)
            }
            FilterKind::Sepia => {
                let nr = 0.393 * r + 0.769 * g + 0.189 * b;
                let ng = 0.349 * r + 0.686 * g + 0.168 * b;
                let nb = 0.272 * r + 0.534 * g + 0.131 * b;
                (nr, ng, nb, a)
            }
            FilterKind::Invert => (255.0 - r, 255.0 - g, 255.0 - b, a),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterKind::Grayscale => "Grayscale",
            FilterKind::Sepia => "Sepia",
            FilterKind::Invert => "Invert",
        })
    }
}

/// Run `kind` over every pixel of `src`, returning a new buffer.
/// Row-parallel; results are rounded and clamped to u8.
pub fn apply_to_image(src: &RgbaImage, kind: FilterKind) -> RgbaImage {
    let (w, h) = src.dimensions();
    let stride = w as usize * 4;
    let mut out = RgbaImage::new(w, h);
    if stride == 0 {
        return out;
    }
    let src_raw = src.as_raw();

    out.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for (px_in, px_out) in row_in.chunks_exact(4).zip(row_out.chunks_exact_mut(4)) {
            let (nr, ng, nb, na) = kind.transform(
                px_in[0] as f32,
                px_in[1] as f32,
                px_in[2] as f32,
                px_in[3] as f32,
            );
            px_out[0] = nr.round().clamp(0.0, 255.0) as u8;
            px_out[1] = ng.round().clamp(0.0, 255.0) as u8;
            px_out[2] = nb.round().clamp(0.0, 255.0) as u8;
            px_out[3] = na.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

/// The pixel buffer a filter would read, or why the layer can't be filtered.
pub fn filter_source(stack: &LayerStack, id: LayerId) -> EditResult<Arc<RgbaImage>> {
    let layer = stack.layer(id).ok_or(EditError::UnknownLayer(id))?;
    match &layer.content {
        LayerContent::Image { pixels, .. } => Ok(Arc::clone(pixels)),
        _ => Err(EditError::Unsupported {
            op: "filter",
            kind: layer.kind(),
        }),
    }
}

/// Swap in a filtered buffer.  Fails if the layer is gone or is no longer an
/// image layer (e.g. merged away while a background filter was running).
pub fn replace_pixels(
    stack: &mut LayerStack,
    id: LayerId,
    filtered: Arc<RgbaImage>,
) -> EditResult<()> {
    let layer = stack.layer_mut(id).ok_or(EditError::UnknownLayer(id))?;
    let kind = layer.kind();
    match &mut layer.content {
        LayerContent::Image { pixels, .. } => {
            *pixels = filtered;
            Ok(())
        }
        _ => Err(EditError::Unsupported { op: "filter", kind }),
    }
}

/// Destructively filter an image layer's pixel buffer in place.
pub fn apply_filter(stack: &mut LayerStack, id: LayerId, kind: FilterKind) -> EditResult<()> {
    let src = filter_source(stack, id)?;
    let filtered = apply_to_image(&src, kind);
    replace_pixels(stack, id, Arc::new(filtered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::LayerKind;
    use crate::components::layers;
    use egui::pos2;
    use image::Rgba;

    fn image_stack(pixel: Rgba<u8>) -> (LayerStack, LayerId) {
        let mut stack = LayerStack::new(8, 8);
        let img = RgbaImage::from_pixel(3, 2, pixel);
        let id = layers::add_image_layer(&mut stack, Arc::new(img), pos2(0.0, 0.0), "photo");
        (stack, id)
    }

    fn first_pixel(stack: &LayerStack, id: LayerId) -> Rgba<u8> {
        match &stack.layer(id).expect("layer").content {
            LayerContent::Image { pixels, .. } => *pixels.get_pixel(0, 0),
            _ => panic!("not an image layer"),
        }
    }

    #[test]
    fn grayscale_uses_luma_weights() {
        // 0.2126 * 100 + 0.7152 * 150 + 0.0722 * 200 = 142.98
        let (mut stack, id) = image_stack(Rgba([100, 150, 200, 77]));
        apply_filter(&mut stack, id, FilterKind::Grayscale).expect("filter");
        assert_eq!(first_pixel(&stack, id), Rgba([143, 143, 143, 77]));
    }

    #[test]
    fn sepia_clamps_bright_pixels() {
        let (mut stack, id) = image_stack(Rgba([255, 255, 255, 255]));
        apply_filter(&mut stack, id, FilterKind::Sepia).expect("filter");
        assert_eq!(first_pixel(&stack, id), Rgba([255, 255, 239, 255]));
    }

    #[test]
    fn invert_twice_is_identity() {
        let mut img = RgbaImage::new(4, 3);
        for (i, p) in img.pixels_mut().enumerate() {
            *p = Rgba([i as u8 * 20, 255 - i as u8 * 7, 3, 200]);
        }
        let mut stack = LayerStack::new(8, 8);
        let original = Arc::new(img.clone());
        let id = layers::add_image_layer(&mut stack, original, pos2(0.0, 0.0), "photo");
        apply_filter(&mut stack, id, FilterKind::Invert).expect("once");
        apply_filter(&mut stack, id, FilterKind::Invert).expect("twice");
        let LayerContent::Image { pixels, .. } = &stack.layer(id).expect("layer").content else {
            panic!("not an image layer");
        };
        assert_eq!(**pixels, img);
    }

    #[test]
    fn non_image_layers_are_unsupported() {
        let mut stack = LayerStack::new(8, 8);
        let base = stack.active_id();
        assert_eq!(
            apply_filter(&mut stack, base, FilterKind::Invert),
            Err(EditError::Unsupported {
                op: "filter",
                kind: LayerKind::Raster
            })
        );
    }

    #[test]
    fn filter_does_not_touch_snapshotted_buffer() {
        let (mut stack, id) = image_stack(Rgba([10, 20, 30, 255]));
        let before = filter_source(&stack, id).expect("source");
        apply_filter(&mut stack, id, FilterKind::Invert).expect("filter");
        assert_eq!(*before.get_pixel(0, 0), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn names_parse() {
        assert_eq!(FilterKind::from_name("Sepia"), Some(FilterKind::Sepia));
        assert_eq!(FilterKind::from_name("blur"), None);
    }
}
