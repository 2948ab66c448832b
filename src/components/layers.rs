//! Layer panel operations on a [`LayerStack`].
//!
//! Every function validates first and mutates second: on `Err` the stack is
//! untouched.  Recording history is the caller's job (see `project.rs`).

use std::sync::Arc;

use egui::{Pos2, pos2};
use image::RgbaImage;

use crate::canvas::{BlendMode, Layer, LayerContent, LayerId, LayerStack};
use crate::compositor;
use crate::error::{EditError, EditResult};
use crate::ops::shapes::PlacedShape;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReorderDirection {
    /// Towards the top of the stack.
    Up,
    Down,
}

/// Append a layer on top of the stack and make it active.
pub fn add_layer(stack: &mut LayerStack, name: &str, content: LayerContent) -> LayerId {
    let id = stack.allocate_layer_id();
    let name = if name.trim().is_empty() {
        format!("Layer {}", id.0)
    } else {
        name.to_string()
    };
    stack.layers.insert(id, Arc::new(Layer::new(id, name, content)));
    stack.order.push(id);
    stack.active = id;
    id
}

/// Blank stroke-only layer.  An empty name gets "Layer N".
pub fn add_raster_layer(stack: &mut LayerStack, name: &str) -> LayerId {
    add_layer(stack, name, LayerContent::Raster)
}

pub fn add_image_layer(
    stack: &mut LayerStack,
    pixels: Arc<RgbaImage>,
    origin: Pos2,
    name: &str,
) -> LayerId {
    add_layer(stack, name, LayerContent::Image { pixels, origin })
}

pub fn add_shape_layer(stack: &mut LayerStack, shape: PlacedShape, name: &str) -> LayerId {
    add_layer(stack, name, LayerContent::Shape(shape))
}

fn require(stack: &LayerStack, id: LayerId) -> EditResult<&Layer> {
    stack.layer(id).ok_or(EditError::UnknownLayer(id))
}

pub fn delete_layer(stack: &mut LayerStack, id: LayerId) -> EditResult<()> {
    let layer = require(stack, id)?;
    if layer.is_base {
        return Err(EditError::Refused("the base layer cannot be deleted"));
    }
    if stack.len() <= 1 {
        return Err(EditError::Refused("cannot delete the last layer"));
    }

    stack.layers.remove(&id);
    stack.order.retain(|&l| l != id);
    if stack.active == id
        && let Some(top) = stack.top_id()
    {
        stack.active = top;
    }
    Ok(())
}

/// Move a layer one position.  Returns `Ok(false)` without touching the
/// stack when it is already at that end.
pub fn reorder(
    stack: &mut LayerStack,
    id: LayerId,
    direction: ReorderDirection,
) -> EditResult<bool> {
    let idx = stack.index_of(id).ok_or(EditError::UnknownLayer(id))?;
    let target = match direction {
        ReorderDirection::Up if idx + 1 < stack.order.len() => idx + 1,
        ReorderDirection::Down if idx > 0 => idx - 1,
        _ => return Ok(false),
    };
    stack.order.swap(idx, target);
    Ok(true)
}

/// Merge `id` into the layer directly above it.  Returns the surviving id
/// (always the lower layer's).
pub fn merge_up(stack: &mut LayerStack, id: LayerId) -> EditResult<LayerId> {
    let idx = stack.index_of(id).ok_or(EditError::UnknownLayer(id))?;
    if idx + 1 >= stack.order.len() {
        return Err(EditError::Refused("no layer above to merge with"));
    }
    merge_pair(stack, idx)
}

/// Merge the layer directly below `id` with it.
pub fn merge_down(stack: &mut LayerStack, id: LayerId) -> EditResult<LayerId> {
    let idx = stack.index_of(id).ok_or(EditError::UnknownLayer(id))?;
    if idx == 0 {
        return Err(EditError::Refused("no layer below to merge with"));
    }
    merge_pair(stack, idx - 1)
}

/// Combine `order[lower_idx]` with the layer above it.  The lower layer keeps
/// its id, name and display properties; the upper one is removed.
///
/// A hidden upper layer contributes nothing.  An upper layer drawn with
/// reduced opacity or a non-Normal blend mode is flattened into the result so
/// it still looks the same; otherwise strokes stay live where they can.
fn merge_pair(stack: &mut LayerStack, lower_idx: usize) -> EditResult<LayerId> {
    let lower_id = stack.order[lower_idx];
    let upper_id = stack.order[lower_idx + 1];
    let lower = require(stack, lower_id)?.clone();
    let upper = require(stack, upper_id)?.clone();
    let (w, h) = (stack.width(), stack.height());

    let mut merged = lower.clone();
    merged.is_base = lower.is_base || upper.is_base;

    let upper_plain = upper.opacity >= 1.0 && upper.blend_mode == BlendMode::Normal;
    if !upper.visible {
        // Nothing of the upper layer was on screen.
    } else if !upper_plain {
        let mut buf = compositor::render_layer(&lower, w, h);
        let upper_buf = compositor::render_layer(&upper, w, h);
        compositor::composite_onto(&mut buf, &upper_buf, upper.blend_mode, upper.opacity);
        merged.strokes.clear();
        merged.content = canvas_image(buf);
    } else if !lower.has_base_content() && !upper.has_base_content() {
        merged.strokes.extend(upper.strokes.iter().cloned());
    } else {
        let mut buf = compositor::render_content(&lower.content, w, h);
        if upper.has_base_content() {
            // Upper content sits above every lower stroke, so bake them first.
            compositor::draw_strokes(&mut buf, &lower.strokes);
            let upper_buf = compositor::render_content(&upper.content, w, h);
            compositor::composite_onto(&mut buf, &upper_buf, BlendMode::Normal, 1.0);
            merged.strokes = upper.strokes.clone();
        } else {
            merged.strokes.extend(upper.strokes.iter().cloned());
        }
        merged.content = canvas_image(buf);
    }

    stack.layers.insert(lower_id, Arc::new(merged));
    stack.layers.remove(&upper_id);
    stack.order.remove(lower_idx + 1);
    if stack.active == upper_id {
        stack.active = lower_id;
    }
    Ok(lower_id)
}

fn canvas_image(buf: RgbaImage) -> LayerContent {
    LayerContent::Image {
        pixels: Arc::new(buf),
        origin: pos2(0.0, 0.0),
    }
}

pub fn set_visibility(stack: &mut LayerStack, id: LayerId, visible: bool) -> EditResult<()> {
    let layer = stack.layer_mut(id).ok_or(EditError::UnknownLayer(id))?;
    layer.visible = visible;
    Ok(())
}

/// Flip visibility, returning the new state.
pub fn toggle_visibility(stack: &mut LayerStack, id: LayerId) -> EditResult<bool> {
    let visible = !require(stack, id)?.visible;
    set_visibility(stack, id, visible)?;
    Ok(visible)
}

/// Store `opacity` clamped into [0, 1]; returns the stored value.
pub fn set_opacity(stack: &mut LayerStack, id: LayerId, opacity: f32) -> EditResult<f32> {
    if opacity.is_nan() {
        return Err(EditError::OutOfRange(format!("opacity {opacity}")));
    }
    let layer = stack.layer_mut(id).ok_or(EditError::UnknownLayer(id))?;
    layer.opacity = opacity.clamp(0.0, 1.0);
    Ok(layer.opacity)
}

pub fn set_blend_mode(stack: &mut LayerStack, id: LayerId, mode: BlendMode) -> EditResult<()> {
    let layer = stack.layer_mut(id).ok_or(EditError::UnknownLayer(id))?;
    layer.blend_mode = mode;
    Ok(())
}

/// Like [`set_blend_mode`] but from a name; unknown names are ignored and
/// reported as `Ok(false)`.
pub fn set_blend_mode_named(stack: &mut LayerStack, id: LayerId, name: &str) -> EditResult<bool> {
    require(stack, id)?;
    match BlendMode::from_name(name) {
        Some(mode) => set_blend_mode(stack, id, mode).map(|_| true),
        None => Ok(false),
    }
}

pub fn set_active(stack: &mut LayerStack, id: LayerId) -> EditResult<()> {
    require(stack, id)?;
    stack.active = id;
    Ok(())
}

pub fn rename_layer(stack: &mut LayerStack, id: LayerId, name: &str) -> EditResult<()> {
    let layer = stack.layer_mut(id).ok_or(EditError::UnknownLayer(id))?;
    layer.name = name.to_string();
    Ok(())
}
