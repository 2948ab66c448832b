use egui::{Pos2, Vec2, pos2, vec2};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{LayerContent, LayerId, LayerStack};
use crate::components::layers;
use crate::error::{EditError, EditResult};

/// Smallest width/height/radius/extent a resize can produce.
pub const MIN_SHAPE_DIM: f32 = 5.0;

/// Available shape primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Rect,
    Ellipse,
    Line,
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Rect => "Rectangle",
            ShapeKind::Ellipse => "Ellipse",
            ShapeKind::Line => "Line",
        }
    }

    pub fn all() -> &'static [ShapeKind] {
        &[ShapeKind::Rect, ShapeKind::Ellipse, ShapeKind::Line]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "rect" | "rectangle" => Some(ShapeKind::Rect),
            "ellipse" | "circle" => Some(ShapeKind::Ellipse),
            "line" => Some(ShapeKind::Line),
            _ => None,
        }
    }
}

/// How a closed shape is painted.  Lines ignore this and are always stroked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ShapeFillMode {
    Outline,
    #[default]
    Filled,
    Both,
}

impl ShapeFillMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "outline" => Some(ShapeFillMode::Outline),
            "filled" | "fill" => Some(ShapeFillMode::Filled),
            "both" => Some(ShapeFillMode::Both),
            _ => None,
        }
    }
}

/// Kind-specific dimensions, relative to the shape origin.
///
/// Rects are anchored at their top-left corner, ellipses at their centre, and
/// line points are offsets from the origin (the first point sits at zero).
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeGeometry {
    Rect { width: f32, height: f32 },
    Ellipse { rx: f32, ry: f32 },
    Line { points: Vec<Vec2> },
}

impl ShapeGeometry {
    /// Default size for a freshly created shape.
    pub fn default_for(kind: ShapeKind) -> Self {
        match kind {
            ShapeKind::Rect => ShapeGeometry::Rect {
                width: 120.0,
                height: 80.0,
            },
            ShapeKind::Ellipse => ShapeGeometry::Ellipse { rx: 60.0, ry: 40.0 },
            ShapeKind::Line => ShapeGeometry::Line {
                points: vec![Vec2::ZERO, vec2(120.0, 0.0)],
            },
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeGeometry::Rect { .. } => ShapeKind::Rect,
            ShapeGeometry::Ellipse { .. } => ShapeKind::Ellipse,
            ShapeGeometry::Line { .. } => ShapeKind::Line,
        }
    }

    /// Width and height of the shape's bounding box.
    pub fn extent(&self) -> Vec2 {
        match self {
            ShapeGeometry::Rect { width, height } => vec2(*width, *height),
            ShapeGeometry::Ellipse { rx, ry } => vec2(rx * 2.0, ry * 2.0),
            ShapeGeometry::Line { points } => {
                let (min, max) = line_bounds(points);
                max - min
            }
        }
    }

    /// Scale every dimension, flooring at [`MIN_SHAPE_DIM`].  Zero-extent
    /// line axes (a horizontal line's height) stay zero.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        let floor = |dim: f32, s: f32| (dim * s.abs()).max(MIN_SHAPE_DIM);
        match self {
            ShapeGeometry::Rect { width, height } => ShapeGeometry::Rect {
                width: floor(*width, sx),
                height: floor(*height, sy),
            },
            ShapeGeometry::Ellipse { rx, ry } => ShapeGeometry::Ellipse {
                rx: floor(*rx, sx),
                ry: floor(*ry, sy),
            },
            ShapeGeometry::Line { points } => {
                let extent = self.extent();
                let factor = |ext: f32, s: f32| {
                    if ext > 0.0 { floor(ext, s) / ext } else { 0.0 }
                };
                let fx = factor(extent.x, sx);
                let fy = factor(extent.y, sy);
                ShapeGeometry::Line {
                    points: points.iter().map(|p| vec2(p.x * fx, p.y * fy)).collect(),
                }
            }
        }
    }
}

fn line_bounds(points: &[Vec2]) -> (Vec2, Vec2) {
    let mut min = vec2(f32::MAX, f32::MAX);
    let mut max = vec2(f32::MIN, f32::MIN);
    for p in points {
        min = min.min(*p);
        max = max.max(*p);
    }
    if points.is_empty() {
        (Vec2::ZERO, Vec2::ZERO)
    } else {
        (min, max)
    }
}

/// Paint style copied from the tool settings when the shape is created.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeStyle {
    pub fill_mode: ShapeFillMode,
    /// Outline thickness, and the stroke width of lines.
    pub outline_width: f32,
    pub primary_color: Rgba<u8>,
    /// Interior colour in `Both` mode.
    pub secondary_color: Rgba<u8>,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            fill_mode: ShapeFillMode::Filled,
            outline_width: 4.0,
            primary_color: Rgba([0, 0, 0, 255]),
            secondary_color: Rgba([255, 255, 255, 255]),
        }
    }
}

/// A vector primitive owned by a shape layer.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedShape {
    pub origin: Pos2,
    pub geometry: ShapeGeometry,
    pub style: ShapeStyle,
    pub anti_alias: bool,
    /// Live scale of an in-progress resize gesture; (1, 1) at rest.
    pub transient_scale: Vec2,
}

impl PlacedShape {
    pub fn new(kind: ShapeKind, origin: Pos2, style: ShapeStyle) -> Self {
        Self {
            origin,
            geometry: ShapeGeometry::default_for(kind),
            style,
            anti_alias: true,
            transient_scale: Vec2::splat(1.0),
        }
    }

    pub fn kind(&self) -> ShapeKind {
        self.geometry.kind()
    }

    /// Geometry as currently displayed, i.e. with the gesture scale applied.
    pub fn display_geometry(&self) -> ShapeGeometry {
        if self.transient_scale == Vec2::splat(1.0) {
            self.geometry.clone()
        } else {
            self.geometry
                .scaled(self.transient_scale.x, self.transient_scale.y)
        }
    }
}

// ============================================================================
// SHAPE EDITOR OPERATIONS
// ============================================================================

fn check_finite(what: &str, values: &[f32]) -> EditResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(EditError::OutOfRange(format!("{what}: {values:?}")))
    }
}

/// Add a shape layer with the default size for `kind`, anchored at `origin`.
/// The new layer is placed on top and becomes active.
pub fn create_shape(
    stack: &mut LayerStack,
    kind: ShapeKind,
    origin: Pos2,
    style: ShapeStyle,
) -> EditResult<LayerId> {
    check_finite("shape origin", &[origin.x, origin.y])?;
    let shape = PlacedShape::new(kind, origin, style);
    Ok(layers::add_shape_layer(stack, shape, kind.label()))
}

/// Translate an image or shape layer so its origin sits at `position`.
pub fn move_shape(stack: &mut LayerStack, id: LayerId, position: Pos2) -> EditResult<()> {
    check_finite("position", &[position.x, position.y])?;
    let layer = stack.layer_mut(id).ok_or(EditError::UnknownLayer(id))?;
    let kind = layer.kind();
    match &mut layer.content {
        LayerContent::Image { origin, .. } => *origin = position,
        LayerContent::Shape(shape) => shape.origin = position,
        LayerContent::Raster => {
            return Err(EditError::Unsupported { op: "move", kind });
        }
    }
    Ok(())
}

/// Fold a scale factor into the shape's stored dimensions (5px floor per
/// axis) and reset the transient gesture scale.
pub fn resize_shape(stack: &mut LayerStack, id: LayerId, sx: f32, sy: f32) -> EditResult<()> {
    check_finite("scale", &[sx, sy])?;
    let layer = stack.layer_mut(id).ok_or(EditError::UnknownLayer(id))?;
    let kind = layer.kind();
    match &mut layer.content {
        LayerContent::Shape(shape) => {
            shape.geometry = shape.geometry.scaled(sx, sy);
            shape.transient_scale = Vec2::splat(1.0);
            Ok(())
        }
        _ => Err(EditError::Unsupported { op: "resize", kind }),
    }
}

/// Update the live scale shown while a resize handle is dragged.
pub fn set_transient_scale(
    stack: &mut LayerStack,
    id: LayerId,
    sx: f32,
    sy: f32,
) -> EditResult<()> {
    check_finite("scale", &[sx, sy])?;
    let layer = stack.layer_mut(id).ok_or(EditError::UnknownLayer(id))?;
    let kind = layer.kind();
    match &mut layer.content {
        LayerContent::Shape(shape) => {
            shape.transient_scale = vec2(sx, sy);
            Ok(())
        }
        _ => Err(EditError::Unsupported {
            op: "resize",
            kind,
        }),
    }
}

// ============================================================================
// SDF functions: return signed distance (negative = inside)
// ============================================================================

/// SDF for a box centred at origin with half-extents (hx, hy).
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

/// SDF for an ellipse (approximation).
#[inline]
fn sdf_ellipse(px: f32, py: f32, rx: f32, ry: f32) -> f32 {
    // Normalise point to circle space
    let nx = px / rx;
    let ny = py / ry;
    let len = (nx * nx + ny * ny).sqrt();
    if len < 1e-8 {
        return -rx.min(ry);
    }
    let scale = (rx * rx * ny * ny + ry * ry * nx * nx).sqrt() / (rx * ry * len);
    (len - 1.0) / scale
}

/// Unsigned distance from `p` to the segment `a`-`b`.
#[inline]
pub fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 1e-12 {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Smoothstep between edge0 and edge1.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn coverage(d: f32, aa: bool) -> f32 {
    if aa {
        smoothstep(0.5, -0.5, d)
    } else if d < 0.0 {
        1.0
    } else {
        0.0
    }
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// Rasterize a shape (at its display scale) into a buffer covering its
/// on-canvas bounding box.
///
/// Returns `(buf, offset_x, offset_y)` where offset is the top-left corner of
/// the buffer in canvas coordinates.  The buffer is empty when the shape lies
/// entirely off-canvas.
pub fn rasterize_shape(
    placed: &PlacedShape,
    canvas_w: u32,
    canvas_h: u32,
) -> (RgbaImage, i32, i32) {
    let geometry = placed.display_geometry();
    let style = placed.style;
    let outline_half = style.outline_width.max(0.0) * 0.5;

    let (min, max) = match &geometry {
        ShapeGeometry::Rect { width, height } => {
            (placed.origin, placed.origin + vec2(*width, *height))
        }
        ShapeGeometry::Ellipse { rx, ry } => {
            let r = vec2(*rx, *ry);
            (placed.origin - r, placed.origin + r)
        }
        ShapeGeometry::Line { points } => {
            let (lo, hi) = line_bounds(points);
            (placed.origin + lo, placed.origin + hi)
        }
    };
    // Add padding for outline width + AA
    let pad = outline_half + 2.0;

    // Clamp to canvas
    let x0 = ((min.x - pad).floor() as i32).max(0);
    let y0 = ((min.y - pad).floor() as i32).max(0);
    let x1 = ((max.x + pad).ceil() as i32).min(canvas_w as i32);
    let y1 = ((max.y + pad).ceil() as i32).min(canvas_h as i32);
    let buf_w = (x1 - x0).max(0) as u32;
    let buf_h = (y1 - y0).max(0) as u32;

    if buf_w == 0 || buf_h == 0 {
        return (RgbaImage::new(0, 0), 0, 0);
    }

    let mut buf = RgbaImage::new(buf_w, buf_h);
    let row_bytes = buf_w as usize * 4;
    let aa = placed.anti_alias;
    let origin = placed.origin;

    buf.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(row, row_buf)| {
            let py = (y0 + row as i32) as f32 + 0.5;
            for col in 0..buf_w as usize {
                let px = (x0 + col as i32) as f32 + 0.5;
                let (color, cov) = shape_pixel(&geometry, style, origin, px, py, outline_half, aa);
                if cov > 0.001 {
                    let idx = col * 4;
                    row_buf[idx] = color[0];
                    row_buf[idx + 1] = color[1];
                    row_buf[idx + 2] = color[2];
                    row_buf[idx + 3] = (color[3] as f32 * cov).round().min(255.0) as u8;
                }
            }
        });

    (buf, x0, y0)
}

/// Colour and coverage of one pixel centre in canvas coordinates.
fn shape_pixel(
    geometry: &ShapeGeometry,
    style: ShapeStyle,
    origin: Pos2,
    px: f32,
    py: f32,
    outline_half: f32,
    aa: bool,
) -> (Rgba<u8>, f32) {
    let d = match geometry {
        ShapeGeometry::Rect { width, height } => {
            let (hx, hy) = (width * 0.5, height * 0.5);
            sdf_box(px - origin.x - hx, py - origin.y - hy, hx, hy)
        }
        ShapeGeometry::Ellipse { rx, ry } => sdf_ellipse(px - origin.x, py - origin.y, *rx, *ry),
        ShapeGeometry::Line { points } => {
            let d = polyline_distance(points, pos2(px - origin.x, py - origin.y));
            return (style.primary_color, coverage(d - outline_half, aa));
        }
    };

    match style.fill_mode {
        ShapeFillMode::Filled => (style.primary_color, coverage(d, aa)),
        ShapeFillMode::Outline => (style.primary_color, coverage(d.abs() - outline_half, aa)),
        ShapeFillMode::Both => {
            // Fill interior with secondary, outline with primary on top
            let fill_cov = coverage(d, aa);
            let outline_cov = coverage(d.abs() - outline_half, aa);
            if outline_cov <= 0.001 {
                return (style.secondary_color, fill_cov);
            }
            let oa = outline_cov;
            let fa = fill_cov * (1.0 - oa);
            let total = oa + fa;
            let mix = |c: usize| {
                ((style.primary_color[c] as f32 * oa + style.secondary_color[c] as f32 * fa)
                    / total)
                    .round() as u8
            };
            (Rgba([mix(0), mix(1), mix(2), mix(3)]), total.min(1.0))
        }
    }
}

fn polyline_distance(points: &[Vec2], p: Pos2) -> f32 {
    match points {
        [] => f32::MAX,
        [only] => (p.to_vec2() - *only).length(),
        _ => points
            .windows(2)
            .map(|w| sdf_line_segment(p.x, p.y, w[0].x, w[0].y, w[1].x, w[1].y))
            .fold(f32::MAX, f32::min),
    }
}
