use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use egui::{Pos2, Rect, Vec2, pos2};
use image::{Rgba, RgbaImage};

use crate::ops::shapes::PlacedShape;

/// Minimum and maximum view zoom factors.
const MIN_ZOOM: f32 = 0.1;
const MAX_ZOOM: f32 = 100.0;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Stable layer identifier.  Allocated from a monotonic counter that is never
/// rewound, so an id is never handed out twice in a session (undo included).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StrokeId(pub u64);

// ============================================================================
// BLEND MODES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
}

impl BlendMode {
    /// Returns all blend modes for UI display
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
        }
    }

    /// Parse a blend mode name (case-insensitive).  `None` for anything
    /// outside the closed set.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(BlendMode::Normal),
            "multiply" => Some(BlendMode::Multiply),
            "screen" => Some(BlendMode::Screen),
            "overlay" => Some(BlendMode::Overlay),
            _ => None,
        }
    }

    /// Reconstruct from a name, defaulting to Normal for unknown values.
    pub fn from_name_or_normal(name: &str) -> Self {
        Self::from_name(name).unwrap_or_default()
    }

    /// Per-channel blend function `B(base, top)` on normalised values.
    fn channel(self, base: f32, top: f32) -> f32 {
        match self {
            BlendMode::Normal => top,
            BlendMode::Multiply => base * top,
            BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
            BlendMode::Overlay => overlay_channel(base, top),
        }
    }
}

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

/// Composite `top` onto `base` with the given blend mode and an extra opacity
/// factor multiplied into the top alpha.
///
/// Colour mixing follows the separable-blend compositing model: where the
/// backdrop is transparent the top colour shows through unmodified, so a
/// Multiply layer over an empty canvas does not turn black.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    // Fast path: fully transparent top pixel, nothing to blend
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }

    // Fast path: Normal blend, full opacity, fully opaque top pixel, just overwrite
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);

    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let b = base[c] as f32 / 255.0;
        let t = top[c] as f32 / 255.0;
        let mixed = (1.0 - base_a) * t + base_a * mode.channel(b, t);
        let v = (mixed * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

// ============================================================================
// COLOURS
// ============================================================================

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
pub fn parse_hex_color(s: &str) -> Option<Rgba<u8>> {
    let hex = s.trim().trim_start_matches('#');
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0u8, 0, 0, 255];
            for (i, ch) in hex.chars().enumerate() {
                let v = ch.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            Some(Rgba(out))
        }
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

/// Format a colour as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
pub fn to_hex_color(c: Rgba<u8>) -> String {
    if c[3] == 255 {
        format!("#{:02x}{:02x}{:02x}", c[0], c[1], c[2])
    } else {
        format!("#{:02x}{:02x}{:02x}{:02x}", c[0], c[1], c[2], c[3])
    }
}

// ============================================================================
// STROKES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StrokeMode {
    #[default]
    Paint,
    /// Punches transparency into the owning layer's content only.
    Erase,
}

/// One continuous pointer gesture, in canvas-local coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub id: StrokeId,
    pub points: Vec<Pos2>,
    pub color: Rgba<u8>,
    /// Brush diameter in canvas pixels.
    pub width: f32,
    pub opacity: f32,
    pub mode: StrokeMode,
}

impl Stroke {
    /// Points as a flat `[x0, y0, x1, y1, ...]` list.
    pub fn flat_points(&self) -> Vec<f32> {
        self.points.iter().flat_map(|p| [p.x, p.y]).collect()
    }

    /// Bounding box of the painted area (points expanded by the brush radius).
    pub fn bounds(&self) -> Option<Rect> {
        let first = *self.points.first()?;
        let mut rect = Rect::from_min_max(first, first);
        for p in &self.points[1..] {
            rect.extend_with(*p);
        }
        Some(rect.expand(self.width * 0.5 + 1.0))
    }
}

// ============================================================================
// LAYERS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Raster,
    Image,
    Shape,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LayerKind::Raster => "raster",
            LayerKind::Image => "image",
            LayerKind::Shape => "shape",
        })
    }
}

/// Kind-specific layer content.  Strokes are stored on the layer itself since
/// every kind may carry them.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerContent {
    Raster,
    Image {
        /// Shared with history snapshots; replaced wholesale on edit.
        pixels: Arc<RgbaImage>,
        /// Top-left corner in canvas coordinates.
        origin: Pos2,
    },
    Shape(PlacedShape),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    /// Set only on the initial layer; protects it from deletion.
    pub is_base: bool,
    pub content: LayerContent,
    /// Drawn on top of the base content, in creation order.
    pub strokes: Vec<Stroke>,
}

impl Layer {
    pub fn new(id: LayerId, name: String, content: LayerContent) -> Self {
        Self {
            id,
            name,
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            is_base: false,
            content,
            strokes: Vec::new(),
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self.content {
            LayerContent::Raster => LayerKind::Raster,
            LayerContent::Image { .. } => LayerKind::Image,
            LayerContent::Shape(_) => LayerKind::Shape,
        }
    }

    /// True for image and shape layers, which render something beneath their strokes.
    pub fn has_base_content(&self) -> bool {
        !matches!(self.content, LayerContent::Raster)
    }

    /// Position of image/shape content.
    pub fn origin(&self) -> Option<Pos2> {
        match &self.content {
            LayerContent::Raster => None,
            LayerContent::Image { origin, .. } => Some(*origin),
            LayerContent::Shape(shape) => Some(shape.origin),
        }
    }

    /// Width/height of image/shape content.
    pub fn size(&self) -> Option<Vec2> {
        match &self.content {
            LayerContent::Raster => None,
            LayerContent::Image { pixels, .. } => {
                Some(Vec2::new(pixels.width() as f32, pixels.height() as f32))
            }
            LayerContent::Shape(shape) => Some(shape.geometry.extent()),
        }
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Ordered, id-addressed collection of layers.
///
/// Layer records live in a table keyed by id; z-order is the separate `order`
/// list (index 0 = bottommost).  Records are `Arc`-shared with history
/// snapshots and copied on first write through [`LayerStack::layer_mut`].
///
/// Mutating operations live in `components::layers`.
#[derive(Clone, Debug)]
pub struct LayerStack {
    pub(crate) layers: BTreeMap<LayerId, Arc<Layer>>,
    pub(crate) order: Vec<LayerId>,
    pub(crate) active: LayerId,
    width: u32,
    height: u32,
    next_layer_id: u64,
    next_stroke_id: u64,
}

impl LayerStack {
    /// A stack holding a single empty "Background" base layer.
    pub fn new(width: u32, height: u32) -> Self {
        let id = LayerId(1);
        let mut background = Layer::new(id, "Background".to_string(), LayerContent::Raster);
        background.is_base = true;

        let mut layers = BTreeMap::new();
        layers.insert(id, Arc::new(background));

        Self {
            layers,
            order: vec![id],
            active: id,
            width: width.max(1),
            height: height.max(1),
            next_layer_id: 2,
            next_stroke_id: 1,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Layer ids in z-order, bottom first.
    pub fn order(&self) -> &[LayerId] {
        &self.order
    }

    pub fn layers_bottom_to_top(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.order.iter().filter_map(|id| self.layers.get(id).map(|l| l.as_ref()))
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id).map(|l| l.as_ref())
    }

    /// Mutable access; detaches the record from any snapshot sharing it.
    pub(crate) fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(&id).map(Arc::make_mut)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains_key(&id)
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.order.iter().position(|&l| l == id)
    }

    pub fn active_id(&self) -> LayerId {
        self.active
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layer(self.active)
    }

    pub fn top_id(&self) -> Option<LayerId> {
        self.order.last().copied()
    }

    pub(crate) fn allocate_layer_id(&mut self) -> LayerId {
        let id = LayerId(self.next_layer_id);
        self.next_layer_id += 1;
        id
    }

    pub(crate) fn allocate_stroke_id(&mut self) -> StrokeId {
        let id = StrokeId(self.next_stroke_id);
        self.next_stroke_id += 1;
        id
    }

    /// Point the active layer at an existing layer, falling back to the
    /// bottommost one when `self.active` is dangling.
    pub(crate) fn repair_active(&mut self) {
        if !self.layers.contains_key(&self.active)
            && let Some(&first) = self.order.first()
        {
            self.active = first;
        }
    }

    /// Replace the layer content wholesale (history restore).  Id counters are
    /// deliberately left alone so ids are never reused.
    pub(crate) fn replace_contents(
        &mut self,
        layers: BTreeMap<LayerId, Arc<Layer>>,
        order: Vec<LayerId>,
        active: LayerId,
    ) {
        self.layers = layers;
        self.order = order;
        self.active = active;
        self.repair_active();
    }
}

// ============================================================================
// VIEWPORT (screen <-> canvas)
// ============================================================================

/// Pan/zoom of the on-screen view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub pan_offset: Vec2,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan_offset: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    /// `local = (screen - pan) / zoom`
    pub fn screen_to_canvas(&self, screen: Pos2) -> Pos2 {
        let v = (screen.to_vec2() - self.pan_offset) / self.zoom;
        pos2(v.x, v.y)
    }

    pub fn canvas_to_screen(&self, canvas: Pos2) -> Pos2 {
        (canvas.to_vec2() * self.zoom + self.pan_offset).to_pos2()
    }

    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom * 1.2).min(MAX_ZOOM);
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom / 1.2).max(MIN_ZOOM);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = 1.0;
        self.pan_offset = Vec2::ZERO;
    }

    pub fn apply_zoom(&mut self, zoom_factor: f32) {
        if zoom_factor.is_finite() && zoom_factor > 0.0 {
            self.zoom = (self.zoom * zoom_factor).clamp(MIN_ZOOM, MAX_ZOOM);
        }
    }

    /// Zoom while keeping a screen-space point fixed (e.g. under the cursor).
    pub fn zoom_around_screen_point(&mut self, zoom_factor: f32, anchor: Pos2) {
        let fixed = self.screen_to_canvas(anchor);
        self.apply_zoom(zoom_factor);
        // anchor = fixed * zoom + pan  =>  pan = anchor - fixed * zoom
        self.pan_offset = anchor.to_vec2() - fixed.to_vec2() * self.zoom;
    }

    /// Pan the viewport by a screen-space delta
    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan_offset += delta;
    }
}
