use egui::{Pos2, Vec2};
use image::Rgba;

use crate::canvas::{LayerContent, LayerId, LayerStack, Stroke, StrokeId, StrokeMode, Viewport};
use crate::error::{EditError, EditResult};
use crate::ops::shapes::{self, ShapeFillMode, ShapeKind, ShapeStyle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    Rect,
    Ellipse,
    Line,
    /// Drag the active image or shape layer.
    Move,
}

impl Tool {
    pub fn all() -> &'static [Tool] {
        &[
            Tool::Brush,
            Tool::Eraser,
            Tool::Rect,
            Tool::Ellipse,
            Tool::Line,
            Tool::Move,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Brush => "brush",
            Tool::Eraser => "eraser",
            Tool::Rect => "rect",
            Tool::Ellipse => "ellipse",
            Tool::Line => "line",
            Tool::Move => "move",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Tool::all().iter().copied().find(|t| t.name() == name)
    }

    /// The shape a shape tool creates on pointer-down.
    pub fn shape_kind(&self) -> Option<ShapeKind> {
        match self {
            Tool::Rect => Some(ShapeKind::Rect),
            Tool::Ellipse => Some(ShapeKind::Ellipse),
            Tool::Line => Some(ShapeKind::Line),
            _ => None,
        }
    }
}

/// Brush/tool controls.  Session-only, never persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToolSettings {
    pub tool: Tool,
    pub color: Rgba<u8>,
    /// Interior colour for shapes drawn in `Both` mode.
    pub secondary_color: Rgba<u8>,
    /// Brush diameter / shape outline width, in canvas pixels.
    pub size: f32,
    pub opacity: f32,
    pub shape_fill: ShapeFillMode,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            tool: Tool::Brush,
            color: Rgba([0, 0, 0, 255]),
            secondary_color: Rgba([255, 255, 255, 255]),
            size: 6.0,
            opacity: 1.0,
            shape_fill: ShapeFillMode::Filled,
        }
    }
}

impl ToolSettings {
    pub fn set_size(&mut self, size: f32) {
        if size.is_finite() {
            self.size = size.clamp(1.0, 500.0);
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        if !opacity.is_nan() {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    pub fn shape_style(&self) -> ShapeStyle {
        ShapeStyle {
            fill_mode: self.shape_fill,
            outline_width: self.size,
            primary_color: self.color,
            secondary_color: self.secondary_color,
        }
    }
}

// ============================================================================
// STROKE ENGINE
// ============================================================================

/// Pointer gesture in progress.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Drawing {
        layer: LayerId,
        stroke: StrokeId,
        mode: StrokeMode,
    },
    Moving {
        layer: LayerId,
        /// Origin minus the grab point, so the layer doesn't jump to the cursor.
        grab_offset: Vec2,
        start_origin: Pos2,
    },
}

/// A finished gesture the session should record in history.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeEvent {
    pub description: String,
    pub layer: LayerId,
}

/// Turns pointer events into strokes, shapes and layer moves.
///
/// Screen coordinates are mapped through the viewport at every event, so the
/// stored points are always canvas-local regardless of pan/zoom.
#[derive(Default)]
pub struct StrokeEngine {
    state: GestureState,
}

impl StrokeEngine {
    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != GestureState::Idle
    }

    /// Begin a gesture with the current tool.  Shape tools complete
    /// immediately and return their event; brush/eraser/move return `None`
    /// and stay open until [`StrokeEngine::finish`].
    pub fn pointer_down(
        &mut self,
        stack: &mut LayerStack,
        tools: &ToolSettings,
        viewport: &Viewport,
        screen: Pos2,
    ) -> EditResult<Option<StrokeEvent>> {
        let local = viewport.screen_to_canvas(screen);
        if !local.x.is_finite() || !local.y.is_finite() {
            return Err(EditError::OutOfRange(format!("pointer {screen:?}")));
        }

        match tools.tool {
            Tool::Brush | Tool::Eraser => {
                let mode = if tools.tool == Tool::Eraser {
                    StrokeMode::Erase
                } else {
                    StrokeMode::Paint
                };
                let layer_id = stack.active_id();
                let stroke_id = stack.allocate_stroke_id();
                let layer = stack
                    .layer_mut(layer_id)
                    .ok_or(EditError::UnknownLayer(layer_id))?;
                layer.strokes.push(Stroke {
                    id: stroke_id,
                    points: vec![local],
                    color: tools.color,
                    width: tools.size,
                    opacity: tools.opacity,
                    mode,
                });
                self.state = GestureState::Drawing {
                    layer: layer_id,
                    stroke: stroke_id,
                    mode,
                };
                Ok(None)
            }
            Tool::Rect | Tool::Ellipse | Tool::Line => {
                let kind = tools.tool.shape_kind().unwrap_or(ShapeKind::Rect);
                let id = shapes::create_shape(stack, kind, local, tools.shape_style())?;
                Ok(Some(StrokeEvent {
                    description: format!("Add Shape: {}", kind.label()),
                    layer: id,
                }))
            }
            Tool::Move => {
                let layer_id = stack.active_id();
                let layer = stack
                    .layer(layer_id)
                    .ok_or(EditError::UnknownLayer(layer_id))?;
                let origin = match &layer.content {
                    LayerContent::Raster => {
                        return Err(EditError::Unsupported {
                            op: "move",
                            kind: layer.kind(),
                        });
                    }
                    _ => layer.origin().unwrap_or(Pos2::ZERO),
                };
                self.state = GestureState::Moving {
                    layer: layer_id,
                    grab_offset: origin - local,
                    start_origin: origin,
                };
                Ok(None)
            }
        }
    }

    /// Extend the open gesture.  No-op when idle.
    pub fn pointer_move(
        &mut self,
        stack: &mut LayerStack,
        viewport: &Viewport,
        screen: Pos2,
    ) -> EditResult<()> {
        let local = viewport.screen_to_canvas(screen);
        if !local.x.is_finite() || !local.y.is_finite() {
            return Err(EditError::OutOfRange(format!("pointer {screen:?}")));
        }
        match self.state {
            GestureState::Idle => Ok(()),
            GestureState::Drawing { layer, stroke, .. } => {
                // The layer can vanish under an open stroke only through
                // misuse; drop the gesture rather than fail every move.
                let Some(layer) = stack.layer_mut(layer) else {
                    self.state = GestureState::Idle;
                    return Ok(());
                };
                if let Some(s) = layer.strokes.iter_mut().rev().find(|s| s.id == stroke) {
                    s.points.push(local);
                }
                Ok(())
            }
            GestureState::Moving {
                layer, grab_offset, ..
            } => shapes::move_shape(stack, layer, local + grab_offset),
        }
    }

    /// End the open gesture (pointer-up or pointer-leave).  Returns the event
    /// to record, or `None` when nothing changed.
    pub fn finish(&mut self, stack: &LayerStack) -> Option<StrokeEvent> {
        let state = std::mem::take(&mut self.state);
        match state {
            GestureState::Idle => None,
            GestureState::Drawing { layer, mode, .. } => {
                stack.layer(layer)?;
                let description = match mode {
                    StrokeMode::Paint => "Brush Stroke",
                    StrokeMode::Erase => "Eraser Stroke",
                };
                Some(StrokeEvent {
                    description: description.to_string(),
                    layer,
                })
            }
            GestureState::Moving {
                layer, start_origin, ..
            } => {
                let moved = stack.layer(layer)?.origin()? != start_origin;
                moved.then(|| StrokeEvent {
                    description: "Move".to_string(),
                    layer,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::layers;
    use egui::{pos2, vec2};
    use std::sync::Arc;

    fn red_brush() -> ToolSettings {
        ToolSettings {
            color: Rgba([255, 0, 0, 255]),
            size: 6.0,
            ..ToolSettings::default()
        }
    }

    #[test]
    fn brush_gesture_records_one_stroke() {
        let mut stack = LayerStack::new(100, 100);
        let mut engine = StrokeEngine::default();
        let view = Viewport::default();
        let tools = red_brush();

        let started = engine.pointer_down(&mut stack, &tools, &view, pos2(10.0, 10.0));
        assert_eq!(started, Ok(None));
        engine.pointer_move(&mut stack, &view, pos2(20.0, 10.0)).expect("move");
        let event = engine.finish(&stack).expect("event");
        assert_eq!(event.description, "Brush Stroke");
        assert!(!engine.is_active());

        let layer = stack.active_layer().expect("layer");
        assert_eq!(layer.strokes.len(), 1);
        let stroke = &layer.strokes[0];
        assert_eq!(stroke.flat_points(), vec![10.0, 10.0, 20.0, 10.0]);
        assert_eq!(stroke.mode, StrokeMode::Paint);
        assert_eq!(stroke.color, Rgba([255, 0, 0, 255]));
        assert_eq!(stroke.width, 6.0);
    }

    #[test]
    fn points_are_mapped_through_viewport() {
        let mut stack = LayerStack::new(100, 100);
        let mut engine = StrokeEngine::default();
        let view = Viewport {
            pan_offset: vec2(10.0, 20.0),
            zoom: 2.0,
        };
        let tools = ToolSettings {
            tool: Tool::Eraser,
            ..ToolSettings::default()
        };
        engine
            .pointer_down(&mut stack, &tools, &view, pos2(30.0, 40.0))
            .expect("down");
        engine.pointer_move(&mut stack, &view, pos2(50.0, 40.0)).expect("move");
        let event = engine.finish(&stack).expect("event");
        assert_eq!(event.description, "Eraser Stroke");
        let stroke = &stack.active_layer().expect("layer").strokes[0];
        assert_eq!(stroke.flat_points(), vec![10.0, 10.0, 20.0, 10.0]);
        assert_eq!(stroke.mode, StrokeMode::Erase);
    }

    #[test]
    fn move_and_finish_while_idle_do_nothing() {
        let mut stack = LayerStack::new(10, 10);
        let mut engine = StrokeEngine::default();
        engine
            .pointer_move(&mut stack, &Viewport::default(), pos2(1.0, 1.0))
            .expect("move");
        assert_eq!(engine.finish(&stack), None);
        assert!(stack.active_layer().expect("layer").strokes.is_empty());
    }

    #[test]
    fn shape_tool_creates_layer_immediately() {
        let mut stack = LayerStack::new(300, 300);
        let mut engine = StrokeEngine::default();
        let tools = ToolSettings {
            tool: Tool::Ellipse,
            ..ToolSettings::default()
        };
        let event = engine
            .pointer_down(&mut stack, &tools, &Viewport::default(), pos2(80.0, 90.0))
            .expect("down")
            .expect("event");
        assert_eq!(event.description, "Add Shape: Ellipse");
        assert_eq!(stack.active_id(), event.layer);
        assert_eq!(stack.active_layer().and_then(|l| l.origin()), Some(pos2(80.0, 90.0)));
        assert!(!engine.is_active());
    }

    #[test]
    fn move_tool_drags_image_layer_by_grab_offset() {
        let mut stack = LayerStack::new(100, 100);
        let img = Arc::new(image::RgbaImage::new(10, 10));
        let id = layers::add_image_layer(&mut stack, img, pos2(5.0, 5.0), "img");
        let mut engine = StrokeEngine::default();
        let tools = ToolSettings {
            tool: Tool::Move,
            ..ToolSettings::default()
        };
        let view = Viewport::default();
        engine
            .pointer_down(&mut stack, &tools, &view, pos2(8.0, 8.0))
            .expect("down");
        engine.pointer_move(&mut stack, &view, pos2(18.0, 28.0)).expect("drag");
        let event = engine.finish(&stack).expect("moved");
        assert_eq!(event.description, "Move");
        assert_eq!(stack.layer(id).and_then(|l| l.origin()), Some(pos2(15.0, 25.0)));
    }

    #[test]
    fn move_tool_without_motion_records_nothing() {
        let mut stack = LayerStack::new(100, 100);
        let img = Arc::new(image::RgbaImage::new(10, 10));
        layers::add_image_layer(&mut stack, img, pos2(5.0, 5.0), "img");
        let mut engine = StrokeEngine::default();
        let tools = ToolSettings {
            tool: Tool::Move,
            ..ToolSettings::default()
        };
        engine
            .pointer_down(&mut stack, &tools, &Viewport::default(), pos2(8.0, 8.0))
            .expect("down");
        assert_eq!(engine.finish(&stack), None);
    }

    #[test]
    fn move_tool_rejects_raster_layer() {
        let mut stack = LayerStack::new(10, 10);
        let mut engine = StrokeEngine::default();
        let tools = ToolSettings {
            tool: Tool::Move,
            ..ToolSettings::default()
        };
        let res = engine.pointer_down(&mut stack, &tools, &Viewport::default(), pos2(1.0, 1.0));
        assert!(matches!(res, Err(EditError::Unsupported { .. })));
        assert!(!engine.is_active());
    }

    #[test]
    fn tool_names_parse() {
        assert_eq!(Tool::from_name("Eraser"), Some(Tool::Eraser));
        assert_eq!(Tool::from_name("lasso"), None);
    }
}
