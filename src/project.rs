use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use egui::{Pos2, Vec2, pos2};
use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::canvas::{BlendMode, Layer, LayerContent, LayerId, LayerStack, Viewport};
use crate::components::history::HistoryManager;
use crate::components::layers::{self, ReorderDirection};
use crate::components::tools::{StrokeEngine, ToolSettings};
use crate::compositor;
use crate::error::{EditError, EditResult};
use crate::io::{self, IoResult};
use crate::ops::filters::{self, FilterKind};
use crate::ops::shapes::{self, ShapeKind};
use crate::settings::EditorSettings;
use crate::{log_info, log_warn};

/// Single editing session.
///
/// Owns the layer stack, its history, the tool settings and the view.  All
/// edits go through `&mut self` methods, each of which either applies fully
/// (including its history snapshot) or returns an error and changes nothing.
/// Any open pointer gesture is finished before another edit is applied.
pub struct Project {
    pub id: Uuid,
    pub name: String,
    stack: LayerStack,
    history: HistoryManager,
    pub tools: ToolSettings,
    pub viewport: Viewport,
    engine: StrokeEngine,
    background: Rgba<u8>,
    is_dirty: bool,

    io_sender: Sender<IoResult>,
    io_receiver: Receiver<IoResult>,
    pending_io_ops: usize,
}

impl Project {
    pub fn new(width: u32, height: u32) -> Self {
        let settings = EditorSettings {
            canvas_width: width,
            canvas_height: height,
            ..EditorSettings::default()
        };
        Self::with_settings(&settings)
    }

    pub fn with_settings(settings: &EditorSettings) -> Self {
        let stack = LayerStack::new(settings.canvas_width, settings.canvas_height);
        let history = HistoryManager::new(&stack, settings.max_history);
        let tools = ToolSettings {
            color: settings.default_brush_color,
            size: settings.default_brush_size,
            opacity: settings.default_brush_opacity,
            ..ToolSettings::default()
        };
        let (io_sender, io_receiver) = mpsc::channel();
        let id = Uuid::new_v4();
        log_info!(
            "Session {} opened ({}x{})",
            id,
            stack.width(),
            stack.height()
        );

        Self {
            id,
            name: "Untitled".to_string(),
            stack,
            history,
            tools,
            viewport: Viewport::default(),
            engine: StrokeEngine::default(),
            background: settings.background,
            is_dirty: false,
            io_sender,
            io_receiver,
            pending_io_ops: 0,
        }
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.stack.layer(id)
    }

    pub fn active_layer_id(&self) -> LayerId {
        self.stack.active_id()
    }

    pub fn is_drawing(&self) -> bool {
        self.engine.is_active()
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending_io_ops
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn background(&self) -> Rgba<u8> {
        self.background
    }

    pub fn set_background(&mut self, color: Rgba<u8>) {
        self.background = color;
    }

    // ------------------------------------------------------------------
    // Internal plumbing
    // ------------------------------------------------------------------

    fn commit(&mut self, label: impl Into<String>) {
        let label = label.into();
        log_info!("[{}] {}", self.id, label);
        self.history.push(label, &self.stack);
        self.is_dirty = true;
    }

    /// Close an open pointer gesture, recording it if it changed anything.
    fn finish_gesture(&mut self) {
        if let Some(event) = self.engine.finish(&self.stack) {
            self.commit(event.description);
        }
    }

    fn report<T>(&self, op: &str, result: EditResult<T>) -> EditResult<T> {
        if let Err(e) = &result {
            log_warn!("[{}] {} rejected: {}", self.id, op, e);
        }
        result
    }

    fn layer_name(&self, id: LayerId) -> String {
        self.stack
            .layer(id)
            .map(|l| l.name.clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Layer panel
    // ------------------------------------------------------------------

    /// Add a blank layer on top; it becomes active.
    pub fn add_layer(&mut self, name: &str) -> LayerId {
        self.finish_gesture();
        let id = layers::add_raster_layer(&mut self.stack, name);
        let label = format!("Add Layer: {}", self.layer_name(id));
        self.commit(label);
        id
    }

    pub fn delete_layer(&mut self, id: LayerId) -> EditResult<()> {
        self.finish_gesture();
        let name = self.layer_name(id);
        let res = layers::delete_layer(&mut self.stack, id);
        self.report("delete layer", res)?;
        self.commit(format!("Delete Layer: {name}"));
        Ok(())
    }

    /// Move a layer one step.  `Ok(false)` (and no history entry) at the ends.
    pub fn reorder_layer(&mut self, id: LayerId, direction: ReorderDirection) -> EditResult<bool> {
        self.finish_gesture();
        let res = layers::reorder(&mut self.stack, id, direction);
        let moved = self.report("reorder layer", res)?;
        if moved {
            let label = match direction {
                ReorderDirection::Up => "Move Layer Up",
                ReorderDirection::Down => "Move Layer Down",
            };
            self.commit(label);
        }
        Ok(moved)
    }

    pub fn merge_up(&mut self, id: LayerId) -> EditResult<LayerId> {
        self.finish_gesture();
        let res = layers::merge_up(&mut self.stack, id);
        let survivor = self.report("merge up", res)?;
        self.commit("Merge Up");
        Ok(survivor)
    }

    pub fn merge_down(&mut self, id: LayerId) -> EditResult<LayerId> {
        self.finish_gesture();
        let res = layers::merge_down(&mut self.stack, id);
        let survivor = self.report("merge down", res)?;
        self.commit("Merge Down");
        Ok(survivor)
    }

    pub fn toggle_visibility(&mut self, id: LayerId) -> EditResult<bool> {
        self.finish_gesture();
        let res = layers::toggle_visibility(&mut self.stack, id);
        let visible = self.report("toggle visibility", res)?;
        self.commit(if visible { "Show Layer" } else { "Hide Layer" });
        Ok(visible)
    }

    pub fn set_visibility(&mut self, id: LayerId, visible: bool) -> EditResult<()> {
        self.finish_gesture();
        let res = layers::set_visibility(&mut self.stack, id, visible);
        self.report("set visibility", res)?;
        self.commit(if visible { "Show Layer" } else { "Hide Layer" });
        Ok(())
    }

    /// Returns the stored (clamped) opacity.
    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) -> EditResult<f32> {
        self.finish_gesture();
        let res = layers::set_opacity(&mut self.stack, id, opacity);
        let stored = self.report("set opacity", res)?;
        self.commit("Layer Opacity");
        Ok(stored)
    }

    pub fn set_blend_mode(&mut self, id: LayerId, mode: BlendMode) -> EditResult<()> {
        self.finish_gesture();
        let res = layers::set_blend_mode(&mut self.stack, id, mode);
        self.report("set blend mode", res)?;
        self.commit(format!("Blend Mode: {}", mode.name()));
        Ok(())
    }

    /// Blend mode by name.  Unknown names are ignored (`Ok(false)`, no history).
    pub fn set_blend_mode_named(&mut self, id: LayerId, name: &str) -> EditResult<bool> {
        match BlendMode::from_name(name) {
            Some(mode) => self.set_blend_mode(id, mode).map(|_| true),
            None => {
                let res = self.stack.layer(id).map(|_| false).ok_or(EditError::UnknownLayer(id));
                if res.is_ok() {
                    log_warn!("[{}] ignoring unknown blend mode {:?}", self.id, name);
                }
                self.report("set blend mode", res)
            }
        }
    }

    /// Selection only; not recorded in history.
    pub fn set_active_layer(&mut self, id: LayerId) -> EditResult<()> {
        self.finish_gesture();
        let res = layers::set_active(&mut self.stack, id);
        self.report("set active layer", res)
    }

    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> EditResult<()> {
        self.finish_gesture();
        let res = layers::rename_layer(&mut self.stack, id, name);
        self.report("rename layer", res)?;
        self.commit(format!("Rename Layer: {name}"));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pointer input (screen coordinates)
    // ------------------------------------------------------------------

    pub fn pointer_down(&mut self, screen: Pos2) -> EditResult<()> {
        self.finish_gesture();
        let res = self
            .engine
            .pointer_down(&mut self.stack, &self.tools, &self.viewport, screen);
        if let Some(event) = self.report("pointer down", res)? {
            self.commit(event.description);
        }
        Ok(())
    }

    pub fn pointer_move(&mut self, screen: Pos2) -> EditResult<()> {
        let res = self
            .engine
            .pointer_move(&mut self.stack, &self.viewport, screen);
        self.report("pointer move", res)
    }

    pub fn pointer_up(&mut self) {
        self.finish_gesture();
    }

    /// Leaving the canvas ends the gesture exactly like releasing the pointer.
    pub fn pointer_leave(&mut self) {
        self.finish_gesture();
    }

    // ------------------------------------------------------------------
    // Shapes
    // ------------------------------------------------------------------

    /// Create a shape at a canvas-space origin using the current tool style.
    pub fn add_shape(&mut self, kind: ShapeKind, origin: Pos2) -> EditResult<LayerId> {
        self.finish_gesture();
        let style = self.tools.shape_style();
        let res = shapes::create_shape(&mut self.stack, kind, origin, style);
        let id = self.report("add shape", res)?;
        self.commit(format!("Add Shape: {}", kind.label()));
        Ok(id)
    }

    pub fn move_shape(&mut self, id: LayerId, position: Pos2) -> EditResult<()> {
        self.finish_gesture();
        let res = shapes::move_shape(&mut self.stack, id, position);
        self.report("move", res)?;
        self.commit("Move");
        Ok(())
    }

    pub fn resize_shape(&mut self, id: LayerId, sx: f32, sy: f32) -> EditResult<()> {
        self.finish_gesture();
        let res = shapes::resize_shape(&mut self.stack, id, sx, sy);
        self.report("resize", res)?;
        self.commit("Resize Shape");
        Ok(())
    }

    /// Live resize feedback; not recorded until [`Project::commit_transient_scale`].
    /// An open stroke is recorded first so its snapshot never holds the preview.
    pub fn set_transient_scale(&mut self, id: LayerId, sx: f32, sy: f32) -> EditResult<()> {
        self.finish_gesture();
        let res = shapes::set_transient_scale(&mut self.stack, id, sx, sy);
        self.report("resize preview", res)
    }

    /// Fold the live gesture scale into the shape's dimensions.  A scale of
    /// 1 changes nothing and records nothing.
    pub fn commit_transient_scale(&mut self, id: LayerId) -> EditResult<()> {
        let scale = match self.stack.layer(id).map(|l| &l.content) {
            Some(LayerContent::Shape(shape)) => shape.transient_scale,
            // resize_shape reports the precise error for these
            _ => return self.resize_shape(id, 1.0, 1.0),
        };
        if scale == Vec2::splat(1.0) {
            self.finish_gesture();
            return Ok(());
        }
        self.resize_shape(id, scale.x, scale.y)
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    pub fn apply_filter(&mut self, id: LayerId, kind: FilterKind) -> EditResult<()> {
        self.finish_gesture();
        let res = filters::apply_filter(&mut self.stack, id, kind);
        self.report("filter", res)?;
        self.commit(format!("Filter: {kind}"));
        Ok(())
    }

    /// Run a filter in the background; the result lands on a later
    /// [`Project::poll_jobs`].  Kind is validated up front.
    pub fn apply_filter_async(&mut self, id: LayerId, kind: FilterKind) -> EditResult<()> {
        let res = filters::filter_source(&self.stack, id);
        let source = self.report("filter", res)?;
        io::spawn_filter(id, kind, source, self.io_sender.clone());
        self.pending_io_ops += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Import / export
    // ------------------------------------------------------------------

    /// Decode and add an image layer at the canvas origin.
    pub fn import_image_bytes(&mut self, bytes: &[u8], name: &str) -> EditResult<LayerId> {
        self.finish_gesture();
        let res = io::decode_image(bytes);
        let pixels = self.report("import image", res)?;
        Ok(self.add_decoded_image(pixels, name))
    }

    pub fn import_image_file(&mut self, path: &Path) -> EditResult<LayerId> {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Image".to_string());
        let res = std::fs::read(path)
            .map_err(|e| EditError::Decode(format!("{}: {}", path.display(), e)));
        let bytes = self.report("import image", res)?;
        self.import_image_bytes(&bytes, &name)
    }

    /// Decode on the rayon pool; the layer appears on a later `poll_jobs`.
    pub fn import_image_async(&mut self, bytes: Vec<u8>, name: &str) {
        io::spawn_decode(bytes, name.to_string(), self.io_sender.clone());
        self.pending_io_ops += 1;
    }

    /// Add an already-decoded image as a layer at the canvas origin.
    pub fn import_decoded(&mut self, pixels: RgbaImage, name: &str) -> LayerId {
        self.finish_gesture();
        self.add_decoded_image(pixels, name)
    }

    fn add_decoded_image(&mut self, pixels: RgbaImage, name: &str) -> LayerId {
        let id = layers::add_image_layer(&mut self.stack, Arc::new(pixels), pos2(0.0, 0.0), name);
        let label = format!("Import Image: {}", self.layer_name(id));
        self.commit(label);
        id
    }

    /// Apply every finished background job against the current stack.
    /// Returns how many changed the document.
    pub fn poll_jobs(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(result) = self.io_receiver.try_recv() {
            self.pending_io_ops = self.pending_io_ops.saturating_sub(1);
            if self.apply_job_result(result) {
                applied += 1;
            }
        }
        applied
    }

    /// Block until every outstanding background job has been applied.
    pub fn wait_for_jobs(&mut self) -> usize {
        let mut applied = 0;
        while self.pending_io_ops > 0 {
            // We hold a sender ourselves, so recv only fails if that is gone.
            let Ok(result) = self.io_receiver.recv() else { break };
            self.pending_io_ops -= 1;
            if self.apply_job_result(result) {
                applied += 1;
            }
        }
        applied
    }

    fn apply_job_result(&mut self, result: IoResult) -> bool {
        self.finish_gesture();
        match result {
            IoResult::ImageDecoded { name, pixels } => {
                self.add_decoded_image(pixels, &name);
                true
            }
            IoResult::DecodeFailed { name, error } => {
                log_warn!("[{}] import of {:?} failed: {}", self.id, name, error);
                false
            }
            IoResult::FilterApplied {
                layer,
                kind,
                pixels,
            } => match filters::replace_pixels(&mut self.stack, layer, Arc::new(pixels)) {
                Ok(()) => {
                    self.commit(format!("Filter: {kind}"));
                    true
                }
                Err(e) => {
                    log_info!("[{}] discarding stale {} result: {}", self.id, kind, e);
                    false
                }
            },
        }
    }

    /// Flattened image of the current stack.
    pub fn render(&self) -> RgbaImage {
        compositor::render(&self.stack, self.background)
    }

    pub fn export_png(&self) -> EditResult<Vec<u8>> {
        let res = io::encode_png(&self.render());
        self.report("export", res)
    }

    pub fn export_png_to(&self, path: &Path) -> EditResult<()> {
        let res = io::write_png(&self.render(), path);
        self.report("export", res)?;
        log_info!("[{}] exported {}", self.id, path.display());
        Ok(())
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        self.finish_gesture();
        let changed = self.history.undo(&mut self.stack);
        if changed {
            self.is_dirty = true;
        }
        changed
    }

    pub fn redo(&mut self) -> bool {
        self.finish_gesture();
        let changed = self.history.redo(&mut self.stack);
        if changed {
            self.is_dirty = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{StrokeMode, parse_hex_color};
    use crate::components::history::StackSnapshot;
    use crate::components::tools::Tool;

    #[test]
    fn stroke_capture_scenario() {
        let mut project = Project::new(200, 200);
        project.tools.color = parse_hex_color("#ff0000").expect("colour");
        project.tools.set_size(6.0);
        let before = project.history().len();

        project.pointer_down(pos2(10.0, 10.0)).expect("down");
        project.pointer_move(pos2(20.0, 10.0)).expect("move");
        project.pointer_up();

        assert_eq!(project.history().len(), before + 1);
        let layer = project.stack().active_layer().expect("layer");
        assert_eq!(layer.strokes.len(), 1);
        assert_eq!(layer.strokes[0].flat_points(), vec![10.0, 10.0, 20.0, 10.0]);
        assert_eq!(layer.strokes[0].mode, StrokeMode::Paint);
    }

    #[test]
    fn refused_delete_records_nothing() {
        let mut project = Project::new(50, 50);
        let only = project.active_layer_id();
        let snap = StackSnapshot::capture(project.stack());
        assert!(matches!(project.delete_layer(only), Err(EditError::Refused(_))));
        assert_eq!(project.history().len(), 1);
        assert_eq!(StackSnapshot::capture(project.stack()), snap);
        assert!(!project.is_dirty());
    }

    #[test]
    fn other_edits_close_an_open_stroke_first() {
        let mut project = Project::new(100, 100);
        project.pointer_down(pos2(5.0, 5.0)).expect("down");
        assert!(project.is_drawing());
        project.add_layer("next");
        assert!(!project.is_drawing());
        assert_eq!(
            project.history().labels(),
            vec!["Open", "Brush Stroke", "Add Layer: next"]
        );
    }

    #[test]
    fn pointer_leave_ends_gesture_once() {
        let mut project = Project::new(100, 100);
        project.tools.tool = Tool::Eraser;
        project.pointer_down(pos2(5.0, 5.0)).expect("down");
        project.pointer_leave();
        project.pointer_leave();
        project.pointer_up();
        assert_eq!(project.history().labels(), vec!["Open", "Eraser Stroke"]);
    }

    #[test]
    fn reorder_at_edge_is_not_a_history_event() {
        let mut project = Project::new(10, 10);
        let top = project.add_layer("top");
        let len = project.history().len();
        assert_eq!(project.reorder_layer(top, ReorderDirection::Up), Ok(false));
        assert_eq!(project.history().len(), len);
    }

    #[test]
    fn set_active_is_not_a_history_event() {
        let mut project = Project::new(10, 10);
        let base = project.active_layer_id();
        project.add_layer("");
        let len = project.history().len();
        project.set_active_layer(base).expect("activate");
        assert_eq!(project.history().len(), len);
        assert!(project.set_active_layer(LayerId(999)).is_err());
    }

    #[test]
    fn unknown_blend_name_leaves_layer_alone() {
        let mut project = Project::new(10, 10);
        let id = project.active_layer_id();
        assert_eq!(project.set_blend_mode_named(id, "luminosity"), Ok(false));
        assert_eq!(project.history().len(), 1);
        assert_eq!(project.set_blend_mode_named(id, "overlay"), Ok(true));
        assert_eq!(project.layer(id).map(|l| l.blend_mode), Some(BlendMode::Overlay));
    }

    #[test]
    fn undo_redo_round_trip_restores_stack() {
        let mut project = Project::new(40, 40);
        let id = project.add_layer("a");
        project.set_opacity(id, 0.3).expect("opacity");
        project.pointer_down(pos2(1.0, 1.0)).expect("down");
        project.pointer_up();
        let after = StackSnapshot::capture(project.stack());

        assert!(project.undo());
        assert!(project.undo());
        assert!(project.redo());
        assert!(project.redo());
        assert!(!project.redo());
        assert_eq!(StackSnapshot::capture(project.stack()), after);
    }

    #[test]
    fn import_failure_leaves_stack_untouched() {
        let mut project = Project::new(10, 10);
        assert!(matches!(
            project.import_image_bytes(b"nope", "broken"),
            Err(EditError::Decode(_))
        ));
        assert_eq!(project.stack().len(), 1);
        assert_eq!(project.history().len(), 1);
    }

    #[test]
    fn async_import_and_filter_apply_on_poll() {
        let mut project = Project::new(8, 8);
        let tile = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let png = io::encode_png(&tile).expect("png");
        project.import_image_async(png, "tile");
        project.import_image_async(b"junk".to_vec(), "junk");
        assert_eq!(project.wait_for_jobs(), 1);
        assert_eq!(project.pending_jobs(), 0);

        let id = project.active_layer_id();
        assert_eq!(project.layer(id).map(|l| l.name.as_str()), Some("tile"));
        project.apply_filter_async(id, FilterKind::Invert).expect("spawn");
        assert_eq!(project.wait_for_jobs(), 1);
        let Some(LayerContent::Image { pixels, .. }) = project.layer(id).map(|l| &l.content) else {
            panic!("image layer expected");
        };
        assert_eq!(*pixels.get_pixel(0, 0), Rgba([245, 235, 225, 255]));
        assert_eq!(project.history().undo_description(), Some("Filter: Invert"));
    }

    #[test]
    fn stale_filter_result_is_discarded() {
        let mut project = Project::new(8, 8);
        let png = io::encode_png(&RgbaImage::new(2, 2)).expect("png");
        let id = project.import_image_bytes(&png, "img").expect("import");
        project.apply_filter_async(id, FilterKind::Sepia).expect("spawn");
        project.delete_layer(id).expect("delete");
        let len = project.history().len();
        assert_eq!(project.wait_for_jobs(), 0);
        assert_eq!(project.history().len(), len);
    }

    #[test]
    fn filter_on_raster_layer_is_unsupported() {
        let mut project = Project::new(8, 8);
        let base = project.active_layer_id();
        assert!(matches!(
            project.apply_filter(base, FilterKind::Grayscale),
            Err(EditError::Unsupported { .. })
        ));
        assert!(project.apply_filter_async(base, FilterKind::Grayscale).is_err());
        assert_eq!(project.pending_jobs(), 0);
    }

    #[test]
    fn transient_scale_commits_as_one_resize() {
        let mut project = Project::new(300, 300);
        let id = project.add_shape(ShapeKind::Rect, pos2(10.0, 10.0)).expect("shape");
        let len = project.history().len();
        project.set_transient_scale(id, 0.5, 2.0).expect("preview");
        project.set_transient_scale(id, 0.25, 2.0).expect("preview");
        assert_eq!(project.history().len(), len);
        project.commit_transient_scale(id).expect("commit");
        assert_eq!(project.history().len(), len + 1);
        assert_eq!(
            project.layer(id).and_then(|l| l.size()),
            Some(egui::vec2(30.0, 160.0))
        );
    }

    #[test]
    fn committing_an_untouched_scale_records_nothing() {
        let mut project = Project::new(100, 100);
        let id = project.add_shape(ShapeKind::Ellipse, pos2(50.0, 50.0)).expect("shape");
        let len = project.history().len();
        project.commit_transient_scale(id).expect("commit");
        project.set_transient_scale(id, 1.0, 1.0).expect("preview");
        project.commit_transient_scale(id).expect("commit");
        assert_eq!(project.history().len(), len);

        let base = project.stack().order()[0];
        assert!(project.commit_transient_scale(base).is_err());
        assert_eq!(project.history().len(), len);
    }

    #[test]
    fn resize_preview_closes_an_open_stroke_first() {
        let mut project = Project::new(200, 200);
        let id = project.add_shape(ShapeKind::Rect, pos2(10.0, 10.0)).expect("shape");
        let base = project.stack().order()[0];
        project.set_active_layer(base).expect("activate");
        project.pointer_down(pos2(150.0, 150.0)).expect("down");
        project.set_transient_scale(id, 2.0, 2.0).expect("preview");
        assert!(!project.is_drawing());
        assert_eq!(project.history().undo_description(), Some("Brush Stroke"));

        // The recorded stroke snapshot holds the shape at its committed scale.
        assert!(project.undo());
        assert!(project.redo());
        let Some(LayerContent::Shape(shape)) = project.layer(id).map(|l| &l.content) else {
            panic!("expected shape content");
        };
        assert_eq!(shape.transient_scale, Vec2::splat(1.0));
    }

    #[test]
    fn export_is_a_png_of_the_composite() {
        let project = Project::new(3, 3);
        let bytes = project.export_png().expect("export");
        let decoded = io::decode_image(&bytes).expect("decode");
        assert_eq!(decoded, project.render());
    }
}
