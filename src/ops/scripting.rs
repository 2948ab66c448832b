// ============================================================================
// Scripting: Rhai-based sandboxed driver for the editing session
// ============================================================================
//
// Scripts talk to the same layer-panel and tool surface a user would: every
// host function goes through a `Project` method, so scripted edits are logged,
// snapshotted and undoable exactly like interactive ones.
//
// Layer ids are plain integers in script land.  Editing failures (refused
// deletes, wrong layer kinds, bad colours) raise runtime errors, which scripts
// may catch with `try { ... } catch (e) { ... }`.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Instant;

use egui::{Pos2, pos2, vec2};
use rhai::{AST, Dynamic, Engine, EvalAltResult, Position, Scope};

use crate::canvas::{LayerId, parse_hex_color};
use crate::components::layers::ReorderDirection;
use crate::components::tools::Tool;
use crate::error::{EditError, EditResult};
use crate::ops::filters::FilterKind;
use crate::ops::shapes::{ShapeFillMode, ShapeKind};
use crate::project::Project;
use crate::{log_info, log_warn};

/// A session shared between the host and a running script.
pub type SharedProject = Arc<Mutex<Project>>;

type ConsoleBuffer = Arc<Mutex<Vec<String>>>;

type FnResult<T> = Result<T, Box<EvalAltResult>>;

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl ScriptError {
    fn at(message: String, pos: Position) -> Self {
        Self {
            message,
            line: pos.line().filter(|&l| l > 0),
            column: pos.position().filter(|&c| c > 0),
        }
    }

    /// Error explanation with location context and a hint where one helps.
    pub fn friendly_message(&self) -> String {
        let raw = self.message.as_str();
        let cleaned = raw.split(" (line ").next().unwrap_or(raw).trim();
        let mut parts = Vec::new();

        match (self.line, self.column) {
            (Some(line), Some(col)) => {
                parts.push(format!("Error on line {}, column {}:", line, col))
            }
            (Some(line), None) => parts.push(format!("Error on line {}:", line)),
            _ => parts.push("Script error:".to_string()),
        }

        if let Some(fn_desc) = cleaned.strip_prefix("Function not found: ") {
            parts.push(format!("  Could not find function: {}", fn_desc));
            parts.push(String::new());
            parts.push("  Tip: Coordinates and sizes accept ints or floats, but both".to_string());
            parts.push("  arguments of a pair must share a type:".to_string());
            parts.push("  (10, 20) or (10.0, 20.5).".to_string());
        } else if cleaned.contains("Variable not found:") {
            parts.push(format!("  {}", cleaned));
            parts.push(String::new());
            parts.push("  Tip: Declare variables with 'let' before using them.".to_string());
        } else if cleaned.contains("Too many operations") {
            parts.push(
                "  Script exceeded the maximum operation limit (50 million ops).".to_string(),
            );
            parts.push(String::new());
            parts.push("  Tip: Look for a loop that never ends.".to_string());
        } else if raw.contains("cancelled") || raw.contains("terminated") {
            parts.push("  Script was cancelled.".to_string());
        } else {
            parts.push(format!("  {}", cleaned));
        }

        parts.join("\n")
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "Line {}, Col {}: {}", line, col, self.message)
        } else if let Some(line) = self.line {
            write!(f, "Line {}: {}", line, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ScriptError {}

/// What a finished script left behind besides its edits.
#[derive(Debug, Clone, Default)]
pub struct ScriptReport {
    pub console_output: Vec<String>,
    pub elapsed_ms: u64,
}

// ============================================================================
// Engine construction with sandbox + API registration
// ============================================================================

fn create_engine(
    project: SharedProject,
    console: ConsoleBuffer,
    cancelled: Arc<AtomicBool>,
) -> Engine {
    let mut engine = Engine::new();

    // ── Sandbox limits ──
    engine.set_max_operations(50_000_000);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(1_000);

    engine.on_progress(move |_ops| {
        if cancelled.load(Ordering::Relaxed) {
            Some(Dynamic::from("Script cancelled by user".to_string()))
        } else {
            None
        }
    });

    let c = console.clone();
    engine.on_print(move |msg| {
        log_info!("[script] {}", msg);
        c.lock().unwrap_or_else(|e| e.into_inner()).push(msg.to_string());
    });

    register_layer_api(&mut engine, project.clone());
    register_tool_api(&mut engine, project.clone());
    register_pointer_api(&mut engine, project.clone());
    register_shape_api(&mut engine, project.clone());
    register_document_api(&mut engine, project);

    engine
}

/// Lock the session and run one edit, turning an `EditError` into a script
/// runtime error.
fn with_project<T>(
    project: &SharedProject,
    f: impl FnOnce(&mut Project) -> EditResult<T>,
) -> FnResult<T> {
    let mut lock = project.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut lock).map_err(|e| e.to_string().into())
}

fn layer_id(id: i64) -> LayerId {
    // Ids start at 1, so a negative id maps onto one that never exists.
    LayerId(id.max(0) as u64)
}

fn script_id(id: LayerId) -> i64 {
    id.0 as i64
}

// ============================================================================
// Layer panel API
// ============================================================================

fn register_layer_api(engine: &mut Engine, ctx: SharedProject) {
    let c = ctx.clone();
    engine.register_fn("layer_count", move || -> i64 {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.stack().len() as i64
    });

    let c = ctx.clone();
    engine.register_fn("active_layer", move || -> i64 {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        script_id(lock.active_layer_id())
    });

    // Bottom-to-top ids, for scripts that walk the whole stack.
    let c = ctx.clone();
    engine.register_fn("layer_ids", move || -> rhai::Array {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.stack()
            .order()
            .iter()
            .map(|&id| Dynamic::from(script_id(id)))
            .collect()
    });

    let c = ctx.clone();
    engine.register_fn("add_layer", move |name: &str| -> i64 {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        script_id(lock.add_layer(name))
    });

    let c = ctx.clone();
    engine.register_fn("add_layer", move || -> i64 {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        script_id(lock.add_layer(""))
    });

    let c = ctx.clone();
    engine.register_fn("delete_layer", move |id: i64| -> FnResult<()> {
        with_project(&c, |p| p.delete_layer(layer_id(id)))
    });

    for (name, direction) in [
        ("move_layer_up", ReorderDirection::Up),
        ("move_layer_down", ReorderDirection::Down),
    ] {
        let c = ctx.clone();
        engine.register_fn(name, move |id: i64| -> FnResult<bool> {
            with_project(&c, |p| p.reorder_layer(layer_id(id), direction))
        });
    }

    let c = ctx.clone();
    engine.register_fn("merge_up", move |id: i64| -> FnResult<i64> {
        with_project(&c, |p| p.merge_up(layer_id(id)).map(script_id))
    });

    let c = ctx.clone();
    engine.register_fn("merge_down", move |id: i64| -> FnResult<i64> {
        with_project(&c, |p| p.merge_down(layer_id(id)).map(script_id))
    });

    let c = ctx.clone();
    engine.register_fn("toggle_visibility", move |id: i64| -> FnResult<bool> {
        with_project(&c, |p| p.toggle_visibility(layer_id(id)))
    });

    let c = ctx.clone();
    engine.register_fn("set_visible", move |id: i64, visible: bool| -> FnResult<()> {
        with_project(&c, |p| p.set_visibility(layer_id(id), visible))
    });

    let c = ctx.clone();
    engine.register_fn("is_visible", move |id: i64| -> FnResult<bool> {
        with_project(&c, |p| {
            let id = layer_id(id);
            p.layer(id)
                .map(|l| l.visible)
                .ok_or(EditError::UnknownLayer(id))
        })
    });

    let c = ctx.clone();
    engine.register_fn("set_opacity", move |id: i64, opacity: f64| -> FnResult<f64> {
        with_project(&c, |p| p.set_opacity(layer_id(id), opacity as f32).map(f64::from))
    });

    let c = ctx.clone();
    engine.register_fn("set_opacity", move |id: i64, opacity: i64| -> FnResult<f64> {
        with_project(&c, |p| p.set_opacity(layer_id(id), opacity as f32).map(f64::from))
    });

    // Unknown mode names leave the layer alone and return false.
    let c = ctx.clone();
    engine.register_fn("set_blend", move |id: i64, mode: &str| -> FnResult<bool> {
        with_project(&c, |p| p.set_blend_mode_named(layer_id(id), mode))
    });

    let c = ctx.clone();
    engine.register_fn("set_active", move |id: i64| -> FnResult<()> {
        with_project(&c, |p| p.set_active_layer(layer_id(id)))
    });

    let c = ctx.clone();
    engine.register_fn("rename_layer", move |id: i64, name: &str| -> FnResult<()> {
        with_project(&c, |p| p.rename_layer(layer_id(id), name))
    });

    let c = ctx;
    engine.register_fn("layer_name", move |id: i64| -> FnResult<String> {
        with_project(&c, |p| {
            let id = layer_id(id);
            p.layer(id)
                .map(|l| l.name.clone())
                .ok_or(EditError::UnknownLayer(id))
        })
    });
}

// ============================================================================
// Tool / brush controls
// ============================================================================

fn register_tool_api(engine: &mut Engine, ctx: SharedProject) {
    let c = ctx.clone();
    engine.register_fn("set_tool", move |name: &str| -> FnResult<()> {
        let tool = Tool::from_name(name).ok_or_else(|| format!("unknown tool '{}'", name))?;
        c.lock().unwrap_or_else(|e| e.into_inner()).tools.tool = tool;
        Ok(())
    });

    let c = ctx.clone();
    engine.register_fn("set_color", move |hex: &str| -> FnResult<()> {
        let color = parse_hex_color(hex).ok_or_else(|| format!("invalid colour '{}'", hex))?;
        c.lock().unwrap_or_else(|e| e.into_inner()).tools.color = color;
        Ok(())
    });

    let c = ctx.clone();
    engine.register_fn("set_secondary_color", move |hex: &str| -> FnResult<()> {
        let color = parse_hex_color(hex).ok_or_else(|| format!("invalid colour '{}'", hex))?;
        c.lock().unwrap_or_else(|e| e.into_inner()).tools.secondary_color = color;
        Ok(())
    });

    let c = ctx.clone();
    engine.register_fn("set_size", move |size: f64| {
        c.lock().unwrap_or_else(|e| e.into_inner()).tools.set_size(size as f32);
    });

    let c = ctx.clone();
    engine.register_fn("set_size", move |size: i64| {
        c.lock().unwrap_or_else(|e| e.into_inner()).tools.set_size(size as f32);
    });

    let c = ctx.clone();
    engine.register_fn("set_brush_opacity", move |opacity: f64| {
        c.lock().unwrap_or_else(|e| e.into_inner()).tools.set_opacity(opacity as f32);
    });

    let c = ctx.clone();
    engine.register_fn("set_shape_fill", move |name: &str| -> FnResult<()> {
        let mode = ShapeFillMode::from_name(name)
            .ok_or_else(|| format!("unknown fill mode '{}'", name))?;
        c.lock().unwrap_or_else(|e| e.into_inner()).tools.shape_fill = mode;
        Ok(())
    });

    // pan(dx, dy) in screen pixels; zoom(factor) multiplies the current zoom.
    let c = ctx.clone();
    engine.register_fn("pan", move |dx: f64, dy: f64| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.viewport.pan_by(vec2(dx as f32, dy as f32));
    });

    let c = ctx.clone();
    engine.register_fn("pan", move |dx: i64, dy: i64| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.viewport.pan_by(vec2(dx as f32, dy as f32));
    });

    let c = ctx.clone();
    engine.register_fn("zoom", move |factor: f64| {
        c.lock().unwrap_or_else(|e| e.into_inner()).viewport.apply_zoom(factor as f32);
    });

    let c = ctx;
    engine.register_fn("reset_view", move || {
        c.lock().unwrap_or_else(|e| e.into_inner()).viewport.reset_zoom();
    });
}

// ============================================================================
// Pointer events (screen coordinates, mapped through the viewport)
// ============================================================================

/// Register `name(x, y)` for both float and int coordinates.
fn register_point_fn(
    engine: &mut Engine,
    ctx: &SharedProject,
    name: &str,
    f: fn(&mut Project, Pos2) -> EditResult<()>,
) {
    let c = ctx.clone();
    engine.register_fn(name, move |x: f64, y: f64| -> FnResult<()> {
        with_project(&c, |p| f(p, pos2(x as f32, y as f32)))
    });
    let c = ctx.clone();
    engine.register_fn(name, move |x: i64, y: i64| -> FnResult<()> {
        with_project(&c, |p| f(p, pos2(x as f32, y as f32)))
    });
}

fn register_pointer_api(engine: &mut Engine, ctx: SharedProject) {
    register_point_fn(engine, &ctx, "pointer_down", Project::pointer_down);
    register_point_fn(engine, &ctx, "pointer_move", Project::pointer_move);

    let c = ctx.clone();
    engine.register_fn("pointer_up", move || {
        c.lock().unwrap_or_else(|e| e.into_inner()).pointer_up();
    });

    let c = ctx;
    engine.register_fn("pointer_leave", move || {
        c.lock().unwrap_or_else(|e| e.into_inner()).pointer_leave();
    });
}

// ============================================================================
// Shapes and filters
// ============================================================================

fn register_shape_api(engine: &mut Engine, ctx: SharedProject) {
    let c = ctx.clone();
    engine.register_fn("add_shape", move |kind: &str, x: f64, y: f64| -> FnResult<i64> {
        let kind = ShapeKind::from_name(kind).ok_or_else(|| format!("unknown shape '{}'", kind))?;
        with_project(&c, |p| p.add_shape(kind, pos2(x as f32, y as f32)).map(script_id))
    });

    let c = ctx.clone();
    engine.register_fn("add_shape", move |kind: &str, x: i64, y: i64| -> FnResult<i64> {
        let kind = ShapeKind::from_name(kind).ok_or_else(|| format!("unknown shape '{}'", kind))?;
        with_project(&c, |p| p.add_shape(kind, pos2(x as f32, y as f32)).map(script_id))
    });

    let c = ctx.clone();
    engine.register_fn("move_shape", move |id: i64, x: f64, y: f64| -> FnResult<()> {
        with_project(&c, |p| p.move_shape(layer_id(id), pos2(x as f32, y as f32)))
    });

    let c = ctx.clone();
    engine.register_fn("move_shape", move |id: i64, x: i64, y: i64| -> FnResult<()> {
        with_project(&c, |p| p.move_shape(layer_id(id), pos2(x as f32, y as f32)))
    });

    let c = ctx.clone();
    engine.register_fn("resize_shape", move |id: i64, sx: f64, sy: f64| -> FnResult<()> {
        with_project(&c, |p| p.resize_shape(layer_id(id), sx as f32, sy as f32))
    });

    let c = ctx;
    engine.register_fn("apply_filter", move |id: i64, name: &str| -> FnResult<()> {
        let kind = FilterKind::from_name(name).ok_or_else(|| format!("unknown filter '{}'", name))?;
        with_project(&c, |p| p.apply_filter(layer_id(id), kind))
    });
}

// ============================================================================
// Document: import, history, canvas info
// ============================================================================

fn register_document_api(engine: &mut Engine, ctx: SharedProject) {
    let c = ctx.clone();
    engine.register_fn("canvas_width", move || -> i64 {
        c.lock().unwrap_or_else(|e| e.into_inner()).stack().width() as i64
    });

    let c = ctx.clone();
    engine.register_fn("canvas_height", move || -> i64 {
        c.lock().unwrap_or_else(|e| e.into_inner()).stack().height() as i64
    });

    let c = ctx.clone();
    engine.register_fn("import_image", move |path: &str| -> FnResult<i64> {
        with_project(&c, |p| p.import_image_file(std::path::Path::new(path)).map(script_id))
    });

    let c = ctx.clone();
    engine.register_fn("set_background", move |hex: &str| -> FnResult<()> {
        let color = parse_hex_color(hex).ok_or_else(|| format!("invalid colour '{}'", hex))?;
        c.lock().unwrap_or_else(|e| e.into_inner()).set_background(color);
        Ok(())
    });

    let c = ctx.clone();
    engine.register_fn("undo", move || -> bool {
        c.lock().unwrap_or_else(|e| e.into_inner()).undo()
    });

    let c = ctx.clone();
    engine.register_fn("redo", move || -> bool {
        c.lock().unwrap_or_else(|e| e.into_inner()).redo()
    });

    let c = ctx;
    engine.register_fn("history_len", move || -> i64 {
        c.lock().unwrap_or_else(|e| e.into_inner()).history().len() as i64
    });
}

// ============================================================================
// Public execution API
// ============================================================================

/// Compile a script without running it, to report syntax errors early.
pub fn compile_script(source: &str) -> Result<AST, ScriptError> {
    let engine = Engine::new();
    engine
        .compile(source)
        .map_err(|e| ScriptError::at(e.to_string(), e.position()))
}

/// Run `source` against the shared session on the current thread.
pub fn execute_script(project: &SharedProject, source: &str) -> Result<ScriptReport, ScriptError> {
    execute_script_with_cancel(project, source, Arc::new(AtomicBool::new(false)))
}

/// Like [`execute_script`], stopping at the next operation once `cancel` is set.
///
/// Edits made before a failure stay applied; each one already has its own
/// history entry.  A gesture left open by the script is closed either way.
pub fn execute_script_with_cancel(
    project: &SharedProject,
    source: &str,
    cancel: Arc<AtomicBool>,
) -> Result<ScriptReport, ScriptError> {
    let start = Instant::now();
    let console: ConsoleBuffer = Arc::new(Mutex::new(Vec::new()));
    let engine = create_engine(project.clone(), console.clone(), cancel);
    let mut scope = Scope::new();

    let result = engine
        .compile(source)
        .map_err(|e| ScriptError::at(e.to_string(), e.position()))
        .and_then(|ast| {
            engine
                .run_ast_with_scope(&mut scope, &ast)
                .map_err(|e| ScriptError::at(e.to_string(), e.position()))
        });

    project.lock().unwrap_or_else(|e| e.into_inner()).pointer_up();

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            log_info!("[script] finished in {} ms", elapsed_ms);
            let mut lines = console.lock().unwrap_or_else(|e| e.into_inner());
            let console_output = std::mem::take(&mut *lines);
            drop(lines);
            Ok(ScriptReport {
                console_output,
                elapsed_ms,
            })
        }
        Err(e) => {
            log_warn!("[script] failed after {} ms: {}", elapsed_ms, e);
            Err(e)
        }
    }
}
