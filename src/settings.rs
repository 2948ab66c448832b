//! Persistent editor defaults, stored as `key=value` lines.
//!
//! Unknown keys are skipped and malformed values fall back to their defaults,
//! so an old or hand-edited file never prevents startup.

use std::path::{Path, PathBuf};

use image::Rgba;

use crate::canvas::{parse_hex_color, to_hex_color};
use crate::components::history::DEFAULT_MAX_HISTORY;

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Snapshot cap; 0 keeps every snapshot.
    pub max_history: usize,
    /// Colour the compositor starts from; `#00000000` for transparent export.
    pub background: Rgba<u8>,
    pub default_brush_color: Rgba<u8>,
    pub default_brush_size: f32,
    pub default_brush_opacity: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            canvas_width: 800,
            canvas_height: 600,
            max_history: DEFAULT_MAX_HISTORY,
            background: Rgba([255, 255, 255, 255]),
            default_brush_color: Rgba([0, 0, 0, 255]),
            default_brush_size: 6.0,
            default_brush_opacity: 1.0,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/stratapaint/stratapaint_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\StrataPaint\stratapaint_settings.cfg
    /// On macOS:   ~/Library/Application Support/StrataPaint/stratapaint_settings.cfg
    pub fn settings_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("stratapaint")
                .join("stratapaint_settings.cfg")
        }
        #[cfg(not(target_os = "linux"))]
        {
            crate::logger::data_dir()
                .join("StrataPaint")
                .join("stratapaint_settings.cfg")
        }
    }

    /// Serialise to the `.cfg` text format.
    pub fn to_config_string(&self) -> String {
        format!(
            "canvas_width={}\n\
             canvas_height={}\n\
             max_history={}\n\
             background={}\n\
             default_brush_color={}\n\
             default_brush_size={}\n\
             default_brush_opacity={}\n",
            self.canvas_width,
            self.canvas_height,
            self.max_history,
            to_hex_color(self.background),
            to_hex_color(self.default_brush_color),
            self.default_brush_size,
            self.default_brush_opacity,
        )
    }

    /// Parse the `.cfg` text format; anything missing or malformed keeps its default.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "canvas_width" => {
                    if let Ok(v) = val.parse::<u32>()
                        && v > 0
                    {
                        s.canvas_width = v;
                    }
                }
                "canvas_height" => {
                    if let Ok(v) = val.parse::<u32>()
                        && v > 0
                    {
                        s.canvas_height = v;
                    }
                }
                "max_history" => {
                    s.max_history = val.parse().unwrap_or(DEFAULT_MAX_HISTORY);
                }
                "background" => {
                    if let Some(c) = parse_hex_color(val) {
                        s.background = c;
                    }
                }
                "default_brush_color" => {
                    if let Some(c) = parse_hex_color(val) {
                        s.default_brush_color = c;
                    }
                }
                "default_brush_size" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                        && v > 0.0
                    {
                        s.default_brush_size = v;
                    }
                }
                "default_brush_opacity" => {
                    if let Ok(v) = val.parse::<f32>()
                        && !v.is_nan()
                    {
                        s.default_brush_opacity = v.clamp(0.0, 1.0);
                    }
                }
                _ => {}
            }
        }
        s
    }

    /// Load settings from `path` (returns default if file missing or unreadable)
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn load() -> Self {
        Self::load_from(&Self::settings_path())
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("s.cfg");
        let settings = EditorSettings {
            canvas_width: 320,
            max_history: 12,
            background: Rgba([0, 0, 0, 0]),
            default_brush_size: 14.5,
            ..EditorSettings::default()
        };
        settings.save_to(&path).expect("save");
        assert_eq!(EditorSettings::load_from(&path), settings);
    }

    #[test]
    fn corrupt_values_fall_back_to_defaults() {
        let s = EditorSettings::from_config_str(
            "canvas_width=wide\ncanvas_height=0\nbackground=#nothex\n\
             default_brush_opacity=7\nmystery=1\nno equals sign\n",
        );
        let d = EditorSettings::default();
        assert_eq!(s.canvas_width, d.canvas_width);
        assert_eq!(s.canvas_height, d.canvas_height);
        assert_eq!(s.background, d.background);
        assert_eq!(s.default_brush_opacity, 1.0);
    }

    #[test]
    fn history_is_unbounded_unless_capped() {
        assert_eq!(EditorSettings::default().max_history, 0);
        let s = EditorSettings::from_config_str("max_history=0\n");
        assert_eq!(s.max_history, 0);
        let s = EditorSettings::from_config_str("max_history=lots\n");
        assert_eq!(s.max_history, DEFAULT_MAX_HISTORY);
        let s = EditorSettings::from_config_str("max_history=40\n");
        assert_eq!(s.max_history, 40);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = EditorSettings::load_from(&dir.path().join("absent.cfg"));
        assert_eq!(s, EditorSettings::default());
    }
}
