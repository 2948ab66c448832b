//! StrataPaint editing engine: a stack of layers composited bottom-to-top,
//! with snapshot undo/redo.  [`project::Project`] is the entry point for edits.

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod error;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;
