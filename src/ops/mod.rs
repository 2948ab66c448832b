pub mod filters;
pub mod scripting;
pub mod shapes;
