// ============================================================================
// GenBrush — generative photo-editing front end
// ============================================================================

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod generate;
pub mod io;
pub mod logger;
pub mod ops;
