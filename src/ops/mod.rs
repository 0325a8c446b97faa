pub mod adjustments;
pub mod mask;
pub mod overlay;
pub mod text;
