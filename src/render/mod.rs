//! Raster frame composition.

mod compose;
mod frame;

pub use compose::{FrameRenderer, render_frame};
pub use frame::RenderFrame;

#[cfg(test)]
#[path = "../../tests/unit/render.rs"]
mod tests;
