//! Time to grid position mapping.

mod timeline;

pub use timeline::{AnimationTimeline, offset, slide_progress};

#[cfg(test)]
#[path = "../../tests/unit/animation.rs"]
mod tests;
