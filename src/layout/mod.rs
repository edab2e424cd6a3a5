//! Grid geometry: where each tile sits inside the grid frame.

mod grid;

pub use grid::{GridLayout, layout};

#[cfg(test)]
#[path = "../../tests/unit/layout.rs"]
mod tests;
