use crate::foundation::core::{FrameIndex, Rgb8, Size};

/// One output frame: packed RGB24, row-major, exactly `width * height * 3` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderFrame {
    /// Output frame index.
    pub index: FrameIndex,
    /// Frame size.
    pub size: Size,
    /// Pixel bytes.
    pub data: Vec<u8>,
}

impl RenderFrame {
    /// A frame filled with `color`.
    pub fn filled(index: FrameIndex, size: Size, color: Rgb8) -> Self {
        let rgb = color.to_array();
        let mut data = Vec::with_capacity(size.rgb_len());
        for _ in 0..(size.width as usize) * (size.height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self { index, size, data }
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        (self.size.width as usize) * 3
    }

    /// Pixel at `(x, y)`, if inside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let at = (y as usize) * self.stride() + (x as usize) * 3;
        Some([self.data[at], self.data[at + 1], self.data[at + 2]])
    }

    /// Whether the buffer length matches the size.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.size.rgb_len()
    }
}
