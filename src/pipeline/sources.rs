use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["jpeg", "jpg", "png"];

/// Ordered source list `image_{start:02}` ..= `image_{end:02}` in `dir`.
///
/// For each number the first existing extension of `.jpeg`, `.jpg`, `.png` wins. Missing
/// numbers are skipped with a warning; the caller decides whether what is left is enough.
pub fn discover_sources(dir: &Path, start: u32, end: u32) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for i in start..=end {
        let found = EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("image_{i:02}.{ext}")))
            .find(|p| p.is_file());
        match found {
            Some(path) => out.push(path),
            None => tracing::warn!(
                dir = %dir.display(),
                number = i,
                "source image missing, skipping"
            ),
        }
    }
    out
}
