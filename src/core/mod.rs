//! Band extraction and display processing

pub mod window;
pub mod extract;
pub mod normalize;
pub mod pipeline;

// Re-export main types
pub use window::pixel_window;
pub use extract::{BandExtractor, ExtractionParams};
pub use normalize::{normalize, normalize_array, to_preview_image};
pub use pipeline::{preview_scene, run_preview, search_scenes, select_scene, Preview, PreviewRequest};
