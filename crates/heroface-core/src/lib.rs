//! heroface-core: landmark-aligned face compositing.
//!
//! Detects faces with SCRFD (via ONNX Runtime), aligns the hero face onto
//! the page's main face with a similarity transform, then masks, color
//! matches and blends it into the page.

pub mod alignment;
pub mod analyzer;
pub mod blend;
pub mod color;
pub mod compositor;
pub mod detector;
pub mod error;
pub mod mask;
pub mod result;
pub mod selection;
pub mod types;

use std::path::PathBuf;

pub use analyzer::{shared_detector, FaceAnalyzer};
pub use compositor::{CompositeRequest, Compositor, Stage};
pub use detector::{DetectorConfig, DetectorError, ScrfdDetector};
pub use error::{CompositeError, ErrorKind};
pub use result::{CompositeFailure, CompositeResult, CompositeSuccess};
pub use types::{BoundingBox, FaceCandidate, Landmarks, Point2};

/// Default model file name inside the model directory.
pub const DEFAULT_DETECTOR_MODEL: &str = "det_10g.onnx";

/// `$HOME/.insightface/models/buffalo_l`, where insightface installs its models.
pub fn default_model_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".insightface/models/buffalo_l")
}
