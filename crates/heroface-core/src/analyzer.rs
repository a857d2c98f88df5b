//! The face-analysis capability consumed by the compositor.

use crate::detector::{DetectorConfig, DetectorError, ScrfdDetector};
use crate::types::FaceCandidate;
use image::RgbImage;
use std::sync::OnceLock;

/// Anything that can find faces with five-point landmarks in an image.
///
/// Implementations must be safe for repeated read-only use; the compositor
/// never mutates an analyzer.
pub trait FaceAnalyzer {
    /// Faces found in `image`, possibly none, each with ordered landmarks.
    fn analyze(&self, image: &RgbImage) -> Result<Vec<FaceCandidate>, DetectorError>;
}

impl<T: FaceAnalyzer + ?Sized> FaceAnalyzer for &T {
    fn analyze(&self, image: &RgbImage) -> Result<Vec<FaceCandidate>, DetectorError> {
        (**self).analyze(image)
    }
}

static SHARED_DETECTOR: OnceLock<Result<ScrfdDetector, DetectorError>> = OnceLock::new();

/// The process-wide detector, loaded on first use.
///
/// Loading happens at most once. A failed load is cached too, so later calls
/// return the same error without touching the model again. `config` only
/// matters on the first call.
pub fn shared_detector(
    config: &DetectorConfig,
) -> Result<&'static ScrfdDetector, &'static DetectorError> {
    SHARED_DETECTOR
        .get_or_init(|| {
            let loaded = ScrfdDetector::load(config);
            if let Err(err) = &loaded {
                tracing::warn!(error = %err, "face detector unavailable");
            }
            loaded
        })
        .as_ref()
}
