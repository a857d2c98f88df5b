use crate::detector::DetectorError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal failure categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DependenciesMissing,
    FaceDetectorUnavailable,
    HeroHeadNotFound,
    PageImageNotFound,
    NoFaceInHero,
    NoFaceInPage,
    PageFaceDetectionFailed,
    TransformFailed,
    OutputWriteFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DependenciesMissing => "DEPENDENCIES_MISSING",
            ErrorKind::FaceDetectorUnavailable => "FACE_DETECTOR_UNAVAILABLE",
            ErrorKind::HeroHeadNotFound => "HERO_HEAD_NOT_FOUND",
            ErrorKind::PageImageNotFound => "PAGE_IMAGE_NOT_FOUND",
            ErrorKind::NoFaceInHero => "NO_FACE_IN_HERO",
            ErrorKind::NoFaceInPage => "NO_FACE_IN_PAGE",
            ErrorKind::PageFaceDetectionFailed => "PAGE_FACE_DETECTION_FAILED",
            ErrorKind::TransformFailed => "TRANSFORM_FAILED",
            ErrorKind::OutputWriteFailed => "OUTPUT_WRITE_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline failure: one [`ErrorKind`] plus a human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    #[error("{0}")]
    DependenciesMissing(String),
    #[error("{0}")]
    FaceDetectorUnavailable(String),
    #[error("{0}")]
    HeroHeadNotFound(String),
    #[error("{0}")]
    PageImageNotFound(String),
    #[error("{0}")]
    NoFaceInHero(String),
    #[error("{0}")]
    NoFaceInPage(String),
    #[error("{0}")]
    PageFaceDetectionFailed(String),
    #[error("{0}")]
    TransformFailed(String),
    #[error("{0}")]
    OutputWriteFailed(String),
}

impl CompositeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompositeError::DependenciesMissing(_) => ErrorKind::DependenciesMissing,
            CompositeError::FaceDetectorUnavailable(_) => ErrorKind::FaceDetectorUnavailable,
            CompositeError::HeroHeadNotFound(_) => ErrorKind::HeroHeadNotFound,
            CompositeError::PageImageNotFound(_) => ErrorKind::PageImageNotFound,
            CompositeError::NoFaceInHero(_) => ErrorKind::NoFaceInHero,
            CompositeError::NoFaceInPage(_) => ErrorKind::NoFaceInPage,
            CompositeError::PageFaceDetectionFailed(_) => ErrorKind::PageFaceDetectionFailed,
            CompositeError::TransformFailed(_) => ErrorKind::TransformFailed,
            CompositeError::OutputWriteFailed(_) => ErrorKind::OutputWriteFailed,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CompositeError::DependenciesMissing(m)
            | CompositeError::FaceDetectorUnavailable(m)
            | CompositeError::HeroHeadNotFound(m)
            | CompositeError::PageImageNotFound(m)
            | CompositeError::NoFaceInHero(m)
            | CompositeError::NoFaceInPage(m)
            | CompositeError::PageFaceDetectionFailed(m)
            | CompositeError::TransformFailed(m)
            | CompositeError::OutputWriteFailed(m) => m,
        }
    }

    /// Classify a detector load failure: a missing model file means the
    /// install is incomplete; anything else means the runtime is broken.
    pub fn from_detector_init(err: &DetectorError) -> Self {
        match err {
            DetectorError::ModelNotFound(_) => CompositeError::DependenciesMissing(format!(
                "Required face model not installed: {err}"
            )),
            _ => CompositeError::FaceDetectorUnavailable(format!(
                "Face detector failed to initialize: {err}"
            )),
        }
    }
}
