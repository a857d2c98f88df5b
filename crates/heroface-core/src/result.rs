//! The pipeline's single return contract.

use crate::alignment::SimilarityTransform;
use crate::blend::BlendMethod;
use crate::compositor::Stage;
use crate::error::{CompositeError, ErrorKind};
use crate::types::BoundingBox;
use serde::ser::{Serialize, Serializer};
use std::path::{Path, PathBuf};

/// Details of a completed composite.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSuccess {
    pub output_path: PathBuf,
    pub blend_method: BlendMethod,
    pub hero_bbox: BoundingBox,
    pub page_bbox: BoundingBox,
    /// Hero-to-page transform; not part of the JSON line.
    pub transform: SimilarityTransform,
}

/// A failed composite and the last stage reached before it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeFailure {
    pub error: CompositeError,
    pub stage: Stage,
}

/// Outcome of one compositing invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeResult {
    Success(CompositeSuccess),
    Failure(CompositeFailure),
}

impl CompositeResult {
    pub fn failure(error: CompositeError, stage: Stage) -> Self {
        CompositeResult::Failure(CompositeFailure { error, stage })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CompositeResult::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CompositeResult::Success(_) => None,
            CompositeResult::Failure(f) => Some(f.error.kind()),
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        if self.is_ok() {
            0
        } else {
            1
        }
    }
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum WireResult<'a> {
    Success {
        ok: bool,
        output_path: &'a Path,
        blend_method: BlendMethod,
        hero_bbox: [f32; 4],
        page_bbox: [f32; 4],
        transform_applied: bool,
    },
    Failure {
        ok: bool,
        error: ErrorKind,
        message: &'a str,
    },
}

impl Serialize for CompositeResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            CompositeResult::Success(s) => WireResult::Success {
                ok: true,
                output_path: &s.output_path,
                blend_method: s.blend_method,
                hero_bbox: s.hero_bbox.to_array(),
                page_bbox: s.page_bbox.to_array(),
                transform_applied: true,
            },
            CompositeResult::Failure(f) => WireResult::Failure {
                ok: false,
                error: f.error.kind(),
                message: f.error.message(),
            },
        };
        wire.serialize(serializer)
    }
}
