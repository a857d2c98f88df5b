use heroface_core::DetectorConfig;
use std::path::PathBuf;

/// Detector configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Detector model file name within `model_dir`.
    pub detector_model: String,
    /// Square detector input side.
    pub det_size: usize,
    /// Minimum detection confidence.
    pub det_threshold: f32,
    /// IoU above which overlapping detections are suppressed.
    pub nms_threshold: f32,
    /// ONNX Runtime intra-op threads.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from `HEROFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("HEROFACE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| heroface_core::default_model_dir());

        Self {
            model_dir,
            detector_model: std::env::var("HEROFACE_DETECTOR_MODEL")
                .unwrap_or_else(|_| heroface_core::DEFAULT_DETECTOR_MODEL.to_string()),
            det_size: env_usize("HEROFACE_DET_SIZE", 640),
            det_threshold: env_f32("HEROFACE_DET_THRESHOLD", 0.5),
            nms_threshold: env_f32("HEROFACE_NMS_THRESHOLD", 0.4),
            intra_threads: env_usize("HEROFACE_INTRA_THREADS", 2),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            input_size: self.det_size,
            confidence_threshold: self.det_threshold,
            nms_threshold: self.nms_threshold,
            intra_threads: self.intra_threads.max(1),
            ..DetectorConfig::new(self.detector_model_path())
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
