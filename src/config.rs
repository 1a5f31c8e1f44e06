use serde::Deserialize;

/// Square resolution consumed and produced by the network. Inputs are
/// stretched to this size regardless of aspect ratio.
pub const MODEL_INPUT_SIZE: u32 = 320;

/// Per-channel normalization means the network was trained with.
pub const NORM_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel normalization standard deviations.
pub const NORM_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Default location of the serialized model asset.
pub const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/voyagerfromeast/skyseg/resolve/main/skyseg_fp16.onnx";

/// Versioned namespace for the persistent store. Bumping it orphans every
/// previously cached asset; there is no per-entry expiry.
pub const CACHE_GENERATION: &str = "sky-seg-model-v1";

/// Minimum interval between UI-facing progress events (one display frame).
pub const PROGRESS_FRAME_MILLIS: u64 = 16;

/// Top-level configuration for the segmentation pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// URL of the serialized model asset.
    pub model_url: String,
    /// Directory used for persistently cached assets.
    pub cache_dir: String,
    /// Cache generation identifier (versioned namespace).
    pub generation: String,
    /// Square side length of the network input/output.
    pub input_size: u32,
    /// Per-channel normalization means. Override only when substituting a
    /// network asset trained with different statistics.
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviations.
    pub std: [f32; 3],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_string(),
            cache_dir: String::new(),
            generation: CACHE_GENERATION.to_string(),
            input_size: MODEL_INPUT_SIZE,
            mean: NORM_MEAN,
            std: NORM_STD,
        }
    }
}
