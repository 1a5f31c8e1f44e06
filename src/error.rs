// Error taxonomy for the segmentation pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The asset request completed with a non-success HTTP status.
    #[error("asset request failed: HTTP {0}")]
    Network(u16),

    /// The asset request failed below the HTTP layer.
    #[error("asset transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The persistent store rejected an operation. Non-fatal: the cache
    /// downgrades to direct fetch for the rest of the session.
    #[error("blob store unavailable: {0}")]
    CacheUnavailable(String),

    /// The submitted file is not a decodable image.
    #[error("image not decodable: {0}")]
    Decode(String),

    /// The engine rejected the serialized model bytes.
    #[error("model load failed: {0}")]
    EngineLoad(String),

    /// A forward pass failed (shape/type mismatch or runtime error).
    #[error("inference failed: {0}")]
    Inference(String),

    /// The output tensor has an unexpected rank or length.
    #[error("unexpected output shape {0:?}")]
    OutputShape(Vec<usize>),

    /// A command was issued before the session reached `Ready`.
    #[error("session not ready: {0}")]
    NotReady(String),

    /// Mask export requested before any successful segmentation pass.
    #[error("no mask recorded")]
    NoMask,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
