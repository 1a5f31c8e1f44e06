// Inference seam — the session treats the runtime as an opaque capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::tensor::Tensor;

/// A loaded, immutable model ready to execute forward passes.
///
/// Input and output names are properties of the loaded asset, discovered from
/// its graph. Callers address tensors through the first declared name of each
/// list, never through a hardcoded string.
pub trait ModelHandle: Send + Sync {
    /// Declared graph input names, in declaration order.
    fn input_names(&self) -> &[String];

    /// Declared graph output names, in declaration order.
    fn output_names(&self) -> &[String];

    /// Execute one forward pass. Deterministic for identical inputs.
    fn run(&self, inputs: Vec<(String, Tensor)>) -> Result<Vec<(String, Tensor)>>;
}

/// Factory capability turning serialized model bytes into a runnable handle.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn load(&self, model_bytes: &[u8]) -> Result<Arc<dyn ModelHandle>>;
}
