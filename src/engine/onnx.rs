// tract-onnx backend — pure-Rust execution of the serialized network.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use tract_onnx::prelude::{Graph, SimplePlan, TypedFact, TypedOp};
use tracing::info;

use super::backend::{InferenceBackend, ModelHandle};
use crate::error::{PipelineError, Result};
use crate::tensor::Tensor;

type RunnablePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Backend that parses ONNX bytes with tract, pinning the declared input to
/// `[1, 3, size, size]` f32.
pub struct OnnxBackend {
    input_size: u32,
    optimize: bool,
}

impl OnnxBackend {
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            optimize: true,
        }
    }

    /// Skip graph optimization at load. Execution stays identical, only
    /// slower; useful when diagnosing an asset that fails to optimize.
    pub fn without_optimization(mut self) -> Self {
        self.optimize = false;
        self
    }
}

#[async_trait]
impl InferenceBackend for OnnxBackend {
    async fn load(&self, model_bytes: &[u8]) -> Result<Arc<dyn ModelHandle>> {
        use tract_onnx::prelude::*;

        let s = self.input_size as usize;

        let inference_model = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(model_bytes))
            .map_err(|e| PipelineError::EngineLoad(e.to_string()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, s, s)),
            )
            .map_err(|e| PipelineError::EngineLoad(e.to_string()))?;

        let plan: RunnablePlan = if self.optimize {
            inference_model
                .into_optimized()
                .map_err(|e| PipelineError::EngineLoad(e.to_string()))?
                .into_runnable()
                .map_err(|e| PipelineError::EngineLoad(e.to_string()))?
        } else {
            inference_model
                .into_typed()
                .map_err(|e| PipelineError::EngineLoad(e.to_string()))?
                .into_runnable()
                .map_err(|e| PipelineError::EngineLoad(e.to_string()))?
        };

        let graph = plan.model();
        let input_names: Vec<String> = graph
            .inputs
            .iter()
            .map(|outlet| graph.node(outlet.node).name.clone())
            .collect();
        let output_names: Vec<String> = graph
            .outputs
            .iter()
            .map(|outlet| {
                graph
                    .outlet_label(*outlet)
                    .map(str::to_string)
                    .unwrap_or_else(|| graph.node(outlet.node).name.clone())
            })
            .collect();

        info!(
            "model loaded: inputs={:?} outputs={:?}",
            input_names, output_names
        );

        Ok(Arc::new(OnnxModel {
            plan,
            input_names,
            output_names,
        }))
    }
}

/// A planned tract graph. Immutable and shareable; `run` borrows it read-only.
struct OnnxModel {
    plan: RunnablePlan,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl ModelHandle for OnnxModel {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    fn run(&self, inputs: Vec<(String, Tensor)>) -> Result<Vec<(String, Tensor)>> {
        use tract_onnx::prelude::*;

        // tract feeds are positional; match the named inputs to the graph's
        // declaration order.
        let mut feeds: TVec<TValue> = tvec!();
        for name in &self.input_names {
            let (_, tensor) = inputs
                .iter()
                .find(|(n, _)| n == name)
                .ok_or_else(|| PipelineError::Inference(format!("missing input tensor '{name}'")))?;
            let value = tract_onnx::prelude::Tensor::from_shape(&tensor.shape, &tensor.data)
                .map_err(|e| PipelineError::Inference(e.to_string()))?;
            feeds.push(value.into());
        }

        let outputs = self
            .plan
            .run(feeds)
            .map_err(|e| PipelineError::Inference(e.to_string()))?;

        let mut named = Vec::with_capacity(outputs.len());
        for (name, value) in self.output_names.iter().zip(outputs.iter()) {
            let view = value
                .to_array_view::<f32>()
                .map_err(|e| PipelineError::Inference(e.to_string()))?;
            let data: Vec<f32> = view.iter().copied().collect();
            named.push((
                name.clone(),
                crate::tensor::Tensor::new(value.shape().to_vec(), data),
            ));
        }
        Ok(named)
    }
}
