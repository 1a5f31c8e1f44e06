// Numeric contract between raster pixels and the network's tensor layout.

pub mod postprocess;
pub mod preprocess;
pub mod raster;

/// Flat f32 tensor with an explicit shape.
///
/// Invariant: `data.len()` equals the product of `shape`. Tensors are owned
/// by the pipeline invocation that created them and discarded afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
