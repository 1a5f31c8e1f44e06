// Engine orchestration — asset acquisition, model lifecycle, per-image passes.

pub mod asset_cache;
pub mod backend;
pub mod onnx;
pub mod session;
