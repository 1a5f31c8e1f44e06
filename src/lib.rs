//! Sky-segmentation inference engine — fetch and cache a serialized network
//! asset once, then run per-image segmentation passes producing an intensity
//! overlay at the input image's resolution.
//!
//! The presentation layer drives a [`engine::session::SegmentationSession`]
//! through its command surface (`initialize`, `process_image`, `reset`,
//! `export_mask`) and consumes [`engine::session::PipelineEvent`]s.

pub mod config;
pub mod engine;
pub mod error;
pub mod source;
pub mod store;
pub mod tensor;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub use crate::config::PipelineConfig;
pub use crate::engine::session::{PipelineEvent, SegmentationSession, SessionState};
pub use crate::error::{PipelineError, Result};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for the hosting process. Safe to call repeatedly.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
