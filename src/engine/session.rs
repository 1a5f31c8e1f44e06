// Segmentation session state machine — one model load, serialized per-image passes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::asset_cache::AssetCache;
use super::backend::{InferenceBackend, ModelHandle};
use crate::config::{PipelineConfig, PROGRESS_FRAME_MILLIS};
use crate::error::{PipelineError, Result};
use crate::source::downloader::DownloadProgress;
use crate::store::traits::BlobStore;
use crate::tensor::postprocess::postprocess;
use crate::tensor::preprocess::preprocess;
use crate::tensor::raster::{Mask, RasterImage};

/// Session lifecycle. `Ready` is required before segmentation commands are
/// accepted; `Failed` is terminal and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

/// Observable transitions consumed by the presentation layer.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Progress(DownloadProgress),
    Ready,
    Failed {
        message: String,
    },
    Completed {
        mask: Mask,
        original_width: u32,
        original_height: u32,
    },
}

pub struct SegmentationSession {
    config: PipelineConfig,
    cache: AssetCache,
    backend: Arc<dyn InferenceBackend>,
    state: RwLock<SessionState>,
    /// Written exactly once on the Loading→Ready transition, read-only after.
    model: RwLock<Option<Arc<dyn ModelHandle>>>,
    last_mask: Mutex<Option<Mask>>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    init_lock: tokio::sync::Mutex<()>,
    run_lock: tokio::sync::Mutex<()>,
}

impl SegmentationSession {
    /// Wire up a session. No work happens until [`Self::initialize`].
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn BlobStore>,
        backend: Arc<dyn InferenceBackend>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            config,
            cache: AssetCache::new(store),
            backend,
            state: RwLock::new(SessionState::Uninitialized),
            model: RwLock::new(None),
            last_mask: Mutex::new(None),
            events,
            init_lock: tokio::sync::Mutex::new(()),
            run_lock: tokio::sync::Mutex::new(()),
        });
        (session, rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    /// Fetch (or recall) the model asset and load the engine handle.
    ///
    /// Idempotent and single-flight: concurrent calls coalesce onto one
    /// in-flight attempt and observe its outcome. A failure is terminal;
    /// the session stays `Failed` with a persistent message.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;

        // Re-check under the guard: a concurrent caller may have finished.
        match self.state() {
            SessionState::Ready => return Ok(()),
            SessionState::Failed(message) => {
                return Err(PipelineError::NotReady(format!(
                    "initialization failed: {message}"
                )))
            }
            SessionState::Uninitialized | SessionState::Loading => {}
        }
        *self.state.write() = SessionState::Loading;

        match self.load_model().await {
            Ok(handle) => {
                info!(
                    "session ready: input={:?} output={:?}",
                    handle.input_names().first(),
                    handle.output_names().first()
                );
                *self.model.write() = Some(handle);
                *self.state.write() = SessionState::Ready;
                let _ = self.events.send(PipelineEvent::Ready);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                error!("initialization failed: {}", message);
                *self.state.write() = SessionState::Failed(message.clone());
                let _ = self.events.send(PipelineEvent::Failed { message });
                Err(e)
            }
        }
    }

    async fn load_model(&self) -> Result<Arc<dyn ModelHandle>> {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(Self::forward_progress(progress_rx, self.events.clone()));

        let fetched = self
            .cache
            .fetch_and_cache(&self.config.model_url, &progress_tx)
            .await;
        drop(progress_tx);
        let _ = forwarder.await;

        self.backend.load(&fetched?).await
    }

    /// Forward raw download progress to the event channel, throttled to one
    /// event per display frame. The terminal event is always delivered.
    async fn forward_progress(
        mut rx: mpsc::UnboundedReceiver<DownloadProgress>,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) {
        let frame = Duration::from_millis(PROGRESS_FRAME_MILLIS);
        let mut last_emit: Option<Instant> = None;
        let mut pending: Option<DownloadProgress> = None;

        while let Some(progress) = rx.recv().await {
            let due = last_emit.map_or(true, |at| at.elapsed() >= frame);
            if due {
                last_emit = Some(Instant::now());
                pending = None;
                let _ = events.send(PipelineEvent::Progress(progress));
            } else {
                pending = Some(progress);
            }
        }

        if let Some(progress) = pending {
            let _ = events.send(PipelineEvent::Progress(progress));
        }
    }

    /// Run one segmentation pass over an encoded image file.
    ///
    /// Calls are serialized: a second call while one is in flight waits its
    /// turn, never executes concurrently. A failure aborts this call only:
    /// it is logged once, the session stays `Ready`, and no mask is recorded.
    pub async fn process_image(&self, file: &[u8]) -> Result<Mask> {
        if self.state() != SessionState::Ready {
            return Err(PipelineError::NotReady(
                "model not loaded yet or failed to load".into(),
            ));
        }

        let _guard = self.run_lock.lock().await;

        let handle = self
            .model
            .read()
            .clone()
            .ok_or_else(|| PipelineError::NotReady("engine handle missing".into()))?;

        match self.run_pass(handle, file).await {
            Ok(mask) => {
                *self.last_mask.lock() = Some(mask.clone());
                let _ = self.events.send(PipelineEvent::Completed {
                    mask: mask.clone(),
                    original_width: mask.width,
                    original_height: mask.height,
                });
                Ok(mask)
            }
            Err(e) => {
                error!("segmentation pass failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_pass(&self, handle: Arc<dyn ModelHandle>, file: &[u8]) -> Result<Mask> {
        let image = RasterImage::decode(file)?;
        let size = self.config.input_size;

        let input = preprocess(&image, size, self.config.mean, self.config.std)?;

        // Tensor names are a property of the loaded asset; take the first
        // declared input and output by position.
        let input_name = handle
            .input_names()
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::Inference("model declares no inputs".into()))?;
        let output_name = handle
            .output_names()
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::Inference("model declares no outputs".into()))?;

        debug!(
            "running inference image={}x{} input={}",
            image.width, image.height, input_name
        );

        // One coarse blocking call; the handle itself is immutable shared state.
        let run_handle = Arc::clone(&handle);
        let mut outputs =
            tokio::task::spawn_blocking(move || run_handle.run(vec![(input_name, input)]))
                .await
                .map_err(|e| PipelineError::Inference(format!("inference task aborted: {e}")))??;

        let ix = outputs
            .iter()
            .position(|(name, _)| *name == output_name)
            .ok_or_else(|| {
                PipelineError::Inference(format!("output tensor '{output_name}' missing"))
            })?;
        let (_, output) = outputs.swap_remove(ix);

        postprocess(&output, image.width, image.height, size)
    }

    /// Drop the recorded mask, returning to the pre-processing posture.
    /// The loaded engine handle is retained.
    pub fn reset(&self) {
        *self.last_mask.lock() = None;
    }

    /// PNG-encode the most recent mask.
    pub fn export_mask(&self) -> Result<Vec<u8>> {
        let mask = self.last_mask.lock().clone().ok_or(PipelineError::NoMask)?;
        mask.to_png()
    }
}
