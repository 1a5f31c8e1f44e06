use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use image::GenericImageView;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use skyseg_engine::config::PipelineConfig;
use skyseg_engine::engine::backend::{InferenceBackend, ModelHandle};
use skyseg_engine::engine::session::{PipelineEvent, SegmentationSession, SessionState};
use skyseg_engine::error::{PipelineError, Result};
use skyseg_engine::store::fs_store::FsBlobStore;
use skyseg_engine::tensor::Tensor;

const INPUT_SIZE: u32 = 320;

fn fake_asset() -> Vec<u8> {
    (0..4096).map(|i| (i % 239) as u8).collect()
}

async fn start_model_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_for_route = hits.clone();
    let app = Router::new().route(
        "/model.onnx",
        get(move || {
            let hits = hits_for_route.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                fake_asset()
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

#[derive(Default)]
struct MockShared {
    seen_input_shape: Mutex<Option<Vec<usize>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Backend producing a constant activation plane, for exercising the session
/// without a real network asset.
struct MockBackend {
    expected_asset: Vec<u8>,
    fill: f32,
    fail_load: bool,
    shared: Arc<MockShared>,
}

impl MockBackend {
    fn new(fill: f32) -> Self {
        Self {
            expected_asset: fake_asset(),
            fill,
            fail_load: false,
            shared: Arc::new(MockShared::default()),
        }
    }

    fn failing() -> Self {
        let mut backend = Self::new(0.0);
        backend.fail_load = true;
        backend
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn load(&self, model_bytes: &[u8]) -> Result<Arc<dyn ModelHandle>> {
        if self.fail_load {
            return Err(PipelineError::EngineLoad("incompatible asset".into()));
        }
        // The session must hand the engine the exact downloaded bytes.
        assert_eq!(model_bytes, &self.expected_asset[..]);
        Ok(Arc::new(MockHandle {
            fill: self.fill,
            shared: self.shared.clone(),
            input_names: vec!["input.1".to_string()],
            output_names: vec!["activation_out".to_string()],
        }))
    }
}

struct MockHandle {
    fill: f32,
    shared: Arc<MockShared>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl ModelHandle for MockHandle {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    fn run(&self, inputs: Vec<(String, Tensor)>) -> Result<Vec<(String, Tensor)>> {
        let entered = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_in_flight.fetch_max(entered, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(25));

        let (name, input) = &inputs[0];
        assert_eq!(name, "input.1");
        *self.shared.seen_input_shape.lock() = Some(input.shape.clone());

        let s = INPUT_SIZE as usize;
        let out = Tensor::new(vec![1, 1, s, s], vec![self.fill; s * s]);

        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![("activation_out".to_string(), out)])
    }
}

fn test_config(addr: SocketAddr, cache_dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        model_url: format!("http://{addr}/model.onnx"),
        cache_dir: cache_dir.display().to_string(),
        ..PipelineConfig::default()
    }
}

fn build_session(
    config: PipelineConfig,
    backend: MockBackend,
) -> (
    Arc<SegmentationSession>,
    mpsc::UnboundedReceiver<PipelineEvent>,
) {
    let store = Arc::new(FsBlobStore::new(&config.cache_dir, &config.generation));
    SegmentationSession::new(config, store, Arc::new(backend))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    events
}

fn png_image(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[tokio::test]
async fn test_commands_rejected_before_initialize() {
    let (addr, _hits) = start_model_server().await;
    let dir = tempfile::tempdir().unwrap();
    let (session, _rx) = build_session(test_config(addr, dir.path()), MockBackend::new(0.5));

    assert_eq!(session.state(), SessionState::Uninitialized);
    let err = session.process_image(&png_image(8, 8)).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotReady(_)));
    assert!(matches!(
        session.export_mask().unwrap_err(),
        PipelineError::NoMask
    ));
}

#[tokio::test]
async fn test_initialize_emits_progress_then_ready() {
    let (addr, _hits) = start_model_server().await;
    let dir = tempfile::tempdir().unwrap();
    let (session, mut rx) = build_session(test_config(addr, dir.path()), MockBackend::new(0.5));

    session.initialize().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);

    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(PipelineEvent::Ready)));

    let progress: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    let asset_len = fake_asset().len() as u64;
    assert_eq!(progress.last().unwrap().loaded, asset_len);
    assert_eq!(progress.last().unwrap().total, Some(asset_len));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_initialize_is_single_flight_and_idempotent() {
    let (addr, hits) = start_model_server().await;
    let dir = tempfile::tempdir().unwrap();
    let (session, _rx) = build_session(test_config(addr, dir.path()), MockBackend::new(0.5));

    let (a, b) = tokio::join!(session.initialize(), session.initialize());
    a.unwrap();
    b.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    session.initialize().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_engine_load_is_terminal() {
    let (addr, hits) = start_model_server().await;
    let dir = tempfile::tempdir().unwrap();
    let (session, mut rx) = build_session(test_config(addr, dir.path()), MockBackend::failing());

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, PipelineError::EngineLoad(_)));
    assert!(matches!(session.state(), SessionState::Failed(_)));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Failed { .. })));

    // Failure is persistent: commands stay rejected, nothing is retried.
    let err = session.process_image(&png_image(8, 8)).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotReady(_)));
    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, PipelineError::NotReady(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_download_is_terminal() {
    let (addr, _hits) = start_model_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(addr, dir.path());
    config.model_url = format!("http://{addr}/nope.onnx");
    let (session, _rx) = build_session(config, MockBackend::new(0.5));

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, PipelineError::Network(404)));
    assert!(matches!(session.state(), SessionState::Failed(_)));
}

#[tokio::test]
async fn test_mask_matches_original_dimensions() {
    let (addr, _hits) = start_model_server().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new(0.5);
    let shared = backend.shared.clone();
    let (session, mut rx) = build_session(test_config(addr, dir.path()), backend);

    session.initialize().await.unwrap();
    let mask = session.process_image(&png_image(800, 600)).await.unwrap();

    // The network always sees the square resolution; only the mask carries
    // the original aspect ratio.
    assert_eq!(
        shared.seen_input_shape.lock().clone().unwrap(),
        vec![1, 3, 320, 320]
    );
    assert_eq!((mask.width, mask.height), (800, 600));
    assert_eq!(mask.pixels.len(), 4 * 800 * 600);

    // Constant 0.5 activation → uniform mid-gray, opaque.
    assert_eq!(mask.pixels[0], 128);
    assert_eq!(mask.pixels[3], 255);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::Completed {
            original_width: 800,
            original_height: 600,
            ..
        }
    )));

    let png = session.export_mask().unwrap();
    let exported = image::load_from_memory(&png).unwrap();
    assert_eq!(exported.dimensions(), (800, 600));
}

#[tokio::test]
async fn test_bad_image_failure_is_call_scoped() {
    let (addr, _hits) = start_model_server().await;
    let dir = tempfile::tempdir().unwrap();
    let (session, mut rx) = build_session(test_config(addr, dir.path()), MockBackend::new(0.5));

    session.initialize().await.unwrap();
    drain(&mut rx);

    let err = session
        .process_image(b"definitely not an image")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Decode(_)));

    // The session stays usable: no mask recorded, no Completed event, and the
    // next valid image succeeds.
    assert_eq!(session.state(), SessionState::Ready);
    assert!(matches!(
        session.export_mask().unwrap_err(),
        PipelineError::NoMask
    ));
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, PipelineEvent::Completed { .. })));

    session.process_image(&png_image(64, 48)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_passes_are_serialized() {
    let (addr, _hits) = start_model_server().await;
    let dir = tempfile::tempdir().unwrap();
    let backend = MockBackend::new(0.5);
    let shared = backend.shared.clone();
    let (session, _rx) = build_session(test_config(addr, dir.path()), backend);

    session.initialize().await.unwrap();

    let png = png_image(64, 64);
    let a = tokio::spawn({
        let session = session.clone();
        let png = png.clone();
        async move { session.process_image(&png).await }
    });
    let b = tokio::spawn({
        let session = session.clone();
        async move { session.process_image(&png).await }
    });

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(shared.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reset_clears_the_recorded_mask() {
    let (addr, _hits) = start_model_server().await;
    let dir = tempfile::tempdir().unwrap();
    let (session, _rx) = build_session(test_config(addr, dir.path()), MockBackend::new(0.5));

    session.initialize().await.unwrap();
    session.process_image(&png_image(32, 32)).await.unwrap();
    session.export_mask().unwrap();

    session.reset();
    assert!(matches!(
        session.export_mask().unwrap_err(),
        PipelineError::NoMask
    ));
    // Ready is retained; processing still works after a reset.
    assert_eq!(session.state(), SessionState::Ready);
    session.process_image(&png_image(32, 32)).await.unwrap();
}
