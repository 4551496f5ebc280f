use async_trait::async_trait;
use cortex_embeddings::{
    build_provider, EmbeddingData, EmbeddingError, EmbeddingProvider, EmbeddingRequest,
    EmbeddingResponse, LocalMode, LocalProvider, ProviderConfig, RemoteProvider, Result,
    Transport,
};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DIM: usize = 8;

/// Replays scripted failures, then answers with constant vectors
struct ScriptedTransport {
    failures: Mutex<VecDeque<EmbeddingError>>,
    requests: Mutex<Vec<usize>>,
    dimension: usize,
}

impl ScriptedTransport {
    fn new(failures: Vec<EmbeddingError>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            requests: Mutex::new(Vec::new()),
            dimension: DIM,
        }
    }

    fn request_sizes(&self) -> Vec<usize> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_embeddings(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.requests.lock().unwrap().push(request.input.len());
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        // Reverse order to check the provider sorts by index
        let data = request
            .input
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| EmbeddingData {
                embedding: vec![text.len() as f32; self.dimension],
                index,
            })
            .collect();
        Ok(EmbeddingResponse { data })
    }
}

struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn post_embeddings(&self, _request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        std::future::pending().await
    }
}

fn remote_config(max_attempts: u32) -> ProviderConfig {
    let mut config = ProviderConfig::remote("scripted-model");
    config.remote.dimensions = Some(DIM);
    config.remote.max_attempts = max_attempts;
    config.batch_size = Some(4);
    config
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| "x".repeat(i + 1)).collect()
}

fn rate_limited() -> EmbeddingError {
    EmbeddingError::RateLimited { retry_after: None }
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_twice_then_success() {
    let transport = Arc::new(ScriptedTransport::new(vec![rate_limited(), rate_limited()]));
    let provider = RemoteProvider::with_transport(&remote_config(4), transport.clone()).unwrap();

    let vectors = provider.embed(&texts(3)).await.unwrap();

    assert_eq!(provider.attempts(), 3);
    assert_eq!(transport.request_sizes(), vec![3, 3, 3]);
    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors[0][0], 1.0);
    assert_eq!(vectors[2][0], 3.0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_between_attempts() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        EmbeddingError::Transient("503".to_string()),
        EmbeddingError::Transient("503".to_string()),
    ]));
    let provider = RemoteProvider::with_transport(&remote_config(4), transport).unwrap();

    let started = tokio::time::Instant::now();
    provider.embed(&texts(1)).await.unwrap();

    // 500ms then 1000ms with the default schedule
    assert!(started.elapsed() >= Duration::from_millis(1_500));
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        rate_limited(),
        rate_limited(),
        rate_limited(),
    ]));
    let provider = RemoteProvider::with_transport(&remote_config(3), transport).unwrap();

    let err = provider.embed(&texts(2)).await.unwrap_err();

    assert_eq!(
        err,
        EmbeddingError::Exhausted {
            attempts: 3,
            last: Box::new(rate_limited()),
        }
    );
    assert_eq!(provider.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_is_not_retried() {
    let transport = Arc::new(ScriptedTransport::new(vec![EmbeddingError::Fatal(
        "401 Unauthorized".to_string(),
    )]));
    let provider = RemoteProvider::with_transport(&remote_config(4), transport).unwrap();

    let err = provider.embed(&texts(1)).await.unwrap_err();

    assert!(matches!(err, EmbeddingError::Fatal(_)));
    assert_eq!(provider.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_request_times_out_as_transient() {
    let mut config = remote_config(2);
    config.remote.timeout_secs = 5;
    let provider = RemoteProvider::with_transport(&config, Arc::new(HangingTransport)).unwrap();

    let err = provider.embed(&texts(1)).await.unwrap_err();

    match err {
        EmbeddingError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, EmbeddingError::Transient(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_oversized_input_is_sent_in_batches() {
    let transport = Arc::new(ScriptedTransport::new(Vec::new()));
    let provider = RemoteProvider::with_transport(&remote_config(1), transport.clone()).unwrap();

    let vectors = provider.embed(&texts(10)).await.unwrap();

    assert_eq!(vectors.len(), 10);
    assert_eq!(transport.request_sizes(), vec![4, 4, 2]);
    assert_eq!(vectors[9][0], 10.0);
}

#[tokio::test]
async fn test_wrong_dimension_is_reported_per_item() {
    let transport = Arc::new(ScriptedTransport {
        failures: Mutex::new(VecDeque::new()),
        requests: Mutex::new(Vec::new()),
        dimension: DIM + 1,
    });
    let provider = RemoteProvider::with_transport(&remote_config(1), transport).unwrap();

    let items = provider.embed_items(&texts(2)).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| matches!(
        item,
        Err(EmbeddingError::InvalidDimension { expected: DIM, actual }) if *actual == DIM + 1
    )));
    assert!(provider.embed(&texts(2)).await.is_err());
}

fn stub_config(model: &str) -> ProviderConfig {
    let mut config = ProviderConfig::local(model);
    config.local.mode = LocalMode::Stub;
    config
}

#[tokio::test]
async fn test_local_handle_is_loaded_once_and_shared() {
    let first = LocalProvider::new(&stub_config("all-mpnet-base-v2")).unwrap();
    let second = LocalProvider::new(&stub_config("mpnet")).unwrap();
    let other_model = LocalProvider::new(&stub_config("bge-small")).unwrap();

    assert!(first.shares_handle_with(&second));
    assert!(!first.shares_handle_with(&other_model));

    first.warm_up().await.unwrap();
    first.warm_up().await.unwrap();
    assert!(first.is_loaded());
    assert!(second.is_loaded());
    assert_eq!(first.device(), None);
}

#[tokio::test]
async fn test_embed_len_and_dimension_for_every_batch_size() {
    let local = build_provider(&stub_config("all-minilm-l6-v2")).unwrap();
    let remote: Arc<dyn EmbeddingProvider> = Arc::new(
        RemoteProvider::with_transport(
            &remote_config(1),
            Arc::new(ScriptedTransport::new(Vec::new())),
        )
        .unwrap(),
    );

    for provider in [local, remote] {
        for n in 1..=provider.batch_size() {
            let vectors = provider.embed(&texts(n)).await.unwrap();
            assert_eq!(vectors.len(), n, "{}", provider.id());
            assert!(vectors.iter().all(|v| v.len() == provider.dimension()));
        }
    }
}

#[tokio::test]
async fn test_stub_vectors_are_deterministic() {
    let provider = build_provider(&stub_config("all-minilm-l6-v2")).unwrap();
    let batch = texts(5);

    let first = provider.embed(&batch).await.unwrap();
    let second = provider.embed(&batch).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.embed(&[]).await.unwrap(), Vec::<Vec<f32>>::new());
}

#[tokio::test]
#[ignore = "needs all-minilm-l6-v2 ONNX files under CORTEX_MODEL_DIR"]
async fn test_onnx_model_embeds_unit_vectors() {
    let mut config = ProviderConfig::local("all-minilm-l6-v2");
    config.local.mode = LocalMode::Onnx;
    config.local.force_cpu = true;
    let provider = build_provider(&config).unwrap();

    let vectors = provider
        .embed(&["const x = 1;".to_string(), "def f(): pass".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors.len(), 2);
    for vector in vectors {
        assert_eq!(vector.len(), 384);
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }
}
