use crate::error::{ensure_dimension, EmbeddingError, Result};
use crate::local::ModelSpec;
use crate::stub::normalize;
use ndarray::{Array, Axis, Ix2, Ix3};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Compute device an ONNX session was committed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        })
    }
}

pub(crate) struct ModelAssets {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
}

impl ModelAssets {
    pub(crate) fn locate(spec: &ModelSpec, model_dir: &Path) -> Self {
        let root = model_dir.join(spec.id);
        Self {
            model_path: root.join("model.onnx"),
            tokenizer_path: root.join("tokenizer.json"),
        }
    }

    pub(crate) fn check(&self, model_id: &str) -> Result<()> {
        if self.model_path.exists() && self.tokenizer_path.exists() {
            return Ok(());
        }
        Err(EmbeddingError::configuration(format!(
            "Model files for '{model_id}' are missing. Expected ONNX at {} and tokenizer at {} (set [embedding.local] model_dir or CORTEX_MODEL_DIR)",
            self.model_path.display(),
            self.tokenizer_path.display(),
        )))
    }
}

pub(crate) struct OnnxBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
    max_batch: usize,
    dimension: usize,
    device: Device,
}

fn model_error(context: &str) -> impl Fn(ort::Error) -> EmbeddingError + '_ {
    move |err| EmbeddingError::Model(format!("{context}: {err}"))
}

impl OnnxBackend {
    pub(crate) fn new(spec: &ModelSpec, model_dir: &Path, force_cpu: bool) -> Result<Self> {
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let assets = ModelAssets::locate(spec, model_dir);
        assets.check(spec.id)?;

        let mut tokenizer = Tokenizer::from_file(&assets.tokenizer_path)
            .map_err(|e| EmbeddingError::Model(format!("Tokenizer load failed: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: spec.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| EmbeddingError::Model(format!("Tokenizer truncation failed: {e}")))?;

        let (providers, device) = select_execution_providers(force_cpu);
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .clamp(1, 4);
        let session = Session::builder()
            .map_err(model_error("Failed to create ONNX session builder"))?
            .with_intra_threads(threads)
            .map_err(model_error("Failed to set ORT intra threads"))?
            .with_execution_providers(providers)
            .map_err(model_error("Failed to register execution providers"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(model_error("Failed to set optimization level"))?
            .commit_from_file(&assets.model_path)
            .map_err(model_error("Failed to load ONNX model"))?;

        log::info!(
            "Loaded ONNX model '{}' on {device} (dim {}, max_length {}, batch {})",
            spec.id,
            spec.dimension,
            spec.max_length,
            spec.max_batch
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: spec.max_length,
            max_batch: spec.max_batch,
            dimension: spec.dimension,
            device,
        })
    }

    pub(crate) const fn device(&self) -> Device {
        self.device
    }

    pub(crate) fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| EmbeddingError::Model(format!("Tokenization failed: {e}")))?;
            if encodings.is_empty() {
                continue;
            }

            let seq_len = encodings[0].len();
            if seq_len > self.max_length || encodings.iter().any(|e| e.len() != seq_len) {
                return Err(EmbeddingError::Model(format!(
                    "Unexpected tokenized length {seq_len} (max_length {})",
                    self.max_length
                )));
            }
            let (ids, masks, type_ids, mask_rows) = build_flat_tensors(&encodings, seq_len);

            let shape = (batch.len(), seq_len);
            let mut available: HashMap<&str, DynTensor> = HashMap::new();
            for (name, data) in [
                ("input_ids", ids),
                ("attention_mask", masks),
                ("token_type_ids", type_ids),
            ] {
                let array = Array::from_shape_vec(shape, data)
                    .map_err(|e| EmbeddingError::Model(format!("{name} shape error: {e}")))?;
                let tensor = Tensor::from_array(array.into_dyn())
                    .map_err(model_error("Failed to build input tensor"))?
                    .upcast();
                available.insert(name, tensor);
            }

            let array = {
                let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);

                let mut feed: HashMap<String, DynTensor> = HashMap::new();
                for input in &session.inputs {
                    let tensor = available.remove(input.name.as_str()).ok_or_else(|| {
                        EmbeddingError::Model(format!("Unsupported ONNX input '{}'", input.name))
                    })?;
                    feed.insert(input.name.clone(), tensor);
                }

                let outputs = session
                    .run(SessionInputs::from(feed))
                    .map_err(model_error("ONNX forward failed"))?;
                if outputs.len() == 0 {
                    return Err(EmbeddingError::Model("ONNX returned no outputs".to_string()));
                }
                outputs[0]
                    .try_extract_array::<f32>()
                    .map_err(model_error("Failed to decode ONNX output"))?
                    .to_owned()
            };
            results.extend(embeddings_from_output(array, &mask_rows, self.dimension)?);
        }

        Ok(results)
    }
}

fn select_execution_providers(force_cpu: bool) -> (Vec<ExecutionProviderDispatch>, Device) {
    let cpu = || CPUExecutionProvider::default().build();
    if force_cpu {
        return (vec![cpu()], Device::Cpu);
    }

    let cuda = CUDAExecutionProvider::default();
    match cuda.is_available() {
        Ok(true) => (vec![cuda.build(), cpu()], Device::Cuda),
        Ok(false) => {
            log::info!("No CUDA device available, running embeddings on CPU");
            (vec![cpu()], Device::Cpu)
        }
        Err(err) => {
            log::warn!("CUDA availability check failed, running embeddings on CPU: {err}");
            (vec![cpu()], Device::Cpu)
        }
    }
}

fn embeddings_from_output(
    array: ndarray::ArrayD<f32>,
    mask_rows: &[Vec<i64>],
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    match array.ndim() {
        2 => {
            let embeddings = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| EmbeddingError::Model(format!("Bad output shape: {e}")))?;
            for row in embeddings.outer_iter() {
                let mut emb = row.to_vec();
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        3 => {
            let hidden = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| EmbeddingError::Model(format!("Bad output shape: {e}")))?;
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let mask = mask_rows.get(idx).map(Vec::as_slice).unwrap_or(&[]);
                let mut emb = mean_pool(sample, mask);
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        _ => {
            return Err(EmbeddingError::Model(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    }
    Ok(out)
}

/// Average of token vectors whose attention mask is set
fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (token_idx, token) in sample.outer_iter().enumerate() {
        if mask.get(token_idx).copied().unwrap_or(0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }

    if count > 0.0 {
        for value in &mut sum {
            *value /= count;
        }
    }
    sum
}

fn build_flat_tensors(
    encodings: &[Encoding],
    seq_len: usize,
) -> (Vec<i64>, Vec<i64>, Vec<i64>, Vec<Vec<i64>>) {
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut masks = Vec::with_capacity(encodings.len() * seq_len);
    let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask_rows = Vec::with_capacity(encodings.len());

    for encoding in encodings {
        let row = |values: &[u32], idx: usize| i64::from(values.get(idx).copied().unwrap_or(0));
        for idx in 0..seq_len {
            ids.push(row(encoding.get_ids(), idx));
            masks.push(row(encoding.get_attention_mask(), idx));
            type_ids.push(row(encoding.get_type_ids(), idx));
        }
        mask_rows.push(
            (0..seq_len)
                .map(|idx| row(encoding.get_attention_mask(), idx))
                .collect(),
        );
    }

    (ids, masks, type_ids, mask_rows)
}
