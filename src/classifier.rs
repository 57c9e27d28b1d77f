//! Animal image classifier backed by an ONNX Runtime session pool.
//!
//! The classifier owns the frozen model and the preprocessing constants it
//! was trained with. A prediction is a pure function of the input image:
//! resize, normalize, forward pass, softmax, top-k.

use std::cmp::Ordering as CmpOrdering;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{RgbImage, imageops::FilterType};
use ndarray::Array4;
use ort::logging::LogLevel;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::{TensorRef, ValueType};

use crate::errors::{ClassifierError, SimpleError};
use crate::io_struct::Prediction;
use crate::labels::CLASS_NAMES;

/// Model input edge length, fixed by the training pipeline.
pub const INPUT_SIZE: (u32, u32) = (224, 224);

/// Per-channel affine normalization, precomputed as alpha = scale / std and
/// beta = -mean / std so each pixel costs one multiply-add.
#[derive(Debug, Clone, Copy)]
pub struct Normalize {
    alpha: [f32; 3],
    beta: [f32; 3],
}

impl Normalize {
    /// ImageNet statistics the backbone was trained with.
    pub fn imagenet() -> Self {
        const SCALE: f32 = 1.0 / 255.0;
        const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
        const STD: [f32; 3] = [0.229, 0.224, 0.225];

        let mut alpha = [0.0f32; 3];
        let mut beta = [0.0f32; 3];
        for channel in 0..3 {
            alpha[channel] = SCALE / STD[channel];
            beta[channel] = -MEAN[channel] / STD[channel];
        }
        Self { alpha, beta }
    }

    fn apply(&self, channel: usize, value: u8) -> f32 {
        value as f32 * self.alpha[channel] + self.beta[channel]
    }
}

/// Decodes an uploaded byte buffer into the canonical RGB representation.
///
/// The HTTP layer calls this before handing the image to the core, so the
/// classifier only ever sees one input type.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ClassifierError> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

/// Resizes to the model input size and normalizes into an NCHW tensor.
///
/// Direct resize, no aspect-ratio preservation; bilinear filter to match the
/// transform applied at training time.
fn preprocess(image: &RgbImage, normalize: &Normalize) -> Array4<f32> {
    let (width, height) = INPUT_SIZE;
    let resized = image::imageops::resize(image, width, height, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = normalize.apply(channel, pixel[channel]);
        }
    }
    tensor
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Selects the k highest probabilities with their class indices, descending.
/// k is truncated to the number of classes.
fn top_k_indices(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal));
    indexed.truncate(k);
    indexed
}

/// Rounds a probability to a percentage with two decimal places.
fn round_confidence(probability: f32) -> f32 {
    (probability * 100.0 * 100.0).round() / 100.0
}

/// The loaded model plus everything needed to run one image through it.
///
/// Sessions are pooled behind mutexes because ONNX Runtime requires
/// exclusive access for a forward pass; the pool index round-robins so
/// concurrent requests spread across sessions. All other fields are
/// read-only after load.
pub struct AnimalClassifier {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_name: String,
    normalize: Normalize,
    model_path: PathBuf,
}

impl std::fmt::Debug for AnimalClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimalClassifier")
            .field("sessions", &self.sessions.len())
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("model_path", &self.model_path)
            .finish()
    }
}

impl AnimalClassifier {
    /// Loads the exported model and prepares a session pool of the given size.
    ///
    /// Fails if the weights file is missing or corrupt, if the graph has no
    /// input or output tensors, or if the output class dimension does not
    /// match the label set.
    pub fn load(
        model_path: impl AsRef<Path>,
        session_pool_size: usize,
    ) -> Result<Self, ClassifierError> {
        let path = model_path.as_ref();
        let pool_size = session_pool_size.max(1);

        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let session = Session::builder()?
                .with_log_level(LogLevel::Error)?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(path)
                .map_err(|source| ClassifierError::ModelLoad {
                    path: path.to_path_buf(),
                    source,
                })?;
            sessions.push(Mutex::new(session));
        }

        let (input_name, output_name) = {
            let session = sessions[0]
                .lock()
                .map_err(|_| ClassifierError::invalid_input("failed to acquire session lock"))?;

            let input_name = session
                .inputs
                .first()
                .map(|input| input.name.clone())
                .ok_or_else(|| ClassifierError::invalid_input("model has no input tensors"))?;
            let output_name = session
                .outputs
                .first()
                .map(|output| output.name.clone())
                .ok_or_else(|| ClassifierError::invalid_input("model has no output tensors"))?;

            validate_output_classes(&session)?;

            if let Ok(metadata) = session.metadata() {
                if let Ok(Some(val_acc)) = metadata.custom("val_acc") {
                    log::info!("recorded validation accuracy: {val_acc}%");
                }
            }

            (input_name, output_name)
        };

        log::info!(
            "classifier loaded from {} ({} session{})",
            path.display(),
            pool_size,
            if pool_size == 1 { "" } else { "s" }
        );

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_name,
            output_name,
            normalize: Normalize::imagenet(),
            model_path: path.to_path_buf(),
        })
    }

    /// Returns the path the model was loaded from.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Runs one image through the model and returns the `top_k` highest
    /// scoring classes, descending by confidence.
    ///
    /// `top_k` greater than the label-set size is truncated; zero is
    /// rejected.
    pub fn predict(
        &self,
        image: &RgbImage,
        top_k: usize,
    ) -> Result<Vec<Prediction>, ClassifierError> {
        if top_k == 0 {
            return Err(ClassifierError::invalid_input(
                "top_k must be greater than 0",
            ));
        }
        let top_k = top_k.min(CLASS_NAMES.len());

        let input = preprocess(image, &self.normalize);
        let probabilities = self.forward(&input)?;
        let ranked = top_k_indices(&probabilities, top_k);

        Ok(ranked
            .into_iter()
            .map(|(class_idx, probability)| Prediction {
                class: CLASS_NAMES[class_idx].to_string(),
                confidence: round_confidence(probability),
                class_idx,
            })
            .collect())
    }

    /// Single forward pass; returns the softmaxed class distribution.
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        let input_tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| ClassifierError::inference("input tensor conversion", e))?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx]
            .lock()
            .map_err(|_| ClassifierError::invalid_input("failed to acquire session lock"))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| ClassifierError::inference("forward pass", e))?;
        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::inference("output tensor extraction", e))?;

        let classes = CLASS_NAMES.len();
        if data.len() < classes {
            return Err(ClassifierError::inference(
                format!("output tensor {shape:?} holds fewer than {classes} scores"),
                SimpleError::new("unexpected output shape"),
            ));
        }

        Ok(softmax(&data[..classes]))
    }
}

/// Rejects models whose static output class dimension disagrees with the
/// label set. Dynamic dimensions pass through.
fn validate_output_classes(session: &Session) -> Result<(), ClassifierError> {
    let Some(output) = session.outputs.first() else {
        return Ok(());
    };
    if let ValueType::Tensor { shape, .. } = &output.output_type {
        let dims: Vec<i64> = shape.iter().copied().collect();
        if let Some(&classes) = dims.last() {
            if classes > 0 && classes as usize != CLASS_NAMES.len() {
                return Err(ClassifierError::invalid_input(format!(
                    "model emits {classes} classes, expected {}",
                    CLASS_NAMES.len()
                )));
            }
        }
    }
    Ok(())
}
