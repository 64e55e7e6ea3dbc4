//! Base model wrapper
//!
//! Loads an OpenVINO IR pair (`<name>.xml` + `<name>.bin`), compiles it on
//! the configured device and runs one inference request at a time: submit
//! with `infer_async`, then block on `wait` until the outputs are ready.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use image::{GrayImage, RgbImage};
use openvino::{InferRequest, InferenceError, Tensor};
use serde::Serialize;
use tracing::{debug, info};

use super::faults::ModelError;
use super::preprocess::{gray_blurred, preprocess_gray_input, preprocess_input};
use super::runtime::{check_version, SafeCompiledModel, SafeCore};
use super::tensor::{read_tensor_f32, to_tensor, InputBlob, ModelOutputs, OutputTensor};
use crate::config::InferenceConfig;

/// Slice used while blocking on a request without a deadline
const WAIT_SLICE_MS: i64 = 1000;

/// IR file pair making up one model
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub structure: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    /// `name` is the model path without extension
    pub fn from_name(name: impl AsRef<Path>) -> Result<Self, ModelError> {
        let name = name.as_ref().as_os_str().to_owned();
        let mut structure = name.clone();
        structure.push(".xml");
        let mut weights = name;
        weights.push(".bin");

        let files = Self {
            structure: PathBuf::from(structure),
            weights: PathBuf::from(weights),
        };
        if !files.structure.exists() || !files.weights.exists() {
            return Err(ModelError::MissingFiles {
                structure: files.structure,
                weights: files.weights,
            });
        }
        Ok(files)
    }

    /// Size of the weights file in MiB
    pub fn size_mb(&self) -> Result<f64> {
        let bytes = std::fs::metadata(&self.weights)?.len();
        Ok(bytes as f64 / 1024.0_f64.powi(2))
    }
}

/// Per-model settings
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub device: String,
    pub threshold: f32,
    /// Size detections are scaled to. Falls back to the frame size.
    pub source_size: Option<(u32, u32)>,
    /// `None` blocks until the request completes
    pub request_timeout_ms: Option<i64>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            device: "CPU".to_string(),
            threshold: 0.60,
            source_size: None,
            request_timeout_ms: None,
        }
    }
}

impl From<&InferenceConfig> for ModelSettings {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            device: config.device.clone(),
            threshold: config.threshold,
            source_size: None,
            request_timeout_ms: config.request_timeout_ms,
        }
    }
}

/// Name and static shape of an input or output port
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub dims: Vec<i64>,
}

/// Latency bookkeeping for the inference requests of one model
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerfStats {
    pub count: u64,
    pub last_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub total_ms: f64,
}

impl PerfStats {
    pub fn record(&mut self, elapsed_ms: f64) {
        if self.count == 0 {
            self.min_ms = elapsed_ms;
            self.max_ms = elapsed_ms;
        } else {
            self.min_ms = self.min_ms.min(elapsed_ms);
            self.max_ms = self.max_ms.max(elapsed_ms);
        }
        self.count += 1;
        self.last_ms = elapsed_ms;
        self.total_ms += elapsed_ms;
    }

    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

/// A compiled model with its single inference request
pub struct InferenceModel {
    _core: SafeCore,
    _compiled: SafeCompiledModel,
    request: InferRequest,
    files: ModelFiles,
    settings: ModelSettings,
    inputs: Vec<PortInfo>,
    outputs: Vec<PortInfo>,
    load_time_ms: f64,
    stats: PerfStats,
}

impl InferenceModel {
    /// Read, compile and prepare a model for inference
    pub fn load(name: impl AsRef<Path>, settings: &ModelSettings) -> Result<Self> {
        let files = ModelFiles::from_name(name)?;

        let structure = files
            .structure
            .to_str()
            .context("model path is not valid UTF-8")?;
        let weights = files
            .weights
            .to_str()
            .context("model path is not valid UTF-8")?;

        let mut core = SafeCore::new()?;
        check_version();
        let model = core.read_model_from_file(structure, weights).map_err(|e| {
            ModelError::InvalidModel(format!(
                "Could not initialise the network ({}). Have you entered the correct model path?",
                e
            ))
        })?;

        let mut input_names = Vec::new();
        for i in 0..model.get_inputs_len()? {
            input_names.push(model.get_input_by_index(i)?.get_name()?);
        }
        let mut output_names = Vec::new();
        for i in 0..model.get_outputs_len()? {
            output_names.push(model.get_output_by_index(i)?.get_name()?);
        }

        let start = Instant::now();
        let compiled = core.compile_model(&model, settings.device.as_str().into())?;
        let mut compiled = SafeCompiledModel::new(compiled);
        let load_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            "Model: {} took {:.3} ms to load.",
            files.structure.display(),
            load_time_ms
        );

        let mut request = compiled.create_infer_request()?;

        let inputs = input_names
            .into_iter()
            .map(|name| port_info(&mut request, name))
            .collect::<Result<Vec<_>>>()?;
        let outputs = output_names
            .into_iter()
            .map(|name| port_info(&mut request, name))
            .collect::<Result<Vec<_>>>()?;

        debug!("Inputs: {:?}", inputs);
        debug!("Outputs: {:?}", outputs);

        Ok(Self {
            _core: core,
            _compiled: compiled,
            request,
            files,
            settings: settings.clone(),
            inputs,
            outputs,
            load_time_ms,
            stats: PerfStats::default(),
        })
    }

    pub fn files(&self) -> &ModelFiles {
        &self.files
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn inputs(&self) -> &[PortInfo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PortInfo] {
        &self.outputs
    }

    /// First input port of the network
    pub fn primary_input(&self) -> Result<&PortInfo> {
        self.inputs
            .first()
            .ok_or_else(|| ModelError::InvalidModel("model has no inputs".to_string()).into())
    }

    /// Input port by name
    pub fn input(&self, name: &str) -> Result<&PortInfo> {
        self.inputs.iter().find(|p| p.name == name).ok_or_else(|| {
            ModelError::InvalidModel(format!(
                "model {} has no input named {}",
                self.files.structure.display(),
                name
            ))
            .into()
        })
    }

    pub fn load_time_ms(&self) -> f64 {
        self.load_time_ms
    }

    pub fn model_size_mb(&self) -> Result<f64> {
        self.files.size_mb()
    }

    pub fn perf_stats(&self) -> &PerfStats {
        &self.stats
    }

    /// Submit one request and block until its outputs are available
    pub fn infer(&mut self, inputs: &[InputBlob]) -> Result<ModelOutputs> {
        // The tensors must outlive the request
        let mut bound: Vec<Tensor> = Vec::with_capacity(inputs.len());
        for blob in inputs {
            let tensor = to_tensor(&blob.data)?;
            self.request.set_tensor(&blob.name, &tensor)?;
            bound.push(tensor);
        }

        let start = Instant::now();
        self.request.infer_async()?;
        self.wait()?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.stats.record(elapsed_ms);

        let mut tensors = Vec::with_capacity(self.outputs.len());
        for (index, port) in self.outputs.iter().enumerate() {
            let tensor = self.request.get_output_tensor_by_index(index)?;
            let (dims, data) = read_tensor_f32(&tensor)?;
            tensors.push(OutputTensor::new(port.name.clone(), dims, data));
        }

        debug!(
            "{} inference took {:.3} ms",
            self.files.structure.display(),
            elapsed_ms
        );

        Ok(ModelOutputs::new(tensors))
    }

    fn wait(&mut self) -> Result<()> {
        match self.settings.request_timeout_ms {
            Some(timeout) => {
                if !request_done(self.request.wait(timeout))? {
                    return Err(ModelError::Timeout(timeout).into());
                }
            }
            None => while !request_done(self.request.wait(WAIT_SLICE_MS))? {},
        }
        Ok(())
    }

    /// `(width, height)` expected by a `[N, C, H, W]` port
    pub fn spatial_size(port: &PortInfo) -> Result<(u32, u32)> {
        match port.dims.as_slice() {
            [_, _, h, w] if *h > 0 && *w > 0 => Ok((*w as u32, *h as u32)),
            dims => Err(ModelError::InvalidModel(format!(
                "input {} has shape {:?}, expected [N, C, H, W]",
                port.name, dims
            ))
            .into()),
        }
    }
}

/// `Ok(false)` while the request is still running
fn request_done(status: Result<(), InferenceError>) -> Result<bool> {
    match status {
        Ok(()) => Ok(true),
        Err(InferenceError::ResultNotReady) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn port_info(request: &mut InferRequest, name: String) -> Result<PortInfo> {
    let tensor = request.get_tensor(&name)?;
    let dims = tensor.get_shape()?.get_dimensions().to_vec();
    Ok(PortInfo { name, dims })
}

/// Per-model output handling
pub trait Decoder {
    type Output;

    /// Build the decoder for a model file and its settings
    fn configure(model_name: &Path, settings: &ModelSettings) -> Self
    where
        Self: Sized;

    /// Turn raw outputs into a typed result. `frame` is the image that was
    /// fed to the network.
    fn decode(&self, outputs: &ModelOutputs, frame: &RgbImage) -> Result<Self::Output>;

    /// Annotate the frame with a decoded result
    fn draw(&self, output: &Self::Output, frame: &mut RgbImage);
}

/// Options for a single `predict` call
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictOptions {
    pub show_bbox: bool,
    /// Also return a blurred grayscale copy of the frame
    pub gray_enabled: bool,
}

/// Result of `predict`
#[derive(Debug, Clone)]
pub struct Prediction<T> {
    pub inference_ms: f64,
    pub output: T,
    pub gray_frame: Option<GrayImage>,
}

/// A loaded model paired with its decoder
pub struct Model<D: Decoder> {
    inner: InferenceModel,
    decoder: D,
}

impl<D: Decoder> Model<D> {
    pub fn load(model_name: impl AsRef<Path>, settings: &ModelSettings) -> Result<Self> {
        let model_name = model_name.as_ref();
        let inner = InferenceModel::load(model_name, settings)?;
        let decoder = D::configure(model_name, settings);
        Ok(Self { inner, decoder })
    }

    pub fn from_parts(inner: InferenceModel, decoder: D) -> Self {
        Self { inner, decoder }
    }

    pub fn inner(&self) -> &InferenceModel {
        &self.inner
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Preprocess, infer, decode and optionally draw onto `frame`
    pub fn predict(
        &mut self,
        frame: &mut RgbImage,
        options: PredictOptions,
    ) -> Result<Prediction<D::Output>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(ModelError::InvalidImageArray("frame is empty".to_string()).into());
        }

        let port = self.inner.primary_input()?.clone();
        let size = InferenceModel::spatial_size(&port)?;
        let blob = match port.dims.get(1) {
            Some(1) => preprocess_gray_input(frame, size),
            _ => preprocess_input(frame, size),
        };
        let gray_frame = options.gray_enabled.then(|| gray_blurred(frame));

        let start = Instant::now();
        let outputs = self.inner.infer(&[InputBlob::new(port.name, blob)])?;
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        let output = self.decoder.decode(&outputs, frame)?;
        if options.show_bbox {
            self.decoder.draw(&output, frame);
        }

        Ok(Prediction {
            inference_ms,
            output,
            gray_frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelFiles::from_name(dir.path().join("face-detection-adas-0001")).unwrap_err();
        assert!(matches!(err, ModelError::MissingFiles { .. }));
    }

    #[test]
    fn test_model_files_size() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("head-pose-estimation-adas-0001");
        std::fs::write(name.with_extension("xml"), b"<net/>").unwrap();
        std::fs::write(name.with_extension("bin"), vec![0u8; 1024 * 1024]).unwrap();

        let files = ModelFiles::from_name(&name).unwrap();
        assert!(files.structure.ends_with("head-pose-estimation-adas-0001.xml"));
        assert!((files.size_mb().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_model_files_keep_dotted_names() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("model.v2");
        std::fs::write(dir.path().join("model.v2.xml"), b"").unwrap();
        std::fs::write(dir.path().join("model.v2.bin"), b"").unwrap();
        let files = ModelFiles::from_name(&name).unwrap();
        assert!(files.weights.ends_with("model.v2.bin"));
    }

    #[test]
    fn test_request_done() {
        assert!(request_done(Ok(())).unwrap());
        assert!(!request_done(Err(InferenceError::ResultNotReady)).unwrap());
        let err = request_done(Err(InferenceError::InferCancelled)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<InferenceError>(),
            Some(&InferenceError::InferCancelled)
        );
    }

    #[test]
    fn test_perf_stats() {
        let mut stats = PerfStats::default();
        assert_eq!(stats.mean_ms(), 0.0);
        stats.record(4.0);
        stats.record(2.0);
        stats.record(6.0);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_ms, 2.0);
        assert_eq!(stats.max_ms, 6.0);
        assert_eq!(stats.last_ms, 6.0);
        assert!((stats.mean_ms() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_spatial_size() {
        let port = PortInfo {
            name: "data".to_string(),
            dims: vec![1, 3, 384, 672],
        };
        assert_eq!(InferenceModel::spatial_size(&port).unwrap(), (672, 384));

        let flat = PortInfo {
            name: "head_pose_angles".to_string(),
            dims: vec![1, 3],
        };
        assert!(InferenceModel::spatial_size(&flat).is_err());
    }
}
