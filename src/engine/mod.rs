//! Inference engine module
//!
//! Provides OpenVINO-based inference with:
//! - IR loading and compilation per device
//! - Submit-then-wait requests with optional timeout
//! - BGR NCHW preprocessing of frames

pub mod faults;
pub mod model;
pub mod preprocess;
pub mod runtime;
pub mod tensor;

pub use faults::ModelError;
pub use model::{Decoder, InferenceModel, Model, ModelSettings, PredictOptions, Prediction};
pub use tensor::{InputBlob, ModelOutputs, OutputTensor};
