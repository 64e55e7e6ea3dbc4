//! Tensor plumbing between ndarray blobs and OpenVINO tensors

use anyhow::{Context, Result};
use ndarray::ArrayD;
use openvino::{ElementType, Shape, Tensor};

/// A named input blob handed to the inference request
pub struct InputBlob {
    pub name: String,
    pub data: ArrayD<f32>,
}

impl InputBlob {
    pub fn new(name: impl Into<String>, data: ArrayD<f32>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// One output tensor copied out of the request
#[derive(Debug, Clone)]
pub struct OutputTensor {
    pub name: String,
    pub dims: Vec<i64>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    pub fn new(name: impl Into<String>, dims: Vec<i64>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            dims,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// All outputs of one inference, in model output order
#[derive(Debug, Clone, Default)]
pub struct ModelOutputs {
    tensors: Vec<OutputTensor>,
}

impl ModelOutputs {
    pub fn new(tensors: Vec<OutputTensor>) -> Self {
        Self { tensors }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputTensor> {
        self.tensors.iter()
    }

    pub fn get(&self, index: usize) -> Option<&OutputTensor> {
        self.tensors.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&OutputTensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// Named output, falling back to position for models exported with
    /// different layer names
    pub fn by_name_or_index(&self, name: &str, index: usize) -> Option<&OutputTensor> {
        self.by_name(name).or_else(|| self.get(index))
    }

    /// Stack every output and flatten into one vector
    pub fn flatten(&self) -> Vec<f32> {
        self.tensors
            .iter()
            .flat_map(|t| t.data.iter().copied())
            .collect()
    }
}

/// Copy an ndarray blob into a freshly allocated f32 tensor
pub fn to_tensor(blob: &ArrayD<f32>) -> Result<Tensor> {
    let dims: Vec<i64> = blob.shape().iter().map(|&d| d as i64).collect();
    let shape = Shape::new(&dims)?;
    let mut tensor = Tensor::new(ElementType::F32, &shape)?;

    let contiguous = blob.as_standard_layout();
    let input_data = contiguous
        .as_slice()
        .context("input blob is not contiguous")?;
    let raw = tensor.get_raw_data_mut()?;
    anyhow::ensure!(
        raw.len() == input_data.len() * std::mem::size_of::<f32>(),
        "tensor size mismatch: {} bytes for {} floats",
        raw.len(),
        input_data.len()
    );
    unsafe {
        let tensor_data = raw.as_mut_ptr() as *mut f32;
        std::ptr::copy_nonoverlapping(input_data.as_ptr(), tensor_data, input_data.len());
    }

    Ok(tensor)
}

/// Read tensor data as f32 vector
pub fn read_tensor_f32(tensor: &Tensor) -> Result<(Vec<i64>, Vec<f32>)> {
    let shape = tensor.get_shape()?;
    let dims: Vec<i64> = shape.get_dimensions().to_vec();
    let total_elements: i64 = dims.iter().product();

    let raw = tensor.get_raw_data()?;
    anyhow::ensure!(
        raw.len() >= total_elements as usize * std::mem::size_of::<f32>(),
        "output tensor holds {} bytes, expected {} floats",
        raw.len(),
        total_elements
    );
    let data: Vec<f32> = unsafe {
        let ptr = raw.as_ptr() as *const f32;
        std::slice::from_raw_parts(ptr, total_elements as usize).to_vec()
    };

    Ok((dims, data))
}
