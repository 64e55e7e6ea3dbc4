//! Typed faults raised by the model wrappers
//!
//! Everything else in the crate travels as `anyhow::Error`; these variants
//! are wrapped inside it and can be recovered with `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// One of `<name>.xml` / `<name>.bin` is missing
    #[error("model files not found: {structure:?} / {weights:?}")]
    MissingFiles { structure: PathBuf, weights: PathBuf },

    /// The network could not be read, or its outputs do not match what the
    /// decoder expects. Redownload or re-optimise the model.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// The frame handed to `predict` cannot be fed to the network
    #[error("invalid image array: {0}")]
    InvalidImageArray(String),

    /// The inference request did not complete within the configured timeout
    #[error("inference request timed out after {0} ms")]
    Timeout(i64),
}
