//! OpenVINO model wrappers, frame sources and drawing helpers

pub mod config;
pub mod draw;
pub mod engine;
pub mod input;
pub mod models;
pub mod utils;

pub use config::Config;
