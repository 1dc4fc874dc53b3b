pub mod ecg;
pub mod integration;
pub mod thresholding;

pub use ecg::{detect_heartbeats, detect_heartbeats_with_config, EcgPipelineConfig};
pub use integration::squared_moving_integration;
pub use thresholding::{thresholding, thresholding_with_config, ThresholdConfig};
