pub mod config;
pub mod error;
pub mod model_download;
pub mod overlay;
pub mod pipeline;
pub mod types;
pub mod ui;
