//! Application wiring: settings in, running proxy out

pub mod app;

pub use app::{build_pipeline, Application};
