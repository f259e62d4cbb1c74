pub mod error;
pub mod fetcher;
pub mod model;
pub mod operations;
pub mod orchestrator;
pub mod payload;
pub mod publisher;

pub use orchestrator::RenderPipeline;
