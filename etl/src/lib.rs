pub mod cli;
pub mod crawler;
pub mod extract;
pub mod paths;
pub mod pipeline;
pub mod storage;
pub mod transform;
pub mod writer;

pub use pipeline::{EtlPipeline, PipelineReport};
