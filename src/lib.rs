pub mod calculator;
pub mod config;
pub mod data;
pub mod error;
mod macros;
pub mod pipeline;
pub mod prelude;
pub mod report;
pub mod sim;

pub use config::{BenchmarkSpec, InstrumentSpec, PipelineConfig};
pub use error::{FolioError, FolioResult};
pub use pipeline::{AnalysisRun, Pipeline};
