//! Service layer
//!
//! The pipeline and the collaborators it drives. Recording and encoding sit
//! behind traits so the pipeline can be exercised without hardware.

mod encoder;
mod guard;
mod pipeline;
mod recorder;

// Re-export traits
pub use encoder::Encoder;
pub use recorder::Recorder;

// Re-export implementations
pub use encoder::SoxEncoder;
pub use pipeline::{Destination, Stages, WorkerPipeline};
pub use recorder::RecordingOrchestrator;
