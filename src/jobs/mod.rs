pub mod processor;
pub mod queue;

pub use processor::JobProcessor;
pub use queue::{AnalysisJob, JobQueue, JobRetention, JobStatus};
