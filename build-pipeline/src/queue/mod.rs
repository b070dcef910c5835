// Queue module
// Build admission, single-worker scheduling and build history

pub mod build_queue;
pub mod models;

pub use build_queue::{default_output_root, BuildQueue, QueueConfig};
pub use models::{BuildId, BuildResult, BuildStatus};
