pub mod queue;
pub mod worker;

pub use queue::{JobQueue, RetryPolicy};
pub use worker::{JobError, JobHandler, Worker, WorkerConfig};
