pub mod job;
pub mod runtime;
pub mod store;

pub use job::{Job, JobId, JobState, JobStatus};
pub use runtime::JobRuntime;
pub use store::JobStore;
