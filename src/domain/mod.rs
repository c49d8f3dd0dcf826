pub mod job;
pub mod request;

pub use job::{Job, JobId, JobKey, JobStatus};
pub use request::ScrapeRequest;
