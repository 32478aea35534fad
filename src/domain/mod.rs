pub mod job;
pub mod types;

pub use job::{DateWindow, Job, JobError, Requester, DEFAULT_LIMIT};
pub use types::{ArchiveRecord, ExtractedItem, QueueSnapshot};
