//! Business logic services.

pub mod streaming;
pub mod videos;

pub use streaming::{StreamError, StreamingService, VideoStream};
pub use videos::{DeleteOutcome, ProcessingTrigger, RenameRequest, UploadRequest, VideoService};
