pub mod assignment;
pub mod context;
pub mod progress;
pub mod submission;

pub use assignment::{AssignmentService, AssignmentStatusView, DownloadedDocument};
pub use context::PipelineContext;
pub use progress::{NoopProgress, ProgressEvent, ProgressReporter, Stage, TracingProgress};
pub use submission::{DbTranscriptSink, InterviewOutcome, SubmissionService, MAX_UPLOAD_BYTES};
