pub mod ai;
pub mod config;
pub mod db;
pub mod decision;
pub mod detection;
pub mod diff;
pub mod encoder;
pub mod error;
pub mod interview;
pub mod lifecycle;
pub mod model;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod telemetry;

pub use ai::{HttpSuggester, PatternSuggester, SuggesterError, Suggestion, SuggestionService};
pub use config::{load_config, load_config_from_str, Config};
pub use decision::{decide, FlagDecision};
pub use detection::{analyze, score, DetectionOptions, DetectionReport, KindWeights};
pub use diff::{compute_modifications, DiffEngine, DiffError};
pub use encoder::{
    content_hash, decode_layers, encode, verify_hash, EncodeError, EncoderOptions, TrapDocument,
    TrapEncoder,
};
pub use error::{ConfigError, ErrorClass, ProcessError, Result, StorageError, TripwireError};
pub use interview::{InterviewRunner, InterviewSession, InterviewState, RunOutcome, Verdict};
pub use lifecycle::{AssignmentStatus, DocumentStatus, LifecycleError, SuggestionStatus};
pub use model::{
    Assignment, Modification, ModificationKind, NewAssignment, Submission, SubmissionReceipt,
    TrapDocumentRecord,
};
pub use pipeline::{AssignmentService, PipelineContext, SubmissionService};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
