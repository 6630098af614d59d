//! Lecture transcript segmentation and quiz question generation.
//!
//! Two independently callable stages sit on one [`LlmTransport`]:
//!
//! 1. [`SegmentationEngine`] splits a timed transcript into topical segments,
//!    falling back to a deterministic line split when the model reply is
//!    unusable.
//! 2. [`GenerationEngine`] asks for questions per `(segment, type)` pair and
//!    normalises whatever shape comes back, isolating failures per pair.
//!
//! [`Pipeline`] wires both to a shared [`HttpTransport`] built from
//! [`QuizgenConfig`].

pub mod config;
pub mod error;
pub mod format;
pub mod generation;
#[cfg(feature = "logging")]
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod provider;
pub mod question_types;
pub mod repair;
pub mod segmentation;
pub mod transport;
pub mod types;

pub use config::{PipelineConfig, QuizgenConfig, TransportConfig};
pub use error::{QuizgenError, Result};
pub use format::clean_transcript_lines;
pub use generation::GenerationEngine;
pub use normalize::normalize_raw_question;
pub use pipeline::{GenerateQuestionsRequest, Pipeline};
pub use provider::Provider;
pub use repair::extract_json;
pub use segmentation::{SegmentationEngine, fallback_segments};
pub use transport::{Completion, CompletionRequest, HttpTransport, LlmTransport};
pub use types::{
    FailureStage, GeneratedQuestion, GenerationOutcome, PairFailure, ProcessedTranscript,
    QuestionOption, QuestionSpec, QuestionType, RawQuestion, SegmentTextMap, TranscriptSegment,
};
