use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::{PipelineConfig, QuizgenConfig},
    error::Result,
    generation::GenerationEngine,
    segmentation::SegmentationEngine,
    transport::{HttpTransport, LlmTransport},
    types::{GenerationOutcome, ProcessedTranscript, QuestionSpec, SegmentTextMap},
};

/// Caller-facing payload for stage 2, as received from an RPC layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuestionsRequest {
    pub segments: SegmentTextMap,
    /// Only the first entry is used.
    #[serde(alias = "globalQuestionSpecification")]
    pub question_specification: Vec<QuestionSpec>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Both stages over one shared transport.
pub struct Pipeline {
    segmentation: SegmentationEngine,
    generation: GenerationEngine,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn LlmTransport>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            segmentation: SegmentationEngine::new(transport.clone(), config.clone()),
            generation: GenerationEngine::new(transport, config.clone()),
            config,
        })
    }

    /// Build the HTTP transport described by `config` and wire both engines to it.
    pub fn from_config(config: &QuizgenConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.transport)?;
        info!(base_url = transport.base_url(), "pipeline ready");
        Self::new(Arc::new(transport), config.pipeline.clone())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn model<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model.unwrap_or(&self.config.default_model)
    }

    /// Stage 1 with the configured segment count.
    pub async fn segment_transcript(
        &self,
        transcript: &str,
        model: Option<&str>,
    ) -> Result<SegmentTextMap> {
        self.segmentation
            .segment_transcript(transcript, self.model(model), self.config.desired_segments)
            .await
    }

    pub async fn segment_transcript_into(
        &self,
        transcript: &str,
        model: Option<&str>,
        desired_segments: usize,
    ) -> Result<SegmentTextMap> {
        self.segmentation
            .segment_transcript(transcript, self.model(model), desired_segments)
            .await
    }

    pub async fn generate_questions(
        &self,
        segments: &SegmentTextMap,
        spec: &QuestionSpec,
        model: Option<&str>,
    ) -> Result<GenerationOutcome> {
        self.generation
            .generate_questions(segments, spec, self.model(model))
            .await
    }

    /// Stage 2 from the list-of-specs request form.
    pub async fn generate(&self, request: &GenerateQuestionsRequest) -> Result<GenerationOutcome> {
        let spec = QuestionSpec::first_of(&request.question_specification)?;
        self.generate_questions(&request.segments, &spec, request.model.as_deref())
            .await
    }

    /// Single-correct poll questions about a free-text topic.
    pub async fn generate_poll_questions(
        &self,
        topic: &str,
        count: u32,
        model: Option<&str>,
    ) -> Result<GenerationOutcome> {
        self.generation
            .generate_poll_questions(topic, count, self.model(model))
            .await
    }

    /// Segment `transcript`, then generate questions for every segment.
    ///
    /// Segmentation errors end the run; generation failures stay inside the
    /// returned outcome.
    pub async fn process_transcript(
        &self,
        transcript: &str,
        spec: &QuestionSpec,
        model: Option<&str>,
    ) -> Result<ProcessedTranscript> {
        spec.validate()?;
        let segments = self.segment_transcript(transcript, model).await?;
        let outcome = self.generate_questions(&segments, spec, model).await?;
        Ok(ProcessedTranscript { segments, outcome })
    }
}
